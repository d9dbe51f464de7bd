//! OKX exchange adapter: credentials, request signing, REST gateway.

pub mod client;
pub mod credentials;
pub mod signer;

pub use client::OkxGateway;
pub use credentials::OkxCredentials;
