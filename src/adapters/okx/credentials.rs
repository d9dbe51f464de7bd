//! OKX API credentials.
//!
//! The secret and passphrase are held in `SecretString` so they never reach
//! a log line through `Debug`.

use crate::domain::error::SigtraderError;
use secrecy::{ExposeSecret, SecretString};

pub const ENV_API_KEY: &str = "OKX_API_KEY";
pub const ENV_API_SECRET: &str = "OKX_API_SECRET";
pub const ENV_PASSPHRASE: &str = "OKX_PASSPHRASE";

#[derive(Clone)]
pub struct OkxCredentials {
    api_key: String,
    secret: SecretString,
    passphrase: SecretString,
}

impl OkxCredentials {
    pub fn new(api_key: String, secret: String, passphrase: String) -> Self {
        Self {
            api_key,
            secret: SecretString::from(secret),
            passphrase: SecretString::from(passphrase),
        }
    }

    /// Load from `OKX_API_KEY`, `OKX_API_SECRET` and `OKX_PASSPHRASE`,
    /// reading a `.env` file first if one exists.
    pub fn from_env() -> Result<Self, SigtraderError> {
        dotenvy::dotenv().ok();

        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| SigtraderError::ConfigMissing {
                    section: "env".into(),
                    key: name.into(),
                })
        };

        Ok(Self::new(
            var(ENV_API_KEY)?,
            var(ENV_API_SECRET)?,
            var(ENV_PASSPHRASE)?,
        ))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Only for HMAC signing.
    pub fn expose_secret(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn expose_passphrase(&self) -> &str {
        self.passphrase.expose_secret()
    }
}

impl std::fmt::Debug for OkxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OkxCredentials")
            .field("api_key", &self.api_key)
            .field("secret", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}
