//! Live trading: per-instance polling cycles and their scheduler.

pub mod cycle;
pub mod registry;

pub use cycle::{run_cycle, CycleConfig, CycleContext, CycleOutcome, TradingInstance};
pub use registry::{run_guarded_cycle, InstanceRegistry};
