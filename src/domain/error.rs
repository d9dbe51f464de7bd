//! Domain error types.

/// Top-level error type for sigtrader.
#[derive(Debug, thiserror::Error)]
pub enum SigtraderError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("rule parse error: {reason}")]
    RuleParse { reason: String },

    #[error("invalid rule: {reason}")]
    RuleInvalid { reason: String },

    #[error("no data for {what}")]
    NoData { what: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("simulation failed: {reason}")]
    Simulation { reason: String },

    #[error("network error: {reason}")]
    Network { reason: String },

    #[error("exchange error {code}: {message}")]
    Exchange { code: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SigtraderError {
    /// Errors a live cycle can expect to clear up on a later tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SigtraderError::Network { .. }
                | SigtraderError::Exchange { .. }
                | SigtraderError::NoData { .. }
        )
    }
}

impl From<&SigtraderError> for std::process::ExitCode {
    fn from(err: &SigtraderError) -> Self {
        let code: u8 = match err {
            SigtraderError::Io(_) => 1,
            SigtraderError::ConfigParse { .. }
            | SigtraderError::ConfigMissing { .. }
            | SigtraderError::ConfigInvalid { .. } => 2,
            SigtraderError::Database { .. } | SigtraderError::DatabaseQuery { .. } => 3,
            SigtraderError::RuleParse { .. } | SigtraderError::RuleInvalid { .. } => 4,
            SigtraderError::NoData { .. } => 5,
            SigtraderError::Network { .. } | SigtraderError::Exchange { .. } => 6,
            SigtraderError::InvalidInput { .. } | SigtraderError::Simulation { .. } => 7,
        };
        std::process::ExitCode::from(code)
    }
}
