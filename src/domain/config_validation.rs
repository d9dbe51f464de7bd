//! Configuration validation.
//!
//! Checks INI values before a backtest, sync, or live run touches anything.

use std::collections::HashMap;

use crate::domain::error::SigtraderError;
use crate::ports::config_port::ConfigPort;

pub const INSTANCE_SECTION_PREFIX: &str = "instance.";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    validate_initial_balance(config)
}

pub fn validate_exchange_config(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    if let Some(url) = config.get_string("exchange", "base_url")
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        return Err(SigtraderError::ConfigInvalid {
            section: "exchange".to_string(),
            key: "base_url".to_string(),
            reason: "base_url must start with http:// or https://".to_string(),
        });
    }
    let timeout = config.get_int("exchange", "timeout_secs", 10);
    if timeout < 1 {
        return Err(SigtraderError::ConfigInvalid {
            section: "exchange".to_string(),
            key: "timeout_secs".to_string(),
            reason: "timeout_secs must be at least 1".to_string(),
        });
    }
    Ok(())
}

pub fn validate_live_config(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    let lookback = config.get_int("live", "lookback", 200);
    if lookback < 1 {
        return Err(SigtraderError::ConfigInvalid {
            section: "live".to_string(),
            key: "lookback".to_string(),
            reason: "lookback must be at least 1".to_string(),
        });
    }
    let order_size = config.get_double("live", "order_size", 1.0);
    if !order_size.is_finite() || order_size <= 0.0 {
        return Err(SigtraderError::ConfigInvalid {
            section: "live".to_string(),
            key: "order_size".to_string(),
            reason: "order_size must be positive".to_string(),
        });
    }
    validate_exchange_config(config)?;
    for section in instance_sections(config) {
        validate_instance_section(config, &section)?;
    }
    validate_instance_ids(config)
}

fn validate_initial_balance(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    let value = config.get_double(
        "backtest",
        "initial_balance",
        crate::domain::backtest::DEFAULT_INITIAL_BALANCE,
    );
    if !value.is_finite() || value <= 0.0 {
        return Err(SigtraderError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "initial_balance".to_string(),
            reason: "initial_balance must be positive".to_string(),
        });
    }
    Ok(())
}

/// `[instance.<id>]` section names, ordered by numeric id. Sections whose
/// id does not parse come first.
pub fn instance_sections(config: &dyn ConfigPort) -> Vec<String> {
    let mut sections: Vec<(Option<i64>, String)> = config
        .sections()
        .into_iter()
        .filter(|s| s.starts_with(INSTANCE_SECTION_PREFIX))
        .map(|s| (instance_id(&s).ok(), s))
        .collect();
    sections.sort();
    sections.into_iter().map(|(_, s)| s).collect()
}

/// Every instance section must parse to a distinct id: `[instance.01]` and
/// `[instance.1]` are the same instance.
pub fn validate_instance_ids(config: &dyn ConfigPort) -> Result<(), SigtraderError> {
    let mut seen: HashMap<i64, String> = HashMap::new();
    for section in instance_sections(config) {
        let id = instance_id(&section)?;
        if let Some(first) = seen.insert(id, section.clone()) {
            return Err(SigtraderError::ConfigInvalid {
                section,
                key: "id".to_string(),
                reason: format!("instance id {id} is already used by [{first}]"),
            });
        }
    }
    Ok(())
}

/// Numeric id of an `[instance.<id>]` section.
pub fn instance_id(section: &str) -> Result<i64, SigtraderError> {
    section
        .strip_prefix(INSTANCE_SECTION_PREFIX)
        .and_then(|id| id.trim().parse::<i64>().ok())
        .ok_or_else(|| SigtraderError::ConfigInvalid {
            section: section.to_string(),
            key: "id".to_string(),
            reason: "instance section must be named [instance.<integer id>]".to_string(),
        })
}

pub fn validate_instance_section(
    config: &dyn ConfigPort,
    section: &str,
) -> Result<(), SigtraderError> {
    instance_id(section)?;
    for key in ["inst_id", "timeframe", "strategy"] {
        match config.get_string(section, key) {
            Some(v) if !v.trim().is_empty() => {}
            _ => {
                return Err(SigtraderError::ConfigMissing {
                    section: section.to_string(),
                    key: key.to_string(),
                });
            }
        }
    }
    let interval = config.get_int(section, "interval_sec", 0);
    if interval < 1 {
        return Err(SigtraderError::ConfigInvalid {
            section: section.to_string(),
            key: "interval_sec".to_string(),
            reason: "interval_sec must be at least 1".to_string(),
        });
    }
    Ok(())
}
