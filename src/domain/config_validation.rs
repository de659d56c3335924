//! Configuration validation.
//!
//! Runs before any fetch or write so a bad config fails fast. Only keys that
//! have no usable default are checked here; optional numeric keys fall back to
//! their defaults when they do not parse.

use crate::domain::error::BtoptError;
use crate::domain::strategy::TemplateKind;
use crate::domain::universe::UniverseSource;
use crate::ports::config_port::ConfigPort;

pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), BtoptError> {
    validate_universe(config)?;
    validate_shard(config)?;
    validate_execution(config)?;
    if is_options_mode(config)? {
        validate_options(config)?;
    }
    validate_output(config)?;
    validate_live(config)?;
    Ok(())
}

pub fn is_options_mode(config: &dyn ConfigPort) -> Result<bool, BtoptError> {
    match config.get_string("execution", "mode").as_deref().map(str::trim) {
        None | Some("equity") => Ok(false),
        Some("options") => Ok(true),
        Some(other) => Err(BtoptError::invalid(
            "execution",
            "mode",
            format!("mode must be equity or options, got '{other}'"),
        )),
    }
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .filter(|s| !s.trim().is_empty())
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, BtoptError> {
    non_empty(config, section, key).ok_or_else(|| BtoptError::missing(section, key))
}

fn validate_universe(config: &dyn ConfigPort) -> Result<(), BtoptError> {
    let source = match non_empty(config, "universe", "universe_source") {
        Some(s) => s
            .parse::<UniverseSource>()
            .map_err(|reason| BtoptError::invalid("universe", "universe_source", reason))?,
        None => UniverseSource::Curated,
    };
    if source == UniverseSource::File {
        require(config, "universe", "file")?;
    }
    Ok(())
}

fn validate_shard(config: &dyn ConfigPort) -> Result<(), BtoptError> {
    if config.get_int("shard", "shard_count", 1) < 1 {
        return Err(BtoptError::invalid(
            "shard",
            "shard_count",
            "shard_count must be at least 1",
        ));
    }
    if config.get_int("shard", "shard_index", 0) < 0 {
        return Err(BtoptError::invalid(
            "shard",
            "shard_index",
            "shard_index must be non-negative",
        ));
    }
    Ok(())
}

fn validate_execution(config: &dyn ConfigPort) -> Result<(), BtoptError> {
    if config.get_double("execution", "paper_equity", 100_000.0) <= 0.0 {
        return Err(BtoptError::invalid(
            "execution",
            "paper_equity",
            "paper_equity must be positive",
        ));
    }
    if config.get_int("execution", "max_positions", 10) < 1 {
        return Err(BtoptError::invalid(
            "execution",
            "max_positions",
            "max_positions must be at least 1",
        ));
    }
    for key in ["fee_per_share", "fee_per_contract", "slip_frac_of_half"] {
        if config.get_double("execution", key, 0.0) < 0.0 {
            return Err(BtoptError::invalid(
                "execution",
                key,
                format!("{key} must be non-negative"),
            ));
        }
    }
    Ok(())
}

fn validate_options(config: &dyn ConfigPort) -> Result<(), BtoptError> {
    let template = require(config, "options", "template")?;
    template
        .parse::<TemplateKind>()
        .map_err(|reason| BtoptError::invalid("options", "template", reason))?;

    for key in ["profit_target_pct", "max_loss_mult_credit", "time_stop_days"] {
        require(config, "options", key)?;
    }
    Ok(())
}

fn validate_output(config: &dyn ConfigPort) -> Result<(), BtoptError> {
    if config.get_bool("output", "sync", false) {
        require(config, "output", "bucket")?;
    }
    Ok(())
}

fn validate_live(config: &dyn ConfigPort) -> Result<(), BtoptError> {
    if config.get_bool("live", "place_orders", false) {
        require(config, "live", "broker")?;
    }
    Ok(())
}
