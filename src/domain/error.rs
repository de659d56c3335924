//! Domain error types.

use crate::domain::portfolio::PortfolioError;
use crate::domain::shard::ShardError;
use crate::ports::broker_port::BrokerError;

/// Top-level error type for btopt.
#[derive(Debug, thiserror::Error)]
pub enum BtoptError {
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

    #[error("no usable data for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("transient fetch failure for {symbol}: {reason}")]
    TransientFetch { symbol: String, reason: String },

    #[error("option chain lookup failed for {symbol}: {reason}")]
    OptionChain { symbol: String, reason: String },

    #[error("failed to write artifact {path}: {reason}")]
    Artifact { path: String, reason: String },

    #[error("artifact sync failed: {reason}")]
    Sync { reason: String },

    #[error(transparent)]
    Shard(#[from] ShardError),

    #[error(transparent)]
    Portfolio(#[from] PortfolioError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BtoptError {
    pub fn missing(section: &str, key: &str) -> Self {
        BtoptError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        BtoptError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BtoptError::TransientFetch { .. })
    }
}

impl From<&BtoptError> for std::process::ExitCode {
    fn from(err: &BtoptError) -> Self {
        let code: u8 = match err {
            BtoptError::Io(_) => 1,
            BtoptError::ConfigParse { .. }
            | BtoptError::ConfigMissing { .. }
            | BtoptError::ConfigInvalid { .. }
            | BtoptError::Shard(_) => 2,
            BtoptError::DataUnavailable { .. }
            | BtoptError::TransientFetch { .. }
            | BtoptError::OptionChain { .. } => 3,
            BtoptError::Artifact { .. } | BtoptError::Sync { .. } => 4,
            BtoptError::Portfolio(_) | BtoptError::Broker(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}
