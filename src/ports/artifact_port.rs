//! Artifact persistence and object-storage sync port traits.

use std::path::PathBuf;

use crate::domain::backtest::SymbolResult;
use crate::domain::error::BtoptError;
use crate::domain::orchestrator::SymbolError;
use crate::domain::shard::Shard;

pub trait ArtifactPort {
    /// Persist every trade of every parameterization for one symbol.
    fn write_symbol_trades(
        &self,
        result: &SymbolResult,
        timeframe: &str,
    ) -> Result<PathBuf, BtoptError>;

    /// Persist the rollups and per-symbol errors of a finished shard.
    fn write_shard_summary(
        &self,
        shard: &Shard,
        results: &[SymbolResult],
        errors: &[SymbolError],
    ) -> Result<Vec<PathBuf>, BtoptError>;
}

pub trait ArtifactSyncPort {
    /// Push the local artifact directory to remote storage under `prefix`.
    fn sync(&self, prefix: &str) -> Result<(), BtoptError>;
}
