//! Ranked-universe output: a plain ticker list plus a diagnostics CSV.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::domain::error::BtoptError;
use crate::domain::universe::RankedSymbol;

fn artifact_error(path: &Path, err: impl std::fmt::Display) -> BtoptError {
    BtoptError::Artifact {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Write `{out}` (one ticker per line, no header) and `{out}.csv` with header
/// `ticker,med_price,med_dollar,rank`. Returns both paths.
pub fn write_ranked_universe(
    out: &Path,
    ranked: &[RankedSymbol],
) -> Result<(PathBuf, PathBuf), BtoptError> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| artifact_error(parent, e))?;
    }

    let list: String = ranked.iter().map(|r| format!("{}\n", r.ticker)).collect();
    fs::write(out, list).map_err(|e| artifact_error(out, e))?;

    let csv_path = out.with_extension("csv");
    let mut wtr = csv::Writer::from_path(&csv_path).map_err(|e| artifact_error(&csv_path, e))?;
    wtr.write_record(["ticker", "med_price", "med_dollar", "rank"])
        .map_err(|e| artifact_error(&csv_path, e))?;
    for r in ranked {
        wtr.write_record([
            r.ticker.clone(),
            r.med_price.to_string(),
            r.med_dollar.to_string(),
            r.rank.to_string(),
        ])
        .map_err(|e| artifact_error(&csv_path, e))?;
    }
    wtr.flush().map_err(|e| artifact_error(&csv_path, e))?;

    info!(count = ranked.len(), path = %out.display(), "wrote ranked universe");
    Ok((out.to_path_buf(), csv_path))
}
