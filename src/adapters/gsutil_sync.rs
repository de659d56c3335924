//! Object-storage sync through the `gsutil` command-line tool.

use std::path::PathBuf;
use std::process::Command;

use tracing::info;

use crate::domain::error::BtoptError;
use crate::ports::artifact_port::ArtifactSyncPort;

pub struct GsutilSync {
    local_dir: PathBuf,
    bucket: String,
    program: String,
}

impl GsutilSync {
    pub fn new(local_dir: PathBuf, bucket: impl Into<String>) -> Self {
        Self {
            local_dir,
            bucket: bucket.into(),
            program: "gsutil".to_string(),
        }
    }

    /// Override the executable, e.g. a wrapper script.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn destination(&self, prefix: &str) -> String {
        let bucket = self.bucket.trim_start_matches("gs://").trim_end_matches('/');
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("gs://{}/", bucket)
        } else {
            format!("gs://{}/{}/", bucket, prefix)
        }
    }

    /// `-m rsync -r {dir} gs://{bucket}/{prefix}/`
    pub fn args(&self, prefix: &str) -> Vec<String> {
        vec![
            "-m".to_string(),
            "rsync".to_string(),
            "-r".to_string(),
            self.local_dir.display().to_string(),
            self.destination(prefix),
        ]
    }
}

impl ArtifactSyncPort for GsutilSync {
    fn sync(&self, prefix: &str) -> Result<(), BtoptError> {
        let args = self.args(prefix);
        info!(program = %self.program, args = ?args, "syncing artifacts");

        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .map_err(|e| BtoptError::Sync {
                reason: format!("failed to launch {}: {}", self.program, e),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(BtoptError::Sync {
                reason: format!("{} exited with {}", self.program, status),
            })
        }
    }
}
