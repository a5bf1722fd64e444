use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single disk's sync.
///
/// Precondition failures are returned before any process is started. An
/// unconfigured sync root is not an error and never shows up here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("volume name not found for disk '{disk}'")]
    VolumeNameNotFound { disk: String },

    #[error("{} is not a valid directory", .path.display())]
    DirectoryNotValid { path: PathBuf },

    #[error("transfer exited with status {exit_code}: {stderr}")]
    TransferFailed { exit_code: i32, stderr: String },

    #[error("failed to launch {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Precondition failures may go away once the volume is mounted again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::VolumeNameNotFound { .. } | Self::DirectoryNotValid { .. }
        )
    }
}
