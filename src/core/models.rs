use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A RAM-backed volume as seen by the sync engine.
///
/// `volume_name` is `None` while the volume is not mounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub name: String,
    #[serde(default)]
    pub volume_name: Option<String>,
    #[serde(default)]
    pub capacity: u64,
}

impl Disk {
    pub fn new(name: impl Into<String>, volume_name: Option<&str>, capacity: u64) -> Self {
        Self {
            name: name.into(),
            volume_name: volume_name.map(str::to_string),
            capacity,
        }
    }
}

/// What a finished bulk-copy process said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Everything the process wrote to stdout.
    pub output: String,
    /// Everything the process wrote to stderr.
    pub error: String,
    /// The process exit code.
    pub termination_status: i32,
}

/// One mirror invocation.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub job_id: String,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl TransferRequest {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            job_id: uuid::Uuid::now_v7().to_string(),
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Direction of a sync, from the live volume's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Backup folder into the live volume.
    Restore,
    /// Live volume into the backup folder.
    Backup,
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restore => write!(f, "restore"),
            Self::Backup => write!(f, "backup"),
        }
    }
}
