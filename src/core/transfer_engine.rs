//! Transfer engines: the processes that actually mirror one directory onto another.
//!
//! A transfer is **destructive**: the destination ends up an exact replica of
//! the source, and anything in the destination that the source lacks is deleted.
//!
//! Starting a transfer returns as soon as the copy has been launched. The
//! returned [`TransferHandle`] is the task that yields the [`Response`] once the
//! copy has exited. Engines never judge the exit status; see
//! [`crate::core::outcome`] for that.

pub mod rsync;
pub mod simulated;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::core::error::SyncError;
use crate::core::models::{Response, TransferRequest};

pub use rsync::RsyncEngine;
pub use simulated::SimulatedEngine;

/// Live status of a running transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransferStatus {
    Ready,
    InProgress {
        bytes_copied: u64,
        percentage: u8,
        current_file: String,
    },
    Complete {
        termination_status: i32,
    },
}

pub trait TransferEngine: Send + Sync {
    /// Launch a mirror of `req.source` onto `req.destination`.
    ///
    /// Returns once the copy is running. Status updates are sent on `progress`
    /// when a sender is supplied; the sender is dropped when the copy exits.
    fn start(
        &self,
        req: &TransferRequest,
        progress: Option<mpsc::Sender<TransferStatus>>,
    ) -> Result<TransferHandle, SyncError>;
}

/// A running transfer.
///
/// Dropping the handle (or calling [`detach`](Self::detach)) does not stop the
/// copy; it runs to completion and its result is discarded.
#[derive(Debug)]
pub struct TransferHandle {
    job_id: String,
    task: JoinHandle<Response>,
}

impl TransferHandle {
    pub fn new(job_id: impl Into<String>, task: JoinHandle<Response>) -> Self {
        Self {
            job_id: job_id.into(),
            task,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Wait for the copy to exit.
    ///
    /// A transfer task that panicked is still reported, with status `-1` and
    /// the panic text as its error output.
    pub async fn wait(self) -> Response {
        match self.task.await {
            Ok(response) => response,
            Err(e) => {
                error!(job_id = %self.job_id, error = %e, "Transfer task did not finish cleanly");
                Response {
                    output: String::new(),
                    error: e.to_string(),
                    termination_status: -1,
                }
            }
        }
    }

    /// Run `callback` exactly once, on a tokio worker task, after the copy exits.
    pub fn on_complete<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Response) + Send + 'static,
    {
        tokio::spawn(async move { callback(self.wait().await) })
    }

    /// Let the copy run without observing its result.
    pub fn detach(self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransferEngineType {
    #[default]
    Rsync,
    Simulated,
}

pub fn create_engine(kind: TransferEngineType, rsync_path: &Path) -> Arc<dyn TransferEngine> {
    match kind {
        TransferEngineType::Rsync => Arc::new(RsyncEngine::new(rsync_path)),
        TransferEngineType::Simulated => Arc::new(SimulatedEngine::default()),
    }
}

/// `path` with exactly one trailing `/`, so the copy targets directory contents.
pub(crate) fn with_trailing_slash(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    if !raw.as_encoded_bytes().ends_with(b"/") {
        raw.push("/");
    }
    PathBuf::from(raw)
}
