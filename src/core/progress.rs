//! In-memory progress tracking for running transfers.
//!
//! Entries are keyed by job id, so a restore and a backup of the same disk (or
//! two disks sharing a name) never overwrite each other. An entry is dropped
//! as soon as its transfer exits. Nothing here is persisted.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc};

use super::models::SyncDirection;
use super::transfer_engine::TransferStatus;

/// Latest known state of one running transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveTransfer {
    pub job_id: String,
    pub disk: String,
    pub direction: SyncDirection,
    pub status: TransferStatus,
}

/// Thread-safe store of the running transfers.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<RwLock<HashMap<String, ActiveTransfer>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, job_id: &str) -> Option<ActiveTransfer> {
        let map = self.inner.read().await;
        map.get(job_id).cloned()
    }

    /// Every running transfer, ordered by disk name.
    pub async fn snapshot(&self) -> Vec<ActiveTransfer> {
        let map = self.inner.read().await;
        let mut transfers: Vec<_> = map.values().cloned().collect();
        transfers.sort_by(|a, b| a.disk.cmp(&b.disk).then_with(|| a.job_id.cmp(&b.job_id)));
        transfers
    }

    pub async fn active_count(&self) -> usize {
        let map = self.inner.read().await;
        map.len()
    }

    /// Hand out a sender whose updates are recorded under `job_id`.
    ///
    /// The entry appears with the first update and is removed once every clone
    /// of the sender is dropped, which engines do when the copy exits.
    pub fn track(
        &self,
        job_id: &str,
        disk: &str,
        direction: SyncDirection,
    ) -> mpsc::Sender<TransferStatus> {
        let (tx, mut rx) = mpsc::channel(32);
        let inner = Arc::clone(&self.inner);
        let job_id = job_id.to_string();
        let disk = disk.to_string();

        tokio::spawn(async move {
            while let Some(status) = rx.recv().await {
                let mut map = inner.write().await;
                map.insert(
                    job_id.clone(),
                    ActiveTransfer {
                        job_id: job_id.clone(),
                        disk: disk.clone(),
                        direction,
                        status,
                    },
                );
            }
            inner.write().await.remove(&job_id);
        });

        tx
    }
}
