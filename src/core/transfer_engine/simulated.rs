use crate::core::error::SyncError;
use crate::core::models::{Response, TransferRequest};
use crate::core::transfer_engine::{TransferEngine, TransferHandle, TransferStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};
use tracing::info;

/// Engine that pretends to mirror without touching the filesystem.
///
/// Each started job sleeps for the next delay in `delays` (cycling) and then
/// exits with `termination_status`.
pub struct SimulatedEngine {
    pub delays: Vec<Duration>,
    pub termination_status: i32,
    started: AtomicUsize,
    finished: Arc<AtomicUsize>,
    requests: Mutex<Vec<TransferRequest>>,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::with_delays(vec![Duration::from_millis(500)])
    }
}

impl SimulatedEngine {
    pub fn with_delays(delays: Vec<Duration>) -> Self {
        Self {
            delays,
            termination_status: 0,
            started: AtomicUsize::new(0),
            finished: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn exiting_with(mut self, termination_status: i32) -> Self {
        self.termination_status = termination_status;
        self
    }

    /// Number of jobs started so far.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of jobs that have exited so far.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Every request this engine received, in start order.
    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl TransferEngine for SimulatedEngine {
    fn start(
        &self,
        req: &TransferRequest,
        progress: Option<mpsc::Sender<TransferStatus>>,
    ) -> Result<TransferHandle, SyncError> {
        let index = self.started.fetch_add(1, Ordering::SeqCst);
        let delay = match self.delays.len() {
            0 => Duration::ZERO,
            n => self.delays[index % n],
        };
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req.clone());
        }

        let job_id = req.job_id.clone();
        let req = req.clone();
        let termination_status = self.termination_status;
        let finished = Arc::clone(&self.finished);

        info!(job_id = %req.job_id, ?delay, "(Simulated) Mirror started");

        let task = tokio::spawn(async move {
            if let Some(tx) = &progress {
                let _ = tx.send(TransferStatus::Ready).await;
            }

            sleep(delay).await;

            if let Some(tx) = &progress {
                let _ = tx
                    .send(TransferStatus::InProgress {
                        bytes_copied: 0,
                        percentage: 100,
                        current_file: String::new(),
                    })
                    .await;
                let _ = tx
                    .send(TransferStatus::Complete { termination_status })
                    .await;
            }

            finished.fetch_add(1, Ordering::SeqCst);

            Response {
                output: format!(
                    "(Simulated) {} -> {}\n",
                    req.source.display(),
                    req.destination.display()
                ),
                error: String::new(),
                termination_status,
            }
        });

        Ok(TransferHandle::new(job_id, task))
    }
}
