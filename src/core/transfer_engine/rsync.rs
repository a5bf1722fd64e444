use crate::core::error::SyncError;
use crate::core::models::{Response, TransferRequest};
use crate::core::transfer_engine::{
    TransferEngine, TransferHandle, TransferStatus, with_trailing_slash,
};
use regex::Regex;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    sync::mpsc,
};
use tracing::{Instrument, debug, error, info, info_span};

pub const DEFAULT_RSYNC_PATH: &str = "/usr/bin/rsync";

/// Mirror profile: stay on one filesystem, recurse, keep symlinks, permissions,
/// times, group, owner and extended attributes, be verbose, show progress, and
/// delete destination entries that the source does not have.
pub const MIRROR_ARGS: [&str; 3] = ["-xrlptgoEv", "--progress", "--delete"];

// Regex: "  12,345,678   45%  10.2MB/s    0:00:01"
static PROGRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([\d,]+)\s+(\d+)%").expect("progress pattern is valid"));

const READ_CHUNK: usize = 8 * 1024;

/// Minimum gap between two logged progress lines of one transfer.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_millis(500);

pub struct RsyncEngine {
    program: PathBuf,
}

impl Default for RsyncEngine {
    fn default() -> Self {
        Self::new(DEFAULT_RSYNC_PATH)
    }
}

impl RsyncEngine {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }
}

impl TransferEngine for RsyncEngine {
    fn start(
        &self,
        req: &TransferRequest,
        progress: Option<mpsc::Sender<TransferStatus>>,
    ) -> Result<TransferHandle, SyncError> {
        let source = with_trailing_slash(&req.source);
        let destination = with_trailing_slash(&req.destination);

        let span = info_span!(
            "rsync_mirror",
            job_id = %req.job_id,
            source = %source.display(),
            destination = %destination.display()
        );

        let child = Command::new(&self.program)
            .args(MIRROR_ARGS)
            .arg(&source)
            .arg(&destination)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SyncError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        span.in_scope(|| info!(pid = ?child.id(), "Mirror started"));

        let task = tokio::spawn(run_to_exit(child, progress).instrument(span));
        Ok(TransferHandle::new(req.job_id.clone(), task))
    }
}

async fn run_to_exit(mut child: Child, progress: Option<mpsc::Sender<TransferStatus>>) -> Response {
    if let Some(tx) = &progress {
        let _ = tx.send(TransferStatus::Ready).await;
    }

    // stderr is drained on its own task so a chatty stderr cannot stall stdout
    let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(read_all(stderr)));

    let output = match child.stdout.take() {
        Some(stdout) => read_stdout(stdout, progress.as_ref()).await,
        None => Vec::new(),
    };

    let error = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    let termination_status = match child.wait().await {
        Ok(status) => exit_code(status),
        Err(e) => {
            error!(error = %e, "Failed to wait for rsync");
            -1
        }
    };

    if termination_status == 0 {
        info!(status = termination_status, "Mirror finished");
    } else {
        info!(status = termination_status, "Mirror exited with non-zero status");
    }

    if let Some(tx) = &progress {
        let _ = tx
            .send(TransferStatus::Complete { termination_status })
            .await;
    }

    Response {
        output: String::from_utf8_lossy(&output).into_owned(),
        error: String::from_utf8_lossy(&error).into_owned(),
        termination_status,
    }
}

/// Buffer stdout verbatim while turning `--progress` lines into status updates.
async fn read_stdout<R>(mut reader: R, progress: Option<&mpsc::Sender<TransferStatus>>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut progress_log = ProgressLog::new(PROGRESS_LOG_INTERVAL);
    let mut output = Vec::new();
    let mut line_buffer = Vec::new();
    let mut current_file = String::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "Stopped reading rsync stdout");
                break;
            }
        };
        output.extend_from_slice(&chunk[..n]);

        for &b in &chunk[..n] {
            if b != b'\r' && b != b'\n' {
                line_buffer.push(b);
                continue;
            }
            if line_buffer.is_empty() {
                continue;
            }

            let line = String::from_utf8_lossy(&line_buffer).into_owned();
            line_buffer.clear();

            match parse_progress(&line) {
                Some((bytes_copied, percentage)) => {
                    if progress_log.due(Instant::now()) {
                        debug!(file = %current_file, bytes_copied, percentage, "Mirror progress");
                    }
                    if let Some(tx) = progress {
                        let _ = tx
                            .send(TransferStatus::InProgress {
                                bytes_copied,
                                percentage,
                                current_file: current_file.clone(),
                            })
                            .await;
                    }
                }
                None if !is_summary_line(&line) => current_file = line,
                None => {}
            }
        }
    }

    output
}

/// Spaces out the progress lines one transfer writes to the log. Every
/// update still goes to the status channel.
struct ProgressLog {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressLog {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    fn due(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

async fn read_all<R>(mut reader: R) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!(error = %e, "Stopped reading rsync stderr");
    }
    buf
}

/// `(bytes_copied, percentage)` from a `--progress` line.
fn parse_progress(line: &str) -> Option<(u64, u8)> {
    let capts = PROGRESS_RE.captures(line)?;
    let bytes_copied = capts.get(1)?.as_str().replace(',', "").parse().unwrap_or(0);
    let percentage = capts.get(2)?.as_str().parse().unwrap_or(0);
    Some((bytes_copied, percentage))
}

fn is_summary_line(line: &str) -> bool {
    const PREFIXES: [&str; 6] = [
        "sending incremental file list",
        "building file list",
        "sent ",
        "total size is",
        "deleting ",
        "created directory",
    ];
    PREFIXES.iter().any(|p| line.starts_with(p))
}

/// Exit code, or `128 + signal` when the process was killed.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}
