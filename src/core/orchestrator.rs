//! Per-disk restore/backup and the all-disks backup fan-out.
//!
//! Each sync checks its preconditions in a fixed order before anything is
//! started: sync root configured, backup folder present, volume mounted, mount
//! point a directory. Only then is a mirror launched. In the multi-disk
//! operations a failing disk is reported and skipped; it never stops the others.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::core::error::SyncError;
use crate::core::models::{Disk, Response, SyncDirection, TransferRequest};
use crate::core::outcome::classify;
use crate::core::paths::{resolve_backup_path, volume_mount_path};
use crate::core::slug::slug;
use crate::core::transfer_engine::TransferHandle;
use crate::core::validator::is_usable_directory;

/// Why a disk was left alone. Neither case is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No sync root is set.
    NotConfigured,
    /// The disk's backup folder does not exist (or is not a directory).
    NoBackupFolder,
}

/// Result of asking for one disk to be synced.
#[derive(Debug)]
pub enum SyncStart {
    Skipped(SkipReason),
    Started(TransferHandle),
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DiskOutcome {
    Skipped {
        reason: SkipReason,
    },
    Failed {
        #[serde(serialize_with = "display")]
        error: SyncError,
    },
    Finished {
        response: Response,
    },
}

#[derive(Debug, Serialize)]
pub struct DiskReport {
    pub disk: String,
    #[serde(flatten)]
    pub outcome: DiskOutcome,
}

/// Outcome of a multi-disk sync, produced once every started transfer exited.
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub direction: SyncDirection,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub disks: Vec<DiskReport>,
}

impl SyncReport {
    /// Number of transfers that ran to exit.
    pub fn finished_count(&self) -> usize {
        self.disks
            .iter()
            .filter(|d| matches!(d.outcome, DiskOutcome::Finished { .. }))
            .count()
    }

    /// Precondition failures and non-zero transfer exits, per disk.
    pub fn failures(&self) -> Vec<(&str, String)> {
        self.disks
            .iter()
            .filter_map(|d| match &d.outcome {
                DiskOutcome::Failed { error } => Some((d.disk.as_str(), error.to_string())),
                DiskOutcome::Finished { response } => classify(response)
                    .err()
                    .map(|e| (d.disk.as_str(), e.to_string())),
                DiskOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    /// `TransferFailed` for every transfer that exited non-zero.
    pub fn transfer_failures(&self) -> Vec<(&str, SyncError)> {
        self.disks
            .iter()
            .filter_map(|d| match &d.outcome {
                DiskOutcome::Finished { response } => {
                    classify(response).err().map(|e| (d.disk.as_str(), e))
                }
                _ => None,
            })
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().is_empty()
    }
}

/// One disk as the sync engine currently sees it.
#[derive(Debug, Serialize)]
pub struct DiskStatus {
    pub name: String,
    pub capacity: u64,
    /// Mount point, when the disk has a volume name.
    pub mount: Option<PathBuf>,
    pub mounted: bool,
    /// Backup folder, when a sync root is configured.
    pub backup: Option<PathBuf>,
    pub backup_present: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// `None` when no sync root is configured.
    pub sync_root: Option<String>,
    pub disks: Vec<DiskStatus>,
}

fn display<S: Serializer>(error: &SyncError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Drives restores and backups for the disks in an [`AppContext`].
///
/// Transfers run as tokio tasks, so every method must be called from within a
/// tokio runtime.
#[derive(Clone)]
pub struct SyncOrchestrator {
    ctx: AppContext,
}

impl SyncOrchestrator {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Backup folder for `disk` under the sync root as currently configured.
    pub fn backup_path(&self, disk: &Disk) -> Option<PathBuf> {
        resolve_backup_path(&self.ctx.store.sync_root(), disk)
    }

    /// Where every known disk is mounted and backed up. Nothing is started.
    pub fn status(&self) -> StatusReport {
        let root = self.ctx.store.sync_root();
        let disks = self
            .ctx
            .disks
            .mounted_disks()
            .into_iter()
            .map(|disk| {
                let mount = disk
                    .volume_name
                    .as_deref()
                    .map(|volume| volume_mount_path(&self.ctx.volumes_root, volume));
                let backup = resolve_backup_path(&root, &disk);
                DiskStatus {
                    mounted: mount.as_deref().is_some_and(is_usable_directory),
                    backup_present: backup.as_deref().is_some_and(is_usable_directory),
                    name: disk.name,
                    capacity: disk.capacity,
                    mount,
                    backup,
                }
            })
            .collect();

        StatusReport {
            sync_root: (!root.is_empty()).then_some(root),
            disks,
        }
    }

    /// Mirror the disk's backup folder onto the live volume.
    ///
    /// **Destructive:** files on the volume that the backup lacks are deleted.
    /// The returned handle may be dropped; the copy still runs to completion.
    pub fn restore_one(&self, disk: &Disk) -> Result<SyncStart, SyncError> {
        self.sync_one(disk, SyncDirection::Restore)
    }

    /// Mirror the live volume onto the disk's backup folder.
    ///
    /// **Destructive:** files in the backup folder that the volume lacks are
    /// deleted. Wait on the returned handle to learn when the copy exited.
    ///
    /// # Data loss with an empty slug
    ///
    /// A disk whose name has no folder-safe characters (see
    /// [`slug`](crate::core::slug::slug)) backs up to the sync root itself.
    /// The mirror then deletes every other disk's backup folder under that
    /// root. Rename such a disk before backing it up.
    pub fn backup_one(&self, disk: &Disk) -> Result<SyncStart, SyncError> {
        self.sync_one(disk, SyncDirection::Backup)
    }

    /// Start a restore for every known disk without waiting for any of them.
    pub fn restore_all(&self) -> Vec<(Disk, Result<SyncStart, SyncError>)> {
        self.ctx
            .disks
            .mounted_disks()
            .into_iter()
            .map(|disk| {
                let start = self.restore_one(&disk);
                (disk, start)
            })
            .collect()
    }

    /// Restore every known disk and wait until every started copy exited.
    pub async fn restore_all_and_wait(&self) -> SyncReport {
        let started_at = Utc::now();
        let starts = self.restore_all();
        collect(SyncDirection::Restore, started_at, starts).await
    }

    /// Back up every known disk concurrently.
    ///
    /// Resolves exactly once, after every started transfer has exited,
    /// whatever its exit status. With no eligible disk it resolves right away.
    pub async fn backup_all(&self) -> SyncReport {
        let started_at = Utc::now();
        let disks = self.ctx.disks.mounted_disks();
        info!(disks = disks.len(), "Backing up all disks");

        let starts = disks
            .into_iter()
            .map(|disk| {
                let start = self.backup_one(&disk);
                (disk, start)
            })
            .collect();

        collect(SyncDirection::Backup, started_at, starts).await
    }

    /// Run [`backup_all`](Self::backup_all) on its own tokio task.
    ///
    /// The report is delivered once, on the returned receiver, so the caller
    /// picks the context it is handled on.
    pub fn spawn_backup_all(&self) -> oneshot::Receiver<SyncReport> {
        let (tx, rx) = oneshot::channel();
        let orchestrator = self.clone();

        tokio::spawn(async move {
            let report = orchestrator.backup_all().await;
            let _ = tx.send(report);
        });

        rx
    }

    fn sync_one(&self, disk: &Disk, direction: SyncDirection) -> Result<SyncStart, SyncError> {
        let Some(backup_path) = self.backup_path(disk) else {
            debug!(disk = %disk.name, %direction, "No sync root configured, nothing to do");
            return Ok(SyncStart::Skipped(SkipReason::NotConfigured));
        };

        if slug(&disk.name).is_empty() {
            warn!(
                disk = %disk.name,
                path = %backup_path.display(),
                "Disk name has no folder-safe characters, its backup folder is the sync root itself"
            );
        }

        let mut create_folder = false;
        if !is_usable_directory(&backup_path) {
            if direction == SyncDirection::Backup && self.ctx.create_backup_folders {
                create_folder = true;
            } else {
                debug!(
                    disk = %disk.name,
                    %direction,
                    path = %backup_path.display(),
                    "No backup folder, nothing to do"
                );
                return Ok(SyncStart::Skipped(SkipReason::NoBackupFolder));
            }
        }

        let volume_name = disk.volume_name.as_deref().ok_or_else(|| {
            warn!(disk = %disk.name, %direction, "Volume name not found");
            SyncError::VolumeNameNotFound {
                disk: disk.name.clone(),
            }
        })?;

        let mount_path = volume_mount_path(&self.ctx.volumes_root, volume_name);
        if !is_usable_directory(&mount_path) {
            warn!(disk = %disk.name, path = %mount_path.display(), "Mount point is not a directory");
            return Err(SyncError::DirectoryNotValid { path: mount_path });
        }

        if create_folder {
            if let Err(e) = std::fs::create_dir_all(&backup_path) {
                warn!(path = %backup_path.display(), error = %e, "Failed to create backup folder");
            }
            if !is_usable_directory(&backup_path) {
                return Err(SyncError::DirectoryNotValid { path: backup_path });
            }
            info!(disk = %disk.name, path = %backup_path.display(), "Created backup folder");
        }

        let req = match direction {
            SyncDirection::Restore => TransferRequest::new(backup_path, mount_path),
            SyncDirection::Backup => TransferRequest::new(mount_path, backup_path),
        };

        info!(
            disk = %disk.name,
            %direction,
            job_id = %req.job_id,
            source = %req.source.display(),
            destination = %req.destination.display(),
            "Starting mirror"
        );

        let progress = self.ctx.progress.track(&req.job_id, &disk.name, direction);
        let handle = self.ctx.engine.start(&req, Some(progress))?;
        Ok(SyncStart::Started(handle))
    }
}

/// Wait for every started transfer and assemble the report.
async fn collect(
    direction: SyncDirection,
    started_at: DateTime<Utc>,
    starts: Vec<(Disk, Result<SyncStart, SyncError>)>,
) -> SyncReport {
    let mut disks = Vec::with_capacity(starts.len());
    let mut pending = Vec::new();

    for (disk, start) in starts {
        match start {
            Ok(SyncStart::Started(handle)) => pending.push((disk.name, handle)),
            Ok(SyncStart::Skipped(reason)) => disks.push(DiskReport {
                disk: disk.name,
                outcome: DiskOutcome::Skipped { reason },
            }),
            Err(error) => {
                warn!(disk = %disk.name, %direction, error = %error, "Disk skipped");
                disks.push(DiskReport {
                    disk: disk.name,
                    outcome: DiskOutcome::Failed { error },
                });
            }
        }
    }

    let started = pending.len();
    for (disk, handle) in pending {
        let response = handle.wait().await;
        debug!(disk = %disk, status = response.termination_status, "Transfer exited");
        disks.push(DiskReport {
            disk,
            outcome: DiskOutcome::Finished { response },
        });
    }

    let report = SyncReport {
        direction,
        started_at,
        finished_at: Utc::now(),
        disks,
    };

    info!(
        %direction,
        started,
        finished = report.finished_count(),
        "All transfers finished"
    );

    report
}
