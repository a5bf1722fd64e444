pub mod disks;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod outcome;
pub mod paths;
pub mod progress;
pub mod slug;
pub mod transfer_engine;
pub mod validator;

pub use disks::DiskProvider;
pub use error::SyncError;
pub use models::{Disk, Response, SyncDirection, TransferRequest};
pub use orchestrator::{
    DiskOutcome, DiskReport, DiskStatus, SkipReason, StatusReport, SyncOrchestrator, SyncReport,
    SyncStart,
};
pub use outcome::classify;
pub use paths::{resolve_backup_path, volume_mount_path};
pub use progress::{ActiveTransfer, ProgressTracker};
pub use slug::slug;
pub use validator::is_usable_directory;
