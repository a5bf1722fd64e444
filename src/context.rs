use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, ConfigStore};
use crate::core::ProgressTracker;
use crate::core::disks::DiskProvider;
use crate::core::paths::DEFAULT_VOLUMES_ROOT;
use crate::core::transfer_engine::TransferEngine;

/// Capabilities the sync engine works with, injected at construction.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn ConfigStore>,
    pub disks: Arc<dyn DiskProvider>,
    pub engine: Arc<dyn TransferEngine>,
    pub volumes_root: PathBuf,
    pub create_backup_folders: bool,
    pub progress: ProgressTracker,
}

impl AppContext {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        disks: Arc<dyn DiskProvider>,
        engine: Arc<dyn TransferEngine>,
    ) -> Self {
        Self {
            store,
            disks,
            engine,
            volumes_root: PathBuf::from(DEFAULT_VOLUMES_ROOT),
            create_backup_folders: false,
            progress: ProgressTracker::new(),
        }
    }

    /// Take the static settings (mount root, folder creation) from `config`.
    pub fn with_settings(mut self, config: &AppConfig) -> Self {
        self.volumes_root = config.volumes_root.clone();
        self.create_backup_folders = config.create_backup_folders;
        self
    }

    pub fn with_volumes_root(mut self, volumes_root: impl Into<PathBuf>) -> Self {
        self.volumes_root = volumes_root.into();
        self
    }

    pub fn with_create_backup_folders(mut self, enabled: bool) -> Self {
        self.create_backup_folders = enabled;
        self
    }
}
