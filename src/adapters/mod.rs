use std::sync::Arc;

use crate::core::disks::DiskProvider;
use crate::core::models::Disk;

mod static_list;

pub use static_list::StaticDisks;

/// Disk provider for the disks remembered in the settings file.
pub fn get_provider(disks: &[Disk]) -> Arc<dyn DiskProvider> {
    Arc::new(StaticDisks::new(disks.to_vec()))
}
