use super::models::Disk;

/// Source of the currently known disks.
///
/// Every call is a fresh snapshot; the sync engine never holds on to it.
pub trait DiskProvider: Send + Sync {
    fn mounted_disks(&self) -> Vec<Disk>;
}
