use std::sync::RwLock;

use tracing::debug;

use crate::core::disks::DiskProvider;
use crate::core::models::Disk;

/// A disk list held in memory and changed by whoever owns the volumes.
#[derive(Default)]
pub struct StaticDisks {
    disks: RwLock<Vec<Disk>>,
}

impl StaticDisks {
    pub fn new(disks: Vec<Disk>) -> Self {
        Self {
            disks: RwLock::new(disks),
        }
    }

    pub fn add_disk(&self, disk: Disk) {
        debug!(disk = %disk.name, "Disk added");
        if let Ok(mut disks) = self.disks.write() {
            disks.push(disk);
        }
    }

    pub fn remove_disk(&self, name: &str) {
        debug!(disk = %name, "Disk removed");
        if let Ok(mut disks) = self.disks.write() {
            disks.retain(|d| d.name != name);
        }
    }

    /// Mark a disk as mounted under `volume_name`, or unmounted with `None`.
    pub fn set_volume_name(&self, name: &str, volume_name: Option<&str>) {
        if let Ok(mut disks) = self.disks.write() {
            for disk in disks.iter_mut().filter(|d| d.name == name) {
                disk.volume_name = volume_name.map(str::to_string);
            }
        }
    }
}

impl DiskProvider for StaticDisks {
    fn mounted_disks(&self) -> Vec<Disk> {
        self.disks.read().map(|d| d.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_changes() {
        let provider = StaticDisks::default();
        assert!(provider.mounted_disks().is_empty());

        provider.add_disk(Disk::new("Scratch", Some("Scratch"), 64));
        provider.add_disk(Disk::new("Build", None, 128));

        let snapshot = provider.mounted_disks();
        assert_eq!(snapshot.len(), 2);

        provider.set_volume_name("Build", Some("Build Cache"));
        provider.remove_disk("Scratch");

        // earlier snapshots are unaffected
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].volume_name, None);

        let current = provider.mounted_disks();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].volume_name.as_deref(), Some("Build Cache"));
    }
}
