// Storage and memory usage for the overlay and metadata

use std::path::Path;

use serde::Serialize;
use sysinfo::{Disks, System};

/// Byte counts for a storage volume or system memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl UsageStats {
    pub fn new(total_bytes: u64, free_bytes: u64) -> Self {
        let free_bytes = free_bytes.min(total_bytes);
        Self {
            total_bytes,
            used_bytes: total_bytes - free_bytes,
            free_bytes,
        }
    }

    pub fn used_gb(&self) -> f64 {
        self.used_bytes as f64 / 1e9
    }

    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / 1e9
    }

    pub fn used_mb(&self) -> f64 {
        self.used_bytes as f64 / 1e6
    }

    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / 1e6
    }
}

/// Reusable sysinfo handles
pub struct StatsProbe {
    system: System,
    disks: Disks,
}

impl Default for StatsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            disks: Disks::new_with_refreshed_list(),
        }
    }

    pub fn memory(&mut self) -> UsageStats {
        self.system.refresh_memory();
        UsageStats::new(self.system.total_memory(), self.system.available_memory())
    }

    /// Usage of the volume holding `path` (the mount with the longest matching prefix)
    pub fn storage_for(&mut self, path: &Path) -> UsageStats {
        self.disks.refresh(true);
        let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        self.disks
            .list()
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| UsageStats::new(disk.total_space(), disk.available_space()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_is_total_minus_free() {
        let s = UsageStats::new(64_000_000_000, 16_000_000_000);
        assert_eq!(s.used_bytes, 48_000_000_000);
        assert!((s.used_gb() - 48.0).abs() < 1e-9);

        // Free larger than total is clamped
        let s = UsageStats::new(10, 20);
        assert_eq!(s.used_bytes, 0);
        assert_eq!(s.free_bytes, 10);
    }

    #[test]
    fn memory_probe_reports_something() {
        let mut probe = StatsProbe::new();
        let mem = probe.memory();
        assert!(mem.total_bytes > 0);
        assert!(mem.used_bytes <= mem.total_bytes);
    }
}
