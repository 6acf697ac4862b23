//! Storage allocation statistics.

use crate::util::size::format_bytes;

/// Aggregated storage and map-range statistics.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Storages created over the allocator lifetime.
    pub storages_created: u64,

    /// Storages destroyed over the allocator lifetime.
    pub storages_destroyed: u64,

    /// Map ranges opened.
    pub maps: u64,

    /// Map ranges released.
    pub unmaps: u64,

    /// Reservations carved from map heads.
    pub reservations: u64,

    /// Bytes claimed by reservations.
    pub bytes_reserved: u64,

    /// Bytes written through sub-allocations.
    pub bytes_written: u64,

    /// Reservations and sub-allocations refused for lack of space.
    pub failed_allocs: u64,

    /// Highest head cursor seen when a map range was released.
    pub peak_map_used: usize,
}

impl StorageStats {
    /// Create empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storages still alive.
    pub fn live_storages(&self) -> u64 {
        self.storages_created.saturating_sub(self.storages_destroyed)
    }

    /// Map ranges still open.
    pub fn live_maps(&self) -> u64 {
        self.maps.saturating_sub(self.unmaps)
    }

    /// Average reservation size in bytes.
    pub fn average_reservation(&self) -> f64 {
        if self.reservations == 0 {
            return 0.0;
        }
        self.bytes_reserved as f64 / self.reservations as f64
    }
}

impl std::fmt::Display for StorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Storage Statistics:")?;
        writeln!(f, "  Storages created:   {}", self.storages_created)?;
        writeln!(f, "  Storages destroyed: {}", self.storages_destroyed)?;
        writeln!(f, "  Live storages:      {}", self.live_storages())?;
        writeln!(f, "  Maps / unmaps:      {} / {}", self.maps, self.unmaps)?;
        writeln!(f, "  Reservations:       {}", self.reservations)?;
        writeln!(f, "  Bytes reserved:     {}", format_bytes(self.bytes_reserved as usize))?;
        writeln!(f, "  Bytes written:      {}", format_bytes(self.bytes_written as usize))?;
        writeln!(f, "  Failed allocs:      {}", self.failed_allocs)?;
        writeln!(f, "  Peak map used:      {}", format_bytes(self.peak_map_used))?;
        Ok(())
    }
}
