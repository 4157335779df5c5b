//! Resident-memory sampling via process introspection.

use std::sync::{Mutex, PoisonError};

use sysinfo::{Pid, System};

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Placeholder written when no sample could be taken.
pub const MEMORY_UNAVAILABLE: &str = "unavailable";

/// Samples this process's resident set size.
///
/// Holds one `System` and refreshes only the current process on each sample.
pub struct MemorySampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Resident memory in bytes, or `None` when the OS won't say.
    pub fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|process| process.memory())
    }

    /// Current sample formatted as megabytes with one decimal place.
    pub fn sample_label(&self) -> String {
        format_megabytes(self.resident_bytes())
    }
}

pub fn format_megabytes(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => format!("{:.1} MB", bytes as f64 / BYTES_PER_MEGABYTE),
        None => MEMORY_UNAVAILABLE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(Some(0)), "0.0 MB");
        assert_eq!(format_megabytes(Some(1_572_864)), "1.5 MB");
        assert_eq!(format_megabytes(Some(536_870_912)), "512.0 MB");
        assert_eq!(format_megabytes(None), "unavailable");
    }

    #[test]
    fn test_sample_label_is_well_formed() {
        let label = MemorySampler::new().sample_label();
        assert!(label == MEMORY_UNAVAILABLE || label.ends_with(" MB"), "{label}");
    }
}
