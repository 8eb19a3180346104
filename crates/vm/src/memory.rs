//! Heap allocation accounting.
//!
//! Every heap object and frame charges its footprint here when it is created
//! and releases it when the collector sweeps it. A nonzero residue at VM
//! teardown indicates a leak and is logged as an error.

/// Running allocation counters for one VM.
#[derive(Debug, Default, Clone)]
pub struct MemoryCounters {
    allocated: usize,
    peak: usize,
}

impl MemoryCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Charges `size` bytes and updates the peak.
    pub fn allocate(&mut self, size: usize) {
        self.allocated += size;
        self.peak = self.peak.max(self.allocated);
    }

    /// Releases `size` bytes.
    pub fn release(&mut self, size: usize) {
        if size > self.allocated {
            log::error!(
                target: "ox_mem",
                "release of {size}B exceeds allocated {}B",
                self.allocated
            );
            self.allocated = 0;
        } else {
            self.allocated -= size;
        }
    }

    /// Bytes currently accounted to live objects.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// High-water mark of accounted bytes.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Emits the teardown report.
    pub(crate) fn report(&self) {
        log::debug!(target: "ox_mem", "maximum allocated memory: {}B", self.peak);

        if self.allocated != 0 {
            log::error!(target: "ox_mem", "unfreed memory: {}B", self.allocated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_release() {
        let mut mem = MemoryCounters::new();

        mem.allocate(100);
        mem.allocate(50);
        assert_eq!(mem.allocated(), 150);
        assert_eq!(mem.peak(), 150);

        mem.release(100);
        assert_eq!(mem.allocated(), 50);
        assert_eq!(mem.peak(), 150);

        mem.allocate(10);
        assert_eq!(mem.peak(), 150);
    }

    #[test]
    fn test_release_saturates() {
        let mut mem = MemoryCounters::new();

        mem.allocate(10);
        mem.release(100);
        assert_eq!(mem.allocated(), 0);
    }
}
