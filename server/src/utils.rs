use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide id source for planets and units. Ids start at 1 and are
/// never handed out twice.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocates `count` consecutive fresh ids.
    pub fn take(&self, count: u32) -> Vec<u64> {
        (0..count).map(|_| self.next_id()).collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// `round(value * percentage / 100)` with halves rounded away from zero,
/// computed without floating point.
pub fn percentage_of(value: u32, percentage: u32) -> u32 {
    let scaled = u64::from(value) * u64::from(percentage.min(100));
    ((scaled * 2 + 100) / 200) as u32
}
