//! certificate serial number allocation.

use std::sync::atomic::{AtomicU64, Ordering};

/// allocates strictly increasing certificate serial numbers.
///
/// serials start at 1 (zero is reserved) and are unique across concurrent
/// callers for the lifetime of the process.
#[derive(Debug)]
pub struct SerialAllocator {
    next: AtomicU64,
}

impl SerialAllocator {
    /// create an allocator whose first serial is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// allocate the next serial.
    pub fn next_serial(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SerialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn serials_start_at_one() {
        let serials = SerialAllocator::new();
        assert_eq!(serials.next_serial(), 1);
        assert_eq!(serials.next_serial(), 2);
    }

    #[test]
    fn serials_are_never_zero() {
        let serials = SerialAllocator::new();
        for _ in 0..1000 {
            assert_ne!(serials.next_serial(), 0);
        }
    }

    #[test]
    fn concurrent_callers_get_distinct_serials() {
        let serials = Arc::new(SerialAllocator::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let serials = Arc::clone(&serials);
            handles.push(std::thread::spawn(move || {
                (0..500).map(|_| serials.next_serial()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for serial in handle.join().expect("thread panicked") {
                assert!(seen.insert(serial), "serial {serial} allocated twice");
            }
        }
        assert_eq!(seen.len(), 8 * 500);
    }
}
