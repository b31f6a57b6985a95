//! Busy flags guarding compile and deploy runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A shareable "in progress" flag.
///
/// Releasing is idempotent: only the first release after an acquire counts,
/// so a timeout guard and a normal completion can race harmlessly.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag {
    inner: Arc<FlagState>,
}

#[derive(Debug, Default)]
struct FlagState {
    busy: AtomicBool,
    releases: AtomicUsize,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    /// Set the flag if it is clear. The returned guard releases it on drop.
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.inner
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard { flag: self.clone() })
    }

    /// Clear the flag. Returns whether it was set.
    pub fn release(&self) -> bool {
        let was_busy = self.inner.busy.swap(false, Ordering::SeqCst);
        if was_busy {
            self.inner.releases.fetch_add(1, Ordering::SeqCst);
        }
        was_busy
    }

    /// How many times the flag went from set to clear.
    pub fn release_count(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }
}

/// Holds a [`BusyFlag`] set until dropped.
#[derive(Debug)]
pub struct BusyGuard {
    flag: BusyFlag,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_is_exclusive() {
        let flag = BusyFlag::new();
        let guard = flag.try_acquire().expect("flag should be free");
        assert!(flag.is_busy());
        assert!(flag.try_acquire().is_none());

        drop(guard);
        assert!(!flag.is_busy());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn test_double_release_counts_once() {
        let flag = BusyFlag::new();
        let guard = flag.try_acquire().unwrap();

        assert!(flag.release());
        assert!(!flag.release());
        drop(guard);

        assert!(!flag.is_busy());
        assert_eq!(flag.release_count(), 1);
    }
}
