#[cfg(not(feature = "portable-atomic"))]
use core::sync::atomic::{fence, AtomicUsize, Ordering};
#[cfg(feature = "portable-atomic")]
use portable_atomic::{fence, AtomicUsize, Ordering};

const MAX_REFCOUNT: usize = isize::MAX as usize;
#[cfg(not(feature = "abort-on-refcount-overflow"))]
const SATURATED_REFCOUNT: usize = (isize::MIN / 2) as usize;

/// An atomic reference count starting at 1.
///
/// `unref` elides the atomic read-modify-write when an acquire load already
/// shows a unique owner, so dropping an unshared object costs a single load.
pub(crate) struct RefCount {
    count: AtomicUsize,
}

impl RefCount {
    pub(crate) const fn new() -> Self {
        Self {
            count: AtomicUsize::new(1),
        }
    }

    /// Increments the count.
    pub(crate) fn incr(&self) {
        // See `Arc` documentation
        let old_count = self.count.fetch_add(1, Ordering::Relaxed);
        if old_count > MAX_REFCOUNT {
            // Saturate the refcount in no_std, as in Linux refcount
            #[cfg(feature = "abort-on-refcount-overflow")]
            crate::utils::abort();
            #[cfg(not(feature = "abort-on-refcount-overflow"))]
            self.count.store(SATURATED_REFCOUNT, Ordering::Relaxed);
        }
    }

    /// Decrements the count, returning `true` when it reaches zero and the
    /// object may be destroyed. The final decrement synchronizes-with every
    /// prior `unref`, so the destruction observes all earlier mutations.
    pub(crate) fn decr(&self) -> bool {
        // Avoid the read-modify-write when this is already the only owner.
        if self.count.load(Ordering::Acquire) == 1 {
            return true;
        }
        let prev_count = self.count.fetch_sub(1, Ordering::Release);
        if prev_count == 1 {
            fence(Ordering::Acquire);
            return true;
        }
        #[cfg(not(feature = "abort-on-refcount-overflow"))]
        if prev_count > MAX_REFCOUNT {
            self.count.store(SATURATED_REFCOUNT, Ordering::Relaxed);
        }
        false
    }

    /// Returns `true` if there is only one owner, which may then mutate the
    /// object. Advisory for any other use: the count can change concurrently.
    pub(crate) fn is_unique(&self) -> bool {
        self.count.load(Ordering::Acquire) == 1
    }

    /// Snapshot of the current count, for diagnostics only.
    pub(crate) fn get(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unique() {
        let count = RefCount::new();
        assert!(count.is_unique());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn incr_decr() {
        let count = RefCount::new();
        count.incr();
        assert!(!count.is_unique());
        assert!(!count.decr());
        assert!(count.is_unique());
        assert!(count.decr());
    }
}
