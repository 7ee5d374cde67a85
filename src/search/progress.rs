//! Shared attempt counter and cancellation flag
//!
//! Workers count attempts in a [`LocalCounter`] and add them to the shared
//! total once per batch, so the atomic is touched once every `batch_size`
//! attempts instead of on every key. A counter flushes whatever is left when
//! it is dropped, which keeps the final total exact on every exit path.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

/// Why a search was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A worker published a matching keypair
    Found,
    /// Cancelled from outside the search
    Aborted,
}

const REASON_NONE: u8 = 0;
const REASON_FOUND: u8 = 1;
const REASON_ABORTED: u8 = 2;

/// Attempt total and set-once cancellation shared by every worker
#[derive(Debug, Default)]
pub struct ProgressAccounter {
    total: AtomicU64,
    cancelled: AtomicBool,
    reason: AtomicU8,
}

impl ProgressAccounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` attempts to the shared total
    pub fn flush(&self, n: u64) {
        if n > 0 {
            self.total.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Attempts published so far; exact once every worker has exited
    pub fn total_attempts(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Abort the search from outside. Idempotent.
    ///
    /// Returns `true` if this call was the first to stop the search.
    pub fn cancel(&self) -> bool {
        self.stop(StopReason::Aborted)
    }

    /// Stop the search, recording `reason` if nobody stopped it first
    pub fn stop(&self, reason: StopReason) -> bool {
        let code = match reason {
            StopReason::Found => REASON_FOUND,
            StopReason::Aborted => REASON_ABORTED,
        };

        // Reason is stored before the flag so a reader that sees the flag
        // also sees the reason
        let first = self
            .reason
            .compare_exchange(REASON_NONE, code, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        self.cancelled.store(true, Ordering::Release);
        first
    }

    /// The reason recorded by the first stop, if any
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.reason.load(Ordering::Acquire) {
            REASON_FOUND => Some(StopReason::Found),
            REASON_ABORTED => Some(StopReason::Aborted),
            _ => None,
        }
    }

    /// A worker-local counter publishing into this accounter
    pub fn local(&self, batch_size: u64) -> LocalCounter<'_> {
        LocalCounter {
            accounter: self,
            pending: 0,
            batch_size: batch_size.max(1),
        }
    }
}

/// Unsynchronized per-worker attempt count, flushed in batches
#[derive(Debug)]
pub struct LocalCounter<'a> {
    accounter: &'a ProgressAccounter,
    pending: u64,
    batch_size: u64,
}

impl LocalCounter<'_> {
    /// Count one attempt, flushing when the batch is full
    #[inline]
    pub fn bump(&mut self) {
        self.pending += 1;
        if self.pending >= self.batch_size {
            self.flush();
        }
    }

    /// Publish everything counted since the last flush
    pub fn flush(&mut self) {
        self.accounter.flush(self.pending);
        self.pending = 0;
    }

    pub fn pending(&self) -> u64 {
        self.pending
    }
}

impl Drop for LocalCounter<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_batches_defer_publication() {
        let accounter = ProgressAccounter::new();
        let mut local = accounter.local(10);

        for _ in 0..9 {
            local.bump();
        }
        assert_eq!(accounter.total_attempts(), 0);
        assert_eq!(local.pending(), 9);

        local.bump();
        assert_eq!(accounter.total_attempts(), 10);
        assert_eq!(local.pending(), 0);

        local.bump();
        local.flush();
        assert_eq!(accounter.total_attempts(), 11);
    }

    #[test]
    fn test_drop_flushes_remainder() {
        let accounter = ProgressAccounter::new();
        {
            let mut local = accounter.local(1000);
            for _ in 0..1234 {
                local.bump();
            }
        }
        assert_eq!(accounter.total_attempts(), 1234);
    }

    #[test]
    fn test_concurrent_totals_are_exact() {
        let accounter = Arc::new(ProgressAccounter::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let accounter = accounter.clone();
                thread::spawn(move || {
                    let mut local = accounter.local(1000);
                    for _ in 0..(10_000 + i * 7) {
                        local.bump();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let expected: u64 = (0..8).map(|i| 10_000 + i * 7).sum();
        assert_eq!(accounter.total_attempts(), expected);
    }

    #[test]
    fn test_first_stop_reason_wins() {
        let accounter = ProgressAccounter::new();
        assert!(!accounter.is_cancelled());
        assert_eq!(accounter.stop_reason(), None);

        assert!(accounter.stop(StopReason::Found));
        assert!(!accounter.cancel());
        assert!(accounter.is_cancelled());
        assert_eq!(accounter.stop_reason(), Some(StopReason::Found));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let accounter = ProgressAccounter::new();
        assert!(accounter.cancel());
        assert!(!accounter.cancel());
        assert!(!accounter.stop(StopReason::Found));
        assert_eq!(accounter.stop_reason(), Some(StopReason::Aborted));
    }

    #[test]
    fn test_zero_batch_size_flushes_every_bump() {
        let accounter = ProgressAccounter::new();
        let mut local = accounter.local(0);
        local.bump();
        assert_eq!(accounter.total_attempts(), 1);
    }
}
