//! First-writer-wins result slot
//!
//! A bounded channel of capacity one. Workers publish with a non-blocking
//! send; a full slot means another worker already won and the late result is
//! dropped.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::time::Duration;

pub(crate) struct ResultSlot<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> ResultSlot<T> {
    pub(crate) fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub(crate) fn publisher(&self) -> Publisher<T> {
        Publisher {
            tx: self.tx.clone(),
        }
    }

    /// Wait up to `timeout` for the published result
    pub(crate) fn take(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub(crate) fn try_take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

pub(crate) struct Publisher<T> {
    tx: Sender<T>,
}

impl<T> Publisher<T> {
    /// Returns `false` if the slot was already taken
    pub(crate) fn publish(&self, value: T) -> bool {
        match self.tx.try_send(value) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_first_publish_wins() {
        let slot = ResultSlot::new();
        let a = slot.publisher();
        let b = slot.publisher();

        assert!(a.publish(1));
        assert!(!b.publish(2));
        assert!(!a.publish(3));

        assert_eq!(slot.try_take(), Some(1));
        assert_eq!(slot.try_take(), None);
    }

    #[test]
    fn test_take_times_out_when_empty() {
        let slot: ResultSlot<u32> = ResultSlot::new();
        assert_eq!(slot.take(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_racing_publishers_yield_one_winner() {
        let slot = ResultSlot::new();
        let wins: usize = thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let publisher = slot.publisher();
                    s.spawn(move || publisher.publish(i))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });

        assert_eq!(wins, 1);
        assert!(slot.take(Duration::from_millis(10)).is_some());
        assert_eq!(slot.try_take(), None);
    }
}
