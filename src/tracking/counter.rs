//! Compteur de traqueurs bloqués pour la page courante.
//!
//! Reset and increment share one lock. Both run on the view's consumer
//! thread, in the order the renderer posted its events.

use std::sync::{Mutex, MutexGuard};

/// Per-page blocked tracker tally.
#[derive(Debug, Default)]
pub struct TrackerCounter {
    count: Mutex<u32>,
}

impl TrackerCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remet le compteur à zéro pour une nouvelle navigation.
    pub fn reset(&self) {
        *self.lock() = 0;
    }

    /// Compte un blocage pour la page courante. Renvoie le nouveau total.
    pub fn record_blocked(&self) -> u32 {
        let mut count = self.lock();
        *count = count.saturating_add(1);
        *count
    }

    pub fn count(&self) -> u32 {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, u32> {
        self.count.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_reset_zeroes_and_counts_monotonically() {
        let counter = TrackerCounter::new();
        counter.reset();
        let mut last = 0;
        for _ in 0..5 {
            let now = counter.record_blocked();
            assert!(now > last);
            last = now;
        }
        assert_eq!(counter.count(), 5);
        counter.reset();
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let counter = Arc::new(TrackerCounter::new());
        counter.reset();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..250 {
                        counter.record_blocked();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.count(), 1000);
    }
}
