use log::{debug, warn};
use std::time::{Duration, Instant};
use trove_index::IndexStore;

/// Decides when buffered postings are persisted and counts what was persisted.
///
/// At most one deferred flush is armed at a time. The timer is polled by
/// the host through [`FlushScheduler::poll`]; nothing here sleeps.
#[derive(Debug)]
pub struct FlushScheduler {
    interval: Duration,
    deadline: Option<Instant>,
    items_indexed: u64,
}

impl FlushScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
            items_indexed: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn items_indexed(&self) -> u64 {
        self.items_indexed
    }

    /// Arm a deferred flush `interval` after `now`. No-op while one is armed.
    pub fn schedule(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.interval);
        true
    }

    /// Disarm the deferred flush, returning whether one was armed
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Run the deferred flush if its deadline has passed. Returns the number
    /// of postings flushed when it fired.
    pub fn poll<I: IndexStore>(&mut self, now: Instant, index: &mut I) -> Option<u64> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                Some(self.flush(index))
            }
            _ => None,
        }
    }

    /// Flush synchronously, leaving any armed deferred flush untouched
    pub fn flush_now<I: IndexStore>(&mut self, index: &mut I) -> u64 {
        self.flush(index)
    }

    fn flush<I: IndexStore>(&mut self, index: &mut I) -> u64 {
        match index.flush() {
            Ok(count) => {
                self.items_indexed = self.items_indexed.saturating_add(count);
                debug!(
                    "Flushed {count} postings, {} indexed in total",
                    self.items_indexed
                );
                count
            }
            Err(e) => {
                warn!("Index flush failed: {e}");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct CountingIndex {
        pending: usize,
        fail: bool,
    }

    impl IndexStore for CountingIndex {
        fn add(&mut self, _term: &str, _document_id: u64, _service_id: u32, _weight: u32) {
            self.pending += 1;
        }

        fn flush(&mut self) -> trove_index::Result<u64> {
            if self.fail {
                return Err(trove_index::IndexError::NotInitialized);
            }
            let count = self.pending as u64;
            self.pending = 0;
            Ok(count)
        }

        fn pending(&self) -> usize {
            self.pending
        }
    }

    #[test]
    fn test_only_one_deferred_flush_is_armed() {
        let mut flush = FlushScheduler::new(Duration::from_secs(10));
        let start = Instant::now();

        assert!(flush.schedule(start));
        assert!(!flush.schedule(start + Duration::from_secs(5)));
        assert_eq!(flush.deadline(), Some(start + Duration::from_secs(10)));
    }

    #[test]
    fn test_deferred_flush_fires_after_interval() {
        let mut flush = FlushScheduler::new(Duration::from_secs(10));
        let mut index = CountingIndex::default();
        let start = Instant::now();

        index.add("a", 1, 1, 1);
        index.add("b", 1, 1, 1);
        flush.schedule(start);

        assert_eq!(flush.poll(start + Duration::from_secs(9), &mut index), None);
        assert_eq!(flush.items_indexed(), 0);

        assert_eq!(flush.poll(start + Duration::from_secs(10), &mut index), Some(2));
        assert_eq!(flush.items_indexed(), 2);
        assert!(!flush.is_armed());
        assert!(flush.schedule(start + Duration::from_secs(11)));
    }

    #[test]
    fn test_counter_is_monotonic() {
        let mut flush = FlushScheduler::new(Duration::from_secs(1));
        let mut index = CountingIndex::default();
        let mut last = 0;

        for round in 0..4 {
            for _ in 0..round {
                index.add("t", 1, 1, 1);
            }
            index.fail = round == 2;
            flush.flush_now(&mut index);
            assert!(flush.items_indexed() >= last);
            last = flush.items_indexed();
        }
        assert_eq!(last, 1 + 2 + 3);
    }

    #[test]
    fn test_cancel() {
        let mut flush = FlushScheduler::new(Duration::from_secs(1));
        assert!(!flush.cancel());
        flush.schedule(Instant::now());
        assert!(flush.cancel());
        assert!(!flush.is_armed());
    }
}
