use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Throughput collector for counting operations per interval
#[derive(Debug)]
pub struct ThroughputCollector {
    counter: AtomicU64,
    last_collection: Instant,
    collection_interval: Duration,
    last_count: u64,
}

impl ThroughputCollector {
    pub fn new(collection_interval: Duration) -> Self {
        Self {
            counter: AtomicU64::new(0),
            last_collection: Instant::now(),
            collection_interval,
            last_count: 0,
        }
    }

    /// Increment the counter
    pub fn increment(&self) {
        self.counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by a specific amount
    pub fn add(&self, value: u64) {
        self.counter.fetch_add(value, Ordering::Relaxed);
    }

    /// Collect throughput statistics if the interval has passed
    pub fn collect(&mut self) -> Option<ThroughputStatistics> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_collection);

        if elapsed >= self.collection_interval {
            let current_count = self.counter.load(Ordering::Relaxed);
            let operations = current_count - self.last_count;
            let rate = operations as f64 / elapsed.as_secs_f64();

            self.last_collection = now;
            self.last_count = current_count;

            Some(ThroughputStatistics {
                operations,
                rate,
                total: current_count,
                interval: elapsed,
            })
        } else {
            None
        }
    }

    /// Get current total count
    pub fn total(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct ThroughputStatistics {
    pub operations: u64,
    pub rate: f64,
    pub total: u64,
    pub interval: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_collection() {
        let mut collector = ThroughputCollector::new(Duration::from_millis(0));

        collector.increment();
        collector.add(9);

        let stats = collector.collect().expect("zero interval always collects");
        assert_eq!(stats.operations, 10);
        assert_eq!(stats.total, 10);
    }

    #[test]
    fn test_collection_respects_interval() {
        let mut collector = ThroughputCollector::new(Duration::from_secs(3600));
        collector.increment();
        assert!(collector.collect().is_none());
        assert_eq!(collector.total(), 1);
    }
}
