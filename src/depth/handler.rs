use std::collections::HashSet;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// The capability a keyed execution host provides to the depth builder.
///
/// The host guarantees exactly one active writer per key at any instant,
/// delivers events via `on_event` and drives liveness via `on_timer`, and
/// persists whatever per-key state the handler exposes. The builder is
/// written against this contract only, never against a concrete runtime, so
/// the same handler runs under an in-process driver, a test harness, or a
/// distributed keyed executor.
pub trait OrderedEventHandler {
    type Key;
    type Event;
    type Output;
    type Error;

    fn on_event(&mut self, key: &Self::Key, event: Self::Event)
        -> Result<Self::Output, Self::Error>;

    fn on_timer(&mut self, key: &Self::Key) -> Result<Self::Output, Self::Error>;
}

/// Reference single-threaded host: drives a handler from an event source and
/// fires periodic timers for every key it has delivered to.
///
/// One thread, one handler, so the single-writer-per-key guarantee holds
/// trivially. The demo binary and the integration tests run on this.
pub struct InProcessHost<H: OrderedEventHandler> {
    handler: H,
    seen_keys: HashSet<H::Key>,
    timer_interval: Option<Duration>,
    last_timer: Instant,
}

impl<H> InProcessHost<H>
where
    H: OrderedEventHandler,
    H::Key: Clone + Eq + Hash,
{
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            seen_keys: HashSet::new(),
            timer_interval: None,
            last_timer: Instant::now(),
        }
    }

    /// Fire timers for all seen keys every `interval` of processing time
    pub fn with_timer_interval(mut self, interval: Duration) -> Self {
        self.timer_interval = Some(interval);
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Deliver one event to the handler
    pub fn dispatch(&mut self, key: H::Key, event: H::Event) -> Result<H::Output, H::Error> {
        if !self.seen_keys.contains(&key) {
            self.seen_keys.insert(key.clone());
        }
        self.handler.on_event(&key, event)
    }

    /// Fire `on_timer` for every key this host has delivered to
    pub fn fire_timers(&mut self) -> Result<Vec<H::Output>, H::Error> {
        let mut outputs = Vec::with_capacity(self.seen_keys.len());
        for key in &self.seen_keys {
            outputs.push(self.handler.on_timer(key)?);
        }
        self.last_timer = Instant::now();
        Ok(outputs)
    }

    /// Fire timers only when the configured interval has elapsed
    pub fn maybe_fire_timers(&mut self) -> Result<Vec<H::Output>, H::Error> {
        match self.timer_interval {
            Some(interval) if self.last_timer.elapsed() >= interval => self.fire_timers(),
            _ => Ok(Vec::new()),
        }
    }

    /// Drain an event source into the handler, forwarding every output to
    /// `sink`. Timers fire at the configured interval and once more at the
    /// end so trailing batches are flushed.
    pub fn run<I>(
        &mut self,
        source: I,
        mut sink: impl FnMut(H::Output),
    ) -> Result<(), H::Error>
    where
        I: IntoIterator<Item = (H::Key, H::Event)>,
    {
        for (key, event) in source {
            sink(self.dispatch(key, event)?);
            for output in self.maybe_fire_timers()? {
                sink(output);
            }
        }

        for output in self.fire_timers()? {
            sink(output);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::processor::{DepthBuilderConfig, Emissions, OrderedDepthProcessor};
    use crate::orderbook::types::{EventType, OrderBookEvent, SessionContractKey, Side};

    fn new_event(contract_id: u64, sequence: u64) -> OrderBookEvent {
        OrderBookEvent {
            contract_id,
            sequence,
            event_type: EventType::New,
            side: Side::Buy,
            order_id: sequence,
            price: 100,
            quantity: 10,
            quantity_filled: 0,
        }
    }

    #[test]
    fn test_run_flushes_trailing_batches() {
        let processor = OrderedDepthProcessor::new(DepthBuilderConfig::default()).unwrap();
        let mut host = InProcessHost::new(processor);

        let source: Vec<_> = (0..3)
            .map(|sequence| {
                (
                    SessionContractKey::new("s", 1),
                    new_event(1, sequence),
                )
            })
            .collect();

        let mut collected: Vec<Emissions> = Vec::new();
        host.run(source, |emissions| collected.push(emissions)).unwrap();

        let records: usize = collected.iter().map(Emissions::record_count).sum();
        let statuses: usize = collected.iter().map(|e| e.statuses.len()).sum();
        assert_eq!(records, 3); // trailing batch flushed by the final timer
        assert_eq!(statuses, 1);
    }

    #[test]
    fn test_timers_cover_every_seen_key() {
        let processor = OrderedDepthProcessor::new(DepthBuilderConfig::default()).unwrap();
        let mut host = InProcessHost::new(processor);

        host.dispatch(SessionContractKey::new("s", 1), new_event(1, 0))
            .unwrap();
        host.dispatch(SessionContractKey::new("s", 2), new_event(2, 0))
            .unwrap();

        let outputs = host.fire_timers().unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|e| e.statuses.len() == 1));
    }
}
