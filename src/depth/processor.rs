use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, warn};

use crate::depth::handler::OrderedEventHandler;
use crate::depth::projection::DepthProjection;
use crate::depth::{BuilderError, BuilderResult};
use crate::orderbook::types::{
    MarketDepth, OrderBookEvent, SequenceNumber, SessionContractKey,
};

/// Depth builder configuration.
///
/// `stuck_buffer_limit` is the liveness threshold: once a key buffers that
/// many out-of-order events its markers report it stuck. `hard_buffer_limit`
/// is the optional fatal bound: the builder never truncates a buffer, so
/// exceeding it fails that key's partition loudly instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthBuilderConfig {
    /// Price levels per side in each snapshot
    pub depth: usize,
    /// Expose the trailing last trade on snapshots
    pub with_trade: bool,
    /// First sequence expected for every new key
    pub initial_sequence: SequenceNumber,
    /// Flush the per-key batch at this many records
    pub max_batch_size: usize,
    /// Flush and attach a liveness marker on every applied event
    pub status_on_every_event: bool,
    /// Flush and attach a liveness marker every N seconds of processing
    /// time, 0 = disabled
    pub status_frequency_secs: u64,
    pub stuck_buffer_limit: usize,
    pub hard_buffer_limit: Option<usize>,
}

impl Default for DepthBuilderConfig {
    fn default() -> Self {
        Self {
            depth: 10,
            with_trade: false,
            initial_sequence: 0,
            max_batch_size: 50_000,
            status_on_every_event: false,
            status_frequency_secs: 0,
            stuck_buffer_limit: 10_000,
            hard_buffer_limit: None,
        }
    }
}

impl DepthBuilderConfig {
    pub fn validate(&self) -> BuilderResult<()> {
        if self.depth == 0 {
            return Err(BuilderError::InvalidConfig("depth must be positive".into()));
        }
        if self.max_batch_size == 0 {
            return Err(BuilderError::InvalidConfig(
                "max_batch_size must be positive".into(),
            ));
        }
        if self.stuck_buffer_limit == 0 {
            return Err(BuilderError::InvalidConfig(
                "stuck_buffer_limit must be positive".into(),
            ));
        }
        if let Some(hard) = self.hard_buffer_limit {
            if hard < self.stuck_buffer_limit {
                return Err(BuilderError::InvalidConfig(
                    "hard_buffer_limit below stuck_buffer_limit".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Per-key processing phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPhase {
    AwaitingInitial,
    Buffering,
    Processing,
}

/// Everything the builder knows about one key, as plain serializable data.
/// A host checkpoints this record and may resume it on a different worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyState {
    pub phase: KeyPhase,
    pub projection: DepthProjection,
    pub expected_sequence: SequenceNumber,
    pub buffered: BTreeMap<SequenceNumber, OrderBookEvent>,
    pub batch: Vec<MarketDepth>,
    pub received: u64,
    pub applied: u64,
    pub duplicates: u64,
    #[serde(skip)]
    last_status_at: Option<Instant>,
}

impl KeyState {
    fn new(key: &SessionContractKey, initial_sequence: SequenceNumber) -> Self {
        Self {
            phase: KeyPhase::AwaitingInitial,
            projection: DepthProjection::new(key.contract_id),
            expected_sequence: initial_sequence,
            buffered: BTreeMap::new(),
            batch: Vec::new(),
            received: 0,
            applied: 0,
            duplicates: 0,
            last_status_at: Some(Instant::now()),
        }
    }

    fn status(&self, key: &SessionContractKey, config: &DepthBuilderConfig) -> ProcessingStatus {
        ProcessingStatus {
            key: key.clone(),
            emitted_at: Utc::now(),
            phase: self.phase,
            expected_sequence: self.expected_sequence,
            last_applied_sequence: self.expected_sequence.checked_sub(1).filter(|_| self.applied > 0),
            received: self.received,
            applied: self.applied,
            duplicates: self.duplicates,
            buffered: self.buffered.len() as u64,
            earliest_buffered: self.buffered.keys().next().copied(),
            stuck: self.buffered.len() >= config.stuck_buffer_limit,
        }
    }
}

/// Liveness marker attached to flushes: how far a key has progressed and
/// whether its sequence gap looks permanent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub key: SessionContractKey,
    pub emitted_at: DateTime<Utc>,
    pub phase: KeyPhase,
    pub expected_sequence: SequenceNumber,
    pub last_applied_sequence: Option<SequenceNumber>,
    pub received: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub buffered: u64,
    pub earliest_buffered: Option<SequenceNumber>,
    pub stuck: bool,
}

/// Output of one handler invocation: zero or more flushed snapshot batches
/// plus zero or more liveness markers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Emissions {
    pub batches: Vec<Vec<MarketDepth>>,
    pub statuses: Vec<ProcessingStatus>,
}

impl Emissions {
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.statuses.is_empty()
    }

    /// Total snapshot records across all batches
    pub fn record_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

/// Ordered per-key event processor feeding depth projections.
///
/// Events may arrive in any order and more than once. An event at the
/// expected sequence is applied immediately and drains any now-contiguous
/// buffered run; a future event waits in a sequence-ordered buffer; a past
/// event is a duplicate and is dropped without error, which is what makes
/// apply-and-flush idempotent under at-least-once redelivery.
#[derive(Debug)]
pub struct OrderedDepthProcessor {
    config: DepthBuilderConfig,
    keys: HashMap<SessionContractKey, KeyState>,
}

impl OrderedDepthProcessor {
    pub fn new(config: DepthBuilderConfig) -> BuilderResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            keys: HashMap::new(),
        })
    }

    pub fn config(&self) -> &DepthBuilderConfig {
        &self.config
    }

    pub fn key_state(&self, key: &SessionContractKey) -> Option<&KeyState> {
        self.keys.get(key)
    }

    pub fn tracked_keys(&self) -> impl Iterator<Item = &SessionContractKey> {
        self.keys.keys()
    }

    /// Export a key's full state for migration, flushing its pending batch
    /// into the returned emissions first so no record is lost or duplicated.
    /// The key is forgotten locally; the host owns the checkpoint from here.
    pub fn checkpoint(&mut self, key: &SessionContractKey) -> Option<(KeyState, Emissions)> {
        let mut state = self.keys.remove(key)?;
        let mut emissions = Emissions::default();
        flush_batch(&mut state, &mut emissions);
        Some((state, emissions))
    }

    /// Resume a previously checkpointed key, possibly from another worker
    pub fn restore(&mut self, key: SessionContractKey, state: KeyState) {
        self.keys.insert(key, state);
    }

    fn handle_event(
        &mut self,
        key: &SessionContractKey,
        event: OrderBookEvent,
    ) -> BuilderResult<Emissions> {
        let config = &self.config;
        let state = self
            .keys
            .entry(key.clone())
            .or_insert_with(|| KeyState::new(key, config.initial_sequence));
        state.received += 1;

        let mut emissions = Emissions::default();
        let sequence = event.sequence;

        if sequence < state.expected_sequence {
            state.duplicates += 1;
            debug!(
                "key {}: dropping duplicate sequence {} (expecting {})",
                key, sequence, state.expected_sequence
            );
            return Ok(emissions);
        }

        if sequence > state.expected_sequence {
            if state.buffered.contains_key(&sequence) {
                state.duplicates += 1;
                return Ok(emissions);
            }
            if let Some(hard) = config.hard_buffer_limit {
                if state.buffered.len() >= hard {
                    return Err(BuilderError::BufferOverflow {
                        key: key.clone(),
                        buffered: state.buffered.len(),
                    });
                }
            }

            state.buffered.insert(sequence, event);
            state.phase = KeyPhase::Buffering;

            if state.buffered.len() == config.stuck_buffer_limit {
                warn!(
                    "key {}: {} buffered events, still expecting sequence {} - reporting stuck",
                    key,
                    state.buffered.len(),
                    state.expected_sequence
                );
                emissions.statuses.push(state.status(key, config));
            }
            return Ok(emissions);
        }

        apply_contiguous(config, key, state, event, &mut emissions)?;
        Ok(emissions)
    }

    fn handle_timer(&mut self, key: &SessionContractKey) -> BuilderResult<Emissions> {
        let mut emissions = Emissions::default();
        let Some(state) = self.keys.get_mut(key) else {
            return Ok(emissions);
        };

        flush_batch(state, &mut emissions);
        let status = state.status(key, &self.config);
        if status.stuck {
            warn!(
                "key {}: stuck with {} buffered events, expecting sequence {}",
                key, status.buffered, status.expected_sequence
            );
        }
        emissions.statuses.push(status);
        state.last_status_at = Some(Instant::now());
        Ok(emissions)
    }
}

impl OrderedEventHandler for OrderedDepthProcessor {
    type Key = SessionContractKey;
    type Event = OrderBookEvent;
    type Output = Emissions;
    type Error = BuilderError;

    fn on_event(&mut self, key: &SessionContractKey, event: OrderBookEvent) -> BuilderResult<Emissions> {
        self.handle_event(key, event)
    }

    fn on_timer(&mut self, key: &SessionContractKey) -> BuilderResult<Emissions> {
        self.handle_timer(key)
    }
}

/// Apply `event`, then drain every now-contiguous buffered successor
fn apply_contiguous(
    config: &DepthBuilderConfig,
    key: &SessionContractKey,
    state: &mut KeyState,
    event: OrderBookEvent,
    emissions: &mut Emissions,
) -> BuilderResult<()> {
    let mut next = Some(event);
    while let Some(event) = next {
        apply_one(config, key, state, event, emissions)?;
        next = state.buffered.remove(&state.expected_sequence);
    }

    state.phase = if state.buffered.is_empty() {
        KeyPhase::Processing
    } else {
        KeyPhase::Buffering
    };
    Ok(())
}

fn apply_one(
    config: &DepthBuilderConfig,
    key: &SessionContractKey,
    state: &mut KeyState,
    event: OrderBookEvent,
    emissions: &mut Emissions,
) -> BuilderResult<()> {
    state.projection.apply(&event)?;
    state.applied += 1;
    let watermark = event.sequence;
    state.expected_sequence = watermark + 1;

    let snapshot = state
        .projection
        .market_depth(watermark, config.depth, config.with_trade);
    state.batch.push(snapshot);

    if state.batch.len() >= config.max_batch_size {
        flush_batch(state, emissions);
    }

    if config.status_on_every_event {
        flush_batch(state, emissions);
        emissions.statuses.push(state.status(key, config));
    } else if config.status_frequency_secs > 0 {
        let due = state
            .last_status_at
            .map_or(true, |at| at.elapsed().as_secs() >= config.status_frequency_secs);
        if due {
            flush_batch(state, emissions);
            emissions.statuses.push(state.status(key, config));
            state.last_status_at = Some(Instant::now());
        }
    }

    Ok(())
}

fn flush_batch(state: &mut KeyState, emissions: &mut Emissions) {
    if !state.batch.is_empty() {
        emissions.batches.push(std::mem::take(&mut state.batch));
    }
}
