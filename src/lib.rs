//! Order Book Depth Engine
//!
//! Reconstructs live order book depth from per-contract event streams and
//! generates the synthetic order flow to exercise that reconstruction.
//! Three subsystems share one domain model:
//!
//! - **Matching engine**: price-time priority continuous double auction per
//!   contract, turning incoming orders into resting book state and an
//!   append-only, per-contract-sequenced event log.
//! - **Simulator**: a virtual-time scheduler per contract generating orders,
//!   timed cancels and decaying trade-impact actions against its own engine,
//!   reproducible bit-for-bit under a fixed seed.
//! - **Depth builder**: an ordered per-key processor that accepts the event
//!   log out of order and at-least-once, buffers until contiguous, applies it
//!   to a serializable projection and emits bounded batches of market-depth
//!   snapshots plus liveness markers.
//!
//! # Quick Start
//!
//! ```rust
//! use orderbook_depth_engine::depth::{DepthBuilderConfig, OrderedDepthProcessor, OrderedEventHandler};
//! use orderbook_depth_engine::orderbook::{MatchingEngine, Order, SessionContractKey, Side};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Match two orders on contract 1
//! let mut engine = MatchingEngine::new(1);
//! let mut events = engine.add(Order::new(1, 1, Side::Buy, 102, 50))?;
//! events.extend(engine.add(Order::new(1, 2, Side::Sell, 101, 30))?);
//!
//! // Rebuild depth from the event log, in any delivery order
//! let mut builder = OrderedDepthProcessor::new(DepthBuilderConfig::default())?;
//! let key = SessionContractKey::new("session", 1);
//! for event in events.into_iter().rev() {
//!     builder.on_event(&key, event)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The matching engine owns the live book (plain `BTreeMap` sides, exclusive
//! per-contract ownership); the depth builder owns an independent projection
//! rebuilt purely from the event log and is the only place snapshots are
//! emitted. Between them sits an at-least-once, possibly reordered transport:
//! simulators multiplex event batches from rayon workers into one channel,
//! and the builder's sequence check restores per-key order downstream.

pub mod depth;
pub mod metrics;
pub mod orderbook;
pub mod simulator;
pub mod utils;

// Re-export commonly used types
pub use depth::{
    BuilderError, DepthBuilderConfig, DepthProjection, Emissions, InProcessHost,
    OrderedDepthProcessor, OrderedEventHandler, ProcessingStatus,
};
pub use orderbook::{
    ContractId, EventType, MarketDepth, MatchingEngine, Order, OrderBookError, OrderBookEvent,
    OrderId, Price, Quantity, QuantityAtPrice, SequenceNumber, SessionContractKey, Side,
};
pub use simulator::{ContractSimulator, SimulatorConfig};

pub use crate::metrics::PipelineMetrics;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    fn simulate_events(order_count: u64, seed: u64) -> Vec<OrderBookEvent> {
        let config = SimulatorConfig {
            order_count,
            seed,
            ..SimulatorConfig::default()
        };
        ContractSimulator::new(&config, 1)
            .unwrap()
            .flatten()
            .collect()
    }

    fn final_depth(processor: &OrderedDepthProcessor, key: &SessionContractKey) -> MarketDepth {
        let state = processor.key_state(key).unwrap();
        state.projection.market_depth(
            state.expected_sequence.saturating_sub(1),
            processor.config().depth,
            true,
        )
    }

    #[test]
    fn test_shuffled_redelivery_matches_in_order_application() {
        let events = simulate_events(150, 21);
        assert!(events.len() > 150);
        let key = SessionContractKey::new("shuffle", 1);

        let mut in_order = OrderedDepthProcessor::new(DepthBuilderConfig::default()).unwrap();
        for event in &events {
            in_order.on_event(&key, *event).unwrap();
        }

        // Shuffle the stream and redeliver a slice of it on top (at-least-once)
        let mut shuffled = events.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        shuffled.shuffle(&mut rng);
        shuffled.extend(events.iter().take(40).copied());

        let mut reordered = OrderedDepthProcessor::new(DepthBuilderConfig::default()).unwrap();
        for event in shuffled {
            reordered.on_event(&key, event).unwrap();
        }

        let a = in_order.key_state(&key).unwrap();
        let b = reordered.key_state(&key).unwrap();
        assert_eq!(a.projection, b.projection);
        assert_eq!(a.expected_sequence, b.expected_sequence);
        assert_eq!(b.applied, events.len() as u64);
        assert_eq!(final_depth(&in_order, &key), final_depth(&reordered, &key));
    }

    #[test]
    fn test_full_redelivery_changes_nothing() {
        let events = simulate_events(60, 9);
        let key = SessionContractKey::new("redeliver", 1);

        let mut processor = OrderedDepthProcessor::new(DepthBuilderConfig::default()).unwrap();
        for event in &events {
            processor.on_event(&key, *event).unwrap();
        }
        let state_before = processor.key_state(&key).unwrap().clone();

        for event in &events {
            let emissions = processor.on_event(&key, *event).unwrap();
            assert!(emissions.is_empty());
        }

        let state_after = processor.key_state(&key).unwrap();
        assert_eq!(state_after.projection, state_before.projection);
        assert_eq!(state_after.applied, state_before.applied);
        assert_eq!(state_after.duplicates, events.len() as u64);
    }

    #[test]
    fn test_buy_then_sell_scenario_end_to_end() {
        let mut engine = MatchingEngine::new(1);
        let mut events = engine.add(Order::new(1, 1, Side::Buy, 102, 50)).unwrap();
        events.extend(engine.add(Order::new(1, 2, Side::Sell, 101, 30)).unwrap());

        // One NEW for the resting buy, one FILL of 30 at the resting price
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, EventType::Fill);
        assert_eq!(events[1].price, 102);
        assert_eq!(events[1].quantity_filled, 30);

        let config = DepthBuilderConfig {
            with_trade: true,
            ..DepthBuilderConfig::default()
        };
        let mut builder = OrderedDepthProcessor::new(config).unwrap();
        let key = SessionContractKey::new("scenario", 1);
        for event in events {
            builder.on_event(&key, event).unwrap();
        }

        let depth = final_depth(&builder, &key);
        assert_eq!(depth.bids.len(), 1);
        assert_eq!(depth.bids[0].price, 102);
        assert_eq!(depth.bids[0].quantity, 20);
        assert!(depth.asks.is_empty());
        assert_eq!(depth.last_trade.unwrap().price, 102);
        assert_eq!(depth.last_trade.unwrap().quantity, 30);
    }

    #[test]
    fn test_simulator_to_builder_pipeline() {
        let config = SimulatorConfig {
            order_count: 80,
            seed: 17,
            start_contract: 1,
            end_contract: 4,
            ..SimulatorConfig::default()
        };
        let (sender, receiver) = crossbeam::channel::unbounded();
        simulator::run_to_sink(&config, sender).unwrap();

        let processor = OrderedDepthProcessor::new(DepthBuilderConfig::default()).unwrap();
        let mut host = InProcessHost::new(processor);

        let mut expected_per_contract: HashMap<ContractId, u64> = HashMap::new();
        let mut total_records = 0usize;
        for batch in receiver.iter() {
            for event in batch {
                *expected_per_contract.entry(event.contract_id).or_insert(0) += 1;
                let key = SessionContractKey::new("pipeline", event.contract_id);
                let emissions = host.dispatch(key, event).unwrap();
                total_records += emissions.record_count();
            }
        }
        for emissions in host.fire_timers().unwrap() {
            total_records += emissions.record_count();
        }

        let processor = host.into_handler();
        let total_events: u64 = expected_per_contract.values().sum();
        assert_eq!(expected_per_contract.len(), 3);
        assert_eq!(total_records as u64, total_events);

        for (contract_id, expected) in expected_per_contract {
            let key = SessionContractKey::new("pipeline", contract_id);
            let state = processor.key_state(&key).unwrap();
            assert_eq!(state.applied, expected);
            assert!(state.buffered.is_empty());
        }
    }

    #[test]
    fn test_checkpoint_migration_equivalence() {
        let events = simulate_events(100, 33);
        let key = SessionContractKey::new("migrate", 1);
        let split = events.len() / 2;

        let mut straight = OrderedDepthProcessor::new(DepthBuilderConfig::default()).unwrap();
        for event in &events {
            straight.on_event(&key, *event).unwrap();
        }

        // First half on worker A, checkpoint, resume on worker B
        let mut worker_a = OrderedDepthProcessor::new(DepthBuilderConfig::default()).unwrap();
        let mut migrated_records = 0;
        for event in &events[..split] {
            migrated_records += worker_a.on_event(&key, *event).unwrap().record_count();
        }
        let (state, emissions) = worker_a.checkpoint(&key).unwrap();
        migrated_records += emissions.record_count();

        let mut worker_b = OrderedDepthProcessor::new(DepthBuilderConfig::default()).unwrap();
        worker_b.restore(key.clone(), state);
        for event in &events[split..] {
            migrated_records += worker_b.on_event(&key, *event).unwrap().record_count();
        }
        migrated_records += worker_b.on_timer(&key).unwrap().record_count();

        assert_eq!(
            straight.key_state(&key).unwrap().projection,
            worker_b.key_state(&key).unwrap().projection
        );
        assert_eq!(migrated_records, events.len()); // no record lost or duplicated
    }
}
