//! Market Depth Pipeline Server
//!
//! End-to-end demonstration of the engine: per-contract simulators generate
//! synthetic order flow on rayon workers, their event batches multiplex into
//! one channel, and the ordered depth builder reconstructs market depth on
//! the consumer side, with metrics and periodic stat lines along the way.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver};
use parking_lot::RwLock;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use orderbook_depth_engine::depth::{
    DepthBuilderConfig, Emissions, InProcessHost, OrderedDepthProcessor,
};
use orderbook_depth_engine::metrics::collectors::ThroughputCollector;
use orderbook_depth_engine::metrics::{MetricsReporter, PipelineMetrics};
use orderbook_depth_engine::simulator::{self, SimulatorConfig};
use orderbook_depth_engine::utils::format_price;
use orderbook_depth_engine::{
    BuilderError, ContractId, EventType, MarketDepth, OrderBookEvent, SessionContractKey,
};

const CONTRACT_COUNT: u64 = 5;
const ORDERS_PER_CONTRACT: u64 = 100_000;
const RANDOM_SEED: u64 = 0; // 0 = fresh flow every run
const DEPTH_LEVELS: usize = 5;
const STATUS_INTERVAL_SECS: u64 = 30;
const TICK_SIZE: f64 = 0.01;

type LatestDepth = Arc<RwLock<HashMap<ContractId, MarketDepth>>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Starting market depth pipeline server...");

    start_metrics_exporter()?;

    let metrics = Arc::new(PipelineMetrics::new());
    let reporter = MetricsReporter::new(Arc::clone(&metrics), Duration::from_secs(5));
    tokio::spawn(async move {
        reporter.run().await;
    });

    let sim_config = SimulatorConfig {
        order_count: ORDERS_PER_CONTRACT,
        seed: RANDOM_SEED,
        start_contract: 1,
        end_contract: 1 + CONTRACT_COUNT,
        ..SimulatorConfig::default()
    };
    sim_config.validate()?;

    let session_id = Uuid::new_v4().to_string();
    info!(
        "Session {} | {} contracts x {} orders",
        session_id,
        sim_config.contract_count(),
        ORDERS_PER_CONTRACT
    );

    let (sender, receiver) = bounded(1024);
    let producer_config = sim_config.clone();
    let producer =
        tokio::task::spawn_blocking(move || simulator::run_to_sink(&producer_config, sender));

    let latest_depth: LatestDepth = Arc::new(RwLock::new(HashMap::new()));
    let builder_metrics = Arc::clone(&metrics);
    let builder_depth = Arc::clone(&latest_depth);
    let consumer = tokio::task::spawn_blocking(move || {
        build_depth(receiver, session_id, builder_metrics, builder_depth)
    });

    spawn_stats_loop(Arc::clone(&metrics), Arc::clone(&latest_depth));

    info!("Pipeline is running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
        result = consumer => {
            match result {
                Ok(Ok(())) => info!("Event stream drained, pipeline complete"),
                Ok(Err(e)) => error!("Depth builder failed: {}", e),
                Err(e) => error!("Depth builder panicked: {}", e),
            }
            if let Ok(Err(e)) = producer.await {
                error!("Simulator failed: {}", e);
            }
        }
    }

    // Final statistics
    info!(
        "Final stats: {} orders rested, {} trades, {} events applied, {} snapshots in {} batches",
        metrics.get_orders_generated(),
        metrics.get_trades_executed(),
        metrics.get_events_applied(),
        metrics.get_snapshots_emitted(),
        metrics.get_batches_emitted()
    );
    for (contract_id, events, trades) in metrics.contract_stats() {
        info!(
            "Final stats for contract {}: {} events, {} trades",
            contract_id, events, trades
        );
    }

    Ok(())
}

/// Consume the multiplexed event stream and reconstruct per-contract depth.
/// Runs on a blocking worker until the simulators hang up the channel.
fn build_depth(
    receiver: Receiver<Vec<OrderBookEvent>>,
    session_id: String,
    metrics: Arc<PipelineMetrics>,
    latest_depth: LatestDepth,
) -> Result<(), BuilderError> {
    let config = DepthBuilderConfig {
        depth: DEPTH_LEVELS,
        with_trade: true,
        status_frequency_secs: STATUS_INTERVAL_SECS,
        ..DepthBuilderConfig::default()
    };
    let processor = OrderedDepthProcessor::new(config)?;
    let mut host =
        InProcessHost::new(processor).with_timer_interval(Duration::from_secs(STATUS_INTERVAL_SECS));

    for batch in receiver.iter() {
        for event in batch {
            record_event(&event, &metrics);

            let key = SessionContractKey::new(session_id.clone(), event.contract_id);
            let emissions = metrics.time_apply_event(|| host.dispatch(key, event))?;
            metrics.increment_events_applied(1);

            if !emissions.is_empty() {
                metrics.time_emit_batch(|| record_emissions(&emissions, &metrics, &latest_depth));
            }
        }

        for emissions in host.maybe_fire_timers()? {
            record_emissions(&emissions, &metrics, &latest_depth);
        }
        metrics.set_tracked_keys(host.handler().tracked_keys().count() as u64);
    }

    // Channel closed: flush trailing batches and report once more
    for emissions in host.fire_timers()? {
        record_emissions(&emissions, &metrics, &latest_depth);
    }
    Ok(())
}

fn record_event(event: &OrderBookEvent, metrics: &PipelineMetrics) {
    match event.event_type {
        EventType::New => metrics.increment_orders_generated(event.contract_id),
        EventType::Fill => metrics.increment_trades_executed(
            event.contract_id,
            event.quantity_filled,
            event.quantity_filled * event.price as u64,
        ),
        EventType::Cancel => {}
    }
}

fn record_emissions(emissions: &Emissions, metrics: &PipelineMetrics, latest_depth: &LatestDepth) {
    for batch in &emissions.batches {
        metrics.increment_batches_emitted(batch.len() as u64);
        if let Some(snapshot) = batch.last() {
            latest_depth
                .write()
                .insert(snapshot.contract_id, snapshot.clone());
        }
    }

    metrics.increment_status_markers(emissions.statuses.len() as u64);
    let stuck = emissions.statuses.iter().filter(|s| s.stuck).count();
    metrics.set_stuck_keys(stuck as u64);
    for status in emissions.statuses.iter().filter(|s| s.stuck) {
        warn!(
            "Key {} stuck: expecting sequence {}, {} buffered",
            status.key, status.expected_sequence, status.buffered
        );
    }
}

fn spawn_stats_loop(metrics: Arc<PipelineMetrics>, latest_depth: LatestDepth) {
    tokio::spawn(async move {
        let mut applied_rate = ThroughputCollector::new(Duration::from_secs(10));
        let mut ticker = interval(Duration::from_secs(10));

        loop {
            ticker.tick().await;

            let applied = metrics.get_events_applied();
            let counted = applied_rate.total();
            if applied > counted {
                applied_rate.add(applied - counted);
            }
            if let Some(stats) = applied_rate.collect() {
                info!(
                    "🚀 Applying {:.0} events/sec ({} total)",
                    stats.rate, stats.total
                );
            }

            let depths = latest_depth.read().clone();
            for (contract_id, events, trades) in metrics.contract_stats() {
                let book_line = depths
                    .get(&contract_id)
                    .map(describe_depth)
                    .unwrap_or_else(|| "book empty".to_string());
                info!(
                    "📊 contract {} | events: {} | trades: {} | {}",
                    contract_id, events, trades, book_line
                );
            }
        }
    });
}

/// One-line summary of a depth snapshot
fn describe_depth(depth: &MarketDepth) -> String {
    let best_bid = depth
        .bids
        .first()
        .map(|l| format!("{} x {}", format_price(l.price, TICK_SIZE), l.quantity))
        .unwrap_or_else(|| "-".to_string());
    let best_ask = depth
        .asks
        .first()
        .map(|l| format!("{} x {}", format_price(l.price, TICK_SIZE), l.quantity))
        .unwrap_or_else(|| "-".to_string());
    let trade = depth
        .last_trade
        .map(|t| format!(" | last {} x {}", format_price(t.price, TICK_SIZE), t.quantity))
        .unwrap_or_default();

    format!(
        "seq {} | bid {} | ask {}{}",
        depth.sequence, best_bid, best_ask, trade
    )
}

/// Install the Prometheus recorder for the metrics facade
fn start_metrics_exporter() -> Result<(), Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let builder = PrometheusBuilder::new();
    builder.install()?;

    info!("Prometheus metrics recorder installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderbook_depth_engine::QuantityAtPrice;

    #[test]
    fn test_describe_depth() {
        let depth = MarketDepth {
            contract_id: 1,
            sequence: 12,
            bids: vec![QuantityAtPrice {
                price: 102,
                quantity: 20,
            }],
            asks: vec![],
            last_trade: Some(QuantityAtPrice {
                price: 102,
                quantity: 30,
            }),
        };

        assert_eq!(
            describe_depth(&depth),
            "seq 12 | bid $1.02 x 20 | ask - | last $1.02 x 30"
        );
    }
}
