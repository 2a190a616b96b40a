use dashmap::DashMap;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::info;

use crate::orderbook::types::{ContractId, Quantity};
use crate::utils::time::LatencyTimer;

pub mod collectors;

/// Metrics for the simulate -> match -> reconcile pipeline.
///
/// Atomic counters shared across simulator worker threads and the builder
/// thread; per-contract counts live in a concurrent map so each thread
/// records its own contract without coordination.
#[derive(Debug)]
pub struct PipelineMetrics {
    // Latency tracking
    apply_event_latency: LatencyTracker,
    emit_batch_latency: LatencyTracker,

    // Throughput counters
    orders_generated: AtomicU64,
    trades_executed: AtomicU64,
    events_applied: AtomicU64,
    duplicates_dropped: AtomicU64,
    batches_emitted: AtomicU64,
    snapshots_emitted: AtomicU64,
    status_markers: AtomicU64,

    // Volume tracking
    total_volume: AtomicU64,
    total_notional: AtomicU64,

    per_contract: DashMap<ContractId, ContractCounters>,
}

#[derive(Debug, Default)]
struct ContractCounters {
    events: AtomicU64,
    trades: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        // Register metric descriptions
        describe_counter!("pipeline_orders_total", "Total synthetic orders generated");
        describe_counter!("pipeline_trades_total", "Total fills produced by matching");
        describe_counter!(
            "pipeline_events_applied_total",
            "Events applied to depth projections"
        );
        describe_counter!(
            "pipeline_duplicates_dropped_total",
            "Redelivered events dropped by the sequence check"
        );
        describe_counter!("pipeline_batches_total", "Depth snapshot batches flushed");
        describe_counter!("pipeline_status_markers_total", "Liveness markers emitted");
        describe_histogram!(
            "pipeline_operation_duration_seconds",
            "Duration of pipeline operations"
        );
        describe_gauge!("pipeline_tracked_keys", "Keys known to the depth builder");
        describe_gauge!(
            "pipeline_buffered_events",
            "Out-of-order events waiting for their gap to close"
        );
        describe_gauge!("pipeline_stuck_keys", "Keys currently reported stuck");

        Self {
            apply_event_latency: LatencyTracker::new("apply_event"),
            emit_batch_latency: LatencyTracker::new("emit_batch"),
            orders_generated: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            events_applied: AtomicU64::new(0),
            duplicates_dropped: AtomicU64::new(0),
            batches_emitted: AtomicU64::new(0),
            snapshots_emitted: AtomicU64::new(0),
            status_markers: AtomicU64::new(0),
            total_volume: AtomicU64::new(0),
            total_notional: AtomicU64::new(0),
            per_contract: DashMap::new(),
        }
    }

    // Latency measurement methods
    pub fn time_apply_event<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.apply_event_latency.time(f)
    }

    pub fn time_emit_batch<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.emit_batch_latency.time(f)
    }

    // Counter methods
    pub fn increment_orders_generated(&self, contract_id: ContractId) {
        self.orders_generated.fetch_add(1, Ordering::Relaxed);
        self.contract(contract_id).events.fetch_add(1, Ordering::Relaxed);
        counter!("pipeline_orders_total").increment(1);
    }

    pub fn increment_trades_executed(
        &self,
        contract_id: ContractId,
        quantity: Quantity,
        notional: u64,
    ) {
        self.trades_executed.fetch_add(1, Ordering::Relaxed);
        self.total_volume.fetch_add(quantity, Ordering::Relaxed);
        self.total_notional.fetch_add(notional, Ordering::Relaxed);
        self.contract(contract_id).trades.fetch_add(1, Ordering::Relaxed);

        counter!("pipeline_trades_total").increment(1);
    }

    pub fn increment_events_applied(&self, count: u64) {
        self.events_applied.fetch_add(count, Ordering::Relaxed);
        counter!("pipeline_events_applied_total").increment(count);
    }

    pub fn increment_duplicates_dropped(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
        counter!("pipeline_duplicates_dropped_total").increment(1);
    }

    pub fn increment_batches_emitted(&self, records: u64) {
        self.batches_emitted.fetch_add(1, Ordering::Relaxed);
        self.snapshots_emitted.fetch_add(records, Ordering::Relaxed);
        counter!("pipeline_batches_total").increment(1);
    }

    pub fn increment_status_markers(&self, count: u64) {
        self.status_markers.fetch_add(count, Ordering::Relaxed);
        counter!("pipeline_status_markers_total").increment(count);
    }

    // Gauge methods
    pub fn set_tracked_keys(&self, count: u64) {
        gauge!("pipeline_tracked_keys").set(count as f64);
    }

    pub fn set_buffered_events(&self, count: u64) {
        gauge!("pipeline_buffered_events").set(count as f64);
    }

    pub fn set_stuck_keys(&self, count: u64) {
        gauge!("pipeline_stuck_keys").set(count as f64);
    }

    // Getters for current values
    pub fn get_orders_generated(&self) -> u64 {
        self.orders_generated.load(Ordering::Relaxed)
    }

    pub fn get_trades_executed(&self) -> u64 {
        self.trades_executed.load(Ordering::Relaxed)
    }

    pub fn get_events_applied(&self) -> u64 {
        self.events_applied.load(Ordering::Relaxed)
    }

    pub fn get_duplicates_dropped(&self) -> u64 {
        self.duplicates_dropped.load(Ordering::Relaxed)
    }

    pub fn get_batches_emitted(&self) -> u64 {
        self.batches_emitted.load(Ordering::Relaxed)
    }

    pub fn get_snapshots_emitted(&self) -> u64 {
        self.snapshots_emitted.load(Ordering::Relaxed)
    }

    pub fn get_status_markers(&self) -> u64 {
        self.status_markers.load(Ordering::Relaxed)
    }

    pub fn get_total_volume(&self) -> u64 {
        self.total_volume.load(Ordering::Relaxed)
    }

    pub fn get_total_notional(&self) -> u64 {
        self.total_notional.load(Ordering::Relaxed)
    }

    /// Per-contract (events, trades) counts, sorted by contract id
    pub fn contract_stats(&self) -> Vec<(ContractId, u64, u64)> {
        let mut stats: Vec<_> = self
            .per_contract
            .iter()
            .map(|entry| {
                (
                    *entry.key(),
                    entry.value().events.load(Ordering::Relaxed),
                    entry.value().trades.load(Ordering::Relaxed),
                )
            })
            .collect();
        stats.sort_by_key(|(contract_id, _, _)| *contract_id);
        stats
    }

    pub fn get_latency_stats(&self) -> LatencyStats {
        LatencyStats {
            apply_event: self.apply_event_latency.get_stats(),
            emit_batch: self.emit_batch_latency.get_stats(),
        }
    }

    fn contract(&self, contract_id: ContractId) -> dashmap::mapref::one::Ref<'_, ContractId, ContractCounters> {
        self.per_contract.entry(contract_id).or_default().downgrade()
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency tracker for individual operations
#[derive(Debug)]
struct LatencyTracker {
    operation: String,
    samples: AtomicU64,
    total_nanos: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl LatencyTracker {
    fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            samples: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
            min_nanos: AtomicU64::new(u64::MAX),
            max_nanos: AtomicU64::new(0),
        }
    }

    fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let timer = LatencyTimer::start();
        let result = f();
        self.record_latency(timer.stop());
        result
    }

    fn record_latency(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;

        self.samples.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);

        // Update min (with CAS loop)
        let mut current_min = self.min_nanos.load(Ordering::Relaxed);
        while nanos < current_min {
            match self.min_nanos.compare_exchange_weak(
                current_min,
                nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(new_min) => current_min = new_min,
            }
        }

        // Update max (with CAS loop)
        let mut current_max = self.max_nanos.load(Ordering::Relaxed);
        while nanos > current_max {
            match self.max_nanos.compare_exchange_weak(
                current_max,
                nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(new_max) => current_max = new_max,
            }
        }

        histogram!("pipeline_operation_duration_seconds", "operation" => self.operation.clone())
            .record(duration.as_secs_f64());
    }

    fn get_stats(&self) -> OperationLatencyStats {
        let samples = self.samples.load(Ordering::Relaxed);
        let total = self.total_nanos.load(Ordering::Relaxed);
        let min = self.min_nanos.load(Ordering::Relaxed);
        let max = self.max_nanos.load(Ordering::Relaxed);

        let avg = if samples > 0 { total / samples } else { 0 };

        OperationLatencyStats {
            operation: self.operation.clone(),
            samples,
            avg_nanos: avg,
            min_nanos: if min == u64::MAX { 0 } else { min },
            max_nanos: max,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LatencyStats {
    pub apply_event: OperationLatencyStats,
    pub emit_batch: OperationLatencyStats,
}

#[derive(Debug, Clone)]
pub struct OperationLatencyStats {
    pub operation: String,
    pub samples: u64,
    pub avg_nanos: u64,
    pub min_nanos: u64,
    pub max_nanos: u64,
}

impl OperationLatencyStats {
    pub fn avg_micros(&self) -> f64 {
        self.avg_nanos as f64 / 1_000.0
    }

    pub fn min_micros(&self) -> f64 {
        self.min_nanos as f64 / 1_000.0
    }

    pub fn max_micros(&self) -> f64 {
        self.max_nanos as f64 / 1_000.0
    }
}

/// Background metrics reporter
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval: Duration) -> Self {
        Self { metrics, interval }
    }

    pub async fn run(&self) {
        let mut interval = interval(self.interval);

        loop {
            interval.tick().await;

            let stats = self.metrics.get_latency_stats();

            info!(
                "Pipeline Metrics - Orders: {} | Trades: {} | Applied: {} | Dups: {} | Batches: {} | Latency (μs): apply={:.2} emit={:.2}",
                self.metrics.get_orders_generated(),
                self.metrics.get_trades_executed(),
                self.metrics.get_events_applied(),
                self.metrics.get_duplicates_dropped(),
                self.metrics.get_batches_emitted(),
                stats.apply_event.avg_micros(),
                stats.emit_batch.avg_micros()
            );
        }
    }
}
