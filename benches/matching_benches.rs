use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use orderbook_depth_engine::depth::DepthProjection;
use orderbook_depth_engine::orderbook::{MatchingEngine, Order, Side};

/// A book with resting liquidity on both sides, away from the midprice
fn seeded_engine() -> MatchingEngine {
    let mut engine = MatchingEngine::new(1);
    for i in 0..50 {
        engine
            .add(Order::new(1, i * 2, Side::Buy, 9_990 - i as i64, 100))
            .unwrap();
        engine
            .add(Order::new(1, i * 2 + 1, Side::Sell, 10_010 + i as i64, 100))
            .unwrap();
    }
    engine
}

fn bench_add_resting_order(c: &mut Criterion) {
    c.bench_function("add_resting_order", |b| {
        b.iter_batched_ref(
            seeded_engine,
            |engine| {
                engine
                    .add(Order::new(1, 1_000, Side::Buy, black_box(9_950), 100))
                    .unwrap()
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_add_crossing_order(c: &mut Criterion) {
    c.bench_function("add_crossing_order", |b| {
        b.iter_batched_ref(
            seeded_engine,
            |engine| {
                // Sweeps several ask levels
                engine
                    .add(Order::new(1, 1_000, Side::Buy, black_box(10_014), 450))
                    .unwrap()
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_cancel_order(c: &mut Criterion) {
    c.bench_function("cancel_order", |b| {
        b.iter_batched_ref(
            seeded_engine,
            |engine| engine.remove(black_box(42)),
            BatchSize::SmallInput,
        )
    });
}

fn bench_projection_apply(c: &mut Criterion) {
    let mut engine = seeded_engine();
    let mut events = Vec::new();
    for i in 0..100u64 {
        let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
        let price = 10_000 + (i as i64 % 7) - 3;
        events.extend(engine.add(Order::new(1, 1_000 + i, side, price, 50)).unwrap());
    }

    c.bench_function("projection_apply_stream", |b| {
        b.iter(|| {
            let mut projection = DepthProjection::new(1);
            for event in &events {
                projection.apply(black_box(event)).unwrap();
            }
            projection
        })
    });
}

criterion_group!(
    benches,
    bench_add_resting_order,
    bench_add_crossing_order,
    bench_cancel_order,
    bench_projection_apply
);
criterion_main!(benches);
