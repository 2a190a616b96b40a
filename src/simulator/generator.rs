use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::orderbook::matching::MatchingEngine;
use crate::orderbook::types::{ContractId, Order, OrderBookEvent, OrderId, Price, Quantity, Side};
use crate::simulator::scheduler::{Action, ActionQueue};
use crate::simulator::{SimulatorConfig, SimulatorError};

/// Delay before the next order is generated
const NEXT_ORDER_DELAY_TICKS: u64 = 1;
/// Distance-from-anchor band feeding the quadratic restoring pull
const ANCHOR_BAND: i64 = 50;
const REVERSION_GAIN: f64 = 3.0;
/// Clamp for the perturbed buy/sell bias
const BIAS_MIN: f64 = 0.35;
const BIAS_MAX: f64 = 0.65;

/// Synthetic order-flow generator for one contract.
///
/// Owns its own matching engine, random state and midprice walk; yields one
/// event batch per drained virtual-time action (a batch may be empty, e.g. a
/// cancel that lost the race against a fill). With a non-zero seed the full
/// sequence of orders, fills, cancels and timings is reproducible.
pub struct ContractSimulator {
    config: SimulatorConfig,
    contract_id: ContractId,
    engine: MatchingEngine,
    queue: ActionQueue,
    rng: ChaCha8Rng,
    anchor_midprice: Price,
    midprice: Price,
    buy_sell_bias: f64,
    trailing_shares: i64,
    trailing_notional: f64,
    remaining_orders: i64,
    next_order_id: OrderId,
    orders_generated: u64,
}

impl ContractSimulator {
    pub fn new(config: &SimulatorConfig, contract_id: ContractId) -> Result<Self, SimulatorError> {
        config.validate()?;

        let rng = if config.seed != 0 {
            ChaCha8Rng::seed_from_u64(config.seed)
        } else {
            ChaCha8Rng::from_entropy()
        };

        let mut queue = ActionQueue::new();
        queue.schedule(0, Action::GenerateOrder);

        Ok(Self {
            contract_id,
            engine: MatchingEngine::new(contract_id),
            queue,
            rng,
            anchor_midprice: config.midprice,
            midprice: config.midprice,
            buy_sell_bias: config.buy_sell_bias,
            trailing_shares: 0,
            trailing_notional: 0.0,
            remaining_orders: config.order_count as i64,
            next_order_id: 1,
            orders_generated: 0,
            config: config.clone(),
        })
    }

    pub fn contract_id(&self) -> ContractId {
        self.contract_id
    }

    /// Current virtual time in ticks
    pub fn virtual_time(&self) -> u64 {
        self.queue.now()
    }

    pub fn midprice(&self) -> Price {
        self.midprice
    }

    pub fn orders_generated(&self) -> u64 {
        self.orders_generated
    }

    /// Read access to this contract's engine (book inspection in tests/stats)
    pub fn engine(&self) -> &MatchingEngine {
        &self.engine
    }

    /// Drain the next scheduled action, returning its fire tick and the
    /// events it produced. None once the schedule is exhausted.
    pub fn next_batch(&mut self) -> Option<(u64, Vec<OrderBookEvent>)> {
        let (tick, action) = self.queue.pop()?;
        let events = match action {
            Action::GenerateOrder => self.generate_order(),
            Action::CancelOrder { order_id } => self.engine.remove(order_id),
            Action::DecayImpact { price, quantity } => {
                self.decay_impact(price, quantity);
                Vec::new()
            }
        };
        Some((tick, events))
    }

    fn generate_order(&mut self) -> Vec<OrderBookEvent> {
        let span = (self.config.max_qty - self.config.min_qty) as f64;
        let quantity = (self.config.min_qty as f64 + span * self.rng.gen::<f64>()) as Quantity;

        // Bias perturbation, off by default. The gate is drawn every order so
        // enabling the knob does not disturb the rest of a seeded sequence.
        if self.rng.gen::<f64>() < self.config.bias_perturbation_probability {
            self.buy_sell_bias = self.rng.gen::<f64>().clamp(BIAS_MIN, BIAS_MAX);
        }

        // Decay toward the trailing volume-weighted execution price
        if self.trailing_shares > 0 {
            self.midprice = (self.trailing_notional / self.trailing_shares as f64).round() as Price;
        }

        let mut offset =
            self.rng.gen::<f64>() * self.config.price_range - self.config.price_range / 2.0;

        // Quadratic restoring pull toward the anchor midprice. The multiplier
        // is drawn even at zero distance so the draw sequence stays stable.
        let reversion = self.rng.gen::<f64>();
        if self.midprice < self.anchor_midprice {
            let band = (self.anchor_midprice - self.midprice) / ANCHOR_BAND;
            offset += (band as f64).powi(2) * reversion * REVERSION_GAIN;
        } else {
            let band = (self.midprice - self.anchor_midprice) / ANCHOR_BAND;
            offset -= (band as f64).powi(2) * reversion * REVERSION_GAIN;
        }

        let (side, price) = if self.rng.gen::<f64>() < self.buy_sell_bias {
            let price = (self.midprice as f64 + offset - self.config.price_shift).round() as Price;
            (Side::Buy, price)
        } else {
            let price = (self.midprice as f64 + offset + self.config.price_shift).round() as Price;
            (Side::Sell, price)
        };

        let order_id = self.next_order_id;
        self.next_order_id += 1;
        let order = Order::new(self.contract_id, order_id, side, price, quantity);
        self.orders_generated += 1;

        // A budget of 0 counts down through -1 and never re-hits 0: unlimited.
        self.remaining_orders -= 1;
        if self.remaining_orders != 0 {
            self.queue
                .schedule(NEXT_ORDER_DELAY_TICKS, Action::GenerateOrder);
        }

        self.queue.schedule(
            self.config.resting_timeout_ticks,
            Action::CancelOrder { order_id },
        );

        let events = match self.engine.add(order) {
            Ok(events) => events,
            Err(err) => {
                warn!(
                    "contract {}: generated order {} rejected: {}",
                    self.contract_id, order_id, err
                );
                return Vec::new();
            }
        };

        for event in &events {
            if event.quantity_filled > 0 {
                self.register_execution(event.price, event.quantity_filled);
            }
        }

        debug!(
            "contract {}: tick {} order {} {} {}@{} -> {} events",
            self.contract_id,
            self.queue.now(),
            order_id,
            side,
            quantity,
            price,
            events.len()
        );

        events
    }

    /// A settled trade moves the walk and leaves a decaying impact on the
    /// trailing accumulators.
    fn register_execution(&mut self, price: Price, quantity: Quantity) {
        self.midprice = price;
        self.queue.schedule(
            self.config.impact_decay_ticks,
            Action::DecayImpact { price, quantity },
        );
        self.trailing_shares += quantity as i64;
        self.trailing_notional += quantity as f64 * price as f64;
    }

    /// Reverse one fill's contribution to the trailing volume/price state
    fn decay_impact(&mut self, price: Price, quantity: Quantity) {
        self.trailing_shares -= quantity as i64;
        self.trailing_notional -= quantity as f64 * price as f64;
    }
}

impl Iterator for ContractSimulator {
    type Item = Vec<OrderBookEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().map(|(_, events)| events)
    }
}
