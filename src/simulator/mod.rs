//! Discrete-event market simulator
//!
//! Generates a temporally ordered, reproducible stream of synthetic orders,
//! cancels and decaying trade-impact actions, one independent generator per
//! contract. Generators run on rayon worker threads and multiplex their event
//! batches into one shared channel; ordering across contracts is advisory
//! only, and the depth builder downstream is what restores order per key.

pub mod generator;
pub mod scheduler;

use std::fmt;

use crossbeam::channel::Sender;
use rayon::prelude::*;
use tracing::info;

use crate::orderbook::types::{ContractId, OrderBookEvent, Price, Quantity};

pub use generator::ContractSimulator;
pub use scheduler::{Action, ActionQueue};

#[derive(Debug, Clone, PartialEq)]
pub enum SimulatorError {
    /// Midprice must be strictly positive
    InvalidMidprice(Price),

    /// Quantity range must satisfy 0 < min <= max
    InvalidQuantityRange { min: Quantity, max: Quantity },

    /// Price range must be strictly positive
    InvalidPriceRange(f64),

    /// Bias and perturbation probabilities must lie in [0, 1]
    InvalidProbability(f64),

    /// Contract range must be non-empty
    InvalidContractRange { start: ContractId, end: ContractId },
}

impl fmt::Display for SimulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatorError::InvalidMidprice(midprice) => {
                write!(f, "Invalid midprice: {}", midprice)
            }
            SimulatorError::InvalidQuantityRange { min, max } => {
                write!(f, "Invalid quantity range: [{}, {}]", min, max)
            }
            SimulatorError::InvalidPriceRange(range) => {
                write!(f, "Invalid price range: {}", range)
            }
            SimulatorError::InvalidProbability(p) => {
                write!(f, "Probability out of [0, 1]: {}", p)
            }
            SimulatorError::InvalidContractRange { start, end } => {
                write!(f, "Invalid contract range: [{}, {})", start, end)
            }
        }
    }
}

impl std::error::Error for SimulatorError {}

/// Simulator configuration, one instance shared by all contract generators.
///
/// Defaults: quantities uniform in [10, 100], price offsets uniform over a
/// 10-tick band shifted 3 ticks away from the midprice per side, orders
/// cancelled 50 ticks after resting and trade impact decaying 50 ticks after
/// each fill.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub midprice: Price,
    /// Total orders to generate per contract, 0 = unlimited
    pub order_count: u64,
    /// Non-zero for bit-for-bit reproducible runs, 0 = seed from entropy
    pub seed: u64,
    pub min_qty: Quantity,
    pub max_qty: Quantity,
    pub price_range: f64,
    pub price_shift: f64,
    pub resting_timeout_ticks: u64,
    pub impact_decay_ticks: u64,
    pub buy_sell_bias: f64,
    /// Per-order probability of re-drawing the buy/sell bias, 0 = fixed bias
    pub bias_perturbation_probability: f64,
    pub start_contract: ContractId,
    /// Exclusive upper bound of the contract id range
    pub end_contract: ContractId,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            midprice: 100,
            order_count: 0,
            seed: 0,
            min_qty: 10,
            max_qty: 100,
            price_range: 10.0,
            price_shift: 3.0,
            resting_timeout_ticks: 50,
            impact_decay_ticks: 50,
            buy_sell_bias: 0.5,
            bias_perturbation_probability: 0.0,
            start_contract: 1,
            end_contract: 2,
        }
    }
}

impl SimulatorConfig {
    /// Reject invalid configuration before any generator is built
    pub fn validate(&self) -> Result<(), SimulatorError> {
        if self.midprice <= 0 {
            return Err(SimulatorError::InvalidMidprice(self.midprice));
        }
        if self.min_qty == 0 || self.max_qty < self.min_qty {
            return Err(SimulatorError::InvalidQuantityRange {
                min: self.min_qty,
                max: self.max_qty,
            });
        }
        if self.price_range <= 0.0 {
            return Err(SimulatorError::InvalidPriceRange(self.price_range));
        }
        for p in [self.buy_sell_bias, self.bias_perturbation_probability] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SimulatorError::InvalidProbability(p));
            }
        }
        if self.end_contract <= self.start_contract {
            return Err(SimulatorError::InvalidContractRange {
                start: self.start_contract,
                end: self.end_contract,
            });
        }
        Ok(())
    }

    pub fn contract_count(&self) -> u64 {
        self.end_contract - self.start_contract
    }
}

/// Run one generator per configured contract, fanned across the rayon pool,
/// multiplexing non-empty event batches into `sink`.
///
/// Blocks until every generator's schedule is exhausted (or forever for an
/// unlimited order budget); callers normally hand this its own thread.
/// Returns early per contract if the receiving side hangs up.
pub fn run_to_sink(
    config: &SimulatorConfig,
    sink: Sender<Vec<OrderBookEvent>>,
) -> Result<(), SimulatorError> {
    config.validate()?;

    info!(
        "starting {} contract simulator(s) for contracts [{}, {})",
        config.contract_count(),
        config.start_contract,
        config.end_contract
    );

    (config.start_contract..config.end_contract)
        .into_par_iter()
        .for_each_with(sink, |sink, contract_id| {
            // Config is pre-validated, so construction cannot fail here
            let Ok(sim) = ContractSimulator::new(config, contract_id) else {
                return;
            };

            for batch in sim {
                if batch.is_empty() {
                    continue;
                }
                if sink.send(batch).is_err() {
                    info!("contract {}: sink closed, stopping", contract_id);
                    break;
                }
            }
        });

    Ok(())
}
