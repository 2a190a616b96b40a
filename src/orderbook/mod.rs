//! Core order book implementation module
//!
//! Contains the shared domain model, the per-contract resting book state and
//! the price-time priority matching engine that turns incoming orders into
//! ordered event streams.

pub mod book;
pub mod error;
pub mod matching;
pub mod price_level;
pub mod types;

// Re-export main types for convenience
pub use book::{BookStats, OrderBookState};
pub use error::{OrderBookError, OrderBookResult};
pub use matching::MatchingEngine;
pub use price_level::{LevelFill, PriceLevel, RestingOrder};
pub use types::{
    ContractId, EventType, MarketDepth, Order, OrderBookEvent, OrderId, OrderLocation, Price,
    Quantity, QuantityAtPrice, SequenceNumber, SessionContractKey, Side,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let mut engine = MatchingEngine::new(1);
        let order = Order::new(1, 1, Side::Buy, 100, 10);
        let events = engine.add(order).unwrap();
        assert_eq!(events.len(), 1);
    }
}
