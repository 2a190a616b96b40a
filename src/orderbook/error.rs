use serde::{Deserialize, Serialize};
use std::fmt;

use crate::orderbook::types::{ContractId, Price, Quantity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderBookError {
    /// Price must be strictly positive
    InvalidPrice(Price),

    /// Quantity must be strictly positive
    InvalidQuantity(Quantity),

    /// Order was routed to an engine for a different contract
    ContractMismatch {
        engine: ContractId,
        order: ContractId,
    },

    /// An order with this id is already resting in the book
    DuplicateOrder(u64),
}

impl fmt::Display for OrderBookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderBookError::InvalidPrice(price) => write!(f, "Invalid price: {}", price),
            OrderBookError::InvalidQuantity(quantity) => {
                write!(f, "Invalid quantity: {}", quantity)
            }
            OrderBookError::ContractMismatch { engine, order } => write!(
                f,
                "Order for contract {} routed to engine for contract {}",
                order, engine
            ),
            OrderBookError::DuplicateOrder(id) => write!(f, "Order {} already resting", id),
        }
    }
}

impl std::error::Error for OrderBookError {}

/// Result type for order book operations
pub type OrderBookResult<T> = Result<T, OrderBookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            OrderBookError::InvalidPrice(-5).to_string(),
            "Invalid price: -5"
        );
        assert_eq!(
            OrderBookError::InvalidQuantity(0).to_string(),
            "Invalid quantity: 0"
        );
        assert_eq!(
            OrderBookError::ContractMismatch { engine: 1, order: 2 }.to_string(),
            "Order for contract 2 routed to engine for contract 1"
        );
    }

    #[test]
    fn test_error_serialization() {
        let error = OrderBookError::InvalidPrice(0);
        let serialized = serde_json::to_string(&error).unwrap();
        let deserialized: OrderBookError = serde_json::from_str(&serialized).unwrap();
        assert_eq!(error, deserialized);
    }
}
