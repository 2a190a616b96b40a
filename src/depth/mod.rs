//! Ordered reconciliation & market-depth builder
//!
//! Consumes a per-contract event stream that may arrive out of order and
//! more than once, buffers until contiguous, applies it to a per-key book
//! projection and emits bounded batches of market-depth snapshots plus
//! periodic liveness markers. Designed to run under a keyed host that
//! guarantees one active writer per key; all per-key state is plain
//! serializable data so a key can be checkpointed and resumed elsewhere.

pub mod handler;
pub mod processor;
pub mod projection;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::orderbook::types::{
    EventType, Price, Quantity, SequenceNumber, SessionContractKey, Side,
};

pub use handler::{InProcessHost, OrderedEventHandler};
pub use processor::{
    DepthBuilderConfig, Emissions, KeyPhase, KeyState, OrderedDepthProcessor, ProcessingStatus,
};
pub use projection::DepthProjection;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuilderError {
    /// Configuration rejected at construction time
    InvalidConfig(String),

    /// Event carries a non-positive price or a zero quantity
    MalformedEvent {
        sequence: SequenceNumber,
        event_type: EventType,
    },

    /// CANCEL or FILL against a price level the projection does not hold
    MissingLevel { side: Side, price: Price },

    /// CANCEL or FILL larger than the level's aggregate quantity
    LevelUnderflow {
        side: Side,
        price: Price,
        resting: Quantity,
        requested: Quantity,
    },

    /// Out-of-order buffer exceeded the configured hard bound; the key's
    /// partition cannot make progress without losing data
    BufferOverflow {
        key: SessionContractKey,
        buffered: usize,
    },
}

impl fmt::Display for BuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderError::InvalidConfig(reason) => write!(f, "Invalid configuration: {}", reason),
            BuilderError::MalformedEvent {
                sequence,
                event_type,
            } => write!(f, "Malformed {} event at sequence {}", event_type, sequence),
            BuilderError::MissingLevel { side, price } => {
                write!(f, "No {} level at price {}", side, price)
            }
            BuilderError::LevelUnderflow {
                side,
                price,
                resting,
                requested,
            } => write!(
                f,
                "{} level at {} holds {} but event removes {}",
                side, price, resting, requested
            ),
            BuilderError::BufferOverflow { key, buffered } => {
                write!(f, "Key {} buffered {} events past the hard bound", key, buffered)
            }
        }
    }
}

impl std::error::Error for BuilderError {}

/// Result type for depth builder operations
pub type BuilderResult<T> = Result<T, BuilderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BuilderError::MissingLevel {
                side: Side::Buy,
                price: 102
            }
            .to_string(),
            "No BUY level at price 102"
        );
        assert_eq!(
            BuilderError::MalformedEvent {
                sequence: 4,
                event_type: EventType::New
            }
            .to_string(),
            "Malformed NEW event at sequence 4"
        );
    }

    #[test]
    fn test_error_serialization() {
        let error = BuilderError::LevelUnderflow {
            side: Side::Sell,
            price: 105,
            resting: 10,
            requested: 25,
        };
        let serialized = serde_json::to_string(&error).unwrap();
        let deserialized: BuilderError = serde_json::from_str(&serialized).unwrap();
        assert_eq!(error, deserialized);
    }
}
