use serde::{Deserialize, Serialize};
use std::fmt;

pub type ContractId = u64;
pub type OrderId = u64;
pub type Price = i64; // Price in ticks (e.g., 1 tick = 0.01 cents)
pub type Quantity = u64;
pub type SequenceNumber = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side of the book an incoming order matches against
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    New,
    Cancel,
    Fill,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::New => write!(f, "NEW"),
            EventType::Cancel => write!(f, "CANCEL"),
            EventType::Fill => write!(f, "FILL"),
        }
    }
}

/// A limit order as submitted by a producer (simulator or external feed).
///
/// The producer assigns the id; the engine only consumes it. Remaining
/// quantity is tracked inside the book once the order rests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub contract_id: ContractId,
    pub id: OrderId,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
}

impl Order {
    pub fn new(
        contract_id: ContractId,
        id: OrderId,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        Self {
            contract_id,
            id,
            side,
            price,
            quantity,
        }
    }
}

/// Append-only per-contract log entry produced by the matching engine.
///
/// `sequence` is monotonic per contract starting at 0. `quantity` carries the
/// resting quantity for NEW, the canceled quantity for CANCEL, and the
/// counterparty's remaining quantity after the fill for FILL.
/// `quantity_filled` is 0 unless FILL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookEvent {
    pub contract_id: ContractId,
    pub sequence: SequenceNumber,
    pub event_type: EventType,
    pub side: Side,
    pub order_id: OrderId,
    pub price: Price,
    pub quantity: Quantity,
    pub quantity_filled: Quantity,
}

/// Aggregate quantity resting at one price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityAtPrice {
    pub price: Price,
    pub quantity: Quantity,
}

/// Read-only top-of-book snapshot emitted by the depth builder.
///
/// `sequence` is the watermark: the event stream is fully applied through it.
/// Bids are sorted descending, asks ascending, both truncated to the
/// configured depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDepth {
    pub contract_id: ContractId,
    pub sequence: SequenceNumber,
    pub bids: Vec<QuantityAtPrice>,
    pub asks: Vec<QuantityAtPrice>,
    pub last_trade: Option<QuantityAtPrice>,
}

/// Partition unit for ordered reconciliation: one contract within one
/// processing session. Totally ordered and serializable so a host can key,
/// shuffle and checkpoint by it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionContractKey {
    pub session_id: String,
    pub contract_id: ContractId,
}

impl SessionContractKey {
    pub fn new(session_id: impl Into<String>, contract_id: ContractId) -> Self {
        Self {
            session_id: session_id.into(),
            contract_id,
        }
    }
}

impl fmt::Display for SessionContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.contract_id)
    }
}

/// Where a resting order lives, for O(1) cancellation
#[derive(Debug, Clone, Copy)]
pub struct OrderLocation {
    pub side: Side,
    pub price: Price,
}
