use tracing::debug;

use crate::orderbook::book::OrderBookState;
use crate::orderbook::error::{OrderBookError, OrderBookResult};
use crate::orderbook::types::{
    ContractId, EventType, Order, OrderBookEvent, OrderId, SequenceNumber, Side,
};

/// Price-time priority matching engine for one contract.
///
/// Owns the resting book exclusively and is the only producer of
/// `OrderBookEvent`s for its contract; `sequence` is monotonic from 0.
/// Self-trading is not detected or prevented; producers are expected to
/// keep order origins distinct.
#[derive(Debug)]
pub struct MatchingEngine {
    contract_id: ContractId,
    book: OrderBookState,
    next_sequence: SequenceNumber,
}

impl MatchingEngine {
    pub fn new(contract_id: ContractId) -> Self {
        Self {
            contract_id,
            book: OrderBookState::new(),
            next_sequence: 0,
        }
    }

    pub fn contract_id(&self) -> ContractId {
        self.contract_id
    }

    /// Sequence number the next event will carry
    pub fn sequence(&self) -> SequenceNumber {
        self.next_sequence
    }

    /// Read access to the resting book
    pub fn book(&self) -> &OrderBookState {
        &self.book
    }

    /// Match an incoming limit order, resting any remainder.
    ///
    /// Emits one FILL per matched counterparty (side and price of the resting
    /// order; the trade price is the resting price), then one NEW if any
    /// quantity rests. Malformed input is rejected with no state change.
    pub fn add(&mut self, order: Order) -> OrderBookResult<Vec<OrderBookEvent>> {
        if order.price <= 0 {
            return Err(OrderBookError::InvalidPrice(order.price));
        }
        if order.quantity == 0 {
            return Err(OrderBookError::InvalidQuantity(order.quantity));
        }
        if order.contract_id != self.contract_id {
            return Err(OrderBookError::ContractMismatch {
                engine: self.contract_id,
                order: order.contract_id,
            });
        }
        if self.book.contains_order(order.id) {
            return Err(OrderBookError::DuplicateOrder(order.id));
        }

        debug!(
            "contract {}: add order {} {} {}@{}",
            self.contract_id, order.id, order.side, order.quantity, order.price
        );

        let mut events = Vec::new();
        let mut remaining = order.quantity;
        let opposite = order.side.opposite();

        while remaining > 0 {
            let Some(best_price) = self.book.best_price(opposite) else {
                break;
            };

            let crosses = match order.side {
                Side::Buy => order.price >= best_price,
                Side::Sell => order.price <= best_price,
            };
            if !crosses {
                break;
            }

            // Oldest resting orders at the best opposite level first;
            // the trade executes at the resting price.
            for fill in self.book.fill_at(opposite, best_price, remaining) {
                remaining -= fill.quantity;
                events.push(OrderBookEvent {
                    contract_id: self.contract_id,
                    sequence: self.next_sequence(),
                    event_type: EventType::Fill,
                    side: opposite,
                    order_id: fill.order_id,
                    price: best_price,
                    quantity: fill.remaining,
                    quantity_filled: fill.quantity,
                });
            }
        }

        if remaining > 0 {
            self.book.insert_resting(&order, remaining);
            events.push(OrderBookEvent {
                contract_id: self.contract_id,
                sequence: self.next_sequence(),
                event_type: EventType::New,
                side: order.side,
                order_id: order.id,
                price: order.price,
                quantity: remaining,
                quantity_filled: 0,
            });
        }

        debug_assert!(!self.book.is_crossed());
        Ok(events)
    }

    /// Cancel a resting order by id.
    ///
    /// Emits one CANCEL with the canceled quantity, or nothing if the id is
    /// not resting (already filled or canceled). Idempotent, so duplicate or
    /// stale cancel requests are harmless.
    pub fn remove(&mut self, order_id: OrderId) -> Vec<OrderBookEvent> {
        let Some((location, order)) = self.book.remove_resting(order_id) else {
            debug!(
                "contract {}: cancel for unknown order {}, ignoring",
                self.contract_id, order_id
            );
            return Vec::new();
        };

        debug!(
            "contract {}: cancelled order {}, {} remaining",
            self.contract_id, order_id, order.remaining
        );

        vec![OrderBookEvent {
            contract_id: self.contract_id,
            sequence: self.next_sequence(),
            event_type: EventType::Cancel,
            side: location.side,
            order_id,
            price: location.price,
            quantity: order.remaining,
            quantity_filled: 0,
        }]
    }

    fn next_sequence(&mut self) -> SequenceNumber {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}
