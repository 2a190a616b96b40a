use std::collections::{BTreeMap, HashMap};

use crate::orderbook::price_level::{LevelFill, PriceLevel, RestingOrder};
use crate::orderbook::types::{
    Order, OrderId, OrderLocation, Price, Quantity, QuantityAtPrice, Side,
};

/// Per-contract resting book state: price levels per side plus an order-id
/// lookup for cancellation.
///
/// Exclusively owned by one matching engine instance; never shared across
/// contracts or threads. Plain owned collections, no internal locking.
#[derive(Debug, Default)]
pub struct OrderBookState {
    bids: BTreeMap<Price, PriceLevel>, // iterated descending
    asks: BTreeMap<Price, PriceLevel>, // iterated ascending
    order_locations: HashMap<OrderId, OrderLocation>,
}

impl OrderBookState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current best bid price
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    /// Current best ask price
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    /// Best price on the given side
    pub fn best_price(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.best_bid(),
            Side::Sell => self.best_ask(),
        }
    }

    /// True when both sides are populated and bid >= ask.
    /// Holding the matching invariant means this is never true between calls.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    /// Is this order id currently resting?
    pub fn contains_order(&self, order_id: OrderId) -> bool {
        self.order_locations.contains_key(&order_id)
    }

    /// Append a remainder to its limit price level (FIFO) and track it
    pub fn insert_resting(&mut self, order: &Order, remaining: Quantity) {
        let levels = self.side_mut(order.side);
        levels
            .entry(order.price)
            .or_insert_with(|| PriceLevel::new(order.price))
            .add_order(order.id, remaining);

        self.order_locations.insert(
            order.id,
            OrderLocation {
                side: order.side,
                price: order.price,
            },
        );
    }

    /// Unlink a resting order, shrinking or dropping its level.
    /// Returns the order and the side/price it rested at, None if absent.
    pub fn remove_resting(&mut self, order_id: OrderId) -> Option<(OrderLocation, RestingOrder)> {
        let location = self.order_locations.remove(&order_id)?;
        let levels = self.side_mut(location.side);

        let level = levels.get_mut(&location.price)?;
        let order = level.remove_order(order_id)?;
        if level.is_empty() {
            levels.remove(&location.price);
        }

        Some((location, order))
    }

    /// Take up to `requested` from the level at `price` on `side`, oldest
    /// orders first. Exhausted counterparties are dropped from the lookup and
    /// an emptied level is removed.
    pub fn fill_at(&mut self, side: Side, price: Price, requested: Quantity) -> Vec<LevelFill> {
        let levels = self.side_mut(side);
        let Some(level) = levels.get_mut(&price) else {
            return Vec::new();
        };

        let fills = level.take_quantity(requested);
        if level.is_empty() {
            levels.remove(&price);
        }

        for fill in &fills {
            if fill.remaining == 0 {
                self.order_locations.remove(&fill.order_id);
            }
        }

        fills
    }

    /// Aggregate quantity resting at one price, 0 if the level is absent
    pub fn quantity_at(&self, side: Side, price: Price) -> Quantity {
        self.side(side)
            .get(&price)
            .map(|level| level.total_quantity())
            .unwrap_or(0)
    }

    /// Total number of resting orders
    pub fn total_orders(&self) -> usize {
        self.order_locations.len()
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Top-N levels, bids descending / asks ascending
    pub fn top_levels(&self, side: Side, depth: usize) -> Vec<QuantityAtPrice> {
        let levels = self.side(side);
        let iter: Box<dyn Iterator<Item = (&Price, &PriceLevel)> + '_> = match side {
            Side::Buy => Box::new(levels.iter().rev()),
            Side::Sell => Box::new(levels.iter()),
        };

        iter.take(depth)
            .map(|(price, level)| QuantityAtPrice {
                price: *price,
                quantity: level.total_quantity(),
            })
            .collect()
    }

    fn side(&self, side: Side) -> &BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Price, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }
}

/// Point-in-time book statistics
#[derive(Debug, Clone)]
pub struct BookStats {
    pub total_orders: usize,
    pub bid_levels: usize,
    pub ask_levels: usize,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub spread: Option<Price>,
}

impl OrderBookState {
    pub fn stats(&self) -> BookStats {
        let spread = match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        };

        BookStats {
            total_orders: self.total_orders(),
            bid_levels: self.bid_levels(),
            ask_levels: self.ask_levels(),
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            spread,
        }
    }
}
