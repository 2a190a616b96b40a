use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::depth::{BuilderError, BuilderResult};
use crate::orderbook::types::{
    ContractId, EventType, MarketDepth, OrderBookEvent, Price, Quantity, QuantityAtPrice,
    SequenceNumber, Side,
};

/// Reconstructed aggregate book for one contract, built purely from its
/// event log, never from the live matching engine.
///
/// Plain serializable data: a host may checkpoint a projection and resume it
/// on another worker. The trailing last-trade fields are always maintained;
/// whether snapshots expose them is the caller's `with_trade` choice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthProjection {
    contract_id: ContractId,
    bids: BTreeMap<Price, Quantity>,
    asks: BTreeMap<Price, Quantity>,
    last_trade: Option<QuantityAtPrice>,
}

impl DepthProjection {
    pub fn new(contract_id: ContractId) -> Self {
        Self {
            contract_id,
            ..Self::default()
        }
    }

    pub fn contract_id(&self) -> ContractId {
        self.contract_id
    }

    /// Trailing last trade, regardless of the snapshot exposure flag
    pub fn last_trade(&self) -> Option<QuantityAtPrice> {
        self.last_trade
    }

    /// Apply one event to the aggregate levels.
    ///
    /// NEW grows a level, CANCEL shrinks one, FILL shrinks one and updates
    /// the trailing last trade. A malformed event or one that contradicts the
    /// projection (missing level, underflow) fails loudly without mutating.
    pub fn apply(&mut self, event: &OrderBookEvent) -> BuilderResult<()> {
        match event.event_type {
            EventType::New => {
                if event.price <= 0 || event.quantity == 0 {
                    return Err(malformed(event));
                }
                *self.side_mut(event.side).entry(event.price).or_insert(0) += event.quantity;
            }
            EventType::Cancel => {
                if event.price <= 0 || event.quantity == 0 {
                    return Err(malformed(event));
                }
                self.shrink(event.side, event.price, event.quantity)?;
            }
            EventType::Fill => {
                if event.price <= 0 || event.quantity_filled == 0 {
                    return Err(malformed(event));
                }
                self.shrink(event.side, event.price, event.quantity_filled)?;
                self.last_trade = Some(QuantityAtPrice {
                    price: event.price,
                    quantity: event.quantity_filled,
                });
            }
        }
        Ok(())
    }

    /// Top-N snapshot complete through `watermark`
    pub fn market_depth(
        &self,
        watermark: SequenceNumber,
        depth: usize,
        with_trade: bool,
    ) -> MarketDepth {
        MarketDepth {
            contract_id: self.contract_id,
            sequence: watermark,
            bids: self
                .bids
                .iter()
                .rev()
                .take(depth)
                .map(|(price, quantity)| QuantityAtPrice {
                    price: *price,
                    quantity: *quantity,
                })
                .collect(),
            asks: self
                .asks
                .iter()
                .take(depth)
                .map(|(price, quantity)| QuantityAtPrice {
                    price: *price,
                    quantity: *quantity,
                })
                .collect(),
            last_trade: if with_trade { self.last_trade } else { None },
        }
    }

    fn shrink(&mut self, side: Side, price: Price, quantity: Quantity) -> BuilderResult<()> {
        let levels = self.side_mut(side);
        let Some(resting) = levels.get_mut(&price) else {
            return Err(BuilderError::MissingLevel { side, price });
        };
        if quantity > *resting {
            return Err(BuilderError::LevelUnderflow {
                side,
                price,
                resting: *resting,
                requested: quantity,
            });
        }

        *resting -= quantity;
        if *resting == 0 {
            levels.remove(&price);
        }
        Ok(())
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Price, Quantity> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }
}

fn malformed(event: &OrderBookEvent) -> BuilderError {
    BuilderError::MalformedEvent {
        sequence: event.sequence,
        event_type: event.event_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(
        sequence: SequenceNumber,
        event_type: EventType,
        side: Side,
        price: Price,
        quantity: Quantity,
        quantity_filled: Quantity,
    ) -> OrderBookEvent {
        OrderBookEvent {
            contract_id: 1,
            sequence,
            event_type,
            side,
            order_id: sequence,
            price,
            quantity,
            quantity_filled,
        }
    }

    #[test]
    fn test_new_grows_and_cancel_shrinks_levels() {
        let mut projection = DepthProjection::new(1);
        projection
            .apply(&event(0, EventType::New, Side::Buy, 100, 30, 0))
            .unwrap();
        projection
            .apply(&event(1, EventType::New, Side::Buy, 100, 20, 0))
            .unwrap();

        let depth = projection.market_depth(1, 5, false);
        assert_eq!(depth.bids, vec![QuantityAtPrice {
            price: 100,
            quantity: 50
        }]);

        projection
            .apply(&event(2, EventType::Cancel, Side::Buy, 100, 50, 0))
            .unwrap();
        assert!(projection.market_depth(2, 5, false).bids.is_empty());
    }

    #[test]
    fn test_fill_updates_last_trade() {
        let mut projection = DepthProjection::new(1);
        projection
            .apply(&event(0, EventType::New, Side::Buy, 102, 50, 0))
            .unwrap();
        projection
            .apply(&event(1, EventType::Fill, Side::Buy, 102, 20, 30))
            .unwrap();

        assert_eq!(
            projection.last_trade(),
            Some(QuantityAtPrice {
                price: 102,
                quantity: 30
            })
        );

        // The flag gates exposure, not the trailing state itself
        assert_eq!(projection.market_depth(1, 5, false).last_trade, None);
        assert_eq!(
            projection.market_depth(1, 5, true).last_trade,
            Some(QuantityAtPrice {
                price: 102,
                quantity: 30
            })
        );

        let depth = projection.market_depth(1, 5, false);
        assert_eq!(depth.bids[0].quantity, 20);
    }

    #[test]
    fn test_depth_truncation_and_ordering() {
        let mut projection = DepthProjection::new(1);
        for (i, price) in [99, 101, 100].iter().enumerate() {
            projection
                .apply(&event(i as u64, EventType::New, Side::Buy, *price, 10, 0))
                .unwrap();
        }
        for (i, price) in [105, 103, 104].iter().enumerate() {
            projection
                .apply(&event(3 + i as u64, EventType::New, Side::Sell, *price, 10, 0))
                .unwrap();
        }

        let depth = projection.market_depth(5, 2, false);
        let bid_prices: Vec<_> = depth.bids.iter().map(|l| l.price).collect();
        let ask_prices: Vec<_> = depth.asks.iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![101, 100]); // descending, truncated
        assert_eq!(ask_prices, vec![103, 104]); // ascending, truncated
    }

    #[test]
    fn test_corrupt_events_fail_loudly() {
        let mut projection = DepthProjection::new(1);
        projection
            .apply(&event(0, EventType::New, Side::Sell, 105, 10, 0))
            .unwrap();

        assert_eq!(
            projection.apply(&event(1, EventType::Cancel, Side::Sell, 106, 10, 0)),
            Err(BuilderError::MissingLevel {
                side: Side::Sell,
                price: 106
            })
        );
        assert_eq!(
            projection.apply(&event(1, EventType::Fill, Side::Sell, 105, 0, 25)),
            Err(BuilderError::LevelUnderflow {
                side: Side::Sell,
                price: 105,
                resting: 10,
                requested: 25
            })
        );

        // Failed events leave the projection untouched
        assert_eq!(projection.market_depth(0, 5, false).asks[0].quantity, 10);
    }

    #[test]
    fn test_malformed_events_rejected() {
        let mut projection = DepthProjection::new(1);

        assert!(matches!(
            projection.apply(&event(0, EventType::New, Side::Buy, 0, 10, 0)),
            Err(BuilderError::MalformedEvent { .. })
        ));
        assert!(matches!(
            projection.apply(&event(0, EventType::New, Side::Buy, 100, 0, 0)),
            Err(BuilderError::MalformedEvent { .. })
        ));
        assert!(matches!(
            projection.apply(&event(0, EventType::Fill, Side::Buy, 100, 10, 0)),
            Err(BuilderError::MalformedEvent { .. })
        ));
    }

    #[test]
    fn test_projection_serialization_roundtrip() {
        let mut projection = DepthProjection::new(7);
        projection
            .apply(&event(0, EventType::New, Side::Buy, 100, 30, 0))
            .unwrap();
        projection
            .apply(&event(1, EventType::New, Side::Sell, 104, 15, 0))
            .unwrap();

        let serialized = serde_json::to_string(&projection).unwrap();
        let restored: DepthProjection = serde_json::from_str(&serialized).unwrap();
        assert_eq!(projection, restored);
    }
}
