use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::orderbook::types::{OrderId, Price, Quantity};

/// Future simulator work as plain data, interpreted by one dispatcher.
/// Keeping the schedule free of captured state makes a seeded run replayable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GenerateOrder,
    CancelOrder { order_id: OrderId },
    DecayImpact { price: Price, quantity: Quantity },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledAction {
    fire_tick: u64,
    insertion_seq: u64,
    action: Action,
}

// Reversed comparison so the BinaryHeap pops the earliest tick first,
// ties broken by insertion order (FIFO within a tick).
impl Ord for ScheduledAction {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_tick
            .cmp(&self.fire_tick)
            .then_with(|| other.insertion_seq.cmp(&self.insertion_seq))
    }
}

impl PartialOrd for ScheduledAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Virtual-time priority queue driving one contract simulator.
///
/// `pop` advances the virtual clock to the fired action's tick; draining an
/// action may schedule further future actions, so the queue is self-sustaining
/// until the order budget runs dry.
#[derive(Debug, Default)]
pub struct ActionQueue {
    heap: BinaryHeap<ScheduledAction>,
    now: u64,
    next_seq: u64,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` to fire `delay` ticks from the current virtual time
    pub fn schedule(&mut self, delay: u64, action: Action) {
        self.heap.push(ScheduledAction {
            fire_tick: self.now + delay,
            insertion_seq: self.next_seq,
            action,
        });
        self.next_seq += 1;
    }

    /// Pop the next action in (tick, insertion) order, advancing the clock
    pub fn pop(&mut self) -> Option<(u64, Action)> {
        let scheduled = self.heap.pop()?;
        self.now = scheduled.fire_tick;
        Some((scheduled.fire_tick, scheduled.action))
    }

    /// Current virtual time in ticks
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
