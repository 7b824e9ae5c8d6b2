use smallvec::SmallVec;

use crate::{
    engine::hub::Hub,
    error::{EngineError, SimresResult},
};

/// One in-transit refill order.
///
/// An order lives from placement to delivery; it is never canceled. Its
/// scheduled arrival may only move later (disruption extension), never
/// earlier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Order {
    pub id: u64,
    pub quantity_tm: f64,
    pub placed_day: u32,
    pub scheduled_arrival_day: u32,
}

/// The bounded book of open orders.
///
/// The book never holds more than `max_concurrent_orders` entries; the
/// reorder policy checks [`OrderBook::is_full`] before placing, and
/// [`OrderBook::place`] enforces the cap as a hard invariant. The inline
/// capacity covers the default cap of 2 with room to spare.
#[derive(Debug, Clone)]
pub struct OrderBook {
    orders: SmallVec<[Order; 4]>,
    max_concurrent: usize,
    next_id: u64,
}

impl OrderBook {
    pub fn new(max_concurrent_orders: u32) -> Self {
        Self {
            orders: SmallVec::new(),
            max_concurrent: max_concurrent_orders as usize,
            next_id: 0,
        }
    }

    /// Number of open orders.
    pub fn pending(&self) -> u32 {
        self.orders.len() as u32
    }

    pub fn is_full(&self) -> bool {
        self.orders.len() >= self.max_concurrent
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    /// Places one order arriving on `scheduled_arrival_day`.
    pub fn place(
        &mut self,
        placed_day: u32,
        quantity_tm: f64,
        scheduled_arrival_day: u32,
    ) -> SimresResult<u64> {
        if self.is_full() {
            return Err(EngineError::OrderBookOverflow {
                pending: self.orders.len(),
                cap: self.max_concurrent,
            }
            .into());
        }

        let id = self.next_id;
        self.next_id += 1;
        self.orders.push(Order {
            id,
            quantity_tm,
            placed_day,
            scheduled_arrival_day,
        });
        Ok(id)
    }

    /// Delivers every order due on `day` and returns the total quantity the
    /// hub accepted.
    ///
    /// Each order is removed from the book before its deposit, so the
    /// pending count observed after the arrivals phase reflects the
    /// post-arrival state.
    pub fn deliver_due(&mut self, day: u32, hub: &mut Hub) -> f64 {
        let mut accepted = 0.0;
        let mut i = 0;
        while i < self.orders.len() {
            if self.orders[i].scheduled_arrival_day <= day {
                let order = self.orders.remove(i);
                accepted += hub.deposit(order.quantity_tm);
            } else {
                i += 1;
            }
        }
        accepted
    }

    /// Pushes every order covered by a block through `unblock_day` to the
    /// first operational day. Strictly monotonic: an already-bumped order
    /// never moves earlier.
    pub fn bump_arrivals(&mut self, unblock_day: u32) {
        for order in &mut self.orders {
            if order.scheduled_arrival_day <= unblock_day {
                order.scheduled_arrival_day = unblock_day + 1;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_place_assigns_monotonic_ids() {
        let mut book = OrderBook::new(3);
        let a = book.place(1, 90.0, 3).unwrap();
        let b = book.place(2, 90.0, 4).unwrap();
        assert!(b > a);
        assert_eq!(book.pending(), 2);
    }

    #[test]
    fn test_cap_is_enforced() {
        let mut book = OrderBook::new(2);
        book.place(1, 90.0, 3).unwrap();
        book.place(1, 90.0, 3).unwrap();
        assert!(book.is_full());

        let err = book.place(1, 90.0, 3).unwrap_err();
        assert!(matches!(
            err,
            crate::error::SimresError::Engine(EngineError::OrderBookOverflow { pending: 2, cap: 2 })
        ));
        assert_eq!(book.pending(), 2, "Failed placement must not grow the book");
    }

    #[test]
    fn test_deliver_due_removes_then_deposits() {
        let mut book = OrderBook::new(2);
        let mut hub = Hub::new(100.0, 50.0);
        book.place(1, 30.0, 5).unwrap();
        book.place(2, 30.0, 6).unwrap();

        let accepted = book.deliver_due(5, &mut hub);
        assert_eq!(accepted, 30.0);
        assert_eq!(book.pending(), 1, "Delivered order leaves the book");
        assert_eq!(hub.level(), 80.0);
    }

    #[test]
    fn test_deliver_due_caps_at_capacity() {
        let mut book = OrderBook::new(2);
        let mut hub = Hub::new(100.0, 90.0);
        book.place(1, 30.0, 5).unwrap();

        // Only the 10 t of headroom are accepted; the rest is dropped.
        let accepted = book.deliver_due(5, &mut hub);
        assert_eq!(accepted, 10.0);
        assert_eq!(hub.level(), 100.0);
    }

    #[test]
    fn test_deliver_due_handles_bunched_arrivals() {
        let mut book = OrderBook::new(3);
        let mut hub = Hub::new(500.0, 0.0);
        book.place(1, 90.0, 7).unwrap();
        book.place(2, 90.0, 7).unwrap();
        book.place(3, 90.0, 9).unwrap();

        assert_eq!(book.deliver_due(7, &mut hub), 180.0);
        assert_eq!(book.pending(), 1);
    }

    #[test]
    fn test_bump_is_monotonic() {
        let mut book = OrderBook::new(2);
        book.place(1, 90.0, 6).unwrap();

        book.bump_arrivals(10);
        assert_eq!(book.iter().next().unwrap().scheduled_arrival_day, 11);

        // A later, shorter block must not pull the order back.
        book.bump_arrivals(8);
        assert_eq!(book.iter().next().unwrap().scheduled_arrival_day, 11);

        book.bump_arrivals(11);
        assert_eq!(book.iter().next().unwrap().scheduled_arrival_day, 12);
    }

    #[test]
    fn test_bump_ignores_orders_outside_block() {
        let mut book = OrderBook::new(2);
        book.place(1, 90.0, 20).unwrap();
        book.bump_arrivals(10);
        assert_eq!(book.iter().next().unwrap().scheduled_arrival_day, 20);
    }
}
