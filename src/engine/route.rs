/// Operational state of the single supply route.
///
/// A blocked route has an `unblock_day`: the last day (inclusive) the block
/// holds. The route reverts to operational during the disruption-update
/// phase of the first day strictly after it.
#[derive(Debug, Clone)]
pub struct Route {
    operational: bool,
    unblock_day: u32,
    total_blocked_days: u32,
}

impl Default for Route {
    fn default() -> Self {
        Self::new()
    }
}

impl Route {
    pub fn new() -> Self {
        Self {
            operational: true,
            unblock_day: 0,
            total_blocked_days: 0,
        }
    }

    pub fn operational(&self) -> bool {
        self.operational
    }

    /// Last day (inclusive) of the current block. Meaningless while
    /// operational.
    pub fn unblock_day(&self) -> u32 {
        self.unblock_day
    }

    pub fn total_blocked_days(&self) -> u32 {
        self.total_blocked_days
    }

    /// Reverts to operational once `day` has passed the block interval.
    pub fn update(&mut self, day: u32) {
        if !self.operational && day > self.unblock_day {
            self.operational = true;
        }
    }

    /// Starts a new block lasting through `unblock_day` inclusive.
    pub fn block(&mut self, unblock_day: u32) {
        debug_assert!(self.operational, "block() on an already blocked route");
        self.operational = false;
        self.unblock_day = unblock_day;
    }

    /// Extends the current block; overlapping disruptions take the union,
    /// so the unblock day never moves earlier.
    pub fn extend(&mut self, unblock_day: u32) {
        debug_assert!(!self.operational, "extend() on an operational route");
        self.unblock_day = self.unblock_day.max(unblock_day);
    }

    /// Counts `day` as spent blocked.
    pub fn note_blocked_day(&mut self) {
        self.total_blocked_days += 1;
    }
}
