/// The single storage facility.
///
/// Every mutation preserves `0 <= inventory <= capacity`; callers learn how
/// much actually moved from the return value and never mutate the level
/// directly.
#[derive(Debug, Clone)]
pub struct Hub {
    inventory_tm: f64,
    capacity_tm: f64,
}

impl Hub {
    pub fn new(capacity_tm: f64, initial_inventory_tm: f64) -> Self {
        Self {
            inventory_tm: initial_inventory_tm.clamp(0.0, capacity_tm),
            capacity_tm,
        }
    }

    /// Current inventory level.
    pub fn level(&self) -> f64 {
        self.inventory_tm
    }

    pub fn capacity(&self) -> f64 {
        self.capacity_tm
    }

    /// Withdraws up to `amount` and returns what was actually withdrawn.
    pub fn withdraw(&mut self, amount: f64) -> f64 {
        let withdrawn = amount.min(self.inventory_tm).max(0.0);
        self.inventory_tm = (self.inventory_tm - withdrawn).max(0.0);
        withdrawn
    }

    /// Deposits up to `amount` and returns what was actually accepted.
    ///
    /// Excess above capacity is rejected; the caller decides whether that is
    /// an error or (as under disruption-induced arrival bunching) expected.
    pub fn deposit(&mut self, amount: f64) -> f64 {
        let accepted = amount.min(self.capacity_tm - self.inventory_tm).max(0.0);
        self.inventory_tm = (self.inventory_tm + accepted).min(self.capacity_tm);
        accepted
    }

    /// True when the level is inside `[0, capacity]` up to `tolerance`.
    pub fn is_consistent(&self, tolerance: f64) -> bool {
        self.inventory_tm.is_finite()
            && self.inventory_tm >= -tolerance
            && self.inventory_tm <= self.capacity_tm + tolerance
    }
}
