use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SimresResult};

/// Immutable configuration of a single simulated scenario.
///
/// A `Scenario` fully determines the hub, the route, the demand process and
/// the disruption process for one experiment. It is validated once, before
/// any replica starts, and then shared read-only across all workers.
///
/// # Units
/// All masses are metric tonnes (`_tm`), all durations whole days (`_d`).
///
/// # Document contract
/// The serialized form is a flat key-value record with exactly these fields.
/// Unknown keys are rejected on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Storage capacity of the hub.
    pub capacity_tm: f64,

    /// Inventory level at (and below) which a refill order is triggered.
    pub reorder_point_tm: f64,

    /// Fixed quantity of every refill order.
    pub order_quantity_tm: f64,

    /// Initial fill level as a percentage of capacity, in `[0, 100]`.
    pub initial_inventory_pct: f64,

    /// Expected daily demand.
    pub demand_base_daily_tm: f64,

    /// Relative standard deviation of the daily demand noise, in `[0, 1]`.
    pub demand_noise_sigma: f64,

    /// Enables the sinusoidal yearly demand modulation.
    #[serde(default)]
    pub seasonality_enabled: bool,

    /// Relative amplitude of the seasonal modulation, in `[0, 1]`.
    #[serde(default)]
    pub seasonality_amplitude: f64,

    /// Day of the year the seasonal term is anchored to, in `[1, 365]`.
    #[serde(default = "default_seasonality_peak_day")]
    pub seasonality_peak_day: u32,

    /// Expected number of route disruptions per 365-day year.
    pub disruption_rate_per_year: f64,

    /// Lower bound of the triangular disruption-duration distribution.
    pub disruption_duration_min_d: f64,

    /// Mode of the triangular disruption-duration distribution.
    pub disruption_duration_mode_d: f64,

    /// Upper bound of the triangular disruption-duration distribution.
    pub disruption_duration_max_d: f64,

    /// Days between placing an order and its arrival, absent disruption.
    pub nominal_lead_time_d: u32,

    /// Number of simulated days per replica.
    pub horizon_days: u32,

    /// Maximum number of concurrently open (in-transit) orders.
    #[serde(default = "default_max_concurrent_orders")]
    pub max_concurrent_orders: u32,

    /// Base seed for replica seed derivation. `None` means seed 0.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_max_concurrent_orders() -> u32 {
    2
}

fn default_seasonality_peak_day() -> u32 {
    172
}

impl Scenario {
    /// The calibration baseline: a 431 t hub serving 41.3 t of daily demand,
    /// starting full, with a mild disruption regime.
    ///
    /// Tests and factorial experiments start from this configuration and
    /// perturb individual fields.
    pub fn baseline() -> Self {
        Self {
            capacity_tm: 431.0,
            reorder_point_tm: 420.0,
            order_quantity_tm: 90.0,
            initial_inventory_pct: 100.0,
            demand_base_daily_tm: 41.3,
            demand_noise_sigma: 0.1,
            seasonality_enabled: false,
            seasonality_amplitude: 0.0,
            seasonality_peak_day: default_seasonality_peak_day(),
            disruption_rate_per_year: 2.0,
            disruption_duration_min_d: 3.0,
            disruption_duration_mode_d: 7.0,
            disruption_duration_max_d: 15.0,
            nominal_lead_time_d: 2,
            horizon_days: 365,
            max_concurrent_orders: default_max_concurrent_orders(),
            seed: None,
        }
    }

    /// The base seed all replica seeds are derived from.
    pub fn base_seed(&self) -> u64 {
        self.seed.unwrap_or(0)
    }

    /// Checks every structural invariant of the configuration.
    ///
    /// Called by the executor before any replica starts; a failing scenario
    /// never reaches the kernel.
    pub fn validate(&self) -> SimresResult<()> {
        positive("capacity_tm", self.capacity_tm)?;
        positive("reorder_point_tm", self.reorder_point_tm)?;
        positive("order_quantity_tm", self.order_quantity_tm)?;
        positive("demand_base_daily_tm", self.demand_base_daily_tm)?;
        within_capacity("reorder_point_tm", self.reorder_point_tm, self.capacity_tm)?;
        within_capacity("order_quantity_tm", self.order_quantity_tm, self.capacity_tm)?;
        in_range("initial_inventory_pct", self.initial_inventory_pct, 0.0, 100.0)?;
        in_range("demand_noise_sigma", self.demand_noise_sigma, 0.0, 1.0)?;
        in_range("seasonality_amplitude", self.seasonality_amplitude, 0.0, 1.0)?;
        in_range(
            "seasonality_peak_day",
            f64::from(self.seasonality_peak_day),
            1.0,
            365.0,
        )?;
        non_negative("disruption_rate_per_year", self.disruption_rate_per_year)?;
        positive("disruption_duration_min_d", self.disruption_duration_min_d)?;
        positive("disruption_duration_mode_d", self.disruption_duration_mode_d)?;
        positive("disruption_duration_max_d", self.disruption_duration_max_d)?;

        let (min, mode, max) = (
            self.disruption_duration_min_d,
            self.disruption_duration_mode_d,
            self.disruption_duration_max_d,
        );
        if !(min <= mode && mode <= max) {
            return Err(ConfigError::DurationOrdering { min, mode, max }.into());
        }

        at_least_one("nominal_lead_time_d", self.nominal_lead_time_d)?;
        at_least_one("horizon_days", self.horizon_days)?;
        at_least_one("max_concurrent_orders", self.max_concurrent_orders)?;

        Ok(())
    }

    /// Inventory level a replica starts from.
    pub fn initial_inventory_tm(&self) -> f64 {
        self.capacity_tm * self.initial_inventory_pct / 100.0
    }
}

// ================================================================================================
// Field checks
// ================================================================================================

fn finite(field: &'static str, value: f64) -> SimresResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { field, value }.into())
    }
}

fn positive(field: &'static str, value: f64) -> SimresResult<()> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value }.into())
    }
}

fn non_negative(field: &'static str, value: f64) -> SimresResult<()> {
    finite(field, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: f64::INFINITY,
        }
        .into())
    }
}

fn in_range(field: &'static str, value: f64, min: f64, max: f64) -> SimresResult<()> {
    finite(field, value)?;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        }
        .into())
    }
}

fn within_capacity(field: &'static str, value: f64, capacity: f64) -> SimresResult<()> {
    if value <= capacity {
        Ok(())
    } else {
        Err(ConfigError::ExceedsCapacity {
            field,
            value,
            capacity,
        }
        .into())
    }
}

fn at_least_one(field: &'static str, value: u32) -> SimresResult<()> {
    if value >= 1 {
        Ok(())
    } else {
        Err(ConfigError::ZeroCount { field, value }.into())
    }
}

// ================================================================================================
// Building
// ================================================================================================

/// Consuming builder over [`Scenario::baseline`].
///
/// Every setter replaces one field; [`ScenarioBuilder::build`] validates the
/// result before handing it out.
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    scenario: Scenario,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        Self {
            scenario: Scenario::baseline(),
        }
    }

    pub fn with_capacity_tm(mut self, capacity_tm: f64) -> Self {
        self.scenario.capacity_tm = capacity_tm;
        self
    }

    pub fn with_reorder_point_tm(mut self, reorder_point_tm: f64) -> Self {
        self.scenario.reorder_point_tm = reorder_point_tm;
        self
    }

    pub fn with_order_quantity_tm(mut self, order_quantity_tm: f64) -> Self {
        self.scenario.order_quantity_tm = order_quantity_tm;
        self
    }

    pub fn with_initial_inventory_pct(mut self, initial_inventory_pct: f64) -> Self {
        self.scenario.initial_inventory_pct = initial_inventory_pct;
        self
    }

    pub fn with_demand_base_daily_tm(mut self, demand_base_daily_tm: f64) -> Self {
        self.scenario.demand_base_daily_tm = demand_base_daily_tm;
        self
    }

    pub fn with_demand_noise_sigma(mut self, demand_noise_sigma: f64) -> Self {
        self.scenario.demand_noise_sigma = demand_noise_sigma;
        self
    }

    pub fn with_seasonality(mut self, amplitude: f64, peak_day: u32) -> Self {
        self.scenario.seasonality_enabled = true;
        self.scenario.seasonality_amplitude = amplitude;
        self.scenario.seasonality_peak_day = peak_day;
        self
    }

    pub fn with_disruption_rate_per_year(mut self, disruption_rate_per_year: f64) -> Self {
        self.scenario.disruption_rate_per_year = disruption_rate_per_year;
        self
    }

    pub fn with_disruption_duration_d(mut self, min: f64, mode: f64, max: f64) -> Self {
        self.scenario.disruption_duration_min_d = min;
        self.scenario.disruption_duration_mode_d = mode;
        self.scenario.disruption_duration_max_d = max;
        self
    }

    pub fn with_nominal_lead_time_d(mut self, nominal_lead_time_d: u32) -> Self {
        self.scenario.nominal_lead_time_d = nominal_lead_time_d;
        self
    }

    pub fn with_horizon_days(mut self, horizon_days: u32) -> Self {
        self.scenario.horizon_days = horizon_days;
        self
    }

    pub fn with_max_concurrent_orders(mut self, max_concurrent_orders: u32) -> Self {
        self.scenario.max_concurrent_orders = max_concurrent_orders;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.scenario.seed = Some(seed);
        self
    }

    pub fn build(self) -> SimresResult<Scenario> {
        self.scenario.validate()?;
        Ok(self.scenario)
    }
}
