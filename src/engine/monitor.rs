use serde::{Deserialize, Serialize};

/// One row of the per-day time series, appended by the monitoring phase and
/// immutable afterwards.
///
/// `inventory` is the level the day's demand draws from, i.e. after the
/// arrivals phase and before the demand withdrawal, and `autonomy_days`
/// divides that same level by the expected base demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub day: u32,
    pub inventory: f64,
    pub demand: f64,
    pub demand_satisfied: f64,
    pub supply_received: f64,
    pub stockout: bool,
    pub route_blocked: bool,
    pub pending_orders: u32,
    pub autonomy_days: f64,
}

/// Route-level counters the per-day records cannot reconstruct on their own
/// (merged blocks hide the individual arrivals).
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteStats {
    pub disruption_count: u32,
    pub blocked_days_total: u32,
}

/// The fixed per-replica KPI vector, reduced from the daily records at the
/// end of a run. Field order is the persisted column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiVector {
    pub service_level_pct: f64,
    pub stockout_days: u32,
    pub stockout_probability_pct: f64,
    pub avg_inventory_tm: f64,
    pub min_inventory_tm: f64,
    pub max_inventory_tm: f64,
    pub std_inventory_tm: f64,
    pub avg_autonomy_days: f64,
    pub min_autonomy_days: f64,
    pub total_demand_tm: f64,
    pub satisfied_demand_tm: f64,
    pub unsatisfied_demand_tm: f64,
    pub avg_daily_demand_tm: f64,
    pub max_daily_demand_tm: f64,
    pub min_daily_demand_tm: f64,
    pub total_received_tm: f64,
    pub total_dispatched_tm: f64,
    pub disruption_count: u32,
    pub blocked_days_total: u32,
    pub blocked_time_pct: f64,
    pub simulated_days: u32,
}

/// Per-day recorder owned by exactly one replica.
#[derive(Debug, Clone)]
pub struct Monitor {
    records: Vec<DailyRecord>,
}

impl Monitor {
    pub fn with_capacity(horizon_days: u32) -> Self {
        Self {
            records: Vec::with_capacity(horizon_days as usize),
        }
    }

    pub fn record(&mut self, record: DailyRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[DailyRecord] {
        &self.records
    }

    /// Reduces the recorded series into the KPI vector and hands the records
    /// back to the caller.
    pub fn finish(self, route: RouteStats) -> (KpiVector, Vec<DailyRecord>) {
        let n = self.records.len() as u32;
        let n_f = f64::from(n.max(1));

        let total_demand: f64 = self.records.iter().map(|r| r.demand).sum();
        let satisfied: f64 = self.records.iter().map(|r| r.demand_satisfied).sum();
        let received: f64 = self.records.iter().map(|r| r.supply_received).sum();
        let stockout_days = self.records.iter().filter(|r| r.stockout).count() as u32;

        let service_level_pct = if total_demand > 0.0 {
            100.0 * satisfied / total_demand
        } else {
            100.0
        };

        let inventory = Summary::over(self.records.iter().map(|r| r.inventory));
        let autonomy = Summary::over(self.records.iter().map(|r| r.autonomy_days));
        let demand = Summary::over(self.records.iter().map(|r| r.demand));

        let kpis = KpiVector {
            service_level_pct,
            stockout_days,
            stockout_probability_pct: 100.0 * f64::from(stockout_days) / n_f,
            avg_inventory_tm: inventory.mean,
            min_inventory_tm: inventory.min,
            max_inventory_tm: inventory.max,
            std_inventory_tm: inventory.std,
            avg_autonomy_days: autonomy.mean,
            min_autonomy_days: autonomy.min,
            total_demand_tm: total_demand,
            satisfied_demand_tm: satisfied,
            unsatisfied_demand_tm: total_demand - satisfied,
            avg_daily_demand_tm: demand.mean,
            max_daily_demand_tm: demand.max,
            min_daily_demand_tm: demand.min,
            total_received_tm: received,
            total_dispatched_tm: satisfied,
            disruption_count: route.disruption_count,
            blocked_days_total: route.blocked_days_total,
            blocked_time_pct: 100.0 * f64::from(route.blocked_days_total) / n_f,
            simulated_days: n,
        };

        (kpis, self.records)
    }
}

/// Mean, sample standard deviation and extrema of one series.
struct Summary {
    mean: f64,
    std: f64,
    min: f64,
    max: f64,
}

impl Summary {
    fn over(values: impl Iterator<Item = f64> + Clone) -> Self {
        let n = values.clone().count();
        if n == 0 {
            return Self {
                mean: 0.0,
                std: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }

        let n_f = n as f64;
        let mean = values.clone().sum::<f64>() / n_f;
        let var = if n > 1 {
            values.clone().map(|v| (v - mean).powi(2)).sum::<f64>() / (n_f - 1.0)
        } else {
            0.0
        };

        Self {
            mean,
            std: var.sqrt(),
            min: values.clone().fold(f64::INFINITY, f64::min),
            max: values.fold(f64::NEG_INFINITY, f64::max),
        }
    }
}
