pub mod demand;
pub mod disruption;
pub mod hub;
pub mod monitor;
pub mod order_book;
pub mod route;

use serde::{Deserialize, Serialize};

use crate::{
    engine::{
        demand::DemandProcess,
        disruption::DisruptionSchedule,
        hub::Hub,
        monitor::{DailyRecord, KpiVector, Monitor, RouteStats},
        order_book::OrderBook,
        route::Route,
    },
    error::{EngineError, SimresResult},
    rng::ReplicaStreams,
    scenario::Scenario,
};

/// Everything a finished replica hands back to the executor: the KPI vector
/// plus the full per-day series (dropped by the executor for all but the
/// sampled replicas).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaOutput {
    pub kpis: KpiVector,
    pub days: Vec<DailyRecord>,
}

/// Runs one replica of `scenario` under `replica_seed`.
///
/// Pure and deterministic: the same `(scenario, replica_seed)` pair yields
/// byte-identical output on any run. All stochastic draws come from two
/// domain-split streams derived from the seed (demand noise on one,
/// disruption inter-arrivals and durations on the other).
pub fn run_replica(scenario: &Scenario, replica_seed: u64) -> SimresResult<ReplicaOutput> {
    let mut streams = ReplicaStreams::new(replica_seed);
    let schedule = DisruptionSchedule::sample(scenario, &mut streams.route)?;
    run_replica_with_schedule(scenario, schedule, &mut streams.demand)
}

/// Runs one replica against an explicit disruption schedule.
///
/// This is the replay entry point: tests and what-if analyses inject a fixed
/// schedule instead of sampling one.
///
/// # Phase order
/// Within each day the phases execute in this exact order, which is a public
/// contract:
/// 1. **Arrivals** -- due orders leave the book, then deposit (capped at
///    capacity).
/// 2. **Disruption update** -- the route unblocks once the block interval
///    has passed, then today's disruption arrivals activate (union-merging
///    overlaps and bumping covered orders).
/// 3. **Demand** -- sample, withdraw what the hub holds, flag stockout.
/// 4. **Reorder evaluation** -- on the post-demand level: place one order of
///    `order_quantity_tm` if the level is at or below the reorder point, the
///    book has room and the route is operational.
/// 5. **Monitoring** -- append the daily record.
pub fn run_replica_with_schedule(
    scenario: &Scenario,
    mut schedule: DisruptionSchedule,
    demand_rng: &mut rand::rngs::StdRng,
) -> SimresResult<ReplicaOutput> {
    let demand_process = DemandProcess::new(scenario)?;
    let initial_inventory = scenario.initial_inventory_tm();

    let mut hub = Hub::new(scenario.capacity_tm, initial_inventory);
    let mut route = Route::new();
    let mut book = OrderBook::new(scenario.max_concurrent_orders);
    let mut monitor = Monitor::with_capacity(scenario.horizon_days);
    let mut disruption_count = 0u32;

    for day in 1..=scenario.horizon_days {
        // Phase 1: arrivals.
        let supply_received = book.deliver_due(day, &mut hub);
        let inventory_open = hub.level();

        // Phase 2: disruption update.
        route.update(day);
        while let Some(event) = schedule.next_due(day) {
            disruption::activate(event, day, &mut route, &mut book);
            disruption_count += 1;
        }
        if !route.operational() {
            route.note_blocked_day();
        }

        // Phase 3: demand.
        let demand = demand_process.sample(day, demand_rng);
        let demand_satisfied = hub.withdraw(demand);
        let stockout = demand_satisfied < demand;

        // Phase 4: reorder evaluation, on the post-demand level.
        if hub.level() <= scenario.reorder_point_tm && !book.is_full() && route.operational() {
            book.place(
                day,
                scenario.order_quantity_tm,
                day + scenario.nominal_lead_time_d,
            )?;
        }

        // Phase 5: monitoring.
        monitor.record(DailyRecord {
            day,
            inventory: inventory_open,
            demand,
            demand_satisfied,
            supply_received,
            stockout,
            route_blocked: !route.operational(),
            pending_orders: book.pending(),
            autonomy_days: inventory_open / scenario.demand_base_daily_tm,
        });

        check_day_invariants(scenario, &hub, &book, day)?;
    }

    let final_inventory = hub.level();
    let (kpis, days) = monitor.finish(RouteStats {
        disruption_count,
        blocked_days_total: route.total_blocked_days(),
    });

    // Mass balance: what came in must equal what went out plus what is left.
    let drift = initial_inventory + kpis.total_received_tm
        - kpis.total_dispatched_tm
        - final_inventory;
    if drift.abs() > 1e-6 * scenario.capacity_tm {
        return Err(EngineError::InvariantViolation {
            day: scenario.horizon_days,
            msg: format!("Mass balance drifted by {drift} t"),
        }
        .into());
    }

    Ok(ReplicaOutput { kpis, days })
}

fn check_day_invariants(
    scenario: &Scenario,
    hub: &Hub,
    book: &OrderBook,
    day: u32,
) -> SimresResult<()> {
    if !hub.is_consistent(1e-9 * scenario.capacity_tm) {
        return Err(EngineError::InvariantViolation {
            day,
            msg: format!(
                "Inventory {} outside [0, {}]",
                hub.level(),
                scenario.capacity_tm
            ),
        }
        .into());
    }
    if book.pending() > scenario.max_concurrent_orders {
        return Err(EngineError::InvariantViolation {
            day,
            msg: format!(
                "{} open orders exceed cap {}",
                book.pending(),
                scenario.max_concurrent_orders
            ),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        engine::disruption::DisruptionEvent,
        scenario::{Scenario, ScenarioBuilder},
    };
    use rand::{SeedableRng, rngs::StdRng};

    /// Deterministic workbench scenario: no noise, no sampled disruptions.
    fn deterministic() -> ScenarioBuilder {
        ScenarioBuilder::new()
            .with_capacity_tm(400.0)
            .with_reorder_point_tm(300.0)
            .with_order_quantity_tm(100.0)
            .with_initial_inventory_pct(100.0)
            .with_demand_base_daily_tm(50.0)
            .with_demand_noise_sigma(0.0)
            .with_disruption_rate_per_year(0.0)
            .with_nominal_lead_time_d(2)
            .with_horizon_days(20)
    }

    fn run(scenario: &Scenario, events: Vec<DisruptionEvent>) -> ReplicaOutput {
        let mut rng = StdRng::seed_from_u64(1);
        run_replica_with_schedule(scenario, DisruptionSchedule::from_events(events), &mut rng)
            .unwrap()
    }

    // ============================================================================
    // Phase-order contract
    // ============================================================================

    #[test]
    fn test_arrivals_precede_demand() {
        // Day 1: 400 -> 350 <= 300? No. Day 2: 300 <= 300 -> order, arrives
        // day 4. Day 4's record must already contain the delivery.
        let scenario = deterministic().build().unwrap();
        let out = run(&scenario, vec![]);

        let day4 = &out.days[3];
        assert_eq!(day4.supply_received, 100.0);
        assert_eq!(
            day4.inventory, 350.0,
            "Pre-demand level 250 + 100 delivered the same morning"
        );
    }

    #[test]
    fn test_reorder_uses_post_demand_level() {
        // Pre-demand 400 > 300, post-demand 350 > 300: no order on day 1.
        // Day 2 pre-demand 350 > 300 but post-demand 300 <= 300: the order
        // fires on day 2, visible in that day's record.
        let scenario = deterministic().build().unwrap();
        let out = run(&scenario, vec![]);

        assert_eq!(out.days[0].pending_orders, 0);
        assert_eq!(out.days[1].pending_orders, 1);
    }

    #[test]
    fn test_disruption_update_precedes_reorder() {
        // The route blocks on day 2, the same day the reorder condition
        // first holds. Phase order forbids the order.
        let scenario = deterministic().build().unwrap();
        let out = run(
            &scenario,
            vec![DisruptionEvent { day: 2, duration_d: 3 }],
        );

        let day2 = &out.days[1];
        assert!(day2.route_blocked);
        assert_eq!(day2.pending_orders, 0, "No reorder while the route is blocked");
    }

    #[test]
    fn test_block_interval_is_inclusive() {
        let scenario = deterministic().build().unwrap();
        let out = run(
            &scenario,
            vec![DisruptionEvent { day: 2, duration_d: 3 }],
        );

        let blocked: Vec<bool> = out.days.iter().take(6).map(|d| d.route_blocked).collect();
        assert_eq!(
            blocked,
            vec![false, true, true, true, false, false],
            "Duration 3 starting day 2 blocks exactly days 2..=4"
        );
        assert_eq!(out.kpis.blocked_days_total, 3);
        assert_eq!(out.kpis.disruption_count, 1);
    }

    #[test]
    fn test_lead_time_extension_delivers_after_unblock() {
        // Order placed day 2 (arrival day 4). A disruption starting day 3
        // with duration 9 blocks days 3..=11, so the order lands on day 12.
        let scenario = deterministic().build().unwrap();
        let out = run(
            &scenario,
            vec![DisruptionEvent { day: 3, duration_d: 9 }],
        );

        for day in &out.days[..11] {
            assert_eq!(day.supply_received, 0.0, "Nothing arrives through day 11");
        }
        let day12 = &out.days[11];
        assert_eq!(
            day12.supply_received, 100.0,
            "Bumped order arrives on unblock_day + 1"
        );
    }

    // ============================================================================
    // Kernel invariants
    // ============================================================================

    #[test]
    fn test_reproducibility_is_bytewise() {
        let scenario = ScenarioBuilder::new().with_seed(42).build().unwrap();
        let a = run_replica(&scenario, 0xDEADBEEF).unwrap();
        let b = run_replica(&scenario, 0xDEADBEEF).unwrap();

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap(),
            "Same seed must reproduce byte-identical output"
        );

        let c = run_replica(&scenario, 0xDEADBEF0).unwrap();
        assert_ne!(a.days, c.days, "Different seeds must diverge");
    }

    #[test]
    fn test_inventory_bounds_and_mass_balance() {
        let scenario = ScenarioBuilder::new()
            .with_disruption_rate_per_year(12.0)
            .with_seed(7)
            .build()
            .unwrap();
        let out = run_replica(&scenario, 99).unwrap();

        for day in &out.days {
            assert!(day.inventory >= 0.0 && day.inventory <= scenario.capacity_tm);
            assert!(day.demand_satisfied <= day.demand + 1e-12);
            assert!(day.demand_satisfied <= day.inventory + 1e-9);
            assert!(day.pending_orders <= scenario.max_concurrent_orders);
        }

        // Mass balance, reconstructed purely from the records.
        let last = out.days.last().unwrap();
        let final_inventory = last.inventory - last.demand_satisfied;
        let received: f64 = out.days.iter().map(|d| d.supply_received).sum();
        let dispatched: f64 = out.days.iter().map(|d| d.demand_satisfied).sum();
        let drift =
            scenario.initial_inventory_tm() + received - dispatched - final_inventory;
        assert!(drift.abs() <= 1e-6 * scenario.capacity_tm);
    }

    #[test]
    fn test_pending_orders_respect_cap() {
        // Reorder point at capacity forces an order every operational day.
        let scenario = ScenarioBuilder::new()
            .with_capacity_tm(431.0)
            .with_reorder_point_tm(431.0)
            .with_order_quantity_tm(20.0)
            .with_nominal_lead_time_d(5)
            .with_max_concurrent_orders(2)
            .with_disruption_rate_per_year(0.0)
            .with_horizon_days(60)
            .build()
            .unwrap();
        let out = run_replica(&scenario, 3).unwrap();

        let max_pending = out.days.iter().map(|d| d.pending_orders).max().unwrap();
        assert_eq!(max_pending, 2, "The cap binds under aggressive reordering");
    }

    #[test]
    fn test_autonomy_uses_constant_base_denominator() {
        let scenario = deterministic().build().unwrap();
        let out = run(&scenario, vec![]);

        for day in &out.days {
            assert!(
                (day.autonomy_days - day.inventory / 50.0).abs() < 1e-12,
                "Autonomy divides by the base rate, not the day's demand"
            );
        }
    }
}
