use std::path::Path;

use polars::{frame::DataFrame, prelude::{Column, PlSmallStr}};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    engine::monitor::KpiVector,
    error::{SimresResult, StatsError},
    executor::{KpiRow, ScenarioResult, sink::read_kpi_rows},
};

/// Canonical column order of the persisted KPI table.
///
/// The two identifier columns come first; everything after
/// [`KpiCol::ReplicaIndex`] is a numeric metric.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    PartialOrd,
    Ord,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum KpiCol {
    // === Identifiers ===
    ScenarioId,
    ReplicaIndex,

    // === Service ===
    ServiceLevelPct,
    StockoutDays,
    StockoutProbabilityPct,

    // === Inventory ===
    AvgInventoryTm,
    MinInventoryTm,
    MaxInventoryTm,
    StdInventoryTm,

    // === Autonomy ===
    AvgAutonomyDays,
    MinAutonomyDays,

    // === Demand ===
    TotalDemandTm,
    SatisfiedDemandTm,
    UnsatisfiedDemandTm,
    AvgDailyDemandTm,
    MaxDailyDemandTm,
    MinDailyDemandTm,

    // === Flows ===
    TotalReceivedTm,
    TotalDispatchedTm,

    // === Route ===
    DisruptionCount,
    BlockedDaysTotal,
    BlockedTimePct,

    // === Run ===
    SimulatedDays,
}

impl From<KpiCol> for PlSmallStr {
    fn from(value: KpiCol) -> Self {
        value.as_str().into()
    }
}

impl KpiCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// True for the numeric metric columns (everything but the
    /// identifiers).
    pub fn is_metric(&self) -> bool {
        !matches!(self, Self::ScenarioId | Self::ReplicaIndex)
    }

    pub fn metrics() -> impl Iterator<Item = KpiCol> {
        Self::iter().filter(Self::is_metric)
    }
}

/// Reads one metric out of a KPI vector, widening counts to `f64`.
pub(crate) fn metric_value(kpis: &KpiVector, col: KpiCol) -> Option<f64> {
    match col {
        KpiCol::ScenarioId | KpiCol::ReplicaIndex => None,
        KpiCol::ServiceLevelPct => Some(kpis.service_level_pct),
        KpiCol::StockoutDays => Some(f64::from(kpis.stockout_days)),
        KpiCol::StockoutProbabilityPct => Some(kpis.stockout_probability_pct),
        KpiCol::AvgInventoryTm => Some(kpis.avg_inventory_tm),
        KpiCol::MinInventoryTm => Some(kpis.min_inventory_tm),
        KpiCol::MaxInventoryTm => Some(kpis.max_inventory_tm),
        KpiCol::StdInventoryTm => Some(kpis.std_inventory_tm),
        KpiCol::AvgAutonomyDays => Some(kpis.avg_autonomy_days),
        KpiCol::MinAutonomyDays => Some(kpis.min_autonomy_days),
        KpiCol::TotalDemandTm => Some(kpis.total_demand_tm),
        KpiCol::SatisfiedDemandTm => Some(kpis.satisfied_demand_tm),
        KpiCol::UnsatisfiedDemandTm => Some(kpis.unsatisfied_demand_tm),
        KpiCol::AvgDailyDemandTm => Some(kpis.avg_daily_demand_tm),
        KpiCol::MaxDailyDemandTm => Some(kpis.max_daily_demand_tm),
        KpiCol::MinDailyDemandTm => Some(kpis.min_daily_demand_tm),
        KpiCol::TotalReceivedTm => Some(kpis.total_received_tm),
        KpiCol::TotalDispatchedTm => Some(kpis.total_dispatched_tm),
        KpiCol::DisruptionCount => Some(f64::from(kpis.disruption_count)),
        KpiCol::BlockedDaysTotal => Some(f64::from(kpis.blocked_days_total)),
        KpiCol::BlockedTimePct => Some(kpis.blocked_time_pct),
        KpiCol::SimulatedDays => Some(f64::from(kpis.simulated_days)),
    }
}

/// The replica-by-KPI table all scenario-level statistics run on.
///
/// Rows are sorted by `(scenario_id, replica_index)` on construction, so the
/// table is deterministic no matter in which order the sink saw the rows.
#[derive(Debug, Clone)]
pub struct KpiTable {
    rows: Vec<KpiRow>,
    df: DataFrame,
}

impl KpiTable {
    pub fn from_rows(mut rows: Vec<KpiRow>) -> SimresResult<Self> {
        if rows.is_empty() {
            return Err(StatsError::EmptyTable.into());
        }

        rows.sort_by(|a, b| {
            (&a.scenario_id, a.replica_index).cmp(&(&b.scenario_id, b.replica_index))
        });
        // A resumed experiment may have appended a replica twice; the first
        // occurrence wins.
        rows.dedup_by(|a, b| a.scenario_id == b.scenario_id && a.replica_index == b.replica_index);

        let df = build_frame(&rows)?;
        Ok(Self { rows, df })
    }

    pub fn from_result(result: &ScenarioResult) -> SimresResult<Self> {
        Self::from_rows(result.kpis.clone())
    }

    /// Reloads a table from a JSONL sink file, e.g. to aggregate a crashed
    /// and resumed experiment.
    pub fn load_jsonl(path: impl AsRef<Path>) -> SimresResult<Self> {
        Self::from_rows(read_kpi_rows(path)?)
    }

    pub fn rows(&self) -> &[KpiRow] {
        &self.rows
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn n_replicas(&self) -> usize {
        self.rows.len()
    }
}

fn build_frame(rows: &[KpiRow]) -> SimresResult<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(KpiCol::iter().count());

    columns.push(Column::new(
        KpiCol::ScenarioId.into(),
        rows.iter().map(|r| r.scenario_id.clone()).collect::<Vec<String>>(),
    ));
    columns.push(Column::new(
        KpiCol::ReplicaIndex.into(),
        rows.iter().map(|r| r.replica_index).collect::<Vec<u64>>(),
    ));
    for kpi in KpiCol::metrics() {
        let values: Vec<f64> = rows
            .iter()
            .map(|r| metric_value(&r.kpis, kpi).unwrap_or(f64::NAN))
            .collect();
        columns.push(Column::new(kpi.into(), values));
    }

    DataFrame::new(columns).map_err(|e| StatsError::DataFrame(e.to_string()).into())
}

#[cfg(test)]
mod test {
    use super::*;

    fn row(replica_index: u64, service_level: f64) -> KpiRow {
        KpiRow {
            scenario_id: "table-test".to_string(),
            replica_index,
            kpis: KpiVector {
                service_level_pct: service_level,
                stockout_days: 1,
                stockout_probability_pct: 0.3,
                avg_inventory_tm: 400.0,
                min_inventory_tm: 350.0,
                max_inventory_tm: 431.0,
                std_inventory_tm: 12.0,
                avg_autonomy_days: 10.0,
                min_autonomy_days: 8.0,
                total_demand_tm: 15_000.0,
                satisfied_demand_tm: 14_900.0,
                unsatisfied_demand_tm: 100.0,
                avg_daily_demand_tm: 41.0,
                max_daily_demand_tm: 55.0,
                min_daily_demand_tm: 30.0,
                total_received_tm: 14_800.0,
                total_dispatched_tm: 14_900.0,
                disruption_count: 2,
                blocked_days_total: 11,
                blocked_time_pct: 3.0,
                simulated_days: 365,
            },
        }
    }

    #[test]
    fn test_column_names_match_serde_fields() {
        // The flattened KpiRow JSON keys are the table's column names; the
        // sink and the table must agree on them.
        let json = serde_json::to_value(row(0, 99.0)).unwrap();
        let object = json.as_object().unwrap();

        for col in KpiCol::iter() {
            assert!(
                object.contains_key(col.as_str()),
                "Column '{col}' missing from serialized row"
            );
        }
        assert_eq!(object.len(), KpiCol::iter().count());
    }

    #[test]
    fn test_rows_are_sorted_and_deduplicated() {
        let table = KpiTable::from_rows(vec![row(2, 90.0), row(0, 95.0), row(2, 10.0), row(1, 92.0)])
            .unwrap();

        let indices: Vec<u64> = table.rows().iter().map(|r| r.replica_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(
            table.rows()[2].kpis.service_level_pct,
            90.0,
            "First occurrence wins on duplicate replica indices"
        );
        assert_eq!(table.df().height(), 3);
    }

    #[test]
    fn test_empty_table_is_rejected() {
        assert!(KpiTable::from_rows(Vec::new()).is_err());
    }

    #[test]
    fn test_frame_has_fixed_schema() {
        let table = KpiTable::from_rows(vec![row(0, 95.0)]).unwrap();
        let names: Vec<&str> = table
            .df()
            .get_column_names()
            .into_iter()
            .map(|n| n.as_str())
            .collect();
        let expected: Vec<&str> = KpiCol::iter().map(|c| c.as_str()).collect();
        assert_eq!(names, expected, "Column order is part of the schema");
    }
}
