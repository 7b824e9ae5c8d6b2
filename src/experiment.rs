use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    error::{SimresResult, StatsError},
    executor::{ExecutorConfig, MonteCarloExecutor, ScenarioResult, sink::ReplicaSink},
    report::{
        anova::{AnovaResult, FactorialDesign, aggregate_factorial},
        table::{KpiCol, metric_value},
    },
    scenario::Scenario,
};

/// A two-factor factorial experiment: one scenario per cell, a fixed replica
/// budget per cell, and a straight path into the ANOVA layer.
///
/// Cell scenario ids are `<level_a>x<level_b>`, so replica seeds differ
/// across cells even when the base seed does not.
pub struct FactorialExperiment {
    factor_a: String,
    factor_b: String,
    cells: Vec<(String, String, Scenario)>,
    replicas_per_cell: usize,
    max_workers: usize,
}

/// One executed cell.
#[derive(Debug, Clone)]
pub struct CellResult {
    pub level_a: String,
    pub level_b: String,
    pub result: ScenarioResult,
}

/// All executed cells of one factorial experiment.
#[derive(Debug, Clone)]
pub struct FactorialOutcome {
    pub factor_a: String,
    pub factor_b: String,
    pub cells: Vec<CellResult>,
}

impl FactorialExperiment {
    pub fn new(factor_a: impl Into<String>, factor_b: impl Into<String>) -> Self {
        Self {
            factor_a: factor_a.into(),
            factor_b: factor_b.into(),
            cells: Vec::new(),
            replicas_per_cell: 30,
            max_workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }

    pub fn with_cell(
        mut self,
        level_a: impl Into<String>,
        level_b: impl Into<String>,
        scenario: Scenario,
    ) -> Self {
        self.cells.push((level_a.into(), level_b.into(), scenario));
        self
    }

    pub fn with_replicas_per_cell(self, replicas_per_cell: usize) -> Self {
        Self {
            replicas_per_cell,
            ..self
        }
    }

    pub fn with_max_workers(self, max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            ..self
        }
    }

    /// Executes every cell sequentially (each cell parallel internally) and
    /// collects the per-cell results. A cancel observed mid-experiment
    /// leaves the finished cells valid.
    pub fn run_blocking(
        &self,
        sink: Arc<dyn ReplicaSink>,
        cancel: CancellationToken,
    ) -> SimresResult<FactorialOutcome> {
        let mut cells = Vec::with_capacity(self.cells.len());
        for (level_a, level_b, scenario) in &self.cells {
            if cancel.is_cancelled() {
                break;
            }
            let scenario_id = format!("{level_a}x{level_b}");
            info!(%scenario_id, "Running factorial cell");

            let result = MonteCarloExecutor::new(
                scenario.clone(),
                ExecutorConfig::new(scenario_id, self.replicas_per_cell)
                    .with_max_workers(self.max_workers),
            )
            .with_sink(sink.clone())
            .with_cancel_token(cancel.clone())
            .run_blocking()?;

            cells.push(CellResult {
                level_a: level_a.clone(),
                level_b: level_b.clone(),
                result,
            });
        }

        Ok(FactorialOutcome {
            factor_a: self.factor_a.clone(),
            factor_b: self.factor_b.clone(),
            cells,
        })
    }
}

impl FactorialOutcome {
    /// Reshapes the per-cell KPI rows into a balanced factorial design over
    /// `response`.
    ///
    /// Failed replicas leave cells unevenly filled; every cell is truncated
    /// to the smallest completed count to preserve balance. Within a cell
    /// rows stay in replica-index order, so the truncation is deterministic.
    pub fn design(&self, response: KpiCol) -> SimresResult<FactorialDesign> {
        if self.cells.is_empty() {
            return Err(StatsError::EmptyTable.into());
        }
        let floor = self
            .cells
            .iter()
            .map(|c| c.result.kpis.len())
            .min()
            .unwrap_or(0);

        let mut design = FactorialDesign::new(self.factor_a.clone(), self.factor_b.clone());
        for cell in &self.cells {
            let values: Vec<f64> = cell.result.kpis[..floor]
                .iter()
                .filter_map(|row| metric_value(&row.kpis, response))
                .collect();
            design = design.with_cell(cell.level_a.clone(), cell.level_b.clone(), values);
        }
        Ok(design)
    }

    /// Runs the two-way ANOVA over `response`.
    pub fn anova(&self, response: KpiCol) -> SimresResult<AnovaResult> {
        aggregate_factorial(&self.design(response)?)
    }
}
