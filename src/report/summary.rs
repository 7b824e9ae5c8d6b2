use polars::prelude::{Expr, IntoLazy, QuantileMethod, col, lit};
use serde::Serialize;

use crate::{
    error::{SimresResult, StatsError},
    report::table::{KpiCol, KpiTable},
};

/// Distribution of one KPI across the replicas of a scenario.
///
/// `ci_low`/`ci_high` bound the mean at 95% confidence using the large-n
/// normal approximation `1.96 * std / sqrt(n)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub kpi: String,
    #[serde(flatten)]
    pub stats: SummaryStats,
}

/// Scenario-level aggregate over the whole KPI table, one entry per metric
/// column in canonical order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioSummary {
    pub n_replicas: usize,
    pub kpis: Vec<KpiSummary>,
}

impl ScenarioSummary {
    pub fn get(&self, kpi: KpiCol) -> Option<&SummaryStats> {
        self.kpis
            .iter()
            .find(|s| s.kpi == kpi.as_str())
            .map(|s| &s.stats)
    }
}

/// Reduces a KPI table to its per-metric summary statistics.
pub fn summarize(table: &KpiTable) -> SimresResult<ScenarioSummary> {
    let n = table.n_replicas();
    let mut kpis = Vec::with_capacity(KpiCol::metrics().count());

    for kpi in KpiCol::metrics() {
        let frame = table
            .df()
            .clone()
            .lazy()
            .select(summary_exprs(kpi))
            .collect()
            .map_err(|e| StatsError::DataFrame(e.to_string()))?;

        let scalar = |name: &str| -> SimresResult<f64> {
            frame
                .column(name)
                .and_then(|c| c.f64())
                .map_err(|e| StatsError::DataFrame(e.to_string()))?
                .get(0)
                .ok_or_else(|| {
                    StatsError::DataFrame(format!("Summary '{name}' of '{kpi}' is null")).into()
                })
        };

        let mean = scalar("mean")?;
        let std = scalar("std")?;
        let ci_half = 1.96 * std / (n as f64).sqrt();

        kpis.push(KpiSummary {
            kpi: kpi.as_str().to_string(),
            stats: SummaryStats {
                mean,
                std,
                min: scalar("min")?,
                max: scalar("max")?,
                p5: scalar("p5")?,
                p25: scalar("p25")?,
                p50: scalar("p50")?,
                p75: scalar("p75")?,
                p95: scalar("p95")?,
                ci_low: mean - ci_half,
                ci_high: mean + ci_half,
            },
        });
    }

    Ok(ScenarioSummary {
        n_replicas: n,
        kpis,
    })
}

fn summary_exprs(kpi: KpiCol) -> Vec<Expr> {
    vec![
        col(kpi).mean().alias("mean"),
        // A single replica has no sample deviation; report 0 rather than
        // null.
        col(kpi).std(1).fill_null(lit(0.0)).alias("std"),
        col(kpi).min().alias("min"),
        col(kpi).max().alias("max"),
        quantile_expr(kpi, 0.05).alias("p5"),
        quantile_expr(kpi, 0.25).alias("p25"),
        quantile_expr(kpi, 0.50).alias("p50"),
        quantile_expr(kpi, 0.75).alias("p75"),
        quantile_expr(kpi, 0.95).alias("p95"),
    ]
}

fn quantile_expr(kpi: KpiCol, quantile: f64) -> Expr {
    col(kpi).quantile(lit(quantile), QuantileMethod::Linear)
}
