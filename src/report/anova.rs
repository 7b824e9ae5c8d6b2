use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::{
    error::{SimresResult, StatsError},
    report::tukey::{TukeyComparison, tukey_hsd},
};

/// Family-wise significance level of the post-hoc comparisons.
const TUKEY_ALPHA: f64 = 0.05;

/// Observations of one factorial cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorialCell {
    pub level_a: String,
    pub level_b: String,
    pub values: Vec<f64>,
}

/// A two-factor factorial experiment over one response variable.
///
/// The layer is generic over the two categorical factors; the canonical
/// instance is `capacity x max_disruption_duration` with `service_level_pct`
/// as response. The design must be complete and balanced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorialDesign {
    pub factor_a: String,
    pub factor_b: String,
    pub cells: Vec<FactorialCell>,
}

impl FactorialDesign {
    pub fn new(factor_a: impl Into<String>, factor_b: impl Into<String>) -> Self {
        Self {
            factor_a: factor_a.into(),
            factor_b: factor_b.into(),
            cells: Vec::new(),
        }
    }

    pub fn with_cell(
        mut self,
        level_a: impl Into<String>,
        level_b: impl Into<String>,
        values: Vec<f64>,
    ) -> Self {
        self.cells.push(FactorialCell {
            level_a: level_a.into(),
            level_b: level_b.into(),
            values,
        });
        self
    }
}

/// One line of the ANOVA table. `f`/`p` are absent on the residual and
/// total lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnovaRow {
    pub source: String,
    pub ss: f64,
    pub df: u32,
    pub ms: f64,
    pub f: Option<f64>,
    pub p: Option<f64>,
}

/// Per-effect values keyed the way the result document spells them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Effects<T> {
    #[serde(rename = "A")]
    pub a: T,
    #[serde(rename = "B")]
    pub b: T,
    #[serde(rename = "AB")]
    pub ab: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellMean {
    pub level_a: String,
    pub level_b: String,
    pub mean: f64,
    pub std: f64,
    pub n: usize,
    pub ci_low: f64,
    pub ci_high: f64,
}

/// Full outcome of the two-way ANOVA over a factorial design.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnovaResult {
    pub anova_table: Vec<AnovaRow>,
    /// Whether each effect is significant at the 5% level.
    pub main_effects: Effects<bool>,
    pub eta_squared: Effects<f64>,
    pub adj_r_squared: f64,
    pub cell_means: Vec<CellMean>,
    pub tukey_a: Vec<TukeyComparison>,
    pub tukey_b: Vec<TukeyComparison>,
}

/// Two-way ANOVA (Type II) with eta-squared effect sizes and Tukey HSD
/// post-hoc comparisons per factor.
///
/// The design must be complete and balanced, where the type II and type I
/// decompositions coincide and the sums of squares are exact partitions of
/// the total. A pure function of its input: aggregating the same design
/// twice yields the identical result.
pub fn aggregate_factorial(design: &FactorialDesign) -> SimresResult<AnovaResult> {
    let grid = Grid::build(design)?;
    let (a, b, n) = (grid.levels_a.len(), grid.levels_b.len(), grid.n);
    let total_n = (a * b * n) as f64;

    let grand_mean = grid.values().sum::<f64>() / total_n;

    let cell_means: Vec<Vec<f64>> = (0..a)
        .map(|i| (0..b).map(|j| mean(grid.cell(i, j))).collect())
        .collect();
    let marginal_a: Vec<f64> = (0..a)
        .map(|i| (0..b).map(|j| cell_means[i][j]).sum::<f64>() / b as f64)
        .collect();
    let marginal_b: Vec<f64> = (0..b)
        .map(|j| (0..a).map(|i| cell_means[i][j]).sum::<f64>() / a as f64)
        .collect();

    let ss_a = (b * n) as f64 * marginal_a.iter().map(|m| (m - grand_mean).powi(2)).sum::<f64>();
    let ss_b = (a * n) as f64 * marginal_b.iter().map(|m| (m - grand_mean).powi(2)).sum::<f64>();

    let mut ss_ab = 0.0;
    for i in 0..a {
        for j in 0..b {
            let interaction = cell_means[i][j] - marginal_a[i] - marginal_b[j] + grand_mean;
            ss_ab += n as f64 * interaction.powi(2);
        }
    }

    let mut ss_residual = 0.0;
    for i in 0..a {
        for j in 0..b {
            ss_residual += grid
                .cell(i, j)
                .iter()
                .map(|y| (y - cell_means[i][j]).powi(2))
                .sum::<f64>();
        }
    }

    let ss_total = grid.values().map(|y| (y - grand_mean).powi(2)).sum::<f64>();
    if ss_total <= 0.0 || ss_residual <= 0.0 {
        return Err(StatsError::DegenerateDesign(
            "Response has no residual variance; F statistics are undefined".to_string(),
        )
        .into());
    }

    let df_a = (a - 1) as u32;
    let df_b = (b - 1) as u32;
    let df_ab = df_a * df_b;
    let df_residual = (a * b * (n - 1)) as u32;
    let df_total = (a * b * n - 1) as u32;

    let ms_a = ss_a / f64::from(df_a);
    let ms_b = ss_b / f64::from(df_b);
    let ms_ab = ss_ab / f64::from(df_ab);
    let ms_residual = ss_residual / f64::from(df_residual);

    let f_a = ms_a / ms_residual;
    let f_b = ms_b / ms_residual;
    let f_ab = ms_ab / ms_residual;
    let p_a = f_survival(f_a, df_a, df_residual)?;
    let p_b = f_survival(f_b, df_b, df_residual)?;
    let p_ab = f_survival(f_ab, df_ab, df_residual)?;

    let anova_table = vec![
        AnovaRow {
            source: design.factor_a.clone(),
            ss: ss_a,
            df: df_a,
            ms: ms_a,
            f: Some(f_a),
            p: Some(p_a),
        },
        AnovaRow {
            source: design.factor_b.clone(),
            ss: ss_b,
            df: df_b,
            ms: ms_b,
            f: Some(f_b),
            p: Some(p_b),
        },
        AnovaRow {
            source: format!("{}:{}", design.factor_a, design.factor_b),
            ss: ss_ab,
            df: df_ab,
            ms: ms_ab,
            f: Some(f_ab),
            p: Some(p_ab),
        },
        AnovaRow {
            source: "residual".to_string(),
            ss: ss_residual,
            df: df_residual,
            ms: ms_residual,
            f: None,
            p: None,
        },
        AnovaRow {
            source: "total".to_string(),
            ss: ss_total,
            df: df_total,
            ms: ss_total / f64::from(df_total),
            f: None,
            p: None,
        },
    ];

    let cell_stats = grid.cell_means();

    let tukey_a = tukey_hsd(
        &grid
            .levels_a
            .iter()
            .cloned()
            .zip(marginal_a.iter().copied())
            .collect::<Vec<_>>(),
        b * n,
        ms_residual,
        f64::from(df_residual),
        TUKEY_ALPHA,
    )?;
    let tukey_b = tukey_hsd(
        &grid
            .levels_b
            .iter()
            .cloned()
            .zip(marginal_b.iter().copied())
            .collect::<Vec<_>>(),
        a * n,
        ms_residual,
        f64::from(df_residual),
        TUKEY_ALPHA,
    )?;

    Ok(AnovaResult {
        anova_table,
        main_effects: Effects {
            a: p_a < TUKEY_ALPHA,
            b: p_b < TUKEY_ALPHA,
            ab: p_ab < TUKEY_ALPHA,
        },
        eta_squared: Effects {
            a: ss_a / ss_total,
            b: ss_b / ss_total,
            ab: ss_ab / ss_total,
        },
        adj_r_squared: 1.0
            - (ss_residual / f64::from(df_residual)) / (ss_total / f64::from(df_total)),
        cell_means: cell_stats,
        tukey_a,
        tukey_b,
    })
}

/// Right-tail probability of the F distribution.
fn f_survival(f: f64, df_num: u32, df_den: u32) -> SimresResult<f64> {
    let dist = FisherSnedecor::new(f64::from(df_num), f64::from(df_den))
        .map_err(|e| StatsError::Distribution(e.to_string()))?;
    Ok((1.0 - dist.cdf(f)).clamp(0.0, 1.0))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

// ================================================================================================
// Grid validation
// ================================================================================================

/// The design reshaped into a complete `a x b` grid of equally sized cells.
struct Grid<'a> {
    levels_a: Vec<String>,
    levels_b: Vec<String>,
    n: usize,
    cells: Vec<Vec<&'a [f64]>>,
}

impl<'a> Grid<'a> {
    fn build(design: &'a FactorialDesign) -> SimresResult<Self> {
        let mut levels_a: Vec<String> = Vec::new();
        let mut levels_b: Vec<String> = Vec::new();
        for cell in &design.cells {
            if !levels_a.contains(&cell.level_a) {
                levels_a.push(cell.level_a.clone());
            }
            if !levels_b.contains(&cell.level_b) {
                levels_b.push(cell.level_b.clone());
            }
        }
        if levels_a.len() < 2 || levels_b.len() < 2 {
            return Err(StatsError::DegenerateDesign(format!(
                "Both factors need at least 2 levels, got {} x {}",
                levels_a.len(),
                levels_b.len()
            ))
            .into());
        }
        if design.cells.len() != levels_a.len() * levels_b.len() {
            return Err(StatsError::UnbalancedDesign(format!(
                "Expected {} cells for a {} x {} grid, got {}",
                levels_a.len() * levels_b.len(),
                levels_a.len(),
                levels_b.len(),
                design.cells.len()
            ))
            .into());
        }

        let n = design.cells[0].values.len();
        if n < 2 {
            return Err(StatsError::DegenerateDesign(
                "Each cell needs at least 2 observations".to_string(),
            )
            .into());
        }

        let mut cells: Vec<Vec<Option<&[f64]>>> = vec![vec![None; levels_b.len()]; levels_a.len()];
        for cell in &design.cells {
            let i = index_of(&levels_a, &cell.level_a);
            let j = index_of(&levels_b, &cell.level_b);
            if cell.values.len() != n {
                return Err(StatsError::UnbalancedDesign(format!(
                    "Cell ({}, {}) has {} observations, expected {n}",
                    cell.level_a,
                    cell.level_b,
                    cell.values.len()
                ))
                .into());
            }
            if cells[i][j].replace(&cell.values).is_some() {
                return Err(StatsError::UnbalancedDesign(format!(
                    "Cell ({}, {}) appears more than once",
                    cell.level_a, cell.level_b
                ))
                .into());
            }
        }

        // Cell count and uniqueness together guarantee completeness.
        let cells = cells
            .into_iter()
            .map(|row| row.into_iter().map(|c| c.unwrap_or(&[])).collect())
            .collect();

        Ok(Self {
            levels_a,
            levels_b,
            n,
            cells,
        })
    }

    fn cell(&self, i: usize, j: usize) -> &[f64] {
        self.cells[i][j]
    }

    fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.cells
            .iter()
            .flat_map(|row| row.iter().flat_map(|c| c.iter().copied()))
    }

    fn cell_means(&self) -> Vec<CellMean> {
        let mut out = Vec::with_capacity(self.levels_a.len() * self.levels_b.len());
        for (i, level_a) in self.levels_a.iter().enumerate() {
            for (j, level_b) in self.levels_b.iter().enumerate() {
                let values = self.cell(i, j);
                let m = mean(values);
                let var = values.iter().map(|y| (y - m).powi(2)).sum::<f64>()
                    / (values.len() - 1) as f64;
                let std = var.sqrt();
                let ci_half = 1.96 * std / (values.len() as f64).sqrt();
                out.push(CellMean {
                    level_a: level_a.clone(),
                    level_b: level_b.clone(),
                    mean: m,
                    std,
                    n: values.len(),
                    ci_low: m - ci_half,
                    ci_high: m + ci_half,
                });
            }
        }
        out
    }
}

fn index_of(levels: &[String], level: &str) -> usize {
    levels
        .iter()
        .position(|l| l == level)
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    /// 2x2 design with hand-computable sums of squares:
    /// SS_A = 128, SS_B = 32, SS_AB = 0, SS_res = 8, SS_total = 168.
    fn textbook_design() -> FactorialDesign {
        FactorialDesign::new("capacity", "duration")
            .with_cell("sq", "short", vec![1.0, 3.0])
            .with_cell("sq", "long", vec![5.0, 7.0])
            .with_cell("p", "short", vec![9.0, 11.0])
            .with_cell("p", "long", vec![13.0, 15.0])
    }

    #[test]
    fn test_textbook_sums_of_squares() {
        let result = aggregate_factorial(&textbook_design()).unwrap();

        let ss: Vec<f64> = result.anova_table.iter().map(|r| r.ss).collect();
        assert!((ss[0] - 128.0).abs() < 1e-9, "SS_A");
        assert!((ss[1] - 32.0).abs() < 1e-9, "SS_B");
        assert!(ss[2].abs() < 1e-9, "SS_AB");
        assert!((ss[3] - 8.0).abs() < 1e-9, "SS_residual");
        assert!((ss[4] - 168.0).abs() < 1e-9, "SS_total");

        let df: Vec<u32> = result.anova_table.iter().map(|r| r.df).collect();
        assert_eq!(df, vec![1, 1, 1, 4, 7]);

        let f_a = result.anova_table[0].f.unwrap();
        assert!((f_a - 64.0).abs() < 1e-9, "F_A = 128 / 2");
    }

    #[test]
    fn test_partition_identity_and_effect_sizes() {
        let result = aggregate_factorial(&textbook_design()).unwrap();

        let ss_sum: f64 = result.anova_table[..4].iter().map(|r| r.ss).sum();
        let ss_total = result.anova_table[4].ss;
        assert!((ss_sum - ss_total).abs() < 1e-6, "SS must partition the total");

        let eta = result.eta_squared;
        assert!((eta.a - 128.0 / 168.0).abs() < 1e-9);
        assert!((eta.b - 32.0 / 168.0).abs() < 1e-9);
        assert!(eta.a + eta.b + eta.ab <= 1.0 + 1e-12);

        assert!((result.adj_r_squared - (1.0 - 2.0 / 24.0)).abs() < 1e-9);
    }

    #[test]
    fn test_p_values_are_probabilities_and_significance_flags_agree() {
        let result = aggregate_factorial(&textbook_design()).unwrap();

        for row in &result.anova_table[..3] {
            let p = row.p.unwrap();
            assert!((0.0..=1.0).contains(&p));
        }
        // F_A = 64 on (1, 4) df is significant; the interaction (F = 0) is
        // not.
        assert!(result.main_effects.a);
        assert!(!result.main_effects.ab);
    }

    #[test]
    fn test_cell_means_and_tukey_outputs() {
        let result = aggregate_factorial(&textbook_design()).unwrap();

        assert_eq!(result.cell_means.len(), 4);
        let first = &result.cell_means[0];
        assert_eq!((first.level_a.as_str(), first.level_b.as_str()), ("sq", "short"));
        assert!((first.mean - 2.0).abs() < 1e-12);
        assert_eq!(first.n, 2);

        assert_eq!(result.tukey_a.len(), 1);
        assert_eq!(result.tukey_b.len(), 1);
        assert!((result.tukey_a[0].mean_diff - (4.0 - 12.0)).abs() < 1e-9);
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let design = textbook_design();
        let a = aggregate_factorial(&design).unwrap();
        let b = aggregate_factorial(&design).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_interaction_is_detected() {
        // Crossing pattern: A flips sign of the B effect. All main-effect
        // marginals are equal; everything loads on the interaction.
        let design = FactorialDesign::new("a", "b")
            .with_cell("a1", "b1", vec![1.0, 1.2, 0.8])
            .with_cell("a1", "b2", vec![5.0, 5.2, 4.8])
            .with_cell("a2", "b1", vec![5.0, 4.9, 5.1])
            .with_cell("a2", "b2", vec![1.0, 0.9, 1.1]);

        let result = aggregate_factorial(&design).unwrap();
        assert!(result.main_effects.ab, "Pure crossing must load on AB");
        assert!(result.eta_squared.ab > 0.9);
    }

    #[test]
    fn test_incomplete_grid_rejected() {
        let design = FactorialDesign::new("a", "b")
            .with_cell("a1", "b1", vec![1.0, 2.0])
            .with_cell("a1", "b2", vec![1.0, 2.0])
            .with_cell("a2", "b1", vec![1.0, 2.0]);
        assert!(aggregate_factorial(&design).is_err());
    }

    #[test]
    fn test_unequal_cell_sizes_rejected() {
        let design = FactorialDesign::new("a", "b")
            .with_cell("a1", "b1", vec![1.0, 2.0])
            .with_cell("a1", "b2", vec![1.0, 2.0])
            .with_cell("a2", "b1", vec![1.0, 2.0])
            .with_cell("a2", "b2", vec![1.0, 2.0, 3.0]);
        assert!(aggregate_factorial(&design).is_err());
    }

    #[test]
    fn test_constant_response_rejected() {
        let design = FactorialDesign::new("a", "b")
            .with_cell("a1", "b1", vec![5.0, 5.0])
            .with_cell("a1", "b2", vec![5.0, 5.0])
            .with_cell("a2", "b1", vec![5.0, 5.0])
            .with_cell("a2", "b2", vec![5.0, 5.0]);
        assert!(aggregate_factorial(&design).is_err());
    }
}
