use itertools::Itertools;
use serde::Serialize;

use crate::{
    error::{SimresResult, StatsError},
    report::studentized_range::ptukey,
};

/// One pairwise comparison of the Tukey honestly-significant-difference
/// procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TukeyComparison {
    pub level_i: String,
    pub level_j: String,
    pub mean_diff: f64,
    pub p_adj: f64,
    pub reject: bool,
}

/// All pairwise comparisons of one factor's level means, family-wise
/// adjusted via the studentized range.
///
/// `levels` holds `(level, marginal mean)` pairs, `n_per_level` the number
/// of observations each marginal mean averages, and `ms_error`/`df_error`
/// come from the ANOVA residual line.
pub fn tukey_hsd(
    levels: &[(String, f64)],
    n_per_level: usize,
    ms_error: f64,
    df_error: f64,
    alpha: f64,
) -> SimresResult<Vec<TukeyComparison>> {
    if levels.len() < 2 {
        return Err(StatsError::DegenerateDesign(format!(
            "Tukey HSD needs at least 2 levels, got {}",
            levels.len()
        ))
        .into());
    }
    if ms_error <= 0.0 || n_per_level == 0 {
        return Err(StatsError::DegenerateDesign(format!(
            "Tukey HSD needs positive error variance and group size (ms = {ms_error}, n = {n_per_level})"
        ))
        .into());
    }

    let k = levels.len();
    let standard_error = (ms_error / n_per_level as f64).sqrt();

    levels
        .iter()
        .tuple_combinations()
        .map(|((level_i, mean_i), (level_j, mean_j))| {
            let mean_diff = mean_i - mean_j;
            let q = mean_diff.abs() / standard_error;
            let p_adj = (1.0 - ptukey(q, k, df_error)?).clamp(0.0, 1.0);
            Ok(TukeyComparison {
                level_i: level_i.clone(),
                level_j: level_j.clone(),
                mean_diff,
                p_adj,
                reject: p_adj < alpha,
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn levels(means: &[(&str, f64)]) -> Vec<(String, f64)> {
        means.iter().map(|(l, m)| (l.to_string(), *m)).collect()
    }

    #[test]
    fn test_clearly_separated_means_reject() {
        let comparisons = tukey_hsd(
            &levels(&[("short", 99.0), ("long", 80.0)]),
            30,
            4.0,
            58.0,
            0.05,
        )
        .unwrap();

        assert_eq!(comparisons.len(), 1);
        let c = &comparisons[0];
        assert!((c.mean_diff - 19.0).abs() < 1e-12);
        // q = 19 / sqrt(4/30) ~ 52: overwhelming evidence.
        assert!(c.p_adj < 1e-3);
        assert!(c.reject);
    }

    #[test]
    fn test_identical_means_do_not_reject() {
        let comparisons = tukey_hsd(
            &levels(&[("a", 90.0), ("b", 90.0), ("c", 90.0)]),
            20,
            25.0,
            57.0,
            0.05,
        )
        .unwrap();

        assert_eq!(comparisons.len(), 3, "Three pairs for three levels");
        for c in comparisons {
            assert!((c.p_adj - 1.0).abs() < 1e-9, "q = 0 means p_adj = 1");
            assert!(!c.reject);
        }
    }

    #[test]
    fn test_p_adj_exceeds_unadjusted_pairwise_p() {
        // The family-wise adjustment can only make a pair harder to reject
        // than a two-group comparison of the same difference.
        let two = tukey_hsd(&levels(&[("a", 10.0), ("b", 12.0)]), 10, 16.0, 27.0, 0.05).unwrap();
        let three = tukey_hsd(
            &levels(&[("a", 10.0), ("b", 12.0), ("c", 11.0)]),
            10,
            16.0,
            27.0,
            0.05,
        )
        .unwrap();

        let pair_two = &two[0];
        let pair_three = three
            .iter()
            .find(|c| c.level_i == "a" && c.level_j == "b")
            .unwrap();
        assert!(pair_three.p_adj > pair_two.p_adj);
    }

    #[test]
    fn test_single_level_rejected() {
        assert!(tukey_hsd(&levels(&[("only", 1.0)]), 10, 1.0, 9.0, 0.05).is_err());
    }
}
