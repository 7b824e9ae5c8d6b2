use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::{
    error::{SimresResult, StatsError},
    executor::SampledSeries,
};

/// Per-day mean and 5/95 percentile band of one tracked variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandSeries {
    pub mean: Vec<f64>,
    pub p5: Vec<f64>,
    pub p95: Vec<f64>,
}

/// The aggregated time-series document: day-by-day bands over the sampled
/// replicas for the variables the resilience plots show.
///
/// The probability series are cross-replica means of the day's boolean
/// flags, so `stockout_probability[t]` is the share of sampled replicas
/// stocked out on day `t + 1`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedBands {
    pub n_series: usize,
    pub days: Vec<u32>,
    pub inventory: BandSeries,
    pub autonomy_days: BandSeries,
    pub stockout_probability: BandSeries,
    pub route_blocked_probability: BandSeries,
}

/// Aggregates the sampled full time series into per-day bands.
pub fn aggregate_bands(sampled: &[SampledSeries]) -> SimresResult<AggregatedBands> {
    let Some(first) = sampled.first() else {
        return Err(StatsError::EmptyTable.into());
    };
    let horizon = first.days.len();
    for series in sampled {
        if series.days.len() != horizon {
            return Err(StatsError::RaggedSeries(format!(
                "Replica {} has {} days, expected {horizon}",
                series.replica_index,
                series.days.len()
            ))
            .into());
        }
    }

    let days = first.days.iter().map(|d| d.day).collect();
    Ok(AggregatedBands {
        n_series: sampled.len(),
        days,
        inventory: band_over(sampled, horizon, |r| r.inventory),
        autonomy_days: band_over(sampled, horizon, |r| r.autonomy_days),
        stockout_probability: band_over(sampled, horizon, |r| f64::from(u8::from(r.stockout))),
        route_blocked_probability: band_over(sampled, horizon, |r| {
            f64::from(u8::from(r.route_blocked))
        }),
    })
}

fn band_over(
    sampled: &[SampledSeries],
    horizon: usize,
    value: impl Fn(&crate::engine::monitor::DailyRecord) -> f64,
) -> BandSeries {
    let mut band = BandSeries {
        mean: Vec::with_capacity(horizon),
        p5: Vec::with_capacity(horizon),
        p95: Vec::with_capacity(horizon),
    };

    let mut column: Vec<f64> = Vec::with_capacity(sampled.len());
    for day in 0..horizon {
        column.clear();
        column.extend(sampled.iter().map(|s| value(&s.days[day])));
        column.sort_by_key(|v| OrderedFloat(*v));

        band.mean.push(column.iter().sum::<f64>() / column.len() as f64);
        band.p5.push(percentile_sorted(&column, 0.05));
        band.p95.push(percentile_sorted(&column, 0.95));
    }
    band
}

/// Linear-interpolation percentile over an ascending slice, matching the
/// convention of the KPI summary layer.
fn percentile_sorted(sorted: &[f64], quantile: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let position = quantile * (n - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::monitor::DailyRecord;

    fn series(replica_index: u64, inventories: &[f64], stockouts: &[bool]) -> SampledSeries {
        let days = inventories
            .iter()
            .zip(stockouts)
            .enumerate()
            .map(|(i, (inv, so))| DailyRecord {
                day: i as u32 + 1,
                inventory: *inv,
                demand: 40.0,
                demand_satisfied: if *so { 20.0 } else { 40.0 },
                supply_received: 0.0,
                stockout: *so,
                route_blocked: false,
                pending_orders: 0,
                autonomy_days: *inv / 40.0,
            })
            .collect();
        SampledSeries {
            scenario_id: "bands-test".to_string(),
            replica_index,
            days,
        }
    }

    #[test]
    fn test_mean_and_band_per_day() {
        let sampled = vec![
            series(0, &[100.0, 80.0], &[false, false]),
            series(1, &[200.0, 60.0], &[false, true]),
            series(2, &[300.0, 40.0], &[false, true]),
        ];

        let bands = aggregate_bands(&sampled).unwrap();
        assert_eq!(bands.days, vec![1, 2]);
        assert!((bands.inventory.mean[0] - 200.0).abs() < 1e-9);
        assert!((bands.inventory.mean[1] - 60.0).abs() < 1e-9);
        assert!((bands.autonomy_days.mean[0] - 5.0).abs() < 1e-9);

        // Day 2: two of three replicas stocked out.
        assert!((bands.stockout_probability.mean[1] - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(bands.route_blocked_probability.mean, vec![0.0, 0.0]);
    }

    #[test]
    fn test_percentiles_bracket_the_band() {
        let sampled: Vec<SampledSeries> = (0..11)
            .map(|i| series(i, &[f64::from(i as u32) * 10.0], &[false]))
            .collect();

        let bands = aggregate_bands(&sampled).unwrap();
        // Values 0, 10, ..., 100: linear interpolation puts p5 at 5 and p95
        // at 95.
        assert!((bands.inventory.p5[0] - 5.0).abs() < 1e-9);
        assert!((bands.inventory.p95[0] - 95.0).abs() < 1e-9);
        assert!((bands.inventory.mean[0] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_ragged_series_rejected() {
        let sampled = vec![
            series(0, &[100.0, 80.0], &[false, false]),
            series(1, &[100.0], &[false]),
        ];
        assert!(aggregate_bands(&sampled).is_err());
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(aggregate_bands(&[]).is_err());
    }
}
