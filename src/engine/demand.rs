use std::f64::consts::TAU;

use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::{
    error::{EngineError, SimresResult},
    scenario::Scenario,
};

/// Daily demand process: multiplicative Normal noise around a base rate,
/// optionally modulated by a yearly sinusoid.
///
/// `demand(t) = b * season(t) * xi`, with `xi ~ Normal(1, sigma)` clamped to
/// `[0, inf)` and `season(t) = 1 + A * sin(2 pi (t - t_peak) / 365)` when
/// seasonality is enabled, `1` otherwise.
#[derive(Debug, Clone)]
pub struct DemandProcess {
    base_daily_tm: f64,
    noise: Normal<f64>,
    seasonality: Option<Seasonality>,
}

#[derive(Debug, Clone, Copy)]
struct Seasonality {
    amplitude: f64,
    peak_day: u32,
}

impl DemandProcess {
    pub fn new(scenario: &Scenario) -> SimresResult<Self> {
        let noise = Normal::new(1.0, scenario.demand_noise_sigma).map_err(|e| {
            EngineError::Distribution {
                distribution: "Normal",
                msg: e.to_string(),
            }
        })?;

        let seasonality = scenario.seasonality_enabled.then_some(Seasonality {
            amplitude: scenario.seasonality_amplitude,
            peak_day: scenario.seasonality_peak_day,
        });

        Ok(Self {
            base_daily_tm: scenario.demand_base_daily_tm,
            noise,
            seasonality,
        })
    }

    /// Samples the demand of day `day`, consuming one draw from `rng`.
    pub fn sample(&self, day: u32, rng: &mut StdRng) -> f64 {
        let xi = self.noise.sample(rng).max(0.0);
        self.base_daily_tm * self.seasonal_factor(day) * xi
    }

    fn seasonal_factor(&self, day: u32) -> f64 {
        match self.seasonality {
            None => 1.0,
            Some(s) => {
                let phase = (f64::from(day) - f64::from(s.peak_day)) / 365.0;
                1.0 + s.amplitude * (TAU * phase).sin()
            }
        }
    }
}
