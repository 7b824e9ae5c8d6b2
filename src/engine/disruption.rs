use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp, Triangular};

use crate::{
    engine::{order_book::OrderBook, route::Route},
    error::{EngineError, SimresResult},
    scenario::Scenario,
};

/// One sampled disruption arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisruptionEvent {
    /// Day the disruption activates.
    pub day: u32,

    /// Whole-day duration, ceiled from the triangular draw.
    pub duration_d: u32,
}

/// The pre-sampled disruption arrivals of one replica.
///
/// Arrivals follow a homogeneous Poisson process with rate
/// `disruption_rate_per_year / 365` per day, generated by accumulating
/// `Exp(lambda)` inter-arrival times until the horizon is exceeded. The
/// inter-arrival form is insensitive to the day discretization and keeps the
/// event count exactly Poisson. Durations are `Triangular(min, mode, max)`
/// draws ceiled to whole days.
///
/// Per event the stream is consumed in a fixed order: inter-arrival time
/// first, duration second.
#[derive(Debug, Clone)]
pub struct DisruptionSchedule {
    events: Vec<DisruptionEvent>,
    cursor: usize,
}

impl DisruptionSchedule {
    pub fn sample(scenario: &Scenario, rng: &mut StdRng) -> SimresResult<Self> {
        let lambda_per_day = scenario.disruption_rate_per_year / 365.0;
        if lambda_per_day <= 0.0 {
            return Ok(Self::from_events(Vec::new()));
        }

        let inter_arrival =
            Exp::new(lambda_per_day).map_err(|e| EngineError::Distribution {
                distribution: "Exp",
                msg: e.to_string(),
            })?;

        let (min, mode, max) = (
            scenario.disruption_duration_min_d,
            scenario.disruption_duration_mode_d,
            scenario.disruption_duration_max_d,
        );
        // A degenerate triangular (min == max) is a constant.
        let duration: Option<Triangular<f64>> = if max > min {
            Some(
                Triangular::new(min, max, mode).map_err(|e| EngineError::Distribution {
                    distribution: "Triangular",
                    msg: format!("{e:?}"),
                })?,
            )
        } else {
            None
        };

        let horizon = f64::from(scenario.horizon_days);
        let mut events = Vec::new();
        let mut t = 0.0;
        loop {
            t += inter_arrival.sample(rng);
            if t > horizon {
                break;
            }
            let raw = match &duration {
                Some(dist) => dist.sample(rng),
                None => max,
            };
            events.push(DisruptionEvent {
                // Continuous arrival times in (d-1, d] land on day d.
                day: t.ceil() as u32,
                duration_d: raw.ceil().max(1.0) as u32,
            });
        }

        Ok(Self::from_events(events))
    }

    /// Builds a schedule from explicit events, e.g. for deterministic
    /// replays. Events are processed in day order.
    pub fn from_events(mut events: Vec<DisruptionEvent>) -> Self {
        events.sort_by_key(|e| e.day);
        Self { events, cursor: 0 }
    }

    /// Number of distinct disruption arrivals in the schedule.
    pub fn count(&self) -> u32 {
        self.events.len() as u32
    }

    /// Pops the next event activating on `day`, if any. Called repeatedly
    /// during the disruption-update phase until it returns `None`.
    pub fn next_due(&mut self, day: u32) -> Option<DisruptionEvent> {
        let event = self.events.get(self.cursor)?;
        if event.day == day {
            self.cursor += 1;
            Some(*event)
        } else {
            None
        }
    }
}

/// Applies one disruption arrival to the route and the open order book.
///
/// Overlapping disruptions take the union of their block intervals, and on
/// every change of the unblock day the whole order book is walked: any order
/// scheduled to arrive inside the block is pushed to the first operational
/// day. Orders are never moved earlier.
pub fn activate(event: DisruptionEvent, day: u32, route: &mut Route, book: &mut OrderBook) {
    let unblock_day = day + event.duration_d - 1;
    if route.operational() {
        route.block(unblock_day);
    } else {
        route.extend(unblock_day);
    }
    book.bump_arrivals(route.unblock_day());
}
