//! Pacing distributions: lazy, real-time-paced schedules of absolute
//! timestamps for open-loop arrival generation.
//!
//! A [`Schedule`] is an iterator over epoch timestamps, and the generating
//! thread's sleep between yields IS the pacing mechanism — draining one
//! without respecting time defeats the design. One live iteration per
//! phase-action invocation; schedules are not restartable concurrently.

use std::thread;
use std::time::Duration;

use rand::rngs::ThreadRng;
use rand_distr::{Distribution as _, Normal};

use crate::metric::{now_epoch, Overrides};

/// Pacing algorithm for open-loop arrivals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distribution {
    /// Exactly `floor(duration * per_second)` timestamps spaced `1/per_second`
    /// apart. Spacing comes from a monotonically advancing accumulator, never
    /// a re-measured wall clock, so sleep overhead does not drift the rate.
    FixedRate { per_second: f64 },
    /// Timestamps until the duration elapses, with inter-arrival gaps drawn
    /// from a Gaussian and clamped to be non-negative.
    RandomGap { mean: f64, stddev: f64 },
}

impl Distribution {
    pub fn fixed_rate(per_second: f64) -> Self {
        Distribution::FixedRate { per_second }
    }

    pub fn random_gap(mean: f64, stddev: f64) -> Self {
        Distribution::RandomGap { mean, stddev }
    }

    /// Start a schedule over `duration`. The effective rate of a fixed-rate
    /// distribution may be overridden per action name; the override is read
    /// once, here, at generation start.
    ///
    /// # Panics
    ///
    /// Panics if a random-gap stddev is negative or not finite.
    pub fn generate(
        &self,
        duration: Duration,
        action_name: &str,
        overrides: &Overrides,
    ) -> Schedule {
        let now = now_epoch();
        let kind = match *self {
            Distribution::FixedRate { per_second } => {
                let per_second = overrides.rate_for(action_name).unwrap_or(per_second);
                ScheduleKind::FixedRate {
                    interval: 1.0 / per_second,
                    remaining: (duration.as_secs_f64() * per_second).floor() as u64,
                    started: false,
                }
            }
            Distribution::RandomGap { mean, stddev } => ScheduleKind::RandomGap {
                gaps: Normal::new(mean, stddev)
                    .expect("random-gap stddev must be finite and non-negative"),
                rng: rand::thread_rng(),
                end_time: now + duration.as_secs_f64(),
                started: false,
            },
        };
        Schedule {
            next_time: now,
            kind,
        }
    }
}

/// A live, self-pacing iteration of a [`Distribution`].
pub struct Schedule {
    next_time: f64,
    kind: ScheduleKind,
}

enum ScheduleKind {
    FixedRate {
        interval: f64,
        remaining: u64,
        started: bool,
    },
    RandomGap {
        gaps: Normal<f64>,
        rng: ThreadRng,
        end_time: f64,
        started: bool,
    },
}

fn sleep_until(timestamp: f64) {
    let time_to_sleep = timestamp - now_epoch();
    if time_to_sleep > 0.0 {
        thread::sleep(Duration::from_secs_f64(time_to_sleep));
    }
}

impl Iterator for Schedule {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        match &mut self.kind {
            ScheduleKind::FixedRate {
                interval,
                remaining,
                started,
            } => {
                if *remaining == 0 {
                    return None;
                }
                if *started {
                    self.next_time += *interval;
                    sleep_until(self.next_time);
                }
                *started = true;
                *remaining -= 1;
                Some(self.next_time)
            }
            ScheduleKind::RandomGap {
                gaps,
                rng,
                end_time,
                started,
            } => {
                if *started {
                    let gap = gaps.sample(rng).max(0.0);
                    self.next_time += gap;
                    sleep_until(self.next_time);
                }
                *started = true;
                if now_epoch() >= *end_time {
                    return None;
                }
                Some(self.next_time)
            }
        }
    }
}
