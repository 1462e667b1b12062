//! Race - Race configuration, stepping loop and final ranking
//!
//! Every step the riders are re-sorted front to back. Each rider then, in
//! that order, reads its gap to the rider directly ahead, picks a power,
//! integrates one Euler step, pays for it in W′, and is held at least
//! `MIN_FOLLOW_GAP` behind its leader. The pass mutates riders in place, so
//! a follower's overlap guard sees the leader's already-updated position.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::engine::physics::{self, PhysicsConstants};
use crate::engine::policy::{RaceContext, CHASE_GAP, DRAFT_GAP};
use crate::engine::rider::{Effort, Rider, RiderTraits};
use crate::engine::route::Route;
use crate::error::ConfigError;

/// Closest a rider may sit behind the rider ahead (m)
pub const MIN_FOLLOW_GAP: f64 = 0.3;

/// Drag-area multiplier for a given gap to the rider ahead.
pub fn compute_draft_factor(gap: f64) -> f64 {
    if gap < DRAFT_GAP {
        0.7
    } else if gap < CHASE_GAP {
        0.85
    } else {
        1.0
    }
}

/// Which leader position the draft gap is measured against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReference {
    /// Leader's position at the start of the step
    #[default]
    StartOfStep,
    /// Leader's position after it has already moved in this pass
    Sequential,
}

/// Race configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    /// Timestep (s)
    pub dt: f64,
    /// Time cap (s); nobody finishing by then closes the race out by distance
    pub max_time: f64,
    /// Apply the gap-based draft factor (off means every rider sees 1.0)
    pub drafting: bool,
    /// Leader position used for the draft gap
    pub gap_reference: GapReference,
    /// Physical constants for the force model
    pub constants: PhysicsConstants,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            dt: 0.2,
            max_time: 7200.0,
            drafting: true,
            gap_reference: GapReference::default(),
            constants: PhysicsConstants::default(),
        }
    }
}

impl RaceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(ConfigError::InvalidTimestep(self.dt));
        }
        validate_max_time(self.max_time)
    }
}

fn validate_max_time(max_time: f64) -> Result<(), ConfigError> {
    if !max_time.is_finite() || max_time < 0.0 {
        return Err(ConfigError::InvalidMaxTime(max_time));
    }
    Ok(())
}

/// Race status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceStatus {
    NotStarted,
    Racing,
    Finished,
}

/// Final placing of one rider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    /// 1-based placing
    pub rank: u32,
    pub name: String,
    /// Distance covered (m)
    pub distance: f64,
    /// Finish time, or the time cap for riders that never crossed the line
    pub finish_time: f64,
    /// Crossed the line rather than being closed out
    pub crossed_line: bool,
    /// Mean speed over the time actually ridden (m/s)
    pub average_speed: f64,
    /// Ended the race with an empty tank and degraded threshold
    pub cooked: bool,
    pub traits: RiderTraits,
}

/// Race timing and results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    /// Rider names, winner first
    pub order: Vec<String>,
    /// Finish time per rider, falling back to the time cap
    pub finish_times: BTreeMap<String, f64>,
    pub standings: Vec<Standing>,
    /// Nobody reached the line before the cap
    pub timed_out: bool,
    /// Race clock when the loop stopped (s)
    pub elapsed_time: f64,
}

impl RaceResult {
    pub fn winner(&self) -> Option<&Standing> {
        self.standings.first()
    }

    /// Distance between winner and runner-up (m), `None` for a lone rider.
    pub fn winning_margin(&self) -> Option<f64> {
        match self.standings.as_slice() {
            [first, second, ..] => Some(first.distance - second.distance),
            _ => None,
        }
    }
}

/// Complete race state
#[derive(Debug, Clone)]
pub struct Race<'r> {
    config: RaceConfig,
    route: &'r Route,
    riders: Vec<Rider>,
    /// Race clock (s)
    time: f64,
    steps: usize,
    status: RaceStatus,
    /// Clock value riders were closed out at, fixed once the race is over
    cap: f64,
    timed_out: bool,
}

impl<'r> Race<'r> {
    /// Create a race on `route`. Rider names must be unique.
    pub fn new(riders: Vec<Rider>, route: &'r Route, config: RaceConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut seen = HashSet::with_capacity(riders.len());
        for rider in &riders {
            if !seen.insert(rider.name.as_str()) {
                return Err(ConfigError::DuplicateRider(rider.name.clone()));
            }
        }

        Ok(Self {
            route,
            riders,
            time: 0.0,
            steps: 0,
            status: RaceStatus::NotStarted,
            cap: config.max_time,
            timed_out: false,
            config,
        })
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    pub fn route(&self) -> &Route {
        self.route
    }

    /// Riders in the order of the most recent step (front first once stepped).
    pub fn riders(&self) -> &[Rider] {
        &self.riders
    }

    pub fn rider(&self, name: &str) -> Option<&Rider> {
        self.riders.iter().find(|r| r.name == name)
    }

    pub fn into_riders(self) -> Vec<Rider> {
        self.riders
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn status(&self) -> RaceStatus {
        self.status
    }

    /// Current leader on the road
    pub fn leader(&self) -> Option<&Rider> {
        self.riders
            .iter()
            .max_by(|a, b| a.position.total_cmp(&b.position))
    }

    pub fn any_finished(&self) -> bool {
        self.riders.iter().any(|r| r.finished)
    }

    /// Advance every unfinished rider by one timestep.
    pub fn step(&mut self) {
        if self.status == RaceStatus::NotStarted {
            self.status = RaceStatus::Racing;
        }

        let dt = self.config.dt;
        let constants = self.config.constants;
        let total_length = self.route.total_length();

        // Stable sort keeps tied riders in their previous relative order.
        self.riders
            .sort_by(|a, b| b.position.total_cmp(&a.position));

        let start_positions: Option<Vec<f64>> = match self.config.gap_reference {
            GapReference::StartOfStep => Some(self.riders.iter().map(|r| r.position).collect()),
            GapReference::Sequential => None,
        };

        for idx in 0..self.riders.len() {
            let (ahead, rest) = self.riders.split_at_mut(idx);
            let rider = &mut rest[0];
            if rider.finished {
                continue;
            }

            let leader = ahead.last();
            let gap = leader.map(|l| {
                let leader_position = match &start_positions {
                    Some(positions) => positions[idx - 1],
                    None => l.position,
                };
                leader_position - rider.position
            });

            let draft_factor = match gap {
                Some(g) if self.config.drafting => compute_draft_factor(g),
                _ => 1.0,
            };
            let gradient = self.route.gradient_at(rider.position);

            let context = RaceContext {
                time: self.time,
                gap: gap.unwrap_or(0.0),
                at_front: leader.is_none(),
                draft_factor,
                gradient,
            };
            let power = rider.choose_power(&context).max(0.0);

            let (acceleration, next_speed) = physics::next_speed(
                power,
                rider.velocity,
                gradient,
                &rider.body,
                draft_factor,
                dt,
                &constants,
            );

            let was_cooked = rider.physiology.is_cooked();
            rider.physiology.update(power, dt);
            if !was_cooked && rider.physiology.is_cooked() {
                log::debug!("{} is cooked at {:.1}s", rider.name, self.time);
            }

            rider.velocity = next_speed;
            rider.position += next_speed * dt;

            let mut blocked = false;
            if let Some(leader) = leader {
                if rider.position > leader.position - MIN_FOLLOW_GAP {
                    rider.position = leader.position - MIN_FOLLOW_GAP;
                    rider.velocity = rider.velocity.min(leader.velocity);
                    blocked = true;
                }
            }

            if rider.position >= total_length {
                rider.finished = true;
                rider.finish_time = Some(self.time);
                rider.position = total_length;
                log::debug!("{} finished at {:.1}s", rider.name, self.time);
            }

            rider.last_effort = Some(Effort {
                context,
                power,
                acceleration,
                blocked,
            });
        }

        self.time += dt;
        self.steps += 1;
    }

    /// Race until someone finishes or the clock reaches `max_time`.
    ///
    /// Steps already taken count against the cap. Once the race is over,
    /// further calls return the same result.
    pub fn run(&mut self, max_time: f64) -> Result<RaceResult, ConfigError> {
        validate_max_time(max_time)?;
        Ok(self.run_until(max_time))
    }

    /// Race with the configured time cap.
    pub fn run_to_cap(&mut self) -> RaceResult {
        self.run_until(self.config.max_time)
    }

    fn run_until(&mut self, max_time: f64) -> RaceResult {
        if self.status == RaceStatus::Finished {
            return self.rank();
        }

        let max_steps = (max_time / self.config.dt) as usize;
        for _ in self.steps..max_steps {
            if self.any_finished() {
                break;
            }
            self.step();
        }

        // Manual steps past the cap close out at the clock actually raced.
        self.cap = if self.steps > max_steps { self.time } else { max_time };
        self.timed_out = !self.any_finished();
        if self.timed_out {
            log::warn!(
                "No finisher within {:.1}s, ranking {} riders by distance",
                self.cap,
                self.riders.len()
            );
            for rider in &mut self.riders {
                rider.finished = true;
                rider.finish_time = Some(self.cap);
            }
        }

        self.status = RaceStatus::Finished;
        self.rank()
    }

    fn rank(&mut self) -> RaceResult {
        let (cap, timed_out) = (self.cap, self.timed_out);
        let finish_key = |r: &Rider| r.finish_time.unwrap_or(f64::INFINITY);
        self.riders.sort_by(|a, b| {
            b.position
                .total_cmp(&a.position)
                .then_with(|| finish_key(a).total_cmp(&finish_key(b)))
        });

        let standings: Vec<Standing> = self
            .riders
            .iter()
            .enumerate()
            .map(|(i, rider)| {
                let ridden = rider.finish_time.unwrap_or(self.time);
                Standing {
                    rank: (i + 1) as u32,
                    name: rider.name.clone(),
                    distance: rider.position,
                    finish_time: rider.finish_time.unwrap_or(cap),
                    crossed_line: rider.finished && !timed_out,
                    average_speed: if ridden > 0.0 { rider.position / ridden } else { 0.0 },
                    cooked: rider.physiology.is_cooked(),
                    traits: RiderTraits::from(rider),
                }
            })
            .collect();

        RaceResult {
            order: standings.iter().map(|s| s.name.clone()).collect(),
            finish_times: standings
                .iter()
                .map(|s| (s.name.clone(), s.finish_time))
                .collect(),
            standings,
            timed_out,
            elapsed_time: self.time,
        }
    }
}
