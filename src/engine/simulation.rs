//! Simulation - Monte-Carlo sweep over randomized races
//!
//! Builds fresh riders with sampled traits for every race, runs the races
//! in parallel and folds the results into a `Summary`. Each race draws from
//! its own RNG seeded from the sweep seed and the race index, so a sweep is
//! reproducible no matter how rayon schedules it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::physics::Body;
use crate::engine::physiology::Physiology;
use crate::engine::policy::{PowerPolicy, ThresholdPolicy};
use crate::engine::race::{Race, RaceConfig, RaceResult};
use crate::engine::rider::{Rider, RiderTraits};
use crate::engine::route::Route;
use crate::error::ConfigError;

/// Winning margins (m) separating the finishing styles
const BUNCH_SPRINT_MARGIN: f64 = 5.0;
const SMALL_GROUP_MARGIN: f64 = 50.0;

/// Inclusive uniform sampling range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraitRange {
    pub min: f64,
    pub max: f64,
}

impl TraitRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        // The uniform sampler scales the width, so keep it well clear of overflow.
        let width = self.max - self.min;
        if !(2.0 * width).is_finite() || self.min < 0.0 || self.min > self.max {
            return Err(ConfigError::InvalidTraitRange {
                name,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        if self.min == self.max {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

/// Ranges rider traits are drawn from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraitRanges {
    /// System mass (kg)
    pub mass: TraitRange,
    /// Critical power (W)
    pub critical_power: TraitRange,
    /// Anaerobic capacity (J)
    pub w_prime: TraitRange,
    /// Drag area (m²)
    pub cda: TraitRange,
    /// Rolling resistance coefficient
    pub crr: TraitRange,
    /// Peak sprint power (W)
    pub sprint_power: TraitRange,
}

impl Default for TraitRanges {
    fn default() -> Self {
        Self {
            mass: TraitRange::new(65.0, 80.0),
            critical_power: TraitRange::new(280.0, 360.0),
            w_prime: TraitRange::new(15000.0, 25000.0),
            cda: TraitRange::new(0.25, 0.35),
            crr: TraitRange::new(0.003, 0.005),
            sprint_power: TraitRange::new(900.0, 1300.0),
        }
    }
}

impl TraitRanges {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mass.validate("mass")?;
        self.critical_power.validate("critical_power")?;
        self.w_prime.validate("w_prime")?;
        self.cda.validate("cda")?;
        self.crr.validate("crr")?;
        self.sprint_power.validate("sprint_power")
    }
}

/// Monte-Carlo sweep configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of independent races
    pub races: usize,
    /// Riders sampled for each race
    pub riders_per_race: usize,
    /// Sweep seed; race `i` uses `seed + i`
    pub seed: u64,
    pub race: RaceConfig,
    pub traits: TraitRanges,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            races: 100,
            riders_per_race: 5,
            seed: 42,
            race: RaceConfig::default(),
            traits: TraitRanges::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.races == 0 {
            return Err(ConfigError::EmptySimulation("race"));
        }
        if self.riders_per_race == 0 {
            return Err(ConfigError::EmptySimulation("rider per race"));
        }
        self.race.validate()?;
        self.traits.validate()
    }
}

/// How a race was decided, from the winner's margin over the runner-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishStyle {
    /// Runner-up within drafting range
    BunchSprint,
    /// Runner-up within a few seconds of road
    SmallGroup,
    /// Clear of everyone, or alone in the race
    Solo,
    /// Nobody reached the line before the cap
    Timeout,
}

impl FinishStyle {
    pub fn classify(result: &RaceResult) -> Self {
        if result.timed_out {
            return FinishStyle::Timeout;
        }
        match result.winning_margin() {
            Some(margin) if margin < BUNCH_SPRINT_MARGIN => FinishStyle::BunchSprint,
            Some(margin) if margin < SMALL_GROUP_MARGIN => FinishStyle::SmallGroup,
            _ => FinishStyle::Solo,
        }
    }
}

impl fmt::Display for FinishStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishStyle::BunchSprint => write!(f, "bunch sprint"),
            FinishStyle::SmallGroup => write!(f, "small group"),
            FinishStyle::Solo => write!(f, "solo"),
            FinishStyle::Timeout => write!(f, "timeout"),
        }
    }
}

/// Build `Rider_{idx}` with traits drawn uniformly from `ranges`.
pub fn sample_rider(
    rng: &mut impl Rng,
    idx: usize,
    ranges: &TraitRanges,
) -> Result<Rider, ConfigError> {
    let mass = ranges.mass.sample(rng);
    let cp = ranges.critical_power.sample(rng);
    let w_prime = ranges.w_prime.sample(rng);
    let cda = ranges.cda.sample(rng);
    let crr = ranges.crr.sample(rng);
    let sprint = ranges.sprint_power.sample(rng);

    let physiology = Physiology::new(cp, w_prime)?.with_sprint_power(sprint)?;
    Rider::new(format!("Rider_{idx}"), Body::new(mass, cda, crr), physiology)
}

/// Aggregate statistics over a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub races: usize,
    pub seed: u64,
    /// Fraction of races won, per rider name
    pub wins: BTreeMap<String, f64>,
    /// Mean traits of the race winners
    pub winner_traits: RiderTraits,
    /// Race count per finishing style
    pub styles: BTreeMap<FinishStyle, usize>,
    /// Mean winner finish time (s); timed-out races count at the cap
    pub mean_winning_time: f64,
    /// Mean winner speed (m/s)
    pub mean_winning_speed: f64,
    pub timeouts: usize,
}

impl Summary {
    /// Fold race results into sweep statistics. An empty slice yields zeros.
    pub fn from_results(seed: u64, results: &[RaceResult]) -> Self {
        let races = results.len();
        let n = races.max(1) as f64;

        let mut win_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut styles: BTreeMap<FinishStyle, usize> = BTreeMap::new();
        let mut traits = RiderTraits {
            mass: 0.0,
            cda: 0.0,
            crr: 0.0,
            critical_power: 0.0,
            w_prime: 0.0,
            sprint_power: 0.0,
        };
        let mut time_sum = 0.0;
        let mut speed_sum = 0.0;
        let mut timeouts = 0;

        for result in results {
            *styles.entry(FinishStyle::classify(result)).or_default() += 1;
            if result.timed_out {
                timeouts += 1;
            }

            let Some(winner) = result.winner() else {
                continue;
            };
            *win_counts.entry(winner.name.clone()).or_default() += 1;

            traits.mass += winner.traits.mass;
            traits.cda += winner.traits.cda;
            traits.crr += winner.traits.crr;
            traits.critical_power += winner.traits.critical_power;
            traits.w_prime += winner.traits.w_prime;
            traits.sprint_power += winner.traits.sprint_power;
            time_sum += winner.finish_time;
            speed_sum += winner.average_speed;
        }

        let winners = win_counts.values().sum::<usize>().max(1) as f64;
        traits.mass /= winners;
        traits.cda /= winners;
        traits.crr /= winners;
        traits.critical_power /= winners;
        traits.w_prime /= winners;
        traits.sprint_power /= winners;

        Self {
            races,
            seed,
            wins: win_counts
                .into_iter()
                .map(|(name, count)| (name, count as f64 / n))
                .collect(),
            winner_traits: traits,
            styles,
            mean_winning_time: time_sum / winners,
            mean_winning_speed: speed_sum / winners,
            timeouts,
        }
    }

    /// Win fractions, most frequent winner first.
    pub fn ranked_wins(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> =
            self.wins.iter().map(|(name, f)| (name.as_str(), *f)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Winner histogram (fraction of {} races):", self.races)?;
        for (name, fraction) in self.ranked_wins() {
            writeln!(f, "  {name}: {fraction:.2}")?;
        }

        writeln!(f, "\nWinner traits (averages):")?;
        let t = &self.winner_traits;
        writeln!(f, "  mass: {:.2} kg", t.mass)?;
        writeln!(f, "  cp: {:.2} W", t.critical_power)?;
        writeln!(f, "  w_prime: {:.2} J", t.w_prime)?;
        writeln!(f, "  cda: {:.3} m²", t.cda)?;
        writeln!(f, "  crr: {:.4}", t.crr)?;
        writeln!(f, "  sprint: {:.2} W", t.sprint_power)?;

        writeln!(f, "\nFinishing styles:")?;
        for (style, count) in &self.styles {
            writeln!(f, "  {style}: {count}")?;
        }

        writeln!(
            f,
            "\nMean winning time: {:.1} s ({:.2} km/h)",
            self.mean_winning_time,
            self.mean_winning_speed * 3.6
        )?;
        write!(f, "Timeouts: {}", self.timeouts)
    }
}

/// Runs randomized races on a fixed route
pub struct Simulator {
    route: Route,
    config: SimulationConfig,
    policy: Arc<dyn PowerPolicy>,
}

impl Simulator {
    pub fn new(route: Route, config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            route,
            config,
            policy: Arc::new(ThresholdPolicy),
        })
    }

    /// Pacing policy handed to every sampled rider.
    pub fn with_policy(mut self, policy: impl PowerPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Deterministic RNG for one race of the sweep.
    pub fn race_rng(&self, race_index: usize) -> StdRng {
        StdRng::seed_from_u64(self.config.seed.wrapping_add(race_index as u64))
    }

    /// Sample the field for one race.
    pub fn riders_for(&self, race_index: usize) -> Result<Vec<Rider>, ConfigError> {
        let mut rng = self.race_rng(race_index);
        (0..self.config.riders_per_race)
            .map(|idx| {
                sample_rider(&mut rng, idx, &self.config.traits)
                    .map(|r| r.with_shared_policy(Arc::clone(&self.policy)))
            })
            .collect()
    }

    /// Race a given field to the configured time cap.
    pub fn run_race(&self, riders: Vec<Rider>) -> Result<RaceResult, ConfigError> {
        let mut race = Race::new(riders, &self.route, self.config.race.clone())?;
        Ok(race.run_to_cap())
    }

    /// Run the whole sweep.
    pub fn run(&self) -> Result<Summary, ConfigError> {
        log::info!(
            "Running {} races of {} riders on a {:.1} km route",
            self.config.races,
            self.config.riders_per_race,
            self.route.total_length() / 1000.0
        );
        let start = Instant::now();

        let results = (0..self.config.races)
            .into_par_iter()
            .map(|i| -> Result<RaceResult, ConfigError> {
                let result = self.run_race(self.riders_for(i)?)?;
                if let Some(winner) = result.winner() {
                    log::debug!(
                        "Race {} won by {} in {:.1}s",
                        i,
                        winner.name,
                        winner.finish_time
                    );
                }
                Ok(result)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let summary = Summary::from_results(self.config.seed, &results);
        log::info!(
            "Sweep finished in {:.2}s ({} timeouts)",
            start.elapsed().as_secs_f64(),
            summary.timeouts
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::race::Standing;
    use crate::engine::route::RouteSegment;
    use approx::assert_relative_eq;

    fn short_route() -> Route {
        Route::new(vec![
            RouteSegment::new(800.0, 0.0),
            RouteSegment::new(400.0, 0.04),
            RouteSegment::new(300.0, 0.0),
        ])
        .unwrap()
    }

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            races: 6,
            riders_per_race: 4,
            seed: 7,
            ..Default::default()
        }
    }

    fn standing(name: &str, distance: f64) -> Standing {
        Standing {
            rank: 0,
            name: name.to_string(),
            distance,
            finish_time: 100.0,
            crossed_line: true,
            average_speed: distance / 100.0,
            cooked: false,
            traits: RiderTraits {
                mass: 70.0,
                cda: 0.3,
                crr: 0.004,
                critical_power: 300.0,
                w_prime: 20000.0,
                sprint_power: 1100.0,
            },
        }
    }

    fn result(distances: &[f64], timed_out: bool) -> RaceResult {
        let standings: Vec<Standing> = distances
            .iter()
            .enumerate()
            .map(|(i, d)| standing(&format!("Rider_{i}"), *d))
            .collect();
        RaceResult {
            order: standings.iter().map(|s| s.name.clone()).collect(),
            finish_times: standings.iter().map(|s| (s.name.clone(), s.finish_time)).collect(),
            standings,
            timed_out,
            elapsed_time: 100.0,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let zero_races = SimulationConfig {
            races: 0,
            ..Default::default()
        };
        assert_eq!(
            zero_races.validate(),
            Err(ConfigError::EmptySimulation("race"))
        );

        let mut inverted = SimulationConfig::default();
        inverted.traits.mass = TraitRange::new(80.0, 65.0);
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::InvalidTraitRange { name: "mass", .. })
        ));

        let mut too_wide = SimulationConfig::default();
        too_wide.traits.w_prime = TraitRange::new(0.0, 1.7e308);
        assert!(matches!(
            too_wide.validate(),
            Err(ConfigError::InvalidTraitRange { name: "w_prime", .. })
        ));

        let mut unbounded = SimulationConfig::default();
        unbounded.traits.cda = TraitRange::new(0.25, f64::INFINITY);
        assert!(unbounded.validate().is_err());
    }

    #[test]
    fn test_sampled_traits_within_ranges() {
        let ranges = TraitRanges::default();
        let mut rng = StdRng::seed_from_u64(1);
        for idx in 0..200 {
            let r = sample_rider(&mut rng, idx, &ranges).unwrap();
            assert_eq!(r.name, format!("Rider_{idx}"));
            assert!((65.0..=80.0).contains(&r.body.mass));
            assert!((0.25..=0.35).contains(&r.body.cda));
            assert!((0.003..=0.005).contains(&r.body.crr));
            assert!((280.0..=360.0).contains(&r.physiology.critical_power()));
            assert!((15000.0..=25000.0).contains(&r.physiology.w_prime()));
            assert!((900.0..=1300.0).contains(&r.physiology.sprint_power()));
        }
    }

    #[test]
    fn test_degenerate_range_returns_fixed_value() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(TraitRange::new(70.0, 70.0).sample(&mut rng), 70.0);
    }

    #[test]
    fn test_race_fields_are_seeded_per_index() {
        let sim = Simulator::new(short_route(), small_config()).unwrap();
        let a = sim.riders_for(2).unwrap();
        let b = sim.riders_for(2).unwrap();
        let c = sim.riders_for(3).unwrap();

        assert_eq!(a.len(), 4);
        let traits = |riders: &[Rider]| riders.iter().map(RiderTraits::from).collect::<Vec<_>>();
        assert_eq!(traits(&a), traits(&b));
        assert_ne!(traits(&a), traits(&c));
    }

    #[test]
    fn test_finish_style_classification() {
        assert_eq!(FinishStyle::classify(&result(&[1000.0, 998.0], false)), FinishStyle::BunchSprint);
        assert_eq!(FinishStyle::classify(&result(&[1000.0, 980.0], false)), FinishStyle::SmallGroup);
        assert_eq!(FinishStyle::classify(&result(&[1000.0, 900.0], false)), FinishStyle::Solo);
        assert_eq!(FinishStyle::classify(&result(&[1000.0], false)), FinishStyle::Solo);
        assert_eq!(FinishStyle::classify(&result(&[500.0, 499.0], true)), FinishStyle::Timeout);
    }

    #[test]
    fn test_summary_from_results() {
        let results = vec![
            result(&[1000.0, 999.0], false),
            result(&[1000.0, 900.0], false),
            result(&[800.0, 700.0], true),
        ];
        let summary = Summary::from_results(9, &results);

        assert_eq!(summary.races, 3);
        assert_relative_eq!(summary.wins["Rider_0"], 1.0);
        assert_eq!(summary.timeouts, 1);
        assert_eq!(summary.styles[&FinishStyle::BunchSprint], 1);
        assert_eq!(summary.styles[&FinishStyle::Solo], 1);
        assert_eq!(summary.styles[&FinishStyle::Timeout], 1);
        assert_relative_eq!(summary.winner_traits.mass, 70.0);
        assert_relative_eq!(summary.mean_winning_time, 100.0);
        assert_relative_eq!(summary.mean_winning_speed, (10.0 + 10.0 + 8.0) / 3.0);

        let text = summary.to_string();
        assert!(text.contains("Rider_0: 1.00"));
        assert!(text.contains("bunch sprint: 1"));
    }

    #[test]
    fn test_sweep_is_reproducible() {
        let sim = Simulator::new(short_route(), small_config()).unwrap();
        let first = sim.run().unwrap();
        let second = sim.run().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.races, 6);
        let total: f64 = first.wins.values().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert_eq!(first.styles.values().sum::<usize>(), 6);
        assert_eq!(first.timeouts, 0);
        assert!(first.mean_winning_speed > 5.0 && first.mean_winning_speed < 20.0);
    }

    #[test]
    fn test_custom_policy_applies_to_every_rider() {
        let config = SimulationConfig {
            races: 2,
            riders_per_race: 3,
            ..Default::default()
        };
        let sim = Simulator::new(short_route(), config)
            .unwrap()
            .with_policy(crate::engine::policy::ConstantPower(0.0));
        let riders = sim.riders_for(0).unwrap();
        assert!(riders.iter().all(|r| r.policy().name() == "constant"));

        // Nobody pedals, so every race times out at the cap.
        let mut short_cap = sim.config().clone();
        short_cap.race.max_time = 10.0;
        let sim = Simulator::new(short_route(), short_cap)
            .unwrap()
            .with_policy(crate::engine::policy::ConstantPower(0.0));
        let summary = sim.run().unwrap();
        assert_eq!(summary.timeouts, 2);
        assert_relative_eq!(summary.mean_winning_time, 10.0);
    }
}
