//! Policy - Per-rider power selection
//!
//! The race engine asks each rider's policy for a target power once per
//! step. Policies are trait objects so different riders in the same race
//! can ride differently.

use serde::{Deserialize, Serialize};

use crate::engine::physiology::Physiology;

/// Gap (m) beyond which a rider is off the back and chases
pub const CHASE_GAP: f64 = 5.0;
/// Gap (m) under which a rider is tucked into the draft
pub const DRAFT_GAP: f64 = 2.0;

/// What a rider can see of the race when choosing power
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaceContext {
    /// Race clock (s)
    pub time: f64,
    /// Distance to the rider ahead (m), 0 when nobody is ahead
    pub gap: f64,
    /// No rider ahead
    pub at_front: bool,
    /// Drag-area multiplier applied this step
    pub draft_factor: f64,
    /// Road gradient under the rider
    pub gradient: f64,
}

/// Decides commanded power from race context and the rider's own state
pub trait PowerPolicy: Send + Sync {
    fn choose_power(&self, ctx: &RaceContext, physiology: &Physiology) -> f64;

    /// Short label used in logs and debug output.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> PowerPolicy for F
where
    F: Fn(&RaceContext, &Physiology) -> f64 + Send + Sync,
{
    fn choose_power(&self, ctx: &RaceContext, physiology: &Physiology) -> f64 {
        self(ctx, physiology)
    }
}

/// Gap-driven pacing: sit in when sheltered, chase when dropped, pull a
/// little over threshold at the front, back off when W′ runs low.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdPolicy;

impl PowerPolicy for ThresholdPolicy {
    fn choose_power(&self, ctx: &RaceContext, physiology: &Physiology) -> f64 {
        let cp = physiology.fatigue_adjusted_cp();
        let max_power = physiology.available_power().min(physiology.sprint_power());

        if physiology.is_near_depleted() {
            return cp * 0.95;
        }

        if ctx.gap > CHASE_GAP && !ctx.at_front {
            return max_power.min(cp * 1.3);
        }

        if !ctx.at_front && ctx.gap < DRAFT_GAP {
            return cp * 0.9;
        }

        if ctx.at_front {
            return max_power.min(cp * 1.1);
        }

        cp
    }

    fn name(&self) -> &str {
        "threshold"
    }
}

/// Fixed power regardless of context
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantPower(pub f64);

impl PowerPolicy for ConstantPower {
    fn choose_power(&self, _ctx: &RaceContext, _physiology: &Physiology) -> f64 {
        self.0
    }

    fn name(&self) -> &str {
        "constant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ctx(gap: f64, at_front: bool) -> RaceContext {
        RaceContext {
            time: 0.0,
            gap,
            at_front,
            draft_factor: 1.0,
            gradient: 0.0,
        }
    }

    fn phys() -> Physiology {
        Physiology::new(300.0, 20000.0).unwrap()
    }

    #[test]
    fn test_near_depleted_rides_conservatively() {
        let mut p = phys();
        p.update(300.0 + 19000.0, 1.0);
        let cp = p.fatigue_adjusted_cp();

        // Wins over every other rule, including chasing.
        assert_relative_eq!(ThresholdPolicy.choose_power(&ctx(20.0, false), &p), cp * 0.95);
        assert_relative_eq!(ThresholdPolicy.choose_power(&ctx(0.0, true), &p), cp * 0.95);
    }

    #[test]
    fn test_chase_when_off_the_back() {
        let p = phys();
        assert_relative_eq!(ThresholdPolicy.choose_power(&ctx(8.0, false), &p), 390.0);
    }

    #[test]
    fn test_chase_capped_by_sprint_power() {
        let p = phys().with_sprint_power(350.0).unwrap();
        assert_relative_eq!(ThresholdPolicy.choose_power(&ctx(8.0, false), &p), 350.0);
    }

    #[test]
    fn test_ease_off_in_close_draft() {
        let p = phys();
        assert_relative_eq!(ThresholdPolicy.choose_power(&ctx(1.0, false), &p), 270.0);
    }

    #[test]
    fn test_pull_at_front() {
        let p = phys();
        assert_relative_eq!(ThresholdPolicy.choose_power(&ctx(0.0, true), &p), 330.0);
    }

    #[test]
    fn test_mid_gap_rides_at_threshold() {
        let p = phys();
        assert_relative_eq!(ThresholdPolicy.choose_power(&ctx(3.5, false), &p), 300.0);
        assert_relative_eq!(ThresholdPolicy.choose_power(&ctx(5.0, false), &p), 300.0);
        assert_relative_eq!(ThresholdPolicy.choose_power(&ctx(2.0, false), &p), 300.0);
    }

    #[test]
    fn test_closure_and_constant_policies() {
        let p = phys();
        let doubled = |c: &RaceContext, _: &Physiology| c.gap * 2.0;
        assert_eq!(doubled.choose_power(&ctx(4.0, false), &p), 8.0);
        assert_eq!(doubled.name(), "custom");
        assert_eq!(ConstantPower(250.0).choose_power(&ctx(9.0, false), &p), 250.0);
    }
}
