//! Physiology - Critical power and anaerobic capacity (W′) balance
//!
//! Each rider owns one `Physiology`. Efforts above the fatigue-adjusted
//! critical power drain W′; efforts below it refill W′ at a quarter of the
//! power deficit. Accumulated work slowly lowers critical power itself.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fraction of W′ below which a rider is considered near depletion
const DEPLETION_THRESHOLD: f64 = 0.2;
/// Linear stand-in for the exponential W′ reconstitution curve
const RECOVERY_RATE: f64 = 0.25;
/// W′ balance (J) at or below which the tank counts as empty
const EMPTY_BALANCE: f64 = 1.0;

/// Energetic state of a single rider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Physiology {
    critical_power: f64,
    w_prime: f64,
    fatigue_kj: f64,
    fatigue_penalty: f64,
    sprint_power: f64,
    w_balance: f64,
    total_kj: f64,
}

impl Physiology {
    /// Default work (kJ) at which fatigue reaches its full penalty
    pub const DEFAULT_FATIGUE_KJ: f64 = 800.0;
    /// Default fractional CP drop at `fatigue_kj`
    pub const DEFAULT_FATIGUE_PENALTY: f64 = 0.15;
    /// Default peak sprint power (W)
    pub const DEFAULT_SPRINT_POWER: f64 = 1100.0;

    /// Create a fresh physiology with a full W′ tank and default tunables.
    pub fn new(critical_power: f64, w_prime: f64) -> Result<Self, ConfigError> {
        if !critical_power.is_finite() || critical_power < 0.0 {
            return Err(ConfigError::InvalidPhysiology(format!(
                "critical power must be finite and >= 0, got {critical_power}"
            )));
        }
        if !w_prime.is_finite() || w_prime < 0.0 {
            return Err(ConfigError::InvalidPhysiology(format!(
                "W' must be finite and >= 0, got {w_prime}"
            )));
        }

        Ok(Self {
            critical_power,
            w_prime,
            fatigue_kj: Self::DEFAULT_FATIGUE_KJ,
            fatigue_penalty: Self::DEFAULT_FATIGUE_PENALTY,
            sprint_power: Self::DEFAULT_SPRINT_POWER,
            w_balance: w_prime,
            total_kj: 0.0,
        })
    }

    /// Override the peak sprint power.
    pub fn with_sprint_power(mut self, sprint_power: f64) -> Result<Self, ConfigError> {
        if !sprint_power.is_finite() || sprint_power < 0.0 {
            return Err(ConfigError::InvalidPhysiology(format!(
                "sprint power must be finite and >= 0, got {sprint_power}"
            )));
        }
        self.sprint_power = sprint_power;
        Ok(self)
    }

    /// Override the fatigue curve: full `penalty` is reached after `kj` of work.
    pub fn with_fatigue(mut self, kj: f64, penalty: f64) -> Result<Self, ConfigError> {
        if !kj.is_finite() || kj <= 0.0 {
            return Err(ConfigError::InvalidPhysiology(format!(
                "fatigue work must be finite and > 0, got {kj}"
            )));
        }
        if !penalty.is_finite() || penalty < 0.0 {
            return Err(ConfigError::InvalidPhysiology(format!(
                "fatigue penalty must be finite and >= 0, got {penalty}"
            )));
        }
        self.fatigue_kj = kj;
        self.fatigue_penalty = penalty;
        Ok(self)
    }

    pub fn critical_power(&self) -> f64 {
        self.critical_power
    }

    pub fn w_prime(&self) -> f64 {
        self.w_prime
    }

    pub fn w_balance(&self) -> f64 {
        self.w_balance
    }

    pub fn total_kj(&self) -> f64 {
        self.total_kj
    }

    pub fn sprint_power(&self) -> f64 {
        self.sprint_power
    }

    pub fn fatigue_kj(&self) -> f64 {
        self.fatigue_kj
    }

    pub fn fatigue_penalty(&self) -> f64 {
        self.fatigue_penalty
    }

    /// Remaining W′ as a fraction of the full tank (1.0 for a zero-sized tank).
    pub fn w_balance_fraction(&self) -> f64 {
        if self.w_prime > 0.0 {
            self.w_balance / self.w_prime
        } else {
            1.0
        }
    }

    /// Critical power after the linear fatigue penalty for work done so far.
    pub fn fatigue_adjusted_cp(&self) -> f64 {
        let fatigue_ratio = (self.total_kj / self.fatigue_kj).min(1.0);
        let cp_drop = self.fatigue_penalty * fatigue_ratio;
        self.critical_power * (1.0 - cp_drop).max(0.0)
    }

    /// True when W′ has fallen below 20% of capacity.
    pub fn is_near_depleted(&self) -> bool {
        self.w_balance < DEPLETION_THRESHOLD * self.w_prime
    }

    /// Apply `dt` seconds at `power` watts.
    ///
    /// The threshold for this step comes from the work done before it; this
    /// step's work only raises fatigue for later steps.
    pub fn update(&mut self, power: f64, dt: f64) {
        let cp = self.fatigue_adjusted_cp();
        self.total_kj += power * dt / 1000.0;

        if power > cp {
            let depletion = (power - cp) * dt;
            self.w_balance = (self.w_balance - depletion).max(0.0);
        } else {
            let recovery = (cp - power) * dt * RECOVERY_RATE;
            self.w_balance = (self.w_balance + recovery).min(self.w_prime);
        }
    }

    /// Rough ceiling on power the rider can hold right now.
    pub fn available_power(&self) -> f64 {
        let cp = self.fatigue_adjusted_cp();
        if self.is_near_depleted() {
            cp * 1.05
        } else {
            cp * 1.4
        }
    }

    /// Empty W′ tank and critical power down more than 20%.
    pub fn is_cooked(&self) -> bool {
        self.w_balance <= EMPTY_BALANCE && self.fatigue_adjusted_cp() < 0.8 * self.critical_power
    }
}
