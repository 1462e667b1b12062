//! Rider - Individual rider traits, race state and pacing policy
//!
//! Each rider owns its physiology and policy. The race engine mutates
//! kinematic state every step until the rider finishes.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::physics::Body;
use crate::engine::physiology::Physiology;
use crate::engine::policy::{PowerPolicy, RaceContext, ThresholdPolicy};
use crate::error::ConfigError;

/// What the rider did during its most recent step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Effort {
    /// Context the policy was given
    pub context: RaceContext,
    /// Power the policy commanded (W), floored at zero
    pub power: f64,
    /// Acceleration from the force model (m/s²)
    pub acceleration: f64,
    /// Overlap guard pulled the rider back behind its leader
    pub blocked: bool,
}

/// Complete state for a single rider
#[derive(Clone)]
pub struct Rider {
    /// Unique rider name within a race
    pub name: String,
    /// Mass and drag traits
    pub body: Body,
    /// Energy state
    pub physiology: Physiology,
    /// Distance along the course (m)
    pub position: f64,
    /// Current speed (m/s)
    pub velocity: f64,
    /// Crossed the line or was closed out by the time cap
    pub finished: bool,
    /// Race clock at finish (s)
    pub finish_time: Option<f64>,
    /// Last step's decision, if the rider has moved yet
    pub last_effort: Option<Effort>,
    policy: Arc<dyn PowerPolicy>,
}

impl Rider {
    /// Create a rider at the start line riding the default threshold policy.
    pub fn new(
        name: impl Into<String>,
        body: Body,
        physiology: Physiology,
    ) -> Result<Self, ConfigError> {
        let name = name.into();

        if !body.mass.is_finite() || body.mass <= 0.0 {
            return Err(ConfigError::rider(&name, format!("mass must be > 0, got {}", body.mass)));
        }
        if !body.cda.is_finite() || body.cda < 0.0 {
            return Err(ConfigError::rider(&name, format!("CdA must be >= 0, got {}", body.cda)));
        }
        if !body.crr.is_finite() || body.crr < 0.0 {
            return Err(ConfigError::rider(&name, format!("Crr must be >= 0, got {}", body.crr)));
        }

        Ok(Self {
            name,
            body,
            physiology,
            position: 0.0,
            velocity: 0.0,
            finished: false,
            finish_time: None,
            last_effort: None,
            policy: Arc::new(ThresholdPolicy),
        })
    }

    /// Replace the pacing policy.
    pub fn with_policy(mut self, policy: impl PowerPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Share an existing policy handle.
    pub fn with_shared_policy(mut self, policy: Arc<dyn PowerPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Start somewhere other than the line (negative values are clamped to 0).
    pub fn with_start_position(mut self, position: f64) -> Self {
        self.position = position.max(0.0);
        self
    }

    /// Start rolling.
    pub fn with_start_velocity(mut self, velocity: f64) -> Self {
        self.velocity = velocity.max(0.0);
        self
    }

    pub fn policy(&self) -> &dyn PowerPolicy {
        self.policy.as_ref()
    }

    /// Ask the policy for power this step.
    pub fn choose_power(&self, ctx: &RaceContext) -> f64 {
        self.policy.choose_power(ctx, &self.physiology)
    }

    /// Put the rider back on the start line with fresh legs.
    pub fn reset(&mut self, start_position: f64) -> Result<(), ConfigError> {
        let fresh = Physiology::new(self.physiology.critical_power(), self.physiology.w_prime())?
            .with_sprint_power(self.physiology.sprint_power())?
            .with_fatigue(self.physiology.fatigue_kj(), self.physiology.fatigue_penalty())?;

        self.physiology = fresh;
        self.position = start_position.max(0.0);
        self.velocity = 0.0;
        self.finished = false;
        self.finish_time = None;
        self.last_effort = None;
        Ok(())
    }
}

impl fmt::Debug for Rider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rider")
            .field("name", &self.name)
            .field("body", &self.body)
            .field("physiology", &self.physiology)
            .field("position", &self.position)
            .field("velocity", &self.velocity)
            .field("finished", &self.finished)
            .field("finish_time", &self.finish_time)
            .field("policy", &self.policy.name())
            .finish_non_exhaustive()
    }
}

/// Serializable trait summary of a rider, used for winner statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiderTraits {
    pub mass: f64,
    pub cda: f64,
    pub crr: f64,
    pub critical_power: f64,
    pub w_prime: f64,
    pub sprint_power: f64,
}

impl From<&Rider> for RiderTraits {
    fn from(rider: &Rider) -> Self {
        Self {
            mass: rider.body.mass,
            cda: rider.body.cda,
            crr: rider.body.crr,
            critical_power: rider.physiology.critical_power(),
            w_prime: rider.physiology.w_prime(),
            sprint_power: rider.physiology.sprint_power(),
        }
    }
}
