//! Physics - Resistive forces and speed integration
//!
//! One-dimensional cycling dynamics in SI units. Small-angle
//! approximations are used for the road gradient (sin ≈ tan, cos ≈ 1).

use serde::{Deserialize, Serialize};

/// Lowest speed used when converting power to drive force (m/s)
const MIN_EFFECTIVE_SPEED: f64 = 0.5;

/// Environmental and drivetrain constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConstants {
    /// Air density (kg/m³), sea level
    pub air_density: f64,
    /// Gravitational acceleration (m/s²)
    pub gravity: f64,
    /// Fraction of pedal power reaching the wheel
    pub drivetrain_efficiency: f64,
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self {
            air_density: 1.226,
            gravity: 9.80665,
            drivetrain_efficiency: 0.975,
        }
    }
}

/// Fixed physical traits of a rider and bike
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// System mass, rider plus bike (kg)
    pub mass: f64,
    /// Aerodynamic drag area (m²)
    pub cda: f64,
    /// Rolling resistance coefficient
    pub crr: f64,
}

impl Body {
    pub const fn new(mass: f64, cda: f64, crr: f64) -> Self {
        Self { mass, cda, crr }
    }
}

/// Resistive forces acting on a rider (N)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Forces {
    pub aero: f64,
    pub rolling: f64,
    pub grade: f64,
    pub total: f64,
}

/// Compute the resistive forces at the given speed and gradient.
///
/// `draft_factor` scales the drag area; values below 1 model shelter
/// behind another rider. A negative total means net assistance, which is
/// what a steep enough descent produces.
pub fn compute_forces(
    speed: f64,
    gradient: f64,
    body: &Body,
    draft_factor: f64,
    constants: &PhysicsConstants,
) -> Forces {
    let aero = 0.5 * constants.air_density * body.cda * draft_factor * speed * speed;
    let rolling = body.mass * constants.gravity * body.crr;
    let grade = body.mass * constants.gravity * gradient;

    Forces {
        aero,
        rolling,
        grade,
        total: aero + rolling + grade,
    }
}

/// Advance speed by one explicit Euler step.
///
/// Returns `(acceleration, next_speed)`. Drive force is `power / speed`
/// with speed floored at 0.5 m/s so a standing start stays finite, and the
/// resulting speed is floored at zero (no rolling backwards).
pub fn next_speed(
    power: f64,
    speed: f64,
    gradient: f64,
    body: &Body,
    draft_factor: f64,
    dt: f64,
    constants: &PhysicsConstants,
) -> (f64, f64) {
    let resistive = compute_forces(speed, gradient, body, draft_factor, constants);

    let effective_speed = speed.max(MIN_EFFECTIVE_SPEED);
    let drive_force = power * constants.drivetrain_efficiency / effective_speed;

    let acceleration = (drive_force - resistive.total) / body.mass;
    let next = (speed + acceleration * dt).max(0.0);

    (acceleration, next)
}

/// Speed at which drive force balances resistance for a constant power.
///
/// Solves `power * efficiency = v * total(v)` by bisection. With zero power
/// this is the coasting speed, which is (numerically) 0 on a climb.
pub fn steady_state_speed(
    power: f64,
    gradient: f64,
    body: &Body,
    draft_factor: f64,
    constants: &PhysicsConstants,
) -> f64 {
    let wheel_power = power * constants.drivetrain_efficiency;
    let surplus =
        |v: f64| wheel_power - v * compute_forces(v, gradient, body, draft_factor, constants).total;

    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    while surplus(hi) > 0.0 && hi < 1.0e3 {
        hi *= 2.0;
    }
    if surplus(hi) > 0.0 {
        return hi;
    }

    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if surplus(mid) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1e-12 {
            break;
        }
    }

    0.5 * (lo + hi)
}
