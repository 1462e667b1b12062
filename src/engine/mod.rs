//! Race Engine Module
//!
//! Steps a field of riders along a graded route: force model, W′ energy
//! balance, gap-based drafting and pacing policies, plus the Monte-Carlo
//! sweep that runs many randomized races.

pub mod physics;
pub mod physiology;
pub mod policy;
pub mod race;
pub mod rider;
pub mod route;
pub mod simulation;

pub use physics::{Body, Forces, PhysicsConstants};
pub use physiology::Physiology;
pub use policy::{ConstantPower, PowerPolicy, RaceContext, ThresholdPolicy};
pub use race::{GapReference, Race, RaceConfig, RaceResult, RaceStatus, Standing};
pub use rider::{Effort, Rider, RiderTraits};
pub use route::{default_route, Route, RouteSegment, Terrain, TerrainSection};
pub use simulation::{FinishStyle, SimulationConfig, Simulator, Summary, TraitRange, TraitRanges};
