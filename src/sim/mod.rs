//! Deterministic simulation module
//!
//! All flight logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by target ID)
//! - No rendering or platform dependencies

pub mod clock;
pub mod contact;
pub mod noise;
pub mod physics;
pub mod sensor;
pub mod state;
pub mod terrain;
pub mod tick;
pub mod variant;

pub use clock::{ClockAdvance, SimulationClock};
pub use contact::ContactResolver;
pub use physics::PhysicsEngineAdapter;
pub use sensor::{ActiveSensors, PassiveSensors, SensorModel, VehicleInfo};
pub use state::{FailureReason, LanderState, Lifecycle, Pose, RngState, SimEvent, Velocity};
pub use terrain::{Target, Terrain, TerrainGenerator};
pub use tick::{Simulation, TickInput, TickReport};
