pub mod actions;
pub mod agent;
pub mod config;
pub mod demand;
pub mod equilibrium;
pub mod error;
pub mod simulation;
pub mod sink;

/// Signed action input, so that negative indices can be rejected.
pub type Int = i32;
pub type UInt = u32;

pub use error::MarketError;
pub use simulation::Simulation;
