//! Artificial-life kernel: clusters of connected cells move as rigid bodies
//! through a wrapping 2D world, driven by tokens that walk their cell graphs
//! and trigger cell functions.

pub mod cell_functions;
pub mod controller;
pub mod description;
pub mod entities;
pub mod error;
pub mod grid;
pub mod physics;
pub mod recluster;
pub mod simulation;
pub mod state;
pub mod token_memory;
pub mod world_setup;

#[cfg(test)]
mod tests;

pub use controller::SimulationController;
pub use entities::{Cell, CellFunction, Cluster, Particle, Token};
pub use error::KernelError;
pub use simulation::Simulation;
pub use state::WorldState;
