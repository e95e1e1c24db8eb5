//! MNA (Modified Nodal Analysis) solver.
//!
//! The MNA formulation creates a system of equations Ax = z where:
//! - x contains node voltages and voltage-source branch currents
//! - A is the coefficient matrix
//! - z is the source vector
//!
//! The matrix structure is:
//! ```text
//! [ G   B ] [ v ]   [ i ]
//! [ C   D ] [ j ] = [ e ]
//! ```
//!
//! where:
//! - G is the conductance matrix (node equations)
//! - B, C connect voltage sources to nodes
//! - D is usually 0 (for ideal voltage sources)
//! - v is the vector of node voltages
//! - j is the vector of voltage source currents
//! - i is the sum of current sources into each node
//! - e is the vector of voltage source values
//!
//! Linear contributions are stamped once per topology and cached; every
//! Newton-Raphson sub-iteration restores the cache and lets the nonlinear
//! elements add their linearized companions on top.

mod context;
mod mna;
mod newton;
mod simulator;

pub use context::{Halt, SolverContext};
pub use mna::MnaMatrix;
pub use newton::NewtonRaphson;
pub use simulator::{Simulator, SimulatorConfig, StepReport};

/// Default bound on Newton-Raphson sub-iterations per time step.
pub const SUB_ITER_MAX: usize = 5000;

/// Sub-iteration after which the junction conductance floor starts rising.
pub const GMIN_STEP_START: usize = 100;

/// Sub-iteration count over which the floor would rise to 1 S.
pub const GMIN_STEP_SPAN: f64 = 3000.0;

/// Upper bound of the stepped conductance floor (siemens).
pub const GMIN_LIMIT: f64 = 0.1;

/// Device currents beyond this (amps) stop the simulation.
pub const OVERFLOW_LIMIT: f64 = 1e12;

/// Conductance tying a floating node to ground (siemens).
pub const FLOATING_NODE_CONDUCTANCE: f64 = 1e-8;
