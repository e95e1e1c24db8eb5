//! Circuit graph representation and analysis.
//!
//! The [`Circuit`] struct holds all components and the nets their terminals
//! attach to. [`allocate`] numbers nodes and unknowns and
//! [`validate_circuit`] checks the resulting topology before simulation.

mod allocator;
mod graph;
mod types;
mod validate;

pub use allocator::{allocate, Topology};
pub use graph::Circuit;
pub use types::*;
pub use validate::validate_circuit;
