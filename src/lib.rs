//! # CircuitSim Core
//!
//! A transient circuit simulation engine.
//!
//! This library provides:
//! - A netlist builder for describing circuit topologies
//! - Modified Nodal Analysis (MNA) based circuit simulation
//! - Linear components (R, C, L, sources), semiconductor devices (diodes,
//!   BJTs, MOSFETs, JFETs), op-amps, logic gates, switches and meters
//! - Newton-Raphson iteration with junction step limiting and gmin stepping
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`circuit`] - Netlist builder, node allocation and topology checks
//! - [`components`] - Component models and the element stamping contract
//! - [`solver`] - MNA matrix assembly, LU solving and time stepping
//!
//! ## Usage
//!
//! ```
//! use circuitsim_core::components::{Resistor, VoltageSource};
//! use circuitsim_core::{Circuit, Simulator};
//!
//! let mut circuit = Circuit::new();
//! circuit.add("V1", VoltageSource::dc(10.0), &["in", "gnd"])?;
//! circuit.add("R1", Resistor::new(1000.0), &["in", "out"])?;
//! circuit.add("R2", Resistor::new(1000.0), &["out", "gnd"])?;
//!
//! let mut sim = Simulator::new(circuit)?;
//! sim.step()?;
//! assert!((sim.node_voltage("out")? - 5.0).abs() < 1e-9);
//! # Ok::<(), circuitsim_core::SimError>(())
//! ```
//!
//! ## Circuit Simulation Method
//!
//! For each time step:
//!
//! 1. Restore the cached linear part of the system matrix A and source vector z
//! 2. Let every element add its (linearized) contribution
//! 3. Solve Ax = z and hand node voltages and branch currents back
//! 4. Repeat from 1 until no nonlinear element reports movement
//!
//! Reactive elements (C, L) are discretized using the trapezoidal rule or
//! backward Euler.

pub mod circuit;
pub mod components;
pub mod error;
pub mod solver;

// Re-export main types for convenience
pub use circuit::Circuit;
pub use error::{Result, SimError};
pub use solver::{Simulator, SimulatorConfig};

// WASM bindings
#[cfg(feature = "wasm")]
mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::WasmCircuitSim;

/// Thermal voltage at room temperature (approximately 26mV)
pub const THERMAL_VOLTAGE: f64 = 0.025865;
