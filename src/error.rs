//! Error types for the circuit simulator.
//!
//! This module provides a unified error type [`SimError`] that covers
//! circuit construction, topology analysis and transient simulation.
//!
//! Errors fall into three families:
//! - construction errors (bad names, unknown nets, bad parameters),
//! - structural errors found while analyzing the topology (floating nodes,
//!   voltage source loops, singular matrices), which are never retried,
//! - simulation errors raised while stepping. Only
//!   [`SimError::NonConvergence`] is recoverable; see [`SimError::is_recoverable`].

use thiserror::Error;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Unified error type for all simulator operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    // ============ Construction Errors ============
    /// Duplicate element name
    #[error("Duplicate element name '{name}'")]
    DuplicateElement { name: String },

    /// Element not found by name
    #[error("Element '{name}' not found in circuit")]
    ElementNotFound { name: String },

    /// Net not found by name
    #[error("Net '{net}' not found in circuit")]
    NetNotFound { net: String },

    /// Wrong number of nets given for an element
    #[error("Element '{name}' has {expected} terminals but {given} nets were given")]
    TerminalMismatch {
        name: String,
        expected: usize,
        given: usize,
    },

    /// Invalid parameter value
    #[error("Invalid parameter '{param}' for element '{element}': {message}")]
    InvalidParameter {
        element: String,
        param: String,
        message: String,
    },

    // ============ Topology Errors ============
    /// Circuit has no elements at all
    #[error("Circuit has no elements")]
    EmptyCircuit,

    /// No ground reference could be chosen
    #[error("Circuit has no ground (connect a net named '0' or 'GND', or add a voltage source)")]
    MissingGround,

    /// Floating node (not connected to ground path)
    #[error("Floating node {node} detected - no path to ground")]
    FloatingNode { node: String },

    /// Ideal voltage sources or wires form a loop with no resistance
    #[error("Voltage source/wire loop with no resistance at '{element}'")]
    VoltageSourceLoop { element: String },

    /// Capacitors and voltage sources form a loop with no resistance
    #[error("Capacitor loop with no resistance at '{element}'")]
    CapacitorLoop { element: String },

    /// Current source has nowhere to drive its current
    #[error("Current source '{element}' has no current path")]
    NoCurrentPath { element: String },

    /// Matrix is singular and cannot be solved
    #[error("Singular matrix - circuit may have a short circuit or floating node")]
    SingularMatrix,

    // ============ Simulation Errors ============
    /// Newton-Raphson iteration did not converge
    #[error("Step at t={time:.6e}s did not converge after {iterations} sub-iterations")]
    NonConvergence { time: f64, iterations: usize },

    /// Numerical overflow detected
    #[error("Numerical overflow detected at {location} (value: {value:.2e})")]
    NumericalOverflow { location: String, value: f64 },

    /// An element exceeded its rating and its model is no longer valid
    #[error("Element '{element}' broke: {message}")]
    DeviceBroken { element: String, message: String },

    /// The run was stopped and must be reset before stepping again
    #[error("Simulation stopped: {reason}")]
    Stopped { reason: String },

    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },

    /// Operation requires an analyzed circuit
    #[error("Circuit has not been analyzed")]
    NotAnalyzed,
}

impl SimError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(
        element: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            element: element.into(),
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create a non-convergence error
    pub fn non_convergence(time: f64, iterations: usize) -> Self {
        Self::NonConvergence { time, iterations }
    }

    /// Create a numerical overflow error
    pub fn overflow(location: impl Into<String>, value: f64) -> Self {
        Self::NumericalOverflow {
            location: location.into(),
            value,
        }
    }

    /// Create an invalid simulation parameter error
    pub fn invalid_sim_param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }

    /// Whether the caller may retry the step (e.g. with a smaller time step).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonConvergence { .. })
    }

    /// Whether this error was found while analyzing the circuit topology.
    pub fn is_topology_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyCircuit
                | Self::MissingGround
                | Self::FloatingNode { .. }
                | Self::VoltageSourceLoop { .. }
                | Self::CapacitorLoop { .. }
                | Self::NoCurrentPath { .. }
                | Self::SingularMatrix
        )
    }
}
