//! Component models for circuit simulation.
//!
//! This module provides models for all supported circuit elements:
//! - Linear: Resistor, Capacitor, Inductor, Transformer, Wire
//! - Sources: Voltage Source (with waveforms), Rail, Current Source, VCVS, VCCS, CCCS
//! - Nonlinear: Diode, BJT, MOSFET, JFET, Op-Amp
//! - Logic: Gates, Tri-state Buffer, Logic Input/Output
//! - Controls: Switch, Switch2, Potentiometer, Analog Switch
//! - Meters: Ammeter, Voltmeter
//!
//! Every element implements the [`Element`] stamping contract. The closed set
//! of variants is collected in [`Component`], which hands out the contract
//! as a trait object.

mod bjt;
mod controls;
mod diode;
mod fet;
mod limiter;
mod linear;
mod logic;
mod meters;
mod opamp;
mod sources;

pub use bjt::{BjtType, Transistor};
pub use controls::{AnalogSwitch, Potentiometer, Switch, Switch2};
pub use diode::{Diode, DiodeModel};
pub use fet::{Channel, Jfet, Mosfet, Region};
pub use limiter::{junction_gmin, limit_junction_step, DiodeCore};
pub use linear::{Capacitor, Inductor, Integration, Resistor, Transformer, Wire};
pub use logic::{Gate, GateKind, LogicInput, LogicOutput, TriStateBuffer};
pub use meters::{Ammeter, Tracker, Voltmeter};
pub use opamp::OpAmp;
pub use sources::{Cccs, CurrentSource, Rail, Signal, Vccs, Vcvs, VoltageSource, Waveform};

use crate::circuit::{BranchId, NodeId};
use crate::solver::SolverContext;

/// Use `value` when it is present and finite, `default` otherwise.
pub fn param_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => default,
    }
}

/// Like [`param_or`] but also rejects zero and negative values.
pub fn positive_param_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => default,
    }
}

/// Connection state every element carries: its node numbers (terminals
/// first, then internal nodes), its voltage-source unknowns, the terminal
/// voltage cache and the scalar current.
#[derive(Debug, Clone, Default)]
pub struct Pins {
    pub nodes: Vec<NodeId>,
    pub branches: Vec<BranchId>,
    pub volts: Vec<f64>,
    pub current: f64,
}

impl Pins {
    /// Pins for `count` nodes (terminals plus internal nodes).
    pub fn new(count: usize) -> Self {
        Self {
            nodes: vec![NodeId::GROUND; count],
            branches: Vec::new(),
            volts: vec![0.0; count],
            current: 0.0,
        }
    }

    /// Bind the allocated nodes and branches.
    pub fn attach(&mut self, nodes: Vec<NodeId>, branches: Vec<BranchId>) {
        self.volts.resize(nodes.len(), 0.0);
        self.nodes = nodes;
        self.branches = branches;
    }

    pub fn node(&self, n: usize) -> NodeId {
        self.nodes[n]
    }

    pub fn branch(&self, k: usize) -> BranchId {
        self.branches[k]
    }

    /// Clear voltages and current.
    pub fn reset(&mut self) {
        self.volts.fill(0.0);
        self.current = 0.0;
    }
}

/// Flat record of the state a step builds on, so a failed step can be
/// rolled back without cloning the circuit. Elements push and pull their
/// values in the same order.
#[derive(Debug, Clone, Default)]
pub struct History {
    values: Vec<f64>,
    cursor: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the record, keeping the allocation.
    pub fn clear(&mut self) {
        self.values.clear();
        self.cursor = 0;
    }

    /// Start reading from the beginning.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, v: f64) {
        self.values.push(v);
    }

    pub fn push_flag(&mut self, b: bool) {
        self.values.push(if b { 1.0 } else { 0.0 });
    }

    pub fn push_count(&mut self, n: u32) {
        self.values.push(f64::from(n));
    }

    pub fn pop(&mut self) -> f64 {
        let v = self.values[self.cursor];
        self.cursor += 1;
        v
    }

    pub fn pop_flag(&mut self) -> bool {
        self.pop() != 0.0
    }

    pub fn pop_count(&mut self) -> u32 {
        self.pop() as u32
    }

    pub fn save_pins(&mut self, pins: &Pins) {
        self.values.extend_from_slice(&pins.volts);
        self.values.push(pins.current);
    }

    pub fn restore_pins(&mut self, pins: &mut Pins) {
        let end = self.cursor + pins.volts.len();
        pins.volts.copy_from_slice(&self.values[self.cursor..end]);
        self.cursor = end;
        pins.current = self.pop();
    }
}

/// The stamping contract every circuit element implements.
///
/// The iteration controller calls, per step: [`start_iteration`] once, then
/// per sub-iteration [`do_iteration`] followed by [`set_node_voltage`] /
/// [`set_branch_current`] with the solution, and finally
/// [`finish_iteration`] once the step has converged. [`stamp`] is called
/// once after every topology analysis. Stamping is purely additive.
///
/// [`start_iteration`]: Element::start_iteration
/// [`do_iteration`]: Element::do_iteration
/// [`set_node_voltage`]: Element::set_node_voltage
/// [`set_branch_current`]: Element::set_branch_current
/// [`finish_iteration`]: Element::finish_iteration
/// [`stamp`]: Element::stamp
pub trait Element {
    fn pins(&self) -> &Pins;
    fn pins_mut(&mut self) -> &mut Pins;

    /// Number of external terminals.
    fn terminal_count(&self) -> usize;

    /// Number of private nodes allocated behind the terminals.
    fn internal_node_count(&self) -> usize {
        0
    }

    /// Number of voltage-source unknowns the element adds to the system.
    fn voltage_source_count(&self) -> usize {
        0
    }

    /// Clear history state. Idempotent.
    fn reset(&mut self) {
        self.pins_mut().reset();
    }

    /// Install constant contributions and mark varying rows.
    fn stamp(&mut self, ctx: &mut SolverContext);

    /// Called once per step before the sub-iteration loop.
    fn start_iteration(&mut self, _ctx: &mut SolverContext) {}

    /// Called every sub-iteration to add the linearized contributions.
    fn do_iteration(&mut self, _ctx: &mut SolverContext) {}

    /// Called once per converged step.
    fn finish_iteration(&mut self, _ctx: &mut SolverContext) {}

    /// Receive a solved node voltage.
    fn set_node_voltage(&mut self, n: usize, v: f64) {
        self.pins_mut().volts[n] = v;
        self.calculate_current();
    }

    /// Receive the solved current of the `k`-th voltage-source unknown.
    fn set_branch_current(&mut self, _k: usize, i: f64) {
        self.pins_mut().current = i;
    }

    /// Recompute the current(s) from the terminal voltages.
    fn calculate_current(&mut self) {}

    /// Record the state the next step builds on. Elements keeping history
    /// outside [`Pins`] append it after the pins.
    fn save_history(&self, history: &mut History) {
        history.save_pins(self.pins());
    }

    /// Read back what [`save_history`](Element::save_history) recorded.
    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(self.pins_mut());
    }

    /// Whether terminals `a` and `b` are connected through the element.
    fn has_connection(&self, _a: usize, _b: usize) -> bool {
        true
    }

    /// Whether terminal `n` is connected to ground through the element.
    fn has_ground_connection(&self, _n: usize) -> bool {
        false
    }

    /// Zero-impedance link merged by the allocator.
    fn is_wire(&self) -> bool {
        false
    }

    /// Ideal voltage source taking part in the voltage-loop check.
    fn is_ideal_voltage_source(&self) -> bool {
        false
    }

    /// Whether the left-hand side contributions change between sub-iterations.
    fn is_nonlinear(&self) -> bool {
        false
    }

    /// Cached terminal (and internal node) voltages.
    fn voltages(&self) -> &[f64] {
        &self.pins().volts
    }

    /// Current flowing from terminal 0 to terminal 1 through the element.
    fn current(&self) -> f64 {
        self.pins().current
    }

    /// Current flowing out of the element into the node at terminal `n`.
    fn current_into_terminal(&self, n: usize) -> f64 {
        if n == 0 {
            -self.current()
        } else {
            self.current()
        }
    }

    /// Voltage between terminal 0 and terminal 1.
    fn voltage_diff(&self) -> f64 {
        let v = self.voltages();
        match v.len() {
            0 => 0.0,
            1 => v[0],
            _ => v[0] - v[1],
        }
    }

    /// Power dissipated in the element.
    fn power(&self) -> f64 {
        self.voltage_diff() * self.current()
    }
}

macro_rules! components {
    ($($variant:ident($ty:ty) => $kind:literal,)+) => {
        /// A circuit component.
        #[derive(Debug, Clone)]
        pub enum Component {
            $($variant($ty),)+
        }

        impl Component {
            /// The element contract of this component.
            pub fn element(&self) -> &dyn Element {
                match self {
                    $(Component::$variant(c) => c,)+
                }
            }

            /// The mutable element contract of this component.
            pub fn element_mut(&mut self) -> &mut dyn Element {
                match self {
                    $(Component::$variant(c) => c,)+
                }
            }

            /// Short lowercase name of the component kind.
            pub fn kind(&self) -> &'static str {
                match self {
                    $(Component::$variant(_) => $kind,)+
                }
            }
        }

        $(
            impl From<$ty> for Component {
                fn from(c: $ty) -> Self {
                    Component::$variant(c)
                }
            }
        )+
    };
}

components! {
    Resistor(Resistor) => "resistor",
    Capacitor(Capacitor) => "capacitor",
    Inductor(Inductor) => "inductor",
    Transformer(Transformer) => "transformer",
    Wire(Wire) => "wire",
    VoltageSource(VoltageSource) => "voltage source",
    Rail(Rail) => "rail",
    CurrentSource(CurrentSource) => "current source",
    Vcvs(Vcvs) => "vcvs",
    Vccs(Vccs) => "vccs",
    Cccs(Cccs) => "cccs",
    Diode(Diode) => "diode",
    Transistor(Transistor) => "transistor",
    Mosfet(Mosfet) => "mosfet",
    Jfet(Jfet) => "jfet",
    OpAmp(OpAmp) => "op-amp",
    Gate(Gate) => "gate",
    TriStateBuffer(TriStateBuffer) => "tri-state buffer",
    LogicInput(LogicInput) => "logic input",
    LogicOutput(LogicOutput) => "logic output",
    Switch(Switch) => "switch",
    Switch2(Switch2) => "switch2",
    Potentiometer(Potentiometer) => "potentiometer",
    AnalogSwitch(AnalogSwitch) => "analog switch",
    Ammeter(Ammeter) => "ammeter",
    Voltmeter(Voltmeter) => "voltmeter",
}

impl Component {
    /// Check if this component requires Newton-Raphson iteration.
    pub fn is_nonlinear(&self) -> bool {
        self.element().is_nonlinear()
    }

    /// Total node count: terminals plus internal nodes.
    pub fn node_count(&self) -> usize {
        let e = self.element();
        e.terminal_count() + e.internal_node_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_or_defaults() {
        assert_eq!(param_or(Some(3.0), 1.0), 3.0);
        assert_eq!(param_or(None, 1.0), 1.0);
        assert_eq!(param_or(Some(f64::NAN), 1.0), 1.0);
        assert_eq!(positive_param_or(Some(-2.0), 5.0), 5.0);
        assert_eq!(positive_param_or(Some(0.0), 5.0), 5.0);
    }

    #[test]
    fn test_history_restores_pins_in_order() {
        let mut a = Resistor::new(1000.0);
        let mut b = Resistor::new(2000.0);
        a.set_node_voltage(0, 1.0);
        b.set_node_voltage(1, -2.0);
        let mut history = History::new();
        a.save_history(&mut history);
        b.save_history(&mut history);
        assert_eq!(history.len(), 6);

        a.set_node_voltage(0, 9.0);
        b.set_node_voltage(1, 9.0);
        history.rewind();
        a.restore_history(&mut history);
        b.restore_history(&mut history);
        assert_eq!(a.voltages(), &[1.0, 0.0]);
        assert_eq!(b.voltages(), &[0.0, -2.0]);
        assert_eq!(b.current(), 1e-3);
    }

    #[test]
    fn test_component_dispatch() {
        let c: Component = Resistor::new(1000.0).into();
        assert_eq!(c.kind(), "resistor");
        assert_eq!(c.element().terminal_count(), 2);
        assert!(!c.is_nonlinear());

        let d: Component = Diode::new(DiodeModel::default()).into();
        assert!(d.is_nonlinear());
    }
}
