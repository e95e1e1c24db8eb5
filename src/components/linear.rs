//! Linear passive components: Resistor, Capacitor, Inductor, Transformer, Wire.

use super::{positive_param_or, Element, History, Pins};
use crate::solver::SolverContext;

/// Integration rule for the energy-storage companion models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Integration {
    /// Second order accurate, may ring when the time constant is small
    #[default]
    Trapezoidal,
    /// First order, strongly damped
    BackwardEuler,
}

/// A resistor component. Terminals: [a, b].
#[derive(Debug, Clone)]
pub struct Resistor {
    pins: Pins,
    pub resistance: f64,
}

impl Resistor {
    /// Default resistance when an invalid value is given (ohms).
    pub const DEFAULT_RESISTANCE: f64 = 1000.0;

    /// Create a new resistor.
    pub fn new(resistance: f64) -> Self {
        Self {
            pins: Pins::new(2),
            resistance: positive_param_or(Some(resistance), Self::DEFAULT_RESISTANCE),
        }
    }

    /// Get the conductance (1/R).
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }

    /// Change the resistance. Takes effect after the next restamp.
    pub fn set_resistance(&mut self, resistance: f64) {
        self.resistance = positive_param_or(Some(resistance), self.resistance);
    }
}

impl Element for Resistor {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        ctx.stamp_resistor(self.pins.node(0), self.pins.node(1), self.resistance);
    }

    fn calculate_current(&mut self) {
        self.pins.current = (self.pins.volts[0] - self.pins.volts[1]) / self.resistance;
    }
}

/// A capacitor component. Terminals: [a, b].
///
/// In discrete-time simulation, a capacitor is modeled using a companion
/// model: a resistor `comp_resistance` in parallel with a current source
/// holding the history of the previous step. With the trapezoidal rule
/// `comp_resistance = dt / 2C`, with backward Euler `dt / C`.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pins: Pins,
    pub capacitance: f64,
    pub integration: Integration,
    /// Voltage across the capacitor at the last solution
    pub voltdiff: f64,
    comp_resistance: f64,
    cur_source: f64,
}

impl Capacitor {
    pub const DEFAULT_CAPACITANCE: f64 = 1e-5;
    /// Charge a new or reset capacitor starts with, so oscillators start.
    pub const SEED_VOLTAGE: f64 = 1e-3;

    /// Create a new capacitor holding [`Self::SEED_VOLTAGE`].
    pub fn new(capacitance: f64) -> Self {
        Self {
            pins: Pins::new(2),
            capacitance: positive_param_or(Some(capacitance), Self::DEFAULT_CAPACITANCE),
            integration: Integration::default(),
            voltdiff: Self::SEED_VOLTAGE,
            comp_resistance: 0.0,
            cur_source: 0.0,
        }
    }

    /// Start from a stored voltage, e.g. when restoring a saved circuit.
    pub fn with_voltage(mut self, voltdiff: f64) -> Self {
        self.voltdiff = voltdiff;
        self
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = integration;
        self
    }

    /// Discharge completely. Used when a wire shorts the capacitor.
    pub fn shorted(&mut self) {
        self.pins.reset();
        self.voltdiff = 0.0;
        self.cur_source = 0.0;
    }
}

impl Element for Capacitor {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn reset(&mut self) {
        self.pins.reset();
        self.cur_source = 0.0;
        self.voltdiff = Self::SEED_VOLTAGE;
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        self.comp_resistance = match self.integration {
            Integration::Trapezoidal => ctx.time_step / (2.0 * self.capacitance),
            Integration::BackwardEuler => ctx.time_step / self.capacitance,
        };
        ctx.stamp_resistor(self.pins.node(0), self.pins.node(1), self.comp_resistance);
    }

    fn start_iteration(&mut self, _ctx: &mut SolverContext) {
        self.cur_source = match self.integration {
            Integration::Trapezoidal => {
                -self.voltdiff / self.comp_resistance - self.pins.current
            }
            Integration::BackwardEuler => -self.voltdiff / self.comp_resistance,
        };
    }

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        ctx.stamp_current_source(self.pins.node(0), self.pins.node(1), self.cur_source);
    }

    fn set_node_voltage(&mut self, n: usize, v: f64) {
        self.pins.volts[n] = v;
        self.voltdiff = self.pins.volts[0] - self.pins.volts[1];
        self.calculate_current();
    }

    fn calculate_current(&mut self) {
        // not stamped yet
        if self.comp_resistance > 0.0 {
            self.pins.current = self.voltdiff / self.comp_resistance + self.cur_source;
        }
    }

    fn save_history(&self, history: &mut History) {
        history.save_pins(&self.pins);
        history.push(self.voltdiff);
    }

    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(&mut self.pins);
        self.voltdiff = history.pop();
    }
}

/// An inductor component. Terminals: [a, b].
///
/// Companion model: a resistor `comp_resistance` (`2L/dt` trapezoidal,
/// `L/dt` backward Euler) in parallel with a current source carrying the
/// current history.
#[derive(Debug, Clone)]
pub struct Inductor {
    pins: Pins,
    pub inductance: f64,
    pub integration: Integration,
    comp_resistance: f64,
    cur_source: f64,
}

impl Inductor {
    pub const DEFAULT_INDUCTANCE: f64 = 1.0;

    /// Create a new inductor carrying no current.
    pub fn new(inductance: f64) -> Self {
        Self {
            pins: Pins::new(2),
            inductance: positive_param_or(Some(inductance), Self::DEFAULT_INDUCTANCE),
            integration: Integration::default(),
            comp_resistance: 0.0,
            cur_source: 0.0,
        }
    }

    /// Start from a stored current.
    pub fn with_current(mut self, current: f64) -> Self {
        self.pins.current = current;
        self
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = integration;
        self
    }
}

impl Element for Inductor {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn reset(&mut self) {
        self.pins.reset();
        self.cur_source = 0.0;
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        self.comp_resistance = match self.integration {
            Integration::Trapezoidal => 2.0 * self.inductance / ctx.time_step,
            Integration::BackwardEuler => self.inductance / ctx.time_step,
        };
        ctx.stamp_resistor(self.pins.node(0), self.pins.node(1), self.comp_resistance);
    }

    fn start_iteration(&mut self, _ctx: &mut SolverContext) {
        self.cur_source = match self.integration {
            Integration::Trapezoidal => {
                self.voltage_diff() / self.comp_resistance + self.pins.current
            }
            Integration::BackwardEuler => self.pins.current,
        };
    }

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        ctx.stamp_current_source(self.pins.node(0), self.pins.node(1), self.cur_source);
    }

    fn calculate_current(&mut self) {
        if self.comp_resistance > 0.0 {
            self.pins.current = self.voltage_diff() / self.comp_resistance + self.cur_source;
        }
    }
}

/// Two coupled windings. Terminals: [primary+, primary-, secondary+, secondary-].
///
/// With `L1` the primary inductance, `L2 = L1 * ratio^2` and
/// `M = k * sqrt(L1 * L2)`, the winding equations
///
/// ```text
/// v1 = L1 di1/dt + M  di2/dt
/// v2 = M  di1/dt + L2 di2/dt
/// ```
///
/// are inverted to `di/dt = A v` and integrated like the inductor: each
/// winding gets a conductance, a transconductance from the other winding
/// and a history current source.
#[derive(Debug, Clone)]
pub struct Transformer {
    pins: Pins,
    /// Primary inductance (henries)
    pub inductance: f64,
    /// Secondary to primary turns ratio
    pub ratio: f64,
    /// Coupling coefficient, strictly between 0 and 1
    pub coupling: f64,
    pub integration: Integration,
    /// Secondary winding current; the primary one lives in the pins
    secondary_current: f64,
    /// Inverse inductance matrix scaled by the integration step
    a: [f64; 4],
    cur_source: [f64; 2],
}

impl Transformer {
    pub const DEFAULT_INDUCTANCE: f64 = 4.0;
    pub const DEFAULT_COUPLING: f64 = 0.999;

    const P1: usize = 0;
    const P2: usize = 1;
    const S1: usize = 2;
    const S2: usize = 3;

    pub fn new(inductance: f64, ratio: f64) -> Self {
        Self {
            pins: Pins::new(4),
            inductance: positive_param_or(Some(inductance), Self::DEFAULT_INDUCTANCE),
            ratio: positive_param_or(Some(ratio), 1.0),
            coupling: Self::DEFAULT_COUPLING,
            integration: Integration::default(),
            secondary_current: 0.0,
            a: [0.0; 4],
            cur_source: [0.0; 2],
        }
    }

    /// Set the coupling coefficient. Values outside (0, 1) are ignored.
    pub fn with_coupling(mut self, coupling: f64) -> Self {
        if coupling > 0.0 && coupling < 1.0 {
            self.coupling = coupling;
        }
        self
    }

    pub fn with_integration(mut self, integration: Integration) -> Self {
        self.integration = integration;
        self
    }

    /// Start from stored winding currents.
    pub fn with_currents(mut self, primary: f64, secondary: f64) -> Self {
        self.pins.current = primary;
        self.secondary_current = secondary;
        self
    }

    pub fn primary_current(&self) -> f64 {
        self.pins.current
    }

    pub fn secondary_current(&self) -> f64 {
        self.secondary_current
    }

    fn winding_voltages(&self) -> (f64, f64) {
        let v = &self.pins.volts;
        (v[Self::P1] - v[Self::P2], v[Self::S1] - v[Self::S2])
    }
}

impl Element for Transformer {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        4
    }

    fn reset(&mut self) {
        self.pins.reset();
        self.secondary_current = 0.0;
        self.cur_source = [0.0; 2];
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        let l1 = self.inductance;
        let l2 = l1 * self.ratio * self.ratio;
        let m = self.coupling * (l1 * l2).sqrt();
        let ts = match self.integration {
            Integration::Trapezoidal => ctx.time_step / 2.0,
            Integration::BackwardEuler => ctx.time_step,
        };
        let scale = ts / (l1 * l2 - m * m);
        self.a = [l2 * scale, -m * scale, -m * scale, l1 * scale];

        let (p1, p2) = (self.pins.node(Self::P1), self.pins.node(Self::P2));
        let (s1, s2) = (self.pins.node(Self::S1), self.pins.node(Self::S2));
        ctx.stamp_conductance(p1, p2, self.a[0]);
        ctx.stamp_vccs(p1, p2, s1, s2, self.a[1]);
        ctx.stamp_vccs(s1, s2, p1, p2, self.a[2]);
        ctx.stamp_conductance(s1, s2, self.a[3]);
    }

    fn start_iteration(&mut self, _ctx: &mut SolverContext) {
        let (v1, v2) = self.winding_voltages();
        let a = &self.a;
        self.cur_source = match self.integration {
            Integration::Trapezoidal => [
                v1 * a[0] + v2 * a[1] + self.pins.current,
                v1 * a[2] + v2 * a[3] + self.secondary_current,
            ],
            Integration::BackwardEuler => [self.pins.current, self.secondary_current],
        };
    }

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        let p = &self.pins;
        ctx.stamp_current_source(p.node(Self::P1), p.node(Self::P2), self.cur_source[0]);
        ctx.stamp_current_source(p.node(Self::S1), p.node(Self::S2), self.cur_source[1]);
    }

    fn calculate_current(&mut self) {
        // not stamped yet
        if self.a[0] == 0.0 {
            return;
        }
        let (v1, v2) = self.winding_voltages();
        let a = &self.a;
        self.pins.current = v1 * a[0] + v2 * a[1] + self.cur_source[0];
        self.secondary_current = v1 * a[2] + v2 * a[3] + self.cur_source[1];
    }

    fn save_history(&self, history: &mut History) {
        history.save_pins(&self.pins);
        history.push(self.secondary_current);
    }

    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(&mut self.pins);
        self.secondary_current = history.pop();
    }

    fn has_connection(&self, a: usize, b: usize) -> bool {
        (a < Self::S1) == (b < Self::S1)
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        match n {
            Self::P1 => -self.pins.current,
            Self::P2 => self.pins.current,
            Self::S1 => -self.secondary_current,
            _ => self.secondary_current,
        }
    }

    fn power(&self) -> f64 {
        let (v1, v2) = self.winding_voltages();
        v1 * self.pins.current + v2 * self.secondary_current
    }
}

/// A zero-impedance connection. The allocator merges both terminals into
/// one node, so a wire never reaches the matrix.
#[derive(Debug, Clone)]
pub struct Wire {
    pins: Pins,
}

impl Wire {
    pub fn new() -> Self {
        Self { pins: Pins::new(2) }
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for Wire {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn stamp(&mut self, _ctx: &mut SolverContext) {}

    fn is_wire(&self) -> bool {
        true
    }
}
