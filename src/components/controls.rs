//! Control components: Switch, Switch2, Potentiometer and Analog Switch.

use super::{positive_param_or, Element, Pins};
use crate::solver::SolverContext;

/// A switch component. Terminals: [a, b].
///
/// Modeled as a resistance:
/// - Closed: very small resistance (0.01 ohms)
/// - Open: very large resistance (1e9 ohms)
///
/// Changing the state changes the stamped conductance, so the simulator
/// restamps before the next step.
#[derive(Debug, Clone)]
pub struct Switch {
    pins: Pins,
    pub closed: bool,
}

impl Switch {
    /// Resistance when closed.
    pub const R_CLOSED: f64 = 0.01;
    /// Resistance when open.
    pub const R_OPEN: f64 = 1e9;

    /// Create a new switch.
    pub fn new(closed: bool) -> Self {
        Self {
            pins: Pins::new(2),
            closed,
        }
    }

    /// Get the current resistance.
    pub fn resistance(&self) -> f64 {
        if self.closed {
            Self::R_CLOSED
        } else {
            Self::R_OPEN
        }
    }

    /// Set the switch state.
    pub fn set_state(&mut self, closed: bool) {
        self.closed = closed;
    }

    /// Toggle the switch state.
    pub fn toggle(&mut self) {
        self.closed = !self.closed;
    }
}

impl Element for Switch {
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
        ctx.stamp_resistor(self.pins.node(0), self.pins.node(1), self.resistance());
    }

    fn calculate_current(&mut self) {
        self.pins.current = (self.pins.volts[0] - self.pins.volts[1]) / self.resistance();
    }
}

/// A single-pole multi-throw switch. Terminals: [common, throw 0, throw 1, ...].
///
/// The common terminal is joined to the selected throw by a 0 V source; the
/// other throws are not connected at all. Moving the switch changes the
/// stamp, so the simulator restamps before the next step.
#[derive(Debug, Clone)]
pub struct Switch2 {
    pins: Pins,
    throws: usize,
    position: usize,
}

impl Switch2 {
    pub const MAX_THROWS: usize = 10;

    /// A double-throw switch resting on `position`.
    pub fn new(position: usize) -> Self {
        Self::with_throws(2, position)
    }

    /// A switch with `throws` throws, clamped to `2..=MAX_THROWS`.
    pub fn with_throws(throws: usize, position: usize) -> Self {
        let throws = throws.clamp(2, Self::MAX_THROWS);
        Self {
            pins: Pins::new(throws + 1),
            throws,
            position: position.min(throws - 1),
        }
    }

    pub fn throws(&self) -> usize {
        self.throws
    }

    /// Selected throw.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Select a throw. Out-of-range positions are ignored.
    pub fn set_position(&mut self, position: usize) {
        if position < self.throws {
            self.position = position;
        }
    }

    /// Advance to the next throw, wrapping around.
    pub fn toggle(&mut self) {
        self.position = (self.position + 1) % self.throws;
    }

    fn closed_terminal(&self) -> usize {
        self.position + 1
    }
}

impl Element for Switch2 {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        self.throws + 1
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        ctx.stamp_voltage_source(
            self.pins.node(0),
            self.pins.node(self.closed_terminal()),
            self.pins.branch(0),
            0.0,
        );
    }

    fn has_connection(&self, a: usize, b: usize) -> bool {
        let closed = self.closed_terminal();
        (a == 0 && b == closed) || (a == closed && b == 0)
    }

    fn is_ideal_voltage_source(&self) -> bool {
        true
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        if n == 0 {
            -self.pins.current
        } else if n == self.closed_terminal() {
            self.pins.current
        } else {
            0.0
        }
    }

    /// Voltage from the common terminal to the selected throw.
    fn voltage_diff(&self) -> f64 {
        self.pins.volts[0] - self.pins.volts[self.closed_terminal()]
    }

    fn power(&self) -> f64 {
        0.0
    }
}

/// A potentiometer component. Terminals: [a, wiper, b].
///
/// Modeled as two resistors in series with a wiper tap:
///   a ----[R1]---- wiper ----[R2]---- b
///
/// where R1 = position * total_resistance
/// and   R2 = (1 - position) * total_resistance
#[derive(Debug, Clone)]
pub struct Potentiometer {
    pins: Pins,
    pub total_resistance: f64,
    /// Position from 0.0 to 1.0
    pub position: f64,
    current_a: f64,
    current_b: f64,
}

impl Potentiometer {
    const A: usize = 0;
    const WIPER: usize = 1;
    const B: usize = 2;

    /// Create a new potentiometer.
    pub fn new(total_resistance: f64, position: f64) -> Self {
        Self {
            pins: Pins::new(3),
            total_resistance: positive_param_or(Some(total_resistance), 1000.0).max(1.0),
            position: position.clamp(0.001, 0.999), // Avoid zero resistance
            current_a: 0.0,
            current_b: 0.0,
        }
    }

    /// Get the resistance from `a` to the wiper.
    pub fn r1(&self) -> f64 {
        (self.position * self.total_resistance).max(0.1)
    }

    /// Get the resistance from the wiper to `b`.
    pub fn r2(&self) -> f64 {
        ((1.0 - self.position) * self.total_resistance).max(0.1)
    }

    /// Set the wiper position. Takes effect after the next restamp.
    pub fn set_position(&mut self, position: f64) {
        self.position = position.clamp(0.001, 0.999);
    }

    /// Current flowing out of the wiper into the circuit.
    pub fn wiper_current(&self) -> f64 {
        self.current_a + self.current_b
    }
}

impl Element for Potentiometer {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn reset(&mut self) {
        self.pins.reset();
        self.current_a = 0.0;
        self.current_b = 0.0;
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        let p = &self.pins;
        ctx.stamp_resistor(p.node(Self::A), p.node(Self::WIPER), self.r1());
        ctx.stamp_resistor(p.node(Self::WIPER), p.node(Self::B), self.r2());
    }

    fn calculate_current(&mut self) {
        let v = &self.pins.volts;
        self.current_a = (v[Self::A] - v[Self::WIPER]) / self.r1();
        self.current_b = (v[Self::B] - v[Self::WIPER]) / self.r2();
        self.pins.current = self.current_a;
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        match n {
            Self::A => -self.current_a,
            Self::B => -self.current_b,
            _ => self.wiper_current(),
        }
    }

    fn power(&self) -> f64 {
        let v = &self.pins.volts;
        (v[Self::A] - v[Self::WIPER]) * self.current_a + (v[Self::B] - v[Self::WIPER]) * self.current_b
    }
}

/// A voltage-controlled switch. Terminals: [a, b, control].
///
/// Closed (`r_on`) while the control is above 2.5 V, open (`r_off`)
/// otherwise, or the reverse when normally closed. The resistor is stamped
/// every sub-iteration.
#[derive(Debug, Clone)]
pub struct AnalogSwitch {
    pins: Pins,
    pub r_on: f64,
    pub r_off: f64,
    pub normally_closed: bool,
    resistance: f64,
}

impl AnalogSwitch {
    const THRESHOLD: f64 = 2.5;

    pub fn new() -> Self {
        Self::with_resistances(20.0, 1e10)
    }

    pub fn with_resistances(r_on: f64, r_off: f64) -> Self {
        let r_off = positive_param_or(Some(r_off), 1e10);
        Self {
            pins: Pins::new(3),
            r_on: positive_param_or(Some(r_on), 20.0),
            r_off,
            normally_closed: false,
            resistance: r_off,
        }
    }

    pub fn normally_closed(mut self) -> Self {
        self.normally_closed = true;
        self
    }

    pub fn is_open(&self) -> bool {
        (self.pins.volts[2] < Self::THRESHOLD) != self.normally_closed
    }
}

impl Default for AnalogSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for AnalogSwitch {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn stamp(&mut self, _ctx: &mut SolverContext) {}

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        self.resistance = if self.is_open() { self.r_off } else { self.r_on };
        ctx.stamp_resistor(self.pins.node(0), self.pins.node(1), self.resistance);
    }

    fn calculate_current(&mut self) {
        self.pins.current = (self.pins.volts[0] - self.pins.volts[1]) / self.resistance;
    }

    fn has_connection(&self, a: usize, b: usize) -> bool {
        a != 2 && b != 2
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        match n {
            0 => -self.pins.current,
            1 => self.pins.current,
            _ => 0.0,
        }
    }
}
