//! Digital elements: gates, tri-state buffer, logic input and output.
//!
//! Outputs are ideal voltage sources referenced to ground whose target is
//! re-evaluated every iteration from thresholded input voltages.

use rand::Rng;

use super::{positive_param_or, Element, History, Pins};
use crate::circuit::NodeId;
use crate::solver::SolverContext;

/// Once more than this many flips have been counted, the next flip may be
/// held, so the guard first acts on flip `OSCILLATION_LIMIT + 2`.
const OSCILLATION_LIMIT: u32 = 50;

/// Logic function of a [`Gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Xnor,
    Inverter,
    Buffer,
}

impl GateKind {
    fn is_inverting(self) -> bool {
        matches!(
            self,
            GateKind::Nand | GateKind::Nor | GateKind::Xnor | GateKind::Inverter
        )
    }

    fn evaluate(self, inputs: impl Iterator<Item = bool>) -> bool {
        let mut inputs = inputs;
        let f = match self {
            GateKind::And | GateKind::Nand => inputs.all(|x| x),
            GateKind::Or | GateKind::Nor => inputs.any(|x| x),
            GateKind::Xor | GateKind::Xnor => inputs.fold(false, |acc, x| acc ^ x),
            GateKind::Inverter | GateKind::Buffer => inputs.next().unwrap_or(false),
        };
        f != self.is_inverting()
    }
}

/// A logic gate. Terminals: the inputs, then the output.
#[derive(Debug, Clone)]
pub struct Gate {
    pins: Pins,
    pub kind: GateKind,
    pub high_voltage: f64,
    pub schmitt_inputs: bool,
    input_count: usize,
    input_states: Vec<bool>,
    last_output: bool,
    oscillation_count: u32,
}

impl Gate {
    pub const DEFAULT_HIGH_VOLTAGE: f64 = 5.0;

    /// Create a gate with `inputs` inputs (inverters and buffers always
    /// have one).
    pub fn new(kind: GateKind, inputs: usize) -> Self {
        let input_count = match kind {
            GateKind::Inverter | GateKind::Buffer => 1,
            _ => inputs.max(1),
        };
        Self {
            pins: Pins::new(input_count + 1),
            kind,
            high_voltage: Self::DEFAULT_HIGH_VOLTAGE,
            schmitt_inputs: false,
            input_count,
            input_states: vec![false; input_count],
            last_output: false,
            oscillation_count: 0,
        }
    }

    pub fn nand(inputs: usize) -> Self {
        Self::new(GateKind::Nand, inputs)
    }

    pub fn inverter() -> Self {
        Self::new(GateKind::Inverter, 1)
    }

    pub fn with_high_voltage(mut self, volts: f64) -> Self {
        self.high_voltage = positive_param_or(Some(volts), Self::DEFAULT_HIGH_VOLTAGE);
        self
    }

    pub fn with_schmitt_inputs(mut self) -> Self {
        self.schmitt_inputs = true;
        self
    }

    /// Start from a stored output state.
    pub fn with_last_output(mut self, high: bool) -> Self {
        self.last_output = high;
        self
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    /// Output state after the last iteration.
    pub fn last_output(&self) -> bool {
        self.last_output
    }

    /// Consecutive output flips seen so far.
    pub fn oscillation_count(&self) -> u32 {
        self.oscillation_count
    }

    fn output(&self) -> usize {
        self.input_count
    }

    fn read_input(&mut self, x: usize) -> bool {
        let v = self.pins.volts[x];
        if !self.schmitt_inputs {
            return v > self.high_voltage * 0.5;
        }
        let threshold = if self.input_states[x] { 0.35 } else { 0.55 };
        let state = v > self.high_voltage * threshold;
        self.input_states[x] = state;
        state
    }
}

impl Element for Gate {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        self.input_count + 1
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn reset(&mut self) {
        self.pins.reset();
        self.input_states.fill(false);
        self.last_output = false;
        self.oscillation_count = 0;
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        ctx.stamp_voltage_source(
            self.pins.node(self.output()),
            NodeId::GROUND,
            self.pins.branch(0),
            0.0,
        );
    }

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        let inputs: Vec<bool> = (0..self.input_count).map(|x| self.read_input(x)).collect();
        let mut f = self.kind.evaluate(inputs.into_iter());

        if f != self.last_output {
            let flips = self.oscillation_count;
            self.oscillation_count += 1;
            if flips > OSCILLATION_LIMIT {
                // oscillating too much: hold the output half of the time
                self.oscillation_count = 0;
                if ctx.rng().gen_bool(0.5) {
                    f = self.last_output;
                }
            }
        } else {
            self.oscillation_count = 0;
        }
        self.last_output = f;

        let v = if f { self.high_voltage } else { 0.0 };
        ctx.update_voltage_source(self.pins.branch(0), v);
    }

    fn save_history(&self, history: &mut History) {
        history.save_pins(&self.pins);
        for &s in &self.input_states {
            history.push_flag(s);
        }
        history.push_flag(self.last_output);
        history.push_count(self.oscillation_count);
    }

    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(&mut self.pins);
        for s in self.input_states.iter_mut() {
            *s = history.pop_flag();
        }
        self.last_output = history.pop_flag();
        self.oscillation_count = history.pop_count();
    }

    fn has_connection(&self, _a: usize, _b: usize) -> bool {
        false
    }

    fn has_ground_connection(&self, n: usize) -> bool {
        n == self.output()
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        if n == self.output() {
            -self.pins.current
        } else {
            0.0
        }
    }

    /// Output voltage.
    fn voltage_diff(&self) -> f64 {
        self.pins.volts[self.output()]
    }
}

/// A tri-state buffer. Terminals: [input, output, enable].
///
/// The driven level sits on an internal node behind a resistor that is
/// `r_on` while enable is high and `r_off` otherwise.
#[derive(Debug, Clone)]
pub struct TriStateBuffer {
    pins: Pins,
    pub r_on: f64,
    pub r_off: f64,
    resistance: f64,
}

impl TriStateBuffer {
    const THRESHOLD: f64 = 2.5;
    const HIGH: f64 = 5.0;
    const INTERNAL: usize = 3;

    pub fn new() -> Self {
        Self::with_resistances(0.1, 1e10)
    }

    pub fn with_resistances(r_on: f64, r_off: f64) -> Self {
        let r_off = positive_param_or(Some(r_off), 1e10);
        Self {
            pins: Pins::new(4),
            r_on: positive_param_or(Some(r_on), 0.1),
            r_off,
            resistance: r_off,
        }
    }

    /// Whether the output is disconnected.
    pub fn is_open(&self) -> bool {
        self.pins.volts[2] < Self::THRESHOLD
    }
}

impl Default for TriStateBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for TriStateBuffer {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn internal_node_count(&self) -> usize {
        1
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        ctx.stamp_voltage_source(
            self.pins.node(Self::INTERNAL),
            NodeId::GROUND,
            self.pins.branch(0),
            0.0,
        );
    }

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        self.resistance = if self.is_open() { self.r_off } else { self.r_on };
        ctx.stamp_resistor(self.pins.node(Self::INTERNAL), self.pins.node(1), self.resistance);
        let v = if self.pins.volts[0] > Self::THRESHOLD {
            Self::HIGH
        } else {
            0.0
        };
        ctx.update_voltage_source(self.pins.branch(0), v);
    }

    fn set_branch_current(&mut self, _k: usize, _i: f64) {}

    fn calculate_current(&mut self) {
        let v = &self.pins.volts;
        self.pins.current = (v[Self::INTERNAL] - v[1]) / self.resistance;
    }

    fn has_connection(&self, _a: usize, _b: usize) -> bool {
        false
    }

    fn has_ground_connection(&self, n: usize) -> bool {
        n == 1 || n == Self::INTERNAL
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        if n == 1 {
            self.pins.current
        } else {
            0.0
        }
    }
}

/// A logic level source. Terminal: [output].
#[derive(Debug, Clone)]
pub struct LogicInput {
    pins: Pins,
    pub high: bool,
    pub high_voltage: f64,
    pub low_voltage: f64,
}

impl LogicInput {
    pub fn new(high: bool) -> Self {
        Self {
            pins: Pins::new(1),
            high,
            high_voltage: 5.0,
            low_voltage: 0.0,
        }
    }

    pub fn set_high(&mut self, high: bool) {
        self.high = high;
    }

    fn level(&self) -> f64 {
        if self.high {
            self.high_voltage
        } else {
            self.low_voltage
        }
    }
}

impl Element for LogicInput {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        1
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        ctx.stamp_voltage_source(self.pins.node(0), NodeId::GROUND, self.pins.branch(0), 0.0);
    }

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        ctx.update_voltage_source(self.pins.branch(0), self.level());
    }

    fn has_ground_connection(&self, _n: usize) -> bool {
        true
    }

    fn is_ideal_voltage_source(&self) -> bool {
        true
    }

    fn current_into_terminal(&self, _n: usize) -> f64 {
        -self.pins.current
    }
}

/// A logic indicator reading a node against a threshold. Terminal: [input].
#[derive(Debug, Clone)]
pub struct LogicOutput {
    pins: Pins,
    pub threshold: f64,
}

impl LogicOutput {
    pub fn new() -> Self {
        Self {
            pins: Pins::new(1),
            threshold: 2.5,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn is_high(&self) -> bool {
        self.pins.volts[0] > self.threshold
    }
}

impl Default for LogicOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for LogicOutput {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        1
    }

    fn stamp(&mut self, _ctx: &mut SolverContext) {}

    fn current_into_terminal(&self, _n: usize) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::BranchId;

    #[test]
    fn test_gate_functions() {
        let t = [true, true];
        let m = [true, false];
        assert!(GateKind::And.evaluate(t.into_iter()));
        assert!(!GateKind::Nand.evaluate(t.into_iter()));
        assert!(GateKind::Or.evaluate(m.into_iter()));
        assert!(!GateKind::Nor.evaluate(m.into_iter()));
        assert!(GateKind::Xor.evaluate(m.into_iter()));
        assert!(!GateKind::Xor.evaluate(t.into_iter()));
        assert!(GateKind::Xnor.evaluate(t.into_iter()));
        assert!(!GateKind::Inverter.evaluate([true].into_iter()));
        assert!(GateKind::Buffer.evaluate([true].into_iter()));
    }

    fn wired_inverter() -> (Gate, SolverContext) {
        let mut g = Gate::inverter();
        g.pins_mut()
            .attach(vec![NodeId(1), NodeId(2)], vec![BranchId(0)]);
        let mut ctx = SolverContext::new(1e-6, 3);
        ctx.allocate(3, 1);
        (g, ctx)
    }

    #[test]
    fn test_schmitt_hysteresis() {
        let mut g = Gate::new(GateKind::Buffer, 1).with_schmitt_inputs();
        g.pins_mut().volts[0] = 2.6;
        assert!(!g.read_input(0));
        g.pins_mut().volts[0] = 2.8;
        assert!(g.read_input(0));
        g.pins_mut().volts[0] = 2.0;
        assert!(g.read_input(0));
        g.pins_mut().volts[0] = 1.7;
        assert!(!g.read_input(0));
    }

    #[test]
    fn test_oscillation_counter_resets_on_stable_output() {
        let (mut g, mut ctx) = wired_inverter();
        // input low -> output flips high once
        g.do_iteration(&mut ctx);
        assert!(g.last_output());
        assert_eq!(g.oscillation_count(), 1);
        g.do_iteration(&mut ctx);
        assert_eq!(g.oscillation_count(), 0);
    }

    #[test]
    fn test_oscillation_guard_trips_after_limit() {
        let (mut g, mut ctx) = wired_inverter();
        let mut flip = |g: &mut Gate| {
            let v = if g.last_output() { 5.0 } else { 0.0 };
            g.set_node_voltage(0, v);
            g.do_iteration(&mut ctx);
        };
        // drive the input with the output so the inverter toggles every pass
        for _ in 0..=OSCILLATION_LIMIT {
            flip(&mut g);
        }
        assert_eq!(g.oscillation_count(), OSCILLATION_LIMIT + 1);
        flip(&mut g);
        assert_eq!(g.oscillation_count(), 0);
    }

    #[test]
    fn test_tristate_open_when_disabled() {
        let mut t = TriStateBuffer::new();
        assert!(t.is_open());
        t.pins_mut().volts[2] = 5.0;
        assert!(!t.is_open());
    }
}
