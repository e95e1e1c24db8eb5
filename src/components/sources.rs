//! Independent and controlled sources.

use std::f64::consts::PI;

use rand::Rng;

use super::{param_or, Element, History, Pins};
use crate::circuit::NodeId;
use crate::solver::SolverContext;

/// Waveform of a voltage source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Dc,
    Sine,
    Square,
    Triangle,
    Sawtooth,
    Pulse,
    Noise,
}

/// Time-dependent source voltage shared by [`VoltageSource`] and [`Rail`].
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub waveform: Waveform,
    /// Frequency (Hz)
    pub frequency: f64,
    /// Amplitude, or the value of a DC source (volts)
    pub max_voltage: f64,
    /// DC offset (volts)
    pub bias: f64,
    /// Phase shift (radians)
    pub phase: f64,
    /// Fraction of the period spent high for square and pulse waves
    pub duty_cycle: f64,
    noise_value: f64,
}

impl Signal {
    pub const DEFAULT_FREQUENCY: f64 = 40.0;

    fn new(waveform: Waveform, max_voltage: f64) -> Self {
        Self {
            waveform,
            frequency: Self::DEFAULT_FREQUENCY,
            max_voltage,
            bias: 0.0,
            phase: 0.0,
            duty_cycle: if waveform == Waveform::Pulse {
                1.0 / (2.0 * PI)
            } else {
                0.5
            },
            noise_value: 0.0,
        }
    }

    /// Source voltage at `time`.
    pub fn voltage(&self, time: f64) -> f64 {
        let two_pi = 2.0 * PI;
        let w = (two_pi * time * self.frequency + self.phase).rem_euclid(two_pi);
        match self.waveform {
            Waveform::Dc => self.max_voltage + self.bias,
            Waveform::Sine => w.sin() * self.max_voltage + self.bias,
            Waveform::Square => {
                if w > two_pi * self.duty_cycle {
                    self.bias - self.max_voltage
                } else {
                    self.bias + self.max_voltage
                }
            }
            Waveform::Triangle => {
                let tri = if w < PI {
                    w * (2.0 / PI) - 1.0
                } else {
                    1.0 - (w - PI) * (2.0 / PI)
                };
                self.bias + tri * self.max_voltage
            }
            Waveform::Sawtooth => self.bias + w * (self.max_voltage / PI) - self.max_voltage,
            Waveform::Pulse => {
                if w < two_pi * self.duty_cycle {
                    self.max_voltage + self.bias
                } else {
                    self.bias
                }
            }
            Waveform::Noise => self.noise_value,
        }
    }

    fn refresh_noise(&mut self, ctx: &mut SolverContext) {
        if self.waveform == Waveform::Noise {
            let r: f64 = ctx.rng().gen();
            self.noise_value = (r * 2.0 - 1.0) * self.max_voltage + self.bias;
        }
    }
}

/// An independent voltage source. Terminals: [positive, negative].
///
/// The branch current flows from the positive terminal through the source
/// to the negative one, so a source delivering power reports a negative
/// current.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pins: Pins,
    pub signal: Signal,
}

impl VoltageSource {
    /// A DC source of `voltage` volts.
    pub fn dc(voltage: f64) -> Self {
        Self::with_waveform(Waveform::Dc, voltage)
    }

    /// A periodic source of the given amplitude.
    pub fn with_waveform(waveform: Waveform, max_voltage: f64) -> Self {
        Self {
            pins: Pins::new(2),
            signal: Signal::new(waveform, param_or(Some(max_voltage), 5.0)),
        }
    }

    pub fn frequency(mut self, frequency: f64) -> Self {
        self.signal.frequency = param_or(Some(frequency), Signal::DEFAULT_FREQUENCY);
        self
    }

    pub fn bias(mut self, bias: f64) -> Self {
        self.signal.bias = param_or(Some(bias), 0.0);
        self
    }

    pub fn phase(mut self, phase: f64) -> Self {
        self.signal.phase = param_or(Some(phase), 0.0);
        self
    }

    pub fn duty_cycle(mut self, duty: f64) -> Self {
        self.signal.duty_cycle = param_or(Some(duty), 0.5).clamp(0.0, 1.0);
        self
    }

    /// Change the amplitude (the value of a DC source).
    pub fn set_voltage(&mut self, voltage: f64) {
        self.signal.max_voltage = voltage;
    }
}

impl Element for VoltageSource {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        ctx.stamp_voltage_source(
            self.pins.node(0),
            self.pins.node(1),
            self.pins.branch(0),
            0.0,
        );
    }

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        let v = self.signal.voltage(ctx.time);
        ctx.update_voltage_source(self.pins.branch(0), v);
    }

    fn finish_iteration(&mut self, ctx: &mut SolverContext) {
        self.signal.refresh_noise(ctx);
    }

    fn save_history(&self, history: &mut History) {
        history.save_pins(&self.pins);
        history.push(self.signal.noise_value);
    }

    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(&mut self.pins);
        self.signal.noise_value = history.pop();
    }

    fn is_ideal_voltage_source(&self) -> bool {
        true
    }
}

/// A voltage source referenced to ground. Terminal: [output].
#[derive(Debug, Clone)]
pub struct Rail {
    pins: Pins,
    pub signal: Signal,
}

impl Rail {
    pub fn dc(voltage: f64) -> Self {
        Self::with_waveform(Waveform::Dc, voltage)
    }

    pub fn with_waveform(waveform: Waveform, max_voltage: f64) -> Self {
        Self {
            pins: Pins::new(1),
            signal: Signal::new(waveform, param_or(Some(max_voltage), 5.0)),
        }
    }

    pub fn frequency(mut self, frequency: f64) -> Self {
        self.signal.frequency = param_or(Some(frequency), Signal::DEFAULT_FREQUENCY);
        self
    }

    pub fn bias(mut self, bias: f64) -> Self {
        self.signal.bias = param_or(Some(bias), 0.0);
        self
    }
}

impl Element for Rail {
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
        let v = self.signal.voltage(ctx.time);
        ctx.update_voltage_source(self.pins.branch(0), v);
    }

    fn finish_iteration(&mut self, ctx: &mut SolverContext) {
        self.signal.refresh_noise(ctx);
    }

    fn save_history(&self, history: &mut History) {
        history.save_pins(&self.pins);
        history.push(self.signal.noise_value);
    }

    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(&mut self.pins);
        self.signal.noise_value = history.pop();
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

/// An independent current source. Terminals: [a, b]; the current flows
/// from `a` through the source to `b`.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pins: Pins,
    pub value: f64,
}

impl CurrentSource {
    pub fn new(value: f64) -> Self {
        let value = param_or(Some(value), 0.01);
        Self {
            pins: Pins {
                current: value,
                ..Pins::new(2)
            },
            value,
        }
    }
}

impl Element for CurrentSource {
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
        self.pins.current = self.value;
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        ctx.stamp_current_source(self.pins.node(0), self.pins.node(1), self.value);
        self.pins.current = self.value;
    }
}

/// Voltage-controlled voltage source.
/// Terminals: [out+, out-, in+, in-]; `V(out) = gain * V(in)`.
#[derive(Debug, Clone)]
pub struct Vcvs {
    pins: Pins,
    pub gain: f64,
}

impl Vcvs {
    pub fn new(gain: f64) -> Self {
        Self {
            pins: Pins::new(4),
            gain: param_or(Some(gain), 1.0),
        }
    }
}

impl Element for Vcvs {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        4
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        let p = &self.pins;
        ctx.stamp_vcvs(p.node(0), p.node(1), p.node(2), p.node(3), p.branch(0), self.gain);
    }

    fn has_connection(&self, a: usize, b: usize) -> bool {
        a < 2 && b < 2
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        match n {
            0 => -self.pins.current,
            1 => self.pins.current,
            _ => 0.0,
        }
    }
}

/// Voltage-controlled current source.
/// Terminals: [out+, out-, in+, in-]; `gm * V(in)` flows from out+
/// through the source to out-.
#[derive(Debug, Clone)]
pub struct Vccs {
    pins: Pins,
    pub transconductance: f64,
}

impl Vccs {
    pub fn new(transconductance: f64) -> Self {
        Self {
            pins: Pins::new(4),
            transconductance: param_or(Some(transconductance), 1e-3),
        }
    }
}

impl Element for Vccs {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        4
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        let p = &self.pins;
        ctx.stamp_vccs(p.node(0), p.node(1), p.node(2), p.node(3), self.transconductance);
    }

    fn calculate_current(&mut self) {
        let v = &self.pins.volts;
        self.pins.current = self.transconductance * (v[2] - v[3]);
    }

    fn has_connection(&self, a: usize, b: usize) -> bool {
        a < 2 && b < 2
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        match n {
            0 => -self.pins.current,
            1 => self.pins.current,
            _ => 0.0,
        }
    }
}

/// Current-controlled current source.
/// Terminals: [out+, out-, in+, in-]. The input is a 0 V sense source
/// carrying `i` from in+ to in-; `gain * i` flows from out+ through the
/// source to out-.
#[derive(Debug, Clone)]
pub struct Cccs {
    pins: Pins,
    pub gain: f64,
}

impl Cccs {
    pub fn new(gain: f64) -> Self {
        Self {
            pins: Pins::new(4),
            gain: param_or(Some(gain), 2.0),
        }
    }

    /// Current through the sense input, in+ to in-.
    pub fn sense_current(&self) -> f64 {
        self.pins.current
    }
}

impl Element for Cccs {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        4
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        let p = &self.pins;
        ctx.stamp_voltage_source(p.node(2), p.node(3), p.branch(0), 0.0);
        ctx.stamp_cccs(p.node(0), p.node(1), p.branch(0), self.gain);
    }

    fn has_connection(&self, a: usize, b: usize) -> bool {
        (a < 2) == (b < 2)
    }

    /// Output current, out+ to out-.
    fn current(&self) -> f64 {
        self.gain * self.pins.current
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        match n {
            0 => -self.current(),
            1 => self.current(),
            2 => -self.pins.current,
            _ => self.pins.current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{BranchId, NodeId};
    use approx::assert_relative_eq;

    #[test]
    fn test_dc_and_bias() {
        let v = VoltageSource::dc(5.0).bias(1.0);
        assert_eq!(v.signal.voltage(0.3), 6.0);
    }

    #[test]
    fn test_sine_quarter_period() {
        let v = VoltageSource::with_waveform(Waveform::Sine, 2.0).frequency(50.0);
        assert_relative_eq!(v.signal.voltage(0.005), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_square_duty() {
        let v = VoltageSource::with_waveform(Waveform::Square, 1.0).frequency(1.0);
        assert_eq!(v.signal.voltage(0.25), 1.0);
        assert_eq!(v.signal.voltage(0.75), -1.0);
    }

    #[test]
    fn test_triangle_and_sawtooth_bounds() {
        let tri = Signal::new(Waveform::Triangle, 3.0);
        assert_relative_eq!(tri.voltage(0.0), -3.0);
        let saw = Signal::new(Waveform::Sawtooth, 3.0);
        assert_relative_eq!(saw.voltage(0.0), -3.0);
        assert_relative_eq!(saw.voltage(0.5 / Signal::DEFAULT_FREQUENCY), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pulse_default_duty() {
        let p = Signal::new(Waveform::Pulse, 5.0);
        assert_eq!(p.voltage(0.0), 5.0);
        assert_eq!(p.voltage(0.5 / Signal::DEFAULT_FREQUENCY), 0.0);
    }

    #[test]
    fn test_noise_is_seeded() {
        let mut a = Signal::new(Waveform::Noise, 1.0);
        let mut b = a.clone();
        let mut ctx1 = SolverContext::new(1e-6, 7);
        let mut ctx2 = SolverContext::new(1e-6, 7);
        a.refresh_noise(&mut ctx1);
        b.refresh_noise(&mut ctx2);
        assert_eq!(a.voltage(0.0), b.voltage(0.0));
        assert!(a.voltage(0.0).abs() <= 1.0);
    }

    #[test]
    fn test_cccs_stamp_and_currents() {
        let mut f = Cccs::new(3.0);
        f.pins_mut().attach(
            vec![NodeId::GROUND, NodeId(1), NodeId(2), NodeId::GROUND],
            vec![BranchId(0)],
        );
        let mut ctx = SolverContext::new(1e-6, 0);
        ctx.allocate(3, 1);
        f.stamp(&mut ctx);
        // out- row reads the sense branch with -gain
        assert_eq!(ctx.matrix().get(0, 2), -3.0);
        assert_eq!(ctx.matrix().get(2, 1), 1.0);

        f.set_branch_current(0, 2e-3);
        assert_relative_eq!(f.sense_current(), 2e-3);
        assert_relative_eq!(f.current(), 6e-3);
        assert_relative_eq!(f.current_into_terminal(1), 6e-3);
        assert_relative_eq!(f.current_into_terminal(2), -2e-3);
        assert!(f.has_connection(2, 3));
        assert!(!f.has_connection(0, 2));
    }
}
