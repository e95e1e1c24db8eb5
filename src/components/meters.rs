//! Measurement elements: Ammeter and Voltmeter.
//!
//! Both keep running RMS and peak statistics of their reading, updated once
//! per converged step. The RMS window is one half-cycle: it closes whenever
//! the reading changes direction.

use super::{Element, History, Pins};
use crate::solver::SolverContext;

/// Steps of exactly zero reading after which the statistics are cleared.
const ZERO_HOLD_STEPS: u32 = 5;

/// RMS and peak tracking over the half-cycles of a waveform.
#[derive(Debug, Clone, Default)]
pub struct Tracker {
    count: u32,
    total: f64,
    rms: f64,
    max: f64,
    min: f64,
    last_max: f64,
    last_min: f64,
    rising: bool,
    zero_count: u32,
}

impl Tracker {
    fn new() -> Self {
        Self {
            rising: true,
            ..Self::default()
        }
    }

    fn close_window(&mut self) {
        let rms = (self.total / self.count as f64).sqrt();
        self.rms = if rms.is_nan() { 0.0 } else { rms };
        self.count = 0;
        self.total = 0.0;
    }

    /// Feed one step's reading.
    pub fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value * value;

        if self.rising {
            if value > self.max {
                self.max = value;
            } else if value < self.max {
                // turned down: a maximum has passed
                self.last_max = self.max;
                self.min = value;
                self.rising = false;
                self.close_window();
            }
        } else if value < self.min {
            self.min = value;
        } else if value > self.min {
            self.last_min = self.min;
            self.max = value;
            self.rising = true;
            self.close_window();
        }

        if value == 0.0 {
            self.zero_count += 1;
            if self.zero_count > ZERO_HOLD_STEPS {
                self.total = 0.0;
                self.rms = 0.0;
                self.max = 0.0;
                self.min = 0.0;
            }
        } else {
            self.zero_count = 0;
        }
    }

    fn save(&self, history: &mut History) {
        history.push_count(self.count);
        history.push(self.total);
        history.push(self.rms);
        history.push(self.max);
        history.push(self.min);
        history.push(self.last_max);
        history.push(self.last_min);
        history.push_flag(self.rising);
        history.push_count(self.zero_count);
    }

    fn restore(&mut self, history: &mut History) {
        self.count = history.pop_count();
        self.total = history.pop();
        self.rms = history.pop();
        self.max = history.pop();
        self.min = history.pop();
        self.last_max = history.pop();
        self.last_min = history.pop();
        self.rising = history.pop_flag();
        self.zero_count = history.pop_count();
    }

    /// RMS over the last completed half-cycle.
    pub fn rms(&self) -> f64 {
        self.rms
    }

    /// Last observed maximum.
    pub fn peak(&self) -> f64 {
        self.last_max
    }

    /// Last observed minimum.
    pub fn trough(&self) -> f64 {
        self.last_min
    }
}

/// A zero-volt source reporting the current through it. Terminals: [a, b].
#[derive(Debug, Clone)]
pub struct Ammeter {
    pins: Pins,
    tracker: Tracker,
}

impl Ammeter {
    pub fn new() -> Self {
        Self {
            pins: Pins::new(2),
            tracker: Tracker::new(),
        }
    }

    pub fn readings(&self) -> &Tracker {
        &self.tracker
    }
}

impl Default for Ammeter {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for Ammeter {
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

    fn reset(&mut self) {
        self.pins.reset();
        self.tracker = Tracker::new();
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        ctx.stamp_voltage_source(
            self.pins.node(0),
            self.pins.node(1),
            self.pins.branch(0),
            0.0,
        );
    }

    fn finish_iteration(&mut self, _ctx: &mut SolverContext) {
        self.tracker.record(self.pins.current);
    }

    fn save_history(&self, history: &mut History) {
        history.save_pins(&self.pins);
        self.tracker.save(history);
    }

    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(&mut self.pins);
        self.tracker.restore(history);
    }

    /// A 0 V source: two ammeters in parallel form a source loop.
    fn is_ideal_voltage_source(&self) -> bool {
        true
    }

    fn power(&self) -> f64 {
        0.0
    }
}

/// A meter reading the voltage between its terminals. Terminals: [+, -].
#[derive(Debug, Clone)]
pub struct Voltmeter {
    pins: Pins,
    tracker: Tracker,
}

impl Voltmeter {
    pub fn new() -> Self {
        Self {
            pins: Pins::new(2),
            tracker: Tracker::new(),
        }
    }

    pub fn readings(&self) -> &Tracker {
        &self.tracker
    }
}

impl Default for Voltmeter {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for Voltmeter {
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
        self.tracker = Tracker::new();
    }

    fn stamp(&mut self, _ctx: &mut SolverContext) {}

    fn finish_iteration(&mut self, _ctx: &mut SolverContext) {
        let v = self.voltage_diff();
        self.tracker.record(v);
    }

    fn save_history(&self, history: &mut History) {
        history.save_pins(&self.pins);
        self.tracker.save(history);
    }

    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(&mut self.pins);
        self.tracker.restore(history);
    }

    fn has_connection(&self, _a: usize, _b: usize) -> bool {
        false
    }

    fn power(&self) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_sine_rms_and_peak() {
        let mut t = Tracker::new();
        for k in 0..2000 {
            t.record((2.0 * PI * k as f64 / 200.0).sin());
        }
        assert_relative_eq!(t.peak(), 1.0, max_relative = 1e-3);
        assert_relative_eq!(t.trough(), -1.0, max_relative = 1e-3);
        assert_relative_eq!(t.rms(), 1.0 / 2f64.sqrt(), max_relative = 2e-2);
    }

    #[test]
    fn test_zero_reading_clears_rms() {
        let mut t = Tracker::new();
        for v in [1.0, 2.0, 1.0, 0.5] {
            t.record(v);
        }
        assert!(t.rms() > 0.0);
        for _ in 0..=ZERO_HOLD_STEPS {
            t.record(0.0);
        }
        assert_eq!(t.rms(), 0.0);
    }

    #[test]
    fn test_voltmeter_has_no_path() {
        let vm = Voltmeter::new();
        assert!(!vm.has_connection(0, 1));
        assert_eq!(vm.power(), 0.0);
    }
}
