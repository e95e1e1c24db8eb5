//! Operational Amplifier model.
//!
//! The output is a voltage-defined branch enforcing
//! `Vout = gain * (V+ - V-)` while the differential input stays inside the
//! rails divided by the gain. Beyond that the gain collapses to a tiny slope
//! and the output is pinned just inside the rail (a soft clamp that keeps
//! the Jacobian non-singular).

use rand::Rng;

use super::{param_or, positive_param_or, Element, History, Pins};
use crate::solver::SolverContext;

/// Slope used while the output is clamped to a rail.
const CLAMPED_GAIN: f64 = 1e-4;

const OUT: usize = 0;
const IN_P: usize = 1;
const IN_N: usize = 2;

/// An op-amp. Terminals: [output, non-inverting input, inverting input].
#[derive(Debug, Clone)]
pub struct OpAmp {
    pins: Pins,
    /// Open-loop gain
    pub gain: f64,
    /// Positive rail voltage
    pub max_out: f64,
    /// Negative rail voltage
    pub min_out: f64,
    last_vd: f64,
}

impl Default for OpAmp {
    fn default() -> Self {
        Self::new(100_000.0, 15.0, -15.0)
    }
}

impl OpAmp {
    /// Create a new op-amp.
    pub fn new(gain: f64, max_out: f64, min_out: f64) -> Self {
        Self {
            pins: Pins::new(3),
            gain: positive_param_or(Some(gain), 100_000.0),
            max_out: param_or(Some(max_out), 15.0),
            min_out: param_or(Some(min_out), -15.0),
            last_vd: 0.0,
        }
    }

    /// Current delivered by the output into the circuit.
    pub fn output_current(&self) -> f64 {
        -self.pins.current
    }
}

impl Element for OpAmp {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        3
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn reset(&mut self) {
        self.pins.reset();
        self.last_vd = 0.0;
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        ctx.stamp_matrix(self.pins.node(OUT), self.pins.branch(0), 1.0);
    }

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        let v = &self.pins.volts;
        let vd = v[IN_P] - v[IN_N];
        if (self.last_vd - vd).abs() > 0.1
            || v[OUT] > self.max_out + 0.1
            || v[OUT] < self.min_out - 0.1
        {
            ctx.converged = false;
        }

        let (dx, x) = if vd >= self.max_out / self.gain
            && (self.last_vd >= 0.0 || ctx.rng().gen_ratio(1, 4))
        {
            (CLAMPED_GAIN, self.max_out - CLAMPED_GAIN * self.max_out / self.gain)
        } else if vd <= self.min_out / self.gain
            && (self.last_vd <= 0.0 || ctx.rng().gen_ratio(1, 4))
        {
            (CLAMPED_GAIN, self.min_out - CLAMPED_GAIN * self.min_out / self.gain)
        } else {
            (self.gain, 0.0)
        };

        let branch = self.pins.branch(0);
        ctx.stamp_matrix(branch, self.pins.node(IN_N), dx);
        ctx.stamp_matrix(branch, self.pins.node(IN_P), -dx);
        ctx.stamp_matrix(branch, self.pins.node(OUT), 1.0);
        ctx.stamp_right_side(branch, x);

        self.last_vd = vd;
    }

    fn save_history(&self, history: &mut History) {
        history.save_pins(&self.pins);
        history.push(self.last_vd);
    }

    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(&mut self.pins);
        self.last_vd = history.pop();
    }

    fn has_connection(&self, _a: usize, _b: usize) -> bool {
        false
    }

    fn has_ground_connection(&self, n: usize) -> bool {
        n == OUT
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        if n == OUT {
            -self.pins.current
        } else {
            0.0
        }
    }

    /// Output voltage relative to the non-inverting input.
    fn voltage_diff(&self) -> f64 {
        self.pins.volts[OUT] - self.pins.volts[IN_P]
    }

    fn power(&self) -> f64 {
        self.pins.volts[OUT] * self.pins.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{BranchId, NodeId};

    fn wired() -> (OpAmp, SolverContext) {
        let mut op = OpAmp::default();
        op.pins_mut().attach(
            vec![NodeId(1), NodeId(2), NodeId(3)],
            vec![BranchId(0)],
        );
        let mut ctx = SolverContext::new(1e-6, 0);
        ctx.allocate(4, 1);
        (op, ctx)
    }

    #[test]
    fn test_linear_region_uses_full_gain() {
        let (mut op, mut ctx) = wired();
        op.do_iteration(&mut ctx);
        // branch row is index 3
        assert_eq!(ctx.matrix().get(3, 2), 100_000.0);
        assert_eq!(ctx.matrix().get(3, 1), -100_000.0);
        assert_eq!(ctx.matrix().get(3, 0), 1.0);
        assert_eq!(ctx.matrix().z[3], 0.0);
    }

    #[test]
    fn test_positive_saturation_clamps() {
        let (mut op, mut ctx) = wired();
        op.set_node_voltage(IN_P, 1.0);
        op.do_iteration(&mut ctx);
        assert_eq!(ctx.matrix().get(3, 1), -CLAMPED_GAIN);
        let expected = 15.0 - CLAMPED_GAIN * 15.0 / 100_000.0;
        assert_eq!(ctx.matrix().z[3], expected);
        assert!(!ctx.converged);
    }

    #[test]
    fn test_no_connection_between_terminals() {
        let op = OpAmp::default();
        assert!(!op.has_connection(0, 1));
        assert!(op.has_ground_connection(OUT));
        assert!(!op.has_ground_connection(IN_P));
    }
}
