//! BJT (Bipolar Junction Transistor) model.
//!
//! Uses the Ebers-Moll model for NPN and PNP transistors: two junctions with
//! a fixed leakage, forward gain derived from `hfe` and a reverse gain of
//! 0.5. Both junctions are linearized every sub-iteration and stamped with
//! their three-terminal cross terms.

use super::limiter::{critical_voltage, limit_junction_step};
use super::{positive_param_or, Element, History, Pins};
use crate::solver::{Halt, SolverContext, OVERFLOW_LIMIT};
use crate::THERMAL_VOLTAGE;

/// Junction saturation current (amps).
const LEAKAGE: f64 = 1e-13;
/// Reverse current gain.
const R_GAIN: f64 = 0.5;
/// Convergence tolerance on both junction voltages (volts).
const TOLERANCE: f64 = 0.01;
/// Sub-iterations over which the junction floor ramps to 1 S. Shorter than
/// the diode ramp: a transistor needs help sooner.
const GMIN_STEP_SPAN: f64 = 300.0;

/// BJT type (NPN or PNP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BjtType {
    #[default]
    Npn,
    Pnp,
}

impl BjtType {
    /// Polarity sign: +1 for NPN, -1 for PNP.
    pub fn sign(self) -> f64 {
        match self {
            BjtType::Npn => 1.0,
            BjtType::Pnp => -1.0,
        }
    }
}

/// A bipolar transistor. Terminals: [collector, base, emitter].
#[derive(Debug, Clone)]
pub struct Transistor {
    pins: Pins,
    pub bjt_type: BjtType,
    pub hfe: f64,
    /// Power rating in watts; exceeding it breaks the device
    pub max_power: Option<f64>,
    pub broken: bool,
    fgain: f64,
    vcrit: f64,
    last_vbc: f64,
    last_vbe: f64,
    ic: f64,
    ib: f64,
    ie: f64,
}

impl Transistor {
    pub const DEFAULT_HFE: f64 = 100.0;

    /// Create a new transistor.
    pub fn new(bjt_type: BjtType, hfe: f64) -> Self {
        let hfe = positive_param_or(Some(hfe), Self::DEFAULT_HFE);
        Self {
            pins: Pins::new(3),
            bjt_type,
            hfe,
            max_power: None,
            broken: false,
            fgain: hfe / (hfe + 1.0),
            vcrit: critical_voltage(THERMAL_VOLTAGE, LEAKAGE),
            last_vbc: 0.0,
            last_vbe: 0.0,
            ic: 0.0,
            ib: 0.0,
            ie: 0.0,
        }
    }

    pub fn npn() -> Self {
        Self::new(BjtType::Npn, Self::DEFAULT_HFE)
    }

    pub fn pnp() -> Self {
        Self::new(BjtType::Pnp, Self::DEFAULT_HFE)
    }

    pub fn with_max_power(mut self, watts: f64) -> Self {
        self.max_power = Some(watts).filter(|w| *w > 0.0);
        self
    }

    /// Start from stored junction voltages.
    pub fn with_junction_voltages(mut self, vbe: f64, vbc: f64) -> Self {
        self.last_vbe = vbe;
        self.last_vbc = vbc;
        self.pins.volts = vec![-vbc, 0.0, -vbe];
        self
    }

    pub fn collector_current(&self) -> f64 {
        self.ic
    }

    pub fn base_current(&self) -> f64 {
        self.ib
    }

    pub fn emitter_current(&self) -> f64 {
        self.ie
    }
}

impl Element for Transistor {
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
        self.last_vbc = 0.0;
        self.last_vbe = 0.0;
        self.broken = false;
    }

    fn stamp(&mut self, _ctx: &mut SolverContext) {}

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        let v = &self.pins.volts;
        let (vc, vb, ve) = (v[0], v[1], v[2]);
        let mut vbc = vb - vc;
        let mut vbe = vb - ve;
        if (vbc - self.last_vbc).abs() > TOLERANCE || (vbe - self.last_vbe).abs() > TOLERANCE {
            ctx.converged = false;
        }

        let gmin = ctx.gmin_over(LEAKAGE * 0.01, GMIN_STEP_SPAN);

        let pol = self.bjt_type.sign();
        let vt = THERMAL_VOLTAGE;
        vbc = pol * limit_junction_step(pol * vbc, pol * self.last_vbc, vt, self.vcrit, &mut ctx.converged);
        vbe = pol * limit_junction_step(pol * vbe, pol * self.last_vbe, vt, self.vcrit, &mut ctx.converged);
        self.last_vbc = vbc;
        self.last_vbe = vbe;

        let vdcoef = 1.0 / vt;
        let inv_fgain = 1.0 / self.fgain;
        let pcoef = vdcoef * pol;
        let expbc = (vbc * pcoef).exp();
        let expbe = (vbe * pcoef).exp();
        self.ie = pol * LEAKAGE * (-inv_fgain * (expbe - 1.0) + (expbc - 1.0));
        self.ic = pol * LEAKAGE * ((expbe - 1.0) - (expbc - 1.0) / R_GAIN);
        self.ib = -(self.ie + self.ic);
        self.pins.current = self.ic;

        let gee = -LEAKAGE * vdcoef * expbe * inv_fgain - gmin;
        let gec = LEAKAGE * vdcoef * expbc;
        let gce = (gee + gmin) * -self.fgain;
        let gcc = -gec / R_GAIN - gmin;

        let (c, b, e) = (self.pins.node(0), self.pins.node(1), self.pins.node(2));

        // base column
        ctx.stamp_matrix(b, b, -(gee + gec + gce + gcc));
        ctx.stamp_matrix(c, b, gce + gcc);
        ctx.stamp_matrix(e, b, gee + gec);
        // collector column
        ctx.stamp_matrix(b, c, gec + gcc);
        ctx.stamp_matrix(c, c, -gcc);
        ctx.stamp_matrix(e, c, -gec);
        // emitter column
        ctx.stamp_matrix(b, e, gee + gce);
        ctx.stamp_matrix(c, e, -gce);
        ctx.stamp_matrix(e, e, -gee);

        // solving for v(k+1), so the Jacobian times v(k) moves to the right side
        ctx.stamp_right_side(b, -self.ib - (gec + gcc) * vbc - (gee + gce) * vbe);
        ctx.stamp_right_side(c, -self.ic + gce * vbe + gcc * vbc);
        ctx.stamp_right_side(e, -self.ie + gee * vbe + gec * vbc);
    }

    fn finish_iteration(&mut self, ctx: &mut SolverContext) {
        if self.ic.abs() > OVERFLOW_LIMIT || self.ib.abs() > OVERFLOW_LIMIT {
            ctx.halt(Halt::Overflow {
                value: self.ic.abs().max(self.ib.abs()),
            });
            return;
        }
        if let Some(limit) = self.max_power {
            let p = self.power();
            if p > limit {
                self.broken = true;
                ctx.halt(Halt::Broken {
                    message: format!("dissipating {:.3} W, rated {:.3} W", p, limit),
                });
            }
        }
    }

    fn save_history(&self, history: &mut History) {
        history.save_pins(&self.pins);
        history.push(self.last_vbc);
        history.push(self.last_vbe);
    }

    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(&mut self.pins);
        self.last_vbc = history.pop();
        self.last_vbe = history.pop();
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        match n {
            0 => -self.ic,
            1 => -self.ib,
            _ => -self.ie,
        }
    }

    /// Collector-emitter voltage.
    fn voltage_diff(&self) -> f64 {
        self.pins.volts[0] - self.pins.volts[2]
    }

    fn power(&self) -> f64 {
        let v = &self.pins.volts;
        v[1] * self.ib + v[0] * self.ic + v[2] * self.ie
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::NodeId;
    use crate::solver::GMIN_LIMIT;
    use approx::assert_relative_eq;

    fn biased(vc: f64, vb: f64) -> (Transistor, SolverContext) {
        let mut q = Transistor::npn();
        q.pins_mut()
            .attach(vec![NodeId(1), NodeId(2), NodeId::GROUND], Vec::new());
        q.set_node_voltage(0, vc);
        q.set_node_voltage(1, vb);
        let mut ctx = SolverContext::new(1e-6, 0);
        ctx.allocate(3, 0);
        (q, ctx)
    }

    #[test]
    fn test_forward_active_gain() {
        let (mut q, mut ctx) = biased(5.0, 0.6);
        // iterate until the limiter has let the junctions settle
        for _ in 0..50 {
            q.do_iteration(&mut ctx);
        }
        assert!(q.collector_current() > 0.0);
        assert_relative_eq!(
            q.collector_current() / q.base_current(),
            q.hfe,
            max_relative = 1e-3
        );
        assert_relative_eq!(
            q.collector_current() + q.base_current() + q.emitter_current(),
            0.0,
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_large_step_is_limited() {
        let (mut q, mut ctx) = biased(5.0, 3.0);
        ctx.converged = true;
        q.do_iteration(&mut ctx);
        assert!(!ctx.converged);
        assert!(q.last_vbe < 3.0);
    }

    #[test]
    fn test_small_junction_change_counts_as_converged() {
        let (mut q, mut ctx) = biased(5.0, 0.6);
        for _ in 0..50 {
            q.do_iteration(&mut ctx);
        }
        // 5 mV of movement on the base junction stays inside the tolerance
        q.set_node_voltage(1, q.last_vbe + 0.005);
        ctx.converged = true;
        q.do_iteration(&mut ctx);
        assert!(ctx.converged);
    }

    #[test]
    fn test_junction_floor_ramps_within_few_hundred_passes() {
        let (mut easy, mut easy_ctx) = biased(5.0, 0.6);
        let (mut hard, mut hard_ctx) = biased(5.0, 0.6);
        hard_ctx.sub_iterations = 299;
        easy.do_iteration(&mut easy_ctx);
        hard.do_iteration(&mut hard_ctx);
        // collector diagonal carries gmin; the floor is already at its cap
        let extra = hard_ctx.matrix().get(0, 0) - easy_ctx.matrix().get(0, 0);
        assert_relative_eq!(extra, GMIN_LIMIT, max_relative = 1e-6);
    }

    #[test]
    fn test_power_rating_breaks_device() {
        let (q, mut ctx) = biased(5.0, 0.75);
        let mut q = q.with_max_power(1e-9);
        for _ in 0..50 {
            q.do_iteration(&mut ctx);
        }
        q.finish_iteration(&mut ctx);
        assert!(q.broken);
        assert!(matches!(ctx.take_halt(), Some(Halt::Broken { .. })));
    }
}
