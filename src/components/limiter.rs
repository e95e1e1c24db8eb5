//! Junction helpers shared by the semiconductor models.
//!
//! Diodes, transistors and FET body diodes compose these helpers rather
//! than deriving from a common base: the logarithmic step limiter, the
//! gmin floor, and [`DiodeCore`], the Shockley/Zener companion model.

use super::diode::DiodeModel;
use super::History;
use crate::circuit::NodeId;
use crate::solver::SolverContext;
use crate::THERMAL_VOLTAGE;

/// Limit a junction voltage update so the exponential current cannot
/// explode between two Newton iterations.
///
/// When `vnew` is above the critical voltage and moved more than
/// `2 * vscale`, the step is pulled back onto the load line of the previous
/// linearization. Any limiting event clears `converged`.
pub fn limit_junction_step(
    vnew: f64,
    vold: f64,
    vscale: f64,
    vcrit: f64,
    converged: &mut bool,
) -> f64 {
    if vnew > vcrit && (vnew - vold).abs() > vscale + vscale {
        *converged = false;
        if vold > 0.0 {
            let arg = 1.0 + (vnew - vold) / vscale;
            if arg > 0.0 {
                vold + vscale * arg.ln()
            } else {
                vcrit
            }
        } else {
            vscale * (vnew / vscale).ln()
        }
    } else {
        vnew
    }
}

/// Minimum conductance placed across a junction: `leakage * 0.01`,
/// raised by gmin stepping when the step struggles to converge.
pub fn junction_gmin(ctx: &SolverContext, leakage: f64) -> f64 {
    ctx.gmin(leakage * 0.01)
}

/// Critical voltage of a junction: the current there is `vscale / sqrt(2)`.
pub fn critical_voltage(vscale: f64, leakage: f64) -> f64 {
    vscale * (vscale / (std::f64::consts::SQRT_2 * leakage)).ln()
}

/// Convergence tolerance of a diode junction (volts).
const DIODE_TOLERANCE: f64 = 0.01;

/// Zener current at the breakdown voltage (amps).
const ZENER_CURRENT: f64 = -0.005;

/// Shockley diode with optional Zener breakdown, stamped as a conductance
/// `geq` in parallel with a current source `nc`.
#[derive(Debug, Clone)]
pub struct DiodeCore {
    leakage: f64,
    breakdown: f64,
    vscale: f64,
    vdcoef: f64,
    vzcoef: f64,
    zoffset: f64,
    vcrit: f64,
    vzcrit: f64,
    last_voltdiff: f64,
}

impl DiodeCore {
    pub fn new(model: &DiodeModel) -> Self {
        let vt = THERMAL_VOLTAGE;
        let leakage = model.saturation_current;
        let vscale = model.vscale();
        let vzcoef = 1.0 / vt;
        let zoffset = if model.breakdown_voltage == 0.0 {
            0.0
        } else {
            // offset giving 5 mA at the breakdown voltage
            model.breakdown_voltage - (-(1.0 + ZENER_CURRENT / leakage)).ln() / vzcoef
        };
        Self {
            leakage,
            breakdown: model.breakdown_voltage,
            vscale,
            vdcoef: 1.0 / vscale,
            vzcoef,
            zoffset,
            vcrit: critical_voltage(vscale, leakage),
            vzcrit: critical_voltage(vt, leakage),
            last_voltdiff: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.last_voltdiff = 0.0;
    }

    pub fn save_history(&self, history: &mut History) {
        history.push(self.last_voltdiff);
    }

    pub fn restore_history(&mut self, history: &mut History) {
        self.last_voltdiff = history.pop();
    }

    /// Critical voltage of the forward exponential.
    pub fn vcrit(&self) -> f64 {
        self.vcrit
    }

    /// Offset of the translated Zener exponential, 0 without breakdown.
    pub fn zener_offset(&self) -> f64 {
        self.zoffset
    }

    fn limit_step(&self, vnew: f64, vold: f64, converged: &mut bool) -> f64 {
        if vnew > self.vcrit && (vnew - vold).abs() > self.vscale + self.vscale {
            return limit_junction_step(vnew, vold, self.vscale, self.vcrit, converged);
        }
        if vnew < 0.0 && self.zoffset != 0.0 {
            // same limiting on the translated breakdown curve
            let vt = THERMAL_VOLTAGE;
            let tnew = -vnew - self.zoffset;
            let told = -vold - self.zoffset;
            let limited = limit_junction_step(tnew, told, vt, self.vzcrit, converged);
            return -(limited + self.zoffset);
        }
        vnew
    }

    /// Linearize around `voltdiff` (anode minus cathode) and stamp between
    /// `anode` and `cathode`.
    pub fn do_iteration(
        &mut self,
        ctx: &mut SolverContext,
        anode: NodeId,
        cathode: NodeId,
        voltdiff: f64,
    ) {
        if (voltdiff - self.last_voltdiff).abs() > DIODE_TOLERANCE {
            ctx.converged = false;
        }
        let v = self.limit_step(voltdiff, self.last_voltdiff, &mut ctx.converged);
        self.last_voltdiff = v;

        let gmin = junction_gmin(ctx, self.leakage);
        let (geq, nc) = if v >= 0.0 || self.breakdown == 0.0 {
            let eval = (v * self.vdcoef).exp();
            let geq = self.vdcoef * self.leakage * eval + gmin;
            (geq, (eval - 1.0) * self.leakage - geq * v)
        } else {
            let fwd = (v * self.vdcoef).exp();
            let rev = ((-v - self.zoffset) * self.vzcoef).exp();
            let geq = self.leakage * (self.vdcoef * fwd + self.vzcoef * rev) + gmin;
            (geq, self.leakage * (fwd - rev - 1.0) - geq * v)
        };
        ctx.stamp_conductance(anode, cathode, geq);
        ctx.stamp_current_source(anode, cathode, nc);
    }

    /// Junction current at `voltdiff`.
    pub fn current(&self, voltdiff: f64) -> f64 {
        if voltdiff >= 0.0 || self.breakdown == 0.0 {
            self.leakage * ((voltdiff * self.vdcoef).exp() - 1.0)
        } else {
            self.leakage
                * ((voltdiff * self.vdcoef).exp()
                    - ((-voltdiff - self.zoffset) * self.vzcoef).exp()
                    - 1.0)
        }
    }
}
