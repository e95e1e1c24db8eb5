//! Field-effect transistors: MOSFET and JFET.
//!
//! Both use the square-law channel model:
//! - cutoff (`vgs < vth`): a 1e-8 S leak,
//! - linear (`vds < vgs - vth`): `ids = beta * ((vgs - vth) * vds - vds^2 / 2)`,
//! - saturation: `ids = beta / 2 * (vgs - vth)^2`.
//!
//! Source and drain are swapped internally when the channel is reverse
//! biased, and every terminal may move at most 0.5 V per sub-iteration.

use super::diode::DiodeModel;
use super::limiter::DiodeCore;
use super::{param_or, positive_param_or, Element, History, Pins};
use crate::circuit::NodeId;
use crate::solver::SolverContext;

/// Largest terminal voltage change per sub-iteration (volts).
const MAX_STEP: f64 = 0.5;
/// Channel conductance used in cutoff and saturation (siemens).
const LEAK_CONDUCTANCE: f64 = 1e-8;

const DRAIN: usize = 0;
const GATE: usize = 1;
const SOURCE: usize = 2;

/// Channel polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    #[default]
    N,
    P,
}

impl Channel {
    fn sign(self) -> f64 {
        match self {
            Channel::N => 1.0,
            Channel::P => -1.0,
        }
    }
}

/// Operating region of the channel after the last iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    #[default]
    Cutoff,
    Linear,
    Saturation,
}

/// The square-law channel shared by MOSFETs and JFETs.
#[derive(Debug, Clone)]
struct FetChannel {
    channel: Channel,
    vth: f64,
    beta: f64,
    last: [f64; 3],
    /// Physical current from drain to source
    ids: f64,
    gm: f64,
    region: Region,
}

impl FetChannel {
    fn new(channel: Channel, vth: f64, beta: f64) -> Self {
        Self {
            channel,
            vth,
            beta,
            last: [0.0; 3],
            ids: 0.0,
            gm: 0.0,
            region: Region::Cutoff,
        }
    }

    fn reset(&mut self) {
        self.last = [0.0; 3];
        self.ids = 0.0;
        self.gm = 0.0;
        self.region = Region::Cutoff;
    }

    fn save_history(&self, history: &mut History) {
        for &v in &self.last {
            history.push(v);
        }
    }

    fn restore_history(&mut self, history: &mut History) {
        for v in self.last.iter_mut() {
            *v = history.pop();
        }
    }

    fn non_convergence(&self, last: f64, now: f64, sub_iterations: usize) -> bool {
        let mut diff = (last - now).abs();
        // high beta devices are more sensitive
        if self.beta > 1.0 {
            diff *= 100.0;
        }
        if diff < 0.01 {
            return false;
        }
        if sub_iterations > 10 && diff < now.abs() * 0.001 {
            return false;
        }
        if sub_iterations > 100 && diff < 0.01 + (sub_iterations - 100) as f64 * 0.0001 {
            return false;
        }
        true
    }

    fn do_iteration(&mut self, ctx: &mut SolverContext, pins: &Pins) {
        let mut vs = [0.0; 3];
        for (i, v) in vs.iter_mut().enumerate() {
            *v = pins.volts[i].clamp(self.last[i] - MAX_STEP, self.last[i] + MAX_STEP);
        }
        if (0..3).any(|i| self.non_convergence(self.last[i], vs[i], ctx.sub_iterations)) {
            ctx.converged = false;
        }
        self.last = vs;

        let pol = self.channel.sign();
        let (drain, source) = if pol * vs[DRAIN] < pol * vs[SOURCE] {
            (SOURCE, DRAIN)
        } else {
            (DRAIN, SOURCE)
        };
        let real_vgs = vs[GATE] - vs[source];
        let real_vds = vs[drain] - vs[source];
        let vgs = real_vgs * pol;
        let vds = real_vds * pol;

        let (ids, gm, gds) = if vgs < self.vth {
            self.region = Region::Cutoff;
            (vds * LEAK_CONDUCTANCE, 0.0, LEAK_CONDUCTANCE)
        } else if vds < vgs - self.vth {
            self.region = Region::Linear;
            let ids = self.beta * ((vgs - self.vth) * vds - vds * vds * 0.5);
            (ids, self.beta * vds, self.beta * (vgs - vds - self.vth))
        } else {
            self.region = Region::Saturation;
            let over = vgs - self.vth;
            let ids = 0.5 * self.beta * over * over + (vds - over) * LEAK_CONDUCTANCE;
            (ids, self.beta * over, LEAK_CONDUCTANCE)
        };
        self.gm = gm;
        self.ids = if drain == DRAIN { pol * ids } else { -pol * ids };

        let rs = -pol * ids + gds * real_vds + gm * real_vgs;
        let (d, s, g) = (pins.node(drain), pins.node(source), pins.node(GATE));
        ctx.stamp_matrix(d, d, gds);
        ctx.stamp_matrix(d, s, -gds - gm);
        ctx.stamp_matrix(d, g, gm);
        ctx.stamp_matrix(s, d, -gds);
        ctx.stamp_matrix(s, s, gds + gm);
        ctx.stamp_matrix(s, g, -gm);
        ctx.stamp_right_side(d, rs);
        ctx.stamp_right_side(s, -rs);
    }
}

/// Junction between two terminals, oriented by channel polarity.
fn junction(pins: &Pins, anode: usize, cathode: usize) -> (NodeId, NodeId, f64) {
    (
        pins.node(anode),
        pins.node(cathode),
        pins.volts[anode] - pins.volts[cathode],
    )
}

/// A MOSFET. Terminals: [drain, gate, source].
#[derive(Debug, Clone)]
pub struct Mosfet {
    pins: Pins,
    fet: FetChannel,
    body_diode: Option<DiodeCore>,
    diode_current: f64,
}

impl Mosfet {
    pub const DEFAULT_THRESHOLD: f64 = 1.5;
    pub const DEFAULT_BETA: f64 = 0.02;

    pub fn new(channel: Channel, threshold: f64, beta: f64) -> Self {
        Self {
            pins: Pins::new(3),
            fet: FetChannel::new(
                channel,
                param_or(Some(threshold), Self::DEFAULT_THRESHOLD),
                positive_param_or(Some(beta), Self::DEFAULT_BETA),
            ),
            body_diode: None,
            diode_current: 0.0,
        }
    }

    pub fn n_channel() -> Self {
        Self::new(Channel::N, Self::DEFAULT_THRESHOLD, Self::DEFAULT_BETA)
    }

    pub fn p_channel() -> Self {
        Self::new(Channel::P, Self::DEFAULT_THRESHOLD, Self::DEFAULT_BETA)
    }

    /// Add the source-drain body diode.
    pub fn with_body_diode(mut self) -> Self {
        self.body_diode = Some(DiodeCore::new(&DiodeModel::default()));
        self
    }

    pub fn region(&self) -> Region {
        self.fet.region
    }

    pub fn transconductance(&self) -> f64 {
        self.fet.gm
    }

    /// Body diode (anode, cathode) terminals.
    fn body_terminals(&self) -> (usize, usize) {
        match self.fet.channel {
            Channel::N => (SOURCE, DRAIN),
            Channel::P => (DRAIN, SOURCE),
        }
    }
}

impl Element for Mosfet {
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
        self.fet.reset();
        self.diode_current = 0.0;
        if let Some(d) = self.body_diode.as_mut() {
            d.reset();
        }
    }

    fn stamp(&mut self, _ctx: &mut SolverContext) {}

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        self.fet.do_iteration(ctx, &self.pins);
        self.pins.current = self.fet.ids;
        let (anode, cathode) = self.body_terminals();
        if let Some(diode) = self.body_diode.as_mut() {
            let (a, k, v) = junction(&self.pins, anode, cathode);
            diode.do_iteration(ctx, a, k, v);
        }
    }

    fn calculate_current(&mut self) {
        let (anode, cathode) = self.body_terminals();
        if let Some(diode) = self.body_diode.as_ref() {
            let (_, _, v) = junction(&self.pins, anode, cathode);
            self.diode_current = diode.current(v);
        }
    }

    fn save_history(&self, history: &mut History) {
        history.save_pins(&self.pins);
        self.fet.save_history(history);
        if let Some(diode) = self.body_diode.as_ref() {
            diode.save_history(history);
        }
    }

    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(&mut self.pins);
        self.fet.restore_history(history);
        if let Some(diode) = self.body_diode.as_mut() {
            diode.restore_history(history);
        }
    }

    fn has_connection(&self, a: usize, b: usize) -> bool {
        a != GATE && b != GATE
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        let (anode, _) = self.body_terminals();
        let channel = match n {
            DRAIN => -self.fet.ids,
            SOURCE => self.fet.ids,
            _ => return 0.0,
        };
        let diode = if n == anode {
            -self.diode_current
        } else {
            self.diode_current
        };
        channel + diode
    }

    /// Drain-source voltage.
    fn voltage_diff(&self) -> f64 {
        self.pins.volts[DRAIN] - self.pins.volts[SOURCE]
    }

    fn power(&self) -> f64 {
        self.voltage_diff() * (self.fet.ids - self.diode_current * self.fet.channel.sign())
    }
}

/// A JFET: the square-law channel plus a gate-source junction.
/// Terminals: [drain, gate, source].
#[derive(Debug, Clone)]
pub struct Jfet {
    pins: Pins,
    fet: FetChannel,
    gate_diode: DiodeCore,
    gate_current: f64,
}

impl Jfet {
    pub const DEFAULT_THRESHOLD: f64 = -4.0;
    pub const DEFAULT_BETA: f64 = 0.00125;

    pub fn new(channel: Channel, threshold: f64, beta: f64) -> Self {
        Self {
            pins: Pins::new(3),
            fet: FetChannel::new(
                channel,
                param_or(Some(threshold), Self::DEFAULT_THRESHOLD),
                positive_param_or(Some(beta), Self::DEFAULT_BETA),
            ),
            gate_diode: DiodeCore::new(&DiodeModel::default()),
            gate_current: 0.0,
        }
    }

    pub fn n_channel() -> Self {
        Self::new(Channel::N, Self::DEFAULT_THRESHOLD, Self::DEFAULT_BETA)
    }

    pub fn p_channel() -> Self {
        Self::new(Channel::P, Self::DEFAULT_THRESHOLD, Self::DEFAULT_BETA)
    }

    pub fn region(&self) -> Region {
        self.fet.region
    }

    /// Current flowing into the gate.
    pub fn gate_current(&self) -> f64 {
        self.gate_current * self.fet.channel.sign()
    }

    fn gate_terminals(&self) -> (usize, usize) {
        match self.fet.channel {
            Channel::N => (GATE, SOURCE),
            Channel::P => (SOURCE, GATE),
        }
    }
}

impl Element for Jfet {
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
        self.fet.reset();
        self.gate_diode.reset();
        self.gate_current = 0.0;
    }

    fn stamp(&mut self, _ctx: &mut SolverContext) {}

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        self.fet.do_iteration(ctx, &self.pins);
        self.pins.current = self.fet.ids;
        let (anode, cathode) = self.gate_terminals();
        let (a, k, v) = junction(&self.pins, anode, cathode);
        self.gate_diode.do_iteration(ctx, a, k, v);
    }

    fn calculate_current(&mut self) {
        let (anode, cathode) = self.gate_terminals();
        let (_, _, v) = junction(&self.pins, anode, cathode);
        self.gate_current = self.gate_diode.current(v);
    }

    fn save_history(&self, history: &mut History) {
        history.save_pins(&self.pins);
        self.fet.save_history(history);
        self.gate_diode.save_history(history);
    }

    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(&mut self.pins);
        self.fet.restore_history(history);
        self.gate_diode.restore_history(history);
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn current_into_terminal(&self, n: usize) -> f64 {
        let (anode, cathode) = self.gate_terminals();
        let channel = match n {
            DRAIN => -self.fet.ids,
            SOURCE => self.fet.ids,
            _ => 0.0,
        };
        let diode = if n == anode {
            -self.gate_current
        } else if n == cathode {
            self.gate_current
        } else {
            0.0
        };
        channel + diode
    }

    /// Drain-source voltage.
    fn voltage_diff(&self) -> f64 {
        self.pins.volts[DRAIN] - self.pins.volts[SOURCE]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ctx() -> SolverContext {
        let mut ctx = SolverContext::new(1e-6, 0);
        ctx.allocate(4, 0);
        ctx
    }

    fn settle<E: Element>(e: &mut E, volts: [f64; 3]) -> SolverContext {
        e.pins_mut()
            .attach(vec![NodeId(1), NodeId(2), NodeId(3)], Vec::new());
        for (i, v) in volts.iter().enumerate() {
            e.set_node_voltage(i, *v);
        }
        let mut ctx = ctx();
        // the terminal clamp needs a few passes to reach large voltages
        for _ in 0..40 {
            e.do_iteration(&mut ctx);
        }
        ctx
    }

    #[test]
    fn test_nmos_saturation_current() {
        let mut m = Mosfet::n_channel();
        settle(&mut m, [10.0, 5.0, 0.0]);
        assert_eq!(m.region(), Region::Saturation);
        let over: f64 = 5.0 - 1.5;
        let expected = 0.5 * 0.02 * over * over + (10.0 - over) * LEAK_CONDUCTANCE;
        assert_relative_eq!(m.current(), expected, max_relative = 1e-9);
    }

    #[test]
    fn test_nmos_linear_and_cutoff() {
        let mut m = Mosfet::n_channel();
        settle(&mut m, [0.5, 5.0, 0.0]);
        assert_eq!(m.region(), Region::Linear);

        let mut off = Mosfet::n_channel();
        settle(&mut off, [5.0, 1.0, 0.0]);
        assert_eq!(off.region(), Region::Cutoff);
        assert_relative_eq!(off.current(), 5.0 * LEAK_CONDUCTANCE, max_relative = 1e-9);
    }

    #[test]
    fn test_pmos_mirrors_nmos() {
        let mut n = Mosfet::n_channel();
        settle(&mut n, [10.0, 5.0, 0.0]);
        let mut p = Mosfet::p_channel();
        settle(&mut p, [-10.0, -5.0, 0.0]);
        assert_relative_eq!(p.current(), -n.current(), max_relative = 1e-9);
    }

    #[test]
    fn test_reversed_channel_swaps_terminals() {
        let mut m = Mosfet::n_channel();
        settle(&mut m, [0.0, 5.0, 3.0]);
        // source above drain: current flows from source to drain
        assert!(m.current() < 0.0);
    }

    #[test]
    fn test_terminal_clamp_clears_convergence() {
        let mut m = Mosfet::n_channel();
        m.pins_mut()
            .attach(vec![NodeId(1), NodeId(2), NodeId(3)], Vec::new());
        m.set_node_voltage(0, 10.0);
        let mut ctx = ctx();
        m.do_iteration(&mut ctx);
        assert!(!ctx.converged);
        assert_eq!(m.fet.last[DRAIN], MAX_STEP);
    }

    #[test]
    fn test_jfet_conducts_at_zero_gate_bias() {
        let mut j = Jfet::n_channel();
        settle(&mut j, [10.0, 0.0, 0.0]);
        assert_eq!(j.region(), Region::Saturation);
        assert_relative_eq!(j.current(), 0.5 * 0.00125 * 16.0, max_relative = 1e-3);
    }
}
