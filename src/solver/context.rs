//! Solver context passed to every element while stamping.
//!
//! The context owns the MNA system, the convergence flag and counters of the
//! current step, and the seeded random generator used by the tie-breaking
//! heuristics of gates, op-amps and noise sources.

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::mna::MnaMatrix;
use super::{GMIN_LIMIT, GMIN_STEP_START, GMIN_STEP_SPAN};
use crate::circuit::{BranchId, NodeId, VarIndex};

/// A condition raised by an element that must stop the run.
#[derive(Debug, Clone, PartialEq)]
pub enum Halt {
    /// A device current grew beyond any physical meaning
    Overflow { value: f64 },
    /// A device exceeded its rating
    Broken { message: String },
}

/// The part of a [`SolverContext`] a failed step disturbs.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    time: f64,
    time_step: f64,
    solution: Vec<f64>,
    rng: StdRng,
}

impl Checkpoint {
    pub(crate) fn time(&self) -> f64 {
        self.time
    }
}

/// State shared between the iteration controller and the elements.
#[derive(Debug, Clone)]
pub struct SolverContext {
    /// Simulation time of the step being solved (seconds)
    pub time: f64,
    /// Time step (seconds)
    pub time_step: f64,
    /// Cleared by any element whose controlling voltage is still moving
    pub converged: bool,
    /// Index of the current sub-iteration within the step
    pub sub_iterations: usize,
    node_count: usize,
    branch_count: usize,
    matrix: MnaMatrix,
    rng: StdRng,
    seed: u64,
    halt: Option<Halt>,
}

impl SolverContext {
    /// Create an empty context. [`allocate`](Self::allocate) sizes the system.
    pub fn new(time_step: f64, seed: u64) -> Self {
        Self {
            time: 0.0,
            time_step,
            converged: true,
            sub_iterations: 0,
            node_count: 1,
            branch_count: 0,
            matrix: MnaMatrix::new(0),
            rng: StdRng::seed_from_u64(seed),
            seed,
            halt: None,
        }
    }

    /// Size the system for `node_count` nodes (ground included) and
    /// `branch_count` voltage-source unknowns.
    pub fn allocate(&mut self, node_count: usize, branch_count: usize) {
        self.node_count = node_count.max(1);
        self.branch_count = branch_count;
        self.matrix = MnaMatrix::new(self.node_count - 1 + branch_count);
    }

    /// Rewind time, clear the solution and reseed the generator.
    pub fn reset(&mut self) {
        self.time = 0.0;
        self.converged = true;
        self.sub_iterations = 0;
        self.halt = None;
        self.matrix.x.fill(0.0);
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            time: self.time,
            time_step: self.time_step,
            solution: self.matrix.x.clone(),
            rng: self.rng.clone(),
        }
    }

    /// Return to a checkpoint. The matrix itself is rebuilt by the next
    /// restamp.
    pub(crate) fn rollback(&mut self, checkpoint: &Checkpoint) {
        self.time = checkpoint.time;
        self.time_step = checkpoint.time_step;
        self.matrix.x.copy_from_slice(&checkpoint.solution);
        self.rng.clone_from(&checkpoint.rng);
        self.converged = true;
        self.sub_iterations = 0;
        self.halt = None;
    }

    /// Number of nodes, ground included.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of voltage-source unknowns.
    pub fn branch_count(&self) -> usize {
        self.branch_count
    }

    /// Dimension of the linear system.
    pub fn size(&self) -> usize {
        self.matrix.size
    }

    pub fn matrix(&self) -> &MnaMatrix {
        &self.matrix
    }

    pub(crate) fn matrix_mut(&mut self) -> &mut MnaMatrix {
        &mut self.matrix
    }

    /// Random generator for the tie-breaking heuristics.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Ask the simulator to stop after this step.
    pub fn halt(&mut self, halt: Halt) {
        if self.halt.is_none() {
            self.halt = Some(halt);
        }
    }

    pub(crate) fn take_halt(&mut self) -> Option<Halt> {
        self.halt.take()
    }

    /// Last solved value of a node voltage or branch current.
    pub fn solution(&self, var: impl Into<VarIndex>) -> f64 {
        match var.into().to_index(self.node_count) {
            Some(i) => self.matrix.x.get(i).copied().unwrap_or(0.0),
            None => 0.0,
        }
    }

    /// Minimum junction conductance for this sub-iteration.
    ///
    /// Normally `base`; once the sub-iteration count passes the stepping
    /// threshold the floor is raised geometrically towards 0.1 S.
    pub fn gmin(&self, base: f64) -> f64 {
        self.gmin_over(base, GMIN_STEP_SPAN)
    }

    /// [`gmin`](Self::gmin) with the floor reaching 1 S after `span`
    /// sub-iterations instead of the default span.
    pub fn gmin_over(&self, base: f64, span: f64) -> f64 {
        if self.sub_iterations > GMIN_STEP_START {
            let frac = 1.0 - self.sub_iterations as f64 / span;
            (-9.0 * std::f64::consts::LN_10 * frac).exp().min(GMIN_LIMIT)
        } else {
            base
        }
    }

    fn index(&self, var: VarIndex) -> Option<usize> {
        var.to_index(self.node_count)
    }

    // ============ Stamping ============

    /// Add `value` to the matrix entry at (row, col). Ground is dropped.
    pub fn stamp_matrix(&mut self, row: impl Into<VarIndex>, col: impl Into<VarIndex>, value: f64) {
        if let (Some(r), Some(c)) = (self.index(row.into()), self.index(col.into())) {
            self.matrix.add(r, c, value);
        }
    }

    /// Add `value` to the right-hand side of `row`.
    pub fn stamp_right_side(&mut self, row: impl Into<VarIndex>, value: f64) {
        if let Some(r) = self.index(row.into()) {
            self.matrix.add_source(r, value);
        }
    }

    /// Stamp a conductance between two nodes.
    pub fn stamp_conductance(&mut self, n1: NodeId, n2: NodeId, g: f64) {
        self.stamp_matrix(n1, n1, g);
        self.stamp_matrix(n2, n2, g);
        self.stamp_matrix(n1, n2, -g);
        self.stamp_matrix(n2, n1, -g);
    }

    /// Stamp a resistor between two nodes.
    pub fn stamp_resistor(&mut self, n1: NodeId, n2: NodeId, r: f64) {
        self.stamp_conductance(n1, n2, 1.0 / r);
    }

    /// Stamp a current source driving `i` from `n1` through the source to `n2`.
    pub fn stamp_current_source(&mut self, n1: NodeId, n2: NodeId, i: f64) {
        self.stamp_right_side(n1, -i);
        self.stamp_right_side(n2, i);
    }

    /// Stamp the incidence of an ideal voltage source enforcing
    /// V(pos) - V(neg) = v. The branch current flows from `pos` through
    /// the source to `neg`.
    pub fn stamp_voltage_source(&mut self, pos: NodeId, neg: NodeId, branch: BranchId, v: f64) {
        self.stamp_matrix(branch, pos, 1.0);
        self.stamp_matrix(branch, neg, -1.0);
        self.stamp_matrix(pos, branch, 1.0);
        self.stamp_matrix(neg, branch, -1.0);
        self.stamp_right_side(branch, v);
    }

    /// Add to the target voltage of a source whose value changes every
    /// iteration (the incidence is stamped once with a zero value).
    pub fn update_voltage_source(&mut self, branch: BranchId, v: f64) {
        self.stamp_right_side(branch, v);
    }

    /// Stamp a voltage-controlled current source: `gm * (V(cp) - V(cn))`
    /// flows from `op` through the source to `on`.
    pub fn stamp_vccs(&mut self, op: NodeId, on: NodeId, cp: NodeId, cn: NodeId, gm: f64) {
        self.stamp_matrix(op, cp, gm);
        self.stamp_matrix(op, cn, -gm);
        self.stamp_matrix(on, cp, -gm);
        self.stamp_matrix(on, cn, gm);
    }

    /// Stamp a current-controlled current source: `gain` times the current
    /// of `branch` flows from `op` through the source to `on`.
    pub fn stamp_cccs(&mut self, op: NodeId, on: NodeId, branch: BranchId, gain: f64) {
        self.stamp_matrix(op, branch, gain);
        self.stamp_matrix(on, branch, -gain);
    }

    /// Stamp a voltage-controlled voltage source:
    /// `V(op) - V(on) = gain * (V(cp) - V(cn))`.
    pub fn stamp_vcvs(
        &mut self,
        op: NodeId,
        on: NodeId,
        cp: NodeId,
        cn: NodeId,
        branch: BranchId,
        gain: f64,
    ) {
        self.stamp_voltage_source(op, on, branch, 0.0);
        self.stamp_matrix(branch, cp, -gain);
        self.stamp_matrix(branch, cn, gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ground_stamps_are_dropped() {
        let mut ctx = SolverContext::new(1e-6, 0);
        ctx.allocate(2, 0);
        ctx.stamp_conductance(NodeId(1), NodeId::GROUND, 0.5);
        assert_eq!(ctx.size(), 1);
        assert_eq!(ctx.matrix().get(0, 0), 0.5);
    }

    #[test]
    fn test_voltage_source_incidence() {
        let mut ctx = SolverContext::new(1e-6, 0);
        ctx.allocate(3, 1);
        ctx.stamp_voltage_source(NodeId(1), NodeId(2), BranchId(0), 5.0);
        let m = ctx.matrix();
        assert_eq!(m.get(2, 0), 1.0);
        assert_eq!(m.get(2, 1), -1.0);
        assert_eq!(m.get(0, 2), 1.0);
        assert_eq!(m.get(1, 2), -1.0);
        assert_eq!(m.z[2], 5.0);
    }

    #[test]
    fn test_gmin_stepping_schedule() {
        let mut ctx = SolverContext::new(1e-6, 0);
        ctx.sub_iterations = 10;
        assert_eq!(ctx.gmin(1e-15), 1e-15);
        ctx.sub_iterations = 101;
        let g = ctx.gmin(1e-15);
        assert_relative_eq!(g, 10f64.powf(-9.0 * (1.0 - 101.0 / 3000.0)), max_relative = 1e-9);
        ctx.sub_iterations = 2999;
        assert_eq!(ctx.gmin(1e-15), GMIN_LIMIT);
    }

    #[test]
    fn test_gmin_shorter_span_ramps_faster() {
        let mut ctx = SolverContext::new(1e-6, 0);
        ctx.sub_iterations = 50;
        assert_eq!(ctx.gmin_over(1e-15, 300.0), 1e-15);
        ctx.sub_iterations = 200;
        let g = ctx.gmin_over(1e-15, 300.0);
        assert_relative_eq!(g, 10f64.powf(-3.0), max_relative = 1e-9);
        assert!(g > ctx.gmin(1e-15));
        ctx.sub_iterations = 299;
        assert_eq!(ctx.gmin_over(1e-15, 300.0), GMIN_LIMIT);
    }

    #[test]
    fn test_reset_reseeds_rng() {
        use rand::Rng;
        let mut ctx = SolverContext::new(1e-6, 42);
        let a: u64 = ctx.rng().gen();
        ctx.reset();
        let b: u64 = ctx.rng().gen();
        assert_eq!(a, b);
    }
}
