//! Newton-Raphson iteration for nonlinear components.

use log::trace;

use super::context::SolverContext;
use super::SUB_ITER_MAX;
use crate::circuit::{BranchId, NodeId, Topology};
use crate::components::Component;
use crate::error::{Result, SimError};

/// Newton-Raphson iteration controller.
///
/// Each sub-iteration restores the cached linear system, lets every element
/// add its linearized contribution, solves, and hands the solution back to
/// the elements. Elements clear [`SolverContext::converged`] while their
/// controlling voltages are still moving.
#[derive(Debug, Clone)]
pub struct NewtonRaphson {
    /// Maximum sub-iterations per time step
    pub max_sub_iterations: usize,
}

impl Default for NewtonRaphson {
    fn default() -> Self {
        Self::new(SUB_ITER_MAX)
    }
}

impl NewtonRaphson {
    /// Create a new Newton-Raphson controller.
    pub fn new(max_sub_iterations: usize) -> Self {
        Self {
            max_sub_iterations: max_sub_iterations.max(1),
        }
    }

    /// Solve one time step.
    ///
    /// A linear circuit is solved with exactly one forward/back substitution
    /// against the LU factors computed at stamping time. Returns the number
    /// of solves performed.
    pub fn run(
        &self,
        elements: &mut [Component],
        topology: &Topology,
        ctx: &mut SolverContext,
    ) -> Result<usize> {
        for sub in 0..self.max_sub_iterations {
            ctx.sub_iterations = sub;
            ctx.converged = true;

            if topology.linear {
                ctx.matrix_mut().restore_sources();
            } else {
                ctx.matrix_mut().restore_linear();
            }

            for c in elements.iter_mut() {
                c.element_mut().do_iteration(ctx);
            }

            if ctx.converged && sub > 0 {
                trace!("t={:.6e}: converged after {} sub-iterations", ctx.time, sub);
                return Ok(sub);
            }

            if !topology.linear {
                if let Some((row, col, value)) = ctx.matrix().first_non_finite() {
                    return Err(SimError::overflow(
                        format!("matrix entry ({}, {})", row, col),
                        value,
                    ));
                }
                ctx.matrix_mut().factor()?;
            }
            ctx.matrix_mut().solve()?;

            if let Some(i) = ctx.matrix().x.iter().position(|v| !v.is_finite()) {
                return Err(SimError::overflow(
                    format!("solution entry {}", i),
                    ctx.matrix().x[i],
                ));
            }

            apply_solution(elements, topology, ctx);

            if topology.linear {
                return Ok(1);
            }
        }

        Err(SimError::non_convergence(ctx.time, self.max_sub_iterations))
    }
}

/// Hand the solved node voltages and branch currents to the elements.
fn apply_solution(elements: &mut [Component], topology: &Topology, ctx: &SolverContext) {
    // ground voltages never change
    for (node, links) in topology.node_links.iter().enumerate().skip(1) {
        let v = ctx.solution(NodeId(node));
        for &(id, terminal) in links {
            elements[id.0].element_mut().set_node_voltage(terminal, v);
        }
    }
    for (branch, &(id, k)) in topology.branch_owners.iter().enumerate() {
        let i = ctx.solution(BranchId(branch));
        elements[id.0].element_mut().set_branch_current(k, i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{allocate, Circuit};
    use crate::components::{Diode, DiodeModel, Element, Resistor, VoltageSource};

    fn prepare(circuit: &mut Circuit) -> (Topology, SolverContext) {
        let topology = allocate(circuit).unwrap();
        let mut ctx = SolverContext::new(5e-6, 0);
        ctx.allocate(topology.node_count, topology.branch_count);
        for c in circuit.components_mut() {
            c.element_mut().stamp(&mut ctx);
        }
        ctx.matrix_mut().cache_linear();
        if topology.linear {
            ctx.matrix_mut().factor().unwrap();
        }
        (topology, ctx)
    }

    #[test]
    fn test_linear_circuit_single_solve() {
        let mut c = Circuit::new();
        c.add("V1", VoltageSource::dc(10.0), &["in", "0"]).unwrap();
        c.add("R1", Resistor::new(1000.0), &["in", "out"]).unwrap();
        let r2 = c.add("R2", Resistor::new(3000.0), &["out", "0"]).unwrap();
        let (topology, mut ctx) = prepare(&mut c);

        let n = NewtonRaphson::default()
            .run(c.components_mut(), &topology, &mut ctx)
            .unwrap();
        assert_eq!(n, 1);
        let out = topology.net_node(c.net("out").unwrap());
        assert!((ctx.solution(out) - 7.5).abs() < 1e-9);
        assert!((c.component(r2).element().current() - 2.5e-3).abs() < 1e-12);
    }

    #[test]
    fn test_diode_circuit_converges() {
        let mut c = Circuit::new();
        c.add("V1", VoltageSource::dc(5.0), &["in", "0"]).unwrap();
        c.add("R1", Resistor::new(1000.0), &["in", "a"]).unwrap();
        c.add("D1", Diode::new(DiodeModel::default()), &["a", "0"])
            .unwrap();
        let (topology, mut ctx) = prepare(&mut c);

        let n = NewtonRaphson::default()
            .run(c.components_mut(), &topology, &mut ctx)
            .unwrap();
        assert!(n > 1);
        let a = ctx.solution(topology.net_node(c.net("a").unwrap()));
        assert!(a > 0.4 && a < 0.7, "diode drop {}", a);
    }

    #[test]
    fn test_iteration_bound_is_reported() {
        let mut c = Circuit::new();
        c.add("V1", VoltageSource::dc(5.0), &["in", "0"]).unwrap();
        c.add("R1", Resistor::new(1000.0), &["in", "a"]).unwrap();
        c.add("D1", Diode::new(DiodeModel::default()), &["a", "0"])
            .unwrap();
        let (topology, mut ctx) = prepare(&mut c);

        let err = NewtonRaphson::new(2)
            .run(c.components_mut(), &topology, &mut ctx)
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
