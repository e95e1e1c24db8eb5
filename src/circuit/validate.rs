//! Circuit validation.
//!
//! Runs after allocation and before stamping:
//! - every external node must reach ground through element connections,
//! - ideal voltage sources and wires must not form loops,
//! - capacitors must not form loops with sources,
//! - current sources need a current path.
//!
//! Shorted capacitors are discharged and inductors without a current path
//! are reset instead of failing.

use log::{debug, warn};

use super::allocator::Topology;
use super::graph::Circuit;
use super::types::{ElementId, NodeId};
use crate::components::{Component, Element};
use crate::error::{Result, SimError};

/// Which elements a loop search may traverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    /// Anything but current sources
    Inductor,
    /// Ideal voltage sources and wires
    Voltage,
    /// Wires only
    Short,
    /// Capacitors, ideal voltage sources and wires
    Capacitor,
}

/// Depth-first search for a path from a node back to the other end of
/// `first`, through elements allowed by `kind`.
struct PathSearch<'a> {
    circuit: &'a Circuit,
    kind: PathKind,
    first: ElementId,
    dest: NodeId,
    visited: Vec<bool>,
}

impl<'a> PathSearch<'a> {
    fn new(
        circuit: &'a Circuit,
        topology: &Topology,
        kind: PathKind,
        first: ElementId,
        dest: NodeId,
    ) -> Self {
        Self {
            circuit,
            kind,
            first,
            dest,
            visited: vec![false; topology.node_count],
        }
    }

    fn allows(&self, c: &Component) -> bool {
        let e = c.element();
        match self.kind {
            PathKind::Inductor => !matches!(c, Component::CurrentSource(_)),
            PathKind::Voltage => e.is_wire() || e.is_ideal_voltage_source(),
            PathKind::Short => e.is_wire(),
            PathKind::Capacitor => {
                e.is_wire() || e.is_ideal_voltage_source() || matches!(c, Component::Capacitor(_))
            }
        }
    }

    fn find(&mut self, n1: NodeId) -> bool {
        if n1 == self.dest {
            return true;
        }
        if self.visited[n1.0] {
            return false;
        }
        self.visited[n1.0] = true;

        let circuit = self.circuit;
        let first_current = circuit.component(self.first).element().current();
        for id in circuit.ids() {
            if id == self.first {
                continue;
            }
            let c = circuit.component(id);
            if !self.allows(c) {
                continue;
            }
            let e = c.element();
            let terminals = e.terminal_count();
            let nodes = &e.pins().nodes;

            if n1.is_ground() {
                // the path may leave ground through a grounded terminal
                for j in 0..terminals {
                    if e.has_ground_connection(j) && self.find(nodes[j]) {
                        return true;
                    }
                }
            }

            let Some(a) = (0..terminals).find(|&t| nodes[t] == n1) else {
                continue;
            };
            if e.has_ground_connection(a) && self.find(NodeId::GROUND) {
                return true;
            }

            if self.kind == PathKind::Inductor {
                if let Component::Inductor(l) = c {
                    // series inductors are fine only when they carry the same current
                    let i = if a == 0 { -l.current() } else { l.current() };
                    if (i - first_current).abs() > 1e-10 {
                        continue;
                    }
                }
            }

            for b in 0..terminals {
                if a != b && e.has_connection(a, b) && self.find(nodes[b]) {
                    return true;
                }
            }
        }
        false
    }
}

fn ends(circuit: &Circuit, id: ElementId) -> (NodeId, NodeId) {
    let pins = circuit.component(id).element().pins();
    let n0 = pins.node(0);
    let n1 = if pins.nodes.len() > 1 { pins.node(1) } else { NodeId::GROUND };
    (n0, n1)
}

/// Find external nodes with no path to ground.
///
/// With `tie_to_ground` set, each such node is recorded (to be tied to
/// ground with a small conductance) and propagation continues; otherwise
/// the first one is an error.
fn check_closure(
    circuit: &Circuit,
    topology: &Topology,
    tie_to_ground: bool,
) -> Result<Vec<NodeId>> {
    let mut closure = vec![false; topology.node_count];
    closure[0] = true;
    let mut ties = Vec::new();

    loop {
        let mut changed = true;
        while changed {
            changed = false;
            for c in circuit.components() {
                let e = c.element();
                if e.is_wire() {
                    continue;
                }
                let nodes = &e.pins().nodes;
                let terminals = e.terminal_count();
                for i in 0..terminals {
                    if !closure[nodes[i].0] {
                        if e.has_ground_connection(i) {
                            closure[nodes[i].0] = true;
                            changed = true;
                        }
                        continue;
                    }
                    for j in 0..terminals {
                        if i != j && e.has_connection(i, j) && !closure[nodes[j].0] {
                            closure[nodes[j].0] = true;
                            changed = true;
                        }
                    }
                }
            }
        }

        let floating = (0..topology.node_count)
            .map(NodeId)
            .find(|&n| !closure[n.0] && !topology.is_internal(n));
        let Some(node) = floating else {
            return Ok(ties);
        };
        if !tie_to_ground {
            return Err(SimError::FloatingNode {
                node: topology.node_label(circuit, node),
            });
        }
        warn!(
            "node {} has no path to ground, tying it with 1e-8 S",
            topology.node_label(circuit, node)
        );
        closure[node.0] = true;
        ties.push(node);
    }
}

/// Elements the loop checks want changed.
#[derive(Default)]
struct Repairs {
    shorted: Vec<ElementId>,
    dead_inductors: Vec<ElementId>,
}

fn check_loops(circuit: &Circuit, topology: &Topology) -> Result<Repairs> {
    let mut repairs = Repairs::default();

    for id in circuit.ids() {
        let c = circuit.component(id);
        let e = c.element();
        let (n0, n1) = ends(circuit, id);
        let search = |kind, dest| PathSearch::new(circuit, topology, kind, id, dest);

        match c {
            Component::Inductor(_) => {
                if !search(PathKind::Inductor, n1).find(n0) {
                    repairs.dead_inductors.push(id);
                }
            }
            Component::CurrentSource(_) => {
                if !search(PathKind::Inductor, n1).find(n0) {
                    return Err(SimError::NoCurrentPath {
                        element: circuit.name(id).to_string(),
                    });
                }
            }
            Component::Capacitor(_) => {
                if search(PathKind::Short, n1).find(n0) {
                    repairs.shorted.push(id);
                } else if search(PathKind::Capacitor, n1).find(n0) {
                    return Err(SimError::CapacitorLoop {
                        element: circuit.name(id).to_string(),
                    });
                }
            }
            Component::Switch2(s) => {
                let closed = e.pins().node(s.position() + 1);
                if search(PathKind::Voltage, closed).find(n0) {
                    return Err(SimError::VoltageSourceLoop {
                        element: circuit.name(id).to_string(),
                    });
                }
            }
            _ if e.is_ideal_voltage_source() => {
                let looped = if e.terminal_count() == 2 {
                    search(PathKind::Voltage, n1).find(n0)
                } else {
                    search(PathKind::Voltage, n0).find(NodeId::GROUND)
                };
                if looped {
                    return Err(SimError::VoltageSourceLoop {
                        element: circuit.name(id).to_string(),
                    });
                }
            }
            _ => {}
        }
    }
    Ok(repairs)
}

/// Validate an allocated circuit for simulation.
///
/// Returns the nodes that have to be tied to ground.
pub fn validate_circuit(
    circuit: &mut Circuit,
    topology: &Topology,
    tie_floating_nodes: bool,
) -> Result<Vec<NodeId>> {
    let ties = check_closure(circuit, topology, tie_floating_nodes)?;
    let repairs = check_loops(circuit, topology)?;

    for id in repairs.shorted {
        debug!("{} is shorted, discharging", circuit.name(id));
        if let Component::Capacitor(cap) = circuit.component_mut(id) {
            cap.shorted();
        }
    }
    for id in repairs.dead_inductors {
        debug!("{} has no current path, resetting", circuit.name(id));
        circuit.component_mut(id).element_mut().reset();
    }

    Ok(ties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::allocate;
    use crate::components::{
        Capacitor, CurrentSource, Rail, Resistor, Switch2, VoltageSource, Voltmeter, Wire,
    };

    fn analyze(c: &mut Circuit, tie: bool) -> Result<Vec<NodeId>> {
        let t = allocate(c)?;
        validate_circuit(c, &t, tie)
    }

    #[test]
    fn test_parallel_sources_loop() {
        let mut c = Circuit::new();
        c.add("V1", VoltageSource::dc(5.0), &["a", "0"]).unwrap();
        c.add("V2", VoltageSource::dc(3.0), &["a", "0"]).unwrap();
        assert!(matches!(
            analyze(&mut c, false),
            Err(SimError::VoltageSourceLoop { .. })
        ));
    }

    #[test]
    fn test_rail_shorted_to_ground() {
        let mut c = Circuit::new();
        c.add("VCC", Rail::dc(5.0), &["vcc"]).unwrap();
        c.add("W1", Wire::new(), &["vcc", "0"]).unwrap();
        assert!(matches!(
            analyze(&mut c, false),
            Err(SimError::VoltageSourceLoop { .. })
        ));
    }

    #[test]
    fn test_floating_node_error_and_tie() {
        let mut c = Circuit::new();
        c.add("V1", VoltageSource::dc(5.0), &["a", "0"]).unwrap();
        c.add("R1", Resistor::new(1000.0), &["a", "0"]).unwrap();
        c.add("VM", Voltmeter::new(), &["x", "0"]).unwrap();
        assert_eq!(
            analyze(&mut c, false).unwrap_err(),
            SimError::FloatingNode {
                node: "x".to_string()
            }
        );
        let ties = analyze(&mut c, true).unwrap();
        assert_eq!(ties.len(), 1);
    }

    #[test]
    fn test_capacitor_across_source_is_a_loop() {
        let mut c = Circuit::new();
        c.add("V1", VoltageSource::dc(5.0), &["a", "0"]).unwrap();
        c.add("C1", Capacitor::new(1e-6), &["a", "0"]).unwrap();
        assert!(matches!(
            analyze(&mut c, false),
            Err(SimError::CapacitorLoop { .. })
        ));
    }

    #[test]
    fn test_shorted_capacitor_is_discharged() {
        let mut c = Circuit::new();
        c.add("V1", VoltageSource::dc(5.0), &["a", "0"]).unwrap();
        c.add("R1", Resistor::new(1000.0), &["a", "b"]).unwrap();
        let cap = c
            .add("C1", Capacitor::new(1e-6).with_voltage(2.0), &["b", "b2"])
            .unwrap();
        c.add("W1", Wire::new(), &["b", "b2"]).unwrap();
        c.add("R2", Resistor::new(1000.0), &["b", "0"]).unwrap();
        analyze(&mut c, false).unwrap();
        match c.component(cap) {
            Component::Capacitor(cap) => assert_eq!(cap.voltdiff, 0.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_open_current_source() {
        let mut c = Circuit::new();
        c.add("I1", CurrentSource::new(1e-3), &["a", "0"]).unwrap();
        c.add("R1", Resistor::new(1000.0), &["b", "0"]).unwrap();
        c.add("VM", Voltmeter::new(), &["a", "b"]).unwrap();
        assert!(matches!(
            analyze(&mut c, true),
            Err(SimError::NoCurrentPath { .. })
        ));
    }

    #[test]
    fn test_switch2_loop_follows_selected_throw() {
        let build = |position| {
            let mut c = Circuit::new();
            c.add("V1", VoltageSource::dc(5.0), &["a", "0"]).unwrap();
            c.add("S1", Switch2::new(position), &["a", "0", "b"]).unwrap();
            c.add("R1", Resistor::new(1000.0), &["b", "0"]).unwrap();
            c
        };
        assert!(matches!(
            analyze(&mut build(0), false),
            Err(SimError::VoltageSourceLoop { .. })
        ));
        assert!(analyze(&mut build(1), false).is_ok());
    }
}
