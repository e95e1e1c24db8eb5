//! Node and unknown allocation.
//!
//! Nets joined by wires are merged into one electrical node with a
//! union-find, the ground class becomes node 0, and every remaining class,
//! internal element node and voltage-source unknown gets its own index.

use log::debug;

use super::graph::Circuit;
use super::types::{BranchId, ElementId, NetId, NodeId};
use crate::components::Component;
use crate::error::{Result, SimError};

/// Union-find over nets.
struct NetClasses {
    parent: Vec<usize>,
}

impl NetClasses {
    fn new(count: usize) -> Self {
        Self {
            parent: (0..count).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // keep the lower root so classes are labelled by their first net
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// The numbering produced by analysis.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Number of nodes including ground
    pub node_count: usize,
    /// Number of voltage-source unknowns
    pub branch_count: usize,
    /// For each node, the (element, terminal) pairs attached to it
    pub node_links: Vec<Vec<(ElementId, usize)>>,
    /// Node of each net
    pub net_nodes: Vec<NodeId>,
    /// Owner of each branch: (element, index among its voltage sources)
    pub branch_owners: Vec<(ElementId, usize)>,
    /// Whether each node is private to an element
    pub internal: Vec<bool>,
    /// No element changes the left-hand side between sub-iterations
    pub linear: bool,
}

impl Topology {
    /// Size of the system matrix.
    pub fn matrix_size(&self) -> usize {
        self.node_count.saturating_sub(1) + self.branch_count
    }

    pub fn is_internal(&self, node: NodeId) -> bool {
        self.internal.get(node.0).copied().unwrap_or(false)
    }

    pub fn net_node(&self, net: NetId) -> NodeId {
        self.net_nodes[net.0]
    }

    /// A human-readable name for a node: the first net on it, if any.
    pub fn node_label(&self, circuit: &Circuit, node: NodeId) -> String {
        self.net_nodes
            .iter()
            .position(|n| *n == node)
            .map(|i| circuit.net_name(NetId(i)).to_string())
            .unwrap_or_else(|| node.to_string())
    }
}

/// Pick the net class that becomes node 0.
fn ground_class(circuit: &Circuit, classes: &mut NetClasses) -> Result<Option<usize>> {
    let grounds: Vec<usize> = (0..circuit.net_count())
        .filter(|&n| circuit.is_ground_net(NetId(n)))
        .collect();
    if let Some((&first, rest)) = grounds.split_first() {
        for &g in rest {
            classes.union(first, g);
        }
        return Ok(Some(classes.find(first)));
    }

    // no explicit ground: the first voltage source's negative side
    for id in circuit.ids() {
        if let Component::VoltageSource(_) = circuit.component(id) {
            let neg = circuit.connections(id)[1];
            return Ok(Some(classes.find(neg.0)));
        }
    }

    // elements referenced to ground (rails, gate outputs) still give a reference
    let grounded = circuit.ids().any(|id| {
        let e = circuit.component(id).element();
        (0..e.terminal_count()).any(|t| e.has_ground_connection(t))
    });
    if grounded {
        Ok(None)
    } else {
        Err(SimError::MissingGround)
    }
}

/// Number the nodes and unknowns of `circuit` and attach them to every
/// element.
pub fn allocate(circuit: &mut Circuit) -> Result<Topology> {
    if circuit.is_empty() {
        return Err(SimError::EmptyCircuit);
    }

    let mut classes = NetClasses::new(circuit.net_count());
    for id in circuit.ids() {
        if circuit.component(id).element().is_wire() {
            let nets = circuit.connections(id);
            classes.union(nets[0].0, nets[1].0);
        }
    }
    let ground = ground_class(circuit, &mut classes)?;

    // terminals first, in element order
    let mut class_nodes: Vec<Option<NodeId>> = vec![None; circuit.net_count()];
    if let Some(g) = ground {
        class_nodes[g] = Some(NodeId::GROUND);
    }
    let mut next = 1;
    let mut net_nodes = vec![NodeId::GROUND; circuit.net_count()];
    for id in circuit.ids() {
        for t in 0..circuit.connections(id).len() {
            let net = circuit.connections(id)[t];
            let class = classes.find(net.0);
            let node = *class_nodes[class].get_or_insert_with(|| {
                next += 1;
                NodeId(next - 1)
            });
            net_nodes[net.0] = node;
        }
    }
    let external = next;

    let mut node_links = vec![Vec::new(); external];
    let mut branch_owners = Vec::new();
    let mut internal = vec![false; external];

    for id in circuit.ids() {
        let terminals = circuit.connections(id).to_vec();
        let element = circuit.component_mut(id).element_mut();

        let mut nodes: Vec<NodeId> = terminals.iter().map(|net| net_nodes[net.0]).collect();
        for _ in 0..element.internal_node_count() {
            nodes.push(NodeId(next));
            node_links.push(Vec::new());
            internal.push(true);
            next += 1;
        }
        for (t, node) in nodes.iter().enumerate() {
            node_links[node.0].push((id, t));
        }

        let branches: Vec<BranchId> = (0..element.voltage_source_count())
            .map(|k| {
                branch_owners.push((id, k));
                BranchId(branch_owners.len() - 1)
            })
            .collect();

        element.pins_mut().attach(nodes, branches);
    }

    let linear = !circuit.components().iter().any(|c| c.is_nonlinear());
    let topology = Topology {
        node_count: next,
        branch_count: branch_owners.len(),
        node_links,
        net_nodes,
        branch_owners,
        internal,
        linear,
    };
    debug!(
        "allocated {} nodes, {} branches, matrix size {}, linear: {}",
        topology.node_count,
        topology.branch_count,
        topology.matrix_size(),
        topology.linear
    );
    Ok(topology)
}
