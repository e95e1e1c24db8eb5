//! Core types for circuit representation.

use std::fmt;

/// A unique identifier for an electrical node after analysis.
/// Node 0 is always ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The ground node (always index 0).
    pub const GROUND: NodeId = NodeId(0);

    /// Check if this is the ground node.
    pub fn is_ground(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "N{}", self.0)
        }
    }
}

/// A unique identifier for an element in the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Index of a voltage-source unknown (an extra MNA row/column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BranchId(pub usize);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

/// A named net as given to the circuit builder, before wires are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(pub usize);

/// Variable index in the MNA solution vector.
/// Can be either a node voltage or a branch current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarIndex {
    /// Node voltage variable
    Voltage(NodeId),
    /// Branch current variable (voltage sources, op-amp and gate outputs)
    Current(BranchId),
}

impl VarIndex {
    /// Get the raw index into the solution vector, `None` for ground.
    /// Node voltages come first (excluding ground), then branch currents.
    pub fn to_index(&self, num_nodes: usize) -> Option<usize> {
        match self {
            // Node 0 (ground) is not in the matrix
            VarIndex::Voltage(NodeId(0)) => None,
            VarIndex::Voltage(NodeId(n)) => Some(n - 1),
            // Branch currents come after node voltages
            VarIndex::Current(BranchId(b)) => Some((num_nodes - 1) + b),
        }
    }
}

impl From<NodeId> for VarIndex {
    fn from(node: NodeId) -> Self {
        VarIndex::Voltage(node)
    }
}

impl From<BranchId> for VarIndex {
    fn from(branch: BranchId) -> Self {
        VarIndex::Current(branch)
    }
}

/// Check whether a net name refers to ground.
pub fn is_ground_name(name: &str) -> bool {
    name == "0" || name.eq_ignore_ascii_case("gnd")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_index_layout() {
        // 4 nodes including ground -> 3 voltage columns, branches follow
        assert_eq!(VarIndex::Voltage(NodeId::GROUND).to_index(4), None);
        assert_eq!(VarIndex::Voltage(NodeId(1)).to_index(4), Some(0));
        assert_eq!(VarIndex::Voltage(NodeId(3)).to_index(4), Some(2));
        assert_eq!(VarIndex::Current(BranchId(0)).to_index(4), Some(3));
        assert_eq!(VarIndex::Current(BranchId(2)).to_index(4), Some(5));
    }

    #[test]
    fn test_ground_names() {
        assert!(is_ground_name("0"));
        assert!(is_ground_name("GND"));
        assert!(is_ground_name("gnd"));
        assert!(!is_ground_name("out"));
    }
}
