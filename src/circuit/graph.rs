//! Circuit graph structure.

use std::collections::HashMap;

use super::types::{is_ground_name, ElementId, NetId};
use crate::components::Component;
use crate::error::{Result, SimError};

/// A netlist under construction: named elements whose terminals attach to
/// named nets.
///
/// Nets are created on first use. Nets named `"0"` or `"GND"` are ground.
/// Nothing is numbered until the simulator analyzes the circuit.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    /// All components in the circuit, in insertion order
    components: Vec<Component>,

    /// Element names, parallel to `components`
    names: Vec<String>,

    /// Mapping from element names to element IDs
    name_index: HashMap<String, ElementId>,

    /// Net attached to each terminal, parallel to `components`
    connections: Vec<Vec<NetId>>,

    /// Net names in creation order
    net_names: Vec<String>,

    /// Mapping from net names to net IDs
    net_index: HashMap<String, NetId>,
}

impl Circuit {
    /// Create an empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element with its terminals attached to `nets`, in terminal order.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        component: impl Into<Component>,
        nets: &[&str],
    ) -> Result<ElementId> {
        let name = name.into();
        let component = component.into();

        if self.name_index.contains_key(&name) {
            return Err(SimError::DuplicateElement { name });
        }
        let expected = component.element().terminal_count();
        if nets.len() != expected {
            return Err(SimError::TerminalMismatch {
                name,
                expected,
                given: nets.len(),
            });
        }

        let connections = nets.iter().map(|net| self.intern_net(net)).collect();

        let id = ElementId(self.components.len());
        self.components.push(component);
        self.connections.push(connections);
        self.name_index.insert(name.clone(), id);
        self.names.push(name);
        Ok(id)
    }

    fn intern_net(&mut self, name: &str) -> NetId {
        if let Some(&id) = self.net_index.get(name) {
            return id;
        }
        let id = NetId(self.net_names.len());
        self.net_names.push(name.to_string());
        self.net_index.insert(name.to_string(), id);
        id
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Look up an element by name.
    pub fn find(&self, name: &str) -> Option<ElementId> {
        self.name_index.get(name).copied()
    }

    /// Look up an element by name, failing with `ElementNotFound`.
    pub fn require(&self, name: &str) -> Result<ElementId> {
        self.find(name).ok_or_else(|| SimError::ElementNotFound {
            name: name.to_string(),
        })
    }

    pub fn name(&self, id: ElementId) -> &str {
        &self.names[id.0]
    }

    pub fn component(&self, id: ElementId) -> &Component {
        &self.components[id.0]
    }

    pub fn component_mut(&mut self, id: ElementId) -> &mut Component {
        &mut self.components[id.0]
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [Component] {
        &mut self.components
    }

    /// Nets attached to the terminals of an element.
    pub fn connections(&self, id: ElementId) -> &[NetId] {
        &self.connections[id.0]
    }

    /// Look up a net by name.
    pub fn net(&self, name: &str) -> Option<NetId> {
        self.net_index.get(name).copied()
    }

    pub fn net_name(&self, net: NetId) -> &str {
        &self.net_names[net.0]
    }

    pub fn net_count(&self) -> usize {
        self.net_names.len()
    }

    /// Whether a net is an explicit ground net.
    pub fn is_ground_net(&self, net: NetId) -> bool {
        is_ground_name(self.net_name(net))
    }

    /// Element IDs in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = ElementId> {
        (0..self.components.len()).map(ElementId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Resistor, VoltageSource};

    #[test]
    fn test_nets_are_shared_by_name() {
        let mut c = Circuit::new();
        c.add("V1", VoltageSource::dc(5.0), &["in", "0"]).unwrap();
        let r = c.add("R1", Resistor::new(1000.0), &["in", "out"]).unwrap();
        assert_eq!(c.net_count(), 3);
        assert_eq!(c.connections(r)[0], c.net("in").unwrap());
        assert!(c.is_ground_net(c.net("0").unwrap()));
        assert_eq!(c.find("R1"), Some(r));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut c = Circuit::new();
        c.add("R1", Resistor::new(1.0), &["a", "b"]).unwrap();
        let err = c.add("R1", Resistor::new(1.0), &["a", "b"]).unwrap_err();
        assert_eq!(
            err,
            SimError::DuplicateElement {
                name: "R1".to_string()
            }
        );
    }

    #[test]
    fn test_terminal_count_checked() {
        let mut c = Circuit::new();
        let err = c.add("R1", Resistor::new(1.0), &["a"]).unwrap_err();
        assert!(matches!(
            err,
            SimError::TerminalMismatch {
                expected: 2,
                given: 1,
                ..
            }
        ));
        assert!(c.is_empty());
    }
}
