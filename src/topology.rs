//! Topology indexing and structural checks.
//!
//! Derives node/edge counts, per-type branch index sets and the branch value
//! array from a circuit's flattened component list.

use std::collections::{BTreeSet, HashSet};

use crate::error::{CircuitError, Result};
use crate::ir::{Circuit, Component, ComponentType, Value};

/// Representation selected once per circuit for every matrix entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Numeric,
    Symbolic,
}

impl Representation {
    /// Symbolic as soon as one value is an expression, numeric otherwise.
    pub fn resolve<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        if values.into_iter().any(Value::is_symbolic) {
            Representation::Symbolic
        } else {
            Representation::Numeric
        }
    }
}

/// Index sets and counts for one circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    /// Highest node label referenced by any branch.
    pub numnodes: usize,
    /// Total branch count.
    pub numedges: usize,
    /// Resistor and stepwise-resistor branches, in branch order.
    pub resistors: Vec<usize>,
    pub inductors: Vec<usize>,
    pub capacitors: Vec<usize>,
    /// Voltage and current sources, in branch order.
    pub sources: Vec<usize>,
    /// Field components, in branch order.
    pub components: Vec<usize>,
    /// Branch values; `None` for field components.
    pub values: Vec<Option<Value>>,
}

impl Topology {
    pub fn index(components: &[&Component]) -> Self {
        let mut topology = Topology {
            numnodes: 0,
            numedges: components.len(),
            resistors: Vec::new(),
            inductors: Vec::new(),
            capacitors: Vec::new(),
            sources: Vec::new(),
            components: Vec::new(),
            values: Vec::with_capacity(components.len()),
        };

        for (e, component) in components.iter().enumerate() {
            let (p1, p2) = component.nodes();
            topology.numnodes = topology.numnodes.max(p1.max(p2) as usize);

            let bucket = match component.component_type() {
                ComponentType::Resistor => &mut topology.resistors,
                ComponentType::Inductor => &mut topology.inductors,
                ComponentType::Capacitor => &mut topology.capacitors,
                ComponentType::VoltageSource | ComponentType::CurrentSource => &mut topology.sources,
                ComponentType::Component => &mut topology.components,
            };
            bucket.push(e);
            topology.values.push(component.value().cloned());
        }

        topology
    }

    pub fn representation(&self) -> Representation {
        Representation::resolve(self.values.iter().flatten())
    }
}

/// Structural checks on a circuit before assembly.
pub fn validate(circuit: &Circuit, components: &[&Component]) -> Result<()> {
    let id = circuit.id;
    if components.is_empty() {
        return Err(CircuitError::Structural(format!("circuit {} has no components", id)));
    }

    let mut names = HashSet::new();
    let mut numbers = HashSet::new();
    let mut touched = BTreeSet::new();

    for component in components {
        let name = component.name();
        let (p1, p2) = component.nodes();
        if p1 == 0 || p2 == 0 {
            return Err(CircuitError::Structural(format!(
                "circuit {}: {} uses node 0, node labels start at 1",
                id, name
            )));
        }
        if p1 == p2 {
            return Err(CircuitError::Structural(format!(
                "circuit {}: {} has both pins on node {}",
                id, name, p1
            )));
        }
        if !names.insert(name) {
            return Err(CircuitError::Structural(format!(
                "circuit {}: duplicate component name {}",
                id, name
            )));
        }
        if let Some(number) = component.component_number() {
            if number == 0 {
                return Err(CircuitError::Structural(format!(
                    "circuit {}: {} has component number 0, numbers start at 1",
                    id, name
                )));
            }
            if !numbers.insert(number) {
                return Err(CircuitError::Structural(format!(
                    "circuit {}: component number {} is used more than once",
                    id, number
                )));
            }
        }
        touched.insert(p1);
        touched.insert(p2);
    }

    let numnodes = touched.last().copied().unwrap_or(0);
    if circuit.ref_node == 0 || circuit.ref_node > numnodes {
        return Err(CircuitError::Structural(format!(
            "circuit {}: reference node {} is not in 1..={}",
            id, circuit.ref_node, numnodes
        )));
    }
    if let Some(floating) = (1..=numnodes).find(|n| !touched.contains(n)) {
        return Err(CircuitError::Structural(format!(
            "circuit {}: node {} is not connected to any component",
            id, floating
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FieldComponent, StepwiseResistor};

    fn mixed_components() -> Vec<Component> {
        vec![
            Component::voltage_source("V1", 1, 2, 1.0),
            Component::resistor("R1", 2, 3, 10.0),
            Component::inductor("L1", 3, 4, 1e-3),
            FieldComponent::new("Coil1", 4, 1, 1, [1u32]).into(),
            Component::resistor("R2", 2, 1, 5.0),
            Component::capacitor("C1", 3, 1, 1e-6),
            Component::current_source("I1", 1, 4, 0.5),
        ]
    }

    #[test]
    fn test_counts_and_stable_partition() {
        let components = mixed_components();
        let refs: Vec<&Component> = components.iter().collect();
        let topo = Topology::index(&refs);

        assert_eq!(topo.numnodes, 4);
        assert_eq!(topo.numedges, 7);
        assert_eq!(topo.resistors, vec![1, 4]);
        assert_eq!(topo.inductors, vec![2]);
        assert_eq!(topo.capacitors, vec![5]);
        assert_eq!(topo.sources, vec![0, 6]);
        assert_eq!(topo.components, vec![3]);
        assert_eq!(topo.values[3], None);
        assert_eq!(topo.values[1], Some(Value::Numeric(10.0)));
    }

    #[test]
    fn test_representation_numeric_unless_expression() {
        let components = mixed_components();
        let refs: Vec<&Component> = components.iter().collect();
        assert_eq!(Topology::index(&refs).representation(), Representation::Numeric);

        let mut components = components;
        components.push(StepwiseResistor::new("RS", 2, 4, 2, 1.0, Some(0.1), Some(2.0)).into());
        let refs: Vec<&Component> = components.iter().collect();
        assert_eq!(Topology::index(&refs).representation(), Representation::Symbolic);
    }

    #[test]
    fn test_validate_accepts_simple_loop() {
        let components = mixed_components();
        let refs: Vec<&Component> = components.iter().collect();
        assert!(validate(&Circuit::new(1), &refs).is_ok());
    }

    #[test]
    fn test_validate_rejects_same_pins() {
        let components = vec![Component::resistor("R1", 2, 2, 1.0)];
        let refs: Vec<&Component> = components.iter().collect();
        let err = validate(&Circuit::new(1), &refs).unwrap_err();
        assert!(matches!(err, CircuitError::Structural(_)));
    }

    #[test]
    fn test_validate_rejects_duplicate_component_number() {
        let components: Vec<Component> = vec![
            FieldComponent::new("A", 1, 2, 3, [1u32]).into(),
            StepwiseResistor::constant("B", 2, 1, 3, 1.0).into(),
        ];
        let refs: Vec<&Component> = components.iter().collect();
        let err = validate(&Circuit::new(1), &refs).unwrap_err();
        assert!(err.to_string().contains("component number 3"));
    }

    #[test]
    fn test_validate_rejects_floating_node_and_bad_ref() {
        let components = vec![
            Component::voltage_source("V1", 1, 3, 1.0),
            Component::resistor("R1", 3, 1, 1.0),
        ];
        let refs: Vec<&Component> = components.iter().collect();
        let err = validate(&Circuit::new(1), &refs).unwrap_err();
        assert!(err.to_string().contains("node 2"));

        let components = vec![Component::voltage_source("V1", 1, 2, 1.0)];
        let refs: Vec<&Component> = components.iter().collect();
        let err = validate(&Circuit::new(1).with_ref_node(5), &refs).unwrap_err();
        assert!(err.to_string().contains("reference node 5"));
    }
}
