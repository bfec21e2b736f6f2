//! Unknown-vector and equation-row layout for one circuit.
//!
//! The unknown vector is
//!
//! ```text
//! [ i_0 .. i_{E-1} | v_0 .. v_{E-1} | u_n for every node n != ref ]
//! ```
//!
//! with branch currents and voltages in branch order and node potentials in
//! ascending node order. Branches realised by the solver (field components,
//! stepwise resistors) reserve the equation row equal to their `v` column;
//! the solver writes their constitutive equation there. KCL, KVL and the
//! remaining constitutive equations fill the other rows in that order.
//!
//! Every matrix builder takes the `Layout` as a parameter instead of
//! recomputing indices.

use crate::ir::{Component, NodeId};

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub circuit_id: u32,
    pub ref_node: NodeId,
    pub numnodes: usize,
    pub numedges: usize,
    /// Quoted unknown names, e.g. `"i_V1"`, `"v_component(1)"`, `"u_2_circuit_1"`.
    pub unknown_names: Vec<String>,
    /// (node, row) for each non-reference node, ascending.
    pub kcl_rows: Vec<(NodeId, usize)>,
    /// KVL row of each branch.
    pub kvl_rows: Vec<usize>,
    /// Constitutive row of each branch; `None` where the row is reserved.
    pub component_rows: Vec<Option<usize>>,
    /// Rows left for the solver, ascending.
    pub reserved_rows: Vec<usize>,
}

impl Layout {
    pub fn new(circuit_id: u32, ref_node: NodeId, components: &[&Component], numnodes: usize) -> Self {
        let numedges = components.len();
        let unknown_names = unknown_names(components, ref_node, circuit_id, numnodes);
        let size = unknown_names.len();

        let reserved_rows: Vec<usize> = components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_component_backed())
            .map(|(e, _)| numedges + e)
            .collect();

        let mut free_rows = (0..size).filter(|row| !reserved_rows.contains(row));

        let kcl_rows: Vec<(NodeId, usize)> = non_reference_nodes(ref_node, numnodes)
            .zip(free_rows.by_ref())
            .collect();
        let kvl_rows: Vec<usize> = free_rows.by_ref().take(numedges).collect();
        let component_rows: Vec<Option<usize>> = components
            .iter()
            .map(|c| if c.is_component_backed() { None } else { free_rows.next() })
            .collect();

        Self {
            circuit_id,
            ref_node,
            numnodes,
            numedges,
            unknown_names,
            kcl_rows,
            kvl_rows,
            component_rows,
            reserved_rows,
        }
    }

    /// Number of unknowns, equal to the number of equation rows.
    pub fn size(&self) -> usize {
        self.unknown_names.len()
    }

    pub fn current_column(&self, branch: usize) -> usize {
        branch
    }

    pub fn voltage_column(&self, branch: usize) -> usize {
        self.numedges + branch
    }

    /// Column of a node potential; `None` for the reference node.
    pub fn potential_column(&self, node: NodeId) -> Option<usize> {
        if node == self.ref_node || node == 0 || node as usize > self.numnodes {
            return None;
        }
        let below_ref = if node > self.ref_node { 1 } else { 0 };
        Some(2 * self.numedges + node as usize - 1 - below_ref)
    }
}

fn non_reference_nodes(ref_node: NodeId, numnodes: usize) -> impl Iterator<Item = NodeId> {
    (1..=numnodes as NodeId).filter(move |&n| n != ref_node)
}

fn branch_suffix(component: &Component) -> String {
    match component.component_number() {
        Some(number) => format!("component({})", number),
        None => component.name().to_string(),
    }
}

/// Ordered, quoted unknown names: all branch currents, all branch voltages,
/// then one potential per non-reference node.
pub fn unknown_names(components: &[&Component], ref_node: NodeId, circuit_id: u32, numnodes: usize) -> Vec<String> {
    let currents = components.iter().map(|c| format!("\"i_{}\"", branch_suffix(c)));
    let voltages = components.iter().map(|c| format!("\"v_{}\"", branch_suffix(c)));
    let potentials =
        non_reference_nodes(ref_node, numnodes).map(|n| format!("\"u_{}_circuit_{}\"", n, circuit_id));
    currents.chain(voltages).chain(potentials).collect()
}
