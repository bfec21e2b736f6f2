//! Circuit equation compiler.
//!
//! Converts a `Circuit` into its branch matrices and the stamped equation
//! system consumed by the renderer.
//!
//! # Branch matrices
//!
//! For `N` nodes and `E` branches:
//!
//! - **Incidence** `A` (N x E): `A[n][e] = +1` if branch `e` leaves node `n`
//!   (its pin1), `-1` if it enters (its pin2). The reference node row is kept.
//! - **Resistance** `R` (E x E, diagonal): resistor values; sources hold the
//!   placeholder `1`, their magnitude goes to the source vector.
//! - **Inductance** `L`, **Capacitance** `C` (E x E, diagonal).
//!
//! All four are numeric (`f64`) or all symbolic (`String`): one expression
//! value anywhere in the circuit selects the symbolic path.
//!
//! # Equations
//!
//! Rows and columns come from the circuit's [`Layout`]:
//!
//! - **KCL** (node n): `B(r, i_e) = A[n][e]`
//! - **KVL** (branch e): `B(r, v_e) = +1` for sources, `-1` otherwise, and
//!   `B(r, u_n) = A[n][e]` for each non-reference node
//! - **Voltage source**: `B(r, v_e) = R[e][e]`, source `"<name>_Source"`
//! - **Current source**: `B(r, i_e) = R[e][e]`, source `"<name>_Source"`
//! - **Resistor**: `B(r, v_e) = 1`, `B(r, i_e) = -R`
//! - **Inductor**: `B(r, v_e) = 1`, `A(r, i_e) = -L` (time derivative)
//! - **Capacitor**: `B(r, i_e) = 1`, `A(r, v_e) = -C` (time derivative)
//!
//! Field components and stepwise resistors get no constitutive row: the
//! solver fills their reserved row.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CircuitError, Result};
use crate::ir::{format_real, Circuit, CoilType, Component, Value};
use crate::layout::Layout;
use crate::matrix::{DenseMatrix, Entry};
use crate::topology::{self, Representation, Topology};

/// The four branch matrices of one circuit, all with the same entry type.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSet<T> {
    pub incidence: DenseMatrix<T>,
    pub resistance: DenseMatrix<T>,
    pub inductance: DenseMatrix<T>,
    pub capacitance: DenseMatrix<T>,
}

impl<T: Entry> MatrixSet<T> {
    pub fn build(components: &[&Component], topology: &Topology) -> Result<Self> {
        Ok(Self {
            incidence: incidence_matrix(components, topology.numnodes),
            resistance: resistance_matrix(components, topology)?,
            inductance: diagonal_matrix(components, topology, &topology.inductors)?,
            capacitance: diagonal_matrix(components, topology, &topology.capacitors)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BranchMatrices {
    Numeric(MatrixSet<f64>),
    Symbolic(MatrixSet<String>),
}

impl BranchMatrices {
    pub fn representation(&self) -> Representation {
        match self {
            BranchMatrices::Numeric(_) => Representation::Numeric,
            BranchMatrices::Symbolic(_) => Representation::Symbolic,
        }
    }
}

/// Node-by-branch incidence matrix; current flows from pin1 to pin2.
pub fn incidence_matrix<T: Entry>(components: &[&Component], numnodes: usize) -> DenseMatrix<T> {
    let mut triplets = Vec::with_capacity(2 * components.len());
    for (e, component) in components.iter().enumerate() {
        let (p1, p2) = component.nodes();
        triplets.push((p1 as usize - 1, e, T::unit(1)));
        triplets.push((p2 as usize - 1, e, T::unit(-1)));
    }
    DenseMatrix::from_triplets(numnodes, components.len(), triplets)
}

/// Resistance matrix: resistor values plus the unit placeholder for sources.
pub fn resistance_matrix<T: Entry>(components: &[&Component], topology: &Topology) -> Result<DenseMatrix<T>> {
    let mut m = diagonal_matrix(components, topology, &topology.resistors)?;
    for &e in &topology.sources {
        m.set(e, e, T::unit(1));
    }
    Ok(m)
}

/// Diagonal matrix holding the values of the listed branches.
fn diagonal_matrix<T: Entry>(
    components: &[&Component],
    topology: &Topology,
    indices: &[usize],
) -> Result<DenseMatrix<T>> {
    let n = topology.numedges;
    let mut triplets = Vec::with_capacity(indices.len());
    for &e in indices {
        let value = topology.values[e].as_ref().ok_or_else(|| {
            CircuitError::Structural(format!("{} has no value", components[e].name()))
        })?;
        triplets.push((e, e, entry_for(components[e], value)?));
    }
    Ok(DenseMatrix::from_triplets(n, n, triplets))
}

fn entry_for<T: Entry>(component: &Component, value: &Value) -> Result<T> {
    T::from_value(value).ok_or_else(|| {
        CircuitError::MixedValueType(format!(
            "{} value '{}' cannot be used in a numeric matrix",
            component.name(),
            value
        ))
    })
}

/// Which circuit matrix a stamp lands in: `A` multiplies time derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    A,
    B,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::A => f.write_str("A"),
            Target::B => f.write_str("B"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coefficient {
    /// `1` or `-1`.
    Unit(i8),
    /// Reference to a declared circuit parameter, e.g. `-R1`.
    Parameter { name: String, negated: bool },
}

impl fmt::Display for Coefficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coefficient::Unit(sign) => write!(f, "{}", sign),
            Coefficient::Parameter { name, negated: true } => write!(f, "-{}", name),
            Coefficient::Parameter { name, negated: false } => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub target: Target,
    pub row: usize,
    pub col: usize,
    pub coefficient: Coefficient,
}

impl Stamp {
    fn unit(target: Target, row: usize, col: usize, sign: i8) -> Self {
        Self {
            target,
            row,
            col,
            coefficient: Coefficient::Unit(sign),
        }
    }

    fn negated_parameter(target: Target, row: usize, col: usize, name: &str) -> Self {
        Self {
            target,
            row,
            col,
            coefficient: Coefficient::Parameter {
                name: name.to_string(),
                negated: true,
            },
        }
    }
}

/// The stamped circuit equations, grouped by kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EquationSystem {
    pub size: usize,
    pub kcl: Vec<Stamp>,
    pub kvl: Vec<Stamp>,
    pub constitutive: Vec<Stamp>,
    /// Equation row -> source label.
    pub sources: BTreeMap<usize, String>,
}

impl EquationSystem {
    /// Coefficient at (target, row, col), if stamped.
    pub fn coefficient(&self, target: Target, row: usize, col: usize) -> Option<&Coefficient> {
        self.stamps()
            .find(|s| s.target == target && s.row == row && s.col == col)
            .map(|s| &s.coefficient)
    }

    pub fn stamps(&self) -> impl Iterator<Item = &Stamp> {
        self.kcl.iter().chain(&self.kvl).chain(&self.constitutive)
    }
}

/// Stamp KCL, KVL and constitutive equations at the rows of `layout`.
pub fn stamp_equations<T: Entry>(
    components: &[&Component],
    layout: &Layout,
    matrices: &MatrixSet<T>,
) -> EquationSystem {
    let mut system = EquationSystem {
        size: layout.size(),
        ..Default::default()
    };
    let incidence_sign = |node: u32, e: usize| -> i8 {
        matrices.incidence.get(node as usize - 1, e).sign().unwrap_or(0)
    };

    for &(node, row) in &layout.kcl_rows {
        for e in 0..layout.numedges {
            let sign = incidence_sign(node, e);
            if sign != 0 {
                system.kcl.push(Stamp::unit(Target::B, row, layout.current_column(e), sign));
            }
        }
    }

    for (e, component) in components.iter().enumerate() {
        let row = layout.kvl_rows[e];
        let voltage_sign = if component.component_type().is_source() { 1 } else { -1 };
        system.kvl.push(Stamp::unit(Target::B, row, layout.voltage_column(e), voltage_sign));
        for node in 1..=layout.numnodes as u32 {
            if let Some(col) = layout.potential_column(node) {
                let sign = incidence_sign(node, e);
                if sign != 0 {
                    system.kvl.push(Stamp::unit(Target::B, row, col, sign));
                }
            }
        }
    }

    for (e, component) in components.iter().enumerate() {
        let Some(row) = layout.component_rows[e] else {
            continue;
        };
        let i_col = layout.current_column(e);
        let v_col = layout.voltage_column(e);
        let name = component.name();
        match component {
            Component::VSource { .. } | Component::ISource { .. } => {
                let placeholder = matrices.resistance.get(e, e).sign().unwrap_or(1);
                let col = if matches!(component, Component::VSource { .. }) { v_col } else { i_col };
                system.constitutive.push(Stamp::unit(Target::B, row, col, placeholder));
                system.sources.insert(row, format!("{}_Source", name));
            }
            Component::Resistor { .. } => {
                system.constitutive.push(Stamp::unit(Target::B, row, v_col, 1));
                system.constitutive.push(Stamp::negated_parameter(Target::B, row, i_col, name));
            }
            Component::Inductor { .. } => {
                system.constitutive.push(Stamp::unit(Target::B, row, v_col, 1));
                system.constitutive.push(Stamp::negated_parameter(Target::A, row, i_col, name));
            }
            Component::Capacitor { .. } => {
                system.constitutive.push(Stamp::unit(Target::B, row, i_col, 1));
                system.constitutive.push(Stamp::negated_parameter(Target::A, row, v_col, name));
            }
            Component::Stepwise(_) | Component::Field(_) => {}
        }
    }

    system
}

/// A `$ name = value` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Winding parameters of each field component, in branch order.
pub fn component_parameters(components: &[&Component]) -> Vec<Parameter> {
    let mut params = Vec::new();
    for component in components {
        if let Component::Field(fc) = component {
            params.push(Parameter::new(format!("Ns_{}", fc.name), fc.number_of_turns().to_string()));
            match fc.coil_type() {
                CoilType::Stranded { resistance, .. } => {
                    params.push(Parameter::new(format!("Rs_{}", fc.name), format_real(resistance)));
                }
                CoilType::Foil { thickness, .. } => {
                    params.push(Parameter::new(format!("L_{}", fc.name), format_real(thickness)));
                }
                CoilType::Massive => {}
            }
        }
    }
    params
}

/// Lumped element values: R/L/C from the matrix diagonals, sources from
/// their magnitude.
pub fn circuit_parameters<T: Entry>(components: &[&Component], matrices: &MatrixSet<T>) -> Result<Vec<Parameter>> {
    let mut params = Vec::new();
    for (e, component) in components.iter().enumerate() {
        let value = match component {
            Component::Resistor { .. } => matrices.resistance.get(e, e).render(),
            Component::Inductor { .. } => matrices.inductance.get(e, e).render(),
            Component::Capacitor { .. } => matrices.capacitance.get(e, e).render(),
            Component::VSource { value, .. } | Component::ISource { value, .. } => {
                entry_for::<T>(component, value)?.render()
            }
            Component::Stepwise(_) | Component::Field(_) => continue,
        };
        params.push(Parameter::new(component.name(), value));
    }
    Ok(params)
}

/// Everything the renderer needs for one circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledCircuit {
    pub circuit_id: u32,
    pub topology: Topology,
    pub layout: Layout,
    pub matrices: BranchMatrices,
    pub equations: EquationSystem,
    pub component_parameters: Vec<Parameter>,
    pub circuit_parameters: Vec<Parameter>,
    /// Flattened components in branch order.
    pub components: Vec<Component>,
}

impl AssembledCircuit {
    /// Field components and stepwise resistors, in branch order.
    pub fn solver_components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.is_component_backed())
    }
}

fn check_values(circuit_id: u32, components: &[&Component]) -> Result<()> {
    for component in components {
        match component.value() {
            Some(Value::Numeric(v)) if !v.is_finite() => {
                return Err(CircuitError::MixedValueType(format!(
                    "circuit {}: {} has non-finite value {}",
                    circuit_id,
                    component.name(),
                    v
                )));
            }
            Some(Value::Symbolic(expr)) if expr.trim().is_empty() => {
                return Err(CircuitError::MixedValueType(format!(
                    "circuit {}: {} has an empty expression",
                    circuit_id,
                    component.name()
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Compile one circuit into its matrices and equations.
///
/// 1. Validate structure and index the topology.
/// 2. Compute the unknown/row layout.
/// 3. Select the numeric or symbolic path from the branch values.
/// 4. Build the branch matrices and stamp the equations.
pub fn compile(circuit: &Circuit) -> Result<AssembledCircuit> {
    let _span = tracing::info_span!("compile_circuit", circuit_id = circuit.id).entered();

    let components: Vec<&Component> = circuit.components().collect();
    topology::validate(circuit, &components)?;
    check_values(circuit.id, &components)?;

    let topology = Topology::index(&components);
    let layout = Layout::new(circuit.id, circuit.ref_node, &components, topology.numnodes);

    let representation = topology.representation();
    if representation == Representation::Symbolic
        && topology.values.iter().flatten().any(|v| !v.is_symbolic())
    {
        tracing::debug!("promoting numeric branch values to symbolic entries");
    }
    tracing::debug!(
        numnodes = topology.numnodes,
        numedges = topology.numedges,
        size = layout.size(),
        ?representation,
        "indexed circuit"
    );

    let (matrices, equations, circuit_parameters) = match representation {
        Representation::Numeric => {
            let set = MatrixSet::<f64>::build(&components, &topology)?;
            let equations = stamp_equations(&components, &layout, &set);
            let params = circuit_parameters(&components, &set)?;
            (BranchMatrices::Numeric(set), equations, params)
        }
        Representation::Symbolic => {
            let set = MatrixSet::<String>::build(&components, &topology)?;
            let equations = stamp_equations(&components, &layout, &set);
            let params = circuit_parameters(&components, &set)?;
            (BranchMatrices::Symbolic(set), equations, params)
        }
    };

    Ok(AssembledCircuit {
        circuit_id: circuit.id,
        component_parameters: component_parameters(&components),
        circuit_parameters,
        components: components.into_iter().cloned().collect(),
        topology,
        layout,
        matrices,
        equations,
    })
}
