//! Circuit intermediate representation.
//!
//! The caller (or the netlist parser) builds `Circuit`s out of `Component`s.
//! The compiler consumes this IR read-only to assemble the circuit matrices.

use std::collections::BTreeMap;
use std::fmt;

/// Node label in a circuit. Labels start at 1; the reference node is one of them.
pub type NodeId = u32;

/// A branch value: either a plain number or a MATC expression that the
/// solver evaluates at run time (e.g. `if(tx<0.5){10.0} else {20.0}`).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Numeric(f64),
    Symbolic(String),
}

impl Value {
    pub fn is_symbolic(&self) -> bool {
        matches!(self, Value::Symbolic(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) => Some(*v),
            Value::Symbolic(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(v) => f.write_str(&format_real(*v)),
            Value::Symbolic(expr) => f.write_str(expr),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Numeric(v)
    }
}

impl From<&str> for Value {
    fn from(expr: &str) -> Self {
        Value::Symbolic(expr.to_string())
    }
}

impl From<String> for Value {
    fn from(expr: String) -> Self {
        Value::Symbolic(expr)
    }
}

/// Format a real number the way the definition files expect it: shortest
/// round-trip digits, integral values keep a trailing `.0`, very small or
/// very large magnitudes switch to exponent form (`1e-6`).
pub fn format_real(value: f64) -> String {
    format!("{:?}", value)
}

/// Fixed type tag of a branch, used to partition branches for the
/// constitutive matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Resistor,
    Inductor,
    Capacitor,
    VoltageSource,
    CurrentSource,
    /// Field-coupled region whose equations come from the FE model.
    Component,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Resistor => "resistor",
            ComponentType::Inductor => "inductor",
            ComponentType::Capacitor => "capacitor",
            ComponentType::VoltageSource => "voltage_source",
            ComponentType::CurrentSource => "current_source",
            ComponentType::Component => "component",
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, ComponentType::VoltageSource | ComponentType::CurrentSource)
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A circuit branch. Current is defined as flowing from `nodes.0` to `nodes.1`.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Resistor {
        name: String,
        nodes: (NodeId, NodeId),
        value: Value,
    },
    Inductor {
        name: String,
        nodes: (NodeId, NodeId),
        value: Value,
    },
    Capacitor {
        name: String,
        nodes: (NodeId, NodeId),
        value: Value,
    },
    VSource {
        name: String,
        nodes: (NodeId, NodeId),
        value: Value,
    },
    ISource {
        name: String,
        nodes: (NodeId, NodeId),
        value: Value,
    },
    /// Time-switched resistor realised as a solver-side component.
    Stepwise(StepwiseResistor),
    /// Field-coupled winding or conductor region.
    Field(FieldComponent),
}

impl Component {
    pub fn resistor(name: &str, pin1: NodeId, pin2: NodeId, value: impl Into<Value>) -> Self {
        Component::Resistor {
            name: name.to_string(),
            nodes: (pin1, pin2),
            value: value.into(),
        }
    }

    pub fn inductor(name: &str, pin1: NodeId, pin2: NodeId, value: impl Into<Value>) -> Self {
        Component::Inductor {
            name: name.to_string(),
            nodes: (pin1, pin2),
            value: value.into(),
        }
    }

    pub fn capacitor(name: &str, pin1: NodeId, pin2: NodeId, value: impl Into<Value>) -> Self {
        Component::Capacitor {
            name: name.to_string(),
            nodes: (pin1, pin2),
            value: value.into(),
        }
    }

    pub fn voltage_source(name: &str, pin1: NodeId, pin2: NodeId, value: impl Into<Value>) -> Self {
        Component::VSource {
            name: name.to_string(),
            nodes: (pin1, pin2),
            value: value.into(),
        }
    }

    pub fn current_source(name: &str, pin1: NodeId, pin2: NodeId, value: impl Into<Value>) -> Self {
        Component::ISource {
            name: name.to_string(),
            nodes: (pin1, pin2),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Component::Resistor { name, .. }
            | Component::Inductor { name, .. }
            | Component::Capacitor { name, .. }
            | Component::VSource { name, .. }
            | Component::ISource { name, .. } => name,
            Component::Stepwise(r) => &r.name,
            Component::Field(fc) => &fc.name,
        }
    }

    pub fn nodes(&self) -> (NodeId, NodeId) {
        match self {
            Component::Resistor { nodes, .. }
            | Component::Inductor { nodes, .. }
            | Component::Capacitor { nodes, .. }
            | Component::VSource { nodes, .. }
            | Component::ISource { nodes, .. } => *nodes,
            Component::Stepwise(r) => r.nodes,
            Component::Field(fc) => fc.nodes,
        }
    }

    pub fn pin1(&self) -> NodeId {
        self.nodes().0
    }

    pub fn pin2(&self) -> NodeId {
        self.nodes().1
    }

    pub fn component_type(&self) -> ComponentType {
        match self {
            Component::Resistor { .. } | Component::Stepwise(_) => ComponentType::Resistor,
            Component::Inductor { .. } => ComponentType::Inductor,
            Component::Capacitor { .. } => ComponentType::Capacitor,
            Component::VSource { .. } => ComponentType::VoltageSource,
            Component::ISource { .. } => ComponentType::CurrentSource,
            Component::Field(_) => ComponentType::Component,
        }
    }

    /// Branch value. Field components have none: their behaviour comes
    /// from the FE model.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Component::Resistor { value, .. }
            | Component::Inductor { value, .. }
            | Component::Capacitor { value, .. }
            | Component::VSource { value, .. }
            | Component::ISource { value, .. } => Some(value),
            Component::Stepwise(r) => Some(&r.resistance),
            Component::Field(_) => None,
        }
    }

    /// Solver-side component number, if the branch is realised as a
    /// `Component N` section.
    pub fn component_number(&self) -> Option<u32> {
        match self {
            Component::Stepwise(r) => Some(r.component_number),
            Component::Field(fc) => Some(fc.component_number),
            _ => None,
        }
    }

    /// True for branches whose equations are supplied by the solver.
    pub fn is_component_backed(&self) -> bool {
        self.component_number().is_some()
    }
}

impl From<StepwiseResistor> for Component {
    fn from(r: StepwiseResistor) -> Self {
        Component::Stepwise(r)
    }
}

impl From<FieldComponent> for Component {
    fn from(fc: FieldComponent) -> Self {
        Component::Field(fc)
    }
}

/// Resistor that switches from one value to another at a given time.
///
/// With both `switch_time` and `resistance_after` set, the resistance is the
/// MATC expression `if(tx<T){Before} else {After}`. Otherwise it is the
/// constant `resistance_before`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepwiseResistor {
    pub name: String,
    pub nodes: (NodeId, NodeId),
    pub component_number: u32,
    resistance_before: f64,
    switch_time: Option<f64>,
    resistance_after: Option<f64>,
    resistance: Value,
}

impl StepwiseResistor {
    pub fn new(
        name: &str,
        pin1: NodeId,
        pin2: NodeId,
        component_number: u32,
        resistance_before: f64,
        switch_time: Option<f64>,
        resistance_after: Option<f64>,
    ) -> Self {
        Self {
            name: name.to_string(),
            nodes: (pin1, pin2),
            component_number,
            resistance_before,
            switch_time,
            resistance_after,
            resistance: stepwise_resistance(name, resistance_before, switch_time, resistance_after),
        }
    }

    /// Constant resistor realised as a solver component.
    pub fn constant(name: &str, pin1: NodeId, pin2: NodeId, component_number: u32, resistance: f64) -> Self {
        Self::new(name, pin1, pin2, component_number, resistance, None, None)
    }

    pub fn resistance(&self) -> &Value {
        &self.resistance
    }

    pub fn is_switched(&self) -> bool {
        self.resistance.is_symbolic()
    }

    pub fn resistance_before(&self) -> f64 {
        self.resistance_before
    }

    pub fn switch_time(&self) -> Option<f64> {
        self.switch_time
    }

    pub fn resistance_after(&self) -> Option<f64> {
        self.resistance_after
    }

    pub fn set_resistance_before(&mut self, resistance_before: f64) {
        self.resistance_before = resistance_before;
        self.refresh();
    }

    /// Set or clear the switch. Both halves are needed for a switched value.
    pub fn set_switch(&mut self, switch_time: Option<f64>, resistance_after: Option<f64>) {
        self.switch_time = switch_time;
        self.resistance_after = resistance_after;
        self.refresh();
    }

    fn refresh(&mut self) {
        self.resistance =
            stepwise_resistance(&self.name, self.resistance_before, self.switch_time, self.resistance_after);
    }
}

fn stepwise_resistance(name: &str, before: f64, switch_time: Option<f64>, after: Option<f64>) -> Value {
    match (switch_time, after) {
        (Some(time), Some(after)) => Value::Symbolic(format!(
            "if(tx<{}){{{}}} else {{{}}}",
            format_real(time),
            format_real(before),
            format_real(after)
        )),
        (None, None) => Value::Numeric(before),
        _ => {
            tracing::warn!(
                resistor = name,
                "stepwise resistor needs both switch time and resistance after; using constant value"
            );
            Value::Numeric(before)
        }
    }
}

/// Body a field component is attached to, by id or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterBody {
    Id(u32),
    Name(String),
}

impl From<u32> for MasterBody {
    fn from(id: u32) -> Self {
        MasterBody::Id(id)
    }
}

impl From<&str> for MasterBody {
    fn from(name: &str) -> Self {
        MasterBody::Name(name.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoilType {
    Massive,
    Stranded { turns: u32, resistance: f64 },
    Foil { turns: u32, thickness: f64 },
}

impl CoilType {
    pub fn label(&self) -> &'static str {
        match self {
            CoilType::Massive => "Massive",
            CoilType::Stranded { .. } => "Stranded",
            CoilType::Foil { .. } => "Foil winding",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dimension {
    #[default]
    TwoD,
    ThreeD,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::TwoD => f.write_str("2D"),
            Dimension::ThreeD => f.write_str("3D"),
        }
    }
}

/// Terminal configuration of a field component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Terminals {
    #[default]
    Closed,
    /// Open coil with its two electrode boundaries.
    Open(u32, u32),
}

/// A field-coupled region (winding, massive conductor, foil) that the FE
/// solver couples to the circuit through `i_component(N)` / `v_component(N)`.
///
/// Built with [`FieldComponent::builder`]; once built it is immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldComponent {
    pub name: String,
    pub nodes: (NodeId, NodeId),
    pub component_number: u32,
    pub master_bodies: Vec<MasterBody>,
    coil_type: CoilType,
    dimension: Dimension,
    terminals: Terminals,
    symmetry_coefficient: f64,
}

impl FieldComponent {
    /// Massive, closed, 2D component with symmetry coefficient 1.
    pub fn new<B, I>(name: &str, pin1: NodeId, pin2: NodeId, component_number: u32, master_bodies: I) -> Self
    where
        B: Into<MasterBody>,
        I: IntoIterator<Item = B>,
    {
        Self {
            name: name.to_string(),
            nodes: (pin1, pin2),
            component_number,
            master_bodies: master_bodies.into_iter().map(Into::into).collect(),
            coil_type: CoilType::Massive,
            dimension: Dimension::TwoD,
            terminals: Terminals::Closed,
            symmetry_coefficient: 1.0,
        }
    }

    pub fn builder<B, I>(
        name: &str,
        pin1: NodeId,
        pin2: NodeId,
        component_number: u32,
        master_bodies: I,
    ) -> FieldComponentBuilder
    where
        B: Into<MasterBody>,
        I: IntoIterator<Item = B>,
    {
        FieldComponentBuilder {
            inner: Self::new(name, pin1, pin2, component_number, master_bodies),
        }
    }

    pub fn coil_type(&self) -> CoilType {
        self.coil_type
    }

    pub fn coil_type_name(&self) -> &'static str {
        self.coil_type.label()
    }

    pub fn number_of_turns(&self) -> u32 {
        match self.coil_type {
            CoilType::Massive => 1,
            CoilType::Stranded { turns, .. } | CoilType::Foil { turns, .. } => turns,
        }
    }

    /// Winding resistance; zero unless stranded.
    pub fn resistance(&self) -> f64 {
        match self.coil_type {
            CoilType::Stranded { resistance, .. } => resistance,
            _ => 0.0,
        }
    }

    /// Foil thickness; zero unless foil wound.
    pub fn coil_thickness(&self) -> f64 {
        match self.coil_type {
            CoilType::Foil { thickness, .. } => thickness,
            _ => 0.0,
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn terminals(&self) -> Terminals {
        self.terminals
    }

    pub fn is_closed(&self) -> bool {
        self.terminals == Terminals::Closed
    }

    pub fn open_terminals(&self) -> [Option<u32>; 2] {
        match self.terminals {
            Terminals::Closed => [None, None],
            Terminals::Open(a, b) => [Some(a), Some(b)],
        }
    }

    /// `None` for closed components, `Some(false)` for open ones.
    pub fn terminal_type(&self) -> Option<bool> {
        match self.terminals {
            Terminals::Closed => None,
            Terminals::Open(..) => Some(false),
        }
    }

    pub fn symmetry_coefficient(&self) -> f64 {
        self.symmetry_coefficient
    }

    /// Coil type setters are mutually exclusive; the last call wins.
    pub fn set_stranded(&mut self, turns: u32, resistance: f64) {
        self.coil_type = CoilType::Stranded { turns, resistance };
    }

    pub fn set_foil(&mut self, turns: u32, thickness: f64) {
        self.coil_type = CoilType::Foil { turns, thickness };
    }

    pub fn set_3d(&mut self) {
        self.dimension = Dimension::ThreeD;
    }

    pub fn set_open(&mut self, terminal_a: u32, terminal_b: u32) {
        self.terminals = Terminals::Open(terminal_a, terminal_b);
    }

    pub fn set_symmetry_coefficient(&mut self, coefficient: f64) {
        self.symmetry_coefficient = coefficient;
    }
}

/// Chained form of the [`FieldComponent`] setters.
#[derive(Debug, Clone)]
pub struct FieldComponentBuilder {
    inner: FieldComponent,
}

impl FieldComponentBuilder {
    pub fn stranded(mut self, turns: u32, resistance: f64) -> Self {
        self.inner.set_stranded(turns, resistance);
        self
    }

    pub fn foil(mut self, turns: u32, thickness: f64) -> Self {
        self.inner.set_foil(turns, thickness);
        self
    }

    pub fn three_d(mut self) -> Self {
        self.inner.set_3d();
        self
    }

    pub fn open(mut self, terminal_a: u32, terminal_b: u32) -> Self {
        self.inner.set_open(terminal_a, terminal_b);
        self
    }

    pub fn symmetry(mut self, coefficient: f64) -> Self {
        self.inner.set_symmetry_coefficient(coefficient);
        self
    }

    pub fn build(self) -> FieldComponent {
        self.inner
    }
}

/// One circuit: parallel branches of series components plus a reference node.
#[derive(Debug, Clone, PartialEq)]
pub struct Circuit {
    pub id: u32,
    pub branches: Vec<Vec<Component>>,
    pub ref_node: NodeId,
}

impl Circuit {
    pub const DEFAULT_REF_NODE: NodeId = 1;

    pub fn new(id: u32) -> Self {
        Self {
            id,
            branches: Vec::new(),
            ref_node: Self::DEFAULT_REF_NODE,
        }
    }

    pub fn with_branches(id: u32, branches: Vec<Vec<Component>>) -> Self {
        Self {
            id,
            branches,
            ref_node: Self::DEFAULT_REF_NODE,
        }
    }

    pub fn with_ref_node(mut self, ref_node: NodeId) -> Self {
        self.ref_node = ref_node;
        self
    }

    pub fn add_branch(&mut self, branch: Vec<Component>) {
        self.branches.push(branch);
    }

    /// All components of all branches, in branch order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.branches.iter().flatten()
    }

    /// True if any branch is realised by the solver (field component or
    /// stepwise resistor). Circuits without one have nothing to emit.
    pub fn has_field_elements(&self) -> bool {
        self.components().any(Component::is_component_backed)
    }
}

/// Circuits 1..=count, each empty with reference node 1.
pub fn circuits(count: u32) -> BTreeMap<u32, Circuit> {
    (1..=count).map(|id| (id, Circuit::new(id))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_component_defaults() {
        let fc = FieldComponent::new("Coil1", 2, 1, 1, [1u32]);
        assert_eq!(fc.component_number, 1);
        assert_eq!(fc.master_bodies, vec![MasterBody::Id(1)]);
        assert_eq!(fc.coil_type_name(), "Massive");
        assert_eq!(fc.number_of_turns(), 1);
        assert_eq!(fc.resistance(), 0.0);
        assert_eq!(fc.coil_thickness(), 0.0);
        assert_eq!(fc.open_terminals(), [None, None]);
        assert_eq!(fc.terminal_type(), None);
        assert_eq!(fc.dimension().to_string(), "2D");
        assert!(fc.is_closed());
    }

    #[test]
    fn test_field_component_builder_last_coil_type_wins() {
        let stranded = FieldComponent::builder("EC", 1, 2, 7, [MasterBody::Id(1), MasterBody::from("MB")])
            .stranded(10, 2.5)
            .build();
        assert_eq!(stranded.coil_type_name(), "Stranded");
        assert_eq!(stranded.number_of_turns(), 10);
        assert_eq!(stranded.resistance(), 2.5);

        let foil = FieldComponent::builder("EC", 1, 2, 7, [1u32])
            .stranded(10, 2.5)
            .foil(5, 0.12)
            .build();
        assert_eq!(foil.coil_type_name(), "Foil winding");
        assert_eq!(foil.number_of_turns(), 5);
        assert_eq!(foil.resistance(), 0.0);
        assert!((foil.coil_thickness() - 0.12).abs() < 1e-12);
    }

    #[test]
    fn test_field_component_3d_open() {
        let fc = FieldComponent::builder("EC", 1, 2, 7, [1u32]).three_d().open(3, 4).build();
        assert_eq!(fc.dimension(), Dimension::ThreeD);
        assert!(!fc.is_closed());
        assert_eq!(fc.open_terminals(), [Some(3), Some(4)]);
        assert_eq!(fc.terminal_type(), Some(false));
    }

    #[test]
    fn test_field_component_setters() {
        let mut fc = FieldComponent::new("EC", 1, 2, 7, [1u32]);
        fc.set_foil(5, 0.12);
        fc.set_stranded(10, 2.5);
        fc.set_open(1, 2);
        fc.set_3d();
        fc.set_symmetry_coefficient(0.5);
        assert_eq!(fc.coil_type(), CoilType::Stranded { turns: 10, resistance: 2.5 });
        assert_eq!(fc.terminals(), Terminals::Open(1, 2));
        assert_eq!(fc.dimension().to_string(), "3D");
        assert_eq!(fc.symmetry_coefficient(), 0.5);
    }

    #[test]
    fn test_stepwise_resistor_constant() {
        let r = StepwiseResistor::constant("R1", 1, 2, 5, 10.0);
        assert_eq!(r.resistance(), &Value::Numeric(10.0));
        assert_eq!(r.resistance().to_string(), "10.0");
        assert!(!r.is_switched());
        assert_eq!(Component::from(r).component_type(), ComponentType::Resistor);
    }

    #[test]
    fn test_stepwise_resistor_switched_expression() {
        let r = StepwiseResistor::new("R1", 1, 2, 5, 10.0, Some(0.5), Some(20.0));
        assert_eq!(r.resistance().to_string(), "if(tx<0.5){10.0} else {20.0}");
        assert!(r.is_switched());
    }

    #[test]
    fn test_stepwise_resistor_setters_recompute_value() {
        let mut r = StepwiseResistor::constant("R1", 1, 2, 5, 10.0);
        r.set_switch(Some(1.0), Some(20.0));
        r.set_resistance_before(99.0);
        assert_eq!(r.resistance_before(), 99.0);
        assert_eq!(r.switch_time(), Some(1.0));
        assert_eq!(r.resistance_after(), Some(20.0));
        assert_eq!(r.resistance().to_string(), "if(tx<1.0){99.0} else {20.0}");
        assert_eq!(
            Component::from(r.clone()).value(),
            Some(&Value::Symbolic("if(tx<1.0){99.0} else {20.0}".into()))
        );

        r.set_switch(None, None);
        assert_eq!(r.resistance(), &Value::Numeric(99.0));
        assert!(!r.is_switched());
    }

    #[test]
    fn test_stepwise_resistor_partial_parameters_fall_back() {
        for (time, after) in [(Some(2.0), None), (None, Some(50.0)), (None, None)] {
            let r = StepwiseResistor::new("R1", 1, 2, 5, 1e6, time, after);
            assert_eq!(r.resistance(), &Value::Numeric(1e6));
            assert_eq!(r.resistance().to_string(), "1000000.0");
        }
    }

    #[test]
    fn test_format_real() {
        assert_eq!(format_real(1.0), "1.0");
        assert_eq!(format_real(5.0), "5.0");
        assert_eq!(format_real(0.12), "0.12");
        assert_eq!(format_real(1e6), "1000000.0");
        assert_eq!(format_real(-2.5), "-2.5");
    }

    #[test]
    fn test_component_accessors() {
        let v = Component::voltage_source("V1", 1, 2, 1.0);
        assert_eq!(v.name(), "V1");
        assert_eq!(v.pin1(), 1);
        assert_eq!(v.pin2(), 2);
        assert_eq!(v.component_type(), ComponentType::VoltageSource);
        assert_eq!(v.value(), Some(&Value::Numeric(1.0)));
        assert!(!v.is_component_backed());

        let coil: Component = FieldComponent::new("Coil1", 2, 1, 3, [1u32]).into();
        assert_eq!(coil.component_type(), ComponentType::Component);
        assert_eq!(coil.value(), None);
        assert_eq!(coil.component_number(), Some(3));
    }

    #[test]
    fn test_circuits_and_field_elements() {
        let mut map = circuits(2);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1].ref_node, 1);

        let c = map.get_mut(&1).unwrap();
        c.add_branch(vec![Component::voltage_source("V1", 1, 2, 1.0)]);
        assert!(!c.has_field_elements());
        c.add_branch(vec![FieldComponent::new("Coil1", 2, 1, 1, [1u32]).into()]);
        assert!(c.has_field_elements());
        assert_eq!(c.components().count(), 2);
    }
}
