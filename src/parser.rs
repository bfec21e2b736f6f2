//! Circuit netlist parser.
//!
//! Builds the `circuit id -> Circuit` map from a line-oriented netlist.
//!
//! # Supported syntax
//!
//! ```text
//! * comment line
//! .CIRCUIT id [REF=node]
//! .BRANCH                 (start a new parallel branch)
//! Rname n1 n2 value       (resistor)
//! Lname n1 n2 value       (inductor)
//! Cname n1 n2 value       (capacitor)
//! Vname n1 n2 value       (voltage source)
//! Iname n1 n2 value       (current source)
//! .STEPWISE name n1 n2 number before [time after]
//! .COMPONENT name n1 n2 number BODIES=b1[,b2...]
//!     [STRANDED turns resistance | FOIL turns thickness] [3D] [OPEN a b] [SYM coefficient]
//! .END
//! ```
//!
//! Values are numbers with engineering suffixes T, G, MEG, K, M, U, N, P, F
//! (case-insensitive) or `{...}` expressions passed through verbatim.
//! Nodes are positive integers. Bodies are integers or names.

use std::collections::BTreeMap;

use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take_while1};
use nom::character::complete::{char, space0, space1};
use nom::combinator::{map, opt};
use nom::multi::{many0, separated_list1};
use nom::number::complete::double;
use nom::sequence::preceded;
use nom::IResult;
use nom::Parser;

use crate::error::{CircuitError, Result};
use crate::ir::{Circuit, Component, FieldComponent, MasterBody, NodeId, StepwiseResistor, Value};

/// Parse a netlist into circuits keyed by id.
pub fn parse(input: &str) -> Result<BTreeMap<u32, Circuit>> {
    let mut circuits = BTreeMap::new();
    let mut current: Option<CircuitBuilder> = None;

    for (line_num, raw_line) in input.lines().enumerate() {
        let line = raw_line.trim();

        if line.is_empty() || line.starts_with('*') {
            continue;
        }

        let upper = line.to_uppercase();
        if upper == ".END" {
            break;
        }

        if upper.starts_with(".CIRCUIT") {
            let (id, ref_node) = parse_circuit_line(line).map_err(|e| parse_err(line_num, raw_line, &e))?;
            if let Some(done) = current.take() {
                insert_circuit(&mut circuits, done.finish(), line_num, raw_line)?;
            }
            if circuits.contains_key(&id) {
                return Err(parse_err(line_num, raw_line, &format!("duplicate circuit id {}", id)));
            }
            let mut circuit = Circuit::new(id);
            if let Some(node) = ref_node {
                circuit = circuit.with_ref_node(node);
            }
            current = Some(CircuitBuilder::new(circuit));
            continue;
        }

        let Some(builder) = current.as_mut() else {
            return Err(parse_err(line_num, raw_line, "element outside a .CIRCUIT block"));
        };

        if upper == ".BRANCH" {
            builder.new_branch();
            continue;
        }

        let component = if upper.starts_with(".STEPWISE") {
            parse_stepwise_line(line)
        } else if upper.starts_with(".COMPONENT") {
            parse_component_line(line)
        } else if line.starts_with('.') {
            Err(format!("unknown directive '{}'", line.split_whitespace().next().unwrap_or(line)))
        } else {
            parse_element_line(line)
        }
        .map_err(|e| parse_err(line_num, raw_line, &e))?;

        builder.push(component);
    }

    if let Some(done) = current.take() {
        let id = done.circuit.id;
        if circuits.insert(id, done.finish()).is_some() {
            return Err(CircuitError::Parse(format!("duplicate circuit id {}", id)));
        }
    }

    tracing::debug!(circuits = circuits.len(), "parsed netlist");
    Ok(circuits)
}

fn parse_err(line_num: usize, raw_line: &str, detail: &str) -> CircuitError {
    CircuitError::Parse(format!("line {}: {} in: {}", line_num + 1, detail, raw_line))
}

fn insert_circuit(
    circuits: &mut BTreeMap<u32, Circuit>,
    circuit: Circuit,
    line_num: usize,
    raw_line: &str,
) -> Result<()> {
    let id = circuit.id;
    if circuits.insert(id, circuit).is_some() {
        return Err(parse_err(line_num, raw_line, &format!("duplicate circuit id {}", id)));
    }
    Ok(())
}

/// Collects the branches of the circuit being parsed.
struct CircuitBuilder {
    circuit: Circuit,
    branch: Vec<Component>,
}

impl CircuitBuilder {
    fn new(circuit: Circuit) -> Self {
        Self {
            circuit,
            branch: Vec::new(),
        }
    }

    fn push(&mut self, component: Component) {
        self.branch.push(component);
    }

    fn new_branch(&mut self) {
        if !self.branch.is_empty() {
            let branch = std::mem::take(&mut self.branch);
            self.circuit.add_branch(branch);
        }
    }

    fn finish(mut self) -> Circuit {
        self.new_branch();
        self.circuit
    }
}

// ---------------------------------------------------------------------------
// Engineering suffix value parser
// ---------------------------------------------------------------------------

/// Parse a numeric value with optional engineering suffix.
/// Handles: 10k, 100n, 4.7u, 1MEG, 1e3, -3.3, etc.
fn eng_value(input: &str) -> IResult<&str, f64> {
    let (rest, num) = double(input)?;
    let (rest, suffix) = opt(eng_suffix).parse(rest)?;
    let multiplier = suffix.unwrap_or(1.0);
    Ok((rest, num * multiplier))
}

/// Match an engineering suffix and return its multiplier.
fn eng_suffix(input: &str) -> IResult<&str, f64> {
    // MEG before M
    alt((
        map(tag_no_case("MEG"), |_: &str| 1e6),
        map(tag_no_case("T"), |_: &str| 1e12),
        map(tag_no_case("G"), |_: &str| 1e9),
        map(tag_no_case("K"), |_: &str| 1e3),
        map(tag_no_case("M"), |_: &str| 1e-3),
        map(tag_no_case("U"), |_: &str| 1e-6),
        map(tag_no_case("N"), |_: &str| 1e-9),
        map(tag_no_case("P"), |_: &str| 1e-12),
        map(tag_no_case("F"), |_: &str| 1e-15),
    ))
    .parse(input)
}

/// `{expr}` with balanced inner braces; returns the text between the outer pair.
fn braced_expr(input: &str) -> IResult<&str, &str> {
    let (body, _) = char('{').parse(input)?;
    let mut depth = 1usize;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[i + 1..], &body[..i]));
                }
            }
            _ => {}
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char)))
}

/// A branch value: a number or a `{...}` expression.
fn value(input: &str) -> IResult<&str, Value> {
    alt((
        map(eng_value, Value::Numeric),
        map(braced_expr, |expr: &str| Value::Symbolic(expr.trim().to_string())),
    ))
    .parse(input)
}

// ---------------------------------------------------------------------------
// Token parsers
// ---------------------------------------------------------------------------

/// Parse a node label (non-negative integer).
fn node_id(input: &str) -> IResult<&str, NodeId> {
    nom::character::complete::u32(input)
}

/// Parse a count or identifier number.
fn integer(input: &str) -> IResult<&str, u32> {
    nom::character::complete::u32(input)
}

/// Parse a component/element name (everything up to the first whitespace).
fn element_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

fn body_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-')(input)
}

/// Require that only whitespace is left after a parsed line.
fn finish<T>(parsed: IResult<&str, T>, what: &str) -> std::result::Result<T, String> {
    match parsed {
        Ok((rest, out)) if rest.trim().is_empty() => Ok(out),
        Ok((rest, _)) => Err(format!("unexpected trailing input '{}' after {}", rest.trim(), what)),
        Err(_) => Err(format!("failed to parse {}", what)),
    }
}

// ---------------------------------------------------------------------------
// Directives
// ---------------------------------------------------------------------------

/// Parse: .CIRCUIT id [REF=node]
fn parse_circuit_line(line: &str) -> std::result::Result<(u32, Option<NodeId>), String> {
    finish(
        (
            tag_no_case(".CIRCUIT"),
            space1,
            integer,
            opt(preceded((space1, tag_no_case("REF=")), node_id)),
        )
            .parse(line)
            .map(|(rest, (_, _, id, ref_node))| (rest, (id, ref_node))),
        ".CIRCUIT directive",
    )
}

// ---------------------------------------------------------------------------
// R, L, C, V, I parsing
// ---------------------------------------------------------------------------

/// Parse a line like: Rname n1 n2 value
fn parse_element_line(line: &str) -> std::result::Result<Component, String> {
    let kind = line.chars().next().map(|c| c.to_ascii_uppercase()).unwrap_or(' ');
    if !matches!(kind, 'R' | 'L' | 'C' | 'V' | 'I') {
        return Err(format!("unknown element '{}'", kind));
    }

    let (name, pin1, pin2, value) = finish(
        (element_name, space1, node_id, space1, node_id, space1, value)
            .parse(line)
            .map(|(rest, (name, _, n1, _, n2, _, v))| (rest, (name, n1, n2, v))),
        &format!("{} element", kind),
    )?;

    Ok(match kind {
        'R' => Component::resistor(name, pin1, pin2, value),
        'L' => Component::inductor(name, pin1, pin2, value),
        'C' => Component::capacitor(name, pin1, pin2, value),
        'V' => Component::voltage_source(name, pin1, pin2, value),
        _ => Component::current_source(name, pin1, pin2, value),
    })
}

// ---------------------------------------------------------------------------
// Solver-realised elements
// ---------------------------------------------------------------------------

/// Parse: .STEPWISE name n1 n2 number before [time [after]]
fn parse_stepwise_line(line: &str) -> std::result::Result<Component, String> {
    let (name, pin1, pin2, number, before, time, after) = finish(
        (
            tag_no_case(".STEPWISE"),
            space1,
            element_name,
            space1,
            node_id,
            space1,
            node_id,
            space1,
            integer,
            space1,
            eng_value,
            opt(preceded(space1, eng_value)),
            opt(preceded(space1, eng_value)),
        )
            .parse(line)
            .map(|(rest, (_, _, name, _, n1, _, n2, _, number, _, before, time, after))| {
                (rest, (name, n1, n2, number, before, time, after))
            }),
        ".STEPWISE directive",
    )?;

    Ok(StepwiseResistor::new(name, pin1, pin2, number, before, time, after).into())
}

#[derive(Debug, Clone, PartialEq)]
enum ComponentOption {
    Stranded(u32, f64),
    Foil(u32, f64),
    ThreeD,
    Open(u32, u32),
    Symmetry(f64),
}

fn component_option(input: &str) -> IResult<&str, ComponentOption> {
    alt((
        map(
            (tag_no_case("STRANDED"), space1, integer, space1, eng_value),
            |(_, _, turns, _, resistance)| ComponentOption::Stranded(turns, resistance),
        ),
        map(
            (tag_no_case("FOIL"), space1, integer, space1, eng_value),
            |(_, _, turns, _, thickness)| ComponentOption::Foil(turns, thickness),
        ),
        map(tag_no_case("3D"), |_: &str| ComponentOption::ThreeD),
        map(
            (tag_no_case("OPEN"), space1, integer, space1, integer),
            |(_, _, a, _, b)| ComponentOption::Open(a, b),
        ),
        map(
            (tag_no_case("SYM"), space1, eng_value),
            |(_, _, coefficient)| ComponentOption::Symmetry(coefficient),
        ),
    ))
    .parse(input)
}

fn master_bodies(input: &str) -> IResult<&str, Vec<MasterBody>> {
    preceded(
        tag_no_case("BODIES="),
        separated_list1(
            char(','),
            map(body_name, |b: &str| match b.parse::<u32>() {
                Ok(id) => MasterBody::Id(id),
                Err(_) => MasterBody::Name(b.to_string()),
            }),
        ),
    )
    .parse(input)
}

/// Parse: .COMPONENT name n1 n2 number BODIES=b1[,b2...] [options...]
fn parse_component_line(line: &str) -> std::result::Result<Component, String> {
    let (name, pin1, pin2, number, bodies, options) = finish(
        (
            tag_no_case(".COMPONENT"),
            space1,
            element_name,
            space1,
            node_id,
            space1,
            node_id,
            space1,
            integer,
            space1,
            master_bodies,
            many0(preceded(space1, component_option)),
            space0,
        )
            .parse(line)
            .map(|(rest, (_, _, name, _, n1, _, n2, _, number, _, bodies, options, _))| {
                (rest, (name, n1, n2, number, bodies, options))
            }),
        ".COMPONENT directive",
    )?;

    let mut builder = FieldComponent::builder(name, pin1, pin2, number, bodies);
    for option in options {
        builder = match option {
            ComponentOption::Stranded(turns, resistance) => builder.stranded(turns, resistance),
            ComponentOption::Foil(turns, thickness) => builder.foil(turns, thickness),
            ComponentOption::ThreeD => builder.three_d(),
            ComponentOption::Open(a, b) => builder.open(a, b),
            ComponentOption::Symmetry(coefficient) => builder.symmetry(coefficient),
        };
    }
    Ok(builder.build().into())
}
