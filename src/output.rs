//! Circuit definition output (Elmer `.definitions` / SIF syntax).
//!
//! Layout per document:
//! ```text
//! $ Circuits = 1
//! ! parameters, matrix sizes, unknowns, sources
//! $ C.1.B(0,0) = -1          KCL, KVL, component equations
//! Component 1 ... End        one block per solver component
//! Body Force 1 ... End       source expressions
//! ```
//! Everything is read from the assembled circuits; no indexing is decided here.

use std::io::Write;

use crate::compiler::{AssembledCircuit, Parameter, Stamp};
use crate::error::Result;
use crate::ir::{format_real, CoilType, Component, Dimension, FieldComponent, MasterBody, StepwiseResistor, Terminals};

const RULE: &str = "! -----------------------------------------------------------------------------";

/// Write the complete definitions document for the given circuits.
pub fn write_definitions<W: Write>(circuits: &[AssembledCircuit], writer: &mut W) -> Result<()> {
    writeln!(writer, "{}", RULE)?;
    writeln!(writer, "! Circuit definitions")?;
    writeln!(writer, "{}", RULE)?;
    writeln!(writer, "$ Circuits = {}", circuits.len())?;

    for (index, circuit) in circuits.iter().enumerate() {
        write_circuit(circuit, index + 1, writer)?;
    }
    Ok(())
}

fn write_circuit<W: Write>(circuit: &AssembledCircuit, body_force: usize, writer: &mut W) -> Result<()> {
    let id = circuit.circuit_id;
    let size = circuit.layout.size();

    writeln!(writer)?;
    writeln!(writer, "{}", RULE)?;
    writeln!(writer, "! Circuit {}", id)?;
    writeln!(writer, "{}", RULE)?;

    writeln!(writer)?;
    writeln!(writer, "! Parameters")?;
    write_parameters(&circuit.component_parameters, writer)?;
    write_parameters(&circuit.circuit_parameters, writer)?;

    writeln!(writer)?;
    writeln!(writer, "! Matrix size declaration and initialization")?;
    writeln!(writer, "$ C.{}.variables = {}", id, size)?;
    writeln!(writer, "$ C.{}.A = zeros({},{})", id, size, size)?;
    writeln!(writer, "$ C.{}.B = zeros({},{})", id, size, size)?;

    writeln!(writer)?;
    writeln!(writer, "! Unknowns")?;
    for (k, name) in circuit.layout.unknown_names.iter().enumerate() {
        writeln!(writer, "$ C.{}.name.{} = {}", id, k + 1, name)?;
    }

    writeln!(writer)?;
    writeln!(writer, "! Source vector")?;
    for (row, label) in &circuit.equations.sources {
        writeln!(writer, "$ C.{}.source.{} = \"{}\"", id, row + 1, label)?;
    }

    writeln!(writer)?;
    writeln!(writer, "! KCL equations")?;
    write_stamps(id, &circuit.equations.kcl, writer)?;
    writeln!(writer, "! KVL equations")?;
    write_stamps(id, &circuit.equations.kvl, writer)?;
    writeln!(writer, "! Component equations")?;
    write_stamps(id, &circuit.equations.constitutive, writer)?;

    writeln!(writer)?;
    writeln!(writer, "! Solver additions")?;
    for component in circuit.solver_components() {
        match component {
            Component::Field(fc) => write_field_component(fc, writer)?,
            Component::Stepwise(r) => write_stepwise_resistor(r, writer)?,
            _ => {}
        }
    }

    if !circuit.equations.sources.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Body Force {}", body_force)?;
        writeln!(writer, "  Name = \"Circuit_{}\"", id)?;
        for (row, label) in &circuit.equations.sources {
            let branch = row_source_branch(circuit, *row);
            writeln!(writer, "  {} = Variable \"time\"", label)?;
            writeln!(writer, "    Real MATC \"{}\"", branch)?;
        }
        writeln!(writer, "End")?;
    }

    writeln!(writer)?;
    writeln!(writer, "! End of circuit {}", id)?;
    Ok(())
}

/// Name of the source whose constitutive equation sits on `row`.
fn row_source_branch(circuit: &AssembledCircuit, row: usize) -> &str {
    circuit
        .layout
        .component_rows
        .iter()
        .position(|r| *r == Some(row))
        .map(|e| circuit.components[e].name())
        .unwrap_or_default()
}

fn write_parameters<W: Write>(params: &[Parameter], writer: &mut W) -> Result<()> {
    for param in params {
        writeln!(writer, "$ {} = {}", param.name, param.value)?;
    }
    Ok(())
}

fn write_stamps<W: Write>(id: u32, stamps: &[Stamp], writer: &mut W) -> Result<()> {
    for stamp in stamps {
        writeln!(
            writer,
            "$ C.{}.{}({},{}) = {}",
            id, stamp.target, stamp.row, stamp.col, stamp.coefficient
        )?;
    }
    Ok(())
}

fn write_field_component<W: Write>(fc: &FieldComponent, writer: &mut W) -> Result<()> {
    writeln!(writer, "Component {}", fc.component_number)?;
    writeln!(writer, "  Name = \"{}\"", fc.name)?;

    let ids: Vec<String> = fc
        .master_bodies
        .iter()
        .filter_map(|b| match b {
            MasterBody::Id(id) => Some(id.to_string()),
            MasterBody::Name(_) => None,
        })
        .collect();
    if !ids.is_empty() {
        writeln!(writer, "  Master Bodies({}) = Integer {}", ids.len(), ids.join(" "))?;
    }
    for body in &fc.master_bodies {
        if let MasterBody::Name(name) = body {
            writeln!(writer, "  Master Bodies Name = String \"{}\"", name)?;
        }
    }

    writeln!(writer, "  Coil Type = \"{}\"", fc.coil_type_name())?;
    writeln!(writer, "  Number of Turns = Real $ Ns_{}", fc.name)?;
    match fc.coil_type() {
        CoilType::Stranded { .. } => writeln!(writer, "  Resistance = Real $ Rs_{}", fc.name)?,
        CoilType::Foil { .. } => writeln!(writer, "  Coil Thickness = Real $ L_{}", fc.name)?,
        CoilType::Massive => {}
    }
    writeln!(
        writer,
        "  Symmetry Coefficient = Real {}",
        format_real(fc.symmetry_coefficient())
    )?;
    if fc.dimension() == Dimension::ThreeD {
        writeln!(writer, "  Coil Use W Vector = Logical True")?;
    }
    if let Terminals::Open(a, b) = fc.terminals() {
        writeln!(writer, "  Electrode Boundaries(2) = Integer {} {}", a, b)?;
    }
    writeln!(writer, "End")?;
    writeln!(writer)?;
    Ok(())
}

fn write_stepwise_resistor<W: Write>(r: &StepwiseResistor, writer: &mut W) -> Result<()> {
    writeln!(writer, "Component {}", r.component_number)?;
    writeln!(writer, "  Name = \"{}\"", r.name)?;
    writeln!(writer, "  Component Type = String Resistor")?;
    if r.is_switched() {
        writeln!(writer, "  Resistance = Variable time")?;
        writeln!(writer, "    Real MATC \"{}\"", r.resistance())?;
    } else {
        writeln!(writer, "  Resistance = {}", r.resistance())?;
    }
    writeln!(writer, "End")?;
    writeln!(writer)?;
    Ok(())
}
