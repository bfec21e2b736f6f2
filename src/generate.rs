//! Multi-circuit generation: assemble every circuit, render one document,
//! write it in a single scoped operation.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::compiler::{compile, AssembledCircuit};
use crate::error::{CircuitError, Result};
use crate::ir::Circuit;
use crate::output;

/// Outcome of [`generate_definitions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Written { path: PathBuf, circuits: usize },
    /// No circuit had a field-coupled element; no file was written.
    Skipped,
}

/// Assemble circuits in ascending id order. Circuits without a field-coupled
/// element are skipped; any assembly error aborts the whole run.
pub fn assemble_circuits(circuits: &BTreeMap<u32, Circuit>) -> Result<Vec<AssembledCircuit>> {
    let mut assembled = Vec::new();
    let mut component_owners: HashMap<u32, u32> = HashMap::new();

    for (&key, circuit) in circuits {
        if key != circuit.id {
            return Err(CircuitError::Structural(format!(
                "circuit keyed as {} declares id {}",
                key, circuit.id
            )));
        }
        if !circuit.has_field_elements() {
            tracing::info!(circuit_id = circuit.id, "no field-coupled elements, skipping circuit");
            continue;
        }

        let compiled = compile(circuit)?;
        for number in compiled.solver_components().filter_map(|c| c.component_number()) {
            if let Some(other) = component_owners.insert(number, circuit.id) {
                tracing::warn!(
                    component_number = number,
                    first = other,
                    second = circuit.id,
                    "component number used by more than one circuit"
                );
            }
        }
        assembled.push(compiled);
    }

    Ok(assembled)
}

/// Assemble all circuits and write their definitions to `path`.
///
/// Nothing touches the filesystem until every circuit has assembled and the
/// document is rendered. The file is written to a temporary sibling and
/// renamed into place, so an interrupted write never leaves a partial file.
pub fn generate_definitions(circuits: &BTreeMap<u32, Circuit>, path: impl AsRef<Path>) -> Result<Generation> {
    let path = path.as_ref();
    let _span = tracing::info_span!("generate_definitions", path = %path.display()).entered();

    let assembled = assemble_circuits(circuits)?;
    if assembled.is_empty() {
        tracing::info!("no circuit has field-coupled elements, nothing written");
        return Ok(Generation::Skipped);
    }

    let mut buf = Vec::new();
    output::write_definitions(&assembled, &mut buf)?;
    write_atomically(path, &buf)?;

    tracing::info!(circuits = assembled.len(), bytes = buf.len(), "wrote circuit definitions");
    Ok(Generation::Written {
        path: path.to_path_buf(),
        circuits: assembled.len(),
    })
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| CircuitError::Write(e.error))?;
    Ok(())
}
