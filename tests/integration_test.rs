//! End-to-end tests: netlist or circuit map in, definitions file out.

use std::collections::BTreeMap;
use std::fs;

use elmer_circuits::error::CircuitError;
use elmer_circuits::generate::{self, Generation};
use elmer_circuits::ir::{circuits, Circuit, Component, FieldComponent, StepwiseResistor};
use elmer_circuits::parser;

/// Helper: generate into a fresh temp dir and return the file contents.
fn generate_text(map: &BTreeMap<u32, Circuit>) -> String {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("circuits.definitions");
    let outcome = generate::generate_definitions(map, &path).expect("generation failed");
    assert!(matches!(outcome, Generation::Written { .. }), "expected a written file");
    fs::read_to_string(&path).expect("read output")
}

fn assert_lines(text: &str, lines: &[&str]) {
    for line in lines {
        assert!(text.lines().any(|l| l == *line), "missing line {:?} in:\n{}", line, text);
    }
}

fn source_and_coil(id: u32, source: &str, volts: f64, coil: &str, number: u32) -> Circuit {
    Circuit::with_branches(
        id,
        vec![vec![
            Component::voltage_source(source, 1, 2, volts),
            FieldComponent::new(coil, 2, 1, number, [number]).into(),
        ]],
    )
}

// ── Single circuit ───────────────────────────────────────────────

#[test]
fn test_source_and_coil_definitions() {
    let mut map = circuits(1);
    map.insert(1, source_and_coil(1, "V1", 1.0, "Coil1", 1));
    let text = generate_text(&map);

    assert_lines(
        &text,
        &[
            "$ Circuits = 1",
            "$ C.1.variables = 5",
            "$ C.1.name.1 = \"i_V1\"",
            "$ C.1.name.2 = \"i_component(1)\"",
            "$ C.1.name.3 = \"v_V1\"",
            "$ C.1.name.4 = \"v_component(1)\"",
            "$ C.1.name.5 = \"u_2_circuit_1\"",
            "$ C.1.source.5 = \"V1_Source\"",
            "$ C.1.B(0,0) = -1",
            "$ C.1.B(0,1) = 1",
            "$ C.1.B(1,2) = 1",
            "$ C.1.B(1,4) = -1",
            "$ C.1.B(2,3) = -1",
            "$ C.1.B(2,4) = 1",
            "$ C.1.B(4,2) = 1",
            "  Coil Type = \"Massive\"",
            "    Real MATC \"V1\"",
        ],
    );
    // the coil's own constitutive row is left to the solver
    assert!(!text.contains("$ C.1.B(3,"), "row 3 is reserved:\n{}", text);
}

#[test]
fn test_sources_only_writes_nothing() {
    let mut map = circuits(1);
    map.get_mut(&1).unwrap().add_branch(vec![
        Component::voltage_source("V1", 1, 2, 1.0),
        Component::resistor("R1", 2, 1, 10.0),
    ]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("circuits.definitions");
    let outcome = generate::generate_definitions(&map, &path).unwrap();
    assert_eq!(outcome, Generation::Skipped);
    assert!(!path.exists());
}

// ── Multiple circuits ────────────────────────────────────────────

#[test]
fn test_two_circuits() {
    let mut map = circuits(2);
    map.insert(1, source_and_coil(1, "V1", 1.0, "Coil1", 1));
    map.insert(2, source_and_coil(2, "V2", 5.0, "Coil2", 2));
    let text = generate_text(&map);

    assert_lines(
        &text,
        &[
            "$ Circuits = 2",
            "$ V2 = 5.0",
            "$ C.2.name.5 = \"u_2_circuit_2\"",
            "$ C.2.source.5 = \"V2_Source\"",
            "Component 2",
            "  Name = \"Coil2\"",
            "! End of circuit 1",
            "! End of circuit 2",
        ],
    );
    assert!(text.find("! End of circuit 1").unwrap() < text.find("$ C.2.variables").unwrap());
}

#[test]
fn test_mixed_run_skips_only_empty_circuits() {
    let mut map = circuits(2);
    map.get_mut(&1)
        .unwrap()
        .add_branch(vec![Component::voltage_source("V1", 1, 2, 1.0), Component::resistor("R1", 2, 1, 1.0)]);
    map.insert(2, source_and_coil(2, "V2", 5.0, "Coil2", 2));
    let text = generate_text(&map);

    assert_lines(&text, &["$ Circuits = 1", "$ C.2.variables = 5"]);
    assert!(!text.contains("C.1."));
}

#[test]
fn test_failure_leaves_no_file() {
    let mut map = circuits(2);
    map.insert(1, source_and_coil(1, "V1", 1.0, "Coil1", 1));
    // pin1 == pin2
    map.insert(
        2,
        Circuit::with_branches(2, vec![vec![FieldComponent::new("Bad", 1, 1, 2, [2u32]).into()]]),
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("circuits.definitions");
    let result = generate::generate_definitions(&map, &path);
    assert!(matches!(result, Err(CircuitError::Structural(_))));
    assert!(!path.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

// ── Stepwise resistors ───────────────────────────────────────────

#[test]
fn test_stepwise_resistor_switched_and_constant() {
    let mut map = circuits(2);
    map.get_mut(&1).unwrap().add_branch(vec![
        Component::voltage_source("V1", 1, 2, 1.0),
        StepwiseResistor::new("S1", 2, 1, 3, 1e6, Some(0.5), Some(1e-3)).into(),
    ]);
    map.get_mut(&2).unwrap().add_branch(vec![
        Component::current_source("I2", 1, 2, 1.0),
        StepwiseResistor::constant("S2", 2, 1, 4, 10.0).into(),
    ]);
    let text = generate_text(&map);

    assert_lines(
        &text,
        &[
            "$ Circuits = 2",
            "Component 3",
            "  Resistance = Variable time",
            "    Real MATC \"if(tx<0.5){1000000.0} else {0.001}\"",
            "Component 4",
            "  Resistance = 10.0",
            "$ C.1.name.2 = \"i_component(3)\"",
        ],
    );
}

// ── Determinism ──────────────────────────────────────────────────

#[test]
fn test_output_is_deterministic() {
    let mut map = circuits(2);
    map.insert(1, source_and_coil(1, "V1", 1.0, "Coil1", 1));
    map.insert(
        2,
        Circuit::with_branches(
            2,
            vec![
                vec![Component::voltage_source("V2", 1, 2, 5.0), Component::inductor("L1", 2, 3, 1e-3)],
                vec![FieldComponent::builder("Coil2", 3, 1, 2, [2u32]).foil(20, 1e-4).build().into()],
            ],
        ),
    );

    let first = generate_text(&map);
    let second = generate_text(&map);
    assert_eq!(first, second);
}

// ── Netlist front end ────────────────────────────────────────────

#[test]
fn test_netlist_to_definitions() {
    let netlist = "\
* two coils, one with a lumped inductor in series
.CIRCUIT 1
V1 1 2 1
.COMPONENT Coil1 2 1 1 BODIES=1
.CIRCUIT 2
V2 1 2 5
L1 2 3 1m
.BRANCH
.COMPONENT Coil2 3 1 2 BODIES=2,core STRANDED 100 0.2
.END
";
    let map = parser::parse(netlist).expect("parse failed");
    let text = generate_text(&map);

    assert_lines(
        &text,
        &[
            "$ Circuits = 2",
            "$ C.1.B(4,2) = 1",
            "$ L1 = 0.001",
            "$ Ns_Coil2 = 100",
            "$ Rs_Coil2 = 0.2",
            "  Coil Type = \"Stranded\"",
            "  Master Bodies Name = String \"core\"",
        ],
    );
}

#[test]
fn test_netlist_errors_surface() {
    let result = parser::parse(".CIRCUIT 1\nV1 1 2\n");
    assert!(matches!(result, Err(CircuitError::Parse(_))));

    let map = parser::parse(".CIRCUIT 1\n.COMPONENT A 1 2 1 BODIES=1\n.COMPONENT B 2 1 1 BODIES=1\n").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let result = generate::generate_definitions(&map, dir.path().join("out.definitions"));
    assert!(matches!(result, Err(CircuitError::Structural(_))));
}
