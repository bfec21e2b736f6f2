use clap::Parser;
use elmer_circuits::generate::{self, Generation};
use elmer_circuits::parser;
use std::path::PathBuf;

/// Generate Elmer circuit definitions from a circuit netlist
#[derive(Parser)]
#[command(name = "elmer-circuits", version)]
struct Cli {
    /// Circuit netlist file
    netlist: PathBuf,

    /// Output definitions file
    #[arg(short, long, default_value = "circuits.definitions")]
    output: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let input = std::fs::read_to_string(&cli.netlist).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", cli.netlist.display(), e);
        std::process::exit(1);
    });

    let circuits = parser::parse(&input).unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });

    let generation = generate::generate_definitions(&circuits, &cli.output).unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });

    match generation {
        Generation::Written { path, circuits } => {
            eprintln!("Wrote {} circuit(s) to {}", circuits, path.display());
        }
        Generation::Skipped => {
            eprintln!("No circuit has field-coupled elements; nothing written");
        }
    }
}
