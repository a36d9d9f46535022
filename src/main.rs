//! meshspec CLI - Command-line interface
//!
//! Commands:
//!   validate - Check a spec and report every problem
//!   parse    - Print the AST of a formula
//!   graph    - Print the dependency graph
//!   impact   - What depends on an element
//!   slice    - What one function needs
//!   schema   - JSON Schema of an output type

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "meshspec", version, about = "Static analysis for declarative application specs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a spec
    Validate {
        /// Spec file (.yaml or .json)
        spec: PathBuf,
        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
        /// JSON output
        #[arg(long)]
        json: bool,
    },
    /// Parse a formula and print its AST as JSON
    Parse {
        formula: String,
    },
    /// Print the dependency graph of a spec
    Graph {
        spec: PathBuf,
        /// Mermaid flowchart instead of JSON
        #[arg(long)]
        mermaid: bool,
    },
    /// Analyze the impact of changing an element
    Impact {
        spec: PathBuf,
        /// Node kind (entity, field, derived, function, scenario, ...)
        kind: String,
        /// Element name (fields as Entity.field)
        name: String,
        /// Change type (add, modify, remove)
        #[arg(long, default_value = "modify")]
        change: String,
        /// JSON output
        #[arg(long)]
        json: bool,
    },
    /// Print the slice of a spec one function depends on
    Slice {
        spec: PathBuf,
        function: String,
    },
    /// Print JSON schema for an output type
    Schema {
        /// spec, config, expression, validate, impact, slice
        name: Option<String>,
    },
}

fn init_tracing() {
    // stdout carries command output; logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { spec, strict, json } => cli::cmd_validate(&spec, strict, json),
        Commands::Parse { formula } => cli::cmd_parse(&formula),
        Commands::Graph { spec, mermaid } => cli::cmd_graph(&spec, mermaid),
        Commands::Impact {
            spec,
            kind,
            name,
            change,
            json,
        } => cli::cmd_impact(&spec, &kind, &name, &change, json),
        Commands::Slice { spec, function } => cli::cmd_slice(&spec, &function),
        Commands::Schema { name } => cli::cmd_schema(name.as_deref()),
    };

    match result {
        Ok(cli::Outcome::Success) => ExitCode::SUCCESS,
        Ok(cli::Outcome::Failure) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}
