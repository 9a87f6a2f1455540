use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::bridge::{Bridge, JournalEvent, Registry};
use crate::config::Config;
use crate::interpreter::asm::{self, ValidationError};
use crate::interpreter::{Library, Outcome, Value, Vm};
use crate::stdlib;

#[derive(Parser)]
#[command(name = "rebound")]
#[command(about = "Rebound - re-entrant native calls for a small stack VM", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Assemble and run a program
    Run {
        /// Program source file
        file: PathBuf,

        /// Procedure to start from
        #[arg(short = 'e', long = "entry", default_value = "main")]
        entry: String,

        /// Print bridge events as JSON lines after the run
        #[arg(long)]
        journal: bool,
    },

    /// Assemble and validate a program without running it
    Check {
        /// Program source file
        file: PathBuf,

        /// Report problems as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the built-in native routines
    Routines,

    /// Print the effective configuration
    Config,
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunReport {
    pub outcome: Outcome,
    /// Values written by the `log` instruction
    pub logged: Vec<Value>,
    pub journal: Vec<JournalEvent>,
    pub steps: u64,
}

/// Run the CLI by parsing process arguments
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli)
}

/// Run the CLI with provided arguments
pub fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli)
}

fn run_cli_with_args(cli: Cli) -> Result<()> {
    let journal = match &cli.command {
        Commands::Run { journal: true, .. } => Some(true),
        _ => None,
    };

    // Load before anything else so config errors surface first
    let config = Config::builder()
        .config_path(cli.config.clone())
        .journal(journal)
        .build()?;
    init_logging(&config);

    match cli.command {
        Commands::Run { file, entry, .. } => {
            let source = read_source(&file)?;
            let report = execute(&source, &entry, &config)?;

            if config.bridge.journal {
                for event in &report.journal {
                    println!("{}", serde_json::to_string(event)?);
                }
            }

            match report.outcome {
                Outcome::Returned(Some(value)) => println!("{}", value),
                Outcome::Returned(None) => {}
                Outcome::Faulted(fault) => {
                    anyhow::bail!("`{}` faulted after {} steps: {}", entry, report.steps, fault);
                }
            }
        }

        Commands::Check { file, json } => {
            let source = read_source(&file)?;
            let problems = check(&source)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&problems)?);
            } else if problems.is_empty() {
                println!("✓ {}", file.display());
            } else {
                for problem in &problems {
                    println!("{}", problem);
                }
            }

            if !problems.is_empty() {
                anyhow::bail!("{} problem(s) in {}", problems.len(), file.display());
            }
        }

        Commands::Routines => {
            let registry = stdlib::registry()?;
            for routine in registry.descriptors() {
                println!(
                    "  #{:<3} {:<16} ({}) {:?}",
                    routine.id,
                    routine.name,
                    routine.params.join(", "),
                    routine.mode
                );
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Install the global subscriber: `RUST_LOG` wins over the configured filter
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));

    // A subscriber may already be set when embedded; keep it
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Assemble `source`, resolving native names through `registry`
fn assemble(source: &str, registry: &Registry) -> Result<Library> {
    asm::assemble_library(source, &registry.symbols()).context("Failed to assemble program")
}

/// Run `entry` from `source` with the built-in routines installed
pub fn execute(source: &str, entry: &str, config: &Config) -> Result<RunReport> {
    let registry = stdlib::registry()?;
    let library = assemble(source, &registry)?;
    let program = library
        .get(entry)
        .with_context(|| format!("No procedure named `{}`", entry))?;

    let bridge = Bridge::with_config(registry, &config.bridge).with_library(library);
    let mut vm = Vm::new(config.vm.clone());
    bridge.install(&mut vm);
    vm.load_entry(program);

    let outcome = vm.run().context("Interpreter stopped")?;
    Ok(RunReport {
        outcome,
        logged: vm.logged().to_vec(),
        journal: bridge.journal(),
        steps: vm.steps(),
    })
}

/// Assemble `source` and validate every procedure
pub fn check(source: &str) -> Result<Vec<ValidationError>> {
    let registry = stdlib::registry()?;
    let library = assemble(source, &registry)?;

    let mut names: Vec<&str> = library.names().collect();
    names.sort_unstable();

    let mut problems = Vec::new();
    for name in names {
        if let Some(program) = library.get(name) {
            problems.extend(asm::validate(&program, |id| registry.contains(id)));
        }
    }
    Ok(problems)
}
