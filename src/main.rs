//! meta_agency command-line entry point
//!
//! Runs one objective and prints the execution summary and the answer.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use meta_agency::config::{MemoryBackendKind, ProviderKind};
use meta_agency::{RunOptions, RunOutcome};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Server {
    Remote,
    Local,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Local,
    Cloud,
    Search,
}

#[derive(Debug, Parser)]
#[command(name = "meta_agency")]
#[command(about = "Confidence-driven agent: solve directly, build a tool, or delegate")]
struct Cli {
    /// The objective to work on
    objective: String,

    #[arg(long, env = "AGENCY_MODEL")]
    model: Option<String>,

    #[arg(long, value_enum)]
    server: Option<Server>,

    /// Step budget for the run
    #[arg(long, default_value_t = 10)]
    steps: usize,

    #[arg(long, default_value_t = false)]
    no_thinking: bool,

    #[arg(long)]
    memory_path: Option<PathBuf>,

    #[arg(long, value_enum)]
    memory_backend: Option<Backend>,

    #[arg(long, default_value_t = false)]
    no_memory: bool,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run-level timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// JSON context given to the model with the objective
    #[arg(long, value_parser = parse_context)]
    context: Option<serde_json::Value>,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> RunOptions {
        RunOptions {
            model: self.model.clone(),
            server: self.server.map(|s| match s {
                Server::Remote => ProviderKind::Remote,
                Server::Local => ProviderKind::Local,
            }),
            max_steps: self.steps,
            thinking: !self.no_thinking,
            memory_path: self.memory_path.clone(),
            memory_backend: self.memory_backend.map(|b| match b {
                Backend::Local => MemoryBackendKind::Local,
                Backend::Cloud => MemoryBackendKind::Cloud,
                Backend::Search => MemoryBackendKind::Search,
            }),
            memory_enabled: !self.no_memory,
            verbose: self.verbose,
            run_timeout: self.timeout.map(Duration::from_secs),
            config_path: self.config.clone(),
            context: self.context.clone(),
        }
    }
}

fn parse_context(raw: &str) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(raw)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match meta_agency::run(&cli.objective, cli.options()).await {
        Ok(report) => {
            println!("\n{}", "═".repeat(60));
            println!("Execution summary ({}, confidence {:.2})", report.outcome.as_str(), report.confidence);
            println!("{}", "═".repeat(60));
            print!("{}", report.trace_summary);
            if cli.verbose {
                for step in &report.trace_summary.steps {
                    println!("  {}", step);
                }
            }
            println!("{}\n", "═".repeat(60));
            println!("{}", report.answer);

            match report.outcome {
                RunOutcome::Failure => ExitCode::FAILURE,
                _ => ExitCode::SUCCESS,
            }
        }
        Err(e) => {
            eprintln!("Error ({}): {}", e.kind(), e);
            ExitCode::from(2)
        }
    }
}
