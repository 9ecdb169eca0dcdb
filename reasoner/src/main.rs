//! Bounded multi-step reasoning engine CLI.
//!
//! Configuration lives in a TOML file (`reasoner.toml` by default). Results
//! are printed to stdout as JSON; diagnostics go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use reasoner::core::budget::token_budget;
use reasoner::core::selector::{AdvancedSelector, StrategySelector, build_selector};
use reasoner::core::types::{ReasoningSystemDescriptor, ResourceConstraints, ScoredStrategy};
use reasoner::exit_codes;
use reasoner::io::config::{EngineConfig, load_config, write_config};
use reasoner::io::gateway::CommandGateway;
use reasoner::io::optimizer::HeuristicOptimizer;
use reasoner::logging;
use reasoner::orchestrator::{ProcessOptions, StepOrchestrator};

const DEFAULT_MODEL: &str = "claude-sonnet";

#[derive(Parser)]
#[command(
    name = "reasoner",
    version,
    about = "Bounded multi-step reasoning engine"
)]
struct Cli {
    /// Path to the engine configuration file.
    #[arg(long, global = true, default_value = "reasoner.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the reasoning system chosen for a problem with all candidate scores.
    Select {
        problem: String,
        /// Model used to derive the token budget.
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
    },
    /// Process a problem step by step and print the result.
    Run {
        problem: String,
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
        /// Step limit (defaults to `engine.max_steps_default`).
        #[arg(long)]
        max_steps: Option<usize>,
        /// Derive the token budget from the model and shrink prompts to fit.
        #[arg(long)]
        optimize: bool,
        /// Record adjustments and feed guidance into later steps.
        #[arg(long)]
        adjust: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Select { problem, model } => cmd_select(&cli.config, &problem, &model),
        Command::Run {
            problem,
            model,
            max_steps,
            optimize,
            adjust,
        } => cmd_run(
            &cli.config,
            &problem,
            &model,
            ProcessOptions {
                max_steps,
                optimize_tokens: optimize,
                enable_dynamic_adjustment: adjust,
                cancel: None,
            },
        ),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &EngineConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(exit_codes::OK)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SelectReport {
    selector: &'static str,
    selected: ReasoningSystemDescriptor,
    candidates: Vec<ScoredStrategy>,
}

fn cmd_select(path: &Path, problem: &str, model: &str) -> Result<i32> {
    let cfg = load_config(path)?;
    let constraints = ResourceConstraints {
        parallel_capacity: cfg.resources.parallel_capacity,
        remaining_tokens: token_budget(
            cfg.model_limits(model),
            true,
            cfg.engine.max_tokens_per_step,
            cfg.engine.fallback_token_budget,
        ),
        time_budget_ms: cfg.engine.time_budget_ms,
    };
    let selector = build_selector(&cfg.reasoning_systems, constraints);
    let candidates = AdvancedSelector::new(cfg.reasoning_systems.clone(), constraints)
        .map(|advanced| advanced.score_candidates(problem))
        .unwrap_or_default();
    let report = SelectReport {
        selector: selector.kind(),
        selected: selector.select_reasoning_system(problem),
        candidates,
    };
    print_json(&report)?;
    Ok(exit_codes::OK)
}

fn cmd_run(path: &Path, problem: &str, model: &str, options: ProcessOptions) -> Result<i32> {
    let cfg = load_config(path)?;
    let gateway = CommandGateway::new(cfg.gateway.command.clone(), cfg.gateway.output_limit_bytes)?;
    let optimizer = HeuristicOptimizer;
    let result = StepOrchestrator::new(&gateway, &optimizer, &cfg).process_problem(
        problem, model, &options,
    );
    print_json(&result)?;
    if result.is_error() {
        return Ok(exit_codes::RUN_ERROR);
    }
    Ok(exit_codes::OK)
}

/// Print `value` to stdout as pretty JSON.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["reasoner", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, PathBuf::from("reasoner.toml"));
    }

    #[test]
    fn parse_run_with_options() {
        let cli = Cli::parse_from([
            "reasoner",
            "--config",
            "custom.toml",
            "run",
            "Plan a system architecture",
            "--max-steps",
            "3",
            "--optimize",
        ]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        match cli.command {
            Command::Run {
                problem,
                model,
                max_steps,
                optimize,
                adjust,
            } => {
                assert_eq!(problem, "Plan a system architecture");
                assert_eq!(model, DEFAULT_MODEL);
                assert_eq!(max_steps, Some(3));
                assert!(optimize);
                assert!(!adjust);
            }
            _ => panic!("expected run command"),
        }
    }
}
