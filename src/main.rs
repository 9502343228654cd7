use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::fs;
use std::path::PathBuf;

mod design;
mod error;
mod mutation;
mod orchestrate;
mod syntax;
mod verify;

use mutation::{Category, ConflictPolicy, DEFAULT_MAX_EXHAUSTIVE_SITES};
use orchestrate::{OrchestratorConfig, PoolConfig, ProverConfig, RunOrchestrator, Summary};
use orchestrate::config::DEFAULT_MAX_CONCURRENCY;
use verify::DEFAULT_PROVER_COMMAND;

// --- Command Line Arguments ---

#[derive(Parser)]
#[command(name = "papercut")]
#[command(about = "papercut - HDL design simplification with equivalence-checked mutations")]
#[command(version)]
#[command(arg_required_else_help = true)]
struct Args {
    /// SystemVerilog source file
    input: PathBuf,

    // --- Papercut categories ---
    /// Narrow internal vector declarations by one bit
    #[arg(long, short = 's')]
    shrink_bits: bool,
    /// Force or delete individual case items
    #[arg(long, short = 'c')]
    delete_case_branch: bool,
    /// Force if statements to one branch
    #[arg(long, short = 'i')]
    remove_if_conditionals: bool,
    /// Force conditional expressions to one arm
    #[arg(long, short = 't')]
    remove_ternary_conditionals: bool,
    /// Also emit every branch combination of the enabled two-branch sites
    #[arg(long, short = 'x')]
    exhaustive: bool,
    /// Largest number of sites enumerated exhaustively
    #[arg(long, default_value_t = DEFAULT_MAX_EXHAUSTIVE_SITES)]
    max_exhaustive_sites: usize,

    // --- Verification ---
    /// Prove every candidate against the base design
    #[arg(long, short = 'e')]
    check_equivalence: bool,
    /// Re-verify the consolidated design against the base
    #[arg(long, short = 'a')]
    apply_all: bool,
    /// Write a design with every rewrite's first branch applied, without proving it
    #[arg(long)]
    apply_all_unverified: bool,
    /// Prover command; {script}, {project} and {wrapper} are substituted
    #[arg(long, default_value = DEFAULT_PROVER_COMMAND)]
    prover_cmd: String,
    /// Maximum number of prover jobs running at once
    #[arg(long, short = 'j', default_value_t = DEFAULT_MAX_CONCURRENCY)]
    jobs: usize,
    /// Fail when two rewrites claim the same node instead of keeping the first
    #[arg(long)]
    strict_conflicts: bool,

    // --- Output ---
    /// Directory for generated designs, wrappers, scripts and logs
    #[arg(long, short = 'o', default_value = "./outputs")]
    output_dir: PathBuf,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn to_config(&self) -> OrchestratorConfig {
        let enabled = [
            (self.shrink_bits, Category::BitShrink),
            (self.delete_case_branch, Category::CaseBranch),
            (self.remove_if_conditionals, Category::Conditional),
            (self.remove_ternary_conditionals, Category::Ternary),
        ];
        let config = enabled
            .into_iter()
            .filter(|(on, _)| *on)
            .fold(OrchestratorConfig::default(), |config, (_, category)| {
                config.with_category(category)
            });
        let policy = if self.strict_conflicts {
            ConflictPolicy::Reject
        } else {
            ConflictPolicy::FirstWins
        };
        config
            .with_output_dir(&self.output_dir)
            .with_exhaustive(self.exhaustive)
            .with_max_exhaustive_sites(self.max_exhaustive_sites)
            .with_check_equivalence(self.check_equivalence)
            .with_apply_all(self.apply_all)
            .with_apply_all_unverified(self.apply_all_unverified)
            .with_conflict_policy(policy)
            .with_pool(PoolConfig::default().with_max_concurrency(self.jobs))
            .with_prover(ProverConfig::default().with_command(self.prover_cmd.clone()))
    }
}

fn print_summary(summary: &Summary) {
    println!("Module: {}", summary.module);
    println!("Sites: {}", summary.sites);
    println!("Candidates: {}", summary.variants.len());
    println!(
        "Mux-encoded design: {} ({} select inputs)",
        summary.muxed.module, summary.muxed.select_count
    );
    if !summary.runs.is_empty() {
        println!(
            "Equivalence checks: {} passed of {}",
            summary.passed(),
            summary.runs.len()
        );
        for run in &summary.runs {
            if let Some(verdict) = run.verdict() {
                println!("  {}: {}", run.wrapper, verdict);
            }
        }
    }
    if let Some(consolidated) = &summary.consolidated {
        println!(
            "Consolidated design: {} ({} applied, {} ambiguous)",
            consolidated.module,
            consolidated.applied.len(),
            consolidated.ambiguous.len()
        );
    }
    println!("Artifacts written to {}", summary.output_dir.display());
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let orchestrator = RunOrchestrator::new(args.to_config());
    let summary = orchestrator
        .run(&source)
        .with_context(|| format!("papercut failed on {}", args.input.display()))?;
    print_summary(&summary);
    Ok(())
}
