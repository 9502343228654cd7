//! The end-to-end papercut pipeline
//!
//! Concretize the input, locate sites, write every candidate design, and
//! when verification is enabled prove each candidate against the base on a
//! bounded worker pool before folding the passing branches into one
//! consolidated design.

pub mod config;
pub mod consolidate;
pub mod pool;
pub mod report;
pub mod run;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

pub use config::{OrchestratorConfig, PoolConfig, ProverConfig};
pub use consolidate::{Consolidated, apply_all_unverified, consolidate};
pub use pool::{PoolReport, WorkerPool};
pub use report::{Report, RunRecord};
pub use run::{Run, RunOrigin, RunState};

use crate::design::{concretize, module_name};
use crate::error::{PapercutError, Result};
use crate::mutation::{MuxEncoder, MuxedDesign, RewriteSet, SiteLocator, Variant, VariantGenerator};
use crate::syntax::SyntaxTree;
use crate::verify::{ProofJob, ProofOutcome, Prover, ScriptProver, render_script, render_wrapper, wrapper_name};

/// What a pipeline run produced
#[derive(Debug)]
pub struct Summary {
    pub module: String,
    pub output_dir: PathBuf,
    pub sites: usize,
    /// Names of every written candidate design
    pub variants: Vec<String>,
    pub muxed: MuxedDesign,
    /// Verification runs in submission order; empty without verification
    pub runs: Vec<Run>,
    pub consolidated: Option<Consolidated>,
}

impl Summary {
    pub fn passed(&self) -> usize {
        self.runs.iter().filter(|r| r.passed()).count()
    }
}

/// A verification job waiting for the pool
struct PendingCheck {
    run: Run,
    job: Option<ProofJob>,
}

pub struct RunOrchestrator<P: Prover = ScriptProver> {
    config: OrchestratorConfig,
    prover: P,
}

impl RunOrchestrator<ScriptProver> {
    pub fn new(config: OrchestratorConfig) -> Self {
        let prover = ScriptProver::new(config.prover.command.clone());
        Self { config, prover }
    }
}

impl<P: Prover> RunOrchestrator<P> {
    pub fn with_prover(config: OrchestratorConfig, prover: P) -> Self {
        Self { config, prover }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the whole pipeline on one design.
    pub fn run(&self, source: &str) -> Result<Summary> {
        let base = SyntaxTree::parse(source)?;
        let concretized = concretize(&base)?;
        let tree = concretized.tree;
        let module = module_name(&tree)?;
        let dir = self.config.output_dir.clone();

        prepare_output_dir(&dir)?;
        let base_file = format!("{}_concretized.sv", module);
        write_artifact(&dir, &base_file, tree.source())?;

        let sites = SiteLocator::new(&tree).locate_all(&self.config.categories);
        let rewrites = RewriteSet::from_sites(&tree, &sites)?;
        info!(
            module = %module,
            sites = sites.len(),
            rewrites = rewrites.len(),
            selects = rewrites.total_selections(),
            "Located papercut sites"
        );

        let generator = VariantGenerator::new(&tree, &rewrites);
        let mut variants = generator.per_branch()?;
        if self.config.exhaustive {
            match generator.exhaustive(self.config.max_exhaustive_sites) {
                Ok(combinations) => variants.extend(combinations),
                Err(e @ PapercutError::TooManyCombinations { .. }) => {
                    warn!("Skipping exhaustive variants: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        let mut written = Vec::with_capacity(variants.len());
        for variant in &variants {
            let file = format!("{}.sv", variant.name());
            match write_artifact(&dir, &file, variant.source()) {
                Ok(_) => written.push(true),
                Err(e) => {
                    warn!(variant = %variant.name(), "{}", e);
                    written.push(false);
                }
            }
        }

        let muxed = MuxEncoder::new()
            .with_policy(self.config.conflict_policy)
            .encode(&tree, &rewrites)?;
        let muxed_file = format!("{}.sv", muxed.module);
        let muxed_written = write_or_warn(&dir, &muxed_file, muxed.tree.source());

        if self.config.apply_all_unverified {
            let unverified = apply_all_unverified(&tree, &rewrites)?;
            write_or_warn(&dir, &format!("{}.sv", unverified.module), unverified.tree.source());
        }

        let mut summary = Summary {
            module: module.clone(),
            output_dir: dir.clone(),
            sites: sites.len(),
            variants: variants.iter().map(|v| v.name().to_string()).collect(),
            muxed,
            runs: Vec::new(),
            consolidated: None,
        };
        if !self.config.check_equivalence {
            info!(variants = summary.variants.len(), "Wrote candidate designs");
            return Ok(summary);
        }

        let mut checks = Vec::new();
        for (variant, ok) in variants.iter().zip(&written) {
            let origin = origin_of(variant);
            let file = format!("{}.sv", variant.name());
            let check = if *ok {
                self.prepare_check(
                    checks.len(),
                    &tree,
                    &base_file,
                    variant.name(),
                    variant.source(),
                    &file,
                    origin,
                    &HashMap::new(),
                )
            } else {
                PendingCheck::unwritten(checks.len(), variant.name(), origin)
            };
            checks.push(check);
        }
        if !rewrites.is_empty() {
            let check = if muxed_written {
                let ties: HashMap<String, bool> = summary.muxed.neutral_ties().into_iter().collect();
                self.prepare_check(
                    checks.len(),
                    &tree,
                    &base_file,
                    &summary.muxed.module,
                    summary.muxed.tree.source(),
                    &muxed_file,
                    RunOrigin::Muxed,
                    &ties,
                )
            } else {
                PendingCheck::unwritten(checks.len(), &summary.muxed.module, RunOrigin::Muxed)
            };
            checks.push(check);
        }
        let mut runs = self.execute(checks);

        let consolidated = consolidate(&tree, &rewrites, &runs)?;
        let consolidated_file = format!("{}.sv", consolidated.module);
        let consolidated_written =
            write_or_warn(&dir, &consolidated_file, consolidated.tree.source());

        if self.config.apply_all {
            let check = if consolidated_written {
                self.prepare_check(
                    runs.len(),
                    &tree,
                    &base_file,
                    &consolidated.module,
                    consolidated.tree.source(),
                    &consolidated_file,
                    RunOrigin::Consolidated,
                    &HashMap::new(),
                )
            } else {
                PendingCheck::unwritten(runs.len(), &consolidated.module, RunOrigin::Consolidated)
            };
            runs.extend(self.execute(vec![check]));
        }

        write_or_warn(&dir, report::SUMMARY_FILE, &report::render_summary(&runs));
        let json = Report {
            module: module.clone(),
            parameters: concretized.parameters,
            sites: sites.len(),
            select_count: summary.muxed.select_count,
            runs: runs.iter().map(RunRecord::from).collect(),
            consolidation: Some((&consolidated).into()),
            mux_conflicts: summary.muxed.conflicts.clone(),
        };
        let json_path = dir.join(report::REPORT_FILE);
        if let Err(e) = json.write_json(&json_path) {
            warn!("{}", PapercutError::io(json_path, e));
        }

        summary.runs = runs;
        summary.consolidated = Some(consolidated);
        info!(
            runs = summary.runs.len(),
            passed = summary.passed(),
            "Verification finished"
        );
        Ok(summary)
    }

    /// Write the wrapper and script for one design and describe its proof job.
    #[allow(clippy::too_many_arguments)]
    fn prepare_check(
        &self,
        id: usize,
        base: &SyntaxTree,
        base_file: &str,
        name: &str,
        source: &str,
        design_file: &str,
        origin: RunOrigin,
        ties: &HashMap<String, bool>,
    ) -> PendingCheck {
        let wrapper = wrapper_name(name);
        let run = Run::new(id, name, wrapper.clone(), origin);
        let prepared = SyntaxTree::parse(source)
            .map_err(PapercutError::from)
            .and_then(|mutated| render_wrapper(base, &mutated, ties))
            .and_then(|rendered| {
                let dir = &self.config.output_dir;
                let wrapper_file = format!("{}.sv", rendered.name);
                write_artifact(dir, &wrapper_file, &rendered.source)?;
                let files = vec![base_file.to_string(), design_file.to_string(), wrapper_file];
                let script_file = format!("{}.tcl", rendered.name);
                write_artifact(dir, &script_file, &render_script(&rendered.name, &files))?;
                Ok(ProofJob {
                    wrapper: rendered.name,
                    script: script_file,
                    project: format!("{}_jgproject", name),
                    workdir: dir.clone(),
                })
            });
        match prepared {
            Ok(job) => PendingCheck { run, job: Some(job) },
            Err(e) => {
                warn!(design = %name, "Cannot prepare equivalence check: {}", e);
                PendingCheck { run, job: None }
            }
        }
    }

    /// Prove every prepared check on the pool and record the outcomes.
    fn execute(&self, checks: Vec<PendingCheck>) -> Vec<Run> {
        let pool = WorkerPool::new(self.config.pool.clone());
        let mut runs = Vec::with_capacity(checks.len());
        let mut jobs = Vec::new();
        for check in checks {
            let mut run = check.run;
            let job = match check.job {
                Some(job) => job,
                None => {
                    if let Err(e) = run.record(ProofOutcome::failed("artifacts could not be written")) {
                        warn!("{}", e);
                    }
                    runs.push(run);
                    continue;
                }
            };
            if let Err(e) = run.mark_running() {
                warn!("{}", e);
            }
            jobs.push((runs.len(), job));
            runs.push(run);
        }
        if jobs.is_empty() {
            return runs;
        }

        info!(
            jobs = jobs.len(),
            max_concurrency = self.config.pool.max_concurrency,
            "Running equivalence checks"
        );
        let report = pool.execute(jobs, |_, (slot, job)| (slot, self.prover.prove(&job)));
        for (slot, outcome) in report.results {
            let run = &mut runs[slot];
            let log = format!("{}_output.log", run.wrapper);
            if let Err(e) = write_artifact(&self.config.output_dir, &log, &outcome.output) {
                warn!(run = %run.name, "{}", e);
            }
            info!(run = %run.name, verdict = %outcome.verdict, "Equivalence check finished");
            if let Err(e) = run.record(outcome) {
                warn!("{}", e);
            }
        }
        info!(peak_active = report.peak_active, "Worker pool finished");
        runs
    }
}

impl PendingCheck {
    fn unwritten(id: usize, name: &str, origin: RunOrigin) -> Self {
        Self {
            run: Run::new(id, name, wrapper_name(name), origin),
            job: None,
        }
    }
}

fn origin_of(variant: &Variant) -> RunOrigin {
    match variant.choices() {
        [choice] if !variant.is_combination() => RunOrigin::Branch(*choice),
        choices => RunOrigin::Combination(choices.to_vec()),
    }
}

fn prepare_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| PapercutError::io(dir, e))?;
    }
    fs::create_dir_all(dir).map_err(|e| PapercutError::io(dir, e))
}

/// Write an artifact whose loss should not stop the batch.
fn write_or_warn(dir: &Path, file: &str, contents: &str) -> bool {
    match write_artifact(dir, file, contents) {
        Ok(_) => true,
        Err(e) => {
            warn!("{}", e);
            false
        }
    }
}

fn write_artifact(dir: &Path, file: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(file);
    fs::write(&path, contents).map_err(|e| PapercutError::io(&path, e))?;
    Ok(path)
}
