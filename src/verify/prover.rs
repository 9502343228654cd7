//! External prover invocation.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

/// Default prover command template.
pub const DEFAULT_PROVER_COMMAND: &str = "jg -no_gui -tcl {script} -proj {project}";

/// Outcome of a proof attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// One proof to run
#[derive(Debug, Clone)]
pub struct ProofJob {
    /// Wrapper module name
    pub wrapper: String,
    /// Script path relative to `workdir`
    pub script: String,
    /// Prover project directory name
    pub project: String,
    pub workdir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProofOutcome {
    pub verdict: Verdict,
    /// Combined stdout and stderr
    pub output: String,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

impl ProofOutcome {
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Fail,
            output: output.into(),
            exit_code: None,
            elapsed: Duration::ZERO,
        }
    }
}

/// Anything that can decide a proof job.
pub trait Prover: Send + Sync {
    fn prove(&self, job: &ProofJob) -> ProofOutcome;
}

/// Runs a command template through `sh -c` in the job's directory.
///
/// `{script}`, `{project}` and `{wrapper}` are substituted before running;
/// exit status 0 is a pass, anything else, including a failure to spawn,
/// is a fail.
#[derive(Debug, Clone)]
pub struct ScriptProver {
    template: String,
}

impl Default for ScriptProver {
    fn default() -> Self {
        Self::new(DEFAULT_PROVER_COMMAND)
    }
}

impl ScriptProver {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn command_for(&self, job: &ProofJob) -> String {
        self.template
            .replace("{script}", &job.script)
            .replace("{project}", &job.project)
            .replace("{wrapper}", &job.wrapper)
    }
}

impl Prover for ScriptProver {
    fn prove(&self, job: &ProofJob) -> ProofOutcome {
        let command = self.command_for(job);
        debug!(wrapper = %job.wrapper, %command, "Invoking prover");
        let start = Instant::now();
        let result = Command::new("sh")
            .arg("-c")
            .arg(format!("exec 2>&1; {}", command))
            .current_dir(&job.workdir)
            .output();
        let elapsed = start.elapsed();

        match result {
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                ProofOutcome {
                    verdict: if output.status.success() {
                        Verdict::Pass
                    } else {
                        Verdict::Fail
                    },
                    output: text,
                    exit_code: output.status.code(),
                    elapsed,
                }
            }
            Err(e) => {
                warn!(wrapper = %job.wrapper, "Failed to start prover: {}", e);
                ProofOutcome {
                    elapsed,
                    ..ProofOutcome::failed(format!("failed to start prover: {}", e))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(workdir: PathBuf) -> ProofJob {
        ProofJob {
            wrapper: "alu_if0_wrapper".to_string(),
            script: "alu_if0_wrapper.tcl".to_string(),
            project: "alu_if0_jgproject".to_string(),
            workdir,
        }
    }

    #[test]
    fn test_placeholders() {
        let prover = ScriptProver::default();
        let job = job(PathBuf::from("."));
        assert_eq!(
            prover.command_for(&job),
            "jg -no_gui -tcl alu_if0_wrapper.tcl -proj alu_if0_jgproject"
        );
    }

    #[test]
    fn test_exit_status_decides_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let pass = ScriptProver::new("echo proving {wrapper}").prove(&job(dir.path().to_path_buf()));
        assert_eq!(pass.verdict, Verdict::Pass);
        assert_eq!(pass.exit_code, Some(0));
        assert!(pass.output.contains("proving alu_if0_wrapper"));

        let fail = ScriptProver::new("echo broken >&2; exit 3").prove(&job(dir.path().to_path_buf()));
        assert_eq!(fail.verdict, Verdict::Fail);
        assert_eq!(fail.exit_code, Some(3));
        assert!(fail.output.contains("broken"));
    }

    #[test]
    fn test_runs_in_job_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alu_if0_wrapper.tcl"), "exit 0\n").unwrap();
        let outcome = ScriptProver::new("test -f {script}").prove(&job(dir.path().to_path_buf()));
        assert_eq!(outcome.verdict, Verdict::Pass);
    }

    #[test]
    fn test_missing_directory_is_a_fail() {
        let outcome = ScriptProver::new("true").prove(&job(PathBuf::from("/nonexistent/papercut")));
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert!(outcome.output.contains("failed to start prover"));
    }
}
