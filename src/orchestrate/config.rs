//! Configuration for a papercut run.

use std::path::PathBuf;

use crate::mutation::{Category, ConflictPolicy, DEFAULT_MAX_EXHAUSTIVE_SITES};
use crate::verify::DEFAULT_PROVER_COMMAND;

/// Default cap on simultaneously running prover jobs.
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Configuration for the proof worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of jobs running at once.
    pub max_concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl PoolConfig {
    /// Set the concurrency cap (at least 1).
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

/// How the external prover is invoked.
#[derive(Debug, Clone)]
pub struct ProverConfig {
    /// Command template with `{script}`, `{project}` and `{wrapper}` placeholders.
    pub command: String,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_PROVER_COMMAND.to_string(),
        }
    }
}

impl ProverConfig {
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }
}

/// Configuration for the whole pipeline.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Directory receiving every artifact; recreated on each run.
    pub output_dir: PathBuf,
    /// Enabled categories, in location order.
    pub categories: Vec<Category>,
    /// Also emit the exhaustive combination variants.
    pub exhaustive: bool,
    pub max_exhaustive_sites: usize,
    /// Run the prover on every variant.
    pub check_equivalence: bool,
    /// Re-verify the consolidated design against the base.
    pub apply_all: bool,
    /// Write a design with every rewrite's first branch applied, unproven.
    pub apply_all_unverified: bool,
    pub conflict_policy: ConflictPolicy,
    pub pool: PoolConfig,
    pub prover: ProverConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./outputs"),
            categories: Vec::new(),
            exhaustive: false,
            max_exhaustive_sites: DEFAULT_MAX_EXHAUSTIVE_SITES,
            check_equivalence: false,
            apply_all: false,
            apply_all_unverified: false,
            conflict_policy: ConflictPolicy::default(),
            pool: PoolConfig::default(),
            prover: ProverConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// Enable a category; enabling one twice has no effect.
    pub fn with_category(mut self, category: Category) -> Self {
        if !self.categories.contains(&category) {
            self.categories.push(category);
        }
        self
    }

    pub fn with_exhaustive(mut self, exhaustive: bool) -> Self {
        self.exhaustive = exhaustive;
        self
    }

    pub fn with_max_exhaustive_sites(mut self, max_sites: usize) -> Self {
        self.max_exhaustive_sites = max_sites;
        self
    }

    pub fn with_check_equivalence(mut self, enabled: bool) -> Self {
        self.check_equivalence = enabled;
        self
    }

    pub fn with_apply_all(mut self, enabled: bool) -> Self {
        self.apply_all = enabled;
        self
    }

    pub fn with_apply_all_unverified(mut self, enabled: bool) -> Self {
        self.apply_all_unverified = enabled;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_prover(mut self, prover: ProverConfig) -> Self {
        self.prover = prover;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("./outputs"));
        assert!(config.categories.is_empty());
        assert_eq!(config.pool.max_concurrency, 32);
        assert_eq!(config.max_exhaustive_sites, 12);
        assert_eq!(config.conflict_policy, ConflictPolicy::FirstWins);
        assert!(config.prover.command.contains("{script}"));
    }

    #[test]
    fn test_config_builder() {
        let config = OrchestratorConfig::default()
            .with_category(Category::BitShrink)
            .with_category(Category::Ternary)
            .with_category(Category::BitShrink)
            .with_check_equivalence(true)
            .with_pool(PoolConfig::default().with_max_concurrency(0))
            .with_prover(ProverConfig::default().with_command("true"));
        assert_eq!(config.categories, vec![Category::BitShrink, Category::Ternary]);
        assert!(config.check_equivalence);
        assert_eq!(config.pool.max_concurrency, 1);
        assert_eq!(config.prover.command, "true");
    }
}
