//! Folding proven branches back into one design.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use super::run::{Run, RunOrigin};
use crate::design::{module_name, rename_module};
use crate::error::{PapercutError, Result};
use crate::mutation::{Branch, Choice, Conflict, RewriteSet};
use crate::syntax::{NodeId, Overrides, SyntaxTree};

pub const CONSOLIDATED_SUFFIX: &str = "_consolidated";
pub const UNVERIFIED_SUFFIX: &str = "_unverified";

/// A rewrite with more than one passing branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ambiguity {
    pub rewrite: String,
    pub passing: Vec<Branch>,
    pub applied: Branch,
}

/// The base design with the chosen branches applied
#[derive(Debug, Clone)]
pub struct Consolidated {
    pub tree: SyntaxTree,
    pub module: String,
    pub applied: Vec<Choice>,
    pub ambiguous: Vec<Ambiguity>,
    pub conflicts: Vec<Conflict>,
}

/// Apply, per rewrite, the branch whose branch run passed. Rewrites without
/// a passing branch are left untouched; with several, the first-registered
/// passing branch is applied and the ambiguity reported.
pub fn consolidate(tree: &SyntaxTree, rewrites: &RewriteSet, runs: &[Run]) -> Result<Consolidated> {
    let mut passing: Vec<Vec<Choice>> = vec![Vec::new(); rewrites.len()];
    for run in runs.iter().filter(|r| r.passed()) {
        if let RunOrigin::Branch(choice) = &run.origin {
            if let Some(slot) = passing.get_mut(choice.rewrite) {
                slot.push(*choice);
            }
        }
    }

    let mut chosen = Vec::new();
    let mut ambiguous = Vec::new();
    for (index, mut choices) in passing.into_iter().enumerate() {
        choices.sort_by_key(|c| c.selection);
        choices.dedup();
        let Some(first) = choices.first().copied() else {
            continue;
        };
        if choices.len() > 1 {
            let rewrite = rewrites
                .get(index)
                .map(|r| r.describe())
                .unwrap_or_default();
            warn!(%rewrite, applied = %first.branch, "Several branches passed; applying the first");
            ambiguous.push(Ambiguity {
                rewrite,
                passing: choices.iter().map(|c| c.branch).collect(),
                applied: first.branch,
            });
        }
        chosen.push(first);
    }

    let mut consolidated = apply_choices(tree, rewrites, &chosen, CONSOLIDATED_SUFFIX)?;
    consolidated.ambiguous = ambiguous;
    info!(
        module = %consolidated.module,
        applied = consolidated.applied.len(),
        ambiguous = consolidated.ambiguous.len(),
        "Consolidated design"
    );
    Ok(consolidated)
}

/// Every rewrite forced to its first branch, without any proof.
pub fn apply_all_unverified(tree: &SyntaxTree, rewrites: &RewriteSet) -> Result<Consolidated> {
    let choices: Vec<Choice> = rewrites
        .iter()
        .enumerate()
        .filter_map(|(index, rewrite)| {
            rewrite.branches().first().map(|&branch| Choice {
                rewrite: index,
                category: rewrite.category(),
                branch,
                selection: rewrite.selection_index(branch),
            })
        })
        .collect();
    apply_choices(tree, rewrites, &choices, UNVERIFIED_SUFFIX)
}

fn apply_choices(
    tree: &SyntaxTree,
    rewrites: &RewriteSet,
    choices: &[Choice],
    suffix: &str,
) -> Result<Consolidated> {
    let mut overrides = Overrides::new();
    let mut owners: HashMap<NodeId, usize> = HashMap::new();
    let mut applied = Vec::new();
    let mut conflicts = Vec::new();

    for choice in choices {
        let rewrite = rewrites
            .get(choice.rewrite)
            .ok_or_else(|| PapercutError::not_found(format!("rewrite {}", choice.rewrite)))?;
        let (target, substitution) = rewrite.branch_substitution(tree, choice.branch)?;
        if overrides.push(target, substitution) {
            owners.insert(target, choice.rewrite);
            applied.push(*choice);
            continue;
        }
        let kept = owners
            .get(&target)
            .and_then(|owner| rewrites.get(*owner))
            .map(|r| r.describe())
            .unwrap_or_default();
        let conflict = Conflict {
            location: tree.location(target),
            kept,
            dropped: rewrite.describe(),
        };
        warn!(
            location = %conflict.location,
            kept = %conflict.kept,
            dropped = %conflict.dropped,
            "Conflicting rewrites"
        );
        conflicts.push(conflict);
    }

    let module = format!("{}{}", module_name(tree)?, suffix);
    let rendered = SyntaxTree::parse(tree.render_with(&overrides))?;
    Ok(Consolidated {
        tree: rename_module(&rendered, &module)?,
        module,
        applied,
        ambiguous: Vec::new(),
        conflicts,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mutation::{Category, SiteLocator};
    use crate::verify::{ProofOutcome, Verdict};

    fn setup(source: &str, categories: &[Category]) -> (SyntaxTree, RewriteSet) {
        let tree = SyntaxTree::parse(source).unwrap();
        let sites = SiteLocator::new(&tree).locate_all(categories);
        let set = RewriteSet::from_sites(&tree, &sites).unwrap();
        (tree, set)
    }

    fn branch_run(set: &RewriteSet, rewrite: usize, branch: Branch, verdict: Verdict) -> Run {
        let r = set.get(rewrite).unwrap();
        let choice = Choice {
            rewrite,
            category: r.category(),
            branch,
            selection: r.selection_index(branch),
        };
        let name = format!("m_{}{}", r.category().tag(), choice.selection);
        let mut run = Run::new(choice.selection, name.clone(), format!("{}_wrapper", name), RunOrigin::Branch(choice));
        run.record(ProofOutcome {
            verdict,
            output: String::new(),
            exit_code: None,
            elapsed: Duration::ZERO,
        })
        .unwrap();
        run
    }

    const TERNARY: &str = "module m(input logic b, c, d, output logic a);\n  assign a = b ? c : d;\nendmodule\n";

    #[test]
    fn test_passing_branch_is_applied() {
        let (tree, set) = setup(TERNARY, &[Category::Ternary]);
        let runs = vec![
            branch_run(&set, 0, Branch::Taken, Verdict::Pass),
            branch_run(&set, 0, Branch::NotTaken, Verdict::Fail),
        ];
        let consolidated = consolidate(&tree, &set, &runs).unwrap();
        assert!(consolidated.tree.source().contains("assign a = c;"));
        assert!(consolidated.tree.source().starts_with("module m_consolidated("));
        assert_eq!(consolidated.applied.len(), 1);
        assert!(consolidated.ambiguous.is_empty());
    }

    #[test]
    fn test_no_pass_leaves_site_unchanged() {
        let (tree, set) = setup(TERNARY, &[Category::Ternary]);
        let runs = vec![
            branch_run(&set, 0, Branch::Taken, Verdict::Fail),
            branch_run(&set, 0, Branch::NotTaken, Verdict::Fail),
        ];
        let consolidated = consolidate(&tree, &set, &runs).unwrap();
        assert!(consolidated.tree.source().contains("assign a = b ? c : d;"));
        assert!(consolidated.applied.is_empty());
    }

    #[test]
    fn test_ambiguous_passes_take_the_first_branch() {
        let (tree, set) = setup(TERNARY, &[Category::Ternary]);
        let runs = vec![
            branch_run(&set, 0, Branch::NotTaken, Verdict::Pass),
            branch_run(&set, 0, Branch::Taken, Verdict::Pass),
        ];
        let consolidated = consolidate(&tree, &set, &runs).unwrap();
        assert!(consolidated.tree.source().contains("assign a = c;"));
        assert_eq!(
            consolidated.ambiguous,
            vec![Ambiguity {
                rewrite: "ternary at 2:14".to_string(),
                passing: vec![Branch::Taken, Branch::NotTaken],
                applied: Branch::Taken,
            }]
        );
    }

    #[test]
    fn test_consolidation_is_idempotent() {
        let source = "\
module m(input logic clk, c, input logic [3:0] a, b, output logic [3:0] y, z);
  logic [3:0] r;
  assign y = c ? a : b;
  always_ff @(posedge clk) if (c) r <= a; else r <= b;
  assign z = r;
endmodule
";
        let (tree, set) = setup(source, &[Category::BitShrink, Category::Conditional, Category::Ternary]);
        let runs = vec![
            branch_run(&set, 0, Branch::Narrowed, Verdict::Pass),
            branch_run(&set, 1, Branch::NotTaken, Verdict::Pass),
            branch_run(&set, 2, Branch::Taken, Verdict::Fail),
        ];
        let first = consolidate(&tree, &set, &runs).unwrap();
        let second = consolidate(&tree, &set, &runs).unwrap();
        assert_eq!(first.tree.source(), second.tree.source());
        assert!(first.tree.source().contains("logic [2:0] r;"));
        assert!(first.tree.source().contains("always_ff @(posedge clk) r <= b;"));

        // a design with nothing left to apply consolidates to itself
        let (again, set_again) = setup(first.tree.source(), &[Category::Conditional]);
        let unchanged = consolidate(&again, &set_again, &[]).unwrap();
        assert_eq!(
            unchanged.tree.source(),
            first.tree.source().replace("m_consolidated", "m_consolidated_consolidated")
        );
    }

    #[test]
    fn test_conflicting_choices_keep_the_first() {
        let source = "\
module m(input logic [1:0] s, input logic a, b, output logic y);
  always_comb begin
    case (s)
      2'd0: y = a;
      2'd1: y = b;
      default: y = 1'b0;
    endcase
  end
endmodule
";
        let (tree, set) = setup(source, &[Category::CaseBranch]);
        let runs = vec![
            branch_run(&set, 0, Branch::Taken, Verdict::Pass),
            branch_run(&set, 1, Branch::Taken, Verdict::Pass),
        ];
        let consolidated = consolidate(&tree, &set, &runs).unwrap();
        assert_eq!(consolidated.conflicts.len(), 1);
        assert!(consolidated.tree.source().contains("begin\n    y = a;\n  end"));
    }

    #[test]
    fn test_apply_all_unverified() {
        let (tree, set) = setup(TERNARY, &[Category::Ternary]);
        let unverified = apply_all_unverified(&tree, &set).unwrap();
        assert_eq!(unverified.module, "m_unverified");
        assert!(unverified.tree.source().contains("assign a = c;"));
    }
}
