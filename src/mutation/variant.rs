//! Variant generation
//!
//! One variant per rewrite branch, and optionally every combination of
//! branches over the independent two-branch sites.

use std::ops::Range;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::rewrite::{Branch, RewriteSet};
use super::site::Category;
use crate::design::{module_name, rename_edit, rename_module};
use crate::error::{PapercutError, Result};
use crate::syntax::{SyntaxTree, TextEdit, apply_edits};

/// Default cap on the sites taking part in exhaustive enumeration.
pub const DEFAULT_MAX_EXHAUSTIVE_SITES: usize = 12;

/// One branch forced on one rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Choice {
    /// Position of the rewrite in its set
    pub rewrite: usize,
    pub category: Category,
    pub branch: Branch,
    /// Select index the branch corresponds to
    pub selection: usize,
}

/// A complete candidate design
#[derive(Debug, Clone)]
pub struct Variant {
    name: String,
    source: String,
    choices: Vec<Choice>,
    combination: bool,
}

impl Variant {
    /// Module name, also the artifact stem.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    /// Produced by exhaustive enumeration rather than per branch.
    pub fn is_combination(&self) -> bool {
        self.combination
    }
}

/// Produces candidate designs from a tree and its rewrites.
pub struct VariantGenerator<'a> {
    tree: &'a SyntaxTree,
    rewrites: &'a RewriteSet,
}

impl<'a> VariantGenerator<'a> {
    pub fn new(tree: &'a SyntaxTree, rewrites: &'a RewriteSet) -> Self {
        Self { tree, rewrites }
    }

    /// One variant per (rewrite, branch), named `<module>_<category><selection>`.
    pub fn per_branch(&self) -> Result<Vec<Variant>> {
        let module = module_name(self.tree)?;
        let mut variants = Vec::new();
        for (index, rewrite) in self.rewrites.iter().enumerate() {
            for &branch in rewrite.branches() {
                let selection = rewrite.selection_index(branch);
                let name = format!("{}_{}{}", module, rewrite.category().tag(), selection);
                let applied = match rewrite.apply(self.tree, branch) {
                    Ok(tree) => tree,
                    Err(e @ PapercutError::UnsupportedConstruct { .. }) => {
                        warn!(variant = %name, "Skipping variant: {}", e);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let renamed = rename_module(&applied, &name)?;
                debug!(variant = %name, rewrite = %rewrite.describe(), %branch, "Generated variant");
                variants.push(Variant {
                    name,
                    source: renamed.source().to_string(),
                    choices: vec![Choice {
                        rewrite: index,
                        category: rewrite.category(),
                        branch,
                        selection,
                    }],
                    combination: false,
                });
            }
        }
        info!(count = variants.len(), "Generated per-branch variants");
        Ok(variants)
    }

    /// Every branch combination over the independent two-branch sites,
    /// named `<module>_combo<k>` where bit `i` of `k` set means site `i`
    /// is not taken.
    pub fn exhaustive(&self, max_sites: usize) -> Result<Vec<Variant>> {
        let module = module_name(self.tree)?;

        struct Independent {
            rewrite: usize,
            edits: [TextEdit; 2],
        }

        let mut sites: Vec<Independent> = Vec::new();
        let mut accepted: Vec<Range<usize>> = Vec::new();
        for (index, rewrite) in self.rewrites.iter().enumerate() {
            if rewrite.branches().len() != 2 {
                continue;
            }
            let taken = self.edit(index, Branch::Taken)?;
            let not_taken = self.edit(index, Branch::NotTaken)?;
            let footprint = taken.range.start.min(not_taken.range.start)
                ..taken.range.end.max(not_taken.range.end);
            if accepted
                .iter()
                .any(|r| r.start < footprint.end && footprint.start < r.end)
            {
                debug!(rewrite = %rewrite.describe(), "Excluded from exhaustive set: overlaps an accepted site");
                continue;
            }
            accepted.push(footprint);
            sites.push(Independent {
                rewrite: index,
                edits: [taken, not_taken],
            });
        }

        if sites.len() > max_sites {
            return Err(PapercutError::TooManyCombinations {
                sites: sites.len(),
                limit: max_sites,
            });
        }

        let mut variants = Vec::with_capacity(1 << sites.len());
        for combination in 0..(1usize << sites.len()) {
            let name = format!("{}_combo{}", module, combination);
            let mut edits = vec![rename_edit(self.tree, &name)?];
            let mut choices = Vec::with_capacity(sites.len());
            for (bit, site) in sites.iter().enumerate() {
                let branch = if combination & (1 << bit) != 0 {
                    Branch::NotTaken
                } else {
                    Branch::Taken
                };
                edits.push(site.edits[branch.offset()].clone());
                let rewrite = self
                    .rewrites
                    .get(site.rewrite)
                    .ok_or_else(|| PapercutError::not_found("rewrite"))?;
                choices.push(Choice {
                    rewrite: site.rewrite,
                    category: rewrite.category(),
                    branch,
                    selection: rewrite.selection_index(branch),
                });
            }
            variants.push(Variant {
                name,
                source: apply_edits(self.tree.source(), edits)?,
                choices,
                combination: true,
            });
        }
        info!(
            sites = sites.len(),
            count = variants.len(),
            "Generated exhaustive variants"
        );
        Ok(variants)
    }

    /// The branch as a plain text edit on the unmodified source.
    fn edit(&self, index: usize, branch: Branch) -> Result<TextEdit> {
        let rewrite = self
            .rewrites
            .get(index)
            .ok_or_else(|| PapercutError::not_found("rewrite"))?;
        let (target, substitution) = rewrite.branch_substitution(self.tree, branch)?;
        Ok(TextEdit::new(
            self.tree.text_range(target),
            substitution.to_text(self.tree, target),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::mutation::site::SiteLocator;

    fn setup(source: &str, categories: &[Category]) -> (SyntaxTree, RewriteSet) {
        let tree = SyntaxTree::parse(source).unwrap();
        let sites = SiteLocator::new(&tree).locate_all(categories);
        let set = RewriteSet::from_sites(&tree, &sites).unwrap();
        (tree, set)
    }

    const SOURCE: &str = "\
module top(input logic clk, input logic [1:0] s, input logic [3:0] a, b, output logic [3:0] y, z);
  logic [3:0] r;
  assign y = s[0] ? a : b;
  always_ff @(posedge clk) begin
    if (s[1]) r <= a;
    else r <= b;
  end
  assign z = r;
endmodule
";

    #[test]
    fn test_per_branch_names_follow_selection_indices() {
        let (tree, set) = setup(
            SOURCE,
            &[Category::BitShrink, Category::Conditional, Category::Ternary],
        );
        let variants = VariantGenerator::new(&tree, &set).per_branch().unwrap();
        let names: Vec<&str> = variants.iter().map(|v| v.name()).collect();
        assert_eq!(
            names,
            vec!["top_bitshrink0", "top_if1", "top_if2", "top_ternary3", "top_ternary4"]
        );
        assert!(variants[0].source().contains("module top_bitshrink0("));
        assert!(variants[0].source().contains("logic [2:0] r;"));
        assert!(variants[3].source().contains("assign y = a;"));
        assert_eq!(variants[4].choices()[0].branch, Branch::NotTaken);
    }

    #[test]
    fn test_exhaustive_yields_all_unique_combinations() {
        let (tree, set) = setup(SOURCE, &[Category::Conditional, Category::Ternary]);
        let variants = VariantGenerator::new(&tree, &set)
            .exhaustive(DEFAULT_MAX_EXHAUSTIVE_SITES)
            .unwrap();
        assert_eq!(variants.len(), 4);
        let unique: HashSet<Vec<Branch>> = variants
            .iter()
            .map(|v| v.choices().iter().map(|c| c.branch).collect())
            .collect();
        assert_eq!(unique.len(), 4);
        assert_eq!(variants[3].name(), "top_combo3");
        assert!(variants[3].source().contains("module top_combo3("));
        assert!(variants[3].source().contains("    r <= b;\n"));
        assert!(variants[3].source().contains("assign y = b;"));
        for variant in &variants {
            SyntaxTree::parse(variant.source()).unwrap();
        }
    }

    #[test]
    fn test_exhaustive_excludes_nested_and_sibling_sites() {
        let source = "\
module m(input logic [1:0] s, input logic a, b, c, output logic y);
  always_comb begin
    case (s)
      2'd0: y = a ? b : c;
      2'd1: y = b;
      default: y = c;
    endcase
  end
endmodule
";
        let (tree, set) = setup(source, &[Category::CaseBranch, Category::Ternary]);
        assert_eq!(set.len(), 3);
        let variants = VariantGenerator::new(&tree, &set).exhaustive(4).unwrap();
        // only the first case item survives; its sibling and the nested ternary overlap it
        assert_eq!(variants.len(), 2);
    }

    #[test]
    fn test_exhaustive_without_sites_is_the_original() {
        let (tree, set) = setup(
            "module m(input logic a, output logic y);\n  assign y = a;\nendmodule\n",
            &[Category::Ternary],
        );
        let variants = VariantGenerator::new(&tree, &set).exhaustive(0).unwrap();
        assert_eq!(variants.len(), 1);
        assert!(variants[0].choices().is_empty());
        assert!(variants[0].source().contains("module m_combo0("));
    }

    #[test]
    fn test_exhaustive_limit() {
        let (tree, set) = setup(SOURCE, &[Category::Conditional, Category::Ternary]);
        assert!(matches!(
            VariantGenerator::new(&tree, &set).exhaustive(1),
            Err(PapercutError::TooManyCombinations { sites: 2, limit: 1 })
        ));
    }
}
