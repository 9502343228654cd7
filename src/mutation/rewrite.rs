//! Rewrites bound to located sites
//!
//! A [`Rewrite`] knows how to render each branch of its site as a plain
//! replacement and how to render the select-driven mux that switches between
//! the original and the simplified behavior at runtime. A [`RewriteSet`]
//! allocates the select indices and applies every mux in one rendering pass.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, warn};

use super::shrink::{self, ShrinkPlan};
use super::site::{Category, Site};
use crate::design::select_port;
use crate::error::{PapercutError, Result};
use crate::syntax::{NodeId, Overrides, Piece, Substitution, SyntaxKind, SyntaxTree};

/// Which way a site is forced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Taken,
    NotTaken,
    Narrowed,
}

impl Branch {
    /// Position of the branch within its rewrite's selections.
    pub fn offset(self) -> usize {
        match self {
            Branch::Taken | Branch::Narrowed => 0,
            Branch::NotTaken => 1,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Taken => write!(f, "taken"),
            Branch::NotTaken => write!(f, "not_taken"),
            Branch::Narrowed => write!(f, "narrowed"),
        }
    }
}

const TWO_WAY: [Branch; 2] = [Branch::Taken, Branch::NotTaken];
const NARROW: [Branch; 1] = [Branch::Narrowed];

/// Per-category rendering data, extracted once from the site's node.
#[derive(Debug, Clone)]
pub enum RewriteKind {
    TernaryBranch {
        condition: NodeId,
        then_expr: NodeId,
        else_expr: NodeId,
    },
    ConditionalBranch {
        condition: NodeId,
        then_stmt: NodeId,
        else_stmt: Option<NodeId>,
    },
    CaseBranch {
        case_stmt: NodeId,
        selector: NodeId,
        labels: Vec<NodeId>,
        body: NodeId,
    },
    BitShrink(ShrinkPlan),
}

/// What the mux encoding does to one node
#[derive(Debug, Clone)]
pub enum MuxAction {
    Substitute(NodeId, Substitution),
    InsertAfter(NodeId, String),
}

impl MuxAction {
    fn node(&self) -> NodeId {
        match self {
            MuxAction::Substitute(node, _) | MuxAction::InsertAfter(node, _) => *node,
        }
    }

    /// Full replacements cannot share a node; wrappers and insertions layer.
    fn claims(&self) -> bool {
        matches!(self, MuxAction::Substitute(_, sub) if !sub.wraps())
    }
}

/// A rewrite for exactly one site
#[derive(Debug, Clone)]
pub struct Rewrite {
    site: Site,
    kind: RewriteKind,
    start_index: usize,
    location: String,
}

impl Rewrite {
    /// Extract the rendering data for `site` from the tree it was located in.
    pub fn new(tree: &SyntaxTree, site: &Site) -> Result<Self> {
        if site.tree != tree.id() {
            return Err(PapercutError::ForeignTree);
        }
        let node = site.node;
        let location = tree.location(node);
        let shape_error = || {
            PapercutError::unsupported(
                location.clone(),
                format!("unexpected {} shape for a {} site", tree.kind(node), site.category),
            )
        };
        let children: Vec<NodeId> = tree.child_nodes(node).collect();

        let kind = match site.category {
            Category::Ternary => {
                let [condition, then_expr, else_expr] = children[..] else {
                    return Err(shape_error());
                };
                RewriteKind::TernaryBranch {
                    condition,
                    then_expr,
                    else_expr,
                }
            }
            Category::Conditional => {
                let (Some(&condition), Some(&then_stmt)) = (children.first(), children.get(1))
                else {
                    return Err(shape_error());
                };
                let else_stmt = tree
                    .find_child(node, SyntaxKind::ElseClause)
                    .and_then(|clause| tree.child_nodes(clause).next());
                RewriteKind::ConditionalBranch {
                    condition,
                    then_stmt,
                    else_stmt,
                }
            }
            Category::CaseBranch => {
                let Some((&body, labels)) = children.split_last() else {
                    return Err(shape_error());
                };
                let case_stmt = tree.parent(node).ok_or_else(shape_error)?;
                let selector = tree
                    .child_nodes(case_stmt)
                    .next()
                    .filter(|n| tree.kind(*n).is_expression())
                    .ok_or_else(shape_error)?;
                if labels.is_empty() {
                    return Err(shape_error());
                }
                RewriteKind::CaseBranch {
                    case_stmt,
                    selector,
                    labels: labels.to_vec(),
                    body,
                }
            }
            Category::BitShrink => RewriteKind::BitShrink(shrink::plan(tree, node)?),
        };

        Ok(Self {
            site: site.clone(),
            kind,
            start_index: 0,
            location,
        })
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn kind(&self) -> &RewriteKind {
        &self.kind
    }

    pub fn category(&self) -> Category {
        self.site.category
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// `line:column` of the site in its tree.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn branches(&self) -> &'static [Branch] {
        match self.kind {
            RewriteKind::BitShrink(_) => &NARROW,
            _ => &TWO_WAY,
        }
    }

    pub fn num_selections(&self) -> usize {
        self.site.branch_count()
    }

    pub fn selection_index(&self, branch: Branch) -> usize {
        self.start_index + branch.offset()
    }

    /// Identity match against the site's node.
    pub fn matches(&self, node: NodeId) -> bool {
        node == self.site.node
    }

    pub fn describe(&self) -> String {
        format!("{} at {}", self.site.category, self.location)
    }

    fn check_tree(&self, tree: &SyntaxTree) -> Result<()> {
        if tree.id() == self.site.tree {
            Ok(())
        } else {
            Err(PapercutError::ForeignTree)
        }
    }

    fn invalid(&self, branch: Branch) -> PapercutError {
        PapercutError::InvalidBranch {
            category: self.site.category.to_string(),
            branch: branch.to_string(),
        }
    }

    /// The node replaced by `branch` and what it is replaced with.
    pub fn branch_substitution(
        &self,
        tree: &SyntaxTree,
        branch: Branch,
    ) -> Result<(NodeId, Substitution)> {
        self.check_tree(tree)?;
        let node = self.site.node;
        match (&self.kind, branch) {
            (RewriteKind::TernaryBranch { then_expr, .. }, Branch::Taken) => {
                Ok((node, Substitution::node(*then_expr)))
            }
            (RewriteKind::TernaryBranch { else_expr, .. }, Branch::NotTaken) => {
                Ok((node, Substitution::node(*else_expr)))
            }
            (RewriteKind::ConditionalBranch { then_stmt, .. }, Branch::Taken) => {
                Ok((node, Substitution::node(*then_stmt)))
            }
            (RewriteKind::ConditionalBranch { else_stmt, .. }, Branch::NotTaken) => {
                let substitution = match else_stmt {
                    Some(stmt) => Substitution::node(*stmt),
                    None => Substitution::text("begin end"),
                };
                Ok((node, substitution))
            }
            (
                RewriteKind::CaseBranch {
                    case_stmt, body, ..
                },
                Branch::Taken,
            ) => Ok((*case_stmt, Substitution::node(*body))),
            (RewriteKind::CaseBranch { .. }, Branch::NotTaken) => {
                Ok((node, Substitution::text("")))
            }
            (RewriteKind::BitShrink(plan), Branch::Narrowed) => {
                Ok((plan.dim, plan.narrowed_range()))
            }
            _ => Err(self.invalid(branch)),
        }
    }

    /// A new tree with the site forced to `branch`.
    pub fn apply(&self, tree: &SyntaxTree, branch: Branch) -> Result<SyntaxTree> {
        let (target, substitution) = self.branch_substitution(tree, branch)?;
        let mut overrides = Overrides::new();
        overrides.push(target, substitution);
        let text = tree.render_with(&overrides);
        SyntaxTree::parse(text).map_err(|e| {
            PapercutError::unsupported(
                self.location.clone(),
                format!("{} branch does not re-parse: {}", branch, e.message),
            )
        })
    }

    /// Substitutions and insertions that wire this site to its select inputs.
    pub fn mux_actions(&self, tree: &SyntaxTree) -> Result<Vec<MuxAction>> {
        self.check_tree(tree)?;
        let lo = select_port(self.start_index);
        let hi = select_port(self.start_index + 1);
        let guard = || {
            Substitution::new(vec![
                Piece::Text(format!("({} || (!{} && (", hi, lo)),
                Piece::Inner,
                Piece::Text(")))".to_string()),
            ])
        };
        let actions = match &self.kind {
            RewriteKind::TernaryBranch { condition, .. }
            | RewriteKind::ConditionalBranch { condition, .. } => {
                vec![MuxAction::Substitute(*condition, guard())]
            }
            RewriteKind::CaseBranch {
                selector, labels, ..
            } => labels
                .iter()
                .map(|label| {
                    let substitution = Substitution::new(vec![
                        Piece::Text(format!("({} ? (", hi)),
                        Piece::Node(*selector),
                        Piece::Text(format!(") : {} ? ~(", lo)),
                        Piece::Node(*selector),
                        Piece::Text(") : (".to_string()),
                        Piece::Inner,
                        Piece::Text("))".to_string()),
                    ]);
                    MuxAction::Substitute(*label, substitution)
                })
                .collect(),
            RewriteKind::BitShrink(plan) => {
                let mut actions = vec![MuxAction::InsertAfter(
                    plan.decl,
                    plan.shadow_declarations(tree, self.start_index),
                )];
                actions.extend(
                    plan.reads
                        .iter()
                        .map(|read| MuxAction::Substitute(read.node, plan.read_substitution(tree, read))),
                );
                actions
            }
        };
        Ok(actions)
    }

    /// Select values under which the mux reproduces the original behavior.
    pub fn neutral_selects(&self) -> Vec<(usize, bool)> {
        match self.kind {
            // a high select leaves the shadow undriven and every read falls back
            RewriteKind::BitShrink(_) => vec![(self.start_index, true)],
            _ => vec![(self.start_index, false), (self.start_index + 1, false)],
        }
    }
}

/// What to do when two rewrites claim the same node in a mux encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep the first-registered rewrite and drop the later one
    #[default]
    FirstWins,
    /// Fail with `ConflictingRewrite`
    Reject,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first-wins" | "first_wins" => Ok(ConflictPolicy::FirstWins),
            "reject" => Ok(ConflictPolicy::Reject),
            _ => Err(format!("unknown conflict policy: {}", s)),
        }
    }
}

/// Two rewrites that wanted the same node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub location: String,
    pub kept: String,
    pub dropped: String,
}

/// Result of applying every mux of a set
#[derive(Debug, Clone)]
pub struct MuxApplication {
    pub tree: SyntaxTree,
    pub conflicts: Vec<Conflict>,
    /// Indices of rewrites left out because they lost a conflict
    pub dropped: Vec<usize>,
}

/// Ordered rewrites with disjoint select-index ranges
#[derive(Debug, Clone, Default)]
pub struct RewriteSet {
    rewrites: Vec<Rewrite>,
    total: usize,
}

impl RewriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a rewrite for each site, skipping sites that cannot be rewritten.
    pub fn from_sites(tree: &SyntaxTree, sites: &[Site]) -> Result<Self> {
        let mut set = Self::new();
        for site in sites {
            match Rewrite::new(tree, site) {
                Ok(rewrite) => {
                    set.add_rewrite(rewrite);
                }
                Err(e @ PapercutError::UnsupportedConstruct { .. }) => {
                    warn!(category = %site.category, "Skipping site: {}", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(set)
    }

    /// Append a rewrite, giving it the next free block of select indices.
    /// Returns the rewrite's start index.
    pub fn add_rewrite(&mut self, mut rewrite: Rewrite) -> usize {
        let start = self.total;
        rewrite.start_index = start;
        self.total += rewrite.num_selections();
        debug!(
            rewrite = %rewrite.describe(),
            start,
            count = rewrite.num_selections(),
            "Allocated select indices"
        );
        self.rewrites.push(rewrite);
        start
    }

    /// Append another set's rewrites, reallocating their indices.
    pub fn merge(&mut self, other: RewriteSet) {
        for rewrite in other.rewrites {
            self.add_rewrite(rewrite);
        }
    }

    pub fn len(&self) -> usize {
        self.rewrites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewrites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rewrite> {
        self.rewrites.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Rewrite> {
        self.rewrites.get(index)
    }

    pub fn total_selections(&self) -> usize {
        self.total
    }

    /// The rewrite whose matcher accepts `node`, if any.
    pub fn find(&self, node: NodeId) -> Option<&Rewrite> {
        self.rewrites.iter().find(|r| r.matches(node))
    }

    /// Select values that make the mux encoding behave like the original.
    pub fn neutral_selects(&self) -> Vec<bool> {
        let mut values = vec![false; self.total];
        for (index, value) in self.rewrites.iter().flat_map(|r| r.neutral_selects()) {
            values[index] = value;
        }
        values
    }

    /// Apply every rewrite's mux in a single rendering pass.
    pub fn apply_muxes(&self, tree: &SyntaxTree, policy: ConflictPolicy) -> Result<MuxApplication> {
        let mut actions = Vec::with_capacity(self.rewrites.len());
        for rewrite in &self.rewrites {
            actions.push(rewrite.mux_actions(tree)?);
        }

        let mut claimed: HashMap<NodeId, usize> = HashMap::new();
        let mut conflicts = Vec::new();
        let mut dropped = HashSet::new();
        for (index, rewrite_actions) in actions.iter().enumerate() {
            for action in rewrite_actions.iter().filter(|a| a.claims()) {
                let node = action.node();
                match claimed.get(&node) {
                    Some(&owner) if owner != index => {
                        let conflict = Conflict {
                            location: tree.location(node),
                            kept: self.rewrites[owner].describe(),
                            dropped: self.rewrites[index].describe(),
                        };
                        if policy == ConflictPolicy::Reject {
                            return Err(PapercutError::ConflictingRewrite {
                                location: conflict.location,
                                first: conflict.kept,
                                second: conflict.dropped,
                            });
                        }
                        warn!(
                            location = %conflict.location,
                            kept = %conflict.kept,
                            dropped = %conflict.dropped,
                            "Conflicting rewrites"
                        );
                        conflicts.push(conflict);
                        dropped.insert(index);
                    }
                    Some(_) => {}
                    None => {
                        claimed.insert(node, index);
                    }
                }
            }
        }

        let mut overrides = Overrides::new();
        for (index, rewrite_actions) in actions.into_iter().enumerate() {
            if dropped.contains(&index) {
                continue;
            }
            for action in rewrite_actions {
                match action {
                    MuxAction::Substitute(node, substitution) => {
                        overrides.push(node, substitution);
                    }
                    MuxAction::InsertAfter(node, text) => overrides.insert_after(node, text),
                }
            }
        }

        let mut dropped: Vec<usize> = dropped.into_iter().collect();
        dropped.sort_unstable();
        Ok(MuxApplication {
            tree: SyntaxTree::parse(tree.render_with(&overrides))?,
            conflicts,
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::site::SiteLocator;

    fn rewrites(tree: &SyntaxTree, categories: &[Category]) -> RewriteSet {
        let sites = SiteLocator::new(tree).locate_all(categories);
        RewriteSet::from_sites(tree, &sites).unwrap()
    }

    #[test]
    fn test_add_rewrite_allocates_contiguous_indices() {
        let source = "\
module m(input logic c, input logic [3:0] a, b, output logic [3:0] y);
  logic [3:0] t;
  assign t = c ? a : b;
  always_comb begin
    if (c) y = t;
    else y = a;
  end
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        let set = rewrites(
            &tree,
            &[Category::BitShrink, Category::Conditional, Category::Ternary],
        );
        let starts: Vec<usize> = set.iter().map(|r| r.start_index()).collect();
        assert_eq!(starts, vec![0, 1, 3]);
        assert_eq!(set.total_selections(), 5);
        let sum: usize = set.iter().map(|r| r.num_selections()).sum();
        assert_eq!(sum, set.total_selections());
    }

    #[test]
    fn test_merge_reallocates() {
        let tree = SyntaxTree::parse(
            "module m(input logic c, d, output logic y, z);\n  assign y = c ? d : c;\n  assign z = d ? c : d;\nendmodule\n",
        )
        .unwrap();
        let sites = SiteLocator::new(&tree).locate(Category::Ternary);
        let mut first = RewriteSet::from_sites(&tree, &sites[..1]).unwrap();
        let second = RewriteSet::from_sites(&tree, &sites[1..]).unwrap();
        assert_eq!(second.get(0).unwrap().start_index(), 0);
        first.merge(second);
        assert_eq!(first.get(1).unwrap().start_index(), 2);
        assert_eq!(first.total_selections(), 4);
    }

    #[test]
    fn test_ternary_branches() {
        let tree = SyntaxTree::parse("module m(input logic b, c, d, output logic a);\n  assign a = b ? c : d;\nendmodule\n").unwrap();
        let set = rewrites(&tree, &[Category::Ternary]);
        let rewrite = set.get(0).unwrap();
        let taken = rewrite.apply(&tree, Branch::Taken).unwrap();
        assert!(taken.source().contains("assign a = c;"));
        let not_taken = rewrite.apply(&tree, Branch::NotTaken).unwrap();
        assert!(not_taken.source().contains("assign a = d;"));
        assert!(matches!(
            rewrite.apply(&tree, Branch::Narrowed),
            Err(PapercutError::InvalidBranch { .. })
        ));
    }

    #[test]
    fn test_if_without_else_becomes_empty_block() {
        let source = "\
module m(input logic clk, c, d, output logic q);
  always_ff @(posedge clk) begin
    // hold unless enabled
    if (c) q <= d;
  end
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        let set = rewrites(&tree, &[Category::Conditional]);
        let rewrite = set.get(0).unwrap();
        let taken = rewrite.apply(&tree, Branch::Taken).unwrap();
        assert!(taken.source().contains("    // hold unless enabled\n    q <= d;\n"));
        let not_taken = rewrite.apply(&tree, Branch::NotTaken).unwrap();
        assert!(not_taken.source().contains("    // hold unless enabled\n    begin end\n"));
    }

    #[test]
    fn test_case_branches() {
        let source = "\
module m(input logic [1:0] s, input logic a, b, output logic y);
  always_comb begin
    case (s)
      2'd0: y = a;
      2'd1, 2'd2: y = b;
      default: y = 1'b0;
    endcase
  end
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        let set = rewrites(&tree, &[Category::CaseBranch]);
        assert_eq!(set.len(), 2);
        let taken = set.get(0).unwrap().apply(&tree, Branch::Taken).unwrap();
        assert!(taken.source().contains("begin\n    y = a;\n  end"));
        let removed = set.get(1).unwrap().apply(&tree, Branch::NotTaken).unwrap();
        assert!(!removed.source().contains("2'd1"));
        assert!(removed.source().contains("default: y = 1'b0;"));
    }

    #[test]
    fn test_relocating_after_apply_finds_one_fewer_site() {
        let source = "\
module m(input logic c, d, e, output logic y, z);
  assign y = c ? d : e;
  assign z = d ? e : c;
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        let set = rewrites(&tree, &[Category::Ternary]);
        let rewritten = set.get(1).unwrap().apply(&tree, Branch::NotTaken).unwrap();
        let remaining = SiteLocator::new(&rewritten).locate(Category::Ternary);
        assert_eq!(remaining.len(), 1);
        assert_eq!(rewritten.text(remaining[0].node), "c ? d : e");
    }

    #[test]
    fn test_rewrite_rejects_foreign_tree() {
        let source = "module m(input logic c, d, e, output logic y);\n  assign y = c ? d : e;\nendmodule\n";
        let tree = SyntaxTree::parse(source).unwrap();
        let other = SyntaxTree::parse(source).unwrap();
        let site = &SiteLocator::new(&tree).locate(Category::Ternary)[0];
        assert!(matches!(
            Rewrite::new(&other, site),
            Err(PapercutError::ForeignTree)
        ));
        let rewrite = Rewrite::new(&tree, site).unwrap();
        assert!(matches!(
            rewrite.apply(&other, Branch::Taken),
            Err(PapercutError::ForeignTree)
        ));
    }

    #[test]
    fn test_mux_guards_conditions() {
        let source = "\
module m(input logic c, d, e, output logic y);
  assign y = c ? d : e;
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        let set = rewrites(&tree, &[Category::Ternary]);
        let muxed = set.apply_muxes(&tree, ConflictPolicy::default()).unwrap();
        assert!(muxed
            .tree
            .source()
            .contains("assign y = (pc_sel1 || (!pc_sel0 && (c))) ? d : e;"));
        assert!(muxed.conflicts.is_empty());
    }

    #[test]
    fn test_mux_case_labels() {
        let source = "\
module m(input logic [1:0] s, input logic a, output logic y);
  always_comb begin
    case (s)
      2'd0: y = a;
      default: y = 1'b0;
    endcase
  end
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        let set = rewrites(&tree, &[Category::CaseBranch]);
        let muxed = set.apply_muxes(&tree, ConflictPolicy::default()).unwrap();
        assert!(muxed
            .tree
            .source()
            .contains("(pc_sel1 ? (s) : pc_sel0 ? ~(s) : (2'd0)): y = a;"));
    }

    #[test]
    fn test_bitshrink_mux_leaves_targets_alone() {
        let source = "\
module m(input logic clk, input logic [7:0] d, output logic [7:0] q);
  logic [7:0] r;
  always_ff @(posedge clk) r <= d;
  assign q = r;
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        let set = rewrites(&tree, &[Category::BitShrink]);
        let muxed = set.apply_muxes(&tree, ConflictPolicy::default()).unwrap();
        let text = muxed.tree.source();
        assert_eq!(text.matches("logic [6:0] r_papercut;").count(), 1);
        assert_eq!(text.matches("assign r_papercut = pc_sel0 ? 'z : r;").count(), 1);
        assert!(text.contains("always_ff @(posedge clk) r <= d;"));
        assert!(text.contains("assign q = ((^r_papercut === 1'bx) ? r : r_papercut);"));
        assert_eq!(set.neutral_selects(), vec![true]);
    }

    #[test]
    fn test_wrapper_composes_with_replacement() {
        let source = "\
module m(input logic clk, input logic [7:0] d, output logic [7:0] q);
  logic [7:0] r;
  always_ff @(posedge clk) r <= d;
  assign q = r ? d : 8'd0;
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        let set = rewrites(&tree, &[Category::BitShrink, Category::Ternary]);
        let muxed = set.apply_muxes(&tree, ConflictPolicy::Reject).unwrap();
        assert!(muxed.tree.source().contains(
            "assign q = (pc_sel2 || (!pc_sel1 && (((^r_papercut === 1'bx) ? r : r_papercut)))) ? d : 8'd0;"
        ));
    }

    #[test]
    fn test_conflicting_replacements() {
        let source = "\
module m(input logic [3:0] d, output logic [3:0] q);
  logic [3:0] r;
  assign r = d;
  assign q = r;
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        let site = SiteLocator::new(&tree).locate(Category::BitShrink)[0].clone();
        let mut set = RewriteSet::new();
        set.add_rewrite(Rewrite::new(&tree, &site).unwrap());
        set.add_rewrite(Rewrite::new(&tree, &site).unwrap());

        let muxed = set.apply_muxes(&tree, ConflictPolicy::FirstWins).unwrap();
        assert_eq!(muxed.conflicts.len(), 1);
        assert_eq!(muxed.dropped, vec![1]);
        assert_eq!(muxed.tree.source().matches("r_papercut;").count(), 1);

        assert!(matches!(
            set.apply_muxes(&tree, ConflictPolicy::Reject),
            Err(PapercutError::ConflictingRewrite { .. })
        ));
    }
}
