//! Papercut categories and site location.

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::Serialize;

use crate::design::{ports, top_module};
use crate::syntax::{NodeId, SyntaxKind, SyntaxTree, TreeId};

/// Kind of papercut
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// `c ? a : b`, forced to one arm
    Ternary,
    /// `if`, forced to one branch
    Conditional,
    /// One labelled `case` item, forced taken or removed
    CaseBranch,
    /// A vector declaration narrowed by one bit
    BitShrink,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Ternary,
        Category::Conditional,
        Category::CaseBranch,
        Category::BitShrink,
    ];

    /// Tag used in variant names.
    pub fn tag(&self) -> &'static str {
        match self {
            Category::Ternary => "ternary",
            Category::Conditional => "if",
            Category::CaseBranch => "case",
            Category::BitShrink => "bitshrink",
        }
    }

    /// Number of selections a site of this category offers.
    pub fn branch_count(&self) -> usize {
        match self {
            Category::BitShrink => 1,
            _ => 2,
        }
    }

    fn matches(&self, tree: &SyntaxTree, node: NodeId) -> bool {
        match self {
            Category::Ternary => {
                tree.kind(node) == SyntaxKind::TernaryExpr && !in_constant_context(tree, node)
            }
            Category::Conditional => tree.kind(node) == SyntaxKind::IfStmt,
            Category::CaseBranch => tree.kind(node) == SyntaxKind::CaseItem,
            Category::BitShrink => {
                tree.kind(node) == SyntaxKind::DataDecl
                    && tree
                        .parent(node)
                        .is_some_and(|p| tree.kind(p) == SyntaxKind::ModuleDecl)
                    && tree
                        .find_child(node, SyntaxKind::DataType)
                        .and_then(|t| tree.find_child(t, SyntaxKind::PackedDim))
                        .is_some()
            }
        }
    }
}

/// A non-ANSI `reg [7:0] y;` completing the declaration of port `y`.
fn redeclares_port(tree: &SyntaxTree, decl: NodeId, port_names: &HashSet<String>) -> bool {
    !port_names.is_empty()
        && tree
            .child_nodes(decl)
            .filter(|n| tree.kind(*n) == SyntaxKind::Declarator)
            .filter_map(|d| {
                tree.child_tokens(d)
                    .find(|t| tree.token_kind(*t).is_identifier())
            })
            .any(|t| port_names.contains(tree.token_text(t)))
}

/// Parameters, ranges and parameter overrides must stay elaboration-time constants.
fn in_constant_context(tree: &SyntaxTree, node: NodeId) -> bool {
    tree.ancestors(node).any(|a| {
        matches!(
            tree.kind(a),
            SyntaxKind::ParamDecl
                | SyntaxKind::PackedDim
                | SyntaxKind::UnpackedDim
                | SyntaxKind::ParamOverrides
                | SyntaxKind::ParamPortList
        )
    })
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ternary" => Ok(Category::Ternary),
            "if" | "conditional" => Ok(Category::Conditional),
            "case" | "case_branch" => Ok(Category::CaseBranch),
            "bitshrink" | "bit_shrink" => Ok(Category::BitShrink),
            _ => Err(format!("unknown papercut category: {}", s)),
        }
    }
}

/// A located papercut opportunity, tied to the tree it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub category: Category,
    pub node: NodeId,
    pub span: Range<usize>,
    pub tree: TreeId,
}

impl Site {
    pub fn branch_count(&self) -> usize {
        self.category.branch_count()
    }
}

/// Finds papercut sites in the top module of a tree.
pub struct SiteLocator<'a> {
    tree: &'a SyntaxTree,
}

impl<'a> SiteLocator<'a> {
    pub fn new(tree: &'a SyntaxTree) -> Self {
        Self { tree }
    }

    /// All sites of `category`, in source order.
    pub fn locate(&self, category: Category) -> Vec<Site> {
        let Ok(module) = top_module(self.tree) else {
            return Vec::new();
        };
        let port_names: HashSet<String> = match category {
            Category::BitShrink => ports(self.tree)
                .map(|ports| ports.into_iter().map(|p| p.name).collect())
                .unwrap_or_default(),
            _ => HashSet::new(),
        };
        self.tree
            .descendants(module)
            .into_iter()
            .filter(|n| category.matches(self.tree, *n))
            .filter(|n| !redeclares_port(self.tree, *n, &port_names))
            .map(|node| Site {
                category,
                node,
                span: self.tree.text_range(node),
                tree: self.tree.id(),
            })
            .collect()
    }

    /// Sites of each category in turn, categories in the order given.
    pub fn locate_all(&self, categories: &[Category]) -> Vec<Site> {
        categories.iter().flat_map(|c| self.locate(*c)).collect()
    }
}
