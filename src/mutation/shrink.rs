//! Bit-shrink analysis
//!
//! Works out the narrowed range of a vector declaration and every read of
//! the declared names that a mux-encoded shrink has to redirect through the
//! shadow signal.

use tracing::debug;

use crate::design::{concretize::parse_number, select_port};
use crate::error::{PapercutError, Result};
use crate::syntax::{NodeId, Piece, Substitution, SyntaxKind, SyntaxTree, TokenKind};

/// Suffix of the narrowed shadow signal.
pub const SHADOW_SUFFIX: &str = "_papercut";

pub fn shadow_name(name: &str) -> String {
    format!("{}{}", name, SHADOW_SUFFIX)
}

/// A reference to a shrunk name in read position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Read {
    /// The name itself, or the select it is the base of
    pub node: NodeId,
    pub name_index: usize,
    pub selected: bool,
}

/// Everything needed to narrow one declaration
#[derive(Debug, Clone)]
pub struct ShrinkPlan {
    pub decl: NodeId,
    pub dim: NodeId,
    pub signed: bool,
    /// Width before narrowing
    pub width: u64,
    /// The range one bit narrower, e.g. `[6:0]`
    pub narrowed: String,
    pub names: Vec<String>,
    pub reads: Vec<Read>,
}

/// Analyse a module-level vector declaration.
pub fn plan(tree: &SyntaxTree, decl: NodeId) -> Result<ShrinkPlan> {
    let location = tree.location(decl);
    let unsupported = |reason: &str| PapercutError::unsupported(location.clone(), reason);

    let data_type = tree
        .find_child(decl, SyntaxKind::DataType)
        .ok_or_else(|| unsupported("declaration without a data type"))?;
    if tree
        .child_tokens(data_type)
        .any(|t| tree.token_kind(t).is_identifier())
    {
        return Err(unsupported("user-defined types cannot be narrowed"));
    }
    let dims: Vec<NodeId> = tree
        .child_nodes(data_type)
        .filter(|n| tree.kind(*n) == SyntaxKind::PackedDim)
        .collect();
    let [dim] = dims[..] else {
        return Err(unsupported("only a single packed dimension can be narrowed"));
    };
    if tree.find_token(dim, TokenKind::Colon).is_none() {
        return Err(unsupported("indexed part-select ranges cannot be narrowed"));
    }
    let bounds: Vec<NodeId> = tree.child_nodes(dim).collect();
    let (Some(msb), Some(lsb)) = (
        bounds.first().and_then(|n| literal_bound(tree, *n)),
        bounds.get(1).and_then(|n| literal_bound(tree, *n)),
    ) else {
        return Err(unsupported("range bounds are not integer literals"));
    };
    let width = msb.abs_diff(lsb) + 1;
    if width <= 1 {
        return Err(unsupported("declaration is already one bit wide"));
    }
    let narrowed = if msb >= lsb {
        format!("[{}:{}]", msb - 1, lsb)
    } else {
        format!("[{}:{}]", msb, lsb - 1)
    };

    let mut names = Vec::new();
    for declarator in tree.child_nodes(decl) {
        if tree.kind(declarator) != SyntaxKind::Declarator {
            continue;
        }
        if tree.find_child(declarator, SyntaxKind::UnpackedDim).is_some() {
            return Err(unsupported("unpacked arrays cannot be narrowed"));
        }
        if let Some(name) = tree
            .child_tokens(declarator)
            .find(|t| tree.token_kind(*t).is_identifier())
        {
            names.push(tree.token_text(name).to_string());
        }
    }

    let signed = tree
        .child_tokens(data_type)
        .any(|t| tree.token_kind(t) == TokenKind::KwSigned);
    let reads = find_reads(tree, decl, &names);
    Ok(ShrinkPlan {
        decl,
        dim,
        signed,
        width,
        narrowed,
        names,
        reads,
    })
}

fn literal_bound(tree: &SyntaxTree, node: NodeId) -> Option<i64> {
    if tree.kind(node) == SyntaxKind::LiteralExpr {
        parse_number(tree.text(node))
    } else {
        None
    }
}

/// Reads of `names` after the declaration, outside assignment targets,
/// event controls and instance port connections.
fn find_reads(tree: &SyntaxTree, decl: NodeId, names: &[String]) -> Vec<Read> {
    let decl_end = tree.text_range(decl).end;
    let scope = tree.parent(decl).unwrap_or(tree.root());
    let mut reads = Vec::new();
    for node in tree.descendants(scope) {
        if tree.kind(node) != SyntaxKind::NameExpr || tree.text_range(node).start < decl_end {
            continue;
        }
        let Some(name_index) = names.iter().position(|n| n == tree.text(node)) else {
            continue;
        };
        if !is_read(tree, node) {
            continue;
        }
        let mut target = node;
        let mut selected = false;
        if let Some(parent) = tree.parent(node) {
            if is_select_base(tree, parent, node) {
                if tree
                    .parent(parent)
                    .is_some_and(|grandparent| is_select_base(tree, grandparent, parent))
                {
                    debug!(location = %tree.location(node), "Skipping read through nested select");
                    continue;
                }
                target = parent;
                selected = true;
            }
        }
        reads.push(Read {
            node: target,
            name_index,
            selected,
        });
    }
    reads
}

fn is_select_base(tree: &SyntaxTree, select: NodeId, base: NodeId) -> bool {
    tree.kind(select) == SyntaxKind::SelectExpr && tree.child_nodes(select).next() == Some(base)
}

fn is_read(tree: &SyntaxTree, node: NodeId) -> bool {
    let mut child = node;
    for ancestor in tree.ancestors(node) {
        match tree.kind(ancestor) {
            SyntaxKind::EventControl | SyntaxKind::PortConnection | SyntaxKind::MemberExpr => {
                return false;
            }
            SyntaxKind::Assignment | SyntaxKind::AssignStmt | SyntaxKind::OpaqueStmt => {
                if tree.child_nodes(ancestor).next() == Some(child) {
                    return false;
                }
            }
            _ => {}
        }
        child = ancestor;
    }
    true
}

impl ShrinkPlan {
    /// Replacement for the packed range when the declaration itself is narrowed.
    pub fn narrowed_range(&self) -> Substitution {
        Substitution::text(self.narrowed.clone())
    }

    /// Shadow declaration and its gated binding, inserted after the declaration.
    pub fn shadow_declarations(&self, tree: &SyntaxTree, select: usize) -> String {
        let indent = tree.indentation(self.decl);
        let ty = if self.signed {
            format!("logic signed {}", self.narrowed)
        } else {
            format!("logic {}", self.narrowed)
        };
        let shadows: Vec<String> = self.names.iter().map(|n| shadow_name(n)).collect();
        let bindings: Vec<String> = self
            .names
            .iter()
            .map(|n| format!("{} = {} ? 'z : {}", shadow_name(n), select_port(select), n))
            .collect();
        format!(
            "\n{indent}{ty} {};\n{indent}assign {};",
            shadows.join(", "),
            bindings.join(", ")
        )
    }

    /// Redirect one read through the shadow while the shadow carries a value.
    pub fn read_substitution(&self, tree: &SyntaxTree, read: &Read) -> Substitution {
        let name = &self.names[read.name_index];
        let shadow = shadow_name(name);
        if !read.selected {
            return Substitution::text(format!(
                "((^{shadow} === 1'bx) ? {name} : {shadow})"
            ));
        }
        let len = tree.children(read.node).len();
        Substitution::new(vec![
            Piece::Text(format!("((^{shadow} === 1'bx) ? ")),
            Piece::Children {
                node: read.node,
                range: 0..len,
            },
            Piece::Text(format!(" : {shadow}")),
            Piece::Children {
                node: read.node,
                range: 1..len,
            },
            Piece::Text(")".to_string()),
        ])
    }
}
