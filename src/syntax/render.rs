//! Rendering trees back to text with per-node substitutions.

use std::collections::HashMap;
use std::ops::Range;

use super::tree::{Element, NodeId, SyntaxTree};

/// One piece of replacement text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Literal text
    Text(String),
    /// Whatever the replaced node would have rendered to without this layer
    Inner,
    /// Another node, rendered with its own substitutions
    Node(NodeId),
    /// A slice of a node's children, rendered with their substitutions
    Children { node: NodeId, range: Range<usize> },
}

/// Replacement for a single node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    pieces: Vec<Piece>,
}

impl Substitution {
    pub fn new(pieces: Vec<Piece>) -> Self {
        Self { pieces }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![Piece::Text(text.into())])
    }

    pub fn node(node: NodeId) -> Self {
        Self::new(vec![Piece::Node(node)])
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// A wrapping substitution keeps the node's own rendering somewhere inside it.
    pub fn wraps(&self) -> bool {
        self.pieces.iter().any(|p| matches!(p, Piece::Inner))
    }

    /// Flatten to plain text against the unmodified tree.
    pub fn to_text(&self, tree: &SyntaxTree, target: NodeId) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Inner => out.push_str(tree.text(target)),
                Piece::Node(node) => out.push_str(tree.text(*node)),
                Piece::Children { node, range } => {
                    out.push_str(children_text(tree, *node, range.clone()));
                }
            }
        }
        out
    }
}

fn element_range(tree: &SyntaxTree, element: Element) -> Range<usize> {
    match element {
        Element::Token(t) => tree.token(t).text.clone(),
        Element::Node(n) => tree.text_range(n),
    }
}

fn children_text(tree: &SyntaxTree, node: NodeId, range: Range<usize>) -> &str {
    let children = &tree.children(node)[range];
    match (children.first(), children.last()) {
        (Some(first), Some(last)) => {
            let start = element_range(tree, *first).start;
            let end = element_range(tree, *last).end;
            &tree.source()[start..end]
        }
        _ => "",
    }
}

#[derive(Debug, Clone, Default)]
struct Layers {
    base: Option<Substitution>,
    wrappers: Vec<Substitution>,
}

/// Substitutions to apply while rendering.
///
/// Each node holds at most one full replacement plus any number of wrapping
/// layers, applied innermost first in the order they were pushed.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    layers: HashMap<NodeId, Layers>,
    after: HashMap<NodeId, Vec<String>>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a substitution. Returns false when a full replacement was
    /// already registered for the node; the earlier one is kept.
    pub fn push(&mut self, node: NodeId, substitution: Substitution) -> bool {
        let layers = self.layers.entry(node).or_default();
        if substitution.wraps() {
            layers.wrappers.push(substitution);
            true
        } else if layers.base.is_none() {
            layers.base = Some(substitution);
            true
        } else {
            false
        }
    }

    /// Emit `text` right after the node's rendering.
    pub fn insert_after(&mut self, node: NodeId, text: impl Into<String>) {
        self.after.entry(node).or_default().push(text.into());
    }

    pub fn is_replaced(&self, node: NodeId) -> bool {
        self.layers
            .get(&node)
            .is_some_and(|layers| layers.base.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty() && self.after.is_empty()
    }
}

pub(crate) struct Renderer<'a> {
    tree: &'a SyntaxTree,
    overrides: &'a Overrides,
    out: String,
    /// Drop the trivia of the next emitted token.
    suppress: bool,
}

impl<'a> Renderer<'a> {
    pub(crate) fn new(tree: &'a SyntaxTree, overrides: &'a Overrides) -> Self {
        Self {
            tree,
            overrides,
            out: String::with_capacity(tree.source().len()),
            suppress: false,
        }
    }

    pub(crate) fn push_str(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }

    fn token(&mut self, element: Element) {
        if let Element::Token(t) = element {
            if !self.suppress {
                self.out.push_str(self.tree.token_trivia(t));
            }
            self.suppress = false;
            self.out.push_str(self.tree.token_text(t));
        }
    }

    pub(crate) fn node(&mut self, id: NodeId) {
        let overrides = self.overrides;
        match overrides.layers.get(&id) {
            None => {
                let len = self.tree.children(id).len();
                self.children(id, 0..len);
            }
            Some(layers) => {
                if !self.suppress {
                    self.out.push_str(self.tree.leading_trivia(id));
                }
                self.suppress = false;
                self.layer(id, layers, layers.wrappers.len());
            }
        }
        if let Some(texts) = overrides.after.get(&id) {
            for text in texts {
                self.out.push_str(text);
            }
        }
    }

    fn layer(&mut self, id: NodeId, layers: &Layers, depth: usize) {
        if depth == 0 {
            match &layers.base {
                Some(base) => self.pieces(id, base, layers, None),
                None => self.original(id),
            }
        } else {
            self.pieces(id, &layers.wrappers[depth - 1], layers, Some(depth - 1));
        }
    }

    fn original(&mut self, id: NodeId) {
        self.suppress = true;
        let len = self.tree.children(id).len();
        self.children(id, 0..len);
        self.suppress = false;
    }

    fn pieces(&mut self, id: NodeId, sub: &Substitution, layers: &Layers, inner: Option<usize>) {
        for piece in sub.pieces() {
            match piece {
                Piece::Text(text) => {
                    self.suppress = false;
                    self.out.push_str(text);
                }
                Piece::Inner => match inner {
                    Some(depth) => self.layer(id, layers, depth),
                    None => self.original(id),
                },
                Piece::Node(node) => {
                    self.suppress = true;
                    self.node(*node);
                }
                Piece::Children { node, range } => {
                    self.suppress = true;
                    self.children(*node, range.clone());
                }
            }
        }
        self.suppress = false;
    }

    fn children(&mut self, id: NodeId, range: Range<usize>) {
        let tree = self.tree;
        for element in &tree.children(id)[range] {
            match element {
                Element::Token(_) => self.token(*element),
                Element::Node(n) => self.node(*n),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::tree::SyntaxKind;

    fn find(tree: &SyntaxTree, kind: SyntaxKind) -> NodeId {
        tree.descendants(tree.root())
            .into_iter()
            .find(|n| tree.kind(*n) == kind)
            .unwrap()
    }

    const SOURCE: &str = "module m(input logic a, b, c, output logic y);\n  assign y = a ? b : c;\nendmodule\n";

    #[test]
    fn test_replace_with_child_node() {
        let tree = SyntaxTree::parse(SOURCE).unwrap();
        let ternary = find(&tree, SyntaxKind::TernaryExpr);
        let then_expr = tree.child_nodes(ternary).nth(1).unwrap();
        let mut overrides = Overrides::new();
        assert!(overrides.push(ternary, Substitution::node(then_expr)));
        assert!(tree.render_with(&overrides).contains("assign y = b;"));
    }

    #[test]
    fn test_wrapper_composes_with_replacement() {
        let tree = SyntaxTree::parse(SOURCE).unwrap();
        let ternary = find(&tree, SyntaxKind::TernaryExpr);
        let cond = tree.child_nodes(ternary).next().unwrap();
        let mut overrides = Overrides::new();
        overrides.push(
            cond,
            Substitution::new(vec![
                Piece::Text("(s | (".into()),
                Piece::Inner,
                Piece::Text("))".into()),
            ]),
        );
        overrides.push(cond, Substitution::text("a2"));
        assert!(
            tree.render_with(&overrides)
                .contains("assign y = (s | (a2)) ? b : c;")
        );
    }

    #[test]
    fn test_first_replacement_wins() {
        let tree = SyntaxTree::parse(SOURCE).unwrap();
        let ternary = find(&tree, SyntaxKind::TernaryExpr);
        let mut overrides = Overrides::new();
        assert!(overrides.push(ternary, Substitution::text("b")));
        assert!(!overrides.push(ternary, Substitution::text("c")));
        assert!(tree.render_with(&overrides).contains("assign y = b;"));
    }

    #[test]
    fn test_insert_after() {
        let tree = SyntaxTree::parse(SOURCE).unwrap();
        let assign = find(&tree, SyntaxKind::ContinuousAssign);
        let mut overrides = Overrides::new();
        overrides.insert_after(assign, "\n  // tail");
        assert!(
            tree.render_with(&overrides)
                .contains("assign y = a ? b : c;\n  // tail\nendmodule")
        );
    }

    #[test]
    fn test_to_text_flattens_pieces() {
        let tree = SyntaxTree::parse(SOURCE).unwrap();
        let ternary = find(&tree, SyntaxKind::TernaryExpr);
        let sub = Substitution::new(vec![
            Piece::Text("(".into()),
            Piece::Inner,
            Piece::Text(")".into()),
        ]);
        assert_eq!(sub.to_text(&tree, ternary), "(a ? b : c)");
    }
}
