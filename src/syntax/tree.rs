//! Arena-backed concrete syntax tree.

use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use super::lexer::TokenKind;
use super::render::{Overrides, Renderer};
use super::{ParseError, line_and_column, parser};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one parse. Sites and rewrites remember the tree they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(u64);

impl TreeId {
    pub(crate) fn fresh() -> Self {
        Self(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TokenId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Kinds of interior nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    SourceFile,
    ModuleDecl,
    ModuleHeader,
    ParamPortList,
    PortList,
    AnsiPort,
    PortRef,

    // Module items
    PortDecl,
    DataDecl,
    DataType,
    PackedDim,
    UnpackedDim,
    Declarator,
    ParamDecl,
    ContinuousAssign,
    Assignment,
    ProceduralBlock,
    Instantiation,
    ParamOverrides,
    Instance,
    PortConnection,
    GenerateRegion,
    OpaqueItem,

    // Statements
    BlockStmt,
    IfStmt,
    ElseClause,
    CaseStmt,
    CaseItem,
    DefaultItem,
    AssignStmt,
    TimingStmt,
    EventControl,
    LoopStmt,
    ExprStmt,
    NullStmt,
    OpaqueStmt,

    // Expressions
    NameExpr,
    LiteralExpr,
    ParenExpr,
    UnaryExpr,
    BinaryExpr,
    TernaryExpr,
    ConcatExpr,
    ReplicationExpr,
    SelectExpr,
    MemberExpr,
    CallExpr,
    ArgList,
    CastExpr,
    PatternExpr,
}

impl SyntaxKind {
    pub fn is_expression(self) -> bool {
        matches!(
            self,
            SyntaxKind::NameExpr
                | SyntaxKind::LiteralExpr
                | SyntaxKind::ParenExpr
                | SyntaxKind::UnaryExpr
                | SyntaxKind::BinaryExpr
                | SyntaxKind::TernaryExpr
                | SyntaxKind::ConcatExpr
                | SyntaxKind::ReplicationExpr
                | SyntaxKind::SelectExpr
                | SyntaxKind::MemberExpr
                | SyntaxKind::CallExpr
                | SyntaxKind::CastExpr
                | SyntaxKind::PatternExpr
        )
    }

    pub fn is_statement(self) -> bool {
        matches!(
            self,
            SyntaxKind::BlockStmt
                | SyntaxKind::IfStmt
                | SyntaxKind::CaseStmt
                | SyntaxKind::AssignStmt
                | SyntaxKind::TimingStmt
                | SyntaxKind::LoopStmt
                | SyntaxKind::ExprStmt
                | SyntaxKind::NullStmt
                | SyntaxKind::OpaqueStmt
                | SyntaxKind::DataDecl
        )
    }
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A child slot of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Node(NodeId),
    Token(TokenId),
}

/// A significant token plus the trivia that precedes it
#[derive(Debug, Clone)]
pub struct TokenData {
    pub kind: TokenKind,
    /// Whitespace, comments and directives before the token
    pub trivia: Range<usize>,
    pub text: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: SyntaxKind,
    pub parent: Option<NodeId>,
    pub children: Vec<Element>,
}

/// A parsed source file.
///
/// Every node owns at least one token, and the concatenation of every
/// token's trivia and text plus the trailing trivia is the source verbatim.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    id: TreeId,
    source: String,
    tokens: Vec<TokenData>,
    nodes: Vec<NodeData>,
    trailing: Range<usize>,
}

impl SyntaxTree {
    pub(crate) fn from_parts(
        source: String,
        tokens: Vec<TokenData>,
        nodes: Vec<NodeData>,
        trailing: Range<usize>,
    ) -> Self {
        Self {
            id: TreeId::fresh(),
            source,
            tokens,
            nodes,
            trailing,
        }
    }

    /// Parse SystemVerilog source text.
    pub fn parse(source: impl Into<String>) -> Result<Self, ParseError> {
        parser::parse(source.into())
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn kind(&self, node: NodeId) -> SyntaxKind {
        self.nodes[node.index()].kind
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].parent
    }

    pub fn children(&self, node: NodeId) -> &[Element] {
        &self.nodes[node.index()].children
    }

    pub fn child_nodes(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node).iter().filter_map(|e| match e {
            Element::Node(n) => Some(*n),
            Element::Token(_) => None,
        })
    }

    pub fn child_tokens(&self, node: NodeId) -> impl Iterator<Item = TokenId> + '_ {
        self.children(node).iter().filter_map(|e| match e {
            Element::Token(t) => Some(*t),
            Element::Node(_) => None,
        })
    }

    pub fn find_child(&self, node: NodeId, kind: SyntaxKind) -> Option<NodeId> {
        self.child_nodes(node).find(|n| self.kind(*n) == kind)
    }

    pub fn find_token(&self, node: NodeId, kind: TokenKind) -> Option<TokenId> {
        self.child_tokens(node).find(|t| self.token_kind(*t) == kind)
    }

    /// Position of `child` among the children of its parent.
    pub fn child_position(&self, parent: NodeId, child: Element) -> Option<usize> {
        self.children(parent).iter().position(|e| *e == child)
    }

    pub fn token(&self, token: TokenId) -> &TokenData {
        &self.tokens[token.index()]
    }

    pub fn token_kind(&self, token: TokenId) -> TokenKind {
        self.tokens[token.index()].kind
    }

    pub fn token_text(&self, token: TokenId) -> &str {
        &self.source[self.tokens[token.index()].text.clone()]
    }

    pub fn token_trivia(&self, token: TokenId) -> &str {
        &self.source[self.tokens[token.index()].trivia.clone()]
    }

    pub fn trailing_trivia(&self) -> &str {
        &self.source[self.trailing.clone()]
    }

    pub fn first_token(&self, node: NodeId) -> Option<TokenId> {
        self.children(node).iter().find_map(|e| match e {
            Element::Token(t) => Some(*t),
            Element::Node(n) => self.first_token(*n),
        })
    }

    pub fn last_token(&self, node: NodeId) -> Option<TokenId> {
        self.children(node).iter().rev().find_map(|e| match e {
            Element::Token(t) => Some(*t),
            Element::Node(n) => self.last_token(*n),
        })
    }

    /// Byte range of the node, excluding its leading trivia.
    pub fn text_range(&self, node: NodeId) -> Range<usize> {
        match (self.first_token(node), self.last_token(node)) {
            (Some(first), Some(last)) => {
                self.token(first).text.start..self.token(last).text.end
            }
            _ => 0..0,
        }
    }

    pub fn text(&self, node: NodeId) -> &str {
        &self.source[self.text_range(node)]
    }

    /// Trivia immediately before the node's first token.
    pub fn leading_trivia(&self, node: NodeId) -> &str {
        match self.first_token(node) {
            Some(first) => self.token_trivia(first),
            None => "",
        }
    }

    /// Whitespace that begins the line the node starts on.
    pub fn indentation(&self, node: NodeId) -> &str {
        let start = self.text_range(node).start;
        let line_start = self.source[..start].rfind('\n').map_or(0, |p| p + 1);
        let prefix = &self.source[line_start..start];
        let indent_len = prefix.len() - prefix.trim_start().len();
        &prefix[..indent_len]
    }

    /// "line:column" of the node's first token.
    pub fn location(&self, node: NodeId) -> String {
        let (line, column) = line_and_column(&self.source, self.text_range(node).start);
        format!("{}:{}", line, column)
    }

    /// Pre-order traversal of the subtree rooted at `node`, `node` included.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            order.push(current);
            let children: Vec<NodeId> = self.child_nodes(current).collect();
            stack.extend(children.into_iter().rev());
        }
        order
    }

    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), move |n| self.parent(*n))
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Render the tree back to text, applying the given substitutions.
    pub fn render_with(&self, overrides: &Overrides) -> String {
        let mut renderer = Renderer::new(self, overrides);
        renderer.node(self.root());
        renderer.push_str(self.trailing_trivia());
        renderer.finish()
    }

    /// Render the tree back to text unchanged.
    pub fn render(&self) -> String {
        self.render_with(&Overrides::default())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
// counter
module counter #(parameter W = 8) (
    input  logic         clk,
    input  logic [W-1:0] d,
    output logic [W-1:0] q
);
    always_ff @(posedge clk) begin
        q <= d; // latch
    end
endmodule
";

    #[test]
    fn test_lossless_round_trip() {
        let tree = SyntaxTree::parse(SOURCE).unwrap();
        assert_eq!(tree.render(), SOURCE);
    }

    #[test]
    fn test_fresh_ids_per_parse() {
        let a = SyntaxTree::parse(SOURCE).unwrap();
        let b = SyntaxTree::parse(SOURCE).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_text_excludes_leading_trivia() {
        let tree = SyntaxTree::parse(SOURCE).unwrap();
        let module = tree.find_child(tree.root(), SyntaxKind::ModuleDecl).unwrap();
        assert!(tree.text(module).starts_with("module counter"));
        assert_eq!(tree.leading_trivia(module), "// counter\n");
        assert!(tree.text(module).ends_with("endmodule"));
    }

    #[test]
    fn test_descendants_are_in_source_order() {
        let tree = SyntaxTree::parse(SOURCE).unwrap();
        let starts: Vec<usize> = tree
            .descendants(tree.root())
            .into_iter()
            .filter(|n| tree.kind(*n) == SyntaxKind::AnsiPort)
            .map(|n| tree.text_range(n).start)
            .collect();
        assert_eq!(starts.len(), 3);
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_indentation_and_location() {
        let tree = SyntaxTree::parse(SOURCE).unwrap();
        let stmt = tree
            .descendants(tree.root())
            .into_iter()
            .find(|n| tree.kind(*n) == SyntaxKind::AssignStmt)
            .unwrap();
        assert_eq!(tree.indentation(stmt), "        ");
        assert_eq!(tree.location(stmt), "8:9");
    }
}
