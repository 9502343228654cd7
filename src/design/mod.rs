//! Module-level queries and edits on a parsed design
//!
//! Everything here works on the top module of a file: its name, its port
//! list, renaming it and appending the select inputs that drive mux-encoded
//! papercuts.

use std::collections::HashSet;
use std::fmt;

use crate::error::{PapercutError, Result};
use crate::syntax::{Element, NodeId, SyntaxKind, SyntaxTree, TextEdit, TokenId, TokenKind, apply_edits};

pub mod concretize;

pub use concretize::{Concretized, concretize};

/// Prefix of the select inputs added by mux encoding.
pub const SELECT_PREFIX: &str = "pc_sel";

/// Name of the `index`-th select input.
pub fn select_port(index: usize) -> String {
    format!("{}{}", SELECT_PREFIX, index)
}

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
    Inout,
}

impl Direction {
    fn from_token(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::KwInput => Some(Direction::Input),
            TokenKind::KwOutput => Some(Direction::Output),
            TokenKind::KwInout => Some(Direction::Inout),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
            Direction::Inout => write!(f, "inout"),
        }
    }
}

/// A port of the top module with its type normalized to a variable type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    pub direction: Direction,
    /// e.g. `logic signed [7:0]`
    pub ty: String,
}

/// The module that is not instantiated by any other module in the file.
pub fn top_module(tree: &SyntaxTree) -> Result<NodeId> {
    let modules: Vec<NodeId> = tree
        .child_nodes(tree.root())
        .filter(|n| tree.kind(*n) == SyntaxKind::ModuleDecl)
        .collect();
    let Some(last) = modules.last().copied() else {
        return Err(PapercutError::not_found("module declaration"));
    };
    if modules.len() == 1 {
        return Ok(last);
    }
    let instantiated: HashSet<&str> = tree
        .descendants(tree.root())
        .into_iter()
        .filter(|n| tree.kind(*n) == SyntaxKind::Instantiation)
        .filter_map(|n| tree.first_token(n))
        .map(|t| tree.token_text(t))
        .collect();
    for module in &modules {
        let name = module_name_token(tree, *module)?;
        if !instantiated.contains(tree.token_text(name)) {
            return Ok(*module);
        }
    }
    Ok(last)
}

fn header(tree: &SyntaxTree, module: NodeId) -> Result<NodeId> {
    tree.find_child(module, SyntaxKind::ModuleHeader)
        .ok_or_else(|| PapercutError::not_found("module header"))
}

fn module_name_token(tree: &SyntaxTree, module: NodeId) -> Result<TokenId> {
    let header = header(tree, module)?;
    tree.child_tokens(header)
        .find(|t| tree.token_kind(*t).is_identifier() && !is_lifetime(tree, *t))
        .ok_or_else(|| PapercutError::not_found("module name"))
}

fn is_lifetime(tree: &SyntaxTree, token: TokenId) -> bool {
    matches!(tree.token_text(token), "automatic" | "static")
}

/// Name of the top module.
pub fn module_name(tree: &SyntaxTree) -> Result<String> {
    let module = top_module(tree)?;
    Ok(tree.token_text(module_name_token(tree, module)?).to_string())
}

/// Copy of the design with the top module renamed.
pub fn rename_module(tree: &SyntaxTree, new_name: &str) -> Result<SyntaxTree> {
    let module = top_module(tree)?;
    let name = module_name_token(tree, module)?;
    let edit = TextEdit::new(tree.token(name).text.clone(), new_name);
    let text = apply_edits(tree.source(), vec![edit])?;
    Ok(SyntaxTree::parse(text)?)
}

/// Edit that renames the top module, for callers batching their own edits.
pub fn rename_edit(tree: &SyntaxTree, new_name: &str) -> Result<TextEdit> {
    let module = top_module(tree)?;
    let name = module_name_token(tree, module)?;
    Ok(TextEdit::new(tree.token(name).text.clone(), new_name))
}

/// Ports of the top module in declaration order.
pub fn ports(tree: &SyntaxTree) -> Result<Vec<Port>> {
    let module = top_module(tree)?;
    let header = header(tree, module)?;
    let Some(list) = tree.find_child(header, SyntaxKind::PortList) else {
        return Ok(Vec::new());
    };

    let ansi: Vec<NodeId> = tree
        .child_nodes(list)
        .filter(|n| tree.kind(*n) == SyntaxKind::AnsiPort)
        .collect();
    if !ansi.is_empty() {
        return Ok(ansi_ports(tree, &ansi));
    }

    let mut declared = Vec::new();
    for decl in tree.child_nodes(module) {
        if tree.kind(decl) != SyntaxKind::PortDecl {
            continue;
        }
        let direction = tree
            .child_tokens(decl)
            .find_map(|t| Direction::from_token(tree.token_kind(t)))
            .unwrap_or(Direction::Inout);
        let ty = tree
            .find_child(decl, SyntaxKind::DataType)
            .map(|t| normalize_type(tree, t))
            .unwrap_or_else(|| "logic".to_string());
        for declarator in tree.child_nodes(decl) {
            if tree.kind(declarator) == SyntaxKind::Declarator {
                if let Some(name) = first_identifier(tree, declarator) {
                    declared.push((name.to_string(), direction, ty.clone()));
                }
            }
        }
    }

    let mut ports = Vec::new();
    for port_ref in tree.child_nodes(list) {
        let Some(name) = first_identifier(tree, port_ref) else {
            continue;
        };
        let (_, direction, ty) = declared
            .iter()
            .find(|(declared_name, _, _)| declared_name == name)
            .ok_or_else(|| PapercutError::not_found(format!("declaration of port '{}'", name)))?;
        ports.push(Port {
            name: name.to_string(),
            direction: *direction,
            ty: ty.clone(),
        });
    }
    Ok(ports)
}

/// ANSI ports without a direction or type inherit them from the previous port.
fn ansi_ports(tree: &SyntaxTree, nodes: &[NodeId]) -> Vec<Port> {
    let mut direction = Direction::Inout;
    let mut ty = "logic".to_string();
    let mut ports = Vec::new();
    for port in nodes {
        let port_direction = tree
            .child_tokens(*port)
            .find_map(|t| Direction::from_token(tree.token_kind(t)));
        let port_type = tree.find_child(*port, SyntaxKind::DataType);
        match (port_direction, port_type) {
            (Some(d), Some(t)) => {
                direction = d;
                ty = normalize_type(tree, t);
            }
            (Some(d), None) => {
                direction = d;
                ty = "logic".to_string();
            }
            (None, Some(t)) => ty = normalize_type(tree, t),
            (None, None) => {}
        }
        if let Some(name) = first_identifier(tree, *port) {
            ports.push(Port {
                name: name.to_string(),
                direction,
                ty: ty.clone(),
            });
        }
    }
    ports
}

fn first_identifier(tree: &SyntaxTree, node: NodeId) -> Option<&str> {
    tree.child_tokens(node)
        .find(|t| tree.token_kind(*t).is_identifier())
        .map(|t| tree.token_text(t))
}

/// Reduce a declared type to a variable type: net keywords and `reg` are
/// dropped and `logic` is supplied when no data type remains.
pub fn normalize_type(tree: &SyntaxTree, data_type: NodeId) -> String {
    let mut base = String::new();
    let mut signing = None;
    let mut dims = Vec::new();
    for element in tree.children(data_type) {
        match element {
            Element::Token(t) => {
                let kind = tree.token_kind(*t);
                match kind {
                    TokenKind::KwSigned | TokenKind::KwUnsigned => signing = Some(tree.token_text(*t)),
                    TokenKind::KwReg => {}
                    k if k.is_net_keyword() => {}
                    _ => base.push_str(tree.token_text(*t)),
                }
            }
            Element::Node(n) => dims.push(tree.text(*n)),
        }
    }
    let mut parts = vec![if base.is_empty() { "logic".to_string() } else { base }];
    parts.extend(signing.map(str::to_string));
    parts.extend(dims.into_iter().map(str::to_string));
    parts.join(" ")
}

/// Copy of the design with `count` single-bit select inputs `pc_sel0..`
/// prepended to the top module's ports.
pub fn add_select_inputs(tree: &SyntaxTree, count: usize) -> Result<SyntaxTree> {
    if count == 0 {
        return Ok(tree.clone());
    }
    let names = (0..count).map(select_port).collect::<Vec<_>>().join(", ");
    let module = top_module(tree)?;
    let header = header(tree, module)?;

    let mut edits = Vec::new();
    match tree.find_child(header, SyntaxKind::PortList) {
        None => {
            let semi = tree
                .find_token(header, TokenKind::Semi)
                .ok_or_else(|| PapercutError::not_found("module header ';'"))?;
            let at = tree.token(semi).text.start;
            edits.push(TextEdit::new(at..at, format!(" (input logic {})", names)));
        }
        Some(list) => {
            let open = tree
                .first_token(list)
                .ok_or_else(|| PapercutError::not_found("port list '('"))?;
            let after_open = tree.token(open).text.end;
            let mut entries = tree.child_nodes(list).peekable();
            match entries.peek().map(|n| tree.kind(*n)) {
                None => edits.push(TextEdit::new(
                    after_open..after_open,
                    format!("input logic {}", names),
                )),
                Some(SyntaxKind::AnsiPort) => edits.push(TextEdit::new(
                    after_open..after_open,
                    format!("input logic {}, ", names),
                )),
                Some(_) => {
                    edits.push(TextEdit::new(after_open..after_open, format!("{}, ", names)));
                    let indent = tree
                        .child_nodes(module)
                        .find(|n| *n != header)
                        .map(|n| tree.indentation(n).to_string())
                        .unwrap_or_else(|| "  ".to_string());
                    let header_end = tree.text_range(header).end;
                    edits.push(TextEdit::new(
                        header_end..header_end,
                        format!("\n{}input logic {};", indent, names),
                    ));
                }
            }
        }
    }
    let text = apply_edits(tree.source(), edits)?;
    Ok(SyntaxTree::parse(text)?)
}
