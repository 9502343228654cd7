//! Parameter concretization
//!
//! Evaluates parameter and localparam values that are integer constant
//! expressions, substitutes them at every read and folds the resulting
//! constant subexpressions, so that ranges such as `[W-1:0]` become
//! `[7:0]` and can be narrowed by the bit-shrink papercut.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::Result;
use crate::syntax::{NodeId, Overrides, Substitution, SyntaxKind, SyntaxTree, TokenKind};

/// A design with its constant parameters substituted
#[derive(Debug, Clone)]
pub struct Concretized {
    pub tree: SyntaxTree,
    /// Parameters that evaluated to constants, in declaration order
    pub parameters: Vec<(String, i64)>,
}

/// Substitute every parameter with a constant value and fold what becomes constant.
pub fn concretize(tree: &SyntaxTree) -> Result<Concretized> {
    let mut env: HashMap<String, i64> = HashMap::new();
    let mut parameters = Vec::new();

    for decl in tree.descendants(tree.root()) {
        if tree.kind(decl) != SyntaxKind::ParamDecl {
            continue;
        }
        for declarator in tree.child_nodes(decl) {
            if tree.kind(declarator) != SyntaxKind::Declarator {
                continue;
            }
            let Some(name) = tree
                .child_tokens(declarator)
                .find(|t| tree.token_kind(*t).is_identifier())
                .map(|t| tree.token_text(t).to_string())
            else {
                continue;
            };
            let value = tree
                .child_nodes(declarator)
                .find(|n| tree.kind(*n).is_expression())
                .and_then(|init| evaluate(tree, init, &env));
            match value {
                Some(value) => {
                    info!(parameter = %name, value, "Extracted parameter");
                    env.insert(name.clone(), value);
                    parameters.push((name, value));
                }
                None => debug!(parameter = %name, "Parameter left symbolic"),
            }
        }
    }

    if env.is_empty() {
        return Ok(Concretized {
            tree: tree.clone(),
            parameters,
        });
    }

    let mut overrides = Overrides::new();
    fold(tree, tree.root(), &env, &mut overrides);
    let text = tree.render_with(&overrides);
    Ok(Concretized {
        tree: SyntaxTree::parse(text)?,
        parameters,
    })
}

/// Replace maximal constant subtrees below `node`.
fn fold(tree: &SyntaxTree, node: NodeId, env: &HashMap<String, i64>, overrides: &mut Overrides) {
    let kind = tree.kind(node);
    if kind.is_expression() && kind != SyntaxKind::LiteralExpr && !has_sized_literal(tree, node) {
        if let Some(value) = evaluate(tree, node, env) {
            overrides.push(node, Substitution::text(render_value(value)));
            return;
        }
    }
    let children: Vec<NodeId> = tree.child_nodes(node).collect();
    for child in children {
        fold(tree, child, env, overrides);
    }
}

/// Sized and based literals take their width from the surrounding context,
/// so expressions containing them are never folded.
fn has_sized_literal(tree: &SyntaxTree, node: NodeId) -> bool {
    tree.descendants(node)
        .into_iter()
        .any(|n| tree.kind(n) == SyntaxKind::LiteralExpr && tree.text(n).contains('\''))
}

fn render_value(value: i64) -> String {
    if value < 0 {
        format!("({})", value)
    } else {
        value.to_string()
    }
}

/// Evaluate an integer constant expression, or `None` if it is not one.
pub fn evaluate(tree: &SyntaxTree, node: NodeId, env: &HashMap<String, i64>) -> Option<i64> {
    let operands: Vec<NodeId> = tree.child_nodes(node).collect();
    let operator = || {
        tree.child_tokens(node)
            .next()
            .map(|t| tree.token_kind(t))
    };
    match tree.kind(node) {
        SyntaxKind::LiteralExpr => parse_number(tree.text(node)),
        SyntaxKind::NameExpr => env.get(tree.text(node)).copied(),
        SyntaxKind::ParenExpr => evaluate(tree, *operands.first()?, env),
        SyntaxKind::UnaryExpr => {
            let value = evaluate(tree, *operands.first()?, env)?;
            match operator()? {
                TokenKind::Minus => value.checked_neg(),
                TokenKind::Plus => Some(value),
                TokenKind::Bang => Some((value == 0) as i64),
                _ => None,
            }
        }
        SyntaxKind::BinaryExpr => {
            let lhs = evaluate(tree, *operands.first()?, env)?;
            let rhs = evaluate(tree, *operands.get(1)?, env)?;
            binary(operator()?, lhs, rhs)
        }
        SyntaxKind::TernaryExpr => {
            let cond = evaluate(tree, *operands.first()?, env)?;
            let then_value = evaluate(tree, *operands.get(1)?, env)?;
            let else_value = evaluate(tree, *operands.get(2)?, env)?;
            Some(if cond != 0 { then_value } else { else_value })
        }
        SyntaxKind::CallExpr => {
            let callee = tree.first_token(node).map(|t| tree.token_text(t))?;
            let args = tree.find_child(node, SyntaxKind::ArgList)?;
            let arg = tree.child_nodes(args).next()?;
            match callee {
                "$clog2" => clog2(evaluate(tree, arg, env)?),
                _ => None,
            }
        }
        _ => None,
    }
}

fn binary(op: TokenKind, lhs: i64, rhs: i64) -> Option<i64> {
    match op {
        TokenKind::Plus => lhs.checked_add(rhs),
        TokenKind::Minus => lhs.checked_sub(rhs),
        TokenKind::Star => lhs.checked_mul(rhs),
        TokenKind::Slash => lhs.checked_div(rhs),
        TokenKind::Percent => lhs.checked_rem(rhs),
        TokenKind::StarStar => u32::try_from(rhs).ok().and_then(|e| lhs.checked_pow(e)),
        TokenKind::Shl | TokenKind::AShl => u32::try_from(rhs).ok().and_then(|s| lhs.checked_shl(s)),
        TokenKind::Shr | TokenKind::AShr => u32::try_from(rhs).ok().and_then(|s| lhs.checked_shr(s)),
        TokenKind::Amp => Some(lhs & rhs),
        TokenKind::Pipe => Some(lhs | rhs),
        TokenKind::Caret => Some(lhs ^ rhs),
        TokenKind::AmpAmp => Some((lhs != 0 && rhs != 0) as i64),
        TokenKind::PipePipe => Some((lhs != 0 || rhs != 0) as i64),
        TokenKind::EqEq | TokenKind::EqEqEq => Some((lhs == rhs) as i64),
        TokenKind::BangEq | TokenKind::BangEqEq => Some((lhs != rhs) as i64),
        TokenKind::Lt => Some((lhs < rhs) as i64),
        TokenKind::LtEq => Some((lhs <= rhs) as i64),
        TokenKind::Gt => Some((lhs > rhs) as i64),
        TokenKind::GtEq => Some((lhs >= rhs) as i64),
        _ => None,
    }
}

fn clog2(value: i64) -> Option<i64> {
    match value {
        v if v < 0 => None,
        0 | 1 => Some(0),
        v => Some(i64::from(64 - (v - 1).leading_zeros())),
    }
}

/// Value of an integer literal without `x`/`z` digits. Unbased fills such as
/// `'1` depend on context and are not evaluated.
pub fn parse_number(text: &str) -> Option<i64> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    match cleaned.find('\'') {
        None => cleaned.parse::<i64>().ok(),
        Some(tick) => {
            let rest = cleaned[tick + 1..].trim_start_matches(['s', 'S']);
            let mut chars = rest.chars();
            let radix = match chars.next()? {
                'b' | 'B' => 2,
                'o' | 'O' => 8,
                'd' | 'D' => 10,
                'h' | 'H' => 16,
                _ => return None,
            };
            i64::from_str_radix(chars.as_str(), radix).ok()
        }
    }
}
