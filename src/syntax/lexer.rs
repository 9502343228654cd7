//! SystemVerilog lexer using Logos
//!
//! Produces every byte of the input as some lexeme, trivia included, so the
//! tree built on top of it can reproduce the source exactly.

use logos::Logos;
use std::fmt;
use std::ops::Range;

use super::ParseError;

/// Token types for the synthesizable SystemVerilog subset
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Trivia
    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,
    #[regex(r"//[^\n]*")]
    LineComment,
    #[regex(r"/\*[^*]*\*+([^/*][^*]*\*+)*/")]
    BlockComment,
    /// Attribute instance `(* ... *)`
    #[regex(r"\(\*[^)*][^*]*\*+([^)*][^*]*\*+)*\)")]
    Attribute,
    /// Compiler directive, up to the end of its line
    #[regex(r"`(define|undef|undefineall|ifdef|ifndef|elsif|else|endif|include|timescale|default_nettype|resetall|celldefine|endcelldefine|pragma|line|begin_keywords|end_keywords|unconnected_drive|nounconnected_drive)([^a-zA-Z0-9_$\n][^\n]*)?")]
    Directive,

    // Design units
    #[token("module")]
    KwModule,
    #[token("macromodule")]
    KwMacromodule,
    #[token("endmodule")]
    KwEndmodule,

    // Ports
    #[token("input")]
    KwInput,
    #[token("output")]
    KwOutput,
    #[token("inout")]
    KwInout,

    // Types
    #[token("wire")]
    KwWire,
    #[token("reg")]
    KwReg,
    #[token("logic")]
    KwLogic,
    #[token("bit")]
    KwBit,
    #[token("byte")]
    KwByte,
    #[token("int")]
    KwInt,
    #[token("integer")]
    KwInteger,
    #[token("shortint")]
    KwShortint,
    #[token("longint")]
    KwLongint,
    #[token("signed")]
    KwSigned,
    #[token("unsigned")]
    KwUnsigned,
    #[token("var")]
    KwVar,
    #[token("tri")]
    KwTri,
    #[token("supply0")]
    KwSupply0,
    #[token("supply1")]
    KwSupply1,
    #[token("genvar")]
    KwGenvar,

    // Declarations
    #[token("parameter")]
    KwParameter,
    #[token("localparam")]
    KwLocalparam,
    #[token("typedef")]
    KwTypedef,
    #[token("function")]
    KwFunction,
    #[token("endfunction")]
    KwEndfunction,
    #[token("task")]
    KwTask,
    #[token("endtask")]
    KwEndtask,
    #[token("generate")]
    KwGenerate,
    #[token("endgenerate")]
    KwEndgenerate,

    // Processes and statements
    #[token("assign")]
    KwAssign,
    #[token("always")]
    KwAlways,
    #[token("always_comb")]
    KwAlwaysComb,
    #[token("always_ff")]
    KwAlwaysFf,
    #[token("always_latch")]
    KwAlwaysLatch,
    #[token("initial")]
    KwInitial,
    #[token("final")]
    KwFinal,
    #[token("begin")]
    KwBegin,
    #[token("end")]
    KwEnd,
    #[token("if")]
    KwIf,
    #[token("else")]
    KwElse,
    #[token("case")]
    KwCase,
    #[token("casez")]
    KwCasez,
    #[token("casex")]
    KwCasex,
    #[token("endcase")]
    KwEndcase,
    #[token("default")]
    KwDefault,
    #[token("inside")]
    KwInside,
    #[token("unique")]
    KwUnique,
    #[token("unique0")]
    KwUnique0,
    #[token("priority")]
    KwPriority,
    #[token("posedge")]
    KwPosedge,
    #[token("negedge")]
    KwNegedge,
    #[token("or")]
    KwOr,
    #[token("for")]
    KwFor,
    #[token("while")]
    KwWhile,
    #[token("repeat")]
    KwRepeat,
    #[token("forever")]
    KwForever,

    // Identifiers and literals
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_$]*")]
    Ident,
    #[regex(r"\\[^ \t\r\n]+")]
    EscapedIdent,
    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_$]*")]
    SystemIdent,
    /// Macro usage such as `` `WIDTH ``
    #[regex(r"`[a-zA-Z_][a-zA-Z0-9_$]*")]
    MacroIdent,
    #[regex(r"[0-9][0-9_]*")]
    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*")]
    #[regex(r"([0-9][0-9_]*)?'[sS]?[bBoOdDhH][0-9a-fA-FxXzZ?_]+")]
    #[regex(r"'[01xXzZ]")]
    Number,
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    StringLit,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token("?")]
    Question,
    #[token("#")]
    Hash,
    #[token("@")]
    At,
    #[token("'")]
    Apostrophe,

    // Assignment
    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,

    // Operators
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    BangEqEq,
    #[token("<")]
    Lt,
    /// Both less-or-equal and nonblocking assignment
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~^")]
    TildeCaret,
    #[token("^~")]
    CaretTilde,
    #[token("~&")]
    TildeAmp,
    #[token("~|")]
    TildePipe,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("**")]
    StarStar,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("<<<")]
    AShl,
    #[token(">>>")]
    AShr,
    #[token("+:")]
    PlusColon,
    #[token("-:")]
    MinusColon,
    #[token("->")]
    Arrow,
}

impl TokenKind {
    /// Whitespace, comments, attributes and directives.
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace
                | TokenKind::LineComment
                | TokenKind::BlockComment
                | TokenKind::Attribute
                | TokenKind::Directive
        )
    }

    /// Keywords that may begin or make up a data type.
    pub fn is_type_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::KwWire
                | TokenKind::KwReg
                | TokenKind::KwLogic
                | TokenKind::KwBit
                | TokenKind::KwByte
                | TokenKind::KwInt
                | TokenKind::KwInteger
                | TokenKind::KwShortint
                | TokenKind::KwLongint
                | TokenKind::KwSigned
                | TokenKind::KwUnsigned
                | TokenKind::KwVar
                | TokenKind::KwTri
                | TokenKind::KwSupply0
                | TokenKind::KwSupply1
                | TokenKind::KwGenvar
        )
    }

    /// Net kinds carry no data type of their own.
    pub fn is_net_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::KwWire
                | TokenKind::KwTri
                | TokenKind::KwSupply0
                | TokenKind::KwSupply1
                | TokenKind::KwVar
        )
    }

    pub fn is_direction(self) -> bool {
        matches!(
            self,
            TokenKind::KwInput | TokenKind::KwOutput | TokenKind::KwInout
        )
    }

    pub fn is_identifier(self) -> bool {
        matches!(
            self,
            TokenKind::Ident | TokenKind::EscapedIdent | TokenKind::MacroIdent
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident | TokenKind::EscapedIdent => write!(f, "identifier"),
            TokenKind::SystemIdent => write!(f, "system identifier"),
            TokenKind::MacroIdent => write!(f, "macro"),
            TokenKind::Number => write!(f, "number"),
            TokenKind::StringLit => write!(f, "string"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::Semi => write!(f, "';'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::Eq => write!(f, "'='"),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A lexeme and the byte range it covers
#[derive(Debug, Clone)]
pub struct Lexeme {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

/// Tokenize the whole source, trivia included.
///
/// Fails on the first byte sequence that is not a SystemVerilog lexeme.
pub fn tokenize(source: &str) -> Result<Vec<Lexeme>, ParseError> {
    let mut lexer = TokenKind::lexer(source);
    let mut lexemes = Vec::new();
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(kind) => lexemes.push(Lexeme { kind, span }),
            Err(()) => {
                return Err(ParseError::at(
                    source,
                    span.start,
                    format!("unexpected character sequence '{}'", lexer.slice()),
                ));
            }
        }
    }
    Ok(lexemes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|l| l.kind)
            .filter(|k| !k.is_trivia())
            .collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("module top_1 endmodule"),
            vec![TokenKind::KwModule, TokenKind::Ident, TokenKind::KwEndmodule]
        );
        assert_eq!(kinds("modules"), vec![TokenKind::Ident]);
    }

    #[test]
    fn test_numbers() {
        for literal in ["42", "1_000", "8'hFF", "4'b10x0", "'d5", "'0", "16'sd3", "1.5"] {
            assert_eq!(kinds(literal), vec![TokenKind::Number], "{}", literal);
        }
    }

    #[test]
    fn test_nonblocking_and_comparison_share_token() {
        assert_eq!(
            kinds("q <= d"),
            vec![TokenKind::Ident, TokenKind::LtEq, TokenKind::Ident]
        );
    }

    #[test]
    fn test_event_star_is_not_attribute() {
        assert_eq!(
            kinds("@(*)"),
            vec![
                TokenKind::At,
                TokenKind::LParen,
                TokenKind::Star,
                TokenKind::RParen
            ]
        );
    }

    #[test]
    fn test_trivia_is_preserved() {
        let source = "`timescale 1ns/1ps\n// hello\n/* block */ (* keep *) wire a;";
        let lexemes = tokenize(source).unwrap();
        let rebuilt: String = lexemes.iter().map(|l| &source[l.span.clone()]).collect();
        assert_eq!(rebuilt, source);
        assert_eq!(lexemes[0].kind, TokenKind::Directive);
        assert!(lexemes.iter().any(|l| l.kind == TokenKind::Attribute));
    }

    #[test]
    fn test_directive_versus_macro_usage() {
        let lexemes = tokenize("`ifdef FORMAL\n`WIDTH").unwrap();
        assert_eq!(lexemes[0].kind, TokenKind::Directive);
        assert_eq!(lexemes[2].kind, TokenKind::MacroIdent);
    }

    #[test]
    fn test_unknown_character_is_an_error() {
        let err = tokenize("module m;\n  wire \u{00a7};\nendmodule").unwrap_err();
        assert_eq!(err.line_number, 2);
    }
}
