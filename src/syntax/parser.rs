//! Recursive-descent parser for the synthesizable SystemVerilog subset
//!
//! Builds the arena tree directly. Constructs the rewriting passes do not
//! look into (functions, tasks, typedefs, packages, assertions) are kept as
//! opaque token runs so the tree still covers every byte of the input.

use super::ParseError;
use super::lexer::{self, TokenKind};
use super::tree::{Element, NodeData, NodeId, SyntaxKind, SyntaxTree, TokenData, TokenId};

type PResult<T> = Result<T, ParseError>;

/// Parse a whole source file into a tree.
pub(crate) fn parse(source: String) -> PResult<SyntaxTree> {
    let lexemes = lexer::tokenize(&source)?;
    let mut tokens = Vec::with_capacity(lexemes.len());
    let mut trivia_start = 0;
    for lexeme in lexemes {
        if lexeme.kind.is_trivia() {
            continue;
        }
        tokens.push(TokenData {
            kind: lexeme.kind,
            trivia: trivia_start..lexeme.span.start,
            text: lexeme.span.clone(),
        });
        trivia_start = lexeme.span.end;
    }
    let trailing = trivia_start..source.len();

    let (tokens, nodes) = {
        let mut parser = Parser::new(&source, tokens);
        parser.source_file()?;
        (parser.tokens, parser.nodes)
    };
    Ok(SyntaxTree::from_parts(source, tokens, nodes, trailing))
}

/// Named constructs skipped as a whole, by opening and closing word.
const OPAQUE_BLOCKS: &[(&str, &str)] = &[
    ("function", "endfunction"),
    ("task", "endtask"),
    ("package", "endpackage"),
    ("interface", "endinterface"),
    ("class", "endclass"),
    ("program", "endprogram"),
    ("covergroup", "endgroup"),
    ("property", "endproperty"),
    ("sequence", "endsequence"),
    ("clocking", "endclocking"),
    ("checker", "endchecker"),
    ("primitive", "endprimitive"),
    ("specify", "endspecify"),
    ("config", "endconfig"),
    ("fork", "join"),
];

#[derive(Debug, Clone, Copy)]
struct Checkpoint {
    parent: NodeId,
    index: usize,
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<TokenData>,
    pos: usize,
    nodes: Vec<NodeData>,
    stack: Vec<NodeId>,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str, tokens: Vec<TokenData>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            nodes: Vec::new(),
            stack: Vec::new(),
        }
    }

    // --- Token cursor ---

    fn nth(&self, n: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + n).map(|t| t.kind)
    }

    fn peek(&self) -> Option<TokenKind> {
        self.nth(0)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == Some(kind)
    }

    fn nth_is_ident(&self, n: usize) -> bool {
        self.nth(n).is_some_and(|k| k.is_identifier())
    }

    fn current_text(&self) -> &'s str {
        match self.tokens.get(self.pos) {
            Some(token) => &self.source[token.text.clone()],
            None => "",
        }
    }

    fn at_word(&self, word: &str) -> bool {
        self.peek().is_some() && self.current_text() == word
    }

    fn bump(&mut self) {
        if self.pos < self.tokens.len() {
            let token = TokenId(self.pos as u32);
            if let Some(top) = self.stack.last() {
                self.nodes[top.index()].children.push(Element::Token(token));
            }
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", kind)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> PResult<()> {
        if self.nth_is_ident(0) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let message = message.into();
        match self.tokens.get(self.pos) {
            Some(token) => ParseError::at(
                self.source,
                token.text.start,
                format!("{}, found '{}'", message, self.current_text()),
            ),
            None => ParseError::at(
                self.source,
                self.source.len(),
                format!("{}, found end of file", message),
            ),
        }
    }

    // --- Tree building ---

    fn start(&mut self, kind: SyntaxKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let parent = self.stack.last().copied();
        self.nodes.push(NodeData {
            kind,
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent.index()].children.push(Element::Node(id));
        }
        self.stack.push(id);
        id
    }

    fn finish(&mut self) {
        self.stack.pop();
    }

    fn checkpoint(&self) -> Checkpoint {
        let parent = self.stack.last().copied().unwrap_or(NodeId(0));
        Checkpoint {
            parent,
            index: self.nodes[parent.index()].children.len(),
        }
    }

    /// Open a node that adopts everything emitted since `checkpoint`.
    fn start_at(&mut self, checkpoint: Checkpoint, kind: SyntaxKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let adopted = self.nodes[checkpoint.parent.index()]
            .children
            .split_off(checkpoint.index);
        for element in &adopted {
            if let Element::Node(child) = element {
                self.nodes[child.index()].parent = Some(id);
            }
        }
        self.nodes.push(NodeData {
            kind,
            parent: Some(checkpoint.parent),
            children: adopted,
        });
        self.nodes[checkpoint.parent.index()]
            .children
            .push(Element::Node(id));
        self.stack.push(id);
        id
    }

    fn retag(&mut self, node: NodeId, kind: SyntaxKind) {
        self.nodes[node.index()].kind = kind;
    }

    // --- Skipping helpers ---

    /// Consume tokens through the next `;` outside any brackets.
    fn skip_to_semi(&mut self) -> PResult<()> {
        let mut depth = 0usize;
        loop {
            let Some(kind) = self.peek() else {
                return Err(self.error("expected ';'"));
            };
            if depth == 0 && kind == TokenKind::KwEndmodule {
                return Err(self.error("expected ';'"));
            }
            match kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                TokenKind::Semi if depth == 0 => {
                    self.bump();
                    return Ok(());
                }
                _ => {}
            }
            self.bump();
        }
    }

    /// Consume a balanced `( ... )` group.
    fn skip_parens(&mut self) -> PResult<()> {
        self.expect(TokenKind::LParen)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                None => return Err(self.error("expected ')'")),
                Some(TokenKind::LParen) => depth += 1,
                Some(TokenKind::RParen) => depth -= 1,
                _ => {}
            }
            self.bump();
        }
        Ok(())
    }

    /// Consume a balanced `{ ... }` group.
    fn skip_braces(&mut self) -> PResult<()> {
        self.expect(TokenKind::LBrace)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                None => return Err(self.error("expected '}'")),
                Some(TokenKind::LBrace) => depth += 1,
                Some(TokenKind::RBrace) => depth -= 1,
                _ => {}
            }
            self.bump();
        }
        Ok(())
    }

    fn opaque_block_end(&self) -> Option<(&'static str, &'static str)> {
        let text = self.current_text();
        OPAQUE_BLOCKS.iter().copied().find(|(open, _)| *open == text)
    }

    /// Consume a named block through its matching closing word.
    fn skip_block(&mut self, open: &str, close: &str) -> PResult<()> {
        let mut depth = 0usize;
        loop {
            if self.peek().is_none() {
                return Err(self.error(format!("expected '{}'", close)));
            }
            let text = self.current_text();
            if text == open {
                depth += 1;
            } else if text == close || (close == "join" && text.starts_with("join")) {
                depth = depth.saturating_sub(1);
            }
            self.bump();
            if depth == 0 {
                break;
            }
        }
        self.label_suffix();
        Ok(())
    }

    /// Optional `: label` after an end keyword.
    fn label_suffix(&mut self) {
        if self.at(TokenKind::Colon) && self.nth_is_ident(1) {
            self.bump();
            self.bump();
        }
    }

    // --- Design units ---

    fn source_file(&mut self) -> PResult<()> {
        self.start(SyntaxKind::SourceFile);
        while let Some(kind) = self.peek() {
            match kind {
                TokenKind::KwModule | TokenKind::KwMacromodule => self.module_decl()?,
                _ => self.opaque_item()?,
            }
        }
        self.finish();
        Ok(())
    }

    fn module_decl(&mut self) -> PResult<()> {
        self.start(SyntaxKind::ModuleDecl);
        self.module_header()?;
        while !self.at(TokenKind::KwEndmodule) {
            if self.peek().is_none() {
                return Err(self.error("expected 'endmodule'"));
            }
            self.module_item()?;
        }
        self.bump();
        self.label_suffix();
        self.finish();
        Ok(())
    }

    fn module_header(&mut self) -> PResult<()> {
        self.start(SyntaxKind::ModuleHeader);
        self.bump();
        if self.at_word("automatic") || self.at_word("static") {
            self.bump();
        }
        self.expect_ident("module name")?;
        while self.at_word("import") {
            self.skip_to_semi()?;
        }
        if self.at(TokenKind::Hash) {
            self.param_port_list()?;
        }
        if self.at(TokenKind::LParen) {
            self.port_list()?;
        }
        self.expect(TokenKind::Semi)?;
        self.finish();
        Ok(())
    }

    fn param_port_list(&mut self) -> PResult<()> {
        self.start(SyntaxKind::ParamPortList);
        self.bump();
        self.expect(TokenKind::LParen)?;
        if !self.at(TokenKind::RParen) {
            loop {
                self.start(SyntaxKind::ParamDecl);
                if !self.eat(TokenKind::KwParameter) {
                    self.eat(TokenKind::KwLocalparam);
                }
                self.data_type_opt(false)?;
                self.declarator()?;
                self.finish();
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        self.finish();
        Ok(())
    }

    fn port_list(&mut self) -> PResult<()> {
        self.start(SyntaxKind::PortList);
        self.bump();
        if self.eat(TokenKind::RParen) {
            self.finish();
            return Ok(());
        }
        let ansi = match self.peek() {
            Some(kind) if kind.is_direction() || kind.is_type_keyword() => true,
            Some(TokenKind::LBracket) => true,
            Some(TokenKind::Ident) => self.at_word("ref") || self.nth_is_ident(1),
            _ => false,
        };
        loop {
            if ansi {
                self.ansi_port()?;
            } else {
                self.port_ref()?;
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        self.finish();
        Ok(())
    }

    fn ansi_port(&mut self) -> PResult<()> {
        self.start(SyntaxKind::AnsiPort);
        if self.peek().is_some_and(|k| k.is_direction()) || self.at_word("ref") {
            self.bump();
        }
        self.data_type_opt(false)?;
        self.expect_ident("port name")?;
        while self.at(TokenKind::LBracket) {
            self.dimension(SyntaxKind::UnpackedDim)?;
        }
        if self.eat(TokenKind::Eq) {
            self.expr()?;
        }
        self.finish();
        Ok(())
    }

    fn port_ref(&mut self) -> PResult<()> {
        self.start(SyntaxKind::PortRef);
        if self.eat(TokenKind::Dot) {
            self.expect_ident("port name")?;
            self.expect(TokenKind::LParen)?;
            if !self.at(TokenKind::RParen) {
                self.expr()?;
            }
            self.expect(TokenKind::RParen)?;
        } else {
            self.expect_ident("port name")?;
        }
        self.finish();
        Ok(())
    }

    // --- Module items ---

    fn module_item(&mut self) -> PResult<()> {
        let Some(kind) = self.peek() else {
            return Err(self.error("expected module item"));
        };
        match kind {
            k if k.is_direction() => self.port_decl(),
            TokenKind::KwParameter | TokenKind::KwLocalparam => self.param_decl(),
            TokenKind::KwAssign => self.continuous_assign(),
            TokenKind::KwAlways
            | TokenKind::KwAlwaysComb
            | TokenKind::KwAlwaysFf
            | TokenKind::KwAlwaysLatch
            | TokenKind::KwInitial
            | TokenKind::KwFinal => self.procedural_block(),
            TokenKind::KwGenerate => self.generate_region(),
            TokenKind::KwIf
            | TokenKind::KwFor
            | TokenKind::KwCase
            | TokenKind::KwCasez
            | TokenKind::KwCasex
            | TokenKind::KwBegin => self.generate_construct(),
            k if k.is_type_keyword() => self.data_decl(),
            TokenKind::Ident => {
                if self.opaque_block_end().is_some() {
                    self.opaque_item()
                } else if self.nth(1) == Some(TokenKind::Hash)
                    || (self.nth_is_ident(1) && self.nth(2) == Some(TokenKind::LParen))
                {
                    self.instantiation()
                } else if self.nth_is_ident(1)
                    || self.nth(1) == Some(TokenKind::LBracket)
                    || self.nth(1) == Some(TokenKind::ColonColon)
                {
                    self.data_decl()
                } else {
                    self.opaque_item()
                }
            }
            _ => self.opaque_item(),
        }
    }

    fn opaque_item(&mut self) -> PResult<()> {
        self.start(SyntaxKind::OpaqueItem);
        match self.peek() {
            Some(TokenKind::KwFunction) => self.skip_block("function", "endfunction")?,
            Some(TokenKind::KwTask) => self.skip_block("task", "endtask")?,
            _ => match self.opaque_block_end() {
                Some((open, close)) => self.skip_block(open, close)?,
                None => self.skip_to_semi()?,
            },
        }
        self.finish();
        Ok(())
    }

    fn port_decl(&mut self) -> PResult<()> {
        self.start(SyntaxKind::PortDecl);
        self.bump();
        self.data_type_opt(true)?;
        self.declarator()?;
        while self.eat(TokenKind::Comma) {
            self.declarator()?;
        }
        self.expect(TokenKind::Semi)?;
        self.finish();
        Ok(())
    }

    fn param_decl(&mut self) -> PResult<()> {
        self.start(SyntaxKind::ParamDecl);
        self.bump();
        self.data_type_opt(false)?;
        self.declarator()?;
        while self.eat(TokenKind::Comma) {
            self.declarator()?;
        }
        self.expect(TokenKind::Semi)?;
        self.finish();
        Ok(())
    }

    fn data_decl(&mut self) -> PResult<()> {
        self.start(SyntaxKind::DataDecl);
        if !self.data_type_opt(true)? {
            return Err(self.error("expected data type"));
        }
        self.declarator()?;
        while self.eat(TokenKind::Comma) {
            self.declarator()?;
        }
        self.expect(TokenKind::Semi)?;
        self.finish();
        Ok(())
    }

    /// Parse a data type if one starts here. A leading identifier counts as a
    /// user type only when another identifier (or, with `dims_after_user`, a
    /// packed dimension) follows it.
    fn data_type_opt(&mut self, dims_after_user: bool) -> PResult<bool> {
        let starts_type = match self.peek() {
            Some(kind) if kind.is_type_keyword() => true,
            Some(TokenKind::LBracket) => true,
            Some(TokenKind::Ident) => {
                self.nth_is_ident(1)
                    || self.nth(1) == Some(TokenKind::ColonColon)
                    || (dims_after_user && self.nth(1) == Some(TokenKind::LBracket))
            }
            _ => false,
        };
        if !starts_type {
            return Ok(false);
        }
        self.start(SyntaxKind::DataType);
        if self.at(TokenKind::Ident) {
            self.bump();
            if self.eat(TokenKind::ColonColon) {
                self.expect_ident("type name")?;
            }
        }
        while self.peek().is_some_and(|k| k.is_type_keyword()) {
            self.bump();
        }
        while self.at(TokenKind::LBracket) {
            self.dimension(SyntaxKind::PackedDim)?;
        }
        self.finish();
        Ok(true)
    }

    fn dimension(&mut self, kind: SyntaxKind) -> PResult<()> {
        self.start(kind);
        self.expect(TokenKind::LBracket)?;
        if !self.at(TokenKind::RBracket) {
            self.expr()?;
            if matches!(
                self.peek(),
                Some(TokenKind::Colon | TokenKind::PlusColon | TokenKind::MinusColon)
            ) {
                self.bump();
                self.expr()?;
            }
        }
        self.expect(TokenKind::RBracket)?;
        self.finish();
        Ok(())
    }

    fn declarator(&mut self) -> PResult<()> {
        self.start(SyntaxKind::Declarator);
        self.expect_ident("name")?;
        while self.at(TokenKind::LBracket) {
            self.dimension(SyntaxKind::UnpackedDim)?;
        }
        if self.eat(TokenKind::Eq) {
            self.expr()?;
        }
        self.finish();
        Ok(())
    }

    fn continuous_assign(&mut self) -> PResult<()> {
        self.start(SyntaxKind::ContinuousAssign);
        self.bump();
        if self.at(TokenKind::Hash) {
            self.delay()?;
        }
        loop {
            self.start(SyntaxKind::Assignment);
            self.postfix()?;
            self.expect(TokenKind::Eq)?;
            self.expr()?;
            self.finish();
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semi)?;
        self.finish();
        Ok(())
    }

    fn delay(&mut self) -> PResult<()> {
        self.bump();
        if self.at(TokenKind::LParen) {
            self.primary()
        } else {
            self.bump();
            Ok(())
        }
    }

    fn procedural_block(&mut self) -> PResult<()> {
        self.start(SyntaxKind::ProceduralBlock);
        self.bump();
        self.statement()?;
        self.finish();
        Ok(())
    }

    fn instantiation(&mut self) -> PResult<()> {
        self.start(SyntaxKind::Instantiation);
        self.bump();
        if self.at(TokenKind::Hash) {
            self.start(SyntaxKind::ParamOverrides);
            self.bump();
            if self.eat(TokenKind::LParen) {
                self.connections()?;
                self.expect(TokenKind::RParen)?;
            } else {
                self.bump();
            }
            self.finish();
        }
        loop {
            self.start(SyntaxKind::Instance);
            self.expect_ident("instance name")?;
            while self.at(TokenKind::LBracket) {
                self.dimension(SyntaxKind::UnpackedDim)?;
            }
            self.expect(TokenKind::LParen)?;
            self.connections()?;
            self.expect(TokenKind::RParen)?;
            self.finish();
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semi)?;
        self.finish();
        Ok(())
    }

    fn connections(&mut self) -> PResult<()> {
        while !self.at(TokenKind::RParen) {
            if self.peek().is_none() {
                return Err(self.error("expected ')'"));
            }
            if !self.at(TokenKind::Comma) {
                self.start(SyntaxKind::PortConnection);
                if self.eat(TokenKind::Dot) {
                    if !self.eat(TokenKind::Star) {
                        self.expect_ident("port name")?;
                        if self.eat(TokenKind::LParen) {
                            if !self.at(TokenKind::RParen) {
                                self.expr()?;
                            }
                            self.expect(TokenKind::RParen)?;
                        }
                    }
                } else {
                    self.expr()?;
                }
                self.finish();
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(())
    }

    fn generate_region(&mut self) -> PResult<()> {
        self.start(SyntaxKind::GenerateRegion);
        self.bump();
        while !self.at(TokenKind::KwEndgenerate) {
            if self.peek().is_none() {
                return Err(self.error("expected 'endgenerate'"));
            }
            self.module_item()?;
        }
        self.bump();
        self.finish();
        Ok(())
    }

    /// Generate `if`, `for`, `case` and bare `begin ... end` blocks.
    fn generate_construct(&mut self) -> PResult<()> {
        self.start(SyntaxKind::GenerateRegion);
        match self.peek() {
            Some(TokenKind::KwIf) => {
                self.bump();
                self.skip_parens()?;
                self.generate_body()?;
                if self.eat(TokenKind::KwElse) {
                    self.generate_body()?;
                }
            }
            Some(TokenKind::KwFor) => {
                self.bump();
                self.skip_parens()?;
                self.generate_body()?;
            }
            Some(TokenKind::KwCase | TokenKind::KwCasez | TokenKind::KwCasex) => {
                self.bump();
                self.skip_parens()?;
                while !self.at(TokenKind::KwEndcase) {
                    if self.peek().is_none() {
                        return Err(self.error("expected 'endcase'"));
                    }
                    if self.eat(TokenKind::KwDefault) {
                        self.eat(TokenKind::Colon);
                    } else {
                        while !self.eat(TokenKind::Colon) {
                            if self.peek().is_none() {
                                return Err(self.error("expected ':'"));
                            }
                            self.bump();
                        }
                    }
                    self.generate_body()?;
                }
                self.bump();
            }
            _ => self.generate_body()?,
        }
        self.finish();
        Ok(())
    }

    fn generate_body(&mut self) -> PResult<()> {
        if !self.eat(TokenKind::KwBegin) {
            return self.module_item();
        }
        self.label_suffix();
        while !self.at(TokenKind::KwEnd) {
            if self.peek().is_none() {
                return Err(self.error("expected 'end'"));
            }
            self.module_item()?;
        }
        self.bump();
        self.label_suffix();
        Ok(())
    }

    // --- Statements ---

    fn statement(&mut self) -> PResult<()> {
        let Some(kind) = self.peek() else {
            return Err(self.error("expected statement"));
        };
        match kind {
            TokenKind::KwBegin => self.block_stmt(),
            TokenKind::KwUnique | TokenKind::KwUnique0 | TokenKind::KwPriority => {
                match self.nth(1) {
                    Some(TokenKind::KwIf) => self.if_stmt(),
                    Some(TokenKind::KwCase | TokenKind::KwCasez | TokenKind::KwCasex) => {
                        self.case_stmt()
                    }
                    _ => self.opaque_stmt(),
                }
            }
            TokenKind::KwIf => self.if_stmt(),
            TokenKind::KwCase | TokenKind::KwCasez | TokenKind::KwCasex => self.case_stmt(),
            TokenKind::At | TokenKind::Hash => self.timing_stmt(),
            TokenKind::KwFor | TokenKind::KwWhile | TokenKind::KwRepeat | TokenKind::KwForever => {
                self.loop_stmt()
            }
            TokenKind::Semi => {
                self.start(SyntaxKind::NullStmt);
                self.bump();
                self.finish();
                Ok(())
            }
            k if k.is_type_keyword() => self.data_decl(),
            TokenKind::Ident if self.opaque_block_end().is_some() => {
                self.start(SyntaxKind::OpaqueStmt);
                if let Some((open, close)) = self.opaque_block_end() {
                    self.skip_block(open, close)?;
                }
                self.finish();
                Ok(())
            }
            TokenKind::Ident
            | TokenKind::EscapedIdent
            | TokenKind::SystemIdent
            | TokenKind::MacroIdent
            | TokenKind::LBrace => self.assign_or_call_stmt(),
            _ => self.opaque_stmt(),
        }
    }

    fn opaque_stmt(&mut self) -> PResult<()> {
        self.start(SyntaxKind::OpaqueStmt);
        self.skip_to_semi()?;
        self.finish();
        Ok(())
    }

    fn block_stmt(&mut self) -> PResult<()> {
        self.start(SyntaxKind::BlockStmt);
        self.bump();
        self.label_suffix();
        while !self.at(TokenKind::KwEnd) {
            if self.peek().is_none() {
                return Err(self.error("expected 'end'"));
            }
            self.statement()?;
        }
        self.bump();
        self.label_suffix();
        self.finish();
        Ok(())
    }

    fn if_stmt(&mut self) -> PResult<()> {
        self.start(SyntaxKind::IfStmt);
        if !self.at(TokenKind::KwIf) {
            self.bump();
        }
        self.expect(TokenKind::KwIf)?;
        self.expect(TokenKind::LParen)?;
        self.expr()?;
        self.expect(TokenKind::RParen)?;
        self.statement()?;
        if self.at(TokenKind::KwElse) {
            self.start(SyntaxKind::ElseClause);
            self.bump();
            self.statement()?;
            self.finish();
        }
        self.finish();
        Ok(())
    }

    fn case_stmt(&mut self) -> PResult<()> {
        self.start(SyntaxKind::CaseStmt);
        if matches!(
            self.peek(),
            Some(TokenKind::KwUnique | TokenKind::KwUnique0 | TokenKind::KwPriority)
        ) {
            self.bump();
        }
        self.bump();
        self.expect(TokenKind::LParen)?;
        self.expr()?;
        self.expect(TokenKind::RParen)?;
        self.eat(TokenKind::KwInside);
        while !self.at(TokenKind::KwEndcase) {
            if self.peek().is_none() {
                return Err(self.error("expected 'endcase'"));
            }
            self.case_item()?;
        }
        self.bump();
        self.finish();
        Ok(())
    }

    fn case_item(&mut self) -> PResult<()> {
        if self.at(TokenKind::KwDefault) {
            self.start(SyntaxKind::DefaultItem);
            self.bump();
            self.eat(TokenKind::Colon);
        } else {
            self.start(SyntaxKind::CaseItem);
            loop {
                self.expr()?;
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Colon)?;
        }
        self.statement()?;
        self.finish();
        Ok(())
    }

    fn timing_stmt(&mut self) -> PResult<()> {
        self.start(SyntaxKind::TimingStmt);
        if self.at(TokenKind::At) {
            self.event_control()?;
        } else {
            self.delay()?;
        }
        self.statement()?;
        self.finish();
        Ok(())
    }

    fn event_control(&mut self) -> PResult<()> {
        self.start(SyntaxKind::EventControl);
        self.bump();
        if !self.eat(TokenKind::Star) {
            if self.eat(TokenKind::LParen) {
                if !self.eat(TokenKind::Star) {
                    loop {
                        if !self.eat(TokenKind::KwPosedge) {
                            self.eat(TokenKind::KwNegedge);
                        }
                        self.expr()?;
                        if !(self.eat(TokenKind::KwOr) || self.eat(TokenKind::Comma)) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen)?;
            } else {
                self.expect_ident("event")?;
            }
        }
        self.finish();
        Ok(())
    }

    fn loop_stmt(&mut self) -> PResult<()> {
        self.start(SyntaxKind::LoopStmt);
        let forever = self.at(TokenKind::KwForever);
        self.bump();
        if !forever {
            self.skip_parens()?;
        }
        self.statement()?;
        self.finish();
        Ok(())
    }

    fn assign_or_call_stmt(&mut self) -> PResult<()> {
        if self.at(TokenKind::Ident) && self.nth_is_ident(1) {
            return self.data_decl();
        }
        let node = self.start(SyntaxKind::AssignStmt);
        self.postfix()?;
        match self.peek() {
            Some(TokenKind::Eq | TokenKind::LtEq) => {
                self.bump();
                if self.at(TokenKind::Hash) {
                    self.delay()?;
                }
                self.expr()?;
            }
            Some(
                TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::StarEq
                | TokenKind::AmpEq
                | TokenKind::PipeEq
                | TokenKind::CaretEq,
            ) => {
                self.retag(node, SyntaxKind::OpaqueStmt);
                self.bump();
                self.expr()?;
            }
            Some(TokenKind::PlusPlus | TokenKind::MinusMinus) => {
                self.retag(node, SyntaxKind::OpaqueStmt);
                self.bump();
            }
            _ => self.retag(node, SyntaxKind::ExprStmt),
        }
        self.expect(TokenKind::Semi)?;
        self.finish();
        Ok(())
    }

    // --- Expressions ---

    pub(crate) fn expr(&mut self) -> PResult<()> {
        let checkpoint = self.checkpoint();
        self.binary(0)?;
        if self.at(TokenKind::Question) {
            self.start_at(checkpoint, SyntaxKind::TernaryExpr);
            self.bump();
            self.expr()?;
            self.expect(TokenKind::Colon)?;
            self.expr()?;
            self.finish();
        }
        Ok(())
    }

    fn binary(&mut self, min_bp: u8) -> PResult<()> {
        let checkpoint = self.checkpoint();
        self.unary()?;
        while let Some((left_bp, right_bp)) = self.peek().and_then(infix_binding_power) {
            if left_bp < min_bp {
                break;
            }
            self.start_at(checkpoint, SyntaxKind::BinaryExpr);
            self.bump();
            self.binary(right_bp)?;
            self.finish();
        }
        Ok(())
    }

    fn unary(&mut self) -> PResult<()> {
        let is_prefix = matches!(
            self.peek(),
            Some(
                TokenKind::Bang
                    | TokenKind::Tilde
                    | TokenKind::Amp
                    | TokenKind::Pipe
                    | TokenKind::Caret
                    | TokenKind::TildeAmp
                    | TokenKind::TildePipe
                    | TokenKind::TildeCaret
                    | TokenKind::CaretTilde
                    | TokenKind::Plus
                    | TokenKind::Minus
            )
        );
        if is_prefix {
            self.start(SyntaxKind::UnaryExpr);
            self.bump();
            self.unary()?;
            self.finish();
            Ok(())
        } else {
            self.postfix()
        }
    }

    fn postfix(&mut self) -> PResult<()> {
        let checkpoint = self.checkpoint();
        self.primary()?;
        loop {
            match self.peek() {
                Some(TokenKind::LBracket) => {
                    self.start_at(checkpoint, SyntaxKind::SelectExpr);
                    self.bump();
                    self.expr()?;
                    if matches!(
                        self.peek(),
                        Some(TokenKind::Colon | TokenKind::PlusColon | TokenKind::MinusColon)
                    ) {
                        self.bump();
                        self.expr()?;
                    }
                    self.expect(TokenKind::RBracket)?;
                    self.finish();
                }
                Some(TokenKind::Dot) if self.nth_is_ident(1) => {
                    self.start_at(checkpoint, SyntaxKind::MemberExpr);
                    self.bump();
                    self.bump();
                    self.finish();
                }
                Some(TokenKind::Apostrophe) if self.nth(1) == Some(TokenKind::LParen) => {
                    self.start_at(checkpoint, SyntaxKind::CastExpr);
                    self.bump();
                    self.bump();
                    self.expr()?;
                    self.expect(TokenKind::RParen)?;
                    self.finish();
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn primary(&mut self) -> PResult<()> {
        let Some(kind) = self.peek() else {
            return Err(self.error("expected expression"));
        };
        match kind {
            TokenKind::Number | TokenKind::StringLit => {
                self.start(SyntaxKind::LiteralExpr);
                self.bump();
                self.finish();
            }
            TokenKind::Ident
            | TokenKind::EscapedIdent
            | TokenKind::SystemIdent
            | TokenKind::MacroIdent => {
                if self.nth(1) == Some(TokenKind::LParen) {
                    self.start(SyntaxKind::CallExpr);
                    self.bump();
                    self.arg_list()?;
                } else {
                    self.start(SyntaxKind::NameExpr);
                    self.bump();
                    if self.eat(TokenKind::ColonColon) {
                        self.expect_ident("name")?;
                    }
                }
                self.finish();
            }
            TokenKind::LParen => {
                self.start(SyntaxKind::ParenExpr);
                self.bump();
                self.expr()?;
                self.expect(TokenKind::RParen)?;
                self.finish();
            }
            TokenKind::LBrace => self.concatenation()?,
            TokenKind::Apostrophe if self.nth(1) == Some(TokenKind::LBrace) => {
                self.start(SyntaxKind::PatternExpr);
                self.bump();
                self.skip_braces()?;
                self.finish();
            }
            k if k.is_type_keyword() && self.nth(1) == Some(TokenKind::Apostrophe) => {
                self.start(SyntaxKind::CastExpr);
                self.bump();
                self.bump();
                self.expect(TokenKind::LParen)?;
                self.expr()?;
                self.expect(TokenKind::RParen)?;
                self.finish();
            }
            _ => return Err(self.error("expected expression")),
        }
        Ok(())
    }

    fn concatenation(&mut self) -> PResult<()> {
        let node = self.start(SyntaxKind::ConcatExpr);
        self.bump();
        if self.eat(TokenKind::RBrace) {
            self.finish();
            return Ok(());
        }
        self.expr()?;
        if self.eat(TokenKind::LBrace) {
            self.retag(node, SyntaxKind::ReplicationExpr);
            loop {
                self.expr()?;
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBrace)?;
        } else {
            while self.eat(TokenKind::Comma) {
                self.expr()?;
            }
        }
        self.expect(TokenKind::RBrace)?;
        self.finish();
        Ok(())
    }

    fn arg_list(&mut self) -> PResult<()> {
        self.start(SyntaxKind::ArgList);
        self.bump();
        while !self.at(TokenKind::RParen) {
            if self.peek().is_none() {
                return Err(self.error("expected ')'"));
            }
            if self.eat(TokenKind::Dot) {
                self.expect_ident("argument name")?;
                self.expect(TokenKind::LParen)?;
                if !self.at(TokenKind::RParen) {
                    self.expr()?;
                }
                self.expect(TokenKind::RParen)?;
            } else if !self.at(TokenKind::Comma) {
                self.expr()?;
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        self.finish();
        Ok(())
    }
}

/// Binding powers of binary operators, loosest first.
fn infix_binding_power(kind: TokenKind) -> Option<(u8, u8)> {
    let bp = match kind {
        TokenKind::PipePipe => (1, 2),
        TokenKind::AmpAmp => (3, 4),
        TokenKind::Pipe => (5, 6),
        TokenKind::Caret | TokenKind::TildeCaret | TokenKind::CaretTilde => (7, 8),
        TokenKind::Amp => (9, 10),
        TokenKind::EqEq | TokenKind::BangEq | TokenKind::EqEqEq | TokenKind::BangEqEq => (11, 12),
        TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq => (13, 14),
        TokenKind::Shl | TokenKind::Shr | TokenKind::AShl | TokenKind::AShr => (15, 16),
        TokenKind::Plus | TokenKind::Minus => (17, 18),
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => (19, 20),
        TokenKind::StarStar => (21, 22),
        _ => return None,
    };
    Some(bp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_of(tree: &SyntaxTree, kind: SyntaxKind) -> Vec<NodeId> {
        tree.descendants(tree.root())
            .into_iter()
            .filter(|n| tree.kind(*n) == kind)
            .collect()
    }

    #[test]
    fn test_parse_ansi_module() {
        let source = "module top(input logic clk, input logic [3:0] a, b, output logic y);\nendmodule\n";
        let tree = SyntaxTree::parse(source).unwrap();
        assert_eq!(kinds_of(&tree, SyntaxKind::AnsiPort).len(), 4);
        assert_eq!(kinds_of(&tree, SyntaxKind::PackedDim).len(), 1);
        assert_eq!(tree.render(), source);
    }

    #[test]
    fn test_parse_non_ansi_module() {
        let source = "module top(a, y);\n  input [1:0] a;\n  output reg y;\n  always @(*) y = |a;\nendmodule\n";
        let tree = SyntaxTree::parse(source).unwrap();
        assert_eq!(kinds_of(&tree, SyntaxKind::PortRef).len(), 2);
        assert_eq!(kinds_of(&tree, SyntaxKind::PortDecl).len(), 2);
        assert_eq!(kinds_of(&tree, SyntaxKind::EventControl).len(), 1);
    }

    #[test]
    fn test_nonblocking_assignment_versus_comparison() {
        let source = "module m(input logic clk, input logic a, b, output logic q);\n  always_ff @(posedge clk) q <= a <= b;\nendmodule\n";
        let tree = SyntaxTree::parse(source).unwrap();
        let stmt = kinds_of(&tree, SyntaxKind::AssignStmt)[0];
        let rhs = tree.child_nodes(stmt).nth(1).unwrap();
        assert_eq!(tree.kind(rhs), SyntaxKind::BinaryExpr);
        assert_eq!(tree.text(rhs), "a <= b");
    }

    #[test]
    fn test_precedence() {
        let source = "module m(output logic y);\n  assign y = a | b & c == d + e * f;\nendmodule\n";
        let tree = SyntaxTree::parse(source).unwrap();
        let assign = kinds_of(&tree, SyntaxKind::Assignment)[0];
        let rhs = tree.child_nodes(assign).nth(1).unwrap();
        let operands: Vec<&str> = tree.child_nodes(rhs).map(|n| tree.text(n)).collect();
        assert_eq!(operands, vec!["a", "b & c == d + e * f"]);
    }

    #[test]
    fn test_nested_ternary_is_right_associative() {
        let source = "module m(output logic y);\n  assign y = a ? b : c ? d : e;\nendmodule\n";
        let tree = SyntaxTree::parse(source).unwrap();
        let ternaries = kinds_of(&tree, SyntaxKind::TernaryExpr);
        assert_eq!(ternaries.len(), 2);
        assert_eq!(tree.text(ternaries[1]), "c ? d : e");
    }

    #[test]
    fn test_if_else_and_case() {
        let source = "\
module m(input logic [1:0] s, input logic a, output logic y);
  always_comb begin
    if (a) y = 1'b0;
    else begin
      unique case (s)
        2'd0, 2'd1: y = a;
        2'd2: y = ~a;
        default: y = 1'b0;
      endcase
    end
  end
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        assert_eq!(kinds_of(&tree, SyntaxKind::IfStmt).len(), 1);
        assert_eq!(kinds_of(&tree, SyntaxKind::ElseClause).len(), 1);
        assert_eq!(kinds_of(&tree, SyntaxKind::CaseItem).len(), 2);
        assert_eq!(kinds_of(&tree, SyntaxKind::DefaultItem).len(), 1);
        assert_eq!(tree.render(), source);
    }

    #[test]
    fn test_instances_functions_and_generate() {
        let source = "\
module m #(parameter int N = 2) (input logic [N-1:0] a, output logic [N-1:0] y);
  function automatic logic f(input logic x);
    return ~x;
  endfunction
  for (genvar i = 0; i < N; i++) begin : g
    assign y[i] = f(a[i]);
  end
  sub #(.W(N)) u_sub (.a(a), .y(), .*);
endmodule
";
        let tree = SyntaxTree::parse(source).unwrap();
        assert_eq!(kinds_of(&tree, SyntaxKind::Instantiation).len(), 1);
        // one parameter override plus three port connections
        assert_eq!(kinds_of(&tree, SyntaxKind::PortConnection).len(), 4);
        assert_eq!(kinds_of(&tree, SyntaxKind::GenerateRegion).len(), 1);
        assert_eq!(kinds_of(&tree, SyntaxKind::Assignment).len(), 1);
        assert_eq!(tree.render(), source);
    }

    #[test]
    fn test_directives_are_trivia() {
        let source = "`timescale 1ns/1ps\nmodule m(output logic y);\n`ifdef FOO\n  assign y = 1'b1;\n`endif\nendmodule\n";
        let tree = SyntaxTree::parse(source).unwrap();
        assert_eq!(tree.render(), source);
    }

    #[test]
    fn test_missing_semicolon_reports_location() {
        let err = SyntaxTree::parse("module m(output logic y)\nendmodule\n").unwrap_err();
        assert_eq!(err.line_number, 2);
        assert!(err.message.starts_with("expected ';'"));
    }

    #[test]
    fn test_concat_and_replication() {
        let source = "module m(output logic [7:0] y);\n  assign y = {{4{a}}, b[1:0], 2'b01};\nendmodule\n";
        let tree = SyntaxTree::parse(source).unwrap();
        assert_eq!(kinds_of(&tree, SyntaxKind::ReplicationExpr).len(), 1);
        assert_eq!(kinds_of(&tree, SyntaxKind::SelectExpr).len(), 1);
    }
}
