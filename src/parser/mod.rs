// Copyright 2025 The Veneer Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Recursive-descent parser for the Veneer candidate syntax
//!
//! Consumes the flattened grammar token stream and produces an ordered
//! forest of declarations. A parse always terminates with a (possibly
//! empty or partial) result; errors accumulate in the shared sink and
//! never abort the process.

use crate::ast::*;
use crate::error::{ErrorEntry, ErrorSink, ParserError, SourceLocation};
use crate::lexer::{Lexeme, Token};

/// Binary operator sets per precedence level, weakest binding last
fn level_operators(level: BinaryLevel) -> &'static [Lexeme] {
    match level {
        BinaryLevel::Multiplicative => &[Lexeme::Multiply, Lexeme::Slash, Lexeme::Modulo],
        BinaryLevel::Additive => &[Lexeme::Plus, Lexeme::Minus],
        BinaryLevel::Shift => &[Lexeme::LeftShift, Lexeme::RightShift],
        BinaryLevel::Compare => &[Lexeme::Spaceship],
        BinaryLevel::Relational => &[
            Lexeme::Less,
            Lexeme::LessEq,
            Lexeme::Greater,
            Lexeme::GreaterEq,
        ],
        BinaryLevel::Equality => &[Lexeme::EqualComparison, Lexeme::NotEqualComparison],
        BinaryLevel::BitAnd => &[Lexeme::Ampersand],
        BinaryLevel::BitXor => &[Lexeme::Caret],
        BinaryLevel::BitOr => &[Lexeme::Pipe],
        BinaryLevel::LogicalAnd => &[Lexeme::LogicalAnd],
        BinaryLevel::LogicalOr => &[Lexeme::LogicalOr],
        BinaryLevel::Assignment => &[
            Lexeme::Assignment,
            Lexeme::PlusEq,
            Lexeme::MinusEq,
            Lexeme::MultiplyEq,
            Lexeme::SlashEq,
            Lexeme::ModuloEq,
            Lexeme::AmpersandEq,
            Lexeme::PipeEq,
            Lexeme::CaretEq,
            Lexeme::LeftShiftEq,
            Lexeme::RightShiftEq,
            Lexeme::TildeEq,
            Lexeme::LogicalAndEq,
            Lexeme::LogicalOrEq,
        ],
    }
}

/// The next-lower precedence level, or `None` for the lowest
fn lower_level(level: BinaryLevel) -> Option<BinaryLevel> {
    match level {
        BinaryLevel::Multiplicative => None,
        BinaryLevel::Additive => Some(BinaryLevel::Multiplicative),
        BinaryLevel::Shift => Some(BinaryLevel::Additive),
        BinaryLevel::Compare => Some(BinaryLevel::Shift),
        BinaryLevel::Relational => Some(BinaryLevel::Compare),
        BinaryLevel::Equality => Some(BinaryLevel::Relational),
        BinaryLevel::BitAnd => Some(BinaryLevel::Equality),
        BinaryLevel::BitXor => Some(BinaryLevel::BitAnd),
        BinaryLevel::BitOr => Some(BinaryLevel::BitXor),
        BinaryLevel::LogicalAnd => Some(BinaryLevel::BitOr),
        BinaryLevel::LogicalOr => Some(BinaryLevel::LogicalAnd),
        BinaryLevel::Assignment => Some(BinaryLevel::LogicalOr),
    }
}

/// Operators suppressed inside template-argument positions
fn is_angle_operator(op: Lexeme) -> bool {
    matches!(
        op,
        Lexeme::Less | Lexeme::Greater | Lexeme::LeftShift | Lexeme::RightShift
    )
}

/// Recursive-descent parser over one token stream
///
/// Stateless across translation units; keeps a stack of currently open
/// declarations and capture scopes during one parse, threaded here rather
/// than in process-wide state so multiple parser instances can coexist.
pub struct Parser<'e> {
    tokens: Vec<Token>,
    position: usize,
    errors: &'e mut ErrorSink,
    /// Cleared inside template-argument positions to disambiguate
    /// template-ids from relational expressions
    angle_ops_enabled: bool,
    capture_stack: Vec<CaptureGroup>,
    decl_stack: Vec<DeclKind>,
}

impl<'e> Parser<'e> {
    pub fn new(tokens: Vec<Token>, errors: &'e mut ErrorSink) -> Self {
        Self {
            tokens,
            position: 0,
            errors,
            angle_ops_enabled: true,
            capture_stack: Vec::new(),
            decl_stack: Vec::new(),
        }
    }

    // ==================== TOKEN STREAM HELPERS ====================

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn check(&self, kind: Lexeme) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn check_keyword(&self, word: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(word))
    }

    fn match_kind(&mut self, kind: Lexeme) -> Option<Token> {
        if self.check(kind) {
            self.advance()
        } else {
            None
        }
    }

    fn match_keyword(&mut self, word: &str) -> Option<Token> {
        if self.check_keyword(word) {
            self.advance()
        } else {
            None
        }
    }

    fn current_location(&self) -> SourceLocation {
        self.peek()
            .map(|t| t.location)
            .or_else(|| self.tokens.last().map(|t| t.location))
            .unwrap_or_default()
    }

    fn expect(&mut self, kind: Lexeme, expected: &str) -> Result<Token, ParserError> {
        if self.check(kind) {
            Ok(self.advance().unwrap_or_else(|| unreachable!()))
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParserError {
        ParserError::UnexpectedToken {
            expected: expected.to_string(),
            found: self
                .peek()
                .map(|t| t.text.clone())
                .unwrap_or_else(|| "end of input".to_string()),
            location: self.current_location(),
        }
    }

    /// Record one error at the most specific position reached
    fn report(&mut self, error: ParserError) {
        self.errors.report(error.into());
    }

    /// Record a generic message that yields to a more specific one
    fn report_fallback(&mut self, message: &str) {
        self.errors
            .report(ErrorEntry::fallback(self.current_location(), message));
    }

    /// Skip to a plausible declaration boundary after a structural failure
    fn synchronize(&mut self) {
        let start = self.position;
        while !self.is_at_end() {
            match self.peek().map(|t| t.kind) {
                Some(Lexeme::Semicolon) => {
                    self.advance();
                    break;
                }
                Some(Lexeme::RightBrace) => {
                    self.advance();
                    break;
                }
                Some(Lexeme::Identifier)
                    if self.position != start
                        && self.peek_at(1).is_some_and(|t| t.kind == Lexeme::Colon) =>
                {
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }
        if self.position == start {
            self.advance();
        }
    }

    // ==================== TRANSLATION UNIT ====================

    /// Parse the whole token stream into an ordered declaration forest.
    /// Never aborts: structural failures are reported and skipped past.
    pub fn parse_translation_unit(&mut self) -> TranslationUnit {
        let mut unit = TranslationUnit::new();
        while !self.is_at_end() {
            match self.parse_declaration(None) {
                Ok(decl) => unit.declarations.push(decl),
                Err(error) => {
                    self.report(error);
                    self.report_fallback("expected a declaration");
                    self.synchronize();
                }
            }
        }
        unit
    }

    // ==================== DECLARATIONS ====================

    /// Parse one declaration: `name : template-params? @meta* body`
    pub fn parse_declaration(
        &mut self,
        parent_kind: Option<DeclKind>,
    ) -> Result<Declaration, ParserError> {
        let access = self.parse_accessibility();

        let identifier = self.parse_declaration_name()?;
        let location = identifier.location;
        self.expect(Lexeme::Colon, "':' after declaration name")?;

        self.capture_stack.push(CaptureGroup::default());
        let result = self.parse_declaration_tail(identifier, location, access, parent_kind);
        let captures = self.capture_stack.pop().unwrap_or_default();
        let mut decl = result?;
        decl.captures = captures;
        Ok(decl)
    }

    fn parse_accessibility(&mut self) -> Accessibility {
        if self.match_keyword("public").is_some() {
            Accessibility::Public
        } else if self.match_keyword("protected").is_some() {
            Accessibility::Protected
        } else if self.match_keyword("private").is_some() {
            Accessibility::Private
        } else {
            Accessibility::Default
        }
    }

    /// A declaration name, folding `operator` plus an operator token into
    /// a single name like `operator=` or `operator<=>`
    fn parse_declaration_name(&mut self) -> Result<Token, ParserError> {
        let token = self.expect(Lexeme::Identifier, "declaration name")?;
        if token.text != "operator" {
            return Ok(token);
        }
        // `operator()` and `operator[]` take two tokens
        if self.check(Lexeme::LeftParen)
            && self.peek_at(1).is_some_and(|t| t.kind == Lexeme::RightParen)
        {
            self.advance();
            self.advance();
            return Ok(Token::new("operator()", token.location, Lexeme::Identifier));
        }
        if self.check(Lexeme::LeftBracket)
            && self
                .peek_at(1)
                .is_some_and(|t| t.kind == Lexeme::RightBracket)
        {
            self.advance();
            self.advance();
            return Ok(Token::new("operator[]", token.location, Lexeme::Identifier));
        }
        let is_op = self.peek().is_some_and(|t| {
            !matches!(
                t.kind,
                Lexeme::Colon
                    | Lexeme::Identifier
                    | Lexeme::Keyword
                    | Lexeme::FixedType
                    | Lexeme::MultiKeyword
                    | Lexeme::LeftParen
                    | Lexeme::LeftBrace
                    | Lexeme::Semicolon
            ) && !t.kind.is_literal()
        });
        if is_op {
            let op = self.advance().unwrap_or_else(|| unreachable!());
            return Ok(Token::new(
                format!("operator{}", op.text),
                token.location,
                Lexeme::Identifier,
            ));
        }
        Ok(token)
    }

    fn parse_declaration_tail(
        &mut self,
        identifier: Token,
        location: SourceLocation,
        access: Accessibility,
        parent_kind: Option<DeclKind>,
    ) -> Result<Declaration, ParserError> {
        let is_variadic = self.match_kind(Lexeme::Ellipsis).is_some();

        let template_parameters = if self.check(Lexeme::Less) {
            Some(self.parse_angle_parameter_list()?)
        } else {
            None
        };

        let metafunctions = self.parse_metafunction_requests()?;

        let mut requires_clause = None;
        if self.match_keyword("requires").is_some() {
            requires_clause = Some(self.parse_expression()?);
        }

        let body = self.parse_declaration_body(&identifier)?;

        let mut decl = Declaration::new(location, body);
        decl.identifier = Some(identifier);
        decl.access = access;
        decl.is_variadic = is_variadic;
        decl.template_parameters = template_parameters;
        decl.requires_clause = requires_clause;
        decl.metafunctions = metafunctions;
        decl.parent_kind = parent_kind;
        Ok(decl)
    }

    /// Zero or more `@name` / `@name(raw, args)` requests. Arguments are
    /// captured as raw text, not parsed.
    fn parse_metafunction_requests(&mut self) -> Result<Vec<MetafunctionRequest>, ParserError> {
        let mut requests = Vec::new();
        while let Some(at) = self.match_kind(Lexeme::At) {
            let name = self.expect(Lexeme::Identifier, "metafunction name after '@'")?;
            let mut arguments = Vec::new();
            if self.match_kind(Lexeme::LeftParen).is_some() {
                let mut depth = 1usize;
                let mut current = String::new();
                loop {
                    let Some(token) = self.peek() else {
                        return Err(self.unexpected("')' closing metafunction arguments"));
                    };
                    match token.kind {
                        Lexeme::LeftParen => depth += 1,
                        Lexeme::RightParen => {
                            depth -= 1;
                            if depth == 0 {
                                self.advance();
                                break;
                            }
                        }
                        Lexeme::Comma if depth == 1 => {
                            arguments.push(std::mem::take(&mut current).trim().to_string());
                            self.advance();
                            continue;
                        }
                        _ => {}
                    }
                    let token = self.advance().unwrap_or_else(|| unreachable!());
                    if !current.is_empty() {
                        current.push(' ');
                    }
                    current.push_str(&token.text);
                }
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    arguments.push(trimmed.to_string());
                }
            }
            requests.push(MetafunctionRequest {
                location: at.location,
                name: name.text,
                arguments,
            });
        }
        Ok(requests)
    }

    fn parse_declaration_body(
        &mut self,
        identifier: &Token,
    ) -> Result<DeclarationBody, ParserError> {
        // Function
        if self.check(Lexeme::LeftParen) {
            return self.parse_function_body();
        }

        // Record type or type alias, with an optional `final` marker
        let is_final = self.check_keyword("final")
            && self.peek_at(1).is_some_and(|t| t.is_keyword("type"));
        if is_final {
            self.advance();
        }
        if self.check_keyword("type") {
            if self.peek_at(1).is_some_and(|t| t.kind == Lexeme::EqualComparison) {
                self.advance();
                self.advance();
                let target = self.parse_type_id()?;
                self.expect(Lexeme::Semicolon, "';' after alias")?;
                return Ok(DeclarationBody::Alias {
                    target: AliasTarget::Type(target),
                });
            }
            self.advance();
            self.expect(Lexeme::Assignment, "'=' after 'type'")?;
            let members = self.parse_member_list(DeclKind::Type)?;
            return Ok(DeclarationBody::Type { is_final, members });
        }

        // Namespace or namespace alias
        if self.check_keyword("namespace") {
            if self.peek_at(1).is_some_and(|t| t.kind == Lexeme::EqualComparison) {
                self.advance();
                self.advance();
                let target = self.parse_id_expression(false)?;
                self.expect(Lexeme::Semicolon, "';' after alias")?;
                return Ok(DeclarationBody::Alias {
                    target: AliasTarget::Namespace(target),
                });
            }
            self.advance();
            self.expect(Lexeme::Assignment, "'=' after 'namespace'")?;
            let members = self.parse_member_list(DeclKind::Namespace)?;
            return Ok(DeclarationBody::Namespace { members });
        }

        // Object alias with deduced type: `n: == expr ;`
        if self.match_kind(Lexeme::EqualComparison).is_some() {
            let target = self.parse_expression()?;
            self.expect(Lexeme::Semicolon, "';' after alias")?;
            return Ok(DeclarationBody::Alias {
                target: AliasTarget::Object(Box::new(target)),
            });
        }

        // Object: optional type, then `= init ;`, `== alias ;`, or `;`
        let type_id = if self.check(Lexeme::Assignment) || self.check(Lexeme::Semicolon) {
            TypeId::wildcard(identifier.location)
        } else {
            self.parse_type_id()?
        };

        if self.match_kind(Lexeme::EqualComparison).is_some() {
            let target = self.parse_expression()?;
            self.expect(Lexeme::Semicolon, "';' after alias")?;
            return Ok(DeclarationBody::Alias {
                target: AliasTarget::Object(Box::new(target)),
            });
        }

        let initializer = if self.match_kind(Lexeme::Assignment).is_some() {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(Lexeme::Semicolon, "';' after object declaration")?;
        Ok(DeclarationBody::Object {
            type_id,
            initializer,
        })
    }

    /// `{` declarations `}` for type and namespace bodies
    fn parse_member_list(&mut self, kind: DeclKind) -> Result<Vec<Declaration>, ParserError> {
        self.expect(Lexeme::LeftBrace, "'{' opening member list")?;
        self.decl_stack.push(kind);
        let mut members = Vec::new();
        loop {
            if self.match_kind(Lexeme::RightBrace).is_some() {
                break;
            }
            if self.is_at_end() {
                self.decl_stack.pop();
                return Err(self.unexpected("'}' closing member list"));
            }
            match self.parse_declaration(Some(kind)) {
                Ok(member) => members.push(member),
                Err(error) => {
                    self.report(error);
                    self.synchronize();
                }
            }
        }
        self.decl_stack.pop();
        Ok(members)
    }

    fn parse_function_body(&mut self) -> Result<DeclarationBody, ParserError> {
        let parameters = self.parse_parameter_list()?;
        let throws = self.match_keyword("throws").is_some();

        let returns = if self.match_kind(Lexeme::Arrow).is_some() {
            if self.check(Lexeme::LeftParen) {
                ReturnSpec::List(self.parse_parameter_list()?)
            } else {
                let pass = self
                    .peek()
                    .and_then(|t| {
                        if t.kind == Lexeme::Keyword {
                            PassingStyle::from_keyword(&t.text)
                        } else {
                            None
                        }
                    })
                    .map(|p| {
                        self.advance();
                        p
                    })
                    .unwrap_or(PassingStyle::Move);
                let type_id = self.parse_type_id()?;
                ReturnSpec::Single { type_id, pass }
            }
        } else {
            ReturnSpec::None
        };

        let mut contracts = Vec::new();
        while self.check_keyword("pre") || self.check_keyword("post") {
            contracts.push(self.parse_contract()?);
        }

        let mut body = None;
        let mut body_line_range = (0usize, 0usize);
        if self.match_kind(Lexeme::Assignment).is_some() {
            let statement = self.parse_statement()?;
            body_line_range = statement_line_range(&statement);
            body = Some(Box::new(statement));
        } else {
            self.expect(Lexeme::Semicolon, "';' or '=' after function signature")?;
        }

        Ok(DeclarationBody::Function {
            signature: FunctionSignature {
                parameters,
                returns,
                contracts,
                throws,
                body_line_range,
            },
            body,
        })
    }

    /// `(` parameters `)`
    fn parse_parameter_list(&mut self) -> Result<Vec<Parameter>, ParserError> {
        self.expect(Lexeme::LeftParen, "'(' opening parameter list")?;
        let mut parameters = Vec::new();
        if self.match_kind(Lexeme::RightParen).is_some() {
            return Ok(parameters);
        }
        loop {
            parameters.push(self.parse_parameter()?);
            if self.match_kind(Lexeme::Comma).is_some() {
                continue;
            }
            self.expect(Lexeme::RightParen, "')' closing parameter list")?;
            break;
        }
        Ok(parameters)
    }

    /// `<` parameters `>` for template parameter lists
    fn parse_angle_parameter_list(&mut self) -> Result<Vec<Parameter>, ParserError> {
        self.expect(Lexeme::Less, "'<' opening template parameter list")?;
        let saved = self.angle_ops_enabled;
        self.angle_ops_enabled = false;
        let result = (|| {
            let mut parameters = Vec::new();
            if self.match_kind(Lexeme::Greater).is_some() {
                return Ok(parameters);
            }
            loop {
                parameters.push(self.parse_parameter()?);
                if self.match_kind(Lexeme::Comma).is_some() {
                    continue;
                }
                self.expect(Lexeme::Greater, "'>' closing template parameter list")?;
                break;
            }
            Ok(parameters)
        })();
        self.angle_ops_enabled = saved;
        result
    }

    fn parse_parameter(&mut self) -> Result<Parameter, ParserError> {
        let modifier = if self.match_keyword("implicit").is_some() {
            ParamModifier::Implicit
        } else if self.match_keyword("virtual").is_some() {
            ParamModifier::Virtual
        } else if self.match_keyword("override").is_some() {
            ParamModifier::Override
        } else if self.match_keyword("final").is_some() {
            ParamModifier::Final
        } else {
            ParamModifier::None
        };

        let pass = self
            .peek()
            .filter(|t| t.kind == Lexeme::Keyword)
            .and_then(|t| PassingStyle::from_keyword(&t.text))
            .map(|p| {
                self.advance();
                p
            })
            .unwrap_or(PassingStyle::In);

        let name = self.expect(Lexeme::Identifier, "parameter name")?;
        let location = name.location;

        let type_id = if self.match_kind(Lexeme::Colon).is_some() {
            self.parse_type_id()?
        } else {
            TypeId::wildcard(location)
        };

        let default_value = if self.match_kind(Lexeme::Assignment).is_some() {
            Some(self.parse_expression()?)
        } else {
            None
        };

        Ok(Parameter {
            location,
            name,
            pass,
            modifier,
            type_id,
            default_value,
        })
    }

    // ==================== STATEMENTS ====================

    /// Parse one statement of any of the ten kinds
    pub fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        if self.check(Lexeme::LeftBrace) {
            return Ok(Statement::Compound(self.parse_compound_statement()?));
        }
        if self.check_keyword("if") {
            return self.parse_selection_statement();
        }
        if self.check_keyword("while") || self.check_keyword("do") || self.check_keyword("for") {
            return self.parse_iteration_statement(None);
        }
        // Labeled loop: `label : while ...`
        if self.check(Lexeme::Identifier)
            && self.peek_at(1).is_some_and(|t| t.kind == Lexeme::Colon)
            && self.peek_at(2).is_some_and(|t| {
                t.is_keyword("while") || t.is_keyword("do") || t.is_keyword("for")
            })
        {
            let label = self.advance().unwrap_or_else(|| unreachable!());
            self.advance(); // ':'
            return self.parse_iteration_statement(Some(label));
        }
        if self.check_keyword("return") {
            let keyword = self.advance().unwrap_or_else(|| unreachable!());
            let expression = if self.check(Lexeme::Semicolon) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect(Lexeme::Semicolon, "';' after return statement")?;
            return Ok(Statement::Return(ReturnStatement {
                location: keyword.location,
                expression,
            }));
        }
        if self.check_keyword("break") || self.check_keyword("continue") {
            let keyword = self.advance().unwrap_or_else(|| unreachable!());
            let label = self.match_kind(Lexeme::Identifier);
            self.expect(Lexeme::Semicolon, "';' after jump statement")?;
            return Ok(Statement::Jump(JumpStatement { keyword, label }));
        }
        if self.check_keyword("using") {
            let keyword = self.advance().unwrap_or_else(|| unreachable!());
            let for_namespace = self.match_keyword("namespace").is_some();
            let id = self.parse_id_expression(false)?;
            self.expect(Lexeme::Semicolon, "';' after using statement")?;
            return Ok(Statement::Using(UsingStatement {
                location: keyword.location,
                for_namespace,
                id,
            }));
        }
        if self.check_keyword("assert") {
            let contract = self.parse_contract()?;
            self.expect(Lexeme::Semicolon, "';' after assertion")?;
            return Ok(Statement::Contract(Box::new(contract)));
        }
        if self.check_keyword("inspect") {
            let inspect = self.parse_inspect()?;
            return Ok(Statement::Inspect(Box::new(inspect)));
        }
        // Declaration: `identifier :` but not a labeled loop (handled above)
        if self.check(Lexeme::Identifier)
            && self.peek_at(1).is_some_and(|t| t.kind == Lexeme::Colon)
        {
            let parent = self.decl_stack.last().copied();
            let decl = self.parse_declaration(parent)?;
            return Ok(Statement::Declaration(Box::new(decl)));
        }

        let expr = self.parse_expression()?;
        let has_semicolon = self.match_kind(Lexeme::Semicolon).is_some();
        Ok(Statement::Expression(ExpressionStatement {
            expr,
            has_semicolon,
        }))
    }

    fn parse_compound_statement(&mut self) -> Result<CompoundStatement, ParserError> {
        let open = self.expect(Lexeme::LeftBrace, "'{'")?;
        let mut compound = CompoundStatement::new(open.location);
        loop {
            if let Some(close) = self.match_kind(Lexeme::RightBrace) {
                compound.close = close.location;
                return Ok(compound);
            }
            if self.is_at_end() {
                return Err(self.unexpected("'}' closing compound statement"));
            }
            match self.parse_statement() {
                Ok(statement) => compound.statements.push(statement),
                Err(error) => {
                    self.report(error);
                    self.synchronize();
                }
            }
        }
    }

    /// `if constexpr? condition { } else { }`
    fn parse_selection_statement(&mut self) -> Result<Statement, ParserError> {
        let keyword = self.expect(Lexeme::Keyword, "'if'")?;
        let is_constexpr = self.match_keyword("constexpr").is_some();
        let condition = self.parse_expression()?;
        let true_branch = self.parse_compound_statement()?;
        let false_branch = if self.match_keyword("else").is_some() {
            if self.check_keyword("if") {
                // `else if` nests as a single-statement false branch
                let nested = self.parse_selection_statement()?;
                let mut compound = CompoundStatement::new(self.current_location());
                compound.statements.push(nested);
                Some(compound)
            } else {
                Some(self.parse_compound_statement()?)
            }
        } else {
            None
        };
        Ok(Statement::Selection(Box::new(SelectionStatement {
            location: keyword.location,
            is_constexpr,
            condition,
            true_branch,
            false_branch,
        })))
    }

    /// `while cond next expr { }` | `do { } while cond next expr ;` |
    /// `for range next expr do ( param ) statement`
    fn parse_iteration_statement(
        &mut self,
        label: Option<Token>,
    ) -> Result<Statement, ParserError> {
        let keyword = self.expect(Lexeme::Keyword, "loop keyword")?;
        let location = label
            .as_ref()
            .map(|t| t.location)
            .unwrap_or(keyword.location);

        match keyword.text.as_str() {
            "while" => {
                let condition = self.parse_expression()?;
                let next_expression = if self.match_keyword("next").is_some() {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                let body = self.parse_compound_statement()?;
                Ok(Statement::Iteration(Box::new(IterationStatement {
                    location,
                    label,
                    keyword,
                    next_expression,
                    condition: Some(condition),
                    body: Some(body),
                    range: None,
                    parameter: None,
                    loop_body: None,
                })))
            }
            "do" => {
                let body = self.parse_compound_statement()?;
                self.expect(Lexeme::Keyword, "'while' after do body")
                    .and_then(|t| {
                        if t.text == "while" {
                            Ok(t)
                        } else {
                            Err(self.unexpected("'while' after do body"))
                        }
                    })?;
                let condition = self.parse_expression()?;
                let next_expression = if self.match_keyword("next").is_some() {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                self.expect(Lexeme::Semicolon, "';' after do statement")?;
                Ok(Statement::Iteration(Box::new(IterationStatement {
                    location,
                    label,
                    keyword,
                    next_expression,
                    condition: Some(condition),
                    body: Some(body),
                    range: None,
                    parameter: None,
                    loop_body: None,
                })))
            }
            "for" => {
                let range = self.parse_expression()?;
                let next_expression = if self.match_keyword("next").is_some() {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                self.expect(Lexeme::Keyword, "'do' after for range")
                    .and_then(|t| {
                        if t.text == "do" {
                            Ok(t)
                        } else {
                            Err(self.unexpected("'do' after for range"))
                        }
                    })?;
                self.expect(Lexeme::LeftParen, "'(' opening loop parameter")?;
                let parameter = self.parse_parameter()?;
                self.expect(Lexeme::RightParen, "')' closing loop parameter")?;
                let loop_body = self.parse_statement()?;
                Ok(Statement::Iteration(Box::new(IterationStatement {
                    location,
                    label,
                    keyword,
                    next_expression,
                    condition: None,
                    body: None,
                    range: Some(range),
                    parameter: Some(parameter),
                    loop_body: Some(Box::new(loop_body)),
                })))
            }
            other => Err(ParserError::IncompleteProduction {
                message: format!("unknown loop keyword '{other}'"),
                location: keyword.location,
            }),
        }
    }

    /// `pre/post/assert < group >? ( condition , "message"? )`
    ///
    /// Opens its own capture group for the condition expression.
    fn parse_contract(&mut self) -> Result<ContractNode, ParserError> {
        let keyword = self.expect(Lexeme::Keyword, "contract kind")?;
        let kind = match keyword.text.as_str() {
            "pre" => ContractKind::Precondition,
            "post" => ContractKind::Postcondition,
            "assert" => ContractKind::Assertion,
            other => {
                return Err(ParserError::IncompleteProduction {
                    message: format!("unknown contract kind '{other}'"),
                    location: keyword.location,
                })
            }
        };

        let group = if self.match_kind(Lexeme::Less).is_some() {
            let saved = self.angle_ops_enabled;
            self.angle_ops_enabled = false;
            let id = self.parse_id_expression(false);
            self.angle_ops_enabled = saved;
            let id = id?;
            self.expect(Lexeme::Greater, "'>' closing contract group")?;
            Some(id)
        } else {
            None
        };

        self.expect(Lexeme::LeftParen, "'(' opening contract condition")?;
        self.capture_stack.push(CaptureGroup::default());
        let condition = self.parse_expression();
        let captures = self.capture_stack.pop().unwrap_or_default();
        let condition = condition?;

        let message = if self.match_kind(Lexeme::Comma).is_some() {
            Some(self.expect(Lexeme::StringLiteral, "contract message string")?)
        } else {
            None
        };
        self.expect(Lexeme::RightParen, "')' closing contract")?;

        Ok(ContractNode {
            location: keyword.location,
            kind,
            group,
            condition,
            message,
            captures,
        })
    }

    /// `inspect constexpr? expr -> type? { alternatives }`
    ///
    /// Alternatives are kept in source order; the engine evaluating them
    /// must take the first structural match.
    fn parse_inspect(&mut self) -> Result<InspectExpr, ParserError> {
        let keyword = self.expect(Lexeme::Keyword, "'inspect'")?;
        let is_constexpr = self.match_keyword("constexpr").is_some();
        let expression = self.parse_expression()?;
        let result_type = if self.match_kind(Lexeme::Arrow).is_some() {
            Some(self.parse_type_id()?)
        } else {
            None
        };
        self.expect(Lexeme::LeftBrace, "'{' opening inspect alternatives")?;

        let mut alternatives = Vec::new();
        while !self.check(Lexeme::RightBrace) {
            if self.is_at_end() {
                return Err(self.unexpected("'}' closing inspect"));
            }
            alternatives.push(self.parse_alternative()?);
        }
        self.expect(Lexeme::RightBrace, "'}' closing inspect")?;

        Ok(InspectExpr {
            location: keyword.location,
            is_constexpr,
            expression: Box::new(expression),
            result_type,
            alternatives,
        })
    }

    /// `name? is type|value = statement ;` or `name? as type = statement ;`
    fn parse_alternative(&mut self) -> Result<Alternative, ParserError> {
        let location = self.current_location();
        let name = if self.check(Lexeme::Identifier)
            && self
                .peek_at(1)
                .is_some_and(|t| t.is_keyword("is") || t.is_keyword("as"))
        {
            self.advance()
        } else {
            None
        };

        let guard = if self.match_keyword("is").is_some() {
            if self.next_is_type_start() {
                AlternativeGuard::IsType(self.parse_type_id()?)
            } else {
                AlternativeGuard::IsValue(self.parse_postfix_expression()?)
            }
        } else if self.match_keyword("as").is_some() {
            AlternativeGuard::AsType(self.parse_type_id()?)
        } else {
            return Err(self.unexpected("'is' or 'as' guard in inspect alternative"));
        };

        self.expect(Lexeme::Assignment, "'=' before alternative result")?;
        let statement = self.parse_statement()?;
        if !matches!(statement, Statement::Compound(_)) {
            // Non-compound results end with ';' which parse_statement may
            // have left if the expression had none
            let _ = self.match_kind(Lexeme::Semicolon);
        }

        Ok(Alternative {
            location,
            name,
            guard,
            statement: Box::new(statement),
        })
    }

    // ==================== EXPRESSIONS ====================

    /// Full expression: the assignment level of the cascade
    pub fn parse_expression(&mut self) -> Result<Expr, ParserError> {
        self.parse_binary_level(BinaryLevel::Assignment)
    }

    /// The one generic binary rule: a term followed by zero or more
    /// (operator, term) pairs, instantiated at twelve precedence levels.
    /// Zero matched operators means the result is exactly the child term;
    /// otherwise one `Binary` node holds the ordered pair list,
    /// associating strictly left to right.
    fn parse_binary_level(&mut self, level: BinaryLevel) -> Result<Expr, ParserError> {
        let lhs = match lower_level(level) {
            Some(lower) => self.parse_binary_level(lower)?,
            None => self.parse_is_as_expression()?,
        };

        let mut terms = Vec::new();
        loop {
            let Some(token) = self.peek() else { break };
            let op = token.kind;
            if !level_operators(level).contains(&op) {
                break;
            }
            if !self.angle_ops_enabled && is_angle_operator(op) {
                break;
            }
            let op = self.advance().unwrap_or_else(|| unreachable!());
            let rhs = match lower_level(level) {
                Some(lower) => self.parse_binary_level(lower)?,
                None => self.parse_is_as_expression()?,
            };
            terms.push(BinaryTerm { op, expr: rhs });
        }

        if terms.is_empty() {
            Ok(lhs)
        } else {
            Ok(Expr::Binary {
                level,
                lhs: Box::new(lhs),
                terms,
            })
        }
    }

    /// `expr is Type`, `expr is value`, `expr as Type` chains
    fn parse_is_as_expression(&mut self) -> Result<Expr, ParserError> {
        let expr = self.parse_prefix_expression()?;
        let mut ops = Vec::new();
        loop {
            if self.check_keyword("is") {
                let keyword = self.advance().unwrap_or_else(|| unreachable!());
                let target = if self.next_is_type_start() {
                    IsAsTarget::Type(self.parse_type_id()?)
                } else {
                    IsAsTarget::Value(Box::new(self.parse_prefix_expression()?))
                };
                ops.push(IsAsTerm { keyword, target });
            } else if self.check_keyword("as") {
                let keyword = self.advance().unwrap_or_else(|| unreachable!());
                let target = IsAsTarget::Type(self.parse_type_id()?);
                ops.push(IsAsTerm { keyword, target });
            } else {
                break;
            }
        }
        if ops.is_empty() {
            Ok(expr)
        } else {
            Ok(Expr::IsAs(IsAsExpr {
                expr: Box::new(expr),
                ops,
            }))
        }
    }

    fn parse_prefix_expression(&mut self) -> Result<Expr, ParserError> {
        let mut ops = Vec::new();
        while let Some(token) = self.peek() {
            if matches!(token.kind, Lexeme::Not | Lexeme::Minus | Lexeme::Plus) {
                ops.push(self.advance().unwrap_or_else(|| unreachable!()));
            } else {
                break;
            }
        }
        let expr = self.parse_postfix_expression()?;
        if ops.is_empty() {
            Ok(expr)
        } else {
            Ok(Expr::Prefix {
                ops,
                expr: Box::new(expr),
            })
        }
    }

    fn parse_postfix_expression(&mut self) -> Result<Expr, ParserError> {
        let primary = self.parse_primary_expression()?;
        let mut ops: Vec<PostfixOp> = Vec::new();

        loop {
            let Some(token) = self.peek() else { break };
            match token.kind {
                Lexeme::Dot => {
                    let dot = self.advance().unwrap_or_else(|| unreachable!());
                    let id = self.parse_id_expression(false)?;
                    ops.push(PostfixOp::Member { dot, id });
                }
                Lexeme::LeftParen => {
                    let list = self.parse_expression_list()?;
                    ops.push(PostfixOp::Call(list));
                }
                Lexeme::LeftBracket => {
                    let open = self.advance().unwrap_or_else(|| unreachable!());
                    let mut list = ExpressionList {
                        location: open.location,
                        expressions: Vec::new(),
                    };
                    if !self.check(Lexeme::RightBracket) {
                        loop {
                            let expr = self.parse_expression()?;
                            list.expressions.push(ListTerm { pass: None, expr });
                            if self.match_kind(Lexeme::Comma).is_none() {
                                break;
                            }
                        }
                    }
                    self.expect(Lexeme::RightBracket, "']' closing subscript")?;
                    ops.push(PostfixOp::Subscript(list));
                }
                Lexeme::PlusPlus | Lexeme::MinusMinus | Lexeme::Tilde => {
                    ops.push(PostfixOp::Op(self.advance().unwrap_or_else(|| unreachable!())));
                }
                Lexeme::Multiply | Lexeme::Ampersand => {
                    // Postfix dereference/address-of only when no operand
                    // follows; otherwise leave the token for the binary rule
                    if self.peek_at(1).is_some_and(|t| starts_expression(t)) {
                        break;
                    }
                    ops.push(PostfixOp::Op(self.advance().unwrap_or_else(|| unreachable!())));
                }
                Lexeme::Dollar => {
                    let dollar = self.advance().unwrap_or_else(|| unreachable!());
                    let captured = Expr::Postfix(PostfixExpr {
                        expr: Box::new(primary.clone()),
                        ops: ops.clone(),
                    });
                    self.register_capture(captured.to_string(), dollar.location);
                    ops.push(PostfixOp::Op(dollar));
                }
                _ => break,
            }
        }

        if ops.is_empty() {
            Ok(primary)
        } else {
            Ok(Expr::Postfix(PostfixExpr {
                expr: Box::new(primary),
                ops,
            }))
        }
    }

    fn parse_primary_expression(&mut self) -> Result<Expr, ParserError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected("an expression"));
        };

        if token.kind.is_literal() {
            self.advance();
            if matches!(token.kind, Lexeme::StringLiteral | Lexeme::RawStringLiteral)
                && token.text.contains("$(")
            {
                self.register_interpolations(&token);
            }
            return Ok(Expr::Literal(token));
        }

        match token.kind {
            Lexeme::Identifier | Lexeme::FixedType | Lexeme::MultiKeyword | Lexeme::Scope => {
                let id = self.parse_id_expression(false)?;
                Ok(Expr::Id(id))
            }
            Lexeme::Keyword if token.text == "true" || token.text == "false" => {
                self.advance();
                Ok(Expr::Literal(token))
            }
            Lexeme::Keyword if token.text == "inspect" => {
                let inspect = self.parse_inspect()?;
                Ok(Expr::Inspect(Box::new(inspect)))
            }
            Lexeme::LeftParen => {
                let list = self.parse_expression_list()?;
                Ok(Expr::List(list))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// `(` pass? expr (, pass? expr)* `)`
    fn parse_expression_list(&mut self) -> Result<ExpressionList, ParserError> {
        let open = self.expect(Lexeme::LeftParen, "'('")?;
        let mut list = ExpressionList {
            location: open.location,
            expressions: Vec::new(),
        };
        if self.match_kind(Lexeme::RightParen).is_some() {
            return Ok(list);
        }
        loop {
            let pass = self
                .peek()
                .filter(|t| t.kind == Lexeme::Keyword)
                .and_then(|t| PassingStyle::from_keyword(&t.text))
                .map(|p| {
                    self.advance();
                    p
                });
            let expr = self.parse_expression()?;
            list.expressions.push(ListTerm { pass, expr });
            if self.match_kind(Lexeme::Comma).is_some() {
                continue;
            }
            self.expect(Lexeme::RightParen, "')' closing expression list")?;
            break;
        }
        Ok(list)
    }

    /// A possibly qualified identifier. Template arguments are consumed
    /// only in template contexts; in plain expression positions `<` stays
    /// a relational operator.
    pub fn parse_id_expression(&mut self, template_context: bool) -> Result<IdExpr, ParserError> {
        let global = self.match_kind(Lexeme::Scope).is_some();
        let mut qualifiers = Vec::new();
        let mut identifier = self.parse_id_word()?;

        while self.check(Lexeme::Scope) {
            self.advance();
            qualifiers.push(identifier);
            identifier = self.parse_id_word()?;
        }

        let mut id = IdExpr {
            global,
            qualifiers,
            identifier,
            template_args: Vec::new(),
        };

        if template_context && self.check(Lexeme::Less) {
            self.advance();
            let saved = self.angle_ops_enabled;
            self.angle_ops_enabled = false;
            let result = self.parse_template_argument_list();
            self.angle_ops_enabled = saved;
            id.template_args = result?;
        }
        Ok(id)
    }

    fn parse_id_word(&mut self) -> Result<Token, ParserError> {
        match self.peek().map(|t| t.kind) {
            Some(Lexeme::Identifier) | Some(Lexeme::FixedType) | Some(Lexeme::MultiKeyword) => {
                Ok(self.advance().unwrap_or_else(|| unreachable!()))
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn parse_template_argument_list(&mut self) -> Result<Vec<TemplateArg>, ParserError> {
        let mut args = Vec::new();
        if self.match_kind(Lexeme::Greater).is_some() {
            return Ok(args);
        }
        loop {
            if self.next_is_type_start() {
                args.push(TemplateArg::Type(self.parse_type_id()?));
            } else {
                args.push(TemplateArg::Expression(self.parse_expression()?));
            }
            if self.match_kind(Lexeme::Comma).is_some() {
                continue;
            }
            self.expect(Lexeme::Greater, "'>' closing template arguments")?;
            break;
        }
        Ok(args)
    }

    /// Does the upcoming token begin a type id rather than a value?
    fn next_is_type_start(&self) -> bool {
        match self.peek() {
            Some(t) => match t.kind {
                Lexeme::FixedType | Lexeme::MultiKeyword | Lexeme::Multiply | Lexeme::Scope => true,
                Lexeme::Keyword => t.text == "const",
                Lexeme::Identifier => {
                    t.text == "_"
                        || self
                            .peek_at(1)
                            .is_some_and(|n| matches!(n.kind, Lexeme::Scope | Lexeme::Less))
                        || t.text.chars().next().is_some_and(|c| c.is_uppercase())
                        || self.peek_at(1).is_none()
                        || self
                            .peek_at(1)
                            .is_some_and(|n| !starts_expression(n) && n.kind != Lexeme::Dot)
                }
                _ => false,
            },
            None => false,
        }
    }

    /// A type id: wildcard `_`, or `*`/`const` qualifiers followed by a
    /// (possibly template-) id. This is a template context, so `a<b>`
    /// here is a template-id, not a comparison.
    pub fn parse_type_id(&mut self) -> Result<TypeId, ParserError> {
        let location = self.current_location();

        if self.peek().is_some_and(|t| t.text == "_") {
            self.advance();
            return Ok(TypeId::wildcard(location));
        }

        let mut qualifiers = Vec::new();
        loop {
            if self.check(Lexeme::Multiply) {
                qualifiers.push(self.advance().unwrap_or_else(|| unreachable!()));
            } else if self.check_keyword("const") {
                qualifiers.push(self.advance().unwrap_or_else(|| unreachable!()));
            } else {
                break;
            }
        }

        let id = self.parse_id_expression(true)?;
        Ok(TypeId {
            location,
            is_wildcard: false,
            qualifiers,
            id: Some(id),
        })
    }

    // ==================== CAPTURES ====================

    /// Register an expression needing later capture in the innermost open
    /// capture scope
    fn register_capture(&mut self, text: String, location: SourceLocation) {
        match self.capture_stack.last_mut() {
            Some(group) => group.add(text, location),
            None => self.errors.report(ErrorEntry::new(
                location,
                "capture operator '$' used outside a capturing scope",
            )),
        }
    }

    /// Register each `$( ... )` fragment of an interpolated string literal
    fn register_interpolations(&mut self, token: &Token) {
        let mut scratch = ErrorSink::new();
        let parts =
            crate::lexer::expand_interpolations(&token.text, token.location, &mut scratch);
        for entry in scratch.entries() {
            self.errors.report(entry.clone());
        }
        for part in parts {
            if let crate::lexer::StringPart::Interpolation(tokens) = part {
                let text = tokens
                    .iter()
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                self.register_capture(text, token.location);
            }
        }
    }
}

/// Does this token begin an expression? Used to decide whether `*`/`&`
/// after a postfix expression are postfix operators or binary ones.
fn starts_expression(token: &Token) -> bool {
    if token.kind.is_literal() {
        return true;
    }
    match token.kind {
        Lexeme::Identifier | Lexeme::FixedType | Lexeme::MultiKeyword | Lexeme::Scope => true,
        Lexeme::LeftParen | Lexeme::Not | Lexeme::Minus | Lexeme::Plus => true,
        Lexeme::Keyword => {
            token.text == "true" || token.text == "false" || token.text == "inspect"
        }
        _ => false,
    }
}

/// First and last source line spanned by a statement
fn statement_line_range(statement: &Statement) -> (usize, usize) {
    let start = statement.location().line;
    let end = match statement {
        Statement::Compound(c) => c.close.line,
        _ => start,
    };
    (start, end.max(start))
}
