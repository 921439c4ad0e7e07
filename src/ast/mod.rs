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

//! The program tree for the Veneer candidate syntax
//!
//! Every non-leaf node exclusively owns its children; back-references are
//! relational data (a parent's kind recorded at parse time), never
//! pointers, so children are destroyed before parents by ownership
//! structure alone.

use crate::error::SourceLocation;
use crate::lexer::Token;
use serde::{Deserialize, Serialize};

pub mod display;

/// The twelve binary precedence levels, weakest binding last
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BinaryLevel {
    Multiplicative,
    Additive,
    Shift,
    Compare,
    Relational,
    Equality,
    BitAnd,
    BitXor,
    BitOr,
    LogicalAnd,
    LogicalOr,
    Assignment,
}

impl BinaryLevel {
    pub fn name(self) -> &'static str {
        match self {
            BinaryLevel::Multiplicative => "multiplicative",
            BinaryLevel::Additive => "additive",
            BinaryLevel::Shift => "shift",
            BinaryLevel::Compare => "compare",
            BinaryLevel::Relational => "relational",
            BinaryLevel::Equality => "equality",
            BinaryLevel::BitAnd => "bit-and",
            BinaryLevel::BitXor => "bit-xor",
            BinaryLevel::BitOr => "bit-or",
            BinaryLevel::LogicalAnd => "logical-and",
            BinaryLevel::LogicalOr => "logical-or",
            BinaryLevel::Assignment => "assignment",
        }
    }
}

/// One `(operator, right operand)` pair of a binary node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryTerm {
    pub op: Token,
    pub expr: Expr,
}

/// Expression tree
///
/// A precedence level with zero matched operators collapses to its child:
/// `Binary` nodes exist only where at least one operator matched, so there
/// are no synthetic single-child wrapper layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Token),
    Id(IdExpr),
    /// Parenthesized expression list
    List(ExpressionList),
    Prefix {
        ops: Vec<Token>,
        expr: Box<Expr>,
    },
    Postfix(PostfixExpr),
    IsAs(IsAsExpr),
    Binary {
        level: BinaryLevel,
        lhs: Box<Expr>,
        terms: Vec<BinaryTerm>,
    },
    Inspect(Box<InspectExpr>),
}

impl Expr {
    pub fn location(&self) -> SourceLocation {
        match self {
            Expr::Literal(t) => t.location,
            Expr::Id(id) => id.location(),
            Expr::List(list) => list.location,
            Expr::Prefix { ops, expr } => ops
                .first()
                .map(|t| t.location)
                .unwrap_or_else(|| expr.location()),
            Expr::Postfix(p) => p.expr.location(),
            Expr::IsAs(e) => e.expr.location(),
            Expr::Binary { lhs, .. } => lhs.location(),
            Expr::Inspect(i) => i.location,
        }
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self, Expr::Id(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }
}

/// Possibly qualified identifier with optional template arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdExpr {
    pub global: bool,
    /// Leading qualifier path, e.g. `a::b::` before the identifier
    pub qualifiers: Vec<Token>,
    pub identifier: Token,
    pub template_args: Vec<TemplateArg>,
}

impl IdExpr {
    pub fn from_token(identifier: Token) -> Self {
        Self {
            global: false,
            qualifiers: Vec::new(),
            identifier,
            template_args: Vec::new(),
        }
    }

    pub fn location(&self) -> SourceLocation {
        self.qualifiers
            .first()
            .map(|t| t.location)
            .unwrap_or(self.identifier.location)
    }

    pub fn is_template_id(&self) -> bool {
        !self.template_args.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateArg {
    Type(TypeId),
    Expression(Expr),
}

/// How an argument or parameter is passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassingStyle {
    In,
    Copy,
    Inout,
    Out,
    Move,
    Forward,
}

impl PassingStyle {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "in" => Some(PassingStyle::In),
            "copy" => Some(PassingStyle::Copy),
            "inout" => Some(PassingStyle::Inout),
            "out" => Some(PassingStyle::Out),
            "move" => Some(PassingStyle::Move),
            "forward" => Some(PassingStyle::Forward),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PassingStyle::In => "in",
            PassingStyle::Copy => "copy",
            PassingStyle::Inout => "inout",
            PassingStyle::Out => "out",
            PassingStyle::Move => "move",
            PassingStyle::Forward => "forward",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListTerm {
    pub pass: Option<PassingStyle>,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionList {
    pub location: SourceLocation,
    pub expressions: Vec<ListTerm>,
}

/// Postfix expression: a primary followed by member access, call,
/// subscript, and postfix operators (including `$` capture)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostfixExpr {
    pub expr: Box<Expr>,
    pub ops: Vec<PostfixOp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PostfixOp {
    Member { dot: Token, id: IdExpr },
    Call(ExpressionList),
    Subscript(ExpressionList),
    /// `++`, `--`, `*`, `&`, `~`, `$`
    Op(Token),
}

/// `is` / `as` test chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsAsExpr {
    pub expr: Box<Expr>,
    pub ops: Vec<IsAsTerm>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsAsTerm {
    pub keyword: Token,
    pub target: IsAsTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IsAsTarget {
    Type(TypeId),
    Value(Box<Expr>),
}

/// A type name: wildcard `_`, or a possibly qualified id with
/// pointer/const qualifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeId {
    pub location: SourceLocation,
    pub is_wildcard: bool,
    /// `*` and `const` qualifier tokens, outermost first
    pub qualifiers: Vec<Token>,
    pub id: Option<IdExpr>,
}

impl TypeId {
    pub fn wildcard(location: SourceLocation) -> Self {
        Self {
            location,
            is_wildcard: true,
            qualifiers: Vec::new(),
            id: None,
        }
    }

    pub fn is_pointer_qualified(&self) -> bool {
        self.qualifiers.iter().any(|t| t.text == "*")
    }

    pub fn template_args_count(&self) -> usize {
        self.id.as_ref().map_or(0, |id| id.template_args.len())
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionStatement {
    pub expr: Expr,
    pub has_semicolon: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundStatement {
    pub open: SourceLocation,
    pub close: SourceLocation,
    pub statements: Vec<Statement>,
}

impl CompoundStatement {
    pub fn new(open: SourceLocation) -> Self {
        Self {
            open,
            close: open,
            statements: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionStatement {
    pub location: SourceLocation,
    pub is_constexpr: bool,
    pub condition: Expr,
    pub true_branch: CompoundStatement,
    pub false_branch: Option<CompoundStatement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationStatement {
    pub location: SourceLocation,
    pub label: Option<Token>,
    /// `while`, `do`, or `for`
    pub keyword: Token,
    /// Trailing `next` step expression
    pub next_expression: Option<Expr>,
    /// Used for `while` and `do`
    pub condition: Option<Expr>,
    /// Used for `while` and `do`
    pub body: Option<CompoundStatement>,
    /// Used for `for`
    pub range: Option<Expr>,
    /// Loop parameter of a range-for
    pub parameter: Option<Parameter>,
    /// Used for `for`
    pub loop_body: Option<Box<Statement>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStatement {
    pub location: SourceLocation,
    pub expression: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsingStatement {
    pub location: SourceLocation,
    pub for_namespace: bool,
    pub id: IdExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpStatement {
    pub keyword: Token,
    pub label: Option<Token>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractKind {
    Precondition,
    Postcondition,
    Assertion,
}

/// A contract: `pre`/`post`/`assert`, optional group id, condition,
/// optional message. Opens its own capture group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractNode {
    pub location: SourceLocation,
    pub kind: ContractKind,
    pub group: Option<IdExpr>,
    pub condition: Expr,
    pub message: Option<Token>,
    pub captures: CaptureGroup,
}

/// Inspect: ordered alternatives, first structural match wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectExpr {
    pub location: SourceLocation,
    pub is_constexpr: bool,
    pub expression: Box<Expr>,
    pub result_type: Option<TypeId>,
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub location: SourceLocation,
    pub name: Option<Token>,
    pub guard: AlternativeGuard,
    pub statement: Box<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlternativeGuard {
    IsType(TypeId),
    IsValue(Expr),
    AsType(TypeId),
}

/// The ten statement kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Expression(ExpressionStatement),
    Compound(CompoundStatement),
    Selection(Box<SelectionStatement>),
    Declaration(Box<Declaration>),
    Return(ReturnStatement),
    Iteration(Box<IterationStatement>),
    Using(UsingStatement),
    Contract(Box<ContractNode>),
    Inspect(Box<InspectExpr>),
    Jump(JumpStatement),
}

impl Statement {
    pub fn location(&self) -> SourceLocation {
        match self {
            Statement::Expression(s) => s.expr.location(),
            Statement::Compound(s) => s.open,
            Statement::Selection(s) => s.location,
            Statement::Declaration(d) => d.location,
            Statement::Return(s) => s.location,
            Statement::Iteration(s) => s.location,
            Statement::Using(s) => s.location,
            Statement::Contract(c) => c.location,
            Statement::Inspect(i) => i.location,
            Statement::Jump(j) => j.keyword.location,
        }
    }

    pub fn is_declaration(&self) -> bool {
        matches!(self, Statement::Declaration(_))
    }

    pub fn as_declaration(&self) -> Option<&Declaration> {
        match self {
            Statement::Declaration(d) => Some(d),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Captures
// ---------------------------------------------------------------------------

/// An expression registered for later capture (string interpolation,
/// contract conditions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub text: String,
    pub location: SourceLocation,
}

/// Scoped registry of captures; owned by exactly the declaration or
/// contract that opened it, pushed/popped on a stack discipline in the
/// parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureGroup {
    pub members: Vec<Capture>,
}

impl CaptureGroup {
    pub fn add(&mut self, text: impl Into<String>, location: SourceLocation) {
        self.members.push(Capture {
            text: text.into(),
            location,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Accessibility {
    #[default]
    Default,
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclKind {
    Function,
    Object,
    Type,
    Namespace,
    Alias,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParamModifier {
    #[default]
    None,
    Implicit,
    Virtual,
    Override,
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub location: SourceLocation,
    pub name: Token,
    pub pass: PassingStyle,
    pub modifier: ParamModifier,
    pub type_id: TypeId,
    pub default_value: Option<Expr>,
}

impl Parameter {
    pub fn has_name(&self, name: &str) -> bool {
        self.name.text == name
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(
            self.modifier,
            ParamModifier::Virtual | ParamModifier::Override | ParamModifier::Final
        )
    }
}

/// A metafunction application request: name plus raw textual arguments,
/// captured during parsing but not parsed until application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetafunctionRequest {
    pub location: SourceLocation,
    pub name: String,
    pub arguments: Vec<String>,
}

/// A function's declared return shape
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ReturnSpec {
    #[default]
    None,
    Single {
        type_id: TypeId,
        pass: PassingStyle,
    },
    /// Named multi-return parameter list
    List(Vec<Parameter>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub parameters: Vec<Parameter>,
    pub returns: ReturnSpec,
    pub contracts: Vec<ContractNode>,
    pub throws: bool,
    /// First and last source line of the body, for deciding whether a
    /// comment belongs to the declaration or the body
    pub body_line_range: (usize, usize),
}

impl FunctionSignature {
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn index_of_parameter_named(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.has_name(name))
    }

    pub fn has_parameter_named(&self, name: &str) -> bool {
        self.index_of_parameter_named(name).is_some()
    }

    pub fn has_parameter_with_name_and_pass(&self, name: &str, pass: PassingStyle) -> bool {
        self.parameters
            .iter()
            .any(|p| p.has_name(name) && p.pass == pass)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AliasTarget {
    Type(TypeId),
    Namespace(IdExpr),
    Object(Box<Expr>),
}

/// The one owned body variant of a declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeclarationBody {
    Function {
        signature: FunctionSignature,
        body: Option<Box<Statement>>,
    },
    Object {
        type_id: TypeId,
        initializer: Option<Expr>,
    },
    Type {
        is_final: bool,
        members: Vec<Declaration>,
    },
    Namespace {
        members: Vec<Declaration>,
    },
    Alias {
        target: AliasTarget,
    },
}

/// The central entity of the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub location: SourceLocation,
    pub identifier: Option<Token>,
    pub access: Accessibility,
    pub is_variadic: bool,
    pub is_constexpr: bool,
    pub template_parameters: Option<Vec<Parameter>>,
    pub requires_clause: Option<Expr>,
    /// Ordered metafunction applications, applied strictly left to right
    pub metafunctions: Vec<MetafunctionRequest>,
    pub body: DeclarationBody,
    pub captures: CaptureGroup,
    /// Kind of the enclosing declaration; relational context only
    pub parent_kind: Option<DeclKind>,
    /// Set by metafunctions, swept by `remove_marked_members`
    pub marked_for_removal: bool,
    /// A metafunction reported an error; excluded from final emission
    pub unusable: bool,
    pub member_function_generation: bool,
}

impl Declaration {
    pub fn new(location: SourceLocation, body: DeclarationBody) -> Self {
        Self {
            location,
            identifier: None,
            access: Accessibility::Default,
            is_variadic: false,
            is_constexpr: false,
            template_parameters: None,
            requires_clause: None,
            metafunctions: Vec::new(),
            body,
            captures: CaptureGroup::default(),
            parent_kind: None,
            marked_for_removal: false,
            unusable: false,
            member_function_generation: true,
        }
    }

    pub fn kind(&self) -> DeclKind {
        match &self.body {
            DeclarationBody::Function { .. } => DeclKind::Function,
            DeclarationBody::Object { .. } => DeclKind::Object,
            DeclarationBody::Type { .. } => DeclKind::Type,
            DeclarationBody::Namespace { .. } => DeclKind::Namespace,
            DeclarationBody::Alias { .. } => DeclKind::Alias,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.identifier.as_ref().map(|t| t.text.as_str())
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name() == Some(name)
    }

    pub fn is_function(&self) -> bool {
        self.kind() == DeclKind::Function
    }

    pub fn is_object(&self) -> bool {
        self.kind() == DeclKind::Object
    }

    pub fn is_type(&self) -> bool {
        self.kind() == DeclKind::Type
    }

    pub fn is_namespace(&self) -> bool {
        self.kind() == DeclKind::Namespace
    }

    pub fn is_alias(&self) -> bool {
        self.kind() == DeclKind::Alias
    }

    pub fn is_public(&self) -> bool {
        self.access == Accessibility::Public
    }

    pub fn is_protected(&self) -> bool {
        self.access == Accessibility::Protected
    }

    pub fn is_private(&self) -> bool {
        self.access == Accessibility::Private
    }

    pub fn is_default_access(&self) -> bool {
        self.access == Accessibility::Default
    }

    fn set_access(&mut self, access: Accessibility) -> bool {
        if self.access == Accessibility::Default || self.access == access {
            self.access = access;
            true
        } else {
            false
        }
    }

    pub fn make_public(&mut self) -> bool {
        self.set_access(Accessibility::Public)
    }

    pub fn make_protected(&mut self) -> bool {
        self.set_access(Accessibility::Protected)
    }

    pub fn make_private(&mut self) -> bool {
        self.set_access(Accessibility::Private)
    }

    pub fn default_to_public(&mut self) {
        if self.access == Accessibility::Default {
            self.access = Accessibility::Public;
        }
    }

    pub fn default_to_protected(&mut self) {
        if self.access == Accessibility::Default {
            self.access = Accessibility::Protected;
        }
    }

    pub fn default_to_private(&mut self) {
        if self.access == Accessibility::Default {
            self.access = Accessibility::Private;
        }
    }

    pub fn has_initializer(&self) -> bool {
        match &self.body {
            DeclarationBody::Function { body, .. } => body.is_some(),
            DeclarationBody::Object { initializer, .. } => initializer.is_some(),
            DeclarationBody::Type { .. } | DeclarationBody::Namespace { .. } => true,
            DeclarationBody::Alias { .. } => true,
        }
    }

    /// Child members of a type or namespace declaration
    pub fn members(&self) -> Option<&[Declaration]> {
        match &self.body {
            DeclarationBody::Type { members, .. } | DeclarationBody::Namespace { members } => {
                Some(members)
            }
            _ => None,
        }
    }

    pub fn members_mut(&mut self) -> Option<&mut Vec<Declaration>> {
        match &mut self.body {
            DeclarationBody::Type { members, .. } | DeclarationBody::Namespace { members } => {
                Some(members)
            }
            _ => None,
        }
    }

    pub fn signature(&self) -> Option<&FunctionSignature> {
        match &self.body {
            DeclarationBody::Function { signature, .. } => Some(signature),
            _ => None,
        }
    }

    pub fn signature_mut(&mut self) -> Option<&mut FunctionSignature> {
        match &mut self.body {
            DeclarationBody::Function { signature, .. } => Some(signature),
            _ => None,
        }
    }

    /// Sweep members marked for removal. Never called while any other
    /// code iterates the member list.
    pub fn remove_marked_members(&mut self) {
        if let Some(members) = self.members_mut() {
            members.retain(|m| !m.marked_for_removal);
        }
    }

    pub fn remove_all_members(&mut self) {
        if let Some(members) = self.members_mut() {
            members.clear();
        }
    }
}

/// One translation unit: an ordered forest of top-level declarations.
/// Order is semantically significant in the baseline dialect and must be
/// preserved through all mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub declarations: Vec<Declaration>,
}

impl TranslationUnit {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests;
