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

//! Compile-time reflection and metafunction application
//!
//! Metafunctions run after parsing and before any later stage sees the
//! tree: each one inspects and mutates the type declaration it is applied
//! to, synthesizing new members by feeding source text back through the
//! lexer and parser. Applications run strictly left to right and
//! accumulate errors rather than aborting.

use crate::ast::{
    AliasTarget, DeclKind, Declaration, DeclarationBody, ParamModifier, PassingStyle, ReturnSpec,
    Statement,
};
use crate::error::{ErrorSink, SourceLocation};
use crate::lexer::{lex_line, LexState, Token, TokenStore};
use crate::parser::Parser;

pub mod metafunctions;
pub mod registry;

pub use registry::{BuiltinRegistry, Metafunction, MetafunctionRegistry};

/// Re-entry services handed to a running metafunction
///
/// Owns no tree data itself; synthesized tokens go into the store's
/// append-only generated buffer so they outlive the trees that
/// reference them.
pub struct CompilerServices<'a> {
    errors: &'a mut ErrorSink,
    store: &'a mut TokenStore,
    metafunction_name: String,
    metafunction_args: Vec<String>,
    args_used: bool,
    /// Output produced by the `print` metafunction
    pub printed: Vec<String>,
}

impl<'a> CompilerServices<'a> {
    pub fn new(
        errors: &'a mut ErrorSink,
        store: &'a mut TokenStore,
        metafunction_name: String,
        metafunction_args: Vec<String>,
    ) -> Self {
        Self {
            errors,
            store,
            metafunction_name,
            metafunction_args,
            args_used: false,
            printed: Vec::new(),
        }
    }

    pub fn metafunction_name(&self) -> &str {
        &self.metafunction_name
    }

    /// The raw textual arguments of the request. Reading them marks them
    /// used; unused non-empty argument lists are reported when the
    /// application finishes.
    pub fn arguments(&mut self) -> &[String] {
        self.args_used = true;
        &self.metafunction_args
    }

    pub fn error(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.errors.error(location, message);
    }

    /// Tokenize synthesized source text. Generated tokens carry line 0 so
    /// they are distinguishable from hand-written ones; they are appended
    /// to the store's generated buffer and also returned for parsing.
    pub fn tokenize(&mut self, text: &str) -> Vec<Token> {
        let mut state = LexState::default();
        let mut tokens = Vec::new();
        let mut comments = Vec::new();
        for line in text.lines() {
            lex_line(line, 0, &mut state, &mut tokens, &mut comments, self.errors);
        }
        self.store.append_generated(tokens.iter().cloned());
        tokens
    }

    /// Parse synthesized text as one statement
    pub fn parse_statement(&mut self, text: &str) -> Option<Statement> {
        let tokens = self.tokenize(text);
        let mut parser = Parser::new(tokens, self.errors);
        match parser.parse_statement() {
            Ok(statement) => Some(statement),
            Err(error) => {
                self.errors.report(error.into());
                None
            }
        }
    }

    /// Parse synthesized text as one member declaration
    pub fn parse_declaration(&mut self, text: &str) -> Option<Declaration> {
        let tokens = self.tokenize(text);
        let mut parser = Parser::new(tokens, self.errors);
        match parser.parse_declaration(Some(DeclKind::Type)) {
            Ok(decl) => Some(decl),
            Err(error) => {
                self.errors.report(error.into());
                None
            }
        }
    }

    /// Report the unused-arguments diagnostic if applicable
    fn finish(&mut self, location: SourceLocation) {
        if !self.args_used && !self.metafunction_args.is_empty() {
            let name = self.metafunction_name.clone();
            self.errors.error(
                location,
                format!("metafunction '{name}' does not take arguments"),
            );
        }
    }
}

/// Which of the value-set functions a type already declares
///
/// Metafunctions consult this before synthesizing members, which is what
/// makes reapplication a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeclaredValueSetFunctions {
    /// `operator=: (out this)`
    pub out_this_default: bool,
    /// `operator=: (out this, that)`
    pub out_this_that: bool,
    /// `operator=: (inout this, that)`
    pub inout_this_that: bool,
    /// `operator=: (move this)`
    pub destructor: bool,
}

/// Mutable view of one type declaration during metafunction application
pub struct TypeView<'v, 'c> {
    decl: &'v mut Declaration,
    services: &'v mut CompilerServices<'c>,
}

impl<'v, 'c> TypeView<'v, 'c> {
    pub fn new(decl: &'v mut Declaration, services: &'v mut CompilerServices<'c>) -> Self {
        Self { decl, services }
    }

    pub fn name(&self) -> String {
        self.decl.name().unwrap_or_default().to_string()
    }

    pub fn location(&self) -> SourceLocation {
        self.decl.location
    }

    pub fn services(&mut self) -> &mut CompilerServices<'c> {
        self.services
    }

    pub fn declaration(&self) -> &Declaration {
        self.decl
    }

    pub fn declaration_mut(&mut self) -> &mut Declaration {
        self.decl
    }

    /// Report an error against this type and mark it unusable
    pub fn error(&mut self, message: impl Into<String>) {
        let location = self.decl.location;
        self.services.error(location, message);
        self.decl.unusable = true;
    }

    /// Check a requirement; on failure report and mark unusable
    pub fn require(&mut self, condition: bool, message: &str) -> bool {
        if !condition {
            self.error(message);
        }
        condition
    }

    pub fn members(&self) -> &[Declaration] {
        self.decl.members().unwrap_or_default()
    }

    pub fn members_mut(&mut self) -> &mut Vec<Declaration> {
        // A TypeView is only constructed over a type declaration
        self.decl
            .members_mut()
            .unwrap_or_else(|| unreachable!("TypeView over a non-type declaration"))
    }

    pub fn has_member_named(&self, name: &str) -> bool {
        self.members().iter().any(|m| m.has_name(name))
    }

    /// Member functions, as a live filter over the current member list
    pub fn member_functions(&mut self) -> impl Iterator<Item = FunctionView<'_>> + '_ {
        self.members_mut()
            .iter_mut()
            .filter(|m| m.is_function())
            .map(FunctionView::new)
    }

    /// Member objects (data members), as a live filter
    pub fn member_objects(&mut self) -> impl Iterator<Item = ObjectView<'_>> + '_ {
        self.members_mut()
            .iter_mut()
            .filter(|m| m.is_object())
            .map(ObjectView::new)
    }

    /// Member aliases, as a live filter
    pub fn member_aliases(&self) -> impl Iterator<Item = AliasView<'_>> + '_ {
        self.members()
            .iter()
            .filter(|m| m.is_alias())
            .map(AliasView::new)
    }

    /// Nested member types. These get their own view when their own
    /// metafunction lists are applied; here they are enumerated as plain
    /// declarations.
    pub fn member_types(&mut self) -> impl Iterator<Item = &mut Declaration> + '_ {
        self.members_mut().iter_mut().filter(|m| m.is_type())
    }

    /// Parse `source` as one member declaration and append it
    pub fn add_member(&mut self, source: &str) -> bool {
        match self.services.parse_declaration(source) {
            Some(mut member) => {
                member.parent_kind = Some(DeclKind::Type);
                self.members_mut().push(member);
                true
            }
            None => {
                self.error(format!("could not parse synthesized member '{source}'"));
                false
            }
        }
    }

    pub fn default_members_to_public(&mut self) {
        for member in self.members_mut() {
            member.default_to_public();
        }
    }

    pub fn default_members_to_private(&mut self) {
        for member in self.members_mut() {
            member.default_to_private();
        }
    }

    /// Which value-set functions are already declared, by parameter shape
    pub fn query_declared_value_set_functions(&self) -> DeclaredValueSetFunctions {
        let mut declared = DeclaredValueSetFunctions::default();
        for member in self.members() {
            if is_default_constructor(member) {
                declared.out_this_default = true;
            }
            if is_constructor_with_that(member) {
                declared.out_this_that = true;
            }
            if is_assignment_with_that(member) {
                declared.inout_this_that = true;
            }
            if is_destructor(member) {
                declared.destructor = true;
            }
        }
        declared
    }

    /// Does any member function declare a polymorphic `this`?
    pub fn has_polymorphic_functions(&self) -> bool {
        self.members()
            .iter()
            .filter(|m| m.is_function())
            .any(is_polymorphic_function)
    }

    pub fn is_final(&self) -> bool {
        matches!(&self.decl.body, DeclarationBody::Type { is_final: true, .. })
    }

    /// Mark the type final. Returns false for a non-type declaration.
    pub fn make_final(&mut self) -> bool {
        match &mut self.decl.body {
            DeclarationBody::Type { is_final, .. } => {
                *is_final = true;
                true
            }
            _ => false,
        }
    }

    pub fn remove_marked_members(&mut self) {
        self.decl.remove_marked_members();
    }

    /// Disable downstream synthesis of defaulted member functions
    pub fn disable_member_function_generation(&mut self) {
        self.decl.member_function_generation = false;
    }
}

/// Mutable view of one member function
pub struct FunctionView<'v> {
    decl: &'v mut Declaration,
}

impl<'v> FunctionView<'v> {
    pub fn new(decl: &'v mut Declaration) -> Self {
        Self { decl }
    }

    pub fn name(&self) -> String {
        self.decl.name().unwrap_or_default().to_string()
    }

    pub fn location(&self) -> SourceLocation {
        self.decl.location
    }

    pub fn declaration(&self) -> &Declaration {
        self.decl
    }

    pub fn declaration_mut(&mut self) -> &mut Declaration {
        self.decl
    }

    pub fn parameter_count(&self) -> usize {
        self.decl.signature().map_or(0, |s| s.parameter_count())
    }

    pub fn has_parameter_named(&self, name: &str) -> bool {
        self.decl
            .signature()
            .is_some_and(|s| s.has_parameter_named(name))
    }

    pub fn has_parameter_with_name_and_pass(&self, name: &str, pass: PassingStyle) -> bool {
        self.decl
            .signature()
            .is_some_and(|s| s.has_parameter_with_name_and_pass(name, pass))
    }

    pub fn is_constructor(&self) -> bool {
        is_constructor(self.decl)
    }

    pub fn is_default_constructor(&self) -> bool {
        is_default_constructor(self.decl)
    }

    pub fn is_constructor_with_that(&self) -> bool {
        is_constructor_with_that(self.decl)
    }

    pub fn is_assignment_with_that(&self) -> bool {
        is_assignment_with_that(self.decl)
    }

    pub fn is_destructor(&self) -> bool {
        is_destructor(self.decl)
    }

    pub fn is_comparison(&self) -> bool {
        is_comparison_function(self.decl)
    }

    /// `this` declared virtual/override/final
    pub fn is_virtual(&self) -> bool {
        is_polymorphic_function(self.decl)
    }

    pub fn has_body(&self) -> bool {
        self.decl.has_initializer()
    }

    /// Declared single return type, rendered to text
    pub fn return_type_text(&self) -> Option<String> {
        match self.decl.signature().map(|s| &s.returns) {
            Some(ReturnSpec::Single { type_id, .. }) => Some(type_id.to_string()),
            _ => None,
        }
    }

    pub fn default_to_public(&mut self) {
        self.decl.default_to_public();
    }

    pub fn mark_for_removal(&mut self) {
        self.decl.marked_for_removal = true;
    }

    /// Make the `this` parameter virtual if it carries no modifier yet.
    /// Returns false when the function has no leading `this` parameter.
    pub fn make_virtual(&mut self) -> bool {
        let Some(signature) = self.decl.signature_mut() else {
            return false;
        };
        match signature.parameters.first_mut() {
            Some(this) if this.has_name("this") => {
                if this.modifier == ParamModifier::None {
                    this.modifier = ParamModifier::Virtual;
                }
                true
            }
            _ => false,
        }
    }
}

/// Mutable view of one data member
pub struct ObjectView<'v> {
    decl: &'v mut Declaration,
}

impl<'v> ObjectView<'v> {
    pub fn new(decl: &'v mut Declaration) -> Self {
        Self { decl }
    }

    pub fn name(&self) -> String {
        self.decl.name().unwrap_or_default().to_string()
    }

    pub fn location(&self) -> SourceLocation {
        self.decl.location
    }

    pub fn declaration(&self) -> &Declaration {
        self.decl
    }

    pub fn has_initializer(&self) -> bool {
        self.decl.has_initializer()
    }

    /// Declared type rendered to text; `"_"` for a deduced type
    pub fn type_text(&self) -> Option<String> {
        self.decl.object_type()
    }

    pub fn initializer_text(&self) -> Option<String> {
        self.decl.object_initializer()
    }

    pub fn has_wildcard_type(&self) -> bool {
        matches!(&self.decl.body, DeclarationBody::Object { type_id, .. } if type_id.is_wildcard)
    }

    pub fn mark_for_removal(&mut self) {
        self.decl.marked_for_removal = true;
    }
}

/// Read-only view of one alias member
pub struct AliasView<'v> {
    decl: &'v Declaration,
}

impl<'v> AliasView<'v> {
    pub fn new(decl: &'v Declaration) -> Self {
        Self { decl }
    }

    pub fn name(&self) -> String {
        self.decl.name().unwrap_or_default().to_string()
    }

    pub fn location(&self) -> SourceLocation {
        self.decl.location
    }

    pub fn declaration(&self) -> &Declaration {
        self.decl
    }

    pub fn is_type_alias(&self) -> bool {
        matches!(
            &self.decl.body,
            DeclarationBody::Alias {
                target: AliasTarget::Type(_)
            }
        )
    }

    pub fn is_namespace_alias(&self) -> bool {
        matches!(
            &self.decl.body,
            DeclarationBody::Alias {
                target: AliasTarget::Namespace(_)
            }
        )
    }

    pub fn is_object_alias(&self) -> bool {
        matches!(
            &self.decl.body,
            DeclarationBody::Alias {
                target: AliasTarget::Object(_)
            }
        )
    }
}

// Function classification by parameter shape. In the candidate syntax all
// value-set functions are spelled `operator=`; what distinguishes them is
// how `this` is passed and whether a `that` parameter follows.

fn first_param_is(decl: &Declaration, name: &str, pass: PassingStyle) -> bool {
    decl.signature()
        .and_then(|s| s.parameters.first())
        .is_some_and(|p| p.has_name(name) && p.pass == pass)
}

/// `(out this, ...)`
pub fn is_constructor(decl: &Declaration) -> bool {
    decl.is_function() && first_param_is(decl, "this", PassingStyle::Out)
}

/// `(out this)` and nothing else
pub fn is_default_constructor(decl: &Declaration) -> bool {
    is_constructor(decl) && decl.signature().is_some_and(|s| s.parameter_count() == 1)
}

/// `(out this, that)`
pub fn is_constructor_with_that(decl: &Declaration) -> bool {
    is_constructor(decl)
        && decl.signature().is_some_and(|s| {
            s.parameter_count() == 2 && s.parameters[1].has_name("that")
        })
}

/// `(inout this, that)`
pub fn is_assignment_with_that(decl: &Declaration) -> bool {
    decl.is_function()
        && first_param_is(decl, "this", PassingStyle::Inout)
        && decl.signature().is_some_and(|s| {
            s.parameter_count() == 2 && s.parameters[1].has_name("that")
        })
}

/// `(move this)` and nothing else
pub fn is_destructor(decl: &Declaration) -> bool {
    decl.is_function()
        && first_param_is(decl, "this", PassingStyle::Move)
        && decl.signature().is_some_and(|s| s.parameter_count() == 1)
}

/// `this` declared virtual/override/final
pub fn is_polymorphic_function(decl: &Declaration) -> bool {
    decl.signature()
        .and_then(|s| s.parameters.first())
        .is_some_and(|p| p.has_name("this") && p.is_polymorphic())
}

/// Named `operator==`, `operator<=>`, or one of the relational operators
pub fn is_comparison_function(decl: &Declaration) -> bool {
    matches!(
        decl.name(),
        Some("operator==")
            | Some("operator!=")
            | Some("operator<=>")
            | Some("operator<")
            | Some("operator<=")
            | Some("operator>")
            | Some("operator>=")
    )
}

/// Apply a declaration's metafunction requests, strictly left to right
///
/// Each request resolves through the registry, runs against a fresh view,
/// and accumulates errors; a failed application marks the declaration
/// unusable but later requests still run. Returns text produced by
/// `print` requests.
pub fn apply_metafunctions(
    decl: &mut Declaration,
    registry: &dyn MetafunctionRegistry,
    store: &mut TokenStore,
    errors: &mut ErrorSink,
) -> Vec<String> {
    let mut printed = Vec::new();
    let requests = decl.metafunctions.clone();

    for request in requests {
        if !decl.is_type() {
            errors.error(
                request.location,
                format!(
                    "metafunction '{}' applied to a non-type declaration",
                    request.name
                ),
            );
            decl.unusable = true;
            continue;
        }
        let Some(function) = registry.resolve(&request.name) else {
            errors.error(
                request.location,
                format!("unknown metafunction '{}'", request.name),
            );
            decl.unusable = true;
            continue;
        };

        let mut services = CompilerServices::new(
            errors,
            store,
            request.name.clone(),
            request.arguments.clone(),
        );
        {
            let mut view = TypeView::new(decl, &mut services);
            function(&mut view);
        }
        services.finish(request.location);
        printed.append(&mut services.printed);
    }
    printed
}

/// Apply metafunctions to every type declaration of a translation unit,
/// recursing into namespaces
pub fn apply_unit_metafunctions(
    unit: &mut crate::ast::TranslationUnit,
    registry: &dyn MetafunctionRegistry,
    store: &mut TokenStore,
    errors: &mut ErrorSink,
) -> Vec<String> {
    let mut printed = Vec::new();
    for decl in &mut unit.declarations {
        apply_recursive(decl, registry, store, errors, &mut printed);
    }
    printed
}

fn apply_recursive(
    decl: &mut Declaration,
    registry: &dyn MetafunctionRegistry,
    store: &mut TokenStore,
    errors: &mut ErrorSink,
    printed: &mut Vec<String>,
) {
    if !decl.metafunctions.is_empty() {
        printed.append(&mut apply_metafunctions(decl, registry, store, errors));
    }
    if let Some(members) = decl.members_mut() {
        for member in members {
            apply_recursive(member, registry, store, errors, printed);
        }
    }
}

#[cfg(test)]
mod tests;
