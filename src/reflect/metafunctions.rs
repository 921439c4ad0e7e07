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

//! The builtin metafunction set
//!
//! Each metafunction checks what the type already declares before
//! synthesizing anything, so applying the same metafunction twice adds
//! no members the second time.

use super::TypeView;
use crate::ast::{Declaration, Expr};
use crate::lexer::Lexeme;

/// `@interface`: an abstract base. All functions are public and virtual
/// with no bodies; data members are not allowed; a virtual destructor is
/// synthesized if absent.
pub fn interface(t: &mut TypeView) {
    let mut has_destructor = false;
    let mut errors: Vec<String> = Vec::new();

    for object in t.member_objects() {
        errors.push(format!(
            "interface '{}' may not contain data members",
            object.name()
        ));
    }
    for mut function in t.member_functions() {
        function.default_to_public();
        if function.is_destructor() {
            has_destructor = true;
        } else if function.has_body() {
            errors.push(format!(
                "interface function '{}' may not have a body",
                function.name()
            ));
        }
        if !function.make_virtual() {
            errors.push(format!(
                "interface function '{}' must take 'this'",
                function.name()
            ));
        }
    }

    for message in errors {
        t.error(message);
    }
    if !has_destructor {
        t.add_member("operator=: (virtual move this) = { }");
    }
    t.disable_member_function_generation();
}

/// `@polymorphic_base`: public virtual destructor, no copying
pub fn polymorphic_base(t: &mut TypeView) {
    t.default_members_to_public();

    let mut copy_error = false;
    let mut destructor_error = false;
    let mut has_destructor = false;
    for function in t.member_functions() {
        if function.is_constructor_with_that() || function.is_assignment_with_that() {
            copy_error = true;
        }
        if function.is_destructor() {
            has_destructor = true;
            let decl = function.declaration();
            if !decl.is_public() && !decl.is_default_access() {
                destructor_error = true;
            }
        }
    }
    if copy_error {
        t.error("a polymorphic base may not copy or move; consider a virtual clone function instead");
    }
    if destructor_error {
        t.error("a polymorphic base must have a public destructor");
    }
    if !has_destructor {
        t.add_member("operator=: (virtual move this) = { }");
    }
}

fn ordered_impl(t: &mut TypeView, ordering: &str) {
    let existing = t
        .member_functions()
        .find(|f| f.name() == "operator<=>")
        .map(|f| f.return_type_text());
    match existing {
        Some(Some(ret)) if !ret.contains(ordering) => {
            t.error(format!(
                "operator<=> must return std::{ordering} for this ordering"
            ));
        }
        Some(_) => {}
        None => {
            t.add_member(&format!(
                "operator<=>: (this, that) -> std::{ordering};"
            ));
        }
    }
}

/// `@ordered`: totally ordered via `operator<=>` returning strong ordering
pub fn ordered(t: &mut TypeView) {
    ordered_impl(t, "strong_ordering");
}

/// `@weakly_ordered`
pub fn weakly_ordered(t: &mut TypeView) {
    ordered_impl(t, "weak_ordering");
}

/// `@partially_ordered`
pub fn partially_ordered(t: &mut TypeView) {
    ordered_impl(t, "partial_ordering");
}

/// `@copyable`: memberwise copy construction and assignment, synthesized
/// only when the type declares neither
pub fn copyable(t: &mut TypeView) {
    let declared = t.query_declared_value_set_functions();
    if !declared.out_this_that && !declared.inout_this_that {
        t.add_member("operator=: (out this, that) = { }");
    }
}

fn basic_value_impl(t: &mut TypeView) {
    copyable(t);
    let declared = t.query_declared_value_set_functions();
    if !declared.out_this_default {
        t.add_member("operator=: (out this) = { }");
    }

    let mut protected_error = false;
    let mut virtual_error = false;
    for function in t.member_functions() {
        if function.declaration().is_protected() {
            protected_error = true;
        }
        if function.is_virtual() {
            virtual_error = true;
        }
    }
    if protected_error {
        t.error("a value type may not have protected functions");
    }
    if virtual_error {
        t.error("a value type may not have virtual functions");
    }
}

/// `@basic_value`: copyable with a default constructor, no virtual or
/// protected functions
pub fn basic_value(t: &mut TypeView) {
    basic_value_impl(t);
}

/// `@value`: `@ordered` then `@basic_value`
pub fn value(t: &mut TypeView) {
    ordered_impl(t, "strong_ordering");
    basic_value_impl(t);
}

/// `@weakly_ordered_value`
pub fn weakly_ordered_value(t: &mut TypeView) {
    ordered_impl(t, "weak_ordering");
    basic_value_impl(t);
}

/// `@partially_ordered_value`
pub fn partially_ordered_value(t: &mut TypeView) {
    ordered_impl(t, "partial_ordering");
    basic_value_impl(t);
}

/// `@struct`: a plain aggregate. Everything public, no virtual functions.
pub fn plain_struct(t: &mut TypeView) {
    basic_value_impl(t);
    t.default_members_to_public();
    if t.has_polymorphic_functions() {
        t.error("a struct may not have virtual functions");
    }
}

/// One enumerator gathered before rewriting
struct Enumerator {
    name: String,
    explicit_value: Option<Option<i64>>,
}

fn literal_value(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Literal(token) => match token.kind {
            Lexeme::DecimalLiteral => token.text.parse().ok(),
            Lexeme::HexadecimalLiteral => {
                i64::from_str_radix(token.text.trim_start_matches("0x").trim_start_matches("0X"), 16)
                    .ok()
            }
            Lexeme::BinaryLiteral => {
                i64::from_str_radix(token.text.trim_start_matches("0b").trim_start_matches("0B"), 2)
                    .ok()
            }
            _ => None,
        },
        Expr::Prefix { ops, expr } => {
            let inner = literal_value(expr)?;
            let negations = ops.iter().filter(|t| t.kind == Lexeme::Minus).count();
            if negations % 2 == 1 {
                Some(-inner)
            } else {
                Some(inner)
            }
        }
        _ => None,
    }
}

fn signed_underlying(min: i64, max: i64) -> &'static str {
    if min >= i8::MIN as i64 && max <= i8::MAX as i64 {
        "i8"
    } else if min >= i16::MIN as i64 && max <= i16::MAX as i64 {
        "i16"
    } else if min >= i32::MIN as i64 && max <= i32::MAX as i64 {
        "i32"
    } else {
        "i64"
    }
}

fn unsigned_underlying(max: i64) -> &'static str {
    if max <= u8::MAX as i64 {
        "u8"
    } else if max <= u16::MAX as i64 {
        "u16"
    } else if max <= u32::MAX as i64 {
        "u32"
    } else {
        "u64"
    }
}

fn enum_impl(t: &mut TypeView, bitwise: bool) {
    let explicit_underlying = t.services().arguments().first().cloned();

    // A typed `value` data member means a previous application already
    // rewrote the enumerators into constants; nothing left to do
    if t.member_objects()
        .any(|o| o.name() == "value" && !o.has_wildcard_type())
    {
        return;
    }

    let mut enumerators = Vec::new();
    for object in t.member_objects() {
        let name = object.name();
        if name.is_empty() {
            continue;
        }
        let explicit_value = object
            .has_initializer()
            .then(|| member_initializer_value(object.declaration()));
        enumerators.push(Enumerator {
            name,
            explicit_value,
        });
    }

    if enumerators.is_empty() {
        t.error("an enumeration must have at least one enumerator");
        return;
    }
    for i in 1..enumerators.len() {
        if enumerators[..i].iter().any(|e| e.name == enumerators[i].name) {
            let name = enumerators[i].name.clone();
            t.error(format!("duplicate enumerator '{name}'"));
            return;
        }
    }

    // Assign values: explicit initializers reset the running value;
    // otherwise increment, or step to the next power of two for flags
    let mut values = Vec::new();
    let mut next: i64 = if bitwise { 1 } else { 0 };
    for e in &enumerators {
        let value = match &e.explicit_value {
            Some(Some(v)) => *v,
            Some(None) => {
                let name = e.name.clone();
                t.error(format!(
                    "enumerator '{name}' initializer must be an integral literal"
                ));
                return;
            }
            None => next,
        };
        next = if bitwise {
            if value <= 0 {
                1
            } else {
                value << 1
            }
        } else {
            value + 1
        };
        values.push(value);
    }

    let min = values.iter().copied().min().unwrap_or(0);
    let max = values.iter().copied().max().unwrap_or(0);
    if bitwise && min < 0 {
        t.error("flag enumerators must be non-negative");
        return;
    }
    let underlying = match explicit_underlying {
        Some(u) => u,
        None if bitwise => unsigned_underlying(max).to_string(),
        None => signed_underlying(min, max).to_string(),
    };

    // Rewrite: enumerators become constants of the enclosing type with a
    // single `value` data member of the underlying type
    for mut object in t.member_objects() {
        object.mark_for_removal();
    }
    t.remove_marked_members();

    let type_name = t.name();
    t.add_member(&format!("value: {underlying};"));
    if bitwise && !enumerators.iter().any(|e| e.name == "none") {
        t.add_member(&format!("none: {type_name} = 0;"));
    }
    for (e, v) in enumerators.iter().zip(&values) {
        t.add_member(&format!("{}: {type_name} = {v};", e.name));
    }

    ordered_impl(t, "strong_ordering");
    if bitwise {
        t.add_member("operator|=: (inout this, that) = { value |= that.value; }");
        t.add_member("operator&=: (inout this, that) = { value &= that.value; }");
        t.add_member("operator^=: (inout this, that) = { value ^= that.value; }");
        t.add_member(&format!(
            "has: (this, flags: {type_name}) -> bool = {{ return (value & flags.value) != 0; }}"
        ));
        t.add_member(&format!(
            "set: (inout this, flags: {type_name}) = {{ value |= flags.value; }}"
        ));
        t.add_member(&format!(
            "clear: (inout this, flags: {type_name}) = {{ value &= flags.value ~; }}"
        ));
    }
    basic_value_impl(t);
}

fn member_initializer_value(member: &Declaration) -> Option<i64> {
    match &member.body {
        crate::ast::DeclarationBody::Object {
            initializer: Some(expr),
            ..
        } => literal_value(expr),
        _ => None,
    }
}

/// `@basic_enum`: enumerators with assigned values over a sized
/// underlying type. Takes the underlying type as an optional argument.
pub fn basic_enum(t: &mut TypeView) {
    enum_impl(t, false);
}

/// `@enum`: `@basic_enum` plus strong ordering
pub fn value_enum(t: &mut TypeView) {
    enum_impl(t, false);
}

/// `@flag_enum`: power-of-two enumerators over an unsigned underlying
/// type, with bitwise set/clear/test functions and a `none` value
pub fn flag_enum(t: &mut TypeView) {
    enum_impl(t, true);
}

/// `@union`: a discriminated union. Object members become alternatives
/// reachable only through generated checked accessors.
pub fn union_type(t: &mut TypeView) {
    let mut alternatives = Vec::new();
    for object in t.member_objects() {
        let name = object.name();
        if name.is_empty() {
            continue;
        }
        let type_text = object.type_text().unwrap_or_default();
        alternatives.push((name, type_text));
    }

    if alternatives.is_empty() {
        t.error("a union must have at least one alternative");
        return;
    }
    if alternatives.iter().any(|(_, ty)| ty == "_" || ty.is_empty()) {
        t.error("every union alternative must have a declared type");
        return;
    }

    let discriminator = if alternatives.len() <= i8::MAX as usize {
        "i8"
    } else {
        "i16"
    };

    let mut has_destructor = false;
    for mut object in t.member_objects() {
        object.mark_for_removal();
    }
    for function in t.member_functions() {
        if function.is_destructor() {
            has_destructor = true;
        }
    }
    t.remove_marked_members();

    let storage_args = alternatives
        .iter()
        .map(|(_, ty)| ty.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    t.add_member(&format!("_storage: std::aligned_storage_for<{storage_args}>;"));
    t.add_member(&format!("_discriminator: {discriminator} = -1;"));

    for (index, (name, ty)) in alternatives.iter().enumerate() {
        t.add_member(&format!(
            "is_{name}: (this) -> bool = {{ return _discriminator == {index}; }}"
        ));
        t.add_member(&format!(
            "{name}: (this) -> {ty} = {{ assert(_discriminator == {index}); return _storage.as_{name}(); }}"
        ));
        t.add_member(&format!(
            "set_{name}: (inout this, value: {ty}) = {{ _storage.construct_{name}(value); _discriminator = {index}; }}"
        ));
    }
    if !has_destructor {
        t.add_member("operator=: (move this) = { _discriminator = -1; }");
    }
    t.disable_member_function_generation();
}

/// `@print`: report the type's shape through the services output channel
pub fn print(t: &mut TypeView) {
    let mut out = format!("type {}", t.name());
    for member in t.members() {
        out.push_str("\n    ");
        out.push_str(&member.summary());
    }
    t.services().printed.push(out);
}
