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

//! End-to-end metafunction tests: requests parsed from source, resolved
//! through the registry, and applied against the finished tree.

use veneer::ast::Declaration;
use veneer::reflect::{self, BuiltinRegistry, MetafunctionRegistry};
use veneer::source::{LineCategory, SourceLine};
use veneer::{compile, FrontEndResult};

fn compile_candidate(text: &str) -> FrontEndResult {
    let lines: Vec<SourceLine> = text
        .lines()
        .map(|l| SourceLine::new(l, LineCategory::Candidate))
        .collect();
    compile(&lines)
}

fn member_names(decl: &Declaration) -> Vec<&str> {
    decl.members()
        .unwrap_or_default()
        .iter()
        .filter_map(|m| m.name())
        .collect()
}

#[test]
fn test_value_type_end_to_end() {
    let result = compile_candidate("point: @value type = {\n    x: i32 = 0;\n    y: i32 = 0;\n}");
    assert!(result.succeeded(), "{:?}", result.errors.entries());

    let decl = &result.unit.declarations[0];
    let names = member_names(decl);
    assert!(names.contains(&"operator<=>"));
    // Copy and default construction synthesized alongside the two fields
    assert!(names.iter().filter(|n| **n == "operator=").count() >= 2);
    assert!(!decl.unusable);
}

#[test]
fn test_metafunctions_apply_in_request_order() {
    // @ordered runs before @print, so the printed shape includes the
    // synthesized comparison
    let result = compile_candidate("t: @ordered @print type = {\n    x: i32 = 0;\n}");
    assert!(result.succeeded(), "{:?}", result.errors.entries());
    assert_eq!(result.printed.len(), 1);
    assert!(result.printed[0].contains("operator<=>"));
}

#[test]
fn test_print_before_ordered_sees_no_comparison() {
    let result = compile_candidate("t: @print @ordered type = {\n    x: i32 = 0;\n}");
    assert!(result.succeeded());
    assert!(!result.printed[0].contains("operator<=>"));
}

#[test]
fn test_interface_end_to_end() {
    let result = compile_candidate(
        "drawable: @interface type = {\n    draw: (this);\n    size: (this) -> i32;\n}",
    );
    assert!(result.succeeded(), "{:?}", result.errors.entries());
    let decl = &result.unit.declarations[0];
    // Destructor synthesized from re-entrant parsing of generated text
    assert!(decl
        .members()
        .unwrap_or_default()
        .iter()
        .any(|m| m.has_name("operator=")));
}

#[test]
fn test_enum_end_to_end() {
    let result = compile_candidate(
        "status: @enum type = {\n    active := 1;\n    paused: _;\n    stopped: _;\n}",
    );
    assert!(result.succeeded(), "{:?}", result.errors.entries());
    let decl = &result.unit.declarations[0];
    let members = decl.members().unwrap_or_default();
    let paused = members.iter().find(|m| m.has_name("paused")).expect("paused");
    assert_eq!(paused.object_initializer().as_deref(), Some("2"));
    let stopped = members.iter().find(|m| m.has_name("stopped")).expect("stopped");
    assert_eq!(stopped.object_initializer().as_deref(), Some("3"));
}

#[test]
fn test_metafunctions_inside_namespaces() {
    let result = compile_candidate(
        "app: namespace = {\n    config: @copyable type = {\n        level: i32 = 0;\n    }\n}",
    );
    assert!(result.succeeded(), "{:?}", result.errors.entries());
    let ns = &result.unit.declarations[0];
    let ty = &ns.members().expect("members")[0];
    assert!(member_names(ty).contains(&"operator="));
}

#[test]
fn test_failed_application_marks_unusable_but_run_continues() {
    let result = compile_candidate(
        "bad: @interface type = {\n    x: i32 = 0;\n}\ngood: i32 = 1;",
    );
    assert!(!result.succeeded());
    assert!(result.unit.declarations[0].unusable);
    assert!(result.unit.declarations[1].has_name("good"));
}

#[test]
fn test_generated_members_reparse_through_same_grammar() {
    // Members synthesized by @value must classify exactly like
    // hand-written ones on a second pass
    let result = compile_candidate("t: @value type = { x: i32 = 0; }");
    assert!(result.succeeded());
    let decl = &result.unit.declarations[0];
    let synthesized = decl
        .members()
        .unwrap_or_default()
        .iter()
        .filter(|m| m.has_name("operator="))
        .count();
    assert!(synthesized >= 2);
    assert!(!result.tokens.generated().is_empty());
}

#[test]
fn test_registry_trait_object_dispatch() {
    // The pipeline accepts any registry implementation
    struct Empty;
    impl MetafunctionRegistry for Empty {
        fn resolve(&self, _name: &str) -> Option<reflect::Metafunction> {
            None
        }
    }

    let lines = vec![SourceLine::new(
        "t: @value type = { x: i32 = 0; }",
        LineCategory::Candidate,
    )];
    let result = veneer::compile_with_registry(&lines, &Empty);
    assert!(!result.succeeded());
    assert!(result
        .errors
        .entries()
        .iter()
        .any(|e| e.message.contains("unknown metafunction")));

    let builtin = veneer::compile_with_registry(&lines, &BuiltinRegistry::new());
    assert!(builtin.succeeded());
}
