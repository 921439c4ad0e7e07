use super::*;
use crate::error::ErrorSink;
use crate::lexer::{lex_line, LexState, Token, TokenStore};
use crate::parser::Parser;

fn tokenize(text: &str) -> Vec<Token> {
    let mut state = LexState::default();
    let mut tokens = Vec::new();
    let mut comments = Vec::new();
    let mut errors = ErrorSink::new();
    for (index, line) in text.lines().enumerate() {
        lex_line(line, index + 1, &mut state, &mut tokens, &mut comments, &mut errors);
    }
    assert!(errors.is_empty(), "lex errors in test input");
    tokens
}

fn parse_decl(text: &str) -> Declaration {
    let mut errors = ErrorSink::new();
    let decl = {
        let mut parser = Parser::new(tokenize(text), &mut errors);
        parser.parse_declaration(None).expect("declaration should parse")
    };
    assert!(errors.is_empty(), "parse errors: {:?}", errors.entries());
    decl
}

fn apply(text: &str) -> (Declaration, TokenStore, ErrorSink, Vec<String>) {
    let mut decl = parse_decl(text);
    let mut store = TokenStore::new();
    let mut errors = ErrorSink::new();
    let printed = apply_metafunctions(&mut decl, &BuiltinRegistry::new(), &mut store, &mut errors);
    (decl, store, errors, printed)
}

fn member_names(decl: &Declaration) -> Vec<&str> {
    decl.members()
        .unwrap_or_default()
        .iter()
        .filter_map(|m| m.name())
        .collect()
}

#[test]
fn test_classification_by_parameter_shape() {
    let ctor = parse_decl("operator=: (out this, x: i32) = { }");
    assert!(is_constructor(&ctor));
    assert!(!is_default_constructor(&ctor));

    let default_ctor = parse_decl("operator=: (out this) = { }");
    assert!(is_default_constructor(&default_ctor));

    let copy = parse_decl("operator=: (out this, that) = { }");
    assert!(is_constructor_with_that(&copy));

    let assign = parse_decl("operator=: (inout this, that) = { }");
    assert!(is_assignment_with_that(&assign));

    let dtor = parse_decl("operator=: (move this) = { }");
    assert!(is_destructor(&dtor));

    let plain = parse_decl("f: (this, x: i32) = { }");
    assert!(!is_constructor(&plain));
    assert!(!is_destructor(&plain));
}

#[test]
fn test_query_declared_value_set_functions() {
    let decl = parse_decl(
        "t: type = {\n    operator=: (out this) = { }\n    operator=: (inout this, that) = { }\n}",
    );
    let mut store = TokenStore::new();
    let mut errors = ErrorSink::new();
    let mut decl = decl;
    let mut services = CompilerServices::new(&mut errors, &mut store, String::new(), Vec::new());
    let view = TypeView::new(&mut decl, &mut services);
    let declared = view.query_declared_value_set_functions();
    assert!(declared.out_this_default);
    assert!(declared.inout_this_that);
    assert!(!declared.out_this_that);
    assert!(!declared.destructor);
}

#[test]
fn test_member_enumerations_filter_by_kind() {
    let mut decl = parse_decl(
        "t: type = {\n    f: (this) = { }\n    x: i32 = 0;\n    u: type == i32;\n    n: type = { }\n}",
    );
    let mut store = TokenStore::new();
    let mut errors = ErrorSink::new();
    let mut services = CompilerServices::new(&mut errors, &mut store, String::new(), Vec::new());
    let mut view = TypeView::new(&mut decl, &mut services);

    let function_names: Vec<String> = view.member_functions().map(|f| f.name()).collect();
    assert_eq!(function_names, vec!["f"]);
    let object_names: Vec<String> = view.member_objects().map(|o| o.name()).collect();
    assert_eq!(object_names, vec!["x"]);
    let alias_names: Vec<String> = view.member_aliases().map(|a| a.name()).collect();
    assert_eq!(alias_names, vec!["u"]);
    assert!(view.member_aliases().all(|a| a.is_type_alias()));
    assert_eq!(view.member_types().count(), 1);

    // Enumerations are live filters: adding a member shows up immediately
    assert!(view.add_member("g: (this) = { }"));
    assert_eq!(view.member_functions().count(), 2);
}

#[test]
fn test_function_view_queries_and_make_virtual() {
    let mut decl = parse_decl(
        "t: type = {\n    f: (this, x: i32) -> bool = { return true; }\n    g: (this);\n}",
    );
    let mut store = TokenStore::new();
    let mut errors = ErrorSink::new();
    let mut services = CompilerServices::new(&mut errors, &mut store, String::new(), Vec::new());
    let mut view = TypeView::new(&mut decl, &mut services);

    {
        let f = view.member_functions().next().expect("f");
        assert_eq!(f.parameter_count(), 2);
        assert!(f.has_parameter_named("x"));
        assert!(f.has_parameter_with_name_and_pass("this", PassingStyle::In));
        assert_eq!(f.return_type_text().as_deref(), Some("bool"));
        assert!(f.has_body());
        assert!(!f.is_virtual());
        assert!(!f.is_constructor());
    }
    for mut function in view.member_functions() {
        assert!(function.make_virtual());
    }
    assert!(view.member_functions().all(|f| f.is_virtual()));
}

#[test]
fn test_type_view_finality_toggle() {
    let mut decl = parse_decl("t: type = { }");
    let mut store = TokenStore::new();
    let mut errors = ErrorSink::new();
    let mut services = CompilerServices::new(&mut errors, &mut store, String::new(), Vec::new());
    let mut view = TypeView::new(&mut decl, &mut services);

    assert!(!view.is_final());
    assert!(view.make_final());
    assert!(view.is_final());

    let mut parsed_final = parse_decl("u: final type = { }");
    let mut services = CompilerServices::new(&mut errors, &mut store, String::new(), Vec::new());
    let view = TypeView::new(&mut parsed_final, &mut services);
    assert!(view.is_final());
}

#[test]
fn test_object_view_type_and_initializer_text() {
    let mut decl = parse_decl("t: type = {\n    x: i32 = 0;\n    y := 5;\n}");
    let mut store = TokenStore::new();
    let mut errors = ErrorSink::new();
    let mut services = CompilerServices::new(&mut errors, &mut store, String::new(), Vec::new());
    let mut view = TypeView::new(&mut decl, &mut services);

    let objects: Vec<(String, Option<String>, bool)> = view
        .member_objects()
        .map(|o| (o.name(), o.type_text(), o.has_wildcard_type()))
        .collect();
    assert_eq!(objects[0], ("x".into(), Some("i32".into()), false));
    assert_eq!(objects[1].0, "y");
    assert!(objects[1].2);
}

#[test]
fn test_copyable_synthesizes_only_when_absent() {
    let (decl, _, errors, _) = apply("t: @copyable type = { x: i32 = 0; }");
    assert!(errors.is_empty());
    let copies = decl
        .members()
        .unwrap_or_default()
        .iter()
        .filter(|m| is_constructor_with_that(m))
        .count();
    assert_eq!(copies, 1);

    // A type that already declares copying gets nothing new
    let (decl, _, errors, _) =
        apply("t: @copyable type = { operator=: (out this, that) = { } }");
    assert!(errors.is_empty());
    assert_eq!(decl.members().map(|m| m.len()), Some(1));
}

#[test]
fn test_value_adds_ordering_and_value_set() {
    let (decl, _, errors, _) = apply("t: @value type = { x: i32 = 0; }");
    assert!(errors.is_empty(), "{:?}", errors.entries());
    let names = member_names(&decl);
    assert!(names.contains(&"operator<=>"));
    let members = decl.members().unwrap_or_default();
    assert!(members.iter().any(|m| is_constructor_with_that(m)));
    assert!(members.iter().any(|m| is_default_constructor(m)));
}

#[test]
fn test_value_application_is_idempotent() {
    let mut decl = parse_decl("t: @value type = { x: i32 = 0; }");
    let mut store = TokenStore::new();
    let mut errors = ErrorSink::new();
    let registry = BuiltinRegistry::new();

    apply_metafunctions(&mut decl, &registry, &mut store, &mut errors);
    let after_first = decl.members().map(|m| m.len());

    apply_metafunctions(&mut decl, &registry, &mut store, &mut errors);
    let after_second = decl.members().map(|m| m.len());

    assert!(errors.is_empty(), "{:?}", errors.entries());
    assert_eq!(after_first, after_second);
}

#[test]
fn test_ordered_rejects_wrong_ordering_category() {
    let (decl, _, errors, _) = apply(
        "t: @weakly_ordered type = {\n    operator<=>: (this, that) -> std::strong_ordering;\n}",
    );
    assert!(!errors.is_empty());
    assert!(decl.unusable);
}

#[test]
fn test_interface_rejects_data_members() {
    let (decl, _, errors, _) = apply("s: @interface type = {\n    x: i32 = 0;\n}");
    assert!(!errors.is_empty());
    assert!(decl.unusable);
}

#[test]
fn test_interface_makes_functions_virtual_and_adds_destructor() {
    let (decl, _, errors, _) = apply(
        "shape: @interface type = {\n    draw: (this);\n    area: (this) -> f64;\n}",
    );
    assert!(errors.is_empty(), "{:?}", errors.entries());
    let members = decl.members().unwrap_or_default();
    // Both declared functions now take a virtual this
    assert!(members
        .iter()
        .filter(|m| m.has_name("draw") || m.has_name("area"))
        .all(is_polymorphic_function));
    // And a destructor was synthesized
    assert!(members.iter().any(|m| is_destructor(m)));
    assert!(!decl.member_function_generation);
}

#[test]
fn test_polymorphic_base_rejects_copying() {
    let (decl, _, errors, _) = apply(
        "b: @polymorphic_base type = {\n    operator=: (out this, that) = { }\n}",
    );
    assert!(!errors.is_empty());
    assert!(decl.unusable);
}

#[test]
fn test_enum_assigns_and_rewrites_values() {
    let (decl, _, errors, _) = apply(
        "color: @enum type = {\n    red := 1;\n    green: _;\n    blue := 10;\n}",
    );
    assert!(errors.is_empty(), "{:?}", errors.entries());
    let members = decl.members().unwrap_or_default();

    let value = members.iter().find(|m| m.has_name("value")).expect("value member");
    assert_eq!(value.object_type().as_deref(), Some("i8"));

    let green = members.iter().find(|m| m.has_name("green")).expect("green");
    assert_eq!(green.object_initializer().as_deref(), Some("2"));
    let blue = members.iter().find(|m| m.has_name("blue")).expect("blue");
    assert_eq!(blue.object_initializer().as_deref(), Some("10"));
    assert_eq!(blue.object_type().as_deref(), Some("color"));

    assert!(member_names(&decl).contains(&"operator<=>"));
}

#[test]
fn test_enum_application_is_idempotent() {
    let mut decl = parse_decl("color: @enum type = {\n    red := 1;\n    green: _;\n}");
    let mut store = TokenStore::new();
    let mut errors = ErrorSink::new();
    let registry = BuiltinRegistry::new();

    apply_metafunctions(&mut decl, &registry, &mut store, &mut errors);
    let after_first: Vec<String> = member_names(&decl).iter().map(|n| n.to_string()).collect();

    apply_metafunctions(&mut decl, &registry, &mut store, &mut errors);
    let after_second: Vec<String> = member_names(&decl).iter().map(|n| n.to_string()).collect();

    assert!(errors.is_empty(), "{:?}", errors.entries());
    assert_eq!(after_first, after_second);
    // Exactly one value member survives
    let values = decl
        .members()
        .unwrap_or_default()
        .iter()
        .filter(|m| m.is_object() && m.has_name("value"))
        .count();
    assert_eq!(values, 1);
}

#[test]
fn test_enum_underlying_type_from_range() {
    let (decl, _, errors, _) = apply("big: @enum type = {\n    a := 40000;\n}");
    assert!(errors.is_empty());
    let members = decl.members().unwrap_or_default();
    let value = members.iter().find(|m| m.has_name("value")).expect("value member");
    assert_eq!(value.object_type().as_deref(), Some("i32"));
}

#[test]
fn test_enum_explicit_underlying_argument() {
    let (decl, _, errors, _) = apply("tiny: @basic_enum(u8) type = {\n    a := 1;\n}");
    assert!(errors.is_empty(), "{:?}", errors.entries());
    let members = decl.members().unwrap_or_default();
    let value = members.iter().find(|m| m.has_name("value")).expect("value member");
    assert_eq!(value.object_type().as_deref(), Some("u8"));
}

#[test]
fn test_flag_enum_powers_of_two_and_none() {
    let (decl, _, errors, _) = apply(
        "file_access: @flag_enum type = {\n    read: _;\n    write: _;\n    exec: _;\n}",
    );
    assert!(errors.is_empty(), "{:?}", errors.entries());
    let members = decl.members().unwrap_or_default();

    let get = |name: &str| {
        members
            .iter()
            .find(|m| m.has_name(name))
            .unwrap_or_else(|| panic!("missing member {name}"))
    };
    assert_eq!(get("read").object_initializer().as_deref(), Some("1"));
    assert_eq!(get("write").object_initializer().as_deref(), Some("2"));
    assert_eq!(get("exec").object_initializer().as_deref(), Some("4"));
    assert_eq!(get("none").object_initializer().as_deref(), Some("0"));
    assert_eq!(get("value").object_type().as_deref(), Some("u8"));

    let names = member_names(&decl);
    assert!(names.contains(&"has"));
    assert!(names.contains(&"set"));
    assert!(names.contains(&"clear"));
}

#[test]
fn test_empty_enum_is_an_error() {
    let (decl, _, errors, _) = apply("e: @enum type = { }");
    assert!(!errors.is_empty());
    assert!(decl.unusable);
}

#[test]
fn test_union_generates_checked_accessors() {
    let (decl, _, errors, _) = apply(
        "v: @union type = {\n    i: i32;\n    s: std::string;\n}",
    );
    assert!(errors.is_empty(), "{:?}", errors.entries());
    let names = member_names(&decl);
    assert!(names.contains(&"_discriminator"));
    assert!(names.contains(&"is_i"));
    assert!(names.contains(&"set_i"));
    assert!(names.contains(&"is_s"));
    assert!(names.contains(&"set_s"));
    // Raw alternatives replaced by accessors
    let members = decl.members().unwrap_or_default();
    assert!(members.iter().filter(|m| m.has_name("i")).all(|m| m.is_function()));
    assert!(members.iter().any(|m| is_destructor(m)));
}

#[test]
fn test_union_requires_typed_alternatives() {
    let (decl, _, errors, _) = apply("v: @union type = {\n    x := 0;\n}");
    assert!(!errors.is_empty());
    assert!(decl.unusable);
}

#[test]
fn test_print_reports_shape() {
    let (_, _, errors, printed) = apply("p: @print type = {\n    x: i32 = 0;\n}");
    assert!(errors.is_empty());
    assert_eq!(printed.len(), 1);
    assert!(printed[0].contains("type p"));
    assert!(printed[0].contains("object x"));
}

#[test]
fn test_unknown_metafunction_reported() {
    let (decl, _, errors, _) = apply("t: @nosuch type = { }");
    assert!(!errors.is_empty());
    assert!(decl.unusable);
    assert!(errors.entries()[0].message.contains("nosuch"));
}

#[test]
fn test_unused_arguments_reported() {
    let (_, _, errors, _) = apply("t: @copyable(extra) type = { }");
    assert!(!errors.is_empty());
    assert!(errors.entries()[0].message.contains("copyable"));
}

#[test]
fn test_metafunction_on_non_type_reported() {
    let mut decl = parse_decl("x: @value i32 = 0;");
    let mut store = TokenStore::new();
    let mut errors = ErrorSink::new();
    apply_metafunctions(&mut decl, &BuiltinRegistry::new(), &mut store, &mut errors);
    assert!(!errors.is_empty());
    assert!(decl.unusable);
}

#[test]
fn test_non_type_errors_accumulate_across_requests() {
    // Every request in the list is reported, not just the first
    let mut decl = parse_decl("x: @value @copyable i32 = 0;");
    let mut store = TokenStore::new();
    let mut errors = ErrorSink::new();
    apply_metafunctions(&mut decl, &BuiltinRegistry::new(), &mut store, &mut errors);
    assert_eq!(errors.len(), 2);
    assert!(decl.unusable);
}

#[test]
fn test_applications_run_left_to_right_and_accumulate() {
    let (decl, _, errors, _) = apply("t: @nosuch @copyable type = { }");
    // The unknown name is reported, and copyable still ran afterwards
    assert!(!errors.is_empty());
    assert!(decl
        .members()
        .unwrap_or_default()
        .iter()
        .any(|m| is_constructor_with_that(m)));
}

#[test]
fn test_generated_tokens_go_to_store() {
    let (_, store, errors, _) = apply("t: @value type = { x: i32 = 0; }");
    assert!(errors.is_empty());
    // Synthesized members were tokenized into the append-only buffer
    assert!(!store.generated().is_empty());
    // Generated tokens are marked by line 0
    assert!(store.generated().iter().all(|t| t.location.line == 0));
}

#[test]
fn test_builtin_registry_resolves_whole_set() {
    let registry = BuiltinRegistry::new();
    for name in [
        "interface",
        "polymorphic_base",
        "ordered",
        "weakly_ordered",
        "partially_ordered",
        "copyable",
        "basic_value",
        "value",
        "weakly_ordered_value",
        "partially_ordered_value",
        "struct",
        "basic_enum",
        "enum",
        "flag_enum",
        "union",
        "print",
    ] {
        assert!(registry.resolve(name).is_some(), "missing builtin {name}");
    }
    assert!(registry.resolve("not_a_metafunction").is_none());
}
