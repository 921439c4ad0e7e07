use super::*;
use crate::lexer::Lexeme;

fn loc(line: usize, column: usize) -> SourceLocation {
    SourceLocation::new(line, column)
}

fn ident(text: &str) -> Token {
    Token::new(text, loc(1, 1), Lexeme::Identifier)
}

fn object_decl(name: &str) -> Declaration {
    let mut decl = Declaration::new(
        loc(1, 1),
        DeclarationBody::Object {
            type_id: TypeId::wildcard(loc(1, 1)),
            initializer: None,
        },
    );
    decl.identifier = Some(ident(name));
    decl
}

fn type_decl(name: &str, members: Vec<Declaration>) -> Declaration {
    let mut decl = Declaration::new(
        loc(1, 1),
        DeclarationBody::Type {
            is_final: false,
            members,
        },
    );
    decl.identifier = Some(ident(name));
    decl
}

#[test]
fn test_declaration_kind_queries() {
    let decl = object_decl("x");
    assert!(decl.is_object());
    assert!(!decl.is_type());
    assert_eq!(decl.kind(), DeclKind::Object);
    assert!(decl.has_name("x"));
}

#[test]
fn test_access_transition_rules() {
    let mut decl = object_decl("x");
    assert!(decl.is_default_access());
    // Default -> explicit succeeds
    assert!(decl.make_public());
    // Same access again is fine
    assert!(decl.make_public());
    // Conflicting explicit access is rejected, state unchanged
    assert!(!decl.make_private());
    assert!(decl.is_public());
}

#[test]
fn test_default_to_only_fills_default() {
    let mut decl = object_decl("x");
    decl.access = Accessibility::Private;
    decl.default_to_public();
    assert!(decl.is_private());

    let mut other = object_decl("y");
    other.default_to_public();
    assert!(other.is_public());
}

#[test]
fn test_remove_marked_members() {
    let mut a = object_decl("a");
    a.marked_for_removal = true;
    let b = object_decl("b");
    let mut ty = type_decl("t", vec![a, b]);

    ty.remove_marked_members();
    let members = ty.members().expect("members");
    assert_eq!(members.len(), 1);
    assert!(members[0].has_name("b"));
}

#[test]
fn test_parent_kind_is_relational_only() {
    let mut member = object_decl("m");
    member.parent_kind = Some(DeclKind::Type);
    let ty = type_decl("t", vec![member]);

    // The child records its parent's kind without referencing the parent
    let child = &ty.members().expect("members")[0];
    assert_eq!(child.parent_kind, Some(DeclKind::Type));
    let serialized = serde_json::to_string(child).expect("serialize");
    let back: Declaration = serde_json::from_str(&serialized).expect("deserialize");
    assert_eq!(back.parent_kind, Some(DeclKind::Type));
}

#[test]
fn test_expr_location_is_leftmost() {
    let lhs = Expr::Literal(Token::new("1", loc(2, 3), Lexeme::DecimalLiteral));
    let rhs = Expr::Literal(Token::new("2", loc(2, 7), Lexeme::DecimalLiteral));
    let expr = Expr::Binary {
        level: BinaryLevel::Additive,
        lhs: Box::new(lhs),
        terms: vec![BinaryTerm {
            op: Token::new("+", loc(2, 5), Lexeme::Plus),
            expr: rhs,
        }],
    };
    assert_eq!(expr.location(), loc(2, 3));
}

#[test]
fn test_binary_level_ordering() {
    // Weakest binding last
    assert!(BinaryLevel::Multiplicative < BinaryLevel::Additive);
    assert!(BinaryLevel::LogicalOr < BinaryLevel::Assignment);
}

#[test]
fn test_capture_group_members() {
    let mut group = CaptureGroup::default();
    assert!(group.is_empty());
    group.add("x.size()", loc(3, 10));
    assert_eq!(group.members.len(), 1);
    assert_eq!(group.members[0].text, "x.size()");
}

#[test]
fn test_signature_parameter_queries() {
    let signature = FunctionSignature {
        parameters: vec![
            Parameter {
                location: loc(1, 1),
                name: ident("this"),
                pass: PassingStyle::Out,
                modifier: ParamModifier::None,
                type_id: TypeId::wildcard(loc(1, 1)),
                default_value: None,
            },
            Parameter {
                location: loc(1, 5),
                name: ident("that"),
                pass: PassingStyle::In,
                modifier: ParamModifier::None,
                type_id: TypeId::wildcard(loc(1, 5)),
                default_value: None,
            },
        ],
        returns: ReturnSpec::None,
        contracts: Vec::new(),
        throws: false,
        body_line_range: (0, 0),
    };
    assert_eq!(signature.parameter_count(), 2);
    assert!(signature.has_parameter_named("that"));
    assert!(signature.has_parameter_with_name_and_pass("this", PassingStyle::Out));
    assert!(!signature.has_parameter_with_name_and_pass("this", PassingStyle::Inout));
}

#[test]
fn test_id_expr_display() {
    let id = IdExpr {
        global: false,
        qualifiers: vec![ident("std")],
        identifier: ident("vector"),
        template_args: vec![TemplateArg::Type(TypeId {
            location: loc(1, 1),
            is_wildcard: false,
            qualifiers: Vec::new(),
            id: Some(IdExpr::from_token(Token::new(
                "i32",
                loc(1, 1),
                Lexeme::FixedType,
            ))),
        })],
    };
    assert_eq!(id.to_string(), "std::vector<i32>");
}

#[test]
fn test_wildcard_type_display() {
    assert_eq!(TypeId::wildcard(loc(1, 1)).to_string(), "_");
}

#[test]
fn test_declaration_summary() {
    let mut decl = object_decl("x");
    decl.access = Accessibility::Public;
    assert_eq!(decl.summary(), "public object x");
}

#[test]
fn test_tree_serializes_round_trip() {
    let ty = type_decl("point", vec![object_decl("x"), object_decl("y")]);
    let mut unit = TranslationUnit::new();
    unit.declarations.push(ty);

    let serialized = serde_json::to_string(&unit).expect("serialize");
    let back: TranslationUnit = serde_json::from_str(&serialized).expect("deserialize");
    assert_eq!(back, unit);
}

#[test]
fn test_statement_location_dispatch() {
    let statement = Statement::Return(ReturnStatement {
        location: loc(7, 5),
        expression: None,
    });
    assert_eq!(statement.location(), loc(7, 5));
    assert!(!statement.is_declaration());
}
