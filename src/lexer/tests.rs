use super::*;
use crate::source::{LineCategory, SourceLine};

fn lex_one(line: &str) -> (Vec<Token>, Vec<Comment>, ErrorSink) {
    let mut state = LexState::default();
    let mut tokens = Vec::new();
    let mut comments = Vec::new();
    let mut errors = ErrorSink::new();
    lex_line(line, 1, &mut state, &mut tokens, &mut comments, &mut errors);
    (tokens, comments, errors)
}

fn kinds(tokens: &[Token]) -> Vec<Lexeme> {
    tokens.iter().map(|t| t.kind).collect()
}

#[test]
fn test_maximal_munch_operators() {
    let (tokens, _, errors) = lex_one("a <<= b << c <= d <=> e < f");
    assert!(errors.is_empty());
    assert_eq!(
        kinds(&tokens),
        vec![
            Lexeme::Identifier,
            Lexeme::LeftShiftEq,
            Lexeme::Identifier,
            Lexeme::LeftShift,
            Lexeme::Identifier,
            Lexeme::LessEq,
            Lexeme::Identifier,
            Lexeme::Spaceship,
            Lexeme::Identifier,
            Lexeme::Less,
            Lexeme::Identifier,
        ]
    );
}

#[test]
fn test_compound_logical_operators() {
    let (tokens, _, _) = lex_one("x ||= y &&= z");
    assert_eq!(
        kinds(&tokens),
        vec![
            Lexeme::Identifier,
            Lexeme::LogicalOrEq,
            Lexeme::Identifier,
            Lexeme::LogicalAndEq,
            Lexeme::Identifier,
        ]
    );
}

#[test]
fn test_token_positions_strictly_increase() {
    let (tokens, _, _) = lex_one("x: i32 = 1 + 2;");
    for pair in tokens.windows(2) {
        assert!(pair[0].location < pair[1].location);
    }
}

#[test]
fn test_digit_separators_stripped() {
    let (tokens, _, errors) = lex_one("1'000'000");
    assert!(errors.is_empty());
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, Lexeme::DecimalLiteral);
    assert_eq!(tokens[0].text, "1000000");
}

#[test]
fn test_number_classification() {
    let (tokens, _, _) = lex_one("0b1010 0x1F 42 3.25 1e9");
    assert_eq!(
        kinds(&tokens),
        vec![
            Lexeme::BinaryLiteral,
            Lexeme::HexadecimalLiteral,
            Lexeme::DecimalLiteral,
            Lexeme::FloatLiteral,
            Lexeme::FloatLiteral,
        ]
    );
}

#[test]
fn test_dot_without_digit_is_not_a_fraction() {
    let (tokens, _, _) = lex_one("1.x");
    assert_eq!(
        kinds(&tokens),
        vec![Lexeme::DecimalLiteral, Lexeme::Dot, Lexeme::Identifier]
    );
}

#[test]
fn test_user_defined_literal_suffix() {
    let (tokens, _, _) = lex_one("10ms");
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].kind, Lexeme::DecimalLiteral);
    assert_eq!(tokens[1].kind, Lexeme::UserDefinedLiteralSuffix);
    assert_eq!(tokens[1].text, "ms");
}

#[test]
fn test_malformed_prefix_reports_error() {
    let (_, _, errors) = lex_one("0x");
    assert!(!errors.is_empty());
}

#[test]
fn test_multi_word_keyword_folds_into_one_token() {
    let (tokens, _, _) = lex_one("x: unsigned long long = 0;");
    let multi: Vec<_> = tokens
        .iter()
        .filter(|t| t.kind == Lexeme::MultiKeyword)
        .collect();
    assert_eq!(multi.len(), 1);
    assert_eq!(multi[0].text, "unsigned long long");
}

#[test]
fn test_lone_baseline_type_word_is_a_type_token() {
    let (tokens, _, _) = lex_one("x: int = 0;");
    let int = tokens.iter().find(|t| t.text == "int").expect("int token");
    assert_eq!(int.kind, Lexeme::MultiKeyword);
}

#[test]
fn test_fixed_width_types() {
    let (tokens, _, _) = lex_one("i8 u64 f32 my_ident");
    assert_eq!(
        kinds(&tokens),
        vec![
            Lexeme::FixedType,
            Lexeme::FixedType,
            Lexeme::FixedType,
            Lexeme::Identifier,
        ]
    );
}

#[test]
fn test_line_comment_goes_to_comment_list() {
    let (tokens, comments, _) = lex_one("x = 1; // trailing note");
    assert_eq!(tokens.len(), 4);
    assert_eq!(comments.len(), 1);
    assert!(comments[0].text.contains("trailing note"));
}

#[test]
fn test_block_comment_spanning_lines() {
    let mut state = LexState::default();
    let mut tokens = Vec::new();
    let mut comments = Vec::new();
    let mut errors = ErrorSink::new();
    lex_line("a /* first", 1, &mut state, &mut tokens, &mut comments, &mut errors);
    assert!(state.in_comment);
    lex_line("second */ b", 2, &mut state, &mut tokens, &mut comments, &mut errors);
    assert!(!state.in_comment);
    assert_eq!(comments.len(), 1);
    assert!(comments[0].text.contains("first"));
    assert!(comments[0].text.contains("second"));
    assert_eq!(
        kinds(&tokens),
        vec![Lexeme::Identifier, Lexeme::Identifier]
    );
}

#[test]
fn test_raw_string_single_line() {
    let (tokens, _, errors) = lex_one(r#"x = R"seq(interior "quoted" text)seq";"#);
    assert!(errors.is_empty());
    let raw: Vec<_> = tokens
        .iter()
        .filter(|t| t.kind == Lexeme::RawStringLiteral)
        .collect();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].text, r#"interior "quoted" text"#);
}

#[test]
fn test_raw_string_across_lines_preserves_interior_exactly() {
    let mut state = LexState::default();
    let mut tokens = Vec::new();
    let mut comments = Vec::new();
    let mut errors = ErrorSink::new();
    lex_line(r#"x = R"(line one"#, 1, &mut state, &mut tokens, &mut comments, &mut errors);
    assert!(state.raw_string.is_some());
    lex_line("line two", 2, &mut state, &mut tokens, &mut comments, &mut errors);
    lex_line(r#"line three)";"#, 3, &mut state, &mut tokens, &mut comments, &mut errors);
    assert!(state.raw_string.is_none());
    let raw = tokens
        .iter()
        .find(|t| t.kind == Lexeme::RawStringLiteral)
        .expect("raw string token");
    assert_eq!(raw.text, "line one\nline two\nline three");
    // Reported at the opening position
    assert_eq!(raw.location.line, 1);
}

#[test]
fn test_string_escapes_kept_verbatim() {
    let (tokens, _, _) = lex_one(r#""a\"b\n""#);
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].text, r#"a\"b\n"#);
}

#[test]
fn test_unterminated_string_reports_error() {
    let (tokens, _, errors) = lex_one(r#""never closed"#);
    assert_eq!(tokens.len(), 1);
    assert!(!errors.is_empty());
}

#[test]
fn test_unknown_character_is_skipped_with_error() {
    let (tokens, _, errors) = lex_one("a ` b");
    assert_eq!(tokens.len(), 2);
    assert_eq!(errors.len(), 1);
}

#[test]
fn test_interpolation_splits_parts() {
    let mut errors = ErrorSink::new();
    let parts = expand_interpolations(
        "count is $(x + 1) items",
        crate::error::SourceLocation::new(1, 1),
        &mut errors,
    );
    assert!(errors.is_empty());
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], StringPart::Literal("count is ".to_string()));
    match &parts[1] {
        StringPart::Interpolation(tokens) => {
            assert_eq!(
                kinds(tokens),
                vec![Lexeme::Identifier, Lexeme::Plus, Lexeme::DecimalLiteral]
            );
        }
        other => panic!("expected interpolation, got {other:?}"),
    }
    assert_eq!(parts[2], StringPart::Literal(" items".to_string()));
}

#[test]
fn test_interpolation_nested_parens() {
    let mut errors = ErrorSink::new();
    let parts = expand_interpolations(
        "$(f(a, b))",
        crate::error::SourceLocation::new(1, 1),
        &mut errors,
    );
    assert_eq!(parts.len(), 1);
    match &parts[0] {
        StringPart::Interpolation(tokens) => assert_eq!(tokens.len(), 6),
        other => panic!("expected interpolation, got {other:?}"),
    }
}

#[test]
fn test_brace_tracker_balanced_conditional() {
    let mut tracker = BraceTracker::new();
    let mut errors = ErrorSink::new();
    let loc = crate::error::SourceLocation::new(1, 1);

    // #if opens one brace, #else opens one brace: deltas agree
    tracker.found_if(loc);
    tracker.found_open('{', loc);
    tracker.found_else(loc);
    tracker.found_open('{', loc);
    tracker.found_endif(loc, &mut errors);
    assert!(errors.is_empty());
    assert_eq!(tracker.depth(), 1);

    tracker.found_close('}', loc, &mut errors);
    tracker.finish(&mut errors);
    assert!(errors.is_empty());
}

#[test]
fn test_brace_tracker_unbalanced_conditional() {
    let mut tracker = BraceTracker::new();
    let mut errors = ErrorSink::new();
    let loc = crate::error::SourceLocation::new(1, 1);

    tracker.found_if(loc);
    tracker.found_open('{', loc);
    tracker.found_else(loc);
    tracker.found_endif(loc, &mut errors);
    assert_eq!(errors.len(), 1);
    // Reconciled to the if branch's delta
    assert_eq!(tracker.depth(), 1);
}

#[test]
fn test_brace_tracker_mismatch() {
    let mut tracker = BraceTracker::new();
    let mut errors = ErrorSink::new();
    let loc = crate::error::SourceLocation::new(1, 1);
    tracker.found_open('(', loc);
    tracker.found_close(']', loc, &mut errors);
    assert_eq!(errors.len(), 1);
}

#[test]
fn test_token_store_grammar_map_by_line() {
    let lines = vec![
        SourceLine::new("x: i32 = 1;", LineCategory::Candidate),
        SourceLine::new("// just a comment", LineCategory::Comment),
        SourceLine::new("y: i32 = 2;", LineCategory::Candidate),
    ];
    let mut errors = ErrorSink::new();
    let mut store = TokenStore::new();
    store.lex(&lines, &mut errors);

    assert!(errors.is_empty());
    assert_eq!(store.grammar_map().len(), 2);
    assert!(store.grammar_map().contains_key(&1));
    assert!(store.grammar_map().contains_key(&3));
    assert_eq!(store.comments().len(), 1);
}

#[test]
fn test_token_store_skips_legacy_lines() {
    let lines = vec![
        SourceLine::new("int old_style();", LineCategory::Legacy),
        SourceLine::new("x: i32 = 1;", LineCategory::Candidate),
    ];
    let mut errors = ErrorSink::new();
    let mut store = TokenStore::new();
    store.lex(&lines, &mut errors);
    assert_eq!(store.grammar_map().len(), 1);
}

#[test]
fn test_token_store_unterminated_comment_at_end() {
    let lines = vec![SourceLine::new("/* never closed", LineCategory::Candidate)];
    let mut errors = ErrorSink::new();
    let mut store = TokenStore::new();
    store.lex(&lines, &mut errors);
    assert_eq!(errors.len(), 1);
}

#[test]
fn test_token_store_unterminated_raw_string_at_end() {
    let lines = vec![
        SourceLine::new("s := R\"(never closed", LineCategory::Candidate),
        SourceLine::new("still inside", LineCategory::RawStringContinuation),
    ];
    let mut errors = ErrorSink::new();
    let mut store = TokenStore::new();
    store.lex(&lines, &mut errors);
    assert_eq!(errors.len(), 1);
    assert!(errors.entries()[0].message.contains("raw string"));
}

#[test]
fn test_generated_buffer_is_append_only() {
    let mut store = TokenStore::new();
    let loc = crate::error::SourceLocation::new(0, 1);
    let first = store.append_generated(vec![Token::new("a", loc, Lexeme::Identifier)]);
    let second = store.append_generated(vec![
        Token::new("b", loc, Lexeme::Identifier),
        Token::new("c", loc, Lexeme::Identifier),
    ]);
    assert_eq!(first, 0);
    assert_eq!(second, 1);
    assert_eq!(store.generated().len(), 3);
    assert_eq!(store.generated()[0].text, "a");
}

#[test]
fn test_preprocessor_conditional_through_store() {
    let lines = vec![
        SourceLine::new("#if FOO", LineCategory::Preprocessor),
        SourceLine::new("f: () = {", LineCategory::Candidate),
        SourceLine::new("#else", LineCategory::Preprocessor),
        SourceLine::new("g: () = {", LineCategory::Candidate),
        SourceLine::new("#endif", LineCategory::Preprocessor),
        SourceLine::new("}", LineCategory::Candidate),
    ];
    let mut errors = ErrorSink::new();
    let mut store = TokenStore::new();
    store.lex(&lines, &mut errors);
    // Both branches open one brace; the close after #endif balances it
    assert!(errors.is_empty());
}
