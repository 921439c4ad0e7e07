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

//! Lexical analysis for the Veneer candidate syntax
//!
//! Tokenizes one tagged line at a time, carrying comment and raw-string
//! state across line boundaries. Malformed input degrades to best-effort
//! token emission plus a positioned error; a line is never thrown away.

use crate::error::{ErrorSink, LexerError, SourceLocation};
use crate::source::{LineCategory, SourceLine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Token kinds for the candidate syntax
///
/// Operator variants are listed longest-match-first within each family;
/// the matcher tries candidates in that order (maximal munch), so e.g.
/// `<<=` is recognized before `<<` before `<=` before `<`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lexeme {
    SlashEq,
    Slash,
    LeftShiftEq,
    LeftShift,
    Spaceship,
    LessEq,
    Less,
    RightShiftEq,
    RightShift,
    GreaterEq,
    Greater,
    PlusPlus,
    PlusEq,
    Plus,
    MinusMinus,
    MinusEq,
    Arrow,
    Minus,
    LogicalOrEq,
    LogicalOr,
    PipeEq,
    Pipe,
    LogicalAndEq,
    LogicalAnd,
    MultiplyEq,
    Multiply,
    ModuloEq,
    Modulo,
    AmpersandEq,
    Ampersand,
    CaretEq,
    Caret,
    TildeEq,
    Tilde,
    EqualComparison,
    Assignment,
    NotEqualComparison,
    Not,
    LeftBrace,
    RightBrace,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Scope,
    Colon,
    Semicolon,
    Comma,
    Dot,
    Ellipsis,
    QuestionMark,
    At,
    Dollar,
    FloatLiteral,
    BinaryLiteral,
    DecimalLiteral,
    HexadecimalLiteral,
    StringLiteral,
    RawStringLiteral,
    CharacterLiteral,
    UserDefinedLiteralSuffix,
    Keyword,
    /// Multi-word baseline-dialect keyword folded into one lexeme,
    /// e.g. `unsigned long long`
    MultiKeyword,
    /// Fixed-width type name (`i8` .. `u64`, `f32`, `f64`)
    FixedType,
    Identifier,
}

impl Lexeme {
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            Lexeme::FloatLiteral
                | Lexeme::BinaryLiteral
                | Lexeme::DecimalLiteral
                | Lexeme::HexadecimalLiteral
                | Lexeme::StringLiteral
                | Lexeme::RawStringLiteral
                | Lexeme::CharacterLiteral
        )
    }

    /// The close token matching an open paren/bracket/brace lexeme
    pub fn close_delimiter(self) -> Option<Lexeme> {
        match self {
            Lexeme::LeftParen => Some(Lexeme::RightParen),
            Lexeme::LeftBracket => Some(Lexeme::RightBracket),
            Lexeme::LeftBrace => Some(Lexeme::RightBrace),
            _ => None,
        }
    }
}

/// A single token: text, source position, and classified kind
///
/// Immutable once created. Within one line, token positions are strictly
/// increasing by column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub location: SourceLocation,
    pub kind: Lexeme,
}

impl Token {
    pub fn new(text: impl Into<String>, location: SourceLocation, kind: Lexeme) -> Self {
        Self {
            text: text.into(),
            location,
            kind,
        }
    }

    pub fn is(&self, kind: Lexeme) -> bool {
        self.kind == kind
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == Lexeme::Keyword && self.text == word
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Comment kind: `// ...` or `/* ... */`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentKind {
    Line,
    Block,
}

/// A comment, kept out of the grammar token stream so its presence never
/// perturbs parsing; the emitter re-interleaves comments by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub kind: CommentKind,
    pub start: SourceLocation,
    pub end: SourceLocation,
    pub text: String,
}

/// Open raw-string state carried across lines
#[derive(Debug, Clone, PartialEq)]
pub struct RawStringState {
    pub start: SourceLocation,
    /// The caller-chosen closing sequence, e.g. `)seq"`
    pub closing_seq: String,
    /// Interior text accumulated so far
    pub text: String,
}

/// Lexical state carried from one line to the next
#[derive(Debug, Clone, Default)]
pub struct LexState {
    pub in_comment: bool,
    pub current_comment: String,
    pub current_comment_start: SourceLocation,
    pub raw_string: Option<RawStringState>,
}

const KEYWORDS: &[&str] = &[
    "as", "assert", "break", "const", "constexpr", "continue", "do", "else", "false", "final",
    "for", "forward", "if",
    "implicit", "in", "inout", "inspect", "is", "move", "namespace", "next", "out", "override",
    "post", "pre", "private", "protected", "public", "requires", "return", "throws", "true",
    "type", "using", "virtual", "while",
];

const FIXED_TYPES: &[&str] = &[
    "i8", "i16", "i32", "i64", "u8", "u16", "u32", "u64", "f32", "f64",
];

/// Words that participate in multi-word baseline keywords
const MULTI_KEYWORD_WORDS: &[&str] = &[
    "unsigned", "signed", "long", "short", "int", "char", "double", "float",
];

/// Three-character operators, tried before shorter candidates
const OPS3: &[(&str, Lexeme)] = &[
    ("<<=", Lexeme::LeftShiftEq),
    (">>=", Lexeme::RightShiftEq),
    ("<=>", Lexeme::Spaceship),
    ("...", Lexeme::Ellipsis),
    ("||=", Lexeme::LogicalOrEq),
    ("&&=", Lexeme::LogicalAndEq),
];

const OPS2: &[(&str, Lexeme)] = &[
    ("<<", Lexeme::LeftShift),
    (">>", Lexeme::RightShift),
    ("<=", Lexeme::LessEq),
    (">=", Lexeme::GreaterEq),
    ("==", Lexeme::EqualComparison),
    ("!=", Lexeme::NotEqualComparison),
    ("&&", Lexeme::LogicalAnd),
    ("||", Lexeme::LogicalOr),
    ("+=", Lexeme::PlusEq),
    ("-=", Lexeme::MinusEq),
    ("*=", Lexeme::MultiplyEq),
    ("/=", Lexeme::SlashEq),
    ("%=", Lexeme::ModuloEq),
    ("&=", Lexeme::AmpersandEq),
    ("|=", Lexeme::PipeEq),
    ("^=", Lexeme::CaretEq),
    ("~=", Lexeme::TildeEq),
    ("++", Lexeme::PlusPlus),
    ("--", Lexeme::MinusMinus),
    ("->", Lexeme::Arrow),
    ("::", Lexeme::Scope),
];

const OPS1: &[(char, Lexeme)] = &[
    ('+', Lexeme::Plus),
    ('-', Lexeme::Minus),
    ('*', Lexeme::Multiply),
    ('/', Lexeme::Slash),
    ('%', Lexeme::Modulo),
    ('<', Lexeme::Less),
    ('>', Lexeme::Greater),
    ('=', Lexeme::Assignment),
    ('!', Lexeme::Not),
    ('&', Lexeme::Ampersand),
    ('|', Lexeme::Pipe),
    ('^', Lexeme::Caret),
    ('~', Lexeme::Tilde),
    ('{', Lexeme::LeftBrace),
    ('}', Lexeme::RightBrace),
    ('(', Lexeme::LeftParen),
    (')', Lexeme::RightParen),
    ('[', Lexeme::LeftBracket),
    (']', Lexeme::RightBracket),
    (':', Lexeme::Colon),
    (';', Lexeme::Semicolon),
    (',', Lexeme::Comma),
    ('.', Lexeme::Dot),
    ('?', Lexeme::QuestionMark),
    ('@', Lexeme::At),
    ('$', Lexeme::Dollar),
];

/// Tokenize one line of candidate-syntax text
///
/// `state` carries open comment / open raw string information across
/// lines. Tokens and comments are appended; errors go to the sink and
/// never abort the rest of the line.
pub fn lex_line(
    line: &str,
    lineno: usize,
    state: &mut LexState,
    tokens: &mut Vec<Token>,
    comments: &mut Vec<Comment>,
    errors: &mut ErrorSink,
) {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;

    let loc = |i: usize| SourceLocation::new(lineno, i + 1);

    // Continue an open raw string first
    if let Some(raw) = state.raw_string.as_mut() {
        let text: String = chars.iter().collect();
        if let Some(idx) = find_str(&chars, 0, &raw.closing_seq) {
            raw.text.push_str(&text[..byte_index(&chars, idx)]);
            let token = Token::new(raw.text.clone(), raw.start, Lexeme::RawStringLiteral);
            tokens.push(token);
            i = idx + raw.closing_seq.chars().count();
            state.raw_string = None;
        } else {
            raw.text.push_str(&text);
            raw.text.push('\n');
            return;
        }
    }

    // Continue an open block comment
    if state.in_comment {
        match find_str(&chars, i, "*/") {
            Some(idx) => {
                let text: String = chars[i..idx + 2].iter().collect();
                state.current_comment.push_str(&text);
                comments.push(Comment {
                    kind: CommentKind::Block,
                    start: state.current_comment_start,
                    end: loc(idx + 1),
                    text: std::mem::take(&mut state.current_comment),
                });
                state.in_comment = false;
                i = idx + 2;
            }
            None => {
                let text: String = chars[i..].iter().collect();
                state.current_comment.push_str(&text);
                state.current_comment.push('\n');
                return;
            }
        }
    }

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Comments
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            let text: String = chars[i..].iter().collect();
            comments.push(Comment {
                kind: CommentKind::Line,
                start: loc(i),
                end: loc(chars.len().saturating_sub(1)),
                text,
            });
            return;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            match find_str(&chars, i + 2, "*/") {
                Some(idx) => {
                    let text: String = chars[i..idx + 2].iter().collect();
                    comments.push(Comment {
                        kind: CommentKind::Block,
                        start: loc(i),
                        end: loc(idx + 1),
                        text,
                    });
                    i = idx + 2;
                }
                None => {
                    state.in_comment = true;
                    state.current_comment_start = loc(i);
                    state.current_comment = chars[i..].iter().collect();
                    state.current_comment.push('\n');
                    return;
                }
            }
            continue;
        }

        // Raw string literal: R"seq( ... )seq"
        if c == 'R' && chars.get(i + 1) == Some(&'"') {
            let start = loc(i);
            let mut j = i + 2;
            let mut opening_seq = String::new();
            while j < chars.len() && chars[j] != '(' && chars[j] != '"' && !chars[j].is_whitespace()
            {
                opening_seq.push(chars[j]);
                j += 1;
            }
            if chars.get(j) != Some(&'(') {
                errors.report(
                    LexerError::MalformedLiteral {
                        text: chars[i..j.min(chars.len())].iter().collect(),
                        location: start,
                    }
                    .into(),
                );
                i = j;
                continue;
            }
            let closing_seq = format!("){}\"", opening_seq);
            let body_start = j + 1;
            match find_str(&chars, body_start, &closing_seq) {
                Some(idx) => {
                    let interior: String = chars[body_start..idx].iter().collect();
                    tokens.push(Token::new(interior, start, Lexeme::RawStringLiteral));
                    i = idx + closing_seq.chars().count();
                }
                None => {
                    let mut text: String = chars[body_start..].iter().collect();
                    text.push('\n');
                    state.raw_string = Some(RawStringState {
                        start,
                        closing_seq,
                        text,
                    });
                    return;
                }
            }
            continue;
        }

        // String literal
        if c == '"' {
            let start = loc(i);
            let mut text = String::new();
            let mut j = i + 1;
            let mut terminated = false;
            while j < chars.len() {
                if chars[j] == '\\' && j + 1 < chars.len() {
                    text.push(chars[j]);
                    text.push(chars[j + 1]);
                    j += 2;
                    continue;
                }
                if chars[j] == '"' {
                    terminated = true;
                    j += 1;
                    break;
                }
                text.push(chars[j]);
                j += 1;
            }
            if !terminated {
                errors.report(
                    LexerError::MalformedLiteral {
                        text: text.clone(),
                        location: start,
                    }
                    .into(),
                );
            }
            tokens.push(Token::new(text, start, Lexeme::StringLiteral));
            i = j;
            continue;
        }

        // Character literal
        if c == '\'' {
            let start = loc(i);
            let mut text = String::new();
            let mut j = i + 1;
            let mut terminated = false;
            while j < chars.len() {
                if chars[j] == '\\' && j + 1 < chars.len() {
                    text.push(chars[j]);
                    text.push(chars[j + 1]);
                    j += 2;
                    continue;
                }
                if chars[j] == '\'' {
                    terminated = true;
                    j += 1;
                    break;
                }
                text.push(chars[j]);
                j += 1;
            }
            if !terminated {
                errors.report(
                    LexerError::MalformedLiteral {
                        text: text.clone(),
                        location: start,
                    }
                    .into(),
                );
            }
            tokens.push(Token::new(text, start, Lexeme::CharacterLiteral));
            i = j;
            continue;
        }

        // Numeric literal
        if c.is_ascii_digit() {
            i = read_number(&chars, i, lineno, tokens, errors);
            continue;
        }

        // Identifier, keyword, multi-word keyword
        if c.is_ascii_alphabetic() || c == '_' {
            i = read_word(&chars, i, lineno, tokens);
            continue;
        }

        // Operators, maximal munch: three chars, then two, then one
        if i + 2 < chars.len() {
            let three: String = chars[i..i + 3].iter().collect();
            if let Some((_, kind)) = OPS3.iter().find(|(s, _)| *s == three) {
                tokens.push(Token::new(three, loc(i), *kind));
                i += 3;
                continue;
            }
        }
        if i + 1 < chars.len() {
            let two: String = chars[i..i + 2].iter().collect();
            if let Some((_, kind)) = OPS2.iter().find(|(s, _)| *s == two) {
                tokens.push(Token::new(two, loc(i), *kind));
                i += 2;
                continue;
            }
        }
        if let Some((_, kind)) = OPS1.iter().find(|(ch, _)| *ch == c) {
            tokens.push(Token::new(c.to_string(), loc(i), *kind));
            i += 1;
            continue;
        }

        errors.report(
            LexerError::UnexpectedCharacter {
                character: c,
                location: loc(i),
            }
            .into(),
        );
        i += 1;
    }
}

/// Read a numeric literal starting at `chars[i]`, returning the index just
/// past it. Classifies binary/hexadecimal/decimal/float by prefix and
/// content; `'` is accepted as a digit separator; a trailing identifier is
/// emitted as a user-defined literal suffix token.
fn read_number(
    chars: &[char],
    i: usize,
    lineno: usize,
    tokens: &mut Vec<Token>,
    errors: &mut ErrorSink,
) -> usize {
    let start = SourceLocation::new(lineno, i + 1);
    let mut j = i;
    let mut text = String::new();

    let (kind, digits): (Lexeme, fn(char) -> bool) =
        if chars[i] == '0' && matches!(chars.get(i + 1), Some('b') | Some('B')) {
            text.push(chars[j]);
            text.push(chars[j + 1]);
            j += 2;
            (Lexeme::BinaryLiteral, |c| c == '0' || c == '1')
        } else if chars[i] == '0' && matches!(chars.get(i + 1), Some('x') | Some('X')) {
            text.push(chars[j]);
            text.push(chars[j + 1]);
            j += 2;
            (Lexeme::HexadecimalLiteral, |c| c.is_ascii_hexdigit())
        } else {
            (Lexeme::DecimalLiteral, |c| c.is_ascii_digit())
        };

    let digit_count_before = text.len();
    while j < chars.len() && (digits(chars[j]) || chars[j] == '\'') {
        if chars[j] != '\'' {
            text.push(chars[j]);
        }
        j += 1;
    }
    if text.len() == digit_count_before {
        // A bare prefix like `0x` with no digits
        errors.report(
            LexerError::MalformedLiteral {
                text: text.clone(),
                location: start,
            }
            .into(),
        );
        tokens.push(Token::new(text, start, kind));
        return j;
    }

    let mut kind = kind;
    if kind == Lexeme::DecimalLiteral {
        // Fractional part: a dot followed by a digit, so `1..2` and `x.y`
        // member access stay intact
        if chars.get(j) == Some(&'.') && chars.get(j + 1).is_some_and(|c| c.is_ascii_digit()) {
            kind = Lexeme::FloatLiteral;
            text.push('.');
            j += 1;
            while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '\'') {
                if chars[j] != '\'' {
                    text.push(chars[j]);
                }
                j += 1;
            }
        }
        // Exponent
        if matches!(chars.get(j), Some('e') | Some('E'))
            && (chars.get(j + 1).is_some_and(|c| c.is_ascii_digit())
                || (matches!(chars.get(j + 1), Some('+') | Some('-'))
                    && chars.get(j + 2).is_some_and(|c| c.is_ascii_digit())))
        {
            kind = Lexeme::FloatLiteral;
            text.push(chars[j]);
            j += 1;
            if matches!(chars.get(j), Some('+') | Some('-')) {
                text.push(chars[j]);
                j += 1;
            }
            while j < chars.len() && chars[j].is_ascii_digit() {
                text.push(chars[j]);
                j += 1;
            }
        }
    }
    tokens.push(Token::new(text, start, kind));

    // User-defined literal suffix, e.g. `10ms`
    if chars.get(j).is_some_and(|c| c.is_ascii_alphabetic() || *c == '_') {
        let suffix_start = SourceLocation::new(lineno, j + 1);
        let mut suffix = String::new();
        while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
            suffix.push(chars[j]);
            j += 1;
        }
        tokens.push(Token::new(
            suffix,
            suffix_start,
            Lexeme::UserDefinedLiteralSuffix,
        ));
    }
    j
}

/// Read an identifier/keyword starting at `chars[i]`, folding consecutive
/// multi-word baseline keywords (`unsigned long long`) into one lexeme.
fn read_word(chars: &[char], i: usize, lineno: usize, tokens: &mut Vec<Token>) -> usize {
    let start = SourceLocation::new(lineno, i + 1);
    let mut j = i;
    let mut word = String::new();
    while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
        word.push(chars[j]);
        j += 1;
    }

    if MULTI_KEYWORD_WORDS.contains(&word.as_str()) {
        let mut combined = word.clone();
        let mut end = j;
        loop {
            let mut k = end;
            while k < chars.len() && chars[k].is_whitespace() {
                k += 1;
            }
            let mut next = String::new();
            let word_start = k;
            while k < chars.len() && (chars[k].is_ascii_alphanumeric() || chars[k] == '_') {
                next.push(chars[k]);
                k += 1;
            }
            if word_start == k || !MULTI_KEYWORD_WORDS.contains(&next.as_str()) {
                break;
            }
            combined.push(' ');
            combined.push_str(&next);
            end = k;
        }
        // A lone word like `int` names a baseline type just as `long int`
        // does, so it gets the same lexeme
        tokens.push(Token::new(combined, start, Lexeme::MultiKeyword));
        return end;
    }

    let kind = if KEYWORDS.contains(&word.as_str()) {
        Lexeme::Keyword
    } else if FIXED_TYPES.contains(&word.as_str()) {
        Lexeme::FixedType
    } else {
        Lexeme::Identifier
    };
    tokens.push(Token::new(word, start, kind));
    j
}

/// Find the character index where `needle` begins in `chars[from..]`
fn find_str(chars: &[char], from: usize, needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() {
        return None;
    }
    let mut i = from;
    while i + needle.len() <= chars.len() {
        if chars[i..i + needle.len()] == needle[..] {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Byte offset of character index `idx` within the collected string
fn byte_index(chars: &[char], idx: usize) -> usize {
    chars[..idx].iter().map(|c| c.len_utf8()).sum()
}

/// One segment of an interpolated string
#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Literal(String),
    /// A `$( ... )` fragment, re-tokenized through the ordinary lexer
    Interpolation(Vec<Token>),
}

/// Split interpolated string text into literal and code parts
///
/// Embedded `$( expr )` fragments are tokenized recursively with the same
/// rules as whole-file input, so synthesized diagnostics match hand-written
/// code.
pub fn expand_interpolations(
    text: &str,
    pos: SourceLocation,
    errors: &mut ErrorSink,
) -> Vec<StringPart> {
    let chars: Vec<char> = text.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0usize;

    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'(') {
            let mut depth = 1usize;
            let mut j = i + 2;
            while j < chars.len() && depth > 0 {
                match chars[j] {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth > 0 {
                errors.report(
                    LexerError::MalformedLiteral {
                        text: chars[i..].iter().collect(),
                        location: pos,
                    }
                    .into(),
                );
                literal.extend(&chars[i..]);
                break;
            }
            if !literal.is_empty() {
                parts.push(StringPart::Literal(std::mem::take(&mut literal)));
            }
            let fragment: String = chars[i + 2..j - 1].iter().collect();
            let mut state = LexState::default();
            let mut tokens = Vec::new();
            let mut comments = Vec::new();
            lex_line(&fragment, pos.line, &mut state, &mut tokens, &mut comments, errors);
            parts.push(StringPart::Interpolation(tokens));
            i = j;
        } else {
            literal.push(chars[i]);
            i += 1;
        }
    }
    if !literal.is_empty() {
        parts.push(StringPart::Literal(literal));
    }
    parts
}

/// Brace/paren/bracket matching with preprocessor conditional awareness
///
/// `#if`/`#else` branches may open unbalanced delimiters as long as the
/// two branches' net deltas agree; they are reconciled at `#endif` rather
/// than reported as mismatches at end of file.
#[derive(Debug, Default)]
pub struct BraceTracker {
    open: Vec<(char, SourceLocation)>,
    frames: Vec<ConditionalFrame>,
}

#[derive(Debug)]
struct ConditionalFrame {
    base_depth: usize,
    if_delta: Option<isize>,
    start: SourceLocation,
}

impl BraceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn found_open(&mut self, delimiter: char, location: SourceLocation) {
        self.open.push((delimiter, location));
    }

    pub fn found_close(
        &mut self,
        delimiter: char,
        location: SourceLocation,
        errors: &mut ErrorSink,
    ) {
        let expected_open = match delimiter {
            ')' => '(',
            ']' => '[',
            '}' => '{',
            _ => return,
        };
        match self.open.last() {
            Some((open, _)) if *open == expected_open => {
                self.open.pop();
            }
            _ => {
                errors.report(
                    LexerError::MismatchedDelimiter {
                        delimiter,
                        location,
                    }
                    .into(),
                );
            }
        }
    }

    /// Feed one token; only delimiters are of interest
    pub fn found_token(&mut self, token: &Token, errors: &mut ErrorSink) {
        match token.kind {
            Lexeme::LeftParen => self.found_open('(', token.location),
            Lexeme::LeftBracket => self.found_open('[', token.location),
            Lexeme::LeftBrace => self.found_open('{', token.location),
            Lexeme::RightParen => self.found_close(')', token.location, errors),
            Lexeme::RightBracket => self.found_close(']', token.location, errors),
            Lexeme::RightBrace => self.found_close('}', token.location, errors),
            _ => {}
        }
    }

    pub fn found_if(&mut self, location: SourceLocation) {
        self.frames.push(ConditionalFrame {
            base_depth: self.open.len(),
            if_delta: None,
            start: location,
        });
    }

    pub fn found_else(&mut self, _location: SourceLocation) {
        if let Some(frame) = self.frames.last_mut() {
            frame.if_delta = Some(self.open.len() as isize - frame.base_depth as isize);
            // Rewind to the branch point so the else branch is measured
            // from the same starting depth
            while self.open.len() > frame.base_depth {
                self.open.pop();
            }
        }
    }

    pub fn found_endif(&mut self, location: SourceLocation, errors: &mut ErrorSink) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        if let Some(if_delta) = frame.if_delta {
            let else_delta = self.open.len() as isize - frame.base_depth as isize;
            if else_delta != if_delta {
                errors.report(LexerError::UnbalancedConditional { location }.into());
                // Reconcile to the if branch's delta so later closes
                // do not cascade
                while (self.open.len() as isize) < frame.base_depth as isize + if_delta {
                    self.open.push(('{', frame.start));
                }
                while self.open.len() as isize > frame.base_depth as isize + if_delta {
                    self.open.pop();
                }
            }
        }
    }

    /// Report any still-open delimiters at end of input
    pub fn finish(&mut self, errors: &mut ErrorSink) {
        for (delimiter, location) in self.open.drain(..) {
            errors.report(
                LexerError::MismatchedDelimiter {
                    delimiter,
                    location,
                }
                .into(),
            );
        }
    }
}

/// The tokens of one translation unit: a per-line grammar token map, a
/// separate position-indexed comment list, and an append-only buffer for
/// tokens synthesized later by metafunctions.
#[derive(Debug, Default)]
pub struct TokenStore {
    grammar: BTreeMap<usize, Vec<Token>>,
    comments: Vec<Comment>,
    generated: Vec<Token>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize the candidate-syntax lines of a tagged file
    pub fn lex(&mut self, lines: &[SourceLine], errors: &mut ErrorSink) {
        let mut state = LexState::default();
        let mut tracker = BraceTracker::new();

        for (index, line) in lines.iter().enumerate() {
            let lineno = index + 1;
            match line.category {
                LineCategory::Empty | LineCategory::Legacy | LineCategory::Import => {}
                LineCategory::Comment => {
                    self.comments.push(Comment {
                        kind: CommentKind::Line,
                        start: SourceLocation::new(lineno, 1),
                        end: SourceLocation::new(lineno, line.text.chars().count().max(1)),
                        text: line.text.clone(),
                    });
                }
                LineCategory::Preprocessor => {
                    let directive = line.text.trim_start();
                    let location = SourceLocation::new(lineno, 1);
                    if directive.starts_with("#if") {
                        tracker.found_if(location);
                    } else if directive.starts_with("#else") || directive.starts_with("#elif") {
                        tracker.found_else(location);
                    } else if directive.starts_with("#endif") {
                        tracker.found_endif(location, errors);
                    }
                }
                LineCategory::Candidate | LineCategory::RawStringContinuation => {
                    let mut tokens = Vec::new();
                    lex_line(
                        &line.text,
                        lineno,
                        &mut state,
                        &mut tokens,
                        &mut self.comments,
                        errors,
                    );
                    for token in &tokens {
                        tracker.found_token(token, errors);
                    }
                    if !tokens.is_empty() {
                        self.grammar.entry(lineno).or_default().extend(tokens);
                    }
                }
            }
        }

        if state.in_comment {
            errors.report(
                LexerError::UnterminatedComment {
                    location: state.current_comment_start,
                }
                .into(),
            );
        }
        if let Some(raw) = state.raw_string.take() {
            errors.report(
                LexerError::UnterminatedRawString {
                    location: raw.start,
                }
                .into(),
            );
        }
        tracker.finish(errors);
    }

    pub fn grammar_map(&self) -> &BTreeMap<usize, Vec<Token>> {
        &self.grammar
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn generated(&self) -> &[Token] {
        &self.generated
    }

    /// Append synthesized tokens; the buffer is append-only so earlier
    /// runs stay valid for the lifetime of the trees that reference them
    pub fn append_generated(&mut self, tokens: impl IntoIterator<Item = Token>) -> usize {
        let start = self.generated.len();
        self.generated.extend(tokens);
        start
    }

    /// All grammar tokens in source order, for the parser
    pub fn flattened(&self) -> Vec<Token> {
        self.grammar.values().flatten().cloned().collect()
    }

    /// JSON dump of the store for troubleshooting
    pub fn debug_dump(&self) -> String {
        serde_json::json!({
            "lines": self.grammar,
            "comments": self.comments,
            "generated": self.generated,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests;
