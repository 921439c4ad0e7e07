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

//! Error types and the shared error sink
//!
//! Every stage reports into one accumulating, position-keyed list rather
//! than aborting; the caller decides whether the run failed by checking
//! whether the list is non-empty.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A position in the candidate-syntax source (1-based line and column)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One accumulated diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub location: SourceLocation,
    pub message: String,
    /// Internal compiler diagnostics, not user-facing syntax errors
    pub internal: bool,
    /// Generic message that yields to a more specific one at the same or
    /// a later position
    pub fallback: bool,
}

impl ErrorEntry {
    pub fn new(location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
            internal: false,
            fallback: false,
        }
    }

    pub fn internal(location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
            internal: true,
            fallback: false,
        }
    }

    pub fn fallback(location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
            internal: false,
            fallback: true,
        }
    }
}

/// Shared accumulating error list
///
/// Append-only during a run. The fallback rule is the only cross-error
/// interaction: a fallback entry is dropped when any entry already exists
/// at an equal or later position. The comparison is by position only, not
/// category, matching the behavior of the baseline tooling.
#[derive(Debug, Default, Clone)]
pub struct ErrorSink {
    entries: Vec<ErrorEntry>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an entry, applying the fallback-suppression rule
    pub fn report(&mut self, entry: ErrorEntry) {
        if entry.fallback
            && self
                .entries
                .iter()
                .any(|e| e.location >= entry.location)
        {
            return;
        }
        self.entries.push(entry);
    }

    pub fn error(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.report(ErrorEntry::new(location, message));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    /// The list sorted by source position, for the emission collaborator
    pub fn sorted_entries(&self) -> Vec<ErrorEntry> {
        let mut sorted = self.entries.clone();
        sorted.sort_by_key(|e| e.location);
        sorted
    }
}

/// Lexical errors produced while tokenizing one line
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexerError {
    #[error("unterminated block comment starting at {location}")]
    UnterminatedComment { location: SourceLocation },

    #[error("unterminated raw string literal starting at {location}")]
    UnterminatedRawString { location: SourceLocation },

    #[error("malformed literal '{text}' at {location}")]
    MalformedLiteral {
        text: String,
        location: SourceLocation,
    },

    #[error("unexpected character '{character}' at {location}")]
    UnexpectedCharacter {
        character: char,
        location: SourceLocation,
    },

    #[error("mismatched '{delimiter}' at {location}")]
    MismatchedDelimiter {
        delimiter: char,
        location: SourceLocation,
    },

    #[error("unbalanced braces across preprocessor conditional branches at {location}")]
    UnbalancedConditional { location: SourceLocation },
}

impl LexerError {
    pub fn location(&self) -> SourceLocation {
        match self {
            LexerError::UnterminatedComment { location }
            | LexerError::UnterminatedRawString { location }
            | LexerError::MalformedLiteral { location, .. }
            | LexerError::UnexpectedCharacter { location, .. }
            | LexerError::MismatchedDelimiter { location, .. }
            | LexerError::UnbalancedConditional { location } => *location,
        }
    }
}

impl From<LexerError> for ErrorEntry {
    fn from(err: LexerError) -> Self {
        ErrorEntry::new(err.location(), err.to_string())
    }
}

/// Syntactic errors produced during parsing
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParserError {
    #[error("expected {expected}, found '{found}' at {location}")]
    UnexpectedToken {
        expected: String,
        found: String,
        location: SourceLocation,
    },

    #[error("{message} at {location}")]
    IncompleteProduction {
        message: String,
        location: SourceLocation,
    },
}

impl ParserError {
    pub fn location(&self) -> SourceLocation {
        match self {
            ParserError::UnexpectedToken { location, .. }
            | ParserError::IncompleteProduction { location, .. } => *location,
        }
    }
}

impl From<ParserError> for ErrorEntry {
    fn from(err: ParserError) -> Self {
        ErrorEntry::new(err.location(), err.to_string())
    }
}
