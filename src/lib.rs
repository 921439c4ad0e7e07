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

//! Veneer: front end for an experimental alternative C++ surface syntax
//!
//! The pipeline has three stages:
//!
//! 1. [`lexer`] tokenizes classified source lines one at a time, carrying
//!    comment and raw-string state across line boundaries.
//! 2. [`parser`] runs recursive descent over the flattened token stream
//!    and produces an ordered forest of declarations.
//! 3. [`reflect`] applies each declaration's metafunction requests,
//!    mutating the tree and re-entering the lexer and parser for
//!    synthesized members.
//!
//! All stages report into one accumulating [`error::ErrorSink`]; a run
//! never aborts early, and the caller decides success by checking whether
//! the sink is empty.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod reflect;
pub mod source;

use ast::TranslationUnit;
use error::ErrorSink;
use lexer::TokenStore;
use parser::Parser;
use reflect::{BuiltinRegistry, MetafunctionRegistry};
use source::SourceLine;

/// Everything the front end produced for one translation unit
pub struct FrontEndResult {
    pub unit: TranslationUnit,
    pub tokens: TokenStore,
    pub errors: ErrorSink,
    /// Output of `print` metafunction requests, in application order
    pub printed: Vec<String>,
}

impl FrontEndResult {
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Run the full front end over classified source lines with the builtin
/// metafunction registry
pub fn compile(lines: &[SourceLine]) -> FrontEndResult {
    compile_with_registry(lines, &BuiltinRegistry::new())
}

/// Run the full front end with a caller-provided metafunction registry
pub fn compile_with_registry(
    lines: &[SourceLine],
    registry: &dyn MetafunctionRegistry,
) -> FrontEndResult {
    let mut errors = ErrorSink::new();
    let mut tokens = TokenStore::new();
    tokens.lex(lines, &mut errors);

    let mut parser = Parser::new(tokens.flattened(), &mut errors);
    let mut unit = parser.parse_translation_unit();

    let printed = reflect::apply_unit_metafunctions(&mut unit, registry, &mut tokens, &mut errors);

    FrontEndResult {
        unit,
        tokens,
        errors,
        printed,
    }
}
