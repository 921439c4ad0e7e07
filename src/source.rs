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

//! Tagged source lines, as delivered by the line-classification collaborator
//!
//! Classification itself happens upstream; this front end only consumes the
//! (text, category) pairs.

use serde::{Deserialize, Serialize};

/// What kind of line the classifier decided this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineCategory {
    Empty,
    Preprocessor,
    Comment,
    Import,
    /// Baseline-dialect text, passed through untouched
    Legacy,
    /// Candidate-syntax text, the input to this front end
    Candidate,
    /// Interior line of a multi-line raw string literal
    RawStringContinuation,
}

/// One classified line of source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLine {
    pub text: String,
    pub category: LineCategory,
}

impl SourceLine {
    pub fn new(text: impl Into<String>, category: LineCategory) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }
}
