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

//! Text rendering of tree nodes
//!
//! Used by the reflection views (`type()`, `initializer()`, return type
//! queries) and the `print` metafunction. This is a query-oriented
//! rendering, not the final emitter.

use super::*;
use std::fmt;

impl fmt::Display for IdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.global {
            write!(f, "::")?;
        }
        for q in &self.qualifiers {
            write!(f, "{}::", q.text)?;
        }
        write!(f, "{}", self.identifier.text)?;
        if !self.template_args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.template_args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                match arg {
                    TemplateArg::Type(t) => write!(f, "{t}")?,
                    TemplateArg::Expression(e) => write!(f, "{e}")?,
                }
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard {
            return write!(f, "_");
        }
        for q in &self.qualifiers {
            write!(f, "{} ", q.text)?;
        }
        match &self.id {
            Some(id) => write!(f, "{id}"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ExpressionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, term) in self.expressions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if let Some(pass) = term.pass {
                write!(f, "{} ", pass.as_str())?;
            }
            write!(f, "{}", term.expr)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(t) => match t.kind {
                crate::lexer::Lexeme::StringLiteral => write!(f, "\"{}\"", t.text),
                crate::lexer::Lexeme::CharacterLiteral => write!(f, "'{}'", t.text),
                _ => write!(f, "{}", t.text),
            },
            Expr::Id(id) => write!(f, "{id}"),
            Expr::List(list) => write!(f, "{list}"),
            Expr::Prefix { ops, expr } => {
                for op in ops {
                    write!(f, "{}", op.text)?;
                }
                write!(f, "{expr}")
            }
            Expr::Postfix(p) => {
                write!(f, "{}", p.expr)?;
                for op in &p.ops {
                    match op {
                        PostfixOp::Member { dot, id } => write!(f, "{}{id}", dot.text)?,
                        PostfixOp::Call(args) => write!(f, "{args}")?,
                        PostfixOp::Subscript(args) => {
                            write!(f, "[")?;
                            for (i, term) in args.expressions.iter().enumerate() {
                                if i > 0 {
                                    write!(f, ", ")?;
                                }
                                write!(f, "{}", term.expr)?;
                            }
                            write!(f, "]")?;
                        }
                        PostfixOp::Op(t) => write!(f, "{}", t.text)?,
                    }
                }
                Ok(())
            }
            Expr::IsAs(e) => {
                write!(f, "{}", e.expr)?;
                for term in &e.ops {
                    write!(f, " {} ", term.keyword.text)?;
                    match &term.target {
                        IsAsTarget::Type(t) => write!(f, "{t}")?,
                        IsAsTarget::Value(v) => write!(f, "{v}")?,
                    }
                }
                Ok(())
            }
            Expr::Binary { lhs, terms, .. } => {
                write!(f, "{lhs}")?;
                for term in terms {
                    write!(f, " {} {}", term.op.text, term.expr)?;
                }
                Ok(())
            }
            Expr::Inspect(i) => {
                write!(f, "inspect {}", i.expression)
            }
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.pass.as_str(),
            self.name.text,
            self.type_id
        )
    }
}

impl Declaration {
    /// Declared type of an object declaration, as text
    pub fn object_type(&self) -> Option<String> {
        match &self.body {
            DeclarationBody::Object { type_id, .. } => Some(type_id.to_string()),
            _ => None,
        }
    }

    /// Initializer of an object declaration, as text
    pub fn object_initializer(&self) -> Option<String> {
        match &self.body {
            DeclarationBody::Object { initializer, .. } => {
                initializer.as_ref().map(|e| e.to_string())
            }
            _ => None,
        }
    }

    /// One-line summary used by the `print` metafunction
    pub fn summary(&self) -> String {
        let kind = match self.kind() {
            DeclKind::Function => "function",
            DeclKind::Object => "object",
            DeclKind::Type => "type",
            DeclKind::Namespace => "namespace",
            DeclKind::Alias => "alias",
        };
        let access = match self.access {
            Accessibility::Default => "",
            Accessibility::Public => "public ",
            Accessibility::Protected => "protected ",
            Accessibility::Private => "private ",
        };
        match self.name() {
            Some(name) => format!("{access}{kind} {name}"),
            None => format!("{access}unnamed {kind}"),
        }
    }
}
