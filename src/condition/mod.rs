// SPDX-License-Identifier: MIT

//! Transition predicates
//!
//! A `Predicate` guards a transition. It is a small tagged union rather
//! than arbitrary executable text: expressions are compiled to an AST at
//! parse time, and opaque conditions go through the registry's named
//! predicate table. Every variant serializes back to source text, which
//! is what the Manager stores in documents.

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::evaluate;
pub use parser::{parse, ParseError};

use crate::registry::Registry;
use crate::state::Context;

/// A transition guard
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Always taken (the default for unguarded transitions)
    Always,
    /// Never taken (the constant-false guard, for disabling an edge
    /// without deleting it)
    Never,
    /// A compiled comparison/boolean expression over the context
    Expr(Expression),
    /// A named predicate resolved through the registry's lookup table
    Custom(String),
    /// Source text that failed to compile. Never taken at run time;
    /// the validator reports it as an issue.
    Invalid { source: String },
}

impl Predicate {
    /// Compile condition source text into a predicate.
    ///
    /// A bare identifier (no operators) refers to a registered custom
    /// predicate by name. Text that fits neither grammar becomes
    /// `Invalid` so loading stays lenient and the validator can flag it.
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        if source.is_empty() || source == "true" {
            return Predicate::Always;
        }
        if source == "false" {
            return Predicate::Never;
        }
        if is_identifier(source) {
            return Predicate::Custom(source.to_string());
        }
        match parser::parse(source) {
            Ok(expr) => Predicate::Expr(expr),
            Err(e) => {
                log::warn!("Failed to compile condition '{}': {}", source, e);
                Predicate::Invalid {
                    source: source.to_string(),
                }
            }
        }
    }

    /// Evaluate against the current context. Unknown custom names and
    /// invalid source evaluate false (the transition is never taken).
    pub fn evaluate(&self, context: &Context, registry: &Registry) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Never => false,
            Predicate::Expr(expr) => evaluator::evaluate(expr, context),
            Predicate::Custom(name) => match registry.predicate(name) {
                Some(pred) => pred(context),
                None => {
                    log::warn!("Unknown custom predicate '{}'", name);
                    false
                }
            },
            Predicate::Invalid { source } => {
                log::warn!("Skipping transition with invalid condition '{}'", source);
                false
            }
        }
    }

    /// Whether this predicate is the always-true guard
    pub fn is_always(&self) -> bool {
        matches!(self, Predicate::Always)
    }

    /// Render back to the source text the Manager stores in documents
    pub fn to_source(&self) -> Option<String> {
        match self {
            Predicate::Always => None,
            Predicate::Never => Some("false".to_string()),
            Predicate::Expr(expr) => Some(expr.to_string()),
            Predicate::Custom(name) => Some(name.clone()),
            Predicate::Invalid { source } => Some(source.clone()),
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Signature for custom predicates registered on the Registry
pub type CustomPredicate = dyn Fn(&Context) -> bool + Send + Sync;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_is_always() {
        assert!(Predicate::parse("").is_always());
        assert!(Predicate::parse("true").is_always());
        assert_eq!(Predicate::parse("").to_source(), None);
    }

    #[test]
    fn test_parse_expression() {
        let p = Predicate::parse("intent == 'search'");
        assert!(matches!(p, Predicate::Expr(_)));
        assert_eq!(p.to_source().unwrap(), "intent == 'search'");
    }

    #[test]
    fn test_parse_false_is_constant_never() {
        let p = Predicate::parse("false");
        assert_eq!(p, Predicate::Never);
        assert!(!p.evaluate(&Context::new(), &Registry::new()));
        assert_eq!(p.to_source().as_deref(), Some("false"));
        // "false" is a constant, never a custom predicate lookup
        assert_eq!(Predicate::parse(&p.to_source().unwrap()), Predicate::Never);
    }

    #[test]
    fn test_parse_bare_identifier_is_custom() {
        let p = Predicate::parse("needs_review");
        assert_eq!(p, Predicate::Custom("needs_review".to_string()));
        assert_eq!(p.to_source().unwrap(), "needs_review");
    }

    #[test]
    fn test_parse_garbage_is_invalid() {
        let p = Predicate::parse("this is not valid ===");
        assert!(matches!(p, Predicate::Invalid { .. }));
        assert_eq!(p.to_source().unwrap(), "this is not valid ===");
    }

    #[test]
    fn test_evaluate_custom_and_invalid() {
        use serde_json::json;

        let mut registry = Registry::new();
        registry.register_predicate("ready", |ctx: &Context| ctx.contains_key("go"));

        let mut ctx = Context::new();
        assert!(!Predicate::Custom("ready".into()).evaluate(&ctx, &registry));
        ctx.insert("go".to_string(), json!(true));
        assert!(Predicate::Custom("ready".into()).evaluate(&ctx, &registry));

        assert!(!Predicate::Custom("unregistered".into()).evaluate(&ctx, &registry));
        let invalid = Predicate::Invalid {
            source: "???".into(),
        };
        assert!(!invalid.evaluate(&ctx, &registry));
        assert!(Predicate::Always.evaluate(&ctx, &registry));
    }

    #[test]
    fn test_source_round_trip() {
        for src in ["score > 0.8", "a == 'x' and b > 5", "not done == true"] {
            let p = Predicate::parse(src);
            let emitted = p.to_source().unwrap();
            assert_eq!(Predicate::parse(&emitted), p, "round-trip of '{}'", src);
        }
    }
}
