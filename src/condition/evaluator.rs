// SPDX-License-Identifier: MIT

//! Expression evaluation against the run-time context

use super::ast::{CompareOp, Expression, Literal};
use crate::state::{get_path, Context};
use serde_json::Value;

/// Evaluate a compiled expression against the context
pub fn evaluate(expr: &Expression, context: &Context) -> bool {
    match expr {
        Expression::Compare { left, op, right } => {
            evaluate_compare(get_path(context, left), op, right)
        }
        Expression::And(l, r) => evaluate(l, context) && evaluate(r, context),
        Expression::Or(l, r) => evaluate(l, context) || evaluate(r, context),
        Expression::Not(inner) => !evaluate(inner, context),
    }
}

fn evaluate_compare(left: Option<&Value>, op: &CompareOp, right: &Literal) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::Gt => compare_numbers(left, right, |a, b| a > b),
        CompareOp::Gte => compare_numbers(left, right, |a, b| a >= b),
        CompareOp::Lt => compare_numbers(left, right, |a, b| a < b),
        CompareOp::Lte => compare_numbers(left, right, |a, b| a <= b),
        CompareOp::Contains => check_contains(left, right),
    }
}

fn values_equal(left: Option<&Value>, right: &Literal) -> bool {
    match (left, right) {
        // An absent key compares equal to null
        (None, Literal::Null) => true,
        (None, _) => false,
        (Some(Value::Null), Literal::Null) => true,
        (Some(Value::String(s)), Literal::String(rs)) => s == rs,
        (Some(Value::Number(n)), Literal::Number(rn)) => n
            .as_f64()
            .map(|f| (f - rn).abs() < f64::EPSILON)
            .unwrap_or(false),
        (Some(Value::Bool(b)), Literal::Boolean(rb)) => b == rb,
        _ => false,
    }
}

fn compare_numbers<F>(left: Option<&Value>, right: &Literal, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (left, right) {
        (Some(Value::Number(n)), Literal::Number(rn)) => {
            n.as_f64().map(|f| cmp(f, *rn)).unwrap_or(false)
        }
        _ => false,
    }
}

fn check_contains(left: Option<&Value>, right: &Literal) -> bool {
    match (left, right) {
        (Some(Value::String(s)), Literal::String(substr)) => s.contains(substr),
        (Some(Value::Array(arr)), Literal::String(val)) => {
            arr.iter().any(|v| v.as_str() == Some(val.as_str()))
        }
        (Some(Value::Array(arr)), Literal::Number(val)) => arr.iter().any(|v| {
            v.as_f64()
                .map(|f| (f - val).abs() < f64::EPSILON)
                .unwrap_or(false)
        }),
        (Some(Value::Array(arr)), Literal::Boolean(val)) => {
            arr.iter().any(|v| v.as_bool() == Some(*val))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::parser::parse;
    use serde_json::json;

    fn context_with(pairs: Vec<(&str, Value)>) -> Context {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn eval(src: &str, context: &Context) -> bool {
        evaluate(&parse(src).unwrap(), context)
    }

    #[test]
    fn test_string_equality() {
        let ctx = context_with(vec![("intent", json!("search"))]);
        assert!(eval("intent == 'search'", &ctx));
        assert!(!eval("intent == 'code'", &ctx));
        assert!(eval("intent != 'code'", &ctx));
    }

    #[test]
    fn test_number_comparison() {
        let ctx = context_with(vec![("score", json!(7.5))]);

        assert!(eval("score > 5", &ctx));
        assert!(!eval("score > 10", &ctx));
        assert!(eval("score >= 7.5", &ctx));
        assert!(eval("score < 10", &ctx));
        assert!(eval("score <= 7.5", &ctx));
        assert!(!eval("score <= 7", &ctx));
    }

    #[test]
    fn test_boolean_comparison() {
        let ctx = context_with(vec![("is_draft", json!(true))]);
        assert!(eval("is_draft == true", &ctx));
        assert!(!eval("is_draft == false", &ctx));
    }

    #[test]
    fn test_missing_key_is_null() {
        let ctx = Context::new();
        assert!(eval("missing == null", &ctx));
        assert!(!eval("missing == 'value'", &ctx));
        assert!(!eval("missing > 1", &ctx));
    }

    #[test]
    fn test_contains_string_and_array() {
        let ctx = context_with(vec![
            ("message", json!("hello world")),
            ("tags", json!(["bug", "urgent"])),
        ]);

        assert!(eval("message contains 'world'", &ctx));
        assert!(!eval("message contains 'foo'", &ctx));
        assert!(eval("tags contains 'bug'", &ctx));
        assert!(!eval("tags contains 'frontend'", &ctx));
    }

    #[test]
    fn test_and_or_not() {
        let ctx = context_with(vec![("intent", json!("code")), ("confidence", json!(0.9))]);

        assert!(eval("intent == 'code' and confidence > 0.8", &ctx));
        assert!(!eval("intent == 'code' and confidence > 0.95", &ctx));
        assert!(eval("intent == 'search' or confidence > 0.8", &ctx));
        assert!(!eval("intent == 'search' or confidence > 0.95", &ctx));
        assert!(eval("not intent == 'search'", &ctx));
    }

    #[test]
    fn test_nested_path() {
        let ctx = context_with(vec![("result", json!({"data": {"intent": "search"}}))]);
        assert!(eval("result.data.intent == 'search'", &ctx));
        assert!(!eval("result.data.intent == 'code'", &ctx));
    }

    #[test]
    fn test_type_mismatch_is_false() {
        let ctx = context_with(vec![("count", json!("three"))]);
        assert!(!eval("count > 2", &ctx));
        assert!(!eval("count == 3", &ctx));
    }
}
