// SPDX-License-Identifier: MIT

//! Condition expression parser
//!
//! Grammar, loosest-binding first:
//! - `a or b`, `a and b` (right-associative, `and`/`or` split at the
//!   first top-level occurrence)
//! - `not expr`
//! - `path OP literal` where OP is one of `==` `!=` `>` `>=` `<` `<=`
//!   `contains`
//! - `( ... )` grouping
//!
//! Operators inside quoted strings are ignored.

use super::ast::{CompareOp, Expression, Literal};
use thiserror::Error;

/// Condition parse failures
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("could not parse condition '{0}'")]
    Expression(String),
    #[error("could not parse literal '{0}'")]
    Literal(String),
}

/// Parse condition source text into an expression AST
pub fn parse(input: &str) -> Result<Expression, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::Expression(input.to_string()));
    }

    if let Some(inner) = strip_outer_parens(input) {
        return parse(inner);
    }

    if let Some(expr) = try_parse_compound(input)? {
        return Ok(expr);
    }

    if let Some(rest) = input.strip_prefix("not ") {
        return Ok(Expression::Not(Box::new(parse(rest)?)));
    }

    parse_comparison(input)
}

/// If the whole input is one parenthesized group, return its interior
fn strip_outer_parens(input: &str) -> Option<&str> {
    if !input.starts_with('(') {
        return None;
    }

    let mut depth = 0;
    let mut in_string = false;
    for (i, c) in input.char_indices() {
        match c {
            '\'' | '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    if i == input.len() - 1 {
                        return Some(&input[1..i]);
                    }
                    return None;
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on the first top-level ` and ` / ` or ` (outside quotes and
/// parentheses)
fn try_parse_compound(input: &str) -> Result<Option<Expression>, ParseError> {
    let mut depth = 0;
    let mut in_string = false;

    for (i, c) in input.char_indices() {
        match c {
            '\'' | '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth -= 1,
            _ if in_string || depth != 0 => {}
            _ => {
                if input[i..].starts_with(" and ") {
                    let left = parse(&input[..i])?;
                    let right = parse(&input[i + 5..])?;
                    return Ok(Some(Expression::And(Box::new(left), Box::new(right))));
                }
                if input[i..].starts_with(" or ") {
                    let left = parse(&input[..i])?;
                    let right = parse(&input[i + 4..])?;
                    return Ok(Some(Expression::Or(Box::new(left), Box::new(right))));
                }
            }
        }
    }

    Ok(None)
}

fn parse_comparison(input: &str) -> Result<Expression, ParseError> {
    // Longest operators first so ">=" wins over ">"
    let operators = [
        ("!=", CompareOp::NotEq),
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        ("==", CompareOp::Eq),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        (" contains ", CompareOp::Contains),
    ];

    for (op_str, op) in operators {
        if let Some(pos) = find_operator(input, op_str) {
            let left = input[..pos].trim().to_string();
            if left.is_empty() {
                return Err(ParseError::Expression(input.to_string()));
            }
            let right = parse_literal(input[pos + op_str.len()..].trim())?;
            return Ok(Expression::Compare { left, op, right });
        }
    }

    Err(ParseError::Expression(input.to_string()))
}

fn find_operator(input: &str, op: &str) -> Option<usize> {
    let mut in_string = false;
    for (i, c) in input.char_indices() {
        if c == '\'' || c == '"' {
            in_string = !in_string;
        } else if !in_string && input[i..].starts_with(op) {
            return Some(i);
        }
    }
    None
}

fn parse_literal(input: &str) -> Result<Literal, ParseError> {
    match input {
        "null" => return Ok(Literal::Null),
        "true" => return Ok(Literal::Boolean(true)),
        "false" => return Ok(Literal::Boolean(false)),
        _ => {}
    }

    if input.len() >= 2
        && ((input.starts_with('\'') && input.ends_with('\''))
            || (input.starts_with('"') && input.ends_with('"')))
    {
        return Ok(Literal::String(input[1..input.len() - 1].to_string()));
    }

    if let Ok(n) = input.parse::<f64>() {
        return Ok(Literal::Number(n));
    }

    Err(ParseError::Literal(input.to_string()))
}
