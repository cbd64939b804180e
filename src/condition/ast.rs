// SPDX-License-Identifier: MIT

//! Abstract syntax tree for condition expressions

use std::fmt;

/// A condition expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Comparison: left-hand context path, operator, literal
    Compare {
        left: String,
        op: CompareOp,
        right: Literal,
    },
    /// Logical AND
    And(Box<Expression>, Box<Expression>),
    /// Logical OR
    Or(Box<Expression>, Box<Expression>),
    /// Logical NOT
    Not(Box<Expression>),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring match for strings, membership for arrays
    Contains,
}

/// Literal values in expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::NotEq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
            CompareOp::Contains => write!(f, "contains"),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{}'", s),
            Literal::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Null => write!(f, "null"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Compare { left, op, right } => {
                write!(f, "{} {} {}", left, op, right)
            }
            Expression::And(l, r) => {
                write_operand(f, l)?;
                write!(f, " and ")?;
                write_operand(f, r)
            }
            Expression::Or(l, r) => {
                write_operand(f, l)?;
                write!(f, " or ")?;
                write_operand(f, r)
            }
            Expression::Not(inner) => {
                write!(f, "not ")?;
                write_operand(f, inner)
            }
        }
    }
}

// Compound operands get parentheses so Display output re-parses to the
// same tree.
fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expression) -> fmt::Result {
    match expr {
        Expression::And(..) | Expression::Or(..) => write!(f, "({})", expr),
        _ => write!(f, "{}", expr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_op_display() {
        assert_eq!(CompareOp::Eq.to_string(), "==");
        assert_eq!(CompareOp::NotEq.to_string(), "!=");
        assert_eq!(CompareOp::Gte.to_string(), ">=");
        assert_eq!(CompareOp::Contains.to_string(), "contains");
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::String("x".into()).to_string(), "'x'");
        assert_eq!(Literal::Number(5.0).to_string(), "5");
        assert_eq!(Literal::Number(0.8).to_string(), "0.8");
        assert_eq!(Literal::Boolean(false).to_string(), "false");
        assert_eq!(Literal::Null.to_string(), "null");
    }

    #[test]
    fn test_expression_display() {
        let expr = Expression::And(
            Box::new(Expression::Compare {
                left: "a".into(),
                op: CompareOp::Eq,
                right: Literal::String("x".into()),
            }),
            Box::new(Expression::Compare {
                left: "b".into(),
                op: CompareOp::Gt,
                right: Literal::Number(5.0),
            }),
        );
        assert_eq!(expr.to_string(), "a == 'x' and b > 5");
    }

    #[test]
    fn test_nested_compound_display_parenthesizes() {
        let inner = Expression::Or(
            Box::new(Expression::Compare {
                left: "a".into(),
                op: CompareOp::Eq,
                right: Literal::Null,
            }),
            Box::new(Expression::Compare {
                left: "b".into(),
                op: CompareOp::Eq,
                right: Literal::Null,
            }),
        );
        let expr = Expression::Not(Box::new(inner));
        assert_eq!(expr.to_string(), "not (a == null or b == null)");
    }
}
