//! Server-side expressions used in update directives and record values
//!
//! Expressions are compiled once into SQL text by the dialect and
//! substituted verbatim, so `count = count + 1` style updates run on the
//! server instead of overwriting with the proposed value.

use crate::Value;
use std::ops::{Add, Div, Mul, Sub};

/// Arithmetic and string operators supported in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// String/array concatenation (`||`)
    Concat,
}

impl BinaryOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Concat => "||",
        }
    }
}

/// A server-side expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Value currently stored in the target row
    Column(String),
    /// Value proposed by the incoming record for this row
    Proposed(String),
    /// A constant, rendered as an SQL literal
    Literal(Value),
    /// Verbatim SQL, e.g. `now()`
    Raw(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Reference the existing value of a field
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    /// Reference the incoming value of a field
    pub fn proposed(name: impl Into<String>) -> Self {
        Expr::Proposed(name.into())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn concat(self, other: Expr) -> Self {
        Expr::binary(BinaryOp::Concat, self, other)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Field names referenced anywhere in the expression
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_fields(&mut names);
        names
    }

    /// Field names whose proposed value the expression reads
    pub fn proposed_fields(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_proposed(&mut names);
        names
    }

    fn collect_fields<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Column(name) | Expr::Proposed(name) => names.push(name),
            Expr::Binary { left, right, .. } => {
                left.collect_fields(names);
                right.collect_fields(names);
            }
            Expr::Function { args, .. } => args.iter().for_each(|a| a.collect_fields(names)),
            Expr::Literal(_) | Expr::Raw(_) => {}
        }
    }

    fn collect_proposed<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Proposed(name) => names.push(name),
            Expr::Binary { left, right, .. } => {
                left.collect_proposed(names);
                right.collect_proposed(names);
            }
            Expr::Function { args, .. } => args.iter().for_each(|a| a.collect_proposed(names)),
            Expr::Column(_) | Expr::Literal(_) | Expr::Raw(_) => {}
        }
    }
}

macro_rules! impl_expr_op {
    ($($trait:ident :: $method:ident => $op:ident),* $(,)?) => {
        $(
            impl $trait for Expr {
                type Output = Expr;

                fn $method(self, rhs: Expr) -> Expr {
                    Expr::binary(BinaryOp::$op, self, rhs)
                }
            }
        )*
    };
}

impl_expr_op! {
    Add::add => Add,
    Sub::sub => Sub,
    Mul::mul => Mul,
    Div::div => Div,
}

/// Where an expression is being compiled: which SQL names stand for the
/// existing row and the proposed row. `None` means references of that kind
/// are not available in this position.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprScope<'a> {
    pub existing: Option<&'a str>,
    pub proposed: Option<&'a str>,
}

impl<'a> ExprScope<'a> {
    /// Scope for a value inside a VALUES row, where no row is in reach
    pub fn values() -> Self {
        Self::default()
    }

    pub fn conflict(existing: &'a str, proposed: &'a str) -> Self {
        Self {
            existing: Some(existing),
            proposed: Some(proposed),
        }
    }
}
