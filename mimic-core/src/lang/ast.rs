//! AST for the task action / condition expression language.
//!
//! Task bodies are small imperative programs over three name-keyed records
//! (`inputs` read-only, `outputs` and `state` writable) plus per-invocation
//! scalars (`current_time`, the triggering event's `event.*` data) and the
//! `emit(...)` capability. Conditions reuse the expression subset.

use crate::types::Value;
use serde::{Deserialize, Serialize};

/// A compiled task body: an ordered list of statements.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// A single statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `state.x = expr`, `outputs.y = expr`, or `local = expr`.
    Assign { target: Target, value: Expr },
    /// `emit(name, value?, delay?, priority?)`.
    Emit {
        name: Expr,
        value: Option<Expr>,
        delay: Option<Expr>,
        priority: Option<Expr>,
    },
    /// `if cond { ... } else { ... }` — else arm may be empty.
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
}

/// Assignment destination. `inputs` and `event` are read-only and have no
/// target form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    State(String),
    Output(String),
    Local(String),
}

/// The record a dotted path reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathRoot {
    Inputs,
    Outputs,
    State,
    Event,
}

impl PathRoot {
    pub fn keyword(self) -> &'static str {
        match self {
            PathRoot::Inputs => "inputs",
            PathRoot::Outputs => "outputs",
            PathRoot::State => "state",
            PathRoot::Event => "event",
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    /// Dotted record access, e.g. `state.count`.
    Path { root: PathRoot, key: String },
    /// A task-local variable introduced by a bare assignment.
    Local(String),
    /// The virtual clock, available in event-driven invocations.
    CurrentTime,
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}
