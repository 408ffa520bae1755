//! Error taxonomy for the simulation kernel.
//!
//! One flat enum; everything a caller can see derives from it. Expression
//! compile/eval failures surface as `Expr` internally and are wrapped into
//! `Task`/`Component` at the boundary where the failing unit is known.

use thiserror::Error;

/// Main error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parser(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Component error: {0}")]
    Component(String),

    #[error("Error in task '{task}': {message}")]
    Task { task: String, message: String },

    #[error("Expression error: {0}")]
    Expr(String),

    #[error("Time error: {0}")]
    Time(String),

    #[error("Termination condition error: {0}")]
    Termination(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Rewrap an expression failure as a task failure for the named task.
    pub(crate) fn into_task_error(self, task: &str) -> Error {
        match self {
            Error::Expr(message) => Error::Task {
                task: task.to_string(),
                message,
            },
            other => other,
        }
    }
}
