//! Error types for the MimicDB engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Machine code attached to column-cast failures so the insert processor
/// can rewrite them with positional context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastCode {
    OutOfRangeValue,
    IncorrectIntegerValue,
    BadNull,
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// Lexer or parser failure, passed through untouched.
    #[error("{0}")]
    Parse(String),

    /// Raised inside expression evaluation. Pipeline stages re-wrap this
    /// with their clause tag before it reaches the caller.
    #[error("{0}")]
    Evaluator(String),

    /// User-visible SQL error carrying its final MySQL-phrased message.
    #[error("{0}")]
    Processor(String),

    /// Derived-table validation failure; converted to a processor error at
    /// the executor boundary.
    #[error("{0}")]
    SubQuery(String),

    /// Column cast failure during INSERT.
    #[error("{message}")]
    Cast { code: CastCode, message: String },
}

impl EngineError {
    /// Tag an evaluator error with the clause it surfaced in, leaving every
    /// other kind untouched. Each pipeline stage applies this exactly once,
    /// so nested failures keep the innermost clause.
    pub(crate) fn in_clause(self, clause: &str) -> EngineError {
        match self {
            EngineError::Evaluator(message) => {
                EngineError::Processor(format!("{message} in '{clause}'"))
            }
            other => other,
        }
    }
}
