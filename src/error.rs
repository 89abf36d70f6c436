//! Error types for the deductive engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvalError>;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("program is not stratifiable: negative dependency cycle through '{0}'")]
    NotStratifiable(String),

    #[error("unsafe rule `{rule}`: {reason}")]
    RuleUnsafe { rule: String, reason: String },

    #[error("evaluation timed out (stratum {stratum}, round {round})")]
    Timeout { stratum: usize, round: usize },

    #[error("tuple limit exceeded (stratum {stratum}, round {round}): {count} tuples stored")]
    TupleLimitExceeded {
        stratum: usize,
        round: usize,
        count: usize,
    },

    #[error("built-in evaluation failed: {0}")]
    BuiltinFailure(String),

    #[error("constructed term nesting depth {depth} exceeds the configured bound")]
    TooComplex { depth: usize },

    #[error("cannot store non-ground fact: {0}")]
    NonGroundFact(String),
}
