use thiserror::Error;

/// Result of any tokenize/reorder/evaluate/register operation
pub type CalcResult<T> = Result<T, CalcError>;

/// Every failure the calculator can report. Offsets are byte offsets into
/// the expression text and are meant for diagnostics only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    /// Input bytes that match none of the token grammars
    #[error("Unknown token '{text}' at offset {offset}")]
    UnknownToken { offset: usize, text: String },
    /// Text matched the operator alternation but no registered operator claims it
    #[error("Unknown operator '{text}' at offset {offset}")]
    UnknownOperator { offset: usize, text: String },
    #[error("Unknown function '{name}' at offset {offset}")]
    UnknownFunction { offset: usize, name: String },
    #[error("Unknown constant '{name}' at offset {offset}")]
    UnknownConstant { offset: usize, name: String },
    /// Neither the explicit mapping nor the resolver knows the variable
    #[error("Unknown variable '{name}' at offset {offset}")]
    UnknownVariable { offset: usize, name: String },
    #[error("Mismatched parenthesis at offset {offset}")]
    IncorrectParenthesis { offset: usize },
    #[error("Incorrect expression at offset {offset}: {reason}")]
    IncorrectExpression { offset: usize, reason: &'static str },

    /// Operator descriptor rejected at registration
    #[error("Invalid operator '{name}': {reason}")]
    InvalidOperator { name: String, reason: String },
    /// The composite token pattern failed to compile
    #[error("Failed to compile token pattern: {0}")]
    InvalidPattern(String),
    /// Literal the active numeric backend cannot represent
    #[error("Failed to convert '{text}' at offset {offset} to a number")]
    InvalidNumber { offset: usize, text: String },

    #[error("'{0}' divided by zero")]
    DividedByZero(String),
    #[error("Invalid argument for function '{function}': {reason}")]
    InvalidArgument { function: String, reason: String },
}

impl CalcError {
    /// Offset of the offending token, when the error is tied to one
    pub fn offset(&self) -> Option<usize> {
        match self {
            CalcError::UnknownToken { offset, .. }
            | CalcError::UnknownOperator { offset, .. }
            | CalcError::UnknownFunction { offset, .. }
            | CalcError::UnknownConstant { offset, .. }
            | CalcError::UnknownVariable { offset, .. }
            | CalcError::IncorrectParenthesis { offset }
            | CalcError::IncorrectExpression { offset, .. }
            | CalcError::InvalidNumber { offset, .. } => Some(*offset),
            CalcError::InvalidOperator { .. }
            | CalcError::InvalidPattern(..)
            | CalcError::DividedByZero(..)
            | CalcError::InvalidArgument { .. } => None,
        }
    }
}
