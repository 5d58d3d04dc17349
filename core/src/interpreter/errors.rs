//! Error types for the loop runtime
//!
//! `EvalError` is what the collaborators (expression evaluator, dispatcher,
//! workspace) report. `LoopError` is the engine-level taxonomy: parse errors
//! discard the partial loop tree, evaluation errors abort unless caught, and
//! `Statement` pins a failure to the source line that produced it.

use thiserror::Error;

use super::parser::ParseError;

/* ===================== Error Codes ===================== */

/// Codes exposed to scripts through the `$error` accessor
pub const E_NONE: i32 = 0;
pub const E_DATA: i32 = 2;
pub const E_PARSE: i32 = 3;
pub const E_TYPES: i32 = 4;
pub const E_UNKNOWN_VAR: i32 = 5;
pub const E_MISSING: i32 = 6;
pub const E_LOCKED: i32 = 7;
pub const E_FUNCTION: i32 = 8;
pub const E_RESOURCE: i32 = 9;
pub const E_ITERATIONS: i32 = 10;
pub const E_FILE: i32 = 11;
pub const E_FLOW: i32 = 12;

/* ===================== Evaluation Errors ===================== */

/// Errors raised while compiling or evaluating expressions and commands
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("syntax error in '{text}': {message}")]
    Syntax { text: String, message: String },

    #[error("the symbol '{0}' is undefined")]
    Undefined(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{name}: {message}")]
    Function { name: String, message: String },

    #[error("type mismatch: {0}")]
    Type(String),

    #[error("{0}: a scalar value is required")]
    NotScalar(String),

    #[error("missing value (NA) in {0}")]
    Missing(String),

    #[error("the loop index variable '{0}' cannot be modified or deleted")]
    IndexLocked(String),

    #[error("{0}")]
    Data(String),
}

impl EvalError {
    pub fn syntax(text: impl Into<String>, message: impl Into<String>) -> Self {
        EvalError::Syntax {
            text: text.into(),
            message: message.into(),
        }
    }

    pub fn function(name: impl Into<String>, message: impl Into<String>) -> Self {
        EvalError::Function {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            EvalError::Syntax { .. } | EvalError::UnknownCommand(_) => E_PARSE,
            EvalError::Undefined(_) => E_UNKNOWN_VAR,
            EvalError::UnknownFunction(_) | EvalError::Function { .. } => E_FUNCTION,
            EvalError::Type(_) | EvalError::NotScalar(_) => E_TYPES,
            EvalError::Missing(_) => E_MISSING,
            EvalError::IndexLocked(_) => E_LOCKED,
            EvalError::Data(_) => E_DATA,
        }
    }
}

/* ===================== Flow Errors ===================== */

/// Unbalanced conditional blocks detected while executing
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlowError {
    #[error("'{0}' without a matching 'if'")]
    Unmatched(&'static str),

    #[error("'{0}' after 'else'")]
    AfterElse(&'static str),

    #[error("'{0}' is only valid inside a loop")]
    OutsideLoop(&'static str),

    #[error("{0} unterminated 'if' block(s)")]
    Unterminated(usize),
}

/* ===================== Engine Errors ===================== */

/// Errors produced by the loop engine and the session that drives it
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("out of memory: {0}")]
    Resource(String),

    #[error("reached the maximum number of iterations, {limit}; raise {setting} to allow more")]
    IterationLimit { limit: usize, setting: &'static str },

    #[error("progressive {role} at line {lineno}: expected {expected} values, got {got}")]
    Schema {
        role: &'static str,
        lineno: usize,
        expected: usize,
        got: usize,
    },

    #[error("execution stopped by user")]
    Cancelled,

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {lineno}: {text}\n{source}")]
    Statement {
        lineno: usize,
        text: String,
        #[source]
        source: Box<LoopError>,
    },
}

pub type ExecResult<T = ()> = std::result::Result<T, LoopError>;

impl LoopError {
    /// Attach the failing statement, unless a more precise location is already known
    pub fn at(self, lineno: usize, text: &str) -> LoopError {
        match self {
            LoopError::Statement { .. } | LoopError::Cancelled => self,
            other => LoopError::Statement {
                lineno,
                text: text.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with statement locations peeled off
    pub fn root(&self) -> &LoopError {
        match self {
            LoopError::Statement { source, .. } => source.root(),
            other => other,
        }
    }

    /// Source line of the failing statement, if known
    pub fn lineno(&self) -> Option<usize> {
        match self {
            LoopError::Statement { lineno, .. } => Some(*lineno),
            _ => None,
        }
    }

    /// Whether a `catch` prefix may turn this error into a recorded condition
    pub fn is_catchable(&self) -> bool {
        !matches!(self.root(), LoopError::Cancelled | LoopError::Resource(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), LoopError::Cancelled)
    }

    pub fn code(&self) -> i32 {
        match self.root() {
            LoopError::Parse(_) => E_PARSE,
            LoopError::Eval(e) => e.code(),
            LoopError::Flow(_) => E_FLOW,
            LoopError::Resource(_) => E_RESOURCE,
            LoopError::IterationLimit { .. } => E_ITERATIONS,
            LoopError::Schema { .. } => E_DATA,
            LoopError::Io { .. } => E_FILE,
            LoopError::Cancelled | LoopError::Statement { .. } => E_NONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_location_is_attached_once() {
        let err = LoopError::from(EvalError::Undefined("x".to_string()))
            .at(4, "y = x")
            .at(2, "loop 3");

        assert_eq!(err.lineno(), Some(4));
        assert_eq!(err.code(), E_UNKNOWN_VAR);
        assert!(err.to_string().starts_with("line 4: y = x"));
    }

    #[test]
    fn test_cancellation_is_never_wrapped_or_caught() {
        let err = LoopError::Cancelled.at(3, "print x");
        assert!(matches!(err, LoopError::Cancelled));
        assert!(!err.is_catchable());
    }
}
