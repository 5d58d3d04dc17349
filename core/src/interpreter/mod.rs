//! Script interpreter
//!
//! The loop engine lives in `executor`; the remaining modules are the
//! collaborators it drives: the header and statement `parser`, the `expr`
//! compiler and evaluator with its `stdlib`, the `workspace` holding data and
//! symbols, the `commands` dispatcher, `model` estimation, and the `session`
//! that feeds script lines through a `runtime` context.

pub mod commands;
pub mod errors;
pub mod executor;
pub mod expr;
pub mod model;
pub mod output;
pub mod parser;
pub mod runtime;
pub mod session;
pub mod stdlib;
pub mod workspace;

pub use errors::{EvalError, ExecResult, FlowError, LoopError};
pub use executor::{CancelFn, CancelPoll, Loop, LoopCompiler, LoopKind, NeverCancel};
pub use parser::ParseError;
pub use runtime::{Limits, Runtime};
pub use session::{check_script, Session, SessionBuilder};
pub use workspace::{Value, Workspace};
