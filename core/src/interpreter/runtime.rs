//! Interpreter context
//!
//! Everything a statement can touch lives here: the workspace, the printer,
//! the engine limits, the cancellation source and the user-defined functions.
//! One `Runtime` is threaded through every call, so independent interpreters
//! can coexist in one process.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::commands;
use super::errors::{EvalError, ExecResult, FlowError, LoopError};
use super::executor::{self, CancelPoll, IfStack, Loop, NeverCancel};
use super::expr;
use super::output::Printer;
use super::parser::{classify, Statement, StatementKind};
use super::workspace::Workspace;
use crate::config::Config;

/* ===================== Limits ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    pub max_while_iterations: usize,
    pub max_for_iterations: usize,
    /// Cancellation is polled every this many passes
    pub cancel_poll_interval: usize,
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_while_iterations: 100_000,
            max_for_iterations: 50_000_000,
            cancel_poll_interval: 10,
            max_call_depth: 64,
        }
    }
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Self {
            max_while_iterations: config.loops.max_while_iterations,
            max_for_iterations: config.loops.max_for_iterations,
            cancel_poll_interval: config.loops.cancel_poll_interval,
            max_call_depth: config.runtime.max_call_depth,
        }
    }
}

/* ===================== Functions ===================== */

/// One line of a function body
#[derive(Debug)]
pub enum FunctionItem {
    Line { lineno: usize, text: String },
    /// A compiled loop, kept for every call
    Loop(Loop),
}

#[derive(Debug)]
pub struct UserFunction {
    pub name: String,
    pub items: Vec<FunctionItem>,
}

impl UserFunction {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Vec::new(),
        }
    }
}

/* ===================== Runtime ===================== */

pub struct Runtime {
    pub ws: Workspace,
    pub out: Printer,
    pub limits: Limits,
    cancel: Box<dyn CancelPoll>,
    functions: HashMap<String, UserFunction>,
    /// Names of the functions currently executing, innermost last
    calls: Vec<String>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("limits", &self.limits)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(ws: Workspace, out: Printer, limits: Limits) -> Self {
        Self {
            ws,
            out,
            limits,
            cancel: Box::new(NeverCancel),
            functions: HashMap::new(),
            calls: Vec::new(),
        }
    }

    pub fn set_cancel(&mut self, cancel: Box<dyn CancelPoll>) {
        self.cancel = cancel;
    }

    pub fn should_stop(&self) -> bool {
        self.cancel.should_stop()
    }

    /* ---------- functions ---------- */

    pub fn define_function(&mut self, function: UserFunction) {
        debug!(name = %function.name, lines = function.items.len(), "function defined");
        self.functions.insert(function.name.clone(), function);
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name) || self.calls.iter().any(|c| c == name)
    }

    /// Run a user-defined function body, re-executing its attached loops
    pub fn call_function(&mut self, name: &str) -> ExecResult {
        if self.calls.iter().any(|c| c == name) {
            return Err(EvalError::function(name, "recursive calls are not supported").into());
        }
        if self.calls.len() >= self.limits.max_call_depth {
            return Err(EvalError::function(
                name,
                format!("call depth exceeds {} (runtime.max_call_depth)", self.limits.max_call_depth),
            )
            .into());
        }
        let mut function = self
            .functions
            .remove(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;

        self.calls.push(name.to_string());
        let result = self.run_body(&mut function.items);
        self.calls.pop();
        self.functions.insert(function.name.clone(), function);
        result
    }

    fn run_body(&mut self, items: &mut [FunctionItem]) -> ExecResult {
        let mut flow = IfStack::default();
        for item in items.iter_mut() {
            if self.should_stop() {
                return Err(LoopError::Cancelled);
            }
            match item {
                FunctionItem::Line { lineno, text } => self.run_statement(*lineno, text, &mut flow)?,
                FunctionItem::Loop(lp) => {
                    if flow.is_active() {
                        executor::execute(lp, self)?;
                    }
                }
            }
        }
        if flow.depth() > 0 {
            return Err(FlowError::Unterminated(flow.depth()).into());
        }
        Ok(())
    }

    /* ---------- statements outside loops ---------- */

    /// Execute one statement that is not part of a loop
    pub fn run_statement(&mut self, lineno: usize, text: &str, flow: &mut IfStack) -> ExecResult {
        let stmt = classify(text);
        match self.run_classified(&stmt, flow) {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = err.at(lineno, &stmt.text);
                if stmt.catch && err.is_catchable() {
                    warn!(line = lineno, error = %err, "error caught");
                    self.ws.record_error(err.code());
                    return Ok(());
                }
                Err(err)
            }
        }
    }

    fn run_classified(&mut self, stmt: &Statement, flow: &mut IfStack) -> ExecResult {
        let condition = |text: &str, ws: &mut Workspace| -> ExecResult<bool> {
            let fragment = expr::compile(super::parser::rest_of(text))?;
            Ok(expr::evaluate_condition(&fragment, ws)?)
        };
        match stmt.kind {
            StatementKind::If => {
                if flow.is_active() {
                    let c = condition(&stmt.text, &mut self.ws);
                    flow.open(matches!(c, Ok(true)));
                    c?;
                } else {
                    flow.open_dead();
                }
                return Ok(());
            }
            StatementKind::Elif => {
                let c = if flow.elif_pending()? {
                    condition(&stmt.text, &mut self.ws)
                } else {
                    Ok(false)
                };
                flow.elif(matches!(c, Ok(true)))?;
                c?;
                return Ok(());
            }
            StatementKind::Else => return Ok(flow.flip()?),
            StatementKind::Endif => return Ok(flow.close()?),
            _ => {}
        }
        if !flow.is_active() {
            return Ok(());
        }
        match stmt.kind {
            StatementKind::Break => Err(FlowError::OutsideLoop("break").into()),
            StatementKind::Continue => Err(FlowError::OutsideLoop("continue").into()),
            StatementKind::EndLoop => Err(FlowError::OutsideLoop("endloop").into()),
            StatementKind::Store => Err(FlowError::OutsideLoop("store").into()),
            _ => commands::dispatch(&stmt.text, self),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Workspace::default(), Printer::default(), Limits::default())
    }
}
