//! Script sessions
//!
//! A `Session` owns one `Runtime` and routes script lines: loop headers and
//! bodies go to the loop compiler, `function ... end function` blocks are
//! collected for later calls, and everything else runs immediately.

use tracing::{debug, info};

use super::errors::{EvalError, ExecResult, FlowError, LoopError};
use super::executor::{self, CancelPoll, Compiled, IfStack, LoopCompiler};
use super::output::Printer;
use super::parser::{first_word, is_loop_header, rest_of, ParseError};
use super::runtime::{FunctionItem, Limits, Runtime, UserFunction};
use super::workspace::Workspace;
use crate::config::Config;

/* ===================== Builder ===================== */

#[derive(Default)]
pub struct SessionBuilder {
    config: Option<Config>,
    capture: bool,
    cancel: Option<Box<dyn CancelPoll>>,
    dry_run: bool,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Collect script output instead of writing it to stdout
    pub fn capture_output(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn cancel_with(mut self, cancel: impl CancelPoll + 'static) -> Self {
        self.cancel = Some(Box::new(cancel));
        self
    }

    /// Compile loops and function bodies without executing anything
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Session {
        let config = self.config.unwrap_or_default();
        let ws = Workspace::new(config.runtime.random_seed);
        let out = if self.capture {
            Printer::capture()
        } else {
            Printer::stdout()
        };
        let mut rt = Runtime::new(ws, out, Limits::from(&config));
        if let Some(cancel) = self.cancel {
            rt.set_cancel(cancel);
        }
        Session {
            rt,
            compiler: LoopCompiler::new(),
            flow: IfStack::default(),
            defining: None,
            dry_run: self.dry_run,
            loops_compiled: 0,
        }
    }
}

/* ===================== Session ===================== */

#[derive(Debug)]
pub struct Session {
    rt: Runtime,
    compiler: LoopCompiler,
    /// Conditional state of top-level statements
    flow: IfStack,
    /// Function body being collected
    defining: Option<UserFunction>,
    dry_run: bool,
    loops_compiled: usize,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn new() -> Self {
        SessionBuilder::new().build()
    }

    pub fn workspace(&self) -> &Workspace {
        &self.rt.ws
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.rt.ws
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.rt
    }

    /// Captured output so far (empty when writing to stdout)
    pub fn output(&self) -> &str {
        self.rt.out.captured()
    }

    pub fn take_output(&mut self) -> String {
        self.rt.out.take_captured()
    }

    pub fn is_compiling(&self) -> bool {
        self.compiler.is_compiling()
    }

    /// Outermost loops compiled so far, including those inside functions
    pub fn loops_compiled(&self) -> usize {
        self.loops_compiled
    }

    /// Feed one logical script line
    pub fn feed_line(&mut self, lineno: usize, line: &str) -> ExecResult {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        let result = self.route(lineno, line);
        if let Err(err) = &result {
            if err.is_cancelled() {
                debug!(line = lineno, "cancelled; clearing session state");
                self.flow.clear();
                self.compiler.abandon();
                self.defining = None;
            }
        }
        result
    }

    fn route(&mut self, lineno: usize, line: &str) -> ExecResult {
        if self.defining.is_some() {
            return self.collect(lineno, line);
        }
        if self.compiler.is_compiling() || is_loop_header(line) {
            if let Compiled::Ready(mut lp) = self.compiler.feed(lineno, line)? {
                self.loops_compiled += 1;
                if !self.dry_run && self.flow.is_active() {
                    executor::execute(&mut lp, &mut self.rt)?;
                }
            }
            return Ok(());
        }
        if first_word(line) == "function" {
            let name = rest_of(line);
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(EvalError::syntax(line, "usage: function NAME").into());
            }
            self.defining = Some(UserFunction::new(name));
            return Ok(());
        }
        if self.dry_run {
            return Ok(());
        }
        self.rt.run_statement(lineno, line, &mut self.flow)
    }

    /// Add a line to the function being defined
    fn collect(&mut self, lineno: usize, line: &str) -> ExecResult {
        if !self.compiler.is_compiling() && is_end_function(line) {
            if let Some(function) = self.defining.take() {
                info!(name = %function.name, "function defined");
                if !self.dry_run && self.flow.is_active() {
                    self.rt.define_function(function);
                }
            }
            return Ok(());
        }
        if self.compiler.is_compiling() || is_loop_header(line) {
            let ready = match self.compiler.feed(lineno, line) {
                Ok(ready) => ready,
                Err(err) => {
                    self.defining = None;
                    return Err(err);
                }
            };
            if let Compiled::Ready(mut lp) = ready {
                self.loops_compiled += 1;
                lp.attach();
                if let Some(function) = self.defining.as_mut() {
                    function.items.push(FunctionItem::Loop(lp));
                }
            }
            return Ok(());
        }
        if let Some(function) = self.defining.as_mut() {
            function.items.push(FunctionItem::Line {
                lineno,
                text: line.to_string(),
            });
        }
        Ok(())
    }

    /// End of input: anything still open is an error
    pub fn finish(&mut self) -> ExecResult {
        if self.compiler.is_compiling() {
            let depth = self.compiler.depth();
            self.compiler.abandon();
            return Err(ParseError::Nesting {
                line: 0,
                message: format!("{} unterminated loop(s) at end of input", depth),
            }
            .into());
        }
        if let Some(function) = self.defining.take() {
            return Err(ParseError::Nesting {
                line: 0,
                message: format!("function '{}' is not closed with 'end function'", function.name),
            }
            .into());
        }
        if self.flow.depth() > 0 {
            let depth = self.flow.depth();
            self.flow.clear();
            return Err(FlowError::Unterminated(depth).into());
        }
        Ok(())
    }

    /// Run a whole script; lines ending in `\` continue on the next line
    pub fn run_script(&mut self, source: &str) -> ExecResult {
        for (lineno, line) in logical_lines(source) {
            self.feed_line(lineno, &line)?;
        }
        self.finish()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn is_end_function(line: &str) -> bool {
    first_word(line) == "end" && rest_of(line) == "function"
}

/// Join continuation lines; each logical line keeps the number of its first physical line
pub fn logical_lines(source: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (i, raw) in source.lines().enumerate() {
        let (start, mut text) = pending.take().unwrap_or((i + 1, String::new()));
        let trimmed = raw.trim_end();
        match trimmed.strip_suffix('\\') {
            Some(head) => {
                text.push_str(head);
                text.push(' ');
                pending = Some((start, text));
            }
            None => {
                text.push_str(trimmed);
                out.push((start, text));
            }
        }
    }
    if let Some(last) = pending {
        out.push(last);
    }
    out
}

/// Compile a script without running it; returns the number of outermost loops
pub fn check_script(source: &str) -> Result<usize, LoopError> {
    let mut session = Session::builder().capture_output().dry_run(true).build();
    session.run_script(source)?;
    Ok(session.loops_compiled())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_lines() {
        let lines = logical_lines("a = 1 + \\\n  2\nprint a\n");
        assert_eq!(lines, vec![(1, "a = 1 +    2".to_string()), (3, "print a".to_string())]);
    }

    #[test]
    fn test_check_script_counts_loops() {
        let src = "loop 2\nprint \"x\"\nendloop\nfunction f\nloop i=1..2\nendloop\nend function\n";
        assert_eq!(check_script(src).unwrap(), 2);
        assert!(check_script("loop 2\nprint \"x\"\n").is_err());
    }

    #[test]
    fn test_top_level_conditionals() {
        let mut s = Session::builder().capture_output().build();
        s.run_script("x = 3\nif x > 2\nprint \"big\"\nelse\nprint \"small\"\nendif\n")
            .unwrap();
        assert_eq!(s.output(), "big\n");
        assert!(s.run_script("if 1\n").is_err());
    }

    #[test]
    fn test_break_outside_loop() {
        let mut s = Session::builder().capture_output().build();
        let err = s.run_script("break\n").unwrap_err();
        assert!(matches!(err.root(), LoopError::Flow(FlowError::OutsideLoop("break"))));
    }
}
