//! Test helpers for loop engine tests
//!
//! Common utilities for running scripts and reading back results

use crate::config::Config;
use crate::interpreter::executor::{Compiled, Loop, LoopCompiler};
use crate::interpreter::output::Printer;
use crate::interpreter::{Limits, LoopError, Runtime, Session, Value, Workspace};

/// Seeded config so random draws are reproducible
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.runtime.random_seed = Some(42);
    config
}

pub fn session_with(config: Config) -> Session {
    Session::builder().config(config).capture_output().build()
}

/// Run a script that must succeed
pub fn run_ok(source: &str) -> Session {
    let mut session = session_with(test_config());
    if let Err(e) = session.run_script(source) {
        panic!("script failed: {}\n--- script ---\n{}", e, source);
    }
    session
}

/// Run a script that must fail; returns the session for inspection
pub fn run_err(source: &str) -> (Session, LoopError) {
    let mut session = session_with(test_config());
    match session.run_script(source) {
        Ok(()) => panic!("script should have failed:\n{}", source),
        Err(e) => (session, e),
    }
}

pub fn lines(session: &Session) -> Vec<&str> {
    session.output().lines().collect()
}

pub fn scalar(session: &Session, name: &str) -> f64 {
    match session.workspace().get(name) {
        Some(Value::Scalar(x)) => *x,
        other => panic!("{} is not a scalar: {:?}", name, other),
    }
}

/// Whitespace-separated cells of the first output row whose first cell is `label`
pub fn row<'a>(session: &'a Session, label: &str) -> Vec<&'a str> {
    session
        .output()
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>())
        .find(|cells| cells.first() == Some(&label))
        .unwrap_or_else(|| panic!("no row '{}' in output:\n{}", label, session.output()))
}

/// Compile one loop block on its own, without running it
pub fn compile_block(source: &str) -> Loop {
    let mut compiler = LoopCompiler::new();
    for (n, line) in source.lines().enumerate() {
        match compiler.feed(n + 1, line) {
            Ok(Compiled::Ready(lp)) => return lp,
            Ok(Compiled::Pending) => {}
            Err(e) => panic!("compile failed: {}\n--- block ---\n{}", e, source),
        }
    }
    panic!("block is not closed:\n{}", source)
}

/// Seeded runtime with captured output, for driving a compiled loop directly
pub fn test_runtime() -> Runtime {
    let config = test_config();
    Runtime::new(
        Workspace::new(config.runtime.random_seed),
        Printer::capture(),
        Limits::from(&config),
    )
}
