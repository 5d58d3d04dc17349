//! Loop engine
//!
//! `loop ... endloop` blocks are compiled into a tree of `Loop` values (see
//! `compiler`) and then driven by the iteration state machine in
//! `exec_loop`. A loop owns its command buffer, its controllers, its
//! progressive trackers and its nested children; nested loops are reached by
//! position, never by re-parsing.

mod cancel;
mod command;
mod compiler;
mod controller;
mod exec_loop;
mod flow;
mod progressive;
mod substitute;

#[cfg(test)]
mod tests;

pub use cancel::{CancelFn, CancelPoll, NeverCancel};
pub use command::{CommandBuffer, CommandFlags, CommandKind, CommandRecord};
pub use compiler::{Compiled, LoopCompiler};
pub use controller::Controller;
pub use exec_loop::execute;
pub use flow::IfStack;
pub use progressive::{Accumulator, CompensatedMoments, DoubleDouble, Moments, Role, Summary};
pub use substitute::{substitute, Marker};

use super::parser::{LoopHeader, LoopOptions, LoopSpec};
use progressive::Trackers;

/* ===================== Loop Tree ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Count,
    While,
    Index,
    Dated,
    For,
    Each,
}

impl LoopKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopKind::Count => "count",
            LoopKind::While => "while",
            LoopKind::Index => "index",
            LoopKind::Dated => "dated",
            LoopKind::For => "for",
            LoopKind::Each => "foreach",
        }
    }

    /// Kinds that bind an index variable and publish a marker
    pub fn has_marker(&self) -> bool {
        matches!(self, LoopKind::Index | LoopKind::Dated | LoopKind::Each)
    }
}

/// Iteration state of the current run; rebuilt at every top-of-loop
#[derive(Debug, Clone, Default)]
struct RunState {
    /// Passes started so far
    iter: usize,
    itermax: usize,
    /// First index value and direction of index/dated loops
    start: i64,
    step: i64,
    /// Captured foreach members
    members: Vec<String>,
    /// Model serial at the start of the latest pass
    pass_serial: u64,
}

#[derive(Debug, Clone)]
pub struct Loop {
    pub kind: LoopKind,
    pub options: LoopOptions,
    pub header: String,
    pub lineno: usize,
    /// Nesting depth, 0 for an outermost loop
    pub level: usize,
    pub index_var: Option<String>,
    pub init: Controller,
    pub test: Controller,
    pub delta: Controller,
    pub final_: Controller,
    /// Unresolved foreach source words
    pub each_words: Vec<String>,
    pub commands: CommandBuffer,
    pub children: Vec<Loop>,
    pub has_conditional: bool,
    /// The body renames or reloads data; cached fragments are not trusted across entries
    pub renaming: bool,
    /// Kept alive by a function body for repeated execution
    pub attached: bool,
    state: RunState,
    trackers: Trackers,
}

impl Loop {
    /// Build an empty loop from its parsed header; `outer` are the index
    /// variables of the enclosing loops
    pub fn new(lineno: usize, text: &str, header: LoopHeader, level: usize, outer: &[String]) -> Loop {
        let markers = || outer.iter().map(String::as_str);
        let mut lp = Loop {
            kind: LoopKind::Count,
            options: header.options,
            header: text.trim().to_string(),
            lineno,
            level,
            index_var: None,
            init: Controller::Unset,
            test: Controller::Unset,
            delta: Controller::Unset,
            final_: Controller::Unset,
            each_words: Vec::new(),
            commands: CommandBuffer::default(),
            children: Vec::new(),
            has_conditional: false,
            renaming: false,
            attached: false,
            state: RunState::default(),
            trackers: Trackers::new(),
        };
        match header.spec {
            LoopSpec::Count { times } => {
                lp.final_ = Controller::parse(&times, markers());
            }
            LoopSpec::While { condition } => {
                lp.kind = LoopKind::While;
                lp.test = Controller::parse(&condition, markers());
            }
            LoopSpec::Range {
                var,
                start,
                end,
                dated,
            } => {
                if dated {
                    lp.kind = LoopKind::Dated;
                    lp.init = Controller::Date(start);
                    lp.final_ = Controller::Date(end);
                } else {
                    lp.kind = LoopKind::Index;
                    lp.init = Controller::parse(&start, markers());
                    lp.final_ = Controller::parse(&end, markers());
                }
                lp.index_var = Some(var);
            }
            LoopSpec::For { init, test, delta } => {
                lp.kind = LoopKind::For;
                if let Some(init) = init {
                    lp.init = Controller::parse(&init, markers());
                }
                lp.test = Controller::parse(&test, markers());
                if let Some(delta) = delta {
                    lp.delta = Controller::parse(&delta, markers());
                }
            }
            LoopSpec::Each { var, words } => {
                lp.kind = LoopKind::Each;
                lp.index_var = Some(var);
                lp.each_words = words;
            }
        }
        lp
    }

    pub fn is_progressive(&self) -> bool {
        self.options.progressive
    }

    /// Passes started by the latest run
    pub fn iterations(&self) -> usize {
        self.state.iter
    }

    /// Mark this loop and its descendants as owned by a function body
    pub fn attach(&mut self) {
        self.attached = true;
        for child in &mut self.children {
            child.attach();
        }
    }

    /// Free per-run state throughout the tree; compiled state is kept
    pub fn release(&mut self) {
        self.state.members = Vec::new();
        for child in &mut self.children {
            child.release();
        }
    }

    /// Progressive summaries of the line at `index` in the command buffer
    pub fn summaries(&self, index: usize) -> Option<Vec<Summary>> {
        match self.trackers.get(&index)? {
            progressive::Tracker::Print(acc) => Some(acc.finalize()),
            progressive::Tracker::Model { coeff, .. } => Some(coeff.finalize()),
            progressive::Tracker::Store(_) => None,
        }
    }

    /// Drop cached fragments throughout the tree
    pub fn invalidate(&mut self) {
        for c in [&mut self.init, &mut self.test, &mut self.delta, &mut self.final_] {
            c.invalidate();
        }
        self.commands.invalidate();
        for child in &mut self.children {
            child.invalidate();
        }
    }
}
