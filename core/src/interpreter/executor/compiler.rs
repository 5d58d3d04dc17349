//! Loop compilation
//!
//! Lines are fed in one at a time while a loop is open. Nested headers push a
//! new loop on the stack and leave a positional reference in the parent's
//! buffer; `endloop` pops it into the parent's child list. When the outermost
//! loop closes, the finished tree is handed back for execution.

use tracing::debug;

use super::super::errors::{ExecResult, LoopError};
use super::super::parser::{classify, parse_header, ParseError, StatementKind};
use super::command::{CommandKind, CommandRecord};
use super::Loop;

#[derive(Debug)]
pub enum Compiled {
    /// Still inside a loop
    Pending,
    /// The outermost loop closed; the tree is complete
    Ready(Loop),
}

#[derive(Debug)]
struct Open {
    lp: Loop,
    /// Unclosed `if` blocks in this loop's body
    if_depth: usize,
}

#[derive(Debug, Default)]
pub struct LoopCompiler {
    stack: Vec<Open>,
}

impl LoopCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_compiling(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Discard the partially built tree
    pub fn abandon(&mut self) {
        if !self.stack.is_empty() {
            debug!(depth = self.stack.len(), "discarding partial loop");
        }
        self.stack.clear();
    }

    /// Route one line: headers open loops, `endloop` closes them, anything else is appended
    pub fn feed(&mut self, lineno: usize, line: &str) -> ExecResult<Compiled> {
        let result = self.feed_inner(lineno, line);
        if result.is_err() {
            self.abandon();
        }
        result
    }

    fn feed_inner(&mut self, lineno: usize, line: &str) -> ExecResult<Compiled> {
        let stmt = classify(line);
        match stmt.kind {
            StatementKind::Loop => {
                self.begin(lineno, &stmt.text)?;
                Ok(Compiled::Pending)
            }
            StatementKind::EndLoop => Ok(self.end(lineno)?),
            _ => {
                self.append(lineno, line)?;
                Ok(Compiled::Pending)
            }
        }
    }

    /// Open a loop, nested in the innermost open loop if there is one
    pub fn begin(&mut self, lineno: usize, text: &str) -> Result<(), ParseError> {
        let header = parse_header(text).map_err(|e| match e {
            ParseError::PestError(msg) | ParseError::BuildError(msg) => ParseError::BuildError(format!(
                "line {}: '{}': {}",
                lineno,
                text.trim(),
                msg
            )),
            other => other,
        })?;

        let outer: Vec<String> = self
            .stack
            .iter()
            .filter_map(|open| open.lp.index_var.clone())
            .collect();
        let lp = Loop::new(lineno, text, header, self.stack.len(), &outer);

        if lp.kind.has_marker() {
            if let Some(var) = &lp.index_var {
                if outer.contains(var) {
                    return Err(ParseError::IndexReuse {
                        line: lineno,
                        name: var.clone(),
                    });
                }
            }
        }

        if let Some(parent) = self.stack.last_mut() {
            // Earlier siblings are complete, so the new child lands at this position
            let child = parent.lp.children.len();
            parent
                .lp
                .commands
                .push(CommandRecord::nested(lineno, text, child))
                .map_err(|e| ParseError::BuildError(e.to_string()))?;
        }
        debug!(line = lineno, kind = lp.kind.as_str(), level = lp.level, "loop opened");
        self.stack.push(Open { lp, if_depth: 0 });
        Ok(())
    }

    /// Store a body statement in the innermost open loop
    pub fn append(&mut self, lineno: usize, line: &str) -> ExecResult {
        let open = self.stack.last_mut().ok_or_else(|| {
            LoopError::Parse(ParseError::Nesting {
                line: lineno,
                message: "statement outside of a loop".to_string(),
            })
        })?;
        let record = CommandRecord::new(lineno, classify(line));
        let nesting = |message: &str| {
            LoopError::Parse(ParseError::Nesting {
                line: lineno,
                message: message.to_string(),
            })
        };

        match record.kind {
            CommandKind::If => {
                open.if_depth += 1;
                open.lp.has_conditional = true;
            }
            CommandKind::Elif | CommandKind::Else if open.if_depth == 0 => {
                return Err(nesting("'elif'/'else' without a matching 'if'"));
            }
            CommandKind::Endif => {
                if open.if_depth == 0 {
                    return Err(nesting("'endif' without a matching 'if'"));
                }
                open.if_depth -= 1;
            }
            CommandKind::Store => {
                if !open.lp.is_progressive() {
                    return Err(nesting("'store' is only available in progressive loops"));
                }
                if open.lp.commands.iter().any(|r| r.kind == CommandKind::Store) {
                    return Err(nesting("only one 'store' is allowed per loop"));
                }
            }
            CommandKind::Rename | CommandKind::Open => open.lp.renaming = true,
            _ => {}
        }
        open.lp.commands.push(record)
    }

    /// Close the innermost open loop
    pub fn end(&mut self, lineno: usize) -> Result<Compiled, ParseError> {
        let open = self.stack.pop().ok_or(ParseError::Nesting {
            line: lineno,
            message: "'endloop' without a matching 'loop'".to_string(),
        })?;
        if open.if_depth > 0 {
            return Err(ParseError::Nesting {
                line: lineno,
                message: format!("{} unterminated 'if' block(s) in the loop body", open.if_depth),
            });
        }
        let lp = open.lp;
        debug!(line = lp.lineno, commands = lp.commands.len(), "loop closed");
        match self.stack.last_mut() {
            Some(parent) => {
                parent.lp.renaming |= lp.renaming;
                parent.lp.children.push(lp);
                Ok(Compiled::Pending)
            }
            None => Ok(Compiled::Ready(lp)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::executor::LoopKind;

    fn compile_all(lines: &[&str]) -> ExecResult<Loop> {
        let mut compiler = LoopCompiler::new();
        for (n, line) in lines.iter().enumerate() {
            if let Compiled::Ready(lp) = compiler.feed(n + 1, line)? {
                return Ok(lp);
            }
        }
        Err(LoopError::Parse(ParseError::Nesting {
            line: lines.len(),
            message: "unterminated".to_string(),
        }))
    }

    #[test]
    fn test_nested_tree_uses_positions() {
        let lp = compile_all(&[
            "loop i=1..2",
            "  loop 3",
            "    x = 1",
            "  endloop",
            "  loop foreach v a b",
            "  endloop",
            "endloop",
        ])
        .unwrap();

        assert_eq!(lp.kind, LoopKind::Index);
        assert_eq!(lp.children.len(), 2);
        let kinds: Vec<CommandKind> = lp.commands.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![CommandKind::Loop { child: 0 }, CommandKind::Loop { child: 1 }]
        );
        assert_eq!(lp.children[1].kind, LoopKind::Each);
        assert_eq!(lp.children[1].level, 1);
    }

    #[test]
    fn test_index_variable_reuse_is_rejected() {
        let err = compile_all(&["loop i=1..3", "loop i=1..2", "endloop", "endloop"]).unwrap_err();
        assert!(matches!(
            err,
            LoopError::Parse(ParseError::IndexReuse { line: 2, .. })
        ));

        let err = compile_all(&["loop foreach i a b", "loop i=1..2", "endloop", "endloop"]).unwrap_err();
        assert!(matches!(err, LoopError::Parse(ParseError::IndexReuse { .. })));
    }

    #[test]
    fn test_sibling_loops_may_share_an_index() {
        let lp = compile_all(&[
            "loop 2",
            "loop i=1..2",
            "endloop",
            "loop i=1..3",
            "endloop",
            "endloop",
        ])
        .unwrap();
        assert_eq!(lp.children.len(), 2);
    }

    #[test]
    fn test_unbalanced_conditionals_are_rejected() {
        assert!(compile_all(&["loop 2", "if 1", "endloop"]).is_err());
        assert!(compile_all(&["loop 2", "endif", "endloop"]).is_err());
        assert!(compile_all(&["loop 2", "else", "endloop"]).is_err());
    }

    #[test]
    fn test_store_rules() {
        assert!(compile_all(&["loop 2", "store a.csv x", "endloop"]).is_err());
        assert!(compile_all(&["loop 2 --progressive", "store a.csv x", "store b.csv x", "endloop"]).is_err());
        assert!(compile_all(&["loop 2 --progressive", "store a.csv x", "endloop"]).is_ok());
    }

    #[test]
    fn test_renaming_propagates_to_ancestors() {
        let lp = compile_all(&["loop 2", "loop 2", "rename a b", "endloop", "endloop"]).unwrap();
        assert!(lp.renaming);
        assert!(lp.children[0].renaming);
    }

    #[test]
    fn test_attach_marks_the_whole_tree() {
        let mut lp = compile_all(&["loop 2", "loop 2", "loop 2", "endloop", "endloop", "endloop"]).unwrap();
        assert!(!lp.attached);
        lp.attach();
        assert!(lp.attached);
        assert!(lp.children[0].attached);
        assert!(lp.children[0].children[0].attached);
    }

    #[test]
    fn test_errors_discard_the_partial_tree() {
        let mut compiler = LoopCompiler::new();
        compiler.feed(1, "loop 3").unwrap();
        assert!(compiler.feed(2, "loop while").is_err());
        assert!(!compiler.is_compiling());
        assert!(compiler.end(3).is_err());
    }
}
