//! Command buffer
//!
//! Body statements are stored verbatim in source order, each with a kind tag
//! fixed at compile time, a few per-line flags and an optional cached
//! fragment.

use super::super::errors::{ExecResult, LoopError};
use super::super::expr::Fragment;
use super::super::parser::{rest_of, Statement, StatementKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Nested loop, identified by its position among the parent's children
    Loop { child: usize },
    Break,
    Continue,
    If,
    Elif,
    Else,
    Endif,
    Print,
    Store,
    Model,
    Genr,
    Rename,
    Open,
    Ordinary,
}

impl CommandKind {
    pub fn from_statement(kind: StatementKind) -> CommandKind {
        match kind {
            StatementKind::Break => CommandKind::Break,
            StatementKind::Continue => CommandKind::Continue,
            StatementKind::If => CommandKind::If,
            StatementKind::Elif => CommandKind::Elif,
            StatementKind::Else => CommandKind::Else,
            StatementKind::Endif => CommandKind::Endif,
            StatementKind::Print => CommandKind::Print,
            StatementKind::Store => CommandKind::Store,
            StatementKind::Model => CommandKind::Model,
            StatementKind::Genr => CommandKind::Genr,
            StatementKind::Rename => CommandKind::Rename,
            StatementKind::Open => CommandKind::Open,
            // loop/endloop are consumed by the compiler
            StatementKind::Loop | StatementKind::EndLoop | StatementKind::Ordinary => CommandKind::Ordinary,
        }
    }

    /// Statements still looked at inside a skipped conditional block
    pub fn is_flow(&self) -> bool {
        matches!(
            self,
            CommandKind::If | CommandKind::Elif | CommandKind::Else | CommandKind::Endif
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandFlags {
    /// The text holds no marker; substitution is skipped
    pub substitution_free: bool,
    /// `print "..."`, never accumulated
    pub literal_print: bool,
    pub catch: bool,
}

#[derive(Debug, Clone)]
pub struct CommandRecord {
    pub lineno: usize,
    pub text: String,
    pub kind: CommandKind,
    pub flags: CommandFlags,
    pub fragment: Option<Fragment>,
}

impl CommandRecord {
    pub fn new(lineno: usize, stmt: Statement) -> CommandRecord {
        let kind = CommandKind::from_statement(stmt.kind);
        let flags = CommandFlags {
            substitution_free: !stmt.text.contains('$'),
            literal_print: kind == CommandKind::Print && rest_of(&stmt.text).starts_with('"'),
            catch: stmt.catch,
            ..CommandFlags::default()
        };
        CommandRecord {
            lineno,
            text: stmt.text,
            kind,
            flags,
            fragment: None,
        }
    }

    /// Record for a nested loop header
    pub fn nested(lineno: usize, text: &str, child: usize) -> CommandRecord {
        CommandRecord {
            lineno,
            text: text.trim().to_string(),
            kind: CommandKind::Loop { child },
            flags: CommandFlags {
                substitution_free: true,
                ..CommandFlags::default()
            },
            fragment: None,
        }
    }

    /// Text of the condition of an if/elif
    pub fn condition(text: &str) -> &str {
        rest_of(text)
    }
}

/// Ordered statement store of one loop
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    records: Vec<CommandRecord>,
}

impl CommandBuffer {
    pub fn push(&mut self, record: CommandRecord) -> ExecResult {
        self.records
            .try_reserve(1)
            .map_err(|e| LoopError::Resource(format!("loop command buffer: {}", e)))?;
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&CommandRecord> {
        self.records.get(i)
    }

    pub fn get_mut(&mut self, i: usize) -> Option<&mut CommandRecord> {
        self.records.get_mut(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommandRecord> {
        self.records.iter()
    }

    /// Drop cached fragments
    pub fn invalidate(&mut self) {
        for rec in &mut self.records {
            rec.fragment = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::parser::classify;

    #[test]
    fn test_record_flags() {
        let rec = CommandRecord::new(3, classify("print \"hello\""));
        assert_eq!(rec.kind, CommandKind::Print);
        assert!(rec.flags.literal_print);
        assert!(rec.flags.substitution_free);

        let rec = CommandRecord::new(4, classify("catch print x$i"));
        assert!(!rec.flags.literal_print);
        assert!(!rec.flags.substitution_free);
        assert!(rec.flags.catch);
    }

    #[test]
    fn test_buffer_keeps_order() {
        let mut buf = CommandBuffer::default();
        for (n, line) in ["a = 1", "b = 2", "break"].iter().enumerate() {
            buf.push(CommandRecord::new(n + 1, classify(line))).unwrap();
        }
        let texts: Vec<&str> = buf.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["a = 1", "b = 2", "break"]);
        assert_eq!(buf.get(2).map(|r| r.kind), Some(CommandKind::Break));
    }
}
