//! Conditional flow state
//!
//! One frame per open `if`. While the innermost frame is inactive, body
//! statements are skipped without evaluation; only `if`/`elif`/`else`/`endif`
//! are looked at, so nesting stays balanced.

use super::super::errors::FlowError;

#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Whether the enclosing block was running when this `if` opened
    parent_active: bool,
    /// A branch of this block has already been taken
    taken: bool,
    active: bool,
    seen_else: bool,
}

#[derive(Debug, Default)]
pub struct IfStack {
    frames: Vec<Frame>,
}

impl IfStack {
    pub fn is_active(&self) -> bool {
        self.frames.last().map_or(true, |f| f.active)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// `if` seen while active, with its evaluated condition
    pub fn open(&mut self, cond: bool) {
        self.frames.push(Frame {
            parent_active: true,
            taken: cond,
            active: cond,
            seen_else: false,
        });
    }

    /// `if` seen inside a skipped block: the condition is not evaluated
    pub fn open_dead(&mut self) {
        self.frames.push(Frame {
            parent_active: false,
            taken: true,
            active: false,
            seen_else: false,
        });
    }

    /// Whether an `elif` at this point needs its condition evaluated
    pub fn elif_pending(&self) -> Result<bool, FlowError> {
        let frame = self.frames.last().ok_or(FlowError::Unmatched("elif"))?;
        if frame.seen_else {
            return Err(FlowError::AfterElse("elif"));
        }
        Ok(frame.parent_active && !frame.taken)
    }

    /// Apply an `elif`; `cond` is ignored unless `elif_pending` said it was needed
    pub fn elif(&mut self, cond: bool) -> Result<(), FlowError> {
        let pending = self.elif_pending()?;
        let frame = self.frames.last_mut().ok_or(FlowError::Unmatched("elif"))?;
        frame.active = pending && cond;
        frame.taken |= frame.active;
        Ok(())
    }

    pub fn flip(&mut self) -> Result<(), FlowError> {
        let frame = self.frames.last_mut().ok_or(FlowError::Unmatched("else"))?;
        if frame.seen_else {
            return Err(FlowError::AfterElse("else"));
        }
        frame.seen_else = true;
        frame.active = frame.parent_active && !frame.taken;
        frame.taken = true;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), FlowError> {
        self.frames.pop().map(|_| ()).ok_or(FlowError::Unmatched("endif"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_if_elif_else_takes_one_branch() {
        let mut flow = IfStack::default();
        flow.open(false);
        assert!(!flow.is_active());
        assert!(flow.elif_pending().unwrap());
        flow.elif(true).unwrap();
        assert!(flow.is_active());
        assert!(!flow.elif_pending().unwrap());
        flow.elif(true).unwrap();
        assert!(!flow.is_active());
        flow.flip().unwrap();
        assert!(!flow.is_active());
        flow.close().unwrap();
        assert!(flow.is_active());
    }

    #[test]
    fn test_dead_blocks_stay_dead() {
        let mut flow = IfStack::default();
        flow.open(false);
        flow.open_dead();
        assert!(!flow.elif_pending().unwrap());
        flow.flip().unwrap();
        assert!(!flow.is_active());
        flow.close().unwrap();
        flow.flip().unwrap();
        assert!(flow.is_active());
    }

    #[test]
    fn test_unbalanced_blocks_are_errors() {
        let mut flow = IfStack::default();
        assert_eq!(flow.close(), Err(FlowError::Unmatched("endif")));
        assert_eq!(flow.flip(), Err(FlowError::Unmatched("else")));
        flow.open(true);
        flow.flip().unwrap();
        assert_eq!(flow.flip(), Err(FlowError::AfterElse("else")));
        assert_eq!(flow.elif(true), Err(FlowError::AfterElse("elif")));
    }
}
