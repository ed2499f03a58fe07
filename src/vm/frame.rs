//! Call frames
//!
//! ```text
//! stack_start                                            stack_end
//! +-------------------+-------------------+--------------+
//! | frame 0           | frame 1           | free         |
//! | params|rets|locals| params|rets|locals|              |
//! +-------------------+-------------------+--------------+
//! ^ fp(0)             ^ fp(1) = fp(0) + frame_size(0)
//! ```

use crate::error::{Error, Result};
use crate::ir::FunctionRef;
use crate::memory::Offset;

/// One activation record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    /// Function being executed
    pub function: FunctionRef,
    /// Base offset of this frame's parameters and locals
    pub fp: Offset,
    /// Index of the next node to execute
    pub pc: usize,
    /// Frame pointer of the caller (the frame's own `fp` for entry frames)
    pub caller_fp: Offset,
    /// Bytes this frame occupies
    pub size: usize,
    /// When set, returning copies the return slots into the caller's current node outputs
    pub returns_to_caller: bool,
}

impl CallFrame {
    /// First byte past this frame
    pub fn end(&self) -> Offset {
        self.fp + self.size
    }
}

/// Stack of live call frames
#[derive(Debug, Clone)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    max_depth: usize,
}

impl CallStack {
    /// Creates an empty stack holding at most `max_depth` frames
    pub fn new(max_depth: usize) -> Self {
        CallStack {
            frames: Vec::new(),
            max_depth,
        }
    }

    /// Pushes a frame, failing when the depth limit is reached
    pub fn push(&mut self, frame: CallFrame) -> Result<()> {
        if self.frames.len() >= self.max_depth {
            return Err(Error::StackOverflow {
                depth: self.frames.len(),
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Pops the innermost frame
    pub fn pop(&mut self) -> Option<CallFrame> {
        self.frames.pop()
    }

    /// Innermost frame
    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Innermost frame, mutably
    pub fn top_mut(&mut self) -> Option<&mut CallFrame> {
        self.frames.last_mut()
    }

    /// Number of live frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Is the stack empty?
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drops every frame above `depth`
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    /// Offset where the next frame starts
    pub fn next_fp(&self, stack_start: Offset) -> Offset {
        self.top().map(CallFrame::end).unwrap_or(stack_start)
    }

    /// Functions on the stack, outermost first
    pub fn backtrace(&self) -> Vec<String> {
        self.frames.iter().map(|f| f.function.to_string()).collect()
    }
}
