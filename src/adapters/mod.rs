//! Foreign adapters
//!
//! Adapters expose host libraries as native opcodes registered in an
//! [`OpcodeTable`](crate::opcodes::OpcodeTable). They read and write the arena only
//! through [`OpContext`](crate::opcodes::OpContext). Anything a host wants to run on
//! the evaluator (callbacks into user functions) goes through a [`CallbackQueue`],
//! which the VM drains on its own thread between nodes.

pub mod window;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// A user-function invocation requested by an adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCallback {
    /// Package of the target function
    pub package: String,
    /// Name of the target function
    pub function: String,
    /// Arguments, each already encoded to the width of the matching parameter
    pub args: Vec<Vec<u8>>,
}

/// Thread-safe FIFO of pending callbacks, shared between adapters and the VM
#[derive(Debug, Clone, Default)]
pub struct CallbackQueue {
    inner: Arc<Mutex<VecDeque<PendingCallback>>>,
}

impl CallbackQueue {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a callback; may be called from any thread
    pub fn push(&self, callback: PendingCallback) {
        self.inner.lock().push_back(callback);
    }

    /// Removes and returns everything queued so far, oldest first
    pub fn drain(&self) -> Vec<PendingCallback> {
        self.inner.lock().drain(..).collect()
    }

    /// Number of queued callbacks
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Is the queue empty?
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
