//! Key events passed from the surface to its consumers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Events the controller broadcasts to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    CtrlC,
    Enter,
}

/// A key press as classified by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    Enter,
    Backspace,
    CtrlC,
    Other,
}

/// Cooperative cancellation shared between a waiter and whoever may interrupt it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
