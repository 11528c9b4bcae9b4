//! The contract between the console and the interpreter engine it hosts.
//!
//! An [`Engine`] creates one [`ExecutionContext`] per session, bound to the
//! [`Host`](crate::host::Host) that answers its callbacks. Each command runs
//! through its own [`ExecutionHandle`]: a small pipeline of steps that is
//! invoked once and then disposed.

pub mod shell;

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::error::Result;
use crate::host::Host;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotSpecified,
    InvalidOperation,
    OperationStopped,
    ResourceUnavailable,
}

impl Display for ErrorCategory {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(match self {
            ErrorCategory::NotSpecified => "NotSpecified",
            ErrorCategory::InvalidOperation => "InvalidOperation",
            ErrorCategory::OperationStopped => "OperationStopped",
            ErrorCategory::ResourceUnavailable => "ResourceUnavailable",
        })
    }
}

/// A structured fault raised by the engine while running a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub message: String,
    pub error_id: String,
    pub category: ErrorCategory,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>, error_id: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            message: message.into(),
            error_id: error_id.into(),
            category,
        }
    }
}

impl Display for ErrorRecord {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.message)
    }
}

/// An object flowing through a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Error(ErrorRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStep {
    /// Script text run by the engine.
    Script(String),
    /// Writes every object reaching it to the host's output.
    DefaultOutput,
    /// Emits the objects passed to [`ExecutionHandle::invoke`].
    Input,
    /// Renders every object as the engine would display it.
    FormatString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

pub trait Engine: Send + Sync {
    /// Creates an execution context whose callbacks are answered by `host`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot create a context.
    fn create_context(&self, host: Arc<dyn Host>) -> Result<Box<dyn ExecutionContext>>;
}

pub trait ExecutionContext: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the context cannot be opened.
    fn open(&self) -> Result<()>;

    /// Whether this context was handed over from another machine.
    fn is_pushed(&self) -> bool;

    fn computer_name(&self) -> String;

    /// # Errors
    ///
    /// Returns an error if the context is not open.
    fn create_handle(&self) -> Result<Arc<dyn ExecutionHandle>>;
}

/// One command invocation. Shared between the thread running it and the
/// thread that may stop it.
pub trait ExecutionHandle: Send + Sync {
    fn add_step(&self, step: PipelineStep);

    /// Sends error output through the same ordered stream as regular output.
    fn merge_errors_into_output(&self);

    /// Runs the pipeline to completion on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`](crate::error::Error::Runtime) when the
    /// script faults or is stopped.
    fn invoke(&self, input: Vec<Value>) -> Result<Vec<Value>>;

    fn state(&self) -> InvocationState;

    /// Requests a running invocation to stop. Does not wait for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the stop request could not be delivered.
    fn stop(&self) -> Result<()>;

    fn dispose(&self);
}
