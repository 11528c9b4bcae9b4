//! The read-execute loop around one execution context.
//!
//! [`InteractiveSession`] serializes command execution: at most one
//! [`ExecutionHandle`] is live at a time, and it is only set, cleared and
//! disposed under the lock the Ctrl-C path uses to stop it. Runtime faults
//! never escape [`InteractiveSession::execute`]; they are formatted by the
//! engine itself and written as error text.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::controller::DEFAULT_PROMPT_MARKER;
use crate::engine::{
    Engine, ErrorRecord, ExecutionContext, ExecutionHandle, InvocationState, PipelineStep, Value,
};
use crate::error::{Error, Result};
use crate::host::{ConsoleHost, ConsoleHostUi, Host, HostUi};
use crate::keys::KeyEvent;
use crate::status::MessageSink;

/// Sleep between checks for a submitted line.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Executing,
    Cancelled,
    Terminated,
}

#[derive(Debug, Default)]
struct ExitState {
    should_exit: bool,
    exit_code: i32,
}

/// Exit request shared by the loop, the Ctrl-C path and the host.
#[derive(Debug, Default)]
pub struct SessionState {
    inner: Mutex<ExitState>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_exit(&self) -> bool {
        self.inner.lock().should_exit
    }

    pub fn set_should_exit(&self, should_exit: bool) {
        self.inner.lock().should_exit = should_exit;
    }

    pub fn exit_code(&self) -> i32 {
        self.inner.lock().exit_code
    }

    pub fn request_exit(&self, exit_code: i32) {
        let mut inner = self.inner.lock();
        inner.should_exit = true;
        inner.exit_code = exit_code;
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    /// Commands run once when the session starts.
    pub profile: Vec<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            profile: Vec::new(),
        }
    }
}

pub struct InteractiveSession {
    host: Arc<ConsoleHost>,
    context: Box<dyn ExecutionContext>,
    options: SessionOptions,
    exec_lock: Mutex<()>,
    current: Mutex<Option<Arc<dyn ExecutionHandle>>>,
    phase: Mutex<SessionPhase>,
}

impl InteractiveSession {
    /// Opens an execution context bound to `host` and runs the profile commands.
    ///
    /// A failing profile is shown through `message_sink` and does not fail construction.
    ///
    /// # Errors
    ///
    /// Returns an error if the context cannot be created or opened.
    pub fn new(
        engine: &dyn Engine,
        host: Arc<ConsoleHost>,
        message_sink: Option<Arc<dyn MessageSink>>,
        options: SessionOptions,
    ) -> Result<Self> {
        let engine_host: Arc<dyn Host> = host.clone();
        let context = engine.create_context(engine_host)?;
        context.open()?;
        info!("Session opened on {}", context.computer_name());

        let session = Self {
            host,
            context,
            options,
            exec_lock: Mutex::new(()),
            current: Mutex::new(None),
            phase: Mutex::new(SessionPhase::Idle),
        };

        if let Err(e) = session.run_profile() {
            error!("Profile failed: {}", e);
            if let Some(sink) = message_sink {
                sink.show_error("Session startup failed", &e.to_string());
            }
        }

        Ok(session)
    }

    pub fn host(&self) -> &Arc<ConsoleHost> {
        &self.host
    }

    pub fn state(&self) -> &SessionState {
        self.host.state()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock()
    }

    /// Whether a command invocation is currently live.
    pub fn has_current_handle(&self) -> bool {
        self.current.lock().is_some()
    }

    /// `PS>`, or `[name] PS>` when the context was handed over from another machine.
    pub fn prompt_marker(&self) -> String {
        if self.context.is_pushed() {
            format!("[{}] {DEFAULT_PROMPT_MARKER}", self.context.computer_name())
        } else {
            DEFAULT_PROMPT_MARKER.to_string()
        }
    }

    fn ui(&self) -> &ConsoleHostUi {
        self.host.console_ui()
    }

    fn set_phase(&self, phase: SessionPhase) {
        debug!("Session phase: {:?}", phase);
        *self.phase.lock() = phase;
    }

    fn run_profile(&self) -> Result<()> {
        if self.options.profile.is_empty() {
            return Ok(());
        }

        let _exec = self.exec_lock.lock();
        let handle = self.context.create_handle()?;
        *self.current.lock() = Some(handle.clone());

        handle.add_step(PipelineStep::Script(self.options.profile.join("\n")));
        handle.add_step(PipelineStep::DefaultOutput);
        let result = handle.invoke(Vec::new());

        self.release(&handle);
        result.map(|_| ())
    }

    /// Runs one command and writes the prompt afterwards.
    ///
    /// Blank input is ignored.
    ///
    /// # Errors
    ///
    /// Runtime faults are rendered and not returned. Any other failure is
    /// rendered as an error line and returned.
    pub fn execute(&self, command: &str) -> Result<()> {
        self.execute_with_input(command, None)
    }

    /// Like [`Self::execute`], with one object piped into the command.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub fn execute_with_input(&self, command: &str, input: Option<Value>) -> Result<()> {
        let command = command.trim();
        if command.is_empty() {
            return Ok(());
        }

        let result = {
            let _exec = self.exec_lock.lock();
            self.ui().cancel_token().reset();
            self.set_phase(SessionPhase::Executing);
            info!("Executing {:?}", command);

            let result = match self.invoke_command(command, input) {
                Ok(()) => Ok(()),
                Err(Error::Runtime(record)) => {
                    self.report_exception(&record);
                    Ok(())
                }
                Err(e) => {
                    error!("Command failed: {}", e);
                    if let Err(write_error) = self.ui().write_error_line(&e.to_string()) {
                        warn!("Failed to write error: {}", write_error);
                    }
                    Err(e)
                }
            };

            self.set_phase(SessionPhase::Idle);
            result
        };

        if let Err(e) = self.ui().write_prompt() {
            warn!("Failed to write prompt: {}", e);
        }
        result
    }

    fn invoke_command(&self, command: &str, input: Option<Value>) -> Result<()> {
        let handle = self.context.create_handle()?;
        *self.current.lock() = Some(handle.clone());

        handle.add_step(PipelineStep::Script(command.to_string()));
        handle.add_step(PipelineStep::DefaultOutput);
        handle.merge_errors_into_output();
        let result = handle.invoke(input.into_iter().collect());

        self.release(&handle);
        result.map(|_| ())
    }

    fn release(&self, handle: &Arc<dyn ExecutionHandle>) {
        let mut current = self.current.lock();
        current.take();
        handle.dispose();
    }

    /// Formats `record` through the engine and writes it as an error line.
    fn report_exception(&self, record: &ErrorRecord) {
        warn!("Runtime fault: {}", record.message);

        let text = match self.format_error(record) {
            Ok(Some(text)) => text,
            Ok(None) => record.message.clone(),
            Err(e) => {
                debug!("Error formatting failed: {}", e);
                record.message.clone()
            }
        };

        if let Err(e) = self.ui().write_error_line(text.trim_end_matches(['\r', '\n'])) {
            warn!("Failed to write error: {}", e);
        }
    }

    fn format_error(&self, record: &ErrorRecord) -> Result<Option<String>> {
        let handle = self.context.create_handle()?;
        handle.add_step(PipelineStep::Input);
        handle.add_step(PipelineStep::FormatString);
        let output = handle.invoke(vec![Value::Error(record.clone())]);
        handle.dispose();

        Ok(output?.into_iter().find_map(|value| match value {
            Value::Text(text) => Some(text),
            Value::Error(_) => None,
        }))
    }

    /// Stops the running command, if any, and ends the session.
    pub fn cancel_current(&self) {
        let stop_result = {
            let current = self.current.lock();
            match current.as_ref() {
                Some(handle) if handle.state() == InvocationState::Running => {
                    info!("Stopping the current command");
                    self.set_phase(SessionPhase::Cancelled);
                    handle.stop()
                }
                _ => Ok(()),
            }
        };

        self.state().set_should_exit(true);
        self.ui().cancel_token().cancel();

        if let Err(e) = stop_result {
            error!("Failed to stop the current command: {}", e);
            if let Err(write_error) = self.ui().write_error_line(&e.to_string()) {
                warn!("Failed to write error: {}", write_error);
            }
        }
    }

    /// Runs the read-execute loop until an exit is requested. Returns the exit code.
    pub fn run(&self) -> i32 {
        let marker = self.prompt_marker();
        self.ui().set_prompt_marker(&marker);
        let keys = self.ui().controller().subscribe_keys();
        info!("Session loop started");

        thread::scope(|scope| {
            let listener = thread::Builder::new()
                .name("cancel-listener".to_string())
                .spawn_scoped(scope, move || self.listen_for_cancel(&keys));
            if let Err(e) = listener {
                error!("Failed to spawn cancel listener: {}", e);
            }

            if let Err(e) = self.ui().ensure_prompt() {
                warn!("Failed to write prompt: {}", e);
            }

            while !self.state().should_exit() {
                thread::sleep(self.options.poll_interval);

                match self.ui().controller().try_read_line(&marker) {
                    Ok(Some(line)) if line.trim().is_empty() => {
                        if let Err(e) = self.ui().write_prompt() {
                            warn!("Failed to write prompt: {}", e);
                        }
                    }
                    Ok(Some(line)) => {
                        if let Err(e) = self.execute(&line) {
                            debug!("Command ended with error: {}", e);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("Surface unavailable, ending session: {}", e);
                        self.state().set_should_exit(true);
                    }
                }
            }
        });

        self.set_phase(SessionPhase::Terminated);
        let exit_code = self.state().exit_code();
        info!("Session loop finished with exit code {}", exit_code);
        exit_code
    }

    fn listen_for_cancel(&self, keys: &Receiver<KeyEvent>) {
        while !self.state().should_exit() {
            match keys.recv_timeout(self.options.poll_interval) {
                Ok(KeyEvent::CtrlC) => self.cancel_current(),
                Ok(KeyEvent::Enter) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("Cancel listener stopped");
    }
}
