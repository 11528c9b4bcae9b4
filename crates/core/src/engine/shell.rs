//! An engine that runs each script through a system shell.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::DEFAULT_SHELL;
use crate::engine::{
    Engine, ErrorCategory, ErrorRecord, ExecutionContext, ExecutionHandle, InvocationState,
    PipelineStep, Value,
};
use crate::error::{Error, Result};
use crate::host::Host;

/// How often a finished pipeline checks whether its shell has exited.
const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[cfg(unix)]
mod unix_process {
    use std::io;

    use libc::{c_int, pid_t};

    pub use libc::SIGKILL;

    /// Sends `signal` to every process in the group led by `pgid`.
    pub fn kill_process_group(pgid: u32, signal: c_int) -> io::Result<()> {
        let pgid = pid_t::try_from(pgid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // Safety: kill() takes no pointers. A negative pid targets the group.
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

pub struct ShellEngine {
    shell: String,
    remote_name: Option<String>,
}

impl Default for ShellEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl ShellEngine {
    pub fn new(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
            remote_name: None,
        }
    }

    /// Marks contexts as pushed from `computer_name`, which changes the prompt.
    #[must_use]
    pub fn with_remote_name(mut self, computer_name: &str) -> Self {
        self.remote_name = Some(computer_name.to_string());
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl Engine for ShellEngine {
    fn create_context(&self, host: Arc<dyn Host>) -> Result<Box<dyn ExecutionContext>> {
        Ok(Box::new(ShellContext {
            shell: self.shell.clone(),
            remote_name: self.remote_name.clone(),
            host,
            opened: AtomicBool::new(false),
        }))
    }
}

struct ShellContext {
    shell: String,
    remote_name: Option<String>,
    host: Arc<dyn Host>,
    opened: AtomicBool,
}

impl ExecutionContext for ShellContext {
    fn open(&self) -> Result<()> {
        info!("Opening shell context using {}", self.shell);
        self.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_pushed(&self) -> bool {
        self.remote_name.is_some()
    }

    fn computer_name(&self) -> String {
        self.remote_name
            .clone()
            .unwrap_or_else(|| "localhost".to_string())
    }

    fn create_handle(&self) -> Result<Arc<dyn ExecutionHandle>> {
        if !self.opened.load(Ordering::SeqCst) {
            return Err(Error::Misc("The execution context is not open".to_string()));
        }
        Ok(Arc::new(ShellHandle::new(&self.shell, self.host.clone())))
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Out,
    Err,
}

pub struct ShellHandle {
    shell: String,
    host: Arc<dyn Host>,
    steps: Mutex<Vec<PipelineStep>>,
    merge_errors: AtomicBool,
    state: Mutex<InvocationState>,
    child: Mutex<Option<Child>>,
    stop_requested: AtomicBool,
}

impl ShellHandle {
    fn new(shell: &str, host: Arc<dyn Host>) -> Self {
        Self {
            shell: shell.to_string(),
            host,
            steps: Mutex::new(Vec::new()),
            merge_errors: AtomicBool::new(false),
            state: Mutex::new(InvocationState::NotStarted),
            child: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        }
    }

    fn set_state(&self, state: InvocationState) {
        *self.state.lock() = state;
    }

    fn run_pipeline(&self, steps: &[PipelineStep], input: Vec<Value>) -> Result<Vec<Value>> {
        let mut current = Vec::new();
        let mut input = Some(input);

        for (index, step) in steps.iter().enumerate() {
            match step {
                PipelineStep::Input => {
                    current = input.take().unwrap_or_default();
                }
                PipelineStep::Script(script) => {
                    let streams_to_host =
                        steps.get(index + 1) == Some(&PipelineStep::DefaultOutput);
                    current = self.run_script(script, streams_to_host)?;
                }
                PipelineStep::DefaultOutput => {
                    for value in current.drain(..) {
                        self.write_value(&value)?;
                    }
                }
                PipelineStep::FormatString => {
                    current = current
                        .into_iter()
                        .map(|value| Value::Text(format_value(&value)))
                        .collect();
                }
            }
        }

        Ok(current)
    }

    fn write_value(&self, value: &Value) -> Result<()> {
        match value {
            Value::Text(text) => self.host.ui().write_line(text),
            Value::Error(record) => self.host.ui().write_error_line(&record.message),
        }
    }

    fn run_script(&self, script: &str, streams_to_host: bool) -> Result<Vec<Value>> {
        if let Some(exit_code) = parse_exit(script) {
            info!("Script requested exit with code {}", exit_code);
            self.host.set_should_exit(exit_code);
            return Ok(Vec::new());
        }

        debug!("Running `{} -c {}`", self.shell, script);
        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // The shell leads its own group so a stop reaches everything it started.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            Error::Runtime(ErrorRecord::new(
                format!("Failed to start {}: {e}", self.shell),
                "ShellStartFailed",
                ErrorCategory::ResourceUnavailable,
            ))
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *self.child.lock() = Some(child);

        // A stop may have arrived before the child was stored.
        if self.stop_requested.load(Ordering::SeqCst) {
            self.kill_child();
        }

        let merge_errors = self.merge_errors.load(Ordering::SeqCst);
        let mut produced = Vec::new();
        let mut write_result = Ok(());

        thread::scope(|scope| {
            let (sender, receiver) = mpsc::channel();
            if let Some(stdout) = stdout {
                let sender = sender.clone();
                scope.spawn(move || forward_lines(stdout, Stream::Out, &sender));
            }
            if let Some(stderr) = stderr {
                let sender = sender.clone();
                scope.spawn(move || forward_lines(stderr, Stream::Err, &sender));
            }
            drop(sender);

            for (stream, line) in receiver {
                let value = match stream {
                    Stream::Out => Value::Text(line),
                    Stream::Err if merge_errors => Value::Error(ErrorRecord::new(
                        line,
                        "NativeCommandError",
                        ErrorCategory::NotSpecified,
                    )),
                    Stream::Err => {
                        warn!("stderr: {}", line);
                        continue;
                    }
                };

                if streams_to_host {
                    if write_result.is_ok() {
                        write_result = self.write_value(&value);
                    }
                } else {
                    produced.push(value);
                }
            }
        });

        let status = self.wait_for_child()?;

        if self.stop_requested.load(Ordering::SeqCst) {
            return Err(Error::Runtime(ErrorRecord::new(
                "The pipeline has been stopped.",
                "PipelineStopped",
                ErrorCategory::OperationStopped,
            )));
        }
        write_result?;

        match status {
            Some(status) if !status.success() => Err(Error::Runtime(ErrorRecord::new(
                match status.code() {
                    Some(code) => format!("The command exited with status {code}."),
                    None => "The command was terminated by a signal.".to_string(),
                },
                "NativeCommandFailed",
                ErrorCategory::NotSpecified,
            ))),
            _ => Ok(produced),
        }
    }

    /// Reaps the shell. The lock is only held for each `try_wait`, so a stop
    /// can still reach the child while it runs on with its pipes closed.
    fn wait_for_child(&self) -> Result<Option<ExitStatus>> {
        loop {
            {
                let mut child = self.child.lock();
                let Some(running) = child.as_mut() else {
                    return Ok(None);
                };
                if let Some(status) = running.try_wait()? {
                    child.take();
                    return Ok(Some(status));
                }
            }
            thread::sleep(CHILD_POLL_INTERVAL);
        }
    }

    /// Kills the shell and everything it started. The child has not been
    /// reaped yet, so its pid still names the group.
    fn kill_child(&self) {
        let mut guard = self.child.lock();
        let Some(child) = guard.as_mut() else {
            return;
        };

        #[cfg(unix)]
        let result = unix_process::kill_process_group(child.id(), unix_process::SIGKILL);
        #[cfg(not(unix))]
        let result = child.kill();

        match result {
            Ok(()) => debug!("Killed process group {}", child.id()),
            Err(e) => debug!("Failed to kill process group {}: {}", child.id(), e),
        }
    }
}

impl ExecutionHandle for ShellHandle {
    fn add_step(&self, step: PipelineStep) {
        self.steps.lock().push(step);
    }

    fn merge_errors_into_output(&self) {
        self.merge_errors.store(true, Ordering::SeqCst);
    }

    fn invoke(&self, input: Vec<Value>) -> Result<Vec<Value>> {
        let steps = self.steps.lock().clone();
        if steps.is_empty() {
            return Err(Error::InvalidArgument("The pipeline has no steps".to_string()));
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        self.set_state(InvocationState::Running);

        let result = self.run_pipeline(&steps, input);
        self.set_state(match &result {
            Ok(_) => InvocationState::Completed,
            Err(_) if self.stop_requested.load(Ordering::SeqCst) => InvocationState::Stopped,
            Err(_) => InvocationState::Failed,
        });
        result
    }

    fn state(&self) -> InvocationState {
        *self.state.lock()
    }

    fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != InvocationState::Running {
                return Ok(());
            }
            *state = InvocationState::Stopping;
        }
        info!("Stopping the running pipeline");
        self.stop_requested.store(true, Ordering::SeqCst);
        self.kill_child();
        Ok(())
    }

    fn dispose(&self) {
        self.kill_child();
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            if let Err(e) = child.wait() {
                debug!("Failed to reap child process: {}", e);
            }
        }
        self.steps.lock().clear();
    }
}

fn forward_lines(reader: impl Read, stream: Stream, sender: &mpsc::Sender<(Stream, String)>) {
    for line in BufReader::new(reader).lines() {
        let Ok(line) = line else {
            break;
        };
        if sender.send((stream, line)).is_err() {
            break;
        }
    }
}

/// The exit code requested by an `exit` builtin, if `script` is one.
fn parse_exit(script: &str) -> Option<i32> {
    let mut words = script.split_whitespace();
    if words.next()? != "exit" {
        return None;
    }
    match (words.next(), words.next()) {
        (None, _) => Some(0),
        (Some(code), None) => code.parse().ok(),
        _ => None,
    }
}

/// Renders a value the way the console displays it.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Text(text) => text.clone(),
        Value::Error(record) => format!(
            "{}\n    + CategoryInfo          : {}\n    + FullyQualifiedErrorId : {}\n",
            record.message, record.category, record.error_id
        ),
    }
}
