//! Shared fixtures: a headless console and a scripted engine.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use console_bridge_core::controller::TextSurfaceController;
use console_bridge_core::engine::{
    Engine, ErrorCategory, ErrorRecord, ExecutionContext, ExecutionHandle, InvocationState,
    PipelineStep, Value,
};
use console_bridge_core::error::{Error, Result};
use console_bridge_core::host::{ConsoleHost, ConsoleHostUi, Host};
use console_bridge_core::session::SessionState;
use console_bridge_core::status::MessageSink;
use console_bridge_core::surface::Surface;

pub const POLL: Duration = Duration::from_millis(5);

pub struct Console {
    pub surface: Surface,
    pub controller: Arc<TextSurfaceController>,
}

impl Console {
    pub fn new() -> Self {
        let surface = Surface::headless(80, 25).unwrap();
        let controller = Arc::new(TextSurfaceController::new(surface.handle()).unwrap());
        controller.set_print_delay(Duration::ZERO);
        Self {
            surface,
            controller,
        }
    }

    pub fn ui(&self) -> ConsoleHostUi {
        ConsoleHostUi::with_poll_interval(self.controller.clone(), POLL)
    }

    pub fn host(&self) -> Arc<ConsoleHost> {
        Arc::new(ConsoleHost::new(self.ui(), Arc::new(SessionState::new())))
    }

    pub fn text(&self) -> String {
        self.controller.text().unwrap()
    }

    /// Types `input` as the user would.
    pub fn type_text(&self, input: &str) {
        for ch in input.chars() {
            self.controller.type_char(ch).unwrap();
        }
    }

    pub fn wait_for(&self, condition: impl Fn(&str) -> bool) {
        wait_until(|| condition(&self.text()));
    }
}

pub fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        thread::sleep(Duration::from_millis(2));
    }
}

/// Records what the engine was asked to do and which scripts are blocked.
#[derive(Default)]
pub struct EngineCalls {
    pub scripts: Mutex<Vec<String>>,
    pub sleeping: AtomicBool,
    pub disposed: Mutex<usize>,
}

/// An engine whose scripts are keywords:
///
/// - `sleep` blocks until stopped
/// - `fail` raises a runtime fault
/// - `exit N` asks the host to exit
/// - anything else writes `ran <script>`
pub struct FakeEngine {
    pub calls: Arc<EngineCalls>,
    pub remote_name: Option<String>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(EngineCalls::default()),
            remote_name: None,
        }
    }
}

impl Engine for FakeEngine {
    fn create_context(&self, host: Arc<dyn Host>) -> Result<Box<dyn ExecutionContext>> {
        Ok(Box::new(FakeContext {
            host,
            calls: self.calls.clone(),
            remote_name: self.remote_name.clone(),
        }))
    }
}

struct FakeContext {
    host: Arc<dyn Host>,
    calls: Arc<EngineCalls>,
    remote_name: Option<String>,
}

impl ExecutionContext for FakeContext {
    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn is_pushed(&self) -> bool {
        self.remote_name.is_some()
    }

    fn computer_name(&self) -> String {
        self.remote_name.clone().unwrap_or_else(|| "localhost".to_string())
    }

    fn create_handle(&self) -> Result<Arc<dyn ExecutionHandle>> {
        Ok(Arc::new(FakeHandle {
            host: self.host.clone(),
            calls: self.calls.clone(),
            steps: Mutex::new(Vec::new()),
            state: Mutex::new(InvocationState::NotStarted),
            stop: AtomicBool::new(false),
        }))
    }
}

struct FakeHandle {
    host: Arc<dyn Host>,
    calls: Arc<EngineCalls>,
    steps: Mutex<Vec<PipelineStep>>,
    state: Mutex<InvocationState>,
    stop: AtomicBool,
}

impl FakeHandle {
    fn run_script(&self, script: &str) -> Result<()> {
        self.calls.scripts.lock().unwrap().push(script.to_string());

        if let Some(code) = script.strip_prefix("exit ") {
            self.host.set_should_exit(code.trim().parse().unwrap_or(0));
            return Ok(());
        }

        match script {
            "sleep" => {
                self.calls.sleeping.store(true, Ordering::SeqCst);
                while !self.stop.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(2));
                }
                self.calls.sleeping.store(false, Ordering::SeqCst);
                Err(Error::Runtime(ErrorRecord::new(
                    "The pipeline has been stopped.",
                    "PipelineStopped",
                    ErrorCategory::OperationStopped,
                )))
            }
            "fail" => Err(Error::Runtime(ErrorRecord::new(
                "it broke",
                "Broken",
                ErrorCategory::InvalidOperation,
            ))),
            other => self.host.ui().write_line(&format!("ran {other}")),
        }
    }
}

impl ExecutionHandle for FakeHandle {
    fn add_step(&self, step: PipelineStep) {
        self.steps.lock().unwrap().push(step);
    }

    fn merge_errors_into_output(&self) {}

    fn invoke(&self, input: Vec<Value>) -> Result<Vec<Value>> {
        *self.state.lock().unwrap() = InvocationState::Running;
        let steps = self.steps.lock().unwrap().clone();

        let mut current = Vec::new();
        let mut outcome = Ok(());
        for step in steps {
            match step {
                PipelineStep::Input => current = input.clone(),
                PipelineStep::Script(script) => {
                    outcome = self.run_script(&script);
                    if outcome.is_err() {
                        break;
                    }
                }
                PipelineStep::DefaultOutput => current.clear(),
                PipelineStep::FormatString => {
                    current = current
                        .into_iter()
                        .map(|value| match value {
                            Value::Error(record) => {
                                Value::Text(format!("formatted: {}\r\n", record.message))
                            }
                            text => text,
                        })
                        .collect();
                }
            }
        }

        *self.state.lock().unwrap() = match &outcome {
            Ok(()) => InvocationState::Completed,
            Err(_) => InvocationState::Failed,
        };
        outcome.map(|()| current)
    }

    fn state(&self) -> InvocationState {
        *self.state.lock().unwrap()
    }

    fn stop(&self) -> Result<()> {
        *self.state.lock().unwrap() = InvocationState::Stopping;
        self.stop.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn dispose(&self) {
        *self.calls.disposed.lock().unwrap() += 1;
    }
}

#[derive(Default)]
pub struct RecordingMessages {
    pub shown: Mutex<Vec<(String, String)>>,
}

impl MessageSink for RecordingMessages {
    fn show_error(&self, title: &str, message: &str) {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}
