//! The glue between a front end and one interactive session.
//!
//! An [`InteractiveControl`] owns no thread until
//! [`InteractiveControl::execute_asynchronously`] starts a session worker. The
//! front end feeds it classified key presses through
//! [`InteractiveControl::handle_key`] and listens for [`ControlEvent`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::controller::TextSurfaceController;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::host::console::DEFAULT_INPUT_POLL_INTERVAL;
use crate::host::{ConsoleHost, ConsoleHostUi};
use crate::keys::KeyInput;
use crate::session::{InteractiveSession, SessionOptions, SessionState};
use crate::status::{MessageSink, Status};

pub const BANNER: [&str; 3] = [
    "       Console Bridge Interactive Host",
    "    ==================================================",
    "       Interactivity activates after script execution.\n",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// The initial command finished; the prompt is live.
    CommandsDone,
    /// The session ended with this exit code.
    Finished(i32),
    VisibilityChanged(bool),
}

#[derive(Debug, Clone)]
pub struct ControlOptions {
    pub banner: bool,
    pub host_name: Option<String>,
    pub input_poll_interval: Duration,
    pub session: SessionOptions,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            banner: true,
            host_name: None,
            input_poll_interval: DEFAULT_INPUT_POLL_INTERVAL,
            session: SessionOptions::default(),
        }
    }
}

type Subscribers = Arc<Mutex<Vec<Sender<ControlEvent>>>>;

pub struct InteractiveControl {
    controller: Arc<TextSurfaceController>,
    engine: Arc<dyn Engine>,
    message_sink: Option<Arc<dyn MessageSink>>,
    options: ControlOptions,
    subscribers: Subscribers,
    visible: AtomicBool,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl InteractiveControl {
    pub fn new(
        controller: Arc<TextSurfaceController>,
        engine: Arc<dyn Engine>,
        options: ControlOptions,
    ) -> Self {
        Self {
            controller,
            engine,
            message_sink: None,
            options,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            visible: AtomicBool::new(true),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_message_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.message_sink = Some(sink);
        self
    }

    pub fn controller(&self) -> &Arc<TextSurfaceController> {
        &self.controller
    }

    pub fn subscribe_events(&self) -> Receiver<ControlEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Writes the welcome banner, unless disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    pub fn write_banner(&self) -> Result<()> {
        if !self.options.banner {
            return Ok(());
        }
        for line in BANNER {
            self.controller.write_delayed(line)?;
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts a session on a worker thread: runs `command`, then the read-execute loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionActive`] while a previous session still runs.
    pub fn execute_asynchronously(&self, command: &str) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::SessionActive);
        }
        self.join();

        let state = Arc::new(SessionState::new());
        let ui = ConsoleHostUi::with_poll_interval(
            self.controller.clone(),
            self.options.input_poll_interval,
        );
        let mut host = ConsoleHost::new(ui, state);
        if let Some(name) = &self.options.host_name {
            host = host.with_name(name);
        }
        let host = Arc::new(host);

        let worker = SessionWorker {
            controller: self.controller.clone(),
            engine: self.engine.clone(),
            message_sink: self.message_sink.clone(),
            options: self.options.session.clone(),
            subscribers: self.subscribers.clone(),
            command: command.to_string(),
            running: self.running.clone(),
        };

        let spawned = thread::Builder::new()
            .name("session".to_string())
            .spawn(move || worker.run(host));

        match spawned {
            Ok(join) => {
                *self.worker.lock() = Some(join);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(Error::Misc(format!("Failed to spawn session thread: {e}")))
            }
        }
    }

    /// Waits for the session worker, if one was started.
    pub fn join(&self) {
        let Some(join) = self.worker.lock().take() else {
            return;
        };
        if join.join().is_err() {
            warn!("Session thread panicked");
        }
    }

    /// Routes one key press: Ctrl-C first, then a pending key read, then typing.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    pub fn handle_key(&self, key: KeyInput) -> Result<()> {
        if key == KeyInput::CtrlC {
            self.controller.on_ctrl_c();
            return Ok(());
        }

        if self.controller.is_waiting_for_key() {
            let pressed = match key {
                KeyInput::Char(ch) => Some(ch),
                KeyInput::Enter => Some('\r'),
                KeyInput::Backspace => Some('\u{8}'),
                KeyInput::CtrlC | KeyInput::Other => None,
            };
            if let Some(ch) = pressed {
                self.controller.perform_key_pressed(ch);
            }
            return Ok(());
        }

        match key {
            KeyInput::Char(ch) => self.controller.type_char(ch),
            KeyInput::Enter => {
                self.controller.type_char('\n')?;
                self.controller.on_enter();
                Ok(())
            }
            KeyInput::Backspace => self.controller.backspace().map(|_| ()),
            KeyInput::CtrlC | KeyInput::Other => Ok(()),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Flips visibility and announces the new state.
    pub fn toggle_visibility(&self) -> bool {
        let visible = !self.visible.fetch_xor(true, Ordering::SeqCst);
        broadcast(&self.subscribers, ControlEvent::VisibilityChanged(visible));
        visible
    }

    /// A click on the surface puts the caret back at the end.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    pub fn on_click(&self) -> Result<()> {
        self.controller.set_cursor_at_last_line()
    }
}

struct SessionWorker {
    controller: Arc<TextSurfaceController>,
    engine: Arc<dyn Engine>,
    message_sink: Option<Arc<dyn MessageSink>>,
    options: SessionOptions,
    subscribers: Subscribers,
    command: String,
    running: Arc<AtomicBool>,
}

impl SessionWorker {
    fn run(self, host: Arc<ConsoleHost>) {
        let session = match InteractiveSession::new(
            self.engine.as_ref(),
            host,
            self.message_sink.clone(),
            self.options.clone(),
        ) {
            Ok(session) => session,
            Err(e) => {
                self.report_startup_failure(&e);
                self.finish(1);
                return;
            }
        };

        if let Err(e) = session.execute(&self.command) {
            debug!("Initial command ended with error: {}", e);
        }
        broadcast(&self.subscribers, ControlEvent::CommandsDone);

        let exit_code = session.run();
        info!("Session finished with exit code {}", exit_code);
        self.finish(exit_code);
    }

    fn finish(&self, exit_code: i32) {
        self.running.store(false, Ordering::SeqCst);
        broadcast(&self.subscribers, ControlEvent::Finished(exit_code));
    }

    fn report_startup_failure(&self, e: &Error) {
        error!("Failed to start session: {}", e);
        let message = format!("Error: {e}");
        if let Err(write_error) = self.controller.write_delayed(&message) {
            warn!("Failed to write error: {}", write_error);
        }
        self.controller.set_panel_status(&message, Status::Failed);
        if let Some(sink) = &self.message_sink {
            sink.show_error("Error Message", &e.to_string());
        }
    }
}

fn broadcast(subscribers: &Mutex<Vec<Sender<ControlEvent>>>, event: ControlEvent) {
    debug!("Control event: {:?}", event);
    subscribers
        .lock()
        .retain(|subscriber| subscriber.send(event).is_ok());
}
