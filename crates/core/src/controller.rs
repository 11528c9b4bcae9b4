//! Thread-safe access to the console surface.
//!
//! [`TextSurfaceController`] is the only code that mutates the surface text.
//! Every public operation takes one instance-wide reentrant lock, so a whole
//! message is written before any other thread may write, and compound edits
//! (remove a marker, then write) run as one step through
//! [`TextSurfaceController::transaction`]. The surface owner thread never takes
//! this lock, so waiting on it while holding the lock cannot deadlock.

use std::ops::Range;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, trace};
use parking_lot::{Mutex, ReentrantMutex};
use regex::{Regex, RegexBuilder};

use crate::color::Color;
use crate::error::{Error, Result};
use crate::keys::{CancelToken, KeyEvent};
use crate::status::{ProgressSink, Status, StatusSink, StatusVocabulary};
use crate::surface::SurfaceHandle;

/// Delay between printed characters unless configured otherwise.
pub const DEFAULT_PRINT_DELAY: Duration = Duration::from_millis(35);

/// The prompt marker of a local session.
pub const DEFAULT_PROMPT_MARKER: &str = "PS>";

/// Lines like `download: 42%` or `42 % download` that replace each other in place.
pub const PROGRESS_PATTERNS: [&str; 2] = [
    r"(?i)^[a-z]{8}:\s?\d{1,3}%$",
    r"(?i)^\d{1,3}\s?%\s?[a-z]{8}$",
];

struct ControllerState {
    text_color: Color,
    background_color: Color,
    print_delay: Duration,
    prompt_marker: String,
    vocabulary: Option<StatusVocabulary>,
    status_sink: Option<Arc<dyn StatusSink>>,
    progress_sink: Option<Arc<dyn ProgressSink>>,
}

pub struct TextSurfaceController {
    surface: SurfaceHandle,
    lock: ReentrantMutex<()>,
    state: Mutex<ControllerState>,
    progress_patterns: Vec<Regex>,
    key_subscribers: Mutex<Vec<Sender<KeyEvent>>>,
    step_subscribers: Mutex<Vec<Sender<usize>>>,
    key_wait: Mutex<Option<SyncSender<char>>>,
}

impl TextSurfaceController {
    /// Attaches a controller to a running surface.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SurfaceClosed`] if the surface owner thread is not running.
    pub fn new(surface: SurfaceHandle) -> Result<Self> {
        let background_color = surface
            .invoke(|state| state.buffer().back_color())
            .map_err(|_| Error::SurfaceClosed)?;

        let progress_patterns = PROGRESS_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            surface,
            lock: ReentrantMutex::new(()),
            state: Mutex::new(ControllerState {
                text_color: Color::BLACK,
                background_color,
                print_delay: DEFAULT_PRINT_DELAY,
                prompt_marker: DEFAULT_PROMPT_MARKER.to_string(),
                vocabulary: None,
                status_sink: None,
                progress_sink: None,
            }),
            progress_patterns,
            key_subscribers: Mutex::new(Vec::new()),
            step_subscribers: Mutex::new(Vec::new()),
            key_wait: Mutex::new(None),
        })
    }

    pub fn surface(&self) -> &SurfaceHandle {
        &self.surface
    }

    /// Runs `f` while holding the controller lock, so no other thread writes in between.
    pub fn transaction<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        let _guard = self.lock.lock();
        f(self)
    }

    pub fn text_color(&self) -> Color {
        self.state.lock().text_color
    }

    pub fn set_text_color(&self, color: Color) {
        self.state.lock().text_color = color;
    }

    pub fn background_color(&self) -> Color {
        self.state.lock().background_color
    }

    pub fn set_background_color(&self, color: Color) {
        self.state.lock().background_color = color;
    }

    pub fn print_delay(&self) -> Duration {
        self.state.lock().print_delay
    }

    pub fn set_print_delay(&self, delay: Duration) {
        self.state.lock().print_delay = delay;
    }

    pub fn prompt_marker(&self) -> String {
        self.state.lock().prompt_marker.clone()
    }

    pub fn set_prompt_marker(&self, marker: &str) {
        self.state.lock().prompt_marker = marker.to_string();
    }

    pub fn set_status_vocabulary(&self, vocabulary: Option<StatusVocabulary>) {
        self.state.lock().vocabulary = vocabulary;
    }

    pub fn set_status_sink(&self, sink: Option<Arc<dyn StatusSink>>) {
        self.state.lock().status_sink = sink;
    }

    pub fn set_progress_sink(&self, sink: Option<Arc<dyn ProgressSink>>) {
        self.state.lock().progress_sink = sink;
    }

    pub fn progress_sink(&self) -> Option<Arc<dyn ProgressSink>> {
        self.state.lock().progress_sink.clone()
    }

    /// Forwards a status to the status sink, if one is attached.
    pub fn set_panel_status(&self, message: &str, status: Status) {
        let sink = self.state.lock().status_sink.clone();
        if let Some(sink) = sink {
            sink.print_status(message, status);
        }
    }

    pub fn buffer_width(&self) -> Result<i32> {
        let _guard = self.lock.lock();
        self.surface
            .invoke(|state| i32::from(state.buffer().width()))
    }

    pub fn set_buffer_width(&self, width: i32) -> Result<()> {
        let _guard = self.lock.lock();
        let width = clamp_dimension(width);
        self.surface.invoke(move |state| state.set_width(width))
    }

    pub fn buffer_height(&self) -> Result<i32> {
        let _guard = self.lock.lock();
        self.surface
            .invoke(|state| i32::from(state.buffer().height()))
    }

    pub fn set_buffer_height(&self, height: i32) -> Result<()> {
        let _guard = self.lock.lock();
        let height = clamp_dimension(height);
        self.surface.invoke(move |state| state.set_height(height))
    }

    // The window and the buffer are the same widget.
    pub fn window_width(&self) -> Result<i32> {
        self.buffer_width()
    }

    pub fn set_window_width(&self, width: i32) -> Result<()> {
        self.set_buffer_width(width)
    }

    pub fn window_height(&self) -> Result<i32> {
        self.buffer_height()
    }

    pub fn set_window_height(&self, height: i32) -> Result<()> {
        self.set_buffer_height(height)
    }

    pub fn window_title(&self) -> Result<String> {
        let _guard = self.lock.lock();
        self.surface
            .invoke(|state| state.buffer().title().to_string())
    }

    pub fn set_window_title(&self, title: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let title = title.to_string();
        self.surface.invoke(move |state| state.set_title(&title))
    }

    pub fn text(&self) -> Result<String> {
        let _guard = self.lock.lock();
        self.surface.text()
    }

    /// Writes a message the way a live console would: one character at a time.
    ///
    /// Progress lines replace the previous progress line, status phrases are
    /// reported, and the text is normalized to end in exactly one newline
    /// unless it is a bare prompt marker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SurfaceClosed`] if the surface stopped.
    pub fn write_delayed(&self, message: &str) -> Result<()> {
        if message.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.lock();

        let trimmed = message.trim();
        for pattern in &self.progress_patterns {
            if pattern.is_match(trimmed) {
                self.remove_last_line(pattern)?;
            }
        }

        self.report_status(message);

        let out_text = if self.is_bare_marker(message) || message.trim_end().is_empty() {
            message.to_string()
        } else {
            format!("{}\n", message.trim_end())
        };

        self.print(&out_text)
    }

    /// Appends `marker` exactly as given, so input can follow it on the same line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SurfaceClosed`] if the surface stopped.
    pub fn write_marker(&self, marker: &str) -> Result<()> {
        let _guard = self.lock.lock();
        self.print(marker)
    }

    /// Removes the last non-empty line if it matches `pattern`.
    ///
    /// Returns whether a line was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SurfaceClosed`] if the surface stopped.
    pub fn remove_last_line(&self, pattern: &Regex) -> Result<bool> {
        let _guard = self.lock.lock();
        let pattern = pattern.clone();

        self.surface.invoke(move |state| {
            let text = state.buffer().text();
            let lines: Vec<&str> = text.split('\n').collect();

            let candidate = if lines[lines.len() - 1].is_empty() {
                if lines.len() < 2 {
                    return false;
                }
                lines.len() - 2
            } else {
                lines.len() - 1
            };

            if !pattern.is_match(lines[candidate]) {
                return false;
            }

            let kept: usize = lines[..candidate]
                .iter()
                .map(|line| line.chars().count() + 1)
                .sum();
            state.truncate(kept);
            true
        })
    }

    /// Removes every match of each pattern, in order, across the whole surface.
    ///
    /// Patterns are regular expressions in multi-line mode.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern does not compile or the surface stopped.
    pub fn remove_lines<S: AsRef<str>>(&self, keywords: &[S]) -> Result<()> {
        let regexes = keywords
            .iter()
            .map(|keyword| RegexBuilder::new(keyword.as_ref()).multi_line(true).build())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let _guard = self.lock.lock();
        self.surface.invoke(move |state| {
            for regex in &regexes {
                let text = state.buffer().text();
                let ranges: Vec<Range<usize>> =
                    regex.find_iter(&text).map(|found| found.range()).collect();
                state.remove_byte_ranges(&ranges);
            }
        })
    }

    /// Removes every occurrence of `marker`, taken literally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SurfaceClosed`] if the surface stopped.
    pub fn remove_marker(&self, marker: &str) -> Result<()> {
        if marker.is_empty() {
            return Ok(());
        }
        self.remove_lines(&[regex::escape(marker)])
    }

    /// The text between the last `marker` and the newline after it.
    ///
    /// Empty when the marker is absent or the line was not submitted yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SurfaceClosed`] if the surface stopped.
    pub fn read_line(&self, marker: &str) -> Result<String> {
        Ok(self.try_read_line(marker)?.unwrap_or_default())
    }

    /// Like [`Self::read_line`], but tells "submitted empty" (`Some("")`) apart
    /// from "not submitted" (`None`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::SurfaceClosed`] if the surface stopped.
    pub fn try_read_line(&self, marker: &str) -> Result<Option<String>> {
        let text = self.text()?;
        Ok(submitted_line(&text, marker))
    }

    /// Moves the caret to the end of the text without scrolling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SurfaceClosed`] if the surface stopped.
    pub fn set_cursor_at_last_line(&self) -> Result<()> {
        let _guard = self.lock.lock();
        self.surface.invoke(|state| state.move_caret_to_end())
    }

    /// Inserts a character typed by the user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SurfaceClosed`] if the surface stopped.
    pub fn type_char(&self, ch: char) -> Result<()> {
        let _guard = self.lock.lock();
        self.surface.invoke(move |state| state.type_char(ch))
    }

    /// Erases the last typed character. Host output is never erased.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SurfaceClosed`] if the surface stopped.
    pub fn backspace(&self) -> Result<bool> {
        let _guard = self.lock.lock();
        self.surface.invoke(|state| state.backspace())
    }

    /// Receives every Ctrl-C and Enter raised on the surface from now on.
    pub fn subscribe_keys(&self) -> Receiver<KeyEvent> {
        let (sender, receiver) = mpsc::channel();
        self.key_subscribers.lock().push(sender);
        receiver
    }

    /// Receives the vocabulary index of every status phrase written from now on.
    pub fn subscribe_status_steps(&self) -> Receiver<usize> {
        let (sender, receiver) = mpsc::channel();
        self.step_subscribers.lock().push(sender);
        receiver
    }

    pub fn on_ctrl_c(&self) {
        self.broadcast_key(KeyEvent::CtrlC);
    }

    pub fn on_enter(&self) {
        self.broadcast_key(KeyEvent::Enter);
    }

    /// Whether a raw key read is waiting for the next key press.
    pub fn is_waiting_for_key(&self) -> bool {
        self.key_wait.lock().is_some()
    }

    /// Hands a key press to the pending raw key read. Returns whether one was waiting.
    pub fn perform_key_pressed(&self, key: char) -> bool {
        match self.key_wait.lock().take() {
            Some(sender) => sender.send(key).is_ok(),
            None => false,
        }
    }

    /// Blocks until the next key press or until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WouldDeadlock`] on the surface owner thread and
    /// [`Error::Interrupted`] when cancelled.
    pub fn wait_for_key(&self, token: &CancelToken, poll_interval: Duration) -> Result<char> {
        if self.surface.is_owner_thread() {
            return Err(Error::WouldDeadlock("ReadKey"));
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        *self.key_wait.lock() = Some(sender);

        loop {
            match receiver.recv_timeout(poll_interval) {
                Ok(key) => return Ok(key),
                Err(RecvTimeoutError::Timeout) => {
                    if token.is_cancelled() {
                        self.key_wait.lock().take();
                        return Err(Error::Interrupted);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(Error::Interrupted),
            }
        }
    }

    fn broadcast_key(&self, event: KeyEvent) {
        debug!("Key event: {:?}", event);
        self.key_subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event).is_ok());
    }

    fn report_status(&self, message: &str) {
        let (vocabulary, sink) = {
            let state = self.state.lock();
            (state.vocabulary.clone(), state.status_sink.clone())
        };
        let Some(found) = vocabulary.and_then(|vocabulary| vocabulary.classify(message)) else {
            return;
        };

        if let Some(sink) = sink {
            sink.print_status(&found.phrase, found.status);
        }
        self.step_subscribers
            .lock()
            .retain(|subscriber| subscriber.send(found.step).is_ok());
    }

    fn is_bare_marker(&self, message: &str) -> bool {
        let live = self.prompt_marker();
        message == DEFAULT_PROMPT_MARKER
            || message.strip_prefix('\n') == Some(DEFAULT_PROMPT_MARKER)
            || message == live
            || message.strip_prefix('\n') == Some(live.as_str())
    }

    fn print(&self, text: &str) -> Result<()> {
        let (fg, bg, delay) = {
            let state = self.state.lock();
            (state.text_color, state.background_color, state.print_delay)
        };
        trace!("Printing {:?}", text);

        if delay.is_zero() {
            let text = text.to_string();
            return self.surface.invoke(move |state| state.append(&text, fg, bg));
        }

        for ch in text.chars() {
            self.surface
                .invoke(move |state| state.append(ch.encode_utf8(&mut [0; 4]), fg, bg))?;
            thread::sleep(delay);
        }
        Ok(())
    }
}

fn submitted_line(text: &str, marker: &str) -> Option<String> {
    if marker.is_empty() {
        return None;
    }
    let start = text.rfind(marker)? + marker.len();
    let rest = &text[start..];
    let end = rest.find('\n')?;
    Some(rest[..end].trim_end_matches('\r').to_string())
}

fn clamp_dimension(value: i32) -> u16 {
    u16::try_from(value.max(0)).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Surface;

    fn controller() -> (Surface, TextSurfaceController) {
        let surface = Surface::headless(80, 25).unwrap();
        let controller = TextSurfaceController::new(surface.handle()).unwrap();
        controller.set_print_delay(Duration::ZERO);
        (surface, controller)
    }

    fn type_line(surface: &Surface, line: &str) {
        let line = line.to_string();
        surface
            .handle()
            .invoke(move |state| {
                for ch in line.chars() {
                    state.type_char(ch);
                }
                state.type_char('\n');
            })
            .unwrap();
    }

    #[test]
    fn test_written_marker_reads_back_empty() {
        let (_surface, controller) = controller();
        controller.write_delayed("PS>").unwrap();

        assert_eq!(controller.read_line("PS>").unwrap(), "");
        assert_eq!(controller.try_read_line("PS>").unwrap(), None);
    }

    #[test]
    fn test_read_line_returns_submitted_input() {
        let (surface, controller) = controller();
        controller.write_delayed("PS>").unwrap();
        type_line(&surface, "get-date");

        assert_eq!(controller.read_line("PS>").unwrap(), "get-date");
    }

    #[test]
    fn test_read_line_submitted_empty() {
        let (surface, controller) = controller();
        controller.write_delayed("PS>").unwrap();
        type_line(&surface, "");

        assert_eq!(controller.try_read_line("PS>").unwrap(), Some(String::new()));
    }

    #[test]
    fn test_read_line_without_marker() {
        let (_surface, controller) = controller();
        controller.write_delayed("some output").unwrap();

        assert_eq!(controller.read_line("PS>").unwrap(), "");
    }

    #[test]
    fn test_messages_end_with_exactly_one_newline() {
        let (_surface, controller) = controller();
        controller.write_delayed("first   \n\n").unwrap();
        controller.write_delayed("second").unwrap();

        assert_eq!(controller.text().unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_bare_markers_are_not_terminated() {
        let (_surface, controller) = controller();
        controller.set_prompt_marker("[server] PS>");
        controller.write_delayed("PS>").unwrap();
        controller.write_delayed("\n[server] PS>").unwrap();

        assert_eq!(controller.text().unwrap(), "PS>\n[server] PS>");
    }

    #[test]
    fn test_progress_lines_collapse() {
        let (_surface, controller) = controller();
        controller.write_delayed("starting").unwrap();
        controller.write_delayed("download: 10%").unwrap();
        controller.write_delayed("download: 55%").unwrap();

        assert_eq!(controller.text().unwrap(), "starting\ndownload: 55%\n");
    }

    #[test]
    fn test_trailing_percent_progress_lines_collapse() {
        let (_surface, controller) = controller();
        controller.write_delayed("10 % complete").unwrap();
        controller.write_delayed("7 % COMPLETE").unwrap();
        controller.write_delayed("80% complete").unwrap();

        assert_eq!(controller.text().unwrap(), "80% complete\n");
    }

    #[test]
    fn test_seven_letter_words_are_not_progress() {
        let (_surface, controller) = controller();
        controller.write_delayed("copying: 10%").unwrap();
        controller.write_delayed("copying: 55%").unwrap();

        assert_eq!(controller.text().unwrap(), "copying: 10%\ncopying: 55%\n");
    }

    #[test]
    fn test_remove_last_line_leaves_non_matching_text() {
        let (_surface, controller) = controller();
        controller.write_delayed("hello").unwrap();

        let removed = controller
            .remove_last_line(&Regex::new("^world$").unwrap())
            .unwrap();
        assert!(!removed);
        assert_eq!(controller.text().unwrap(), "hello\n");
    }

    #[test]
    fn test_remove_last_line_on_empty_surface() {
        let (_surface, controller) = controller();
        let removed = controller.remove_last_line(&Regex::new(".*").unwrap()).unwrap();
        assert!(!removed);
    }

    #[test]
    fn test_remove_lines_then_marker_round_trip() {
        let (_surface, controller) = controller();
        controller.write_delayed("output").unwrap();
        controller.write_delayed("PS>").unwrap();

        for _ in 0..3 {
            controller.remove_lines(&["PS>"]).unwrap();
            controller.write_delayed("PS>").unwrap();
        }

        let text = controller.text().unwrap();
        assert_eq!(text, "output\nPS>");
        assert_eq!(text.matches("PS>").count(), 1);
    }

    #[test]
    fn test_remove_marker_is_literal() {
        let (_surface, controller) = controller();
        controller.write_delayed("h PS> stays").unwrap();
        controller.write_marker("[host] PS>").unwrap();

        controller.remove_marker("[host] PS>").unwrap();
        assert_eq!(controller.text().unwrap(), "h PS> stays\n");
    }

    #[test]
    fn test_status_steps_fire_in_order() {
        let (_surface, controller) = controller();
        let phrases = vec![
            "Setting up".to_string(),
            "Installing".to_string(),
            "All done".to_string(),
        ];
        controller.set_status_vocabulary(Some(StatusVocabulary::new(
            phrases.clone(),
            Some("All done".to_string()),
        )));

        struct Recorder(Mutex<Vec<(String, Status)>>);
        impl StatusSink for Recorder {
            fn print_status(&self, message: &str, status: Status) {
                self.0.lock().push((message.to_string(), status));
            }
        }
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let sink: Arc<dyn StatusSink> = recorder.clone();
        controller.set_status_sink(Some(sink));
        let steps = controller.subscribe_status_steps();

        for phrase in &phrases {
            controller.write_delayed(phrase).unwrap();
        }

        let received: Vec<usize> = steps.try_iter().collect();
        assert_eq!(received, vec![0, 1, 2]);

        let statuses: Vec<Status> = recorder.0.lock().iter().map(|(_, s)| *s).collect();
        assert_eq!(
            statuses,
            vec![Status::InProgress, Status::InProgress, Status::Success]
        );
    }

    #[test]
    fn test_key_events_reach_every_subscriber() {
        let (_surface, controller) = controller();
        let first = controller.subscribe_keys();
        let second = controller.subscribe_keys();

        controller.on_ctrl_c();
        controller.on_enter();

        assert_eq!(first.try_iter().collect::<Vec<_>>(), vec![KeyEvent::CtrlC, KeyEvent::Enter]);
        assert_eq!(second.try_iter().collect::<Vec<_>>(), vec![KeyEvent::CtrlC, KeyEvent::Enter]);
    }

    #[test]
    fn test_wait_for_key_receives_pressed_key() {
        let (_surface, controller) = controller();
        let controller = Arc::new(controller);
        let waiter = {
            let controller = controller.clone();
            thread::spawn(move || {
                controller.wait_for_key(&CancelToken::new(), Duration::from_millis(5))
            })
        };

        while !controller.is_waiting_for_key() {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(controller.perform_key_pressed('y'));
        assert_eq!(waiter.join().unwrap().unwrap(), 'y');
        assert!(!controller.is_waiting_for_key());
    }

    #[test]
    fn test_wait_for_key_cancelled() {
        let (_surface, controller) = controller();
        let token = CancelToken::new();
        token.cancel();

        let result = controller.wait_for_key(&token, Duration::from_millis(1));
        assert!(matches!(result, Err(Error::Interrupted)));
        assert!(!controller.is_waiting_for_key());
    }

    #[test]
    fn test_perform_key_pressed_without_waiter() {
        let (_surface, controller) = controller();
        assert!(!controller.perform_key_pressed('x'));
    }

    #[test]
    fn test_new_rejects_stopped_surface() {
        let surface = Surface::headless(80, 25).unwrap();
        let handle = surface.handle();
        surface.shutdown();

        assert!(matches!(
            TextSurfaceController::new(handle),
            Err(Error::SurfaceClosed)
        ));
    }
}
