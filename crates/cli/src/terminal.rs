//! The crossterm front end: draws the surface and feeds key presses back.

use std::io::{stdout, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use crossterm::cursor::MoveTo;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::style::{Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen,
    SetTitle,
};
use crossterm::{execute, queue, ExecutableCommand};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use console_bridge_core::color::Color;
use console_bridge_core::control::{ControlEvent, InteractiveControl};
use console_bridge_core::error::Result;
use console_bridge_core::keys::KeyInput;
use console_bridge_core::status::{MessageSink, ProgressSink, Status, StatusSink};
use console_bridge_core::surface::{Cell, SurfaceBuffer, SurfaceRenderer};

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Leaves raw mode, mouse capture and the alternate screen when dropped.
pub struct RawModeGuard;

impl RawModeGuard {
    /// # Errors
    ///
    /// Returns an error if the terminal refuses raw mode.
    pub fn enter() -> Result<Self> {
        let mut stdout = stdout();
        stdout.execute(EnterAlternateScreen)?;
        enable_raw_mode()?;
        let guard = RawModeGuard;
        stdout.execute(EnableMouseCapture)?;
        Ok(guard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = stdout();
        let _ = stdout.execute(DisableMouseCapture);
        let _ = stdout.execute(LeaveAlternateScreen);
    }
}

fn to_terminal_color(color: Color) -> crossterm::style::Color {
    crossterm::style::Color::Rgb {
        r: color.r,
        g: color.g,
        b: color.b,
    }
}

/// The cells that fit in the last `rows` lines of the surface.
pub fn last_rows(cells: &[Cell], rows: u16) -> &[Cell] {
    if rows == 0 {
        return &[];
    }

    let mut newlines = 0;
    for (index, cell) in cells.iter().enumerate().rev() {
        if cell.ch == '\n' {
            newlines += 1;
            if newlines == usize::from(rows) {
                return &cells[index + 1..];
            }
        }
    }
    cells
}

/// Draws the surface onto a terminal writer.
///
/// Nothing is drawn while the shared visibility flag is off.
pub struct TerminalRenderer<W: Write + Send> {
    out: W,
    visible: Arc<AtomicBool>,
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W, visible: Arc<AtomicBool>) -> Self {
        Self { out, visible }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print_run(&mut self, text: &str, fg: Color, bg: Color) -> std::io::Result<()> {
        queue!(
            self.out,
            SetForegroundColor(to_terminal_color(fg)),
            SetBackgroundColor(to_terminal_color(bg)),
            Print(text.replace('\n', "\r\n")),
            ResetColor
        )
    }

    fn draw_all(&mut self, buffer: &SurfaceBuffer) -> std::io::Result<()> {
        queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;

        let rows = last_rows(buffer.cells(), buffer.height());
        let mut start = 0;
        while start < rows.len() {
            let (fg, bg) = (rows[start].fg, rows[start].bg);
            let run = rows[start..]
                .iter()
                .take_while(|cell| cell.fg == fg && cell.bg == bg)
                .count();
            let text: String = rows[start..start + run].iter().map(|cell| cell.ch).collect();
            self.print_run(&text, fg, bg)?;
            start += run;
        }
        self.out.flush()
    }
}

impl<W: Write + Send> SurfaceRenderer for TerminalRenderer<W> {
    fn appended(&mut self, _buffer: &SurfaceBuffer, text: &str, fg: Color, bg: Color) {
        if !self.visible.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.print_run(text, fg, bg).and_then(|()| self.out.flush()) {
            warn!("Failed to draw appended text: {}", e);
        }
    }

    fn redrawn(&mut self, buffer: &SurfaceBuffer) {
        if !self.visible.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.draw_all(buffer) {
            warn!("Failed to redraw the surface: {}", e);
        }
    }

    fn caret_moved(&mut self, _buffer: &SurfaceBuffer) {
        let _ = self.out.flush();
    }
}

/// Status, progress and error reporting outside the console surface.
///
/// Status goes to the terminal title. Errors the user must see are kept and
/// printed once the terminal is restored.
pub struct TerminalPanel {
    title: String,
    errors: Mutex<Vec<String>>,
}

impl TerminalPanel {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn take_errors(&self) -> Vec<String> {
        std::mem::take(&mut *self.errors.lock())
    }
}

impl StatusSink for TerminalPanel {
    fn print_status(&self, message: &str, status: Status) {
        info!("Status ({}): {}", status, message);
        let mut out = stdout();
        if let Err(e) = execute!(out, SetTitle(format!("{} - {message}", self.title))) {
            debug!("Failed to set the terminal title: {}", e);
        }
    }
}

impl ProgressSink for TerminalPanel {
    fn step_progress(&self, percent: i32) {
        debug!("Progress: {}%", percent);
    }

    fn reset_progress(&self, force: bool) {
        debug!("Progress reset (force: {})", force);
    }
}

impl MessageSink for TerminalPanel {
    fn show_error(&self, title: &str, message: &str) {
        error!("{}: {}", title, message);
        self.errors.lock().push(format!("{title}: {message}"));
    }
}

/// What a terminal event asks the control to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Key(KeyInput),
    ToggleVisibility,
    Click,
    Resize(u16, u16),
}

/// Classifies a terminal event. Key releases and unknown events map to `None`.
pub fn classify(event: &Event) -> Option<Action> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => Some(match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Action::Key(KeyInput::CtrlC)
            }
            KeyCode::F(12) => Action::ToggleVisibility,
            KeyCode::Char(ch) => Action::Key(KeyInput::Char(ch)),
            KeyCode::Enter => Action::Key(KeyInput::Enter),
            KeyCode::Backspace => Action::Key(KeyInput::Backspace),
            _ => Action::Key(KeyInput::Other),
        }),
        Event::Mouse(MouseEvent {
            kind: MouseEventKind::Up(MouseButton::Left),
            ..
        }) => Some(Action::Click),
        Event::Resize(width, height) => Some(Action::Resize(*width, *height)),
        _ => None,
    }
}

fn apply(control: &InteractiveControl, visible: &AtomicBool, action: Action) -> Result<()> {
    match action {
        Action::ToggleVisibility => {
            control.toggle_visibility();
        }
        Action::Key(key) if visible.load(Ordering::SeqCst) || key == KeyInput::CtrlC => {
            control.handle_key(key)?;
        }
        Action::Key(_) => {}
        Action::Click => control.on_click()?,
        Action::Resize(width, height) => {
            let controller = control.controller();
            controller.set_buffer_width(i32::from(width))?;
            controller.set_buffer_height(i32::from(height))?;
        }
    }
    Ok(())
}

/// Pumps terminal events into `control` until the session finishes.
///
/// Returns the session's exit code.
///
/// # Errors
///
/// Returns an error if reading terminal events fails or the surface stopped.
pub fn run_event_loop(
    control: &InteractiveControl,
    events: &Receiver<ControlEvent>,
    visible: &AtomicBool,
) -> Result<i32> {
    loop {
        match events.try_recv() {
            Ok(ControlEvent::Finished(exit_code)) => return Ok(exit_code),
            Ok(ControlEvent::VisibilityChanged(shown)) => {
                debug!("Console visible: {}", shown);
                visible.store(shown, Ordering::SeqCst);
                if shown {
                    control.controller().surface().post(|state| state.redraw())?;
                } else {
                    let mut out = stdout();
                    execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
                }
            }
            Ok(ControlEvent::CommandsDone) => debug!("Initial command finished"),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                warn!("Control events stopped before the session finished");
                return Ok(0);
            }
        }

        if event::poll(EVENT_POLL_INTERVAL)? {
            if let Some(action) = classify(&event::read()?) {
                apply(control, visible, action)?;
            }
        }
    }
}
