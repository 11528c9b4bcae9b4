//! The physical text surface and the thread that owns it.
//!
//! A [`Surface`] spawns a dedicated owner thread holding the [`SurfaceBuffer`]
//! and its [`SurfaceRenderer`]. Every other thread mutates or inspects the
//! buffer by sending a closure through a [`SurfaceHandle`]; the owner thread
//! applies closures one at a time, in arrival order, and sends each result back.

use std::ops::Range;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle, ThreadId};

use log::{debug, warn};

use crate::color::Color;
use crate::error::{Error, Result};

/// One character on the surface together with the colors it was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub fg: Color,
    pub bg: Color,
}

/// The text the user sees and types into.
#[derive(Debug, Clone)]
pub struct SurfaceBuffer {
    cells: Vec<Cell>,
    width: u16,
    height: u16,
    caret: usize,
    // Cells before this index were written by the host and cannot be erased by typing.
    input_start: usize,
    title: String,
    fore_color: Color,
    back_color: Color,
}

impl SurfaceBuffer {
    pub fn new(width: u16, height: u16, fore_color: Color, back_color: Color) -> Self {
        Self {
            cells: Vec::new(),
            width,
            height,
            caret: 0,
            input_start: 0,
            title: String::new(),
            fore_color,
            back_color,
        }
    }

    pub fn text(&self) -> String {
        self.cells.iter().map(|cell| cell.ch).collect()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Number of characters on the surface.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Lines split on `\n`; a trailing newline yields a final empty line.
    pub fn lines(&self) -> Vec<String> {
        self.text().split('\n').map(ToString::to_string).collect()
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn fore_color(&self) -> Color {
        self.fore_color
    }

    pub fn back_color(&self) -> Color {
        self.back_color
    }

    /// Characters typed by the user since the host last wrote.
    pub fn pending_input(&self) -> String {
        self.cells[self.input_start..]
            .iter()
            .map(|cell| cell.ch)
            .collect()
    }

    fn append(&mut self, text: &str, fg: Color, bg: Color) {
        self.cells
            .extend(text.chars().map(|ch| Cell { ch, fg, bg }));
        self.caret = self.cells.len();
        self.input_start = self.cells.len();
    }

    fn remove_byte_ranges(&mut self, ranges: &[Range<usize>]) -> bool {
        if ranges.is_empty() {
            return false;
        }

        let text = self.text();
        let kept: Vec<Cell> = text
            .char_indices()
            .zip(self.cells.iter())
            .filter(|((offset, _), _)| !ranges.iter().any(|range| range.contains(offset)))
            .map(|(_, cell)| *cell)
            .collect();

        let changed = kept.len() != self.cells.len();
        self.cells = kept;
        self.caret = self.cells.len();
        self.input_start = self.cells.len();
        changed
    }

    fn truncate(&mut self, chars: usize) {
        self.cells.truncate(chars);
        self.caret = self.cells.len();
        self.input_start = self.cells.len();
    }

    fn type_char(&mut self, ch: char) {
        self.cells.push(Cell {
            ch,
            fg: self.fore_color,
            bg: self.back_color,
        });
        self.caret = self.cells.len();
    }

    fn backspace(&mut self) -> bool {
        if self.cells.len() > self.input_start {
            self.cells.pop();
            self.caret = self.cells.len();
            true
        } else {
            false
        }
    }
}

/// Draws the surface somewhere. Called only on the owner thread.
pub trait SurfaceRenderer: Send {
    /// `text` was appended to the end of `buffer` in the given colors.
    fn appended(&mut self, buffer: &SurfaceBuffer, text: &str, fg: Color, bg: Color);

    /// The contents changed in a way that requires drawing everything again.
    fn redrawn(&mut self, buffer: &SurfaceBuffer);

    fn caret_moved(&mut self, _buffer: &SurfaceBuffer) {}
}

/// A renderer that draws nothing, for headless surfaces.
pub struct NullRenderer;

impl SurfaceRenderer for NullRenderer {
    fn appended(&mut self, _buffer: &SurfaceBuffer, _text: &str, _fg: Color, _bg: Color) {}

    fn redrawn(&mut self, _buffer: &SurfaceBuffer) {}
}

/// The buffer and renderer, as seen by closures running on the owner thread.
pub struct SurfaceState {
    buffer: SurfaceBuffer,
    renderer: Box<dyn SurfaceRenderer>,
}

impl SurfaceState {
    pub fn buffer(&self) -> &SurfaceBuffer {
        &self.buffer
    }

    pub fn append(&mut self, text: &str, fg: Color, bg: Color) {
        if text.is_empty() {
            return;
        }
        self.buffer.append(text, fg, bg);
        self.renderer.appended(&self.buffer, text, fg, bg);
    }

    /// Removes the characters covered by byte ranges of [`SurfaceBuffer::text`].
    pub fn remove_byte_ranges(&mut self, ranges: &[Range<usize>]) {
        if self.buffer.remove_byte_ranges(ranges) {
            self.renderer.redrawn(&self.buffer);
        }
    }

    /// Keeps the first `chars` characters.
    pub fn truncate(&mut self, chars: usize) {
        if chars < self.buffer.len() {
            self.buffer.truncate(chars);
            self.renderer.redrawn(&self.buffer);
        }
    }

    pub fn type_char(&mut self, ch: char) {
        self.buffer.type_char(ch);
        let (fg, bg) = (self.buffer.fore_color, self.buffer.back_color);
        self.renderer
            .appended(&self.buffer, ch.encode_utf8(&mut [0; 4]), fg, bg);
    }

    pub fn backspace(&mut self) -> bool {
        let erased = self.buffer.backspace();
        if erased {
            self.renderer.redrawn(&self.buffer);
        }
        erased
    }

    pub fn move_caret_to_end(&mut self) {
        self.buffer.caret = self.buffer.len();
        self.renderer.caret_moved(&self.buffer);
    }

    pub fn set_width(&mut self, width: u16) {
        self.buffer.width = width;
        self.renderer.redrawn(&self.buffer);
    }

    pub fn set_height(&mut self, height: u16) {
        self.buffer.height = height;
        self.renderer.redrawn(&self.buffer);
    }

    pub fn set_title(&mut self, title: &str) {
        self.buffer.title = title.to_string();
    }

    pub fn redraw(&mut self) {
        self.renderer.redrawn(&self.buffer);
    }
}

type Job = Box<dyn FnOnce(&mut SurfaceState) + Send>;

enum Message {
    Run(Job),
    Shutdown,
}

/// Cloneable access to a surface from any thread.
#[derive(Clone)]
pub struct SurfaceHandle {
    sender: Sender<Message>,
    owner: ThreadId,
}

impl SurfaceHandle {
    /// Runs `job` on the owner thread and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SurfaceReentered`] when called from the owner thread
    /// and [`Error::SurfaceClosed`] once the owner thread has stopped.
    pub fn invoke<R, F>(&self, job: F) -> Result<R>
    where
        F: FnOnce(&mut SurfaceState) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_owner_thread() {
            return Err(Error::SurfaceReentered);
        }

        let (reply_sender, reply_receiver) = mpsc::sync_channel(1);
        self.sender
            .send(Message::Run(Box::new(move |state| {
                let _ = reply_sender.send(job(state));
            })))
            .map_err(|_| Error::SurfaceClosed)?;

        reply_receiver.recv().map_err(|_| Error::SurfaceClosed)
    }

    /// Queues `job` without waiting for it to run.
    pub fn post<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut SurfaceState) + Send + 'static,
    {
        self.sender
            .send(Message::Run(Box::new(job)))
            .map_err(|_| Error::SurfaceClosed)
    }

    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Round-trips an empty job to check the owner thread still answers.
    pub fn is_alive(&self) -> bool {
        self.invoke(|_| ()).is_ok()
    }

    pub fn text(&self) -> Result<String> {
        self.invoke(|state| state.buffer().text())
    }
}

/// Owns the surface thread; shutting down or dropping it stops the thread.
pub struct Surface {
    handle: SurfaceHandle,
    join: Option<JoinHandle<()>>,
}

impl Surface {
    /// Spawns the owner thread with an initial buffer and renderer.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(buffer: SurfaceBuffer, renderer: Box<dyn SurfaceRenderer>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();

        let join = thread::Builder::new()
            .name("surface".to_string())
            .spawn(move || run_owner_loop(buffer, renderer, &receiver))
            .map_err(|e| Error::Misc(format!("Failed to spawn surface thread: {e}")))?;

        let handle = SurfaceHandle {
            sender,
            owner: join.thread().id(),
        };

        Ok(Self {
            handle,
            join: Some(join),
        })
    }

    /// A surface with no renderer attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn headless(width: u16, height: u16) -> Result<Self> {
        Self::spawn(
            SurfaceBuffer::new(width, height, Color::WHITE, Color::BLACK),
            Box::new(NullRenderer),
        )
    }

    pub fn handle(&self) -> SurfaceHandle {
        self.handle.clone()
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };

        let _ = self.handle.sender.send(Message::Shutdown);
        if self.handle.is_owner_thread() {
            return;
        }
        if join.join().is_err() {
            warn!("Surface thread panicked");
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_owner_loop(
    buffer: SurfaceBuffer,
    renderer: Box<dyn SurfaceRenderer>,
    receiver: &Receiver<Message>,
) {
    debug!("Surface thread started");
    let mut state = SurfaceState { buffer, renderer };
    state.redraw();

    for message in receiver {
        match message {
            Message::Run(job) => job(&mut state),
            Message::Shutdown => break,
        }
    }

    debug!("Surface thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_back() {
        let surface = Surface::headless(80, 25).unwrap();
        let handle = surface.handle();

        handle
            .invoke(|state| state.append("hello\nworld", Color::WHITE, Color::BLACK))
            .unwrap();

        assert_eq!(handle.text().unwrap(), "hello\nworld");
        let lines = handle.invoke(|state| state.buffer().lines()).unwrap();
        assert_eq!(lines, vec!["hello", "world"]);
    }

    #[test]
    fn test_remove_byte_ranges_keeps_cell_colors() {
        let surface = Surface::headless(80, 25).unwrap();
        let handle = surface.handle();

        handle
            .invoke(|state| {
                state.append("PS>", Color::WHITE, Color::BLACK);
                state.append("red", Color::RED, Color::BLACK);
                state.remove_byte_ranges(&[0..3]);
            })
            .unwrap();

        let cells = handle.invoke(|state| state.buffer().cells().to_vec()).unwrap();
        assert_eq!(cells.len(), 3);
        assert!(cells.iter().all(|cell| cell.fg == Color::RED));
    }

    #[test]
    fn test_backspace_cannot_erase_host_output() {
        let surface = Surface::headless(80, 25).unwrap();
        let handle = surface.handle();

        let erased = handle
            .invoke(|state| {
                state.append("PS>", Color::WHITE, Color::BLACK);
                state.type_char('l');
                state.type_char('s');
                let first = state.backspace();
                let second = state.backspace();
                let third = state.backspace();
                (first, second, third)
            })
            .unwrap();

        assert_eq!(erased, (true, true, false));
        assert_eq!(handle.text().unwrap(), "PS>");
    }

    #[test]
    fn test_pending_input_tracks_typed_characters() {
        let surface = Surface::headless(80, 25).unwrap();
        let handle = surface.handle();

        let pending = handle
            .invoke(|state| {
                state.append("PS>", Color::WHITE, Color::BLACK);
                state.type_char('d');
                state.type_char('i');
                state.buffer().pending_input()
            })
            .unwrap();

        assert_eq!(pending, "di");
    }

    #[derive(Clone, Default)]
    struct RecordingRenderer {
        calls: std::sync::Arc<parking_lot::Mutex<Vec<String>>>,
    }

    impl SurfaceRenderer for RecordingRenderer {
        fn appended(&mut self, _buffer: &SurfaceBuffer, text: &str, _fg: Color, _bg: Color) {
            self.calls.lock().push(format!("appended {text:?}"));
        }

        fn redrawn(&mut self, buffer: &SurfaceBuffer) {
            self.calls.lock().push(format!("redrawn {:?}", buffer.text()));
        }

        fn caret_moved(&mut self, buffer: &SurfaceBuffer) {
            self.calls.lock().push(format!("caret {}", buffer.caret()));
        }
    }

    #[test]
    fn test_renderer_sees_every_change() {
        let renderer = RecordingRenderer::default();
        let buffer = SurfaceBuffer::new(80, 25, Color::WHITE, Color::BLACK);
        let surface = Surface::spawn(buffer, Box::new(renderer.clone())).unwrap();
        let handle = surface.handle();

        handle
            .invoke(|state| {
                state.append("PS>", Color::WHITE, Color::BLACK);
                state.type_char('x');
                state.backspace();
                state.move_caret_to_end();
            })
            .unwrap();
        surface.shutdown();

        assert_eq!(
            *renderer.calls.lock(),
            vec![
                "redrawn \"\"".to_string(),
                "appended \"PS>\"".to_string(),
                "appended \"x\"".to_string(),
                "redrawn \"PS>\"".to_string(),
                "caret 3".to_string(),
            ]
        );
    }

    #[test]
    fn test_invoke_after_shutdown_reports_closed() {
        let surface = Surface::headless(80, 25).unwrap();
        let handle = surface.handle();
        surface.shutdown();

        assert!(!handle.is_alive());
        assert!(matches!(handle.text(), Err(Error::SurfaceClosed)));
    }

    #[test]
    fn test_invoke_from_owner_thread_is_rejected() {
        let surface = Surface::headless(80, 25).unwrap();
        let handle = surface.handle();
        let inner = handle.clone();

        let nested = handle.invoke(move |_| inner.text()).unwrap();
        assert!(matches!(nested, Err(Error::SurfaceReentered)));
    }
}
