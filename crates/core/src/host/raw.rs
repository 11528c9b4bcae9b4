use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::color::{to_console_color, to_surface_color, ConsoleColor};
use crate::controller::TextSurfaceController;
use crate::error::{Error, Result};
use crate::host::{BufferCell, Coordinates, KeyInfo, RawUi, ReadKeyOptions, Rectangle, Size};
use crate::keys::CancelToken;

/// Raw console access backed by the surface.
///
/// The window and the buffer are the same widget, so both report the same size.
/// Members a text surface cannot honor fail with [`Error::NotImplemented`];
/// purely cosmetic ones do nothing.
pub struct ConsoleRawUi {
    controller: Arc<TextSurfaceController>,
    cancel: CancelToken,
    poll_interval: Duration,
}

impl ConsoleRawUi {
    pub fn new(controller: Arc<TextSurfaceController>, cancel: CancelToken, poll_interval: Duration) -> Self {
        Self {
            controller,
            cancel,
            poll_interval,
        }
    }
}

impl RawUi for ConsoleRawUi {
    fn background_color(&self) -> Result<ConsoleColor> {
        Ok(to_console_color(self.controller.background_color()))
    }

    fn set_background_color(&self, color: ConsoleColor) -> Result<()> {
        self.controller.set_background_color(to_surface_color(color));
        Ok(())
    }

    fn foreground_color(&self) -> Result<ConsoleColor> {
        Ok(to_console_color(self.controller.text_color()))
    }

    fn set_foreground_color(&self, color: ConsoleColor) -> Result<()> {
        self.controller.set_text_color(to_surface_color(color));
        Ok(())
    }

    fn buffer_size(&self) -> Result<Size> {
        Ok(Size {
            width: self.controller.buffer_width()?,
            height: self.controller.buffer_height()?,
        })
    }

    // The width lands in the height as well; the buffer width never changes here.
    fn set_buffer_size(&self, size: Size) -> Result<()> {
        self.controller.transaction(|controller| {
            controller.set_buffer_height(size.height)?;
            controller.set_buffer_height(size.width)
        })
    }

    fn cursor_position(&self) -> Result<Coordinates> {
        Ok(Coordinates::default())
    }

    fn set_cursor_position(&self, _position: Coordinates) -> Result<()> {
        Ok(())
    }

    fn cursor_size(&self) -> Result<i32> {
        Err(Error::not_implemented("The CursorSize property"))
    }

    fn set_cursor_size(&self, _size: i32) -> Result<()> {
        Err(Error::not_implemented("The CursorSize property"))
    }

    fn key_available(&self) -> Result<bool> {
        Err(Error::not_implemented("The KeyAvailable property"))
    }

    fn max_physical_window_size(&self) -> Result<Size> {
        Err(Error::not_implemented("The MaxPhysicalWindowSize property"))
    }

    fn max_window_size(&self) -> Result<Size> {
        Err(Error::not_implemented("The MaxWindowSize property"))
    }

    fn window_position(&self) -> Result<Coordinates> {
        Err(Error::not_implemented("The WindowPosition property"))
    }

    fn set_window_position(&self, _position: Coordinates) -> Result<()> {
        Err(Error::not_implemented("The WindowPosition property"))
    }

    fn window_size(&self) -> Result<Size> {
        Ok(Size {
            width: self.controller.window_width()?,
            height: self.controller.window_height()?,
        })
    }

    fn set_window_size(&self, size: Size) -> Result<()> {
        self.controller.transaction(|controller| {
            controller.set_window_width(size.width)?;
            controller.set_window_height(size.height)
        })
    }

    fn window_title(&self) -> Result<String> {
        self.controller.window_title()
    }

    fn set_window_title(&self, title: &str) -> Result<()> {
        self.controller.set_window_title(title)
    }

    fn read_key(&self, options: ReadKeyOptions) -> Result<KeyInfo> {
        let character = self.controller.wait_for_key(&self.cancel, self.poll_interval)?;
        debug!("Read key {:?}", character);

        if !options.contains(ReadKeyOptions::NO_ECHO) && !character.is_control() {
            self.controller.write_delayed(&character.to_string())?;
        }

        Ok(KeyInfo {
            character,
            key_down: true,
        })
    }

    fn flush_input_buffer(&self) -> Result<()> {
        Ok(())
    }

    fn get_buffer_contents(&self, _rectangle: Rectangle) -> Result<Vec<Vec<BufferCell>>> {
        Err(Error::not_implemented("The GetBufferContents method"))
    }

    fn set_buffer_contents(&self, _origin: Coordinates, _contents: &[Vec<BufferCell>]) -> Result<()> {
        Ok(())
    }

    fn fill_buffer_contents(&self, _rectangle: Rectangle, _fill: BufferCell) -> Result<()> {
        Ok(())
    }

    fn scroll_buffer_contents(
        &self,
        _source: Rectangle,
        _destination: Coordinates,
        _clip: Rectangle,
        _fill: BufferCell,
    ) -> Result<()> {
        Err(Error::not_implemented("The ScrollBufferContents method"))
    }
}
