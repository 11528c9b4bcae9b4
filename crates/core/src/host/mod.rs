//! The callbacks an interpreter engine requires of whatever hosts it.
//!
//! [`Host`] describes the host itself, [`HostUi`] the line-oriented user
//! interface, and [`RawUi`] the low-level console geometry and key input.
//! [`console`] answers all three on top of a
//! [`TextSurfaceController`](crate::controller::TextSurfaceController).

pub mod choice;
pub mod console;
pub mod raw;

use std::fmt::{Debug, Formatter};

use bitflags::bitflags;
use indexmap::IndexMap;

use crate::color::ConsoleColor;
use crate::error::Result;

pub use console::{ConsoleHost, ConsoleHostUi};
pub use raw::ConsoleRawUi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rectangle {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCell {
    pub character: char,
    pub foreground: ConsoleColor,
    pub background: ConsoleColor,
}

/// A key read through [`RawUi::read_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfo {
    pub character: char,
    pub key_down: bool,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReadKeyOptions: u8 {
        const ALLOW_CTRL_C = 1;
        const NO_ECHO = 1 << 1;
        const INCLUDE_KEY_DOWN = 1 << 2;
        const INCLUDE_KEY_UP = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CredentialTypes: u8 {
        const GENERIC = 1;
        const DOMAIN = 1 << 1;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CredentialUiOptions: u8 {
        const VALIDATE_USER_NAME_SYNTAX = 1;
        const ALWAYS_PROMPT = 1 << 1;
        const READ_ONLY_USER_NAME = 1 << 2;
    }
}

/// Characters that can be appended but never printed through `Debug`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString {
    chars: Vec<char>,
}

impl SecretString {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ch: char) {
        self.chars.push(ch);
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// The secret in clear text, for the code that finally consumes it.
    pub fn expose(&self) -> String {
        self.chars.iter().collect()
    }
}

impl Debug for SecretString {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "SecretString({} chars)", self.chars.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Secret,
}

/// One value requested by [`HostUi::prompt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
}

impl FieldDescription {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: String::new(),
            kind: FieldKind::Text,
        }
    }

    pub fn secret(name: &str) -> Self {
        Self {
            kind: FieldKind::Secret,
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Secret(SecretString),
}

/// A choice offered by a choice prompt. `&` marks the accelerator character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceDescription {
    pub label: String,
    pub help_message: String,
}

impl ChoiceDescription {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            help_message: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub activity: String,
    pub status_description: String,
    pub current_operation: String,
    pub percent_complete: i32,
}

impl ProgressRecord {
    pub fn new(activity: &str, status_description: &str) -> Self {
        Self {
            activity: activity.to_string(),
            status_description: status_description.to_string(),
            current_operation: String::new(),
            percent_complete: -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_name: String,
    pub password: SecretString,
}

/// The host as seen by the engine.
pub trait Host: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn ui(&self) -> &dyn HostUi;

    /// Asks the session to end with `exit_code` once the current command returns.
    fn set_should_exit(&self, exit_code: i32);

    /// # Errors
    ///
    /// Returns an error if nested prompts are not supported.
    fn enter_nested_prompt(&self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if nested prompts are not supported.
    fn exit_nested_prompt(&self) -> Result<()>;

    fn notify_begin_application(&self);

    fn notify_end_application(&self);
}

/// The line-oriented user interface.
///
/// Every method may block the calling thread, and none may be called from
/// the thread owning the surface.
pub trait HostUi: Send + Sync {
    fn raw_ui(&self) -> &dyn RawUi;

    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    fn write(&self, text: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    fn write_colored(&self, foreground: ConsoleColor, background: ConsoleColor, text: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    fn write_line(&self, text: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    fn write_line_colored(
        &self,
        foreground: ConsoleColor,
        background: ConsoleColor,
        text: &str,
    ) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    fn write_blank_line(&self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    fn write_debug_line(&self, text: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    fn write_warning_line(&self, text: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    fn write_verbose_line(&self, text: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    fn write_error_line(&self, text: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    fn write_progress(&self, source_id: i64, record: &ProgressRecord) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    fn read_line(&self) -> Result<String>;

    /// # Errors
    ///
    /// Always fails: secure input is not supported.
    fn read_line_as_secure_string(&self) -> Result<SecretString>;

    /// Collects one value per field, or `None` if the prompt was abandoned.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    fn prompt(
        &self,
        caption: &str,
        message: &str,
        fields: &[FieldDescription],
    ) -> Result<Option<IndexMap<String, FieldValue>>>;

    /// # Errors
    ///
    /// Returns [`Error::Interrupted`](crate::error::Error::Interrupted) when
    /// the wait is cancelled.
    fn prompt_for_choice(
        &self,
        caption: &str,
        message: &str,
        choices: &[ChoiceDescription],
        default_choice: Option<usize>,
    ) -> Result<usize>;

    /// # Errors
    ///
    /// Returns [`Error::Interrupted`](crate::error::Error::Interrupted) when
    /// the wait is cancelled.
    fn prompt_for_multiple_choices(
        &self,
        caption: &str,
        message: &str,
        choices: &[ChoiceDescription],
        default_choices: &[usize],
    ) -> Result<Vec<usize>>;

    /// # Errors
    ///
    /// Always fails: this host never asks for credentials.
    fn prompt_for_credential(
        &self,
        caption: &str,
        message: &str,
        user_name: &str,
        target_name: &str,
    ) -> Result<Credential>;

    /// # Errors
    ///
    /// Always fails: this host never asks for credentials.
    fn prompt_for_credential_with_options(
        &self,
        caption: &str,
        message: &str,
        user_name: &str,
        target_name: &str,
        allowed_credential_types: CredentialTypes,
        options: CredentialUiOptions,
    ) -> Result<Credential>;
}

/// Console geometry, colors and raw key input.
#[allow(clippy::missing_errors_doc)]
pub trait RawUi: Send + Sync {
    fn background_color(&self) -> Result<ConsoleColor>;
    fn set_background_color(&self, color: ConsoleColor) -> Result<()>;

    fn foreground_color(&self) -> Result<ConsoleColor>;
    fn set_foreground_color(&self, color: ConsoleColor) -> Result<()>;

    fn buffer_size(&self) -> Result<Size>;
    fn set_buffer_size(&self, size: Size) -> Result<()>;

    fn cursor_position(&self) -> Result<Coordinates>;
    fn set_cursor_position(&self, position: Coordinates) -> Result<()>;

    fn cursor_size(&self) -> Result<i32>;
    fn set_cursor_size(&self, size: i32) -> Result<()>;

    fn key_available(&self) -> Result<bool>;

    fn max_physical_window_size(&self) -> Result<Size>;
    fn max_window_size(&self) -> Result<Size>;

    fn window_position(&self) -> Result<Coordinates>;
    fn set_window_position(&self, position: Coordinates) -> Result<()>;

    fn window_size(&self) -> Result<Size>;
    fn set_window_size(&self, size: Size) -> Result<()>;

    fn window_title(&self) -> Result<String>;
    fn set_window_title(&self, title: &str) -> Result<()>;

    /// Blocks until one key is pressed.
    fn read_key(&self, options: ReadKeyOptions) -> Result<KeyInfo>;

    fn flush_input_buffer(&self) -> Result<()>;

    fn get_buffer_contents(&self, rectangle: Rectangle) -> Result<Vec<Vec<BufferCell>>>;

    fn set_buffer_contents(&self, origin: Coordinates, contents: &[Vec<BufferCell>]) -> Result<()>;

    fn fill_buffer_contents(&self, rectangle: Rectangle, fill: BufferCell) -> Result<()>;

    fn scroll_buffer_contents(
        &self,
        source: Rectangle,
        destination: Coordinates,
        clip: Rectangle,
        fill: BufferCell,
    ) -> Result<()>;
}
