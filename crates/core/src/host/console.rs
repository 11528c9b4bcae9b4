//! The host adapter that answers engine callbacks on the console surface.
//!
//! Every write first removes the live prompt marker, so the marker never
//! lingers above new output. Colored writes swap the controller colors inside
//! one controller transaction and restore them afterwards. Blocking prompts
//! poll the surface for a submitted line and give up once the cancellation
//! token fires.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, info};

use crate::color::{to_surface_color, ConsoleColor};
use crate::controller::TextSurfaceController;
use crate::error::{Error, Result};
use crate::host::choice::{find_choice, parse_choices, parse_hotkey, render_multiple, render_single};
use crate::host::raw::ConsoleRawUi;
use crate::host::{
    ChoiceDescription, Credential, CredentialTypes, CredentialUiOptions, FieldDescription,
    FieldKind, FieldValue, Host, HostUi, ProgressRecord, RawUi, SecretString,
};
use crate::keys::CancelToken;
use crate::session::SessionState;
use crate::status::Status;

pub const DEFAULT_HOST_NAME: &str = "ConsoleBridgeHost";

/// Marks where a prompted field value is typed.
pub const FIELD_MARKER: &str = ":>";

/// Interval between checks for submitted input while a prompt blocks.
pub const DEFAULT_INPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Progress at or above this percentage counts as complete.
const PROGRESS_COMPLETE: i32 = 99;

pub struct ConsoleHostUi {
    controller: Arc<TextSurfaceController>,
    raw: ConsoleRawUi,
    cancel: CancelToken,
    poll_interval: Duration,
}

impl ConsoleHostUi {
    pub fn new(controller: Arc<TextSurfaceController>) -> Self {
        Self::with_poll_interval(controller, DEFAULT_INPUT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(controller: Arc<TextSurfaceController>, poll_interval: Duration) -> Self {
        let cancel = CancelToken::new();
        Self {
            raw: ConsoleRawUi::new(controller.clone(), cancel.clone(), poll_interval),
            controller,
            cancel,
            poll_interval,
        }
    }

    pub fn controller(&self) -> &Arc<TextSurfaceController> {
        &self.controller
    }

    /// Cancels blocking prompts and key reads when fired.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn prompt_marker(&self) -> String {
        self.controller.prompt_marker()
    }

    /// Publishes the marker that precedes user input.
    pub fn set_prompt_marker(&self, marker: &str) {
        debug!("Prompt marker is now {:?}", marker);
        self.controller.set_prompt_marker(marker);
    }

    /// Writes the live prompt marker, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    pub fn write_prompt(&self) -> Result<()> {
        self.controller.transaction(|controller| {
            let marker = controller.prompt_marker();
            controller.remove_marker(&marker)?;
            controller.set_cursor_at_last_line()?;
            controller.write_delayed(&marker)
        })
    }

    /// Writes the prompt unless it is already live at the end of the surface.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface stopped.
    pub fn ensure_prompt(&self) -> Result<()> {
        self.controller.transaction(|controller| {
            let marker = controller.prompt_marker();
            let text = controller.text()?;
            let live = text
                .rfind(&marker)
                .is_some_and(|start| !text[start..].contains('\n'));
            if live {
                Ok(())
            } else {
                self.write_prompt()
            }
        })
    }

    fn remove_live_marker(controller: &TextSurfaceController) -> Result<()> {
        controller.remove_marker(&controller.prompt_marker())
    }

    fn write_with_colors(&self, foreground: ConsoleColor, background: ConsoleColor, text: &str) -> Result<()> {
        self.controller.transaction(|controller| {
            let saved = (controller.text_color(), controller.background_color());

            let result = Self::remove_live_marker(controller).and_then(|()| {
                controller.set_text_color(to_surface_color(foreground));
                controller.set_background_color(to_surface_color(background));
                controller.write_delayed(text)
            });

            controller.set_text_color(saved.0);
            controller.set_background_color(saved.1);
            result
        })
    }

    fn write_marker_colored(&self, foreground: ConsoleColor, marker: &str) -> Result<()> {
        self.controller.transaction(|controller| {
            let saved = controller.text_color();
            controller.set_text_color(to_surface_color(foreground));
            let result = controller.write_marker(marker);
            controller.set_text_color(saved);
            result
        })
    }

    fn write_caption(&self, caption: &str, message: &str) -> Result<()> {
        let heading: Vec<&str> = [caption, message]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect();
        if heading.is_empty() {
            return Ok(());
        }
        self.write_with_colors(ConsoleColor::Blue, ConsoleColor::Black, &heading.join("\n"))
    }

    /// Blocks until a line follows `marker`, or returns `None` once cancelled.
    fn wait_for_submission(&self, marker: &str) -> Result<Option<String>> {
        loop {
            if self.cancel.is_cancelled() {
                info!("Input wait cancelled");
                return Ok(None);
            }
            if let Some(line) = self.controller.try_read_line(marker)? {
                return Ok(Some(line));
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn prompt_field(&self, field: &FieldDescription) -> Result<Option<String>> {
        let marker = format!("{}{FIELD_MARKER}", field.name);
        let marker_line = format!("{}.*\n?", regex::escape(&marker));

        loop {
            self.write_marker_colored(ConsoleColor::Blue, &marker)?;
            let Some(input) = self.wait_for_submission(FIELD_MARKER)? else {
                return Ok(None);
            };
            self.controller.remove_lines(&[marker_line.as_str()])?;

            let input = input.trim_matches(['\r', '\n']);
            if !input.is_empty() {
                return Ok(Some(input.to_string()));
            }
        }
    }
}

impl HostUi for ConsoleHostUi {
    fn raw_ui(&self) -> &dyn RawUi {
        &self.raw
    }

    fn write(&self, text: &str) -> Result<()> {
        self.controller.transaction(|controller| {
            Self::remove_live_marker(controller)?;
            controller.write_delayed(text)
        })
    }

    fn write_colored(&self, foreground: ConsoleColor, background: ConsoleColor, text: &str) -> Result<()> {
        self.write_with_colors(foreground, background, text)
    }

    fn write_line(&self, text: &str) -> Result<()> {
        self.write(text)
    }

    fn write_line_colored(
        &self,
        foreground: ConsoleColor,
        background: ConsoleColor,
        text: &str,
    ) -> Result<()> {
        self.write_with_colors(foreground, background, text)
    }

    fn write_blank_line(&self) -> Result<()> {
        self.write("\n")
    }

    fn write_debug_line(&self, text: &str) -> Result<()> {
        self.write_line_colored(ConsoleColor::DarkYellow, ConsoleColor::Black, &format!("DEBUG: {text}"))
    }

    fn write_warning_line(&self, text: &str) -> Result<()> {
        self.write_line_colored(ConsoleColor::Yellow, ConsoleColor::Black, &format!("WARNING: {text}"))
    }

    fn write_verbose_line(&self, text: &str) -> Result<()> {
        self.write_line_colored(ConsoleColor::Green, ConsoleColor::Black, &format!("VERBOSE: {text}"))
    }

    fn write_error_line(&self, text: &str) -> Result<()> {
        self.write_line_colored(ConsoleColor::Red, ConsoleColor::Black, text)
    }

    fn write_progress(&self, source_id: i64, record: &ProgressRecord) -> Result<()> {
        debug!(
            "Progress from {}: {} {}%",
            source_id, record.activity, record.percent_complete
        );

        if let Some(progress) = self.controller.progress_sink() {
            self.controller
                .set_panel_status(&record.activity, Status::InProgress);
            progress.step_progress(record.percent_complete);
            self.controller.write_delayed(&record.current_operation)?;
        }

        if record.percent_complete >= PROGRESS_COMPLETE {
            self.controller.set_panel_status(
                &format!("{} complete!", record.activity),
                Status::Success,
            );
        }
        Ok(())
    }

    fn read_line(&self) -> Result<String> {
        self.controller.read_line(&self.prompt_marker())
    }

    fn read_line_as_secure_string(&self) -> Result<SecretString> {
        Err(Error::not_implemented("The ReadLineAsSecureString method"))
    }

    fn prompt(
        &self,
        caption: &str,
        message: &str,
        fields: &[FieldDescription],
    ) -> Result<Option<IndexMap<String, FieldValue>>> {
        self.write_caption(caption, message)?;

        let mut results = IndexMap::new();
        for field in fields {
            let label = parse_hotkey(&field.label).label;
            if !label.is_empty() {
                self.write_line(&label)?;
            }

            let Some(input) = self.prompt_field(field)? else {
                return Ok(None);
            };

            let value = match field.kind {
                FieldKind::Text => FieldValue::Text(input),
                FieldKind::Secret => {
                    let mut secret = SecretString::new();
                    input.chars().for_each(|ch| secret.push(ch));
                    FieldValue::Secret(secret)
                }
            };
            results.insert(field.name.clone(), value);
        }

        Ok(Some(results))
    }

    fn prompt_for_choice(
        &self,
        caption: &str,
        message: &str,
        choices: &[ChoiceDescription],
        default_choice: Option<usize>,
    ) -> Result<usize> {
        self.write_caption(caption, message)?;

        let hotkeys = parse_choices(choices);
        let options = render_single(&hotkeys, default_choice);

        loop {
            self.write_line_colored(ConsoleColor::Cyan, ConsoleColor::Black, &options)?;
            let marker = self.prompt_marker();
            self.write_prompt()?;

            let Some(input) = self.wait_for_submission(&marker)? else {
                return Err(Error::Interrupted);
            };
            let input = input.trim().to_uppercase();

            if input.is_empty() {
                match default_choice {
                    Some(default_choice) => return Ok(default_choice),
                    None => continue,
                }
            }
            if let Some(index) = find_choice(&hotkeys, &input) {
                return Ok(index);
            }
            self.write_error_line(&format!("Invalid choice: {input}"))?;
        }
    }

    fn prompt_for_multiple_choices(
        &self,
        caption: &str,
        message: &str,
        choices: &[ChoiceDescription],
        default_choices: &[usize],
    ) -> Result<Vec<usize>> {
        self.write_caption(caption, message)?;

        let hotkeys = parse_choices(choices);
        self.write_line_colored(
            ConsoleColor::Cyan,
            ConsoleColor::Black,
            &render_multiple(&hotkeys, default_choices),
        )?;

        let mut results = Vec::new();
        loop {
            let marker = format!("Choice[{}]:", results.len());
            self.write_marker_colored(ConsoleColor::Cyan, &marker)?;

            let Some(input) = self.wait_for_submission(&marker)? else {
                return Err(Error::Interrupted);
            };
            let input = input.trim().to_uppercase();

            if input.is_empty() {
                return Ok(if results.is_empty() {
                    default_choices.to_vec()
                } else {
                    results
                });
            }
            match find_choice(&hotkeys, &input) {
                Some(index) => results.push(index),
                None => self.write_error_line(&format!("Invalid choice: {input}"))?,
            }
        }
    }

    fn prompt_for_credential(
        &self,
        _caption: &str,
        _message: &str,
        _user_name: &str,
        _target_name: &str,
    ) -> Result<Credential> {
        Err(Error::not_implemented("The PromptForCredential method"))
    }

    fn prompt_for_credential_with_options(
        &self,
        _caption: &str,
        _message: &str,
        _user_name: &str,
        _target_name: &str,
        _allowed_credential_types: CredentialTypes,
        _options: CredentialUiOptions,
    ) -> Result<Credential> {
        Err(Error::not_implemented("The PromptForCredential method"))
    }
}

/// The host handed to the engine.
pub struct ConsoleHost {
    name: String,
    version: String,
    ui: ConsoleHostUi,
    state: Arc<SessionState>,
}

impl ConsoleHost {
    pub fn new(ui: ConsoleHostUi, state: Arc<SessionState>) -> Self {
        Self {
            name: DEFAULT_HOST_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ui,
            state,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn console_ui(&self) -> &ConsoleHostUi {
        &self.ui
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }
}

impl Host for ConsoleHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn ui(&self) -> &dyn HostUi {
        &self.ui
    }

    fn set_should_exit(&self, exit_code: i32) {
        info!("Exit requested with code {}", exit_code);
        self.state.request_exit(exit_code);
    }

    fn enter_nested_prompt(&self) -> Result<()> {
        Err(Error::not_implemented("The EnterNestedPrompt method"))
    }

    fn exit_nested_prompt(&self) -> Result<()> {
        Err(Error::not_implemented("The ExitNestedPrompt method"))
    }

    fn notify_begin_application(&self) {}

    fn notify_end_application(&self) {}
}
