//! Configuration path utilities and the console settings file.
//!
//! Settings come from a YAML file; every field is optional and a missing file
//! means defaults. Paths may use `~`.

use std::fs;
use std::io::ErrorKind;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

use crate::color::ConsoleColor;
use crate::error::{Error, Result};
use crate::status::StatusVocabulary;

/// Default path for the console configuration file
pub const DEFAULT_CONFIG_PATH: &str = "~/.console-bridge/config.yml";

/// Default shell to use for command execution
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Resolves the configuration file path.
///
/// If a custom path is provided, uses that path. Otherwise, uses the default
/// configuration path. Shell expansions like `~` are resolved.
///
/// # Examples
///
/// ```
/// use console_bridge_core::config::get_config_path;
///
/// let default_path = get_config_path(&None);
/// assert!(default_path.ends_with("config.yml"));
/// ```
pub fn get_config_path(config_path_arg: &Option<String>) -> String {
    let config_path = match config_path_arg {
        Some(config_path) => config_path,
        None => DEFAULT_CONFIG_PATH,
    };

    shellexpand::tilde(config_path).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub print_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub shell: Option<String>,
    pub profile: Vec<String>,
    pub status_updates: Vec<String>,
    pub status_success: Option<String>,
    pub text_color: ConsoleColor,
    pub banner: bool,
    pub host_name: Option<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            print_delay_ms: 35,
            poll_interval_ms: 100,
            shell: None,
            profile: Vec::new(),
            status_updates: Vec::new(),
            status_success: None,
            text_color: ConsoleColor::White,
            banner: true,
            host_name: None,
        }
    }
}

impl ConsoleConfig {
    pub fn print_delay(&self) -> Duration {
        Duration::from_millis(self.print_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shell(&self) -> &str {
        self.shell.as_deref().unwrap_or(DEFAULT_SHELL)
    }

    /// The status vocabulary, if any phrases are configured.
    pub fn status_vocabulary(&self) -> Option<StatusVocabulary> {
        if self.status_updates.is_empty() {
            return None;
        }
        Some(StatusVocabulary::new(
            self.status_updates.clone(),
            self.status_success.clone(),
        ))
    }
}

/// Loads the console configuration from `path`.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file exists but cannot be read and
/// [`Error::Yaml`] if it is not valid.
pub fn load_config(path: &str) -> Result<ConsoleConfig> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No configuration at {}, using defaults", path);
            return Ok(ConsoleConfig::default());
        }
        Err(e) => {
            return Err(Error::io_error(
                "configuration".to_string(),
                path.to_string(),
                e,
            ))
        }
    };

    if contents.trim().is_empty() {
        return Ok(ConsoleConfig::default());
    }

    debug!("Parsing configuration at {}", path);
    serde_yaml::from_str(&contents).map_err(|e| {
        Error::yaml_error(
            "parsing".to_string(),
            "configuration".to_string(),
            path.to_string(),
            e,
        )
    })
}
