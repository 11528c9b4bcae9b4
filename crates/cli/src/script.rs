//! Turns the positional argument and `-p` parameters into the initial command.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, info};
use console_bridge_core::error::{Error, Result};

/// Parses `key=value` parameters, keeping their order.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if a parameter has no `=` or an empty key.
pub fn parse_parameters(parameters: &[String]) -> Result<IndexMap<String, String>> {
    parameters
        .iter()
        .map(|parameter| match parameter.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(Error::InvalidArgument(format!(
                "Parameter `{parameter}` must be in the format key=value"
            ))),
        })
        .collect()
}

/// `key='value';` for each parameter, in order. Values are single-quoted so
/// the shell assigns them literally.
pub fn assignments(parameters: &IndexMap<String, String>) -> String {
    parameters
        .iter()
        .map(|(key, value)| format!("{key}={};", single_quote(value)))
        .join("\n")
}

/// Wraps `value` in single quotes, closing and reopening them around each `'`.
fn single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// The command to run first.
///
/// If `command_or_script` names an existing file, its contents are used with
/// the parameter assignments in front. Otherwise it is command text.
///
/// # Errors
///
/// Returns [`Error::Io`] if the script file cannot be read.
pub fn build_command(command_or_script: &str, parameters: &IndexMap<String, String>) -> Result<String> {
    let path = Path::new(command_or_script);
    if !path.is_file() {
        debug!("Running `{}` as command text", command_or_script);
        return Ok(command_or_script.to_string());
    }

    info!("Loading script from {}", command_or_script);
    let script = fs::read_to_string(path).map_err(|e| {
        Error::io_error("script".to_string(), command_or_script.to_string(), e)
    })?;

    if parameters.is_empty() {
        return Ok(script);
    }
    Ok(format!("{}\n{script}", assignments(parameters)))
}
