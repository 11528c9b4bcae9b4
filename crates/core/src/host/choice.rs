//! Accelerator parsing and rendering for choice prompts.

use itertools::Itertools;

use crate::host::ChoiceDescription;

/// A choice label split into its accelerator and display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hotkey {
    /// Upper-case accelerator, empty when the label has none.
    pub key: String,
    pub label: String,
}

/// Splits `"Yes to &all"` into `("A", "Yes to all")`.
///
/// A label with no `&`, or with more than one, has no accelerator and is shown as is.
pub fn parse_hotkey(input: &str) -> Hotkey {
    let fragments: Vec<&str> = input.split('&').collect();
    if let [before, after] = fragments[..] {
        Hotkey {
            key: after
                .chars()
                .next()
                .map(|ch| ch.to_uppercase().collect())
                .unwrap_or_default(),
            label: format!("{before}{after}").trim().to_string(),
        }
    } else {
        Hotkey {
            key: String::new(),
            label: input.to_string(),
        }
    }
}

pub fn parse_choices(choices: &[ChoiceDescription]) -> Vec<Hotkey> {
    choices
        .iter()
        .map(|choice| parse_hotkey(&choice.label))
        .collect()
}

/// The index of the choice whose accelerator matches `input`, ignoring case.
pub fn find_choice(hotkeys: &[Hotkey], input: &str) -> Option<usize> {
    let input = input.trim().to_uppercase();
    if input.is_empty() {
        return None;
    }
    hotkeys.iter().position(|hotkey| hotkey.key == input)
}

fn options_line(hotkeys: &[Hotkey]) -> String {
    hotkeys
        .iter()
        .map(|hotkey| format!("|{}> {} ", hotkey.key, hotkey.label))
        .collect()
}

/// `|Y> Yes |N> No [Default is (Y]`
pub fn render_single(hotkeys: &[Hotkey], default_choice: Option<usize>) -> String {
    let mut line = options_line(hotkeys);
    if let Some(default) = default_choice.and_then(|index| hotkeys.get(index)) {
        line.push_str(&format!("[Default is ({}]", default.key));
    }
    line
}

/// `|Y> Yes |N> No [Default choices are "Y","N"]`
pub fn render_multiple(hotkeys: &[Hotkey], default_choices: &[usize]) -> String {
    let mut line = options_line(hotkeys);
    let defaults: Vec<&Hotkey> = default_choices
        .iter()
        .filter_map(|index| hotkeys.get(*index))
        .collect();

    if !defaults.is_empty() {
        line.push_str(if defaults.len() == 1 {
            "[Default choice is "
        } else {
            "[Default choices are "
        });
        line.push_str(
            &defaults
                .iter()
                .map(|hotkey| format!("\"{}\"", hotkey.key))
                .join(","),
        );
        line.push(']');
    }
    line
}
