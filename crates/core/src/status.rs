//! Status classification and the collaborators that display it.

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    InProgress,
    Success,
    Failed,
}

impl Display for Status {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(match self {
            Status::InProgress => "in progress",
            Status::Success => "success",
            Status::Failed => "failed",
        })
    }
}

/// Shows status messages outside the console surface.
pub trait StatusSink: Send + Sync {
    fn print_status(&self, message: &str, status: Status);
}

/// A progress bar driven by engine progress records.
pub trait ProgressSink: Send + Sync {
    fn step_progress(&self, percent: i32);

    fn reset_progress(&self, _force: bool) {}
}

/// Surfaces errors the user must acknowledge, such as a failed session start.
pub trait MessageSink: Send + Sync {
    fn show_error(&self, title: &str, message: &str);
}

/// Known status phrases, in step order, plus the one meaning success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusVocabulary {
    phrases: Vec<String>,
    success: Option<String>,
}

/// A vocabulary phrase found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMatch {
    pub phrase: String,
    pub step: usize,
    pub status: Status,
}

impl StatusVocabulary {
    pub fn new(phrases: Vec<String>, success: Option<String>) -> Self {
        Self { phrases, success }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn success(&self) -> Option<&str> {
        self.success.as_deref()
    }

    /// The first phrase contained in `message`, ignoring case and surrounding whitespace.
    pub fn classify(&self, message: &str) -> Option<StatusMatch> {
        let message = message.trim().to_lowercase();
        let success = self
            .success
            .as_ref()
            .map(|success| success.to_lowercase())
            .unwrap_or_default();

        self.phrases
            .iter()
            .enumerate()
            .find(|(_, phrase)| message.contains(&phrase.trim().to_lowercase()))
            .map(|(step, phrase)| StatusMatch {
                phrase: phrase.clone(),
                step,
                status: if phrase.to_lowercase() == success {
                    Status::Success
                } else {
                    Status::InProgress
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary() -> StatusVocabulary {
        StatusVocabulary::new(
            vec![
                "Evaluating prerequisites".to_string(),
                "Installing required software".to_string(),
                "You are good to go!".to_string(),
            ],
            Some("you are good to go!".to_string()),
        )
    }

    #[test]
    fn test_classify_first_match_wins() {
        let found = vocabulary()
            .classify("  evaluating PREREQUISITES while installing required software\n")
            .unwrap();
        assert_eq!(found.step, 0);
        assert_eq!(found.status, Status::InProgress);
    }

    #[test]
    fn test_classify_success_phrase() {
        let found = vocabulary().classify("Done. You are good to go!").unwrap();
        assert_eq!(found.step, 2);
        assert_eq!(found.status, Status::Success);
    }

    #[test]
    fn test_classify_unknown_message() {
        assert!(vocabulary().classify("nothing to see").is_none());
        assert!(StatusVocabulary::default().classify("anything").is_none());
    }
}
