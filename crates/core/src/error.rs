use thiserror::Error;

use crate::engine::ErrorRecord;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("The surface owner thread is no longer running.")]
    SurfaceClosed,

    #[error("The surface was called from its own owner thread.")]
    SurfaceReentered,

    #[error("{} must not be called from the thread that owns the surface.", .0)]
    WouldDeadlock(&'static str),

    #[error("{} is not implemented by this console host. Contact the system developers if this functionality is needed.", .0)]
    NotImplemented(String),

    #[error("Waiting for input was interrupted.")]
    Interrupted,

    #[error("{}", .0)]
    Runtime(ErrorRecord),

    #[error("A session is already running on this console.")]
    SessionActive,

    #[error("Invalid argument: {}", .0)]
    InvalidArgument(String),

    #[error("Error {} {} file at `{}`: {}", .action, .file_description, .path, .original)]
    Yaml {
        action: String,
        file_description: String,
        path: String,
        original: serde_yaml::Error,
    },

    #[error("IO error with {} file at path `{}`: {}", .file_description, .path, .original)]
    Io {
        file_description: String,
        path: String,
        original: std::io::Error,
    },

    #[error("Invalid pattern: {}", .0)]
    Regex(#[from] regex::Error),

    #[error("Error with sub process: {}", .0)]
    SubProcess(#[from] std::io::Error),

    #[error("Misc error: {}", .0)]
    Misc(String),
}

impl Error {
    pub fn not_implemented(member: &str) -> Self {
        Self::NotImplemented(member.to_string())
    }

    pub fn yaml_error(
        action: String,
        file_description: String,
        path: String,
        original: serde_yaml::Error,
    ) -> Self {
        Self::Yaml {
            action,
            file_description,
            path,
            original,
        }
    }

    pub fn io_error(file_description: String, path: String, original: std::io::Error) -> Self {
        Self::Io {
            file_description,
            path,
            original,
        }
    }

    /// Whether this fault was raised by the engine while running a script.
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }
}
