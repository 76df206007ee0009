//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for the
//! `modmeld` library. It uses the `thiserror` library to create a
//! comprehensive `Error` enum that covers all anticipated failure modes,
//! providing clear and descriptive error messages.
//!
//! All failures are file-scoped by design: the pipeline catches the error
//! for one target path, passes the baseline through unmodified, and keeps
//! merging sibling files. Nothing in this module aborts a whole run.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum that represents all possible errors that can
//!   occur while merging. Each variant corresponds to a specific type of
//!   error and includes contextual information to aid in debugging.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`, used
//!   throughout the library to simplify function signatures.

use thiserror::Error;

/// Main error type for modmeld operations
#[derive(Error, Debug)]
pub enum Error {
    /// Contributed bytes for a file could not be decoded as UTF-8.
    ///
    /// The affected file is excluded from merging; the baseline is passed
    /// through unmodified and the failure is reported, not retried.
    #[error("Encoding error in '{path}' (from '{source_id}'): {message}")]
    Encoding {
        path: String,
        source_id: String,
        message: String,
    },

    /// A decision provider was unable to pick among conflict candidates.
    ///
    /// Resolution is mandatory before a merge may proceed; a provider that
    /// cannot decide is a precondition violation and must fail loudly
    /// rather than guess.
    #[error("Unresolved conflict in '{file}' for '{subject}': {message}")]
    UnresolvedConflict {
        file: String,
        subject: String,
        message: String,
    },

    /// An interactive prompt failed (terminal closed, read error).
    #[error("Prompt error: {message}")]
    Prompt { message: String },

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Prompt {
            message: err.to_string(),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_encoding() {
        let error = Error::Encoding {
            path: "data/scripts/ai.scr".to_string(),
            source_id: "hardcore_mod.pak".to_string(),
            message: "invalid utf-8 sequence at byte 12".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Encoding error"));
        assert!(display.contains("data/scripts/ai.scr"));
        assert!(display.contains("hardcore_mod.pak"));
    }

    #[test]
    fn test_error_display_unresolved_conflict() {
        let error = Error::UnresolvedConflict {
            file: "player_variables.scr".to_string(),
            subject: "Param_max_speed".to_string(),
            message: "scripted provider ran out of answers".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("Unresolved conflict"));
        assert!(display.contains("player_variables.scr"));
        assert!(display.contains("Param_max_speed"));
    }

    #[test]
    fn test_error_from_yaml_error() {
        let yaml_str = "invalid: [unclosed";
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let error: Error = yaml_error.into();
        let display = format!("{}", error);
        assert!(display.contains("YAML parsing error"));
    }
}
