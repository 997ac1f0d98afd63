//! Error types shared by the commands.
//!
//! Everything here is fatal for the running command: errors are wrapped into a `color_eyre`
//! report and end the process with a non-zero exit code.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum OpsError {
    /// A required command line option was not given or was empty.
    #[error("{hint}")]
    MissingOption { flag: &'static str, hint: String },

    /// A file or directory mode is not a valid octal mode.
    #[error("Invalid value '{value}' for --{flag}: expected an octal mode like 664 or 0775")]
    InvalidMode { flag: &'static str, value: String },

    #[error("System config file not found: '{}'", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("Config file not readable: '{}'", path.display())]
    ConfigUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("Database connection credentials not found in the file: '{}'", path.display())]
    CredentialsNotFound { path: PathBuf },

    #[error("Database {key} not found in the file: '{}'", path.display())]
    MissingCredential { key: &'static str, path: PathBuf },

    #[error("Unable to create directory for database dump files: {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OpsError {
    pub(crate) fn missing_group() -> Self {
        OpsError::MissingOption {
            flag: "group",
            hint: "Group name is required. Please specify \"--group=<GROUP_NAME>\".".to_string(),
        }
    }

    pub(crate) fn missing_dirs() -> Self {
        OpsError::MissingOption {
            flag: "dir",
            hint: "List of directories is required. Please specify \"--dir=<RELATIVE_DIRECTORY>\"."
                .to_string(),
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
