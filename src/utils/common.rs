//! Common utility functions module.

use std::borrow::Cow;

/// Returns the name of the user invoking the tool.
///
/// When run through `sudo`, `SUDO_USER` names the user who called sudo and is preferred over the
/// effective user.
pub(crate) fn system_username() -> String {
    match std::env::var("SUDO_USER") {
        Ok(user) if !user.is_empty() => user,
        _ => whoami::username(),
    }
}

/// Quotes `value` for use as a single shell word. Plain words are returned unchanged.
pub(crate) fn quote(value: &str) -> Cow<'_, str> {
    shell_words::quote(value)
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
