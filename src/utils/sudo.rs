//! Sudo session handling.
//!
//! Elevated commands are run as `sudo <cmd>` through the shell. To keep the password prompt from
//! being interleaved with the forwarded command output, the credentials are validated once with
//! `sudo -v` before the first elevated command runs.
//!
//! The idea is adapted from: https://github.com/Morganamilo/paru/blob/5355012aa3529014145b8940dd0c62b21e53095a/src/exec.rs#L144

use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
pub(crate) struct GetRootCmd {
    cmd: String,
    validate_flags: Vec<String>,
}

impl GetRootCmd {
    pub(crate) fn use_sudo() -> Self {
        GetRootCmd {
            cmd: "sudo".to_string(),
            validate_flags: vec!["-v".to_string()],
        }
    }
}

#[derive(Debug)]
pub(crate) struct SudoSession {
    root_cmd: GetRootCmd,
    validated: AtomicBool,
    lock: Mutex<()>,
}

impl Default for SudoSession {
    fn default() -> Self {
        Self {
            root_cmd: GetRootCmd::use_sudo(),
            validated: AtomicBool::new(false),
            lock: Mutex::new(()),
        }
    }
}

impl SudoSession {
    /// Validates the sudo credentials, prompting for a password if needed.
    ///
    /// Only the first call runs `sudo -v`, later calls return immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if sudo cannot be executed or the validation is refused.
    pub(crate) async fn validate(&self) -> Result<()> {
        if self.validated.load(Ordering::Relaxed) {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        // Double-check the flag, another caller may have validated meanwhile
        if self.validated.load(Ordering::Relaxed) {
            return Ok(());
        }

        debug!("Requesting ROOT privileges");
        let status = Command::new(&self.root_cmd.cmd)
            .args(&self.root_cmd.validate_flags)
            // This allows sudo to read the password from the terminal
            .stdin(Stdio::inherit())
            .status()
            .await
            .wrap_err("Failed to execute sudo command")?;

        if !status.success() {
            bail!("Sudo command failed, elevated commands cannot be run");
        }

        self.validated.store(true, Ordering::Relaxed);
        Ok(())
    }
}

//
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validated_session_skips_sudo() -> Result<()> {
        let session = SudoSession {
            root_cmd: GetRootCmd {
                cmd: "false".to_string(),
                validate_flags: vec![],
            },
            validated: AtomicBool::new(true),
            lock: Mutex::new(()),
        };
        session.validate().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_validation() {
        let session = SudoSession {
            root_cmd: GetRootCmd {
                cmd: "false".to_string(),
                validate_flags: vec![],
            },
            ..Default::default()
        };
        assert!(session.validate().await.is_err());
        assert!(!session.validated.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_successful_validation_is_remembered() -> Result<()> {
        let session = SudoSession {
            root_cmd: GetRootCmd {
                cmd: "true".to_string(),
                validate_flags: vec![],
            },
            ..Default::default()
        };
        session.validate().await?;
        assert!(session.validated.load(Ordering::Relaxed));
        Ok(())
    }
}
