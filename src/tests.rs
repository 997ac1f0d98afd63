use crate::config::{OpsConfig, ProjectContext, SYSTEM_CONFIG_FILE};
use crate::utils::commands::{CommandRunner, ShellCommand};
use color_eyre::Result;
use color_eyre::eyre::bail;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Mutex;

/// Runner that records command lines instead of executing them.
#[derive(Debug, Default)]
pub(crate) struct RecordingRunner {
    calls: Mutex<Vec<(String, Option<PathBuf>)>>,
    sudo_prepared: Mutex<usize>,
    exit_code: i32,
    sudo_refused: bool,
}

impl RecordingRunner {
    /// A runner whose commands all exit with code 1.
    pub(crate) fn failing() -> Self {
        Self {
            exit_code: 1,
            ..Default::default()
        }
    }

    /// A runner whose sudo validation fails while its commands succeed.
    pub(crate) fn refusing_sudo() -> Self {
        Self {
            sudo_refused: true,
            ..Default::default()
        }
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(line, _)| line.clone())
            .collect()
    }

    pub(crate) fn calls(&self) -> Vec<(String, Option<PathBuf>)> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    pub(crate) fn sudo_prepared(&self) -> usize {
        *self.sudo_prepared.lock().expect("lock poisoned")
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, cmd: &ShellCommand, cwd: Option<&Path>) -> Result<ExitStatus> {
        self.calls
            .lock()
            .expect("lock poisoned")
            .push((cmd.line().to_string(), cwd.map(Path::to_path_buf)));
        // Wait status layout: exit code in the second byte
        Ok(ExitStatus::from_raw(self.exit_code << 8))
    }

    async fn prepare_sudo(&self) -> Result<()> {
        *self.sudo_prepared.lock().expect("lock poisoned") += 1;
        if self.sudo_refused {
            bail!("a password is required");
        }
        Ok(())
    }
}

/// Context for a project rooted at `root` running on host `web01`.
pub(crate) fn test_context(root: &Path) -> ProjectContext {
    ProjectContext {
        root: root.to_path_buf(),
        config: OpsConfig::default(),
        hostname: "web01".to_string(),
        system_config_file: root.join(SYSTEM_CONFIG_FILE),
    }
}
