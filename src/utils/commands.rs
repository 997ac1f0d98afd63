//! Shell command execution.
//!
//! Commands are built as complete shell command lines (with redirections, `find -exec`, ...) and
//! handed to `sh -c`. Running goes through the [`CommandRunner`] trait so the commands can be
//! recorded instead of executed.

use crate::logs::log_output;
use crate::utils::sudo::SudoSession;
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, WrapErr};
use std::io::Write;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// A shell command line together with the text shown to the user.
///
/// The displayed text differs from the executed one when it has to hide secrets.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ShellCommand {
    line: String,
    display: Option<String>,
}

impl ShellCommand {
    pub(crate) fn new<S: Into<String>>(line: S) -> Self {
        Self {
            line: line.into(),
            display: None,
        }
    }

    /// Replaces the text shown in place of the command line.
    pub(crate) fn with_display<S: Into<String>>(mut self, display: S) -> Self {
        self.display = Some(display.into());
        self
    }

    /// The command line handed to the shell.
    pub(crate) fn line(&self) -> &str {
        &self.line
    }

    /// The command line as shown to the user.
    pub(crate) fn display(&self) -> &str {
        self.display.as_deref().unwrap_or(&self.line)
    }
}

/// Executes shell command lines.
pub(crate) trait CommandRunner {
    /// Runs the command line of `cmd` with `sh -c`, optionally in `cwd`, and waits for it to
    /// finish. Errors only mention the displayed text of `cmd`.
    async fn run(&self, cmd: &ShellCommand, cwd: Option<&Path>) -> Result<ExitStatus>;

    /// Makes sure elevated commands can run without prompting in the middle of the output.
    async fn prepare_sudo(&self) -> Result<()>;
}

/// Runs commands through the system shell, forwarding their output to the terminal.
#[derive(Debug, Default)]
pub(crate) struct ShellRunner {
    sudo: SudoSession,
}

impl CommandRunner for ShellRunner {
    async fn run(&self, cmd: &ShellCommand, cwd: Option<&Path>) -> Result<ExitStatus> {
        let mut sh = Command::new("sh");
        sh.arg("-c")
            .arg(cmd.line())
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            sh.current_dir(dir);
        }

        let mut run = sh
            .spawn()
            .wrap_err_with(|| format!("Failed to spawn sh -c {}", cmd.display()))?;

        let stdout = run.stdout.take().ok_or_eyre("Stdout handle present")?;
        let stderr = run.stderr.take().ok_or_eyre("Stderr handle present")?;

        // Forward output while it is produced
        let stdout_handle = tokio::task::spawn(capture_stream(stdout, tokio::io::stdout()));
        let stderr_handle = tokio::task::spawn(capture_stream(stderr, tokio::io::stderr()));

        let status = run
            .wait()
            .await
            .wrap_err_with(|| format!("Failed to execute sh -c {}", cmd.display()))?;
        let (stdout_result, stderr_result) = tokio::join!(stdout_handle, stderr_handle);

        let stdout = stdout_result.wrap_err("Stdout task panicked")?;
        let stderr = stderr_result.wrap_err("Stderr task panicked")?;
        log_output!(stdout, "stdout", "sh", debug);
        log_output!(stderr, "stderr", "sh", debug);

        Ok(status)
    }

    async fn prepare_sudo(&self) -> Result<()> {
        self.sudo.validate().await
    }
}

/// Captures data from an input stream while simultaneously writing it to an output stream.
///
/// # Arguments
/// * `stream` - The input stream to read from
/// * `writer` - The output stream to write to
///
/// # Returns
/// A `Vec<u8>` containing all captured bytes from the input stream.
async fn capture_stream<R, W>(stream: R, mut writer: W) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut buffer = Vec::new();
    let mut reader = tokio::io::BufReader::new(stream);
    let mut chunk = vec![0; 1024];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let data = &chunk[..n];
                writer.write_all(data).await.ok();
                writer.flush().await.ok();
                buffer.extend_from_slice(data);
            }
            Err(e) => {
                warn!("Error reading command output: {}", e);
                break;
            }
        }
    }
    buffer
}

/// Prints and runs one command.
///
/// The command is echoed as `<label>: <command>`, or as `TEST: <command>` in dry-run mode, in
/// which case nothing is executed. A non-zero exit status does not stop the caller; it is logged
/// and reported as `Ok(false)`.
pub(crate) async fn execute<R, W>(
    runner: &R,
    out: &mut W,
    cmd: &ShellCommand,
    label: &str,
    dry_run: bool,
    cwd: Option<&Path>,
) -> Result<bool>
where
    R: CommandRunner,
    W: Write,
{
    let label = if dry_run { "TEST" } else { label };
    writeln!(out, "{}: {}", label, cmd.display())?;
    out.flush()?;

    if dry_run {
        return Ok(true);
    }

    debug!("Running `{}`", cmd.display());
    let status = runner.run(cmd, cwd).await?;
    if status.success() {
        Ok(true)
    } else {
        warn!(
            "Command exited with {}: {}",
            status
                .code()
                .map_or_else(|| "a signal".to_string(), |c| format!("code {}", c)),
            cmd.display()
        );
        Ok(false)
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::RecordingRunner;

    #[test]
    fn test_shell_command_display() {
        let cmd = ShellCommand::new("echo secret");
        assert_eq!(cmd.display(), "echo secret");

        let cmd = cmd.with_display("echo *****");
        assert_eq!(cmd.line(), "echo secret");
        assert_eq!(cmd.display(), "echo *****");
    }

    #[tokio::test]
    async fn test_shell_runner() -> Result<()> {
        let runner = ShellRunner::default();
        let ok = ShellCommand::new("test 4 -gt 0");
        let fails = ShellCommand::new("test 4 -eq 0");
        assert!(runner.run(&ok, None).await?.success());
        assert!(!runner.run(&fails, None).await?.success());

        let temp_dir = tempfile::tempdir()?;
        let touch = ShellCommand::new("echo ok > marker");
        assert!(runner.run(&touch, Some(temp_dir.path())).await?.success());
        assert!(temp_dir.path().join("marker").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_spawn_error_hides_secret() -> Result<()> {
        let runner = ShellRunner::default();
        let temp_dir = tempfile::tempdir()?;
        let cmd = ShellCommand::new("mysqldump --password=Tr0ub4dor shop")
            .with_display("mysqldump --password=***** shop");

        let err = runner
            .run(&cmd, Some(&temp_dir.path().join("missing")))
            .await
            .unwrap_err();
        let report = format!("{:?}", err);
        assert!(report.contains("--password=*****"), "{}", report);
        assert!(!report.contains("Tr0ub4dor"), "{}", report);
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_echoes_and_runs() -> Result<()> {
        let runner = RecordingRunner::default();
        let mut out = Vec::new();
        let cmd = ShellCommand::new("chown -R a:b /x");

        assert!(execute(&runner, &mut out, &cmd, "RUN", false, None).await?);
        assert_eq!(String::from_utf8(out)?, "RUN: chown -R a:b /x\n");
        assert_eq!(runner.lines(), vec!["chown -R a:b /x".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_dry_run() -> Result<()> {
        let runner = RecordingRunner::default();
        let mut out = Vec::new();
        let cmd = ShellCommand::new("mysqldump --password=pw db").with_display("mysqldump db");

        assert!(execute(&runner, &mut out, &cmd, "EXEC", true, None).await?);
        assert_eq!(String::from_utf8(out)?, "TEST: mysqldump db\n");
        assert!(runner.lines().is_empty(), "Nothing runs in dry-run mode");
        Ok(())
    }

    #[tokio::test]
    async fn test_execute_failure_is_reported() -> Result<()> {
        let runner = RecordingRunner::failing();
        let mut out = Vec::new();
        let cmd = ShellCommand::new("false");

        assert!(!execute(&runner, &mut out, &cmd, "RUN", false, None).await?);
        assert_eq!(runner.lines().len(), 1);
        Ok(())
    }
}
