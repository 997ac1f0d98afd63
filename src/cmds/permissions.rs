use crate::cli::PermissionOpts;
use crate::config::ProjectContext;
use crate::errors::OpsError;
use crate::paths::append_to_root;
use crate::utils::commands::{CommandRunner, ShellCommand, execute};
use crate::utils::common::quote;
use color_eyre::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub(crate) const DEFAULT_FILEMODE: &str = "664";
pub(crate) const DEFAULT_DIRMODE: &str = "775";

/// Directories handled when no `--dir` is given, relative to the project root.
pub(crate) const DEFAULT_DIRS: [&str; 2] = ["/var", "/web/var"];

/// A fully resolved permission change.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PermissionRequest {
    pub(crate) dirs: Vec<PathBuf>,
    pub(crate) username: String,
    pub(crate) group: String,
    pub(crate) filemode: String,
    pub(crate) dirmode: String,
    pub(crate) sudo: bool,
    pub(crate) dry_run: bool,
}

impl PermissionRequest {
    /// Applies defaults to the command line options and validates them.
    ///
    /// * `opts` - Options as given on the command line
    /// * `dirs` - Absolute directories to process
    /// * `default_user` - Called for the user name when `--user` is missing or empty
    ///
    /// # Errors
    ///
    /// Returns an error if the group is missing, `dirs` is empty or a mode is not octal.
    pub(crate) fn resolve<F>(
        opts: &PermissionOpts,
        dirs: Vec<PathBuf>,
        default_user: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> String,
    {
        let group = non_empty(&opts.group).ok_or_else(OpsError::missing_group)?;
        if dirs.is_empty() {
            return Err(OpsError::missing_dirs().into());
        }

        let username = non_empty(&opts.user).unwrap_or_else(default_user);
        let filemode = match non_empty(&opts.filemode) {
            Some(mode) => validate_mode("filemode", mode)?,
            None => DEFAULT_FILEMODE.to_string(),
        };
        let dirmode = match non_empty(&opts.dirmode) {
            Some(mode) => validate_mode("dirmode", mode)?,
            None => DEFAULT_DIRMODE.to_string(),
        };

        Ok(Self {
            dirs,
            username,
            group,
            filemode,
            dirmode,
            sudo: opts.sudo,
            dry_run: opts.test,
        })
    }

    fn prefix(&self) -> &'static str {
        if self.sudo { "sudo " } else { "" }
    }

    /// `chown -R user:group` over all directories at once.
    pub(crate) fn chown_command(&self) -> ShellCommand {
        let dirs = self
            .dirs
            .iter()
            .map(|d| quote(&d.to_string_lossy()).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        ShellCommand::new(format!(
            "{}chown -R {}:{} {}",
            self.prefix(),
            quote(&self.username),
            quote(&self.group),
            dirs
        ))
    }

    /// Sets the file mode on every regular file below `dir`.
    pub(crate) fn chmod_files_command(&self, dir: &Path) -> ShellCommand {
        ShellCommand::new(format!(
            "{}find {} -type f -exec chmod {} {{}} \\;",
            self.prefix(),
            quote(&dir.to_string_lossy()),
            self.filemode
        ))
    }

    /// Sets the directory mode on `dir` and every directory below it.
    pub(crate) fn chmod_dirs_command(&self, dir: &Path) -> ShellCommand {
        ShellCommand::new(format!(
            "{}find {} -type d -exec chmod {} {{}} \\;",
            self.prefix(),
            quote(&dir.to_string_lossy()),
            self.dirmode
        ))
    }

    /// All commands in execution order: the `chown`, then files and directories of each
    /// directory in turn.
    pub(crate) fn commands(&self) -> Vec<ShellCommand> {
        let mut cmds = vec![self.chown_command()];
        for dir in &self.dirs {
            cmds.push(self.chmod_files_command(dir));
            cmds.push(self.chmod_dirs_command(dir));
        }
        cmds
    }

    fn write_summary<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "USER     : {}", self.username)?;
        writeln!(out, "GROUP    : {}", self.group)?;
        writeln!(out, "FILEMODE : {}", self.filemode)?;
        writeln!(out, "DIRMODE  : {}", self.dirmode)?;
        writeln!(out, "SUDO     : {}", if self.sudo { "yes" } else { "no" })?;
        writeln!(out)?;
        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Accepts modes of three or four octal digits.
fn validate_mode(flag: &'static str, value: String) -> Result<String, OpsError> {
    let valid = (3..=4).contains(&value.len()) && value.chars().all(|c| ('0'..='7').contains(&c));
    if valid {
        Ok(value)
    } else {
        Err(OpsError::InvalidMode { flag, value })
    }
}

/// Builds the directory list from `--dir` values.
///
/// Values are relative to the project root, a leading `/` is allowed. Empty values are skipped.
/// Without any value the default directories are used.
pub(crate) fn resolve_dirs(root: &Path, dir_args: &[String]) -> Vec<PathBuf> {
    if dir_args.is_empty() {
        return DEFAULT_DIRS
            .iter()
            .map(|d| append_to_root(root, d))
            .collect();
    }

    dir_args
        .iter()
        .filter(|d| !d.is_empty())
        .map(|d| append_to_root(root, d))
        .collect()
}

/// Prints the summary and runs all commands of `request`.
///
/// Every command is run even if a previous one failed. Returns `Ok(false)` if any command exited
/// with a non-zero status.
pub(crate) async fn change_permissions<R, W>(
    request: &PermissionRequest,
    runner: &R,
    out: &mut W,
) -> Result<bool>
where
    R: CommandRunner,
    W: Write,
{
    request.write_summary(out)?;

    // Not fatal: sudoers may allow the commands themselves without allowing `sudo -v`
    if request.sudo && !request.dry_run {
        if let Err(e) = runner.prepare_sudo().await {
            warn!("Could not validate sudo credentials: {:#}", e);
        }
    }

    let mut success = true;
    for cmd in request.commands() {
        success &= execute(runner, out, &cmd, "RUN", request.dry_run, None).await?;
    }
    Ok(success)
}

/// Entry point of the `permissions` command.
pub(crate) async fn permissions<R, W, F>(
    ctx: &ProjectContext,
    opts: &PermissionOpts,
    dir_args: &[String],
    default_user: F,
    runner: &R,
    out: &mut W,
) -> Result<bool>
where
    R: CommandRunner,
    W: Write,
    F: FnOnce() -> String,
{
    let dirs = resolve_dirs(&ctx.root, dir_args);
    let request = PermissionRequest::resolve(opts, dirs, default_user)?;
    info!(
        "Changing permissions of {} director{} in {}",
        request.dirs.len(),
        if request.dirs.len() == 1 { "y" } else { "ies" },
        ctx.root.display()
    );

    let success = change_permissions(&request, runner, out).await?;

    writeln!(out, "\nCOMPLETE :)\n")?;
    Ok(success)
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
