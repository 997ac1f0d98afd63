use crate::cli::PermissionOpts;
use crate::cmds::permissions::{PermissionRequest, change_permissions};
use crate::config::ProjectContext;
use crate::paths::append_to_root;
use crate::utils::commands::{CommandRunner, ShellCommand, execute};
use crate::utils::common::quote;
use color_eyre::Result;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// `bin/console cache:clear` of the project at `root`.
pub(crate) fn clear_cache_command(root: &Path) -> ShellCommand {
    let console = append_to_root(root, "/bin/console");
    ShellCommand::new(format!(
        "{} cache:clear",
        quote(&console.to_string_lossy())
    ))
}

/// Entry point of the `cache-clear` command.
///
/// The cache is cleared by a process that may run as another user and leave files behind that
/// the web server cannot write. Permissions of `var` are therefore fixed before clearing, so
/// old files can be removed, and again afterwards.
pub(crate) async fn cache_clear<R, W, F>(
    ctx: &ProjectContext,
    opts: &PermissionOpts,
    default_user: F,
    runner: &R,
    out: &mut W,
) -> Result<bool>
where
    R: CommandRunner,
    W: Write,
    F: FnOnce() -> String,
{
    let dirs = vec![append_to_root(&ctx.root, "/var")];
    let request = PermissionRequest::resolve(opts, dirs, default_user)?;
    info!("Clearing cache of {}", ctx.root.display());

    writeln!(out, "Clear cache in safe way...\n")?;

    let mut success = change_permissions(&request, runner, out).await?;

    let cmd = clear_cache_command(&ctx.root);
    success &= execute(runner, out, &cmd, "EXEC", request.dry_run, Some(&ctx.root)).await?;

    writeln!(out)?;

    success &= change_permissions(&request, runner, out).await?;

    writeln!(out, "\nCOMPLETE :)\n")?;
    Ok(success)
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
