use crate::config::{DatabaseCredentials, ProjectContext, load_database_credentials};
use crate::errors::OpsError;
use crate::utils::commands::{CommandRunner, ShellCommand, execute};
use crate::utils::common::quote;
use chrono::NaiveDateTime;
use color_eyre::{Result, Section};
use std::io::Write;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Shown instead of the password.
const PASSWORD_MASK: &str = "*****";

/// Name of the dump file for `dbname` taken at `now`: `<dbname>-<YYMMDD>-<hhmmss>.sql`.
pub(crate) fn dump_file_name(dbname: &str, now: &NaiveDateTime) -> String {
    format!("{}-{}.sql", dbname, now.format("%y%m%d-%H%M%S"))
}

/// Returns `<project path>/database`, creating it if needed.
pub(crate) fn dump_directory(project_path: &Path) -> Result<PathBuf, OpsError> {
    let dir = project_path.join("database");

    if !dir.is_dir() {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&dir)
            .map_err(|source| OpsError::CreateDir {
                path: dir.clone(),
                source,
            })?;
    }

    Ok(dir)
}

/// A `mysqldump` invocation writing to `target`.
#[derive(Debug)]
pub(crate) struct MysqlDump<'a> {
    pub(crate) credentials: &'a DatabaseCredentials,
    pub(crate) target: PathBuf,
}

impl MysqlDump<'_> {
    fn render(&self, password: &str) -> String {
        let creds = self.credentials;
        format!(
            "mysqldump --host={} --port={} --user={} --password={} {} > {}",
            quote(&creds.host),
            quote(&creds.port),
            quote(&creds.username),
            password,
            quote(&creds.dbname),
            quote(&self.target.to_string_lossy())
        )
    }

    /// The command to execute, with the real password, shown with the password masked.
    pub(crate) fn command(&self) -> ShellCommand {
        ShellCommand::new(self.render(&quote(&self.credentials.password)))
            .with_display(self.render(PASSWORD_MASK))
    }
}

/// Entry point of the `db-dump` command.
///
/// `now` determines the timestamp in the file name.
pub(crate) async fn db_dump<R, W>(
    ctx: &ProjectContext,
    test: bool,
    now: NaiveDateTime,
    runner: &R,
    out: &mut W,
) -> Result<bool>
where
    R: CommandRunner,
    W: Write,
{
    let credentials = load_database_credentials(&ctx.system_config_file)
        .suggestion("Use --system-config to read the credentials from another file")?;
    writeln!(
        out,
        "Loading database configuration from '{}'...",
        ctx.system_config_file.display()
    )?;

    let dir = dump_directory(&ctx.project_path())?;
    let dump = MysqlDump {
        credentials: &credentials,
        target: dir.join(dump_file_name(&credentials.dbname, &now)),
    };
    let cmd = dump.command();

    writeln!(out, "Creating database dump...")?;
    writeln!(out, "HOST: {}", ctx.hostname)?;
    writeln!(out, "CMD : {}", cmd.display())?;

    info!("Dumping database {} to {}", credentials.dbname, dump.target.display());
    if test {
        execute(runner, out, &cmd, "EXEC", true, None).await
    } else {
        let success = runner.run(&cmd, None).await?.success();
        if !success {
            tracing::warn!("mysqldump failed, {} may be incomplete", dump.target.display());
        }
        Ok(success)
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
