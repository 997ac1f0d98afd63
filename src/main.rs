use clap::ArgMatches;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use config::ProjectContextBuilder;
use std::path::PathBuf;
use tracing::debug;

mod cli;
mod cmds;
mod config;
mod errors;
mod logs;
mod paths;
#[cfg(test)]
mod tests;
mod utils;

fn main() {
    // Initialize color_eyre
    color_eyre::install().unwrap_or_else(|e| panic!("Failed to initialize color_eyre: {:?}", e));

    let cli_matches = cli::build_cli().get_matches();

    // Initialize logging
    let mut logger_builder = logs::LoggerBuilder::default();
    logger_builder.with_verbosity(cli_matches.get_count("verbosity").min(2));
    if let Some(dir) = cli_matches.get_one::<PathBuf>("logs_dir") {
        logger_builder.with_log_dir(dir);
    }
    if let Some(max) = cli_matches.get_one::<usize>("logs_max") {
        logger_builder.with_max_logs(*max);
    }
    let logger = match logger_builder.build() {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to setup logging. Exiting");
            eprintln!("{:?}", e);
            std::process::exit(1);
        }
    };
    let log_guard = match logger.start() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging. Exiting");
            eprintln!("{:?}", e);
            std::process::exit(1);
        }
    };

    let code = match run(&cli_matches) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            eprintln!("{:?}", e);
            1
        }
    };

    // process::exit skips destructors, flush the log file first
    drop(log_guard);
    std::process::exit(code);
}

/// Resolves the project root, host settings and host name from the global CLI options.
///
/// # Errors
///
/// Returns an error if the root does not exist or the host settings file cannot be parsed.
fn init_context(cli: &ArgMatches) -> Result<config::ProjectContext> {
    let ctx = ProjectContextBuilder::default()
        .with_root(cli.get_one::<PathBuf>("root").cloned())
        .with_config_file(cli.get_one::<PathBuf>("config_file").cloned())
        .with_system_config_file(cli.get_one::<PathBuf>("system_config").cloned())
        .build()?;

    debug!("Context initialized:\n{:#?}", &ctx);
    Ok(ctx)
}

#[tokio::main]
async fn run(arg_matches: &ArgMatches) -> Result<bool> {
    let command = cli::Commands::parse_command(arg_matches);

    if let cli::Commands::Completions { shell, out } = command {
        let mut cmd = cli::build_cli();
        let name = cmd.get_name().to_string();
        if let Some(out) = out {
            clap_complete::generate_to(shell, &mut cmd, name, &out).wrap_err_with(|| {
                format!(
                    "Failed to build completions for {} and write them to {}",
                    shell,
                    out.display()
                )
            })?;
        } else {
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        }
        return Ok(true);
    }

    let ctx = init_context(arg_matches)?;
    let runner = utils::commands::ShellRunner::default();
    let mut out = std::io::stdout();

    match command {
        cli::Commands::Permissions { opts, dirs } => {
            cmds::permissions::permissions(
                &ctx,
                &opts,
                &dirs,
                utils::common::system_username,
                &runner,
                &mut out,
            )
            .await
        }
        cli::Commands::CacheClear { opts } => {
            cmds::cache_clear::cache_clear(
                &ctx,
                &opts,
                utils::common::system_username,
                &runner,
                &mut out,
            )
            .await
        }
        cli::Commands::DbDump { test } => {
            cmds::db_dump::db_dump(
                &ctx,
                test,
                chrono::Local::now().naive_local(),
                &runner,
                &mut out,
            )
            .await
        }
        cli::Commands::Completions { .. } => unreachable!(),
    }
}
