//! This module defines the command-line interface (CLI) structure using clap's builder pattern

use clap::{Arg, ArgAction, ArgMatches, Command, crate_name, crate_version, value_parser};
use clap_complete::Shell;
use std::path::PathBuf;

// -------------------------------------------------------------------------------------------------
// CLI builder
// -------------------------------------------------------------------------------------------------

/// Options shared by the commands that change permissions.
fn permission_args() -> [Arg; 6] {
    [
        Arg::new("group")
            .long("group")
            .short('g')
            .value_name("GROUP_NAME")
            .value_parser(value_parser!(String))
            .help("Group of the files and directories (required)"),
        Arg::new("user")
            .long("user")
            .short('u')
            .value_parser(value_parser!(String))
            .help("User of the files and directories [default: current system user]"),
        Arg::new("filemode")
            .long("filemode")
            .value_parser(value_parser!(String))
            .help("Mode of the files [default: 664]"),
        Arg::new("dirmode")
            .long("dirmode")
            .value_parser(value_parser!(String))
            .help("Mode of the directories [default: 775]"),
        Arg::new("sudo")
            .long("sudo")
            .short('S')
            .action(ArgAction::SetTrue)
            .help("Prefix the commands with sudo"),
        Arg::new("test")
            .long("test")
            .action(ArgAction::SetTrue)
            .help("Only print the commands, do not execute them"),
    ]
}

/// Constructs the CLI application definition using clap's builder pattern
///
/// Defines all commands, arguments, and help documentation.
pub(crate) fn build_cli() -> Command {
    let cmd = Command::new(crate_name!())
        .version(crate_version!())
        .about("pimcore-ops - Maintenance commands for Pimcore deployments")
        .subcommand_required(true)
        // --
        // * Main and global options
        .arg(
            Arg::new("root")
                .long("root")
                .global(true)
                .env("PIMCORE_OPS_ROOT")
                .value_parser(value_parser!(PathBuf))
                .help("Project root directory [default: current directory]"),
        )
        .arg(
            Arg::new("config_file")
                .long("config-file")
                .global(true)
                .env("PIMCORE_OPS_CONFIG")
                .value_parser(value_parser!(PathBuf))
                .help("Host settings file [default: <root>/var/config/chilicon-it.php]"),
        )
        .arg(
            Arg::new("system_config")
                .long("system-config")
                .global(true)
                .env("PIMCORE_OPS_SYSTEM_CONFIG")
                .value_parser(value_parser!(PathBuf))
                .help("Database credentials file [default: <root>/var/config/system.php]"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .global(true)
                .env("PIMCORE_OPS_VERBOSE")
                .action(ArgAction::Count)
                .help("Verbosity level (-v = debug, -vv = trace)"),
        )
        .arg(
            Arg::new("logs_dir")
                .long("logs-dir")
                .global(true)
                .env("PIMCORE_OPS_LOGS_DIR")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("logs_max")
                .long("logs-max")
                .global(true)
                .env("PIMCORE_OPS_LOGS_MAX")
                .value_parser(value_parser!(usize)),
        );

    // --
    // * Add subcommands

    // --
    // * permissions
    cmd.subcommand(
        Command::new("permissions")
            .visible_alias("permissions:change")
            .about("Change permissions for directories \"var\" and \"web/var\"")
            .long_about(
                "Change owner and permissions of the directories \"var\" and \"web/var\" so \
                 they can be written by a system user and the web server process.",
            )
            .args(permission_args())
            .arg(
                Arg::new("dir")
                    .long("dir")
                    .short('d')
                    .action(ArgAction::Append)
                    .value_parser(value_parser!(String))
                    .help("Directory to change permissions (relative to project root directory)"),
            ),
    )
    // --
    // * cache-clear
    .subcommand(
        Command::new("cache-clear")
            .visible_alias("cache:clear")
            .about("Clears Pimcore cache without errors")
            .long_about(
                "Executes \"bin/console cache:clear\" after permissions of the \"var\" directory \
                 changed, and changes them again afterwards.",
            )
            .args(permission_args()),
    )
    // --
    // * db-dump
    .subcommand(
        Command::new("db-dump")
            .visible_alias("db:dump")
            .about("Creates database dump of the current Pimcore instance")
            .long_about(
                "Creates database dump of the current Pimcore instance and saves it to the host \
                 directory (like \"chilicon-it/<HOST_NAME>/database/<DB_NAME>-<YYMMDD>-<hhmmss>.sql\").",
            )
            .arg(
                Arg::new("test")
                    .long("test")
                    .action(ArgAction::SetTrue)
                    .help("Only print the command, do not execute it"),
            ),
    )
    // --
    // * completions
    .subcommand(
        Command::new("completions")
            .about("Generate shell completions")
            .arg(
                Arg::new("shell")
                    .required(true)
                    .long("shell")
                    .short('s')
                    .value_parser(value_parser!(Shell))
                    .help("Set the shell for generating completions [values: bash, elvish, fish, powerShell, zsh]"),
            )
            .arg(
                Arg::new("out")
                    .long("out")
                    .value_parser(value_parser!(PathBuf))
                    .help("Set the out directory for writing completions file"),
            ),
    )
}

// -------------------------------------------------------------------------------------------------
// CLI Commands
// -------------------------------------------------------------------------------------------------

/// Raw permission options as given on the command line, before defaults are applied.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct PermissionOpts {
    pub(crate) group: Option<String>,
    pub(crate) user: Option<String>,
    pub(crate) filemode: Option<String>,
    pub(crate) dirmode: Option<String>,
    pub(crate) sudo: bool,
    pub(crate) test: bool,
}

impl PermissionOpts {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            group: matches.get_one::<String>("group").cloned(),
            user: matches.get_one::<String>("user").cloned(),
            filemode: matches.get_one::<String>("filemode").cloned(),
            dirmode: matches.get_one::<String>("dirmode").cloned(),
            sudo: matches.get_flag("sudo"),
            test: matches.get_flag("test"),
        }
    }
}

/// Represents parsed command-line subcommands and their arguments
///
/// Produced by parsing raw CLI arguments using clap's ArgMatches structure.
#[derive(Debug, PartialEq)]
pub(crate) enum Commands {
    Permissions {
        opts: PermissionOpts,
        dirs: Vec<String>,
    },
    CacheClear {
        opts: PermissionOpts,
    },
    DbDump {
        test: bool,
    },
    Completions {
        shell: Shell,
        out: Option<PathBuf>,
    },
}

impl Commands {
    /// Converts raw CLI matches into structured Commands enum
    ///
    /// Acts as bridge between clap's ArgMatches structure and application logic.
    pub(crate) fn parse_command(matches: &ArgMatches) -> Self {
        match matches.subcommand() {
            Some(("permissions", perm_matches)) => Commands::Permissions {
                opts: PermissionOpts::from_matches(perm_matches),
                dirs: perm_matches
                    .get_many::<String>("dir")
                    .map(|v| v.cloned().collect())
                    .unwrap_or_default(),
            },
            Some(("cache-clear", cache_matches)) => Commands::CacheClear {
                opts: PermissionOpts::from_matches(cache_matches),
            },
            Some(("db-dump", dump_matches)) => Commands::DbDump {
                test: dump_matches.get_flag("test"),
            },
            Some(("completions", completions_matches)) => Commands::Completions {
                shell: *completions_matches
                    .get_one::<Shell>("shell")
                    .expect("shell is a required argument"),
                out: completions_matches.get_one::<PathBuf>("out").cloned(),
            },
            // Default case, should never happen with clap validation
            _ => unreachable!(),
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
