//! This module handles the configuration of a project run.
//!
//! Two files below the project root are read:
//!
//! - `var/config/chilicon-it.php` holds the host settings (`hostname`, `hostalias`, `path`). The
//!   file is optional, without it default values are used.
//! - `var/config/system.php` is Pimcore's own system config. Only the database credentials under
//!   `database.params` are used, and only the `db-dump` command requires the file.
//!
//! Both files are expected to `return` a PHP array literal. Files with a `.toml` extension are
//! parsed as TOML instead, which allows pointing the tool at a config outside of Pimcore.

pub(crate) mod php;

use crate::errors::OpsError;
use crate::paths;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Location of the host settings, relative to the project root.
pub(crate) const OPS_CONFIG_FILE: &str = "var/config/chilicon-it.php";
/// Location of Pimcore's system config, relative to the project root.
pub(crate) const SYSTEM_CONFIG_FILE: &str = "var/config/system.php";

// -------------------------------------------------------------------------------------------------
// Host settings
// -------------------------------------------------------------------------------------------------

/// Settings from `var/config/chilicon-it.php`.
///
/// # Example
///
/// ```php
/// <?php
/// return [
///     'hostalias' => ['ip-10-0-0-12' => 'web01'],
///     'path' => '/chilicon-it/{host}',
/// ];
/// ```
///
/// Values of the wrong type (`null`, `false`, ...) count as unset, like PHP's `empty()`.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub(crate) struct OpsConfig {
    /// Overrides the detected host name when not empty.
    #[serde(deserialize_with = "lenient_string")]
    pub(crate) hostname: Option<String>,
    /// Maps real host names to the names used in project paths.
    #[serde(deserialize_with = "lenient_map")]
    pub(crate) hostalias: BTreeMap<String, String>,
    /// Template of the per-host project path, `{host}` is replaced with the host name.
    #[serde(deserialize_with = "lenient_string")]
    pub(crate) path: Option<String>,
}

fn scalar_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_string(Value::deserialize(deserializer)?))
}

fn lenient_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = match Value::deserialize(deserializer)? {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| scalar_string(v).map(|v| (k, v)))
            .collect(),
        _ => BTreeMap::new(),
    };
    Ok(map)
}

/// Loads the host settings from `path`.
///
/// A missing or unreadable file is not an error, the defaults are returned instead. A file that
/// exists but cannot be parsed is.
pub(crate) fn load_ops_config(path: &Path) -> Result<OpsConfig> {
    if !path.is_file() {
        debug!("No config file found in {}, using defaults", path.display());
        return Ok(OpsConfig::default());
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Config file {} not readable, using defaults: {}", path.display(), e);
            return Ok(OpsConfig::default());
        }
    };

    let value = parse_config(path, &content)?;
    serde_json::from_value(value)
        .map_err(|e| OpsError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
        .wrap_err("Invalid host settings")
}

// -------------------------------------------------------------------------------------------------
// Database credentials
// -------------------------------------------------------------------------------------------------

/// Connection parameters for `mysqldump`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DatabaseCredentials {
    pub(crate) host: String,
    pub(crate) port: String,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) dbname: String,
}

impl DatabaseCredentials {
    /// Extracts the credentials from a parsed system config.
    ///
    /// `username`, `password` and `dbname` are required, `host` defaults to `localhost` and
    /// `port` to `3306`.
    pub(crate) fn from_config(value: &Value, path: &Path) -> Result<Self, OpsError> {
        let params = value
            .get("database")
            .and_then(|db| db.get("params"))
            .and_then(Value::as_object)
            .ok_or_else(|| OpsError::CredentialsNotFound {
                path: path.to_path_buf(),
            })?;

        let required = |key: &'static str| -> Result<String, OpsError> {
            match params.get(key) {
                Some(v) => scalar(v, key, path),
                None => Err(OpsError::MissingCredential {
                    key,
                    path: path.to_path_buf(),
                }),
            }
        };
        let optional = |key: &'static str, default: &str| -> Result<String, OpsError> {
            match params.get(key) {
                Some(v) => scalar(v, key, path),
                None => Ok(default.to_string()),
            }
        };

        Ok(DatabaseCredentials {
            username: required("username")?,
            password: required("password")?,
            dbname: required("dbname")?,
            host: optional("host", "localhost")?,
            port: optional("port", "3306")?,
        })
    }
}

/// Converts a credential value to the string put on the command line.
fn scalar(value: &Value, key: &str, path: &Path) -> Result<String, OpsError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(OpsError::ConfigParse {
            path: path.to_path_buf(),
            message: format!("database parameter '{}' must be a string or a number", key),
        }),
    }
}

/// Loads the database credentials from the system config at `path`.
pub(crate) fn load_database_credentials(path: &Path) -> Result<DatabaseCredentials> {
    if !path.is_file() {
        return Err(OpsError::ConfigNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }

    let content = std::fs::read_to_string(path).map_err(|source| OpsError::ConfigUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let value = parse_config(path, &content)?;
    Ok(DatabaseCredentials::from_config(&value, path)?)
}

/// Parses a config file based on its extension.
fn parse_config(path: &Path, content: &str) -> Result<Value, OpsError> {
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");

    if is_toml {
        toml::from_str::<Value>(content).map_err(|e| OpsError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    } else {
        php::parse_return_value(content).map_err(|e| OpsError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

// -------------------------------------------------------------------------------------------------
// Project context
// -------------------------------------------------------------------------------------------------

/// Everything a command needs to know about the project it operates on.
#[derive(Debug, Clone)]
pub(crate) struct ProjectContext {
    /// Canonical project root.
    pub(crate) root: PathBuf,
    /// Host settings.
    pub(crate) config: OpsConfig,
    /// Host name after applying the override and alias table.
    pub(crate) hostname: String,
    /// Location of the system config holding the database credentials.
    pub(crate) system_config_file: PathBuf,
}

impl ProjectContext {
    /// Per-host project directory.
    pub(crate) fn project_path(&self) -> PathBuf {
        paths::project_path(&self.root, &self.config, &self.hostname)
    }
}

#[derive(Debug, Default)]
pub(crate) struct ProjectContextBuilder {
    pub(crate) root: Option<PathBuf>,
    pub(crate) config_file: Option<PathBuf>,
    pub(crate) system_config_file: Option<PathBuf>,
    pub(crate) os_hostname: Option<String>,
}

impl ProjectContextBuilder {
    // --
    // * Builders

    pub(crate) fn with_root(&mut self, root: Option<PathBuf>) -> &mut Self {
        let new = self;
        new.root = root;
        new
    }

    pub(crate) fn with_config_file(&mut self, config_file: Option<PathBuf>) -> &mut Self {
        let new = self;
        new.config_file = config_file;
        new
    }

    pub(crate) fn with_system_config_file(
        &mut self,
        system_config_file: Option<PathBuf>,
    ) -> &mut Self {
        let new = self;
        new.system_config_file = system_config_file;
        new
    }

    pub(crate) fn with_os_hostname(&mut self, os_hostname: Option<String>) -> &mut Self {
        let new = self;
        new.os_hostname = os_hostname;
        new
    }

    /// Resolves the project root, loads the host settings and determines the host name.
    ///
    /// Resolution order for the root: the explicit value, then the current working directory.
    /// Config file locations default to their usual place below the root.
    pub(crate) fn build(&self) -> Result<ProjectContext> {
        let root = match self.root {
            Some(ref root) => expand_path(root)?,
            None => std::env::current_dir().wrap_err("Failed to determine working directory")?,
        };
        let root = root
            .canonicalize()
            .wrap_err_with(|| format!("Project root {} does not exist", root.display()))?;

        let config_file = match self.config_file {
            Some(ref path) => expand_path(path)?,
            None => root.join(OPS_CONFIG_FILE),
        };
        let system_config_file = match self.system_config_file {
            Some(ref path) => expand_path(path)?,
            None => root.join(SYSTEM_CONFIG_FILE),
        };

        let config = load_ops_config(&config_file)?;
        let os_hostname = match self.os_hostname {
            Some(ref value) => value.clone(),
            None => paths::os_hostname(),
        };
        let hostname = paths::resolve_hostname(&config, &os_hostname);

        Ok(ProjectContext {
            root,
            config,
            hostname,
            system_config_file,
        })
    }
}

/// Expands `~` and environment variables in a path given on the command line.
pub(crate) fn expand_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let expanded = shellexpand::path::full(path.as_ref())
        .wrap_err_with(|| format!("Failed to expand path {}", path.as_ref().display()))?;
    Ok(expanded.into_owned())
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
