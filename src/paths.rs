//! Host name resolution and per-host project paths.
//!
//! The project path is derived from a template like `/chilicon-it/{host}` in which `{host}` is
//! replaced with the machine's host name, an alias of it, or an explicit override from the
//! project config.

use crate::config::OpsConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Template used when the project config does not define `path`.
pub(crate) const DEFAULT_PATH_TEMPLATE: &str = "/chilicon-it/{host}";

/// Replaces every `{name}` in `template` with its value.
///
/// The template is scanned once, so inserted values are never substituted themselves.
/// Placeholders without a value stay as they are.
///
/// ```ignore
/// let path = substitute("/{dir}/{file}", &[("dir", "tmp"), ("file", "some-file.txt")]);
/// assert_eq!(path, "/tmp/some-file.txt");
/// ```
pub(crate) fn substitute<K, V>(template: &str, values: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(k, _)| k.as_ref() == name)
                .map(|(_, v)| (v.as_ref(), close))
        });

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Picks the host name used for the project path.
///
/// Priority: a non-empty `hostname` from the config, then the alias registered for
/// `os_hostname`, then `os_hostname` itself.
pub(crate) fn resolve_hostname(config: &OpsConfig, os_hostname: &str) -> String {
    if let Some(ref hostname) = config.hostname {
        if !hostname.is_empty() {
            return hostname.clone();
        }
    }

    config
        .hostalias
        .get(os_hostname)
        .cloned()
        .unwrap_or_else(|| os_hostname.to_string())
}

/// Retrieve the hostname.
///
/// Uses the `nix` crate to get the system hostname. Returns "unknown" if not successful.
pub(crate) fn os_hostname() -> String {
    match nix::unistd::gethostname() {
        Ok(hostname) => match hostname.into_string() {
            Ok(host) => host,
            Err(e) => {
                warn!("Host name is not valid UTF-8, defaulting to 'unknown': {:?}", e);
                "unknown".to_string()
            }
        },
        Err(e) => {
            warn!("Could not determine hostname, defaulting to 'unknown': {}", e);
            "unknown".to_string()
        }
    }
}

/// Returns the project directory of `host` below `root`.
///
/// The template from the config (or [`DEFAULT_PATH_TEMPLATE`]) is appended to the root as a
/// string, so a leading `/` keeps it inside the root instead of making it absolute.
pub(crate) fn project_path(root: &Path, config: &OpsConfig, host: &str) -> PathBuf {
    let template = config
        .path
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PATH_TEMPLATE);

    append_to_root(root, &substitute(template, &[("host", host)]))
}

/// Appends `rel` to `root`, inserting a `/` when `rel` does not start with one.
pub(crate) fn append_to_root(root: &Path, rel: &str) -> PathBuf {
    let mut joined = OsString::from(root.as_os_str());
    if !rel.starts_with('/') {
        joined.push("/");
    }
    joined.push(rel);
    PathBuf::from(joined)
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config_with(hostname: Option<&str>, aliases: &[(&str, &str)]) -> OpsConfig {
        OpsConfig {
            hostname: hostname.map(str::to_string),
            hostalias: aliases
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            path: None,
        }
    }

    #[test]
    fn test_substitute() {
        assert_eq!(
            substitute("/{dir}/{file}", &[("dir", "tmp"), ("file", "some-file.txt")]),
            "/tmp/some-file.txt"
        );
        assert_eq!(
            substitute("/{host}/a/{host}", &[("host", "web01")]),
            "/web01/a/web01",
            "Every occurrence should be replaced"
        );
        assert_eq!(
            substitute("/data/{host}/{env}", &[("host", "web01")]),
            "/data/web01/{env}",
            "Unmatched placeholders stay literal"
        );
        let empty: [(&str, &str); 0] = [];
        assert_eq!(substitute("/plain/{host}", &empty), "/plain/{host}");
        assert_eq!(
            substitute("/{host}", &[("host", "{host}")]),
            "/{host}",
            "Inserted values are not substituted again"
        );
        assert_eq!(
            substitute("{a}/{b}", &[("a", "{b}"), ("b", "x")]),
            "{b}/x",
            "Values are not rescanned for later keys"
        );
        assert_eq!(substitute("{{host}}", &[("host", "web01")]), "{web01}");
    }

    #[test]
    fn test_resolve_hostname() {
        let config = config_with(Some("override"), &[("box", "alias")]);
        assert_eq!(resolve_hostname(&config, "box"), "override");

        let config = config_with(Some(""), &[("box", "alias")]);
        assert_eq!(
            resolve_hostname(&config, "box"),
            "alias",
            "An empty override falls through to the alias table"
        );

        let config = config_with(None, &[("other", "alias")]);
        assert_eq!(resolve_hostname(&config, "box"), "box");

        assert_eq!(resolve_hostname(&OpsConfig::default(), "box"), "box");
    }

    #[test]
    fn test_os_hostname_not_empty() {
        assert!(!os_hostname().is_empty());
    }

    #[test]
    fn test_project_path() {
        let root = Path::new("/srv/shop");

        assert_eq!(
            project_path(root, &OpsConfig::default(), "web01"),
            PathBuf::from("/srv/shop/chilicon-it/web01")
        );

        let config = OpsConfig {
            path: Some("/backups/{host}/current".to_string()),
            ..Default::default()
        };
        assert_eq!(
            project_path(root, &config, "web01"),
            PathBuf::from("/srv/shop/backups/web01/current")
        );

        let config = OpsConfig {
            path: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            project_path(root, &config, "web01"),
            PathBuf::from("/srv/shop/chilicon-it/web01"),
            "An empty template falls back to the default"
        );
    }

    #[test]
    fn test_append_to_root() {
        let root = Path::new("/srv/shop");
        assert_eq!(append_to_root(root, "/var"), PathBuf::from("/srv/shop/var"));
        assert_eq!(append_to_root(root, "web/var"), PathBuf::from("/srv/shop/web/var"));
    }
}
