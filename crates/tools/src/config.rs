use std::path::PathBuf;
use std::time::Duration;

use dllp_core::registry::DEFAULT_UCR_DIR;
use dllp_directory::udm::{DEFAULT_LDAPSEARCH_BIN, DEFAULT_UDM_BIN};
use dllp_directory::UdmCli;
use dllp_graph::account::DEFAULT_OFFICE365_DIR;
use dllp_graph::{DEFAULT_GRAPH_URL, DEFAULT_LOGIN_URL};

/// A variable was set to a value that does not parse.
#[derive(Debug, thiserror::Error)]
#[error("{var} must be a valid {expected}, got {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub expected: &'static str,
    pub value: String,
}

/// Tool configuration loaded from environment variables.
///
/// Defaults match a standard UCS installation; override them to run the
/// tools against test fixtures or a different host layout.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// Directory holding the UCR layer files.
    pub ucr_dir: PathBuf,
    /// Root of the Office 365 connector's per-connection directories.
    pub office365_dir: PathBuf,
    pub graph_url: String,
    pub login_url: String,
    pub udm_bin: String,
    pub ldapsearch_bin: String,
    /// Upper bound for a single `udm` / `univention-ldapsearch` run.
    pub command_timeout: Duration,
    /// Upper bound for a single HTTP request.
    pub http_timeout: Duration,
}

impl ToolsConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                              |
    /// |-----------------------------|--------------------------------------|
    /// | `DLLP_UCR_DIR`              | `/etc/univention`                    |
    /// | `DLLP_OFFICE365_DIR`        | `/etc/univention-office365`          |
    /// | `DLLP_GRAPH_URL`            | `https://graph.microsoft.com/v1.0`   |
    /// | `DLLP_LOGIN_URL`            | `https://login.microsoftonline.com`  |
    /// | `DLLP_UDM_BIN`              | `udm`                                |
    /// | `DLLP_LDAPSEARCH_BIN`       | `univention-ldapsearch`              |
    /// | `DLLP_COMMAND_TIMEOUT_SECS` | `60`                                 |
    /// | `DLLP_HTTP_TIMEOUT_SECS`    | `30`                                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |var: &str, default: &str| lookup(var).unwrap_or_else(|| default.to_string());
        let secs = |var: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match lookup(var) {
                None => Ok(Duration::from_secs(default)),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError {
                        var,
                        expected: "number of seconds",
                        value,
                    }),
            }
        };

        Ok(Self {
            ucr_dir: string("DLLP_UCR_DIR", DEFAULT_UCR_DIR).into(),
            office365_dir: string("DLLP_OFFICE365_DIR", DEFAULT_OFFICE365_DIR).into(),
            graph_url: string("DLLP_GRAPH_URL", DEFAULT_GRAPH_URL),
            login_url: string("DLLP_LOGIN_URL", DEFAULT_LOGIN_URL),
            udm_bin: string("DLLP_UDM_BIN", DEFAULT_UDM_BIN),
            ldapsearch_bin: string("DLLP_LDAPSEARCH_BIN", DEFAULT_LDAPSEARCH_BIN),
            command_timeout: secs("DLLP_COMMAND_TIMEOUT_SECS", 60)?,
            http_timeout: secs("DLLP_HTTP_TIMEOUT_SECS", 30)?,
        })
    }

    pub fn udm(&self) -> UdmCli {
        UdmCli::new(
            self.udm_bin.clone(),
            self.ldapsearch_bin.clone(),
            self.command_timeout,
        )
    }

    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder().timeout(self.http_timeout).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = ToolsConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.ucr_dir, PathBuf::from("/etc/univention"));
        assert_eq!(config.office365_dir, PathBuf::from("/etc/univention-office365"));
        assert_eq!(config.graph_url, "https://graph.microsoft.com/v1.0");
        assert_eq!(config.udm_bin, "udm");
        assert_eq!(config.command_timeout, Duration::from_secs(60));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn variables_override_defaults() {
        let config = ToolsConfig::from_lookup(lookup(&[
            ("DLLP_UCR_DIR", "/tmp/ucr"),
            ("DLLP_UDM_BIN", "/opt/udm"),
            ("DLLP_HTTP_TIMEOUT_SECS", " 5 "),
        ]))
        .unwrap();
        assert_eq!(config.ucr_dir, PathBuf::from("/tmp/ucr"));
        assert_eq!(config.udm_bin, "/opt/udm");
        assert_eq!(config.http_timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_timeout_is_error() {
        let err = ToolsConfig::from_lookup(lookup(&[("DLLP_COMMAND_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert_eq!(err.var, "DLLP_COMMAND_TIMEOUT_SECS");
        assert_eq!(
            err.to_string(),
            "DLLP_COMMAND_TIMEOUT_SECS must be a valid number of seconds, got \"soon\""
        );
    }
}
