//! Configuration read from the environment on start-up
//!
//! Every field is read from an environment variable with the `VITRINE_` prefix,
//! for example `listen_address` from `VITRINE_LISTEN_ADDRESS`.
//! Changing any of them requires a restart.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

/// Prefix of every environment variable read by [`VitrineConfig::from_env`]
pub const ENV_PREFIX: &str = "VITRINE_";

/// Configuration of the vitrine server
#[derive(Debug, Clone, Deserialize)]
pub struct VitrineConfig {
    /// Address to bind the webserver to
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// Directory uploaded logos and favicons are written to
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Url path under which the upload directory is served
    #[serde(default = "default_uploads_prefix")]
    pub uploads_prefix: String,

    /// Maximum size of a single upload in bytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,

    /// Format of the log lines written to stdout
    #[serde(default)]
    pub log_format: LogFormat,

    /// Name included in every json log line
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Bearer tokens granting the admin role
    ///
    /// Comma separated list of `<user uuid>:<token>` pairs.
    #[serde(default)]
    pub admin_tokens: Vec<String>,

    /// Bearer tokens granting the client role
    ///
    /// Same format as `admin_tokens`.
    #[serde(default)]
    pub client_tokens: Vec<String>,
}

/// Format of the log lines
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Pretty,

    /// One flat json object per line
    Json,
}

impl VitrineConfig {
    /// Reads the configuration from `VITRINE_*` environment variables
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed(ENV_PREFIX).from_env()
    }

    /// Reads the configuration from an iterator of `(name, value)` pairs without prefix
    pub fn from_iter(
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, envy::Error> {
        envy::from_iter(vars)
    }
}

impl Default for VitrineConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            upload_dir: default_upload_dir(),
            uploads_prefix: default_uploads_prefix(),
            max_upload_size: default_max_upload_size(),
            log_format: LogFormat::default(),
            service_name: default_service_name(),
            admin_tokens: Vec::new(),
            client_tokens: Vec::new(),
        }
    }
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_uploads_prefix() -> String {
    "/uploads".to_string()
}

fn default_max_upload_size() -> usize {
    5 * 1024 * 1024
}

fn default_service_name() -> String {
    "vitrine".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_to_empty_environment() {
        let config = VitrineConfig::from_iter(Vec::new()).unwrap();
        assert_eq!(config.listen_address, default_listen_address());
        assert_eq!(config.uploads_prefix, "/uploads");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.admin_tokens.is_empty());
    }

    #[test]
    fn parses_overrides() {
        let config = VitrineConfig::from_iter(vars(&[
            ("LISTEN_ADDRESS", "0.0.0.0:9000"),
            ("MAX_UPLOAD_SIZE", "1024"),
            ("LOG_FORMAT", "json"),
            (
                "ADMIN_TOKENS",
                "6c1b3f0e-2d4a-4c3b-9a8f-0e1d2c3b4a59:secret,6c1b3f0e-2d4a-4c3b-9a8f-0e1d2c3b4a5a:other",
            ),
        ]))
        .unwrap();
        assert_eq!(config.listen_address.port(), 9000);
        assert_eq!(config.max_upload_size, 1024);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.admin_tokens.len(), 2);
    }
}
