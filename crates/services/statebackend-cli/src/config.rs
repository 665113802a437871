//! Layered configuration (component C8): CLI flag > environment variable >
//! config file > built-in default, following the `config` crate pattern
//! used elsewhere in this stack.

use anyhow::{Context, Result};
use serde::Deserialize;

const ENV_PREFIX: &str = "STATEBACKEND_GIT";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub access_logs: bool,
    pub log_format: String,

    pub default_backend_type: String,
    #[serde(default)]
    pub git_repository: Option<String>,
    pub git_ref: String,
    #[serde(default)]
    pub git_state: Option<String>,

    #[serde(default)]
    pub auth_username: Option<String>,
    #[serde(default)]
    pub auth_password: Option<String>,
    pub auth_realm: String,

    #[serde(default)]
    pub encryption_provider: Option<String>,
    #[serde(default)]
    pub encryption_passphrase: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6061".to_string(),
            access_logs: false,
            log_format: "pretty".to_string(),
            default_backend_type: "git".to_string(),
            git_repository: None,
            git_ref: "master".to_string(),
            git_state: None,
            auth_username: None,
            auth_password: None,
            auth_realm: "statebackend-git".to_string(),
            encryption_provider: None,
            encryption_passphrase: None,
        }
    }
}

/// CLI-supplied overrides; `None` means "not passed on the command line",
/// so the layered value from env/file/default is kept.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub address: Option<String>,
    pub access_logs: Option<bool>,
    pub config_file: Option<String>,
    pub repository: Option<String>,
    pub git_ref: Option<String>,
    pub state: Option<String>,
}

/// Loads configuration from (lowest to highest precedence): built-in
/// defaults, an optional config file (`statebackend-git.toml` in the
/// current directory, or an explicit `--config` path),
/// `STATEBACKEND_GIT_*` environment variables, then CLI flags.
pub fn load(overrides: &ConfigOverrides) -> Result<ServerConfig> {
    let defaults = ServerConfig::default();

    let mut builder = config::Config::builder()
        .set_default("address", defaults.address)?
        .set_default("access_logs", defaults.access_logs)?
        .set_default("log_format", defaults.log_format)?
        .set_default("default_backend_type", defaults.default_backend_type)?
        .set_default("git_ref", defaults.git_ref)?
        .set_default("auth_realm", defaults.auth_realm)?;

    builder = match &overrides.config_file {
        Some(path) => builder.add_source(config::File::with_name(path).required(true)),
        None => builder.add_source(config::File::with_name("statebackend-git").required(false)),
    };

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("_")
            .try_parsing(true),
    );

    if let Some(address) = &overrides.address {
        builder = builder.set_override("address", address.as_str())?;
    }
    if let Some(access_logs) = overrides.access_logs {
        builder = builder.set_override("access_logs", access_logs)?;
    }
    if let Some(repository) = &overrides.repository {
        builder = builder.set_override("git_repository", repository.as_str())?;
    }
    if let Some(git_ref) = &overrides.git_ref {
        builder = builder.set_override("git_ref", git_ref.as_str())?;
    }
    if let Some(state) = &overrides.state {
        builder = builder.set_override("git_state", state.as_str())?;
    }

    builder
        .build()
        .context("build layered configuration")?
        .try_deserialize()
        .context("deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_address() {
        let config = ServerConfig::default();
        assert_eq!(config.address, "127.0.0.1:6061");
        assert_eq!(config.git_ref, "master");
    }

    #[test]
    fn cli_override_beats_default() {
        let overrides = ConfigOverrides {
            address: Some("0.0.0.0:9000".to_string()),
            repository: Some("git@example.com:org/repo.git".to_string()),
            ..Default::default()
        };
        let config = load(&overrides).expect("load config");
        assert_eq!(config.address, "0.0.0.0:9000");
        assert_eq!(
            config.git_repository.as_deref(),
            Some("git@example.com:org/repo.git")
        );
    }
}
