//! Relay configuration
//!
//! Resolved once at startup. Priority, lowest first: built-in defaults,
//! `config.toml`, environment, CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use acorn_connectors::socket::{
    DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INITIAL, DEFAULT_RECONNECT_MAX,
};
use acorn_connectors::ReconnectPolicy;
use serde::{Deserialize, Serialize};

use crate::transition::RunTarget;
use crate::RelayError;

pub const APP_NAME: &str = "Acorn";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
pub const DEFAULT_SCRIPTS_PATH: &str = "gptscripts";
pub const DEFAULT_RESTART_DEBOUNCE: Duration = Duration::from_millis(200);
pub const CONFIG_FILE_NAME: &str = "config.toml";

const SOCKET_PATH: &str = "/ws";
const SCRIPT_EXTENSION: &str = ".gpt";

#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub server_url: String,
    pub scripts_path: String,
    pub data_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub restart_debounce: Duration,
    pub reconnect: ReconnectPolicy,
}

/// `config.toml` contents. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub server_url: Option<String>,
    pub scripts_path: Option<String>,
    pub workspace_dir: Option<PathBuf>,
    pub restart_debounce_ms: Option<u64>,
    pub reconnect: Option<ReconnectFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectFile {
    pub enabled: Option<bool>,
    pub initial_ms: Option<u64>,
    pub max_ms: Option<u64>,
    pub max_attempts: Option<u32>,
}

impl ReconnectFile {
    /// Policy with this table's values over the defaults.
    pub fn policy(&self) -> ReconnectPolicy {
        if self.enabled == Some(false) {
            return ReconnectPolicy::Disabled;
        }
        ReconnectPolicy::Backoff {
            initial: self
                .initial_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RECONNECT_INITIAL),
            max: self
                .max_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RECONNECT_MAX),
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_RECONNECT_ATTEMPTS),
        }
    }
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, RelayError> {
        let text = std::fs::read_to_string(path).map_err(|source| RelayError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self, RelayError> {
        toml::from_str(text).map_err(|source| RelayError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values read from the process environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub server_url: Option<String>,
    pub scripts_path: Option<String>,
    pub workspace_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            server_url: get("ACORN_SERVER_URL"),
            scripts_path: get("SCRIPTS_PATH"),
            workspace_dir: get("GPTSCRIPT_WORKSPACE_DIR")
                .or_else(|| get("WORKSPACE_DIR"))
                .map(PathBuf::from),
            data_dir: get("ACORN_DATA_DIR").map(PathBuf::from),
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub server_url: Option<String>,
    pub scripts_path: Option<String>,
    pub workspace_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

impl RelayConfig {
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
    }

    /// Built-in defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            scripts_path: DEFAULT_SCRIPTS_PATH.to_string(),
            workspace_dir: data_dir.join("workspace"),
            data_dir,
            restart_debounce: DEFAULT_RESTART_DEBOUNCE,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Resolve every layer, reading the config file from disk.
    ///
    /// A missing file at the default location is fine; a missing file named
    /// with `--config` is an error.
    pub fn resolve(cli: &CliOverrides, env: &EnvOverrides) -> Result<Self, RelayError> {
        let data_dir = cli
            .data_dir
            .clone()
            .or_else(|| env.data_dir.clone())
            .unwrap_or_else(Self::default_data_dir);

        let file = match &cli.config_path {
            Some(path) => Some(ConfigFile::load(path)?),
            None => {
                let path = data_dir.join(CONFIG_FILE_NAME);
                if path.exists() {
                    Some(ConfigFile::load(&path)?)
                } else {
                    None
                }
            }
        };

        Self::layer(data_dir, file.as_ref(), env, cli)
    }

    /// Apply the layers on top of the defaults for `data_dir`.
    pub fn layer(
        data_dir: PathBuf,
        file: Option<&ConfigFile>,
        env: &EnvOverrides,
        cli: &CliOverrides,
    ) -> Result<Self, RelayError> {
        let mut config = Self::with_data_dir(data_dir);

        if let Some(file) = file {
            if let Some(url) = &file.server_url {
                config.server_url = url.clone();
            }
            if let Some(scripts) = &file.scripts_path {
                config.scripts_path = scripts.clone();
            }
            if let Some(dir) = &file.workspace_dir {
                config.workspace_dir = dir.clone();
            }
            if let Some(ms) = file.restart_debounce_ms {
                config.restart_debounce = Duration::from_millis(ms);
            }
            if let Some(reconnect) = &file.reconnect {
                config.reconnect = reconnect.policy();
            }
        }

        for (url, scripts, workspace) in [
            (&env.server_url, &env.scripts_path, &env.workspace_dir),
            (&cli.server_url, &cli.scripts_path, &cli.workspace_dir),
        ] {
            if let Some(url) = url {
                config.server_url = url.clone();
            }
            if let Some(scripts) = scripts {
                config.scripts_path = scripts.clone();
            }
            if let Some(dir) = workspace {
                config.workspace_dir = dir.clone();
            }
        }

        config.server_url = config.server_url.trim_end_matches('/').to_string();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), RelayError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(RelayError::Config(format!(
                "server url must start with http:// or https://, got {:?}",
                self.server_url
            )));
        }
        if self.scripts_path.trim().is_empty() {
            return Err(RelayError::Config("scripts path is empty".to_string()));
        }
        Ok(())
    }

    /// `http → ws`, `https → wss`, path `/ws`.
    pub fn socket_url(&self) -> String {
        let rest = self
            .server_url
            .strip_prefix("https://")
            .map(|rest| format!("wss://{rest}"))
            .or_else(|| {
                self.server_url
                    .strip_prefix("http://")
                    .map(|rest| format!("ws://{rest}"))
            })
            .unwrap_or_else(|| self.server_url.clone());
        format!("{rest}{SOCKET_PATH}")
    }

    /// Script path as the run server resolves it.
    pub fn script_path(&self, file: &str) -> String {
        let scripts = self.scripts_path.trim_end_matches('/');
        if file.ends_with(SCRIPT_EXTENSION) {
            format!("{scripts}/{file}")
        } else {
            format!("{scripts}/{file}{SCRIPT_EXTENSION}")
        }
    }

    pub fn run_target(&self, file: &str) -> RunTarget {
        RunTarget {
            file: file.to_string(),
            path: self.script_path(file),
            workspace_dir: self.workspace_dir.to_string_lossy().into_owned(),
        }
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn knowledge_manifest_path(&self) -> PathBuf {
        self.data_dir.join("knowledge.json")
    }

    /// Create the data, log, and workspace directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.log_dir())?;
        std::fs::create_dir_all(&self.workspace_dir)?;
        Ok(())
    }
}
