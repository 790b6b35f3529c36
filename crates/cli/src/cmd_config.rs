//! `acorn config`: show the resolved configuration.

use acorn_connectors::ReconnectPolicy;
use acorn_relay::config::{ConfigFile, ReconnectFile};
use acorn_relay::RelayConfig;

use crate::VERSION;

/// The resolved config expressed as a `config.toml` body.
fn as_file(config: &RelayConfig) -> ConfigFile {
    let reconnect = match config.reconnect {
        ReconnectPolicy::Disabled => ReconnectFile {
            enabled: Some(false),
            ..Default::default()
        },
        ReconnectPolicy::Backoff {
            initial,
            max,
            max_attempts,
        } => ReconnectFile {
            enabled: Some(true),
            initial_ms: Some(initial.as_millis() as u64),
            max_ms: Some(max.as_millis() as u64),
            max_attempts: Some(max_attempts),
        },
    };
    ConfigFile {
        server_url: Some(config.server_url.clone()),
        scripts_path: Some(config.scripts_path.clone()),
        workspace_dir: Some(config.workspace_dir.clone()),
        restart_debounce_ms: Some(config.restart_debounce.as_millis() as u64),
        reconnect: Some(reconnect),
    }
}

pub fn run(config: &RelayConfig, json: bool) -> anyhow::Result<()> {
    if json {
        let value = serde_json::json!({
            "config": as_file(config),
            "socketUrl": config.socket_url(),
            "dataDir": config.data_dir,
            "configFile": config.config_file_path(),
            "logDir": config.log_dir(),
            "knowledgeManifest": config.knowledge_manifest_path(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("  Acorn v{}", VERSION);
    println!("  Data dir:    {}", config.data_dir.display());
    println!("  Config file: {}", config.config_file_path().display());
    println!("  Logs:        {}", config.log_dir().display());
    println!("  Socket:      {}", config.socket_url());
    println!();
    for line in toml::to_string_pretty(&as_file(config))?.lines() {
        println!("  {line}");
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use acorn_relay::{CliOverrides, EnvOverrides};
    use std::path::{Path, PathBuf};

    #[test]
    fn shown_config_parses_back_to_the_same_values() {
        let config = RelayConfig::with_data_dir("/tmp/acorn");
        let text = toml::to_string_pretty(&as_file(&config)).expect("serialize");
        let file = ConfigFile::parse(Path::new("config.toml"), &text).expect("parse");

        let reparsed = RelayConfig::layer(
            PathBuf::from("/tmp/acorn"),
            Some(&file),
            &EnvOverrides::default(),
            &CliOverrides::default(),
        )
        .expect("layer");
        assert_eq!(reparsed, config);
    }
}
