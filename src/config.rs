use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::executor::SinkMode;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Session records and uploads live here.
    pub data_dir: PathBuf,
    /// Per-session chunk files and indexes live here.
    pub output_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_max_words")]
    pub max_words: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_words: default_max_words(),
        }
    }
}

fn default_max_words() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    #[serde(default = "default_sink_kind")]
    pub kind: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub worker_secret: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            kind: default_sink_kind(),
            api_base_url: None,
            worker_secret: None,
            agent_id: None,
        }
    }
}

fn default_sink_kind() -> String {
    "file".to_string()
}

impl Config {
    pub fn uploads_dir(&self) -> PathBuf {
        self.storage.data_dir.join("uploads")
    }

    /// Translate the `[sink]` table into an executor sink mode.
    pub fn sink_mode(&self) -> Result<SinkMode> {
        match self.sink.kind.as_str() {
            "file" => Ok(SinkMode::File),
            "remote" => {
                let api_base_url = self
                    .sink
                    .api_base_url
                    .clone()
                    .context("sink.api_base_url is required when sink.kind = \"remote\"")?;
                let agent_id = self
                    .sink
                    .agent_id
                    .clone()
                    .context("sink.agent_id is required when sink.kind = \"remote\"")?;
                Ok(SinkMode::Remote {
                    api_base_url,
                    worker_secret: self.sink.worker_secret.clone().unwrap_or_default(),
                    agent_id,
                })
            }
            other => anyhow::bail!("Unknown sink kind: '{}'. Must be file or remote.", other),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.pipeline.max_words == 0 {
        anyhow::bail!("pipeline.max_words must be > 0");
    }

    // Surface sink misconfiguration at load time, not mid-run.
    config.sink_mode()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let file = write_config(
            r#"
[storage]
data_dir = "data"
output_dir = "output"

[server]
bind = "127.0.0.1:8000"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.pipeline.max_words, 4000);
        assert!(matches!(config.sink_mode().unwrap(), SinkMode::File));
    }

    #[test]
    fn remote_sink_requires_base_url_and_agent() {
        let file = write_config(
            r#"
[storage]
data_dir = "data"
output_dir = "output"

[server]
bind = "127.0.0.1:8000"

[sink]
kind = "remote"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn zero_max_words_rejected() {
        let file = write_config(
            r#"
[storage]
data_dir = "data"
output_dir = "output"

[pipeline]
max_words = 0

[server]
bind = "127.0.0.1:8000"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn unknown_sink_kind_rejected() {
        let file = write_config(
            r#"
[storage]
data_dir = "data"
output_dir = "output"

[server]
bind = "127.0.0.1:8000"

[sink]
kind = "carrier-pigeon"
"#,
        );
        assert!(load_config(file.path()).is_err());
    }
}
