use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub source: SourceConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub enrich: EnrichConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Startup readiness probes before giving up on the store.
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,
    #[serde(default = "default_readiness_delay_secs")]
    pub readiness_delay_secs: u64,
}

fn default_readiness_attempts() -> u32 {
    30
}
fn default_readiness_delay_secs() -> u64 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Channel name (without `#`) or native channel id.
    pub channel: String,
    /// Messages requested per history page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding downloaded PDFs and their sidecar text files.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    /// Upper bound on extraction workers; clamped to available parallelism.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

fn default_max_workers() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Total attempts per document against the inference service.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay after a rate-limit error; doubles per attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Fixed delay after a non-rate-limit service error.
    #[serde(default = "default_service_delay_ms")]
    pub service_delay_ms: u64,
    /// Courtesy pause between successive documents.
    #[serde(default = "default_inter_call_delay_ms")]
    pub inter_call_delay_ms: u64,
    /// Character prefix of the extracted text sent to the service.
    #[serde(default = "default_text_prefix_chars")]
    pub text_prefix_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            service_delay_ms: default_service_delay_ms(),
            inter_call_delay_ms: default_inter_call_delay_ms(),
            text_prefix_chars: default_text_prefix_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_service_delay_ms() -> u64 {
    2000
}
fn default_inter_call_delay_ms() -> u64 {
    500
}
fn default_text_prefix_chars() -> usize {
    3000
}
fn default_timeout_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.source.channel.is_empty() {
        anyhow::bail!("source.channel must not be empty");
    }

    if config.source.page_size == 0 {
        anyhow::bail!("source.page_size must be > 0");
    }

    if config.extract.max_workers == 0 {
        anyhow::bail!("extract.max_workers must be > 0");
    }

    if config.enrich.max_retries == 0 {
        anyhow::bail!("enrich.max_retries must be >= 1");
    }

    if config.enrich.text_prefix_chars == 0 {
        anyhow::bail!("enrich.text_prefix_chars must be > 0");
    }

    if config.db.readiness_attempts == 0 {
        anyhow::bail!("db.readiness_attempts must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("paperdrop.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        (tmp, path)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let (_tmp, path) = write_config(
            r#"[db]
path = "./data/docs.sqlite"

[source]
channel = "research"

[storage]
root = "./data/pdfs"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.source.page_size, 100);
        assert_eq!(cfg.extract.max_workers, 4);
        assert_eq!(cfg.enrich.max_retries, 3);
        assert_eq!(cfg.enrich.text_prefix_chars, 3000);
        assert_eq!(cfg.db.readiness_attempts, 30);
    }

    #[test]
    fn zero_page_size_rejected() {
        let (_tmp, path) = write_config(
            r#"[db]
path = "./data/docs.sqlite"

[source]
channel = "research"
page_size = 0

[storage]
root = "./data/pdfs"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn empty_channel_rejected() {
        let (_tmp, path) = write_config(
            r#"[db]
path = "./data/docs.sqlite"

[source]
channel = ""

[storage]
root = "./data/pdfs"
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
