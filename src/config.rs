use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_app_tag")]
    pub app_tag: String,
    pub collector: CollectorConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub wake: WakeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl CollectorConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Simulated,
    Replay,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub interval_secs: u64,
    pub min_interval_secs: u64,
    pub min_displacement_m: f64,
    pub source: SourceKind,
    pub replay_path: Option<PathBuf>,
    pub origin_lat: f64,
    pub origin_lon: f64,
}

impl SamplingConfig {
    /// Effective sampling period, never shorter than the minimum interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(self.min_interval_secs))
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            min_interval_secs: 15,
            min_displacement_m: 5.0,
            source: SourceKind::Simulated,
            replay_path: None,
            origin_lat: 47.6062,
            origin_lon: -122.3321,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectivityMode {
    #[default]
    Sysfs,
    AssumeOnline,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub mode: ConnectivityMode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    pub lease_secs: u64,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self { lease_secs: 60 * 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub diagnostic_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            diagnostic_file: "diagnostics.log".to_string(),
        }
    }
}

fn default_app_tag() -> String {
    "location-relay".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    format!("location-relay/{}", env!("CARGO_PKG_VERSION"))
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        reqwest::Url::parse(&self.collector.url)
            .map_err(|e| anyhow::anyhow!("Invalid collector url {:?}: {}", self.collector.url, e))?;
        if self.collector.connect_timeout_secs == 0 || self.collector.timeout_secs == 0 {
            anyhow::bail!("collector timeouts must be non-zero");
        }
        if self.sampling.interval_secs == 0 {
            anyhow::bail!("sampling.interval_secs must be non-zero");
        }
        if self.sampling.min_interval_secs > self.sampling.interval_secs {
            anyhow::bail!(
                "sampling.min_interval_secs ({}) exceeds sampling.interval_secs ({})",
                self.sampling.min_interval_secs,
                self.sampling.interval_secs
            );
        }
        if self.sampling.source == SourceKind::Replay && self.sampling.replay_path.is_none() {
            anyhow::bail!("sampling.source = \"replay\" requires sampling.replay_path");
        }
        if self.wake.lease_secs == 0 {
            anyhow::bail!("wake.lease_secs must be non-zero");
        }
        Ok(())
    }

    pub fn diagnostic_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.logging.diagnostic_file)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_tag: default_app_tag(),
            collector: CollectorConfig {
                url: "http://127.0.0.1:8080/record-location".to_string(),
                connect_timeout_secs: default_timeout_secs(),
                timeout_secs: default_timeout_secs(),
                user_agent: default_user_agent(),
            },
            sampling: SamplingConfig::default(),
            connectivity: ConnectivityConfig::default(),
            storage: StorageConfig::default(),
            wake: WakeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
