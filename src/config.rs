//! Application settings loaded from a YAML file
//!
//! Settings are read once per cycle and shared with every worker as an
//! immutable snapshot.

use crate::error::ConfigError;
use crate::proxy::checker::{
    CheckerConfig, ProbeEndpoints, DEFAULT_ALIVE_STATUS, DEFAULT_ALIVE_URL,
    DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_SPEED_TEST_URL,
};
use crate::proxy::geo::{RenameMethod, DEFAULT_GEOIP_URL};
use crate::proxy::models::ProbeItem;
use crate::proxy::rename::{IdOrder, NameOptions};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Shortest allowed pause between cycles, in minutes
pub const MIN_INTERVAL_MINUTES: u64 = 10;

/// Longest allowed pause between cycles (one year), in minutes
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

/// Written out when no config file exists yet
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# subcheck configuration

check:
  # number of proxies checked at the same time
  concurrent: 20
  # extra probes: openai, youtube, netflix, disney, speed
  items:
    - speed
  # minutes between cycles (at least 10)
  interval: 720
  # timeout of the reachability and feature probes, in milliseconds
  timeout: 5000
  alive-test-url: https://gstatic.com/generate_204
  alive-test-status: 204
  # speed test budget, in seconds
  download-timeout: 10
  speed-test-url: https://speed.cloudflare.com/__down?bytes=10000000
  skip-unreachable: false

rename:
  # api, regex or mix
  method: mix
  flag: true
  stable-ids: true
  api-url: https://api.ip.sb/geoip

save:
  output-path: output/all.yaml

# proxy used to download subscriptions, e.g. socks5://127.0.0.1:7890
# proxy: ""

sub-urls: []
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CheckSettings {
    pub concurrent: usize,
    /// Probe names; unknown entries are ignored
    pub items: Vec<String>,
    /// Minutes between cycles
    pub interval: u64,
    /// Probe client timeout in milliseconds
    pub timeout: u64,
    pub alive_test_url: String,
    pub alive_test_status: u16,
    /// Speed test budget in seconds
    pub download_timeout: u64,
    pub speed_test_url: String,
    pub skip_unreachable: bool,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            concurrent: 20,
            items: Vec::new(),
            interval: 720,
            timeout: 5000,
            alive_test_url: DEFAULT_ALIVE_URL.to_string(),
            alive_test_status: DEFAULT_ALIVE_STATUS,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            speed_test_url: DEFAULT_SPEED_TEST_URL.to_string(),
            skip_unreachable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RenameSettings {
    pub method: RenameMethod,
    pub flag: bool,
    /// Number proxies in submission order instead of completion order
    pub stable_ids: bool,
    pub api_url: String,
}

impl Default for RenameSettings {
    fn default() -> Self {
        Self {
            method: RenameMethod::default(),
            flag: true,
            stable_ids: true,
            api_url: DEFAULT_GEOIP_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SaveSettings {
    pub output_path: PathBuf,
}

impl Default for SaveSettings {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("output/all.yaml"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Settings {
    pub check: CheckSettings,
    pub rename: RenameSettings,
    pub save: SaveSettings,
    /// Upstream proxy for subscription downloads
    pub proxy: Option<String>,
    pub sub_urls: Vec<String>,
}

impl Settings {
    /// Parse and validate settings from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Re-read `path`, keeping the current snapshot when the file is unreadable or invalid
    pub fn reload<P: AsRef<Path>>(self: &Arc<Self>, path: P) -> Arc<Self> {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(settings) => Arc::new(settings),
            Err(e) => {
                warn!("keeping previous settings, reload of {:?} failed: {}", path, e);
                Arc::clone(self)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check.concurrent == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.check.interval < MIN_INTERVAL_MINUTES {
            return Err(ConfigError::IntervalTooShort {
                min: MIN_INTERVAL_MINUTES,
                actual: self.check.interval,
            });
        }
        if self.check.interval > MAX_INTERVAL_MINUTES {
            return Err(ConfigError::IntervalTooLong {
                max: MAX_INTERVAL_MINUTES,
                actual: self.check.interval,
            });
        }
        if self.sub_urls.iter().all(|url| url.trim().is_empty()) {
            return Err(ConfigError::MissingSubscriptions);
        }
        if self.check.alive_test_url.trim().is_empty() {
            return Err(ConfigError::MissingSetting("alive-test-url"));
        }
        if self.probe_items().contains(&ProbeItem::Speed)
            && self.check.speed_test_url.trim().is_empty()
        {
            return Err(ConfigError::MissingSetting("speed-test-url"));
        }
        Ok(())
    }

    /// Recognised probe items in configured order
    pub fn probe_items(&self) -> Vec<ProbeItem> {
        self.check
            .items
            .iter()
            .filter_map(|item| item.parse().ok())
            .collect()
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.check.timeout)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check.interval.saturating_mul(60))
    }

    pub fn checker_config(&self) -> CheckerConfig {
        CheckerConfig::new()
            .with_alive_test(
                self.check.alive_test_url.clone(),
                self.check.alive_test_status,
            )
            .with_items(self.probe_items())
            .with_speed_test(
                self.check.speed_test_url.clone(),
                Duration::from_secs(self.check.download_timeout),
            )
            .with_skip_unreachable(self.check.skip_unreachable)
            .with_endpoints(ProbeEndpoints::default())
    }

    pub fn name_options(&self) -> NameOptions {
        NameOptions {
            flag: self.rename.flag,
            speed: self.probe_items().contains(&ProbeItem::Speed),
        }
    }

    pub fn id_order(&self) -> IdOrder {
        if self.rename.stable_ids {
            IdOrder::Submission
        } else {
            IdOrder::Completion
        }
    }
}
