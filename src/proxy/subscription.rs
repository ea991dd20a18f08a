//! Subscription fetching and deduplication
//!
//! Sources are either `http(s)` URLs or local file paths holding a Clash-style
//! YAML document with a top-level `proxies:` list.

use crate::proxy::models::{descriptor_port, descriptor_str};
use crate::Result;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::time::Duration;

/// Default timeout for subscription downloads in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Providers return Clash YAML for this user agent
const DEFAULT_USER_AGENT: &str = "clash.meta";

#[derive(Debug, Default, Deserialize)]
struct SubscriptionDocument {
    #[serde(default)]
    proxies: Vec<Value>,
}

/// Result of fetching a single source
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub source: String,
    pub proxies: Vec<Mapping>,
    pub error: Option<String>,
}

impl FetchResult {
    pub fn success(source: String, proxies: Vec<Mapping>) -> Self {
        Self {
            source,
            proxies,
            error: None,
        }
    }

    pub fn failure(source: String, error: String) -> Self {
        Self {
            source,
            proxies: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Configuration for subscription fetching
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Upstream proxy for downloads, e.g. "socks5://127.0.0.1:7890"; direct when unset
    pub proxy: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }
}

/// Downloads and parses subscriptions
pub struct SubscriptionFetcher {
    client: Client,
}

impl SubscriptionFetcher {
    pub fn new() -> Result<Self> {
        Self::with_config(FetcherConfig::default())
    }

    pub fn with_config(config: FetcherConfig) -> Result<Self> {
        let builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent);

        let builder = match &config.proxy {
            Some(url) => builder.proxy(reqwest::Proxy::all(url.as_str())?),
            None => builder.no_proxy(),
        };

        let client = builder.build()?;

        Ok(Self { client })
    }

    /// Fetch the proxy descriptors of one source
    pub async fn fetch(&self, source: &str) -> Result<Vec<Mapping>> {
        let content = if source.starts_with("http://") || source.starts_with("https://") {
            self.client
                .get(source)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?
        } else {
            tokio::fs::read_to_string(source).await?
        };

        parse_subscription(&content)
    }

    /// Fetch every source, recording failures instead of aborting
    pub async fn fetch_all(&self, sources: &[String]) -> Vec<FetchResult> {
        let mut results = Vec::with_capacity(sources.len());

        for source in sources {
            let result = match self.fetch(source).await {
                Ok(proxies) => {
                    info!("fetched {} proxies from {}", proxies.len(), source);
                    FetchResult::success(source.clone(), proxies)
                }
                Err(e) => {
                    warn!("failed to fetch {}: {}", source, e);
                    FetchResult::failure(source.clone(), e.to_string())
                }
            };
            results.push(result);
        }

        results
    }
}

/// Extract the `proxies:` list; entries that are not mappings are skipped
pub fn parse_subscription(content: &str) -> Result<Vec<Mapping>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let document: Option<SubscriptionDocument> = serde_yaml::from_str(content)?;
    Ok(document
        .unwrap_or_default()
        .proxies
        .into_iter()
        .filter_map(|entry| match entry {
            Value::Mapping(raw) => Some(raw),
            _ => None,
        })
        .collect())
}

/// Identity of a descriptor: protocol, server and port
pub fn fingerprint(raw: &Mapping) -> Option<String> {
    let kind = descriptor_str(raw, "type")?;
    let server = descriptor_str(raw, "server")?;
    let port = descriptor_port(raw)?;
    Some(format!(
        "{}://{}:{}",
        kind.to_lowercase(),
        server.to_lowercase(),
        port
    ))
}

/// Drop repeated descriptors, keeping the first occurrence and the input order.
/// Descriptors without a fingerprint are kept as-is.
pub fn deduplicate(proxies: Vec<Mapping>) -> Vec<Mapping> {
    let mut seen = HashSet::new();
    proxies
        .into_iter()
        .filter(|raw| match fingerprint(raw) {
            Some(key) => seen.insert(key),
            None => true,
        })
        .collect()
}
