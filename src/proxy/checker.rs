//! Proxy checker: reachability, streaming-service and throughput probes
//!
//! A [`Checker`] owns one [`ProxyClient`] and fills in a [`ProxyInfo`]. The
//! reachability probe decides `alive`; every other probe only annotates the
//! record, so a failing feature probe never makes a proxy unreachable.

use crate::proxy::client::ProxyClient;
use crate::proxy::models::{ProbeItem, ProxyInfo};
use crate::proxy::speed;
use log::debug;
use reqwest::StatusCode;
use std::time::Duration;

/// Default reachability probe target
pub const DEFAULT_ALIVE_URL: &str = "https://gstatic.com/generate_204";

/// Status the default reachability target answers with
pub const DEFAULT_ALIVE_STATUS: u16 = 204;

/// Default download used for speed tests
pub const DEFAULT_SPEED_TEST_URL: &str = "https://speed.cloudflare.com/__down?bytes=10000000";

/// Default speed test budget in seconds
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 10;

/// Endpoints queried by the feature probes
#[derive(Debug, Clone)]
pub struct ProbeEndpoints {
    pub openai: String,
    pub youtube: String,
    pub netflix: String,
    pub disney: String,
}

impl Default for ProbeEndpoints {
    fn default() -> Self {
        Self {
            openai: "https://api.openai.com/compliance/cookie_requirements".to_string(),
            youtube: "https://www.youtube.com/premium".to_string(),
            netflix: "https://www.netflix.com/title/81280792".to_string(),
            disney: "https://www.disneyplus.com".to_string(),
        }
    }
}

/// Settings the checker needs for one cycle
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub alive_url: String,
    pub alive_status: u16,
    pub items: Vec<ProbeItem>,
    pub speed_test_url: String,
    pub download_timeout: Duration,
    /// Skip the remaining probes once the reachability probe fails
    pub skip_unreachable: bool,
    pub endpoints: ProbeEndpoints,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            alive_url: DEFAULT_ALIVE_URL.to_string(),
            alive_status: DEFAULT_ALIVE_STATUS,
            items: Vec::new(),
            speed_test_url: DEFAULT_SPEED_TEST_URL.to_string(),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            skip_unreachable: false,
            endpoints: ProbeEndpoints::default(),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alive_test(mut self, url: String, status: u16) -> Self {
        self.alive_url = url;
        self.alive_status = status;
        self
    }

    pub fn with_items(mut self, items: Vec<ProbeItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_speed_test(mut self, url: String, timeout: Duration) -> Self {
        self.speed_test_url = url;
        self.download_timeout = timeout;
        self
    }

    pub fn with_skip_unreachable(mut self, skip: bool) -> Self {
        self.skip_unreachable = skip;
        self
    }

    pub fn with_endpoints(mut self, endpoints: ProbeEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

/// Runs the probes for a single proxy
pub struct Checker {
    client: ProxyClient,
    info: ProxyInfo,
}

impl Checker {
    pub fn new(client: ProxyClient) -> Self {
        Self {
            client,
            info: ProxyInfo::default(),
        }
    }

    pub fn info(&self) -> &ProxyInfo {
        &self.info
    }

    pub fn into_info(self) -> ProxyInfo {
        self.info
    }

    /// Run the reachability probe and then every configured item in order
    pub async fn run(mut self, config: &CheckerConfig) -> ProxyInfo {
        self.alive_test(&config.alive_url, config.alive_status).await;

        if config.skip_unreachable && !self.info.alive {
            return self.info;
        }

        for item in &config.items {
            match item {
                ProbeItem::Openai => self.openai_test(&config.endpoints.openai).await,
                ProbeItem::Youtube => self.youtube_test(&config.endpoints.youtube).await,
                ProbeItem::Netflix => self.netflix_test(&config.endpoints.netflix).await,
                ProbeItem::Disney => self.disney_test(&config.endpoints.disney).await,
                ProbeItem::Speed => {
                    self.check_speed(&config.speed_test_url, config.download_timeout)
                        .await
                }
            }
        }

        self.info
    }

    /// Mark the proxy alive iff `url` answers with `expected_status`
    pub async fn alive_test(&mut self, url: &str, expected_status: u16) {
        match self.client.send(self.client.get(url)).await {
            Ok(response) => {
                self.info.alive = response.status().as_u16() == expected_status;
            }
            Err(e) => debug!("reachability probe failed: {}", e),
        }
    }

    pub async fn openai_test(&mut self, url: &str) {
        if let Some((status, _, body)) = self.fetch(url).await {
            self.info.openai = openai_unlocked(status, &body);
        }
    }

    pub async fn youtube_test(&mut self, url: &str) {
        if let Some((status, _, body)) = self.fetch(url).await {
            self.info.youtube = youtube_unlocked(status, &body);
        }
    }

    pub async fn netflix_test(&mut self, url: &str) {
        if let Some((status, _, _)) = self.fetch(url).await {
            self.info.netflix = netflix_unlocked(status);
        }
    }

    pub async fn disney_test(&mut self, url: &str) {
        if let Some((status, final_url, _)) = self.fetch(url).await {
            self.info.disney = disney_unlocked(status, &final_url);
        }
    }

    pub async fn check_speed(&mut self, url: &str, limit: Duration) {
        if let Some(speed) = speed::probe_speed(&self.client, url, limit).await {
            self.info.speed = speed;
        }
    }

    async fn fetch(&self, url: &str) -> Option<(StatusCode, String, String)> {
        let response = match self.client.send(self.client.get(url)).await {
            Ok(response) => response,
            Err(e) => {
                debug!("probe {} failed: {}", url, e);
                return None;
            }
        };

        let status = response.status();
        let final_url = response.url().to_string();
        let body = tokio::select! {
            biased;
            _ = self.client.cancel_token().cancelled() => return None,
            body = response.text() => body.ok()?,
        };

        Some((status, final_url, body))
    }
}

fn openai_unlocked(status: StatusCode, body: &str) -> bool {
    status.is_success() && !body.contains("unsupported_country")
}

fn youtube_unlocked(status: StatusCode, body: &str) -> bool {
    status == StatusCode::OK && !body.contains("Premium is not available in your country")
}

fn netflix_unlocked(status: StatusCode) -> bool {
    status == StatusCode::OK
}

fn disney_unlocked(status: StatusCode, final_url: &str) -> bool {
    status == StatusCode::OK && !final_url.contains("unavailable")
}
