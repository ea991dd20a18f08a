//! Per-proxy HTTP clients
//!
//! A [`ProxyClient`] pairs a `reqwest::Client` routed through one proxy with a
//! cancellation token shared by every probe run against that proxy.

use crate::error::{ClientError, ProbeError};
use crate::proxy::models::{descriptor_port, descriptor_str};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde_yaml::{Mapping, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default timeout for probe requests
const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// User agent sent with probe requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// HTTP client bound to one proxy's transport
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: Client,
    cancel: CancellationToken,
}

impl ProxyClient {
    pub fn new(http: Client) -> Self {
        Self::with_cancel(http, CancellationToken::new())
    }

    pub fn with_cancel(http: Client, cancel: CancellationToken) -> Self {
        Self { http, cancel }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Abort every outstanding probe on this proxy
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.http.get(url)
    }

    /// Send a request, giving up as soon as the proxy is cancelled
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ProbeError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ProbeError::Cancelled),
            response = request.send() => response.map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout
                } else {
                    ProbeError::Http(e)
                }
            }),
        }
    }
}

/// Builds a client for a raw proxy descriptor
pub trait ClientFactory: Send + Sync {
    fn create(&self, raw: &Mapping) -> Result<ProxyClient, ClientError>;
}

/// Factory for HTTP(S) and SOCKS5 proxies using reqwest's proxy support
#[derive(Debug, Clone)]
pub struct ReqwestClientFactory {
    timeout: Duration,
    user_agent: String,
}

impl Default for ReqwestClientFactory {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ReqwestClientFactory {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl ClientFactory for ReqwestClientFactory {
    fn create(&self, raw: &Mapping) -> Result<ProxyClient, ClientError> {
        let proxy_url = proxy_url(raw)?;

        let client = Client::builder()
            .proxy(reqwest::Proxy::all(proxy_url)?)
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()?;

        Ok(ProxyClient::new(client))
    }
}

/// Translate a Clash-style descriptor into a proxy URL reqwest understands
pub fn proxy_url(raw: &Mapping) -> Result<Url, ClientError> {
    let kind = descriptor_str(raw, "type").ok_or(ClientError::MissingField("type"))?;
    let scheme = match kind.to_lowercase().as_str() {
        "http" if raw.get("tls").and_then(Value::as_bool).unwrap_or(false) => "https",
        "http" => "http",
        "https" => "https",
        // resolve DNS on the proxy side
        "socks5" => "socks5h",
        other => return Err(ClientError::UnsupportedType(other.to_string())),
    };

    let server = descriptor_str(raw, "server")
        .filter(|s| !s.is_empty())
        .ok_or(ClientError::MissingField("server"))?;
    let port = descriptor_port(raw).ok_or(ClientError::MissingField("port"))?;

    let host = if server.contains(':') && !server.starts_with('[') {
        format!("[{}]", server)
    } else {
        server.to_string()
    };

    let mut url = Url::parse(&format!("{}://{}:{}", scheme, host, port))
        .map_err(|e| ClientError::InvalidAddress(format!("{}:{}: {}", server, port, e)))?;

    if let Some(username) = descriptor_str(raw, "username").filter(|u| !u.is_empty()) {
        url.set_username(username)
            .map_err(|_| ClientError::InvalidAddress(server.to_string()))?;
        url.set_password(descriptor_str(raw, "password"))
            .map_err(|_| ClientError::InvalidAddress(server.to_string()))?;
    }

    Ok(url)
}
