//! Country resolution for renamed proxies
//!
//! Three strategies are available:
//! - `api`: ask an IP geolocation endpoint, going through the proxy itself
//! - `regex`: match the proxy's current name against per-country patterns
//! - `mix`: try `regex` first and fall back to `api` when it finds nothing

use crate::error::ConfigError;
use crate::proxy::client::ClientFactory;
use crate::proxy::models::{Proxy, UNKNOWN_COUNTRY};
use async_trait::async_trait;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Default IP geolocation endpoint
pub const DEFAULT_GEOIP_URL: &str = "https://api.ip.sb/geoip";

/// Patterns used when no rename file is provided.
/// Bare country codes only match in upper case, and `GB` never matches the
/// `GB/s` unit of a composed name.
const DEFAULT_RULES: &[(&str, &str)] = &[
    ("HK", r"(?i)香港|港|(?-i:\bHK\b)|hong\s*kong|🇭🇰"),
    ("TW", r"(?i)台湾|台灣|(?-i:\bTW\b)|taiwan|🇹🇼"),
    ("JP", r"(?i)日本|东京|大阪|(?-i:\bJP\b)|japan|tokyo|osaka|🇯🇵"),
    ("SG", r"(?i)新加坡|狮城|(?-i:\bSG\b)|singapore|🇸🇬"),
    ("KR", r"(?i)韩国|首尔|(?-i:\bKR\b)|korea|seoul|🇰🇷"),
    ("US", r"(?i)美国|洛杉矶|硅谷|(?-i:\bUS\b|\bUSA\b)|united\s*states|america|los\s*angeles|🇺🇸"),
    ("GB", r"(?i)英国|伦敦|(?-i:\bUK\b|\bGB(?:[^\w/]|$))|united\s*kingdom|britain|london|🇬🇧"),
    ("DE", r"(?i)德国|法兰克福|(?-i:\bDE\b)|germany|frankfurt|🇩🇪"),
    ("FR", r"(?i)法国|巴黎|(?-i:\bFR\b)|france|paris|🇫🇷"),
    ("NL", r"(?i)荷兰|(?-i:\bNL\b)|netherlands|amsterdam|🇳🇱"),
    ("CA", r"(?i)加拿大|(?-i:\bCA\b)|canada|toronto|🇨🇦"),
    ("AU", r"(?i)澳大利亚|澳洲|(?-i:\bAU\b)|australia|sydney|🇦🇺"),
    ("RU", r"(?i)俄罗斯|(?-i:\bRU\b)|russia|moscow|🇷🇺"),
    ("IN", r"(?i)印度|(?-i:\bIN\b)|india|mumbai|🇮🇳"),
    ("TR", r"(?i)土耳其|(?-i:\bTR\b)|turkey|istanbul|🇹🇷"),
];

static DEFAULT_REGEX_RESOLVER: Lazy<RegexResolver> = Lazy::new(|| {
    let rules = DEFAULT_RULES
        .iter()
        .map(|(code, pattern)| {
            (
                code.to_string(),
                Regex::new(pattern).expect("Invalid default country regex"),
            )
        })
        .collect();
    RegexResolver { rules }
});

/// Which resolver the rename stage uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenameMethod {
    Api,
    Regex,
    #[default]
    Mix,
}

impl fmt::Display for RenameMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenameMethod::Api => write!(f, "api"),
            RenameMethod::Regex => write!(f, "regex"),
            RenameMethod::Mix => write!(f, "mix"),
        }
    }
}

/// Resolves a proxy to an ISO country code, "UN" when unknown
#[async_trait]
pub trait CountryResolver: Send + Sync {
    async fn resolve(&self, proxy: &Proxy) -> String;
}

/// Geolocation through the proxy's own exit address
pub struct ApiResolver {
    factory: Arc<dyn ClientFactory>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct GeoIpResponse {
    #[serde(alias = "countryCode")]
    country_code: Option<String>,
}

impl ApiResolver {
    pub fn new(factory: Arc<dyn ClientFactory>, url: String) -> Self {
        Self { factory, url }
    }

    async fn lookup(&self, proxy: &Proxy) -> crate::Result<String> {
        let client = self.factory.create(&proxy.raw)?;
        let response = client.send(client.get(&self.url)).await?;
        let geo: GeoIpResponse = response.error_for_status()?.json().await?;

        geo.country_code
            .map(|code| code.trim().to_uppercase())
            .filter(|code| code.len() == 2)
            .ok_or_else(|| anyhow::anyhow!("no country code in geoip response"))
    }
}

#[async_trait]
impl CountryResolver for ApiResolver {
    async fn resolve(&self, proxy: &Proxy) -> String {
        match self.lookup(proxy).await {
            Ok(code) => code,
            Err(e) => {
                debug!("geoip lookup failed for {}: {}", proxy, e);
                UNKNOWN_COUNTRY.to_string()
            }
        }
    }
}

/// Name-based resolution using ordered (code, pattern) rules
#[derive(Debug, Clone)]
pub struct RegexResolver {
    rules: Vec<(String, Regex)>,
}

impl RegexResolver {
    pub fn new(rules: Vec<(String, Regex)>) -> Self {
        Self { rules }
    }

    /// Built-in rules for common regions
    pub fn builtin() -> Self {
        DEFAULT_REGEX_RESOLVER.clone()
    }

    /// Parse rules from a YAML map of country code to pattern
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let map: Mapping = serde_yaml::from_str(content)?;
        let mut rules = Vec::with_capacity(map.len());

        for (code, pattern) in map {
            let (Value::String(code), Value::String(pattern)) = (code, pattern) else {
                continue;
            };
            let regex = Regex::new(&pattern).map_err(|source| ConfigError::InvalidRule {
                code: code.clone(),
                source,
            })?;
            rules.push((code.trim().to_uppercase(), regex));
        }

        Ok(Self { rules })
    }

    /// Load rules from `path`, falling back to the built-in table when the file is absent
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            debug!("rename file {:?} not found, using built-in rules", path);
            return Ok(Self::builtin());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    /// Re-read `path`, keeping the current rules when the file is invalid
    pub async fn reload<P: AsRef<Path>>(&self, path: P) -> Self {
        let path = path.as_ref();
        match Self::from_path(path).await {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!("keeping previous rename rules, reload of {:?} failed: {}", path, e);
                self.clone()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn match_name(&self, name: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(_, regex)| regex.is_match(name))
            .map(|(code, _)| code.as_str())
    }
}

#[async_trait]
impl CountryResolver for RegexResolver {
    async fn resolve(&self, proxy: &Proxy) -> String {
        self.match_name(proxy.name())
            .unwrap_or(UNKNOWN_COUNTRY)
            .to_string()
    }
}

/// Regex first, remote lookup only when the name gives nothing away
pub struct MixResolver {
    regex: Arc<dyn CountryResolver>,
    api: Arc<dyn CountryResolver>,
}

impl MixResolver {
    pub fn new(regex: Arc<dyn CountryResolver>, api: Arc<dyn CountryResolver>) -> Self {
        Self { regex, api }
    }
}

#[async_trait]
impl CountryResolver for MixResolver {
    async fn resolve(&self, proxy: &Proxy) -> String {
        let code = self.regex.resolve(proxy).await;
        if code != UNKNOWN_COUNTRY {
            return code;
        }
        self.api.resolve(proxy).await
    }
}

/// Pick the resolver for `method`
pub fn resolver_for(
    method: RenameMethod,
    regex: RegexResolver,
    api: ApiResolver,
) -> Arc<dyn CountryResolver> {
    match method {
        RenameMethod::Api => Arc::new(api),
        RenameMethod::Regex => Arc::new(regex),
        RenameMethod::Mix => Arc::new(MixResolver::new(Arc::new(regex), Arc::new(api))),
    }
}

/// Flag emoji for a two-letter country code, empty for anything else
pub fn country_flag(code: &str) -> String {
    let code = code.trim();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return String::new();
    }

    code.to_ascii_uppercase()
        .chars()
        .filter_map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)))
        .collect()
}
