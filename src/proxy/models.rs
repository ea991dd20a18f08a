//! Proxy data models

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::str::FromStr;

/// Country code used when no resolver could place a proxy
pub const UNKNOWN_COUNTRY: &str = "UN";

/// Probe names accepted in `check.items`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeItem {
    Openai,
    Youtube,
    Netflix,
    Disney,
    Speed,
}

impl FromStr for ProbeItem {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProbeItem::Openai),
            "youtube" => Ok(ProbeItem::Youtube),
            "netflix" => Ok(ProbeItem::Netflix),
            "disney" => Ok(ProbeItem::Disney),
            "speed" => Ok(ProbeItem::Speed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ProbeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeItem::Openai => write!(f, "openai"),
            ProbeItem::Youtube => write!(f, "youtube"),
            ProbeItem::Netflix => write!(f, "netflix"),
            ProbeItem::Disney => write!(f, "disney"),
            ProbeItem::Speed => write!(f, "speed"),
        }
    }
}

/// Everything the checker and renamer learn about a proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyInfo {
    pub alive: bool,
    /// ISO 3166-1 alpha-2 code, or "UN" when unknown
    pub country: String,
    pub flag: String,
    /// Download throughput in KB/s; 0 when not measured
    pub speed: u64,
    pub openai: bool,
    pub youtube: bool,
    pub netflix: bool,
    pub disney: bool,
}

impl Default for ProxyInfo {
    fn default() -> Self {
        Self {
            alive: false,
            country: UNKNOWN_COUNTRY.to_string(),
            flag: String::new(),
            speed: 0,
            openai: false,
            youtube: false,
            netflix: false,
            disney: false,
        }
    }
}

/// One proxy moving through a checking cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Proxy {
    /// Raw descriptor as received from the subscription
    pub raw: Mapping,
    pub info: ProxyInfo,
    /// Display rank, 0 until assigned
    pub id: usize,
    /// Position in the batch submitted to the check stage
    pub index: usize,
}

impl Proxy {
    pub fn new(raw: Mapping, index: usize) -> Self {
        Self {
            raw,
            info: ProxyInfo::default(),
            id: 0,
            index,
        }
    }

    /// Current value of the descriptor's `name` field
    pub fn name(&self) -> &str {
        self.raw.get("name").and_then(Value::as_str).unwrap_or("")
    }

    pub fn set_name(&mut self, name: String) {
        self.raw
            .insert(Value::String("name".to_string()), Value::String(name));
    }

    /// Protocol type declared by the descriptor, e.g. "socks5"
    pub fn kind(&self) -> &str {
        descriptor_str(&self.raw, "type").unwrap_or("")
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}://{}:{})",
            self.name(),
            self.kind(),
            descriptor_str(&self.raw, "server").unwrap_or("?"),
            descriptor_port(&self.raw).unwrap_or(0)
        )
    }
}

/// Read a string field from a raw descriptor
pub fn descriptor_str<'a>(raw: &'a Mapping, key: &str) -> Option<&'a str> {
    raw.get(key).and_then(Value::as_str)
}

/// Read the port of a raw descriptor; subscriptions write it as a number or a string
pub fn descriptor_port(raw: &Mapping) -> Option<u16> {
    match raw.get("port")? {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) fn descriptor(yaml: &str) -> Mapping {
    serde_yaml::from_str(yaml).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_info_default() {
        let info = ProxyInfo::default();
        assert!(!info.alive);
        assert_eq!(info.country, UNKNOWN_COUNTRY);
        assert_eq!(info.speed, 0);
        assert!(info.flag.is_empty());
    }

    #[test]
    fn test_proxy_name_roundtrip() {
        let mut proxy = Proxy::new(
            descriptor("{name: old, type: socks5, server: 1.2.3.4, port: 1080}"),
            0,
        );
        assert_eq!(proxy.name(), "old");
        assert_eq!(proxy.kind(), "socks5");

        proxy.set_name("HK 001".to_string());
        assert_eq!(proxy.name(), "HK 001");
        assert_eq!(proxy.raw.len(), 4);
    }

    #[test]
    fn test_descriptor_port_forms() {
        assert_eq!(descriptor_port(&descriptor("{port: 8080}")), Some(8080));
        assert_eq!(descriptor_port(&descriptor("{port: '443'}")), Some(443));
        assert_eq!(descriptor_port(&descriptor("{port: 70000}")), None);
        assert_eq!(descriptor_port(&descriptor("{server: x}")), None);
    }

    #[test]
    fn test_probe_item_parse() {
        assert_eq!("speed".parse::<ProbeItem>(), Ok(ProbeItem::Speed));
        assert_eq!("Netflix".parse::<ProbeItem>(), Ok(ProbeItem::Netflix));
        assert!("tiktok".parse::<ProbeItem>().is_err());
    }

    #[test]
    fn test_proxy_display() {
        let proxy = Proxy::new(
            descriptor("{name: jp, type: http, server: example.com, port: 3128}"),
            2,
        );
        assert_eq!(proxy.to_string(), "jp (http://example.com:3128)");
    }
}
