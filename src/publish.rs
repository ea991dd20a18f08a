//! Publishing of the renamed proxy list

use crate::proxy::models::Proxy;
use crate::Result;
use async_trait::async_trait;
use log::info;
use serde::Serialize;
use serde_yaml::Mapping;
use std::path::{Path, PathBuf};

/// Receives the final proxy list of a cycle
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, proxies: &[Proxy]) -> Result<()>;
}

#[derive(Serialize)]
struct ProxyList<'a> {
    proxies: Vec<&'a Mapping>,
}

/// Render proxies as a Clash-style `proxies:` document
pub fn render(proxies: &[Proxy]) -> Result<String> {
    let list = ProxyList {
        proxies: proxies.iter().map(|proxy| &proxy.raw).collect(),
    };
    Ok(serde_yaml::to_string(&list)?)
}

/// Writes the list to a local YAML file
#[derive(Debug, Clone)]
pub struct FilePublisher {
    path: PathBuf,
}

impl FilePublisher {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Publisher for FilePublisher {
    async fn publish(&self, proxies: &[Proxy]) -> Result<()> {
        let content = render(proxies)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, content).await?;

        info!("saved {} proxies to {:?}", proxies.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::descriptor;
    use crate::proxy::subscription::parse_subscription;

    #[test]
    fn test_render_empty() {
        let content = render(&[]).unwrap();
        assert!(parse_subscription(&content).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_publisher_writes_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FilePublisher::new(dir.path().join("nested/out.yaml"));

        let mut proxy = Proxy::new(
            descriptor("{name: raw, type: socks5, server: 10.0.0.1, port: 1080, udp: true}"),
            0,
        );
        proxy.set_name("🇯🇵 JP 001".to_string());
        publisher.publish(&[proxy]).await.unwrap();

        let content = std::fs::read_to_string(publisher.path()).unwrap();
        let proxies = parse_subscription(&content).unwrap();
        assert_eq!(proxies.len(), 1);
        assert_eq!(proxies[0].get("name").and_then(|v| v.as_str()), Some("🇯🇵 JP 001"));
        assert_eq!(proxies[0].get("udp").and_then(|v| v.as_bool()), Some(true));
    }
}
