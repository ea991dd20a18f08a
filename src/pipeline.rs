//! One full check cycle: fetch, dedup, check, rank, rename, publish

use crate::config::Settings;
use crate::error::ConfigError;
use crate::pool::run_stage;
use crate::proxy::checker::Checker;
use crate::proxy::client::{ClientFactory, ReqwestClientFactory};
use crate::proxy::geo::{resolver_for, ApiResolver, CountryResolver, RegexResolver};
use crate::proxy::models::Proxy;
use crate::proxy::rename::{rank, rename_proxy, IdOrder};
use crate::proxy::subscription::{deduplicate, SubscriptionFetcher};
use crate::publish::Publisher;
use crate::Result;
use log::{debug, info, warn};
use serde_yaml::Mapping;
use std::sync::Arc;

pub struct Pipeline {
    settings: Arc<Settings>,
    factory: Arc<dyn ClientFactory>,
    resolver: Arc<dyn CountryResolver>,
}

impl Pipeline {
    pub fn new(
        settings: Arc<Settings>,
        factory: Arc<dyn ClientFactory>,
        resolver: Arc<dyn CountryResolver>,
    ) -> Self {
        Self {
            settings,
            factory,
            resolver,
        }
    }

    /// Wire the reqwest-backed factory and the configured rename method
    pub fn from_settings(settings: Arc<Settings>, regex: RegexResolver) -> Self {
        let factory: Arc<dyn ClientFactory> =
            Arc::new(ReqwestClientFactory::new(settings.client_timeout()));
        let api = ApiResolver::new(Arc::clone(&factory), settings.rename.api_url.clone());
        let resolver = resolver_for(settings.rename.method, regex, api);

        Self::new(settings, factory, resolver)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Check every descriptor, then number and rename the alive ones
    pub async fn check_and_rename(
        &self,
        descriptors: Vec<Mapping>,
    ) -> std::result::Result<Vec<Proxy>, ConfigError> {
        let concurrency = self.settings.check.concurrent;
        let batch: Vec<Proxy> = descriptors
            .into_iter()
            .enumerate()
            .map(|(index, raw)| Proxy::new(raw, index))
            .collect();

        let factory = Arc::clone(&self.factory);
        let config = Arc::new(self.settings.checker_config());
        let checked = run_stage(batch, concurrency, move |mut proxy: Proxy| {
            let factory = Arc::clone(&factory);
            let config = Arc::clone(&config);
            async move {
                let client = factory.create(&proxy.raw)?;
                proxy.info = Checker::new(client).run(&config).await;
                debug!("checked {}: alive={}", proxy, proxy.info.alive);
                Ok::<_, anyhow::Error>(proxy)
            }
        })
        .await?;

        let failed = checked.iter().filter(|result| !result.is_ok()).count();
        if failed > 0 {
            debug!("{} proxies could not be checked", failed);
        }

        let order = self.settings.id_order();
        let ranked = rank(checked, order);
        info!("{} proxies alive", ranked.len());

        let resolver = Arc::clone(&self.resolver);
        let options = self.settings.name_options();
        let renamed = run_stage(ranked, concurrency, move |proxy: Proxy| {
            let resolver = Arc::clone(&resolver);
            async move { rename_proxy(proxy, resolver.as_ref(), options).await }
        })
        .await?;

        let mut proxies: Vec<Proxy> = renamed
            .into_iter()
            .filter_map(|result| match result.result {
                Ok(proxy) => Some(proxy),
                Err(e) => {
                    warn!("rename task {} failed: {}", result.index, e);
                    None
                }
            })
            .collect();

        if order == IdOrder::Submission {
            proxies.sort_by_key(|proxy| proxy.id);
        }

        Ok(proxies)
    }

    /// Run a whole cycle and return the number of published proxies
    pub async fn run_cycle(
        &self,
        fetcher: &SubscriptionFetcher,
        publisher: &dyn Publisher,
    ) -> Result<usize> {
        let fetched: Vec<Mapping> = fetcher
            .fetch_all(&self.settings.sub_urls)
            .await
            .into_iter()
            .flat_map(|result| result.proxies)
            .collect();
        info!("fetched {} proxies", fetched.len());

        let unique = deduplicate(fetched);
        info!("{} proxies after dedup", unique.len());

        let proxies = self.check_and_rename(unique).await?;
        info!("{} proxies renamed", proxies.len());

        publisher.publish(&proxies).await?;
        Ok(proxies.len())
    }
}
