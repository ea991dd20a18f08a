//! Proxy module for checking and renaming subscription proxies
//!
//! This module provides functionality for:
//! - Loading and deduplicating Clash-style subscriptions
//! - Building a client that routes through a single proxy
//! - Probing reachability, streaming unlocks and download speed
//! - Resolving countries and composing display names

pub mod checker;
pub mod client;
pub mod geo;
pub mod models;
pub mod rename;
pub mod speed;
pub mod subscription;

pub use checker::{Checker, CheckerConfig, ProbeEndpoints};
pub use client::{ClientFactory, ProxyClient, ReqwestClientFactory};
pub use geo::{
    country_flag, resolver_for, ApiResolver, CountryResolver, MixResolver, RegexResolver,
    RenameMethod,
};
pub use models::{ProbeItem, Proxy, ProxyInfo, UNKNOWN_COUNTRY};
pub use rename::{compose_name, format_speed, rank, rename_proxy, IdOrder, NameOptions};
pub use speed::probe_speed;
pub use subscription::{deduplicate, FetchResult, FetcherConfig, SubscriptionFetcher};
