//! Ranking of checked proxies and display-name composition

use crate::pool::TaskResult;
use crate::proxy::geo::{country_flag, CountryResolver};
use crate::proxy::models::{Proxy, ProxyInfo};

/// Order in which alive proxies receive their display Id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdOrder {
    /// Order the check stage finished in; differs between runs
    Completion,
    /// Order the proxies were submitted in; reproducible
    Submission,
}

/// Options that shape the composed name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NameOptions {
    pub flag: bool,
    pub speed: bool,
}

/// Keep alive proxies from the check stage and number them from 1
pub fn rank(results: Vec<TaskResult<Proxy>>, order: IdOrder) -> Vec<Proxy> {
    let mut alive: Vec<Proxy> = results
        .into_iter()
        .filter_map(TaskResult::ok)
        .filter(|proxy| proxy.info.alive)
        .collect();

    if order == IdOrder::Submission {
        alive.sort_by_key(|proxy| proxy.index);
    }

    for (position, proxy) in alive.iter_mut().enumerate() {
        proxy.id = position + 1;
    }

    alive
}

/// Resolve the country of `proxy` and write its display name back into the descriptor
pub async fn rename_proxy(
    mut proxy: Proxy,
    resolver: &dyn CountryResolver,
    options: NameOptions,
) -> anyhow::Result<Proxy> {
    if proxy.id == 0 {
        anyhow::bail!("proxy {} was never ranked", proxy);
    }

    proxy.info.country = resolver.resolve(&proxy).await;
    if options.flag {
        proxy.info.flag = country_flag(&proxy.info.country);
    }

    let name = compose_name(&proxy.info, proxy.id, options);
    proxy.set_name(name);
    Ok(proxy)
}

/// `"[<flag> ]<country> <id:03>[ | ⬇️ <speed>]"`
pub fn compose_name(info: &ProxyInfo, id: usize, options: NameOptions) -> String {
    let mut name = format!("{} {:03}", info.country, id);

    if options.flag && !info.flag.is_empty() {
        name = format!("{} {}", info.flag, name);
    }

    if options.speed {
        name = format!("{} | ⬇️ {}", name, format_speed(info.speed));
    }

    name
}

/// Human-readable throughput for a KB/s value
pub fn format_speed(kbps: u64) -> String {
    const KB_PER_MB: u64 = 1024;
    const KB_PER_GB: u64 = 1024 * 1024;

    match kbps {
        s if s < KB_PER_MB => format!("{} KB/s", s),
        s if s < KB_PER_GB => format!("{:.2} MB/s", s as f64 / KB_PER_MB as f64),
        s => format!("{:.2} GB/s", s as f64 / KB_PER_GB as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::proxy::geo::RegexResolver;
    use crate::proxy::models::descriptor;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl CountryResolver for Fixed {
        async fn resolve(&self, _proxy: &Proxy) -> String {
            self.0.to_string()
        }
    }

    fn checked(index: usize, alive: bool) -> TaskResult<Proxy> {
        let mut proxy = Proxy::new(
            descriptor(&format!(
                "{{name: 'node {}', type: socks5, server: 10.0.0.{}, port: 1080}}",
                index, index
            )),
            index,
        );
        proxy.info.alive = alive;
        TaskResult {
            index,
            result: Ok(proxy),
        }
    }

    fn failed(index: usize) -> TaskResult<Proxy> {
        TaskResult {
            index,
            result: Err(TaskError::Failed(anyhow::anyhow!("unsupported"))),
        }
    }

    #[test]
    fn test_format_speed_boundaries() {
        assert_eq!(format_speed(0), "0 KB/s");
        assert_eq!(format_speed(1023), "1023 KB/s");
        assert_eq!(format_speed(1024), "1.00 MB/s");
        assert_eq!(format_speed(1536), "1.50 MB/s");
        assert_eq!(format_speed(1024 * 1024 - 1), "1024.00 MB/s");
        assert_eq!(format_speed(1024 * 1024), "1.00 GB/s");
    }

    #[test]
    fn test_compose_name_full() {
        let info = ProxyInfo {
            country: "US".to_string(),
            flag: "🇺🇸".to_string(),
            speed: 2048,
            ..Default::default()
        };
        let name = compose_name(&info, 7, NameOptions { flag: true, speed: true });
        assert_eq!(name, "🇺🇸 US 007 | ⬇️ 2.00 MB/s");
    }

    #[test]
    fn test_compose_name_plain() {
        let info = ProxyInfo {
            country: "JP".to_string(),
            speed: 900,
            ..Default::default()
        };
        assert_eq!(compose_name(&info, 12, NameOptions::default()), "JP 012");
        assert_eq!(compose_name(&info, 1234, NameOptions::default()), "JP 1234");
    }

    #[test]
    fn test_rank_filters_and_numbers_alive() {
        let results = vec![
            checked(3, true),
            checked(0, false),
            failed(1),
            checked(2, true),
            checked(4, false),
            checked(5, true),
        ];

        let ranked = rank(results, IdOrder::Completion);
        let ids: Vec<usize> = ranked.iter().map(|p| p.id).collect();
        let indices: Vec<usize> = ranked.iter().map(|p| p.index).collect();

        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(indices, vec![3, 2, 5]);
        assert!(ranked.iter().all(|p| p.info.alive));
    }

    #[test]
    fn test_rank_submission_order_is_stable() {
        let ranked = rank(
            vec![checked(5, true), checked(1, true), checked(3, true)],
            IdOrder::Submission,
        );
        let pairs: Vec<(usize, usize)> = ranked.iter().map(|p| (p.index, p.id)).collect();
        assert_eq!(pairs, vec![(1, 1), (3, 2), (5, 3)]);
    }

    #[test]
    fn test_rank_max_id_equals_alive_count() {
        let results: Vec<_> = (0..20).map(|i| checked(i, i % 3 == 0)).collect();
        let ranked = rank(results, IdOrder::Submission);
        let alive = (0..20).filter(|i| i % 3 == 0).count();
        assert_eq!(ranked.len(), alive);
        assert_eq!(ranked.iter().map(|p| p.id).max(), Some(alive));
    }

    #[tokio::test]
    async fn test_rename_writes_name() {
        let mut proxy = checked(0, true).ok().unwrap();
        proxy.id = 7;
        proxy.info.speed = 2048;

        let renamed = rename_proxy(proxy, &Fixed("US"), NameOptions { flag: true, speed: true })
            .await
            .unwrap();

        assert_eq!(renamed.info.country, "US");
        assert_eq!(renamed.info.flag, "🇺🇸");
        assert_eq!(renamed.name(), "🇺🇸 US 007 | ⬇️ 2.00 MB/s");
    }

    #[tokio::test]
    async fn test_rename_without_flag_keeps_flag_empty() {
        let mut proxy = checked(0, true).ok().unwrap();
        proxy.id = 2;

        let renamed = rename_proxy(proxy, &Fixed("SG"), NameOptions::default())
            .await
            .unwrap();
        assert!(renamed.info.flag.is_empty());
        assert_eq!(renamed.name(), "SG 002");
    }

    #[tokio::test]
    async fn test_rename_unranked_is_error() {
        let proxy = checked(0, true).ok().unwrap();
        assert!(rename_proxy(proxy, &Fixed("US"), NameOptions::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_rename_is_idempotent() {
        let resolver = RegexResolver::builtin();
        let options = NameOptions { flag: true, speed: true };
        let mut proxy = Proxy::new(
            descriptor("{name: 'Hong Kong 01', type: http, server: 1.1.1.1, port: 80}"),
            0,
        );
        proxy.info.alive = true;
        proxy.info.speed = 300;
        proxy.id = 4;

        let first = rename_proxy(proxy.clone(), &resolver, options).await.unwrap();
        let second = rename_proxy(proxy, &resolver, options).await.unwrap();
        assert_eq!(first.name(), second.name());
        assert_eq!(first.name(), "🇭🇰 HK 004 | ⬇️ 300 KB/s");

        let again = rename_proxy(first.clone(), &resolver, options).await.unwrap();
        assert_eq!(again.name(), first.name());
    }

    #[tokio::test]
    async fn test_rename_is_stable_at_gigabyte_speeds() {
        let resolver = RegexResolver::builtin();
        let options = NameOptions { flag: true, speed: true };
        let mut proxy = Proxy::new(
            descriptor("{name: 'Paris 01', type: http, server: 1.1.1.1, port: 80}"),
            0,
        );
        proxy.info.alive = true;
        proxy.info.speed = 2 * 1024 * 1024;
        proxy.id = 1;

        let first = rename_proxy(proxy, &resolver, options).await.unwrap();
        assert_eq!(first.name(), "🇫🇷 FR 001 | ⬇️ 2.00 GB/s");

        let second = rename_proxy(first.clone(), &resolver, options).await.unwrap();
        assert_eq!(second.name(), first.name());
        assert_eq!(second.info.country, "FR");
    }
}
