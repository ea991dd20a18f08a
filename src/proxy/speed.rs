//! Download throughput measurement
//!
//! The clock starts on the first chunk that carries data, so connection setup,
//! TLS and response headers do not count against the proxy.

use crate::proxy::client::ProxyClient;
use futures::TryStreamExt;
use log::debug;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{timeout_at, Instant};
use tokio_util::io::StreamReader;

/// Size of each body read
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Measure download speed through `client` in KB/s.
///
/// Returns `None` when the request fails or no byte arrives before the
/// deadline.
pub async fn probe_speed(client: &ProxyClient, url: &str, limit: Duration) -> Option<u64> {
    let deadline = Instant::now() + limit;

    let response = match client.send(client.get(url).timeout(limit)).await {
        Ok(response) => response,
        Err(e) => {
            debug!("speed test request failed: {}", e);
            return None;
        }
    };

    let body = StreamReader::new(
        response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
    );
    tokio::pin!(body);

    tokio::select! {
        biased;
        _ = client.cancel_token().cancelled() => None,
        speed = measure(body, deadline) => speed,
    }
}

/// Read `body` to the end (or the deadline) and compute throughput in KB/s
pub async fn measure<R>(mut body: R, deadline: Instant) -> Option<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total_bytes: u64 = 0;
    let mut started: Option<Instant> = None;

    loop {
        match timeout_at(deadline, body.read(&mut buffer)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                started.get_or_insert_with(Instant::now);
                total_bytes += n as u64;
            }
            // a failed or timed out read after data still counts as a sample
            Ok(Err(_)) | Err(_) => {
                if total_bytes > 0 {
                    break;
                }
                return None;
            }
        }
    }

    let started = started?;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    Some(throughput_kbps(total_bytes, elapsed_ms))
}

/// KB/s for `total_bytes` received over `elapsed_ms`, clamping the interval to 1 ms
pub fn throughput_kbps(total_bytes: u64, elapsed_ms: u64) -> u64 {
    let elapsed_ms = elapsed_ms.max(1);
    (total_bytes as f64 / 1024.0 * 1000.0 / elapsed_ms as f64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{closed_url, serve, Route};
    use tokio::io::AsyncWriteExt;
    use tokio::time::sleep;

    #[test]
    fn test_throughput_formula() {
        assert_eq!(throughput_kbps(100 * 1024, 500), 200);
        assert_eq!(throughput_kbps(1024, 1000), 1);
        assert_eq!(throughput_kbps(512, 1000), 0);
    }

    #[test]
    fn test_throughput_zero_elapsed_clamped() {
        assert_eq!(throughput_kbps(1024, 0), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_constant_rate() {
        let (mut writer, reader) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            let chunk = vec![7u8; 10 * 1024];
            for _ in 0..10 {
                writer.write_all(&chunk).await.unwrap();
                sleep(Duration::from_millis(50)).await;
            }
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        let speed = measure(reader, deadline).await;
        assert_eq!(speed, Some(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_excludes_time_before_first_byte() {
        let (mut writer, reader) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            let chunk = vec![1u8; 10 * 1024];
            for _ in 0..10 {
                writer.write_all(&chunk).await.unwrap();
                sleep(Duration::from_millis(50)).await;
            }
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        assert_eq!(measure(reader, deadline).await, Some(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_deadline_after_data_keeps_sample() {
        let (mut writer, reader) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            writer.write_all(&vec![0u8; 20 * 1024]).await.unwrap();
            // never closes before the deadline
            sleep(Duration::from_secs(60)).await;
            drop(writer);
        });

        let deadline = Instant::now() + Duration::from_secs(1);
        // 20 KiB over the full second
        assert_eq!(measure(reader, deadline).await, Some(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_no_bytes() {
        let (writer, reader) = tokio::io::duplex(1024);
        drop(writer);
        let deadline = Instant::now() + Duration::from_secs(1);
        assert_eq!(measure(reader, deadline).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_timeout_before_first_byte() {
        let (_writer, reader) = tokio::io::duplex(1024);
        let deadline = Instant::now() + Duration::from_secs(1);
        assert_eq!(measure(reader, deadline).await, None);
    }

    #[tokio::test]
    async fn test_probe_speed_through_client() {
        let base = serve(vec![("/down", Route::new(200, vec![0u8; 256 * 1024]))]).await;
        let client = ProxyClient::new(reqwest::Client::builder().no_proxy().build().unwrap());

        let speed = probe_speed(&client, &format!("{}/down", base), Duration::from_secs(5)).await;
        assert!(matches!(speed, Some(s) if s > 0));
    }

    #[tokio::test]
    async fn test_probe_speed_empty_body() {
        let base = serve(vec![("/empty", Route::new(200, Vec::new()))]).await;
        let client = ProxyClient::new(reqwest::Client::builder().no_proxy().build().unwrap());

        let speed = probe_speed(&client, &format!("{}/empty", base), Duration::from_secs(5)).await;
        assert_eq!(speed, None);
    }

    #[tokio::test]
    async fn test_probe_speed_unreachable() {
        let base = closed_url().await;
        let client = ProxyClient::new(reqwest::Client::builder().no_proxy().build().unwrap());

        let speed = probe_speed(&client, &format!("{}/down", base), Duration::from_secs(2)).await;
        assert_eq!(speed, None);
    }
}
