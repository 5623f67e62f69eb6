//! Internet reachability check and change-only monitor.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use sysgate_common::NetworkCfg;

#[derive(Debug, Clone)]
pub struct ConnectivityProbe {
    dns_host: String,
    probe_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl ConnectivityProbe {
    pub fn new(dns_host: impl Into<String>, probe_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|err| {
                warn!("Falling back to default HTTP client: {}", err);
                reqwest::Client::new()
            });
        Self {
            dns_host: dns_host.into(),
            probe_url: probe_url.into(),
            timeout,
            client,
        }
    }

    pub fn from_config(cfg: &NetworkCfg) -> Self {
        Self::new(cfg.dns_host.clone(), cfg.probe_url.clone(), cfg.probe_timeout())
    }

    /// DNS first, HTTP HEAD second. Each step is bounded by the timeout.
    pub async fn check(&self) -> bool {
        self.resolves().await || self.head_ok().await
    }

    async fn resolves(&self) -> bool {
        let target = if self.dns_host.contains(':') {
            self.dns_host.clone()
        } else {
            format!("{}:80", self.dns_host)
        };
        match timeout(self.timeout, tokio::net::lookup_host(target)).await {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(err)) => {
                debug!("DNS lookup for {} failed: {}", self.dns_host, err);
                false
            }
            Err(_) => {
                debug!("DNS lookup for {} timed out", self.dns_host);
                false
            }
        }
    }

    async fn head_ok(&self) -> bool {
        match timeout(self.timeout, self.client.head(&self.probe_url).send()).await {
            Ok(Ok(response)) => {
                let status = response.status();
                status.is_success() || status.is_redirection()
            }
            Ok(Err(err)) => {
                debug!("Probe request to {} failed: {}", self.probe_url, err);
                false
            }
            Err(_) => {
                debug!("Probe request to {} timed out", self.probe_url);
                false
            }
        }
    }
}

/// Polls `probe` every `interval`. The receiver starts at `None` and only
/// changes when the online status flips.
pub fn spawn_monitor(
    probe: ConnectivityProbe,
    interval: Duration,
) -> (watch::Receiver<Option<bool>>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(None);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }
            let online = probe.check().await;
            let changed = tx.send_if_modified(|current| {
                if *current == Some(online) {
                    false
                } else {
                    *current = Some(online);
                    true
                }
            });
            if changed {
                info!("Network is {}", if online { "online" } else { "offline" });
            }
        }
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const UNRESOLVABLE: &str = "sysgate-probe.invalid";

    #[tokio::test]
    async fn localhost_resolves() {
        let probe = ConnectivityProbe::new("localhost", "http://127.0.0.1:9/", Duration::from_secs(2));
        assert!(probe.check().await);
    }

    #[tokio::test]
    async fn falls_back_to_http_head() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 204 No Content\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        let probe = ConnectivityProbe::new(
            UNRESOLVABLE,
            format!("http://{addr}/generate_204"),
            Duration::from_secs(2),
        );
        assert!(probe.check().await);
        Ok(())
    }

    #[tokio::test]
    async fn offline_within_timeout() -> anyhow::Result<()> {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            listener.local_addr()?
        };
        let probe = ConnectivityProbe::new(
            UNRESOLVABLE,
            format!("http://{addr}/generate_204"),
            Duration::from_secs(1),
        );

        let started = Instant::now();
        assert!(!probe.check().await);
        assert!(started.elapsed() < Duration::from_secs(3));
        Ok(())
    }

    #[tokio::test]
    async fn monitor_reports_first_status() -> anyhow::Result<()> {
        let probe = ConnectivityProbe::new("localhost", "http://127.0.0.1:9/", Duration::from_secs(2));
        let (mut rx, handle) = spawn_monitor(probe, Duration::from_millis(50));

        timeout(Duration::from_secs(5), rx.changed()).await??;
        assert_eq!(*rx.borrow(), Some(true));

        handle.abort();
        Ok(())
    }
}
