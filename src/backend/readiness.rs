use std::time::Duration;

use tokio::time::Instant;

/// Chemin de santé exposé par le backend.
pub const HEALTH_PATH: &str = "/health";
/// Intervalle entre deux sondes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(300);
/// Délai maximal d'une requête individuelle.
const PROBE_TIMEOUT_MAX: Duration = Duration::from_secs(2);
const PROBE_TIMEOUT_MIN: Duration = Duration::from_millis(50);

/// État de disponibilité; ne progresse que vers l'avant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    Pending,
    Ready,
    TimedOut,
}

/// Joint une URL de base et un chemin sans doubler les `/`.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Sonde HTTP périodique d'un endpoint de santé.
pub struct ReadinessGate {
    client: reqwest::Client,
    path: String,
    interval: Duration,
}

impl ReadinessGate {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_default(),
            path: path.into(),
            interval: POLL_INTERVAL,
        }
    }

    /// Sonde du backend sur `/health`.
    pub fn backend() -> Self {
        Self::new(HEALTH_PATH)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Une seule sonde: vrai uniquement sur un statut 200.
    pub async fn probe(&self, url: &str, timeout: Duration) -> bool {
        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => true,
            Ok(response) => {
                log::debug!("{} answered {}", url, response.status());
                false
            }
            Err(error) => {
                log::debug!("{} not reachable yet: {}", url, error);
                false
            }
        }
    }

    /// Sonde jusqu'au premier 200 ou jusqu'à épuisement de `timeout`.
    ///
    /// Les erreurs de connexion ne font que programmer la tentative suivante.
    pub async fn await_ready(&self, base_url: &str, timeout: Duration) -> ReadinessState {
        let url = join_url(base_url, &self.path);
        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let probe_timeout = remaining.clamp(PROBE_TIMEOUT_MIN, PROBE_TIMEOUT_MAX);
            if self.probe(&url, probe_timeout).await {
                log::info!("{} ready after {} attempt(s)", url, attempts);
                return ReadinessState::Ready;
            }

            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "{} not ready after {} ms ({} attempts)",
                    url,
                    timeout.as_millis(),
                    attempts
                );
                return ReadinessState::TimedOut;
            }
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serveur HTTP minimal qui répond 503 jusqu'à la tentative `ok_from` (incluse).
    async fn health_server(ok_from: Option<usize>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let hit = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let status = match ok_from {
                    Some(n) if hit >= n => "200 OK",
                    _ => "503 Service Unavailable",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{{}}",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{}", addr), hits)
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://127.0.0.1:8000/", "/health"), "http://127.0.0.1:8000/health");
        assert_eq!(join_url("http://127.0.0.1:11434", "api/tags"), "http://127.0.0.1:11434/api/tags");
    }

    #[tokio::test]
    async fn await_ready_succeeds_on_third_attempt() {
        let (url, hits) = health_server(Some(3)).await;
        let gate = ReadinessGate::backend().with_interval(Duration::from_millis(20));

        let state = gate.await_ready(&url, Duration::from_secs(5)).await;
        assert_eq!(state, ReadinessState::Ready);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn await_ready_times_out_at_the_budget() {
        let (url, _hits) = health_server(None).await;
        let gate = ReadinessGate::backend().with_interval(Duration::from_millis(50));
        let timeout = Duration::from_millis(600);

        let started = std::time::Instant::now();
        let state = gate.await_ready(&url, timeout).await;
        let elapsed = started.elapsed();

        assert_eq!(state, ReadinessState::TimedOut);
        assert!(elapsed >= timeout, "returned early after {:?}", elapsed);
        assert!(elapsed < timeout + Duration::from_secs(2), "returned late after {:?}", elapsed);
    }

    #[tokio::test]
    async fn connection_refused_is_retried_until_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let gate = ReadinessGate::backend().with_interval(Duration::from_millis(30));
        let state = gate
            .await_ready(&format!("http://{}", addr), Duration::from_millis(300))
            .await;
        assert_eq!(state, ReadinessState::TimedOut);
    }
}
