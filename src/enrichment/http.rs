//! Shared HTTP client for every provider adapter.
//!
//! All outbound calls go through [`ApiClient`], which:
//! - bounds every call with a timeout (10s unless overridden)
//! - aborts in-flight calls when the caller's [`CancellationToken`] fires
//! - classifies failures into [`EnrichmentError::ExternalApi`] /
//!   [`EnrichmentError::Timeout`] so raw transport errors never escape
//! - gates calls per provider with a small semaphore, plus a minimum spacing
//!   between calls for providers that publish a request-rate limit
//!
//! No retries happen here. A failed call is reported once so the
//! orchestrator can record exactly which provider failed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::domain::{EnrichmentError, ImageRejection};
use super::traits::{FetchedImage, ImageFetcher};
use crate::model::{PROVIDER_PRIORITY, Provider};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// User agent string - MusicBrainz requires this
pub const USER_AGENT: &str = concat!(
    "MusicEnricher/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/music-enricher)"
);

/// Query parameters whose values must never end up in logs or errors.
const SECRET_PARAMS: [&str; 2] = ["api_key", "client_key"];

/// Tuning for the shared client.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    /// Per-call time budget
    pub timeout: Duration,
    /// Simultaneous calls allowed per provider
    pub max_concurrent_per_provider: usize,
    /// Minimum spacing between MusicBrainz calls (1 req/sec policy)
    pub musicbrainz_min_interval: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_concurrent_per_provider: 2,
            musicbrainz_min_interval: Duration::from_millis(1100),
        }
    }
}

/// Per-provider admission gate: waits, never fails.
struct ProviderGate {
    permits: Semaphore,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl ProviderGate {
    fn new(permits: usize, min_interval: Duration) -> Self {
        Self {
            permits: Semaphore::new(permits.max(1)),
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Hold on to spacing state only long enough to reserve our slot.
    async fn wait_for_slot(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// HTTP client shared by all adapters.
#[derive(Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    timeout: Duration,
    gates: Arc<HashMap<Provider, ProviderGate>>,
}

impl ApiClient {
    /// Create a new client
    ///
    /// The client is configured to:
    /// - Accept gzip-compressed responses (reduces bandwidth)
    /// - Send User-Agent header identifying the application
    pub fn new(settings: &HttpSettings) -> Result<Self, EnrichmentError> {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| EnrichmentError::Infrastructure(format!("HTTP client: {}", e)))?;

        let gates = PROVIDER_PRIORITY
            .iter()
            .map(|provider| {
                let interval = match provider {
                    Provider::MusicBrainz => settings.musicbrainz_min_interval,
                    _ => Duration::ZERO,
                };
                (
                    *provider,
                    ProviderGate::new(settings.max_concurrent_per_provider, interval),
                )
            })
            .collect();

        Ok(Self {
            http_client,
            timeout: settings.timeout,
            gates: Arc::new(gates),
        })
    }

    /// Per-call timeout this client applies.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET a JSON document and deserialize it.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        provider: Provider,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<T, EnrichmentError> {
        let work = async {
            let response = self.send(provider, url, Some("application/json")).await?;
            let body = response
                .bytes()
                .await
                .map_err(|e| transport_error(provider, url, &e))?;
            serde_json::from_slice::<T>(&body).map_err(|e| EnrichmentError::ExternalApi {
                provider,
                http_status: Some(200),
                http_status_text: format!("malformed response: {}", e),
                url: redact_url(url),
            })
        };

        self.bounded(provider, url, cancel, work).await
    }

    /// GET raw bytes (images), refusing bodies larger than `max_bytes`.
    pub async fn get_bytes(
        &self,
        provider: Provider,
        url: &str,
        max_bytes: usize,
        cancel: &CancellationToken,
    ) -> Result<FetchedImage, EnrichmentError> {
        let work = async {
            let mut response = self.send(provider, url, None).await?;
            if response
                .content_length()
                .is_some_and(|len| len > max_bytes as u64)
            {
                debug!(url = %redact_url(url), max = max_bytes, "Image too large, not downloading");
                return Err(EnrichmentError::image(ImageRejection::FileTooLarge));
            }

            let mime_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();

            // Content-Length may be absent or wrong
            let mut data = Vec::new();
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| transport_error(provider, url, &e))?
            {
                if data.len() + chunk.len() > max_bytes {
                    debug!(url = %redact_url(url), max = max_bytes, "Image body exceeded limit");
                    return Err(EnrichmentError::image(ImageRejection::FileTooLarge));
                }
                data.extend_from_slice(&chunk);
            }

            Ok(FetchedImage {
                data,
                mime_type,
                url: url.to_string(),
            })
        };

        self.bounded(provider, url, cancel, work).await
    }

    /// Send the request and classify the status code.
    async fn send(
        &self,
        provider: Provider,
        url: &str,
        accept: Option<&str>,
    ) -> Result<reqwest::Response, EnrichmentError> {
        let mut request = self.http_client.get(url);
        if let Some(accept) = accept {
            request = request.header(reqwest::header::ACCEPT, accept);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(provider, url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::ExternalApi {
                provider,
                http_status: Some(status.as_u16()),
                http_status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
                url: redact_url(url),
            });
        }

        Ok(response)
    }

    /// Run `work` behind the provider gate, the timeout and the cancel token.
    async fn bounded<T, F>(
        &self,
        provider: Provider,
        url: &str,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<T, EnrichmentError>
    where
        F: Future<Output = Result<T, EnrichmentError>>,
    {
        let admitted = async {
            let gate = self.gates.get(&provider);
            let _permit = match gate {
                Some(gate) => Some(
                    gate.permits
                        .acquire()
                        .await
                        .map_err(|_| EnrichmentError::Cancelled)?,
                ),
                None => None,
            };
            if let Some(gate) = gate {
                gate.wait_for_slot().await;
            }

            debug!(target: "enrichment::http", provider = %provider, url = %redact_url(url), "GET");
            run_with_deadline(self.timeout, &operation_name(provider, url), work).await
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(EnrichmentError::Cancelled),
            result = admitted => result,
        }
    }
}

#[async_trait]
impl ImageFetcher for ApiClient {
    async fn fetch_image(
        &self,
        provider: Provider,
        url: &str,
        max_bytes: usize,
        cancel: &CancellationToken,
    ) -> Result<FetchedImage, EnrichmentError> {
        self.get_bytes(provider, url, max_bytes, cancel).await
    }
}

/// Apply a deadline to a future, producing a classified timeout.
pub async fn run_with_deadline<T, F>(
    timeout: Duration,
    operation: &str,
    work: F,
) -> Result<T, EnrichmentError>
where
    F: Future<Output = Result<T, EnrichmentError>>,
{
    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(EnrichmentError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
            operation: operation.to_string(),
        }),
    }
}

fn operation_name(provider: Provider, url: &str) -> String {
    format!("{} GET {}", provider, redact_url(url))
}

fn transport_error(provider: Provider, url: &str, e: &reqwest::Error) -> EnrichmentError {
    EnrichmentError::ExternalApi {
        provider,
        http_status: e.status().map(|s| s.as_u16()),
        http_status_text: if e.is_timeout() {
            "transport timeout".to_string()
        } else if e.is_connect() {
            "connection failed".to_string()
        } else {
            e.to_string()
        },
        url: redact_url(url),
    }
}

/// Replace credential query values with `***`.
pub fn redact_url(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let redacted: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if SECRET_PARAMS.contains(&key) => format!("{}=***", key),
            _ => pair.to_string(),
        })
        .collect();

    format!("{}?{}", base, redacted.join("&"))
}
