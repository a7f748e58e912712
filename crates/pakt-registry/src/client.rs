//! HTTP client for the npm packument protocol.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;

use pakt_core::config::Config;
use pakt_util::errors::{PaktError, PaktResult};

use crate::metadata::Packument;
use crate::retry::RetryCoordinator;

const RETRY_DELAY: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build a shared reqwest client for registry requests.
pub fn build_client() -> PaktResult<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent("pakt/0.1")
        .build()
        .map_err(|e| {
            PaktError::Network {
                message: format!("Failed to create HTTP client: {e}"),
            }
            .into()
        })
}

/// Registry client with a per-session packument cache and bounded,
/// timer-coalesced retries for transient failures.
pub struct RegistryClient {
    http: Client,
    base_url: String,
    retries: u32,
    coordinator: Arc<RetryCoordinator>,
    cache: Mutex<HashMap<String, Arc<Packument>>>,
}

impl RegistryClient {
    pub fn new(config: &Config) -> PaktResult<Self> {
        Ok(Self {
            http: build_client()?,
            base_url: config.registry_url.trim_end_matches('/').to_string(),
            retries: config.network_retries,
            coordinator: RetryCoordinator::new(RETRY_DELAY),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// URL of the packument for a package name. Scoped names keep their
    /// `@` but escape the separating slash.
    pub fn packument_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.replace('/', "%2f"))
    }

    /// Fetch (or reuse) the registry document for a package name.
    pub async fn packument(&self, name: &str) -> PaktResult<Arc<Packument>> {
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = cache.get(name) {
                return Ok(Arc::clone(hit));
            }
        }

        let packument = Arc::new(self.fetch_packument(name).await?);
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Arc::clone(&packument));
        Ok(packument)
    }

    /// Drop all memoized registry responses.
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    async fn fetch_packument(&self, name: &str) -> PaktResult<Packument> {
        let url = self.packument_url(name);
        let mut last_err = String::new();

        for attempt in 0..=self.retries {
            if attempt > 0 {
                tracing::debug!("retrying {url} (attempt {attempt}): {last_err}");
                self.coordinator.wait_for_retry().await;
            }

            match self.http.get(&url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(PaktError::Resolution {
                            message: format!("Couldn't find package {name} on the registry"),
                        }
                        .into());
                    }
                    if status.is_server_error() {
                        last_err = format!("HTTP {status} from {url}");
                        continue;
                    }
                    if !status.is_success() {
                        return Err(PaktError::Network {
                            message: format!("HTTP {status} fetching {url}"),
                        }
                        .into());
                    }

                    return resp.json::<Packument>().await.map_err(|e| {
                        PaktError::Network {
                            message: format!("Failed to decode response from {url}: {e}"),
                        }
                        .into()
                    });
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_err = format!("{e}");
                    continue;
                }
                Err(e) => {
                    return Err(PaktError::Network {
                        message: format!("Request to {url} failed: {e}"),
                    }
                    .into());
                }
            }
        }

        Err(PaktError::Network {
            message: format!("Failed after {} retries for {url}: {last_err}", self.retries),
        }
        .into())
    }
}
