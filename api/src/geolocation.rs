//! IP geolocation lookups used as the network fallback tier of region resolution.
//!
//! The remote service is untrusted: any transport error, non-2xx status or body that does
//! not carry a country code is reported as an error or as "no country", never a panic.

use crate::config::GeolocationConfig;
use ahash::AHashMap;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Resolves an IP address to an ISO 3166-1 alpha-2 country code.
#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// `Ok(None)` means the service answered but did not know the country.
    async fn country_code(&self, ip: IpAddr) -> Result<Option<String>>;
    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
}

/// Client for ip-api.com compatible JSON endpoints.
pub struct IpApiLocator {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for IpApiLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpApiLocator")
            .field("base_url", &self.base_url)
            .field("client", &"<reqwest::Client>")
            .finish()
    }
}

impl IpApiLocator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create geolocation HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn lookup_url(&self, ip: IpAddr) -> String {
        format!("{}/json/{}?fields=countryCode", self.base_url, ip)
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn country_code(&self, ip: IpAddr) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.lookup_url(ip))
            .send()
            .await
            .context("Failed to send geolocation request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Geolocation API error ({}): {}",
                status,
                body
            ));
        }

        let data: IpApiResponse = response
            .json()
            .await
            .context("Failed to parse geolocation response")?;

        Ok(data
            .country_code
            .map(|code| code.trim().to_uppercase())
            .filter(|code| !code.is_empty()))
    }

    fn name(&self) -> &'static str {
        "ip-api"
    }
}

#[derive(Debug, Clone)]
struct CachedLookup {
    country_code: Option<String>,
    fetched_at: Instant,
}

/// Caches successful lookups per IP for a fixed TTL. Failed lookups are not cached.
///
/// The map sits behind an `RwLock`, so concurrent requests can read and insert safely.
/// Two concurrent misses for the same IP may both reach the remote service.
pub struct CachedGeoLocator<L> {
    inner: L,
    ttl: Duration,
    capacity: usize,
    entries: RwLock<AHashMap<IpAddr, CachedLookup>>,
}

impl<L: GeoLocator> CachedGeoLocator<L> {
    pub fn new(inner: L, ttl: Duration, capacity: usize) -> Self {
        Self {
            inner,
            ttl,
            capacity: capacity.max(1),
            entries: RwLock::new(AHashMap::default()),
        }
    }

    fn cached(&self, ip: IpAddr) -> Option<Option<String>> {
        let entries = self.entries.read().ok()?;
        entries
            .get(&ip)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.country_code.clone())
    }

    fn store(&self, ip: IpAddr, country_code: Option<String>) {
        let Ok(mut entries) = self.entries.write() else {
            tracing::warn!("Geolocation cache lock poisoned, skipping cache write");
            return;
        };
        if entries.len() >= self.capacity && !entries.contains_key(&ip) {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.fetched_at)
                    .map(|(ip, _)| *ip);
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            ip,
            CachedLookup {
                country_code,
                fetched_at: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
}

#[async_trait]
impl<L: GeoLocator> GeoLocator for CachedGeoLocator<L> {
    async fn country_code(&self, ip: IpAddr) -> Result<Option<String>> {
        if let Some(hit) = self.cached(ip) {
            tracing::debug!(ip = %ip, country = ?hit, "Geolocation cache hit");
            return Ok(hit);
        }
        let country_code = self.inner.country_code(ip).await?;
        self.store(ip, country_code.clone());
        Ok(country_code)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Build the configured locator, or `None` when the network tier is switched off.
pub fn from_config(config: &GeolocationConfig) -> Result<Option<Arc<dyn GeoLocator>>> {
    if !config.enabled {
        return Ok(None);
    }
    let locator = IpApiLocator::new(&config.base_url, config.timeout)?;
    Ok(Some(Arc::new(CachedGeoLocator::new(
        locator,
        config.cache_ttl,
        config.cache_capacity,
    ))))
}
