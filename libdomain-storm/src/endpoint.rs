use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

pub const IANA_BOOTSTRAP_URL: &str = "https://data.iana.org/rdap/dns.json";

/// Endpoints known without a bootstrap round-trip.
const STATIC_ENDPOINTS: &[(&str, &str)] = &[
    ("com", "https://rdap.verisign.com/com/v1"),
    ("net", "https://rdap.verisign.com/net/v1"),
    ("org", "https://rdap.publicinterestregistry.org/rdap"),
    ("io", "https://rdap.nic.io"),
    ("co", "https://rdap.nic.co"),
];

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Failed to fetch IANA bootstrap: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("Invalid domain format: {0}")]
    InvalidDomain(String),
}

#[derive(Debug, Deserialize)]
struct IanaBootstrap {
    services: Vec<(Vec<String>, Vec<String>)>,
}

/// TLD to RDAP base URL map.
#[derive(Debug)]
pub struct EndpointRegistry {
    endpoints: DashMap<String, String>,
    bootstrapped: AtomicBool,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: DashMap::new(),
            bootstrapped: AtomicBool::new(false),
        }
    }

    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for (tld, url) in STATIC_ENDPOINTS {
            registry.insert(tld, url);
        }
        registry
    }

    pub fn insert(&self, tld: &str, base_url: &str) {
        self.endpoints
            .insert(tld.to_lowercase(), base_url.trim_end_matches('/').to_string());
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::Relaxed)
    }

    pub async fn bootstrap(&self, client: &Client) -> Result<(), EndpointError> {
        self.bootstrap_from(client, IANA_BOOTSTRAP_URL).await
    }

    pub async fn bootstrap_from(&self, client: &Client, url: &str) -> Result<(), EndpointError> {
        if self.is_bootstrapped() {
            return Ok(());
        }

        let resp: IanaBootstrap = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut added = 0usize;
        for (tlds, urls) in resp.services {
            if let Some(url) = urls.iter().find(|u| u.starts_with("https://")).or(urls.first()) {
                for tld in tlds {
                    self.insert(&tld, url);
                    added += 1;
                }
            }
        }

        self.bootstrapped.store(true, Ordering::Relaxed);
        tracing::info!(tlds = added, "RDAP bootstrap loaded");
        Ok(())
    }

    pub fn get_endpoint(&self, tld: &str) -> Option<String> {
        self.endpoints.get(&tld.to_lowercase()).map(|v| v.clone())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

pub fn extract_tld(domain: &str) -> Result<String, EndpointError> {
    let trimmed = domain.trim().trim_end_matches('.');
    match trimmed.rsplit_once('.') {
        Some((label, tld)) if !label.is_empty() && !tld.is_empty() => Ok(tld.to_lowercase()),
        _ => Err(EndpointError::InvalidDomain(domain.to_string())),
    }
}
