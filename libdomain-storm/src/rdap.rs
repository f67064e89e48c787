use crate::{
    client::{ByteCounters, ProtocolClient},
    config::RdapConfig,
    endpoint::{extract_tld, EndpointRegistry},
    http::{create_direct_client, create_proxied_client},
    proxy::Proxy,
    ratelimit::EndpointRateLimiters,
    types::{Bandwidth, QueryError, QueryResult, Verdict},
};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use std::{sync::Arc, time::Instant};
use tokio::sync::OnceCell;

/// Request line plus the handful of headers reqwest sends.
const REQUEST_OVERHEAD: usize = 96;

/// RDAP over HTTP(S) via a forward proxy.
///
/// Only the status line and headers are read; the JSON body is dropped
/// unread. Clients are pooled per proxy so connections are kept alive across
/// every domain routed through that proxy.
pub struct RdapClient {
    registry: Arc<EndpointRegistry>,
    clients: DashMap<usize, Client>,
    limiters: Option<EndpointRateLimiters>,
    bootstrap: OnceCell<()>,
    config: RdapConfig,
    counters: ByteCounters,
}

impl RdapClient {
    pub fn new(config: RdapConfig) -> Self {
        Self::with_registry(config, Arc::new(EndpointRegistry::with_defaults()))
    }

    pub fn with_registry(config: RdapConfig, registry: Arc<EndpointRegistry>) -> Self {
        Self {
            registry,
            clients: DashMap::new(),
            limiters: config.max_rate_per_endpoint.and_then(EndpointRateLimiters::new),
            bootstrap: OnceCell::new(),
            config,
            counters: ByteCounters::default(),
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Number of per-proxy clients built so far.
    pub fn pooled_clients(&self) -> usize {
        self.clients.len()
    }

    async fn ensure_bootstrapped(&self) {
        if !self.config.bootstrap {
            return;
        }
        self.bootstrap
            .get_or_init(|| async {
                let result = match create_direct_client(self.config.timeout) {
                    Ok(client) => self.registry.bootstrap(&client).await,
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = result {
                    tracing::warn!(error = %e, "RDAP bootstrap failed, using built-in endpoints");
                }
            })
            .await;
    }

    fn client_for(&self, proxy: &Proxy) -> Result<Client, QueryError> {
        if let Some(client) = self.clients.get(&proxy.id()) {
            return Ok(client.clone());
        }
        let client = create_proxied_client(proxy, &self.config)?;
        self.counters.connection();
        Ok(self.clients.entry(proxy.id()).or_insert(client).clone())
    }

    async fn query(&self, domain: &str, proxy: &Proxy) -> Result<Verdict, QueryError> {
        self.ensure_bootstrapped().await;

        let tld = extract_tld(domain).map_err(|_| QueryError::NoEndpoint(domain.to_string()))?;
        let endpoint = self
            .registry
            .get_endpoint(&tld)
            .ok_or(QueryError::NoEndpoint(tld))?;

        if let Some(limiters) = &self.limiters {
            limiters.acquire(&endpoint).await;
        }

        let client = self.client_for(proxy)?;
        let url = format!("{endpoint}/domain/{domain}");
        self.counters.sent(url.len() + REQUEST_OVERHEAD);

        let response = tokio::time::timeout(self.config.timeout, client.get(&url).send())
            .await
            .map_err(|_| QueryError::Timeout)?
            .map_err(|e| {
                if e.is_timeout() {
                    QueryError::Timeout
                } else if e.is_connect() {
                    QueryError::ConnectFailure(e.to_string())
                } else {
                    QueryError::Request(e)
                }
            })?;

        let status = response.status();
        self.counters.received(head_size(&response));
        drop(response);

        match status {
            StatusCode::OK => Ok(Verdict::Taken),
            StatusCode::NOT_FOUND => Ok(Verdict::Available),
            StatusCode::TOO_MANY_REQUESTS => Err(QueryError::RateLimited),
            status => Err(QueryError::HttpStatus(status.as_u16())),
        }
    }
}

/// Bytes of status line and headers as they appeared on the wire.
fn head_size(response: &reqwest::Response) -> usize {
    let status_line = "HTTP/1.1 200 OK\r\n".len();
    let headers: usize = response
        .headers()
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len() + 4)
        .sum();
    status_line + headers + 2
}

#[async_trait]
impl ProtocolClient for RdapClient {
    async fn check_status(&self, domain: &str, proxy: &Proxy) -> QueryResult {
        let start = Instant::now();
        match self.query(domain, proxy).await {
            Ok(verdict) => QueryResult::new(domain, verdict, start.elapsed()),
            Err(e) => {
                if matches!(e, QueryError::RateLimited) {
                    tracing::warn!(domain, proxy = %proxy, "RDAP rate limited");
                } else {
                    tracing::debug!(domain, proxy = %proxy, error = %e, "rdap attempt failed");
                }
                QueryResult::from_error(domain, &e, start.elapsed())
            }
        }
    }

    fn bandwidth(&self) -> Bandwidth {
        self.counters.snapshot()
    }

    fn name(&self) -> &'static str {
        "rdap"
    }
}
