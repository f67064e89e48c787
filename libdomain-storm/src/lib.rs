mod client;
pub mod config;
mod controller;
mod endpoint;
mod gate;
mod http;
mod metrics;
mod proxy;
mod ratelimit;
mod rdap;
pub mod store;
mod sweeper;
mod types;
mod whois;

pub use client::ProtocolClient;
pub use config::{
    ControllerConfig, MetricsConfig, PoolConfig, Protocol, RdapConfig, SweepConfig, WhoisConfig,
};
pub use controller::{Action, AdaptiveController, Adjustment, ControllerState, Mode};
pub use endpoint::{extract_tld, EndpointError, EndpointRegistry};
pub use gate::{AdmissionGate, GatePermit};
pub use metrics::{MetricsCollector, MetricsSnapshot, Window};
pub use proxy::{PoolError, PoolSummary, Proxy, ProxyParseError, ProxyPool};
pub use ratelimit::EndpointRateLimiters;
pub use rdap::RdapClient;
pub use store::{BatchSource, MemoryStore, ResultSink, StoreError};
pub use sweeper::{RunError, RunSummary, Sweeper};
pub use types::{Bandwidth, Checkpoint, QueryError, QueryResult, Verdict, VerdictCounts};
pub use whois::{classify_whois, whois_server_for, WhoisTunnelClient};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One-shot check of `domains` through `pool` with the protocol named in
/// `config`. Nothing is persisted.
pub async fn check_domains(
    pool: Arc<ProxyPool>,
    config: SweepConfig,
    domains: &[String],
) -> Vec<QueryResult> {
    Sweeper::from_config(config, pool)
        .check_batch(domains, &CancellationToken::new())
        .await
}
