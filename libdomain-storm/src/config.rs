use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the adaptive concurrency controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    pub initial_concurrency: usize,

    pub increase_factor: f64,
    pub decrease_factor: f64,
    pub severe_decrease_factor: f64,

    pub latency_low_ms: f64,
    pub latency_high_ms: f64,
    pub latency_critical_ms: f64,

    pub timeout_warning: f64,
    pub timeout_high: f64,
    pub timeout_critical: f64,

    /// Evaluate every N updates.
    pub check_interval: u64,
    #[serde(with = "humantime_serde")]
    pub pause_duration: Duration,
    /// Quiet period after a decrease before an increase is allowed.
    #[serde(with = "humantime_serde")]
    pub min_stable_duration: Duration,
    /// Updates required since the last adjustment before an increase.
    pub stable_queries_required: u64,
    pub history_len: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            min_concurrency: 50,
            max_concurrency: 500,
            initial_concurrency: 300,
            increase_factor: 1.10,
            decrease_factor: 0.80,
            severe_decrease_factor: 0.50,
            latency_low_ms: 120.0,
            latency_high_ms: 200.0,
            latency_critical_ms: 500.0,
            timeout_warning: 0.01,
            timeout_high: 0.02,
            timeout_critical: 0.05,
            check_interval: 500,
            pause_duration: Duration::from_secs(30),
            min_stable_duration: Duration::from_secs(5),
            stable_queries_required: 1000,
            history_len: 256,
        }
    }
}

/// Circuit-breaker thresholds for the proxy pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_attempts: u64,
    pub min_success_rate: f64,
    pub max_proxies: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_attempts: 10,
            min_success_rate: 0.5,
            max_proxies: None,
        }
    }
}

/// Rolling window sizes for the metrics collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub latency_window: usize,
    pub timeout_window: usize,
    #[serde(with = "humantime_serde")]
    pub throughput_window: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            latency_window: 100,
            timeout_window: 1000,
            throughput_window: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhoisConfig {
    /// Fixed WHOIS host; when unset the server is picked by TLD.
    pub server: Option<String>,
    pub port: u16,
    /// Bytes read from the response; must cover either sentinel.
    pub response_bytes: usize,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for WhoisConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: 43,
            response_bytes: 64,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdapConfig {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Fetch the IANA bootstrap file on first use.
    pub bootstrap: bool,
    /// Requests per second per RDAP endpoint; unlimited when unset.
    pub max_rate_per_endpoint: Option<u32>,
    pub pool_max_idle_per_proxy: usize,
}

impl Default for RdapConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            bootstrap: false,
            max_rate_per_endpoint: None,
            pool_max_idle_per_proxy: 4,
        }
    }
}

/// Which protocol client drives the sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Whois,
    Rdap,
}

/// Everything one run needs, constructed once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub protocol: Protocol,
    pub batch_size: usize,
    pub checkpoint_interval: u64,
    /// When set, initial concurrency is `proxies * concurrency_per_proxy`.
    pub concurrency_per_proxy: Option<usize>,
    pub max_retries: usize,
    /// Hard deadline for a single attempt, independent of cancellation.
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,
    pub limit: Option<u64>,
    pub controller: ControllerConfig,
    pub pool: PoolConfig,
    pub metrics: MetricsConfig,
    pub whois: WhoisConfig,
    pub rdap: RdapConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            batch_size: 10_000,
            checkpoint_interval: 100_000,
            concurrency_per_proxy: None,
            max_retries: 2,
            query_timeout: Duration::from_secs(12),
            limit: None,
            controller: ControllerConfig::default(),
            pool: PoolConfig::default(),
            metrics: MetricsConfig::default(),
            whois: WhoisConfig::default(),
            rdap: RdapConfig::default(),
        }
    }
}
