use crate::config::PoolConfig;
use serde::Serialize;
use std::{
    fmt,
    path::Path,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProxyParseError {
    #[error("missing '@' in proxy line")]
    MissingAt,
    #[error("missing ':' between user and password")]
    MissingCredentials,
    #[error("missing ':' between host and port")]
    MissingPort,
    #[error("invalid port: {0}")]
    InvalidPort(String),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("proxy inventory is empty")]
    Empty,
    #[error("failed to read proxy inventory: {0}")]
    Io(#[from] std::io::Error),
}

/// A forward proxy and its health counters.
///
/// Credentials are read-only. Counters are only moved by [`ProxyPool`] so the
/// disable threshold lives in one place.
#[derive(Debug)]
pub struct Proxy {
    id: usize,
    host: String,
    port: u16,
    user: String,
    password: String,
    success: AtomicU64,
    failures: AtomicU64,
    enabled: AtomicBool,
}

impl Proxy {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            success: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
        }
    }

    /// Parses `user:pass@host:port`.
    pub fn parse(line: &str) -> Result<Self, ProxyParseError> {
        let (auth, hostport) = line.trim().rsplit_once('@').ok_or(ProxyParseError::MissingAt)?;
        let (user, password) = auth.split_once(':').ok_or(ProxyParseError::MissingCredentials)?;
        let (host, port) = hostport.rsplit_once(':').ok_or(ProxyParseError::MissingPort)?;
        let port = port
            .parse::<u16>()
            .map_err(|_| ProxyParseError::InvalidPort(port.to_string()))?;
        Ok(Self::new(host, port, user, password))
    }

    /// Position in the pool inventory.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn attempts(&self) -> u64 {
        self.success_count() + self.failure_count()
    }

    /// 1.0 until the first attempt.
    pub fn success_rate(&self) -> f64 {
        let total = self.attempts();
        if total == 0 {
            return 1.0;
        }
        self.success_count() as f64 / total as f64
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl FromStr for Proxy {
    type Err = ProxyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Proxy::parse(s)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoolSummary {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub total_success: u64,
    pub total_failures: u64,
    pub overall_success_rate: f64,
    pub resets: u64,
}

/// Round-robin proxy inventory with a success-rate circuit breaker.
///
/// A proxy is disabled once it has at least `min_attempts` attempts and its
/// success rate falls under `min_success_rate`. If rotation finds nothing
/// enabled, every proxy is re-enabled so the sweep keeps moving.
#[derive(Debug)]
pub struct ProxyPool {
    proxies: Vec<Arc<Proxy>>,
    cursor: AtomicUsize,
    resets: AtomicU64,
    config: PoolConfig,
}

impl ProxyPool {
    pub fn new(proxies: Vec<Proxy>, config: PoolConfig) -> Result<Self, PoolError> {
        let limit = config.max_proxies.unwrap_or(usize::MAX);
        let proxies: Vec<Arc<Proxy>> = proxies
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(id, mut proxy)| {
                proxy.id = id;
                Arc::new(proxy)
            })
            .collect();
        if proxies.is_empty() {
            return Err(PoolError::Empty);
        }
        Ok(Self {
            proxies,
            cursor: AtomicUsize::new(0),
            resets: AtomicU64::new(0),
            config,
        })
    }

    /// Parses one `user:pass@host:port` per line, skipping blanks and bad lines.
    pub fn parse_inventory(content: &str, config: PoolConfig) -> Result<Self, PoolError> {
        let proxies = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| match Proxy::parse(line) {
                Ok(proxy) => Some(proxy),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed proxy line");
                    None
                }
            })
            .collect();
        Self::new(proxies, config)
    }

    pub fn from_file(path: impl AsRef<Path>, config: PoolConfig) -> Result<Self, PoolError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_inventory(&content, config)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn proxies(&self) -> &[Arc<Proxy>] {
        &self.proxies
    }

    /// Next enabled proxy in rotation. Never blocks and never fails.
    pub fn select_next(&self) -> Arc<Proxy> {
        self.select_excluding(None)
    }

    /// Like [`select_next`](Self::select_next) but avoids `exclude` when any
    /// other enabled proxy exists.
    pub fn select_other(&self, exclude: &Proxy) -> Arc<Proxy> {
        self.select_excluding(Some(exclude.id))
    }

    fn select_excluding(&self, exclude: Option<usize>) -> Arc<Proxy> {
        let n = self.proxies.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let mut fallback = None;
        for step in 0..n {
            let proxy = &self.proxies[(start + step) % n];
            if !proxy.is_enabled() {
                continue;
            }
            if Some(proxy.id) == exclude {
                fallback = Some(proxy);
                continue;
            }
            if step > 0 {
                self.cursor.fetch_add(step, Ordering::Relaxed);
            }
            return Arc::clone(proxy);
        }
        if let Some(proxy) = fallback {
            return Arc::clone(proxy);
        }
        self.reset_all();
        Arc::clone(&self.proxies[start % n])
    }

    fn reset_all(&self) {
        for proxy in &self.proxies {
            proxy.enabled.store(true, Ordering::Release);
        }
        let resets = self.resets.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(
            proxies = self.proxies.len(),
            resets,
            "no enabled proxies left, re-enabling pool"
        );
    }

    /// Snapshot of the currently enabled proxies.
    pub fn healthy(&self) -> Vec<Arc<Proxy>> {
        self.proxies.iter().filter(|p| p.is_enabled()).cloned().collect()
    }

    /// Splits `domains` into chunks of `per_proxy`, assigned round-robin over
    /// the healthy set.
    pub fn distribute<'a>(
        &self,
        domains: &'a [String],
        per_proxy: usize,
    ) -> Vec<(&'a [String], Arc<Proxy>)> {
        let mut healthy = self.healthy();
        if healthy.is_empty() {
            healthy.push(self.select_next());
        }
        domains
            .chunks(per_proxy.max(1))
            .enumerate()
            .map(|(i, chunk)| (chunk, Arc::clone(&healthy[i % healthy.len()])))
            .collect()
    }

    pub fn report_success(&self, proxy: &Proxy) {
        proxy.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report_failure(&self, proxy: &Proxy) {
        proxy.failures.fetch_add(1, Ordering::Relaxed);
        if proxy.attempts() >= self.config.min_attempts
            && proxy.success_rate() < self.config.min_success_rate
            && proxy
                .enabled
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            tracing::warn!(
                proxy = %proxy,
                success = proxy.success_count(),
                failures = proxy.failure_count(),
                "disabling proxy"
            );
        }
    }

    pub fn summary(&self) -> PoolSummary {
        let enabled = self.proxies.iter().filter(|p| p.is_enabled()).count();
        let total_success: u64 = self.proxies.iter().map(|p| p.success_count()).sum();
        let total_failures: u64 = self.proxies.iter().map(|p| p.failure_count()).sum();
        let attempts = total_success + total_failures;
        PoolSummary {
            total: self.proxies.len(),
            enabled,
            disabled: self.proxies.len() - enabled,
            total_success,
            total_failures,
            overall_success_rate: if attempts == 0 {
                1.0
            } else {
                total_success as f64 / attempts as f64
            },
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pool(n: usize) -> ProxyPool {
        let proxies = (0..n)
            .map(|i| Proxy::new(format!("10.0.0.{i}"), 8080, "u", "p"))
            .collect();
        ProxyPool::new(proxies, PoolConfig::default()).unwrap()
    }

    fn fail_out(pool: &ProxyPool, proxy: &Proxy) {
        for _ in 0..10 {
            pool.report_failure(proxy);
        }
    }

    #[test]
    fn parses_inventory_line() {
        let proxy = Proxy::parse("alice:s3cret@198.51.100.7:3128").unwrap();
        assert_eq!(proxy.user(), "alice");
        assert_eq!(proxy.password(), "s3cret");
        assert_eq!(proxy.host(), "198.51.100.7");
        assert_eq!(proxy.port(), 3128);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(Proxy::parse("host:80").unwrap_err(), ProxyParseError::MissingAt);
        assert_eq!(Proxy::parse("user@host:80").unwrap_err(), ProxyParseError::MissingCredentials);
        assert_eq!(Proxy::parse("u:p@host").unwrap_err(), ProxyParseError::MissingPort);
        assert!(matches!(Proxy::parse("u:p@host:http"), Err(ProxyParseError::InvalidPort(_))));
    }

    #[test]
    fn inventory_skips_bad_lines_and_honours_limit() {
        let content = "a:b@h1:1\n\ngarbage\na:b@h2:2\na:b@h3:3\n";
        let config = PoolConfig {
            max_proxies: Some(2),
            ..PoolConfig::default()
        };
        let pool = ProxyPool::parse_inventory(content, config).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.proxies()[1].host(), "h2");
        assert!(matches!(
            ProxyPool::parse_inventory("junk", PoolConfig::default()),
            Err(PoolError::Empty)
        ));
    }

    #[test]
    fn round_robin_visits_every_proxy() {
        let pool = pool(3);
        let ids: Vec<usize> = (0..6).map(|_| pool.select_next().id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn failing_proxy_is_excluded_until_reset() {
        let pool = pool(3);
        let bad = Arc::clone(&pool.proxies()[1]);
        for _ in 0..9 {
            pool.report_failure(&bad);
        }
        assert!(bad.is_enabled(), "under ten attempts must stay enabled");
        pool.report_failure(&bad);
        assert!(!bad.is_enabled());

        assert!(pool.healthy().iter().all(|p| p.id() != 1));
        for _ in 0..10 {
            assert_ne!(pool.select_next().id(), 1);
        }
    }

    #[test]
    fn healthy_rate_at_threshold_stays_enabled() {
        let pool = pool(1);
        let proxy = Arc::clone(&pool.proxies()[0]);
        for _ in 0..5 {
            pool.report_success(&proxy);
        }
        for _ in 0..5 {
            pool.report_failure(&proxy);
        }
        assert!(proxy.is_enabled());
        pool.report_failure(&proxy);
        assert!(!proxy.is_enabled());
    }

    #[test]
    fn all_disabled_resets_and_still_returns_a_proxy() {
        let pool = pool(2);
        for proxy in pool.proxies().to_vec() {
            fail_out(&pool, &proxy);
        }
        assert!(pool.healthy().is_empty());

        let _picked = pool.select_next();
        assert_eq!(pool.healthy().len(), 2);
        assert_eq!(pool.summary().resets, 1);
    }

    #[test]
    fn select_other_avoids_excluded_proxy() {
        let pool = pool(3);
        let first = pool.select_next();
        for _ in 0..5 {
            assert_ne!(pool.select_other(&first).id(), first.id());
        }

        let single = self::pool(1);
        let only = single.select_next();
        assert_eq!(single.select_other(&only).id(), only.id());
    }

    #[test]
    fn distribute_chunks_round_robin() {
        let pool = pool(2);
        let domains: Vec<String> = (0..5).map(|i| format!("d{i}.com")).collect();
        let batches = pool.distribute(&domains, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].1.id(), 0);
        assert_eq!(batches[1].1.id(), 1);
        assert_eq!(batches[2].1.id(), 0);
        assert_eq!(batches[2].0, &domains[4..]);
    }

    #[test]
    fn summary_aggregates_counters() {
        let pool = pool(2);
        let a = Arc::clone(&pool.proxies()[0]);
        pool.report_success(&a);
        pool.report_success(&a);
        pool.report_failure(&a);
        let summary = pool.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.enabled, 2);
        assert_eq!(summary.total_success, 2);
        assert_eq!(summary.total_failures, 1);
        assert!((summary.overall_success_rate - 2.0 / 3.0).abs() < 1e-9);
    }
}
