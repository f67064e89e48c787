use crate::{
    client::ProtocolClient,
    config::{Protocol, SweepConfig},
    controller::{AdaptiveController, Mode},
    gate::AdmissionGate,
    metrics::{MetricsCollector, MetricsSnapshot},
    proxy::{PoolSummary, Proxy, ProxyPool},
    rdap::RdapClient,
    store::{BatchSource, ResultSink, StoreError},
    types::{Bandwidth, Checkpoint, QueryError, QueryResult, VerdictCounts},
    whois::WhoisTunnelClient,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failures that end a run. Per-query problems never surface here.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("batch source failed at offset {offset}: {source}")]
    Source {
        offset: u64,
        #[source]
        source: StoreError,
    },
    #[error("result sink unavailable: {0}")]
    Sink(#[source] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub checked: u64,
    pub counts: VerdictCounts,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub checkpoint: Checkpoint,
    pub cancelled: bool,
    pub final_concurrency: usize,
    pub pool: PoolSummary,
    pub bandwidth: Bandwidth,
}

impl RunSummary {
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.checked as f64 / secs
        } else {
            0.0
        }
    }
}

/// Drives domains through the proxy pool, the admission gate and a protocol
/// client, feeding every attempt back into the metrics and the controller.
pub struct Sweeper {
    config: SweepConfig,
    pool: Arc<ProxyPool>,
    client: Arc<dyn ProtocolClient>,
    metrics: MetricsCollector,
    controller: Mutex<AdaptiveController>,
    gate: AdmissionGate,
}

impl Sweeper {
    pub fn new(config: SweepConfig, pool: Arc<ProxyPool>, client: Arc<dyn ProtocolClient>) -> Self {
        let mut controller = AdaptiveController::new(config.controller.clone());
        if let Some(per_proxy) = config.concurrency_per_proxy {
            controller = controller.with_initial_concurrency(pool.len().saturating_mul(per_proxy));
        }
        let gate = AdmissionGate::new(controller.concurrency());
        Self {
            metrics: MetricsCollector::new(&config.metrics),
            controller: Mutex::new(controller),
            gate,
            pool,
            client,
            config,
        }
    }

    /// Builds the protocol client named in `config.protocol`.
    pub fn from_config(config: SweepConfig, pool: Arc<ProxyPool>) -> Self {
        let client: Arc<dyn ProtocolClient> = match config.protocol {
            Protocol::Whois => Arc::new(WhoisTunnelClient::new(config.whois.clone())),
            Protocol::Rdap => Arc::new(RdapClient::new(config.rdap.clone())),
        };
        Self::new(config, pool, client)
    }

    pub fn pool(&self) -> &ProxyPool {
        &self.pool
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn concurrency(&self) -> usize {
        self.gate.capacity()
    }

    pub fn controller_status(&self) -> String {
        self.controller().status()
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.client.bandwidth()
    }

    fn controller(&self) -> MutexGuard<'_, AdaptiveController> {
        self.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checks every domain, retrying non-terminal verdicts on another proxy.
    ///
    /// Yields one result per domain admitted before `cancel` fired; result
    /// order is not preserved.
    pub async fn check_batch(
        &self,
        domains: &[String],
        cancel: &CancellationToken,
    ) -> Vec<QueryResult> {
        let width = self
            .config
            .controller
            .max_concurrency
            .max(self.gate.capacity())
            .max(1);
        stream::iter(domains)
            .map(|domain| self.check_domain(domain, cancel))
            .buffer_unordered(width)
            .filter_map(|result| async move { result })
            .collect()
            .await
    }

    async fn check_domain(&self, domain: &str, cancel: &CancellationToken) -> Option<QueryResult> {
        let mut proxy = self.pool.select_next();
        let mut last = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                proxy = self.pool.select_other(&proxy);
            }
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return last,
                permit = self.gate.acquire() => permit?,
            };
            let result = self.attempt(domain, &proxy).await;
            // Feedback lands before the slot frees so a pause reaches queued callers.
            self.observe(&proxy, &result);
            drop(permit);

            if result.verdict.is_terminal() {
                return Some(result);
            }
            last = Some(result);
        }
        last
    }

    async fn attempt(&self, domain: &str, proxy: &Proxy) -> QueryResult {
        let start = Instant::now();
        let query = self.client.check_status(domain, proxy);
        match tokio::time::timeout(self.config.query_timeout, query).await {
            Ok(result) => result,
            Err(_) => QueryResult::from_error(domain, &QueryError::Timeout, start.elapsed()),
        }
    }

    fn observe(&self, proxy: &Proxy, result: &QueryResult) {
        // A 429 is the origin throttling us, not the proxy failing.
        if result.verdict.is_terminal() {
            self.pool.report_success(proxy);
        } else if !result.rate_limited {
            self.pool.report_failure(proxy);
        }

        self.metrics
            .record(result.latency.as_secs_f64() * 1000.0, result.is_throttle_signal());
        let snapshot = self.metrics.snapshot();

        let mut controller = self.controller();
        let was_paused = controller.mode() == Mode::Paused;
        let concurrency = controller.update(&snapshot);
        if concurrency != self.gate.capacity() {
            self.gate.resize(concurrency);
        }
        if !was_paused && controller.mode() == Mode::Paused {
            self.gate
                .pause_until(tokio::time::Instant::now() + self.config.controller.pause_duration);
        }
    }

    /// Runs until the source is exhausted, `limit` is reached, or `cancel`
    /// fires. A checkpoint is always persisted before returning.
    pub async fn run(
        &self,
        source: &dyn BatchSource,
        sink: &dyn ResultSink,
        resume: bool,
        cancel: CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let started = Instant::now();
        let mut checkpoint = if resume {
            sink.get_checkpoint().await.map_err(RunError::Sink)?.unwrap_or_default()
        } else {
            Checkpoint::default()
        };
        let mut last_saved = checkpoint.domains_checked_total;
        let mut checked = 0u64;
        let mut counts = VerdictCounts::default();
        let mut cancelled = false;
        let mut batch_no = 0u64;

        tracing::info!(
            offset = checkpoint.source_offset,
            previously_checked = checkpoint.domains_checked_total,
            proxies = self.pool.len(),
            protocol = self.client.name(),
            concurrency = self.gate.capacity(),
            "starting sweep"
        );

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let size = match self.config.limit {
                Some(limit) => {
                    let remaining = limit.saturating_sub(checkpoint.source_offset);
                    usize::try_from(remaining).unwrap_or(usize::MAX).min(self.config.batch_size)
                }
                None => self.config.batch_size,
            };
            if size == 0 {
                break;
            }

            let domains = match source.get_batch(size, checkpoint.source_offset).await {
                Ok(domains) => domains,
                Err(source_err) => {
                    self.persist_after_failure(sink, checkpoint).await;
                    return Err(RunError::Source {
                        offset: checkpoint.source_offset,
                        source: source_err,
                    });
                }
            };
            if domains.is_empty() {
                break;
            }

            batch_no += 1;
            let batch_started = Instant::now();
            let results = self.check_batch(&domains, &cancel).await;
            let batch_elapsed = batch_started.elapsed();

            if let Err(e) = sink.save_results(&results).await {
                self.persist_after_failure(sink, checkpoint).await;
                return Err(RunError::Sink(e));
            }

            let batch_counts: VerdictCounts = results.iter().collect();
            counts.merge(&batch_counts);
            checked += results.len() as u64;

            if results.len() < domains.len() {
                // Offset stays put; the sink upserts whatever was re-checked.
                tracing::info!(
                    completed = results.len(),
                    batch = domains.len(),
                    "cancelled mid-batch"
                );
                cancelled = true;
                break;
            }

            checkpoint.source_offset += domains.len() as u64;
            checkpoint.domains_checked_total += results.len() as u64;

            self.log_progress(
                batch_no,
                &batch_counts,
                batch_elapsed,
                checked,
                started.elapsed(),
                checkpoint,
            );

            if checkpoint.domains_checked_total - last_saved >= self.config.checkpoint_interval {
                sink.save_checkpoint(checkpoint).await.map_err(RunError::Sink)?;
                last_saved = checkpoint.domains_checked_total;
                tracing::info!(
                    offset = checkpoint.source_offset,
                    checked = checkpoint.domains_checked_total,
                    "checkpoint saved"
                );
            }
        }

        sink.save_checkpoint(checkpoint).await.map_err(RunError::Sink)?;

        let summary = RunSummary {
            checked,
            counts,
            elapsed: started.elapsed(),
            checkpoint,
            cancelled,
            final_concurrency: self.gate.capacity(),
            pool: self.pool.summary(),
            bandwidth: self.client.bandwidth(),
        };
        tracing::info!(
            checked = summary.checked,
            taken = counts.taken,
            available = counts.available,
            unknown = counts.unknown,
            errors = counts.errors,
            timeouts = counts.timeouts,
            throughput = format!("{:.0}/s", summary.throughput()),
            cancelled,
            "sweep finished"
        );
        Ok(summary)
    }

    async fn persist_after_failure(&self, sink: &dyn ResultSink, checkpoint: Checkpoint) {
        if let Err(e) = sink.save_checkpoint(checkpoint).await {
            tracing::error!(
                error = %e,
                offset = checkpoint.source_offset,
                "could not persist checkpoint"
            );
        }
    }

    fn log_progress(
        &self,
        batch_no: u64,
        batch: &VerdictCounts,
        batch_elapsed: Duration,
        checked: u64,
        elapsed: Duration,
        checkpoint: Checkpoint,
    ) {
        let rate = |n: u64, d: Duration| {
            let secs = d.as_secs_f64();
            if secs > 0.0 {
                n as f64 / secs
            } else {
                0.0
            }
        };
        let pool = self.pool.summary();
        let bandwidth = self.client.bandwidth();
        let snapshot = self.metrics.snapshot();
        tracing::info!(
            batch = batch_no,
            taken = batch.taken,
            available = batch.available,
            unknown = batch.unknown,
            errors = batch.errors,
            timeouts = batch.timeouts,
            batch_rate = format!("{:.0}/s", rate(batch.total(), batch_elapsed)),
            overall_rate = format!("{:.0}/s", rate(checked, elapsed)),
            total = checkpoint.domains_checked_total,
            controller = %self.controller_status(),
            p95_ms = format!("{:.0}", snapshot.p95_latency_ms),
            timeout_rate = format!("{:.2}%", snapshot.timeout_rate * 100.0),
            proxies_enabled = pool.enabled,
            proxies_disabled = pool.disabled,
            proxy_success = format!("{:.1}%", pool.overall_success_rate * 100.0),
            bytes_sent = bandwidth.bytes_sent,
            bytes_received = bandwidth.bytes_received,
            "batch complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ControllerConfig, PoolConfig},
        store::MemoryStore,
        types::Verdict,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    type Script = dyn Fn(&str, usize) -> Verdict + Send + Sync;

    /// Answers from a closure over `(domain, proxy id)` and logs every call
    /// with the (tokio) time it started.
    struct ScriptedClient {
        script: Box<Script>,
        delay: Duration,
        throttled: bool,
        calls: Mutex<Vec<(String, usize)>>,
        started: Mutex<Vec<tokio::time::Instant>>,
    }

    impl ScriptedClient {
        fn build(
            script: impl Fn(&str, usize) -> Verdict + Send + Sync + 'static,
            delay: Duration,
            throttled: bool,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Box::new(script),
                delay,
                throttled,
                calls: Mutex::new(Vec::new()),
                started: Mutex::new(Vec::new()),
            })
        }

        fn new(script: impl Fn(&str, usize) -> Verdict + Send + Sync + 'static) -> Arc<Self> {
            Self::build(script, Duration::ZERO, false)
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Self::build(|_, _| Verdict::Taken, delay, false)
        }

        /// Every answer is an HTTP 429 from the origin.
        fn throttled() -> Arc<Self> {
            Self::build(|_, _| Verdict::Error, Duration::ZERO, true)
        }

        fn start_times(&self) -> Vec<tokio::time::Instant> {
            self.started.lock().unwrap().clone()
        }

        fn calls_by_domain(&self) -> HashMap<String, Vec<usize>> {
            let mut map: HashMap<String, Vec<usize>> = HashMap::new();
            for (domain, proxy) in self.calls.lock().unwrap().iter() {
                map.entry(domain.clone()).or_default().push(*proxy);
            }
            map
        }
    }

    #[async_trait]
    impl ProtocolClient for ScriptedClient {
        async fn check_status(&self, domain: &str, proxy: &Proxy) -> QueryResult {
            self.calls.lock().unwrap().push((domain.to_string(), proxy.id()));
            self.started.lock().unwrap().push(tokio::time::Instant::now());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.throttled {
                return QueryResult::from_error(domain, &QueryError::RateLimited, self.delay);
            }
            let verdict = (self.script)(domain, proxy.id());
            let result = QueryResult::new(domain, verdict, Duration::from_millis(20));
            if verdict.is_terminal() {
                result
            } else {
                result.with_detail("scripted")
            }
        }

        fn bandwidth(&self) -> Bandwidth {
            Bandwidth::default()
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn pool(n: usize) -> Arc<ProxyPool> {
        let proxies = (0..n)
            .map(|i| Proxy::new(format!("10.1.0.{i}"), 3128, "u", "p"))
            .collect();
        Arc::new(ProxyPool::new(proxies, PoolConfig::default()).unwrap())
    }

    fn config() -> SweepConfig {
        SweepConfig {
            batch_size: 100,
            checkpoint_interval: 100,
            controller: ControllerConfig {
                min_concurrency: 2,
                max_concurrency: 16,
                initial_concurrency: 8,
                ..ControllerConfig::default()
            },
            ..SweepConfig::default()
        }
    }

    fn domains(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("testllc{i:08}.com")).collect()
    }

    #[tokio::test]
    async fn every_domain_gets_exactly_one_result() {
        let client = ScriptedClient::new(|domain, _| {
            if domain.ends_with("7.com") {
                Verdict::Error
            } else if domain.ends_with("3.com") {
                Verdict::Unknown
            } else {
                Verdict::Available
            }
        });
        let sweeper = Sweeper::new(config(), pool(4), client.clone());
        let batch = domains(50);
        let results = sweeper.check_batch(&batch, &CancellationToken::new()).await;

        assert_eq!(results.len(), 50);
        let mut seen: Vec<&str> = results.iter().map(|r| r.domain.as_str()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 50);

        let calls = client.calls_by_domain();
        for result in &results {
            let attempts = calls[&result.domain].len();
            assert!(attempts <= 3);
            if result.verdict.is_terminal() {
                assert_eq!(attempts, 1);
            } else {
                assert_eq!(attempts, 3, "{} retried to the bound", result.domain);
            }
        }
        let unknown = results.iter().find(|r| r.domain.ends_with("3.com")).unwrap();
        assert_eq!(unknown.verdict, Verdict::Unknown);
    }

    #[tokio::test]
    async fn retries_move_to_a_different_proxy() {
        let client = ScriptedClient::new(|_, proxy| {
            if proxy == 0 {
                Verdict::Timeout
            } else {
                Verdict::Taken
            }
        });
        let pool = pool(3);
        let sweeper = Sweeper::new(config(), Arc::clone(&pool), client.clone());
        let results = sweeper.check_batch(&domains(60), &CancellationToken::new()).await;

        assert!(results.iter().all(|r| r.verdict == Verdict::Taken));
        for proxies in client.calls_by_domain().values() {
            if proxies[0] == 0 {
                assert_eq!(proxies.len(), 2);
                assert_ne!(proxies[1], 0);
            }
        }
        assert!(!pool.proxies()[0].is_enabled(), "always-failing proxy is circuit broken");
        assert!(sweeper.metrics().total_timeouts > 0);
    }

    #[tokio::test]
    async fn checkpoint_resume_records_each_domain_once() {
        let store = MemoryStore::new(domains(2_000));
        let first = Sweeper::new(
            SweepConfig {
                batch_size: 500,
                checkpoint_interval: 500,
                limit: Some(1_000),
                ..config()
            },
            pool(5),
            ScriptedClient::new(|_, _| Verdict::Available),
        );
        let summary = first
            .run(&store, &store, false, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.checked, 1_000);
        assert_eq!(
            store.get_checkpoint().await.unwrap(),
            Some(Checkpoint {
                source_offset: 1_000,
                domains_checked_total: 1_000
            })
        );

        let second = Sweeper::new(
            SweepConfig {
                batch_size: 500,
                checkpoint_interval: 500,
                ..config()
            },
            pool(5),
            ScriptedClient::new(|_, _| Verdict::Taken),
        );
        let summary = second.run(&store, &store, true, CancellationToken::new()).await.unwrap();
        assert_eq!(summary.checked, 1_000);
        assert_eq!(summary.checkpoint.domains_checked_total, 2_000);
        assert_eq!(store.recorded(), 2_000);
        assert_eq!(store.writes(), 2_000);
        assert_eq!(store.result("testllc00000000.com").unwrap().verdict, Verdict::Available);
        assert_eq!(store.result("testllc00001999.com").unwrap().verdict, Verdict::Taken);
    }

    #[tokio::test]
    async fn cancelled_run_admits_nothing_and_checkpoints() {
        let store = MemoryStore::new(domains(10));
        let client = ScriptedClient::new(|_, _| Verdict::Taken);
        let sweeper = Sweeper::new(config(), pool(2), client.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = sweeper.run(&store, &store, false, cancel).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.checked, 0);
        assert_eq!(store.recorded(), 0);
        assert_eq!(store.get_checkpoint().await.unwrap(), Some(Checkpoint::default()));
        assert!(client.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_batch_keeps_offset() {
        let store = MemoryStore::new(domains(40));
        let sweeper = Sweeper::new(
            SweepConfig {
                controller: ControllerConfig {
                    min_concurrency: 2,
                    max_concurrency: 4,
                    initial_concurrency: 4,
                    ..ControllerConfig::default()
                },
                ..config()
            },
            pool(2),
            ScriptedClient::slow(Duration::from_millis(100)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });

        let summary = sweeper.run(&store, &store, false, cancel).await.unwrap();
        assert!(summary.cancelled);
        assert!(summary.checked > 0 && summary.checked < 40);
        assert_eq!(store.recorded() as u64, summary.checked);
        assert_eq!(summary.checkpoint.source_offset, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_query_is_cut_by_query_timeout() {
        let sweeper = Sweeper::new(
            SweepConfig {
                query_timeout: Duration::from_secs(1),
                max_retries: 0,
                ..config()
            },
            pool(1),
            ScriptedClient::slow(Duration::from_secs(60)),
        );
        let results = sweeper.check_batch(&domains(1), &CancellationToken::new()).await;
        assert_eq!(results[0].verdict, Verdict::Timeout);
        assert_eq!(results[0].detail.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn timeout_storm_backs_off_concurrency() {
        let sweeper = Sweeper::new(
            SweepConfig {
                max_retries: 0,
                controller: ControllerConfig {
                    min_concurrency: 2,
                    max_concurrency: 16,
                    initial_concurrency: 16,
                    check_interval: 10,
                    pause_duration: Duration::from_millis(1),
                    ..ControllerConfig::default()
                },
                ..config()
            },
            pool(3),
            ScriptedClient::new(|_, _| Verdict::Timeout),
        );
        sweeper.check_batch(&domains(30), &CancellationToken::new()).await;
        assert!(sweeper.concurrency() < 16);
        assert!(sweeper.metrics().timeout_rate > 0.9);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_back_queued_domains() {
        let client =
            ScriptedClient::build(|_, _| Verdict::Timeout, Duration::from_millis(100), false);
        let sweeper = Sweeper::new(
            SweepConfig {
                max_retries: 0,
                controller: ControllerConfig {
                    min_concurrency: 1,
                    max_concurrency: 4,
                    initial_concurrency: 4,
                    check_interval: 1,
                    pause_duration: Duration::from_secs(30),
                    ..ControllerConfig::default()
                },
                ..config()
            },
            pool(2),
            client.clone(),
        );
        let start = tokio::time::Instant::now();
        let results = sweeper.check_batch(&domains(16), &CancellationToken::new()).await;
        assert_eq!(results.len(), 16);

        let starts = client.start_times();
        let first_wave = starts.iter().filter(|t| **t == start).count();
        assert_eq!(first_wave, 4);
        let during_pause = starts
            .iter()
            .filter(|t| **t > start && **t < start + Duration::from_secs(30))
            .count();
        assert_eq!(during_pause, 0, "nothing is admitted while paused");
    }

    #[tokio::test]
    async fn rate_limits_throttle_without_blaming_proxies() {
        let pool = pool(2);
        let sweeper = Sweeper::new(
            SweepConfig {
                max_retries: 0,
                ..config()
            },
            Arc::clone(&pool),
            ScriptedClient::throttled(),
        );
        let results = sweeper.check_batch(&domains(40), &CancellationToken::new()).await;
        assert!(results.iter().all(|r| r.rate_limited && r.verdict == Verdict::Error));

        let summary = pool.summary();
        assert_eq!(summary.total_failures, 0);
        assert_eq!(summary.enabled, 2);
        assert_eq!(summary.resets, 0);
        assert_eq!(sweeper.metrics().timeout_rate, 1.0);
    }

    #[tokio::test]
    async fn initial_concurrency_follows_proxy_count() {
        let sweeper = Sweeper::new(
            SweepConfig {
                concurrency_per_proxy: Some(2),
                ..config()
            },
            pool(5),
            ScriptedClient::new(|_, _| Verdict::Taken),
        );
        assert_eq!(sweeper.concurrency(), 10);
    }

    struct BrokenSource;

    #[async_trait]
    impl BatchSource for BrokenSource {
        async fn get_batch(&self, size: usize, offset: u64) -> Result<Vec<String>, StoreError> {
            if offset >= 200 {
                return Err(StoreError::Unavailable("disk gone".into()));
            }
            Ok((0..size).map(|i| format!("d{}.com", offset + i as u64)).collect())
        }
    }

    #[tokio::test]
    async fn source_failure_persists_last_good_checkpoint() {
        let sink = MemoryStore::default();
        let sweeper = Sweeper::new(
            SweepConfig {
                checkpoint_interval: 1_000,
                ..config()
            },
            pool(2),
            ScriptedClient::new(|_, _| Verdict::Available),
        );
        let err = sweeper
            .run(&BrokenSource, &sink, false, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Source { offset: 200, .. }));
        assert_eq!(
            sink.get_checkpoint().await.unwrap(),
            Some(Checkpoint {
                source_offset: 200,
                domains_checked_total: 200
            })
        );
        assert_eq!(sink.recorded(), 200);
    }
}
