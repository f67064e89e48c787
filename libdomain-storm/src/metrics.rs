use crate::config::MetricsConfig;
use serde::Serialize;
use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Fixed-capacity FIFO buffer; pushing past capacity evicts the oldest item.
#[derive(Debug, Clone)]
pub struct Window<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> Window<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Point-in-time read of the rolling windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    /// Fraction in `0.0..=1.0` over the timeout window.
    pub timeout_rate: f64,
    /// Completions per second over the throughput window.
    pub throughput: f64,
    pub total_queries: u64,
    pub total_timeouts: u64,
}

#[derive(Debug)]
struct Windows {
    latencies: Window<f64>,
    timeouts: Window<bool>,
    timestamps: VecDeque<Instant>,
    throughput_window: Duration,
    total_queries: u64,
    total_timeouts: u64,
}

impl Windows {
    fn evict_stale(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.duration_since(oldest) > self.throughput_window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn throughput(&self, now: Instant) -> f64 {
        // Timestamps are pushed in order, so the fresh ones form a suffix.
        let Some(start) = self
            .timestamps
            .iter()
            .position(|t| now.duration_since(*t) <= self.throughput_window)
        else {
            return 0.0;
        };
        let count = self.timestamps.len() - start;
        let (Some(first), Some(last)) = (self.timestamps.get(start), self.timestamps.back()) else {
            return 0.0;
        };
        if count < 2 {
            return 0.0;
        }
        let span = last.duration_since(*first).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        count as f64 / span
    }
}

/// Rolling latency/timeout/throughput aggregator shared by every query task.
///
/// Updates take one short lock around bounded structures; `snapshot` sorts at
/// most `latency_window` samples.
#[derive(Debug)]
pub struct MetricsCollector {
    inner: Mutex<Windows>,
}

impl MetricsCollector {
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            inner: Mutex::new(Windows {
                latencies: Window::new(config.latency_window),
                timeouts: Window::new(config.timeout_window),
                timestamps: VecDeque::new(),
                throughput_window: config.throughput_window,
                total_queries: 0,
                total_timeouts: 0,
            }),
        }
    }

    pub fn record(&self, latency_ms: f64, is_timeout: bool) {
        self.record_at(latency_ms, is_timeout, Instant::now());
    }

    pub(crate) fn record_at(&self, latency_ms: f64, is_timeout: bool, now: Instant) {
        let mut w = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !is_timeout && latency_ms > 0.0 {
            w.latencies.push(latency_ms);
        }
        w.timeouts.push(is_timeout);
        w.timestamps.push_back(now);
        w.total_queries += 1;
        if is_timeout {
            w.total_timeouts += 1;
        }
        w.evict_stale(now);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub(crate) fn snapshot_at(&self, now: Instant) -> MetricsSnapshot {
        let (mut sorted, timeout_rate, throughput, total_queries, total_timeouts) = {
            let w = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let sorted: Vec<f64> = w.latencies.iter().copied().collect();
            let timeout_rate = if w.timeouts.is_empty() {
                0.0
            } else {
                w.timeouts.iter().filter(|t| **t).count() as f64 / w.timeouts.len() as f64
            };
            (sorted, timeout_rate, w.throughput(now), w.total_queries, w.total_timeouts)
        };
        sorted.sort_by(f64::total_cmp);

        let avg_latency_ms = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };

        MetricsSnapshot {
            avg_latency_ms,
            p95_latency_ms: percentile(&sorted, 0.95),
            p99_latency_ms: percentile(&sorted, 0.99),
            timeout_rate,
            throughput,
            total_queries,
            total_timeouts,
        }
    }

    pub fn latency_samples(&self) -> Vec<f64> {
        let w = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        w.latencies.iter().copied().collect()
    }

    pub fn reset(&self) {
        let mut w = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        w.latencies.clear();
        w.timeouts.clear();
        w.timestamps.clear();
        w.total_queries = 0;
        w.total_timeouts = 0;
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(&MetricsConfig::default())
    }
}

/// Nearest-rank read over an ascending slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (sorted.len() as f64 * q) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector(latency: usize, timeouts: usize) -> MetricsCollector {
        MetricsCollector::new(&MetricsConfig {
            latency_window: latency,
            timeout_window: timeouts,
            throughput_window: Duration::from_secs(10),
        })
    }

    #[test]
    fn window_evicts_oldest_first() {
        let mut window = Window::new(3);
        for i in 1..=5 {
            window.push(i);
        }
        assert_eq!(window.len(), 3);
        let values: Vec<_> = window.iter().copied().collect();
        assert_eq!(values, vec![3, 4, 5]);
    }

    #[test]
    fn latency_window_holds_capacity_after_overflow() {
        let metrics = collector(100, 1000);
        for i in 1..=250 {
            metrics.record(i as f64, false);
        }
        let samples = metrics.latency_samples();
        assert_eq!(samples.len(), 100);
        assert_eq!(samples.first().copied(), Some(151.0));
        assert_eq!(samples.last().copied(), Some(250.0));
    }

    #[test]
    fn timeouts_do_not_contribute_latency() {
        let metrics = collector(10, 10);
        metrics.record(100.0, false);
        metrics.record(9_000.0, true);
        let snap = metrics.snapshot();
        assert_eq!(snap.avg_latency_ms, 100.0);
        assert_eq!(snap.timeout_rate, 0.5);
        assert_eq!(snap.total_queries, 2);
        assert_eq!(snap.total_timeouts, 1);
    }

    #[test]
    fn percentiles_read_sorted_window() {
        let metrics = collector(100, 100);
        for i in (1..=100).rev() {
            metrics.record(i as f64, false);
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.avg_latency_ms, 50.5);
        assert_eq!(snap.p95_latency_ms, 96.0);
        assert_eq!(snap.p99_latency_ms, 100.0);
    }

    #[test]
    fn timeout_rate_uses_only_recent_window() {
        let metrics = collector(10, 4);
        for _ in 0..4 {
            metrics.record(0.0, true);
        }
        for _ in 0..4 {
            metrics.record(10.0, false);
        }
        assert_eq!(metrics.snapshot().timeout_rate, 0.0);
        assert_eq!(metrics.snapshot().total_timeouts, 4);
    }

    #[test]
    fn throughput_counts_span_inside_window() {
        let metrics = collector(10, 10);
        let start = Instant::now();
        for i in 0..=10u64 {
            metrics.record_at(5.0, false, start + Duration::from_millis(i * 100));
        }
        let snap = metrics.snapshot_at(start + Duration::from_secs(1));
        assert!((snap.throughput - 11.0).abs() < 1e-9);

        let later = metrics.snapshot_at(start + Duration::from_secs(30));
        assert_eq!(later.throughput, 0.0);
    }

    #[test]
    fn empty_collector_reports_zeros() {
        let metrics = MetricsCollector::default();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
        metrics.record(10.0, false);
        metrics.reset();
        assert_eq!(metrics.snapshot().total_queries, 0);
    }
}
