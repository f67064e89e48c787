use crate::{
    proxy::Proxy,
    types::{Bandwidth, QueryResult},
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// One way of asking a registry whether a domain is registered.
///
/// Implementations are shared across every in-flight task and must only read
/// the proxy; health accounting belongs to the pool.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    async fn check_status(&self, domain: &str, proxy: &Proxy) -> QueryResult;

    fn bandwidth(&self) -> Bandwidth;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub(crate) struct ByteCounters {
    sent: AtomicU64,
    received: AtomicU64,
    connections: AtomicU64,
}

impl ByteCounters {
    pub(crate) fn sent(&self, n: usize) {
        self.sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn received(&self, n: usize) {
        self.received.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Bandwidth {
        Bandwidth {
            bytes_sent: self.sent.load(Ordering::Relaxed),
            bytes_received: self.received.load(Ordering::Relaxed),
            connections_opened: self.connections.load(Ordering::Relaxed),
        }
    }
}
