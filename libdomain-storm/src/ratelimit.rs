use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-RDAP-endpoint request quota, shared across every proxy.
pub struct EndpointRateLimiters {
    limiters: DashMap<String, Arc<Limiter>>,
    quota: Quota,
}

impl EndpointRateLimiters {
    /// `None` when the rate is zero, i.e. unlimited.
    pub fn new(rate_per_second: u32) -> Option<Self> {
        let rate = NonZeroU32::new(rate_per_second)?;
        Some(Self {
            limiters: DashMap::new(),
            quota: Quota::per_second(rate).allow_burst(NonZeroU32::MIN),
        })
    }

    pub async fn acquire(&self, endpoint: &str) {
        let limiter = self.get_or_create(endpoint);
        limiter.until_ready().await;
    }

    fn get_or_create(&self, endpoint: &str) -> Arc<Limiter> {
        self.limiters
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone()
    }

    pub fn endpoints(&self) -> usize {
        self.limiters.len()
    }
}
