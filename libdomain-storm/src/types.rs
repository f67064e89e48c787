use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use thiserror::Error;

/// Classified outcome of a single lookup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Taken,
    Available,
    Unknown,
    Error,
    Timeout,
}

impl Verdict {
    /// `Taken` and `Available` settle a domain; everything else is eligible for retry.
    pub fn is_terminal(self) -> bool {
        matches!(self, Verdict::Taken | Verdict::Available)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Taken => "taken",
            Verdict::Available => "available",
            Verdict::Unknown => "unknown",
            Verdict::Error => "error",
            Verdict::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt failed to produce a verdict.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("connect failed: {0}")]
    ConnectFailure(String),
    #[error("tunnel rejected: {0}")]
    TunnelRejected(String),
    #[error("timeout")]
    Timeout,
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("HTTP {0}")]
    HttpStatus(u16),
    #[error("no endpoint for .{0}")]
    NoEndpoint(String),
    #[error("connection closed without response")]
    EmptyResponse,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl QueryError {
    pub fn verdict(&self) -> Verdict {
        match self {
            QueryError::Timeout => Verdict::Timeout,
            QueryError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => Verdict::Timeout,
            QueryError::Request(e) if e.is_timeout() => Verdict::Timeout,
            _ => Verdict::Error,
        }
    }
}

/// Final record for one attempt; the unit handed to the result sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub domain: String,
    pub verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip)]
    pub rate_limited: bool,
    #[serde(skip)]
    pub latency: Duration,
}

impl QueryResult {
    pub fn new(domain: impl Into<String>, verdict: Verdict, latency: Duration) -> Self {
        Self {
            domain: domain.into(),
            verdict,
            detail: None,
            rate_limited: false,
            latency,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn from_error(domain: impl Into<String>, error: &QueryError, latency: Duration) -> Self {
        Self {
            domain: domain.into(),
            verdict: error.verdict(),
            detail: Some(error.to_string()),
            rate_limited: matches!(error, QueryError::RateLimited),
            latency,
        }
    }

    /// Outcomes the rate controller treats as origin pushback.
    pub fn is_throttle_signal(&self) -> bool {
        self.verdict == Verdict::Timeout || self.rate_limited
    }
}

/// Resume point persisted by the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub source_offset: u64,
    pub domains_checked_total: u64,
}

/// Per-verdict tallies for progress lines and the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerdictCounts {
    pub taken: u64,
    pub available: u64,
    pub unknown: u64,
    pub errors: u64,
    pub timeouts: u64,
}

impl VerdictCounts {
    pub fn add(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Taken => self.taken += 1,
            Verdict::Available => self.available += 1,
            Verdict::Unknown => self.unknown += 1,
            Verdict::Error => self.errors += 1,
            Verdict::Timeout => self.timeouts += 1,
        }
    }

    pub fn merge(&mut self, other: &VerdictCounts) {
        self.taken += other.taken;
        self.available += other.available;
        self.unknown += other.unknown;
        self.errors += other.errors;
        self.timeouts += other.timeouts;
    }

    pub fn total(&self) -> u64 {
        self.taken + self.available + self.unknown + self.errors + self.timeouts
    }
}

impl<'a> FromIterator<&'a QueryResult> for VerdictCounts {
    fn from_iter<I: IntoIterator<Item = &'a QueryResult>>(iter: I) -> Self {
        let mut counts = VerdictCounts::default();
        for result in iter {
            counts.add(result.verdict);
        }
        counts
    }
}

/// Aggregate byte counters exposed by a protocol client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bandwidth {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connections_opened: u64,
}

impl Bandwidth {
    pub fn total(&self) -> u64 {
        self.bytes_sent + self.bytes_received
    }
}
