//! Adaptive concurrency controller.
//!
//! Every completed query calls [`AdaptiveController::update`]. Every
//! `check_interval` updates the latest [`MetricsSnapshot`] is evaluated in
//! strict priority order:
//!
//! 1. timeout rate >= critical: pause for `pause_duration`, halve concurrency
//! 2. timeout rate >= high: severe decrease
//! 3. p95 latency >= critical: severe decrease
//! 4. average latency >= high: decrease
//! 5. timeout rate >= warning: decrease
//! 6. clean, long enough window: increase
//!
//! Concurrency is always clamped to `[min_concurrency, max_concurrency]`.

use crate::{config::ControllerConfig, metrics::MetricsSnapshot, metrics::Window};
use serde::Serialize;
use std::{
    fmt,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    RampingUp,
    Stable,
    BackingOff,
    Paused,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::RampingUp => "ramping_up",
            Mode::Stable => "stable",
            Mode::BackingOff => "backing_off",
            Mode::Paused => "paused",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Pause { timeout_rate: f64 },
    SevereDecrease { reason: String },
    Decrease { reason: String },
    Increase { avg_latency_ms: f64 },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Pause { timeout_rate } => {
                write!(f, "PAUSE (timeout={:.1}%)", timeout_rate * 100.0)
            }
            Action::SevereDecrease { reason } => write!(f, "SEVERE_DECREASE ({reason})"),
            Action::Decrease { reason } => write!(f, "DECREASE ({reason})"),
            Action::Increase { avg_latency_ms } => {
                write!(f, "INCREASE (avg_lat={avg_latency_ms:.0}ms)")
            }
        }
    }
}

/// One concurrency change, kept for audit.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub at: Instant,
    pub from: usize,
    pub to: usize,
    pub action: Action,
}

#[derive(Debug, Clone)]
pub struct ControllerState {
    pub concurrency: usize,
    pub mode: Mode,
    pub last_adjustment_time: Instant,
    pub last_decrease_time: Option<Instant>,
    pub pause_until: Option<Instant>,
    pub queries_since_adjustment: u64,
    queries_since_check: u64,
}

pub struct AdaptiveController {
    config: ControllerConfig,
    state: ControllerState,
    history: Window<Adjustment>,
}

impl AdaptiveController {
    pub fn new(config: ControllerConfig) -> Self {
        let concurrency = config
            .initial_concurrency
            .clamp(config.min_concurrency, config.max_concurrency.max(config.min_concurrency));
        let history = Window::new(config.history_len);
        Self {
            state: ControllerState {
                concurrency,
                mode: Mode::Stable,
                last_adjustment_time: Instant::now(),
                last_decrease_time: None,
                pause_until: None,
                queries_since_adjustment: 0,
                queries_since_check: 0,
            },
            config,
            history,
        }
    }

    /// Overrides the starting value, e.g. `proxies * per_proxy`.
    pub fn with_initial_concurrency(mut self, concurrency: usize) -> Self {
        self.state.concurrency = self.clamp(concurrency);
        self
    }

    /// Feeds one completed query and returns the concurrency to admit with.
    pub fn update(&mut self, snapshot: &MetricsSnapshot) -> usize {
        self.update_at(snapshot, Instant::now())
    }

    pub(crate) fn update_at(&mut self, snapshot: &MetricsSnapshot, now: Instant) -> usize {
        self.state.queries_since_check += 1;
        self.state.queries_since_adjustment += 1;

        if self.state.mode == Mode::Paused {
            if self.state.pause_until.is_some_and(|until| now >= until) {
                self.state.mode = Mode::Stable;
                self.state.pause_until = None;
                self.state.queries_since_adjustment = 0;
                tracing::info!(concurrency = self.state.concurrency, "resuming after pause");
            }
            return self.state.concurrency;
        }

        if self.state.queries_since_check < self.config.check_interval {
            return self.state.concurrency;
        }
        self.state.queries_since_check = 0;
        self.evaluate(snapshot, now)
    }

    fn evaluate(&mut self, m: &MetricsSnapshot, now: Instant) -> usize {
        let cfg = &self.config;
        let before = self.state.concurrency;

        let action = if m.timeout_rate >= cfg.timeout_critical {
            self.pause(now);
            Some(Action::Pause {
                timeout_rate: m.timeout_rate,
            })
        } else if m.timeout_rate >= cfg.timeout_high {
            self.decrease(true, now);
            Some(Action::SevereDecrease {
                reason: format!("timeout={:.1}%", m.timeout_rate * 100.0),
            })
        } else if m.p95_latency_ms >= cfg.latency_critical_ms {
            self.decrease(true, now);
            Some(Action::SevereDecrease {
                reason: format!("p95={:.0}ms", m.p95_latency_ms),
            })
        } else if m.avg_latency_ms >= cfg.latency_high_ms {
            self.decrease(false, now);
            Some(Action::Decrease {
                reason: format!("avg_lat={:.0}ms", m.avg_latency_ms),
            })
        } else if m.timeout_rate >= cfg.timeout_warning {
            self.decrease(false, now);
            Some(Action::Decrease {
                reason: format!("timeout={:.1}%", m.timeout_rate * 100.0),
            })
        } else if self.can_increase(m, now) {
            self.increase();
            Some(Action::Increase {
                avg_latency_ms: m.avg_latency_ms,
            })
        } else {
            if self.state.mode != Mode::Stable {
                self.state.mode = Mode::Stable;
            }
            None
        };

        if let Some(action) = action {
            let after = self.state.concurrency;
            if after != before || matches!(action, Action::Pause { .. }) {
                self.state.last_adjustment_time = now;
                self.state.queries_since_adjustment = 0;
                tracing::info!(
                    from = before,
                    to = after,
                    mode = %self.state.mode,
                    %action,
                    "concurrency adjusted"
                );
                self.history.push(Adjustment {
                    at: now,
                    from: before,
                    to: after,
                    action,
                });
            }
        }
        self.state.concurrency
    }

    fn can_increase(&self, m: &MetricsSnapshot, now: Instant) -> bool {
        let cfg = &self.config;
        if self.state.concurrency >= cfg.max_concurrency {
            return false;
        }
        if let Some(last) = self.state.last_decrease_time {
            if now.duration_since(last) < cfg.min_stable_duration {
                return false;
            }
        }
        if self.state.queries_since_adjustment < cfg.stable_queries_required {
            return false;
        }
        if m.avg_latency_ms > cfg.latency_low_ms {
            return false;
        }
        m.timeout_rate <= cfg.timeout_warning / 2.0
    }

    fn increase(&mut self) {
        let next = (self.state.concurrency as f64 * self.config.increase_factor) as usize;
        self.state.concurrency = self.clamp(next);
        self.state.mode = Mode::RampingUp;
    }

    fn decrease(&mut self, severe: bool, now: Instant) {
        let factor = if severe {
            self.config.severe_decrease_factor
        } else {
            self.config.decrease_factor
        };
        let next = (self.state.concurrency as f64 * factor) as usize;
        self.state.concurrency = self.clamp(next);
        self.state.mode = Mode::BackingOff;
        self.state.last_decrease_time = Some(now);
    }

    fn pause(&mut self, now: Instant) {
        self.state.mode = Mode::Paused;
        self.state.pause_until = Some(now + self.config.pause_duration);
        self.state.concurrency = self.clamp(self.state.concurrency / 2);
        tracing::warn!(
            pause = ?self.config.pause_duration,
            concurrency = self.state.concurrency,
            "timeout storm, pausing admissions"
        );
    }

    fn clamp(&self, value: usize) -> usize {
        let max = self.config.max_concurrency.max(self.config.min_concurrency);
        value.clamp(self.config.min_concurrency, max)
    }

    pub fn concurrency(&self) -> usize {
        self.state.concurrency
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn is_paused(&self) -> bool {
        self.state.mode == Mode::Paused
            && self.state.pause_until.is_some_and(|t| Instant::now() < t)
    }

    pub fn pause_remaining(&self) -> Duration {
        match self.state.pause_until {
            Some(until) if self.state.mode == Mode::Paused => {
                until.saturating_duration_since(Instant::now())
            }
            _ => Duration::ZERO,
        }
    }

    pub fn status(&self) -> String {
        if self.state.mode == Mode::Paused {
            return format!(
                "PAUSED ({:.0}s remaining) concurrency={}",
                self.pause_remaining().as_secs_f64(),
                self.state.concurrency
            );
        }
        format!("{} concurrency={}", self.state.mode, self.state.concurrency)
    }

    pub fn history(&self) -> impl Iterator<Item = &Adjustment> {
        self.history.iter()
    }
}

impl Default for AdaptiveController {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}
