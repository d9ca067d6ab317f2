//! Circuit breaker guarding the remote model service.
//!
//! State machine: CLOSED → OPEN when the failure rate over the rolling window
//! reaches the threshold; OPEN → HALF_OPEN after the wait; HALF_OPEN admits a
//! bounded number of probes and returns to CLOSED when their success ratio
//! reaches one half, otherwise back to OPEN.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use metrics::counter;
use tokio::time::Instant;
use tracing::{info, warn};

/// Breaker tuning. Defaults follow the service contract: a 20-call window,
/// 50% failure threshold, 30 second open period, 3 half-open probes.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub window_size: usize,
    pub failure_rate_threshold: f64,
    pub open_duration: Duration,
    pub half_open_max_probes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            failure_rate_threshold: 0.5,
            open_duration: Duration::from_secs(30),
            half_open_max_probes: 3,
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// Rolling window of call outcomes; true marks a failure
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    probes_issued: u32,
    probe_successes: u32,
    probe_failures: u32,
}

/// Process-wide circuit breaker shared by every ML call site.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                probes_issued: 0,
                probe_successes: 0,
                probe_failures: 0,
            }),
        }
    }

    /// Current state, advancing OPEN → HALF_OPEN when the wait has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().expect("breaker lock");
        self.advance_if_due(&mut inner);
        inner.state
    }

    /// Ask permission for one remote call. `false` means short-circuit to
    /// the fallback without touching the remote client.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock");
        self.advance_if_due(&mut inner);

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                counter!("ml_breaker_short_circuits_total").increment(1);
                false
            }
            CircuitState::HalfOpen => {
                if inner.probes_issued < self.config.half_open_max_probes {
                    inner.probes_issued += 1;
                    true
                } else {
                    counter!("ml_breaker_short_circuits_total").increment(1);
                    false
                }
            }
        }
    }

    /// Record a successful remote call.
    pub fn record_success(&self) {
        self.record(false);
    }

    /// Record a failed remote call.
    pub fn record_failure(&self) {
        self.record(true);
    }

    fn record(&self, failed: bool) {
        let mut inner = self.inner.lock().expect("breaker lock");

        match inner.state {
            CircuitState::Closed => {
                inner.window.push_back(failed);
                while inner.window.len() > self.config.window_size {
                    inner.window.pop_front();
                }

                if inner.window.len() >= self.config.window_size {
                    let failures = inner.window.iter().filter(|f| **f).count();
                    let rate = failures as f64 / inner.window.len() as f64;
                    if rate >= self.config.failure_rate_threshold {
                        warn!(
                            failure_rate = rate,
                            window = inner.window.len(),
                            "ML circuit breaker opened"
                        );
                        self.open(&mut inner);
                    }
                }
            }
            CircuitState::HalfOpen => {
                if failed {
                    inner.probe_failures += 1;
                } else {
                    inner.probe_successes += 1;
                }

                let resolved = inner.probe_successes + inner.probe_failures;
                let ratio = inner.probe_successes as f64 / resolved as f64;
                if ratio >= 0.5 {
                    info!("ML circuit breaker closed after successful probe");
                    counter!("ml_breaker_transitions_total", "to" => "closed").increment(1);
                    inner.state = CircuitState::Closed;
                    inner.window.clear();
                    inner.opened_at = None;
                } else {
                    warn!("ML circuit breaker reopened after failed probe");
                    self.open(&mut inner);
                }
            }
            // Late results from calls issued before the trip carry no signal
            CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut BreakerInner) {
        counter!("ml_breaker_transitions_total", "to" => "open").increment(1);
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.window.clear();
        inner.probes_issued = 0;
        inner.probe_successes = 0;
        inner.probe_failures = 0;
    }

    fn advance_if_due(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open
            && let Some(opened_at) = inner.opened_at
            && opened_at.elapsed() >= self.config.open_duration
        {
            info!("ML circuit breaker half-open");
            counter!("ml_breaker_transitions_total", "to" => "half_open").increment(1);
            inner.state = CircuitState::HalfOpen;
            inner.probes_issued = 0;
            inner.probe_successes = 0;
            inner.probe_failures = 0;
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
