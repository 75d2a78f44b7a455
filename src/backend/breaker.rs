//! Per-backend failure counter that temporarily switches a backend off.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Gate {
    #[default]
    Closed,
    OpenUntil(Instant),
    /// The cooldown does not fit in an `Instant`.
    OpenForSession,
}

#[derive(Debug, Default, Clone, Copy)]
struct BreakerState {
    failures: u32,
    gate: Gate,
}

/// After `threshold` consecutive failures a backend is skipped for `cooldown`.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    states: HashMap<String, BreakerState>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            states: HashMap::new(),
        }
    }

    /// Whether `backend` is currently switched off. An expired cooldown
    /// closes the breaker again with a clean count.
    pub fn is_open(&mut self, backend: &str) -> bool {
        let Some(state) = self.states.get_mut(backend) else {
            return false;
        };
        match state.gate {
            Gate::OpenForSession => true,
            Gate::OpenUntil(until) if Instant::now() < until => true,
            Gate::OpenUntil(_) => {
                tracing::info!(backend, "conversion backend re-enabled");
                *state = BreakerState::default();
                false
            }
            Gate::Closed => false,
        }
    }

    pub fn record_success(&mut self, backend: &str) {
        if let Some(state) = self.states.get_mut(backend) {
            state.failures = 0;
        }
    }

    /// Counts a failure. Returns true when this failure opened the breaker.
    pub fn record_failure(&mut self, backend: &str) -> bool {
        let state = self.states.entry(backend.to_string()).or_default();
        state.failures += 1;
        if state.gate == Gate::Closed && state.failures >= self.threshold {
            state.gate = match Instant::now().checked_add(self.cooldown) {
                Some(until) => Gate::OpenUntil(until),
                None => Gate::OpenForSession,
            };
            tracing::warn!(
                backend,
                failures = state.failures,
                cooldown_secs = self.cooldown.as_secs(),
                "conversion backend disabled after repeated failures"
            );
            return true;
        }
        false
    }

    pub fn failures(&self, backend: &str) -> u32 {
        self.states.get(backend).map(|s| s.failures).unwrap_or(0)
    }
}
