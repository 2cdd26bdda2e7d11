use apiprobe_common::CircuitBreakerPolicy;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state for each service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Normal operation, requests flow through
    Closed,
    /// Circuit is tripped, requests fail fast without reaching the service
    Open,
    /// Testing if the service has recovered
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_calls: u32,
    /// Bumped on every entry into HalfOpen
    half_open_epoch: u64,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub half_open_calls: u32,
    /// Time since the last recorded failure
    pub since_last_failure: Option<Duration>,
}

/// Failure-rate gate for one service.
///
/// Pure state machine: no I/O, every transition happens under one lock.
///
/// - **Closed**: calls pass; `failure_threshold` consecutive failures open it
/// - **Open**: calls are rejected until `recovery_timeout` has elapsed since
///   the last failure, then the breaker goes half-open
/// - **HalfOpen**: up to `half_open_max_calls` probes pass; a success closes
///   the circuit, a failure reopens it
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    policy: CircuitBreakerPolicy,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, policy: CircuitBreakerPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                half_open_calls: 0,
                half_open_epoch: 0,
            }),
        }
    }

    pub fn policy(&self) -> &CircuitBreakerPolicy {
        &self.policy
    }

    /// A poisoned lock still guards a consistent state.
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Asks permission for one call.
    ///
    /// Prefer [`try_acquire`](Self::try_acquire) when the call may be
    /// cancelled: a probe admitted here is only released by a recorded
    /// outcome.
    pub fn can_execute(&self) -> bool {
        self.can_execute_at(Instant::now())
    }

    /// Same as [`can_execute`](Self::can_execute) with an explicit clock.
    pub fn can_execute_at(&self, now: Instant) -> bool {
        self.admit_at(now).is_some()
    }

    /// Asks permission for one call and returns a permit that settles it.
    ///
    /// A permit dropped without an outcome hands its half-open probe slot
    /// back, so a cancelled call cannot leave the breaker stuck half-open.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> Option<CallPermit<'_>> {
        self.admit_at(now).map(|probe_epoch| CallPermit {
            breaker: self,
            probe_epoch,
            settled: false,
        })
    }

    /// Returns `Some(epoch)` when admitted, with the half-open epoch for probes.
    fn admit_at(&self, now: Instant) -> Option<Option<u64>> {
        let mut inner = self.lock();
        let state = inner.state;
        match state {
            CircuitState::Closed => Some(None),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.policy.recovery_timeout() {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_epoch = inner.half_open_epoch.wrapping_add(1);
                    // This call is the first probe
                    inner.half_open_calls = 1;
                    info!(service = %self.name, "Circuit half-open, probing service");
                    Some(Some(inner.half_open_epoch))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls < self.policy.half_open_max_calls {
                    inner.half_open_calls += 1;
                    Some(Some(inner.half_open_epoch))
                } else {
                    None
                }
            }
        }
    }

    /// Returns an unsettled probe slot of the given half-open epoch.
    fn release_probe(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen
            && inner.half_open_epoch == epoch
            && inner.half_open_calls > 0
        {
            inner.half_open_calls -= 1;
            debug!(service = %self.name, "Probe abandoned, slot released");
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        let state = inner.state;
        match state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.half_open_calls = 0;
                info!(service = %self.name, "Circuit closed after successful probe");
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            // A call admitted before the circuit opened; the open window stands.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(now);

        let state = inner.state;
        match state {
            CircuitState::Closed => {
                if inner.failure_count >= self.policy.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(
                        service = %self.name,
                        failures = inner.failure_count,
                        "Circuit opened after {} consecutive failures",
                        inner.failure_count
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.half_open_calls = 0;
                warn!(service = %self.name, "Probe failed, circuit re-opened");
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock();
        CircuitBreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            half_open_calls: inner.half_open_calls,
            since_last_failure: inner.last_failure.map(|at| at.elapsed()),
        }
    }
}

/// Admission for one call, obtained from [`CircuitBreaker::try_acquire`].
///
/// Settle it with [`record_success`](Self::record_success) or
/// [`record_failure`](Self::record_failure). Dropping it unsettled releases
/// the half-open probe slot it holds, if any, without recording an outcome.
#[must_use = "a permit records nothing unless settled"]
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe_epoch: Option<u64>,
    settled: bool,
}

impl CallPermit<'_> {
    /// Whether this call was admitted as a half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe_epoch.is_some()
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(epoch) = self.probe_epoch {
            self.breaker.release_probe(epoch);
        }
    }
}
