// src/io/breaker.rs
//
// Circuit breaker guarding all device I/O.
//
// Closed: I/O allowed, consecutive failures counted.
// Open: I/O refused until the cooldown deadline passes.
// HalfOpen: the deadline passed; exactly one trial (the supervisor's reopen)
// may run. Its outcome closes the breaker or reopens it with a longer cooldown.
//
// The Open -> HalfOpen step is observed lazily when the state is read, so
// `state = Open` always implies `now < cooldown_deadline`. Every method that
// depends on time has an `_at(now)` form for deterministic tests.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::error::CircuitOpenError;

fn default_trip_threshold() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

/// Tuning for the circuit breaker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that trip a closed breaker.
    #[serde(default = "default_trip_threshold")]
    pub trip_threshold: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            trip_threshold: default_trip_threshold(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl BreakerConfig {
    /// `min(max_backoff, base_backoff * 2^attempt)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self.base_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// What a permitted caller may do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permit {
    /// Breaker closed; ordinary I/O.
    Normal,
    /// The single half-open trial. Report its outcome.
    Trial,
}

/// State change caused by a recorded event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    None,
    /// Tripped. `attempt` counts trips since the last success, starting at 1.
    Opened { attempt: u32, cooldown: Duration },
    Closed,
}

/// Point-in-time view of the breaker.
#[derive(Clone, Copy, Debug)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub trips: u32,
    pub last_failure: Option<Instant>,
    pub cooldown_deadline: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: BreakerState,
    consecutive_failures: u32,
    /// Trips since the last success; the exponent for the next backoff.
    trips: u32,
    last_failure: Option<Instant>,
    cooldown_deadline: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: BreakerState::Closed,
            consecutive_failures: 0,
            trips: 0,
            last_failure: None,
            cooldown_deadline: None,
            trial_in_flight: false,
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn refresh(&mut self, now: Instant) {
        if self.state == BreakerState::Open && self.cooldown_deadline.map_or(true, |d| now >= d) {
            self.state = BreakerState::HalfOpen;
            self.trial_in_flight = false;
        }
    }

    fn retry_in(&self, now: Instant) -> Duration {
        self.cooldown_deadline
            .map(|d| d.saturating_duration_since(now))
            .unwrap_or_default()
    }

    pub fn state_at(&mut self, now: Instant) -> BreakerState {
        self.refresh(now);
        self.state
    }

    pub fn state(&mut self) -> BreakerState {
        self.state_at(Instant::now())
    }

    pub fn snapshot_at(&mut self, now: Instant) -> BreakerSnapshot {
        self.refresh(now);
        BreakerSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            trips: self.trips,
            last_failure: self.last_failure,
            cooldown_deadline: self.cooldown_deadline,
        }
    }

    /// Ordinary I/O gate. Succeeds only while closed; never consumes the trial.
    pub fn check_at(&mut self, now: Instant) -> Result<(), CircuitOpenError> {
        self.refresh(now);
        match self.state {
            BreakerState::Closed => Ok(()),
            _ => Err(CircuitOpenError {
                retry_in: self.retry_in(now),
            }),
        }
    }

    pub fn check(&mut self) -> Result<(), CircuitOpenError> {
        self.check_at(Instant::now())
    }

    /// Ask to perform I/O. In HalfOpen only the first caller gets the trial.
    pub fn try_acquire_at(&mut self, now: Instant) -> Result<Permit, CircuitOpenError> {
        self.refresh(now);
        match self.state {
            BreakerState::Closed => Ok(Permit::Normal),
            BreakerState::HalfOpen if !self.trial_in_flight => {
                self.trial_in_flight = true;
                Ok(Permit::Trial)
            }
            _ => Err(CircuitOpenError {
                retry_in: self.retry_in(now),
            }),
        }
    }

    pub fn try_acquire(&mut self) -> Result<Permit, CircuitOpenError> {
        self.try_acquire_at(Instant::now())
    }

    /// Ordinary read/write success. Clears the failure streak while closed;
    /// ignored otherwise, since only the half-open trial may close the breaker.
    pub fn record_io_success_at(&mut self, now: Instant) {
        self.refresh(now);
        if self.state == BreakerState::Closed {
            self.consecutive_failures = 0;
        }
    }

    pub fn record_io_success(&mut self) {
        self.record_io_success_at(Instant::now())
    }

    /// Outcome of the half-open trial (or an explicit connect): closes the
    /// breaker and resets the streak and backoff.
    pub fn record_success(&mut self) -> Transition {
        let was = self.state;
        self.state = BreakerState::Closed;
        self.consecutive_failures = 0;
        self.trips = 0;
        self.cooldown_deadline = None;
        self.trial_in_flight = false;
        if was == BreakerState::Closed {
            Transition::None
        } else {
            Transition::Closed
        }
    }

    pub fn record_failure_at(&mut self, now: Instant) -> Transition {
        self.refresh(now);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(now);
        match self.state {
            BreakerState::Closed if self.consecutive_failures >= self.config.trip_threshold.max(1) => {
                self.open(now)
            }
            BreakerState::HalfOpen => self.open(now),
            _ => Transition::None,
        }
    }

    pub fn record_failure(&mut self) -> Transition {
        self.record_failure_at(Instant::now())
    }

    /// Trip immediately, e.g. when the device has vanished from the system.
    pub fn force_open_at(&mut self, now: Instant) -> Transition {
        self.refresh(now);
        if self.state == BreakerState::Open {
            return Transition::None;
        }
        self.last_failure = Some(now);
        self.open(now)
    }

    pub fn force_open(&mut self) -> Transition {
        self.force_open_at(Instant::now())
    }

    /// Back to a fresh closed breaker, as on an explicit connect.
    pub fn reset(&mut self) {
        self.record_success();
        self.last_failure = None;
    }

    fn open(&mut self, now: Instant) -> Transition {
        let cooldown = self.config.backoff(self.trips);
        self.trips = self.trips.saturating_add(1);
        self.state = BreakerState::Open;
        self.cooldown_deadline = Some(now + cooldown);
        self.trial_in_flight = false;
        tracing::debug!(attempt = self.trips, cooldown_ms = cooldown.as_millis() as u64, "circuit opened");
        Transition::Opened {
            attempt: self.trips,
            cooldown,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            trip_threshold: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 1_000,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    // ------------------------------------------------------------------------
    // Backoff
    // ------------------------------------------------------------------------

    #[test]
    fn test_backoff_doubles_and_caps() {
        let cfg = config();
        assert_eq!(cfg.backoff(0), ms(100));
        assert_eq!(cfg.backoff(1), ms(200));
        assert_eq!(cfg.backoff(3), ms(800));
        assert_eq!(cfg.backoff(4), ms(1_000));
        assert_eq!(cfg.backoff(200), ms(1_000));
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    #[test]
    fn test_trips_after_threshold_and_refuses_io() {
        let mut breaker = CircuitBreaker::new(config());
        let t0 = Instant::now();

        assert_eq!(breaker.record_failure_at(t0), Transition::None);
        assert_eq!(breaker.record_failure_at(t0), Transition::None);
        assert_eq!(breaker.state_at(t0), BreakerState::Closed);

        let transition = breaker.record_failure_at(t0);
        assert_eq!(
            transition,
            Transition::Opened {
                attempt: 1,
                cooldown: ms(100)
            }
        );
        assert_eq!(breaker.state_at(t0), BreakerState::Open);

        let err = breaker.check_at(t0 + ms(40)).unwrap_err();
        assert_eq!(err.retry_in, ms(60));
        assert!(breaker.try_acquire_at(t0 + ms(40)).is_err());
    }

    #[test]
    fn test_success_resets_streak() {
        let mut breaker = CircuitBreaker::new(config());
        let t0 = Instant::now();
        breaker.record_failure_at(t0);
        breaker.record_failure_at(t0);
        assert_eq!(breaker.record_success(), Transition::None);
        breaker.record_failure_at(t0);
        breaker.record_failure_at(t0);
        assert_eq!(breaker.state_at(t0), BreakerState::Closed);
        assert_eq!(breaker.snapshot_at(t0).consecutive_failures, 2);
    }

    #[test]
    fn test_half_open_grants_exactly_one_trial() {
        let mut breaker = CircuitBreaker::new(config());
        let t0 = Instant::now();
        for _ in 0..3 {
            breaker.record_failure_at(t0);
        }

        let later = t0 + ms(100);
        assert_eq!(breaker.state_at(later), BreakerState::HalfOpen);
        assert_eq!(breaker.try_acquire_at(later), Ok(Permit::Trial));
        assert!(breaker.try_acquire_at(later).is_err());
        // Ordinary I/O is still refused while the trial runs
        assert!(breaker.check_at(later).is_err());
    }

    #[test]
    fn test_trial_success_closes() {
        let mut breaker = CircuitBreaker::new(config());
        let t0 = Instant::now();
        for _ in 0..3 {
            breaker.record_failure_at(t0);
        }
        let later = t0 + ms(150);
        assert_eq!(breaker.try_acquire_at(later), Ok(Permit::Trial));
        assert_eq!(breaker.record_success(), Transition::Closed);
        assert_eq!(breaker.state_at(later), BreakerState::Closed);
        assert_eq!(breaker.try_acquire_at(later), Ok(Permit::Normal));
        assert_eq!(breaker.snapshot_at(later).trips, 0);
    }

    #[test]
    fn test_trial_failure_reopens_with_doubled_cooldown() {
        let mut breaker = CircuitBreaker::new(config());
        let t0 = Instant::now();
        for _ in 0..3 {
            breaker.record_failure_at(t0);
        }

        let t1 = t0 + ms(100);
        assert_eq!(breaker.try_acquire_at(t1), Ok(Permit::Trial));
        assert_eq!(
            breaker.record_failure_at(t1),
            Transition::Opened {
                attempt: 2,
                cooldown: ms(200)
            }
        );
        assert_eq!(breaker.state_at(t1 + ms(199)), BreakerState::Open);
        assert_eq!(breaker.state_at(t1 + ms(200)), BreakerState::HalfOpen);

        let t2 = t1 + ms(200);
        breaker.try_acquire_at(t2).unwrap();
        assert_eq!(
            breaker.record_failure_at(t2),
            Transition::Opened {
                attempt: 3,
                cooldown: ms(400)
            }
        );
    }

    #[test]
    fn test_open_implies_before_deadline() {
        let mut breaker = CircuitBreaker::new(config());
        let t0 = Instant::now();
        for _ in 0..3 {
            breaker.record_failure_at(t0);
        }
        for offset in [0, 50, 99, 100, 101, 500] {
            let now = t0 + ms(offset);
            let snapshot = breaker.snapshot_at(now);
            if snapshot.state == BreakerState::Open {
                assert!(now < snapshot.cooldown_deadline.unwrap());
            }
        }
    }

    #[test]
    fn test_failures_while_open_do_not_extend_cooldown() {
        let mut breaker = CircuitBreaker::new(config());
        let t0 = Instant::now();
        for _ in 0..3 {
            breaker.record_failure_at(t0);
        }
        assert_eq!(breaker.record_failure_at(t0 + ms(50)), Transition::None);
        assert_eq!(breaker.state_at(t0 + ms(100)), BreakerState::HalfOpen);
    }

    #[test]
    fn test_force_open_trips_immediately() {
        let mut breaker = CircuitBreaker::new(config());
        let t0 = Instant::now();
        assert!(matches!(breaker.force_open_at(t0), Transition::Opened { attempt: 1, .. }));
        assert_eq!(breaker.state_at(t0), BreakerState::Open);
        assert_eq!(breaker.force_open_at(t0), Transition::None);

        breaker.reset();
        assert_eq!(breaker.state_at(t0), BreakerState::Closed);
        assert!(breaker.snapshot_at(t0).last_failure.is_none());
    }

    #[test]
    fn test_io_success_never_closes_a_tripped_breaker() {
        let mut breaker = CircuitBreaker::new(config());
        let t0 = Instant::now();
        breaker.force_open_at(t0);

        // A read that started before the trip completes afterwards
        breaker.record_io_success_at(t0 + ms(10));
        assert_eq!(breaker.state_at(t0 + ms(10)), BreakerState::Open);

        let later = t0 + ms(100);
        breaker.record_io_success_at(later);
        assert_eq!(breaker.state_at(later), BreakerState::HalfOpen);
        assert_eq!(breaker.try_acquire_at(later), Ok(Permit::Trial));
    }

    #[test]
    fn test_io_success_clears_streak_while_closed() {
        let mut breaker = CircuitBreaker::new(config());
        let t0 = Instant::now();
        breaker.record_failure_at(t0);
        breaker.record_failure_at(t0);
        breaker.record_io_success_at(t0);
        assert_eq!(breaker.snapshot_at(t0).consecutive_failures, 0);
        assert_eq!(breaker.record_failure_at(t0), Transition::None);
        assert_eq!(breaker.state_at(t0), BreakerState::Closed);
    }
}
