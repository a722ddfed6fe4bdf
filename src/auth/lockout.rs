//! Failed-login tracking and temporary account lockout
//!
//! State lives in process memory, keyed by lowercased email.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Default)]
struct Attempts {
    failures: Vec<Instant>,
    locked_until: Option<Instant>,
}

/// Result of recording a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedAttempt {
    /// Account is now locked
    Locked,
    Remaining(usize),
}

#[derive(Debug)]
pub struct LoginRateLimiter {
    max_attempts: usize,
    window: Duration,
    lockout: Duration,
    state: Mutex<HashMap<String, Attempts>>,
}

impl LoginRateLimiter {
    /// Failures are counted within `lockout` and lock the account for as long
    pub fn new(max_attempts: usize, lockout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            window: lockout,
            lockout,
            state: Mutex::new(HashMap::new()),
        }
    }

    fn key(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Whether the account is locked and, if so, the seconds left
    pub async fn is_locked(&self, email: &str) -> (bool, Option<u64>) {
        let key = Self::key(email);
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let Some(locked_until) = state.get(&key).map(|a| a.locked_until) else {
            return (false, None);
        };

        match locked_until {
            Some(until) if until > now => {
                let remaining = until.duration_since(now).as_secs().max(1);
                (true, Some(remaining))
            }
            Some(_) => {
                state.remove(&key);
                (false, None)
            }
            None => (false, None),
        }
    }

    pub async fn record_failed_attempt(&self, email: &str, ip: Option<&str>) -> FailedAttempt {
        let key = Self::key(email);
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let window = self.window;

        // Forget accounts with no live lock and no failure inside the window
        state.retain(|_, a| {
            a.locked_until.is_some_and(|until| until > now)
                || a.failures
                    .iter()
                    .any(|at| now.saturating_duration_since(*at) < window)
        });

        let attempts = state.entry(key).or_default();
        attempts
            .failures
            .retain(|at| now.saturating_duration_since(*at) < window);
        attempts.failures.push(now);
        let count = attempts.failures.len();

        warn!(
            email = email,
            ip = ip.unwrap_or("unknown"),
            attempt_count = count,
            max_attempts = self.max_attempts,
            "Failed login attempt"
        );

        if count >= self.max_attempts {
            attempts.locked_until = Some(now + self.lockout);
            error!(
                email = email,
                ip = ip.unwrap_or("unknown"),
                lockout_secs = self.lockout.as_secs(),
                "Account locked due to too many failed attempts"
            );
            return FailedAttempt::Locked;
        }

        FailedAttempt::Remaining(self.max_attempts - count)
    }

    pub async fn record_successful_login(&self, email: &str) {
        self.state.lock().await.remove(&Self::key(email));
        info!(email = email, "Successful login");
    }

    /// Failures currently inside the window
    pub async fn attempt_count(&self, email: &str) -> usize {
        let state = self.state.lock().await;
        let now = Instant::now();
        state
            .get(&Self::key(email))
            .map(|a| {
                a.failures
                    .iter()
                    .filter(|at| now.saturating_duration_since(**at) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn lockout_seconds(&self) -> u64 {
        self.lockout.as_secs()
    }

    /// Accounts currently tracked
    pub async fn tracked_accounts(&self) -> usize {
        self.state.lock().await.len()
    }
}
