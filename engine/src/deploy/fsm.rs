//! Finite State Machine for deployment attempts

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for resilient deployments
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts before giving up
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles after each failure
    pub base_delay: Duration,

    /// Upper bound for a single backoff delay
    pub max_delay: Duration,

    /// Bound on the whole multi-attempt deployment
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            deadline: Some(Duration::from_secs(120)),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }
}

/// Deployment attempt state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// Created, nothing sent yet
    Pending,

    /// Requests in flight
    InProgress,

    /// All sub-deployments reported ok
    Success,

    /// At least one sub-deployment failed
    Failed,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Success | AttemptState::Failed)
    }
}

/// Deployment attempt event
#[derive(Debug, Clone)]
pub enum AttemptEvent {
    /// Start sending
    Start,

    /// Every step succeeded
    Succeed,

    /// A step failed
    Fail(String),
}

/// Attempt FSM
#[derive(Debug, Clone)]
pub struct AttemptFsm {
    state: AttemptState,
    error: Option<String>,
}

impl AttemptFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: AttemptState::Pending,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: AttemptEvent) -> Result<AttemptState, String> {
        let new_state = match (&self.state, &event) {
            (AttemptState::Pending, AttemptEvent::Start) => AttemptState::InProgress,
            // Validation failures end an attempt before anything is sent
            (AttemptState::Pending, AttemptEvent::Fail(err)) => {
                self.error = Some(err.clone());
                AttemptState::Failed
            }
            (AttemptState::InProgress, AttemptEvent::Succeed) => AttemptState::Success,
            (AttemptState::InProgress, AttemptEvent::Fail(err)) => {
                self.error = Some(err.clone());
                AttemptState::Failed
            }

            // Terminal states are immutable
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for AttemptFsm {
    fn default() -> Self {
        Self::new()
    }
}
