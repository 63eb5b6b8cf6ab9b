//! Connection state machine types
//!
//! Tracks a connection from construction to termination, and how much of its
//! reconnect budget has been consumed.

use std::fmt;

use serde::Serialize;

use crate::config::ReconnectPolicy;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// Constructed, `run` not called yet
    Idle,
    /// Binding/accepting (host) or dialing (client)
    Establishing,
    /// Link established, payloads flowing
    Active,
    /// Waiting out the reconnect interval after a failure
    Reconnecting,
    /// Releasing the listener and link
    Draining,
    /// Terminal
    Closed,
}

impl ConnectionState {
    /// Whether the connection has reached its terminal state
    pub fn is_closed(&self) -> bool {
        *self == ConnectionState::Closed
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Establishing => "establishing",
            ConnectionState::Active => "active",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Draining => "draining",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consecutive reconnect attempts allowed by a [`ReconnectPolicy`]
#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: ReconnectPolicy,
    used: u32,
}

impl RetryBudget {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, used: 0 }
    }

    /// Take one attempt from the budget; false once it is exhausted
    pub fn try_consume(&mut self) -> bool {
        match self.policy {
            ReconnectPolicy::Unlimited => {
                self.used = self.used.saturating_add(1);
                true
            }
            ReconnectPolicy::Bounded(max) if self.used < max => {
                self.used += 1;
                true
            }
            ReconnectPolicy::Bounded(_) => false,
        }
    }

    /// Restore the full budget after a successful establishment
    pub fn reset(&mut self) {
        self.used = 0;
    }

    /// Attempts consumed since the last reset
    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_budget() {
        let mut budget = RetryBudget::new(ReconnectPolicy::Bounded(3));

        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert_eq!(budget.used(), 3);

        budget.reset();
        assert_eq!(budget.used(), 0);
        assert!(budget.try_consume());
    }

    #[test]
    fn test_unlimited_budget() {
        let mut budget = RetryBudget::new(ReconnectPolicy::Unlimited);

        for _ in 0..10_000 {
            assert!(budget.try_consume());
        }
        assert_eq!(budget.used(), 10_000);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert!(ConnectionState::Closed.is_closed());
        assert!(!ConnectionState::Draining.is_closed());
    }
}
