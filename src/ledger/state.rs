//! Lifecycle of a single issuance attempt
//!
//! ```text
//! Idle -> Connecting -> WalletReady -> Submitting -> Confirmed
//!                    |              |             -> Reverted
//!                    |              |             -> TimedOut
//!                    |              |             -> Failed
//!                    -> ReadOnlyReady
//!                    -> Unavailable
//! ```
//!
//! `ReadOnlyReady` can never reach `Submitting`. Every state without an
//! outgoing edge ends the attempt; the caller starts over from `Idle`.
use crate::error::{AnchorError, AnchorResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssuanceState {
    Idle,
    Connecting,
    WalletReady,
    ReadOnlyReady,
    Unavailable,
    Submitting,
    Confirmed,
    Reverted,
    TimedOut,
    /// The ledger refused the transaction before inclusion
    Failed,
}

impl IssuanceState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::WalletReady => "WalletReady",
            Self::ReadOnlyReady => "ReadOnlyReady",
            Self::Unavailable => "Unavailable",
            Self::Submitting => "Submitting",
            Self::Confirmed => "Confirmed",
            Self::Reverted => "Reverted",
            Self::TimedOut => "TimedOut",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ReadOnlyReady
                | Self::Unavailable
                | Self::Confirmed
                | Self::Reverted
                | Self::TimedOut
                | Self::Failed
        )
    }

    pub fn can_transition_to(&self, next: IssuanceState) -> bool {
        use IssuanceState::*;

        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, WalletReady)
                | (Connecting, ReadOnlyReady)
                | (Connecting, Unavailable)
                | (WalletReady, Submitting)
                | (Submitting, Confirmed)
                | (Submitting, Reverted)
                | (Submitting, TimedOut)
                | (Submitting, Failed)
        )
    }

    pub fn transition(self, next: IssuanceState) -> AnchorResult<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AnchorError::InvalidStateTransition(format!(
                "Cannot move from {} to {}",
                self.name(),
                next.name()
            )))
        }
    }
}

impl Default for IssuanceState {
    fn default() -> Self {
        Self::Idle
    }
}

/// An issuance attempt and every state it has visited
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuanceAttempt {
    state: IssuanceState,
    history: Vec<IssuanceState>,
}

impl IssuanceAttempt {
    pub fn new() -> Self {
        Self {
            state: IssuanceState::Idle,
            history: vec![IssuanceState::Idle],
        }
    }

    pub fn state(&self) -> IssuanceState {
        self.state
    }

    pub fn history(&self) -> &[IssuanceState] {
        &self.history
    }

    pub fn advance(&mut self, next: IssuanceState) -> AnchorResult<IssuanceState> {
        self.state = self.state.transition(next)?;
        self.history.push(next);
        tracing::debug!(state = next.name(), "issuance state changed");
        Ok(self.state)
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

impl Default for IssuanceAttempt {
    fn default() -> Self {
        Self::new()
    }
}
