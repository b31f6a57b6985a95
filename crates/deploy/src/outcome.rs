//! Deployment outcomes.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Lifecycle status of a deployment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Deployed,
    Failed,
    Cancelled,
}

impl DeploymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DeploymentStatus::Pending)
    }
}

/// The result of one deployment attempt.
///
/// Starts out [`DeploymentStatus::Pending`] and moves to a terminal status at
/// most once. Later transitions are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOutcome {
    pub status: DeploymentStatus,
    pub contract_id: Option<String>,
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub explorer_links: Vec<String>,
    pub error_message: Option<String>,
}

impl Default for DeploymentOutcome {
    fn default() -> Self {
        Self::pending()
    }
}

impl DeploymentOutcome {
    pub fn pending() -> Self {
        Self {
            status: DeploymentStatus::Pending,
            contract_id: None,
            transaction_id: None,
            explorer_links: Vec::new(),
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record a successful deployment. Returns false if the outcome was already terminal.
    pub fn mark_deployed(
        &mut self,
        contract_id: impl Into<String>,
        transaction_id: impl Into<String>,
        explorer_links: Vec<String>,
    ) -> bool {
        if !self.begin_transition(DeploymentStatus::Deployed) {
            return false;
        }
        self.contract_id = Some(contract_id.into());
        self.transaction_id = Some(transaction_id.into());
        self.explorer_links = explorer_links;
        true
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) -> bool {
        if !self.begin_transition(DeploymentStatus::Failed) {
            return false;
        }
        self.error_message = Some(message.into());
        true
    }

    pub fn mark_cancelled(&mut self) -> bool {
        self.begin_transition(DeploymentStatus::Cancelled)
    }

    fn begin_transition(&mut self, to: DeploymentStatus) -> bool {
        if self.is_terminal() {
            tracing::warn!(
                from = %self.status,
                to = %to,
                "Ignoring transition of a terminal outcome"
            );
            return false;
        }
        self.status = to;
        true
    }
}

/// The outcome of the latest attempt, shared with work that outlives the call
/// that started it.
///
/// Each [`SharedOutcome::begin`] opens a new attempt. Updates carry the
/// attempt they belong to and are ignored once a newer attempt has begun.
#[derive(Debug, Clone, Default)]
pub struct SharedOutcome {
    inner: Arc<Mutex<Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    attempt: u64,
    outcome: Option<DeploymentOutcome>,
}

impl SharedOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new attempt with a pending outcome and return its id.
    pub fn begin(&self) -> u64 {
        let mut slot = self.guard();
        slot.attempt += 1;
        slot.outcome = Some(DeploymentOutcome::pending());
        slot.attempt
    }

    /// Id of the current attempt.
    pub fn attempt(&self) -> u64 {
        self.guard().attempt
    }

    pub fn get(&self) -> Option<DeploymentOutcome> {
        self.guard().outcome.clone()
    }

    /// Replace the outcome of `attempt` with `outcome`.
    ///
    /// Does nothing for a stale attempt or when the stored outcome is already
    /// terminal. Returns whether the outcome was replaced.
    pub fn settle(&self, attempt: u64, outcome: DeploymentOutcome) -> bool {
        let mut slot = self.guard();
        if slot.attempt != attempt {
            tracing::debug!(attempt, current = slot.attempt, "Ignoring outcome of a stale attempt");
            return false;
        }
        match &slot.outcome {
            Some(current) if current.is_terminal() => {
                tracing::debug!(status = %current.status, "Outcome already settled");
                false
            }
            _ => {
                slot.outcome = Some(outcome);
                true
            }
        }
    }

    fn guard(&self) -> MutexGuard<'_, Slot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_by_default() {
        let outcome = DeploymentOutcome::default();
        assert_eq!(outcome.status, DeploymentStatus::Pending);
        assert!(!outcome.is_terminal());
    }

    #[test]
    fn test_terminal_outcome_is_never_resurrected() {
        let mut outcome = DeploymentOutcome::pending();
        assert!(outcome.mark_cancelled());
        assert!(!outcome.mark_deployed("foo.testnet", "abc", vec![]));
        assert!(!outcome.mark_failed("late failure"));

        assert_eq!(outcome.status, DeploymentStatus::Cancelled);
        assert!(outcome.contract_id.is_none());
        assert!(outcome.error_message.is_none());
    }

    #[test]
    fn test_mark_deployed_records_fields() {
        let mut outcome = DeploymentOutcome::pending();
        assert!(outcome.mark_deployed(
            "foo.testnet",
            "abc123",
            vec!["https://testnet.nearblocks.io/txns/abc123".to_string()]
        ));
        assert_eq!(outcome.contract_id.as_deref(), Some("foo.testnet"));
        assert_eq!(outcome.transaction_id.as_deref(), Some("abc123"));
        assert_eq!(outcome.explorer_links.len(), 1);
    }

    #[test]
    fn test_shared_outcome_keeps_first_terminal_status() {
        let shared = SharedOutcome::new();
        let attempt = shared.begin();

        let mut deployed = DeploymentOutcome::pending();
        deployed.mark_deployed("foo.testnet", "late123", vec![]);
        assert!(shared.settle(attempt, deployed.clone()));

        // A pending result reported afterwards must not hide the late receipt.
        assert!(!shared.settle(attempt, DeploymentOutcome::pending()));
        assert_eq!(shared.get(), Some(deployed));
    }

    #[test]
    fn test_shared_outcome_ignores_stale_attempt() {
        let shared = SharedOutcome::new();
        let first = shared.begin();
        let second = shared.begin();

        let mut cancelled = DeploymentOutcome::pending();
        cancelled.mark_cancelled();
        assert!(!shared.settle(first, cancelled));
        assert_eq!(shared.attempt(), second);
        assert_eq!(shared.get().map(|o| o.status), Some(DeploymentStatus::Pending));
    }
}
