//! Redirect reconciliation.
//!
//! A wallet that finishes signing in a separate page sends the user back to
//! wherever the deployment started, with `transactionHashes` appended to the
//! URL. The reconciler notices that, replaces the entry with the canonical
//! success URL and publishes the resolved reference.
//!
//! Change detection has two sources: a poll of the current location and the
//! history's navigation events. Either one alone is enough.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use url::Url;

use crate::DeployConfig;
use crate::history::{
    BrowserHistory, canonical_success_url, is_success_view, transaction_reference,
};

/// Lower bound on the poll period; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Watches the location for new transaction references.
pub struct UrlObserver {
    history: Arc<dyn BrowserHistory>,
    poll: Interval,
    events: Option<broadcast::Receiver<Url>>,
    last_reference: Option<String>,
}

impl UrlObserver {
    /// Observe `history`, polling every `poll_interval`. The first poll fires immediately.
    pub fn new(history: Arc<dyn BrowserHistory>, poll_interval: Duration) -> Self {
        let mut poll = tokio::time::interval(poll_interval.max(MIN_POLL_INTERVAL));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let events = Some(history.subscribe());

        Self {
            history,
            poll,
            events,
            last_reference: None,
        }
    }

    /// Wait until the location carries a reference that has not been reported yet.
    ///
    /// Cancel safe.
    pub async fn next_reference(&mut self) -> String {
        loop {
            tokio::select! {
                _ = self.poll.tick() => {}
                event = next_event(&mut self.events) => match event {
                    Ok(url) => tracing::trace!(url = %url, "Navigation event"),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(
                            skipped,
                            "Navigation events lagged; reading current location"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("Navigation events closed; falling back to polling");
                        self.events = None;
                    }
                },
            }

            if let Some(reference) = self.check() {
                return reference;
            }
        }
    }

    /// Inspect the current location once.
    ///
    /// Returns the reference only the first time it is seen.
    pub fn check(&mut self) -> Option<String> {
        let reference = transaction_reference(&self.history.location())?;
        if self.last_reference.as_deref() == Some(reference.as_str()) {
            return None;
        }
        self.last_reference = Some(reference.clone());
        Some(reference)
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<Url>>,
) -> Result<Url, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Observable state of the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilerState {
    Idle,
    /// A reference was seen and the location is being rewritten.
    Resolving { reference: String },
    /// The location now points at the success view for `reference`.
    Resolved { reference: String, url: Url },
}

/// Moves wallet return URLs onto the success view.
///
/// One instance per process; share it behind an [`Arc`].
pub struct RedirectReconciler {
    history: Arc<dyn BrowserHistory>,
    success_path: String,
    poll_interval: Duration,
    state: watch::Sender<ReconcilerState>,
}

impl RedirectReconciler {
    pub fn new(history: Arc<dyn BrowserHistory>, config: &DeployConfig) -> Self {
        let (state, _) = watch::channel(ReconcilerState::Idle);
        Self {
            history,
            success_path: config.success_path.clone(),
            poll_interval: config.poll_interval(),
            state,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReconcilerState {
        self.state.borrow().clone()
    }

    /// Receive state changes.
    pub fn subscribe(&self) -> watch::Receiver<ReconcilerState> {
        self.state.subscribe()
    }

    /// Reconcile the current location once.
    pub fn reconcile_current(&self) -> Option<Url> {
        let reference = transaction_reference(&self.history.location())?;
        self.reconcile(&reference)
    }

    /// Rewrite the location to the success view for `reference`.
    ///
    /// Does nothing when the location already is the success view, so calling
    /// it repeatedly produces at most one rewrite. Returns the new URL when a
    /// rewrite happened.
    pub fn reconcile(&self, reference: &str) -> Option<Url> {
        let current = self.history.location();
        if is_success_view(&current, &self.success_path) {
            tracing::trace!(url = %current, "Already on the success view");
            return None;
        }

        self.state.send_replace(ReconcilerState::Resolving {
            reference: reference.to_string(),
        });

        let url = canonical_success_url(&current, &self.success_path, reference);
        self.history.replace_state(url.clone());
        tracing::info!(reference = %reference, url = %url, "Wallet redirect reconciled");

        self.state.send_replace(ReconcilerState::Resolved {
            reference: reference.to_string(),
            url: url.clone(),
        });
        Some(url)
    }

    /// Start watching the location in a background task.
    ///
    /// The first check runs immediately, so a page loaded straight from a
    /// wallet return URL is handled without waiting for the poll period.
    pub fn start(self: &Arc<Self>) -> ReconcilerHandle {
        let reconciler = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        // Subscribe before spawning so no navigation between here and the first poll is lost.
        let mut observer = UrlObserver::new(Arc::clone(&self.history), self.poll_interval);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    reference = observer.next_reference() => {
                        reconciler.reconcile(&reference);
                    }
                }
            }

            tracing::trace!("Redirect reconciler stopped");
        });

        tracing::debug!(poll_interval = ?self.poll_interval, "Redirect reconciler started");

        ReconcilerHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Running reconciler task. Dropping the handle aborts the task.
pub struct ReconcilerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    /// Stop watching and wait for the task to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Redirect reconciler task ended abnormally");
        }
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
