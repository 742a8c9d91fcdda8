//! Duplicate-reconciliation decision plumbing.
//!
//! When the existence check reports a match, the pipeline parks on a
//! one-shot decision that presentation resolves from any of its input
//! channels (button click, dismiss, global cancel shortcut). First
//! resolution wins; everything non-affirmative maps to Cancel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateDecision {
    /// Reuse the existing backend record and upload anyway
    Continue,
    /// Abandon this attempt
    Cancel,
}

/// Resolver side of one pending prompt. Cloneable so several input
/// channels can race; only the first `resolve` call sends.
#[derive(Debug, Clone)]
pub struct DecisionHandle {
    tx: Arc<Mutex<Option<oneshot::Sender<DuplicateDecision>>>>,
}

impl DecisionHandle {
    fn new() -> (Self, oneshot::Receiver<DuplicateDecision>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Returns true if this call won the race and delivered the decision
    pub fn resolve(&self, decision: DuplicateDecision) -> bool {
        let sender = self.tx.lock().ok().and_then(|mut tx| tx.take());
        match sender {
            Some(tx) => tx.send(decision).is_ok(),
            None => false,
        }
    }
}

/// Registry of prompts awaiting an operator decision, keyed by item id
#[derive(Debug, Clone, Default)]
pub struct PendingPrompts {
    inner: Arc<Mutex<HashMap<u64, DecisionHandle>>>,
}

impl PendingPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt for an item; the pipeline awaits the returned
    /// receiver. A dropped receiver-less prompt resolves to Cancel on the
    /// await side.
    pub fn register(&self, item_id: u64) -> oneshot::Receiver<DuplicateDecision> {
        let (handle, rx) = DecisionHandle::new();
        if let Ok(mut prompts) = self.inner.lock() {
            prompts.insert(item_id, handle);
        }
        rx
    }

    /// Resolve one prompt; false when no prompt is pending for the item
    pub fn resolve(&self, item_id: u64, decision: DuplicateDecision) -> bool {
        let handle = self
            .inner
            .lock()
            .ok()
            .and_then(|mut prompts| prompts.remove(&item_id));
        match handle {
            Some(handle) => handle.resolve(decision),
            None => false,
        }
    }

    /// Global close-popups shortcut: resolve every pending prompt to
    /// Cancel. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<DecisionHandle> = match self.inner.lock() {
            Ok(mut prompts) => prompts.drain().map(|(_, handle)| handle).collect(),
            Err(_) => return 0,
        };

        let mut cancelled = 0;
        for handle in drained {
            if handle.resolve(DuplicateDecision::Cancel) {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Drop the registry entry once the pipeline has its decision
    pub fn discard(&self, item_id: u64) {
        if let Ok(mut prompts) = self.inner.lock() {
            prompts.remove(&item_id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|prompts| prompts.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_continue() {
        let prompts = PendingPrompts::new();
        let rx = prompts.register(1);

        assert!(prompts.resolve(1, DuplicateDecision::Continue));
        assert_eq!(rx.await.unwrap(), DuplicateDecision::Continue);
        assert!(prompts.is_empty());
    }

    #[tokio::test]
    async fn test_first_resolution_wins() {
        let prompts = PendingPrompts::new();
        let rx = prompts.register(1);

        assert!(prompts.resolve(1, DuplicateDecision::Cancel));
        // Second channel fires after the prompt is gone
        assert!(!prompts.resolve(1, DuplicateDecision::Continue));

        assert_eq!(rx.await.unwrap(), DuplicateDecision::Cancel);
    }

    #[tokio::test]
    async fn test_dropped_prompt_reads_as_cancel() {
        let prompts = PendingPrompts::new();
        let rx = prompts.register(1);
        prompts.discard(1);

        // The await side maps a closed channel to Cancel
        let decision = rx.await.unwrap_or(DuplicateDecision::Cancel);
        assert_eq!(decision, DuplicateDecision::Cancel);
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let prompts = PendingPrompts::new();
        let rx1 = prompts.register(1);
        let rx2 = prompts.register(2);

        assert_eq!(prompts.cancel_all(), 2);
        assert!(prompts.is_empty());
        assert_eq!(rx1.await.unwrap(), DuplicateDecision::Cancel);
        assert_eq!(rx2.await.unwrap(), DuplicateDecision::Cancel);
    }

    #[test]
    fn test_resolve_unknown_item() {
        let prompts = PendingPrompts::new();
        assert!(!prompts.resolve(42, DuplicateDecision::Continue));
        assert_eq!(prompts.cancel_all(), 0);
    }
}
