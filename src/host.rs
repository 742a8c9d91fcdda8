//! Host window visibility contract.
//!
//! The engine consults visibility at enqueue time and asks the host to
//! re-hide itself after a successful background-triggered upload.

pub trait HostWindow: Send + Sync {
    fn is_visible(&self) -> bool;

    /// Ask the host to return to its tray/background state
    fn minimize_to_background(&self);
}

/// Host adapter for headless contexts; always visible, minimize is a no-op
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl HostWindow for NullHost {
    fn is_visible(&self) -> bool {
        true
    }

    fn minimize_to_background(&self) {}
}
