//! Request observers
//!
//! Fan-out of allow/block events to registered windows. Observers are
//! notified synchronously in registration order; a panicking observer is
//! logged and skipped, never affecting the verdict or other observers.

use std::panic::{catch_unwind, AssertUnwindSafe};

/// Receiver of request events. One per open browser window; every
/// observer sees every event and filters by window itself.
pub trait RequestObserver {
    fn allowed_request(&mut self, origin: &str, dest: &str) {
        let _ = (origin, dest);
    }

    fn blocked_request(&mut self, origin: &str, dest: &str) {
        let _ = (origin, dest);
    }

    /// A whole top-level document load was blocked.
    fn blocked_top_level_document(&mut self, origin: &str, dest: &str) {
        let _ = (origin, dest);
    }

    /// A redirect following a user's link click was blocked:
    /// the user clicked `link_dest` on `source_page`, and the landing page
    /// tried to redirect to `blocked_redirect`.
    fn blocked_link_click_redirect(
        &mut self,
        source_page: &str,
        link_dest: &str,
        blocked_redirect: &str,
    ) {
        let _ = (source_page, link_dest, blocked_redirect);
    }
}

/// Observers keyed by a stable window id, iterated in registration order.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<(u64, Box<dyn RequestObserver>)>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer under a window id, replacing any previous
    /// observer for that id (keeping its position).
    pub fn add(&mut self, id: u64, observer: Box<dyn RequestObserver>) {
        match self.observers.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = observer,
            None => self.observers.push((id, observer)),
        }
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Notify every observer, containing panics per observer.
    pub fn notify(&mut self, mut event: impl FnMut(&mut dyn RequestObserver)) {
        for (id, observer) in &mut self.observers {
            let result = catch_unwind(AssertUnwindSafe(|| event(observer.as_mut())));
            if result.is_err() {
                tracing::warn!(window = *id, "request observer panicked; skipping");
            }
        }
    }
}
