//! Request processor
//!
//! The interception entry point: normalizes origin and destination,
//! consults provenance for redirect justification, asks the policy
//! manager for a verdict, records the outcome, and fans out to
//! observers — all synchronously, since the host blocks the network
//! fetch on the returned decision.

use std::collections::HashMap;
use std::time::SystemTime;

use warden_policy::{Decision, PolicyManager, Verdict};
use warden_uri::{identifier, identifier_or_internal, is_uninterceptable, UriError};

use crate::ledger::{DocumentId, RequestLedger, RequestRecord};
use crate::observer::{ObserverRegistry, RequestObserver};
use crate::provenance::ProvenanceTracker;

/// What kind of load a candidate request is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    TopLevelDocument,
    SubFrame,
    SubResource,
    /// Server redirect or meta-refresh away from `origin`.
    Redirect,
}

/// Host-supplied context for one candidate request.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    /// The top-level document the request belongs to.
    pub document: DocumentId,
    pub kind: LoadKind,
}

impl RequestContext {
    pub fn new(document: DocumentId, kind: LoadKind) -> Self {
        Self { document, kind }
    }

    /// Provenance links justify navigations and redirects, never plain
    /// sub-resource loads.
    fn is_navigation(&self) -> bool {
        matches!(self.kind, LoadKind::TopLevelDocument | LoadKind::Redirect)
    }
}

/// The engine root. The host serializes access (one coarse lock around
/// the whole processor); every method here is short, allocation-light
/// and never does I/O on the decision path.
#[derive(Default)]
pub struct RequestProcessor {
    policy: PolicyManager,
    provenance: ProvenanceTracker,
    ledgers: HashMap<DocumentId, RequestLedger>,
    observers: ObserverRegistry,
    /// Session toggle: when set, everything is allowed and nothing is
    /// recorded or observed.
    permissive: bool,
}

impl RequestProcessor {
    pub fn new(policy: PolicyManager) -> Self {
        Self { policy, ..Self::default() }
    }

    /// Decide whether a candidate request may proceed.
    ///
    /// Called synchronously by the host's interception hook; the decision
    /// is final for this request (later rule changes apply only to
    /// subsequent calls).
    pub fn should_load(
        &mut self,
        origin_uri: &str,
        dest_uri: &str,
        ctx: &RequestContext,
    ) -> Decision {
        if self.permissive {
            return Decision::Allow;
        }

        // javascript: destinations are never intercepted: the platform
        // will not run them as a network request when blocked.
        if is_uninterceptable(dest_uri) {
            return Decision::Allow;
        }

        let granularity = self.policy.granularity();

        // Fail closed on an unparsable destination. It has no identifier
        // to ledger under, but observers still hear about the block.
        let dest_id = match identifier(dest_uri, granularity) {
            Ok(id) => id,
            Err(UriError::Malformed(_)) => {
                tracing::warn!(dest = dest_uri, "denying malformed destination URI");
                self.observers.notify(|obs| obs.blocked_request(origin_uri, dest_uri));
                if ctx.kind == LoadKind::TopLevelDocument {
                    self.observers
                        .notify(|obs| obs.blocked_top_level_document(origin_uri, dest_uri));
                }
                return Decision::Deny;
            }
        };

        // Internal browser pages produce unparsable origins; they map to
        // a sentinel the default policy can target.
        let origin_id = identifier_or_internal(origin_uri, granularity);

        // A user action (click, form submit, history nav) or an explicit
        // allow of this redirect overrides rule evaluation.
        if ctx.is_navigation() && self.provenance.is_allowed_redirect(origin_uri, dest_uri) {
            tracing::debug!(origin = origin_uri, dest = dest_uri, "allowed by provenance link");
            self.record(origin_uri, dest_uri, origin_id, dest_id, true, false, ctx);
            return Decision::Allow;
        }

        let verdict = self.policy.evaluate(&origin_id, &dest_id);
        let allowed = verdict.is_allow();
        if !allowed {
            tracing::debug!(origin = origin_uri, dest = dest_uri, "blocked request");
        }

        self.record(origin_uri, dest_uri, origin_id, dest_id, allowed, verdict.from_blacklist(), ctx);
        verdict.decision
    }

    /// Evaluate a pair for UI preview without recording anything.
    pub fn preview(&self, origin_uri: &str, dest_uri: &str) -> Result<Verdict, UriError> {
        let granularity = self.policy.granularity();
        let dest_id = identifier(dest_uri, granularity)?;
        let origin_id = identifier_or_internal(origin_uri, granularity);
        Ok(self.policy.evaluate(&origin_id, &dest_id))
    }

    // === Document lifecycle ===

    /// A new top-level navigation replaced the document: the old ledger
    /// is discarded wholesale so stale blocked counts cannot leak into
    /// the new page.
    pub fn begin_navigation(&mut self, document: DocumentId) {
        self.ledgers.insert(document, RequestLedger::new());
    }

    /// The document (tab) went away entirely.
    pub fn close_document(&mut self, document: DocumentId) {
        self.ledgers.remove(&document);
    }

    /// Ledger view for one document, if any requests were intercepted.
    pub fn requests_in_document(&self, document: DocumentId) -> Option<&RequestLedger> {
        self.ledgers.get(&document)
    }

    // === Observers ===

    pub fn add_request_observer(&mut self, window: u64, observer: Box<dyn RequestObserver>) {
        self.observers.add(window, observer);
    }

    pub fn remove_request_observer(&mut self, window: u64) -> bool {
        self.observers.remove(window)
    }

    // === Provenance registration (called by host integration) ===

    pub fn register_link_clicked(&mut self, source: &str, dest: &str) {
        self.provenance.register_link_clicked(source, dest);
    }

    pub fn register_form_submitted(&mut self, source: &str, dest: &str) {
        self.provenance.register_form_submitted(source, dest);
    }

    pub fn register_history_request(&mut self, uri: &str) {
        self.provenance.register_history_request(uri);
    }

    pub fn register_allowed_redirect(&mut self, source: &str, dest: &str) {
        self.provenance.register_allowed_redirect(source, dest);
    }

    // === Session toggles ===

    /// Disable blocking for the session. Applies to subsequent calls;
    /// verdicts already returned stand.
    pub fn set_permissive(&mut self, permissive: bool) {
        if self.permissive != permissive {
            tracing::info!(permissive, "blocking mode changed");
        }
        self.permissive = permissive;
    }

    pub fn is_permissive(&self) -> bool {
        self.permissive
    }

    /// Drop all temporary rules; returns whether any existed, so the
    /// caller knows whether open pages should be re-derived.
    pub fn revoke_temporary_rules(&mut self) -> bool {
        self.policy.revoke_temporary_rules()
    }

    pub fn policy(&self) -> &PolicyManager {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut PolicyManager {
        &mut self.policy
    }

    fn record(
        &mut self,
        origin_uri: &str,
        dest_uri: &str,
        origin_id: warden_uri::Identifier,
        dest_id: warden_uri::Identifier,
        allowed: bool,
        from_blacklist: bool,
        ctx: &RequestContext,
    ) {
        self.ledgers.entry(ctx.document).or_default().record(RequestRecord {
            origin_uri: origin_uri.to_string(),
            dest_uri: dest_uri.to_string(),
            origin_id,
            dest_id,
            allowed,
            from_blacklist,
            time: SystemTime::now(),
        });

        if allowed {
            self.observers.notify(|obs| obs.allowed_request(origin_uri, dest_uri));
            return;
        }

        self.observers.notify(|obs| obs.blocked_request(origin_uri, dest_uri));
        if ctx.kind == LoadKind::TopLevelDocument {
            self.observers.notify(|obs| obs.blocked_top_level_document(origin_uri, dest_uri));
        }
        if ctx.kind == LoadKind::Redirect {
            // Attribute the blocked redirect to the page whose link the
            // user clicked, when the chain started from one.
            if let Some(source_page) = self.provenance.link_source_for(origin_uri) {
                let source_page = source_page.to_string();
                self.observers.notify(|obs| {
                    obs.blocked_link_click_redirect(&source_page, origin_uri, dest_uri)
                });
            }
        }
    }
}
