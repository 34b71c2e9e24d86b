//! warden Engine
//!
//! Request interception for the warden policy engine.
//!
//! Features:
//! - Synchronous should-load decisions on the interception hot path
//! - Per-document allowed/rejected request ledgers
//! - Provenance tracking for user-initiated navigations and redirects
//! - Observer fan-out for allow/block events

pub mod ledger;
pub mod observer;
pub mod processor;
pub mod provenance;

pub use ledger::{DocumentId, RequestLedger, RequestRecord};
pub use observer::{ObserverRegistry, RequestObserver};
pub use processor::{LoadKind, RequestContext, RequestProcessor};
pub use provenance::{ProvenanceKind, ProvenanceLink, ProvenanceTracker};

pub use warden_policy::{
    Decision, PolicyConfig, PolicyManager, RuleStore, SubscriptionEntry, Verdict,
};
