//! warden Policy
//!
//! Allow/deny rules for cross-site requests.
//!
//! Features:
//! - Rules at three granularities: origin, destination, origin-to-destination
//! - Temporary (session) and persistent rule tiers
//! - Deny-wins evaluation with pair > destination > origin precedence
//! - Subscription rule import with per-source tagging
//! - Atomic-replace persistence of rules and default policy

pub mod policy;
pub mod rules;
pub mod store;

pub use policy::{DecidedBy, Decision, PolicyConfig, PolicyManager, SubscriptionEntry, Verdict};
pub use rules::{Lifetime, Polarity, Rule, RuleSet, RuleShape, RuleSource};
pub use store::{RuleStore, StoredPolicy};

/// Policy error
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to persist rules: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("failed to encode rules: {0}")]
    Encode(#[from] serde_json::Error),
}
