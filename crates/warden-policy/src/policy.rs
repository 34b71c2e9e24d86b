//! Policy evaluation
//!
//! Owns the persistent and temporary rule tiers plus the default policy,
//! and answers the single decision query the request processor asks.

use serde::{Deserialize, Serialize};
use warden_uri::{Granularity, Identifier};

use crate::rules::{Lifetime, Polarity, Rule, RuleSet, RuleShape, RuleSource};
use crate::store::RuleStore;

/// Default policy and identity settings. Mutated only through
/// `PolicyManager::set_config`, which also schedules a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Verdict when no rule matches.
    pub allow_by_default: bool,
    /// Allow requests whose origin and destination share a base domain
    /// even under default-deny.
    pub allow_same_domain_by_default: bool,
    /// Granularity at which request identity is computed.
    pub granularity: Granularity,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allow_by_default: false,
            allow_same_domain_by_default: true,
            granularity: Granularity::BaseDomain,
        }
    }
}

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// What decided a verdict, kept for display and for the ledger's
/// blacklist flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecidedBy {
    Rule(Rule),
    SameOrigin,
    DefaultPolicy,
}

/// The outcome of evaluating one origin/destination pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub decided_by: DecidedBy,
}

impl Verdict {
    pub fn is_allow(&self) -> bool {
        self.decision == Decision::Allow
    }

    /// The deciding rule came from a blacklist subscription rather than
    /// a user choice.
    pub fn from_blacklist(&self) -> bool {
        matches!(&self.decided_by, DecidedBy::Rule(rule) if rule.source.is_blacklist())
    }

    fn rule(decision: Decision, rule: Rule) -> Self {
        Self { decision, decided_by: DecidedBy::Rule(rule) }
    }
}

/// One entry of an imported subscription list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    pub shape: RuleShape,
    pub polarity: Polarity,
}

/// Owns the rule tiers and the default policy; the single authority for
/// policy decisions and rule mutation.
#[derive(Debug, Default)]
pub struct PolicyManager {
    persistent: RuleSet,
    temporary: RuleSet,
    config: PolicyConfig,
    store: Option<RuleStore>,
}

impl PolicyManager {
    /// In-memory manager with default config; nothing is persisted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager backed by a rule store. Previously flushed rules and config
    /// are loaded eagerly; a missing or corrupt store file starts empty.
    pub fn with_store(store: RuleStore) -> Self {
        let stored = store.load();
        Self {
            persistent: RuleSet::from_rules(stored.rules),
            temporary: RuleSet::new(),
            config: stored.config,
            store: Some(store),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Replace the default policy; flushed immediately.
    pub fn set_config(&mut self, config: PolicyConfig) {
        if self.config != config {
            self.config = config;
            self.flush();
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.config.granularity
    }

    // === Decision query ===

    /// Evaluate one origin/destination pair against the current rules.
    ///
    /// Precedence: pair rules, then destination rules, then origin rules,
    /// then the default policy. Within each tier temporary and persistent
    /// rules count equally and deny beats allow. At the default tier a
    /// same-identifier (or, when configured, same-base-domain) request is
    /// allowed even under default-deny.
    ///
    /// Pure with respect to the current rules: no state is recorded.
    pub fn evaluate(&self, origin: &Identifier, dest: &Identifier) -> Verdict {
        type Lookup = fn(&RuleSet, &Identifier, &Identifier, Polarity) -> Option<Rule>;
        let tiers: [Lookup; 3] = [
            |set, o, d, pol| set.pair_rule(o, d, pol),
            |set, _, d, pol| set.destination_rule(d, pol),
            |set, o, _, pol| set.origin_rule(o, pol),
        ];

        for lookup in tiers {
            for polarity in [Polarity::Deny, Polarity::Allow] {
                let rule = lookup(&self.temporary, origin, dest, polarity)
                    .or_else(|| lookup(&self.persistent, origin, dest, polarity));
                if let Some(rule) = rule {
                    let decision = match polarity {
                        Polarity::Allow => Decision::Allow,
                        Polarity::Deny => Decision::Deny,
                    };
                    return Verdict::rule(decision, rule);
                }
            }
        }

        if origin == dest || (self.config.allow_same_domain_by_default && same_base(origin, dest)) {
            return Verdict { decision: Decision::Allow, decided_by: DecidedBy::SameOrigin };
        }

        let decision =
            if self.config.allow_by_default { Decision::Allow } else { Decision::Deny };
        Verdict { decision, decided_by: DecidedBy::DefaultPolicy }
    }

    // === Rule mutation ===

    pub fn allow_origin(&mut self, id: Identifier) -> bool {
        self.set_rule(RuleShape::Origin(id), Polarity::Allow, Lifetime::Persistent)
    }

    pub fn forbid_origin(&mut self, id: Identifier) -> bool {
        self.set_rule(RuleShape::Origin(id), Polarity::Deny, Lifetime::Persistent)
    }

    pub fn temporarily_allow_origin(&mut self, id: Identifier) -> bool {
        self.set_rule(RuleShape::Origin(id), Polarity::Allow, Lifetime::Temporary)
    }

    pub fn temporarily_forbid_origin(&mut self, id: Identifier) -> bool {
        self.set_rule(RuleShape::Origin(id), Polarity::Deny, Lifetime::Temporary)
    }

    pub fn allow_destination(&mut self, id: Identifier) -> bool {
        self.set_rule(RuleShape::Destination(id), Polarity::Allow, Lifetime::Persistent)
    }

    pub fn forbid_destination(&mut self, id: Identifier) -> bool {
        self.set_rule(RuleShape::Destination(id), Polarity::Deny, Lifetime::Persistent)
    }

    pub fn temporarily_allow_destination(&mut self, id: Identifier) -> bool {
        self.set_rule(RuleShape::Destination(id), Polarity::Allow, Lifetime::Temporary)
    }

    pub fn temporarily_forbid_destination(&mut self, id: Identifier) -> bool {
        self.set_rule(RuleShape::Destination(id), Polarity::Deny, Lifetime::Temporary)
    }

    pub fn allow_pair(&mut self, origin: Identifier, dest: Identifier) -> bool {
        self.set_rule(
            RuleShape::OriginToDestination(origin, dest),
            Polarity::Allow,
            Lifetime::Persistent,
        )
    }

    pub fn forbid_pair(&mut self, origin: Identifier, dest: Identifier) -> bool {
        self.set_rule(
            RuleShape::OriginToDestination(origin, dest),
            Polarity::Deny,
            Lifetime::Persistent,
        )
    }

    pub fn temporarily_allow_pair(&mut self, origin: Identifier, dest: Identifier) -> bool {
        self.set_rule(
            RuleShape::OriginToDestination(origin, dest),
            Polarity::Allow,
            Lifetime::Temporary,
        )
    }

    pub fn temporarily_forbid_pair(&mut self, origin: Identifier, dest: Identifier) -> bool {
        self.set_rule(
            RuleShape::OriginToDestination(origin, dest),
            Polarity::Deny,
            Lifetime::Temporary,
        )
    }

    /// Remove a rule of the given shape and polarity from one tier.
    pub fn remove_rule(
        &mut self,
        shape: &RuleShape,
        polarity: Polarity,
        lifetime: Lifetime,
    ) -> bool {
        let removed = self.tier_mut(lifetime).remove(shape, polarity);
        if removed && lifetime == Lifetime::Persistent {
            self.flush();
        }
        removed
    }

    /// Drop the whole temporary tier. Returns whether any rule existed,
    /// so callers know whether open pages need re-evaluation.
    pub fn revoke_temporary_rules(&mut self) -> bool {
        let had = self.temporary.clear();
        if had {
            tracing::debug!("revoked all temporary rules");
        }
        had
    }

    // === Subscriptions ===

    /// Import a subscription's rules, replacing any prior import under the
    /// same name. Subscription rules live in the persistent tier.
    pub fn import_subscription(
        &mut self,
        name: &str,
        entries: impl IntoIterator<Item = SubscriptionEntry>,
        blacklist: bool,
    ) -> usize {
        self.persistent.remove_subscription(name);
        let source = RuleSource::Subscription { name: name.to_string(), blacklist };
        let mut imported = 0;
        for entry in entries {
            if self.persistent.insert(Rule {
                shape: entry.shape,
                polarity: entry.polarity,
                source: source.clone(),
            }) {
                imported += 1;
            }
        }
        tracing::debug!(name, imported, "imported subscription rules");
        if imported > 0 {
            self.flush();
        }
        imported
    }

    /// Remove every rule the named subscription contributed.
    pub fn clear_subscription(&mut self, name: &str) -> bool {
        let removed = self.persistent.remove_subscription(name);
        if removed {
            self.flush();
        }
        removed
    }

    // === Introspection ===

    pub fn persistent_rules(&self) -> Vec<Rule> {
        self.persistent.to_rules()
    }

    pub fn temporary_rules(&self) -> Vec<Rule> {
        self.temporary.to_rules()
    }

    pub fn has_temporary_rules(&self) -> bool {
        !self.temporary.is_empty()
    }

    fn set_rule(&mut self, shape: RuleShape, polarity: Polarity, lifetime: Lifetime) -> bool {
        let changed = self.tier_mut(lifetime).insert(Rule {
            shape,
            polarity,
            source: RuleSource::User,
        });
        if changed && lifetime == Lifetime::Persistent {
            self.flush();
        }
        changed
    }

    fn tier_mut(&mut self, lifetime: Lifetime) -> &mut RuleSet {
        match lifetime {
            Lifetime::Temporary => &mut self.temporary,
            Lifetime::Persistent => &mut self.persistent,
        }
    }

    /// Fire-and-forget flush of the persistent tier. In-memory state stays
    /// authoritative on failure; the next mutation retries, since every
    /// flush writes the full state.
    fn flush(&self) {
        let Some(store) = &self.store else { return };
        if let Err(err) = store.flush(&self.config, &self.persistent) {
            tracing::warn!("rule flush failed, will retry on next mutation: {err}");
        }
    }
}

fn same_base(origin: &Identifier, dest: &Identifier) -> bool {
    match (origin.base(), dest.base()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
