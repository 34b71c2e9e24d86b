//! Rule storage
//!
//! Queryable allow/deny rules keyed by origin, destination, or both.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use warden_uri::Identifier;

/// Whether a rule permits or blocks matching requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Allow,
    Deny,
}

/// How long a rule lives. Temporary rules exist only in memory and are
/// dropped wholesale by `PolicyManager::revoke_temporary_rules`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Temporary,
    Persistent,
}

/// Who authored a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleSource {
    User,
    Subscription {
        name: String,
        /// Subscription is a blocklist rather than a user choice; surfaced
        /// in verdicts and ledger records so UI can label the block.
        blacklist: bool,
    },
}

impl RuleSource {
    pub fn is_blacklist(&self) -> bool {
        matches!(self, RuleSource::Subscription { blacklist: true, .. })
    }
}

/// What a rule matches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleShape {
    Origin(Identifier),
    Destination(Identifier),
    OriginToDestination(Identifier, Identifier),
}

/// A single allow/deny directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub shape: RuleShape,
    pub polarity: Polarity,
    pub source: RuleSource,
}

/// Per-key rule slot: at most one allow and one deny, identified by the
/// source that authored them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Slot {
    allow: Option<RuleSource>,
    deny: Option<RuleSource>,
}

impl Slot {
    fn get(&self, polarity: Polarity) -> &Option<RuleSource> {
        match polarity {
            Polarity::Allow => &self.allow,
            Polarity::Deny => &self.deny,
        }
    }

    fn get_mut(&mut self, polarity: Polarity) -> &mut Option<RuleSource> {
        match polarity {
            Polarity::Allow => &mut self.allow,
            Polarity::Deny => &mut self.deny,
        }
    }

    fn is_empty(&self) -> bool {
        self.allow.is_none() && self.deny.is_none()
    }

    fn len(&self) -> usize {
        usize::from(self.allow.is_some()) + usize::from(self.deny.is_some())
    }
}

/// One tier of rules (temporary or persistent) with O(1) point lookup
/// at each of the three granularities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    origins: HashMap<Identifier, Slot>,
    destinations: HashMap<Identifier, Slot>,
    pairs: HashMap<(Identifier, Identifier), Slot>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule. Duplicates are a no-op. A deny insert evicts any
    /// allow rule for the same key (an explicit forbid supersedes an
    /// explicit allow within a tier); an allow insert while a deny exists
    /// is a no-op for the same reason.
    ///
    /// Returns whether the set changed.
    pub fn insert(&mut self, rule: Rule) -> bool {
        let slot = self.slot_mut(&rule.shape);
        match rule.polarity {
            Polarity::Deny => {
                if slot.deny.is_some() {
                    return false;
                }
                slot.allow = None;
                slot.deny = Some(rule.source);
                true
            }
            Polarity::Allow => {
                if slot.allow.is_some() || slot.deny.is_some() {
                    return false;
                }
                slot.allow = Some(rule.source);
                true
            }
        }
    }

    /// Remove the rule with this shape and polarity, if present.
    pub fn remove(&mut self, shape: &RuleShape, polarity: Polarity) -> bool {
        let removed = match self.slot_opt_mut(shape) {
            Some(slot) => slot.get_mut(polarity).take().is_some(),
            None => false,
        };
        if removed {
            self.prune(shape);
        }
        removed
    }

    /// Drop every rule authored by the named subscription.
    pub fn remove_subscription(&mut self, name: &str) -> bool {
        let mut changed = sweep_source(&mut self.origins, name);
        changed |= sweep_source(&mut self.destinations, name);
        changed |= sweep_source(&mut self.pairs, name);
        changed
    }

    pub fn clear(&mut self) -> bool {
        let had = !self.is_empty();
        self.origins.clear();
        self.destinations.clear();
        self.pairs.clear();
        had
    }

    pub fn origin_rule(&self, id: &Identifier, polarity: Polarity) -> Option<Rule> {
        Self::rule_from(self.origins.get(id), RuleShape::Origin(id.clone()), polarity)
    }

    pub fn destination_rule(&self, id: &Identifier, polarity: Polarity) -> Option<Rule> {
        Self::rule_from(self.destinations.get(id), RuleShape::Destination(id.clone()), polarity)
    }

    pub fn pair_rule(
        &self,
        origin: &Identifier,
        dest: &Identifier,
        polarity: Polarity,
    ) -> Option<Rule> {
        Self::rule_from(
            self.pairs.get(&(origin.clone(), dest.clone())),
            RuleShape::OriginToDestination(origin.clone(), dest.clone()),
            polarity,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.origins.values().map(Slot::len).sum::<usize>()
            + self.destinations.values().map(Slot::len).sum::<usize>()
            + self.pairs.values().map(Slot::len).sum::<usize>()
    }

    /// Flatten to a rule list for persistence and display.
    pub fn to_rules(&self) -> Vec<Rule> {
        let mut rules = Vec::with_capacity(self.len());
        let mut push = |shape: RuleShape, slot: &Slot| {
            for (polarity, source) in
                [(Polarity::Allow, &slot.allow), (Polarity::Deny, &slot.deny)]
            {
                if let Some(source) = source {
                    rules.push(Rule { shape: shape.clone(), polarity, source: source.clone() });
                }
            }
        };
        for (id, slot) in &self.origins {
            push(RuleShape::Origin(id.clone()), slot);
        }
        for (id, slot) in &self.destinations {
            push(RuleShape::Destination(id.clone()), slot);
        }
        for ((o, d), slot) in &self.pairs {
            push(RuleShape::OriginToDestination(o.clone(), d.clone()), slot);
        }
        rules
    }

    /// Rebuild a set from a flat rule list.
    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut set = Self::new();
        for rule in rules {
            set.insert(rule);
        }
        set
    }

    fn rule_from(slot: Option<&Slot>, shape: RuleShape, polarity: Polarity) -> Option<Rule> {
        let source = slot?.get(polarity).clone()?;
        Some(Rule { shape, polarity, source })
    }

    fn slot_mut(&mut self, shape: &RuleShape) -> &mut Slot {
        match shape {
            RuleShape::Origin(id) => self.origins.entry(id.clone()).or_default(),
            RuleShape::Destination(id) => self.destinations.entry(id.clone()).or_default(),
            RuleShape::OriginToDestination(o, d) => {
                self.pairs.entry((o.clone(), d.clone())).or_default()
            }
        }
    }

    fn slot_opt_mut(&mut self, shape: &RuleShape) -> Option<&mut Slot> {
        match shape {
            RuleShape::Origin(id) => self.origins.get_mut(id),
            RuleShape::Destination(id) => self.destinations.get_mut(id),
            RuleShape::OriginToDestination(o, d) => self.pairs.get_mut(&(o.clone(), d.clone())),
        }
    }

    fn prune(&mut self, shape: &RuleShape) {
        match shape {
            RuleShape::Origin(id) => {
                if self.origins.get(id).is_some_and(Slot::is_empty) {
                    self.origins.remove(id);
                }
            }
            RuleShape::Destination(id) => {
                if self.destinations.get(id).is_some_and(Slot::is_empty) {
                    self.destinations.remove(id);
                }
            }
            RuleShape::OriginToDestination(o, d) => {
                let key = (o.clone(), d.clone());
                if self.pairs.get(&key).is_some_and(Slot::is_empty) {
                    self.pairs.remove(&key);
                }
            }
        }
    }
}

fn sweep_source<K: Eq + std::hash::Hash>(slots: &mut HashMap<K, Slot>, name: &str) -> bool {
    let from = |src: &Option<RuleSource>| {
        matches!(src, Some(RuleSource::Subscription { name: n, .. }) if n == name)
    };
    let mut changed = false;
    for slot in slots.values_mut() {
        if from(&slot.allow) {
            slot.allow = None;
            changed = true;
        }
        if from(&slot.deny) {
            slot.deny = None;
            changed = true;
        }
    }
    slots.retain(|_, slot| !slot.is_empty());
    changed
}
