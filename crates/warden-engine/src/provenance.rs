//! Provenance tracking
//!
//! Records the causal link between a user navigation action and the
//! request it produces, so the processor can allow redirects the rules
//! alone would block.

use std::collections::HashMap;

use warden_uri::strip_fragment;

/// What kind of user action created a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvenanceKind {
    LinkClick,
    FormSubmit,
    HistoryNav,
    /// A previously blocked redirect the user explicitly allowed.
    AllowedRedirect,
}

/// One recorded navigation link. Keyed by source URI, except history
/// navigations, which are keyed by their destination.
#[derive(Debug, Clone)]
pub struct ProvenanceLink {
    pub dest: String,
    pub kind: ProvenanceKind,
    /// Registration sequence number, used for oldest-first eviction.
    seq: u64,
}

const DEFAULT_CAPACITY: usize = 256;

/// Session-only map of navigation links.
///
/// A new registration for a source supersedes the prior one; links are
/// not consumed on query, so history navigation can replay them within
/// the session. History navigations are kept in a separate map keyed by
/// destination: back/forward returns to a page regardless of where the
/// user currently is. Both maps are capacity-bounded, evicting the
/// oldest link, so a long session cannot accumulate links without limit.
#[derive(Debug)]
pub struct ProvenanceTracker {
    links: HashMap<String, ProvenanceLink>,
    history: HashMap<String, ProvenanceLink>,
    capacity: usize,
    next_seq: u64,
}

impl Default for ProvenanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvenanceTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            links: HashMap::new(),
            history: HashMap::new(),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    /// The user clicked a link on `source` pointing at `dest`.
    pub fn register_link_clicked(&mut self, source: &str, dest: &str) {
        self.register(source, dest, ProvenanceKind::LinkClick);
    }

    /// The user submitted a form on `source` targeting `dest`.
    pub fn register_form_submitted(&mut self, source: &str, dest: &str) {
        self.register(source, dest, ProvenanceKind::FormSubmit);
    }

    /// The user navigated to `uri` through session history. Keyed by the
    /// destination alone: a back/forward navigation may start from any
    /// page.
    pub fn register_history_request(&mut self, uri: &str) {
        let dest = strip_fragment(uri).to_string();
        if !self.history.contains_key(&dest) && self.history.len() >= self.capacity {
            evict_oldest(&mut self.history);
        }
        tracing::debug!(%dest, "registered history navigation");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.history.insert(
            dest.clone(),
            ProvenanceLink { dest, kind: ProvenanceKind::HistoryNav, seq },
        );
    }

    /// The user explicitly allowed the redirect `source` -> `dest`.
    pub fn register_allowed_redirect(&mut self, source: &str, dest: &str) {
        self.register(source, dest, ProvenanceKind::AllowedRedirect);
    }

    /// Whether a recorded link justifies the navigation `source` -> `dest`.
    /// Does not consume the link.
    pub fn is_allowed_redirect(&self, source: &str, dest: &str) -> bool {
        let dest = strip_fragment(dest);
        if self.history.contains_key(dest) {
            return true;
        }
        self.links
            .get(strip_fragment(source))
            .is_some_and(|link| link.dest == dest)
    }

    /// The page whose clicked link led to `dest`, if any. Used to tell a
    /// user which link click a blocked redirect chain started from.
    pub fn link_source_for(&self, dest: &str) -> Option<&str> {
        let dest = strip_fragment(dest);
        self.links
            .iter()
            .find(|(_, link)| link.kind == ProvenanceKind::LinkClick && link.dest == dest)
            .map(|(source, _)| source.as_str())
    }

    pub fn len(&self) -> usize {
        self.links.len() + self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.history.is_empty()
    }

    fn register(&mut self, source: &str, dest: &str, kind: ProvenanceKind) {
        let source = strip_fragment(source).to_string();
        if !self.links.contains_key(&source) && self.links.len() >= self.capacity {
            evict_oldest(&mut self.links);
        }
        tracing::debug!(%source, dest, ?kind, "registered provenance link");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.links.insert(
            source,
            ProvenanceLink { dest: strip_fragment(dest).to_string(), kind, seq },
        );
    }
}

fn evict_oldest(map: &mut HashMap<String, ProvenanceLink>) {
    let oldest = map
        .iter()
        .min_by_key(|(_, link)| link.seq)
        .map(|(key, _)| key.clone());
    if let Some(key) = oldest {
        map.remove(&key);
    }
}
