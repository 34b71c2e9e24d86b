//! Request ledgers
//!
//! Per-document record of every intercepted request and its outcome,
//! backing the UI's blocked-content indicator and per-page request lists.

use std::collections::HashMap;
use std::time::SystemTime;

use warden_uri::{strip_fragment, Identifier};

/// Identity of a top-level document (tab content). Assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

/// One intercepted request and its outcome.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub origin_uri: String,
    pub dest_uri: String,
    pub origin_id: Identifier,
    pub dest_id: Identifier,
    pub allowed: bool,
    /// The deciding rule came from a blacklist subscription.
    pub from_blacklist: bool,
    pub time: SystemTime,
}

/// All requests intercepted for one document.
///
/// Records live in a flat list; the grouped views the UI needs (by
/// destination base domain, by exact URI) are built on demand. A running
/// blocked counter keeps the "does this page have blocked content" check
/// O(1).
#[derive(Debug, Default)]
pub struct RequestLedger {
    records: Vec<RequestRecord>,
    blocked: usize,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: RequestRecord) {
        if !record.allowed {
            self.blocked += 1;
        }
        self.records.push(record);
    }

    /// O(1); maintained alongside the record list.
    pub fn contains_blocked_requests(&self) -> bool {
        self.blocked > 0
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn allowed(&self) -> impl Iterator<Item = &RequestRecord> {
        self.records.iter().filter(|r| r.allowed)
    }

    pub fn rejected(&self) -> impl Iterator<Item = &RequestRecord> {
        self.records.iter().filter(|r| !r.allowed)
    }

    /// Rejected requests grouped by the destination's base domain, for the
    /// coarse per-site view.
    pub fn rejected_by_base_domain(&self) -> HashMap<String, Vec<&RequestRecord>> {
        let mut grouped: HashMap<String, Vec<&RequestRecord>> = HashMap::new();
        for record in self.rejected() {
            let key = match &record.dest_id {
                Identifier::Domain(d) => warden_uri::base_domain(d).to_string(),
                other => other.to_string(),
            };
            grouped.entry(key).or_default().push(record);
        }
        grouped
    }

    /// Rejected requests for one exact destination URI (fragment ignored).
    pub fn rejected_for_uri(&self, uri: &str) -> Vec<&RequestRecord> {
        let uri = strip_fragment(uri);
        self.rejected().filter(|r| strip_fragment(&r.dest_uri) == uri).collect()
    }
}
