//! End-to-end tests for the request processor
//!
//! Exercises the full decision path: normalization, provenance,
//! policy evaluation, ledgers and observer fan-out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use warden_engine::*;
use warden_policy::{Polarity, PolicyConfig, RuleShape};
use warden_uri::Identifier;

fn dom(s: &str) -> Identifier {
    Identifier::Domain(s.to_string())
}

fn ctx(doc: u64, kind: LoadKind) -> RequestContext {
    RequestContext::new(DocumentId(doc), kind)
}

// ============================================================================
// POLICY PRECEDENCE THROUGH THE PROCESSOR
// ============================================================================

#[test]
fn test_pair_deny_overrides_allows() {
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.policy_mut().allow_origin(dom("a.com"));
    proc.policy_mut().allow_destination(dom("d.net"));
    proc.policy_mut().forbid_pair(dom("a.com"), dom("d.net"));

    let decision =
        proc.should_load("https://a.com/", "https://d.net/x.js", &ctx(1, LoadKind::SubResource));
    assert_eq!(decision, Decision::Deny);
}

#[test]
fn test_origin_allow_opens_cross_site() {
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.policy_mut().allow_origin(dom("example.com"));

    let allow = proc.should_load(
        "https://example.com/",
        "https://cdn.example.net/lib.js",
        &ctx(1, LoadKind::SubResource),
    );
    let deny = proc.should_load(
        "https://other.com/",
        "https://cdn.example.net/lib.js",
        &ctx(1, LoadKind::SubResource),
    );
    assert_eq!(allow, Decision::Allow);
    assert_eq!(deny, Decision::Deny);
}

#[test]
fn test_granularity_full_host() {
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.policy_mut().set_config(PolicyConfig {
        granularity: warden_uri::Granularity::FullHost,
        allow_same_domain_by_default: false,
        allow_by_default: false,
    });

    // Under full-host identity, sibling subdomains are different endpoints
    let decision = proc.should_load(
        "https://www.example.com/",
        "https://api.example.com/data",
        &ctx(1, LoadKind::SubResource),
    );
    assert_eq!(decision, Decision::Deny);
}

// ============================================================================
// TEMPORARY RULES
// ============================================================================

#[test]
fn test_revoking_temporary_rules_changes_subsequent_verdicts() {
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.policy_mut().temporarily_allow_origin(dom("a.com"));

    let before =
        proc.should_load("https://a.com/", "https://b.net/x", &ctx(1, LoadKind::SubResource));
    assert_eq!(before, Decision::Allow);

    assert!(proc.revoke_temporary_rules());
    let after =
        proc.should_load("https://a.com/", "https://b.net/x", &ctx(1, LoadKind::SubResource));
    assert_eq!(after, Decision::Deny);
}

#[test]
fn test_revoke_leaves_persistent_rules() {
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.policy_mut().allow_origin(dom("keep.com"));
    proc.policy_mut().temporarily_allow_origin(dom("temp.com"));

    proc.revoke_temporary_rules();
    let decision =
        proc.should_load("https://keep.com/", "https://b.net/x", &ctx(1, LoadKind::SubResource));
    assert_eq!(decision, Decision::Allow);
}

// ============================================================================
// PROVENANCE
// ============================================================================

#[test]
fn test_link_click_justifies_redirect_under_default_deny() {
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.register_link_clicked("https://news.com/story", "https://t.co/abc");

    let decision = proc.should_load(
        "https://news.com/story",
        "https://t.co/abc",
        &ctx(1, LoadKind::TopLevelDocument),
    );
    assert_eq!(decision, Decision::Allow);
}

#[test]
fn test_allowed_redirect_survives_reload() {
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.register_allowed_redirect("https://t.co/abc", "https://target.net/page");

    for _ in 0..2 {
        let decision = proc.should_load(
            "https://t.co/abc",
            "https://target.net/page",
            &ctx(1, LoadKind::Redirect),
        );
        assert_eq!(decision, Decision::Allow);
    }
}

#[test]
fn test_history_navigation_allows_return_from_any_page() {
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.register_history_request("https://b.com/page");

    // Going back to b.com while on a.com must work under default-deny
    let decision = proc.should_load(
        "https://a.com/current",
        "https://b.com/page",
        &ctx(1, LoadKind::TopLevelDocument),
    );
    assert_eq!(decision, Decision::Allow);
}

#[test]
fn test_unrelated_redirect_still_denied() {
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.register_link_clicked("https://news.com/story", "https://t.co/abc");

    let decision = proc.should_load(
        "https://news.com/story",
        "https://unrelated.net/",
        &ctx(1, LoadKind::Redirect),
    );
    assert_eq!(decision, Decision::Deny);
}

// ============================================================================
// LEDGERS
// ============================================================================

#[test]
fn test_ledger_tracks_blacklist_blocks() {
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.policy_mut().set_config(PolicyConfig { allow_by_default: true, ..PolicyConfig::default() });
    proc.policy_mut().import_subscription(
        "easyblock",
        [SubscriptionEntry {
            shape: RuleShape::Destination(dom("tracker.net")),
            polarity: Polarity::Deny,
        }],
        true,
    );

    proc.should_load(
        "https://page.com/",
        "https://tracker.net/pixel.gif",
        &ctx(1, LoadKind::SubResource),
    );

    let ledger = proc.requests_in_document(DocumentId(1)).unwrap();
    let record = ledger.rejected().next().unwrap();
    assert!(record.from_blacklist);
}

#[test]
fn test_ledgers_are_per_document() {
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.should_load("https://a.com/", "https://t.net/x", &ctx(1, LoadKind::SubResource));
    proc.should_load("https://a.com/", "https://cdn.a.com/y", &ctx(2, LoadKind::SubResource));

    assert!(proc.requests_in_document(DocumentId(1)).unwrap().contains_blocked_requests());
    assert!(!proc.requests_in_document(DocumentId(2)).unwrap().contains_blocked_requests());
}

#[test]
fn test_navigation_discards_old_ledger() {
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.should_load("https://a.com/", "https://t.net/x", &ctx(1, LoadKind::SubResource));

    proc.begin_navigation(DocumentId(1));
    proc.should_load("https://b.com/", "https://img.b.com/y", &ctx(1, LoadKind::SubResource));

    let ledger = proc.requests_in_document(DocumentId(1)).unwrap();
    assert_eq!(ledger.len(), 1);
    assert!(!ledger.contains_blocked_requests());
}

// ============================================================================
// OBSERVERS
// ============================================================================

#[derive(Default)]
struct Counts {
    allowed: AtomicUsize,
    blocked: AtomicUsize,
    blocked_top_level: AtomicUsize,
    blocked_link_redirect: AtomicUsize,
}

struct CountingObserver(Arc<Counts>);

impl RequestObserver for CountingObserver {
    fn allowed_request(&mut self, _origin: &str, _dest: &str) {
        self.0.allowed.fetch_add(1, Ordering::Relaxed);
    }

    fn blocked_request(&mut self, _origin: &str, _dest: &str) {
        self.0.blocked.fetch_add(1, Ordering::Relaxed);
    }

    fn blocked_top_level_document(&mut self, _origin: &str, _dest: &str) {
        self.0.blocked_top_level.fetch_add(1, Ordering::Relaxed);
    }

    fn blocked_link_click_redirect(&mut self, _source: &str, _link: &str, _redirect: &str) {
        self.0.blocked_link_redirect.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_observers_see_allow_and_block_events() {
    let counts = Arc::new(Counts::default());
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.add_request_observer(1, Box::new(CountingObserver(counts.clone())));

    proc.should_load("https://a.com/", "https://cdn.a.com/ok.js", &ctx(1, LoadKind::SubResource));
    proc.should_load("https://a.com/", "https://t.net/bad.js", &ctx(1, LoadKind::SubResource));

    assert_eq!(counts.allowed.load(Ordering::Relaxed), 1);
    assert_eq!(counts.blocked.load(Ordering::Relaxed), 1);
    assert_eq!(counts.blocked_top_level.load(Ordering::Relaxed), 0);
}

#[test]
fn test_blocked_top_level_document_event() {
    let counts = Arc::new(Counts::default());
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.add_request_observer(1, Box::new(CountingObserver(counts.clone())));

    proc.should_load("https://a.com/", "https://b.net/page", &ctx(1, LoadKind::TopLevelDocument));

    assert_eq!(counts.blocked.load(Ordering::Relaxed), 1);
    assert_eq!(counts.blocked_top_level.load(Ordering::Relaxed), 1);
}

#[test]
fn test_blocked_link_click_redirect_event() {
    let counts = Arc::new(Counts::default());
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.add_request_observer(1, Box::new(CountingObserver(counts.clone())));

    // User clicks a shortener link; the landing page redirects elsewhere
    proc.register_link_clicked("https://news.com/story", "https://t.co/abc");
    proc.should_load("https://news.com/story", "https://t.co/abc", &ctx(1, LoadKind::TopLevelDocument));
    proc.should_load("https://t.co/abc", "https://spam.net/", &ctx(1, LoadKind::Redirect));

    assert_eq!(counts.blocked_link_redirect.load(Ordering::Relaxed), 1);
}

#[test]
fn test_malformed_destination_block_reaches_observers() {
    let counts = Arc::new(Counts::default());
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.add_request_observer(1, Box::new(CountingObserver(counts.clone())));

    let decision =
        proc.should_load("https://a.com/", "not a uri", &ctx(1, LoadKind::TopLevelDocument));

    assert_eq!(decision, Decision::Deny);
    assert_eq!(counts.blocked.load(Ordering::Relaxed), 1);
    assert_eq!(counts.blocked_top_level.load(Ordering::Relaxed), 1);
}

#[test]
fn test_permissive_mode_notifies_no_observers() {
    let counts = Arc::new(Counts::default());
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.add_request_observer(1, Box::new(CountingObserver(counts.clone())));
    proc.set_permissive(true);

    proc.should_load("https://a.com/", "https://t.net/x", &ctx(1, LoadKind::SubResource));

    assert_eq!(counts.allowed.load(Ordering::Relaxed), 0);
    assert_eq!(counts.blocked.load(Ordering::Relaxed), 0);
}

#[test]
fn test_removed_observer_stops_receiving() {
    let counts = Arc::new(Counts::default());
    let mut proc = RequestProcessor::new(PolicyManager::new());
    proc.add_request_observer(1, Box::new(CountingObserver(counts.clone())));
    assert!(proc.remove_request_observer(1));

    proc.should_load("https://a.com/", "https://t.net/x", &ctx(1, LoadKind::SubResource));
    assert_eq!(counts.blocked.load(Ordering::Relaxed), 0);
}
