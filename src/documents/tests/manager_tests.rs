//! Registry and dual-ownership state machine tests.

use crate::test_utils::{count_events, event_names, memory_manager, record_events};

/// Scenario: one client document through its whole lifecycle. Opening
/// registers it, changing it fires content-changed plus exactly one update
/// report, closing removes it.
#[test]
fn test_client_document_lifecycle() {
    let (_host, mut manager) = memory_manager();
    let log = record_events(&mut manager);

    manager.client_open("/a.grammar", "X := 'a';");
    assert_eq!(manager.document_count(), 1);
    let doc = manager.get("/a.grammar").expect("tracked after open");
    assert!(doc.is_open_on_client());
    assert!(!doc.is_open_on_server());
    assert_eq!(
        event_names(&log),
        vec!["created", "opened-on-client", "updated"]
    );

    manager.client_change("/a.grammar", &["X := 'b';"]);
    assert_eq!(
        event_names(&log),
        vec![
            "created",
            "opened-on-client",
            "updated",
            "content-changed",
            "updated"
        ]
    );
    let doc = manager.get("/a.grammar").expect("still tracked");
    assert_eq!(doc.text().to_string(), "X := 'b';");

    manager.client_close("/a.grammar");
    assert!(!manager.has("/a.grammar"));
    assert_eq!(manager.document_count(), 0);
    assert_eq!(count_events(&log, "closed"), 1);
    assert_eq!(count_events(&log, "closed-on-client"), 0);
}

/// Dual-close property: a document open on both sides survives closing one
/// side and is removed only when the second side closes too.
#[test]
fn test_dual_close_server_side_first() {
    let (host, mut manager) = memory_manager();
    host.insert("/dual.grammar", "Y := 'y';");

    manager.client_open("/dual.grammar", "Y := 'y';");
    assert!(manager.open("/dual.grammar").is_some());
    let doc = manager.get("/dual.grammar").expect("tracked");
    assert!(doc.is_open_on_client());
    assert!(doc.is_open_on_server());

    manager.close("/dual.grammar");
    let doc = manager.get("/dual.grammar").expect("client still holds it");
    assert!(doc.is_open_on_client());
    assert!(!doc.is_open_on_server());

    manager.client_close("/dual.grammar");
    assert!(!manager.has("/dual.grammar"));
}

/// Same property with the sides closing in the other order. Updates stay
/// suspended across the closes: a rebuild in between would already
/// reclaim the no-longer-referenced document, hiding the intermediate
/// state this test is about.
#[test]
fn test_dual_close_client_side_first() {
    let (host, mut manager) = memory_manager();
    host.insert("/dual.grammar", "Y := 'y';");

    manager.client_open("/dual.grammar", "Y := 'y';");
    assert!(manager.open("/dual.grammar").is_some());

    manager.suspend_updates();
    manager.client_close("/dual.grammar");
    let doc = manager.get("/dual.grammar").expect("server still holds it");
    assert!(!doc.is_open_on_client());
    assert!(doc.is_open_on_server());

    manager.close("/dual.grammar");
    assert!(!manager.has("/dual.grammar"));
    manager.resume_updates();
}

/// Closing one side of a dual-open document fires the side event, not the
/// removal event.
#[test]
fn test_partial_close_fires_side_events_only() {
    let (host, mut manager) = memory_manager();
    host.insert("/dual.grammar", "Y := 'y';");
    manager.client_open("/dual.grammar", "Y := 'y';");
    manager.open("/dual.grammar");
    let log = record_events(&mut manager);

    manager.close("/dual.grammar");
    assert_eq!(count_events(&log, "closed-on-server"), 1);
    assert_eq!(count_events(&log, "closed"), 0);

    manager.client_close("/dual.grammar");
    assert_eq!(count_events(&log, "closed-on-client"), 0);
    assert_eq!(count_events(&log, "closed"), 1);
}

/// A server-only document nothing references is reclaimed by the very next
/// rebuild: its open triggers an update, the rebuild reads only the roots,
/// and the sweep closes whatever stayed unmarked.
#[test]
fn test_standalone_server_open_is_reclaimed_by_next_rebuild() {
    let (host, mut manager) = memory_manager();
    host.insert("/loose.grammar", "X := 'x';");
    let log = record_events(&mut manager);

    let doc = manager.open("/loose.grammar").expect("file is readable");
    assert!(doc.is_open_on_server());
    assert!(!manager.has("/loose.grammar"));
    assert_eq!(
        event_names(&log),
        vec!["created", "opened-on-server", "closed", "updated"]
    );
}

/// Idempotent content property: a second open with identical text fires no
/// content-changed event and requests no update.
#[test]
fn test_identical_client_open_is_idempotent() {
    let (_host, mut manager) = memory_manager();
    let log = record_events(&mut manager);

    manager.client_open("/a.grammar", "X := 'a';");
    let after_first = event_names(&log).len();

    manager.client_open("/a.grammar", "X := 'a';");
    assert_eq!(event_names(&log).len(), after_first);
    assert_eq!(count_events(&log, "content-changed"), 0);
    assert_eq!(count_events(&log, "updated"), 1);
}

/// Suspended so the document survives between the two opens; without the
/// suspension the first open's rebuild would already sweep it away.
#[test]
fn test_identical_server_open_is_idempotent() {
    let (host, mut manager) = memory_manager();
    host.insert("/s.grammar", "X := 'x';");
    let log = record_events(&mut manager);

    manager.suspend_updates();
    manager.open("/s.grammar");
    let after_first = event_names(&log).len();

    manager.open("/s.grammar");
    assert_eq!(event_names(&log).len(), after_first);
    assert_eq!(count_events(&log, "content-changed"), 0);

    manager.resume_updates();
    assert_eq!(count_events(&log, "updated"), 1);
}

/// An unreadable file is "not found": no entity, no events, no update.
#[test]
fn test_open_unreadable_file_mutates_nothing() {
    let (_host, mut manager) = memory_manager();
    let log = record_events(&mut manager);

    assert!(manager.open("/missing.grammar").is_none());
    assert!(!manager.has("/missing.grammar"));
    assert_eq!(manager.document_count(), 0);
    assert!(event_names(&log).is_empty());
}

/// A change notification for an untracked document is a no-op.
#[test]
fn test_change_unknown_document_is_noop() {
    let (_host, mut manager) = memory_manager();
    let log = record_events(&mut manager);

    manager.client_change("/phantom.grammar", &["X := 'x';"]);
    assert!(!manager.has("/phantom.grammar"));
    assert!(event_names(&log).is_empty());
}

/// Closing an untracked document, or a side that is not open, is a no-op.
#[test]
fn test_redundant_close_is_noop() {
    let (_host, mut manager) = memory_manager();
    manager.client_open("/a.grammar", "X := 'a';");
    let log = record_events(&mut manager);

    manager.close("/a.grammar");
    manager.close("/phantom.grammar");
    manager.client_close("/phantom.grammar");
    assert!(manager.has("/a.grammar"));
    assert!(event_names(&log).is_empty());
}

/// Full-document sync: only the last entry of a change batch is applied.
#[test]
fn test_change_batch_applies_last_entry_only() {
    let (_host, mut manager) = memory_manager();
    manager.client_open("/a.grammar", "X := 'a';");
    let log = record_events(&mut manager);

    manager.client_change("/a.grammar", &["X := 'b';", "X := 'c';", "X := 'd';"]);
    let doc = manager.get("/a.grammar").expect("tracked");
    assert_eq!(doc.text().to_string(), "X := 'd';");
    assert_eq!(count_events(&log, "content-changed"), 1);
}

/// An empty change batch is a no-op.
#[test]
fn test_empty_change_batch_is_noop() {
    let (_host, mut manager) = memory_manager();
    manager.client_open("/a.grammar", "X := 'a';");
    let log = record_events(&mut manager);

    manager.client_change("/a.grammar", &[]);
    assert!(event_names(&log).is_empty());
}

/// Distinct spellings of the same file resolve to one registry entry.
#[test]
fn test_locator_spellings_share_one_entry() {
    let (_host, mut manager) = memory_manager();

    manager.client_open("file:///work/a.grammar", "X := 'a';");
    assert_eq!(manager.document_count(), 1);
    assert!(manager.has("/work/a.grammar"));
    assert!(manager.has("/work/./b/../a.grammar"));
    assert!(manager.has("file:///work/a.grammar"));

    manager.client_change("/work/a.grammar", &["X := 'b';"]);
    assert_eq!(manager.document_count(), 1);
    let doc = manager.get("file:///work/a.grammar").expect("tracked");
    assert_eq!(doc.text().to_string(), "X := 'b';");
}

#[test]
fn test_normalize_identity_is_idempotent_through_manager() {
    let (_host, manager) = memory_manager();
    let once = manager
        .normalize_identity("file:///work/x/../a.grammar")
        .expect("identity");
    let twice = manager.normalize_identity(once.as_str()).expect("identity");
    assert_eq!(once, twice);
}

/// The display locator keeps the client's spelling; the identity is the
/// normalized native path.
#[test]
fn test_display_uri_follows_latest_open() {
    let (_host, mut manager) = memory_manager();
    manager.client_open("file:///work/a.grammar", "X := 'a';");
    let doc = manager.get("/work/a.grammar").expect("tracked");
    assert_eq!(doc.display_uri().as_str(), "file:///work/a.grammar");
    assert_eq!(doc.identity().as_str(), "/work/a.grammar");
}

/// A server open re-reads the file and replaces stale text.
#[test]
fn test_server_reopen_picks_up_changed_content() {
    let (host, mut manager) = memory_manager();
    host.insert("/s.grammar", "X := 'old';");
    manager.suspend_updates();
    manager.open("/s.grammar");
    let log = record_events(&mut manager);

    host.insert("/s.grammar", "X := 'new';");
    manager.open("/s.grammar");
    let doc = manager.get("/s.grammar").expect("tracked");
    assert_eq!(doc.text().to_string(), "X := 'new';");
    assert_eq!(count_events(&log, "content-changed"), 1);

    manager.resume_updates();
    assert_eq!(count_events(&log, "updated"), 1);
}

#[test]
fn test_all_and_keys_snapshot_the_registry() {
    let (_host, mut manager) = memory_manager();
    manager.client_open("/a.grammar", "A := 'a';");
    manager.client_open("/b.grammar", "B := 'b';");

    assert_eq!(manager.all().len(), 2);
    let mut keys: Vec<String> = manager
        .keys()
        .iter()
        .map(|id| id.as_str().to_string())
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["/a.grammar", "/b.grammar"]);
}

/// Diagnostics queries against untracked locators return empty results
/// rather than failing.
#[test]
fn test_diagnostics_for_untracked_document_is_empty() {
    let (_host, mut manager) = memory_manager();
    assert!(manager.diagnostics("/phantom.grammar").is_empty());
}

#[test]
fn test_diagnostics_report_unresolved_reference() {
    let (_host, mut manager) = memory_manager();
    manager.client_open("/a.grammar", "X := Missing;");
    let diagnostics = manager.diagnostics("/a.grammar");
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.contains("Missing"));
}

/// Update reports carry per-root diagnostics keyed by display locator.
#[test]
fn test_update_report_keyed_by_display_uri() {
    use std::sync::{Arc, Mutex};

    use crate::documents::UpdateReport;

    let (_host, mut manager) = memory_manager();
    let reports: Arc<Mutex<Vec<UpdateReport>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    manager.events_mut().subscribe_updated(move |report| {
        sink.lock().unwrap().push(report.clone());
    });

    manager.client_open("file:///work/broken.grammar", "X := Missing;");

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].diagnostics.len(), 1);
    let (uri, diagnostics) = &reports[0].diagnostics[0];
    assert_eq!(uri.as_str(), "file:///work/broken.grammar");
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].message.contains("Missing"));
}
