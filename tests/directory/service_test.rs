// Directory Service Tests
// Request validation, error mapping and liveness visibility

use chrono::{Duration, TimeZone, Utc};
use peershare::directory::{
    CredentialsRequest, DirectoryError, DirectoryService, DisconnectRequest, FileQuery,
    HeartbeatRequest, LivenessMonitor, ManualClock, ShareFilesRequest,
};
use peershare::registry::{MemoryRegistry, RegistryStore};
use std::sync::Arc;

fn setup() -> (DirectoryService, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ));
    let store: Arc<dyn RegistryStore> = Arc::new(MemoryRegistry::new());
    let service = DirectoryService::new(store).with_clock(clock.clone());
    (service, clock)
}

fn register(service: &DirectoryService, username: &str, port: u16) {
    service
        .register(&CredentialsRequest::new(username, "pw", "10.0.0.1", port))
        .unwrap();
}

fn share(service: &DirectoryService, username: &str, files: &[&str], port: u16) {
    let files = files.iter().map(|f| f.to_string()).collect();
    service
        .share_files(&ShareFilesRequest::new(username, files, "10.0.0.1", port))
        .unwrap();
}

fn visible(service: &DirectoryService) -> Vec<String> {
    let mut names: Vec<String> = service
        .list_files(&FileQuery::all())
        .unwrap()
        .into_iter()
        .map(|e| e.filename)
        .collect();
    names.sort();
    names
}

// ============================================================================
// VALIDATION
// ============================================================================

#[test]
fn test_register_requires_every_field() {
    let (service, _) = setup();
    let mut req = CredentialsRequest::new("alice", "pw", "10.0.0.1", 5000);
    req.port = None;

    match service.register(&req) {
        Err(DirectoryError::Validation(msg)) => assert!(msg.contains("port")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_empty_strings_count_as_missing() {
    let (service, _) = setup();
    let req = CredentialsRequest::new("", "pw", "10.0.0.1", 5000);
    assert!(matches!(service.register(&req), Err(DirectoryError::Validation(_))));
}

#[test]
fn test_share_requires_filename_list() {
    let (service, _) = setup();
    register(&service, "alice", 5000);

    let mut req = ShareFilesRequest::new("alice", vec![], "10.0.0.1", 5000);
    req.filename = None;
    assert!(matches!(service.share_files(&req), Err(DirectoryError::Validation(_))));
}

#[test]
fn test_validation_happens_before_store() {
    let (service, _) = setup();
    let req = HeartbeatRequest {
        username: Some("ghost".to_string()),
        ip: None,
        port: Some(5000),
    };
    assert!(matches!(service.heartbeat(&req), Err(DirectoryError::Validation(_))));
    assert!(matches!(
        service.disconnect(&DisconnectRequest::default()),
        Err(DirectoryError::Validation(_))
    ));
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

#[test]
fn test_duplicate_registration_conflicts() {
    let (service, _) = setup();
    register(&service, "alice", 5000);
    let again = service.register(&CredentialsRequest::new("alice", "x", "10.0.0.2", 5001));
    assert_eq!(again, Err(DirectoryError::Conflict));
}

#[test]
fn test_bad_login_is_auth_error() {
    let (service, _) = setup();
    register(&service, "alice", 5000);
    assert_eq!(
        service.login(&CredentialsRequest::new("alice", "wrong", "10.0.0.1", 5000)),
        Err(DirectoryError::Auth)
    );
    assert_eq!(
        service.login(&CredentialsRequest::new("nobody", "pw", "10.0.0.1", 5000)),
        Err(DirectoryError::Auth)
    );
}

#[test]
fn test_share_for_unknown_peer() {
    let (service, _) = setup();
    let req = ShareFilesRequest::new("ghost", vec!["a.txt".to_string()], "10.0.0.1", 5000);
    assert_eq!(service.share_files(&req), Err(DirectoryError::UnknownPeer));
}

#[test]
fn test_heartbeat_for_unknown_peer_is_not_an_error() {
    let (service, _) = setup();
    let known = service
        .heartbeat(&HeartbeatRequest::new("ghost", "10.0.0.1", 5000))
        .unwrap();
    assert!(!known);
}

// ============================================================================
// FLOWS
// ============================================================================

#[test]
fn test_disconnect_then_login_again() {
    let (service, _) = setup();
    register(&service, "alice", 5000);
    share(&service, "alice", &["a.txt"], 5000);
    assert_eq!(visible(&service), vec!["a.txt"]);

    service.disconnect(&DisconnectRequest::new("alice")).unwrap();
    assert!(visible(&service).is_empty());

    let username = service
        .login(&CredentialsRequest::new("alice", "pw", "10.0.0.1", 5002))
        .unwrap();
    assert_eq!(username, "alice");
}

#[test]
fn test_files_visible_only_within_window() {
    let (service, clock) = setup();
    register(&service, "alice", 5000);
    share(&service, "alice", &["a.txt", "b.txt"], 5000);

    clock.advance(Duration::seconds(60));
    assert_eq!(visible(&service), vec!["a.txt", "b.txt"]);

    clock.advance(Duration::seconds(1));
    assert!(visible(&service).is_empty());

    // a heartbeat brings them back without re-announcing
    assert!(service
        .heartbeat(&HeartbeatRequest::new("alice", "10.0.0.1", 5000))
        .unwrap());
    assert_eq!(visible(&service), vec!["a.txt", "b.txt"]);
}

#[test]
fn test_sweep_after_window_removes_peer() {
    let (service, clock) = setup();
    register(&service, "alice", 5000);
    share(&service, "alice", &["a.txt"], 5000);
    let mut monitor = LivenessMonitor::for_service(&service, std::time::Duration::from_secs(30));

    clock.advance(Duration::seconds(61));
    assert_eq!(monitor.sweep_once().unwrap(), vec!["alice".to_string()]);

    assert!(!service
        .heartbeat(&HeartbeatRequest::new("alice", "10.0.0.1", 5000))
        .unwrap());
    // the username is free again
    register(&service, "alice", 5000);
}

#[test]
fn test_search_filters() {
    let (service, _) = setup();
    register(&service, "alice", 5000);
    register(&service, "bob", 5001);
    share(&service, "alice", &["Holiday.JPG", "notes.txt"], 5000);
    share(&service, "bob", &["holiday-2.jpg"], 5001);

    let hits = service
        .search_files(&FileQuery::all().with_filename("holiday"))
        .unwrap();
    assert_eq!(hits.len(), 2);

    let hits = service
        .search_files(&FileQuery::all().with_filename("jpg").with_username("BOB"))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filename, "holiday-2.jpg");
    assert_eq!(hits[0].port, 5001);
}

#[test]
fn test_custom_liveness_window() {
    let (service, clock) = setup();
    let service = service.with_liveness_window(Duration::seconds(10));
    register(&service, "alice", 5000);
    share(&service, "alice", &["a.txt"], 5000);

    clock.advance(Duration::seconds(11));
    assert!(visible(&service).is_empty());
}
