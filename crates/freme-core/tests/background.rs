//! Poller, dwell-to-read and sign-in flow against a mock server.

use std::time::Duration;

use freme_core::api::{ApiClient, Connection, ConnectionStatus, Message};
use freme_core::auth::{self, AuthFlow, AuthState, IdentityUser};
use freme_core::feed::MessageFeed;
use freme_core::poller::ConnectionPoller;
use freme_core::read_tracker::{ReadOutcome, ReadTracker};
use freme_core::session::{Credential, Session};
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

fn host_of(server: &MockServer) -> String {
    server.uri().trim_start_matches("http://").to_string()
}

fn session(server: &MockServer) -> Session {
    Session::new(host_of(server), "http", Credential::bearer("tok")).unwrap()
}

fn feed_with(connection_id: &str, message_ids: &[&str]) -> MessageFeed {
    let mut feed = MessageFeed::new();
    let messages = message_ids
        .iter()
        .map(|id| Message {
            id: (*id).to_string(),
            ..Default::default()
        })
        .collect();
    feed.ingest(Some(connection_id), messages);
    feed
}

fn connected(id: &str, unread: u32) -> Connection {
    Connection {
        id: id.to_string(),
        host: "a.example".to_string(),
        handle: "ada".to_string(),
        display_name: None,
        status: ConnectionStatus::Connected,
        unread_message_count: unread,
        profile: None,
        created: None,
        updated: None,
    }
}

#[tokio::test]
async fn test_dwell_marks_read_and_decrements() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mark-message-read/m1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Message marked read"))
        .expect(1)
        .mount(&server)
        .await;

    let tracker = ReadTracker::new(
        ApiClient::new(None).unwrap(),
        session(&server),
        Duration::from_millis(30),
    );
    tracker.sync_counts(&[connected("c1", 2)]);
    let feed = feed_with("c1", &["m1"]);

    let outcome = tracker.hover(&feed, "m1").unwrap().await.unwrap();
    assert_eq!(outcome, ReadOutcome::Marked { remaining: 1 });
    assert_eq!(tracker.unread("c1"), 1);
}

#[tokio::test]
async fn test_leave_cancels_before_firing() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mark-message-read/m1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let tracker = ReadTracker::new(
        ApiClient::new(None).unwrap(),
        session(&server),
        Duration::from_millis(500),
    );
    tracker.sync_counts(&[connected("c1", 1)]);
    let feed = feed_with("c1", &["m1"]);

    let handle = tracker.hover(&feed, "m1").unwrap();
    tracker.leave();
    assert_eq!(handle.await.unwrap(), ReadOutcome::Cancelled);
    assert_eq!(tracker.unread("c1"), 1);
}

#[tokio::test]
async fn test_new_hover_replaces_armed_timer() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mark-message-read/m1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mark-message-read/m2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let tracker = ReadTracker::new(
        ApiClient::new(None).unwrap(),
        session(&server),
        Duration::from_millis(30),
    );
    tracker.sync_counts(&[connected("c1", 1)]);
    let feed = feed_with("c1", &["m1", "m2"]);

    let first = tracker.hover(&feed, "m1").unwrap();
    let second = tracker.hover(&feed, "m2").unwrap();
    assert_eq!(first.await.unwrap(), ReadOutcome::Cancelled);
    assert_eq!(second.await.unwrap(), ReadOutcome::Marked { remaining: 0 });
    assert_eq!(tracker.unread("c1"), 0);
}

#[tokio::test]
async fn test_failed_mark_read_keeps_badge() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mark-message-read/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let tracker = ReadTracker::new(
        ApiClient::new(None).unwrap(),
        session(&server),
        Duration::from_millis(10),
    );
    tracker.sync_counts(&[connected("c1", 4)]);
    let feed = feed_with("c1", &["gone"]);

    assert_eq!(
        tracker.hover(&feed, "gone").unwrap().await.unwrap(),
        ReadOutcome::Failed
    );
    assert_eq!(tracker.unread("c1"), 4);
}

#[tokio::test]
async fn test_poller_keeps_last_snapshot_on_failure() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-connection-info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "c1", "handle": "ada", "host": "a.example", "status": "connected",
             "unread_message_count": 5}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get-connection-info"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let poller = ConnectionPoller::new(
        ApiClient::new(None).unwrap(),
        session(&server),
        Duration::from_millis(20),
    );
    let handle = poller.start();
    let mut rx = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(Option::is_some))
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(120)).await;
    let snapshot = handle.latest().unwrap();
    assert_eq!(snapshot.sequence, 1);
    assert_eq!(snapshot.unread_total(), 5);

    handle.stop().await;
    let polls = server.received_requests().await.unwrap().len();
    assert!(polls >= 2, "expected repeated polling, got {polls}");
}

#[tokio::test]
async fn test_poller_publishes_fresh_snapshots() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-connection-info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "p1", "handle": "bob", "host": "b.example", "status": "pending"}
        ])))
        .mount(&server)
        .await;

    let poller = ConnectionPoller::new(
        ApiClient::new(None).unwrap(),
        session(&server),
        Duration::from_millis(20),
    );
    let handle = poller.start();
    let mut rx = handle.subscribe();
    let snapshot = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.as_ref().is_some_and(|s| s.sequence >= 2)),
    )
    .await
    .unwrap()
    .unwrap()
    .clone()
    .unwrap();

    assert_eq!(snapshot.pending().count(), 1);
    handle.stop().await;
}

#[tokio::test]
async fn test_auth_flow_ready_and_needs_signup() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/firebase/check-user"))
        .and(header("authorization", "Bearer known-token"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/firebase/check-user"))
        .and(header("authorization", "Bearer new-token"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let api = ApiClient::new(None).unwrap();
    let flow = AuthFlow::new(&api, host_of(&server), "http");

    let known = IdentityUser {
        display_name: Some("Ada".to_string()),
        email: "ada@example.com".to_string(),
        id_token: "known-token".to_string(),
    };
    match flow.on_auth_state_changed(Some(&known)).await.unwrap() {
        AuthState::Ready { welcome_name, .. } => assert_eq!(welcome_name, "Ada"),
        other => panic!("expected ready, got {other:?}"),
    }

    let fresh = IdentityUser {
        display_name: None,
        email: "bob@example.com".to_string(),
        id_token: "new-token".to_string(),
    };
    match flow.on_auth_state_changed(Some(&fresh)).await.unwrap() {
        AuthState::NeedsSignup { welcome_name, .. } => {
            assert_eq!(welcome_name, "bob@example.com");
        }
        other => panic!("expected sign-up, got {other:?}"),
    }
}

#[tokio::test]
async fn test_complete_signup_creates_profile() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/firebase/check-user"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/firebase/check-user"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/firebase/create-profile"))
        .and(body_string_contains("display-name=Bob"))
        .and(body_string_contains("handle=bob"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(None).unwrap();
    let flow = AuthFlow::new(&api, host_of(&server), "http");
    let user = IdentityUser {
        display_name: None,
        email: "bob@example.com".to_string(),
        id_token: "new-token".to_string(),
    };
    let AuthState::NeedsSignup { session, .. } =
        flow.on_auth_state_changed(Some(&user)).await.unwrap()
    else {
        panic!("expected sign-up");
    };

    let state = flow.complete_signup(&session, "Bob", "bob").await.unwrap();
    assert!(matches!(state, AuthState::Ready { .. }));
}

#[tokio::test]
async fn test_sign_out_clears_session_even_on_backend_failure() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sign-out"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let path = dir.path().join("session.json");
    let session = session(&server);
    session.save_to(&path).unwrap();

    let api = ApiClient::new(None).unwrap();
    assert!(auth::sign_out(&api, &session, &path).await.unwrap());
    assert!(!path.exists());
}

#[tokio::test]
async fn test_own_message_hover_marks_nothing() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mark-message-read/c1-msg"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let tracker = ReadTracker::new(
        ApiClient::new(None).unwrap(),
        session(&server),
        Duration::from_millis(200),
    );
    let mut feed = feed_with("c1", &["c1-msg"]);
    feed.ingest(
        None,
        vec![Message {
            id: "mine".to_string(),
            ..Default::default()
        }],
    );

    let armed = tracker.hover(&feed, "c1-msg").unwrap();
    assert!(tracker.hover(&feed, "mine").is_none());
    assert_eq!(armed.await.unwrap(), ReadOutcome::Cancelled);
}

#[tokio::test]
async fn test_token_session_keeps_backend_cookie() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/firebase/check-user"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "session=flask123; HttpOnly; Path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get-connection-info"))
        .and(header("authorization", "Bearer tok"))
        .and(header("cookie", "session=flask123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get-connection-info"))
        .respond_with(ResponseTemplate::new(500).set_body_string("KeyError: 'user'"))
        .mount(&server)
        .await;

    let api = ApiClient::new(None).unwrap();
    let flow = AuthFlow::new(&api, host_of(&server), "http");
    let user = IdentityUser {
        display_name: Some("Ada".to_string()),
        email: "ada@example.com".to_string(),
        id_token: "tok".to_string(),
    };
    let AuthState::Ready { session, .. } = flow.on_auth_state_changed(Some(&user)).await.unwrap()
    else {
        panic!("expected ready");
    };
    assert_eq!(session.credential.session_cookie(), Some("flask123"));

    let connections = api.get_connection_info(&session).await.unwrap();
    assert!(connections.is_empty());
}
