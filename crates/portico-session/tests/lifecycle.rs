//! Integration tests for the session layer: full lifecycle scenarios
//! driven through the public API only, the way a transport layer and
//! handler code would use it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portico_protocol::{SessionId, SettingsMap, UserId};
use portico_session::{
    Notifiable, Session, SessionEvent, SessionEventKind, SessionService,
    SessionServiceConfig, Socket, SocketError,
};
use serde_json::json;

// =========================================================================
// Mock transport
// =========================================================================

/// A loopback socket: records everything the session layer does to it.
struct LoopbackSocket {
    peer: SocketAddr,
    sent: Mutex<Vec<Vec<u8>>>,
    closing: Mutex<Vec<String>>,
    disconnects: AtomicUsize,
}

impl LoopbackSocket {
    fn new(port: u16) -> Arc<Self> {
        Arc::new(Self {
            peer: SocketAddr::from(([127, 0, 0, 1], port)),
            sent: Mutex::new(Vec::new()),
            closing: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        })
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    fn closing_reasons(&self) -> Vec<String> {
        self.closing.lock().unwrap().clone()
    }

    fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl Socket for LoopbackSocket {
    fn send(&self, msg: &[u8]) -> Result<(), SocketError> {
        self.sent.lock().unwrap().push(msg.to_vec());
        Ok(())
    }

    fn send_batch(&self, msgs: &[Vec<u8>]) -> Result<(), SocketError> {
        self.sent.lock().unwrap().extend(msgs.iter().cloned());
        Ok(())
    }

    fn remote_address(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }

    fn notify_closing(&self, reason: &str) {
        self.closing.lock().unwrap().push(reason.to_string());
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn service() -> SessionService {
    SessionService::new(SessionServiceConfig::default())
}

fn accept(
    svc: &SessionService,
    sid: u64,
    port: u16,
) -> (Arc<Session>, Arc<LoopbackSocket>) {
    let socket = LoopbackSocket::new(port);
    let session = svc.create(SessionId(sid), "front-1", socket.clone());
    (session, socket)
}

/// Lets spawned disconnect tasks run before asserting on them.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// =========================================================================
// Scenarios
// =========================================================================

#[tokio::test]
async fn test_two_sessions_one_user_then_admin_kick() {
    // The canonical multi-device flow: one user connects twice, an
    // admin kicks them, both connections are torn down.
    let svc = service();
    let (s1, sock1) = accept(&svc, 1, 4001);
    let (s2, sock2) = accept(&svc, 2, 4002);

    svc.bind(SessionId(1), UserId(42)).await.unwrap();
    svc.bind(SessionId(2), UserId(42)).await.unwrap();
    assert_eq!(svc.get_by_uid(UserId(42)).unwrap().len(), 2);

    svc.kick(UserId(42), "admin").await;

    assert!(s1.is_closed());
    assert!(s2.is_closed());
    assert_eq!(svc.session_count(), 0);
    assert!(svc.get(SessionId(1)).is_none());
    assert!(svc.get(SessionId(2)).is_none());
    assert!(svc.get_by_uid(UserId(42)).is_none());

    settle().await;
    assert_eq!(sock1.disconnect_count(), 1);
    assert_eq!(sock2.disconnect_count(), 1);
    assert_eq!(sock1.closing_reasons(), vec!["admin".to_string()]);
    assert_eq!(sock2.closing_reasons(), vec!["admin".to_string()]);
}

#[tokio::test]
async fn test_socket_error_path_closes_and_deregisters() {
    // Termination driven from the transport side: the read loop hits an
    // error and reports the session closed.
    let svc = service();
    let (session, socket) = accept(&svc, 1, 4001);
    svc.bind(SessionId(1), UserId(7)).await.unwrap();

    session.closed("read error");

    assert_eq!(svc.session_count(), 0);
    assert!(svc.get_by_uid(UserId(7)).is_none());

    settle().await;
    assert_eq!(socket.disconnect_count(), 1);

    // A late duplicate close (e.g. the writer task also failing) is
    // absorbed silently.
    session.closed("write error");
    settle().await;
    assert_eq!(socket.disconnect_count(), 1);
    assert_eq!(socket.closing_reasons(), vec!["read error".to_string()]);
}

#[tokio::test]
async fn test_handler_flow_through_frontend_session() {
    // Handler code only ever sees the projection: bind, stash settings,
    // push them back, export for another process.
    let svc = service();
    let (session, _) = accept(&svc, 1, 4001);

    let frontend = session.to_frontend_session();
    frontend.bind(UserId(7)).await.unwrap();
    frontend.set("score", json!(10));
    frontend.push("score").unwrap();

    assert_eq!(session.uid(), Some(UserId(7)));
    assert_eq!(session.get("score"), Some(json!(10)));

    let snapshot = frontend.export();
    assert_eq!(snapshot.id, SessionId(1));
    assert_eq!(snapshot.frontend_id.as_str(), "front-1");
    assert_eq!(snapshot.uid, Some(UserId(7)));
    assert_eq!(snapshot.settings["score"], json!(10));

    // The snapshot survives a process boundary.
    let wire = serde_json::to_vec(&snapshot).unwrap();
    let decoded: portico_protocol::SessionSnapshot =
        serde_json::from_slice(&wire).unwrap();
    assert_eq!(decoded, snapshot);
}

#[tokio::test]
async fn test_frontend_subscriber_sees_session_close() {
    // A listener registered only at the frontend layer still hears the
    // session-originated closed notification.
    let svc = service();
    let (session, _) = accept(&svc, 1, 4001);
    let frontend = session.to_frontend_session();

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let slot = Arc::clone(&seen);
    frontend.on(
        SessionEventKind::Closed,
        Arc::new(move |event| {
            if let SessionEvent::Closed { reason, .. } = event {
                slot.lock().unwrap().push(reason.clone());
            }
        }),
    );

    svc.kick_by_session_id(SessionId(1), "maintenance").await;

    assert_eq!(*seen.lock().unwrap(), vec!["maintenance".to_string()]);
}

#[tokio::test]
async fn test_single_session_policy_end_to_end() {
    let svc = SessionService::new(SessionServiceConfig {
        single_session: true,
    });
    accept(&svc, 1, 4001);
    accept(&svc, 2, 4002);

    svc.bind(SessionId(1), UserId(42)).await.unwrap();
    let second = svc.bind(SessionId(2), UserId(42)).await;
    assert!(second.is_err(), "policy should reject the second device");

    // Kicking the first session frees the user for the second device.
    svc.kick(UserId(42), "relogin").await;
    svc.bind(SessionId(2), UserId(42)).await.unwrap();

    let bucket = svc.get_by_uid(UserId(42)).unwrap();
    assert_eq!(bucket.len(), 1);
    assert_eq!(bucket[0].id(), SessionId(2));
}

#[tokio::test]
async fn test_broadcast_by_uid_and_per_session_send() {
    let svc = service();
    let (_, sock1) = accept(&svc, 1, 4001);
    let (_, sock2) = accept(&svc, 2, 4002);
    let (_, sock3) = accept(&svc, 3, 4003);
    svc.bind(SessionId(1), UserId(42)).await.unwrap();
    svc.bind(SessionId(2), UserId(42)).await.unwrap();

    assert_eq!(svc.send_message_by_uid(UserId(42), b"to-user"), 2);
    svc.send_message(SessionId(3), b"to-session").unwrap();

    assert_eq!(sock1.sent(), vec![b"to-user".to_vec()]);
    assert_eq!(sock2.sent(), vec![b"to-user".to_vec()]);
    assert_eq!(sock3.sent(), vec![b"to-session".to_vec()]);
}

#[tokio::test]
async fn test_client_address_follows_registration() {
    let svc = service();
    accept(&svc, 1, 4001);

    assert_eq!(
        svc.client_address(SessionId(1)),
        Some(SocketAddr::from(([127, 0, 0, 1], 4001)))
    );

    svc.kick_by_session_id(SessionId(1), "done").await;
    assert_eq!(svc.client_address(SessionId(1)), None);
}

#[tokio::test]
async fn test_settings_import_survives_rebind() {
    // Settings are identity-independent: unbinding and rebinding a
    // session leaves its store untouched.
    let svc = service();
    let (session, _) = accept(&svc, 1, 4001);

    let mut settings = SettingsMap::new();
    settings.insert("room".into(), json!("lobby"));
    settings.insert("score".into(), json!(3));
    svc.import_all(SessionId(1), settings).unwrap();

    svc.bind(SessionId(1), UserId(7)).await.unwrap();
    svc.unbind(SessionId(1), UserId(7)).await.unwrap();
    svc.bind(SessionId(1), UserId(8)).await.unwrap();

    assert_eq!(session.get("room"), Some(json!("lobby")));
    assert_eq!(session.get("score"), Some(json!(3)));
}
