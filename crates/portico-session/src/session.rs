//! Session: the server-side record of one live client connection.
//!
//! A session is created by [`SessionService::create`] when the transport
//! layer accepts a connection, and tracks:
//! - WHO the connection is (`SessionId`, optional bound `UserId`)
//! - WHERE it lives (`FrontendId` of the owning server instance)
//! - WHAT handler code stashed on it (the settings store)
//! - HOW to reach the client (the exclusive [`Socket`] handle)
//!
//! [`SessionService::create`]: crate::SessionService::create

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};

use portico_protocol::{
    FrontendId, SessionId, SettingsMap, SettingsValue, UserId,
};

use crate::events::{Notifiable, Notifier, SessionEvent};
use crate::frontend::FrontendSession;
use crate::service::ServiceCore;
use crate::socket::{Socket, SocketError};

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The lifecycle state of a session.
///
/// Two states, one transition, taken exactly once:
///
/// ```text
///   Inited ──(closed)──→ Closed
/// ```
///
/// There is no disconnected-but-resumable state: once a session closes,
/// the client must connect again and gets a brand-new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Live and registered with the service.
    Inited,
    /// Close transition has run; the session is deregistered and the
    /// socket teardown is scheduled.
    Closed,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One live client connection on this frontend.
///
/// Sessions are owned by the [`SessionService`](crate::SessionService)
/// registry and shared as `Arc<Session>` with the transport layer. The
/// `uid` field is mutated only by the service inside its locked critical
/// sections — that single lock serializes every identity change, which
/// is what keeps the registry's uid index and this field in agreement.
///
/// The back-reference to the service is weak: the registry owns its
/// sessions, never the other way around.
pub struct Session {
    id: SessionId,
    frontend_id: FrontendId,
    socket: Arc<dyn Socket>,
    service: Weak<ServiceCore>,
    weak_self: Weak<Session>,
    state: Mutex<SessionState>,
    uid: Mutex<Option<UserId>>,
    settings: Mutex<SettingsMap>,
    events: Notifier,
}

impl Session {
    /// Builds a session record. Only the service constructs sessions
    /// (through `Arc::new_cyclic`, so the record knows its own `Arc`).
    pub(crate) fn new(
        id: SessionId,
        frontend_id: FrontendId,
        socket: Arc<dyn Socket>,
        service: Weak<ServiceCore>,
        weak_self: Weak<Session>,
    ) -> Self {
        Self {
            id,
            frontend_id,
            socket,
            service,
            weak_self,
            state: Mutex::new(SessionState::Inited),
            uid: Mutex::new(None),
            settings: Mutex::new(SettingsMap::new()),
            events: Notifier::new(),
        }
    }

    // -- Identity ---------------------------------------------------------

    /// The session's unique id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The frontend instance that owns this session.
    pub fn frontend_id(&self) -> &FrontendId {
        &self.frontend_id
    }

    /// The bound user, if any.
    pub fn uid(&self) -> Option<UserId> {
        *self.uid.lock().unwrap()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Returns `true` once [`closed`](Self::closed) has run.
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// The remote peer's address, as reported by the socket.
    pub fn remote_address(&self) -> Option<SocketAddr> {
        self.socket.remote_address()
    }

    /// Writes the uid field. Crate-private: callers go through
    /// [`SessionService::bind`](crate::SessionService::bind), which holds
    /// the registry lock across its check-and-mutate.
    pub(crate) fn set_uid(&self, uid: Option<UserId>) {
        *self.uid.lock().unwrap() = uid;
    }

    /// Hands out the weak service reference for projections.
    pub(crate) fn service_handle(&self) -> Weak<ServiceCore> {
        Weak::clone(&self.service)
    }

    /// Hands out the weak self reference for projections.
    pub(crate) fn weak_handle(&self) -> Weak<Session> {
        Weak::clone(&self.weak_self)
    }

    /// Delivers an event to this session's listeners.
    pub(crate) fn emit(&self, event: &SessionEvent) {
        self.events.emit(event);
    }

    // -- Settings ---------------------------------------------------------

    /// Sets one settings key.
    pub fn set(&self, key: impl Into<String>, value: SettingsValue) {
        self.settings.lock().unwrap().insert(key.into(), value);
    }

    /// Merges an entire mapping into the settings store. Existing keys
    /// are overwritten, others are left alone.
    pub fn set_all(&self, values: SettingsMap) {
        self.settings.lock().unwrap().extend(values);
    }

    /// Reads one settings value. `None` if the key was never set.
    pub fn get(&self, key: &str) -> Option<SettingsValue> {
        self.settings.lock().unwrap().get(key).cloned()
    }

    /// Deletes one settings key, returning the old value.
    ///
    /// Scoped strictly to the settings store — identity fields are not
    /// reachable from here.
    pub fn remove(&self, key: &str) -> Option<SettingsValue> {
        self.settings.lock().unwrap().remove(key)
    }

    /// Clones the current settings store.
    pub(crate) fn settings_snapshot(&self) -> SettingsMap {
        self.settings.lock().unwrap().clone()
    }

    // -- Messaging --------------------------------------------------------

    /// Forwards one encoded message to the socket unchanged.
    pub fn send(&self, msg: &[u8]) -> Result<(), SocketError> {
        self.socket.send(msg)
    }

    /// Forwards a batch of encoded messages to the socket unchanged.
    pub fn send_batch(&self, msgs: &[Vec<u8>]) -> Result<(), SocketError> {
        self.socket.send_batch(msgs)
    }

    // -- Projection -------------------------------------------------------

    /// Takes a fresh [`FrontendSession`] projection: copied identity, a
    /// point-in-time deep copy of the settings store.
    pub fn to_frontend_session(&self) -> FrontendSession {
        FrontendSession::from_session(self)
    }

    // -- Close protocol ---------------------------------------------------

    /// Runs the terminal close transition. Idempotent — the second and
    /// later calls are no-ops.
    ///
    /// Order matters and is part of the contract:
    /// 1. state flips to [`SessionState::Closed`]
    /// 2. the session deregisters itself from the service
    /// 3. the `closed` notification fires, carrying a fresh
    ///    [`FrontendSession`] and the reason
    /// 4. the socket learns closing has begun (with the reason)
    /// 5. `Socket::disconnect` is scheduled one tick later, so the
    ///    synchronous `closed` listeners above always run before the
    ///    transport is torn down
    ///
    /// Must be called from within a Tokio runtime (step 5 spawns).
    pub fn closed(&self, reason: &str) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }

        tracing::info!(sid = %self.id, %reason, "session closed");

        if let Some(service) = self.service.upgrade() {
            service.remove(self.id);
        }

        let event = SessionEvent::Closed {
            session: self.to_frontend_session(),
            reason: reason.to_string(),
        };
        self.events.emit(&event);

        self.socket.notify_closing(reason);

        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            socket.disconnect();
        });
    }
}

impl Notifiable for Session {
    fn notifier(&self) -> &Notifier {
        &self.events
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for the session record itself. Registry interplay
    //! (bind/unbind/kick) is covered in `service.rs`; here the session
    //! is built standalone with a dead service reference.

    use serde_json::json;

    use super::*;
    use crate::socket::testing::RecordingSocket;

    fn standalone_session(socket: Arc<RecordingSocket>) -> Arc<Session> {
        Arc::new_cyclic(|weak| {
            Session::new(
                SessionId(1),
                FrontendId::from("front-1"),
                socket,
                Weak::new(),
                Weak::clone(weak),
            )
        })
    }

    #[test]
    fn test_new_session_starts_inited_and_unbound() {
        let session = standalone_session(RecordingSocket::new());

        assert_eq!(session.state(), SessionState::Inited);
        assert!(!session.is_closed());
        assert_eq!(session.uid(), None);
        assert_eq!(session.id(), SessionId(1));
        assert_eq!(session.frontend_id().as_str(), "front-1");
    }

    #[test]
    fn test_set_and_get_round_trip() {
        let session = standalone_session(RecordingSocket::new());

        session.set("score", json!(10));

        assert_eq!(session.get("score"), Some(json!(10)));
        assert_eq!(session.get("missing"), None);
    }

    #[test]
    fn test_set_all_merges_and_overwrites() {
        let session = standalone_session(RecordingSocket::new());
        session.set("score", json!(10));
        session.set("room", json!("lobby"));

        let mut update = SettingsMap::new();
        update.insert("score".into(), json!(20));
        update.insert("team".into(), json!("red"));
        session.set_all(update);

        assert_eq!(session.get("score"), Some(json!(20)));
        assert_eq!(session.get("room"), Some(json!("lobby")));
        assert_eq!(session.get("team"), Some(json!("red")));
    }

    #[test]
    fn test_remove_only_touches_settings() {
        let session = standalone_session(RecordingSocket::new());
        session.set("score", json!(10));

        assert_eq!(session.remove("score"), Some(json!(10)));
        assert_eq!(session.remove("score"), None);

        // Identity survives any remove call.
        assert_eq!(session.id(), SessionId(1));
        assert_eq!(session.frontend_id().as_str(), "front-1");
    }

    #[test]
    fn test_send_forwards_bytes_unchanged() {
        let socket = RecordingSocket::new();
        let session = standalone_session(Arc::clone(&socket));

        session.send(b"hello").unwrap();
        session
            .send_batch(&[b"a".to_vec(), b"b".to_vec()])
            .unwrap();

        assert_eq!(
            socket.sent(),
            vec![b"hello".to_vec(), b"a".to_vec(), b"b".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_closed_twice_disconnects_once() {
        let socket = RecordingSocket::new();
        let session = standalone_session(Arc::clone(&socket));

        session.closed("gone");
        session.closed("gone");

        assert!(session.is_closed());
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(socket.disconnect_count(), 1);
        assert_eq!(socket.closing_reasons(), vec!["gone".to_string()]);
    }

    #[tokio::test]
    async fn test_closed_notifies_socket_before_disconnect() {
        let socket = RecordingSocket::new();
        let session = standalone_session(Arc::clone(&socket));

        session.closed("kick");

        // The closing notification is synchronous; the disconnect is
        // deferred and may not have run yet.
        assert_eq!(socket.closing_reasons(), vec!["kick".to_string()]);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(socket.disconnect_count(), 1);
    }
}
