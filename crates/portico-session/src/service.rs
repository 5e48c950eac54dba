//! The session service: process-wide registry of live sessions.
//!
//! This is the central piece of the session layer. It's responsible for:
//! - Creating sessions when the transport layer accepts connections
//! - Binding/unbinding sessions to authenticated users
//! - Keeping the sid table and the uid index in agreement
//! - Kicking sessions (administrative forced close)
//! - Importing handler-pushed settings into sessions
//!
//! # Concurrency note
//!
//! The registry lives behind a single mutex, and every identity
//! mutation — bind, unbind, remove — runs entirely inside one locked
//! critical section. That single lock serializes the registry the way
//! the original single-threaded design did: no two mutations interleave
//! within one logical operation. Listener callbacks and socket calls
//! never run while the lock is held.
//!
//! Bind, unbind, and kick hand their outcome back one scheduler tick
//! after it is determined, even when it is known immediately. Callers
//! get a uniform "fire now, observe later" contract either way.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use portico_protocol::{
    FrontendId, SessionId, SettingsMap, SettingsValue, UserId,
};

use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::session::Session;
use crate::socket::Socket;

// ---------------------------------------------------------------------------
// SessionServiceConfig
// ---------------------------------------------------------------------------

/// Configuration for the session service, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct SessionServiceConfig {
    /// When `true`, each user may have at most one bound session at a
    /// time; a second bind for the same user fails with
    /// [`SessionError::SingleSessionViolation`]. Default: `false`
    /// (a user may be connected from several devices at once).
    pub single_session: bool,
}

// ---------------------------------------------------------------------------
// SessionService
// ---------------------------------------------------------------------------

/// Process-wide registry that owns every live [`Session`].
///
/// Cheap to clone — all clones share the same registry. Create one per
/// frontend process and hand clones to the transport layer and to
/// whatever administrative surface needs kick/broadcast access.
///
/// ## Lifecycle
///
/// ```text
/// create() ──→ bind() ──→ import()/send …  ──→ closed()
///                │                               │
///                ▼                               ▼
///           [uid index]                    remove() + disconnect
/// ```
#[derive(Clone)]
pub struct SessionService {
    core: Arc<ServiceCore>,
}

/// The shared state behind every [`SessionService`] clone. Sessions and
/// projections hold this weakly — the registry owns its sessions, never
/// the reverse.
pub(crate) struct ServiceCore {
    single_session: bool,
    registry: Mutex<Registry>,
}

/// The two indexes, always mutated together under one lock.
///
/// Invariant: a session's `uid` is `Some(u)` iff it appears exactly once
/// in `uid_map[u]`, and every session in `uid_map` is present in
/// `sessions` under its own id.
#[derive(Default)]
struct Registry {
    /// All live sessions, keyed by session id.
    sessions: HashMap<SessionId, Arc<Session>>,

    /// Sessions grouped by bound user, in bind order. A bucket is
    /// dropped the moment it becomes empty — `get_by_uid` answers
    /// "absent", never "empty".
    uid_map: HashMap<UserId, Vec<Arc<Session>>>,
}

/// What a successful bind actually did, so the caller knows whether to
/// notify listeners.
enum BindOutcome {
    Bound,
    NoChange,
}

impl SessionService {
    /// Creates an empty session service with the given config.
    pub fn new(config: SessionServiceConfig) -> Self {
        Self {
            core: Arc::new(ServiceCore {
                single_session: config.single_session,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Constructs and registers a new session around a freshly accepted
    /// connection.
    ///
    /// The transport layer is responsible for sid uniqueness — a
    /// duplicate sid silently overwrites the previous registry entry
    /// (logged at `warn`), it does not fail.
    pub fn create(
        &self,
        sid: SessionId,
        frontend_id: impl Into<FrontendId>,
        socket: Arc<dyn Socket>,
    ) -> Arc<Session> {
        let frontend_id = frontend_id.into();
        let session = Arc::new_cyclic(|weak| {
            Session::new(
                sid,
                frontend_id.clone(),
                socket,
                Arc::downgrade(&self.core),
                weak.clone(),
            )
        });

        let previous = {
            let mut registry = self.core.registry.lock().unwrap();
            registry.sessions.insert(sid, Arc::clone(&session))
        };
        if previous.is_some() {
            tracing::warn!(%sid, "duplicate sid, previous session overwritten");
        }

        tracing::info!(%sid, frontend = %frontend_id, "session created");
        session
    }

    /// Binds session `sid` to `uid`.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] — sid is unregistered
    /// - [`SessionError::AlreadyBound`] — the session is bound to a
    ///   *different* user (binding again to the same user is a no-op
    ///   success)
    /// - [`SessionError::SingleSessionViolation`] — the single-session
    ///   policy is enabled and the user already has a bound session
    ///
    /// The outcome — success or error — is delivered on the next
    /// scheduler tick.
    pub async fn bind(
        &self,
        sid: SessionId,
        uid: UserId,
    ) -> Result<(), SessionError> {
        self.core.bind(sid, uid).await
    }

    /// Unbinds session `sid` from `uid`. Inverse of [`bind`](Self::bind).
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] — sid is unregistered
    /// - [`SessionError::NotBound`] — the session is unbound, or bound
    ///   to a different user
    pub async fn unbind(
        &self,
        sid: SessionId,
        uid: UserId,
    ) -> Result<(), SessionError> {
        self.core.unbind(sid, uid).await
    }

    /// Unconditionally deregisters a session from the sid table and,
    /// if bound, from its uid bucket. No-op when sid is unregistered.
    ///
    /// This only drops the registry entries — it does not run the close
    /// protocol. [`Session::closed`] calls this as part of closing.
    pub fn remove(&self, sid: SessionId) {
        self.core.remove(sid);
    }

    /// Writes one settings key into the session's store.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] — sid is unregistered. Unlike bind,
    /// the failure surfaces directly, not deferred.
    pub fn import(
        &self,
        sid: SessionId,
        key: &str,
        value: SettingsValue,
    ) -> Result<(), SessionError> {
        self.core.import(sid, key, value)
    }

    /// Merges an entire settings mapping into the session's store.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] — sid is unregistered.
    pub fn import_all(
        &self,
        sid: SessionId,
        settings: SettingsMap,
    ) -> Result<(), SessionError> {
        self.core.import_all(sid, settings)
    }

    /// Closes every session currently bound to `uid`.
    ///
    /// Always succeeds — no bound sessions means nothing to do. Returns
    /// after all closures have been triggered, one tick deferred.
    pub async fn kick(&self, uid: UserId, reason: &str) {
        self.core.kick(uid, reason).await;
    }

    /// Closes exactly one session, if present. Same contract as
    /// [`kick`](Self::kick).
    pub async fn kick_by_session_id(&self, sid: SessionId, reason: &str) {
        self.core.kick_by_session_id(sid, reason).await;
    }

    /// Returns the remote address of the session's socket, or `None`
    /// when sid is unregistered (or the transport doesn't know).
    pub fn client_address(&self, sid: SessionId) -> Option<SocketAddr> {
        self.get(sid).and_then(|session| session.remote_address())
    }

    /// Number of currently registered sessions.
    pub fn session_count(&self) -> usize {
        self.core.registry.lock().unwrap().sessions.len()
    }

    /// Looks up a session by id.
    pub fn get(&self, sid: SessionId) -> Option<Arc<Session>> {
        self.core.get(sid)
    }

    /// Returns the sessions bound to `uid`, in bind order.
    ///
    /// `None` when the user has no bound session — never an empty list.
    pub fn get_by_uid(&self, uid: UserId) -> Option<Vec<Arc<Session>>> {
        self.core.get_by_uid(uid)
    }

    /// Runs `f` over every registered session.
    ///
    /// Iterates a snapshot taken up front, so `f` may call back into
    /// the service (including removal) without disturbing the walk.
    pub fn for_each_session(&self, mut f: impl FnMut(&Arc<Session>)) {
        let snapshot: Vec<Arc<Session>> = {
            let registry = self.core.registry.lock().unwrap();
            registry.sessions.values().cloned().collect()
        };
        for session in &snapshot {
            f(session);
        }
    }

    /// Runs `f` over every session currently bound to a user.
    /// Snapshot semantics as in [`for_each_session`](Self::for_each_session).
    pub fn for_each_bound_session(&self, mut f: impl FnMut(&Arc<Session>)) {
        let snapshot: Vec<Arc<Session>> = {
            let registry = self.core.registry.lock().unwrap();
            registry.uid_map.values().flatten().cloned().collect()
        };
        for session in &snapshot {
            f(session);
        }
    }

    /// Forwards one encoded message to the session's socket.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] for an unregistered sid, or the
    /// socket's own failure.
    pub fn send_message(
        &self,
        sid: SessionId,
        msg: &[u8],
    ) -> Result<(), SessionError> {
        let session = self.get(sid).ok_or_else(|| {
            tracing::warn!(%sid, "send to unknown session");
            SessionError::NotFound(sid)
        })?;
        Ok(session.send(msg)?)
    }

    /// Forwards one encoded message to every session bound to `uid`.
    ///
    /// Best-effort broadcast: individual socket failures are logged and
    /// skipped. Returns the number of sessions the message reached; `0`
    /// when the user has no bound session.
    pub fn send_message_by_uid(&self, uid: UserId, msg: &[u8]) -> usize {
        let targets = self.get_by_uid(uid).unwrap_or_default();
        let mut delivered = 0;
        for session in &targets {
            match session.send(msg) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        sid = %session.id(), %uid, error = %e,
                        "broadcast send failed"
                    );
                }
            }
        }
        delivered
    }
}

impl Default for SessionService {
    fn default() -> Self {
        Self::new(SessionServiceConfig::default())
    }
}

// ---------------------------------------------------------------------------
// ServiceCore
// ---------------------------------------------------------------------------

impl ServiceCore {
    pub(crate) async fn bind(
        &self,
        sid: SessionId,
        uid: UserId,
    ) -> Result<(), SessionError> {
        let outcome = self.bind_locked(sid, uid);

        // Notify outside the critical section so listeners can call
        // back into the registry.
        if let Ok((session, BindOutcome::Bound)) = &outcome {
            tracing::info!(%sid, %uid, "session bound");
            session.emit(&SessionEvent::Bound { uid });
        }

        // Uniform async contract: the outcome lands one tick later even
        // when it was determined synchronously above.
        tokio::task::yield_now().await;
        outcome.map(|_| ())
    }

    fn bind_locked(
        &self,
        sid: SessionId,
        uid: UserId,
    ) -> Result<(Arc<Session>, BindOutcome), SessionError> {
        let mut registry = self.registry.lock().unwrap();

        let session = registry
            .sessions
            .get(&sid)
            .cloned()
            .ok_or(SessionError::NotFound(sid))?;

        if let Some(current) = session.uid() {
            if current == uid {
                return Ok((session, BindOutcome::NoChange));
            }
            return Err(SessionError::AlreadyBound { sid, current });
        }

        if self.single_session && registry.uid_map.contains_key(&uid) {
            return Err(SessionError::SingleSessionViolation(uid));
        }

        let bucket = registry.uid_map.entry(uid).or_default();
        // Defensive: an unbound session can't be in the bucket, but if
        // it somehow is, binding again must not duplicate the entry.
        if bucket.iter().any(|s| s.id() == sid) {
            return Ok((session, BindOutcome::NoChange));
        }

        bucket.push(Arc::clone(&session));
        session.set_uid(Some(uid));
        Ok((session, BindOutcome::Bound))
    }

    pub(crate) async fn unbind(
        &self,
        sid: SessionId,
        uid: UserId,
    ) -> Result<(), SessionError> {
        let result = self.unbind_locked(sid, uid);

        if let Ok(session) = &result {
            tracing::info!(%sid, %uid, "session unbound");
            session.emit(&SessionEvent::Unbound { uid });
        }

        tokio::task::yield_now().await;
        result.map(|_| ())
    }

    fn unbind_locked(
        &self,
        sid: SessionId,
        uid: UserId,
    ) -> Result<Arc<Session>, SessionError> {
        let mut registry = self.registry.lock().unwrap();

        let session = registry
            .sessions
            .get(&sid)
            .cloned()
            .ok_or(SessionError::NotFound(sid))?;

        match session.uid() {
            Some(current) if current == uid => {}
            _ => return Err(SessionError::NotBound { sid, uid }),
        }

        if let Some(bucket) = registry.uid_map.get_mut(&uid) {
            bucket.retain(|s| s.id() != sid);
            if bucket.is_empty() {
                registry.uid_map.remove(&uid);
            }
        }
        session.set_uid(None);
        Ok(session)
    }

    pub(crate) fn remove(&self, sid: SessionId) -> Option<Arc<Session>> {
        let mut registry = self.registry.lock().unwrap();

        let session = registry.sessions.remove(&sid)?;
        if let Some(uid) = session.uid() {
            if let Some(bucket) = registry.uid_map.get_mut(&uid) {
                bucket.retain(|s| s.id() != sid);
                if bucket.is_empty() {
                    registry.uid_map.remove(&uid);
                }
            }
        }

        tracing::debug!(%sid, "session deregistered");
        Some(session)
    }

    pub(crate) fn import(
        &self,
        sid: SessionId,
        key: &str,
        value: SettingsValue,
    ) -> Result<(), SessionError> {
        let session = self.get(sid).ok_or(SessionError::NotFound(sid))?;
        session.set(key, value);
        tracing::debug!(%sid, key, "setting imported");
        Ok(())
    }

    pub(crate) fn import_all(
        &self,
        sid: SessionId,
        settings: SettingsMap,
    ) -> Result<(), SessionError> {
        let session = self.get(sid).ok_or(SessionError::NotFound(sid))?;
        session.set_all(settings);
        tracing::debug!(%sid, "settings imported");
        Ok(())
    }

    async fn kick(&self, uid: UserId, reason: &str) {
        // Snapshot the targets first — closing a session removes it
        // from the bucket being walked.
        let targets: Vec<Arc<Session>> = {
            let registry = self.registry.lock().unwrap();
            registry.uid_map.get(&uid).cloned().unwrap_or_default()
        };

        if !targets.is_empty() {
            tracing::info!(
                %uid, count = targets.len(), %reason,
                "kicking bound sessions"
            );
        }
        for session in &targets {
            session.closed(reason);
        }

        tokio::task::yield_now().await;
    }

    async fn kick_by_session_id(&self, sid: SessionId, reason: &str) {
        if let Some(session) = self.get(sid) {
            tracing::info!(%sid, %reason, "kicking session");
            session.closed(reason);
        }
        tokio::task::yield_now().await;
    }

    fn get(&self, sid: SessionId) -> Option<Arc<Session>> {
        self.registry.lock().unwrap().sessions.get(&sid).cloned()
    }

    fn get_by_uid(&self, uid: UserId) -> Option<Vec<Arc<Session>>> {
        self.registry.lock().unwrap().uid_map.get(&uid).cloned()
    }
}

// =========================================================================
// Tests
// =========================================================================
