//! FrontendSession: the restricted projection handed to handler code.
//!
//! Handlers never touch a [`Session`] directly — they get a
//! `FrontendSession`, which carries a copy of the identity fields, a
//! point-in-time deep copy of the settings store, and forwarders for
//! the identity-changing operations. That keeps transport internals
//! (the socket, the live registry entry) out of reach of application
//! code.
//!
//! The two `uid` mirrors are independent: a successful bind through this
//! projection updates the local copy, but later changes to the source
//! session are not reflected here until a fresh projection is taken.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use portico_protocol::{
    FrontendId, SessionId, SessionSnapshot, SettingsMap, SettingsValue,
    UserId,
};

use crate::error::SessionError;
use crate::events::{EventListener, Notifiable, Notifier, SessionEventKind};
use crate::service::ServiceCore;
use crate::session::Session;

/// Handler-facing view of one session.
///
/// Created by [`Session::to_frontend_session`]; every projection is
/// independent of every other.
pub struct FrontendSession {
    id: SessionId,
    frontend_id: FrontendId,
    uid: Mutex<Option<UserId>>,
    settings: Mutex<SettingsMap>,
    session: Weak<Session>,
    service: Weak<ServiceCore>,
    events: Notifier,
}

impl FrontendSession {
    /// Projects a session: identity fields by copy, settings by deep
    /// copy, the service reference shared with the source.
    pub(crate) fn from_session(session: &Session) -> Self {
        Self {
            id: session.id(),
            frontend_id: session.frontend_id().clone(),
            uid: Mutex::new(session.uid()),
            settings: Mutex::new(session.settings_snapshot()),
            session: session.weak_handle(),
            service: session.service_handle(),
            events: Notifier::new(),
        }
    }

    fn service(&self) -> Result<Arc<ServiceCore>, SessionError> {
        self.service
            .upgrade()
            .ok_or(SessionError::ServiceUnavailable)
    }

    // -- Identity ---------------------------------------------------------

    /// The session's unique id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The frontend instance that owns the session.
    pub fn frontend_id(&self) -> &FrontendId {
        &self.frontend_id
    }

    /// This projection's copy of the bound user.
    pub fn uid(&self) -> Option<UserId> {
        *self.uid.lock().unwrap()
    }

    /// Binds the underlying session to `uid` through the service.
    ///
    /// The local uid mirror is updated only when the service reports
    /// success; on error it is left untouched.
    pub async fn bind(&self, uid: UserId) -> Result<(), SessionError> {
        self.service()?.bind(self.id, uid).await?;
        *self.uid.lock().unwrap() = Some(uid);
        Ok(())
    }

    /// Unbinds the underlying session from `uid` through the service.
    pub async fn unbind(&self, uid: UserId) -> Result<(), SessionError> {
        self.service()?.unbind(self.id, uid).await?;
        *self.uid.lock().unwrap() = None;
        Ok(())
    }

    // -- Settings (local copy only) ---------------------------------------

    /// Sets one key in the local settings copy. No service round-trip —
    /// call [`push`](Self::push) or [`push_all`](Self::push_all) to
    /// write back to the source session.
    pub fn set(&self, key: impl Into<String>, value: SettingsValue) {
        self.settings.lock().unwrap().insert(key.into(), value);
    }

    /// Reads one value from the local settings copy.
    pub fn get(&self, key: &str) -> Option<SettingsValue> {
        self.settings.lock().unwrap().get(key).cloned()
    }

    /// Pushes one locally-set value back into the source session.
    ///
    /// Pushing a key that was never set locally is a no-op success.
    pub fn push(&self, key: &str) -> Result<(), SessionError> {
        let value = self.settings.lock().unwrap().get(key).cloned();
        match value {
            Some(value) => self.service()?.import(self.id, key, value),
            None => {
                tracing::debug!(sid = %self.id, key, "push of unset key");
                Ok(())
            }
        }
    }

    /// Pushes the entire local settings copy back into the source
    /// session (merge, not replace).
    pub fn push_all(&self) -> Result<(), SessionError> {
        let snapshot = self.settings.lock().unwrap().clone();
        self.service()?.import_all(self.id, snapshot)
    }

    // -- Export -----------------------------------------------------------

    /// Returns the serializable snapshot: exactly `id`, `frontend_id`,
    /// `uid`, and `settings`, nothing else.
    pub fn export(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            frontend_id: self.frontend_id.clone(),
            uid: self.uid(),
            settings: self.settings.lock().unwrap().clone(),
        }
    }
}

impl Notifiable for FrontendSession {
    fn notifier(&self) -> &Notifier {
        &self.events
    }

    /// Registers the listener on this projection *and* on the underlying
    /// session, so session-originated notifications (`closed` above all)
    /// reach handler code that only ever saw the frontend layer.
    fn on(&self, kind: SessionEventKind, listener: EventListener) {
        if let Some(session) = self.session.upgrade() {
            session.notifier().subscribe(kind, Arc::clone(&listener));
        }
        self.events.subscribe(kind, listener);
    }
}

impl fmt::Debug for FrontendSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrontendSession")
            .field("id", &self.id)
            .field("frontend_id", &self.frontend_id)
            .field("uid", &self.uid())
            .finish_non_exhaustive()
    }
}

// =========================================================================
// Tests
// =========================================================================
