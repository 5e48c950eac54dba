//! Session notifications: a small dispatcher owned by each entity.
//!
//! [`Session`](crate::Session) and
//! [`FrontendSession`](crate::FrontendSession) both announce lifecycle
//! transitions (`bind`, `unbind`, `closed`) to interested handler code.
//! Rather than inheriting emitter behavior, each entity *owns* a
//! [`Notifier`] and exposes it through the [`Notifiable`] capability —
//! plain composition, nothing magic.
//!
//! Delivery semantics: emission is synchronous, listeners run in
//! registration order, and a panicking listener propagates to whoever
//! emitted. There is no queue and no retry.

use std::sync::{Arc, Mutex};

use portico_protocol::UserId;

use crate::frontend::FrontendSession;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The kinds of notification a session can emit.
///
/// Listeners subscribe per kind; an emitted event only reaches the
/// listeners registered for its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    /// The session was bound to a user.
    Bind,
    /// The session was unbound from its user.
    Unbind,
    /// The session finished its close transition.
    Closed,
}

/// A lifecycle notification delivered to registered listeners.
pub enum SessionEvent {
    /// Emitted after a successful bind. Carries the newly bound user.
    Bound { uid: UserId },

    /// Emitted after a successful unbind. Carries the formerly bound user.
    Unbound { uid: UserId },

    /// Emitted exactly once when a session closes. Carries a fresh
    /// [`FrontendSession`] projection taken at close time plus the close
    /// reason, so listeners can inspect final state without touching the
    /// live session.
    Closed {
        session: FrontendSession,
        reason: String,
    },
}

impl SessionEvent {
    /// Returns which subscription kind this event is delivered to.
    pub fn kind(&self) -> SessionEventKind {
        match self {
            Self::Bound { .. } => SessionEventKind::Bind,
            Self::Unbound { .. } => SessionEventKind::Unbind,
            Self::Closed { .. } => SessionEventKind::Closed,
        }
    }
}

/// A registered notification listener.
///
/// `Arc` rather than `Box` because `FrontendSession::on` registers the
/// same listener on two dispatchers at once.
pub type EventListener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// A per-entity notification dispatcher.
///
/// Listeners are invoked synchronously and in registration order.
/// Emission runs against a snapshot of the listener list, so a listener
/// may subscribe further listeners without deadlocking the dispatcher
/// (newly added listeners only see later events).
#[derive(Default)]
pub struct Notifier {
    listeners: Mutex<Vec<(SessionEventKind, EventListener)>>,
}

impl Notifier {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for one event kind.
    pub fn subscribe(&self, kind: SessionEventKind, listener: EventListener) {
        self.listeners.lock().unwrap().push((kind, listener));
    }

    /// Delivers an event to every listener registered for its kind.
    pub fn emit(&self, event: &SessionEvent) {
        let targets: Vec<EventListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| *kind == event.kind())
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in targets {
            listener(event);
        }
    }
}

/// Capability of entities that announce session lifecycle events.
pub trait Notifiable {
    /// The entity's dispatcher.
    fn notifier(&self) -> &Notifier;

    /// Registers a listener for `kind` events on this entity.
    fn on(&self, kind: SessionEventKind, listener: EventListener) {
        self.notifier().subscribe(kind, listener);
    }
}

// =========================================================================
// Tests
// =========================================================================
