//! A self-contained tour of the Portico session layer.
//!
//! Plays both roles around the session core: a fake transport layer
//! (the [`LoopbackSocket`]) and fake handler code, then walks through
//! the whole lifecycle — accept, authenticate, stash settings, export,
//! broadcast, kick.
//!
//! Run with logging to watch the registry work:
//!
//! ```text
//! RUST_LOG=debug cargo run -p loopback
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use portico_protocol::{SessionId, UserId};
use portico_session::{
    Notifiable, SessionEvent, SessionEventKind, SessionService,
    SessionServiceConfig, Socket, SocketError,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Fake transport
// ---------------------------------------------------------------------------

/// A socket that "delivers" by logging. Stands in for the real
/// transport-layer connection handle.
struct LoopbackSocket {
    peer: SocketAddr,
}

impl Socket for LoopbackSocket {
    fn send(&self, msg: &[u8]) -> Result<(), SocketError> {
        tracing::info!(peer = %self.peer, msg = %String::from_utf8_lossy(msg), "deliver");
        Ok(())
    }

    fn send_batch(&self, msgs: &[Vec<u8>]) -> Result<(), SocketError> {
        for msg in msgs {
            self.send(msg)?;
        }
        Ok(())
    }

    fn remote_address(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }

    fn notify_closing(&self, reason: &str) {
        tracing::info!(peer = %self.peer, %reason, "closing");
    }

    fn disconnect(&self) {
        tracing::info!(peer = %self.peer, "disconnected");
    }
}

fn accept(svc: &SessionService, sid: u64, port: u16) -> SessionId {
    let socket = Arc::new(LoopbackSocket {
        peer: SocketAddr::from(([127, 0, 0, 1], port)),
    });
    svc.create(SessionId(sid), "demo-frontend", socket);
    SessionId(sid)
}

// ---------------------------------------------------------------------------
// Walkthrough
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let svc = SessionService::new(SessionServiceConfig::default());

    // Two devices of the same user connect, plus one other player.
    let alice_phone = accept(&svc, 1, 5001);
    let alice_laptop = accept(&svc, 2, 5002);
    let bob = accept(&svc, 3, 5003);
    tracing::info!(sessions = svc.session_count(), "transport accepted");

    // Authentication resolved their uids; bind them.
    svc.bind(alice_phone, UserId(42)).await?;
    svc.bind(alice_laptop, UserId(42)).await?;
    svc.bind(bob, UserId(7)).await?;

    // Handler code works against the projection only.
    let session = svc.get(bob).expect("bob is registered");
    let frontend = session.to_frontend_session();
    frontend.on(
        SessionEventKind::Closed,
        Arc::new(|event| {
            if let SessionEvent::Closed { session, reason } = event {
                tracing::info!(sid = %session.id(), %reason, "handler saw close");
            }
        }),
    );
    frontend.set("room", json!("lobby"));
    frontend.set("score", json!(0));
    frontend.push_all()?;

    let snapshot = frontend.export();
    tracing::info!(
        snapshot = %serde_json::to_string(&snapshot)?,
        "exported for backend"
    );

    // Broadcast to all of alice's devices, then a direct message to bob.
    let delivered = svc.send_message_by_uid(UserId(42), b"patch ready");
    tracing::info!(delivered, "broadcast to u-42");
    svc.send_message(bob, b"welcome to the lobby")?;

    // Admin kicks alice everywhere; bob drops from the transport side.
    svc.kick(UserId(42), "banned").await;
    svc.kick_by_session_id(bob, "demo over").await;

    // Give the deferred disconnects a tick to land.
    tokio::time::sleep(Duration::from_millis(20)).await;
    tracing::info!(sessions = svc.session_count(), "all sessions drained");

    Ok(())
}
