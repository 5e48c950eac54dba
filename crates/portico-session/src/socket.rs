//! The socket capability consumed from the transport layer.
//!
//! Portico's session core does not implement networking — accepting
//! connections, framing, and the actual send/receive loop belong to the
//! transport layer. What the core needs is a narrow handle to the
//! connection behind a session: a way to push bytes out, learn the peer
//! address, and tear the connection down when the session closes.
//!
//! The transport layer implements [`Socket`] for its connection type and
//! hands one to [`SessionService::create`](crate::SessionService::create).
//! A typical implementation is a thin wrapper over an outbound channel
//! drained by the connection's writer task.

use std::net::SocketAddr;

/// Errors surfaced by a [`Socket`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The connection is gone.
    #[error("socket closed")]
    Closed,
}

/// Transport-layer handle to one live connection.
///
/// Implementations are expected to be cheap, non-blocking fronts over
/// the real connection (queue the bytes, return immediately) — the
/// session core calls these methods without any timeout or escalation
/// path.
///
/// # Example
///
/// ```rust
/// use std::net::SocketAddr;
///
/// use portico_session::{Socket, SocketError};
/// use tokio::sync::mpsc;
///
/// /// A socket backed by an outbound channel; a writer task owns the
/// /// actual network stream and drains the receiver.
/// struct ChannelSocket {
///     outbound: mpsc::UnboundedSender<Vec<u8>>,
///     peer: SocketAddr,
/// }
///
/// impl Socket for ChannelSocket {
///     fn send(&self, msg: &[u8]) -> Result<(), SocketError> {
///         self.outbound
///             .send(msg.to_vec())
///             .map_err(|_| SocketError::Closed)
///     }
///
///     fn send_batch(&self, msgs: &[Vec<u8>]) -> Result<(), SocketError> {
///         for msg in msgs {
///             self.send(msg)?;
///         }
///         Ok(())
///     }
///
///     fn remote_address(&self) -> Option<SocketAddr> {
///         Some(self.peer)
///     }
///
///     fn notify_closing(&self, _reason: &str) {}
///
///     fn disconnect(&self) {}
/// }
/// ```
pub trait Socket: Send + Sync + 'static {
    /// Sends one encoded message to the remote peer.
    fn send(&self, msg: &[u8]) -> Result<(), SocketError>;

    /// Sends a batch of encoded messages to the remote peer.
    fn send_batch(&self, msgs: &[Vec<u8>]) -> Result<(), SocketError>;

    /// Returns the remote peer's address, if the transport knows it.
    fn remote_address(&self) -> Option<SocketAddr>;

    /// Notifies the transport that the session has begun closing.
    ///
    /// Called synchronously from [`Session::closed`](crate::Session::closed)
    /// with the close reason, before the connection is torn down. Gives
    /// the transport a chance to flush or to tell the client why it is
    /// being dropped.
    fn notify_closing(&self, reason: &str);

    /// Tears the connection down.
    ///
    /// Invoked once per session, one scheduler tick after the `closed`
    /// notification has been delivered.
    fn disconnect(&self);
}

// =========================================================================
// Test support
// =========================================================================
