//! Secure-tunnel collaborator.
//!
//! The controller never talks to a mailbox itself. It hands a session and its
//! authorization payload to a [`TunnelServer`], gets back a [`SessionClosed`]
//! notification, and later asks the tunnel to stop. [`LoopbackTunnel`] is an
//! in-process implementation used by the daemon and by tests.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use dashmap::DashMap;
use k256::PublicKey;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::keys::{key_hex, serialize_compressed};
use crate::store::{SessionStore, StoreError};
use crate::types::{Session, SessionState};

/// Opaque authorization payload presented by the remote peer's requests.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthData(Vec<u8>);

impl AuthData {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

// Credentials never end up in logs.
impl fmt::Debug for AuthData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthData(<{} bytes>)", self.0.len())
    }
}

/// Resolves once when the tunnel for a session has ended, for any reason.
///
/// Dropping the matching [`SessionCloser`] counts as closing.
#[derive(Debug)]
pub struct SessionClosed {
    rx: oneshot::Receiver<()>,
}

/// Sending half of a [`SessionClosed`] notification.
#[derive(Debug)]
pub struct SessionCloser {
    tx: oneshot::Sender<()>,
}

impl SessionClosed {
    pub fn channel() -> (SessionCloser, SessionClosed) {
        let (tx, rx) = oneshot::channel();
        (SessionCloser { tx }, SessionClosed { rx })
    }
}

impl SessionCloser {
    pub fn close(self) {
        let _ = self.tx.send(());
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Future for SessionClosed {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TunnelError {
    #[error("failed to start session tunnel: {0}")]
    StartFailed(String),

    #[error("session {0} already has a running tunnel")]
    AlreadyRunning(String),

    #[error("no running tunnel for session {0}")]
    NotRunning(String),

    #[error("failed to persist tunnel state: {0}")]
    Persist(String),
}

impl From<StoreError> for TunnelError {
    fn from(err: StoreError) -> Self {
        TunnelError::Persist(err.to_string())
    }
}

/// Transport that carries a session's traffic once it is started.
#[async_trait]
pub trait TunnelServer: Send + Sync {
    /// Start serving a session. The store is handed over so the tunnel can
    /// persist its own state changes (a completed pairing moves the session
    /// to `InUse` and records the remote key).
    async fn start_session(
        &self,
        session: Session,
        auth: AuthData,
        store: Arc<dyn SessionStore>,
    ) -> Result<SessionClosed, TunnelError>;

    /// Stop a running session. Stopping a session that is not running
    /// returns [`TunnelError::NotRunning`].
    async fn stop_session(&self, local_public_key: &PublicKey) -> Result<(), TunnelError>;
}

struct LiveSession {
    session: Session,
    auth: AuthData,
    store: Arc<dyn SessionStore>,
    closer: SessionCloser,
}

/// In-process tunnel that keeps live sessions in a map.
#[derive(Clone, Default)]
pub struct LoopbackTunnel {
    live: Arc<DashMap<Vec<u8>, LiveSession>>,
}

impl LoopbackTunnel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self, local_public_key: &PublicKey) -> bool {
        self.live.contains_key(&serialize_compressed(local_public_key))
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Authorization payload a live session was started with.
    pub fn auth_data(&self, local_public_key: &PublicKey) -> Option<AuthData> {
        self.live
            .get(&serialize_compressed(local_public_key))
            .map(|entry| entry.auth.clone())
    }

    /// Record a completed pairing: store the remote key and move the session
    /// to `InUse` through the persistence handle it was started with.
    ///
    /// A session revoked or expired in the meantime stays that way and the
    /// pairing is dropped.
    pub async fn mark_paired(
        &self,
        local_public_key: &PublicKey,
        remote_public_key: PublicKey,
    ) -> Result<(), TunnelError> {
        let id = serialize_compressed(local_public_key);
        let store = self
            .live
            .get(&id)
            .map(|entry| Arc::clone(&entry.store))
            .ok_or_else(|| TunnelError::NotRunning(hex::encode(&id)))?;

        if !store
            .mark_in_use(local_public_key, &remote_public_key)
            .await?
        {
            debug!(session = %hex::encode(&id), "Pairing ignored, session no longer resumable");
            return Ok(());
        }

        if let Some(mut entry) = self.live.get_mut(&id) {
            entry.session.remote_public_key = Some(remote_public_key);
            entry.session.state = SessionState::InUse;
        }
        info!(session = %hex::encode(&id), "Session paired with remote peer");
        Ok(())
    }

    /// The remote side went away. The session stays stored as is.
    pub fn disconnect(&self, local_public_key: &PublicKey) -> Result<(), TunnelError> {
        self.stop_local(local_public_key)
    }

    fn stop_local(&self, local_public_key: &PublicKey) -> Result<(), TunnelError> {
        match self.live.remove(&serialize_compressed(local_public_key)) {
            Some((_, live)) => {
                live.closer.close();
                Ok(())
            }
            None => Err(TunnelError::NotRunning(key_hex(local_public_key))),
        }
    }
}

#[async_trait]
impl TunnelServer for LoopbackTunnel {
    async fn start_session(
        &self,
        session: Session,
        auth: AuthData,
        store: Arc<dyn SessionStore>,
    ) -> Result<SessionClosed, TunnelError> {
        let id = session.id_bytes();
        // A stale entry whose watcher is gone does not block a restart.
        if let Some(existing) = self.live.get(&id) {
            if !existing.closer.is_closed() {
                return Err(TunnelError::AlreadyRunning(hex::encode(&id)));
            }
        }

        let (closer, closed) = SessionClosed::channel();
        debug!(session = %hex::encode(&id), server = %session.server_addr, "Starting loopback tunnel");
        self.live.insert(
            id,
            LiveSession {
                session,
                auth,
                store,
                closer,
            },
        );
        Ok(closed)
    }

    async fn stop_session(&self, local_public_key: &PublicKey) -> Result<(), TunnelError> {
        self.stop_local(local_public_key)
    }
}
