//! Per-session watcher task.
//!
//! A watcher waits for whichever comes first: global shutdown, the tunnel
//! reporting the session closed, or the session's expiry. Only expiry mutates
//! anything; it stops the tunnel and revokes the session, both best effort.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k256::PublicKey;
use tokio::sync::watch;
use tracing::debug;

use crate::keys::key_hex;
use crate::store::SessionStore;
use crate::tunnel::{SessionClosed, TunnelServer};

/// Why a watcher returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchExit {
    Shutdown,
    Closed,
    Expired,
}

/// Time left until `expiry`, zero if it has already passed.
pub fn remaining_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (expiry - now).to_std().unwrap_or(Duration::ZERO)
}

/// Resolves once shutdown has been signalled, or the sender is gone.
pub async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub struct SessionWatcher {
    local_public_key: PublicKey,
    closed: SessionClosed,
    until_expiry: Duration,
    shutdown: watch::Receiver<bool>,
    store: Arc<dyn SessionStore>,
    tunnel: Arc<dyn TunnelServer>,
}

impl SessionWatcher {
    pub fn new(
        local_public_key: PublicKey,
        closed: SessionClosed,
        until_expiry: Duration,
        shutdown: watch::Receiver<bool>,
        store: Arc<dyn SessionStore>,
        tunnel: Arc<dyn TunnelServer>,
    ) -> Self {
        Self {
            local_public_key,
            closed,
            until_expiry,
            shutdown,
            store,
            tunnel,
        }
    }

    pub async fn run(self) -> WatchExit {
        let SessionWatcher {
            local_public_key,
            closed,
            until_expiry,
            mut shutdown,
            store,
            tunnel,
        } = self;
        let id = key_hex(&local_public_key);

        tokio::select! {
            _ = shutdown_signalled(&mut shutdown) => {
                debug!(session = %id, "Session watcher stopping on shutdown");
                WatchExit::Shutdown
            }
            _ = closed => {
                debug!(session = %id, "Session closed");
                WatchExit::Closed
            }
            _ = tokio::time::sleep(until_expiry) => {
                debug!(session = %id, "Stopping expired session");
                if let Err(e) = tunnel.stop_session(&local_public_key).await {
                    debug!(session = %id, error = %e, "Error stopping expired session");
                }
                if let Err(e) = store.revoke_session(&local_public_key).await {
                    debug!(session = %id, error = %e, "Error revoking expired session");
                }
                WatchExit::Expired
            }
        }
    }
}
