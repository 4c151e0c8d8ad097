//! Session lifecycle controller.
//!
//! Owns the watcher tracker and the broadcast shutdown. Session records live
//! in the store; the controller itself keeps no session map.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tcs_proto::v1::{
    AddSessionRequestV1, AddSessionResponseV1, ListSessionsRequestV1, ListSessionsResponseV1,
    RevokeSessionRequestV1, RevokeSessionResponseV1, SessionV1,
};
use tokio::sync::{watch, OnceCell};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::credentials::build_auth_data;
use crate::errors::{SessionRpcError, ValidationError};
use crate::keys::{key_hex, parse_public_key};
use crate::macaroon::MacaroonBaker;
use crate::marshal::{session_to_wire, session_type_from_wire};
use crate::store::SessionStore;
use crate::tunnel::TunnelServer;
use crate::types::{Session, SessionState, SessionType};
use crate::watcher::{remaining_until, SessionWatcher};

/// Server-wide settings injected into the controller.
#[derive(Clone, Debug, Default)]
pub struct ControllerConfig {
    /// Basic-auth value (already base64 encoded) for password sessions.
    pub basic_auth: String,
}

/// What `resume_session` decided for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Tunnel started and a watcher is running.
    Started,
    /// Revoked or expired state; nothing done.
    NotResumable(SessionState),
    /// Past its expiry; revoked in the store.
    Expired,
    /// No credential could be built; skipped.
    CredentialUnavailable,
}

/// Tally of a startup reload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResumeReport {
    pub started: usize,
    pub skipped: usize,
    pub expired: usize,
    pub failed: usize,
}

impl ResumeReport {
    fn record(&mut self, outcome: ResumeOutcome) {
        match outcome {
            ResumeOutcome::Started => self.started += 1,
            ResumeOutcome::Expired => self.expired += 1,
            ResumeOutcome::NotResumable(_) | ResumeOutcome::CredentialUnavailable => {
                self.skipped += 1
            }
        }
    }
}

pub struct SessionController {
    config: ControllerConfig,
    store: Arc<dyn SessionStore>,
    tunnel: Arc<dyn TunnelServer>,
    baker: Arc<dyn MacaroonBaker>,
    watchers: TaskTracker,
    shutdown_tx: watch::Sender<bool>,
    stopped: OnceCell<()>,
}

impl SessionController {
    pub fn new(
        config: ControllerConfig,
        store: Arc<dyn SessionStore>,
        tunnel: Arc<dyn TunnelServer>,
        baker: Arc<dyn MacaroonBaker>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            store,
            tunnel,
            baker,
            watchers: TaskTracker::new(),
            shutdown_tx,
            stopped: OnceCell::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Number of watcher tasks still running.
    pub fn active_watchers(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Create, persist and start a new session.
    pub async fn add_session(
        &self,
        label: &str,
        session_type: SessionType,
        expiry_unix_seconds: u64,
        server_addr: &str,
        dev_server: bool,
    ) -> Result<SessionV1, SessionRpcError> {
        let expiry = validate_expiry(expiry_unix_seconds, Utc::now())?;
        validate_type(session_type)?;
        self.create_session(label, session_type, expiry, server_addr, dev_server)
            .await
    }

    pub async fn add_session_rpc(
        &self,
        req: AddSessionRequestV1,
    ) -> Result<AddSessionResponseV1, SessionRpcError> {
        let expiry = validate_expiry(req.expiry_timestamp_seconds, Utc::now())?;
        let session_type = session_type_from_wire(req.session_type)?;
        validate_type(session_type)?;

        let session = self
            .create_session(
                &req.label,
                session_type,
                expiry,
                &req.mailbox_server_addr,
                req.dev_server,
            )
            .await?;
        Ok(AddSessionResponseV1 {
            session: Some(session),
        })
    }

    async fn create_session(
        &self,
        label: &str,
        session_type: SessionType,
        expiry: DateTime<Utc>,
        server_addr: &str,
        dev_server: bool,
    ) -> Result<SessionV1, SessionRpcError> {
        let session = Session::new(label, session_type, expiry, server_addr, dev_server);
        let id = key_hex(&session.local_public_key);

        self.store.store_session(session.clone()).await?;
        info!(session = %id, session_type = ?session_type, expiry = %expiry, "Session added");

        self.resume_session(&session).await?;

        // The tunnel may already have moved the session on.
        let current = self
            .store
            .get_session(&session.local_public_key)
            .await?
            .unwrap_or(session);
        Ok(session_to_wire(&current))
    }

    /// All sessions in store order.
    pub async fn list_sessions(&self) -> Result<Vec<SessionV1>, SessionRpcError> {
        let sessions = self.store.list_sessions().await?;
        Ok(sessions.iter().map(session_to_wire).collect())
    }

    pub async fn list_sessions_rpc(
        &self,
        _req: ListSessionsRequestV1,
    ) -> Result<ListSessionsResponseV1, SessionRpcError> {
        Ok(ListSessionsResponseV1 {
            sessions: self.list_sessions().await?,
        })
    }

    /// Revoke a session in the store, then stop its tunnel if running.
    pub async fn revoke_session(&self, local_public_key: &[u8]) -> Result<(), SessionRpcError> {
        let key = parse_public_key(local_public_key).map_err(ValidationError::from)?;
        let id = key_hex(&key);

        self.store.revoke_session(&key).await?;
        info!(session = %id, "Session revoked");

        if let Err(e) = self.tunnel.stop_session(&key).await {
            debug!(session = %id, error = %e, "Error stopping revoked session");
        }
        Ok(())
    }

    pub async fn revoke_session_rpc(
        &self,
        req: RevokeSessionRequestV1,
    ) -> Result<RevokeSessionResponseV1, SessionRpcError> {
        self.revoke_session(&req.local_public_key).await?;
        Ok(RevokeSessionResponseV1 {})
    }

    /// Decide whether a stored session should run, and start it if so.
    pub async fn resume_session(&self, session: &Session) -> Result<ResumeOutcome, SessionRpcError> {
        let id = key_hex(&session.local_public_key);

        if !session.state.is_resumable() {
            debug!(session = %id, state = ?session.state, "Not resuming session");
            return Ok(ResumeOutcome::NotResumable(session.state));
        }

        let now = Utc::now();
        if session.is_expired_at(now) {
            debug!(session = %id, expiry = %session.expiry, "Not resuming expired session, revoking");
            self.store.revoke_session(&session.local_public_key).await?;
            return Ok(ResumeOutcome::Expired);
        }

        let auth = match build_auth_data(session, &self.config.basic_auth, self.baker.as_ref()).await
        {
            Ok(auth) => auth,
            Err(e) => {
                debug!(session = %id, session_type = ?session.session_type, error = %e,
                    "Not resuming session, no credential available");
                return Ok(ResumeOutcome::CredentialUnavailable);
            }
        };

        let closed = self
            .tunnel
            .start_session(session.clone(), auth, Arc::clone(&self.store))
            .await?;

        let watcher = SessionWatcher::new(
            session.local_public_key,
            closed,
            remaining_until(session.expiry, Utc::now()),
            self.shutdown_tx.subscribe(),
            Arc::clone(&self.store),
            Arc::clone(&self.tunnel),
        );
        self.watchers.spawn(async move {
            let exit = watcher.run().await;
            debug!(session = %id, exit = ?exit, "Session watcher exited");
        });

        Ok(ResumeOutcome::Started)
    }

    /// Pass every stored session through [`resume_session`](Self::resume_session).
    ///
    /// A failure on one session is logged and counted; the rest still run.
    pub async fn resume_all(&self) -> Result<ResumeReport, SessionRpcError> {
        let sessions = self.store.list_sessions().await?;
        let mut report = ResumeReport::default();

        for session in &sessions {
            match self.resume_session(session).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    warn!(session = %key_hex(&session.local_public_key), error = %e,
                        "Failed to resume session");
                    report.failed += 1;
                }
            }
        }

        info!(
            started = report.started,
            skipped = report.skipped,
            expired = report.expired,
            failed = report.failed,
            "Resumed stored sessions"
        );
        Ok(report)
    }

    /// Signal every watcher to stop and wait until they have all exited.
    ///
    /// Safe to call more than once and from several tasks; every caller
    /// returns after the same single drain.
    pub async fn shutdown(&self) {
        self.stopped
            .get_or_init(|| async {
                info!(watchers = self.watchers.len(), "Shutting down session controller");
                self.shutdown_tx.send_replace(true);
                self.watchers.close();
                self.watchers.wait().await;
                debug!("All session watchers exited");
            })
            .await;
    }
}

fn validate_expiry(
    expiry_unix_seconds: u64,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ValidationError> {
    let expiry = i64::try_from(expiry_unix_seconds)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or(ValidationError::ExpiryOutOfRange(expiry_unix_seconds))?;

    if expiry <= now {
        return Err(ValidationError::ExpiryNotInFuture);
    }
    Ok(expiry)
}

fn validate_type(session_type: SessionType) -> Result<(), ValidationError> {
    if session_type.is_supported_for_add() {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedType(session_type))
    }
}
