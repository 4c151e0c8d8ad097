//! SQLite-backed session store.
//!
//! Sessions are kept in a single table keyed by the compressed local public
//! key. Insertion order is preserved through the row id, so listing returns
//! sessions in the order they were first stored.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k256::PublicKey;
use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use crate::keys::{key_hex, parse_private_key, parse_public_key, serialize_compressed};
use crate::marshal::{
    session_state_from_wire, session_state_to_wire, session_type_from_wire, session_type_to_wire,
};
use crate::store::{SessionStore, StoreError};
use crate::types::{PairingSecret, Session, SessionState};

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::OperationFailed(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StoreError::OperationFailed(format!("failed to set pragmas: {e}")))?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::OperationFailed(format!("failed to open in-memory database: {e}"))
        })?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to create schema_version: {e}")))?;

        let current_version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
                row.get(0)
            })
            .map_err(|e| StoreError::OperationFailed(format!("failed to read schema version: {e}")))?;

        if current_version < 1 {
            Self::migrate_v1(conn)?;
        }

        Ok(())
    }

    fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                local_public_key BLOB NOT NULL UNIQUE,
                local_private_key BLOB NOT NULL,
                remote_public_key BLOB,
                label TEXT NOT NULL,
                session_type INTEGER NOT NULL,
                state INTEGER NOT NULL,
                expiry_unix INTEGER NOT NULL,
                server_addr TEXT NOT NULL,
                dev_server INTEGER NOT NULL,
                pairing_secret BLOB NOT NULL,
                macaroon_root_key INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_state ON sessions(state);
            "#,
        )
        .map_err(|e| StoreError::OperationFailed(format!("migration v1 failed: {e}")))?;

        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to record schema version: {e}")))?;

        Ok(())
    }
}

fn corrupt(what: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::DataCorruption(format!("{what}: {e}"))
}

/// Raw column values of one `sessions` row.
struct SessionRow {
    local_public_key: Vec<u8>,
    local_private_key: Vec<u8>,
    remote_public_key: Option<Vec<u8>>,
    label: String,
    session_type: i32,
    state: i32,
    expiry_unix: i64,
    server_addr: String,
    dev_server: bool,
    pairing_secret: Vec<u8>,
    macaroon_root_key: i64,
}

impl SessionRow {
    fn into_session(self) -> Result<Session, StoreError> {
        let local_public_key =
            parse_public_key(&self.local_public_key).map_err(|e| corrupt("local key", e))?;
        let local_private_key =
            parse_private_key(&self.local_private_key).map_err(|e| corrupt("private key", e))?;
        let remote_public_key = self
            .remote_public_key
            .as_deref()
            .map(parse_public_key)
            .transpose()
            .map_err(|e| corrupt("remote key", e))?;
        let pairing_secret: PairingSecret = self.pairing_secret.as_slice().try_into().map_err(|_| {
            StoreError::DataCorruption(format!(
                "pairing secret has {} bytes",
                self.pairing_secret.len()
            ))
        })?;
        let expiry = DateTime::<Utc>::from_timestamp(self.expiry_unix, 0).ok_or_else(|| {
            StoreError::DataCorruption(format!("expiry {} out of range", self.expiry_unix))
        })?;

        Ok(Session {
            label: self.label,
            session_type: session_type_from_wire(self.session_type)?,
            state: session_state_from_wire(self.state)?,
            expiry,
            server_addr: self.server_addr,
            dev_server: self.dev_server,
            pairing_secret,
            local_private_key,
            local_public_key,
            remote_public_key,
            macaroon_root_key: self.macaroon_root_key as u64,
        })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn store_session(&self, session: Session) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (
                local_public_key, local_private_key, remote_public_key, label,
                session_type, state, expiry_unix, server_addr, dev_server,
                pairing_secret, macaroon_root_key
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(local_public_key) DO UPDATE SET
                local_private_key = excluded.local_private_key,
                remote_public_key = excluded.remote_public_key,
                label = excluded.label,
                session_type = excluded.session_type,
                state = CASE WHEN sessions.state IN (?12, ?13)
                    THEN sessions.state ELSE excluded.state END,
                expiry_unix = excluded.expiry_unix,
                server_addr = excluded.server_addr,
                dev_server = excluded.dev_server,
                pairing_secret = excluded.pairing_secret,
                macaroon_root_key = excluded.macaroon_root_key",
            params![
                serialize_compressed(&session.local_public_key),
                session.local_private_key.to_bytes().to_vec(),
                session.remote_public_key.as_ref().map(serialize_compressed),
                session.label,
                session_type_to_wire(session.session_type) as i32,
                session_state_to_wire(session.state) as i32,
                session.expiry.timestamp(),
                session.server_addr,
                session.dev_server,
                session.pairing_secret.as_slice(),
                session.macaroon_root_key as i64,
                session_state_to_wire(SessionState::Revoked) as i32,
                session_state_to_wire(SessionState::Expired) as i32,
            ],
        )
        .map_err(|e| StoreError::OperationFailed(format!("failed to store session: {e}")))?;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT local_public_key, local_private_key, remote_public_key, label,
                        session_type, state, expiry_unix, server_addr, dev_server,
                        pairing_secret, macaroon_root_key
                 FROM sessions ORDER BY id",
            )
            .map_err(|e| StoreError::OperationFailed(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SessionRow {
                    local_public_key: row.get(0)?,
                    local_private_key: row.get(1)?,
                    remote_public_key: row.get(2)?,
                    label: row.get(3)?,
                    session_type: row.get(4)?,
                    state: row.get(5)?,
                    expiry_unix: row.get(6)?,
                    server_addr: row.get(7)?,
                    dev_server: row.get(8)?,
                    pairing_secret: row.get(9)?,
                    macaroon_root_key: row.get(10)?,
                })
            })
            .map_err(|e| StoreError::OperationFailed(format!("failed to list sessions: {e}")))?;

        let mut sessions = Vec::new();
        for row in rows {
            let row =
                row.map_err(|e| StoreError::OperationFailed(format!("failed to read row: {e}")))?;
            sessions.push(row.into_session()?);
        }
        Ok(sessions)
    }

    async fn revoke_session(&self, local_public_key: &PublicKey) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE sessions SET state = ?1 WHERE local_public_key = ?2",
                params![
                    session_state_to_wire(SessionState::Revoked) as i32,
                    serialize_compressed(local_public_key),
                ],
            )
            .map_err(|e| StoreError::OperationFailed(format!("failed to revoke session: {e}")))?;

        if changed == 0 {
            return Err(StoreError::NotFound(key_hex(local_public_key)));
        }
        Ok(())
    }

    async fn mark_in_use(
        &self,
        local_public_key: &PublicKey,
        remote_public_key: &PublicKey,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let id = serialize_compressed(local_public_key);
        let changed = conn
            .execute(
                "UPDATE sessions SET state = ?1, remote_public_key = ?2
                 WHERE local_public_key = ?3 AND state IN (?4, ?1)",
                params![
                    session_state_to_wire(SessionState::InUse) as i32,
                    serialize_compressed(remote_public_key),
                    id,
                    session_state_to_wire(SessionState::Created) as i32,
                ],
            )
            .map_err(|e| StoreError::OperationFailed(format!("failed to mark session in use: {e}")))?;
        if changed > 0 {
            return Ok(true);
        }

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sessions WHERE local_public_key = ?1)",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::OperationFailed(format!("failed to look up session: {e}")))?;
        if exists {
            Ok(false)
        } else {
            Err(StoreError::NotFound(key_hex(local_public_key)))
        }
    }
}
