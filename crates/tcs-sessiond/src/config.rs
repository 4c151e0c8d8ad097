use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Minimum length of the macaroon root secret, in bytes.
pub const MIN_ROOT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub bind_addr: SocketAddr,

    // Credentials
    pub ui_password: String,
    pub macaroon_root_secret: String, // hex

    // Storage
    pub store_backend: String, // "memory", "sqlite"
    pub sqlite_path: PathBuf,

    // Mailbox used when an Add request leaves it empty
    pub default_server_addr: String,

    // Graceful shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8443)),
            ui_password: String::new(),
            macaroon_root_secret: String::new(),
            store_backend: "memory".to_string(),
            sqlite_path: PathBuf::from("sessions.db"),
            default_server_addr: "mailbox.terminal.lightning.today:443".to_string(),
            shutdown_timeout_secs: 30,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("TCS_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }

        if let Ok(password) = std::env::var("TCS_UI_PASSWORD") {
            config.ui_password = password;
        }

        if let Ok(secret) = std::env::var("TCS_MACAROON_ROOT_SECRET") {
            config.macaroon_root_secret = secret;
        }

        if let Ok(backend) = std::env::var("TCS_STORE_BACKEND") {
            config.store_backend = backend;
        }

        if let Ok(path) = std::env::var("TCS_SQLITE_PATH") {
            config.sqlite_path = PathBuf::from(path);
        }

        if let Ok(addr) = std::env::var("TCS_DEFAULT_SERVER_ADDR") {
            config.default_server_addr = addr;
        }

        if let Ok(timeout) = std::env::var("TCS_SHUTDOWN_TIMEOUT_SECS") {
            config.shutdown_timeout_secs = timeout.parse()?;
        }

        Ok(config)
    }

    pub fn from_toml(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ui_password.is_empty() {
            anyhow::bail!("ui_password must be set");
        }

        let secret = self.root_secret_bytes()?;
        if secret.len() < MIN_ROOT_SECRET_LEN {
            anyhow::bail!("macaroon_root_secret must be at least {MIN_ROOT_SECRET_LEN} bytes");
        }

        self.store_backend_enum()?;

        if self.shutdown_timeout_secs == 0 {
            anyhow::bail!("shutdown_timeout_secs must be > 0");
        }

        Ok(())
    }

    pub fn store_backend_enum(&self) -> anyhow::Result<StoreBackend> {
        match self.store_backend.as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => anyhow::bail!("unknown store_backend {other:?}, expected \"memory\" or \"sqlite\""),
        }
    }

    pub fn root_secret_bytes(&self) -> anyhow::Result<Vec<u8>> {
        hex::decode(&self.macaroon_root_secret)
            .map_err(|e| anyhow::anyhow!("macaroon_root_secret is not valid hex: {e}"))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
