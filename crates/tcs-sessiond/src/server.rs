use axum::Router;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use tcs_core::credentials::encode_basic_auth;
use tcs_core::watcher::shutdown_signalled;
use tcs_core::{
    ControllerConfig, InMemorySessionStore, LoopbackTunnel, SessionController, SessionStore,
    TunnelServer,
};

use crate::api::AppState;
use crate::baker::HmacMacaroonBaker;
use crate::config::{DaemonConfig, StoreBackend};

pub struct SessionDaemon {
    config: DaemonConfig,
    controller: Arc<SessionController>,
    tunnel: LoopbackTunnel,
    shutdown_tx: watch::Sender<bool>,
}

impl SessionDaemon {
    pub fn new(config: DaemonConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let store = Self::open_store(&config)?;
        let tunnel = LoopbackTunnel::new();
        let baker = Arc::new(HmacMacaroonBaker::new(config.root_secret_bytes()?));
        let controller = Arc::new(SessionController::new(
            ControllerConfig {
                basic_auth: encode_basic_auth(&config.ui_password),
            },
            store,
            Arc::new(tunnel.clone()) as Arc<dyn TunnelServer>,
            baker,
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            controller,
            tunnel,
            shutdown_tx,
        })
    }

    fn open_store(config: &DaemonConfig) -> anyhow::Result<Arc<dyn SessionStore>> {
        match config.store_backend_enum()? {
            StoreBackend::Memory => Ok(Arc::new(InMemorySessionStore::new())),
            #[cfg(feature = "sqlite")]
            StoreBackend::Sqlite => {
                let store = tcs_core::sqlite_store::SqliteSessionStore::new(&config.sqlite_path)?;
                info!("Using SQLite session store at {}", config.sqlite_path.display());
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "sqlite"))]
            StoreBackend::Sqlite => anyhow::bail!("built without the sqlite feature"),
        }
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    pub fn tunnel(&self) -> &LoopbackTunnel {
        &self.tunnel
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            controller: Arc::clone(&self.controller),
            default_server_addr: self.config.default_server_addr.clone(),
        };

        Router::new()
            .route(
                "/v1/sessions",
                axum::routing::post(crate::api::post_session).get(crate::api::get_sessions),
            )
            .route("/v1/sessions/revoke", axum::routing::post(crate::api::post_revoke))
            .route("/health", axum::routing::get(crate::api::get_health))
            .with_state(state)
    }

    /// Resume stored sessions, serve until a signal or [`shutdown`](Self::shutdown),
    /// then drain the session watchers.
    pub async fn start(&self) -> anyhow::Result<()> {
        self.controller.resume_all().await?;

        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!("tcs-sessiond listening on {} (HTTP)", listener.local_addr()?);

        let shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(Self::shutdown_signal(shutdown_rx))
            .await?;

        self.stop_controller().await;
        Ok(())
    }

    async fn stop_controller(&self) {
        let timeout = self.config.shutdown_timeout();
        if tokio::time::timeout(timeout, self.controller.shutdown())
            .await
            .is_err()
        {
            warn!(
                "Session watchers did not exit within {}s",
                timeout.as_secs()
            );
        } else {
            info!("Session controller stopped");
        }
    }

    async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate()).ok()
        };

        tokio::select! {
            _ = async {
                #[cfg(unix)]
                {
                    if let Some(ref mut sigterm) = sigterm {
                        sigterm.recv().await;
                    } else {
                        std::future::pending::<()>().await;
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("Received SIGTERM, starting graceful shutdown");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, starting graceful shutdown");
            }
            _ = shutdown_signalled(&mut shutdown) => {
                info!("Shutdown requested");
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}
