//! Test server harness for end-to-end tests.
//!
//! Serves the real room router over an [`InMemoryRoomRepository`] so tests
//! can also reach into the store for fault injection.

use common::secret::SecretString;
use metrics_exporter_prometheus::PrometheusBuilder;
use room_service::auth::JwtIdentityGate;
use room_service::middleware::AuthState;
use room_service::repositories::InMemoryRoomRepository;
use room_service::routes::{self, AppState};
use room_service::services::{CoordinatorSettings, RandomRoomCodes, RoomCoordinator};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::tokens::TEST_TOKEN_SECRET;

/// A room service listening on `127.0.0.1` at a random port.
pub struct TestRoomServer {
    addr: SocketAddr,
    repo: Arc<InMemoryRoomRepository>,
    _handle: JoinHandle<()>,
}

impl TestRoomServer {
    /// Spawn with an empty store and default coordinator settings.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(
            Arc::new(InMemoryRoomRepository::new()),
            CoordinatorSettings::default(),
        )
        .await
    }

    /// Spawn over a caller-prepared store (profiles, injected faults).
    pub async fn spawn_with(
        repo: Arc<InMemoryRoomRepository>,
        settings: CoordinatorSettings,
    ) -> Result<Self, anyhow::Error> {
        let coordinator = Arc::new(RoomCoordinator::new(
            repo.clone(),
            Arc::new(RandomRoomCodes::new()),
            settings,
        ));
        let state = Arc::new(AppState { coordinator });
        let auth_state = Arc::new(AuthState {
            gate: Arc::new(JwtIdentityGate::new(
                &SecretString::from(TEST_TOKEN_SECRET),
                Duration::from_secs(300),
            )),
        });

        // A detached recorder: the global one can be installed once per process.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let app = routes::build_routes(state, auth_state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            repo,
            _handle: handle,
        })
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The store behind the server.
    pub fn repo(&self) -> &Arc<InMemoryRoomRepository> {
        &self.repo
    }
}

impl Drop for TestRoomServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
