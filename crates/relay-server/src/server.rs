//! `RelayServer`: binds the HTTP + WebSocket surface and owns shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_settings::{RelaySettings, ServerSettings};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::http::{self, AppState};
use crate::service::ChatService;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::Heartbeat;

/// The relay server.
pub struct RelayServer {
    config: ServerSettings,
    service: Arc<ChatService>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl RelayServer {
    /// Wrap a started service.
    pub fn new(
        settings: &RelaySettings,
        service: Arc<ChatService>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            config: settings.server.clone(),
            service,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        http::routes(AppState {
            service: Arc::clone(&self.service),
            metrics: self.metrics.clone(),
            shutdown: self.shutdown.token(),
            heartbeat: Heartbeat {
                interval: Duration::from_secs(self.config.heartbeat_interval_secs),
                timeout: Duration::from_secs(self.config.heartbeat_timeout_secs),
            },
            max_message_size: self.config.max_message_size,
            store_backend: self.service.store_backend(),
            start_time: self.start_time,
        })
    }

    /// The relay service.
    pub fn service(&self) -> &Arc<ChatService> {
        &self.service
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server settings.
    pub fn config(&self) -> &ServerSettings {
        &self.config
    }

    /// Bind `host:port` and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "relay server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Stop accepting, end live sessions, then drain both worker pools.
    ///
    /// Each phase is bounded by the configured shutdown timeout.
    pub async fn stop(&self, server: JoinHandle<()>) {
        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        self.shutdown
            .graceful_shutdown(vec![server], Some(timeout))
            .await;
        if tokio::time::timeout(timeout, self.service.shutdown())
            .await
            .is_err()
        {
            warn!(timeout_secs = timeout.as_secs(), "worker pools did not drain in time");
        }
        info!("relay server stopped");
    }
}
