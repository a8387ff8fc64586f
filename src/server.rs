use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex, RwLock},
    task::JoinHandle,
    time,
};
use tracing::{debug, info, warn};

use crate::{
    build_router,
    config::ServerSettings,
    error::{Result, ServerError},
    models::{ServerStatus, ToolDefinition},
    registry::ToolRegistry,
    AppState,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct RunningListener {
    local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

/// Owns the HTTP listener and the process-wide catalog and settings.
///
/// `start` and `stop` are serialized by a lifecycle lock, so they never
/// interleave with each other. The listener slot is only locked briefly, and
/// status reads stay responsive while `stop` drains in-flight requests.
/// Request handlers only read the catalog and may see a stale copy while a
/// restart is in progress.
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    settings: RwLock<ServerSettings>,
    catalog: Arc<RwLock<Vec<ToolDefinition>>>,
    lifecycle: Mutex<()>,
    listener: Mutex<Option<RunningListener>>,
}

impl McpServer {
    pub fn new(registry: ToolRegistry, settings: ServerSettings) -> Self {
        Self {
            registry: Arc::new(registry),
            settings: RwLock::new(settings),
            catalog: Arc::new(RwLock::new(Vec::new())),
            lifecycle: Mutex::new(()),
            listener: Mutex::new(None),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if let Some(addr) = self.local_addr().await {
            info!(addr = %addr, "MCP control server already running; start ignored");
            return Ok(());
        }

        let settings = self.settings.read().await.clone();
        let bind_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, settings.port));
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr,
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind {
                addr: bind_addr,
                source,
            })?;

        let state = AppState::with_catalog(settings, self.registry.clone(), self.catalog.clone());
        let tool_count = state.rebuild_catalog().await;
        let app = build_router(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(addr = %local_addr, tools = tool_count, "MCP control server listening");
        *self.listener.lock().await = Some(RunningListener {
            local_addr,
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Signals graceful shutdown and waits up to the grace period for
    /// in-flight requests before aborting the listener task. The server
    /// reports as stopped as soon as the drain begins.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let taken = self.listener.lock().await.take();
        let Some(mut running) = taken else {
            debug!("MCP control server already stopped");
            return;
        };

        let _ = running.shutdown_tx.send(());
        match time::timeout(SHUTDOWN_GRACE, &mut running.handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => warn!("MCP listener exited with error: {err}"),
            Ok(Err(err)) => warn!("MCP listener task failed: {err}"),
            Err(_) => {
                warn!(
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "MCP listener did not drain in time; aborting"
                );
                running.handle.abort();
            }
        }
        info!(addr = %running.local_addr, "MCP control server stopped");
    }

    /// Replaces the settings wholesale and restarts a running listener so the
    /// new port and origins take effect. The restart is not atomic.
    pub async fn update_settings(&self, settings: ServerSettings) -> Result<()> {
        *self.settings.write().await = settings;
        if self.is_running().await {
            info!("Settings changed; restarting MCP control server");
            self.stop().await;
            self.start().await?;
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.listener.lock().await.is_some()
    }

    pub async fn get_status(&self) -> ServerStatus {
        ServerStatus {
            running: self.is_running().await,
            port: self.settings.read().await.port,
            clients: 0,
        }
    }

    pub async fn settings(&self) -> ServerSettings {
        self.settings.read().await.clone()
    }

    pub async fn get_catalog(&self) -> Vec<ToolDefinition> {
        self.catalog.read().await.clone()
    }

    /// Address the listener is bound to, if running. Differs from the
    /// configured port when that port is 0.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .lock()
            .await
            .as_ref()
            .map(|running| running.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::test_support::{sample_registry, GateProvider};

    fn ephemeral_settings() -> ServerSettings {
        ServerSettings {
            port: 0,
            ..ServerSettings::default()
        }
    }

    fn server() -> McpServer {
        let (registry, _) = sample_registry();
        McpServer::new(registry, ephemeral_settings())
    }

    async fn get_json(addr: SocketAddr, path: &str) -> Value {
        reqwest::get(format!("http://{addr}{path}"))
            .await
            .expect("request")
            .json()
            .await
            .expect("json")
    }

    #[tokio::test]
    async fn start_binds_loopback_and_serves_health() {
        let server = server();
        server.start().await.expect("start");

        let addr = server.local_addr().await.expect("bound address");
        assert!(addr.ip().is_loopback());
        assert_eq!(get_json(addr, "/health").await, json!({"status": "ok", "tools": 5}));
        assert_eq!(server.get_catalog().await.len(), 5);

        server.stop().await;
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let server = server();
        server.start().await.expect("first start");
        let first = server.local_addr().await;
        server.start().await.expect("second start");

        assert_eq!(server.local_addr().await, first);
        assert!(server.get_status().await.running);

        server.stop().await;
    }

    #[tokio::test]
    async fn stop_releases_listener_and_is_idempotent() {
        let server = server();
        server.stop().await;
        server.start().await.expect("start");
        let addr = server.local_addr().await.expect("bound address");

        server.stop().await;
        server.stop().await;

        let status = server.get_status().await;
        assert!(!status.running);
        assert_eq!(status.clients, 0);
        assert!(server.local_addr().await.is_none());
        assert!(reqwest::get(format!("http://{addr}/health")).await.is_err());
    }

    #[tokio::test]
    async fn bind_failure_leaves_server_stopped() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = occupied.local_addr().expect("addr").port();
        let (registry, _) = sample_registry();
        let server = McpServer::new(
            registry,
            ServerSettings {
                port,
                ..ServerSettings::default()
            },
        );

        let err = server.start().await.expect_err("port is taken");
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(!server.get_status().await.running);
        assert!(server.get_catalog().await.is_empty());
    }

    #[tokio::test]
    async fn update_settings_restarts_running_server() {
        let server = server();
        server.start().await.expect("start");

        let settings = ServerSettings {
            enable_debug_log: true,
            ..ephemeral_settings()
        };
        server.update_settings(settings.clone()).await.expect("update");

        assert!(server.get_status().await.running);
        assert_eq!(server.settings().await, settings);
        let addr = server.local_addr().await.expect("bound address");
        assert_eq!(get_json(addr, "/health").await["tools"], 5);

        server.stop().await;
    }

    #[tokio::test]
    async fn update_settings_does_not_start_stopped_server() {
        let server = server();
        let settings = ServerSettings {
            port: 4321,
            ..ServerSettings::default()
        };
        server.update_settings(settings).await.expect("update");

        let status = server.get_status().await;
        assert!(!status.running);
        assert_eq!(status.port, 4321);
    }

    #[tokio::test]
    async fn serves_mcp_over_the_socket() {
        let server = server();
        server.start().await.expect("start");
        let addr = server.local_addr().await.expect("bound address");

        let body: Value = reqwest::Client::new()
            .post(format!("http://{addr}/mcp"))
            .body(r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"math_add","arguments":{"a":1,"b":2}}}"#)
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(body["result"]["content"][0]["text"], "3");

        server.stop().await;
    }

    #[tokio::test]
    async fn status_stays_readable_while_stop_drains_requests() {
        let gate = Arc::new(GateProvider::default());
        let mut registry = ToolRegistry::new();
        registry.register("gate", gate.clone());
        let server = Arc::new(McpServer::new(registry, ephemeral_settings()));
        server.start().await.expect("start");
        let addr = server.local_addr().await.expect("bound address");

        let in_flight = tokio::spawn(async move {
            reqwest::Client::new()
                .post(format!("http://{addr}/api/gate/wait"))
                .body("{}")
                .send()
                .await
                .expect("request")
                .json::<Value>()
                .await
                .expect("json")
        });
        gate.entered.notified().await;

        let stopping = tokio::spawn({
            let server = server.clone();
            async move { server.stop().await }
        });
        time::timeout(Duration::from_secs(2), async {
            while server.is_running().await {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("status readable during drain");
        assert!(!server.get_status().await.running);

        gate.release.notify_one();
        stopping.await.expect("stop task");
        let body = in_flight.await.expect("request task");
        assert_eq!(body["result"], "released");
    }
}
