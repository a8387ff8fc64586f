pub mod api;
pub mod builtin;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod mcp_api;
pub mod models;
pub mod registry;
pub mod repair;
pub mod server;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tokio::sync::RwLock;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::warn;

pub use config::ServerSettings;
pub use dispatcher::Dispatcher;
pub use error::{Result, ServerError};
pub use models::{ServerStatus, ToolDefinition};
pub use registry::{provider_factory, ProviderFactory, ToolProvider, ToolRegistry};
pub use server::McpServer;

#[derive(Clone)]
pub struct AppState {
    pub settings: ServerSettings,
    pub dispatcher: Dispatcher,
    pub catalog: Arc<RwLock<Vec<ToolDefinition>>>,
}

impl AppState {
    pub fn new(settings: ServerSettings, registry: Arc<ToolRegistry>) -> Self {
        Self::with_catalog(settings, registry, Arc::new(RwLock::new(Vec::new())))
    }

    pub fn with_catalog(
        settings: ServerSettings,
        registry: Arc<ToolRegistry>,
        catalog: Arc<RwLock<Vec<ToolDefinition>>>,
    ) -> Self {
        Self {
            settings,
            dispatcher: Dispatcher::new(registry),
            catalog,
        }
    }

    pub async fn rebuild_catalog(&self) -> usize {
        let catalog = self.dispatcher.registry().build_catalog();
        let count = catalog.len();
        *self.catalog.write().await = catalog;
        count
    }

    pub async fn catalog_snapshot(&self) -> Vec<ToolDefinition> {
        self.catalog.read().await.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings);

    Router::new()
        .route("/mcp", post(mcp_api::mcp))
        .route("/health", get(api::health))
        .route("/api/tools", get(api::list_tools))
        .route("/api/{category}/{tool}", post(api::invoke_tool))
        .fallback(api::unmatched)
        .method_not_allowed_fallback(api::unmatched)
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(settings: &ServerSettings) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if settings.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
