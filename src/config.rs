use std::env;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_CONNECTIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub port: u16,
    pub auto_start: bool,
    pub enable_debug_log: bool,
    pub allowed_origins: Vec<String>,
    /// Informational only. The transport applies no connection limit.
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            auto_start: true,
            enable_debug_log: false,
            allowed_origins: vec!["*".to_string()],
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl ServerSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = env::var("MCP_CONTROL_PORT")
            .ok()
            .and_then(|v| v.trim().trim_matches('"').parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let auto_start = env::var("MCP_CONTROL_AUTO_START")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.auto_start);

        let enable_debug_log = env::var("MCP_CONTROL_DEBUG_LOG")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.enable_debug_log);

        let allowed_origins = env::var("MCP_CONTROL_ALLOWED_ORIGINS")
            .ok()
            .map(|v| parse_origins(&v))
            .filter(|origins| !origins.is_empty())
            .unwrap_or(defaults.allowed_origins);

        let max_connections = env::var("MCP_CONTROL_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_connections);

        Ok(Self {
            port,
            auto_start,
            enable_debug_log,
            allowed_origins,
            max_connections,
        })
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(ToString::to_string)
        .collect()
}
