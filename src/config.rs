use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::McpError;
use crate::types::{Implementation, PROTOCOL_VERSION, ServerCapabilities};

/// Server identity and handshake settings, loadable from JSON.
///
/// ```json
/// {
///   "name": "weather",
///   "version": "0.3.1",
///   "instructions": "Call get_forecast with a city name.",
///   "capabilities": { "tools": { "listChanged": false } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub capabilities: ServerCapabilities,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            name: "mcpserver".into(),
            version: "1.0.0".into(),
            protocol_version: PROTOCOL_VERSION.into(),
            instructions: None,
            capabilities: ServerCapabilities::default(),
        }
    }
}

impl ServerConfig {
    pub fn server_info(&self) -> Implementation {
        Implementation {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// Load server configuration from a JSON file on disk.
pub fn load_config(path: impl AsRef<Path>) -> Result<ServerConfig, McpError> {
    let data = std::fs::read(path)?;
    parse_config(&data)
}

/// Parse server configuration from raw JSON bytes. Missing fields take defaults.
pub fn parse_config(data: &[u8]) -> Result<ServerConfig, McpError> {
    let config: ServerConfig = serde_json::from_slice(data)?;
    Ok(config)
}
