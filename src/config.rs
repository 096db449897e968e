//! Engine configuration

use serde::{Deserialize, Serialize};

/// Server-level settings. All optional; `Server::new()` uses the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Version string reported by the `version()` SQL function.
    pub version: String,

    /// Database created and selected when the server starts.
    pub database: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: "8.0.0-mimic".to_string(),
            database: None,
        }
    }
}
