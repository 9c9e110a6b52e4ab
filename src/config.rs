//! Configuration types.

use std::net::SocketAddr;

/// Application configuration, read from environment variables.
///
/// Email channel settings live in [`crate::channels::email::EmailConfig`]
/// and are optional — without them the service runs HTTP-only.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path to the SQLite database file.
    pub db_path: String,
    /// Address the HTTP API binds to.
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let db_path = std::env::var("ASSIGNMENT_DB_PATH")
            .unwrap_or_else(|_| "./data/assignments.db".to_string());

        let port: u16 = std::env::var("ASSIGNMENT_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        Self {
            db_path,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/assignments.db".to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}
