//! Application configuration for the SQLGate control plane.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// Environment variables are prefixed with `SQLGATE_`:
/// - `SQLGATE_HOST`: Server bind address (default: "0.0.0.0")
/// - `SQLGATE_PORT`: Server port (default: 8090)
/// - `SQLGATE_NATS_URL`: NATS server (optional; without it events are only logged
///   and dispatch goes to the Postgres outbox)
/// - `SQLGATE_SCHEDULER_ENABLED`: Run the scheduled-execution trigger (default: true)
/// - `SQLGATE_SCHEDULER_INTERVAL_SECS`: Trigger period (default: 5)
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server name for identification
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// NATS URL (optional)
    #[serde(default)]
    pub nats_url: Option<String>,

    /// Subject workflow events are published to
    #[serde(default = "default_event_subject")]
    pub event_subject: String,

    /// Subject execution requests are published to
    #[serde(default = "default_dispatch_subject")]
    pub dispatch_subject: String,

    #[serde(default = "default_true")]
    pub scheduler_enabled: bool,

    #[serde(default = "default_scheduler_interval")]
    pub scheduler_interval_secs: u64,

    /// Maximum due records fired per scheduler tick
    #[serde(default = "default_scheduler_batch_size")]
    pub scheduler_batch_size: i64,

    /// Create tables at startup if missing
    #[serde(default = "default_true")]
    pub init_schema: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_server_name() -> String {
    "sqlgate-control-plane".to_string()
}

fn default_event_subject() -> String {
    "sqlgate.workflow.events".to_string()
}

fn default_dispatch_subject() -> String {
    "sqlgate.tasks.execute".to_string()
}

fn default_true() -> bool {
    true
}

fn default_scheduler_interval() -> u64 {
    5
}

fn default_scheduler_batch_size() -> i64 {
    100
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `SQLGATE_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("SQLGATE_").from_env::<AppConfig>()
    }

    /// Get the server bind address as a string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn scheduler_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scheduler_interval_secs.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            server_name: default_server_name(),
            nats_url: None,
            event_subject: default_event_subject(),
            dispatch_subject: default_dispatch_subject(),
            scheduler_enabled: true,
            scheduler_interval_secs: default_scheduler_interval(),
            scheduler_batch_size: default_scheduler_batch_size(),
            init_schema: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8090);
        assert!(config.scheduler_enabled);
        assert_eq!(config.scheduler_batch_size, 100);
        assert_eq!(config.event_subject, "sqlgate.workflow.events");
    }

    #[test]
    fn test_bind_address() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8090");
    }

    #[test]
    fn test_scheduler_interval_floor() {
        let config = AppConfig {
            scheduler_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.scheduler_interval().as_secs(), 1);
    }
}
