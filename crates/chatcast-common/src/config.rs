//! Configuration for ChatCast

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Messaging gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (PostgreSQL)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Messaging gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway API base URL
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// Gateway API version segment
    #[serde(default = "default_gateway_api_version")]
    pub api_version: String,

    /// Request timeout in seconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent sends per campaign execution
    #[serde(default = "default_send_concurrency")]
    pub send_concurrency: usize,

    /// How many recipients to process between campaign-status rechecks
    #[serde(default = "default_status_check_interval")]
    pub status_check_interval: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            api_version: default_gateway_api_version(),
            timeout_secs: default_gateway_timeout(),
            send_concurrency: default_send_concurrency(),
            status_check_interval: default_status_check_interval(),
        }
    }
}

fn default_gateway_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_gateway_api_version() -> String {
    "v21.0".to_string()
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_send_concurrency() -> usize {
    10
}

fn default_status_check_interval() -> usize {
    25
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter directive (tracing EnvFilter syntax)
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info,chatcast=debug".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/chatcast/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let server = ServerConfig::default();
        assert_eq!(server.hostname, "localhost");
        assert_eq!(server.bind_address, "0.0.0.0");

        let gateway = GatewayConfig::default();
        assert_eq!(gateway.api_version, "v21.0");
        assert_eq!(gateway.send_concurrency, 10);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
hostname = "chat.example.com"

[database]
url = "postgres://localhost/chatcast"

[api]
port = 9090

[gateway]
base_url = "https://gateway.example.com"
timeout_secs = 10
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.hostname, "chat.example.com");
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.gateway.base_url, "https://gateway.example.com");
        assert_eq!(config.gateway.api_version, "v21.0");
    }
}
