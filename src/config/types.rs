// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub static_files: StaticFilesConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Upstream API the `/signin` and `/graphql` routes forward to
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Scheme, host and common path prefix, e.g. `https://platform.zone01.gr/api`
    pub base_url: String,
    pub signin_path: String,
    pub graphql_path: String,
    /// Seconds to wait for upstream response headers
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn signin_url(&self) -> String {
        join_url(&self.base_url, &self.signin_path)
    }

    pub fn graphql_url(&self) -> String {
        join_url(&self.base_url, &self.graphql_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Static asset responder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StaticFilesConfig {
    pub root: String,
    pub index_files: Vec<String>,
    pub directory_listing: bool,
    /// `Cache-Control` max-age in seconds, 0 for `no-cache`
    pub cache_max_age: u32,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive: bool,
    /// Seconds a connection may take to send request headers, idle keep-alive included
    pub read_timeout: u64,
    pub max_connections: Option<u64>,
    pub shutdown_grace_secs: u64,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HttpConfig {
    pub enable_cors: bool,
    /// Upper bound on a declared request `Content-Length` for forwarded routes
    pub max_body_size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(base_url: &str) -> UpstreamConfig {
        UpstreamConfig {
            base_url: base_url.to_string(),
            signin_path: "/auth/signin".to_string(),
            graphql_path: "graphql-engine/v1/graphql".to_string(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_join_upstream_urls() {
        let cfg = upstream("https://platform.zone01.gr/api");
        assert_eq!(cfg.signin_url(), "https://platform.zone01.gr/api/auth/signin");
        assert_eq!(
            cfg.graphql_url(),
            "https://platform.zone01.gr/api/graphql-engine/v1/graphql"
        );
    }

    #[test]
    fn test_join_trailing_slash() {
        let cfg = upstream("http://127.0.0.1:9000/api/");
        assert_eq!(cfg.signin_url(), "http://127.0.0.1:9000/api/auth/signin");
    }
}
