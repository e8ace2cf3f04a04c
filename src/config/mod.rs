// Configuration module entry point
// Loads the immutable gateway configuration and holds the shared runtime state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{
    Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig, StaticFilesConfig,
    UpstreamConfig,
};

impl Config {
    /// Load configuration from specified file path (without extension)
    ///
    /// Sources, later ones winning: built-in defaults, the optional config file,
    /// `GATEWAY_*` environment variables (`__` separates nested keys), and
    /// finally a non-empty `PORT` variable.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        Self::load_with_port(config_path, std::env::var("PORT").ok())
    }

    fn load_with_port(config_path: &str, port: Option<String>) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("upstream.base_url", "https://platform.zone01.gr/api")?
            .set_default("upstream.signin_path", "/auth/signin")?
            .set_default("upstream.graphql_path", "/graphql-engine/v1/graphql")?
            .set_default("upstream.timeout_secs", 30)?
            .set_default("static_files.root", "./docs")?
            .set_default("static_files.index_files", vec!["index.html", "index.htm"])?
            .set_default("static_files.directory_listing", true)?
            .set_default("static_files.cache_max_age", 0)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.shutdown_grace_secs", 10)?
            .set_default("http.enable_cors", false)?
            .set_override_option("server.port", port.filter(|p| !p.is_empty()))?
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Defaults pointed at a local upstream and static root
    #[cfg(test)]
    pub fn for_tests(upstream_base_url: &str, static_root: &std::path::Path) -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                workers: None,
            },
            upstream: UpstreamConfig {
                base_url: upstream_base_url.to_string(),
                signin_path: "/auth/signin".to_string(),
                graphql_path: "/graphql-engine/v1/graphql".to_string(),
                timeout_secs: 5,
            },
            static_files: StaticFilesConfig {
                root: static_root.to_string_lossy().into_owned(),
                index_files: vec!["index.html".to_string()],
                directory_listing: true,
                cache_max_age: 0,
            },
            logging: LoggingConfig {
                level: "error".to_string(),
                access_log: true,
                access_log_format: "combined".to_string(),
                access_log_file: None,
                error_log_file: None,
            },
            performance: PerformanceConfig {
                keep_alive: true,
                read_timeout: 30,
                max_connections: None,
                shutdown_grace_secs: 1,
            },
            http: HttpConfig::default(),
        }
    }
}
