// Application state module
// Immutable per-process state shared by all connections

use std::time::Duration;

use super::types::Config;
use crate::handler::proxy::{self, Forwarder};

/// Application state, built once at startup and shared read-only
pub struct AppState {
    pub config: Config,
    pub signin: Forwarder,
    pub graphql: Forwarder,
}

impl AppState {
    /// Build the upstream client and both forwarders from configuration.
    ///
    /// Fails on an unparsable upstream URL or when TLS roots cannot be set up.
    pub fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let client = proxy::build_client()?;
        let timeout = Duration::from_secs(config.upstream.timeout_secs);
        let max_body_size = config.http.max_body_size;

        let signin = Forwarder::new(
            "signin",
            &config.upstream.signin_url(),
            client.clone(),
            timeout,
            max_body_size,
        )?;
        let graphql = Forwarder::new(
            "graphql",
            &config.upstream.graphql_url(),
            client,
            timeout,
            max_body_size,
        )?;

        Ok(Self {
            config,
            signin,
            graphql,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarders_target_configured_upstream() {
        let docs = tempfile::tempdir().unwrap();
        let config = Config::for_tests("https://platform.zone01.gr/api", docs.path());
        let state = AppState::new(config).unwrap();
        assert_eq!(
            state.signin.target().to_string(),
            "https://platform.zone01.gr/api/auth/signin"
        );
        assert_eq!(
            state.graphql.target().to_string(),
            "https://platform.zone01.gr/api/graphql-engine/v1/graphql"
        );
    }

    #[test]
    fn test_bad_upstream_url_fails_startup() {
        let docs = tempfile::tempdir().unwrap();
        let config = Config::for_tests("not a url", docs.path());
        assert!(AppState::new(config).is_err());
    }
}
