//! Environment-driven runtime configuration.

use std::env;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// `sqlx` connection string for the graph/run store.
    pub database_url: String,

    /// Address the HTTP surface binds to.
    pub bind_address: String,

    /// Default iteration cap applied to a run when the request does not
    /// supply one.
    pub default_max_iterations: usize,

    /// `tracing-subscriber` env-filter directive.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/workflow.db".to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
            default_max_iterations: 10,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Build a [`Config`] from environment variables, falling back to
    /// [`Config::default`] for anything unset or unparsable.
    ///
    /// Recognized variables: `DATABASE_URL`, `BIND_ADDRESS`,
    /// `MAX_ITERATIONS`, `LOG_FILTER`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            default_max_iterations: env::var("MAX_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_max_iterations),
            log_filter: env::var("LOG_FILTER").unwrap_or(defaults.log_filter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_safety_cap() {
        let config = Config::default();
        assert_eq!(config.default_max_iterations, 10);
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        env::remove_var("DATABASE_URL");
        env::remove_var("BIND_ADDRESS");
        env::remove_var("MAX_ITERATIONS");
        env::remove_var("LOG_FILTER");
        let config = Config::from_env();
        assert_eq!(config.database_url, Config::default().database_url);
        assert_eq!(config.default_max_iterations, 10);
    }
}
