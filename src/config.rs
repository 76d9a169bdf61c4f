use std::env;

use serde::Deserialize;

/// Boot-time, env-sourced configuration. Structural values only — anything an
/// operator should be able to tune without a restart lives in `system_config`
/// instead (see `db::repository::system_config_repository`) and is read fresh
/// every tick by `SystemConfigSnapshot::load`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub webhook: WebhookConfig,
    pub fetcher: FetcherConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// `agent_execution_interval` default, minutes. Overridable at runtime via `system_config`.
    pub execution_interval_minutes: u64,
    /// Upper bound on a single tick's wall-clock time (`tick_timeout_seconds`).
    pub tick_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Escalation messages always route here regardless of `orgName`.
    pub escalation_webhook_url: String,
    /// Connect/read timeout per individual webhook call.
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    pub endpoint_url: String,
    pub request_timeout_seconds: u64,
    pub max_client_retries: u32,
    pub initial_backoff_millis: u64,
    pub max_backoff_millis: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/sla_agent.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            scheduler: SchedulerConfig {
                execution_interval_minutes: env::var("AGENT_EXECUTION_INTERVAL_MINUTES")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
                tick_timeout_seconds: env::var("TICK_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
            },
            webhook: WebhookConfig {
                escalation_webhook_url: env::var("ESCALATION_WEBHOOK_URL")
                    .map_err(|_| ConfigError::MissingEnv("ESCALATION_WEBHOOK_URL".to_string()))?,
                request_timeout_seconds: env::var("WEBHOOK_REQUEST_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            fetcher: FetcherConfig {
                endpoint_url: env::var("OPPORTUNITY_SOURCE_URL")
                    .map_err(|_| ConfigError::MissingEnv("OPPORTUNITY_SOURCE_URL".to_string()))?,
                request_timeout_seconds: env::var("FETCHER_REQUEST_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                max_client_retries: env::var("FETCHER_MAX_CLIENT_RETRIES")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                initial_backoff_millis: env::var("FETCHER_INITIAL_BACKOFF_MILLIS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .unwrap_or(500),
                max_backoff_millis: env::var("FETCHER_MAX_BACKOFF_MILLIS")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .unwrap_or(8000),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/sla_agent.db".to_string(),
                max_connections: 5,
            },
            scheduler: SchedulerConfig {
                execution_interval_minutes: 60,
                tick_timeout_seconds: 300,
            },
            webhook: WebhookConfig {
                escalation_webhook_url: String::new(),
                request_timeout_seconds: 10,
            },
            fetcher: FetcherConfig {
                endpoint_url: String::new(),
                request_timeout_seconds: 10,
                max_client_retries: 2,
                initial_backoff_millis: 500,
                max_backoff_millis: 8000,
            },
        }
    }
}
