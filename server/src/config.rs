use std::{env, time::Duration};

use regex::Regex;

use crate::error::{AppError, AppResult};

pub const DEFAULT_GRAPH_VERSION: &str = "v22.0";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_WEBHOOK_PATH: &str = "/api/whatsapp/webhook";

/// Credentials used when an inbound phone-number id has no tenant row
/// (single-tenant deployments).
#[derive(Clone, Default)]
pub struct DefaultCredentials {
    pub access_token: Option<String>,
    pub graph_version: String,
    pub phone_number_id: Option<String>,
}

impl std::fmt::Debug for DefaultCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultCredentials")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("graph_version", &self.graph_version)
            .field("phone_number_id", &self.phone_number_id)
            .finish()
    }
}

#[derive(Clone)]
pub struct WebhookConfig {
    pub app_secret: Option<String>,
    pub verify_token: Option<String>,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("app_secret", &self.app_secret.as_ref().map(|_| "<redacted>"))
            .field("verify_token", &self.verify_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct OutboundConfig {
    pub graph_base_url: String,
    pub timeout: Duration,
    pub attempts: u32,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            attempts: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub webhook_path: String,
    pub database_url: Option<String>,
    pub webhook: WebhookConfig,
    pub defaults: DefaultCredentials,
    pub outbound: OutboundConfig,
}

impl AppConfig {
    /// Reads `.env` (if present) and the process environment.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = parse_number(var("PORT"), "PORT", 4000u16)?;
        let timeout_secs = parse_number(
            var("WHATSAPP_SEND_TIMEOUT_SECS"),
            "WHATSAPP_SEND_TIMEOUT_SECS",
            10u64,
        )?;
        let attempts = parse_number(var("WHATSAPP_SEND_ATTEMPTS"), "WHATSAPP_SEND_ATTEMPTS", 1u32)?;
        if attempts == 0 {
            return Err(AppError::Config(
                "WHATSAPP_SEND_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let graph_version =
            var("WHATSAPP_GRAPH_VERSION").unwrap_or_else(|| DEFAULT_GRAPH_VERSION.to_string());
        validate_graph_version(&graph_version)?;

        let webhook_path = var("WEBHOOK_PATH").unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.to_string());
        if !webhook_path.starts_with('/') {
            return Err(AppError::Config(format!(
                "WEBHOOK_PATH must start with '/': {webhook_path}"
            )));
        }

        Ok(Self {
            port,
            webhook_path,
            database_url: resolve_database_url(&var),
            webhook: WebhookConfig {
                app_secret: var("META_APP_SECRET"),
                verify_token: var("WHATSAPP_VERIFY_TOKEN"),
            },
            defaults: DefaultCredentials {
                access_token: var("WHATSAPP_ACCESS_TOKEN"),
                graph_version,
                phone_number_id: var("WHATSAPP_PHONE_NUMBER_ID"),
            },
            outbound: OutboundConfig {
                graph_base_url: var("WHATSAPP_GRAPH_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                timeout: Duration::from_secs(timeout_secs.max(1)),
                attempts,
            },
        })
    }
}

fn parse_number<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> AppResult<T> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} is not a valid number: {value}"))),
    }
}

pub fn validate_graph_version(value: &str) -> AppResult<()> {
    let valid = Regex::new(r"^v\d+\.\d+$")
        .map(|re| re.is_match(value))
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "WHATSAPP_GRAPH_VERSION must look like v22.0, got {value}"
        )))
    }
}

/// `DATABASE_URL` wins; otherwise a URL is assembled from `POSTGRES_*`/`PG*`
/// when a host is given. `None` selects the in-memory store.
fn resolve_database_url(var: &impl Fn(&str) -> Option<String>) -> Option<String> {
    if let Some(url) = var("DATABASE_URL") {
        return Some(url);
    }
    let host = var("POSTGRES_HOST").or_else(|| var("PGHOST"))?;
    let port = var("POSTGRES_PORT")
        .or_else(|| var("PGPORT"))
        .unwrap_or_else(|| "5432".to_string());
    let user = var("POSTGRES_USER")
        .or_else(|| var("PGUSER"))
        .unwrap_or_else(|| "postgres".to_string());
    let password = var("POSTGRES_PASSWORD")
        .or_else(|| var("PGPASSWORD"))
        .unwrap_or_default();
    let db = var("POSTGRES_DB")
        .or_else(|| var("PGDATABASE"))
        .unwrap_or_else(|| "wa_leads".to_string());
    Some(format!("postgres://{user}:{password}@{host}:{port}/{db}"))
}
