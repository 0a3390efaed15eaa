use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use secrecy::Secret;
use service_core::config::Config as ServerConfig;

#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub request_timeout: Duration,
    pub database: DatabaseConfig,
    pub epay: EpayConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Gateway credentials and endpoints.
#[derive(Clone, Debug)]
pub struct EpayConfig {
    pub api_url: String,
    pub oauth_url: String,
    /// Invoice endpoint; invoices are POSTed here as JSON.
    pub payment_page_url: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub shop_id: String,
    pub terminal_id: String,
    pub currency: String,
    pub post_link: String,
    /// Overrides the built-in gateway public key.
    pub public_key_pem: Option<String>,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let server = ServerConfig::load().map_err(|e| anyhow!("{}", e))?;

        let database = DatabaseConfig {
            url: Secret::new(required("DATABASE_URL")?),
            max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            min_connections: parsed("DATABASE_MIN_CONNECTIONS", 1)?,
        };

        let epay = EpayConfig {
            api_url: env::var("EPAY_URL").unwrap_or_default(),
            oauth_url: required("EPAY_OAUTH_URL")?,
            payment_page_url: required("EPAY_PAYMENT_PAGE_URL")?,
            client_id: required("EPAY_LOGIN")?,
            client_secret: Secret::new(required("EPAY_PASSWORD")?),
            shop_id: required("EPAY_SHOP_ID")?,
            terminal_id: required("EPAY_TERMINAL_ID")?,
            currency: env::var("EPAY_CURRENCY").unwrap_or_else(|_| "KZT".to_string()),
            post_link: env::var("EPAY_POST_LINK").unwrap_or_default(),
            public_key_pem: env::var("EPAY_PUBLIC_KEY_PEM").ok().filter(|pem| !pem.trim().is_empty()),
            timeout: Duration::from_secs(parsed("EPAY_TIMEOUT_SECONDS", 30)?),
        };

        Ok(Self {
            server,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "commerce-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|e| !e.is_empty()),
            request_timeout: Duration::from_secs(parsed("REQUEST_TIMEOUT_SECONDS", 60)?),
            database,
            epay,
        })
    }
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{} must be set", key))
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}
