pub mod rate_limits;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::config::rate_limits::RateLimits;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailTransportKind {
    Smtp,
    Outbox,
}

impl FromStr for MailTransportKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "smtp" => Ok(Self::Smtp),
            "outbox" => Ok(Self::Outbox),
            other => Err(format!("unknown mail transport: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub starttls: bool,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub database_url: String,
    pub redis_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub paseto_access_key: [u8; 32],
    pub access_ttl_minutes: u64,
    pub mail_transport: MailTransportKind,
    pub smtp: SmtpConfig,
    pub mail_from: String,
    pub search_page_size: i64,
    pub reminder_interval_seconds: u64,
    pub reminder_lock_ttl_seconds: u64,
    pub rate_limits: RateLimits,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");

        let mail_transport: MailTransportKind = env_or_parse("MAIL_TRANSPORT", "smtp")?;
        let smtp = SmtpConfig {
            host: env_or("SMTP_HOST", "localhost"),
            port: env_or_parse("SMTP_PORT", "587")?,
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            starttls: env_or_parse("SMTP_STARTTLS", "true")?,
        };

        let search_page_size: i64 = env_or_parse("SEARCH_PAGE_SIZE", "12")?;
        if search_page_size <= 0 {
            return Err(anyhow!("invalid SEARCH_PAGE_SIZE: must be positive"));
        }
        let reminder_interval_seconds = positive(
            "REMINDER_INTERVAL_SECONDS",
            env_or_parse("REMINDER_INTERVAL_SECONDS", "3600")?,
        )?;
        let reminder_lock_ttl_seconds = positive(
            "REMINDER_LOCK_TTL_SECONDS",
            env_or_parse("REMINDER_LOCK_TTL_SECONDS", "600")?,
        )?;

        Ok(Self {
            http_addr,
            app_mode,
            database_url: env_or_err("DATABASE_URL")?,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1/"),
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            paseto_access_key: env_key_32("PASETO_ACCESS_KEY")?,
            access_ttl_minutes: env_or_parse("ACCESS_TTL_MINUTES", "60")?,
            mail_transport,
            smtp,
            mail_from: env_or("MAIL_FROM", "noreply@masterclass-portal.com"),
            search_page_size,
            reminder_interval_seconds,
            reminder_lock_ttl_seconds,
            rate_limits: RateLimits {
                registrations_per_hour: env_or_parse("RATE_LIMIT_REGISTRATIONS_PER_HOUR", "30")?,
                cancellations_per_hour: env_or_parse("RATE_LIMIT_CANCELLATIONS_PER_HOUR", "30")?,
                autocomplete_per_minute: env_or_parse(
                    "RATE_LIMIT_AUTOCOMPLETE_PER_MINUTE",
                    "120",
                )?,
                search_per_minute: env_or_parse("RATE_LIMIT_SEARCH_PER_MINUTE", "120")?,
            },
            admin_email: std::env::var("ADMIN_EMAIL").ok(),
            admin_password: std::env::var("ADMIN_PASSWORD").ok(),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

/// Zero is not a valid lock TTL or tick interval.
fn positive(key: &str, value: u64) -> Result<u64> {
    if value == 0 {
        return Err(anyhow!("invalid {}: must be positive", key));
    }
    Ok(value)
}

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    decode_key_32(key, &value)
}

fn decode_key_32(key: &str, value: &str) -> Result<[u8; 32]> {
    let decoded = STANDARD
        .decode(value.as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    if decoded.len() != 32 {
        return Err(anyhow!("invalid {}: expected 32 bytes", key));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded);
    Ok(key_bytes)
}
