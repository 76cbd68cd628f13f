// src/config.rs

use std::{env, fmt};

use dotenvy::dotenv;
use rust_decimal::Decimal;

/// Flat delivery charge added to every order.
pub const DELIVERY_FEE: Decimal = Decimal::TEN;

/// ISO currency code sent to Razorpay.
pub const CURRENCY: &str = "INR";

/// Lifetime of a password reset token, in seconds.
pub const RESET_TOKEN_TTL_SECS: i64 = 60 * 60;

/// Name of the session cookie carrying the JWT.
pub const AUTH_COOKIE: &str = "token";

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Invalid(key, value) => write!(f, "{} has an invalid value: {}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Razorpay API credentials. Online payments are disabled without them.
#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Session lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Storefront base URL, used to build links in emails.
    pub frontend_url: String,
    /// Adds `Secure` to the session cookie.
    pub cookie_secure: bool,
    pub superadmin_name: String,
    pub superadmin_email: Option<String>,
    pub superadmin_password: Option<String>,
    pub razorpay: Option<RazorpayConfig>,
    pub firebase_project_id: Option<String>,
    pub smtp: Option<SmtpConfig>,
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(key, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let cors_origins = optional("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173,http://localhost:5174".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Razorpay is all-or-nothing.
        let razorpay = match (
            optional("RAZORPAY_KEY_ID"),
            optional("RAZORPAY_KEY_SECRET"),
            optional("RAZORPAY_WEBHOOK_SECRET"),
        ) {
            (Some(key_id), Some(key_secret), Some(webhook_secret)) => Some(RazorpayConfig {
                key_id,
                key_secret,
                webhook_secret,
            }),
            _ => None,
        };

        let smtp = match optional("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parsed("SMTP_PORT", 587)?,
                username: optional("SMTP_USERNAME").unwrap_or_default(),
                password: optional("SMTP_PASSWORD").unwrap_or_default(),
                from: optional("SMTP_FROM")
                    .unwrap_or_else(|| "NeoCart <no-reply@neocart.local>".to_string()),
            }),
            None => None,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration: parsed("JWT_EXPIRATION", 7 * 24 * 60 * 60)?,
            rust_log,
            port: parsed("PORT", 4000)?,
            cors_origins,
            frontend_url: optional("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            cookie_secure: parsed("COOKIE_SECURE", false)?,
            superadmin_name: optional("SUPERADMIN_NAME").unwrap_or_else(|| "Super Admin".to_string()),
            superadmin_email: optional("SUPERADMIN_EMAIL"),
            superadmin_password: optional("SUPERADMIN_PASSWORD"),
            razorpay,
            firebase_project_id: optional("FIREBASE_PROJECT_ID"),
            smtp,
        })
    }

    /// Minimal configuration for tests and tooling.
    pub fn for_tests(database_url: &str, jwt_secret: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            jwt_secret: jwt_secret.to_string(),
            jwt_expiration: 600,
            rust_log: "error".to_string(),
            port: 0,
            cors_origins: vec!["http://localhost:5173".to_string()],
            frontend_url: "http://localhost:5173".to_string(),
            cookie_secure: false,
            superadmin_name: "Super Admin".to_string(),
            superadmin_email: None,
            superadmin_password: None,
            razorpay: None,
            firebase_project_id: None,
            smtp: None,
        }
    }
}
