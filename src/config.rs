// src/config.rs

use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    /// Secret for short-lived access tokens and quiz attempt tokens.
    pub jwt_secret: String,
    /// Separate secret for longer-lived refresh tokens.
    pub jwt_refresh_secret: String,
    /// Access token lifetime in seconds.
    pub jwt_expiration: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_expiration: u64,

    pub rust_log: String,

    /// Optional admin account seeded at startup.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,

    /// Optional SMTP settings for verification-code delivery.
    /// When absent, codes are logged instead of mailed.
    pub smtp_host: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");
        let jwt_refresh_secret =
            env::var("JWT_REFRESH_SECRET").expect("JWT_REFRESH_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        let refresh_expiration = env::var("REFRESH_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7 * 24 * 3600);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_refresh_secret,
            jwt_expiration,
            refresh_expiration,
            rust_log,
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            smtp_host: env::var("SMTP_HOST").ok(),
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            smtp_from: env::var("SMTP_FROM").ok(),
        }
    }
}
