// src/config.rs

use std::env;

use dotenvy::dotenv;

use crate::error::AppError;

/// Token lifetime used when `JWT_EXPIRATION` is not set (one day).
pub const DEFAULT_JWT_EXPIRATION: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub port: u16,
    pub admin_email: Option<String>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let jwt_expiration = match env::var("JWT_EXPIRATION") {
            Ok(raw) => raw.parse::<u64>().map_err(|e| {
                AppError::InternalServerError(format!("JWT_EXPIRATION is not a number: {}", e))
            })?,
            Err(_) => DEFAULT_JWT_EXPIRATION,
        };

        let port = match env::var("APP_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|e| {
                AppError::InternalServerError(format!("APP_PORT is not a valid port: {}", e))
            })?,
            Err(_) => 3000,
        };

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            port,
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        })
    }
}

fn required(key: &str) -> Result<String, AppError> {
    env::var(key).map_err(|_| AppError::InternalServerError(format!("{} must be set", key)))
}
