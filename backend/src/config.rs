// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Percentage at or above which an attempt counts as passed.
pub const PASS_THRESHOLD_PERCENT: f64 = 50.0;

/// Stored `max_attempts` value meaning "no ceiling".
/// Any non-positive value read back from storage is treated the same way.
pub const UNLIMITED_ATTEMPTS: i32 = -1;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        Self {
            database_url,
            jwt_secret,
            rust_log,
            server_port,
        }
    }
}
