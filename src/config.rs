// src/config.rs

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,

    /// Directory holding the quiz JSON documents.
    pub quiz_dir: PathBuf,

    /// Bootstrap admin credentials, seeded at startup when both are set.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,

    // SMTP transport settings. Sending is attempted only when host,
    // username, password and sender are all configured.
    pub email_host: Option<String>,
    pub email_port: u16,
    pub email_username: Option<String>,
    pub email_password: Option<String>,
    pub email_from: Option<String>,

    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86400);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let quiz_dir = env::var("QUIZ_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/questions"));

        let email_port = env::var("EMAIL_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(587);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            quiz_dir,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            email_host: env::var("EMAIL_HOST").ok(),
            email_port,
            email_username: env::var("EMAIL_USERNAME").ok(),
            email_password: env::var("EMAIL_PASSWORD").ok(),
            email_from: env::var("EMAIL_FROM").ok(),
            base_url,
        }
    }

    /// True when every field needed to open an SMTP session is present.
    pub fn smtp_configured(&self) -> bool {
        self.email_host.is_some()
            && self.email_username.is_some()
            && self.email_password.is_some()
            && self.email_from.is_some()
    }
}
