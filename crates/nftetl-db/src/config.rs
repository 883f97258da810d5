//! Connection credentials

use nftetl_common::env;
use sqlx::postgres::PgConnectOptions;
use std::time::Duration;

use crate::error::{DbError, DbResult};

/// Default database host.
pub const DEFAULT_DB_HOST: &str = "localhost";

/// Default PostgreSQL port.
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Default database user.
pub const DEFAULT_DB_USER: &str = "postgres";

/// Default connect timeout in seconds.
pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Everything needed to open the single pipeline connection
#[derive(Clone)]
pub struct DbCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl DbCredentials {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            user: DEFAULT_DB_USER.to_string(),
            password: String::new(),
            database: database.into(),
            connect_timeout_secs: DEFAULT_DB_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Load from `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`
    /// and `DB_CONNECT_TIMEOUT_SECS`. Only `DB_NAME` is required.
    pub fn from_env() -> DbResult<Self> {
        let credentials = Self {
            host: env::string_or("DB_HOST", DEFAULT_DB_HOST),
            port: env::parse_or("DB_PORT", DEFAULT_DB_PORT)?,
            user: env::string_or("DB_USER", DEFAULT_DB_USER),
            password: env::var("DB_PASSWORD").unwrap_or_default(),
            database: env::required("DB_NAME")?,
            connect_timeout_secs: env::parse_or(
                "DB_CONNECT_TIMEOUT_SECS",
                DEFAULT_DB_CONNECT_TIMEOUT_SECS,
            )?,
        };

        credentials.validate()?;
        Ok(credentials)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.host.is_empty() {
            return Err(DbError::Config("database host cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(DbError::Config("database port must be greater than 0".to_string()));
        }
        if self.database.is_empty() {
            return Err(DbError::Config("database name cannot be empty".to_string()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(DbError::Config("connect timeout must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// `host:port/database`, safe to log
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }

    pub(crate) fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database)
            .application_name("nftetl");

        if self.password.is_empty() {
            options
        } else {
            options.password(&self.password)
        }
    }
}
