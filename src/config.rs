use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SqlMiddlewareDbError;
use crate::types::Charset;

const DEFAULT_PORT: u16 = 3306;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POOL_SIZE: usize = 10;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Validated connection parameters for a MySQL/MariaDB server.
///
/// Build with [`ConnectionConfig::builder`] or deserialize from any `serde` format;
/// both paths run the same validation, so an invalid record never reaches `connect`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawConnectionConfig")]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    username: String,
    password: String,
    database: String,
    connect_timeout: Duration,
    charset: Charset,
}

impl ConnectionConfig {
    #[must_use]
    pub fn builder(
        host: impl Into<String>,
        username: impl Into<String>,
        database: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(host, username, database)
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn charset(&self) -> Charset {
        self.charset
    }
}

// Manual Debug implementation so the password never lands in logs
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .field("charset", &self.charset)
            .finish()
    }
}

/// Fluent builder for [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    raw: RawConnectionConfig,
}

impl ConnectionConfigBuilder {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            raw: RawConnectionConfig {
                host: host.into(),
                port: u32::from(DEFAULT_PORT),
                username: username.into(),
                password: String::new(),
                database: database.into(),
                connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
                charset: Charset::default(),
            },
        }
    }

    #[must_use]
    pub fn port(mut self, port: u32) -> Self {
        self.raw.port = port;
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.raw.password = password.into();
        self
    }

    #[must_use]
    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.raw.connect_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn charset(mut self, charset: Charset) -> Self {
        self.raw.charset = charset;
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// # Errors
    /// Returns `SqlMiddlewareDbError::ConfigError` naming the first invalid field.
    pub fn build(self) -> Result<ConnectionConfig, SqlMiddlewareDbError> {
        ConnectionConfig::try_from(self.raw)
    }
}

/// Unvalidated form shared by the builder and deserialization.
#[derive(Debug, Clone, Deserialize)]
struct RawConnectionConfig {
    host: String,
    #[serde(default = "default_port")]
    port: u32,
    username: String,
    #[serde(default)]
    password: String,
    database: String,
    #[serde(default = "default_connect_timeout", alias = "connect_timeout")]
    connect_timeout_secs: u64,
    #[serde(default)]
    charset: Charset,
}

fn default_port() -> u32 {
    u32::from(DEFAULT_PORT)
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl TryFrom<RawConnectionConfig> for ConnectionConfig {
    type Error = SqlMiddlewareDbError;

    fn try_from(raw: RawConnectionConfig) -> Result<Self, Self::Error> {
        require_non_empty("host", &raw.host)?;
        require_non_empty("username", &raw.username)?;
        require_non_empty("database", &raw.database)?;

        let port = u16::try_from(raw.port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                SqlMiddlewareDbError::ConfigError(format!(
                    "port must be between 1 and 65535, got {}",
                    raw.port
                ))
            })?;

        if raw.connect_timeout_secs == 0 {
            return Err(SqlMiddlewareDbError::ConfigError(
                "connect_timeout must be greater than zero".to_string(),
            ));
        }

        Ok(ConnectionConfig {
            host: raw.host,
            port,
            username: raw.username,
            password: raw.password,
            database: raw.database,
            connect_timeout: Duration::from_secs(raw.connect_timeout_secs),
            charset: raw.charset,
        })
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), SqlMiddlewareDbError> {
    if value.trim().is_empty() {
        Err(SqlMiddlewareDbError::ConfigError(format!(
            "{field} is required"
        )))
    } else {
        Ok(())
    }
}

/// Sizing and wait behaviour for [`crate::pool::MiddlewarePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    max_size: usize,
    acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl PoolOptions {
    /// # Errors
    /// Returns `SqlMiddlewareDbError::ConfigError` when `max_size` is zero.
    pub fn new(max_size: usize) -> Result<Self, SqlMiddlewareDbError> {
        if max_size == 0 {
            return Err(SqlMiddlewareDbError::ConfigError(
                "pool max_size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_size,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_defaults() {
        let cfg = ConnectionConfig::builder("db.internal", "app", "shop")
            .password("secret")
            .build()
            .unwrap();
        assert_eq!(cfg.port(), 3306);
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.charset(), Charset::Utf8mb4);
        assert!(!format!("{cfg:?}").contains("secret"));
    }

    #[test]
    fn rejects_invalid_fields() {
        let cases = [
            ConnectionConfig::builder("", "app", "shop"),
            ConnectionConfig::builder("h", " ", "shop"),
            ConnectionConfig::builder("h", "app", ""),
            ConnectionConfig::builder("h", "app", "shop").port(0),
            ConnectionConfig::builder("h", "app", "shop").port(70_000),
            ConnectionConfig::builder("h", "app", "shop").connect_timeout_secs(0),
        ];
        for case in cases {
            assert!(matches!(
                case.build(),
                Err(SqlMiddlewareDbError::ConfigError(_))
            ));
        }
    }

    #[test]
    fn deserializes_with_validation() {
        let cfg: ConnectionConfig = serde_json::from_str(
            r#"{"host":"h","port":3307,"username":"u","password":"p","database":"d","connect_timeout":5,"charset":"utf8"}"#,
        )
        .unwrap();
        assert_eq!(cfg.port(), 3307);
        assert_eq!(cfg.charset(), Charset::Utf8mb3);
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(5));

        let bad = serde_json::from_str::<ConnectionConfig>(
            r#"{"host":"h","port":0,"username":"u","database":"d"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn pool_options_reject_zero() {
        assert!(PoolOptions::new(0).is_err());
        assert_eq!(PoolOptions::new(4).unwrap().max_size(), 4);
    }
}
