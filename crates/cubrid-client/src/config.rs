//! Client configuration.

use std::time::Duration;

use cubrid_codec::DEFAULT_MAX_FRAME_SIZE;

use crate::error::Error;

/// Default broker port.
pub const DEFAULT_PORT: u16 = 33000;

/// Configuration for broker redirect handling.
///
/// After the driver info block the broker may answer with another port on
/// the same host that the client should use instead.
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    /// Whether to follow redirects automatically (default: true).
    pub follow_redirects: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            follow_redirects: true,
        }
    }
}

impl RedirectConfig {
    /// Create a new redirect configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable automatic redirect following.
    #[must_use]
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Disable automatic redirect following.
    ///
    /// When disabled, a redirect reply fails the connection attempt.
    #[must_use]
    pub fn no_follow() -> Self {
        Self {
            follow_redirects: false,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Time to connect and complete the handshake, redirect included
    /// (default: 15s).
    pub connect_timeout: Duration,
    /// Time for one request/response round trip (default: 30s).
    pub command_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the command timeout.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Configuration for connecting to a CUBRID broker.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future releases without breaking semver. Use [`Config::default()`]
/// or [`Config::from_connection_string()`] to construct instances.
#[derive(Clone)]
#[non_exhaustive]
pub struct Config {
    /// Broker hostname or IP address.
    pub host: String,

    /// Broker port (default: 33000).
    pub port: u16,

    /// Database name.
    pub database: String,

    /// User name.
    pub user: String,

    /// Password.
    pub password: String,

    /// Initial auto-commit mode (default: true).
    pub auto_commit: bool,

    /// Rows per fetch request; 0 lets the server decide.
    pub fetch_size: i32,

    /// Largest response frame accepted.
    pub max_frame_size: usize,

    /// Redirect handling configuration.
    pub redirect: RedirectConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: String::new(),
            user: "public".to_string(),
            password: String::new(),
            auto_commit: true,
            fetch_size: 0,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            redirect: RedirectConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("auto_commit", &self.auto_commit)
            .field("fetch_size", &self.fetch_size)
            .field("max_frame_size", &self.max_frame_size)
            .field("redirect", &self.redirect)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") || value == "1" {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("no") || value == "0"
    {
        Some(false)
    } else {
        None
    }
}

fn parse_secs(value: &str) -> Result<Duration, Error> {
    value
        .parse()
        .map(Duration::from_secs)
        .map_err(|_| Error::Config(format!("invalid timeout: {value}")))
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection string into configuration.
    ///
    /// ```text
    /// server=localhost;port=33000;database=demodb;user=dba;password=;
    /// ```
    pub fn from_connection_string(conn_str: &str) -> Result<Self, Error> {
        let mut config = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "server" | "host" => {
                    if let Some((host, port)) = value.split_once(':') {
                        config.host = host.to_string();
                        config.port = port
                            .parse()
                            .map_err(|_| Error::Config(format!("invalid port: {port}")))?;
                    } else {
                        config.host = value.to_string();
                    }
                }
                "port" => {
                    config.port = value
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid port: {value}")))?;
                }
                "database" | "db" => config.database = value.to_string(),
                "user" | "user id" | "uid" => config.user = value.to_string(),
                "password" | "pwd" => config.password = value.to_string(),
                "autocommit" | "auto commit" => {
                    config.auto_commit = parse_bool(value)
                        .ok_or_else(|| Error::Config(format!("invalid autocommit: {value}")))?;
                }
                "connect timeout" | "connection timeout" => {
                    config.timeouts.connect_timeout = parse_secs(value)?;
                }
                "command timeout" => config.timeouts.command_timeout = parse_secs(value)?,
                "fetch size" | "fetchsize" => {
                    config.fetch_size = value
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid fetch size: {value}")))?;
                }
                _ => {
                    tracing::debug!(
                        key = key,
                        value = value,
                        "ignoring unknown connection string option"
                    );
                }
            }
        }

        Ok(config)
    }

    /// Set the broker host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the broker port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the user name and password.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the initial auto-commit mode.
    #[must_use]
    pub fn auto_commit(mut self, enabled: bool) -> Self {
        self.auto_commit = enabled;
        self
    }

    /// Set the fetch size hint.
    #[must_use]
    pub fn fetch_size(mut self, rows: i32) -> Self {
        self.fetch_size = rows.max(0);
        self
    }

    /// Set the largest accepted response frame.
    #[must_use]
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect_timeout = timeout;
        self
    }

    /// Set the command timeout.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.command_timeout = timeout;
        self
    }

    /// Set the redirect configuration.
    #[must_use]
    pub fn redirect(mut self, redirect: RedirectConfig) -> Self {
        self.redirect = redirect;
        self
    }

    /// Set the full timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_parsing() {
        let config = Config::from_connection_string(
            "server=db.local;port=30000;database=demodb;user=dba;password=secret;",
        )
        .unwrap();

        assert_eq!(config.host, "db.local");
        assert_eq!(config.port, 30000);
        assert_eq!(config.database, "demodb");
        assert_eq!(config.user, "dba");
        assert_eq!(config.password, "secret");
    }

    #[test]
    fn test_connection_string_host_port() {
        let config = Config::from_connection_string("host=127.0.0.1:33100;db=x").unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 33100);
        assert_eq!(config.database, "x");
    }

    #[test]
    fn test_connection_string_options() {
        let config = Config::from_connection_string(
            "autocommit=false;connect timeout=3;command timeout=7;fetch size=100;charset=utf-8",
        )
        .unwrap();
        assert!(!config.auto_commit);
        assert_eq!(config.timeouts.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.timeouts.command_timeout, Duration::from_secs(7));
        assert_eq!(config.fetch_size, 100);
    }

    #[test]
    fn test_connection_string_errors() {
        assert!(matches!(
            Config::from_connection_string("port=abc"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_connection_string("database"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_connection_string("autocommit=maybe"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.auto_commit);
        assert!(config.redirect.follow_redirects);
        assert_eq!(config.timeouts.command_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = Config::new().credentials("dba", "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
