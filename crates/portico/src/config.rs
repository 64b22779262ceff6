//! Application configuration.

use portico_telemetry::LogConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for a portico application.
///
/// # Example
///
/// ```rust
/// use portico::AppConfig;
///
/// let config = AppConfig::builder()
///     .http_addr("127.0.0.1:8080")
///     .build_version("1.4.0")
///     .build();
///
/// assert_eq!(config.http_addr(), "127.0.0.1:8080");
/// ```
#[derive(Debug, Clone)]
pub struct AppConfig {
    http_addr: String,
    app_name: String,
    env_name: String,
    build_version: String,
    debug: bool,
    use_default_headers: bool,
    exempt_paths: Vec<String>,
    log: LogConfig,
    shutdown_timeout: Duration,
}

impl AppConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// The address to bind the HTTP listener to.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns the parse error when the address is not `host:port`.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.http_addr.parse()
    }

    /// The application name reported on request spans.
    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// The deployment environment name, for example `production`.
    #[must_use]
    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    /// The build version reported in headers and transaction attributes.
    #[must_use]
    pub fn build_version(&self) -> &str {
        &self.build_version
    }

    /// Whether the default security and cache headers are applied.
    #[must_use]
    pub fn use_default_headers(&self) -> bool {
        self.use_default_headers
    }

    /// Whether debug mode (request/response dumps) is on.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Paths exempt from transactions and request logging.
    #[must_use]
    pub fn exempt_paths(&self) -> &[String] {
        &self.exempt_paths
    }

    /// Logging configuration.
    #[must_use]
    pub fn log(&self) -> &LogConfig {
        &self.log
    }

    /// How long to wait for in-flight connections on shutdown.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfigBuilder::default().build()
    }
}

/// Builder for [`AppConfig`].
#[derive(Debug, Clone)]
pub struct AppConfigBuilder {
    http_addr: String,
    app_name: String,
    env_name: String,
    build_version: String,
    debug: bool,
    use_default_headers: bool,
    exempt_paths: Vec<String>,
    log: LogConfig,
    shutdown_timeout: Duration,
}

impl Default for AppConfigBuilder {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            app_name: "portico".to_string(),
            env_name: "development".to_string(),
            build_version: "unknown".to_string(),
            debug: false,
            use_default_headers: true,
            exempt_paths: vec!["/health".to_string()],
            log: LogConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl AppConfigBuilder {
    /// Sets the bind address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Sets the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Sets the deployment environment name.
    #[must_use]
    pub fn env_name(mut self, name: impl Into<String>) -> Self {
        self.env_name = name.into();
        self
    }

    /// Sets the build version.
    #[must_use]
    pub fn build_version(mut self, version: impl Into<String>) -> Self {
        self.build_version = version.into();
        self
    }

    /// Enables or disables the default response headers stage.
    #[must_use]
    pub fn use_default_headers(mut self, on: bool) -> Self {
        self.use_default_headers = on;
        self
    }

    /// Turns debug mode on or off.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replaces the exempt path list.
    #[must_use]
    pub fn exempt_paths(mut self, paths: Vec<String>) -> Self {
        self.exempt_paths = paths;
        self
    }

    /// Adds one exempt path.
    #[must_use]
    pub fn exempt_path(mut self, path: impl Into<String>) -> Self {
        self.exempt_paths.push(path.into());
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Sets the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> AppConfig {
        AppConfig {
            http_addr: self.http_addr,
            app_name: self.app_name,
            env_name: self.env_name,
            build_version: self.build_version,
            debug: self.debug,
            use_default_headers: self.use_default_headers,
            exempt_paths: self.exempt_paths,
            log: self.log,
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_exempt_health() {
        let config = AppConfig::default();
        assert_eq!(config.http_addr(), "0.0.0.0:8080");
        assert_eq!(config.exempt_paths(), ["/health".to_string()]);
        assert!(!config.debug());
        assert!(config.use_default_headers());
        assert_eq!(config.app_name(), "portico");
        assert_eq!(config.env_name(), "development");
    }

    #[test]
    fn builder_overrides() {
        let config = AppConfig::builder()
            .http_addr("127.0.0.1:9999")
            .app_name("widget-svc")
            .env_name("staging")
            .build_version("2.0.0")
            .debug(true)
            .use_default_headers(false)
            .exempt_path("/ready")
            .build();

        assert_eq!(config.http_addr(), "127.0.0.1:9999");
        assert_eq!(config.app_name(), "widget-svc");
        assert_eq!(config.env_name(), "staging");
        assert_eq!(config.build_version(), "2.0.0");
        assert!(config.debug());
        assert!(!config.use_default_headers());
        assert_eq!(
            config.exempt_paths(),
            ["/health".to_string(), "/ready".to_string()]
        );
        assert!(config.socket_addr().is_ok());
    }

    #[test]
    fn bad_addr_fails_to_parse() {
        let config = AppConfig::builder().http_addr("not-an-addr").build();
        assert!(config.socket_addr().is_err());
    }
}
