use std::path::PathBuf;
use std::time::Duration;

use time::UtcOffset;
use time::macros::offset;
use url::Url;

use super::error::GatewayError;
use super::rate_limit::RateLimit;
use crate::upstream::UpstreamConfig;

/// HTTP-layer settings shared by config and runtime state.
#[derive(Debug, Clone)]
pub(crate) struct GatewaySettings {
    pub(crate) session_cookie_name: String,
    pub(crate) session_ttl_days: i64,
    pub(crate) secure_cookies: bool,
    pub(crate) trust_forwarded: bool,
    pub(crate) auth_limit: RateLimit,
    pub(crate) write_limit: RateLimit,
    pub(crate) proxy_timeout: Duration,
}

impl GatewaySettings {
    fn defaults() -> Self {
        Self {
            session_cookie_name: "v2fun_session".into(),
            session_ttl_days: 365,
            secure_cookies: false,
            trust_forwarded: false,
            auth_limit: RateLimit::new(10, Duration::from_secs(15 * 60)),
            write_limit: RateLimit::new(20, Duration::from_secs(60)),
            proxy_timeout: Duration::from_secs(30),
        }
    }
}

/// Broker configuration.
///
/// Use [`from_env()`](BrokerConfig::from_env) for deployment, or
/// [`new()`](BrokerConfig::new) with `with_*` methods in tests.
#[derive(Clone)]
pub struct BrokerConfig {
    pub(crate) data_dir: PathBuf,
    pub(crate) secret_passphrase: Option<String>,
    pub(crate) port: u16,
    pub(crate) upstream: UpstreamConfig,
    pub(crate) utc_offset: UtcOffset,
    pub(crate) settings: GatewaySettings,
}

impl BrokerConfig {
    /// Config storing its secret and credential under `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            secret_passphrase: None,
            port: 3210,
            upstream: UpstreamConfig::default(),
            utc_offset: offset!(+8),
            settings: GatewaySettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `PORT`: listen port (default 3210)
    /// - `V2FUN_DATA_DIR`: secret and credential directory (default `./data`)
    /// - `V2FUN_SECRET`: passphrase the process secret is derived from
    /// - `V2FUN_MODE`: `production` enables `Secure` cookies and trusts
    ///   `X-Forwarded-For`
    /// - `V2FUN_UPSTREAM_URL`: upstream base URL
    /// - `V2FUN_CONNECT_TIMEOUT_SECS`, `V2FUN_REQUEST_TIMEOUT_SECS`
    /// - `V2FUN_UTC_OFFSET_HOURS`: offset for localized dates (default 8)
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if a variable is set but unparsable.
    pub fn from_env() -> Result<Self, GatewayError> {
        let data_dir = std::env::var("V2FUN_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let mut config = Self::new(data_dir);

        if let Some(port) = parsed_var::<u16>("PORT")? {
            config = config.with_port(port);
        }
        if let Ok(passphrase) = std::env::var("V2FUN_SECRET") {
            config = config.with_secret_passphrase(passphrase);
        }

        let production = matches!(
            std::env::var("V2FUN_MODE").as_deref(),
            Ok("production") | Ok("prod"),
        );
        config = config.with_production(production);

        let mut upstream = match std::env::var("V2FUN_UPSTREAM_URL") {
            Ok(url_str) => {
                let url: Url = url_str
                    .parse()
                    .map_err(|e| GatewayError::Config(format!("V2FUN_UPSTREAM_URL: {e}")))?;
                UpstreamConfig::new(url)
            }
            Err(_) => UpstreamConfig::default(),
        };
        if let Some(secs) = parsed_var::<u64>("V2FUN_CONNECT_TIMEOUT_SECS")? {
            upstream = upstream.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parsed_var::<u64>("V2FUN_REQUEST_TIMEOUT_SECS")? {
            upstream = upstream.with_request_timeout(Duration::from_secs(secs));
        }
        config = config.with_upstream(upstream);

        if let Some(hours) = parsed_var::<i8>("V2FUN_UTC_OFFSET_HOURS")? {
            let offset = UtcOffset::from_hms(hours, 0, 0)
                .map_err(|e| GatewayError::Config(format!("V2FUN_UTC_OFFSET_HOURS: {e}")))?;
            config = config.with_utc_offset(offset);
        }

        Ok(config)
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_secret_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.secret_passphrase = Some(passphrase.into());
        self
    }

    #[must_use]
    pub fn with_upstream(mut self, upstream: UpstreamConfig) -> Self {
        self.upstream = upstream;
        self
    }

    #[must_use]
    pub fn with_utc_offset(mut self, offset: UtcOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// Production mode: `Secure` cookies, client IP from `X-Forwarded-For`.
    #[must_use]
    pub fn with_production(mut self, production: bool) -> Self {
        self.settings.secure_cookies = production;
        self.settings.trust_forwarded = production;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_auth_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.settings.auth_limit = RateLimit::new(max_requests, window);
        self
    }

    #[must_use]
    pub fn with_write_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.settings.write_limit = RateLimit::new(max_requests, window);
        self
    }

    #[must_use]
    pub fn with_proxy_timeout(mut self, timeout: Duration) -> Self {
        self.settings.proxy_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("data_dir", &self.data_dir)
            .field(
                "secret_passphrase",
                &self.secret_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .field("port", &self.port)
            .field("upstream", &self.upstream)
            .field("utc_offset", &self.utc_offset)
            .field("settings", &self.settings)
            .finish()
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, GatewayError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| GatewayError::Config(format!("{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BrokerConfig::new("/tmp/x");
        assert_eq!(config.port(), 3210);
        assert_eq!(config.utc_offset.whole_hours(), 8);
        assert_eq!(config.settings.session_cookie_name, "v2fun_session");
        assert_eq!(config.settings.session_ttl_days, 365);
        assert!(!config.settings.secure_cookies);
        assert_eq!(config.settings.auth_limit.max_requests, 10);
        assert_eq!(config.settings.write_limit.window, Duration::from_secs(60));
    }

    #[test]
    fn production_flips_cookie_and_proxy_trust() {
        let config = BrokerConfig::new("/tmp/x").with_production(true);
        assert!(config.settings.secure_cookies);
        assert!(config.settings.trust_forwarded);
    }

    #[test]
    fn debug_redacts_passphrase() {
        let config = BrokerConfig::new("/tmp/x").with_secret_passphrase("hunter2");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn parsed_var_reports_name() {
        // SAFETY: test-only env mutation on a variable no other test reads.
        unsafe { std::env::set_var("V2FUN_TEST_BAD_PORT", "not-a-port") };
        let err = parsed_var::<u16>("V2FUN_TEST_BAD_PORT").unwrap_err();
        assert!(err.to_string().contains("V2FUN_TEST_BAD_PORT"));
        assert!(parsed_var::<u16>("V2FUN_TEST_UNSET_VAR").unwrap().is_none());
    }
}
