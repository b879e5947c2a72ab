use std::time::Duration;

use reqwest::header::{COOKIE, LOCATION, REFERER};
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;

pub const DEFAULT_BASE_URL: &str = "https://www.v2ex.com";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

/// Upstream site connection settings.
///
/// ```rust,ignore
/// let config = UpstreamConfig::new("https://www.v2ex.com".parse()?)
///     .with_request_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct UpstreamConfig {
    pub(crate) base_url: Url,
    pub(crate) user_agent: String,
    pub(crate) connect_timeout: Duration,
    pub(crate) request_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL.parse().expect("valid default URL"))
    }
}

impl UpstreamConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            user_agent: DEFAULT_USER_AGENT.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(20),
        }
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// A fetched upstream page. Redirects are never followed, so `location`
/// is how callers learn where the upstream wanted to send them.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    pub location: Option<String>,
    pub body: String,
}

impl Page {
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Path component of the redirect target, with any host stripped.
    #[must_use]
    pub fn location_path(&self) -> Option<&str> {
        let location = self.location.as_deref()?;
        let without_scheme = location
            .strip_prefix("https://")
            .or_else(|| location.strip_prefix("http://"));
        match without_scheme {
            Some(rest) => Some(rest.find('/').map_or("/", |i| &rest[i..])),
            None => Some(location),
        }
    }
}

/// HTTP client for the upstream site.
///
/// Every request carries explicit connect and total timeouts; a hung
/// upstream surfaces as [`Error::Timeout`].
pub struct UpstreamClient {
    config: UpstreamConfig,
    http: reqwest::Client,
}

impl UpstreamClient {
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the TLS backend cannot be initialised.
    pub fn new(config: UpstreamConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { config, http })
    }

    #[must_use]
    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Resolves a path (with optional query) against the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the path does not form a valid URL.
    pub fn url(&self, path: &str) -> Result<Url, Error> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid upstream path {path}: {e}")))
    }

    pub async fn get(&self, path: &str, credential: Option<&str>) -> Result<Page, Error> {
        let mut request = self.http.get(self.url(path)?);
        if let Some(cookie) = credential {
            request = request.header(COOKIE, cookie);
        }
        let response = request.send().await.map_err(Error::from_upstream)?;
        Self::into_page(response).await
    }

    /// Submits a form-encoded body. `referer` is set to the page the form
    /// lives on; the upstream rejects bare submissions without one.
    pub async fn post_form(
        &self,
        path: &str,
        credential: &str,
        form: &[(&str, &str)],
        referer: &str,
    ) -> Result<Page, Error> {
        let referer = self.url(referer)?;
        let response = self
            .http
            .post(self.url(path)?)
            .header(COOKIE, credential)
            .header(REFERER, referer.as_str())
            .form(form)
            .send()
            .await
            .map_err(Error::from_upstream)?;
        Self::into_page(response).await
    }

    /// Fetches a public JSON endpoint.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let response = self
            .http
            .get(self.url(path)?)
            .send()
            .await
            .map_err(Error::from_upstream)?
            .error_for_status()?;
        response.json::<T>().await.map_err(Error::from_upstream)
    }

    /// Raw client, for the JSON pass-through.
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn into_page(response: reqwest::Response) -> Result<Page, Error> {
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(Error::from_upstream)?;
        Ok(Page {
            status,
            location,
            body,
        })
    }
}
