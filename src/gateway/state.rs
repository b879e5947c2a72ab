use std::sync::Arc;

use time::UtcOffset;

use super::config::{BrokerConfig, GatewaySettings};
use super::rate_limit::RateLimiter;
use crate::credential::CredentialStore;
use crate::error::Error;
use crate::extract::ExtractContext;
use crate::secret::Secret;
use crate::session::SessionAuthority;
use crate::upstream::UpstreamClient;

/// Shared state for every route handler. Constructed once at startup.
#[derive(Clone)]
pub struct AppState {
    pub(crate) upstream: Arc<UpstreamClient>,
    pub(crate) store: Arc<CredentialStore>,
    pub(crate) sessions: Arc<SessionAuthority>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) settings: GatewaySettings,
    pub(crate) utc_offset: UtcOffset,
}

impl AppState {
    /// Loads the process secret and wires the components together.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the data directory or secret file cannot be
    /// used, or [`Error::Http`] if the upstream client cannot be built.
    pub fn new(config: BrokerConfig) -> Result<Self, Error> {
        let secret = Arc::new(Secret::load(
            &config.data_dir,
            config.secret_passphrase.as_deref(),
        )?);
        tracing::info!(
            source = ?secret.source(),
            data_dir = %config.data_dir.display(),
            "Process secret ready"
        );

        let store = Arc::new(CredentialStore::new(&config.data_dir, secret.clone()));
        let sessions = Arc::new(SessionAuthority::new(secret, store.clone()));
        let upstream = Arc::new(UpstreamClient::new(config.upstream)?);

        Ok(Self {
            upstream,
            store,
            sessions,
            limiter: Arc::new(RateLimiter::default()),
            settings: config.settings,
            utc_offset: config.utc_offset,
        })
    }

    /// Extraction parameters for a request arriving now.
    pub(crate) fn extract_context(&self) -> ExtractContext {
        ExtractContext::new(self.upstream.config().base_url().clone(), self.utc_offset)
    }
}
