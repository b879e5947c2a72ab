/// Infrastructure failures: disk, network, encoding.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream request timed out")]
    Timeout,
    #[error("encryption failed")]
    Encryption,
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Folds a reqwest failure into [`Error::Timeout`] when it was a timeout.
    pub(crate) fn from_upstream(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e)
        }
    }
}

/// Outcome taxonomy for operations that act on the upstream account.
///
/// Every variant maps to a stable wire code through [`ActionError::code`],
/// which is what the UI switches on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// Upstream rejected the stored credential; the user must supply a new one.
    #[error("upstream credential expired ({detail})")]
    CredentialExpired { detail: String },

    /// No credential has been stored yet.
    #[error("no upstream credential stored")]
    NoCredential,

    /// Upstream accepted the request but reported a domain-level rejection.
    #[error("{0}")]
    ActionFailed(String),

    /// Unclassified failure, typically network or timeout.
    #[error("unknown failure: {0}")]
    Unknown(String),
}

impl ActionError {
    pub fn expired(detail: impl Into<String>) -> Self {
        Self::CredentialExpired {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CredentialExpired { .. } => "cookie_expired",
            Self::NoCredential => "no_cookie",
            Self::ActionFailed(_) => "action_failed",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Human-readable message suitable for the UI.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::CredentialExpired { .. } => "Cookie 已过期，请重新设置".to_string(),
            Self::NoCredential => "尚未设置 Cookie".to_string(),
            Self::ActionFailed(msg) => msg.clone(),
            Self::Unknown(_) => "V2EX 不可达，请稍后重试".to_string(),
        }
    }
}

impl From<Error> for ActionError {
    fn from(e: Error) -> Self {
        Self::Unknown(e.to_string())
    }
}
