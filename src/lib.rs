#![doc = include_str!("../README.md")]

pub mod actions;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod extract;
pub mod login;
pub mod once;
pub mod secret;
pub mod session;
pub mod types;
pub mod upstream;

#[cfg(feature = "gateway")]
pub mod gateway;

// Re-exports for convenient access
pub use actions::{ActionOutcome, Syntax, WriteAction};
pub use credential::{CredentialStore, StoredCredential};
pub use error::{ActionError, Error};
pub use extract::ExtractContext;
pub use secret::{Secret, SecretSource};
pub use session::{IssuedSession, SessionAuthority};
pub use types::{
    Member, Node, NodeName, Notification, NotificationId, PageResult, Reply, ReplyId, Topic,
    TopicId,
};
pub use upstream::{Page, UpstreamClient, UpstreamConfig};
