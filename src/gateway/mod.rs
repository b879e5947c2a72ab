//! HTTP surface of the broker, built on Axum.
//!
//! Three route families share one [`AppState`]:
//!
//! - `/auth/*`: exchange a V2EX cookie for a broker session, inspect it,
//!   revoke it.
//! - `/web/*`: node listings, replies and notifications scraped to JSON,
//!   plus replies, new topics and thanks replayed as form posts.
//! - `/api/*`: verbatim pass-through of the public JSON API.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use v2fun_broker::gateway::{AppState, BrokerConfig, build_router};
//!
//! let config = BrokerConfig::from_env()?;
//! let port = config.port();
//! let app = build_router(AppState::new(config)?);
//!
//! let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
//! axum::serve(
//!     listener,
//!     app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//! )
//! .await?;
//! ```

mod config;
mod cookies;
mod cors;
mod error;
mod extractor;
mod proxy;
mod rate_limit;
mod routes;
mod state;
mod web;

pub use config::BrokerConfig;
pub use error::GatewayError;
pub use extractor::{ClientIp, Session, resolve_session};
pub use routes::build_router;
pub use state::AppState;
