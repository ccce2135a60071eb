//! Typed error kinds surfaced to callers of the DAV client.
//!
//! The teacher crate propagates everything through `anyhow::Error`; here the
//! public boundary uses a closed enum so callers can match on the specific
//! failure instead of inspecting a message string. `anyhow` is still used
//! internally (URI parsing, header construction) and folded into
//! [`DavError::Transport`]/[`DavError::Xml`] at the boundary.

use thiserror::Error;

/// Errors returned by the public API of this crate.
#[derive(Debug, Error)]
pub enum DavError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("home url not found")]
    HomeUrlNotFound,

    #[error("collection not found")]
    CollectionNotFound,

    #[error("missing required field(s): {0:?}")]
    MissingField(Vec<String>),

    #[error("invalid time range")]
    InvalidTimeRange,

    #[error("oauth config missing field(s): {0:?}")]
    OAuthConfigMissing(Vec<String>),

    #[error("oauth token endpoint returned a non-success status: {0}")]
    OAuthFetchFailed(u16),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DavError>;

impl DavError {
    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        DavError::Transport(err.into())
    }
}
