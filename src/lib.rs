//! Async CalDAV (RFC 4791) / CardDAV (RFC 6352) client library, layered on
//! a generic WebDAV (RFC 4918) transport built with hyper 1.x and rustls.
//!
//! # Layout
//!
//! - [`webdav`] — generic WebDAV client, XML codec, and the [`webdav::DavTransport`]
//!   boundary to the HTTP stack.
//! - [`discovery`] — `.well-known` service discovery and principal/home-set
//!   bootstrap (RFC 5397, RFC 6764).
//! - [`auth`] — Basic and OAuth 2.0 credential providers.
//! - [`sync`] — collection diffing: WebDAV-Sync (RFC 6578) when supported,
//!   falling back to a `getctag`-based full refetch.
//! - [`caldav`] / [`carddav`] — typed calendar and address book operations.
//!
//! # Example
//!
//! ```no_run
//! use dav_rs::auth::AuthProvider;
//! use dav_rs::caldav::CalDavClient;
//!
//! #[tokio::main]
//! async fn main() -> dav_rs::error::Result<()> {
//!     let auth = AuthProvider::basic("user01", "secret")?;
//!     let (client, calendars) =
//!         CalDavClient::create_account("https://caldav.example.com/", Some(auth), true, false).await?;
//!
//!     for calendar in &calendars {
//!         println!(
//!             "{}: {} objects",
//!             calendar.collection.display_name.as_deref().unwrap_or("unnamed"),
//!             calendar.objects.len()
//!         );
//!     }
//!
//!     if let Some(calendar) = calendars.first() {
//!         let events = client.fetch_calendar_objects(calendar, None, None).await?;
//!         println!("fetched {} events", events.len());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Incremental sync
//!
//! ```no_run
//! use dav_rs::auth::AuthProvider;
//! use dav_rs::caldav::CalDavClient;
//! use dav_rs::sync::sync_calendars;
//!
//! # async fn run() -> dav_rs::error::Result<()> {
//! let auth = AuthProvider::basic("user01", "secret")?;
//! let (client, calendars) =
//!     CalDavClient::create_account("https://caldav.example.com/", Some(auth), true, true).await?;
//!
//! // ... time passes, the caller persists `calendars` somewhere ...
//! let fresh = client.fetch_calendars().await?;
//! let synced = sync_calendars(client.webdav(), &calendars, fresh, &client, false, None).await?;
//! println!("synced {} calendars", synced.len());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod caldav;
pub mod carddav;
pub mod common;
pub mod discovery;
pub mod error;
pub mod sync;
pub mod webdav;

pub use error::{DavError, Result};
