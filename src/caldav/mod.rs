pub mod client;
pub mod types;

pub use client::{CalDavClient, to_basic_iso8601};
pub use types::{CALENDAR_PROP_LOCAL_NAMES, KNOWN_COMPONENTS};
