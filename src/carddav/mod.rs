pub mod client;
pub mod types;

pub use client::CardDavClient;
pub use types::ADDRESSBOOK_PROP_LOCAL_NAMES;
