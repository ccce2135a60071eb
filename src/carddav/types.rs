//! CardDAV-specific constants layered on the shared [`crate::sync::types`]
//! collection/object shapes.

/// Default `PROPFIND` property set for `fetchAddressBooks` (§7).
pub const ADDRESSBOOK_PROP_LOCAL_NAMES: &[&str] = &[
    "d:displayname",
    "card:addressbook-description",
    "ca:addressbook-color",
    "cs:getctag",
    "d:resourcetype",
    "d:sync-token",
];
