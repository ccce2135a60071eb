//! Shared collection/object shapes (§3): a `Collection` base embedded by
//! composition into `Calendar`/`AddressBook` (Rust has no struct
//! inheritance), and a single `DavObject` shape reused for both
//! `CalendarObject` and `VCard` since the spec describes them as the same
//! envelope around an opaque payload.

/// `url`, `etag`, opaque `data` — a calendar object or vCard, depending on
/// which collection it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DavObject {
    pub url: String,
    pub etag: Option<String>,
    pub data: Option<String>,
}

impl DavObject {
    pub fn deleted(url: impl Into<String>) -> Self {
        DavObject {
            url: url.into(),
            etag: None,
            data: None,
        }
    }
}

/// Common fields every collection (calendar or address book) carries.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub url: String,
    pub ctag: Option<String>,
    pub sync_token: Option<String>,
    pub display_name: Option<String>,
    pub resource_type: Vec<String>,
    pub reports: Vec<String>,
}

impl Collection {
    pub fn supports_sync_collection(&self) -> bool {
        self.reports.iter().any(|r| r == "syncCollection")
    }
}

/// A CalDAV calendar collection.
#[derive(Debug, Clone, Default)]
pub struct Calendar {
    pub collection: Collection,
    pub description: Option<String>,
    pub timezone: Option<String>,
    pub calendar_color: Option<String>,
    pub components: Vec<String>,
    pub objects: Vec<DavObject>,
}

/// A CardDAV address book collection.
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    pub collection: Collection,
    pub objects: Vec<DavObject>,
}

/// Shared accessor surface the sync engine (C8) drives generically over
/// both `Calendar` and `AddressBook`.
pub trait SyncableCollection: Clone {
    fn collection(&self) -> &Collection;
    fn objects(&self) -> &[DavObject];
    /// Produce a new value of `Self` with refreshed `ctag`/`syncToken` and
    /// `objects` snapshot. Collections are never mutated in place (§3).
    fn with_sync_result(&self, ctag: Option<String>, sync_token: Option<String>, objects: Vec<DavObject>) -> Self;
}

impl SyncableCollection for Calendar {
    fn collection(&self) -> &Collection {
        &self.collection
    }

    fn objects(&self) -> &[DavObject] {
        &self.objects
    }

    fn with_sync_result(&self, ctag: Option<String>, sync_token: Option<String>, objects: Vec<DavObject>) -> Self {
        let mut next = self.clone();
        next.collection.ctag = ctag;
        next.collection.sync_token = sync_token;
        next.objects = objects;
        next
    }
}

impl SyncableCollection for AddressBook {
    fn collection(&self) -> &Collection {
        &self.collection
    }

    fn objects(&self) -> &[DavObject] {
        &self.objects
    }

    fn with_sync_result(&self, ctag: Option<String>, sync_token: Option<String>, objects: Vec<DavObject>) -> Self {
        let mut next = self.clone();
        next.collection.ctag = ctag;
        next.collection.sync_token = sync_token;
        next.objects = objects;
        next
    }
}
