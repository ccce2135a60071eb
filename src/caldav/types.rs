//! CalDAV-specific constants layered on the shared [`crate::sync::types`]
//! collection/object shapes.

/// The component tags a calendar must intersect to be considered
/// "iCal-format" (§3 invariant); non-matching calendars are filtered out of
/// `fetchCalendars`.
pub const KNOWN_COMPONENTS: &[&str] = &["VEVENT", "VTODO", "VJOURNAL", "VFREEBUSY", "VTIMEZONE", "VALARM"];

/// Default `PROPFIND` property set for `fetchCalendars` (§6).
pub const CALENDAR_PROP_LOCAL_NAMES: &[&str] = &[
    "c:calendar-description",
    "c:calendar-timezone",
    "d:displayname",
    "ca:calendar-color",
    "cs:getctag",
    "d:resourcetype",
    "c:supported-calendar-component-set",
    "d:sync-token",
];
