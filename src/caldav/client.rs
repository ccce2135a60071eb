//! CalDAV adapter (C7): typed `fetchCalendars`/`fetchCalendarObjects`,
//! `freeBusyQuery`, and calendar creation, layered over the generic
//! [`WebDavClient`].

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use hyper::{Method, header};

use crate::auth::AuthProvider;
use crate::caldav::types::{CALENDAR_PROP_LOCAL_NAMES, KNOWN_COMPONENTS};
use crate::common::url::join_uri;
use crate::discovery::{Account, AccountType, create_account};
use crate::error::{DavError, Result};
use crate::sync::{Calendar, Collection, DavObject, ObjectSource};
use crate::webdav::client::WebDavClient;
use crate::webdav::types::{Depth, HeaderBuilder};
use crate::webdav::xml::{ALL_NAMESPACES, Element, NS_CALDAV, NS_DAV, PropValue, encode_document};

/// A CalDAV client bound to an [`Account`]'s discovered home/root URLs.
#[derive(Clone)]
pub struct CalDavClient {
    webdav: WebDavClient,
    account: Account,
}

impl CalDavClient {
    /// `createAccount`: run service discovery, then optionally preload
    /// calendars (`loadCollections`) and their objects (`loadObjects`).
    pub async fn create_account(
        server_url: &str,
        auth: Option<Arc<AuthProvider>>,
        load_collections: bool,
        load_objects: bool,
    ) -> Result<(Self, Vec<Calendar>)> {
        Self::create_account_with_proxy(server_url, auth, load_collections, load_objects, None).await
    }

    /// As [`Self::create_account`], but prefixing every outbound request URL
    /// (including the `.well-known` probe) with `proxy_url`.
    pub async fn create_account_with_proxy(
        server_url: &str,
        auth: Option<Arc<AuthProvider>>,
        load_collections: bool,
        load_objects: bool,
        proxy_url: Option<String>,
    ) -> Result<(Self, Vec<Calendar>)> {
        let account = create_account(server_url, AccountType::CalDav, auth.clone(), proxy_url.clone()).await?;
        let webdav = WebDavClient::new_with_proxy(&account.root_url, auth, proxy_url)?;
        let client = CalDavClient { webdav, account };

        let mut calendars = Vec::new();
        if load_collections {
            calendars = client.fetch_calendars().await?;
            if load_objects {
                for calendar in &mut calendars {
                    calendar.objects = client.fetch_calendar_objects(calendar, None, None, false).await?;
                }
            }
        }
        Ok((client, calendars))
    }

    pub fn webdav(&self) -> &WebDavClient {
        &self.webdav
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// `fetchCalendars`: `PROPFIND` the home set depth 1, filter by
    /// `resourcetype` and known iCalendar components, attach each
    /// calendar's `supportedReportSet`.
    pub async fn fetch_calendars(&self) -> Result<Vec<Calendar>> {
        if self.account.home_url.is_empty() {
            return Err(DavError::MissingField(vec!["homeUrl".to_string()]));
        }

        let prop = CALENDAR_PROP_LOCAL_NAMES
            .iter()
            .fold(Element::new("d:prop"), |el, name| el.child(Element::new(*name)));
        let body = encode_document(Element::new("d:propfind").child(prop), ALL_NAMESPACES);

        let decoded = self.webdav.propfind(&self.account.home_url, Depth::One, &body).await?;

        let mut calendars = Vec::new();
        for response in decoded.responses {
            if !response.resourcetype_has("calendar") {
                continue;
            }
            let components = supported_components(&response.props);
            if !components.iter().any(|c| KNOWN_COMPONENTS.contains(&c.as_str())) {
                continue;
            }

            let href = response.href.clone().unwrap_or_default();
            let url = join_uri(self.webdav.base(), &href).map_err(DavError::transport)?.to_string();

            calendars.push(Calendar {
                collection: Collection {
                    url,
                    ctag: response.prop_text("getctag"),
                    sync_token: response.prop_text("syncToken"),
                    display_name: response.prop_text("displayname"),
                    resource_type: vec!["calendar".to_string()],
                    reports: Vec::new(),
                },
                description: response.prop_text("calendarDescription"),
                timezone: response.prop_text("calendarTimezone"),
                calendar_color: response.prop_text("calendarColor"),
                components,
                objects: Vec::new(),
            });
        }

        for calendar in &mut calendars {
            calendar.collection.reports = self.webdav.supported_report_set(&calendar.collection.url).await?;
        }

        Ok(calendars)
    }

    /// `fetchCalendarObjects(calendar, {objectUrls?, timeRange?, expand?})`: a
    /// `calendar-multiget` against explicit hrefs, or a `calendar-query`
    /// filtered by component and optional time range. `expand` requests
    /// server-side recurrence expansion (`CALDAV:expand`, RFC 4791 §9.6.5)
    /// and only has effect when `time_range` is also given.
    pub async fn fetch_calendar_objects(
        &self,
        calendar: &Calendar,
        object_urls: Option<&[String]>,
        time_range: Option<(&str, &str)>,
        expand: bool,
    ) -> Result<Vec<DavObject>> {
        let urls: Vec<String> = match object_urls {
            Some(urls) => urls.to_vec(),
            None => self.calendar_query_hrefs(calendar, time_range).await?,
        };
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        let expand_range = if expand { time_range } else { None };
        self.calendar_multiget(calendar, &urls, expand_range).await
    }

    async fn calendar_query_hrefs(&self, calendar: &Calendar, time_range: Option<(&str, &str)>) -> Result<Vec<String>> {
        let mut comp_filter = Element::new("c:comp-filter").attr("name", "VEVENT");
        if let Some((start, end)) = time_range {
            let (start, end) = (to_basic_iso8601(start)?, to_basic_iso8601(end)?);
            comp_filter = comp_filter.child(Element::new("c:time-range").attr("start", start).attr("end", end));
        }
        let filter = Element::new("c:filter")
            .child(Element::new("c:comp-filter").attr("name", "VCALENDAR").child(comp_filter));
        let body = encode_document(
            Element::new("c:calendar-query")
                .child(Element::new("d:prop").child(Element::new("d:getetag")))
                .child(filter),
            &[NS_DAV, NS_CALDAV],
        );

        let decoded = self.webdav.report(&calendar.collection.url, Depth::One, &body).await?;
        Ok(decoded
            .responses
            .into_iter()
            .filter_map(|r| r.href)
            .filter(|href| href.ends_with(".ics"))
            .collect())
    }

    async fn calendar_multiget(
        &self,
        calendar: &Calendar,
        urls: &[String],
        expand_range: Option<(&str, &str)>,
    ) -> Result<Vec<DavObject>> {
        let mut calendar_data = Element::new("c:calendar-data");
        if let Some((start, end)) = expand_range {
            let (start, end) = (to_basic_iso8601(start)?, to_basic_iso8601(end)?);
            calendar_data = calendar_data.child(Element::new("c:expand").attr("start", start).attr("end", end));
        }
        let mut root = Element::new("c:calendar-multiget").child(
            Element::new("d:prop").child(Element::new("d:getetag")).child(calendar_data),
        );
        for url in urls {
            root = root.child(Element::new("d:href").text(url.clone()));
        }
        let body = encode_document(root, &[NS_DAV, NS_CALDAV]);

        let decoded = self.webdav.report(&calendar.collection.url, Depth::One, &body).await?;
        Ok(decoded
            .responses
            .into_iter()
            .map(|r| DavObject {
                url: r.href.unwrap_or_default(),
                etag: r.prop_text("getetag"),
                data: r.prop_text("calendarData"),
            })
            .collect())
    }

    /// `freeBusyQuery(calendarUrl, timeRange)`: the response to a
    /// `free-busy-query` REPORT is a raw `text/calendar` VFREEBUSY body
    /// (RFC 4791 §7.10), not a `multistatus` document, so this bypasses the
    /// generic `report()`/`decode_multistatus` path and returns the body
    /// itself as "the first response" (§4.7).
    pub async fn free_busy_query(&self, collection_url: &str, time_range: (&str, &str)) -> Result<Option<String>> {
        let (start, end) = (to_basic_iso8601(time_range.0)?, to_basic_iso8601(time_range.1)?);
        let body = encode_document(
            Element::new("c:free-busy-query").child(Element::new("c:time-range").attr("start", start).attr("end", end)),
            &[NS_DAV, NS_CALDAV],
        );
        let headers = HeaderBuilder::new().set(header::HeaderName::from_static("depth"), Depth::Zero.as_str()).build();
        let response = self
            .webdav
            .send(
                Method::from_bytes(b"REPORT").expect("REPORT is a valid method token"),
                collection_url,
                headers,
                Some(Bytes::from(body)),
                None,
            )
            .await?;
        if response.body.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&response.body).into_owned()))
    }

    /// `makeCalendar(url, {displayName, description?})`: `MKCALENDAR` with
    /// the CalDAV extended-MKCOL body shape.
    pub async fn make_calendar(&self, path: &str, display_name: &str, description: Option<&str>) -> Result<()> {
        let mut prop = Element::new("d:prop").child(Element::new("d:displayname").text(display_name.to_string()));
        if let Some(description) = description {
            prop = prop.child(Element::new("c:calendar-description").text(description.to_string()));
        }
        let body = encode_document(
            Element::new("c:mkcalendar").child(Element::new("d:set").child(prop)),
            &[NS_DAV, NS_CALDAV],
        );
        let response = self
            .webdav
            .mkcol_with_method(
                Method::from_bytes(b"MKCALENDAR").expect("MKCALENDAR is a valid method token"),
                path,
                Some(&body),
            )
            .await?;
        if !response.is_success() {
            return Err(DavError::transport(anyhow::anyhow!(
                "MKCALENDAR failed with status {}",
                response.status
            )));
        }
        Ok(())
    }
}

impl ObjectSource<Calendar> for CalDavClient {
    async fn fetch_objects(&self, collection: &Calendar, urls: &[String]) -> Result<Vec<DavObject>> {
        let object_urls = (!urls.is_empty()).then_some(urls);
        self.fetch_calendar_objects(collection, object_urls, None, false).await
    }
}

fn supported_components(props: &HashMap<String, PropValue>) -> Vec<String> {
    props
        .get("supportedCalendarComponentSet")
        .and_then(PropValue::as_nested)
        .map(|nested| {
            nested
                .find_all("comp")
                .filter_map(|el| el.attrs.iter().find(|(k, _)| k == "name").map(|(_, v)| v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Basic ISO-8601 compressed format (§6): `YYYYMMDDTHHMMSSZ`. Accepts
/// full RFC 3339 timestamps, a bare `YYYY-MM-DDTHH:MM:SS` local timestamp,
/// or a date-only `YYYY-MM-DD`; anything else is `InvalidTimeRange`.
pub fn to_basic_iso8601(input: &str) -> Result<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(format_basic(dt.with_timezone(&Utc)));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(format_basic(dt.and_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(format_basic(date.and_hms_opt(0, 0, 0).unwrap().and_utc()));
    }
    Err(DavError::InvalidTimeRange)
}

fn format_basic(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_basic_iso8601_accepts_rfc3339() {
        assert_eq!(to_basic_iso8601("2024-01-15T10:30:00Z").unwrap(), "20240115T103000Z");
    }

    #[test]
    fn to_basic_iso8601_accepts_date_only() {
        assert_eq!(to_basic_iso8601("2024-01-15").unwrap(), "20240115T000000Z");
    }

    #[test]
    fn to_basic_iso8601_rejects_garbage() {
        assert!(matches!(to_basic_iso8601("not-a-date"), Err(DavError::InvalidTimeRange)));
    }

    #[test]
    fn calendar_data_nests_expand_only_when_a_range_is_given() {
        let plain = Element::new("c:calendar-data");
        assert!(encode_document(plain, &[NS_DAV, NS_CALDAV]).find("c:expand").is_none());

        let expanded = Element::new("c:calendar-data").child(
            Element::new("c:expand").attr("start", "20240101T000000Z").attr("end", "20240102T000000Z"),
        );
        let body = encode_document(expanded, &[NS_DAV, NS_CALDAV]);
        assert!(body.contains(r#"<c:expand start="20240101T000000Z" end="20240102T000000Z""#));
    }
}
