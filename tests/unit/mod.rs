//! Pure-logic integration tests: XML codec round trips, URL identity
//! rules, and the public helpers that don't require a live DAV server.
//! Network-dependent behavior is covered by `tests/e2e`.

use dav_rs::common::url::{join_uri, url_contains};
use dav_rs::sync::{AddressBook, Calendar, Collection, DavObject, SyncableCollection};
use dav_rs::webdav::{Element, NS_CALDAV, NS_DAV, decode_multistatus, encode_document};

#[test]
fn calendar_query_body_round_trips_through_the_codec() {
    let body = encode_document(
        Element::new("c:calendar-query")
            .child(Element::new("d:prop").child(Element::new("d:getetag")))
            .child(
                Element::new("c:filter").child(
                    Element::new("c:comp-filter")
                        .attr("name", "VCALENDAR")
                        .child(Element::new("c:comp-filter").attr("name", "VEVENT")),
                ),
            ),
        &[NS_DAV, NS_CALDAV],
    );

    assert!(body.contains(r#"xmlns:d="DAV:""#));
    assert!(body.contains(r#"xmlns:c="urn:ietf:params:xml:ns:caldav""#));
    assert!(body.contains(r#"<c:comp-filter name="VCALENDAR">"#));
}

#[test]
fn decode_multistatus_extracts_sync_token_and_deleted_entries() {
    let xml = br#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
  <d:sync-token>https://example.com/sync/2</d:sync-token>
  <d:response>
    <d:href>/cal/personal/1.ics</d:href>
    <d:status>HTTP/1.1 404 Not Found</d:status>
  </d:response>
  <d:response>
    <d:href>/cal/personal/2.ics</d:href>
    <d:propstat>
      <d:prop><d:getetag>"etag-2"</d:getetag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    let decoded = decode_multistatus(xml, 207).unwrap();
    assert_eq!(decoded.sync_token.as_deref(), Some("https://example.com/sync/2"));
    assert_eq!(decoded.responses.len(), 2);
    assert_eq!(decoded.responses[0].status, 404);
    assert_eq!(decoded.responses[1].prop_text("getetag").as_deref(), Some("\"etag-2\""));
}

#[test]
fn join_uri_and_url_contains_agree_on_collection_membership() {
    let home: hyper::Uri = "https://dav.example.com/dav/user01/".parse().unwrap();
    let calendar = join_uri(&home, "personal/").unwrap();
    assert_eq!(calendar.to_string(), "https://dav.example.com/dav/user01/personal/");
    assert!(url_contains(&home.to_string(), &calendar.to_string()));
}

#[test]
fn calendar_with_sync_result_replaces_ctag_token_and_objects_without_mutating_the_original() {
    let original = Calendar {
        collection: Collection {
            url: "/cal/personal/".to_string(),
            ctag: Some("ctag-1".to_string()),
            sync_token: None,
            display_name: Some("Personal".to_string()),
            resource_type: vec!["calendar".to_string()],
            reports: vec!["syncCollection".to_string()],
        },
        description: None,
        timezone: None,
        calendar_color: None,
        components: vec!["VEVENT".to_string()],
        objects: vec![DavObject {
            url: "/cal/personal/1.ics".to_string(),
            etag: Some("a".to_string()),
            data: Some("DATA".to_string()),
        }],
    };

    assert!(original.collection().supports_sync_collection());

    let updated = original.with_sync_result(
        Some("ctag-2".to_string()),
        Some("token-1".to_string()),
        vec![DavObject {
            url: "/cal/personal/2.ics".to_string(),
            etag: Some("b".to_string()),
            data: Some("DATA2".to_string()),
        }],
    );

    assert_eq!(original.collection.ctag.as_deref(), Some("ctag-1"));
    assert_eq!(updated.collection.ctag.as_deref(), Some("ctag-2"));
    assert_eq!(updated.collection.sync_token.as_deref(), Some("token-1"));
    assert_eq!(updated.objects.len(), 1);
    assert_eq!(updated.objects[0].url, "/cal/personal/2.ics");
}

#[test]
fn address_book_without_sync_collection_report_falls_back_to_basic_strategy() {
    let book = AddressBook {
        collection: Collection {
            url: "/card/personal/".to_string(),
            ctag: Some("ctag-1".to_string()),
            sync_token: None,
            display_name: None,
            resource_type: vec!["addressbook".to_string()],
            reports: Vec::new(),
        },
        objects: Vec::new(),
    };
    assert!(!book.collection().supports_sync_collection());
}
