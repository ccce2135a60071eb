//! End-to-end tests against a local SabreDAV instance
//! (`docker run -p 8080:80 ... sabredav`), mirroring the layout the teacher
//! crate used for its own e2e suite.

mod util;

use dav_rs::auth::AuthProvider;
use dav_rs::caldav::CalDavClient;
use dav_rs::carddav::CardDavClient;

const SERVER_URL: &str = "http://localhost:8080/";
const TEST_USER: &str = "test";
const TEST_PASS: &str = "test";

#[tokio::test]
async fn discovers_calendar_home_and_lists_calendars() {
    let auth = AuthProvider::basic(TEST_USER, TEST_PASS).expect("auth provider");
    let (client, calendars) = CalDavClient::create_account(SERVER_URL, Some(auth), true, false)
        .await
        .expect("account discovery should succeed against a local SabreDAV");

    assert!(!client.account().home_url.is_empty());
    println!("discovered {} calendars", calendars.len());
}

#[tokio::test]
async fn creates_a_calendar_then_writes_and_queries_an_event() {
    let auth = AuthProvider::basic(TEST_USER, TEST_PASS).expect("auth provider");
    let (client, _) = CalDavClient::create_account(SERVER_URL, Some(auth), false, false)
        .await
        .expect("account discovery");

    let name = util::unique_calendar_name("it");
    let path = format!("{}{}/", client.account().home_url, name);
    client
        .make_calendar(&path, &name, Some("created by e2e tests"))
        .await
        .expect("MKCALENDAR should succeed");

    let calendars = client.fetch_calendars().await.expect("fetchCalendars");
    let created = calendars
        .iter()
        .find(|c| c.collection.url.contains(&name))
        .expect("the newly created calendar should be listed");

    let uid = util::unique_uid("evt");
    let ics = format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//dav-rs//EN\r\nBEGIN:VEVENT\r\nUID:{uid}\r\nDTSTAMP:20240101T000000Z\r\nDTSTART:20240101T100000Z\r\nDTEND:20240101T110000Z\r\nSUMMARY:e2e test event\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n"
    );
    let object_path = format!("{}{uid}.ics", created.collection.url);
    client
        .webdav()
        .put(&object_path, "text/calendar; charset=utf-8", bytes::Bytes::from(ics), None, Some("*"))
        .await
        .expect("PUT should succeed");

    let objects = client
        .fetch_calendar_objects(created, None, Some(("2024-01-01", "2024-01-02")), false)
        .await
        .expect("fetchCalendarObjects");
    assert!(objects.iter().any(|o| o.url.contains(&uid)));
}

#[tokio::test]
async fn discovers_addressbook_home_and_lists_addressbooks() {
    let auth = AuthProvider::basic(TEST_USER, TEST_PASS).expect("auth provider");
    let (client, address_books) = CardDavClient::create_account(SERVER_URL, Some(auth), true, false)
        .await
        .expect("account discovery should succeed against a local SabreDAV");

    assert!(!client.account().home_url.is_empty());
    println!("discovered {} address books", address_books.len());
}
