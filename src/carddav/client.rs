//! CardDAV adapter (C7): typed `fetchAddressBooks`/`fetchVCards` layered
//! over the generic [`WebDavClient`].

use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::carddav::types::ADDRESSBOOK_PROP_LOCAL_NAMES;
use crate::common::url::join_uri;
use crate::discovery::{Account, AccountType, create_account};
use crate::error::{DavError, Result};
use crate::sync::{AddressBook, Collection, DavObject, ObjectSource};
use crate::webdav::client::WebDavClient;
use crate::webdav::types::Depth;
use crate::webdav::xml::{ALL_NAMESPACES, Element, NS_CARDDAV, NS_DAV, encode_document};

/// A CardDAV client bound to an [`Account`]'s discovered home/root URLs.
#[derive(Clone)]
pub struct CardDavClient {
    webdav: WebDavClient,
    account: Account,
}

impl CardDavClient {
    /// `createAccount`: run service discovery, then optionally preload
    /// address books (`loadCollections`) and their vCards (`loadObjects`).
    pub async fn create_account(
        server_url: &str,
        auth: Option<Arc<AuthProvider>>,
        load_collections: bool,
        load_objects: bool,
    ) -> Result<(Self, Vec<AddressBook>)> {
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
    ) -> Result<(Self, Vec<AddressBook>)> {
        let account = create_account(server_url, AccountType::CardDav, auth.clone(), proxy_url.clone()).await?;
        let webdav = WebDavClient::new_with_proxy(&account.root_url, auth, proxy_url)?;
        let client = CardDavClient { webdav, account };

        let mut address_books = Vec::new();
        if load_collections {
            address_books = client.fetch_address_books().await?;
            if load_objects {
                for book in &mut address_books {
                    book.objects = client.fetch_vcards(book, None).await?;
                }
            }
        }
        Ok((client, address_books))
    }

    pub fn webdav(&self) -> &WebDavClient {
        &self.webdav
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// `fetchAddressBooks`: `PROPFIND` the home set depth 1, filter by
    /// `resourcetype`, attach each address book's `supportedReportSet`.
    pub async fn fetch_address_books(&self) -> Result<Vec<AddressBook>> {
        if self.account.home_url.is_empty() {
            return Err(DavError::MissingField(vec!["homeUrl".to_string()]));
        }

        let prop = ADDRESSBOOK_PROP_LOCAL_NAMES
            .iter()
            .fold(Element::new("d:prop"), |el, name| el.child(Element::new(*name)));
        let body = encode_document(Element::new("d:propfind").child(prop), ALL_NAMESPACES);

        let decoded = self.webdav.propfind(&self.account.home_url, Depth::One, &body).await?;

        let mut address_books = Vec::new();
        for response in decoded.responses {
            if !response.resourcetype_has("addressbook") {
                continue;
            }

            let href = response.href.clone().unwrap_or_default();
            let url = join_uri(self.webdav.base(), &href).map_err(DavError::transport)?.to_string();

            address_books.push(AddressBook {
                collection: Collection {
                    url,
                    ctag: response.prop_text("getctag"),
                    sync_token: response.prop_text("syncToken"),
                    display_name: response.prop_text("displayname"),
                    resource_type: vec!["addressbook".to_string()],
                    reports: Vec::new(),
                },
                objects: Vec::new(),
            });
        }

        for book in &mut address_books {
            book.collection.reports = self.webdav.supported_report_set(&book.collection.url).await?;
        }

        Ok(address_books)
    }

    /// `fetchVCards(addressBook, {objectUrls?})`: an `addressbook-multiget`
    /// against explicit hrefs, or an `addressbook-query` matching any
    /// `FN` (§7 default filter).
    pub async fn fetch_vcards(&self, address_book: &AddressBook, object_urls: Option<&[String]>) -> Result<Vec<DavObject>> {
        let urls: Vec<String> = match object_urls {
            Some(urls) => urls.to_vec(),
            None => self.addressbook_query_hrefs(address_book).await?,
        };
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        self.addressbook_multiget(address_book, &urls).await
    }

    async fn addressbook_query_hrefs(&self, address_book: &AddressBook) -> Result<Vec<String>> {
        let filter = Element::new("card:filter").child(
            Element::new("card:prop-filter")
                .attr("name", "FN")
                .child(Element::new("card:text-match").attr("match-type", "contains").text("")),
        );
        let body = encode_document(
            Element::new("card:addressbook-query")
                .child(Element::new("d:prop").child(Element::new("d:getetag")))
                .child(filter),
            &[NS_DAV, NS_CARDDAV],
        );

        let decoded = self.webdav.report(&address_book.collection.url, Depth::One, &body).await?;
        Ok(decoded
            .responses
            .into_iter()
            .filter_map(|r| r.href)
            .filter(|href| href.ends_with(".vcf"))
            .collect())
    }

    async fn addressbook_multiget(&self, address_book: &AddressBook, urls: &[String]) -> Result<Vec<DavObject>> {
        let mut root = Element::new("card:addressbook-multiget").child(
            Element::new("d:prop")
                .child(Element::new("d:getetag"))
                .child(Element::new("card:address-data")),
        );
        for url in urls {
            root = root.child(Element::new("d:href").text(url.clone()));
        }
        let body = encode_document(root, &[NS_DAV, NS_CARDDAV]);

        let decoded = self.webdav.report(&address_book.collection.url, Depth::One, &body).await?;
        Ok(decoded
            .responses
            .into_iter()
            .map(|r| DavObject {
                url: r.href.unwrap_or_default(),
                etag: r.prop_text("getetag"),
                data: r.prop_text("addressData"),
            })
            .collect())
    }

    /// `makeAddressBook(url, {displayName})`: `MKCOL` with the CardDAV
    /// extended-MKCOL body shape.
    pub async fn make_address_book(&self, path: &str, display_name: &str) -> Result<()> {
        let body = encode_document(
            Element::new("d:mkcol").child(
                Element::new("d:set").child(
                    Element::new("d:prop")
                        .child(Element::new("d:resourcetype").child(Element::new("d:collection")).child(Element::new("card:addressbook")))
                        .child(Element::new("d:displayname").text(display_name.to_string())),
                ),
            ),
            &[NS_DAV, NS_CARDDAV],
        );
        let response = self.webdav.mkcol(path, Some(&body)).await?;
        if !response.is_success() {
            return Err(DavError::transport(anyhow::anyhow!(
                "MKCOL failed with status {}",
                response.status
            )));
        }
        Ok(())
    }
}

impl ObjectSource<AddressBook> for CardDavClient {
    async fn fetch_objects(&self, collection: &AddressBook, urls: &[String]) -> Result<Vec<DavObject>> {
        let object_urls = (!urls.is_empty()).then_some(urls);
        self.fetch_vcards(collection, object_urls).await
    }
}
