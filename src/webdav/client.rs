//! Generic WebDAV client (C4-C5): method helpers over [`DavTransport`],
//! fanned-out batches using the teacher's bounded-concurrency
//! `Semaphore` + `FuturesOrdered` pattern, and the two collection-dirty
//! checks (`supportedReportSet`, `isCollectionDirty`) shared by the
//! CalDAV/CardDAV adapters.

use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, stream::FuturesOrdered};
use hyper::{HeaderMap, Method, Uri, header};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Duration;

use crate::auth::AuthProvider;
use crate::common::url::{join_uri, url_contains};
use crate::error::{DavError, Result};
use crate::webdav::transport::{DavRequest, DavTransport, HyperTransport, RawResponse};
use crate::webdav::types::{BatchItem, Depth, HeaderBuilder};
use crate::webdav::xml::{MultistatusResult, decode_multistatus};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// A WebDAV client bound to a base URL (a collection, a home set, or a
/// server root) and a transport. Generic over [`DavTransport`] so tests can
/// substitute a fake; [`HyperTransport`] is the default.
#[derive(Clone)]
pub struct WebDavClient<T: DavTransport = HyperTransport> {
    base: Uri,
    transport: T,
    auth: Option<Arc<AuthProvider>>,
    default_timeout: Duration,
    /// Literal string prefix applied to every outbound absolute URL (`proxyUrl
    /// + url`, per `§4.2`/`§6`), not a connector-level HTTP proxy.
    proxy_url: Option<String>,
}

impl WebDavClient<HyperTransport> {
    pub fn new(base_url: &str, auth: Option<Arc<AuthProvider>>) -> Result<Self> {
        Self::new_with_proxy(base_url, auth, None)
    }

    pub fn new_with_proxy(base_url: &str, auth: Option<Arc<AuthProvider>>, proxy_url: Option<String>) -> Result<Self> {
        Ok(Self {
            base: base_url.parse().map_err(DavError::transport)?,
            transport: HyperTransport::new()?,
            auth,
            default_timeout: DEFAULT_TIMEOUT,
            proxy_url,
        })
    }
}

impl<T: DavTransport> WebDavClient<T> {
    pub fn with_transport(base_url: &str, transport: T, auth: Option<Arc<AuthProvider>>) -> Result<Self> {
        Self::with_transport_and_proxy(base_url, transport, auth, None)
    }

    pub fn with_transport_and_proxy(
        base_url: &str,
        transport: T,
        auth: Option<Arc<AuthProvider>>,
        proxy_url: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            base: base_url.parse().map_err(DavError::transport)?,
            transport,
            auth,
            default_timeout: DEFAULT_TIMEOUT,
            proxy_url,
        })
    }

    pub fn base(&self) -> &Uri {
        &self.base
    }

    pub fn with_base(&self, base_url: &str) -> Result<Self> {
        Ok(Self {
            base: base_url.parse().map_err(DavError::transport)?,
            transport: self.transport.clone(),
            auth: self.auth.clone(),
            default_timeout: self.default_timeout,
            proxy_url: self.proxy_url.clone(),
        })
    }

    /// Builds the request `Uri`, then applies the `proxyUrl` string prefix
    /// (`§4.2`/`§6`): the proxy is expected to forward to the real URL
    /// embedded in the suffix, so this is concatenation, not rewriting.
    fn build_uri(&self, path: &str) -> Result<Uri> {
        let uri = join_uri(&self.base, path).map_err(DavError::transport)?;
        match &self.proxy_url {
            Some(prefix) => format!("{prefix}{uri}").parse().map_err(DavError::transport),
            None => Ok(uri),
        }
    }

    async fn auth_header(&self) -> Result<Option<header::HeaderValue>> {
        match &self.auth {
            Some(provider) => Ok(Some(provider.header_value().await?)),
            None => Ok(None),
        }
    }

    /// Generic aggregated send. Every WebDAV/CalDAV/CardDAV verb funnels
    /// through this one entry point.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        mut headers: HeaderMap,
        body: Option<Bytes>,
        per_request_timeout: Option<Duration>,
    ) -> Result<RawResponse> {
        let uri = self.build_uri(path)?;

        if body.is_some() && !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("text/xml;charset=UTF-8"),
            );
        }
        if let Some(auth) = self.auth_header().await? {
            headers.insert(header::AUTHORIZATION, auth);
        }

        let request = DavRequest {
            method,
            uri,
            headers,
            body,
        };

        self.transport
            .execute(request, per_request_timeout.unwrap_or(self.default_timeout))
            .await
    }

    /// `PROPFIND` with a raw XML body and `Depth` header, decoded into a
    /// [`MultistatusResult`].
    pub async fn propfind(&self, path: &str, depth: Depth, xml_body: &str) -> Result<MultistatusResult> {
        let headers = HeaderBuilder::new().set(header::HeaderName::from_static("depth"), depth.as_str()).build();
        let response = self
            .send(
                Method::from_bytes(b"PROPFIND").expect("PROPFIND is a valid method token"),
                path,
                headers,
                Some(Bytes::from(xml_body.to_owned())),
                None,
            )
            .await?;
        decode_multistatus(&response.body, response.status.as_u16())
    }

    /// `REPORT` with a raw XML body and `Depth` header, decoded into a
    /// [`MultistatusResult`].
    pub async fn report(&self, path: &str, depth: Depth, xml_body: &str) -> Result<MultistatusResult> {
        let headers = HeaderBuilder::new().set(header::HeaderName::from_static("depth"), depth.as_str()).build();
        let response = self
            .send(
                Method::from_bytes(b"REPORT").expect("REPORT is a valid method token"),
                path,
                headers,
                Some(Bytes::from(xml_body.to_owned())),
                None,
            )
            .await?;
        decode_multistatus(&response.body, response.status.as_u16())
    }

    /// `MKCOL`, optionally with an extended-MKCOL body (`MKCALENDAR` reuses
    /// this with its own method token via [`Self::mkcol_with_method`]).
    pub async fn mkcol(&self, path: &str, xml_body: Option<&str>) -> Result<RawResponse> {
        self.mkcol_with_method(Method::from_bytes(b"MKCOL").expect("MKCOL is a valid method token"), path, xml_body)
            .await
    }

    pub async fn mkcol_with_method(
        &self,
        method: Method,
        path: &str,
        xml_body: Option<&str>,
    ) -> Result<RawResponse> {
        let body = xml_body.map(|s| Bytes::from(s.to_owned()));
        self.send(method, path, HeaderMap::new(), body, None).await
    }

    /// `PUT`, guarded by `If-Match`/`If-None-Match` when supplied.
    pub async fn put(
        &self,
        path: &str,
        content_type: &str,
        body: Bytes,
        if_match: Option<&str>,
        if_none_match: Option<&str>,
    ) -> Result<RawResponse> {
        let mut headers = HeaderBuilder::new()
            .set_opt(header::IF_MATCH, if_match)
            .set_opt(header::IF_NONE_MATCH, if_none_match)
            .build();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_str(content_type).map_err(DavError::transport)?,
        );
        self.send(Method::PUT, path, headers, Some(body), None).await
    }

    /// `DELETE`, optionally guarded by `If-Match`.
    pub async fn delete(&self, path: &str, if_match: Option<&str>) -> Result<RawResponse> {
        let headers = HeaderBuilder::new().set_opt(header::IF_MATCH, if_match).build();
        self.send(Method::DELETE, path, headers, None, None).await
    }

    pub async fn copy(&self, src_path: &str, dest_absolute_url: &str, overwrite: bool) -> Result<RawResponse> {
        self.copy_or_move(Method::from_bytes(b"COPY").expect("COPY is a valid method token"), src_path, dest_absolute_url, overwrite)
            .await
    }

    pub async fn r#move(&self, src_path: &str, dest_absolute_url: &str, overwrite: bool) -> Result<RawResponse> {
        self.copy_or_move(Method::from_bytes(b"MOVE").expect("MOVE is a valid method token"), src_path, dest_absolute_url, overwrite)
            .await
    }

    async fn copy_or_move(
        &self,
        method: Method,
        src_path: &str,
        dest_absolute_url: &str,
        overwrite: bool,
    ) -> Result<RawResponse> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Destination",
            header::HeaderValue::from_str(dest_absolute_url).map_err(DavError::transport)?,
        );
        headers.insert(
            "Overwrite",
            header::HeaderValue::from_static(if overwrite { "T" } else { "F" }),
        );
        self.send(method, src_path, headers, None, None).await
    }

    /// Run many `PROPFIND`s concurrently, bounded by a semaphore, returning
    /// results in input order.
    pub async fn propfind_many(
        &self,
        paths: impl IntoIterator<Item = String>,
        depth: Depth,
        xml_body: Arc<str>,
        max_concurrency: Option<usize>,
    ) -> Vec<BatchItem<MultistatusResult>> {
        self.batch(paths, max_concurrency, move |this, path| {
            let xml_body = xml_body.clone();
            async move { this.propfind(&path, depth, &xml_body).await }
        })
        .await
    }

    /// Run many `REPORT`s concurrently, bounded by a semaphore, returning
    /// results in input order.
    pub async fn report_many(
        &self,
        paths: impl IntoIterator<Item = String>,
        depth: Depth,
        xml_body: Arc<str>,
        max_concurrency: Option<usize>,
    ) -> Vec<BatchItem<MultistatusResult>> {
        self.batch(paths, max_concurrency, move |this, path| {
            let xml_body = xml_body.clone();
            async move { this.report(&path, depth, &xml_body).await }
        })
        .await
    }

    async fn batch<F, Fut, R>(
        &self,
        paths: impl IntoIterator<Item = String>,
        max_concurrency: Option<usize>,
        op: F,
    ) -> Vec<BatchItem<R>>
    where
        F: Fn(Self, String) -> Fut,
        Fut: std::future::Future<Output = Result<R>>,
    {
        let sem = Arc::new(Semaphore::new(
            max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY).max(1),
        ));
        let mut tasks = FuturesOrdered::new();

        for path in paths {
            let sem_clone = sem.clone();
            let this = self.clone();
            let fut = op(this, path.clone());
            tasks.push_back(async move {
                let _permit: OwnedSemaphorePermit =
                    sem_clone.acquire_owned().await.expect("semaphore closed");
                BatchItem {
                    path,
                    result: fut.await,
                }
            });
        }

        let mut out = Vec::new();
        while let Some(item) = tasks.next().await {
            out.push(item);
        }
        out
    }

    /// `supportedReportSet(collection)`: `PROPFIND` depth 0 for
    /// `d:supported-report-set`, returning the camelCased local names of
    /// each `sr.report` child's first grandchild.
    pub async fn supported_report_set(&self, collection_url: &str) -> Result<Vec<String>> {
        use crate::webdav::xml::{ALL_NAMESPACES, Element, NS_DAV, encode_document};

        let body = encode_document(
            Element::new("d:propfind").child(
                Element::new("d:prop").child(Element::new("d:supported-report-set")),
            ),
            &[NS_DAV],
        );
        let decoded = self.propfind(collection_url, Depth::Zero, &body).await?;
        let response = decoded
            .responses
            .into_iter()
            .find(|r| url_contains(r.href.as_deref().unwrap_or(""), collection_url))
            .ok_or_else(|| DavError::CollectionNotFound)?;

        let reports = response
            .props
            .get("supportedReportSet")
            .and_then(crate::webdav::xml::PropValue::as_nested)
            .map(|nested| {
                nested
                    .find_all("supported-report")
                    .filter_map(|sr| sr.find("report"))
                    .filter_map(|report| report.children.iter().find_map(|n| match n {
                        crate::webdav::xml::Node::Element(e) => {
                            Some(crate::webdav::xml::camel_case_local_name(&e.name))
                        }
                        _ => None,
                    }))
                    .collect()
            })
            .unwrap_or_else(|| {
                let _ = ALL_NAMESPACES;
                Vec::new()
            });
        Ok(reports)
    }

    /// `isCollectionDirty(collection)`: `PROPFIND` depth 0 for
    /// `cs:getctag`, matched by [`url_contains`].
    pub async fn is_collection_dirty(
        &self,
        collection_url: &str,
        known_ctag: Option<&str>,
    ) -> Result<(bool, Option<String>)> {
        use crate::webdav::xml::{Element, NS_CALENDARSERVER, NS_DAV, encode_document};

        let body = encode_document(
            Element::new("d:propfind")
                .child(Element::new("d:prop").child(Element::new("cs:getctag"))),
            &[NS_DAV, NS_CALENDARSERVER],
        );
        let decoded = self.propfind(collection_url, Depth::Zero, &body).await?;
        let response = decoded
            .responses
            .into_iter()
            .find(|r| url_contains(r.href.as_deref().unwrap_or(""), collection_url))
            .ok_or_else(|| DavError::CollectionNotFound)?;

        let new_ctag = response.prop_text("getctag");
        let is_dirty = known_ctag != new_ctag.as_deref();
        Ok((is_dirty, new_ctag))
    }

    /// `syncCollection(url, props, syncLevel, syncToken)`: `REPORT` with a
    /// `sync-collection` body carrying the prior token, if any.
    pub async fn sync_collection(
        &self,
        collection_url: &str,
        prop_local_names: &[&str],
        sync_level: &str,
        sync_token: Option<&str>,
    ) -> Result<MultistatusResult> {
        use crate::webdav::xml::{Element, NS_DAV, encode_document};

        let prop = prop_local_names
            .iter()
            .fold(Element::new("d:prop"), |el, name| {
                el.child(Element::new(format!("d:{name}")))
            });

        let mut root = Element::new("d:sync-collection");
        root = root.child(Element::new("d:sync-token").text(sync_token.unwrap_or("")));
        root = root.child(Element::new("d:sync-level").text(sync_level));
        root = root.child(prop);

        let body = encode_document(root, &[NS_DAV]);
        self.report(collection_url, Depth::One, &body).await
    }

    /// `ETag` header, if present, from a raw response.
    pub fn etag_from_headers(headers: &HeaderMap) -> Option<String> {
        headers
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webdav::transport::RawResponse;
    use hyper::StatusCode;
    use std::sync::Mutex as StdMutex;

    #[derive(Clone, Default)]
    struct FakeTransport {
        responses: Arc<StdMutex<Vec<(u16, Vec<u8>)>>>,
    }

    impl FakeTransport {
        fn queue(&self, status: u16, body: &str) {
            self.responses.lock().unwrap().push((status, body.as_bytes().to_vec()));
        }
    }

    impl DavTransport for FakeTransport {
        async fn execute(&self, _request: DavRequest, _timeout: Duration) -> Result<RawResponse> {
            let (status, body) = self.responses.lock().unwrap().remove(0);
            Ok(RawResponse {
                status: StatusCode::from_u16(status).unwrap(),
                headers: HeaderMap::new(),
                body: Bytes::from(body),
            })
        }
    }

    fn client_with(transport: FakeTransport) -> WebDavClient<FakeTransport> {
        WebDavClient::with_transport("https://dav.example.com/cal/", transport, None).unwrap()
    }

    #[test]
    fn build_uri_applies_proxy_prefix() {
        let client = WebDavClient::with_transport_and_proxy(
            "https://dav.example.com/cal/",
            FakeTransport::default(),
            None,
            Some("https://proxy.example.com/forward/".to_string()),
        )
        .unwrap();
        let uri = client.build_uri("personal/").unwrap();
        assert_eq!(
            uri.to_string(),
            "https://proxy.example.com/forward/https://dav.example.com/cal/personal/"
        );
    }

    #[tokio::test]
    async fn is_collection_dirty_detects_ctag_change() {
        let transport = FakeTransport::default();
        transport.queue(
            207,
            r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:" xmlns:cs="http://calendarserver.org/ns/">
  <d:response>
    <d:href>/cal/personal/</d:href>
    <d:propstat>
      <d:prop><cs:getctag>"ctag-2"</cs:getctag></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#,
        );
        let client = client_with(transport);
        let (is_dirty, new_ctag) = client
            .is_collection_dirty("/cal/personal/", Some("ctag-1"))
            .await
            .unwrap();
        assert!(is_dirty);
        assert_eq!(new_ctag.as_deref(), Some("ctag-2"));
    }

    #[tokio::test]
    async fn is_collection_dirty_fails_without_a_matching_response() {
        let transport = FakeTransport::default();
        transport.queue(207, r#"<d:multistatus xmlns:d="DAV:"></d:multistatus>"#);
        let client = client_with(transport);
        let err = client
            .is_collection_dirty("/cal/personal/", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DavError::CollectionNotFound));
    }
}
