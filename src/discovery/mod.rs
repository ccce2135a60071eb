//! Account bootstrap and service discovery (C4): `.well-known` probing,
//! principal-URL lookup, home-URL lookup. Strictly sequential, since each
//! step consumes the previous step's output.

use std::sync::Arc;

use hyper::{StatusCode, Uri};

use crate::auth::AuthProvider;
use crate::common::url::resolve_redirect;
use crate::error::{DavError, Result};
use crate::webdav::client::WebDavClient;
use crate::webdav::transport::{DavTransport, HyperTransport};
use crate::webdav::types::Depth;
use crate::webdav::xml::{Element, NS_CALDAV, NS_CARDDAV, NS_DAV, encode_document};

/// Which `.well-known` path and home-set property this account bootstraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    CalDav,
    CardDav,
}

impl AccountType {
    fn well_known_path(self) -> &'static str {
        match self {
            AccountType::CalDav => "/.well-known/caldav",
            AccountType::CardDav => "/.well-known/carddav",
        }
    }

    fn home_set_local_name(self) -> &'static str {
        match self {
            AccountType::CalDav => "calendar-home-set",
            AccountType::CardDav => "addressbook-home-set",
        }
    }

    fn home_set_prop_element(self) -> Element {
        match self {
            AccountType::CalDav => Element::new("c:calendar-home-set"),
            AccountType::CardDav => Element::new("card:addressbook-home-set"),
        }
    }
}

/// The account, as produced by [`create_account`]: server-supplied URLs,
/// resolved once at bootstrap and thereafter immutable.
#[derive(Debug, Clone)]
pub struct Account {
    pub account_type: AccountType,
    pub server_url: String,
    pub root_url: String,
    pub principal_url: String,
    pub home_url: String,
    pub proxy_url: Option<String>,
}

/// `serviceDiscovery`: probe `proxyUrl + .well-known/{accountType}` with
/// redirects disabled; any failure is swallowed and logged, yielding
/// `rootUrl = serverUrl` rather than failing account creation.
async fn service_discovery(
    transport: &HyperTransport,
    server_url: &Uri,
    account_type: AccountType,
    proxy_url: Option<&str>,
) -> Uri {
    let well_known = match crate::common::url::join_uri(server_url, account_type.well_known_path()) {
        Ok(u) => u,
        Err(err) => {
            log::warn!("dav-rs: failed to build .well-known uri: {err}");
            return server_url.clone();
        }
    };

    let probe_uri: Uri = match proxy_url {
        Some(prefix) => match format!("{prefix}{well_known}").parse() {
            Ok(uri) => uri,
            Err(err) => {
                log::warn!("dav-rs: failed to apply proxy to .well-known uri: {err}");
                return server_url.clone();
            }
        },
        None => well_known,
    };

    let request = crate::webdav::transport::DavRequest {
        method: hyper::Method::from_bytes(b"PROPFIND").expect("PROPFIND is a valid method token"),
        uri: probe_uri,
        headers: hyper::HeaderMap::new(),
        body: None,
    };

    match transport.execute(request, tokio::time::Duration::from_secs(20)).await {
        Ok(response) if response.status.is_redirection() => {
            let location = response
                .headers
                .get(hyper::header::LOCATION)
                .and_then(|v| v.to_str().ok());
            match location {
                Some(location) => match resolve_redirect(server_url, location) {
                    Ok(resolved) => resolved,
                    Err(err) => {
                        log::warn!("dav-rs: service discovery redirect unresolvable: {err}");
                        server_url.clone()
                    }
                },
                None => server_url.clone(),
            }
        }
        Ok(_) => server_url.clone(),
        Err(err) => {
            log::warn!("dav-rs: service discovery failed, falling back to server url: {err}");
            server_url.clone()
        }
    }
}

/// `fetchPrincipalUrl`: `PROPFIND` `rootUrl` depth 0 for
/// `d:current-user-principal`. A 401 fails `InvalidCredentials`.
async fn fetch_principal_url(client: &WebDavClient, root_url: &str) -> Result<String> {
    let body = encode_document(
        Element::new("d:propfind")
            .child(Element::new("d:prop").child(Element::new("d:current-user-principal"))),
        &[NS_DAV],
    );

    let decoded = client.propfind(root_url, Depth::Zero, &body).await?;

    for response in &decoded.responses {
        if response.status == StatusCode::UNAUTHORIZED.as_u16() {
            return Err(DavError::InvalidCredentials);
        }
    }

    let href = decoded
        .responses
        .iter()
        .find_map(|r| r.props.get("currentUserPrincipal").and_then(|v| v.as_list().into_iter().next()))
        .ok_or(DavError::HomeUrlNotFound)?;

    let resolved = crate::common::url::join_uri(client.base(), &href).map_err(DavError::transport)?;
    Ok(resolved.to_string())
}

/// `fetchHomeUrl`: `PROPFIND` `principalUrl` depth 0 for the home-set
/// property, matched by `urlContains`.
async fn fetch_home_url(
    client: &WebDavClient,
    principal_url: &str,
    account_type: AccountType,
) -> Result<String> {
    let namespaces: &[(&str, &str)] = match account_type {
        AccountType::CalDav => &[NS_DAV, NS_CALDAV],
        AccountType::CardDav => &[NS_DAV, NS_CARDDAV],
    };
    let body = encode_document(
        Element::new("d:propfind").child(
            Element::new("d:prop").child(account_type.home_set_prop_element()),
        ),
        namespaces,
    );

    let decoded = client.propfind(principal_url, Depth::Zero, &body).await?;
    let local_name = account_type.home_set_local_name();
    let camel = crate::webdav::xml::camel_case_local_name(local_name);

    let href = decoded
        .responses
        .iter()
        .find(|r| crate::common::url::url_contains(principal_url, r.href.as_deref().unwrap_or("")))
        .and_then(|r| r.props.get(&camel))
        .and_then(|v| v.as_list().into_iter().next())
        .ok_or(DavError::HomeUrlNotFound)?;

    let resolved = crate::common::url::join_uri(client.base(), &href).map_err(DavError::transport)?;
    Ok(resolved.to_string())
}

/// Run the three sequential discovery steps, producing an immutable
/// [`Account`]. Collection/object loading (`loadCollections`/`loadObjects`)
/// is layered on top by the caldav/carddav adapters, not here.
pub async fn create_account(
    server_url: &str,
    account_type: AccountType,
    auth: Option<Arc<AuthProvider>>,
    proxy_url: Option<String>,
) -> Result<Account> {
    let server_uri: Uri = server_url.parse().map_err(DavError::transport)?;
    let probe_transport = HyperTransport::new()?;

    let root_uri = service_discovery(&probe_transport, &server_uri, account_type, proxy_url.as_deref()).await;
    let root_url = root_uri.to_string();
    log::debug!("dav-rs: discovered root url {root_url}");

    let root_client =
        WebDavClient::with_transport_and_proxy(&root_url, probe_transport.clone(), auth.clone(), proxy_url.clone())?;
    let principal_url = fetch_principal_url(&root_client, &root_url).await?;
    log::debug!("dav-rs: discovered principal url {principal_url}");

    let principal_client = root_client.with_base(&principal_url)?;
    let home_url = fetch_home_url(&principal_client, &principal_url, account_type).await?;
    log::debug!("dav-rs: discovered home url {home_url}");

    Ok(Account {
        account_type,
        server_url: server_url.to_string(),
        root_url,
        principal_url,
        home_url,
        proxy_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_path_matches_account_type() {
        assert_eq!(AccountType::CalDav.well_known_path(), "/.well-known/caldav");
        assert_eq!(AccountType::CardDav.well_known_path(), "/.well-known/carddav");
    }

    #[test]
    fn home_set_local_name_matches_account_type() {
        assert_eq!(AccountType::CalDav.home_set_local_name(), "calendar-home-set");
        assert_eq!(AccountType::CardDav.home_set_local_name(), "addressbook-home-set");
    }

    #[test]
    fn well_known_probe_is_prefixed_by_the_proxy_url() {
        let server_url: Uri = "https://ex.com".parse().unwrap();
        let well_known = crate::common::url::join_uri(&server_url, AccountType::CalDav.well_known_path()).unwrap();
        let proxied: Uri = format!("https://proxy.ex.com/forward/{well_known}").parse().unwrap();
        assert_eq!(proxied.to_string(), "https://proxy.ex.com/forward/https://ex.com/.well-known/caldav");
    }
}
