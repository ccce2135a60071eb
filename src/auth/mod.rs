//! Auth header provider (C3): Basic and OAuth credentials, with single-flight
//! OAuth refresh modeled on the teacher's existing single-flight
//! request-compression negotiation (`Arc<Mutex<()>>` probe guard plus
//! `Arc<RwLock<..>>` cached result, in `webdav::client`).

use crate::error::{DavError, Result};
use crate::webdav::transport::{DavRequest, DavTransport, HyperTransport};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;
use hyper::{HeaderMap, Method, header};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Duration;

/// Credentials supplied by the caller at account creation.
#[derive(Debug, Clone)]
pub enum Credentials {
    Basic {
        username: String,
        password: String,
    },
    OAuth(OAuthConfig),
}

/// OAuth 2.0 configuration; `access_token`/`refresh_token`/`expiration` start
/// empty and are populated by the first token fetch.
#[derive(Debug, Clone, Default)]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_code: Option<String>,
    pub redirect_url: Option<String>,
}

#[derive(Default)]
struct OAuthTokenState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    /// Epoch milliseconds.
    expiration: Option<i64>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Produces the `Authorization` header for outgoing DAV requests.
pub struct AuthProvider {
    credentials: Credentials,
    oauth_state: RwLock<OAuthTokenState>,
    refresh_lock: Mutex<()>,
    token_transport: HyperTransport,
}

impl AuthProvider {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            credentials: Credentials::Basic {
                username: username.into(),
                password: password.into(),
            },
            oauth_state: RwLock::new(OAuthTokenState::default()),
            refresh_lock: Mutex::new(()),
            token_transport: HyperTransport::new()?,
        }))
    }

    pub fn oauth(config: OAuthConfig) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            credentials: Credentials::OAuth(config),
            oauth_state: RwLock::new(OAuthTokenState::default()),
            refresh_lock: Mutex::new(()),
            token_transport: HyperTransport::new()?,
        }))
    }

    /// The `Authorization` header value to send with the next request,
    /// refreshing an OAuth access token first if it is missing or expired.
    pub async fn header_value(&self) -> Result<header::HeaderValue> {
        match &self.credentials {
            Credentials::Basic { username, password } => {
                let token = format!("{username}:{password}");
                let value = format!("Basic {}", B64.encode(token));
                header::HeaderValue::from_str(&value).map_err(DavError::transport)
            }
            Credentials::OAuth(config) => self.oauth_header(config).await,
        }
    }

    async fn oauth_header(&self, config: &OAuthConfig) -> Result<header::HeaderValue> {
        if let Some(value) = self.cached_bearer().await? {
            return Ok(value);
        }

        // Single-flight: only the first caller through this lock performs the
        // POST; everyone else waits, then re-checks the now-refreshed cache.
        let _guard = self.refresh_lock.lock().await;
        if let Some(value) = self.cached_bearer().await? {
            return Ok(value);
        }

        log::info!("dav-rs: refreshing oauth token");
        let grant_type = {
            let state = self.oauth_state.read().await;
            if state.refresh_token.is_some() {
                "refresh_token"
            } else {
                "authorization_code"
            }
        };
        validate_oauth_config(config, grant_type)?;

        let form = {
            let state = self.oauth_state.read().await;
            build_token_form(config, grant_type, state.refresh_token.as_deref())
        };
        let response = self.post_token_endpoint(config, &form).await?;

        let mut state = self.oauth_state.write().await;
        state.access_token = Some(response.access_token.clone());
        if let Some(refresh_token) = response.refresh_token {
            state.refresh_token = Some(refresh_token);
        }
        state.expiration = Some(now_ms() + response.expires_in.unwrap_or(3600) * 1000);

        bearer_header(&response.access_token)
    }

    async fn cached_bearer(&self) -> Result<Option<header::HeaderValue>> {
        let state = self.oauth_state.read().await;
        match (&state.access_token, state.expiration) {
            (Some(token), Some(expiration)) if now_ms() <= expiration => {
                Ok(Some(bearer_header(token)?))
            }
            _ => Ok(None),
        }
    }

    async fn post_token_endpoint(
        &self,
        config: &OAuthConfig,
        form: &[(&str, String)],
    ) -> Result<TokenResponse> {
        let body = encode_form(form);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let request = DavRequest {
            method: Method::POST,
            uri: config.token_url.parse().map_err(DavError::transport)?,
            headers,
            body: Some(Bytes::from(body)),
        };

        let response = self
            .token_transport
            .execute(request, Duration::from_secs(20))
            .await?;

        if !response.is_success() {
            return Err(DavError::OAuthFetchFailed(response.status.as_u16()));
        }

        serde_json::from_slice(&response.body).map_err(DavError::transport)
    }
}

fn bearer_header(access_token: &str) -> Result<header::HeaderValue> {
    header::HeaderValue::from_str(&format!("Bearer {access_token}")).map_err(DavError::transport)
}

fn validate_oauth_config(config: &OAuthConfig, grant_type: &str) -> Result<()> {
    let mut missing = Vec::new();
    if config.token_url.is_empty() {
        missing.push("tokenUrl".to_string());
    }
    if config.client_id.is_empty() {
        missing.push("clientId".to_string());
    }
    if config.client_secret.is_empty() {
        missing.push("clientSecret".to_string());
    }
    if grant_type == "authorization_code" {
        if config.authorization_code.as_deref().unwrap_or("").is_empty() {
            missing.push("authorizationCode".to_string());
        }
        if config.redirect_url.as_deref().unwrap_or("").is_empty() {
            missing.push("redirectUrl".to_string());
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DavError::OAuthConfigMissing(missing))
    }
}

fn build_token_form<'a>(
    config: &'a OAuthConfig,
    grant_type: &'static str,
    refresh_token: Option<&'a str>,
) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("grant_type", grant_type.to_string()),
        ("client_id", config.client_id.clone()),
        ("client_secret", config.client_secret.clone()),
    ];
    if grant_type == "authorization_code" {
        form.push(("code", config.authorization_code.clone().unwrap_or_default()));
        form.push(("redirect_uri", config.redirect_url.clone().unwrap_or_default()));
    } else if let Some(refresh_token) = refresh_token {
        form.push(("refresh_token", refresh_token.to_string()));
    }
    form
}

fn encode_form(fields: &[(&str, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, NON_ALPHANUMERIC),
                utf8_percent_encode(v, NON_ALPHANUMERIC)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_header_is_base64_encoded() {
        let auth = AuthProvider::basic("user01", "secret").unwrap();
        let value = auth.header_value().await.unwrap();
        assert_eq!(value.to_str().unwrap(), "Basic dXNlcjAxOnNlY3JldA==");
    }

    #[test]
    fn oauth_validation_flags_missing_fields_for_authorization_code() {
        let config = OAuthConfig {
            token_url: "https://example.com/token".to_string(),
            client_id: "id".to_string(),
            client_secret: String::new(),
            authorization_code: None,
            redirect_url: None,
        };
        let err = validate_oauth_config(&config, "authorization_code").unwrap_err();
        match err {
            DavError::OAuthConfigMissing(fields) => {
                assert!(fields.contains(&"clientSecret".to_string()));
                assert!(fields.contains(&"authorizationCode".to_string()));
                assert!(fields.contains(&"redirectUrl".to_string()));
            }
            other => panic!("expected OAuthConfigMissing, got {other:?}"),
        }
    }
}
