//! API client for the PartyMaker document server.
//!
//! `ApiClient` implements `RemoteStore` for group documents and
//! `UserDirectory` for user records. Rate-limited requests are retried here
//! with exponential backoff; every other failure is reported to the caller.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::ApiError;
use crate::models::{FieldMap, Group, User};
use crate::remote::{RemoteError, RemoteStore, UserDirectory};

// ============================================================================
// Constants
// ============================================================================

/// Default server hosting the document API
pub const DEFAULT_SERVER_URL: &str = "https://partymaker.onrender.com";

/// Path prefix of the document API on the server
const API_PREFIX: &str = "api/firebase";

/// Default HTTP request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_PREFIX, path)
    }

    fn group_url(&self, key: &str) -> String {
        self.url(&format!("Groups/{}", urlencoding::encode(key)))
    }

    fn user_url(&self, key: &str) -> String {
        self.url(&format!("Users/{}", urlencoding::encode(key)))
    }

    /// Send a request, retrying with exponential backoff while rate limited.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .header(header::ACCEPT, "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(method = %method, url = url, "Sending request");
            let response = request.send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }
            if status != StatusCode::TOO_MANY_REQUESTS {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::from_status(status, &body));
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2;
        }
    }

    /// GET returning `None` for 404 or an empty body.
    async fn get_json(&self, url: &str) -> Result<Option<Value>, ApiError> {
        let response = match self.send::<()>(Method::GET, url, None).await {
            Ok(response) => response,
            Err(ApiError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let text = response.text().await?;
        parse_optional_document(&text)
    }
}

/// The server answers a missing document with 404, `null` or `{}`.
fn parse_optional_document(text: &str) -> Result<Option<Value>, ApiError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {}", e)))?;
    match &value {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        _ => Ok(Some(value)),
    }
}

#[async_trait]
impl RemoteStore for ApiClient {
    async fn fetch(&self, key: &str) -> Result<Option<Group>, RemoteError> {
        let Some(document) = self.get_json(&self.group_url(key)).await? else {
            debug!(key = key, "Group not found on server");
            return Ok(None);
        };
        let group = Group::from_document(key, document)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse group {}: {}", key, e)))?;
        Ok(Some(group))
    }

    async fn fetch_all(&self) -> Result<Vec<Group>, RemoteError> {
        let Some(document) = self.get_json(&self.url("Groups")).await? else {
            return Ok(Vec::new());
        };
        let by_key: HashMap<String, Value> = serde_json::from_value(document)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse groups: {}", e)))?;

        let mut groups = Vec::with_capacity(by_key.len());
        for (key, document) in by_key {
            match Group::from_document(&key, document) {
                Ok(group) => groups.push(group),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable group document"),
            }
        }
        Ok(groups)
    }

    async fn update(&self, key: &str, fields: FieldMap) -> Result<(), RemoteError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.send(Method::PUT, &self.group_url(key), Some(&fields)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        self.send::<()>(Method::DELETE, &self.group_url(key), None).await?;
        Ok(())
    }

    async fn save(&self, key: &str, group: &Group) -> Result<(), RemoteError> {
        // The server only accepts PUT on group documents
        self.send(Method::PUT, &self.group_url(key), Some(group)).await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for ApiClient {
    async fn list_users(&self) -> Result<Vec<User>, RemoteError> {
        let Some(document) = self.get_json(&self.url("Users")).await? else {
            return Ok(Vec::new());
        };
        let by_key: HashMap<String, User> = serde_json::from_value(document)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse users: {}", e)))?;

        let mut users: Vec<User> = by_key
            .into_iter()
            .map(|(key, mut user)| {
                if user.key.is_empty() {
                    user.key = key;
                }
                user
            })
            .collect();
        users.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(users)
    }

    async fn get_user(&self, key: &str) -> Result<User, RemoteError> {
        let document = self
            .get_json(&self.user_url(key))
            .await?
            .ok_or_else(|| RemoteError::NotFound(key.to_string()))?;
        let mut user: User = serde_json::from_value(document)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse user {}: {}", key, e)))?;
        if user.key.is_empty() {
            user.key = key.to_string();
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let api = ApiClient::new("https://example.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.base_url(), "https://example.com");
        assert_eq!(api.group_url("-Nx1"), "https://example.com/api/firebase/Groups/-Nx1");
        assert_eq!(api.user_url("a b"), "https://example.com/api/firebase/Users/a%20b");
        assert_eq!(api.url("Users"), "https://example.com/api/firebase/Users");
    }

    #[test]
    fn test_group_url_escapes_key() {
        let api = ApiClient::new("https://example.com", Duration::from_secs(5)).unwrap();
        assert_eq!(api.group_url("a/b?c"), "https://example.com/api/firebase/Groups/a%2Fb%3Fc");
    }

    #[test]
    fn test_parse_optional_document() {
        assert!(parse_optional_document("").unwrap().is_none());
        assert!(parse_optional_document("null").unwrap().is_none());
        assert!(parse_optional_document("{}").unwrap().is_none());
        assert!(parse_optional_document("{\"groupName\":\"x\"}").unwrap().is_some());
        assert!(matches!(parse_optional_document("<html>"), Err(ApiError::InvalidResponse(_))));
    }
}
