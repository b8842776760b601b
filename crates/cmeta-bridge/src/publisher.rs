// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publishing record batches to the cmeta HTTP API.
//!
//! Open records are created in bulk with one `POST /api/cmeta/`. Close
//! records are updates to existing resources, so each one is sent as its
//! own `PUT /api/cmeta/{hash}/` carrying a single-element array.
//!
//! Every request carries `Content-Type: application/json`. After a
//! successful [`HttpPublisher::login`] requests also carry
//! `Authorization: Token <token>` and `WWW-Authenticate: Token`.

use crate::record::{CloseRecord, OpenRecord};
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::net::Ipv6Addr;
use std::time::Duration;
use thiserror::Error;

const CMETA_PATH: &str = "/api/cmeta/";
const LOGIN_PATH: &str = "/api/login/";

/// Errors from a single publish call.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid backend URL: {0}")]
    Url(String),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{method} {url} failed: {source}")]
    Http {
        method: Method,
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} rejected with status {status}")]
    Status {
        method: Method,
        url: Url,
        status: StatusCode,
    },
}

/// Errors from the startup login exchange.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login failed: {0}")]
    Request(#[from] PublishError),

    #[error("login response has no usable token: {0}")]
    MalformedResponse(#[source] reqwest::Error),
}

/// Sink for flushed batches.
pub trait Publisher {
    /// Create every record of the batch in one request.
    fn publish_opens(&mut self, records: &[OpenRecord]) -> Result<(), PublishError>;

    /// Update the resource addressed by the record's hash.
    fn publish_close(&mut self, record: &CloseRecord) -> Result<(), PublishError>;
}

/// Backend host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    pub host: String,
    pub port: u16,
}

impl BackendEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host as it appears in a URL authority. IPv6 literals are bracketed.
    fn authority_host(&self) -> Cow<'_, str> {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            Cow::Owned(format!("[{}]", self.host))
        } else {
            Cow::Borrowed(&self.host)
        }
    }

    fn base(&self) -> Result<Url, PublishError> {
        let raw = format!("{}/", self);
        Url::parse(&raw).map_err(|e| PublishError::Url(format!("{}: {}", raw, e)))
    }

    fn url(&self, path: &str) -> Result<Url, PublishError> {
        self.base()?
            .join(path)
            .map_err(|e| PublishError::Url(format!("{}: {}", path, e)))
    }

    /// `/api/cmeta/{hash}/`, with the hash escaped as one path segment.
    fn record_url(&self, hash: &str) -> Result<Url, PublishError> {
        let mut url = self.base()?;
        url.path_segments_mut()
            .map_err(|_| PublishError::Url(format!("{} cannot carry a path", self)))?
            .pop_if_empty()
            .extend(["api", "cmeta", hash, ""]);
        Ok(url)
    }
}

impl fmt::Display for BackendEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:{}", self.authority_host(), self.port)
    }
}

/// Login credentials.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bearer token returned by the login endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken(<{} chars>)", self.0.len())
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Blocking HTTP publisher.
pub struct HttpPublisher {
    client: Client,
    endpoint: BackendEndpoint,
    token: Option<AuthToken>,
}

impl HttpPublisher {
    /// Create a publisher that sends no credentials.
    ///
    /// `timeout` of `None` waits on the backend indefinitely.
    pub fn anonymous(
        endpoint: BackendEndpoint,
        timeout: Option<Duration>,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PublishError::Client)?;

        Ok(Self {
            client,
            endpoint,
            token: None,
        })
    }

    /// Log in with `credentials` and keep the returned token for every
    /// subsequent call.
    pub fn login(
        endpoint: BackendEndpoint,
        credentials: &Credentials,
        timeout: Option<Duration>,
    ) -> Result<Self, AuthError> {
        let mut publisher = Self::anonymous(endpoint, timeout)?;

        let url = publisher.endpoint.url(LOGIN_PATH)?;
        let response = publisher.send(Method::POST, url, credentials)?;
        let body: LoginResponse = response.json().map_err(AuthError::MalformedResponse)?;

        tracing::info!(
            backend = %publisher.endpoint,
            username = %credentials.username,
            "Logged in to cmeta backend"
        );
        publisher.token = Some(AuthToken::new(body.token));
        Ok(publisher)
    }

    /// Use an already issued token.
    pub fn with_token(mut self, token: AuthToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }

    pub fn endpoint(&self) -> &BackendEndpoint {
        &self.endpoint
    }

    fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<Response, PublishError> {
        let payload = serde_json::to_vec(body)?;

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = &self.token {
            request = request
                .header(WWW_AUTHENTICATE, "Token")
                .header(AUTHORIZATION, format!("Token {}", token.as_str()));
        }

        let response = request
            .body(payload)
            .send()
            .map_err(|source| PublishError::Http {
                method: method.clone(),
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(PublishError::Status {
                method,
                url,
                status,
            });
        }

        tracing::debug!(%method, %url, status = status.as_u16(), "Backend accepted request");
        Ok(response)
    }
}

impl Publisher for HttpPublisher {
    fn publish_opens(&mut self, records: &[OpenRecord]) -> Result<(), PublishError> {
        let url = self.endpoint.url(CMETA_PATH)?;
        self.send(Method::POST, url, records)?;
        Ok(())
    }

    fn publish_close(&mut self, record: &CloseRecord) -> Result<(), PublishError> {
        let url = self.endpoint.record_url(&record.hash)?;
        self.send(Method::PUT, url, std::slice::from_ref(record))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let endpoint = BackendEndpoint::new("127.0.0.1", 8082);

        assert_eq!(
            endpoint.url(CMETA_PATH).unwrap().as_str(),
            "http://127.0.0.1:8082/api/cmeta/"
        );
        assert_eq!(
            endpoint.url(LOGIN_PATH).unwrap().as_str(),
            "http://127.0.0.1:8082/api/login/"
        );
        assert_eq!(
            endpoint.record_url("0123abcd").unwrap().as_str(),
            "http://127.0.0.1:8082/api/cmeta/0123abcd/"
        );
    }

    #[test]
    fn test_record_url_escapes_hash() {
        let endpoint = BackendEndpoint::new("localhost", 80);
        let url = endpoint.record_url("a/b c").unwrap();
        assert_eq!(url.path(), "/api/cmeta/a%2Fb%20c/");
    }

    #[test]
    fn test_ipv6_host_is_bracketed() {
        let endpoint = BackendEndpoint::new("::1", 8082);

        assert_eq!(endpoint.to_string(), "http://[::1]:8082");
        assert_eq!(
            endpoint.url(CMETA_PATH).unwrap().as_str(),
            "http://[::1]:8082/api/cmeta/"
        );
        assert_eq!(
            endpoint.record_url("h1").unwrap().as_str(),
            "http://[::1]:8082/api/cmeta/h1/"
        );

        let bracketed = BackendEndpoint::new("[fe80::1]", 80);
        assert_eq!(
            bracketed.url(LOGIN_PATH).unwrap().as_str(),
            "http://[fe80::1]/api/login/"
        );
    }

    #[test]
    fn test_invalid_host_is_reported() {
        let endpoint = BackendEndpoint::new("bad host", 80);
        assert!(matches!(endpoint.url(CMETA_PATH), Err(PublishError::Url(_))));
    }

    #[test]
    fn test_secrets_are_not_debug_printed() {
        let creds = Credentials::new("admin", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));

        let token = AuthToken::new("s3cr3t");
        assert!(!format!("{:?}", token).contains("s3cr3t"));
    }
}
