//! HTTP client used by the simulated users.
//!
//! A single [`reqwest::Client`] is built per test run and shared by every
//! virtual user, so connection pooling is handled by reqwest. Each VU wraps
//! it in an [`ArztClient`] bound to the target host.

use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::loadtest::config::{parse_host, RequestSpec, Settings};
use crate::loadtest::error::{LoadTestError, RequestError};

/// Maximum number of response body bytes kept in an HTTP error.
const ERROR_BODY_LIMIT: usize = 256;

/// Build the shared HTTP client from the test settings.
///
/// Certificate verification is disabled when `settings.insecure` is set,
/// which the Arzt development server needs for its self-signed certificate.
pub fn build_http_client(settings: &Settings) -> Result<Client, LoadTestError> {
    if settings.insecure {
        tracing::warn!("TLS certificate verification is disabled (settings.insecure = true)");
    }
    Client::builder()
        .timeout(settings.timeout_as_duration())
        .connect_timeout(settings.timeout_as_duration().min(Duration::from_secs(10)))
        .user_agent(concat!("arzt-loadtest/", env!("CARGO_PKG_VERSION")))
        .danger_accept_invalid_certs(settings.insecure)
        .build()
        .map_err(|e| LoadTestError::Client {
            message: e.to_string(),
        })
}

/// GET-only client bound to one target host.
#[derive(Clone, Debug)]
pub struct ArztClient {
    http: Client,
    base: Url,
}

impl ArztClient {
    /// Create a client for `base_url`, which must be an `http`/`https` URL.
    pub fn new(http: Client, base_url: &str) -> Result<Self, LoadTestError> {
        let base = parse_host(base_url)?;
        Ok(Self { http, base })
    }

    /// Returns the target host URL.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Build the absolute URL for a request.
    ///
    /// The request path is appended to the host as-is, so a host with a
    /// path prefix (`https://gw/api`) keeps that prefix.
    pub fn url_for(&self, request: &RequestSpec) -> Result<Url, RequestError> {
        let base = self.base.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{}", request.path)).map_err(|e| {
            RequestError::InvalidUrl {
                message: format!("{}: {e}", request.path),
            }
        })?;
        if !request.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }

    /// Issue one GET request and read the full response body.
    ///
    /// Returns the status code on success. Any status `>= 400` is reported
    /// as [`RequestError::Http`]; the body is not otherwise inspected.
    pub async fn get(&self, request: &RequestSpec) -> Result<u16, RequestError> {
        let url = self.url_for(request)?;
        let mut builder = self.http.get(url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RequestError::classify_reqwest(&e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| RequestError::classify_reqwest(&e))?;

        if status >= 400 {
            let end = body.len().min(ERROR_BODY_LIMIT);
            return Err(RequestError::Http {
                status,
                body: String::from_utf8_lossy(&body[..end]).into_owned(),
            });
        }
        Ok(status)
    }
}
