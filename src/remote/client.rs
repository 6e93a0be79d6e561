//!
//! HTTP client for hledger-web ledgers.
//!
//! This module provides an async client for the hledger-web JSON API. It fetches raw resources
//! for the protocol adapters and detects the server version. Every reqwest failure is classified
//! into a `SyncError` here, so no transport error type leaks into the sync engine.

use super::{LedgerTransport, ServerVersion, VersionDetector};
use crate::model::Profile;
use crate::sync::SyncError;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

/// Resource answering with the server's release string
const VERSION_RESOURCE: &str = "version";

/// hledger-web JSON API client
#[derive(Clone)]
pub struct HledgerClient {
    /// The underlying HTTP client.
    http_client: Client,
    /// Per-request timeout, reported back in timeout errors.
    timeout: Duration,
}

impl HledgerClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `timeout` - Upper bound for a whole request, from connect to the last body byte.
    ///
    /// # Returns
    /// A new `HledgerClient`, or `SyncError::Unknown` if the HTTP stack cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, SyncError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::unknown_with("Failed to create HTTP client", e))?;

        Ok(Self {
            http_client,
            timeout,
        })
    }

    /// Issue a GET for `resource` below the profile URL, with basic auth when configured.
    async fn get(&self, profile: &Profile, resource: &str) -> Result<Response, SyncError> {
        let url = profile.resource_url(resource);
        debug!("GET {}", url);

        let mut request = self
            .http_client
            .get(&url)
            .header("Accept", "application/json");
        if let Some(auth) = &profile.auth {
            request = request.basic_auth(&auth.user, Some(&auth.password));
        }

        request.send().await.map_err(|e| self.classify(e))
    }

    /// Read a successful body, or turn a non-success status into the matching error.
    async fn read_body(&self, response: Response) -> Result<Vec<u8>, SyncError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.ok();
            return Err(SyncError::from_status(status.as_u16(), body));
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(bytes.to_vec())
    }

    /// Map a reqwest error onto the sync error taxonomy.
    fn classify(&self, e: reqwest::Error) -> SyncError {
        if e.is_timeout() {
            SyncError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else if let Some(status) = e.status() {
            SyncError::from_status(status.as_u16(), None)
        } else if e.is_decode() {
            SyncError::parse_with("Failed to decode response body", e)
        } else {
            SyncError::network_with(format!("Request failed: {}", e), e)
        }
    }
}

#[async_trait::async_trait]
impl LedgerTransport for HledgerClient {
    async fn fetch(&self, profile: &Profile, resource: &str) -> Result<Vec<u8>, SyncError> {
        let response = self.get(profile, resource).await?;
        let body = self.read_body(response).await?;
        info!(
            "Fetched {} ({} bytes) for profile {}",
            resource,
            body.len(),
            profile.name
        );
        Ok(body)
    }
}

#[async_trait::async_trait]
impl VersionDetector for HledgerClient {
    /// Query the version endpoint. A 404 means the server predates the endpoint.
    async fn detect(&self, profile: &Profile) -> Result<ServerVersion, SyncError> {
        let response = self.get(profile, VERSION_RESOURCE).await?;
        if response.status() == StatusCode::NOT_FOUND {
            info!(
                "Profile {} has no version endpoint, assuming a legacy server",
                profile.name
            );
            return Ok(ServerVersion::legacy());
        }

        let body = self.read_body(response).await?;
        let version = ServerVersion::parse(&String::from_utf8_lossy(&body))?;
        info!("Profile {} runs hledger-web {}", profile.name, version);
        Ok(version)
    }
}
