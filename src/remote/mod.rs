//! Remote ledger integration for hledger-web
//!
//! This module provides the HTTP client and the wire types for talking to an hledger-web JSON API,
//! plus the two seams the sync engine consumes: fetching a resource and detecting the server
//! version. Tests and alternative transports plug in by implementing these traits.

/// reqwest-based client for hledger-web
mod client;
/// Type definitions for the JSON wire format
mod types;
/// Server and API version identification
mod version;

use crate::model::Profile;
use crate::sync::SyncError;

pub use client::HledgerClient;
pub use types::*;
pub use version::{ApiVersion, ServerVersion};

/// Fetches raw resources from a profile's remote ledger.
///
/// Implementations classify every failure into a `SyncError` before returning. Dropping the
/// returned future must abort the request.
#[async_trait::async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Fetch `resource` (relative to the profile URL) and return the response body.
    async fn fetch(&self, profile: &Profile, resource: &str) -> Result<Vec<u8>, SyncError>;
}

/// Determines which server version a profile talks to.
#[async_trait::async_trait]
pub trait VersionDetector: Send + Sync {
    /// Detect the version of the server behind `profile`.
    async fn detect(&self, profile: &Profile) -> Result<ServerVersion, SyncError>;
}
