//! Server and API version identification.

use crate::sync::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// hledger-web release a profile talks to.
///
/// `legacy` marks a server that does not answer the version request at all; such servers predate
/// 1.19 and are treated as the oldest supported JSON API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub legacy: bool,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            legacy: false,
        }
    }

    /// Version assumed for servers without a version endpoint.
    pub const fn legacy() -> Self {
        Self {
            major: 1,
            minor: 14,
            legacy: true,
        }
    }

    /// Parse the body of the version endpoint, e.g. `1.32.3` or `1.19`.
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        let text = text.trim().trim_matches('"');
        let mut parts = text.split('.');
        let mut number = |what: &str| -> Result<u32, SyncError> {
            parts
                .next()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| SyncError::parse(format!("version '{text}' has no {what} number")))?
                .parse::<u32>()
                .map_err(|e| {
                    SyncError::parse_with(format!("invalid {what} in version '{text}'"), e)
                })
        };
        let major = number("major")?;
        let minor = number("minor")?;
        Ok(Self::new(major, minor))
    }

    /// True when this version is `major.minor` or newer.
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.legacy {
            write!(f, "pre-1.19 (legacy)")
        } else {
            write!(f, "{}.{}", self.major, self.minor)
        }
    }
}

/// API version configured on a profile. `Auto` means "ask the server".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiVersion {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "1.14")]
    V1_14,
    #[serde(rename = "1.19.1")]
    V1_19_1,
    #[serde(rename = "1.23")]
    V1_23,
    #[serde(rename = "1.32")]
    V1_32,
    #[serde(rename = "1.40")]
    V1_40,
}

impl ApiVersion {
    /// The server version implied by a pinned API version.
    pub fn pinned_version(self) -> Option<ServerVersion> {
        match self {
            ApiVersion::Auto => None,
            ApiVersion::V1_14 => Some(ServerVersion::new(1, 14)),
            ApiVersion::V1_19_1 => Some(ServerVersion::new(1, 19)),
            ApiVersion::V1_23 => Some(ServerVersion::new(1, 23)),
            ApiVersion::V1_32 => Some(ServerVersion::new(1, 32)),
            ApiVersion::V1_40 => Some(ServerVersion::new(1, 40)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_strings() {
        assert_eq!(
            ServerVersion::parse("1.32.3").unwrap(),
            ServerVersion::new(1, 32)
        );
        assert_eq!(
            ServerVersion::parse("\"1.19\"\n").unwrap(),
            ServerVersion::new(1, 19)
        );
    }

    #[test]
    fn rejects_garbage() {
        for text in ["", "1", "one.two", "1.x.3"] {
            let err = ServerVersion::parse(text).unwrap_err();
            assert!(
                matches!(err, SyncError::Parse { .. }),
                "{text:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn ordering_by_major_then_minor() {
        let v = ServerVersion::new(1, 23);
        assert!(v.at_least(1, 14));
        assert!(v.at_least(1, 23));
        assert!(!v.at_least(1, 32));
        assert!(!v.at_least(2, 0));
        assert!(ServerVersion::new(2, 0).at_least(1, 40));
    }

    #[test]
    fn api_version_serde_names() {
        let pinned: ApiVersion = serde_json::from_str("\"1.32\"").unwrap();
        assert_eq!(pinned, ApiVersion::V1_32);
        assert_eq!(pinned.pinned_version(), Some(ServerVersion::new(1, 32)));
        let auto: ApiVersion = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(auto.pinned_version(), None);
    }
}
