use crate::remote::{ApiVersion, ServerVersion};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// HTTP basic-auth credentials for a remote ledger
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-profile display preferences. Never consulted by the sync engine itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePreferences {
    pub default_commodity: Option<String>,
    pub show_commodity_by_default: bool,
    pub show_comments_by_default: bool,
    pub permit_posting: bool,
}

/// A remote ledger connection.
///
/// `id` never changes once assigned; `uuid` survives reinstall/restore and is what
/// re-associates a restored profile with its data. A nil `uuid` means none was configured; the
/// profile then keeps the one it was stored with, or gets a fresh one on first registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    #[serde(default = "Uuid::nil")]
    pub uuid: Uuid,
    pub url: String,
    #[serde(default)]
    pub auth: Option<Credentials>,
    #[serde(default)]
    pub api_version: ApiVersion,
    #[serde(default)]
    pub detected_version: Option<ServerVersion>,
    #[serde(default)]
    pub preferences: ProfilePreferences,
}

impl Profile {
    pub fn new(id: i64, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            uuid: Uuid::new_v4(),
            url: url.into(),
            auth: None,
            api_version: ApiVersion::Auto,
            detected_version: None,
            preferences: ProfilePreferences::default(),
        }
    }

    /// Absolute URL of `resource` below this profile's base URL.
    pub fn resource_url(&self, resource: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            resource.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_url_joins_without_double_slash() {
        let profile = Profile::new(1, "home", "https://ledger.example.org/hledger/");
        assert_eq!(
            profile.resource_url("/accounts"),
            "https://ledger.example.org/hledger/accounts"
        );
        let bare = Profile::new(2, "bare", "http://localhost:5000");
        assert_eq!(bare.resource_url("version"), "http://localhost:5000/version");
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials {
            user: "alice".into(),
            password: "hunter2".into(),
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("alice"));
        assert!(!shown.contains("hunter2"));
    }
}
