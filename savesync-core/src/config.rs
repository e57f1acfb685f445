//! Cloud save configuration
//!
//! This module holds the process-wide switch and credential for the remote
//! backend. The value is owned by the coordinator and only changes through
//! its setters, so it can be constructed directly in tests.

use serde::{Deserialize, Serialize};

/// Environment variable that turns cloud saves on (`1`, `true`, `yes`, `on`)
pub const ENV_CLOUD_ENABLED: &str = "SAVESYNC_CLOUD_ENABLED";

/// Environment variable holding the remote auth token
pub const ENV_AUTH_TOKEN: &str = "SAVESYNC_TOKEN";

/// Configuration for remote (cloud) save operations
///
/// Both `enabled` and a non-empty `auth_token` are required before the
/// coordinator issues any remote request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Whether cloud saves were switched on by the host
    pub enabled: bool,
    /// Token sent as `Authorization: token <auth_token>`
    #[serde(default)]
    pub auth_token: String,
}

impl CloudConfig {
    /// Cloud saves switched off, no token
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Cloud saves switched on with the given token
    pub fn with_token<S: Into<String>>(token: S) -> Self {
        CloudConfig {
            enabled: true,
            auth_token: token.into(),
        }
    }

    /// Build a configuration from `SAVESYNC_CLOUD_ENABLED` and `SAVESYNC_TOKEN`
    ///
    /// Missing variables leave the corresponding field at its default.
    pub fn from_env() -> Self {
        let enabled = std::env::var(ENV_CLOUD_ENABLED)
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        let auth_token = std::env::var(ENV_AUTH_TOKEN).unwrap_or_default();
        CloudConfig {
            enabled,
            auth_token,
        }
    }

    /// Token to use for a remote call, or `None` when remote calls must not happen
    pub fn remote_token(&self) -> Option<&str> {
        if self.enabled && !self.auth_token.is_empty() {
            Some(&self.auth_token)
        } else {
            None
        }
    }

    /// True when a remote operation may be attempted
    pub fn is_ready(&self) -> bool {
        self.remote_token().is_some()
    }

    /// Validate the configuration
    ///
    /// A disabled configuration is always valid. An enabled one needs a
    /// token without surrounding whitespace, since it is sent verbatim in
    /// a header.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.auth_token.is_empty() {
            return Err(crate::SyncError::validation(
                "cloud saves are enabled but no auth token is set",
            ));
        }
        if self.auth_token.trim() != self.auth_token {
            return Err(crate::SyncError::validation(
                "auth token must not contain leading or trailing whitespace",
            ));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_disabled() {
        let config = CloudConfig::default();
        assert!(!config.enabled);
        assert!(config.auth_token.is_empty());
        assert!(!config.is_ready());
        assert_eq!(config, CloudConfig::disabled());
    }

    #[test]
    fn test_remote_token_requires_both_fields() {
        let config = CloudConfig::with_token("ghp_abc");
        assert_eq!(config.remote_token(), Some("ghp_abc"));

        let no_token = CloudConfig::with_token("");
        assert_eq!(no_token.remote_token(), None);

        let disabled = CloudConfig {
            enabled: false,
            auth_token: "ghp_abc".to_string(),
        };
        assert_eq!(disabled.remote_token(), None);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" yes "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_validate() {
        assert!(CloudConfig::disabled().validate().is_ok());
        assert!(CloudConfig::with_token("ghp_abc").validate().is_ok());

        let result = CloudConfig::with_token("").validate();
        assert!(result.unwrap_err().to_string().contains("no auth token"));

        assert!(CloudConfig::with_token(" ghp_abc\n").validate().is_err());
    }

    #[test]
    fn test_config_serde() {
        let json = r#"{"enabled": true}"#;
        let config: CloudConfig = serde_json::from_str(json).unwrap();
        assert!(config.enabled);
        assert!(config.auth_token.is_empty());
    }
}
