//! Session configuration and the settings surface exposed to the host.

use std::{
    fmt,
    str::FromStr,
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection parameters for one motion session.
///
/// Read once at the start of every connection attempt, so changes made
/// through [`ConfigHandle`] take effect on the next reconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// WebSocket URI of the eufy-security-ws server.
    #[serde(default)]
    pub server_endpoint: String,

    /// Serial number of the device whose motion events are tracked.
    #[serde(default)]
    pub watched_entity_id: String,
}

impl SessionConfig {
    /// Create a config from an endpoint and a serial number.
    #[must_use]
    pub fn new(server_endpoint: impl Into<String>, watched_entity_id: impl Into<String>) -> Self {
        Self {
            server_endpoint: server_endpoint.into(),
            watched_entity_id: watched_entity_id.into(),
        }
    }

    /// Check that an attempt can be made with this config.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingEndpoint`] if no server endpoint is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_endpoint.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no eufy server endpoint configured")]
    MissingEndpoint,
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),
}

/// Keys of the settings a host can edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingKey {
    /// Station serial number.
    #[serde(rename = "sn")]
    SerialNumber,
    /// WebSocket server URL.
    #[serde(rename = "apiHost")]
    ApiHost,
}

impl SettingKey {
    /// Wire name of the key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SerialNumber => "sn",
            Self::ApiHost => "apiHost",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sn" => Ok(Self::SerialNumber),
            "apiHost" => Ok(Self::ApiHost),
            other => Err(ConfigError::UnknownSetting(other.to_string())),
        }
    }
}

/// Description of one editable setting, with its current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingDescriptor {
    pub key: SettingKey,
    pub title: String,
    pub description: String,
    pub placeholder: String,
    pub value: String,
}

/// Shared, updatable handle to a [`SessionConfig`].
///
/// Cloning the handle shares the underlying config.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<SessionConfig>>,
}

impl ConfigHandle {
    /// Wrap a config in a shared handle.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current config.
    #[must_use]
    pub fn snapshot(&self) -> SessionConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mutate the config in place.
    pub fn update(&self, f: impl FnOnce(&mut SessionConfig)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }

    /// Editable settings with their current values.
    #[must_use]
    pub fn settings(&self) -> Vec<SettingDescriptor> {
        let config = self.snapshot();
        vec![
            SettingDescriptor {
                key: SettingKey::SerialNumber,
                title: "station sn".to_string(),
                description: "The station sn.".to_string(),
                placeholder: String::new(),
                value: config.watched_entity_id,
            },
            SettingDescriptor {
                key: SettingKey::ApiHost,
                title: "ws host url".to_string(),
                description: "eufy-security-ws url".to_string(),
                placeholder: "ws://127.0.0.1:3000".to_string(),
                value: config.server_endpoint,
            },
        ]
    }

    /// Set a setting by its wire key.
    ///
    /// # Errors
    /// Returns [`ConfigError::UnknownSetting`] if the key is not recognized.
    pub fn put_setting(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let key: SettingKey = key.parse()?;
        let value = value.trim().to_string();
        tracing::debug!(%key, %value, "setting updated");
        self.update(|config| match key {
            SettingKey::SerialNumber => config.watched_entity_id = value,
            SettingKey::ApiHost => config.server_endpoint = value,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_endpoint() {
        let config = SessionConfig::new("", "T8210N0123");
        assert_eq!(config.validate(), Err(ConfigError::MissingEndpoint));

        // Only an empty endpoint is rejected here; a blank one fails at connect.
        let config = SessionConfig::new("   ", "T8210N0123");
        assert!(config.validate().is_ok());

        let config = SessionConfig::new("ws://host:3000", "");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_put_setting_updates_shared_handle() {
        let handle = ConfigHandle::default();
        let other = handle.clone();

        handle.put_setting("apiHost", " ws://127.0.0.1:3000 ").unwrap();
        handle.put_setting("sn", "T8210N0123").unwrap();

        assert_eq!(
            other.snapshot(),
            SessionConfig::new("ws://127.0.0.1:3000", "T8210N0123")
        );
    }

    #[test]
    fn test_put_unknown_setting() {
        let handle = ConfigHandle::default();
        let err = handle.put_setting("password", "hunter2").unwrap_err();
        assert_eq!(err, ConfigError::UnknownSetting("password".to_string()));
        assert_eq!(handle.snapshot(), SessionConfig::default());
    }

    #[test]
    fn test_settings_report_current_values() {
        let handle = ConfigHandle::new(SessionConfig::new("ws://host:3000", "T8210N0123"));
        let settings = handle.settings();

        assert_eq!(settings.len(), 2);
        assert_eq!(settings[0].key, SettingKey::SerialNumber);
        assert_eq!(settings[0].value, "T8210N0123");
        assert_eq!(settings[1].key, SettingKey::ApiHost);
        assert_eq!(settings[1].value, "ws://host:3000");
        assert_eq!(settings[1].placeholder, "ws://127.0.0.1:3000");
    }

    #[test]
    fn test_config_serialization() {
        let config = SessionConfig::new("ws://host:3000", "T8210N0123");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("serverEndpoint"));
        assert!(json.contains("watchedEntityId"));

        let key = serde_json::to_string(&SettingKey::ApiHost).unwrap();
        assert_eq!(key, "\"apiHost\"");
    }
}
