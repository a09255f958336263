//! Mailbox connection settings and their admin-facing update/masking rules.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::schema::MailboxSeed;
use crate::error::{ConfigError, ValidationError};
use crate::sanitize::{mask_secret, PASSWORD_MASK};
use crate::secrets::{resolve_secret, SecretError};

/// Sentinel sent back by admin tooling meaning "keep the stored password".
pub const PASSWORD_UNCHANGED: &str = PASSWORD_MASK;

const DEFAULT_FOLDER: &str = "INBOX";

/// Mailbox connection and processing settings.
#[derive(Debug)]
pub struct MailboxConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub use_tls: bool,
    pub folder: String,
    pub sender_filter: Option<String>,
    pub subject_filter: Option<String>,
    pub auto_approve: bool,
    pub mark_as_read: bool,
}

impl Clone for MailboxConfig {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
            port: self.port,
            username: self.username.clone(),
            password: SecretString::from(self.password.expose_secret().to_string()),
            use_tls: self.use_tls,
            folder: self.folder.clone(),
            sender_filter: self.sender_filter.clone(),
            subject_filter: self.subject_filter.clone(),
            auto_approve: self.auto_approve,
            mark_as_read: self.mark_as_read,
        }
    }
}

impl MailboxConfig {
    /// Builds the config from the settings file seed, resolving the password
    /// from its direct/file/env source. A seed without any password source
    /// yields an empty password.
    pub fn from_seed(seed: &MailboxSeed) -> Result<Self, ConfigError> {
        let password = match resolve_secret(
            seed.password.as_deref(),
            seed.password_file.as_deref(),
            seed.password_env_var.as_deref(),
        ) {
            Ok(secret) => secret,
            Err(SecretError::NoSourceProvided) => SecretString::from(String::new()),
            Err(e) => return Err(ConfigError::Secret(e)),
        };

        Ok(Self {
            server: seed.server.trim().to_string(),
            port: seed.port,
            username: seed.username.trim().to_string(),
            password,
            use_tls: seed.use_tls,
            folder: seed.folder.clone(),
            sender_filter: normalize_filter(seed.sender_filter.as_deref()),
            subject_filter: normalize_filter(seed.subject_filter.as_deref()),
            auto_approve: seed.auto_approve,
            mark_as_read: seed.mark_as_read,
        })
    }

    /// Merges a partial update into `current` (if any) and validates the result.
    ///
    /// Only fields present in `update` change. The password is kept when the
    /// update omits it or sends [`PASSWORD_UNCHANGED`].
    pub fn merge(
        current: Option<&MailboxConfig>,
        update: &MailboxConfigUpdate,
    ) -> Result<MailboxConfig, ValidationError> {
        let port = match update.imap_port {
            Some(port) => u16::try_from(port)
                .ok()
                .filter(|p| *p > 0)
                .ok_or(ValidationError::PortOutOfRange(port))?,
            None => current.map(|c| c.port).unwrap_or(993),
        };

        let server = required_field(
            update.imap_server.as_deref(),
            current.map(|c| c.server.as_str()),
            "imap_server",
        )?;
        let username = required_field(
            update.imap_username.as_deref(),
            current.map(|c| c.username.as_str()),
            "imap_username",
        )?;

        let folder = match update.imap_folder.as_deref().map(str::trim) {
            Some("") => return Err(ValidationError::EmptyField("imap_folder")),
            Some(folder) => folder.to_string(),
            None => current
                .map(|c| c.folder.clone())
                .unwrap_or_else(|| DEFAULT_FOLDER.to_string()),
        };

        let password = match update.imap_password.as_deref() {
            Some(p) if p != PASSWORD_UNCHANGED => SecretString::from(p.to_string()),
            _ => current
                .map(|c| SecretString::from(c.password.expose_secret().to_string()))
                .unwrap_or_else(|| SecretString::from(String::new())),
        };

        let sender_filter = match &update.sender_filter {
            Some(value) => normalize_filter(Some(value)),
            None => current.and_then(|c| c.sender_filter.clone()),
        };
        let subject_filter = match &update.subject_filter {
            Some(value) => normalize_filter(Some(value)),
            None => current.and_then(|c| c.subject_filter.clone()),
        };

        Ok(MailboxConfig {
            server,
            port,
            username,
            password,
            use_tls: update
                .imap_ssl
                .unwrap_or_else(|| current.map(|c| c.use_tls).unwrap_or(true)),
            folder,
            sender_filter,
            subject_filter,
            auto_approve: update
                .auto_approve
                .unwrap_or_else(|| current.map(|c| c.auto_approve).unwrap_or(false)),
            mark_as_read: update
                .mark_as_read
                .unwrap_or_else(|| current.map(|c| c.mark_as_read).unwrap_or(true)),
        })
    }

    /// The admin-facing view with the password replaced by a mask.
    pub fn masked(&self) -> MaskedMailboxConfig {
        MaskedMailboxConfig {
            imap_server: self.server.clone(),
            imap_port: self.port,
            imap_username: self.username.clone(),
            imap_password: mask_secret(self.password.expose_secret()),
            imap_ssl: self.use_tls,
            imap_folder: self.folder.clone(),
            sender_filter: self.sender_filter.clone().unwrap_or_default(),
            subject_filter: self.subject_filter.clone().unwrap_or_default(),
            auto_approve: self.auto_approve,
            mark_as_read: self.mark_as_read,
        }
    }
}

fn required_field(
    update: Option<&str>,
    current: Option<&str>,
    name: &'static str,
) -> Result<String, ValidationError> {
    match (update.map(str::trim), current) {
        (Some(""), _) => Err(ValidationError::EmptyField(name)),
        (Some(value), _) => Ok(value.to_string()),
        (None, Some(value)) => Ok(value.to_string()),
        (None, None) => Err(ValidationError::MissingField(name)),
    }
}

fn normalize_filter(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Partial mailbox configuration update, using the admin form's field names.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct MailboxConfigUpdate {
    #[serde(default)]
    pub imap_server: Option<String>,
    #[serde(default)]
    pub imap_port: Option<i64>,
    #[serde(default)]
    pub imap_username: Option<String>,
    #[serde(default)]
    pub imap_password: Option<String>,
    #[serde(default)]
    pub imap_ssl: Option<bool>,
    #[serde(default)]
    pub imap_folder: Option<String>,
    /// An empty string clears the filter.
    #[serde(default)]
    pub sender_filter: Option<String>,
    /// An empty string clears the filter.
    #[serde(default)]
    pub subject_filter: Option<String>,
    #[serde(default)]
    pub auto_approve: Option<bool>,
    #[serde(default)]
    pub mark_as_read: Option<bool>,
}

impl std::fmt::Debug for MailboxConfigUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxConfigUpdate")
            .field("imap_server", &self.imap_server)
            .field("imap_port", &self.imap_port)
            .field("imap_username", &self.imap_username)
            .field(
                "imap_password",
                &self.imap_password.as_deref().map(mask_secret),
            )
            .field("imap_ssl", &self.imap_ssl)
            .field("imap_folder", &self.imap_folder)
            .field("sender_filter", &self.sender_filter)
            .field("subject_filter", &self.subject_filter)
            .field("auto_approve", &self.auto_approve)
            .field("mark_as_read", &self.mark_as_read)
            .finish()
    }
}

/// Mailbox configuration as returned to admin tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedMailboxConfig {
    pub imap_server: String,
    pub imap_port: u16,
    pub imap_username: String,
    /// `"********"` when a password is stored, empty otherwise.
    pub imap_password: String,
    pub imap_ssl: bool,
    pub imap_folder: String,
    pub sender_filter: String,
    pub subject_filter: String,
    pub auto_approve: bool,
    pub mark_as_read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> MailboxConfig {
        MailboxConfig {
            server: "imap.example.com".to_string(),
            port: 993,
            username: "events@example.com".to_string(),
            password: SecretString::from("hunter2"),
            use_tls: true,
            folder: "INBOX".to_string(),
            sender_filter: Some("facebookmail.com".to_string()),
            subject_filter: None,
            auto_approve: false,
            mark_as_read: true,
        }
    }

    #[test]
    fn test_masked_hides_password() {
        let masked = stored().masked();
        assert_eq!(masked.imap_password, "********");
        assert_eq!(masked.sender_filter, "facebookmail.com");
        assert_eq!(masked.subject_filter, "");

        let json = serde_json::to_string(&masked).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_masked_empty_password_stays_empty() {
        let mut config = stored();
        config.password = SecretString::from("");
        assert_eq!(config.masked().imap_password, "");
    }

    #[test]
    fn test_debug_never_prints_password() {
        let rendered = format!("{:?}", stored());
        assert!(!rendered.contains("hunter2"));

        let update = MailboxConfigUpdate {
            imap_password: Some("s3cret".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", update).contains("s3cret"));
    }

    #[test]
    fn test_merge_partial_update() {
        let update = MailboxConfigUpdate {
            imap_port: Some(143),
            auto_approve: Some(true),
            ..Default::default()
        };
        let merged = MailboxConfig::merge(Some(&stored()), &update).unwrap();
        assert_eq!(merged.port, 143);
        assert!(merged.auto_approve);
        assert_eq!(merged.server, "imap.example.com");
        assert_eq!(merged.sender_filter.as_deref(), Some("facebookmail.com"));
        assert_eq!(merged.password.expose_secret(), "hunter2");
    }

    #[test]
    fn test_merge_password_sentinel_keeps_password() {
        let update = MailboxConfigUpdate {
            imap_password: Some(PASSWORD_UNCHANGED.to_string()),
            ..Default::default()
        };
        let merged = MailboxConfig::merge(Some(&stored()), &update).unwrap();
        assert_eq!(merged.password.expose_secret(), "hunter2");

        let update = MailboxConfigUpdate {
            imap_password: Some("new-pass".to_string()),
            ..Default::default()
        };
        let merged = MailboxConfig::merge(Some(&stored()), &update).unwrap();
        assert_eq!(merged.password.expose_secret(), "new-pass");
    }

    #[test]
    fn test_merge_rejects_bad_port() {
        for port in [0, -1, 65536, 70000] {
            let update = MailboxConfigUpdate {
                imap_port: Some(port),
                ..Default::default()
            };
            assert_eq!(
                MailboxConfig::merge(Some(&stored()), &update).unwrap_err(),
                ValidationError::PortOutOfRange(port)
            );
        }
    }

    #[test]
    fn test_merge_rejects_empty_server_and_username() {
        let update = MailboxConfigUpdate {
            imap_server: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            MailboxConfig::merge(Some(&stored()), &update).unwrap_err(),
            ValidationError::EmptyField("imap_server")
        );

        let update = MailboxConfigUpdate {
            imap_username: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            MailboxConfig::merge(Some(&stored()), &update).unwrap_err(),
            ValidationError::EmptyField("imap_username")
        );
    }

    #[test]
    fn test_merge_without_stored_config_needs_server() {
        assert_eq!(
            MailboxConfig::merge(None, &MailboxConfigUpdate::default()).unwrap_err(),
            ValidationError::MissingField("imap_server")
        );

        let update = MailboxConfigUpdate {
            imap_server: Some("imap.example.com".to_string()),
            imap_username: Some("events".to_string()),
            ..Default::default()
        };
        let merged = MailboxConfig::merge(None, &update).unwrap();
        assert_eq!(merged.port, 993);
        assert_eq!(merged.folder, "INBOX");
        assert!(merged.use_tls);
        assert!(merged.mark_as_read);
        assert!(!merged.auto_approve);
    }

    #[test]
    fn test_merge_empty_filter_clears() {
        let update = MailboxConfigUpdate {
            sender_filter: Some(String::new()),
            subject_filter: Some(" invited you ".to_string()),
            ..Default::default()
        };
        let merged = MailboxConfig::merge(Some(&stored()), &update).unwrap();
        assert_eq!(merged.sender_filter, None);
        assert_eq!(merged.subject_filter.as_deref(), Some("invited you"));
    }

    #[test]
    fn test_update_deserializes_admin_form() {
        let update: MailboxConfigUpdate =
            serde_json::from_str(r#"{ "imap_port": 70000, "imap_ssl": false }"#).unwrap();
        assert_eq!(update.imap_port, Some(70000));
        assert_eq!(update.imap_ssl, Some(false));
        assert!(update.imap_server.is_none());
    }

    #[test]
    fn test_from_seed_with_direct_password() {
        let seed: MailboxSeed = serde_json::from_str(
            r#"{ "server": " imap.example.com ", "username": "events", "password": "pw", "sender_filter": "" }"#,
        )
        .unwrap();
        let config = MailboxConfig::from_seed(&seed).unwrap();
        assert_eq!(config.server, "imap.example.com");
        assert_eq!(config.password.expose_secret(), "pw");
        assert_eq!(config.sender_filter, None);
    }

    #[test]
    fn test_from_seed_without_password_source() {
        let seed: MailboxSeed =
            serde_json::from_str(r#"{ "server": "imap.example.com", "username": "events" }"#)
                .unwrap();
        let config = MailboxConfig::from_seed(&seed).unwrap();
        assert_eq!(config.password.expose_secret(), "");
    }
}
