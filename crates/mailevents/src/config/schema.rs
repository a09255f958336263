use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process settings, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_imap_timeout")]
    pub imap_timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub unseen_only: bool,
    #[serde(default = "default_date_formats")]
    pub date_formats: Vec<String>,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub mailbox: Option<MailboxSeed>,
}

fn default_poll_interval() -> u64 {
    900
}

fn default_imap_timeout() -> u64 {
    30
}

fn default_batch_size() -> usize {
    50
}

fn default_true() -> bool {
    true
}

/// Accepted chrono formats, tried in order against each normalized date token.
pub fn default_date_formats() -> Vec<String> {
    vec![
        "%A, %B %d, %Y %I:%M %p".to_string(),
        "%B %d, %Y %I:%M %p".to_string(),
        "%Y-%m-%d %H:%M:%S".to_string(),
        "%Y-%m-%d %H:%M".to_string(),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            poll_interval_secs: default_poll_interval(),
            imap_timeout_secs: default_imap_timeout(),
            batch_size: default_batch_size(),
            unseen_only: true,
            date_formats: default_date_formats(),
            log_format: LogFormat::default(),
            mailbox: None,
        }
    }
}

impl Settings {
    /// The configured database path with `~` expanded, or the default location.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        match self.database_path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => Some(PathBuf::from(crate::secrets::expand_home(path))),
            None => crate::db::default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Mailbox settings used to seed the config store on first start.
#[derive(Clone, Serialize, Deserialize)]
pub struct MailboxSeed {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_file: Option<String>,
    #[serde(default)]
    pub password_env_var: Option<String>,
    #[serde(default = "default_true")]
    pub use_tls: bool,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default)]
    pub sender_filter: Option<String>,
    #[serde(default)]
    pub subject_filter: Option<String>,
    #[serde(default)]
    pub auto_approve: bool,
    #[serde(default = "default_true")]
    pub mark_as_read: bool,
}

fn default_port() -> u16 {
    993
}

fn default_folder() -> String {
    "INBOX".to_string()
}

impl std::fmt::Debug for MailboxSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxSeed")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("password_file", &self.password_file)
            .field("password_env_var", &self.password_env_var)
            .field("use_tls", &self.use_tls)
            .field("folder", &self.folder)
            .field("sender_filter", &self.sender_filter)
            .field("subject_filter", &self.subject_filter)
            .field("auto_approve", &self.auto_approve)
            .field("mark_as_read", &self.mark_as_read)
            .finish()
    }
}
