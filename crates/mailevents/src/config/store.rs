//! Persistence of the mailbox configuration.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::config::mailbox::MailboxConfig;
use crate::config::schema::MailboxSeed;
use crate::db::config_repo::{self, MailboxConfigRow};
use crate::db::Database;
use crate::error::ConfigError;
use crate::secrets::{is_sealed, PasswordCipher, SecretError, SECRET_KEY_ENV_VAR};

/// Persists and retrieves the single mailbox configuration.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Option<MailboxConfig>, ConfigError>;
    fn save(&self, config: &MailboxConfig) -> Result<(), ConfigError>;
}

/// SQLite-backed config store. When a cipher is configured the password is
/// sealed before it is written.
#[derive(Clone)]
pub struct SqliteConfigStore {
    db: Database,
    cipher: Option<Arc<PasswordCipher>>,
}

impl SqliteConfigStore {
    pub fn new(db: Database) -> Self {
        Self { db, cipher: None }
    }

    pub fn with_cipher(db: Database, cipher: PasswordCipher) -> Self {
        Self {
            db,
            cipher: Some(Arc::new(cipher)),
        }
    }

    /// Builds the store, picking up `MAILEVENTS_SECRET_KEY` when set.
    pub fn from_env(db: Database) -> Result<Self, ConfigError> {
        Ok(match PasswordCipher::from_env()? {
            Some(cipher) => Self::with_cipher(db, cipher),
            None => Self::new(db),
        })
    }

    fn open_password(&self, stored: &str) -> Result<SecretString, ConfigError> {
        if !is_sealed(stored) {
            return Ok(SecretString::from(stored.to_string()));
        }
        match &self.cipher {
            Some(cipher) => Ok(cipher.open(stored)?),
            None => Err(SecretError::KeyMissing(SECRET_KEY_ENV_VAR).into()),
        }
    }

    fn seal_password(&self, password: &SecretString) -> Result<String, ConfigError> {
        match &self.cipher {
            Some(cipher) if !password.expose_secret().is_empty() => Ok(cipher.seal(password)?),
            _ => Ok(password.expose_secret().to_string()),
        }
    }
}

impl ConfigStore for SqliteConfigStore {
    fn load(&self) -> Result<Option<MailboxConfig>, ConfigError> {
        let Some(row) = config_repo::find(&self.db)? else {
            return Ok(None);
        };

        Ok(Some(MailboxConfig {
            password: self.open_password(&row.password)?,
            server: row.server,
            port: row.port,
            username: row.username,
            use_tls: row.use_tls,
            folder: row.folder,
            sender_filter: row.sender_filter,
            subject_filter: row.subject_filter,
            auto_approve: row.auto_approve,
            mark_as_read: row.mark_as_read,
        }))
    }

    fn save(&self, config: &MailboxConfig) -> Result<(), ConfigError> {
        let row = MailboxConfigRow {
            server: config.server.clone(),
            port: config.port,
            username: config.username.clone(),
            password: self.seal_password(&config.password)?,
            use_tls: config.use_tls,
            folder: config.folder.clone(),
            sender_filter: config.sender_filter.clone(),
            subject_filter: config.subject_filter.clone(),
            auto_approve: config.auto_approve,
            mark_as_read: config.mark_as_read,
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        config_repo::upsert(&self.db, &row)?;
        Ok(())
    }
}

/// Writes the settings-file mailbox seed when nothing is stored yet.
/// Returns true when the seed was written.
pub fn seed_if_empty(store: &dyn ConfigStore, seed: &MailboxSeed) -> Result<bool, ConfigError> {
    if store.load()?.is_some() {
        return Ok(false);
    }
    let config = MailboxConfig::from_seed(seed)?;
    store.save(&config)?;
    log::info!("Seeded mailbox configuration for {}", config.server);
    Ok(true)
}
