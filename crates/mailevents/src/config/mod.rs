pub mod loader;
pub mod mailbox;
pub mod schema;
pub mod store;

pub use loader::{load_settings, load_settings_from_str, settings_path_from_env, CONFIG_ENV_VAR};
pub use mailbox::{MailboxConfig, MailboxConfigUpdate, MaskedMailboxConfig, PASSWORD_UNCHANGED};
pub use schema::{default_date_formats, LogFormat, MailboxSeed, Settings};
pub use store::{seed_if_empty, ConfigStore, SqliteConfigStore};
