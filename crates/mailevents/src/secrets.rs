//! Mailbox password handling.
//!
//! Two concerns live here:
//!
//! 1. **Resolution** - the bootstrap mailbox password can be given directly,
//!    as a file (Docker secrets), or as an environment variable name.
//! 2. **At-rest protection** - the password persisted in the config store is
//!    sealed with AES-256-GCM when `MAILEVENTS_SECRET_KEY` is configured.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use secrecy::{ExposeSecret, SecretString};
use std::fs;

/// Error type for secret resolution and sealing failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    /// A sealed value was found but no key is configured to open it.
    #[error("Stored password is encrypted but {0} is not set")]
    KeyMissing(&'static str),
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from the first non-empty source, in priority order:
/// direct value, file contents, environment variable.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        return match fs::read_to_string(&expanded) {
            Ok(content) => Ok(SecretString::from(content.trim().to_string())),
            Err(e) => Err(SecretError::FileReadError {
                path: expanded,
                source: e,
            }),
        };
    }

    if let Some(var_name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(var_name) {
            // Trailing newlines are common in env files.
            Ok(value) => Ok(SecretString::from(value.trim())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: var_name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: var_name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Expands a leading `~` to the user's home directory. `~user/...` is not supported.
pub(crate) fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// Environment variable holding the 64-hex-char password sealing key.
pub const SECRET_KEY_ENV_VAR: &str = "MAILEVENTS_SECRET_KEY";

/// Prefix marking a stored value as sealed by [`PasswordCipher`].
const SEALED_PREFIX: &str = "enc:v1:";

/// Nonce size for AES-256-GCM (96 bits).
const NONCE_SIZE: usize = 12;

/// Seals and opens the stored mailbox password with AES-256-GCM.
pub struct PasswordCipher {
    cipher: Aes256Gcm,
}

impl PasswordCipher {
    /// Builds a cipher from `MAILEVENTS_SECRET_KEY`, or `Ok(None)` when unset.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(SECRET_KEY_ENV_VAR) {
            Ok(key_hex) => Self::from_hex_key(key_hex.trim()).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Builds a cipher from a 64-character hex key.
    pub fn from_hex_key(key_hex: &str) -> Result<Self> {
        let key_bytes = hex_decode(key_hex)
            .map_err(|e| SecretError::InvalidKey(format!("Invalid hex key: {}", e)))?;

        if key_bytes.len() != 32 {
            return Err(SecretError::InvalidKey(format!(
                "Key must be 32 bytes (64 hex chars), got {} bytes",
                key_bytes.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| SecretError::InvalidKey(format!("Failed to create cipher: {}", e)))?;

        Ok(Self { cipher })
    }

    /// Seals a password into `enc:v1:<hex(nonce || ciphertext)>`.
    pub fn seal(&self, password: &SecretString) -> Result<String> {
        let nonce_bytes = rand_bytes::<NONCE_SIZE>()?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, password.expose_secret().as_bytes())
            .map_err(|e| SecretError::EncryptionError(e.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);

        Ok(format!("{}{}", SEALED_PREFIX, hex_encode(&combined)))
    }

    /// Opens a value produced by [`PasswordCipher::seal`].
    pub fn open(&self, stored: &str) -> Result<SecretString> {
        let hex = stored
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| SecretError::DecryptionError("Value is not sealed".to_string()))?;
        let combined = hex_decode(hex)
            .map_err(|e| SecretError::DecryptionError(format!("Invalid hex: {}", e)))?;

        if combined.len() < NONCE_SIZE {
            return Err(SecretError::DecryptionError(
                "Ciphertext too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| SecretError::DecryptionError(e.to_string()))?;

        String::from_utf8(plaintext)
            .map(SecretString::from)
            .map_err(|e| SecretError::DecryptionError(format!("Invalid UTF-8: {}", e)))
    }
}

/// Returns true when a stored password value was sealed.
pub fn is_sealed(stored: &str) -> bool {
    stored.starts_with(SEALED_PREFIX)
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";
    let mut result = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        result.push(HEX_CHARS[(byte >> 4) as usize] as char);
        result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
    }
    result
}

fn hex_decode(hex: &str) -> std::result::Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err("Hex string must have even length".to_string());
    }
    if !hex.is_ascii() {
        return Err("Hex string must be ASCII".to_string());
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| format!("Invalid hex at position {}: {}", i, e))
        })
        .collect()
}

fn rand_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::fill(&mut bytes).map_err(|e| {
        SecretError::EncryptionError(format!("Failed to generate random bytes: {}", e))
    })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    #[serial]
    fn test_direct_value_takes_priority() {
        std::env::set_var("MAILEVENTS_TEST_PW_1", "env_value");
        let result =
            resolve_secret(Some("direct_value"), None, Some("MAILEVENTS_TEST_PW_1")).unwrap();
        assert_eq!(result.expose_secret(), "direct_value");
        std::env::remove_var("MAILEVENTS_TEST_PW_1");
    }

    #[test]
    #[serial]
    fn test_file_takes_priority_over_env() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "  file_value  ").unwrap();

        std::env::set_var("MAILEVENTS_TEST_PW_2", "env_value");
        let result = resolve_secret(
            None,
            Some(temp_file.path().to_str().unwrap()),
            Some("MAILEVENTS_TEST_PW_2"),
        )
        .unwrap();
        assert_eq!(result.expose_secret(), "file_value");
        std::env::remove_var("MAILEVENTS_TEST_PW_2");
    }

    #[test]
    #[serial]
    fn test_env_var_fallback_skips_empty_sources() {
        std::env::set_var("MAILEVENTS_TEST_PW_3", "env_value\n");
        let result = resolve_secret(Some(""), Some(""), Some("MAILEVENTS_TEST_PW_3")).unwrap();
        assert_eq!(result.expose_secret(), "env_value");
        std::env::remove_var("MAILEVENTS_TEST_PW_3");
    }

    #[test]
    fn test_resolution_errors() {
        assert!(matches!(
            resolve_secret(None, None, None),
            Err(SecretError::NoSourceProvided)
        ));
        assert!(matches!(
            resolve_secret(None, Some("/nonexistent/path/to/secret"), None),
            Err(SecretError::FileReadError { .. })
        ));
        assert!(matches!(
            resolve_secret(None, None, Some("MAILEVENTS_DEFINITELY_NOT_SET")),
            Err(SecretError::EnvVarNotSet { .. })
        ));
    }

    #[test]
    fn test_expand_home_leaves_other_paths() {
        assert_eq!(expand_home("/absolute/path"), "/absolute/path");
        assert_eq!(expand_home("relative/~/path"), "relative/~/path");
    }

    #[test]
    fn test_seal_and_open() {
        let cipher = PasswordCipher::from_hex_key(TEST_KEY).unwrap();
        let sealed = cipher.seal(&SecretString::from("imap-pass")).unwrap();

        assert!(is_sealed(&sealed));
        assert!(!sealed.contains("imap-pass"));
        assert_eq!(cipher.open(&sealed).unwrap().expose_secret(), "imap-pass");
    }

    #[test]
    fn test_seal_uses_fresh_nonce() {
        let cipher = PasswordCipher::from_hex_key(TEST_KEY).unwrap();
        let password = SecretString::from("same");
        assert_ne!(
            cipher.seal(&password).unwrap(),
            cipher.seal(&password).unwrap()
        );
    }

    #[test]
    fn test_open_rejects_tampering_and_garbage() {
        let cipher = PasswordCipher::from_hex_key(TEST_KEY).unwrap();
        assert!(matches!(
            cipher.open("plain-password"),
            Err(SecretError::DecryptionError(_))
        ));
        assert!(matches!(
            cipher.open("enc:v1:aabb"),
            Err(SecretError::DecryptionError(_))
        ));

        let sealed = cipher.seal(&SecretString::from("x")).unwrap();
        let mut tampered = sealed.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert!(matches!(
            cipher.open(&tampered),
            Err(SecretError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(
            PasswordCipher::from_hex_key("0123456789abcdef"),
            Err(SecretError::InvalidKey(_))
        ));
        assert!(matches!(
            PasswordCipher::from_hex_key("zz23456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"),
            Err(SecretError::InvalidKey(_))
        ));
    }

    #[test]
    #[serial]
    fn test_from_env_unset_is_none() {
        std::env::remove_var(SECRET_KEY_ENV_VAR);
        assert!(PasswordCipher::from_env().unwrap().is_none());
    }

    #[test]
    fn test_hex_roundtrip() {
        let original = vec![0x00, 0xff, 0x12, 0xab];
        assert_eq!(hex_encode(&original), "00ff12ab");
        assert_eq!(hex_decode("00ff12ab").unwrap(), original);
        assert!(hex_decode("abc").is_err());
    }
}
