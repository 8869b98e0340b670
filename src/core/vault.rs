//! Sealed storage for the SSH password.
//!
//! The password is encrypted with ChaCha20-Poly1305 under a random per-user
//! key. The key lives in the login Keychain on macOS and in an owner-only
//! file elsewhere; the sealed file holds `base64(nonce || ciphertext)`.

use std::path::PathBuf;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use super::error::{Error, Result};
use crate::constants;
use crate::logger::{self, LogLevel};
use crate::platform::CommandRunner;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

type Key = [u8; KEY_SIZE];

/// Two-operation secret store used by the controller.
pub trait CredentialVault: Send {
    /// Seals and persists `secret`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VaultWrite`] if the secret is empty or cannot be persisted.
    fn store(&self, secret: &str) -> Result<()>;

    /// Returns the stored secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSecret`] if nothing readable is stored.
    fn read(&self) -> Result<String>;
}

/// Where the vault key is kept.
pub trait KeyStore: Send {
    /// The stored key, if any.
    fn load(&self) -> Option<Key>;

    /// Stores `key`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VaultWrite`] if the key cannot be persisted.
    fn save(&self, key: &Key) -> Result<()>;

    /// Human-readable location, for logs and `info`.
    fn describe(&self) -> String;
}

/// Raw key bytes in a file with mode 0600.
#[cfg_attr(target_os = "macos", allow(dead_code))]
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

#[cfg_attr(target_os = "macos", allow(dead_code))]
impl FileKeyStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> Option<Key> {
        std::fs::read(&self.path).ok()?.try_into().ok()
    }

    fn save(&self, key: &Key) -> Result<()> {
        crate::utils::write_private_file(&self.path, key)
            .map_err(|e| Error::VaultWrite(format!("{}: {e}", self.path.display())))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Base64 key stored as a generic password in the login Keychain.
///
/// Reads go through `security find-generic-password -w`. Writes are fed to
/// `security -i` on stdin so the key never shows up in an argument list.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub struct KeychainKeyStore {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    service: String,
    account: String,
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
impl KeychainKeyStore {
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
            service: constants::KEYCHAIN_SERVICE.to_string(),
            account: constants::KEYCHAIN_ACCOUNT.to_string(),
        }
    }
}

impl KeyStore for KeychainKeyStore {
    fn load(&self) -> Option<Key> {
        let out = self
            .runner
            .run(
                &self.binary,
                &[
                    "find-generic-password",
                    "-s",
                    &self.service,
                    "-a",
                    &self.account,
                    "-w",
                ],
            )
            .ok()?;
        // exit 44: no such item
        if !out.success() {
            return None;
        }
        general_purpose::STANDARD
            .decode(out.output.trim())
            .ok()?
            .try_into()
            .ok()
    }

    fn save(&self, key: &Key) -> Result<()> {
        let command = format!(
            "add-generic-password -U -s {} -a {} -w {}\n",
            self.service,
            self.account,
            general_purpose::STANDARD.encode(key)
        );
        let out = self
            .runner
            .run_with_input(&self.binary, &["-i"], &command)
            .map_err(|e| Error::VaultWrite(format!("{}: {e}", self.binary)))?;

        // `security -i` can exit 0 after a failed command; read it back.
        if !out.success() || self.load().as_ref() != Some(key) {
            return Err(Error::VaultWrite(format!(
                "could not store key in Keychain: {}",
                crate::utils::truncate(out.output.trim(), 200)
            )));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Keychain item {}/{}", self.service, self.account)
    }
}

/// Key store plus sealed secret file.
pub struct FileVault {
    keys: Box<dyn KeyStore>,
    secret_path: PathBuf,
}

impl FileVault {
    pub fn new(keys: Box<dyn KeyStore>, secret_path: PathBuf) -> Self {
        Self { keys, secret_path }
    }

    /// Existing key, or a fresh one saved to the key store.
    fn key_for_store(&self) -> Result<Key> {
        if let Some(key) = self.keys.load() {
            return Ok(key);
        }
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        self.keys.save(&key)?;
        logger::log(
            LogLevel::Info,
            "VAULT",
            format!("Created vault key in {}", self.keys.describe()),
        );
        Ok(key)
    }
}

impl CredentialVault for FileVault {
    fn store(&self, secret: &str) -> Result<()> {
        if secret.is_empty() {
            return Err(Error::VaultWrite("password is empty".to_string()));
        }

        let key = self.key_for_store()?;
        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| Error::VaultWrite(format!("invalid key: {e}")))?;

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), secret.as_bytes())
            .map_err(|e| Error::VaultWrite(format!("encryption failed: {e}")))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        crate::utils::write_private_file(
            &self.secret_path,
            general_purpose::STANDARD.encode(sealed),
        )
        .map_err(|e| Error::VaultWrite(format!("{}: {e}", self.secret_path.display())))?;

        logger::log(LogLevel::Info, "VAULT", "Stored SSH password");
        Ok(())
    }

    fn read(&self) -> Result<String> {
        let (Some(key), Ok(encoded)) = (
            self.keys.load(),
            std::fs::read_to_string(&self.secret_path),
        ) else {
            return Err(Error::MissingSecret);
        };

        let unsealed = general_purpose::STANDARD
            .decode(encoded.trim())
            .ok()
            .filter(|bytes| bytes.len() > NONCE_SIZE)
            .and_then(|bytes| {
                let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
                let cipher = ChaCha20Poly1305::new_from_slice(&key).ok()?;
                cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
            })
            .and_then(|plain| String::from_utf8(plain).ok());

        unsealed.ok_or_else(|| {
            logger::log(
                LogLevel::Warning,
                "VAULT",
                format!(
                    "Stored password at {} could not be decrypted",
                    self.secret_path.display()
                ),
            );
            Error::MissingSecret
        })
    }
}
