//! Cross-plugin runtime state.
//!
//! Values produced by earlier provisioning steps are stored per plugin and
//! read back by later steps through `state.<plugin>.<key>` placeholders.
//! Secret values are kept as ciphertext and only decrypted on read.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};

/// Prefix marking a state value as ciphertext.
pub const ENCRYPTED_PREFIX: &str = "crypto_";

/// Decrypts secret state values.
///
/// Encryption at rest is owned by the host application; the orchestrator
/// only needs to turn ciphertext back into plain text right before use.
pub trait SecretCipher: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> Result<String, String>;

    fn is_encrypted(&self, value: &str) -> bool {
        value.starts_with(ENCRYPTED_PREFIX)
    }
}

/// Cipher for projects without encrypted state. Values pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCipher;

impl SecretCipher for NoopCipher {
    fn decrypt(&self, ciphertext: &str) -> Result<String, String> {
        Ok(ciphertext.to_string())
    }

    fn is_encrypted(&self, _value: &str) -> bool {
        false
    }
}

/// Accumulated state of all plugins, keyed by plugin id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    #[serde(flatten)]
    plugins: BTreeMap<String, Map<String, Value>>,
    #[serde(skip)]
    secret_keys: BTreeSet<String>,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load state from a JSON file of the form `{ "<plugin>": { "<key>": value } }`.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path)?;
        let state: RuntimeState = serde_json::from_str(&content)?;
        Ok(state)
    }

    /// Save state to a JSON file.
    pub fn to_file(&self, path: &Path) -> CoreResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn set(&mut self, plugin: impl Into<String>, key: impl Into<String>, value: impl Into<Value>) {
        self.plugins
            .entry(plugin.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Store a value and classify it as secret.
    pub fn set_secret(&mut self, plugin: impl Into<String>, key: impl Into<String>, value: impl Into<Value>) {
        let plugin = plugin.into();
        let key = key.into();
        self.secret_keys.insert(format!("{}.{}", plugin, key));
        self.set(plugin, key, value);
    }

    pub fn get(&self, plugin: &str, key: &str) -> Option<&Value> {
        self.plugins.get(plugin).and_then(|config| config.get(key))
    }

    /// All values of one plugin.
    pub fn plugin(&self, plugin: &str) -> Option<&Map<String, Value>> {
        self.plugins.get(plugin)
    }

    pub fn plugins(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(|k| k.as_str())
    }

    /// Whether a key was classified as secret, either explicitly or because it
    /// holds ciphertext.
    pub fn is_secret(&self, plugin: &str, key: &str, cipher: &dyn SecretCipher) -> bool {
        if self.secret_keys.contains(&format!("{}.{}", plugin, key)) {
            return true;
        }
        matches!(self.get(plugin, key), Some(Value::String(s)) if cipher.is_encrypted(s))
    }

    /// Read a value as text for substitution, decrypting ciphertext.
    ///
    /// Strings are returned as-is; other JSON values are rendered as JSON.
    pub fn read_text(&self, plugin: &str, key: &str, cipher: &dyn SecretCipher) -> CoreResult<Option<String>> {
        let value = match self.get(plugin, key) {
            Some(Value::Null) | None => return Ok(None),
            Some(value) => value,
        };

        match value {
            Value::String(s) if cipher.is_encrypted(s) => {
                cipher
                    .decrypt(s)
                    .map(Some)
                    .map_err(|message| CoreError::Decryption {
                        plugin: plugin.to_string(),
                        key: key.to_string(),
                        message,
                    })
            }
            Value::String(s) => Ok(Some(s.clone())),
            other => Ok(Some(other.to_string())),
        }
    }
}
