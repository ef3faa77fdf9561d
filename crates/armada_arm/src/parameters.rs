//! Deployment parameter files.
//!
//! Parameter files are generated from plugin defaults, merged with whatever
//! the project already has on disk, and resolved in memory right before
//! submission. Two placeholder kinds are recognised inside string values:
//!
//! - `{{state.<plugin>.<key>}}` reads runtime state produced by a plugin
//! - `{{<NAME>}}` reads the process environment

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use armada_core::{RuntimeState, SecretCipher};

use crate::error::{ArmResult, ParameterError};

pub const PARAMETER_SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2019-04-01/deploymentParameters.json#";
pub const CONTENT_VERSION: &str = "1.0.0.0";

/// Parameter shared by every module.
pub const PROVISION_PARAMETERS: &str = "provisionParameters";
pub const RESOURCE_BASE_NAME: &str = "resourceBaseName";

const STATE_PREFIX: &str = "state.";
const MASK: &str = "******";

fn placeholder_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").ok())
        .as_ref()
}

/// A deployment parameter document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterFile {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(rename = "contentVersion")]
    pub content_version: String,
    /// Parameter name to `{ "value": ... }`.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Default for ParameterFile {
    fn default() -> Self {
        Self {
            schema: PARAMETER_SCHEMA.to_string(),
            content_version: CONTENT_VERSION.to_string(),
            parameters: Map::new(),
        }
    }
}

impl ParameterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the generated defaults document.
    ///
    /// Every plugin default lands in the shared `provisionParameters` object,
    /// after `resourceBaseName`. The first plugin declaring a name wins.
    pub fn from_defaults<'a>(
        resource_base_name: &str,
        defaults: impl IntoIterator<Item = (&'a str, &'a Map<String, Value>)>,
    ) -> Self {
        let mut shared = Map::new();
        shared.insert(RESOURCE_BASE_NAME.to_string(), Value::from(resource_base_name));

        for (plugin, parameters) in defaults {
            for (name, value) in parameters {
                if shared.contains_key(name) {
                    warn!("Parameter {} from {} is already declared, keeping the first value", name, plugin);
                    continue;
                }
                shared.insert(name.clone(), value.clone());
            }
        }

        let mut file = Self::new();
        file.set(PROVISION_PARAMETERS, Value::Object(shared));
        file
    }

    /// Load a parameter file.
    pub fn load(path: &Path) -> ArmResult<Self> {
        if !path.exists() {
            return Err(ParameterError::MissingParameterFile(path.to_path_buf()).into());
        }
        let content = fs::read_to_string(path)?;
        let file: ParameterFile =
            serde_json::from_str(&content).map_err(|e| ParameterError::InvalidParameterFile {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(file)
    }

    /// Write the file as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> ArmResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let mut entry = Map::new();
        entry.insert("value".to_string(), value);
        self.parameters.insert(name.into(), Value::Object(entry));
    }

    /// The `value` of a parameter.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name).and_then(|entry| entry.get("value"))
    }

    /// Merge generated defaults under this (existing) file.
    ///
    /// Existing values win. Keys only present in `defaults` are appended.
    /// Object-valued parameters are merged one level down, key by key.
    pub fn merge_defaults(mut self, defaults: &ParameterFile) -> Self {
        for (name, default_entry) in &defaults.parameters {
            if !self.parameters.contains_key(name) {
                self.parameters.insert(name.clone(), default_entry.clone());
                continue;
            }

            let existing_value = self.parameters.get_mut(name).and_then(|entry| entry.get_mut("value"));
            let default_value = default_entry.get("value");
            if let (Some(Value::Object(existing)), Some(Value::Object(default))) = (existing_value, default_value) {
                for (key, value) in default {
                    if !existing.contains_key(key) {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        self
    }
}

/// The parameter payload ready for submission. Never written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParameters {
    parameters: Map<String, Value>,
    secret_paths: BTreeSet<String>,
}

impl ResolvedParameters {
    /// Parameter name to `{ "value": ... }`, as submitted.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.parameters
    }

    /// Paths of string values that received a secret.
    pub fn secret_paths(&self) -> impl Iterator<Item = &str> {
        self.secret_paths.iter().map(|p| p.as_str())
    }

    /// A copy with every secret-bearing value replaced by a mask, for display.
    pub fn masked(&self) -> Map<String, Value> {
        let mut masked = Value::Object(self.parameters.clone());
        for path in &self.secret_paths {
            let pointer = format!("/{}", path.replace('.', "/"));
            if let Some(value) = masked.pointer_mut(&pointer) {
                *value = Value::from(MASK);
            }
        }
        match masked {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves placeholders in parameter files.
#[derive(Clone)]
pub struct ParameterResolver {
    cipher: Arc<dyn SecretCipher>,
    env: EnvLookup,
}

impl ParameterResolver {
    /// Create a resolver reading the process environment.
    pub fn new(cipher: Arc<dyn SecretCipher>) -> Self {
        Self {
            cipher,
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replace the environment lookup.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Resolve every placeholder of `file` in a single left-to-right pass.
    ///
    /// Substituted text is never scanned again. A missing `state.*` value
    /// becomes an empty string; a missing environment variable is an error.
    pub fn resolve(&self, file: &ParameterFile, state: &RuntimeState) -> ArmResult<ResolvedParameters> {
        let mut secret_paths = BTreeSet::new();
        let mut parameters = Map::new();

        for (name, entry) in &file.parameters {
            let resolved = self.resolve_value(entry, name, state, &mut secret_paths)?;
            parameters.insert(name.clone(), resolved);
        }

        debug!("Resolved {} parameter(s)", parameters.len());
        Ok(ResolvedParameters {
            parameters,
            secret_paths,
        })
    }

    fn resolve_value(
        &self,
        value: &Value,
        path: &str,
        state: &RuntimeState,
        secret_paths: &mut BTreeSet<String>,
    ) -> ArmResult<Value> {
        match value {
            Value::String(text) => {
                let (resolved, secret) = self.resolve_text(text, path, state)?;
                if secret {
                    secret_paths.insert(path.to_string());
                }
                Ok(Value::String(resolved))
            }
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.resolve_value(item, &format!("{}.{}", path, i), state, secret_paths))
                .collect::<ArmResult<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut resolved = Map::new();
                for (key, item) in map {
                    let child = self.resolve_value(item, &format!("{}.{}", path, key), state, secret_paths)?;
                    resolved.insert(key.clone(), child);
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_text(&self, text: &str, path: &str, state: &RuntimeState) -> ArmResult<(String, bool)> {
        let mut resolved = String::with_capacity(text.len());
        let mut secret = false;
        let mut last = 0;
        let Some(pattern) = placeholder_pattern() else {
            return Ok((text.to_string(), false));
        };

        for captures in pattern.captures_iter(text) {
            let Some(whole) = captures.get(0) else { continue };
            let token = &captures[1];
            resolved.push_str(&text[last..whole.start()]);

            if let Some(reference) = token.strip_prefix(STATE_PREFIX) {
                let (value, is_secret) = self.read_state(reference, path, state)?;
                secret |= is_secret;
                resolved.push_str(&value);
            } else {
                let value = (self.env)(token).ok_or_else(|| ParameterError::MissingEnvironmentVariable {
                    name: token.to_string(),
                    parameter: path.to_string(),
                })?;
                resolved.push_str(&value);
            }
            last = whole.end();
        }

        resolved.push_str(&text[last..]);
        Ok((resolved, secret))
    }

    fn read_state(&self, reference: &str, path: &str, state: &RuntimeState) -> ArmResult<(String, bool)> {
        let Some((plugin, key)) = reference.rsplit_once('.') else {
            warn!("Malformed state reference state.{} in {}, using empty value", reference, path);
            return Ok((String::new(), false));
        };

        let secret = state.is_secret(plugin, key, self.cipher.as_ref());
        match state.read_text(plugin, key, self.cipher.as_ref())? {
            Some(value) => Ok((value, secret)),
            None => {
                warn!("State value {}.{} referenced by {} is not set, using empty value", plugin, key, path);
                Ok((String::new(), false))
            }
        }
    }
}

impl std::fmt::Debug for ParameterResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterResolver").finish_non_exhaustive()
    }
}

/// Derive the default resource base name from the app and environment names.
///
/// Non-alphanumeric characters are dropped; the app part is capped at 10
/// characters, the environment part at 4, followed by 6 characters of `suffix`.
pub fn resource_base_name(app_name: &str, env_name: &str, suffix: &str) -> String {
    fn normalize(s: &str, max: usize) -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .take(max)
            .collect()
    }

    format!(
        "{}{}{}",
        normalize(app_name, 10),
        normalize(env_name, 4),
        suffix.chars().take(6).collect::<String>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_core::ENCRYPTED_PREFIX;
    use serde_json::json;
    use tempfile::tempdir;

    struct PrefixCipher;

    impl SecretCipher for PrefixCipher {
        fn decrypt(&self, ciphertext: &str) -> Result<String, String> {
            Ok(ciphertext.trim_start_matches(ENCRYPTED_PREFIX).to_string())
        }
    }

    fn resolver() -> ParameterResolver {
        ParameterResolver::new(Arc::new(PrefixCipher)).with_env_lookup(|name| match name {
            "MOCKED_EXPAND_VAR_TEST" => Some("test env value".to_string()),
            "NESTED" => Some("{{MOCKED_EXPAND_VAR_TEST}}".to_string()),
            _ => None,
        })
    }

    fn file_with(parameters: Value) -> ParameterFile {
        ParameterFile {
            parameters: parameters.as_object().cloned().unwrap(),
            ..ParameterFile::default()
        }
    }

    #[test]
    fn test_resource_base_name() {
        assert_eq!(
            resource_base_name("my test app", "default", "00000000-0000"),
            "mytestappdefa000000"
        );
        assert_eq!(resource_base_name("A-Very-Long_App Name", "Prod", "abcdef12"), "averylongaprodabcdef");
    }

    #[test]
    fn test_from_defaults_orders_and_dedupes() {
        let frontend = json!({ "FrontendParameter": "FrontendParameterValue" });
        let auth = json!({ "SimpleAuthParameter": "SimpleAuthParameterValue", "FrontendParameter": "ignored" });

        let file = ParameterFile::from_defaults(
            "mytestappdefa000000",
            vec![
                ("frontend", frontend.as_object().unwrap()),
                ("auth", auth.as_object().unwrap()),
            ],
        );

        let shared = file.value(PROVISION_PARAMETERS).unwrap().as_object().unwrap();
        let keys: Vec<_> = shared.keys().cloned().collect();
        assert_eq!(keys, vec!["resourceBaseName", "FrontendParameter", "SimpleAuthParameter"]);
        assert_eq!(shared["FrontendParameter"], "FrontendParameterValue");
    }

    #[test]
    fn test_merge_keeps_existing_values() {
        let existing = file_with(json!({
            "provisionParameters": { "value": { "resourceBaseName": "handpicked", "sku": "B1" } },
            "extra": { "value": "kept" }
        }));
        let defaults = file_with(json!({
            "provisionParameters": { "value": { "resourceBaseName": "generated", "location": "eastus" } },
            "newParam": { "value": "added" }
        }));

        let merged = existing.merge_defaults(&defaults);
        let shared = merged.value(PROVISION_PARAMETERS).unwrap();
        assert_eq!(shared["resourceBaseName"], "handpicked");
        assert_eq!(shared["sku"], "B1");
        assert_eq!(shared["location"], "eastus");
        assert_eq!(merged.value("extra").unwrap(), "kept");
        assert_eq!(merged.value("newParam").unwrap(), "added");
    }

    #[test]
    fn test_resolve_state_env_and_secret() {
        let mut state = RuntimeState::new();
        state.set("fx-resource-aad-app-for-teams", "clientId", "test_client_id");
        state.set("fx-resource-aad-app-for-teams", "clientSecret", "crypto_test_client_secret");

        let file = file_with(json!({
            "resourceBaseName": { "value": "mytestappdefault" },
            "aadClientId": { "value": "{{state.fx-resource-aad-app-for-teams.clientId}}" },
            "aadClientSecret": { "value": "{{state.fx-resource-aad-app-for-teams.clientSecret}}" },
            "envValue": { "value": "{{MOCKED_EXPAND_VAR_TEST}}" }
        }));

        let resolved = resolver().resolve(&file, &state).unwrap();
        assert_eq!(
            Value::Object(resolved.as_map().clone()),
            json!({
                "resourceBaseName": { "value": "mytestappdefault" },
                "aadClientId": { "value": "test_client_id" },
                "aadClientSecret": { "value": "test_client_secret" },
                "envValue": { "value": "test env value" }
            })
        );
        assert_eq!(resolved.secret_paths().collect::<Vec<_>>(), vec!["aadClientSecret.value"]);
        assert_eq!(resolved.masked()["aadClientSecret"]["value"], MASK);
    }

    #[test]
    fn test_missing_state_resolves_to_empty() {
        let file = file_with(json!({ "botId": { "value": "id={{state.fx-resource-bot.botId}}" } }));
        let resolved = resolver().resolve(&file, &RuntimeState::new()).unwrap();
        assert_eq!(resolved.as_map()["botId"]["value"], "id=");
    }

    #[test]
    fn test_missing_env_fails() {
        let file = file_with(json!({ "region": { "value": "{{UNSET_REGION_VAR}}" } }));
        let err = resolver().resolve(&file, &RuntimeState::new()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ArmError::Parameter(ParameterError::MissingEnvironmentVariable { ref name, .. })
                if name == "UNSET_REGION_VAR"
        ));
    }

    #[test]
    fn test_substitution_is_not_rescanned() {
        let file = file_with(json!({ "shared": { "value": { "nested": "{{NESTED}}-{{MOCKED_EXPAND_VAR_TEST}}" } } }));
        let resolved = resolver().resolve(&file, &RuntimeState::new()).unwrap();
        assert_eq!(
            resolved.as_map()["shared"]["value"]["nested"],
            "{{MOCKED_EXPAND_VAR_TEST}}-test env value"
        );
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("configs").join("azure.parameters.dev.json");

        let mut file = ParameterFile::new();
        file.set("existingFileTest", json!("mocked value"));
        file.save(&path).unwrap();

        let loaded = ParameterFile::load(&path).unwrap();
        assert_eq!(loaded, file);
        assert!(fs::read_to_string(&path).unwrap().starts_with("{\n  \"$schema\""));
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("azure.parameters.dev.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            ParameterFile::load(&path),
            Err(crate::error::ArmError::Parameter(ParameterError::InvalidParameterFile { .. }))
        ));
    }
}
