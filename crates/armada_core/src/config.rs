//! Orchestrator configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Placeholder replaced by the environment name in parameter file names.
pub const ENV_NAME_PLACEHOLDER: &str = "@envName";

/// Location of the optional project-level configuration file.
pub const CONFIG_FILE: &str = ".armada/orchestrator.yaml";

/// Paths and tunables for the template orchestrator.
///
/// All paths are relative to the project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Directory holding `main.bicep`, stage roots and module folders.
    pub template_dir: PathBuf,
    /// Directory receiving timestamped snapshots of previous output.
    pub backup_dir: PathBuf,
    /// Directory holding per-environment parameter files.
    pub parameter_dir: PathBuf,
    /// Parameter file name, containing `@envName`.
    pub parameter_file_template: String,
    /// Seconds between deployment progress polls.
    pub poll_interval_secs: u64,
    /// Template compiler executable.
    pub compiler_command: String,
    /// Plugin id under which solution-level values live in runtime state.
    pub solution_state_key: String,
    /// Key under which deployment outputs are stored.
    pub output_state_key: String,
    /// Prefix for generated deployment names.
    pub deployment_name_prefix: String,
    /// Output fields naming the plugin that owns the rest of an output object.
    pub plugin_id_keys: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("templates/azure"),
            backup_dir: PathBuf::from("templates/backup"),
            parameter_dir: PathBuf::from(".fx/configs"),
            parameter_file_template: format!("azure.parameters.{}.json", ENV_NAME_PLACEHOLDER),
            poll_interval_secs: 10,
            compiler_command: "bicep".to_string(),
            solution_state_key: "solution".to_string(),
            output_state_key: "armTemplateOutput".to_string(),
            deployment_name_prefix: "armada".to_string(),
            plugin_id_keys: vec!["pluginId".to_string(), "teamsFxPluginId".to_string()],
        }
    }
}

impl OrchestratorConfig {
    /// Load `.armada/orchestrator.yaml` from the project root, or defaults when absent.
    pub fn load(project_root: &Path) -> CoreResult<Self> {
        let path = project_root.join(CONFIG_FILE);
        if !path.exists() {
            debug!("No orchestrator config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: OrchestratorConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_file(&self, path: &Path) -> CoreResult<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !self.parameter_file_template.contains(ENV_NAME_PLACEHOLDER) {
            return Err(CoreError::InvalidConfig(format!(
                "parameterFileTemplate must contain {}",
                ENV_NAME_PLACEHOLDER
            )));
        }
        if self.plugin_id_keys.iter().any(|key| key.is_empty()) {
            return Err(CoreError::InvalidConfig(
                "pluginIdKeys must not contain empty keys".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "pollIntervalSecs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = dir.into();
        self
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn with_parameter_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.parameter_dir = dir.into();
        self
    }

    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_compiler(mut self, command: impl Into<String>) -> Self {
        self.compiler_command = command.into();
        self
    }

    pub fn with_plugin_id_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plugin_id_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Parameter file name for an environment.
    pub fn parameter_file_name(&self, env: &str) -> String {
        self.parameter_file_template.replace(ENV_NAME_PLACEHOLDER, env)
    }

    /// Glob pattern matching every environment's parameter file.
    pub fn parameter_file_glob(&self) -> String {
        self.parameter_file_template.replace(ENV_NAME_PLACEHOLDER, "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parameter_file_name() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.parameter_file_name("dev"), "azure.parameters.dev.json");
        assert_eq!(config.parameter_file_glob(), "azure.parameters.*.json");
    }

    #[test]
    fn test_load_defaults_without_file() {
        let dir = tempdir().unwrap();
        let config = OrchestratorConfig::load(dir.path()).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_load_partial_yaml() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".armada")).unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "templateDir: infra/arm\npollIntervalSecs: 3\n",
        )
        .unwrap();

        let config = OrchestratorConfig::load(dir.path()).unwrap();
        assert_eq!(config.template_dir, PathBuf::from("infra/arm"));
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.compiler_command, "bicep");
    }

    #[test]
    fn test_plugin_id_keys_from_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orchestrator.yaml");
        fs::write(&path, "pluginIdKeys: [ownerPlugin]\n").unwrap();

        let config = OrchestratorConfig::from_file(&path).unwrap();
        assert_eq!(config.plugin_id_keys, vec!["ownerPlugin"]);
        assert_eq!(
            OrchestratorConfig::default().plugin_id_keys,
            vec!["pluginId", "teamsFxPluginId"]
        );

        fs::write(&path, "pluginIdKeys: ['']\n").unwrap();
        assert!(matches!(
            OrchestratorConfig::from_file(&path),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_template_without_placeholder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orchestrator.yaml");
        fs::write(&path, "parameterFileTemplate: parameters.json\n").unwrap();

        assert!(matches!(
            OrchestratorConfig::from_file(&path),
            Err(CoreError::InvalidConfig(_))
        ));
    }
}
