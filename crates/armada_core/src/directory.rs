//! Contributors backed by plugin directories.
//!
//! A plugin directory holds a `plugin.yaml` manifest next to the template
//! bodies it references:
//!
//! ```yaml
//! id: fx-resource-frontend-hosting
//! stages: [provision]
//! provision:
//!   modules:
//!     - name: frontendHostingProvision
//!       file: frontendHostingProvision.bicep
//! parameters:
//!   frontendHostingSku: Standard_LRS
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contributor::{
    ContributionContext, Stage, StageContribution, TemplateContribution, TemplateContributor,
    TemplateModule,
};
use crate::error::{CoreError, CoreResult};

/// Manifest file name inside a plugin directory.
pub const MANIFEST_FILE: &str = "plugin.yaml";

/// Module entry in a plugin manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub name: String,
    pub file: PathBuf,
}

/// Stage entry in a plugin manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageEntry {
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    /// File whose content is appended to the stage root.
    #[serde(default)]
    pub orchestration: Option<PathBuf>,
}

/// Parsed `plugin.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub provision: Option<StageEntry>,
    #[serde(default)]
    pub config: Option<StageEntry>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl PluginManifest {
    fn entries(&self) -> BTreeMap<Stage, &StageEntry> {
        let mut entries = BTreeMap::new();
        if let Some(entry) = &self.provision {
            entries.insert(Stage::Provision, entry);
        }
        if let Some(entry) = &self.config {
            entries.insert(Stage::Config, entry);
        }
        entries
    }
}

/// A contributor whose fragments live on disk.
#[derive(Debug, Clone)]
pub struct DirectoryContributor {
    root: PathBuf,
    manifest: PluginManifest,
}

impl DirectoryContributor {
    /// Load a plugin directory.
    pub fn load(root: impl Into<PathBuf>) -> CoreResult<Self> {
        let root = root.into();
        let manifest_path = root.join(MANIFEST_FILE);
        let content = fs::read_to_string(&manifest_path)?;
        let manifest: PluginManifest =
            serde_yaml::from_str(&content).map_err(|e| CoreError::InvalidManifest {
                path: manifest_path.clone(),
                message: e.to_string(),
            })?;

        if manifest.id.trim().is_empty() {
            return Err(CoreError::InvalidManifest {
                path: manifest_path,
                message: "plugin id must not be empty".to_string(),
            });
        }

        debug!("Loaded plugin manifest {} from {:?}", manifest.id, root);
        Ok(Self { root, manifest })
    }

    /// Load every plugin directory below `plugins_root`, ordered by directory name.
    pub fn discover(plugins_root: &Path) -> CoreResult<Vec<Self>> {
        let mut dirs: Vec<PathBuf> = fs::read_dir(plugins_root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.join(MANIFEST_FILE).is_file())
            .collect();
        dirs.sort();

        let plugins = dirs
            .into_iter()
            .map(Self::load)
            .collect::<CoreResult<Vec<_>>>()?;
        info!("Discovered {} plugin(s) in {:?}", plugins.len(), plugins_root);
        Ok(plugins)
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn read_body(&self, file: &Path) -> CoreResult<String> {
        let path = self.root.join(file);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CoreError::ContributionFailed {
                contributor: self.manifest.id.clone(),
                message: format!("cannot read {}: {}", path.display(), e),
            })
    }
}

#[async_trait]
impl TemplateContributor for DirectoryContributor {
    fn id(&self) -> &str {
        &self.manifest.id
    }

    fn supported_stages(&self) -> &[Stage] {
        &self.manifest.stages
    }

    async fn contribute(&self, _ctx: &ContributionContext) -> CoreResult<Option<TemplateContribution>> {
        let mut contribution = TemplateContribution::new();
        contribution.parameters = self.manifest.parameters.clone();

        for (stage, entry) in self.manifest.entries() {
            let mut content = StageContribution::new();
            for module in &entry.modules {
                content.modules.push(TemplateModule {
                    name: module.name.clone(),
                    body: self.read_body(&module.file).await?,
                });
            }
            if let Some(file) = &entry.orchestration {
                content.orchestration = Some(self.read_body(file).await?);
            }
            contribution.stages.insert(stage, content);
        }

        if contribution.is_empty() {
            return Ok(None);
        }
        Ok(Some(contribution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_plugin(root: &Path, dir: &str, manifest: &str, files: &[(&str, &str)]) {
        let plugin_dir = root.join(dir);
        fs::create_dir_all(&plugin_dir).unwrap();
        fs::write(plugin_dir.join(MANIFEST_FILE), manifest).unwrap();
        for (name, content) in files {
            fs::write(plugin_dir.join(name), content).unwrap();
        }
    }

    #[tokio::test]
    async fn test_contribute_reads_bodies() {
        let dir = tempdir().unwrap();
        write_plugin(
            dir.path(),
            "frontend",
            "id: fx-resource-frontend-hosting\nstages: [provision]\nprovision:\n  modules:\n    - name: frontendHostingProvision\n      file: provision.bicep\nparameters:\n  FrontendParameter: FrontendParameterValue\n",
            &[("provision.bicep", "resource storage")],
        );

        let plugin = DirectoryContributor::load(dir.path().join("frontend")).unwrap();
        let ctx = ContributionContext::new(dir.path(), "app");
        let contribution = plugin.contribute(&ctx).await.unwrap().unwrap();

        let provision = contribution.stage(Stage::Provision).unwrap();
        assert_eq!(provision.modules[0].name, "frontendHostingProvision");
        assert_eq!(provision.modules[0].body, "resource storage");
        assert_eq!(contribution.parameters["FrontendParameter"], "FrontendParameterValue");
    }

    #[tokio::test]
    async fn test_manifest_without_stages_declines() {
        let dir = tempdir().unwrap();
        write_plugin(dir.path(), "spfx", "id: fx-resource-spfx\n", &[]);

        let plugin = DirectoryContributor::load(dir.path().join("spfx")).unwrap();
        let ctx = ContributionContext::new(dir.path(), "app");
        assert!(plugin.contribute(&ctx).await.unwrap().is_none());
    }

    #[test]
    fn test_discover_orders_by_directory() {
        let dir = tempdir().unwrap();
        write_plugin(dir.path(), "b-auth", "id: auth\n", &[]);
        write_plugin(dir.path(), "a-frontend", "id: frontend\n", &[]);
        fs::create_dir_all(dir.path().join("not-a-plugin")).unwrap();

        let plugins = DirectoryContributor::discover(dir.path()).unwrap();
        let ids: Vec<_> = plugins.iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, vec!["frontend", "auth"]);
    }

    #[test]
    fn test_invalid_manifest() {
        let dir = tempdir().unwrap();
        write_plugin(dir.path(), "broken", "id: [unterminated\n", &[]);

        let result = DirectoryContributor::load(dir.path().join("broken"));
        assert!(matches!(result, Err(CoreError::InvalidManifest { .. })));
    }
}
