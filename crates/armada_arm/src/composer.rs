//! Template composition.
//!
//! Every registered contributor is asked for its fragments in registration
//! order. The fragments are validated as a whole, then laid out as one file
//! per module plus a root file per stage and the orchestration root
//! `main.bicep`. Nothing touches the disk until validation and parameter
//! preparation succeeded; writes are sequenced backup, templates, ignore
//! marker, parameter files.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use armada_core::{
    ContributionContext, ContributorRegistry, OrchestratorConfig, Stage, StageContribution,
    TemplateContribution,
};

use crate::backup::{BackupManager, BackupSnapshot};
use crate::error::{ArmResult, CompositionError};
use crate::parameters::{resource_base_name, ParameterFile};

/// Orchestration root file name.
pub const MAIN_TEMPLATE: &str = "main.bicep";
/// Ignore marker written next to the backup root.
pub const IGNORE_FILE: &str = ".gitignore";

const PROVISION_DEPLOYMENT: &str = "provisionResources";
const CONFIG_DEPLOYMENT: &str = "addConfigurations";

/// One generated file, relative to the template root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedFile {
    pub path: PathBuf,
    pub content: String,
}

/// The ordered set of files produced by one composition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedTemplateSet {
    files: Vec<ComposedFile>,
}

impl ComposedTemplateSet {
    fn push(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.push(ComposedFile {
            path: path.into(),
            content: content.into(),
        });
    }

    pub fn files(&self) -> &[ComposedFile] {
        &self.files
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&str> {
        let path = path.as_ref();
        self.files
            .iter()
            .find(|file| file.path == path)
            .map(|file| file.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write every file under `root`, creating directories as needed.
    pub fn write_to(&self, root: &Path) -> ArmResult<()> {
        for file in &self.files {
            let target = root.join(&file.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &file.content)?;
            debug!("Wrote {:?}", target);
        }
        Ok(())
    }
}

/// Result of a composition that produced output.
#[derive(Debug, Clone)]
pub struct CompositionOutcome {
    pub templates: ComposedTemplateSet,
    /// Contributors that produced content, in registration order.
    pub contributors: Vec<String>,
    pub backup: Option<BackupSnapshot>,
    /// Parameter files written, one per environment.
    pub parameter_files: Vec<PathBuf>,
}

/// A non-empty contribution paired with its contributor id.
struct Contributed {
    id: String,
    contribution: TemplateContribution,
}

/// Composes contributor fragments into a deployable template tree.
#[derive(Debug, Clone)]
pub struct TemplateComposer {
    project_root: PathBuf,
    config: OrchestratorConfig,
    resource_suffix: Option<String>,
}

impl TemplateComposer {
    pub fn new(project_root: impl Into<PathBuf>, config: OrchestratorConfig) -> Self {
        Self {
            project_root: project_root.into(),
            config,
            resource_suffix: None,
        }
    }

    /// Use a fixed suffix for generated resource base names instead of a fresh UUID.
    pub fn with_resource_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.resource_suffix = Some(suffix.into());
        self
    }

    pub fn template_root(&self) -> PathBuf {
        self.project_root.join(&self.config.template_dir)
    }

    pub fn parameter_file_path(&self, env: &str) -> PathBuf {
        self.project_root
            .join(&self.config.parameter_dir)
            .join(self.config.parameter_file_name(env))
    }

    /// Run a composition pass.
    ///
    /// Returns `Ok(None)` without touching the disk when no contributor
    /// produced content.
    pub async fn compose(
        &self,
        registry: &ContributorRegistry,
        ctx: &ContributionContext,
    ) -> ArmResult<Option<CompositionOutcome>> {
        let contributed = self.collect(registry, ctx).await?;
        if contributed.is_empty() {
            info!("No plugin contributed templates, nothing to compose");
            return Ok(None);
        }

        validate(registry, &contributed)?;
        let templates = build_templates(&contributed);
        let parameters = self.prepare_parameters(ctx, &contributed)?;

        let backup = BackupManager::new(&self.project_root, &self.config).snapshot()?;

        let template_root = self.template_root();
        templates.write_to(&template_root)?;
        self.write_ignore_marker()?;

        let mut parameter_files = Vec::with_capacity(parameters.len());
        for (path, file) in parameters {
            file.save(&path)?;
            parameter_files.push(path);
        }

        let contributors: Vec<String> = contributed.into_iter().map(|c| c.id).collect();
        info!(
            "Composed {} template file(s) from {} plugin(s) into {:?}",
            templates.len(),
            contributors.len(),
            template_root
        );

        Ok(Some(CompositionOutcome {
            templates,
            contributors,
            backup,
            parameter_files,
        }))
    }

    async fn collect(
        &self,
        registry: &ContributorRegistry,
        ctx: &ContributionContext,
    ) -> ArmResult<Vec<Contributed>> {
        let mut contributed = Vec::new();
        for contributor in registry.iter() {
            match contributor.contribute(ctx).await? {
                Some(contribution) if !contribution.is_empty() => {
                    debug!("Plugin {} contributed templates", contributor.id());
                    contributed.push(Contributed {
                        id: contributor.id().to_string(),
                        contribution,
                    });
                }
                _ => debug!("Plugin {} has nothing to contribute", contributor.id()),
            }
        }
        Ok(contributed)
    }

    fn prepare_parameters(
        &self,
        ctx: &ContributionContext,
        contributed: &[Contributed],
    ) -> ArmResult<Vec<(PathBuf, ParameterFile)>> {
        let mut prepared = Vec::with_capacity(ctx.environments.len());

        for env in &ctx.environments {
            let suffix = self
                .resource_suffix
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
            let defaults = ParameterFile::from_defaults(
                &resource_base_name(&ctx.app_name, env, &suffix),
                contributed
                    .iter()
                    .map(|c| (c.id.as_str(), &c.contribution.parameters)),
            );

            let path = self.parameter_file_path(env);
            let file = if path.exists() {
                debug!("Merging generated parameters into {:?}", path);
                ParameterFile::load(&path)?.merge_defaults(&defaults)
            } else {
                defaults
            };
            prepared.push((path, file));
        }
        Ok(prepared)
    }

    fn write_ignore_marker(&self) -> ArmResult<()> {
        let backup_dir = &self.config.backup_dir;
        let (Some(parent), Some(name)) = (backup_dir.parent(), backup_dir.file_name()) else {
            warn!("Backup directory {:?} has no parent, skipping ignore marker", backup_dir);
            return Ok(());
        };
        if parent.as_os_str().is_empty() {
            warn!("Backup directory {:?} sits at the project root, skipping ignore marker", backup_dir);
            return Ok(());
        }

        let dir = self.project_root.join(parent);
        fs::create_dir_all(&dir)?;
        let content = format!(
            "# ignore ARM template backup folder\n/{}",
            name.to_string_lossy()
        );
        fs::write(dir.join(IGNORE_FILE), content)?;
        Ok(())
    }
}

fn validate(registry: &ContributorRegistry, contributed: &[Contributed]) -> ArmResult<()> {
    // module name -> (owning plugin, stage)
    let mut owners: BTreeMap<&str, (&str, Stage)> = BTreeMap::new();

    for item in contributed {
        let supported = registry
            .get(&item.id)
            .map(|c| c.supported_stages().to_vec())
            .unwrap_or_default();

        for (stage, content) in &item.contribution.stages {
            if content.is_empty() {
                continue;
            }
            if !supported.contains(stage) {
                return Err(CompositionError::UnsupportedStage {
                    contributor: item.id.clone(),
                    stage: stage.to_string(),
                }
                .into());
            }

            for module in &content.modules {
                if !is_valid_module_name(&module.name) {
                    return Err(CompositionError::InvalidModuleName {
                        contributor: item.id.clone(),
                        module: module.name.clone(),
                    }
                    .into());
                }

                match owners.get(module.name.as_str()) {
                    Some((owner, owned_stage)) if *owner != item.id || owned_stage == stage => {
                        return Err(CompositionError::ModuleNameCollision {
                            module: module.name.clone(),
                            first: owner.to_string(),
                            second: item.id.clone(),
                        }
                        .into());
                    }
                    Some(_) => {}
                    None => {
                        owners.insert(module.name.as_str(), (item.id.as_str(), *stage));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Module names become file names and template identifiers.
fn is_valid_module_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn build_templates(contributed: &[Contributed]) -> ComposedTemplateSet {
    let mut set = ComposedTemplateSet::default();
    let mut stage_roots = Vec::new();

    for stage in Stage::all() {
        let parts: Vec<&StageContribution> = contributed
            .iter()
            .filter_map(|c| c.contribution.stage(stage))
            .collect();
        if parts.is_empty() {
            continue;
        }

        for part in &parts {
            for module in &part.modules {
                set.push(
                    Path::new(stage.as_str()).join(format!("{}.bicep", module.name)),
                    module.body.clone(),
                );
            }
        }
        stage_roots.push((stage, stage_root(stage, &parts)));
    }

    let stages: Vec<Stage> = stage_roots.iter().map(|(stage, _)| *stage).collect();
    set.push(MAIN_TEMPLATE, main_template(&stages));
    for (stage, content) in stage_roots {
        set.push(format!("{}.bicep", stage.as_str()), content);
    }
    set
}

fn stage_root(stage: Stage, parts: &[&StageContribution]) -> String {
    let mut out = String::from("@secure()\nparam provisionParameters object\n");
    if stage == Stage::Config {
        out.push_str("param provisionOutputs object\n");
    }

    for part in parts {
        for module in &part.modules {
            out.push_str(&format!(
                "\nmodule {name} './{stage}/{name}.bicep' = {{\n  name: '{name}'\n  params: {{\n    provisionParameters: provisionParameters\n",
                name = module.name,
                stage = stage.as_str()
            ));
            if stage == Stage::Config {
                out.push_str("    provisionOutputs: provisionOutputs\n");
            }
            out.push_str("  }\n}\n");
        }
    }

    for part in parts {
        if let Some(snippet) = part.orchestration.as_deref().filter(|s| !s.trim().is_empty()) {
            out.push('\n');
            out.push_str(snippet);
            if !snippet.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    out
}

fn main_template(stages: &[Stage]) -> String {
    let has_provision = stages.contains(&Stage::Provision);
    let has_config = stages.contains(&Stage::Config);
    let mut out = String::from("@secure()\nparam provisionParameters object\n");

    if has_provision {
        out.push_str(&format!(
            "\nmodule provision './provision.bicep' = {{\n  name: '{}'\n  params: {{\n    provisionParameters: provisionParameters\n  }}\n}}\n",
            PROVISION_DEPLOYMENT
        ));
    }
    if has_config {
        let outputs = if has_provision { "provision" } else { "{}" };
        out.push_str(&format!(
            "\nmodule configuration './config.bicep' = {{\n  name: '{}'\n  params: {{\n    provisionParameters: provisionParameters\n    provisionOutputs: {}\n  }}\n}}\n",
            CONFIG_DEPLOYMENT, outputs
        ));
    }

    out.push('\n');
    if has_provision {
        out.push_str("output provisionOutput object = provision\n");
    }
    if has_config {
        out.push_str(
            "output configurationOutput object = contains(reference(resourceId('Microsoft.Resources/deployments', configuration.name), '2020-06-01'), 'outputs') ? configuration : {}\n",
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_name_validation() {
        assert!(is_valid_module_name("frontendHostingProvision"));
        assert!(is_valid_module_name("_sql2"));
        assert!(!is_valid_module_name("2sql"));
        assert!(!is_valid_module_name("../escape"));
        assert!(!is_valid_module_name("with-dash"));
        assert!(!is_valid_module_name(""));
    }

    #[test]
    fn test_main_template_with_both_stages() {
        let main = main_template(&[Stage::Provision, Stage::Config]);
        assert_eq!(
            main,
            "@secure()
param provisionParameters object

module provision './provision.bicep' = {
  name: 'provisionResources'
  params: {
    provisionParameters: provisionParameters
  }
}

module configuration './config.bicep' = {
  name: 'addConfigurations'
  params: {
    provisionParameters: provisionParameters
    provisionOutputs: provision
  }
}

output provisionOutput object = provision
output configurationOutput object = contains(reference(resourceId('Microsoft.Resources/deployments', configuration.name), '2020-06-01'), 'outputs') ? configuration : {}
"
        );
    }

    #[test]
    fn test_main_template_config_only_gets_empty_outputs() {
        let main = main_template(&[Stage::Config]);
        assert!(main.contains("provisionOutputs: {}"));
        assert!(!main.contains("module provision"));
        assert!(!main.contains("output provisionOutput"));
    }

    #[test]
    fn test_stage_root_lists_modules_then_snippets() {
        let web = StageContribution::new()
            .module("webConfig", "web body")
            .orchestration("output webEndpoint string = webConfig.outputs.endpoint");
        let bot = StageContribution::new().module("botConfig", "bot body");

        let root = stage_root(Stage::Config, &[&web, &bot]);

        assert!(root.starts_with("@secure()\nparam provisionParameters object\nparam provisionOutputs object\n"));
        let web_at = root.find("module webConfig './config/webConfig.bicep'").unwrap();
        let bot_at = root.find("module botConfig './config/botConfig.bicep'").unwrap();
        let snippet_at = root.find("output webEndpoint").unwrap();
        assert!(web_at < bot_at && bot_at < snippet_at);
        assert_eq!(root.matches("provisionOutputs: provisionOutputs").count(), 2);
    }
}
