//! Template contributor definitions.
//!
//! Contributors are the resource plugins that supply template fragments
//! for a deployment. Each contributor owns its template bodies; the
//! orchestrator only stitches them together by module name.
//!
//! # Contribution Lifecycle
//!
//! 1. **Registration**: Contributors are registered with a `ContributorRegistry`
//!    in the order their modules should appear in the generated templates.
//! 2. **Generation**: The composer calls `contribute` once per generation pass.
//! 3. **Validation**: Every stage in the returned contribution must be listed in
//!    `supported_stages`; module names must be unique across contributors.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use armada_core::{
//!     ContributionContext, CoreResult, Stage, StageContribution, TemplateContribution,
//!     TemplateContributor,
//! };
//!
//! struct StoragePlugin;
//!
//! #[async_trait]
//! impl TemplateContributor for StoragePlugin {
//!     fn id(&self) -> &str { "fx-resource-storage" }
//!     fn supported_stages(&self) -> &[Stage] { &[Stage::Provision] }
//!
//!     async fn contribute(&self, _ctx: &ContributionContext) -> CoreResult<Option<TemplateContribution>> {
//!         Ok(Some(TemplateContribution::new().with_stage(
//!             Stage::Provision,
//!             StageContribution::new().module("storageProvision", "resource storage ..."),
//!         )))
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// A deployment stage, each with its own root template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Resource provisioning.
    Provision,
    /// Post-provision configuration, fed with provisioning outputs.
    Config,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Provision => "provision",
            Stage::Config => "config",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "provision" => Some(Stage::Provision),
            "config" | "configuration" => Some(Stage::Config),
            _ => None,
        }
    }

    /// All stages in deployment order.
    pub fn all() -> Vec<Self> {
        vec![Stage::Provision, Stage::Config]
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single template module with an opaque body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateModule {
    /// Stable module name; also the file stem of the written module.
    pub name: String,
    /// Template text, written verbatim.
    pub body: String,
}

/// What a contributor supplies for one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageContribution {
    /// Modules in declaration order.
    pub modules: Vec<TemplateModule>,
    /// Extra text appended verbatim to the stage root (outputs, variables).
    pub orchestration: Option<String>,
}

impl StageContribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.modules.push(TemplateModule {
            name: name.into(),
            body: body.into(),
        });
        self
    }

    pub fn orchestration(mut self, snippet: impl Into<String>) -> Self {
        self.orchestration = Some(snippet.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
            && self
                .orchestration
                .as_deref()
                .map(|s| s.trim().is_empty())
                .unwrap_or(true)
    }
}

/// Everything one contributor emits during a generation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateContribution {
    /// Per-stage content.
    pub stages: BTreeMap<Stage, StageContribution>,
    /// Parameter defaults, kept in declaration order.
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl TemplateContribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: Stage, content: StageContribution) -> Self {
        self.stages.insert(stage, content);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Content for a stage, if the contributor supplied any.
    pub fn stage(&self, stage: Stage) -> Option<&StageContribution> {
        self.stages.get(&stage).filter(|c| !c.is_empty())
    }

    /// True when no stage carries content.
    pub fn is_empty(&self) -> bool {
        self.stages.values().all(StageContribution::is_empty)
    }
}

/// Inputs available to contributors during generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionContext {
    /// Project root.
    pub project_root: PathBuf,
    /// Application name.
    pub app_name: String,
    /// Environments the parameters are generated for.
    pub environments: Vec<String>,
}

impl ContributionContext {
    pub fn new(project_root: impl Into<PathBuf>, app_name: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            app_name: app_name.into(),
            environments: Vec::new(),
        }
    }

    pub fn with_environment(mut self, env: impl Into<String>) -> Self {
        self.environments.push(env.into());
        self
    }
}

/// Trait for resource plugins that contribute template fragments.
///
/// # Implementing a Contributor
///
/// 1. Implement `id()` to return the plugin identifier. Runtime state produced
///    by the plugin is stored under the same identifier.
/// 2. Implement `supported_stages()` to declare which stages the plugin may
///    contribute to.
/// 3. Implement `contribute()` to return the fragments, or `None` to decline.
#[async_trait]
pub trait TemplateContributor: Send + Sync {
    /// Plugin identifier.
    fn id(&self) -> &str;

    /// Stages this contributor is allowed to emit content for.
    fn supported_stages(&self) -> &[Stage];

    /// Produce this plugin's fragments for the current generation pass.
    async fn contribute(&self, ctx: &ContributionContext) -> CoreResult<Option<TemplateContribution>>;
}
