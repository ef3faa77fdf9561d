//! Compose command - Compose templates from plugin directories.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use armada_arm::TemplateComposer;
use armada_core::{ContributionContext, ContributorRegistry, DirectoryContributor, OrchestratorConfig};

#[derive(Args)]
pub struct ComposeArgs {
    /// Project root
    #[arg(short, long, default_value = ".")]
    pub project: PathBuf,

    /// Environment to generate parameters for (repeatable)
    #[arg(short, long, default_value = "default")]
    pub env: Vec<String>,

    /// Directory holding one sub-directory per plugin
    #[arg(long)]
    pub plugins: PathBuf,

    /// Application name used for resource names (defaults to the project directory name)
    #[arg(long)]
    pub app_name: Option<String>,
}

pub async fn execute(args: ComposeArgs) -> Result<()> {
    info!("Composing templates for {:?}", args.project);

    let config = OrchestratorConfig::load(&args.project)
        .context("Failed to load orchestrator configuration")?;

    let plugins = DirectoryContributor::discover(&args.plugins)
        .with_context(|| format!("Failed to load plugins from {:?}", args.plugins))?;

    let mut registry = ContributorRegistry::new();
    for plugin in plugins {
        registry.register(Arc::new(plugin));
    }

    let app_name = args
        .app_name
        .clone()
        .unwrap_or_else(|| default_app_name(&args.project));
    let mut ctx = ContributionContext::new(&args.project, app_name);
    ctx.environments = args.env.clone();

    let composer = TemplateComposer::new(&args.project, config);
    match composer.compose(&registry, &ctx).await? {
        None => {
            println!("ℹ️  No plugin contributed templates, nothing was written");
        }
        Some(outcome) => {
            println!(
                "✅ Composed {} file(s) from {} plugin(s)",
                outcome.templates.len(),
                outcome.contributors.len()
            );
            println!("   Templates: {}", composer.template_root().display());
            for path in &outcome.parameter_files {
                println!("   Parameters: {}", path.display());
            }
            if let Some(backup) = &outcome.backup {
                println!("   Backup: {}", backup.path.display());
            }
        }
    }

    Ok(())
}

fn default_app_name(project: &Path) -> String {
    project
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "app".to_string())
}
