//! Resolve command - Show the resolved parameter payload of an environment.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use tracing::info;

use armada_arm::{ParameterFile, ParameterResolver};
use armada_core::{OrchestratorConfig, RuntimeState, SecretCipher};

#[derive(Args)]
pub struct ResolveArgs {
    /// Project root
    #[arg(short, long, default_value = ".")]
    pub project: PathBuf,

    /// Environment name
    #[arg(short, long)]
    pub env: String,

    /// Runtime state file (`{ "<plugin>": { "<key>": value } }`)
    #[arg(short, long)]
    pub state: Option<PathBuf>,
}

/// Keeps ciphertext as-is. Values it recognises are masked in the output,
/// so decryption is never needed for display.
struct MaskingCipher;

impl SecretCipher for MaskingCipher {
    fn decrypt(&self, ciphertext: &str) -> Result<String, String> {
        Ok(ciphertext.to_string())
    }
}

pub async fn execute(args: ResolveArgs) -> Result<()> {
    println!("{}", resolve_masked(&args)?);
    Ok(())
}

fn resolve_masked(args: &ResolveArgs) -> Result<String> {
    info!("Resolving parameters of {} in {:?}", args.env, args.project);

    let config = OrchestratorConfig::load(&args.project)
        .context("Failed to load orchestrator configuration")?;

    let state = match &args.state {
        Some(path) => RuntimeState::from_file(path)
            .with_context(|| format!("Failed to read state file {:?}", path))?,
        None => RuntimeState::new(),
    };

    let path = args
        .project
        .join(&config.parameter_dir)
        .join(config.parameter_file_name(&args.env));
    let file = ParameterFile::load(&path)?;

    let resolved = ParameterResolver::new(Arc::new(MaskingCipher)).resolve(&file, &state)?;
    Ok(serde_json::to_string_pretty(&Value::Object(resolved.masked()))?)
}
