//! armada CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Composition error
//! - 4: Parameter error
//! - 5: Deployment error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use armada_arm::ArmError;
use armada_core::CoreError;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const COMPOSITION_ERROR: u8 = 3;
    pub const PARAMETER_ERROR: u8 = 4;
    pub const DEPLOYMENT_ERROR: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "armada=debug"
    } else if cli.quiet {
        "armada=warn"
    } else {
        "armada=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logging may already be initialized
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Compose(args) => commands::compose::execute(args).await,
        Commands::Resolve(args) => commands::resolve::execute(args).await,
        Commands::Diagnose(args) => commands::diagnose::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(arm) = e.downcast_ref::<ArmError>() {
        return match arm {
            ArmError::Composition(_) | ArmError::Backup { .. } => ExitCodes::COMPOSITION_ERROR,
            ArmError::Parameter(_) => ExitCodes::PARAMETER_ERROR,
            ArmError::Compile { .. }
            | ArmError::Deploy { .. }
            | ArmError::Canceled(_)
            | ArmError::MissingTarget(_)
            | ArmError::Client(_) => ExitCodes::DEPLOYMENT_ERROR,
            ArmError::Core(core) => categorize_core(core),
            ArmError::Io(_) | ArmError::Json(_) => ExitCodes::GENERAL_ERROR,
        };
    }

    if let Some(core) = e.downcast_ref::<CoreError>() {
        return categorize_core(core);
    }

    ExitCodes::GENERAL_ERROR
}

fn categorize_core(e: &CoreError) -> u8 {
    match e {
        CoreError::InvalidConfig(_) => ExitCodes::INVALID_ARGS,
        CoreError::ContributorNotFound(_)
        | CoreError::ContributionFailed { .. }
        | CoreError::InvalidManifest { .. } => ExitCodes::COMPOSITION_ERROR,
        CoreError::Decryption { .. } => ExitCodes::PARAMETER_ERROR,
        CoreError::Io(_) | CoreError::Yaml(_) | CoreError::Json(_) => ExitCodes::GENERAL_ERROR,
    }
}
