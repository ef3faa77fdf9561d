//! Error types for ARM orchestration.

use std::path::PathBuf;

use thiserror::Error;

use crate::extract::ErrorReport;

/// Result type alias for ARM operations.
pub type ArmResult<T> = Result<T, ArmError>;

/// Classified name shared by compile and deployment failures.
pub const DEPLOY_FAILED_CODE: &str = "FailedToDeployArmTemplatesToAzure";

/// Errors raised while composing templates. Always raised before any write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositionError {
    #[error("Module name '{module}' is contributed by both {first} and {second}")]
    ModuleNameCollision {
        module: String,
        first: String,
        second: String,
    },

    #[error("Plugin {contributor} contributed a template for unsupported stage '{stage}'")]
    UnsupportedStage { contributor: String, stage: String },

    #[error("Plugin {contributor} uses invalid module name '{module}'")]
    InvalidModuleName { contributor: String, module: String },
}

/// Errors raised while merging or resolving parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("Environment variable {name} referenced by parameter {parameter} is not set")]
    MissingEnvironmentVariable { name: String, parameter: String },

    #[error("Parameter file not found: {0}")]
    MissingParameterFile(PathBuf),

    #[error("Invalid parameter file {path}: {message}")]
    InvalidParameterFile { path: PathBuf, message: String },
}

/// Errors that can occur during ARM orchestration.
#[derive(Error, Debug)]
pub enum ArmError {
    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("Backup of {path} failed: {message}")]
    Backup { path: PathBuf, message: String },

    #[error("Failed to compile bicep files to Json arm templates file: {path}. {output}")]
    Compile { path: PathBuf, output: String },

    #[error("Failed to deploy arm templates to azure: {message}\n{report}")]
    Deploy { message: String, report: ErrorReport },

    #[error("Deployment {0} was canceled locally")]
    Canceled(String),

    #[error("Missing deployment target value: {0}")]
    MissingTarget(String),

    #[error("Deployment client error: {0}")]
    Client(String),

    #[error("Core error: {0}")]
    Core(#[from] armada_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArmError {
    /// Stable classified name of the error.
    pub fn code(&self) -> &'static str {
        match self {
            ArmError::Composition(_) => "CompositionFailed",
            ArmError::Parameter(_) => "ParameterResolutionFailed",
            ArmError::Backup { .. } => "BackupFailed",
            ArmError::Compile { .. } | ArmError::Deploy { .. } => DEPLOY_FAILED_CODE,
            ArmError::Canceled(_) => "DeploymentCanceled",
            ArmError::MissingTarget(_) => "MissingDeploymentTarget",
            ArmError::Client(_) => "DeploymentClientError",
            ArmError::Core(_) => "CoreError",
            ArmError::Io(_) => "IoError",
            ArmError::Json(_) => "JsonError",
        }
    }

    /// The reduced error report attached to a deployment failure.
    pub fn report(&self) -> Option<&ErrorReport> {
        match self {
            ArmError::Deploy { report, .. } => Some(report),
            _ => None,
        }
    }
}
