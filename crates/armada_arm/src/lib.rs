//! # armada_arm
//!
//! ARM template orchestration: compose, back up, deploy, poll and diagnose.
//!
//! ## Features
//!
//! - Composition of plugin fragments into `main.bicep` and per-stage roots
//! - Timestamped backups of previous output and parameter files
//! - Parameter merging and placeholder resolution against state and environment
//! - Deployment with concurrent progress polling and local cancellation
//! - Reduction of nested deployment errors to their most specific causes
//!
//! ## Example
//!
//! ```rust,ignore
//! use armada_arm::{TemplateComposer, DeploymentDriver, CancellationToken};
//!
//! let composer = TemplateComposer::new(project_root, config.clone());
//! composer.compose(&registry, &ctx).await?;
//!
//! let driver = DeploymentDriver::new(config, client, compiler, resolver);
//! driver.deploy(project_root, "dev", &mut state, &CancellationToken::new()).await?;
//! ```

pub mod backup;
pub mod cancel;
pub mod client;
pub mod compiler;
pub mod composer;
pub mod deploy;
pub mod error;
pub mod extract;
pub mod mock;
pub mod parameters;

pub use backup::{BackupManager, BackupSnapshot};
pub use cancel::CancellationToken;
pub use client::{
    DeploymentClient, DeploymentFailure, DeploymentMode, DeploymentOperation, DeploymentRequest,
    DeploymentResult, DeploymentTarget,
};
pub use compiler::{BicepCli, TemplateCompiler};
pub use composer::{ComposedFile, ComposedTemplateSet, CompositionOutcome, TemplateComposer, MAIN_TEMPLATE};
pub use deploy::{poll_deployment_status, DeploymentDriver, DeploymentRecord, DeploymentStatus};
pub use error::{ArmError, ArmResult, CompositionError, ParameterError, DEPLOY_FAILED_CODE};
pub use extract::{DeploymentErrorNode, ErrorDetail, ErrorReport, ReportEntry};
pub use mock::{MockDeploymentClient, StaticCompiler};
pub use parameters::{resource_base_name, ParameterFile, ParameterResolver, ResolvedParameters};
