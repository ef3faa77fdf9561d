//! # armada_core
//!
//! Shared building blocks for the armada template orchestrator.
//!
//! # Architecture
//!
//! - **Contributors**: Resource plugins that supply opaque template fragments
//! - **Registry**: Ordered set of contributors taking part in a generation pass
//! - **Runtime state**: Values produced by plugins, readable by later steps
//! - **Configuration**: Paths and tunables for composition and deployment
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use armada_core::{ContributorRegistry, DirectoryContributor};
//!
//! let mut registry = ContributorRegistry::new();
//! for plugin in DirectoryContributor::discover(Path::new("plugins"))? {
//!     registry.register(Arc::new(plugin));
//! }
//! ```

pub mod config;
pub mod contributor;
pub mod directory;
pub mod error;
pub mod registry;
pub mod state;

pub use config::{OrchestratorConfig, CONFIG_FILE, ENV_NAME_PLACEHOLDER};
pub use contributor::{
    ContributionContext, Stage, StageContribution, TemplateContribution, TemplateContributor,
    TemplateModule,
};
pub use directory::{DirectoryContributor, PluginManifest};
pub use error::{CoreError, CoreResult};
pub use registry::ContributorRegistry;
pub use state::{NoopCipher, RuntimeState, SecretCipher, ENCRYPTED_PREFIX};
