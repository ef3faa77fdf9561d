//! Seam to the remote resource-management API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ArmResult;
use crate::extract::DeploymentErrorNode;

/// Resource type of nested deployments in an operations listing.
pub const NESTED_DEPLOYMENT_TYPE: &str = "Microsoft.Resources/deployments";

/// Where a deployment is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTarget {
    pub subscription_id: String,
    pub resource_group: String,
    pub deployment_name: String,
}

impl DeploymentTarget {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        deployment_name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            deployment_name: deployment_name.into(),
        }
    }

    /// The same scope, pointed at a nested deployment.
    pub fn nested(&self, deployment_name: impl Into<String>) -> Self {
        Self {
            deployment_name: deployment_name.into(),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.subscription_id, self.resource_group, self.deployment_name
        )
    }
}

/// Deployment mode. Only incremental deployments are issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentMode {
    #[default]
    Incremental,
    Complete,
}

/// Body of a create-or-update call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub template: Value,
    pub parameters: Map<String, Value>,
    pub mode: DeploymentMode,
}

impl DeploymentRequest {
    pub fn new(template: Value, parameters: Map<String, Value>) -> Self {
        Self {
            template,
            parameters,
            mode: DeploymentMode::Incremental,
        }
    }
}

/// A successful deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Output name to `{ "type", "value" }`.
    #[serde(default)]
    pub outputs: Map<String, Value>,
}

/// One entry of an operations listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOperation {
    pub resource_name: String,
    pub resource_type: String,
    pub provisioning_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl DeploymentOperation {
    pub fn new(
        resource_name: impl Into<String>,
        resource_type: impl Into<String>,
        provisioning_state: impl Into<String>,
    ) -> Self {
        Self {
            resource_name: resource_name.into(),
            resource_type: resource_type.into(),
            provisioning_state: provisioning_state.into(),
            timestamp: None,
        }
    }

    pub fn is_nested_deployment(&self) -> bool {
        self.resource_type.eq_ignore_ascii_case(NESTED_DEPLOYMENT_TYPE)
    }
}

/// A rejected or failed deployment as reported by the remote API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentFailure {
    pub message: String,
    /// Raw nested error tree, when the API returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DeploymentErrorNode>,
}

impl DeploymentFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: DeploymentErrorNode) -> Self {
        self.error = Some(error);
        self
    }
}

/// Remote deployment API.
#[async_trait]
pub trait DeploymentClient: Send + Sync {
    /// Submit a deployment and wait for it to reach a terminal state.
    async fn create_or_update(
        &self,
        target: &DeploymentTarget,
        request: &DeploymentRequest,
    ) -> Result<DeploymentResult, DeploymentFailure>;

    /// List the operations of a deployment.
    async fn list_operations(&self, target: &DeploymentTarget) -> ArmResult<Vec<DeploymentOperation>>;
}
