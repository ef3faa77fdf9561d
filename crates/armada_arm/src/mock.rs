//! Test doubles for the deployment seams.
//!
//! `MockDeploymentClient` captures every call and answers with scripted
//! responses; `StaticCompiler` returns a fixed template without invoking
//! any external tool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::client::{
    DeploymentClient, DeploymentFailure, DeploymentOperation, DeploymentRequest, DeploymentResult,
    DeploymentTarget,
};
use crate::compiler::TemplateCompiler;
use crate::error::{ArmError, ArmResult};

/// How the mock answers a submission.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed(DeploymentResult),
    Fail(DeploymentFailure),
    /// Never answer; only cancellation ends the wait.
    Hang,
}

/// A captured submission.
#[derive(Debug, Clone)]
pub struct CapturedSubmission {
    pub target: DeploymentTarget,
    pub request: DeploymentRequest,
}

/// Mock deployment client for testing.
#[derive(Clone)]
pub struct MockDeploymentClient {
    outcome: Arc<RwLock<MockOutcome>>,
    submit_delay: Arc<RwLock<Duration>>,
    /// Operations keyed by deployment name.
    operations: Arc<RwLock<HashMap<String, Vec<DeploymentOperation>>>>,
    /// Operations returned for any deployment without an explicit entry.
    root_operations: Arc<RwLock<Vec<DeploymentOperation>>>,
    list_failure: Arc<RwLock<Option<String>>>,
    list_hangs: Arc<AtomicBool>,
    submissions: Arc<RwLock<Vec<CapturedSubmission>>>,
    listed: Arc<RwLock<Vec<DeploymentTarget>>>,
    list_count: Arc<AtomicUsize>,
}

impl Default for MockDeploymentClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDeploymentClient {
    /// Create a mock that succeeds immediately with no outputs.
    pub fn new() -> Self {
        Self {
            outcome: Arc::new(RwLock::new(MockOutcome::Succeed(DeploymentResult::default()))),
            submit_delay: Arc::new(RwLock::new(Duration::ZERO)),
            operations: Arc::new(RwLock::new(HashMap::new())),
            root_operations: Arc::new(RwLock::new(Vec::new())),
            list_failure: Arc::new(RwLock::new(None)),
            list_hangs: Arc::new(AtomicBool::new(false)),
            submissions: Arc::new(RwLock::new(Vec::new())),
            listed: Arc::new(RwLock::new(Vec::new())),
            list_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Succeed with `result`.
    pub fn succeed_with(self, result: DeploymentResult) -> Self {
        *self.outcome.write() = MockOutcome::Succeed(result);
        self
    }

    /// Fail with `failure`.
    pub fn fail_with(self, failure: DeploymentFailure) -> Self {
        *self.outcome.write() = MockOutcome::Fail(failure);
        self
    }

    /// Never answer submissions.
    pub fn hang(self) -> Self {
        *self.outcome.write() = MockOutcome::Hang;
        self
    }

    /// Delay every submission answer.
    pub fn with_submit_delay(self, delay: Duration) -> Self {
        *self.submit_delay.write() = delay;
        self
    }

    /// Operations of the top-level deployment.
    pub fn with_operations(self, operations: Vec<DeploymentOperation>) -> Self {
        *self.root_operations.write() = operations;
        self
    }

    /// Operations of a named (nested) deployment.
    pub fn with_operations_for(self, deployment: impl Into<String>, operations: Vec<DeploymentOperation>) -> Self {
        self.operations.write().insert(deployment.into(), operations);
        self
    }

    /// Make every operations listing fail.
    pub fn fail_listing(self, message: impl Into<String>) -> Self {
        *self.list_failure.write() = Some(message.into());
        self
    }

    /// Never answer operations listings.
    pub fn hang_listing(self) -> Self {
        self.list_hangs.store(true, Ordering::SeqCst);
        self
    }

    /// Get all captured submissions.
    pub fn submissions(&self) -> Vec<CapturedSubmission> {
        self.submissions.read().clone()
    }

    /// Get every target whose operations were listed.
    pub fn listed_targets(&self) -> Vec<DeploymentTarget> {
        self.listed.read().clone()
    }

    pub fn list_count(&self) -> usize {
        self.list_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeploymentClient for MockDeploymentClient {
    async fn create_or_update(
        &self,
        target: &DeploymentTarget,
        request: &DeploymentRequest,
    ) -> Result<DeploymentResult, DeploymentFailure> {
        self.submissions.write().push(CapturedSubmission {
            target: target.clone(),
            request: request.clone(),
        });

        let delay = *self.submit_delay.read();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.outcome.read().clone();
        match outcome {
            MockOutcome::Succeed(result) => Ok(result),
            MockOutcome::Fail(failure) => Err(failure),
            MockOutcome::Hang => std::future::pending().await,
        }
    }

    async fn list_operations(&self, target: &DeploymentTarget) -> ArmResult<Vec<DeploymentOperation>> {
        self.list_count.fetch_add(1, Ordering::SeqCst);
        self.listed.write().push(target.clone());

        if self.list_hangs.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if let Some(message) = self.list_failure.read().clone() {
            return Err(ArmError::Client(message));
        }

        let explicit = self.operations.read().get(&target.deployment_name).cloned();
        Ok(explicit.unwrap_or_else(|| self.root_operations.read().clone()))
    }
}

impl std::fmt::Debug for MockDeploymentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDeploymentClient")
            .field("outcome", &*self.outcome.read())
            .field("submissions", &self.submissions.read().len())
            .finish()
    }
}

/// Compiler returning a fixed template.
#[derive(Debug, Clone)]
pub struct StaticCompiler {
    template: Value,
    failure: Option<String>,
    compiled: Arc<RwLock<Vec<PathBuf>>>,
}

impl StaticCompiler {
    pub fn new(template: Value) -> Self {
        Self {
            template,
            failure: None,
            compiled: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Fail every compilation with `output`.
    pub fn failing(output: impl Into<String>) -> Self {
        Self {
            failure: Some(output.into()),
            ..Self::new(Value::Null)
        }
    }

    /// Paths passed to `compile`.
    pub fn compiled(&self) -> Vec<PathBuf> {
        self.compiled.read().clone()
    }
}

#[async_trait]
impl TemplateCompiler for StaticCompiler {
    async fn compile(&self, root: &Path) -> ArmResult<Value> {
        self.compiled.write().push(root.to_path_buf());
        match &self.failure {
            Some(output) => Err(ArmError::Compile {
                path: root.to_path_buf(),
                output: output.clone(),
            }),
            None => Ok(self.template.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[tokio::test]
    async fn test_mock_captures_submissions() {
        let client = MockDeploymentClient::new().fail_with(DeploymentFailure::new("boom"));
        let target = DeploymentTarget::new("sub", "rg", "dep");
        let request = DeploymentRequest::new(json!({ "test_key": "test_value" }), Map::new());

        let failure = client.create_or_update(&target, &request).await.unwrap_err();
        assert_eq!(failure.message, "boom");

        let submissions = client.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].request.template["test_key"], "test_value");
    }

    #[tokio::test]
    async fn test_mock_operations_per_deployment() {
        let client = MockDeploymentClient::new()
            .with_operations(vec![DeploymentOperation::new("root", "Microsoft.Web/sites", "Running")])
            .with_operations_for(
                "nested",
                vec![DeploymentOperation::new("db", "Microsoft.Sql/servers", "Succeeded")],
            );
        let target = DeploymentTarget::new("sub", "rg", "dep");

        let root = client.list_operations(&target).await.unwrap();
        let nested = client.list_operations(&target.nested("nested")).await.unwrap();
        assert_eq!(root[0].resource_name, "root");
        assert_eq!(nested[0].resource_name, "db");
        assert_eq!(client.list_count(), 2);
    }
}
