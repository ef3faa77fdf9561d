//! Deployment of composed templates.
//!
//! A deployment moves through `Submitted -> Running -> {Succeeded | Failed |
//! Canceled}`. The submission call and the progress loop run concurrently;
//! the loop only observes and stops once the record's finished signal fires.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use armada_core::{OrchestratorConfig, RuntimeState};

use crate::cancel::CancellationToken;
use crate::client::{DeploymentClient, DeploymentOperation, DeploymentRequest, DeploymentResult, DeploymentTarget};
use crate::compiler::TemplateCompiler;
use crate::composer::MAIN_TEMPLATE;
use crate::error::{ArmError, ArmResult};
use crate::extract::ErrorReport;
use crate::parameters::{ParameterFile, ParameterResolver};

/// Runtime state key of the subscription to deploy to.
pub const SUBSCRIPTION_ID_KEY: &str = "subscriptionId";
/// Runtime state key of the resource group to deploy to.
pub const RESOURCE_GROUP_KEY: &str = "resourceGroupName";

/// Deployment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Submitted,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Submitted => "submitted",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Succeeded => "succeeded",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Succeeded | DeploymentStatus::Failed | DeploymentStatus::Canceled
        )
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single deployment in flight. Owned by the caller.
#[derive(Debug)]
pub struct DeploymentRecord {
    target: DeploymentTarget,
    started_at: Instant,
    poll_interval: Duration,
    status: RwLock<DeploymentStatus>,
    last_operations: RwLock<Vec<DeploymentOperation>>,
    finished: watch::Sender<bool>,
}

impl DeploymentRecord {
    pub fn new(target: DeploymentTarget, poll_interval: Duration) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            target,
            started_at: Instant::now(),
            poll_interval,
            status: RwLock::new(DeploymentStatus::Submitted),
            last_operations: RwLock::new(Vec::new()),
            finished,
        }
    }

    pub fn target(&self) -> &DeploymentTarget {
        &self.target
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn status(&self) -> DeploymentStatus {
        *self.status.read()
    }

    /// Move to `status`. Terminal states are final.
    pub fn set_status(&self, status: DeploymentStatus) {
        let mut current = self.status.write();
        if current.is_terminal() {
            debug!("Ignoring transition {} -> {} for a finished deployment", current, status);
            return;
        }
        *current = status;
    }

    /// Operations seen by the most recent successful poll.
    pub fn last_operations(&self) -> Vec<DeploymentOperation> {
        self.last_operations.read().clone()
    }

    fn record_operations(&self, operations: Vec<DeploymentOperation>) {
        *self.last_operations.write() = operations;
    }

    /// Signal the progress loop to stop.
    pub fn mark_finished(&self) {
        self.finished.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }
}

/// Report progress of a deployment until its record is marked finished.
///
/// Every `poll_interval` the operations of the deployment and of its nested
/// deployments are listed and one line is logged per resource with its
/// provisioning state and the elapsed time; state changes are logged at info
/// level. Listing errors are logged and polling goes on. A listing still in
/// flight when the record finishes is abandoned.
pub async fn poll_deployment_status(client: &dyn DeploymentClient, record: &DeploymentRecord) {
    let mut finished = record.finished.subscribe();
    let mut states: HashMap<String, String> = HashMap::new();

    debug!(
        "Polling deployment {} every {:?}",
        record.target().deployment_name,
        record.poll_interval()
    );

    loop {
        if *finished.borrow_and_update() {
            break;
        }

        tokio::select! {
            changed = finished.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = tokio::time::sleep(record.poll_interval()) => {}
        }

        let listing = tokio::select! {
            changed = finished.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            listing = list_all_operations(client, record.target()) => listing,
        };

        match listing {
            Ok(operations) => {
                let elapsed = record.elapsed().as_secs();
                for op in &operations {
                    let previous = states.insert(op.resource_name.clone(), op.provisioning_state.clone());
                    if previous.as_deref() != Some(op.provisioning_state.as_str()) {
                        info!("[{}s] {} -> {}", elapsed, op.resource_name, op.provisioning_state);
                    } else {
                        debug!("[{}s] {} still {}", elapsed, op.resource_name, op.provisioning_state);
                    }
                }
                record.record_operations(operations);
            }
            Err(e) => warn!(
                "Failed to get deployment status of {}: {}",
                record.target().deployment_name,
                e
            ),
        }
    }

    debug!("Stopped polling deployment {}", record.target().deployment_name);
}

/// Operations of a deployment and every nested deployment below it.
async fn list_all_operations(
    client: &dyn DeploymentClient,
    target: &DeploymentTarget,
) -> ArmResult<Vec<DeploymentOperation>> {
    let mut visited = BTreeSet::new();
    let mut pending = vec![target.clone()];
    let mut operations = Vec::new();

    visited.insert(target.deployment_name.clone());
    while let Some(current) = pending.pop() {
        let listed = client.list_operations(&current).await?;
        for op in &listed {
            if op.is_nested_deployment() && visited.insert(op.resource_name.clone()) {
                pending.push(target.nested(op.resource_name.clone()));
            }
        }
        operations.extend(listed);
    }
    Ok(operations)
}

/// Compiles, resolves and submits deployments.
pub struct DeploymentDriver {
    config: OrchestratorConfig,
    client: Arc<dyn DeploymentClient>,
    compiler: Arc<dyn TemplateCompiler>,
    resolver: ParameterResolver,
}

impl DeploymentDriver {
    pub fn new(
        config: OrchestratorConfig,
        client: Arc<dyn DeploymentClient>,
        compiler: Arc<dyn TemplateCompiler>,
        resolver: ParameterResolver,
    ) -> Self {
        Self {
            config,
            client,
            compiler,
            resolver,
        }
    }

    /// Compile the orchestration root and resolve the environment's parameters.
    pub async fn build_request(
        &self,
        project_root: &Path,
        env: &str,
        state: &RuntimeState,
    ) -> ArmResult<DeploymentRequest> {
        let main = project_root.join(&self.config.template_dir).join(MAIN_TEMPLATE);
        if !main.is_file() {
            return Err(ArmError::Compile {
                path: main,
                output: "template file does not exist".to_string(),
            });
        }
        let template = self.compiler.compile(&main).await?;

        let parameter_path = project_root
            .join(&self.config.parameter_dir)
            .join(self.config.parameter_file_name(env));
        let parameters = self.resolver.resolve(&ParameterFile::load(&parameter_path)?, state)?;

        Ok(DeploymentRequest::new(template, parameters.into_map()))
    }

    /// Deployment target read from the solution's runtime state.
    pub fn target(&self, state: &RuntimeState) -> ArmResult<DeploymentTarget> {
        let solution = &self.config.solution_state_key;
        let read = |key: &str| {
            state
                .get(solution, key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| ArmError::MissingTarget(format!("{}.{}", solution, key)))
        };

        let name = format!(
            "{}-{}",
            self.config.deployment_name_prefix,
            Local::now().format("%Y%m%d%H%M%S")
        );
        Ok(DeploymentTarget::new(
            read(SUBSCRIPTION_ID_KEY)?,
            read(RESOURCE_GROUP_KEY)?,
            name,
        ))
    }

    /// Submit `request` and report progress until it finishes or `cancel` fires.
    pub async fn run(
        &self,
        request: &DeploymentRequest,
        record: &DeploymentRecord,
        cancel: &CancellationToken,
    ) -> ArmResult<DeploymentResult> {
        let name = record.target().deployment_name.clone();
        if cancel.is_cancelled() {
            record.set_status(DeploymentStatus::Canceled);
            record.mark_finished();
            return Err(ArmError::Canceled(name));
        }

        info!("Deploying {} to {}", name, record.target());
        record.set_status(DeploymentStatus::Running);

        let submission = async {
            let result = self.client.create_or_update(record.target(), request).await;
            record.mark_finished();
            result
        };
        let progress = poll_deployment_status(self.client.as_ref(), record);
        tokio::pin!(submission);
        tokio::pin!(progress);

        // The submission alone decides completion; progress is dropped with it.
        let completion = async {
            tokio::select! {
                result = &mut submission => result,
                () = &mut progress => (&mut submission).await,
            }
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            result = completion => Some(result),
        };

        match outcome {
            None => {
                record.set_status(DeploymentStatus::Canceled);
                record.mark_finished();
                warn!("Stopped waiting for deployment {} after cancellation", name);
                Err(ArmError::Canceled(name))
            }
            Some(Ok(result)) => {
                record.set_status(DeploymentStatus::Succeeded);
                info!(
                    "Deployment {} succeeded in {}s",
                    name,
                    record.elapsed().as_secs()
                );
                Ok(result)
            }
            Some(Err(failure)) => {
                record.set_status(DeploymentStatus::Failed);
                let report = failure
                    .error
                    .as_ref()
                    .map(ErrorReport::extract)
                    .unwrap_or_default();
                error!("Deployment {} failed: {}", name, failure.message);
                Err(ArmError::Deploy {
                    message: failure.message,
                    report,
                })
            }
        }
    }

    /// Compile, submit and record the outputs of a deployment of `env`.
    pub async fn deploy(
        &self,
        project_root: &Path,
        env: &str,
        state: &mut RuntimeState,
        cancel: &CancellationToken,
    ) -> ArmResult<DeploymentResult> {
        let request = self.build_request(project_root, env, state).await?;
        let record = DeploymentRecord::new(self.target(state)?, self.config.poll_interval());

        let result = self.run(&request, &record, cancel).await?;
        self.store_outputs(state, &result.outputs);
        Ok(result)
    }

    /// Store deployment outputs in runtime state.
    ///
    /// The whole output map lands under the solution's output key; every
    /// object carrying one of the configured plugin id keys is also copied
    /// into that plugin's state.
    pub fn store_outputs(&self, state: &mut RuntimeState, outputs: &Map<String, Value>) {
        state.set(
            self.config.solution_state_key.as_str(),
            self.config.output_state_key.as_str(),
            Value::Object(outputs.clone()),
        );
        for output in outputs.values() {
            fan_out(state, output, &self.config.plugin_id_keys);
        }
    }
}

impl std::fmt::Debug for DeploymentDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentDriver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn fan_out(state: &mut RuntimeState, value: &Value, id_keys: &[String]) {
    match value {
        Value::Object(map) => {
            let owner = id_keys
                .iter()
                .find_map(|id_key| map.get(id_key).and_then(Value::as_str).map(|plugin| (id_key, plugin)));
            if let Some((id_key, plugin)) = owner {
                for (key, item) in map.iter().filter(|(key, _)| *key != id_key) {
                    state.set(plugin, key.as_str(), item.clone());
                }
                debug!("Stored {} output value(s) for {}", map.len() - 1, plugin);
                return;
            }
            for item in map.values() {
                fan_out(state, item, id_keys);
            }
        }
        Value::Array(items) => {
            for item in items {
                fan_out(state, item, id_keys);
            }
        }
        _ => {}
    }
}
