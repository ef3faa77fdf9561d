//! Compilation of the orchestration root into an ARM JSON template.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ArmError, ArmResult};

/// Turns a template root file into a deployable JSON template.
#[async_trait]
pub trait TemplateCompiler: Send + Sync {
    async fn compile(&self, root: &Path) -> ArmResult<Value>;
}

/// Compiler backed by the `bicep` command line tool.
#[derive(Debug, Clone)]
pub struct BicepCli {
    command: String,
}

impl BicepCli {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Default for BicepCli {
    fn default() -> Self {
        Self::new("bicep")
    }
}

#[async_trait]
impl TemplateCompiler for BicepCli {
    async fn compile(&self, root: &Path) -> ArmResult<Value> {
        if !root.is_file() {
            return Err(ArmError::Compile {
                path: root.to_path_buf(),
                output: "template file does not exist".to_string(),
            });
        }

        info!("Compiling {:?}", root);
        debug!("Executing {} build {:?} --stdout", self.command, root);

        let output = Command::new(&self.command)
            .arg("build")
            .arg(root)
            .arg("--stdout")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ArmError::Compile {
                path: root.to_path_buf(),
                output: format!("could not run {}: {}", self.command, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(ArmError::Compile {
                path: root.to_path_buf(),
                output: format!("{}{}", stdout, stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ArmError::Compile {
            path: root.to_path_buf(),
            output: format!("compiler produced invalid JSON: {}", e),
        })
    }
}
