//! Diagnose command - Reduce a nested deployment error document.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use armada_arm::{DeploymentErrorNode, DeploymentFailure, ErrorReport};

#[derive(Args)]
pub struct DiagnoseArgs {
    /// JSON file holding the error tree, or a failure `{ "message", "error" }`
    pub file: PathBuf,

    /// Print one `path: code - message` line per error instead of JSON
    #[arg(long)]
    pub flat: bool,
}

pub async fn execute(args: DiagnoseArgs) -> Result<()> {
    let report = load_report(&args.file)?;

    if report.is_empty() {
        println!("ℹ️  No errors found in {}", args.file.display());
        return Ok(());
    }

    if args.flat {
        for (path, detail) in report.flatten() {
            println!("{}: {} - {}", path, detail.code, detail.message);
        }
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn load_report(path: &Path) -> Result<ErrorReport> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let value: Value = serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))?;

    let node = match value.get("message") {
        Some(Value::String(_)) => serde_json::from_value::<DeploymentFailure>(value)?
            .error
            .unwrap_or_default(),
        _ => DeploymentErrorNode::from_value(value)?,
    };
    Ok(ErrorReport::extract(&node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_load_report_from_failure_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("error.json");
        fs::write(
            &path,
            json!({
                "message": "Deployment failed",
                "error": {
                    "error": { "code": "OutsideError", "message": "out side error" },
                    "subErrors": {
                        "sql": { "error": { "code": "SqlQuota", "message": "quota" } },
                        "noise": { "error": { "code": "DeploymentOperationFailed", "message": "skipped" } }
                    }
                }
            })
            .to_string(),
        )
        .unwrap();

        let report = load_report(&path).unwrap();
        let leaves = report.flatten();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].0, "sql");
    }

    #[test]
    fn test_load_report_from_raw_tree() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("error.json");
        fs::write(&path, r#"{ "error": { "code": "InvalidTemplate", "message": "bad" } }"#).unwrap();

        let report = load_report(&path).unwrap();
        assert_eq!(report.flatten()[0].0, "deployment");
    }
}
