//! Reduction of nested deployment errors.
//!
//! A failed deployment answers with a tree of errors: every nested deployment
//! adds a level, and most levels only repeat that "something below failed".
//! `ErrorReport::extract` keeps, per branch, the most specific error found.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Generic code reported when output evaluation was skipped because a nested
/// resource failed. Carries no information of its own.
pub const SKIPPED_EVALUATION_CODE: &str = "DeploymentOperationFailed";

/// Key used when the whole error tree reduces to a single unnamed leaf.
pub const ROOT_KEY: &str = "deployment";

/// A single error object as returned by the resource-management API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            extra: Map::new(),
        }
    }

    fn is_skipped_evaluation(&self) -> bool {
        self.code == SKIPPED_EVALUATION_CODE
    }
}

/// One node of the raw error tree: `{ error, inner?, subErrors? }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentErrorNode {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<DeploymentErrorNode>>,
    #[serde(default, rename = "subErrors", skip_serializing_if = "Option::is_none")]
    pub sub_errors: Option<BTreeMap<String, DeploymentErrorNode>>,
}

impl DeploymentErrorNode {
    pub fn leaf(error: ErrorDetail) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    fn has_sub_errors(&self) -> bool {
        self.sub_errors.as_ref().map(|s| !s.is_empty()).unwrap_or(false)
    }
}

/// A reduced entry: either the chosen leaf error or a further branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportEntry {
    Leaf(ErrorDetail),
    Branch(ErrorReport),
}

impl ReportEntry {
    fn is_skipped_evaluation(&self) -> bool {
        matches!(self, ReportEntry::Leaf(detail) if detail.is_skipped_evaluation())
    }
}

/// Sub-stage name to the most specific error found along that branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ErrorReport(BTreeMap<String, ReportEntry>);

impl ErrorReport {
    /// Reduce a raw error tree.
    ///
    /// A root without sub-errors yields a single entry under `ROOT_KEY`.
    pub fn extract(root: &DeploymentErrorNode) -> Self {
        match reduce(root) {
            Some(ReportEntry::Branch(report)) => report,
            Some(leaf @ ReportEntry::Leaf(_)) => {
                let mut entries = BTreeMap::new();
                entries.insert(ROOT_KEY.to_string(), leaf);
                ErrorReport(entries)
            }
            None => ErrorReport::default(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ReportEntry> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Leaves keyed by their dotted path, e.g. `botProvision.usefulError`.
    pub fn flatten(&self) -> Vec<(String, &ErrorDetail)> {
        let mut leaves = Vec::new();
        self.collect_leaves("", &mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, prefix: &str, leaves: &mut Vec<(String, &'a ErrorDetail)>) {
        for (name, entry) in &self.0 {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            match entry {
                ReportEntry::Leaf(detail) => leaves.push((path, detail)),
                ReportEntry::Branch(report) => report.collect_leaves(&path, leaves),
            }
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(text) => write!(f, "{}", text),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

fn reduce(node: &DeploymentErrorNode) -> Option<ReportEntry> {
    let mut node = node;
    while !node.has_sub_errors() {
        match &node.inner {
            Some(inner) => node = inner.as_ref(),
            None => break,
        }
    }

    match &node.sub_errors {
        Some(sub_errors) if !sub_errors.is_empty() => {
            let report = reduce_level(sub_errors);
            if report.is_empty() {
                None
            } else {
                Some(ReportEntry::Branch(report))
            }
        }
        _ => node.error.clone().map(ReportEntry::Leaf),
    }
}

fn reduce_level(sub_errors: &BTreeMap<String, DeploymentErrorNode>) -> ErrorReport {
    let mut entries: BTreeMap<String, ReportEntry> = sub_errors
        .iter()
        .filter_map(|(name, node)| reduce(node).map(|entry| (name.clone(), entry)))
        .collect();

    if entries.values().any(|entry| !entry.is_skipped_evaluation()) {
        entries.retain(|_, entry| !entry.is_skipped_evaluation());
    }
    ErrorReport(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested_example() -> DeploymentErrorNode {
        DeploymentErrorNode::from_value(json!({
            "error": { "code": "OutsideError", "message": "out side error" },
            "subErrors": {
                "botProvision": {
                    "error": { "code": "BotError", "message": "bot error" },
                    "inner": {
                        "error": { "code": "BotInnerError", "message": "bot inner error" },
                        "subErrors": {
                            "usefulError": {
                                "error": { "code": "usefulError", "message": "useful error" }
                            },
                            "uselessError": {
                                "error": {
                                    "code": "DeploymentOperationFailed",
                                    "message": "Template output evaluation skipped: at least one resource deployment operation failed."
                                }
                            }
                        }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_extract_nested_example() {
        let report = ErrorReport::extract(&nested_example());

        assert_eq!(
            report.to_value(),
            json!({
                "botProvision": {
                    "usefulError": { "code": "usefulError", "message": "useful error" }
                }
            })
        );
    }

    #[test]
    fn test_lone_skipped_evaluation_is_kept() {
        let root = DeploymentErrorNode::from_value(json!({
            "error": { "code": "Outer", "message": "outer" },
            "subErrors": {
                "only": { "error": { "code": "DeploymentOperationFailed", "message": "skipped" } }
            }
        }))
        .unwrap();

        let report = ErrorReport::extract(&root);
        match report.get("only") {
            Some(ReportEntry::Leaf(detail)) => assert_eq!(detail.code, SKIPPED_EVALUATION_CODE),
            other => panic!("unexpected entry: {:?}", other),
        }
    }

    #[test]
    fn test_equal_specificity_leaves_are_all_kept() {
        let root = DeploymentErrorNode::from_value(json!({
            "subErrors": {
                "sql": { "error": { "code": "SqlQuota", "message": "quota" } },
                "web": { "error": { "code": "NameTaken", "message": "taken" } },
                "noise": { "error": { "code": "DeploymentOperationFailed", "message": "skipped" } }
            }
        }))
        .unwrap();

        let report = ErrorReport::extract(&root);
        let paths: Vec<_> = report.flatten().into_iter().map(|(path, _)| path).collect();
        assert_eq!(paths, vec!["sql", "web"]);
    }

    #[test]
    fn test_root_leaf_uses_root_key() {
        let root = DeploymentErrorNode::leaf(ErrorDetail::new("InvalidTemplate", "bad template"));
        let report = ErrorReport::extract(&root);

        let leaves = report.flatten();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].0, ROOT_KEY);
        assert_eq!(leaves[0].1.code, "InvalidTemplate");
    }

    #[test]
    fn test_branch_without_leaves_is_omitted() {
        let root = DeploymentErrorNode::from_value(json!({
            "subErrors": {
                "empty": { "inner": {} },
                "real": { "error": { "code": "Conflict", "message": "conflict" } }
            }
        }))
        .unwrap();

        let report = ErrorReport::extract(&root);
        assert!(report.get("empty").is_none());
        assert!(report.get("real").is_some());
    }

    #[test]
    fn test_flatten_uses_dotted_paths() {
        let report = ErrorReport::extract(&nested_example());
        let leaves = report.flatten();

        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].0, "botProvision.usefulError");
        assert_eq!(leaves[0].1.message, "useful error");
    }
}
