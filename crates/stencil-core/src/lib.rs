pub mod catalog;
pub mod config;
pub mod dsl;
pub mod edit;
pub mod generate;
pub mod guide;
pub mod linter;
pub mod render;
pub mod scanner;
pub mod svg;
pub mod template;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub use generate::{DiagramGenerator, GenerateRequest};
pub use scanner::Scanner;

/// Edge kind used when a payload does not name one.
pub const DEFAULT_EDGE_KIND: &str = "dependsOn";

// --- Result types ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Success,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Error => "error",
        }
    }
}

/// Severity or confidence grade attached to a security finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    High,
    Medium,
    Low,
}

impl Level {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Some(Level::High),
            "MEDIUM" => Some(Level::Medium),
            "LOW" => Some(Level::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityIssue {
    pub severity: Level,
    pub confidence: Level,
    /// 1-based line in the scanned source, 0 when the finding has no location.
    pub line: u32,
    pub text: String,
    pub kind: String,
}

/// A dangerous call or attribute access found by the static analyzer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DangerousUsage {
    pub function: String,
    pub line: u32,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeMetrics {
    pub total_lines: usize,
    pub code_lines: usize,
    pub comment_lines: usize,
    pub blank_lines: usize,
    /// Percentage of comment lines relative to total lines.
    pub comment_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceScanResult {
    pub syntax_valid: bool,
    pub has_errors: bool,
    pub issues: Vec<SecurityIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<CodeMetrics>,
}

impl SourceScanResult {
    /// Single-line summary used when a scan blocks execution.
    pub fn failure_summary(&self) -> String {
        if let Some(msg) = &self.error_message {
            return msg.clone();
        }
        self.issues
            .iter()
            .map(|i| i.text.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: Status,
    #[serde(default)]
    pub path: Option<String>,
    pub message: String,
}

impl ExecutionResult {
    pub fn success(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            path: Some(path.into()),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            path: None,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Svg,
}

impl OutputFormat {
    /// Parse a user-supplied format. Blank input means the default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "png" => Some(OutputFormat::Png),
            "svg" => Some(OutputFormat::Svg),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// --- Graph model ---

/// A resource declared in an infrastructure template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    pub symbolic_name: String,
    pub resource_type: String,
    /// Derived from the edge set; recomputed after every edit.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// 1-based template line of the declaration, when parsed from text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl ResourceNode {
    pub fn new(symbolic_name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            resource_type: resource_type.into(),
            depends_on: Vec::new(),
            line: None,
        }
    }

    /// Identity used by graph diffs.
    pub fn key(&self) -> (&str, &str) {
        (&self.symbolic_name, &self.resource_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    #[serde(default = "default_edge_kind")]
    pub kind: String,
}

fn default_edge_kind() -> String {
    DEFAULT_EDGE_KIND.to_string()
}

impl DependencyEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: default_edge_kind(),
        }
    }

    pub fn with_kind(from: impl Into<String>, to: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: kind.into(),
        }
    }

    /// Identity used for deduplication and diffs.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.from, &self.to, &self.kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphModel {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub resources: Vec<ResourceNode>,
    #[serde(default)]
    pub edges: Vec<DependencyEdge>,
    #[serde(default)]
    pub unresolved_dependencies: Vec<String>,
}

impl GraphModel {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn find_resource(&self, symbolic_name: &str) -> Option<&ResourceNode> {
        self.resources.iter().find(|r| r.symbolic_name == symbolic_name)
    }

    /// Recompute `unresolved_dependencies` from the current resources and edges.
    pub fn refresh_unresolved(&mut self) {
        self.unresolved_dependencies = unresolved_dependencies(&self.resources, &self.edges);
    }
}

/// Sorted distinct edge sources that do not name a resource.
pub fn unresolved_dependencies(resources: &[ResourceNode], edges: &[DependencyEdge]) -> Vec<String> {
    let symbols: BTreeSet<&str> = resources.iter().map(|r| r.symbolic_name.as_str()).collect();
    edges
        .iter()
        .filter(|e| !symbols.contains(e.from.as_str()))
        .map(|e| e.from.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphDiff {
    pub added_resources: Vec<ResourceNode>,
    pub removed_resources: Vec<ResourceNode>,
    pub added_edges: Vec<DependencyEdge>,
    pub removed_edges: Vec<DependencyEdge>,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool {
        self.added_resources.is_empty()
            && self.removed_resources.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_parsing_is_lenient_on_case_and_space() {
        assert_eq!(OutputFormat::parse(" SVG "), Some(OutputFormat::Svg));
        assert_eq!(OutputFormat::parse(""), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::parse("pdf"), None);
    }

    #[test]
    fn unresolved_is_sorted_and_distinct() {
        let resources = vec![ResourceNode::new("vm", "Microsoft.Compute/virtualMachines")];
        let edges = vec![
            DependencyEdge::new("zeta", "vm"),
            DependencyEdge::new("alpha", "vm"),
            DependencyEdge::new("zeta", "vm"),
            DependencyEdge::new("vm", "alpha"),
        ];
        assert_eq!(unresolved_dependencies(&resources, &edges), vec!["alpha", "zeta"]);
    }

    #[test]
    fn edge_kind_defaults_when_missing() {
        let edge: DependencyEdge = serde_json::from_str(r#"{"from":"a","to":"b"}"#).unwrap();
        assert_eq!(edge.kind, "dependsOn");
    }

    #[test]
    fn scan_summary_prefers_error_message() {
        let result = SourceScanResult {
            syntax_valid: false,
            has_errors: true,
            issues: vec![],
            error_message: Some("Syntax error: boom".into()),
            metrics: None,
        };
        assert_eq!(result.failure_summary(), "Syntax error: boom");
    }
}
