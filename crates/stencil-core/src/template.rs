//! Bicep templates as resource graphs: explicit `dependsOn` references become
//! edges, and a graph can be turned back into a diagram script.

use crate::dsl::ast::quote;
use crate::dsl::lexer::is_reserved;
use crate::{unresolved_dependencies, DependencyEdge, GraphModel, ResourceNode, Status};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;

static RESOURCE_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*resource\s+(?P<symbol>[A-Za-z_][A-Za-z0-9_]*)\s+'(?P<type>[^'@]+)@[^']+'\s*=\s*\{").unwrap()
});
static DEPENDS_ON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"dependsOn\s*:\s*\[(?P<deps>[^\]]*)\]").unwrap());
static SYMBOL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").unwrap());
static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").unwrap());

/// Names the generated script itself refers to.
const SCRIPT_NAMES: &[&str] = &["Diagram", "Server"];

struct Block {
    symbol: String,
    resource_type: String,
    line: usize,
    text: String,
}

/// Cut the template into resource declarations. A declaration runs from its
/// header line until the braces opened on it are balanced again.
fn resource_blocks(text: &str) -> Vec<Block> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut idx = 0;
    while idx < lines.len() {
        let Some(caps) = RESOURCE_DECL_RE.captures(lines[idx]) else {
            idx += 1;
            continue;
        };
        let start = idx;
        let mut depth = brace_delta(lines[idx]);
        let mut body = vec![lines[idx]];
        idx += 1;
        while idx < lines.len() && depth > 0 {
            body.push(lines[idx]);
            depth += brace_delta(lines[idx]);
            idx += 1;
        }
        blocks.push(Block {
            symbol: caps["symbol"].to_string(),
            resource_type: caps["type"].to_string(),
            line: start + 1,
            text: body.join("\n"),
        });
    }
    blocks
}

fn brace_delta(line: &str) -> i64 {
    line.chars().fold(0, |d, c| match c {
        '{' => d + 1,
        '}' => d - 1,
        _ => d,
    })
}

/// Parse resource declarations and their explicit `dependsOn` edges.
pub fn parse_graph(text: &str) -> GraphModel {
    if text.trim().is_empty() {
        return GraphModel::error("No Bicep code provided.");
    }
    let blocks = resource_blocks(text);
    if blocks.is_empty() {
        return GraphModel::error("No Bicep resource declarations were found.");
    }

    let mut resources = Vec::with_capacity(blocks.len());
    let mut edges = Vec::new();
    for block in blocks {
        let mut depends_on: Vec<String> = Vec::new();
        for deps in DEPENDS_ON_RE.captures_iter(&block.text) {
            for token in SYMBOL_RE.find_iter(&deps["deps"]) {
                let token = token.as_str();
                if token != block.symbol && !depends_on.iter().any(|d| d == token) {
                    depends_on.push(token.to_string());
                }
            }
        }
        edges.extend(depends_on.iter().map(|dep| DependencyEdge::new(dep.clone(), block.symbol.clone())));
        resources.push(ResourceNode {
            symbolic_name: block.symbol,
            resource_type: block.resource_type,
            depends_on,
            line: Some(block.line),
        });
    }

    let unresolved = unresolved_dependencies(&resources, &edges);
    let mut message = format!(
        "Parsed {} resources and {} explicit dependency edges from Bicep input.",
        resources.len(),
        edges.len()
    );
    if !unresolved.is_empty() {
        message.push_str(&format!(
            " {} dependencies did not map to local symbolic resources.",
            unresolved.len()
        ));
    }
    debug!(resources = resources.len(), edges = edges.len(), "parsed bicep graph");

    GraphModel {
        status: Status::Success,
        message,
        resources,
        edges,
        unresolved_dependencies: unresolved,
    }
}

/// Turn a symbolic name into a script variable that is not already in `used`.
fn sanitize_identifier(name: &str, used: &mut HashSet<String>) -> String {
    let mut ident = NON_WORD_RE.replace_all(name.trim(), "_").into_owned();
    if ident.is_empty() {
        ident = "resource".to_string();
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if is_reserved(&ident) || SCRIPT_NAMES.contains(&ident.as_str()) {
        ident.push_str("_resource");
    }

    let base = ident.clone();
    let mut counter = 2;
    while used.contains(&ident) {
        ident = format!("{base}_{counter}");
        counter += 1;
    }
    used.insert(ident.clone());
    ident
}

/// Minimal diagram script with one node per resource and one arrow per edge
/// whose endpoints are both resources.
pub fn graph_to_script(graph: &GraphModel) -> String {
    let mut lines = vec![r#"with Diagram("Bicep Resource Graph", show=False, direction="LR"):"#.to_string()];
    if graph.resources.is_empty() {
        lines.push(r#"    Server("No resources found")"#.to_string());
        return lines.join("\n");
    }

    let mut used = HashSet::new();
    let mut vars: HashMap<&str, String> = HashMap::new();
    for (i, resource) in graph.resources.iter().enumerate() {
        let fallback_name = format!("resource_{}", i + 1);
        let symbol = if resource.symbolic_name.is_empty() {
            fallback_name.as_str()
        } else {
            resource.symbolic_name.as_str()
        };
        let resource_type = if resource.resource_type.is_empty() {
            "resource"
        } else {
            resource.resource_type.as_str()
        };
        let var = sanitize_identifier(symbol, &mut used);
        lines.push(format!("    {var} = Server({})", quote(&format!("{symbol}\n{resource_type}"))));
        vars.insert(resource.symbolic_name.as_str(), var);
    }
    for edge in &graph.edges {
        if let (Some(from), Some(to)) = (vars.get(edge.from.as_str()), vars.get(edge.to.as_str())) {
            lines.push(format!("    {from} >> {to}"));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TWO: &str = "\
param location string = resourceGroup().location

resource stg 'Microsoft.Storage/storageAccounts@2023-01-01' = {
  name: 'stg${uniqueString(resourceGroup().id)}'
  location: location
  sku: {
    name: 'Standard_LRS'
  }
}

resource app 'Microsoft.Web/sites@2022-09-01' = {
  name: 'app'
  dependsOn: [
    stg
    missingPlan
    stg
  ]
}
";

    #[test]
    fn dependency_becomes_an_edge() {
        let graph = parse_graph(TWO);
        assert!(graph.is_success());
        assert_eq!(graph.resources.len(), 2);
        assert_eq!(graph.resources[0].line, Some(3));
        assert_eq!(graph.resources[1].resource_type, "Microsoft.Web/sites");
        assert_eq!(graph.resources[1].depends_on, vec!["stg", "missingPlan"]);
        assert_eq!(
            graph.edges,
            vec![DependencyEdge::new("stg", "app"), DependencyEdge::new("missingPlan", "app")]
        );
        assert_eq!(graph.unresolved_dependencies, vec!["missingPlan"]);
        assert_eq!(
            graph.message,
            "Parsed 2 resources and 2 explicit dependency edges from Bicep input. 1 dependencies did not map to local symbolic resources."
        );
    }

    #[test]
    fn inline_array_and_self_reference() {
        let src = "resource a 'T@1' = {\n}\nresource b 'T@1' = {\n  dependsOn: [a, b]\n}\n";
        let graph = parse_graph(src);
        assert_eq!(graph.edges, vec![DependencyEdge::new("a", "b")]);
        assert!(graph.unresolved_dependencies.is_empty());
        assert_eq!(graph.message, "Parsed 2 resources and 1 explicit dependency edges from Bicep input.");
    }

    #[test]
    fn empty_and_declaration_free_input() {
        let empty = parse_graph("  \n\t");
        assert_eq!(empty.status, Status::Error);
        assert_eq!(empty.message, "No Bicep code provided.");
        assert!(empty.resources.is_empty() && empty.edges.is_empty());

        let none = parse_graph("param x string\n");
        assert_eq!(none.message, "No Bicep resource declarations were found.");
    }

    #[test]
    fn script_from_graph() {
        let script = graph_to_script(&parse_graph(TWO));
        assert_eq!(
            script,
            "with Diagram(\"Bicep Resource Graph\", show=False, direction=\"LR\"):\n    stg = Server(\"stg\\nMicrosoft.Storage/storageAccounts\")\n    app = Server(\"app\\nMicrosoft.Web/sites\")\n    stg >> app"
        );
    }

    #[test]
    fn empty_graph_gets_placeholder() {
        let script = graph_to_script(&GraphModel::default());
        assert!(script.ends_with("    Server(\"No resources found\")"));
    }

    #[test]
    fn identifiers_are_sanitized() {
        let mut used = HashSet::new();
        assert_eq!(sanitize_identifier("my-app.v2", &mut used), "my_app_v2");
        assert_eq!(sanitize_identifier("my app v2", &mut used), "my_app_v2_2");
        assert_eq!(sanitize_identifier("9lives", &mut used), "_9lives");
        assert_eq!(sanitize_identifier("class", &mut used), "class_resource");
        assert_eq!(sanitize_identifier("Server", &mut used), "Server_resource");
        assert_eq!(sanitize_identifier("  ", &mut used), "resource");
    }
}
