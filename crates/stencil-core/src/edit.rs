//! Deterministic edits over resource graphs.
//!
//! Payloads arrive as loose JSON from viewer apps and agents, so everything
//! here starts by coercing input into a well-formed [`GraphModel`]. Edits are
//! applied to a working copy and only returned when the whole action
//! succeeded; a failed edit hands back the normalized input unchanged.

use crate::{
    unresolved_dependencies, DependencyEdge, GraphDiff, GraphModel, ResourceNode, Status, DEFAULT_EDGE_KIND,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

pub const SUPPORTED_ACTIONS: &[&str] = &[
    "add_resource",
    "remove_resource",
    "set_resource_type",
    "rename_resource",
    "add_dependency",
    "remove_dependency",
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("graph_model.status must be \"success\" to apply edits.")]
    GraphNotReady,
    #[error("edit_intent must be an object.")]
    IntentNotObject,
    #[error("edit_intent.action is required.")]
    MissingAction,
    #[error("edit_intent.resource is required for add_resource.")]
    MissingResourcePayload,
    #[error("resource.symbolicName is required.")]
    MissingResourceName,
    #[error("resource.resourceType is required.")]
    MissingResourceType,
    #[error("Resource \"{0}\" already exists in graph_model.resources.")]
    AlreadyExists(String),
    #[error("edit_intent.{field} is required for {action}.")]
    MissingField { field: &'static str, action: String },
    #[error("Resource \"{0}\" was not found.")]
    NotFound(String),
    #[error("edit_intent.from is required for dependency edits.")]
    MissingFrom,
    #[error("edit_intent.to is required for dependency edits.")]
    MissingTo,
    #[error("Unsupported edit_intent.action. Supported values: add_resource, remove_resource, set_resource_type, rename_resource, add_dependency, remove_dependency.")]
    UnsupportedAction,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("selection_intent must be an object.")]
    NotObject,
    #[error("selection_intent.componentKind must be \"resource\" or \"edge\".")]
    UnknownKind,
    #[error("selection_intent.symbolicName is required for resource selection.")]
    MissingSymbolicName,
    #[error("selection_intent.from is required for edge selection.")]
    MissingFrom,
    #[error("selection_intent.to is required for edge selection.")]
    MissingTo,
}

/// A component picked in a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "componentKind", rename_all = "lowercase")]
pub enum Selection {
    #[serde(rename_all = "camelCase")]
    Resource { symbolic_name: String },
    #[serde(rename_all = "camelCase")]
    Edge { from: String, to: String, edge_kind: String },
}

/// The graph entity a selection points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Component {
    Resource(ResourceNode),
    Edge(DependencyEdge),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionOutcome {
    pub selection: Option<Selection>,
    /// None when the selection is well formed but matches nothing.
    pub component: Option<Component>,
    pub error: Option<SelectionError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIntent {
    pub symbolic_name: String,
    pub resource_type: String,
    pub depends_on: Vec<String>,
}

/// The edit as it was understood, echoed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedIntent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceIntent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbolic_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_symbolic_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    pub graph: GraphModel,
    pub intent: NormalizedIntent,
    pub error: Option<EditError>,
}

// --- Normalization ---

/// Trimmed, non-empty string at `key`.
fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn edge_kind_or_default(value: &Value, key: &str) -> String {
    text(value, key).unwrap_or_else(|| DEFAULT_EDGE_KIND.to_string())
}

/// Coerce an arbitrary payload into a graph model. Resources without a
/// usable name or type and edges without usable endpoints are dropped.
pub fn normalize_graph(payload: &Value) -> GraphModel {
    let resources: Vec<ResourceNode> = payload
        .get("resources")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|r| {
            let symbolic_name = text(r, "symbolicName")?;
            let resource_type = text(r, "resourceType")?;
            let depends_on = r
                .get("dependsOn")
                .and_then(Value::as_array)
                .map(|deps| deps.iter().filter_map(|d| d.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            let line = r.get("line").and_then(Value::as_u64).map(|l| l as usize);
            Some(ResourceNode {
                symbolic_name,
                resource_type,
                depends_on,
                line,
            })
        })
        .collect();

    let edges: Vec<DependencyEdge> = payload
        .get("edges")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|e| {
            Some(DependencyEdge::with_kind(
                text(e, "from")?,
                text(e, "to")?,
                edge_kind_or_default(e, "kind"),
            ))
        })
        .collect();

    let status = match payload.get("status").and_then(Value::as_str) {
        None | Some("success") => Status::Success,
        Some(_) => Status::Error,
    };
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let unresolved = unresolved_dependencies(&resources, &edges);
    GraphModel {
        status,
        message,
        resources,
        edges,
        unresolved_dependencies: unresolved,
    }
}

/// Same coercion as [`normalize_graph`] for a model that is already typed.
pub fn normalize_model(graph: &GraphModel) -> GraphModel {
    let resources: Vec<ResourceNode> = graph
        .resources
        .iter()
        .filter_map(|r| {
            let symbolic_name = r.symbolic_name.trim();
            let resource_type = r.resource_type.trim();
            if symbolic_name.is_empty() || resource_type.is_empty() {
                return None;
            }
            Some(ResourceNode {
                symbolic_name: symbolic_name.to_string(),
                resource_type: resource_type.to_string(),
                ..r.clone()
            })
        })
        .collect();
    let edges: Vec<DependencyEdge> = graph
        .edges
        .iter()
        .filter_map(|e| {
            let (from, to) = (e.from.trim(), e.to.trim());
            if from.is_empty() || to.is_empty() {
                return None;
            }
            let kind = match e.kind.trim() {
                "" => DEFAULT_EDGE_KIND,
                kind => kind,
            };
            Some(DependencyEdge::with_kind(from, to, kind))
        })
        .collect();
    let unresolved = unresolved_dependencies(&resources, &edges);
    GraphModel {
        status: graph.status,
        message: graph.message.clone(),
        resources,
        edges,
        unresolved_dependencies: unresolved,
    }
}

/// Parse a selection payload; malformed payloads give None.
pub fn normalize_selection(payload: &Value) -> Option<Selection> {
    parse_selection(payload).ok()
}

fn parse_selection(payload: &Value) -> Result<Selection, SelectionError> {
    if !payload.is_object() {
        return Err(SelectionError::NotObject);
    }
    let kind = payload
        .get("componentKind")
        .and_then(Value::as_str)
        .ok_or(SelectionError::UnknownKind)?;
    match kind.trim().to_lowercase().as_str() {
        "resource" => Ok(Selection::Resource {
            symbolic_name: text(payload, "symbolicName").ok_or(SelectionError::MissingSymbolicName)?,
        }),
        "edge" => Ok(Selection::Edge {
            from: text(payload, "from").ok_or(SelectionError::MissingFrom)?,
            to: text(payload, "to").ok_or(SelectionError::MissingTo)?,
            edge_kind: edge_kind_or_default(payload, "edgeKind"),
        }),
        _ => Err(SelectionError::UnknownKind),
    }
}

/// Find the entity a selection payload refers to.
pub fn resolve_selection(graph: &GraphModel, payload: &Value) -> SelectionOutcome {
    let selection = match parse_selection(payload) {
        Ok(s) => s,
        Err(e) => {
            return SelectionOutcome {
                error: Some(e),
                ..Default::default()
            }
        }
    };
    let component = match &selection {
        Selection::Resource { symbolic_name } => graph
            .find_resource(symbolic_name)
            .cloned()
            .map(Component::Resource),
        Selection::Edge { from, to, edge_kind } => graph
            .edges
            .iter()
            .find(|e| &e.from == from && &e.to == to && &e.kind == edge_kind)
            .cloned()
            .map(Component::Edge),
    };
    SelectionOutcome {
        selection: Some(selection),
        component,
        error: None,
    }
}

// --- Edits ---

fn dedupe_edges(edges: Vec<DependencyEdge>) -> Vec<DependencyEdge> {
    let mut seen = HashSet::new();
    edges
        .into_iter()
        .filter(|e| seen.insert((e.from.clone(), e.to.clone(), e.kind.clone())))
        .collect()
}

/// Rebuild every `dependsOn` list from the edges pointing at the resource.
fn sync_dependencies(resources: &mut [ResourceNode], edges: &[DependencyEdge]) {
    let mut incoming: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for edge in edges {
        incoming.entry(edge.to.as_str()).or_default().insert(edge.from.as_str());
    }
    for resource in resources.iter_mut() {
        resource.depends_on = incoming
            .get(resource.symbolic_name.as_str())
            .map(|deps| deps.iter().map(|d| d.to_string()).collect())
            .unwrap_or_default();
    }
}

struct Working {
    resources: Vec<ResourceNode>,
    edges: Vec<DependencyEdge>,
}

impl Working {
    fn position(&self, symbolic_name: &str) -> Option<usize> {
        self.resources.iter().position(|r| r.symbolic_name == symbolic_name)
    }
}

/// Apply one edit intent to `graph`.
pub fn apply_edit(graph: &GraphModel, intent: &Value, selection: Option<&Selection>) -> EditOutcome {
    let graph = normalize_model(graph);
    let mut normalized = NormalizedIntent::default();
    match apply(&graph, intent, selection, &mut normalized) {
        Ok(updated) => EditOutcome {
            graph: updated,
            intent: normalized,
            error: None,
        },
        Err(error) => {
            debug!(%error, "edit rejected");
            EditOutcome {
                graph,
                intent: normalized,
                error: Some(error),
            }
        }
    }
}

fn apply(
    graph: &GraphModel,
    intent: &Value,
    selection: Option<&Selection>,
    normalized: &mut NormalizedIntent,
) -> Result<GraphModel, EditError> {
    if graph.status != Status::Success {
        return Err(EditError::GraphNotReady);
    }
    if !intent.is_object() {
        return Err(EditError::IntentNotObject);
    }
    let action = text(intent, "action").ok_or(EditError::MissingAction)?.to_lowercase();
    normalized.action = Some(action.clone());

    let mut work = Working {
        resources: graph.resources.clone(),
        edges: graph.edges.clone(),
    };
    let selected_resource = match selection {
        Some(Selection::Resource { symbolic_name }) => Some(symbolic_name.clone()),
        _ => None,
    };
    let symbolic_name = text(intent, "symbolicName").or(selected_resource);
    let require_name = |action: &str| {
        symbolic_name.clone().ok_or_else(|| EditError::MissingField {
            field: "symbolicName",
            action: action.to_string(),
        })
    };

    match action.as_str() {
        "add_resource" => {
            let payload = intent
                .get("resource")
                .filter(|r| r.is_object())
                .ok_or(EditError::MissingResourcePayload)?;
            let name = text(payload, "symbolicName").ok_or(EditError::MissingResourceName)?;
            let resource_type = text(payload, "resourceType").ok_or(EditError::MissingResourceType)?;
            if work.position(&name).is_some() {
                return Err(EditError::AlreadyExists(name));
            }
            let mut depends_on: Vec<String> = Vec::new();
            for dep in payload.get("dependsOn").and_then(Value::as_array).into_iter().flatten() {
                let dep = match dep {
                    Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                };
                if !dep.is_empty() && !depends_on.contains(&dep) {
                    depends_on.push(dep);
                }
            }
            work.resources.push(ResourceNode::new(name.clone(), resource_type.clone()));
            work.edges
                .extend(depends_on.iter().map(|dep| DependencyEdge::new(dep.clone(), name.clone())));
            normalized.resource = Some(ResourceIntent {
                symbolic_name: name,
                resource_type,
                depends_on,
            });
        }
        "remove_resource" => {
            let name = require_name("remove_resource")?;
            let index = work.position(&name).ok_or_else(|| EditError::NotFound(name.clone()))?;
            work.resources.remove(index);
            work.edges.retain(|e| e.from != name && e.to != name);
            normalized.symbolic_name = Some(name);
        }
        "set_resource_type" => {
            let name = require_name("set_resource_type")?;
            let resource_type = text(intent, "resourceType").ok_or_else(|| EditError::MissingField {
                field: "resourceType",
                action: "set_resource_type".to_string(),
            })?;
            let index = work.position(&name).ok_or_else(|| EditError::NotFound(name.clone()))?;
            work.resources[index].resource_type = resource_type.clone();
            normalized.symbolic_name = Some(name);
            normalized.resource_type = Some(resource_type);
        }
        "rename_resource" => {
            let name = require_name("rename_resource")?;
            let new_name = text(intent, "newSymbolicName").ok_or_else(|| EditError::MissingField {
                field: "newSymbolicName",
                action: "rename_resource".to_string(),
            })?;
            if new_name != name && work.position(&new_name).is_some() {
                return Err(EditError::AlreadyExists(new_name));
            }
            let index = work.position(&name).ok_or_else(|| EditError::NotFound(name.clone()))?;
            work.resources[index].symbolic_name = new_name.clone();
            for edge in &mut work.edges {
                if edge.from == name {
                    edge.from = new_name.clone();
                }
                if edge.to == name {
                    edge.to = new_name.clone();
                }
            }
            normalized.symbolic_name = Some(name);
            normalized.new_symbolic_name = Some(new_name);
        }
        "add_dependency" | "remove_dependency" => {
            let selected_edge = match selection {
                Some(Selection::Edge { from, to, edge_kind }) => Some((from, to, edge_kind)),
                _ => None,
            };
            let from = text(intent, "from")
                .or_else(|| selected_edge.map(|(f, _, _)| f.clone()))
                .ok_or(EditError::MissingFrom)?;
            let to = text(intent, "to")
                .or_else(|| match selected_edge {
                    Some((_, t, _)) => Some(t.clone()),
                    None => symbolic_name.clone(),
                })
                .ok_or(EditError::MissingTo)?;
            let kind = text(intent, "edgeKind")
                .or_else(|| selected_edge.map(|(_, _, k)| k.clone()))
                .unwrap_or_else(|| DEFAULT_EDGE_KIND.to_string());
            let edge = DependencyEdge::with_kind(from, to, kind);
            if action == "add_dependency" {
                if !work.edges.contains(&edge) {
                    work.edges.push(edge.clone());
                }
            } else {
                work.edges.retain(|e| e.key() != edge.key());
            }
            normalized.from = Some(edge.from);
            normalized.to = Some(edge.to);
            normalized.edge_kind = Some(edge.kind);
        }
        _ => return Err(EditError::UnsupportedAction),
    }

    let edges = dedupe_edges(work.edges);
    let mut resources = work.resources;
    sync_dependencies(&mut resources, &edges);
    let mut next = GraphModel {
        status: Status::Success,
        message: format!("Applied edit action \"{action}\"."),
        resources,
        edges,
        unresolved_dependencies: Vec::new(),
    };
    next.refresh_unresolved();
    Ok(next)
}

/// What `new` added and removed relative to `old`. Entries keep the order
/// of the collection they come from.
pub fn diff(new: &GraphModel, old: &GraphModel) -> GraphDiff {
    let old_resources: HashSet<_> = old.resources.iter().map(ResourceNode::key).collect();
    let new_resources: HashSet<_> = new.resources.iter().map(ResourceNode::key).collect();
    let old_edges: HashSet<_> = old.edges.iter().map(DependencyEdge::key).collect();
    let new_edges: HashSet<_> = new.edges.iter().map(DependencyEdge::key).collect();

    GraphDiff {
        added_resources: new
            .resources
            .iter()
            .filter(|r| !old_resources.contains(&r.key()))
            .cloned()
            .collect(),
        removed_resources: old
            .resources
            .iter()
            .filter(|r| !new_resources.contains(&r.key()))
            .cloned()
            .collect(),
        added_edges: new.edges.iter().filter(|e| !old_edges.contains(&e.key())).cloned().collect(),
        removed_edges: old.edges.iter().filter(|e| !new_edges.contains(&e.key())).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> GraphModel {
        normalize_graph(&json!({
            "status": "success",
            "message": "Parsed",
            "resources": [
                {"symbolicName": "stg", "resourceType": "Microsoft.Storage/storageAccounts"},
                {"symbolicName": "app", "resourceType": "Microsoft.Web/sites", "dependsOn": ["stg"]},
            ],
            "edges": [{"from": "stg", "to": "app", "kind": "dependsOn"}],
        }))
    }

    #[test]
    fn normalization_drops_malformed_entries() {
        let graph = normalize_graph(&json!({
            "resources": [
                {"symbolicName": "  a ", "resourceType": " T "},
                {"symbolicName": "", "resourceType": "T"},
                {"symbolicName": 3, "resourceType": "T"},
                {"symbolicName": "b"},
                "junk",
            ],
            "edges": [
                {"from": "x", "to": "a", "kind": "  "},
                {"from": "a"},
                {"from": 1, "to": "a"},
            ],
        }));
        assert_eq!(graph.status, Status::Success);
        assert_eq!(graph.resources.len(), 1);
        assert_eq!(graph.resources[0].key(), ("a", "T"));
        assert_eq!(graph.edges, vec![DependencyEdge::new("x", "a")]);
        assert_eq!(graph.unresolved_dependencies, vec!["x"]);

        assert_eq!(normalize_graph(&json!({"status": "error"})).status, Status::Error);
        assert_eq!(normalize_graph(&json!("nope")), GraphModel::default());
    }

    #[test]
    fn selection_resolves_resources_and_edges() {
        let graph = sample();
        let hit = resolve_selection(&graph, &json!({"componentKind": " Resource ", "symbolicName": "app"}));
        assert_eq!(
            hit.selection,
            Some(Selection::Resource {
                symbolic_name: "app".into()
            })
        );
        assert!(matches!(hit.component, Some(Component::Resource(ref r)) if r.symbolic_name == "app"));

        let edge = resolve_selection(&graph, &json!({"componentKind": "edge", "from": "stg", "to": "app"}));
        assert_eq!(edge.component, Some(Component::Edge(DependencyEdge::new("stg", "app"))));

        let miss = resolve_selection(&graph, &json!({"componentKind": "resource", "symbolicName": "nope"}));
        assert!(miss.selection.is_some());
        assert_eq!(miss.component, None);
        assert_eq!(miss.error, None);
    }

    #[test]
    fn selection_errors() {
        let graph = sample();
        let cases = [
            (json!([]), "selection_intent must be an object."),
            (json!({"componentKind": "node"}), "selection_intent.componentKind must be \"resource\" or \"edge\"."),
            (
                json!({"componentKind": "resource"}),
                "selection_intent.symbolicName is required for resource selection.",
            ),
            (json!({"componentKind": "edge", "to": "a"}), "selection_intent.from is required for edge selection."),
        ];
        for (payload, message) in cases {
            let outcome = resolve_selection(&graph, &payload);
            assert_eq!(outcome.error.map(|e| e.to_string()).as_deref(), Some(message));
        }
    }

    #[test]
    fn selection_serializes_with_component_kind() {
        let sel = Selection::Edge {
            from: "a".into(),
            to: "b".into(),
            edge_kind: "dependsOn".into(),
        };
        assert_eq!(
            serde_json::to_value(&sel).unwrap(),
            json!({"componentKind": "edge", "from": "a", "to": "b", "edgeKind": "dependsOn"})
        );
    }

    #[test]
    fn add_resource_with_dependencies() {
        let out = apply_edit(
            &sample(),
            &json!({"action": "ADD_RESOURCE", "resource": {
                "symbolicName": "db", "resourceType": "Microsoft.Sql/servers",
                "dependsOn": ["stg", "plan", "stg"]
            }}),
            None,
        );
        assert_eq!(out.error, None);
        let db = out.graph.find_resource("db").unwrap();
        assert_eq!(db.depends_on, vec!["plan", "stg"]);
        assert_eq!(out.graph.unresolved_dependencies, vec!["plan"]);
        assert_eq!(out.graph.message, "Applied edit action \"add_resource\".");
        assert_eq!(out.intent.resource.unwrap().depends_on, vec!["stg", "plan"]);
    }

    #[test]
    fn duplicate_add_is_rejected_and_graph_unchanged() {
        let before = sample();
        let out = apply_edit(
            &before,
            &json!({"action": "add_resource", "resource": {"symbolicName": "stg", "resourceType": "X"}}),
            None,
        );
        assert_eq!(
            out.error.unwrap().to_string(),
            "Resource \"stg\" already exists in graph_model.resources."
        );
        assert_eq!(out.graph, before);
    }

    #[test]
    fn remove_resource_drops_touching_edges() {
        let out = apply_edit(&sample(), &json!({"action": "remove_resource", "symbolicName": "stg"}), None);
        assert!(out.graph.edges.is_empty());
        assert_eq!(out.graph.resources.len(), 1);
        assert!(out.graph.resources[0].depends_on.is_empty());
    }

    #[test]
    fn set_type_uses_selected_resource() {
        let selection = Selection::Resource {
            symbolic_name: "app".into(),
        };
        let out = apply_edit(
            &sample(),
            &json!({"action": "set_resource_type", "resourceType": "Microsoft.Web/staticSites"}),
            Some(&selection),
        );
        assert_eq!(out.graph.find_resource("app").unwrap().resource_type, "Microsoft.Web/staticSites");
        assert_eq!(out.intent.symbolic_name.as_deref(), Some("app"));
    }

    #[test]
    fn rename_rewrites_edges() {
        let out = apply_edit(
            &sample(),
            &json!({"action": "rename_resource", "symbolicName": "stg", "newSymbolicName": "storage"}),
            None,
        );
        assert_eq!(out.graph.edges, vec![DependencyEdge::new("storage", "app")]);
        assert_eq!(out.graph.find_resource("app").unwrap().depends_on, vec!["storage"]);

        let clash = apply_edit(
            &sample(),
            &json!({"action": "rename_resource", "symbolicName": "stg", "newSymbolicName": "app"}),
            None,
        );
        assert_eq!(clash.error, Some(EditError::AlreadyExists("app".into())));
    }

    #[test]
    fn dependency_edits_fall_back_to_selection() {
        let selection = Selection::Edge {
            from: "stg".into(),
            to: "app".into(),
            edge_kind: "dependsOn".into(),
        };
        let removed = apply_edit(&sample(), &json!({"action": "remove_dependency"}), Some(&selection));
        assert!(removed.graph.edges.is_empty());
        assert_eq!(removed.intent.from.as_deref(), Some("stg"));

        let added = apply_edit(
            &sample(),
            &json!({"action": "add_dependency", "from": "stg", "to": "app"}),
            None,
        );
        assert_eq!(added.graph.edges.len(), 1);

        let target = Selection::Resource {
            symbolic_name: "stg".into(),
        };
        let to_selected = apply_edit(
            &sample(),
            &json!({"action": "add_dependency", "from": "app", "edgeKind": "references"}),
            Some(&target),
        );
        assert!(to_selected
            .graph
            .edges
            .contains(&DependencyEdge::with_kind("app", "stg", "references")));
    }

    #[test]
    fn edit_error_messages() {
        let graph = sample();
        let cases = [
            (json!("x"), "edit_intent must be an object."),
            (json!({}), "edit_intent.action is required."),
            (json!({"action": "add_resource"}), "edit_intent.resource is required for add_resource."),
            (json!({"action": "add_resource", "resource": {"resourceType": "T"}}), "resource.symbolicName is required."),
            (json!({"action": "add_resource", "resource": {"symbolicName": "n"}}), "resource.resourceType is required."),
            (json!({"action": "remove_resource"}), "edit_intent.symbolicName is required for remove_resource."),
            (json!({"action": "remove_resource", "symbolicName": "zz"}), "Resource \"zz\" was not found."),
            (json!({"action": "set_resource_type", "symbolicName": "stg"}), "edit_intent.resourceType is required for set_resource_type."),
            (json!({"action": "rename_resource", "symbolicName": "stg"}), "edit_intent.newSymbolicName is required for rename_resource."),
            (json!({"action": "add_dependency", "to": "app"}), "edit_intent.from is required for dependency edits."),
            (json!({"action": "add_dependency", "from": "stg"}), "edit_intent.to is required for dependency edits."),
            (json!({"action": "explode"}), "Unsupported edit_intent.action. Supported values: add_resource, remove_resource, set_resource_type, rename_resource, add_dependency, remove_dependency."),
        ];
        for (intent, message) in cases {
            let out = apply_edit(&graph, &intent, None);
            assert_eq!(out.error.map(|e| e.to_string()).as_deref(), Some(message), "{intent}");
            assert_eq!(out.graph, graph);
        }

        let broken = GraphModel::error("bad parse");
        let out = apply_edit(&broken, &json!({"action": "remove_resource", "symbolicName": "a"}), None);
        assert_eq!(out.error, Some(EditError::GraphNotReady));
    }

    #[test]
    fn diff_reports_changes_in_collection_order() {
        let old = sample();
        let new = apply_edit(
            &old,
            &json!({"action": "set_resource_type", "symbolicName": "stg", "resourceType": "Other"}),
            None,
        )
        .graph;
        let d = diff(&new, &old);
        assert_eq!(d.added_resources.len(), 1);
        assert_eq!(d.added_resources[0].resource_type, "Other");
        assert_eq!(d.removed_resources[0].resource_type, "Microsoft.Storage/storageAccounts");
        assert!(d.added_edges.is_empty() && d.removed_edges.is_empty());
        assert!(diff(&old, &old).is_empty());
    }
}
