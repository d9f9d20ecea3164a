use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashSet};
use stencil_core::edit::{apply_edit, diff, normalize_graph, Selection};
use stencil_core::{GraphModel, Status};

const NAMES: &[&str] = &["stg", "app", "plan", "kv", "db", "ext"];
const KINDS: &[&str] = &["dependsOn", "references"];

fn name() -> impl Strategy<Value = String> {
    prop::sample::select(NAMES).prop_map(str::to_string)
}

fn graph() -> impl Strategy<Value = GraphModel> {
    let resources = prop::sample::subsequence(&NAMES[..5], 0..=5);
    let edges = prop::collection::vec((name(), name(), prop::sample::select(KINDS)), 0..10);
    (resources, edges).prop_map(|(resources, edges)| {
        normalize_graph(&json!({
            "status": "success",
            "resources": resources
                .iter()
                .map(|r| json!({"symbolicName": r, "resourceType": format!("Type/{r}")}))
                .collect::<Vec<_>>(),
            "edges": edges
                .iter()
                .map(|(f, t, k)| json!({"from": f, "to": t, "kind": k}))
                .collect::<Vec<_>>(),
        }))
    })
}

fn intent() -> impl Strategy<Value = Value> {
    prop_oneof![
        (name(), prop::collection::vec(name(), 0..3)).prop_map(|(n, deps)| json!({
            "action": "add_resource",
            "resource": {"symbolicName": n, "resourceType": "Type/new", "dependsOn": deps},
        })),
        name().prop_map(|n| json!({"action": "remove_resource", "symbolicName": n})),
        name().prop_map(|n| json!({"action": "set_resource_type", "symbolicName": n, "resourceType": "Type/x"})),
        (name(), name()).prop_map(|(a, b)| json!({"action": "rename_resource", "symbolicName": a, "newSymbolicName": b})),
        (name(), name(), prop::sample::select(KINDS))
            .prop_map(|(f, t, k)| json!({"action": "add_dependency", "from": f, "to": t, "edgeKind": k})),
        (name(), name()).prop_map(|(f, t)| json!({"action": "remove_dependency", "from": f, "to": t})),
    ]
}

fn assert_invariants(graph: &GraphModel) {
    let keys: Vec<_> = graph.edges.iter().map(|e| e.key()).collect();
    let distinct: HashSet<_> = keys.iter().collect();
    assert_eq!(keys.len(), distinct.len(), "duplicate edges in {graph:?}");

    for resource in &graph.resources {
        let expected: Vec<&str> = graph
            .edges
            .iter()
            .filter(|e| e.to == resource.symbolic_name)
            .map(|e| e.from.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        assert_eq!(resource.depends_on, expected);
    }

    let names: HashSet<&str> = graph.resources.iter().map(|r| r.symbolic_name.as_str()).collect();
    for edge in &graph.edges {
        assert_eq!(
            graph.unresolved_dependencies.contains(&edge.from),
            !names.contains(edge.from.as_str())
        );
    }
}

proptest! {
    #[test]
    fn diff_of_graph_with_itself_is_empty(g in graph()) {
        prop_assert!(diff(&g, &g).is_empty());
    }

    #[test]
    fn edits_keep_graph_invariants(g in graph(), i in intent()) {
        let out = apply_edit(&g, &i, None);
        if out.error.is_none() {
            prop_assert_eq!(out.graph.status, Status::Success);
            assert_invariants(&out.graph);
        } else {
            prop_assert_eq!(&out.graph, &g);
        }
    }

    #[test]
    fn selection_fallback_matches_explicit_fields(g in graph(), f in name(), t in name()) {
        let explicit = apply_edit(&g, &json!({"action": "add_dependency", "from": f, "to": t}), None);
        let selection = Selection::Edge { from: f.clone(), to: t.clone(), edge_kind: "dependsOn".into() };
        let selected = apply_edit(&g, &json!({"action": "add_dependency"}), Some(&selection));
        prop_assert_eq!(explicit.graph, selected.graph);
    }

    #[test]
    fn rename_round_trips(g in graph(), fresh in "[a-z]{3,8}_new") {
        prop_assume!(!g.resources.is_empty());
        let original = g.resources[0].symbolic_name.clone();
        let there = apply_edit(
            &g,
            &json!({"action": "rename_resource", "symbolicName": original, "newSymbolicName": fresh}),
            None,
        );
        prop_assert!(there.error.is_none());
        let back = apply_edit(
            &there.graph,
            &json!({"action": "rename_resource", "symbolicName": fresh, "newSymbolicName": original}),
            None,
        );
        prop_assert!(back.error.is_none());

        // edits normalise dependsOn and dedupe, so compare against one no-op edit of the input
        let baseline = apply_edit(&g, &json!({"action": "remove_dependency", "from": "none", "to": "none"}), None);
        prop_assert_eq!(back.graph.resources, baseline.graph.resources);
        prop_assert_eq!(back.graph.edges, baseline.graph.edges);
        prop_assert_eq!(back.graph.unresolved_dependencies, baseline.graph.unresolved_dependencies);
    }
}
