/// Diagram script rules, shared by the MCP server instructions and the
/// `generate_diagram` tool description.
pub const SCRIPT_RULES: &str = "\
1. Every script needs exactly one `with Diagram(\"Title\"):` block. Nodes, clusters and edges must be \
created inside it. `show`, `filename` and `outformat` are set by the server; values you pass are replaced.\n\
2. Do not write import statements. Every node class from `list_icons` (e.g. `AppServices`, `SQLDatabases`, \
`EC2`, `Pod`, `Server`) plus `Diagram`, `Cluster`, `Edge` and `Custom` is already in scope.\n\
3. Connect nodes with `>>` (left to right), `<<` (right to left) or `-` (no arrow). Either side may be a \
list: `lb >> [web1, web2] >> db` fans out and back in. A list on both sides of one operator is an error.\n\
4. Put labels, colours and styles on edges with `Edge`: `api >> Edge(label=\"reads\", color=\"firebrick\", \
style=\"dashed\") >> db`.\n\
5. Group nodes with nested `with Cluster(\"Name\"):` blocks. A node belongs to the innermost open cluster.\n\
6. Use `Custom(\"Label\", \"path/to/icon.png\")` for icons outside the catalog. Relative paths resolve \
against the output directory.\n\
7. Supported syntax is deliberately small: assignments, `with`, `for`, `while`, `if`/`elif`/`else`, \
lists, dicts, strings, numbers, `range`, `len`, `str` and `print`. `def`, `class`, `lambda`, comprehensions, \
f-strings and attribute access on values are rejected.\n\
8. Scripts are scanned before they run. Calls such as `exec`, `eval`, `open`, `getattr`, `os.system` and any \
`subprocess.` usage fail the scan and nothing is rendered.\n\
9. Direction is one of `TB`, `BT`, `LR`, `RL`; `curvestyle` is `ortho` or `curved`. Output format is \
`png` (default) or `svg`.";

/// Instructions returned to MCP clients in `initialize`.
pub fn server_instructions() -> String {
    format!(
        "Stencil generates architecture and infrastructure diagrams from a small diagram scripting \
language, and turns Bicep templates into editable resource graphs.\n\
\n\
## Workflow\n\
1. `list_icons` to discover providers, services and node classes.\n\
2. `get_diagram_examples` for a starting script of the kind you want.\n\
3. `generate_diagram` with your script. Check `scan_code` first if a script keeps getting rejected.\n\
4. For Bicep: `preview_bicep_graph` to inspect the resource graph, `generate_diagram_from_bicep` to render \
it, and `update_diagram_from_bicep` with the previous graph model to get a diff.\n\
5. Viewer apps edit graphs with `select_component`, `preview_edit` and `apply_edit`. Edits are \
deterministic; a failed edit returns the graph unchanged.\n\
\n\
Prefer Azure and Microsoft icons for cloud architecture on Azure.\n\
\n\
## Script rules\n\
{SCRIPT_RULES}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse;

    #[test]
    fn instructions_embed_rules() {
        let text = server_instructions();
        assert!(text.contains("## Script rules"));
        assert!(text.ends_with(SCRIPT_RULES));
    }

    #[test]
    fn inline_examples_are_valid_scripts() {
        let snippet =
            "with Diagram(\"x\"):\n    lb = Server(\"lb\")\n    web1 = Server(\"w1\")\n    web2 = Server(\"w2\")\n    db = Server(\"db\")\n    lb >> [web1, web2] >> db\n";
        assert!(parse(snippet).is_ok());
        assert!(SCRIPT_RULES.contains("lb >> [web1, web2] >> db"));
    }
}
