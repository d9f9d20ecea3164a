//! Graphviz output for evaluated diagrams. Layout and rasterisation are done
//! by an external `dot` process; this module only writes the script and
//! drives the process.

use crate::dsl::diagram::{Attrs, DiagramSpec, EdgeDirection, NodeSpec};
use crate::OutputFormat;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Graphviz executable '{0}' was not found. Install Graphviz and make sure `dot` is on PATH.")]
    NotFound(String),

    #[error("failed to run renderer: {0}")]
    Io(#[from] std::io::Error),

    #[error("renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Turns a layout script into an image file.
#[async_trait]
pub trait Renderer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn render(&self, dot: &str, output: &Path, format: OutputFormat) -> Result<(), RenderError>;
}

// --- DOT generation ---

const GRAPH_DEFAULTS: &[(&str, &str)] = &[
    ("pad", "2.0"),
    ("nodesep", "0.60"),
    ("ranksep", "0.75"),
    ("fontname", "Sans-Serif"),
    ("fontsize", "15"),
    ("fontcolor", "#2D3436"),
];

const NODE_DEFAULTS: &[(&str, &str)] = &[
    ("shape", "box"),
    ("style", "rounded"),
    ("fixedsize", "true"),
    ("width", "1.4"),
    ("height", "1.4"),
    ("labelloc", "b"),
    ("imagescale", "true"),
    ("fontname", "Sans-Serif"),
    ("fontsize", "13"),
    ("fontcolor", "#2D3436"),
];

const EDGE_DEFAULTS: &[(&str, &str)] = &[("color", "#7B8894")];

const CLUSTER_DEFAULTS: &[(&str, &str)] = &[
    ("shape", "box"),
    ("style", "rounded"),
    ("labeljust", "l"),
    ("pencolor", "#AEB6BE"),
    ("fontname", "Sans-Serif"),
    ("fontsize", "12"),
];

/// Background colours for nested clusters, cycled by depth.
const CLUSTER_BGCOLORS: &[&str] = &["#E5F5FD", "#EBF3E7", "#ECE8F6", "#FDF7E3"];

/// Quote-safe body of a DOT string. A run of backslashes directly before a
/// quote or the end of the string is doubled so it cannot escape the quote.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut slashes = 0;
    for c in value.chars() {
        match c {
            '\\' => {
                slashes += 1;
                continue;
            }
            '"' => {
                out.push_str(&"\\".repeat(slashes * 2));
                out.push_str("\\\"");
            }
            '\n' => {
                out.push_str(&"\\".repeat(slashes));
                out.push_str("\\n");
            }
            '\r' => out.push_str(&"\\".repeat(slashes)),
            c => {
                out.push_str(&"\\".repeat(slashes));
                out.push(c);
            }
        }
        slashes = 0;
    }
    out.push_str(&"\\".repeat(slashes * 2));
    out
}

fn is_plain_id(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn merged(defaults: &[(&str, &str)], overrides: &Attrs) -> Attrs {
    let mut attrs: Attrs = defaults.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    for (k, v) in overrides {
        crate::dsl::diagram::set_attr(&mut attrs, k, v.clone());
    }
    attrs
}

fn attr_list(attrs: &Attrs) -> String {
    attrs
        .iter()
        .map(|(k, v)| {
            if is_plain_id(k) {
                format!("{k}=\"{}\"", escape(v))
            } else {
                format!("\"{}\"=\"{}\"", escape(k), escape(v))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn node_line(out: &mut String, indent: &str, node: &NodeSpec) {
    let mut attrs: Attrs = vec![("label".to_string(), node.label.clone())];
    if let Some(icon) = &node.icon {
        // the label sits under the image, so the box grows with extra lines
        let lines = node.label.lines().count().max(1);
        attrs.push(("shape".into(), "none".into()));
        attrs.push(("image".into(), icon.clone()));
        attrs.push(("height".into(), format!("{:.1}", 1.9 + 0.4 * (lines - 1) as f64)));
    }
    for (k, v) in &node.attrs {
        crate::dsl::diagram::set_attr(&mut attrs, k, v.clone());
    }
    let _ = writeln!(out, "{indent}{} [{}];", node.id, attr_list(&attrs));
}

fn write_cluster(out: &mut String, spec: &DiagramSpec, index: usize, depth: usize) {
    let indent = "    ".repeat(depth + 1);
    let cluster = &spec.clusters[index];
    let mut attrs = merged(CLUSTER_DEFAULTS, &Attrs::new());
    crate::dsl::diagram::set_attr(&mut attrs, "label", cluster.label.clone());
    crate::dsl::diagram::set_attr(&mut attrs, "rankdir", cluster.direction.clone());
    crate::dsl::diagram::set_attr(
        &mut attrs,
        "bgcolor",
        CLUSTER_BGCOLORS[depth % CLUSTER_BGCOLORS.len()],
    );
    for (k, v) in &cluster.graph_attr {
        crate::dsl::diagram::set_attr(&mut attrs, k, v.clone());
    }

    let _ = writeln!(out, "{indent}subgraph cluster_{index} {{");
    let _ = writeln!(out, "{indent}    graph [{}];", attr_list(&attrs));
    for node in spec.nodes.iter().filter(|n| n.cluster == Some(index)) {
        node_line(out, &format!("{indent}    "), node);
    }
    let children: Vec<usize> = spec.child_clusters(Some(index)).map(|(i, _)| i).collect();
    for child in children {
        write_cluster(out, spec, child, depth + 1);
    }
    let _ = writeln!(out, "{indent}}}");
}

/// Lay `spec` out as a Graphviz script.
pub fn to_dot(spec: &DiagramSpec) -> String {
    let mut out = String::new();
    let keyword = if spec.strict { "strict digraph" } else { "digraph" };
    let _ = writeln!(out, "{keyword} \"{}\" {{", escape(&spec.name));

    let mut graph = merged(GRAPH_DEFAULTS, &Attrs::new());
    crate::dsl::diagram::set_attr(&mut graph, "label", spec.name.clone());
    crate::dsl::diagram::set_attr(&mut graph, "rankdir", spec.direction.clone());
    crate::dsl::diagram::set_attr(&mut graph, "splines", spec.curvestyle.clone());
    for (k, v) in &spec.graph_attr {
        crate::dsl::diagram::set_attr(&mut graph, k, v.clone());
    }
    let _ = writeln!(out, "    graph [{}];", attr_list(&graph));
    let _ = writeln!(out, "    node [{}];", attr_list(&merged(NODE_DEFAULTS, &spec.node_attr)));
    let _ = writeln!(out, "    edge [{}];", attr_list(&merged(EDGE_DEFAULTS, &spec.edge_attr)));

    for node in spec.nodes.iter().filter(|n| n.cluster.is_none()) {
        node_line(&mut out, "    ", node);
    }
    let roots: Vec<usize> = spec.child_clusters(None).map(|(i, _)| i).collect();
    for index in roots {
        write_cluster(&mut out, spec, index, 0);
    }

    for edge in &spec.edges {
        let (Some(tail), Some(head)) = (spec.nodes.get(edge.tail), spec.nodes.get(edge.head)) else {
            continue;
        };
        let mut attrs: Attrs = vec![("dir".into(), edge.direction.as_dot().into())];
        if !edge.label.is_empty() {
            attrs.push(("label".into(), edge.label.clone()));
        }
        if !edge.color.is_empty() {
            attrs.push(("color".into(), edge.color.clone()));
        }
        if !edge.style.is_empty() {
            attrs.push(("style".into(), edge.style.clone()));
        }
        for (k, v) in &edge.attrs {
            crate::dsl::diagram::set_attr(&mut attrs, k, v.clone());
        }
        // undirected edges keep their written order and just drop the arrowheads
        let _ = match edge.direction {
            EdgeDirection::Back => writeln!(out, "    {} -> {} [{}];", head.id, tail.id, attr_list(&flip(attrs))),
            _ => writeln!(out, "    {} -> {} [{}];", tail.id, head.id, attr_list(&attrs)),
        };
    }
    out.push_str("}\n");
    out
}

/// `a << b` is laid out as `b -> a` so ranking follows the arrow.
fn flip(mut attrs: Attrs) -> Attrs {
    crate::dsl::diagram::set_attr(&mut attrs, "dir", "forward");
    attrs
}

// --- Graphviz process ---

#[derive(Debug, Clone)]
pub struct GraphvizRenderer {
    executable: PathBuf,
}

impl GraphvizRenderer {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Locate `executable` via `PATH`.
    pub fn discover(executable: &str) -> Result<Self, RenderError> {
        let path = which::which(executable).map_err(|_| RenderError::NotFound(executable.to_string()))?;
        debug!(path = %path.display(), "found graphviz");
        Ok(Self::new(path))
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

#[async_trait]
impl Renderer for GraphvizRenderer {
    fn name(&self) -> &'static str {
        "graphviz"
    }

    #[instrument(skip(self, dot), fields(renderer = "graphviz", format = %format))]
    async fn render(&self, dot: &str, output: &Path, format: OutputFormat) -> Result<(), RenderError> {
        let mut command = Command::new(&self.executable);
        command
            .arg(format!("-T{}", format.extension()))
            .arg("-o")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // relative icon paths in the script resolve against the output directory
        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RenderError::NotFound(self.executable.display().to_string()),
            _ => RenderError::Io(e),
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(dot.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!("graphviz finished");
        Ok(())
    }
}
