use crate::OutputFormat;
use serde::Serialize;

pub const DIRECTIONS: &[&str] = &["TB", "BT", "LR", "RL"];
pub const CURVE_STYLES: &[&str] = &["ortho", "curved"];

pub type Attrs = Vec<(String, String)>;

/// Set `key` in an ordered attribute list, replacing an existing entry.
pub fn set_attr(attrs: &mut Attrs, key: &str, value: impl Into<String>) {
    let value = value.into();
    match attrs.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value,
        None => attrs.push((key.to_string(), value)),
    }
}

/// Everything the evaluator learned about one `with Diagram(...)` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagramSpec {
    pub name: String,
    /// Output path without extension.
    pub filename: String,
    pub direction: String,
    pub curvestyle: String,
    pub outformat: OutputFormat,
    pub show: bool,
    pub strict: bool,
    pub autolabel: bool,
    pub graph_attr: Attrs,
    pub node_attr: Attrs,
    pub edge_attr: Attrs,
    pub clusters: Vec<ClusterSpec>,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

impl DiagramSpec {
    pub fn output_file(&self) -> String {
        format!("{}.{}", self.filename, self.outformat)
    }

    /// Clusters whose parent is `parent` (None for top level), in creation order.
    pub fn child_clusters(&self, parent: Option<usize>) -> impl Iterator<Item = (usize, &ClusterSpec)> {
        self.clusters
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.parent == parent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSpec {
    pub label: String,
    pub direction: String,
    pub parent: Option<usize>,
    pub graph_attr: Attrs,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSpec {
    pub id: String,
    pub label: String,
    /// `provider.service.Class` for catalog nodes, `Custom` for custom icons.
    pub class: String,
    pub provider: Option<String>,
    pub service: Option<String>,
    /// Image path for custom nodes or resolved catalog icons.
    pub icon: Option<String>,
    pub cluster: Option<usize>,
    pub attrs: Attrs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    Forward,
    Back,
    Both,
    None,
}

impl EdgeDirection {
    pub fn from_flags(forward: bool, reverse: bool) -> Self {
        match (forward, reverse) {
            (true, true) => EdgeDirection::Both,
            (true, false) => EdgeDirection::Forward,
            (false, true) => EdgeDirection::Back,
            (false, false) => EdgeDirection::None,
        }
    }

    pub fn as_dot(self) -> &'static str {
        match self {
            EdgeDirection::Forward => "forward",
            EdgeDirection::Back => "back",
            EdgeDirection::Both => "both",
            EdgeDirection::None => "none",
        }
    }
}

/// An edge between two nodes, indexed into `DiagramSpec::nodes`. `tail` is
/// always the operand written on the left.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeSpec {
    pub tail: usize,
    pub head: usize,
    pub direction: EdgeDirection,
    pub label: String,
    pub color: String,
    pub style: String,
    pub attrs: Attrs,
}
