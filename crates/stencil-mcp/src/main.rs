use base64::Engine as _;
use clap::{Parser, Subcommand};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use stencil_core::catalog::{self, DiagramType};
use stencil_core::config::{Config, ConfigError};
use stencil_core::edit;
use stencil_core::{guide, scanner, template, DiagramGenerator, ExecutionResult, GenerateRequest, GraphModel};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// --- CLI ---

#[derive(Debug, Parser)]
#[command(name = "stencil-mcp", version, about = "MCP stdio server for diagram scripts and Bicep resource graphs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON config file; command-line flags and environment variables override it
    #[arg(long, env = "STENCIL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Directory that receives `generated-diagrams/` when a call names none
    #[arg(long, env = "STENCIL_WORKSPACE_DIR", global = true)]
    workspace_dir: Option<PathBuf>,

    /// Timeout in seconds used when a call does not pass one (1-300)
    #[arg(long, env = "STENCIL_DEFAULT_TIMEOUT", global = true)]
    default_timeout: Option<u64>,

    /// Graphviz `dot` executable
    #[arg(long, env = "STENCIL_DOT", global = true)]
    dot: Option<String>,

    /// Bandit executable used as an extra security linter
    #[arg(long, env = "STENCIL_BANDIT", global = true)]
    bandit: Option<String>,

    /// Skip the external security linter
    #[arg(long, env = "STENCIL_NO_LINTER", global = true)]
    no_linter: bool,

    /// Local icon pack laid out as <provider>/<service>/<class>.png
    #[arg(long, env = "STENCIL_ICON_DIR", global = true)]
    icon_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register stencil-mcp with the MCP clients installed on this machine
    Init,
    /// Serve MCP over stdio (the default)
    Serve,
}

impl Cli {
    fn to_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(dir) = &self.workspace_dir {
            config.workspace_dir = Some(dir.clone());
        }
        if let Some(secs) = self.default_timeout {
            config.default_timeout_secs = secs;
        }
        if let Some(dot) = &self.dot {
            config.renderer.dot_executable = dot.clone();
        }
        if let Some(bandit) = &self.bandit {
            config.linter.executable = bandit.clone();
        }
        if self.no_linter {
            config.linter.enabled = false;
        }
        if let Some(dir) = &self.icon_dir {
            config.icon_dir = Some(dir.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

// --- Request types ---

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
struct RenderOptions {
    /// Optional output filename for the generated diagram (without extension). Absolute paths choose the output directory.
    filename: Option<String>,
    /// Timeout in seconds for diagram generation (1-300). Defaults to the server setting, normally 90.
    timeout: Option<u64>,
    /// Optional workspace directory; output goes to <workspace_dir>/generated-diagrams/.
    workspace_dir: Option<String>,
    /// Output render format for the diagram. Supported values: png, svg.
    output_format: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GenerateDiagramRequest {
    /// Diagram script. Must contain a `with Diagram(...)` block. No imports; all node classes are pre-loaded.
    code: String,
    #[serde(flatten)]
    options: RenderOptions,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ScanCodeRequest {
    /// Diagram script to scan without running it
    code: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ExamplesRequest {
    /// The type of diagram examples to retrieve. Options: azure, sequence, flow, class, k8s, onprem, custom, all.
    diagram_type: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListIconsRequest {
    /// Optional filter to narrow results by provider name (e.g. azure, k8s, onprem).
    provider_filter: Option<String>,
    /// Optional filter to narrow results by service name (e.g. compute, database, network).
    service_filter: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct PreviewBicepRequest {
    /// Bicep source code to parse into a resource/dependency graph preview.
    bicep_code: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct BicepDiagramRequest {
    /// Bicep source code to parse and render as a diagram.
    bicep_code: String,
    #[serde(flatten)]
    options: RenderOptions,
    /// Optional previous graph model used to compute graphDiff.
    previous_graph_model: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SelectComponentRequest {
    /// Current resource graph model payload with resources and edges.
    graph_model: Value,
    /// Selection intent. Use {"componentKind":"resource","symbolicName":"..."} or {"componentKind":"edge","from":"...","to":"...","edgeKind":"dependsOn"}.
    selection_intent: Value,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct EditRequest {
    /// Current graph model payload.
    graph_model: Value,
    /// Edit intent: {"action": "add_resource" | "remove_resource" | "set_resource_type" | "rename_resource" | "add_dependency" | "remove_dependency", ...}.
    edit_intent: Value,
    /// Optional selected component payload returned by select_component.
    selected_component: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct InteractionRequest {
    /// Interaction type, e.g. select, drag_start, drag_end.
    event_type: String,
    /// Optional selected diagram element ID emitted by the viewer.
    element_id: Option<String>,
    /// Optional element kind, e.g. node or edge.
    element_kind: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderPayload {
    status: &'static str,
    path: Option<String>,
    message: String,
    render_format: &'static str,
    image_data: String,
    svg_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    graph_model: Option<GraphModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    graph_diff: Option<stencil_core::GraphDiff>,
}

impl RenderPayload {
    /// Read the rendered file into the payload: svg passes through as text,
    /// anything else is base64 encoded.
    async fn from_result(result: &ExecutionResult) -> Self {
        let mut payload = RenderPayload {
            status: result.status.as_str(),
            path: result.path.clone(),
            message: result.message.clone(),
            render_format: "png",
            image_data: String::new(),
            svg_data: String::new(),
            graph_model: None,
            graph_diff: None,
        };
        let Some(path) = result.path.as_deref().map(Path::new) else {
            return payload;
        };
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return payload;
        }
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("svg")) {
            payload.render_format = "svg";
            payload.svg_data = tokio::fs::read_to_string(path).await.unwrap_or_default();
        } else if let Ok(bytes) = tokio::fs::read(path).await {
            payload.image_data = base64::engine::general_purpose::STANDARD.encode(bytes);
        }
        payload
    }
}

// --- Server ---

#[derive(Clone)]
pub struct StencilServer {
    tool_router: ToolRouter<Self>,
    generator: DiagramGenerator,
    default_timeout: u64,
}

fn json_text(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("Serialization error: {}", e))
}

fn json_result(value: &impl Serialize) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(json_text(value))]))
}

fn json_error(value: &impl Serialize) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(json_text(value))]))
}

/// Text result for the agent plus the full payload for viewer apps.
fn render_result(payload: RenderPayload) -> Result<CallToolResult, McpError> {
    let is_error = payload.status != "success";
    let text = if is_error {
        format!("Error: {}", payload.message)
    } else {
        payload.message.clone()
    };
    let mut result = if is_error {
        CallToolResult::error(vec![Content::text(text)])
    } else {
        CallToolResult::success(vec![Content::text(text)])
    };
    result.structured_content = serde_json::to_value(&payload).ok();
    Ok(result)
}

#[tool_router]
impl StencilServer {
    pub fn new(config: &Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            generator: DiagramGenerator::from_config(config),
            default_timeout: config.default_timeout_secs,
        }
    }

    fn request(&self, code: String, options: RenderOptions) -> GenerateRequest {
        let mut request = GenerateRequest::new(code)
            .timeout_secs(options.timeout.unwrap_or(self.default_timeout))
            .output_format(options.output_format.unwrap_or_else(|| "png".to_string()));
        if let Some(filename) = options.filename {
            request = request.filename(filename);
        }
        if let Some(dir) = options.workspace_dir.filter(|d| !d.trim().is_empty()) {
            request = request.workspace_dir(dir);
        }
        request
    }

    #[tool(
        description = "Generate a diagram from a diagram script. The script must contain a `with Diagram(\"Title\"):` block; node classes (see list_icons), Cluster, Edge and Custom are pre-loaded and imports are rejected. The script is security-scanned before it runs. Returns the output path; structured content carries renderFormat plus base64 imageData (png) or svgData (svg)."
    )]
    async fn generate_diagram(
        &self,
        Parameters(req): Parameters<GenerateDiagramRequest>,
    ) -> Result<CallToolResult, McpError> {
        let result = self.generator.generate(self.request(req.code, req.options)).await;
        render_result(RenderPayload::from_result(&result).await)
    }

    #[tool(description = "Regenerate a diagram from updated script code. Same inputs and outputs as generate_diagram; used by viewer apps.")]
    async fn refresh_diagram(
        &self,
        Parameters(req): Parameters<GenerateDiagramRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.generate_diagram(Parameters(req)).await
    }

    #[tool(
        description = "Security-scan a diagram script without running it. Returns {syntaxValid, hasErrors, issues, errorMessage?, metrics, dangerousFunctions: [{function, line, code, suggestion}]}."
    )]
    async fn scan_code(&self, Parameters(req): Parameters<ScanCodeRequest>) -> Result<CallToolResult, McpError> {
        let result = self.generator.scanner().scan(&req.code).await;
        let dangerous: Vec<Value> = scanner::check_dangerous(&req.code)
            .into_iter()
            .map(|d| {
                json!({
                    "function": d.function,
                    "line": d.line,
                    "code": d.code,
                    "suggestion": scanner::fix_suggestion(&d.function),
                })
            })
            .collect();
        let mut body = serde_json::to_value(&result).unwrap_or_else(|_| json!({}));
        body["dangerousFunctions"] = Value::Array(dangerous);
        json_result(&body)
    }

    #[tool(
        description = "Get example diagram scripts for a diagram type. Options: azure, sequence, flow, class, k8s, onprem, custom, all. Unknown types return all examples."
    )]
    fn get_diagram_examples(&self, Parameters(req): Parameters<ExamplesRequest>) -> Result<CallToolResult, McpError> {
        let kind = DiagramType::parse_lenient(req.diagram_type.as_deref().unwrap_or("all"));
        json_result(&json!({ "examples": catalog::examples(kind) }))
    }

    #[tool(description = "List available diagram node classes organized by provider and service, with optional case-insensitive substring filters.")]
    fn list_icons(&self, Parameters(req): Parameters<ListIconsRequest>) -> Result<CallToolResult, McpError> {
        json_result(&catalog::list_icons(
            req.provider_filter.as_deref(),
            req.service_filter.as_deref(),
        ))
    }

    #[tool(
        description = "Preview the resource graph of a Bicep template: resources, explicit dependsOn edges and dependencies that do not map to local resources."
    )]
    fn preview_bicep_graph(&self, Parameters(req): Parameters<PreviewBicepRequest>) -> Result<CallToolResult, McpError> {
        let graph = template::parse_graph(&req.bicep_code);
        if graph.is_success() {
            json_result(&graph)
        } else {
            json_error(&graph)
        }
    }

    #[tool(description = "Parse a Bicep template and render its resource graph as a diagram. Structured content includes graphModel.")]
    async fn generate_diagram_from_bicep(
        &self,
        Parameters(req): Parameters<BicepDiagramRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.bicep_diagram(req.bicep_code, req.options, None).await
    }

    #[tool(
        description = "Re-render a Bicep diagram after the template changed. When previous_graph_model is given and the new template parses, structured content includes graphDiff {addedResources, removedResources, addedEdges, removedEdges}."
    )]
    async fn update_diagram_from_bicep(
        &self,
        Parameters(req): Parameters<BicepDiagramRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.bicep_diagram(req.bicep_code, req.options, req.previous_graph_model).await
    }

    #[tool(description = "Resolve a resource or edge selection against a graph model. Returns found, component and the normalized selectedComponent.")]
    fn select_component(
        &self,
        Parameters(req): Parameters<SelectComponentRequest>,
    ) -> Result<CallToolResult, McpError> {
        let graph = edit::normalize_graph(&req.graph_model);
        let outcome = edit::resolve_selection(&graph, &req.selection_intent);
        if let Some(error) = outcome.error {
            return json_error(&json!({
                "status": "error",
                "message": error.to_string(),
                "selectedComponent": outcome.selection,
                "component": Value::Null,
                "found": false,
            }));
        }
        let found = outcome.component.is_some();
        json_result(&json!({
            "status": "success",
            "message": if found { "Component selected." } else { "Component not found." },
            "selectedComponent": outcome.selection,
            "component": outcome.component,
            "found": found,
        }))
    }

    #[tool(description = "Preview a deterministic graph edit: returns the normalized editIntent and graphDiff without changing anything.")]
    fn preview_edit(&self, Parameters(req): Parameters<EditRequest>) -> Result<CallToolResult, McpError> {
        self.edit(req, false)
    }

    #[tool(
        description = "Apply a deterministic graph edit (add_resource, remove_resource, set_resource_type, rename_resource, add_dependency, remove_dependency). Returns the updated graphModel and graphDiff; on error the graph is returned unchanged."
    )]
    fn apply_edit(&self, Parameters(req): Parameters<EditRequest>) -> Result<CallToolResult, McpError> {
        self.edit(req, true)
    }

    #[tool(description = "Receive interaction events (select, drag_start, drag_end) from the diagram viewer.")]
    fn report_diagram_interaction(
        &self,
        Parameters(req): Parameters<InteractionRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!(event = %req.event_type, element = ?req.element_id, "viewer interaction");
        json_result(&json!({
            "status": "success",
            "eventType": req.event_type,
            "elementId": req.element_id,
            "elementKind": req.element_kind,
        }))
    }
}

impl StencilServer {
    async fn bicep_diagram(
        &self,
        bicep_code: String,
        options: RenderOptions,
        previous: Option<Value>,
    ) -> Result<CallToolResult, McpError> {
        let graph = template::parse_graph(&bicep_code);
        let graph_diff = match &previous {
            Some(prev) if graph.is_success() => Some(edit::diff(&graph, &edit::normalize_graph(prev))),
            _ => None,
        };

        if !graph.is_success() {
            let mut payload = RenderPayload::from_result(&ExecutionResult::error(graph.message.clone())).await;
            payload.graph_model = Some(graph);
            payload.graph_diff = graph_diff;
            return render_result(payload);
        }

        let script = template::graph_to_script(&graph);
        let result = self.generator.generate(self.request(script, options)).await;
        let mut payload = RenderPayload::from_result(&result).await;
        payload.graph_model = Some(graph);
        payload.graph_diff = graph_diff;
        render_result(payload)
    }

    fn edit(&self, req: EditRequest, apply: bool) -> Result<CallToolResult, McpError> {
        let previous = edit::normalize_graph(&req.graph_model);
        let selection = req.selected_component.as_ref().and_then(edit::normalize_selection);
        let outcome = edit::apply_edit(&previous, &req.edit_intent, selection.as_ref());
        let graph_diff = edit::diff(&outcome.graph, &previous);

        let mut body = json!({
            "selectedComponent": selection,
            "editIntent": outcome.intent,
            "graphDiff": graph_diff,
        });
        match outcome.error {
            Some(error) => {
                body["status"] = json!("error");
                body["message"] = json!(error.to_string());
                if apply {
                    body["graphModel"] = json!(previous);
                }
                json_error(&body)
            }
            None => {
                body["status"] = json!("success");
                body["message"] = json!(if apply { "Edit applied." } else { "Preview generated." });
                if apply {
                    body["graphModel"] = json!(outcome.graph);
                }
                json_result(&body)
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for StencilServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(guide::server_instructions().into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Entry point ---

/// Logs go to stderr; stdout carries the JSON-RPC stream.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("STENCIL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if matches!(cli.command, Some(Command::Init)) {
        return init_project();
    }

    if std::io::stdin().is_terminal() {
        eprintln!("stencil-mcp is an MCP stdio server and must be launched by an MCP client.");
        eprintln!("Run `stencil-mcp init` in a project to register it, or `stencil-mcp --help` for options.");
        std::process::exit(1);
    }

    init_tracing();
    let config = cli.to_config()?;
    let server = StencilServer::new(&config);
    info!(
        timeout = config.default_timeout_secs,
        dot = %config.renderer.dot_executable,
        linter = server.generator.scanner().linter_name().unwrap_or("none"),
        "starting stencil-mcp"
    );

    let service = server
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| eprintln!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}

/// Write project-scoped MCP config files in the current directory for the
/// MCP clients found on PATH.
fn init_project() -> Result<(), Box<dyn std::error::Error>> {
    let binary_path = std::env::current_exe()?
        .canonicalize()?
        .to_string_lossy()
        .to_string();
    let cwd = std::env::current_dir()?;

    let has_claude = which::which("claude").is_ok();
    let has_codex = which::which("codex").is_ok();
    if !has_claude && !has_codex {
        eprintln!("Neither `claude` nor `codex` found in PATH.");
        eprintln!("Install one of them first, then re-run `stencil-mcp init`.");
        std::process::exit(1);
    }

    if has_claude {
        write_mcp_json(&cwd, &binary_path)?;
    }
    if has_codex {
        write_codex_config(&cwd, &binary_path)?;
    }
    let clients: Vec<&str> = [has_claude.then_some("Claude"), has_codex.then_some("Codex")]
        .into_iter()
        .flatten()
        .collect();
    eprintln!("\nDone. {} will use stencil in this project.", clients.join(" and "));
    Ok(())
}

/// Merge a `stencil` entry into `.mcp.json`.
fn write_mcp_json(cwd: &Path, binary_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = cwd.join(".mcp.json");
    let mut root: Value = if path.exists() {
        serde_json::from_str(&std::fs::read_to_string(&path)?).unwrap_or_else(|_| json!({}))
    } else {
        json!({})
    };
    if !root.get("mcpServers").is_some_and(Value::is_object) {
        root["mcpServers"] = json!({});
    }
    root["mcpServers"]["stencil"] = json!({
        "type": "stdio",
        "command": binary_path,
        "args": [],
    });
    std::fs::write(&path, serde_json::to_string_pretty(&root)?)?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

/// Merge a `stencil` server table into `.codex/config.toml`.
fn write_codex_config(cwd: &Path, binary_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let dir = cwd.join(".codex");
    let path = dir.join("config.toml");
    let mut doc: toml_edit::DocumentMut = if path.exists() {
        std::fs::read_to_string(&path)?.parse().unwrap_or_default()
    } else {
        toml_edit::DocumentMut::new()
    };
    if !doc.contains_table("mcp_servers") {
        doc["mcp_servers"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    let mut server = toml_edit::Table::new();
    server.insert("command", toml_edit::value(binary_path));
    server.insert("args", toml_edit::value(toml_edit::Array::new()));
    doc["mcp_servers"]["stencil"] = toml_edit::Item::Table(server);

    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, doc.to_string())?;
    eprintln!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> StencilServer {
        let config = Config {
            linter: stencil_core::config::LinterConfig {
                enabled: false,
                ..Default::default()
            },
            ..Config::default()
        };
        StencilServer::new(&config)
    }

    fn text(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect()
    }

    #[test]
    fn cli_flags_override_defaults() {
        let cli = Cli::parse_from(["stencil-mcp", "--default-timeout", "30", "--no-linter", "--dot", "/opt/dot"]);
        let config = cli.to_config().unwrap();
        assert_eq!(config.default_timeout_secs, 30);
        assert!(!config.linter.enabled);
        assert_eq!(config.renderer.dot_executable, "/opt/dot");

        let bad = Cli::parse_from(["stencil-mcp", "--default-timeout", "0"]);
        assert!(bad.to_config().is_err());
    }

    #[test]
    fn init_subcommand_parses() {
        let cli = Cli::parse_from(["stencil-mcp", "init"]);
        assert!(matches!(cli.command, Some(Command::Init)));
    }

    #[test]
    fn apply_edit_returns_graph_and_diff() {
        let req = EditRequest {
            graph_model: json!({
                "status": "success",
                "resources": [{"symbolicName": "stg", "resourceType": "Microsoft.Storage/storageAccounts"}],
                "edges": [],
            }),
            edit_intent: json!({"action": "add_resource", "resource": {"symbolicName": "app", "resourceType": "Microsoft.Web/sites", "dependsOn": ["stg"]}}),
            selected_component: None,
        };
        let result = server().apply_edit(Parameters(req)).unwrap();
        let body: Value = serde_json::from_str(&text(&result)).unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Edit applied.");
        assert_eq!(body["graphDiff"]["addedResources"][0]["symbolicName"], "app");
        assert_eq!(body["graphModel"]["resources"][1]["dependsOn"], json!(["stg"]));
    }

    #[test]
    fn failed_edit_is_a_tool_error() {
        let req = EditRequest {
            graph_model: json!({"status": "success", "resources": [], "edges": []}),
            edit_intent: json!({"action": "fly"}),
            selected_component: None,
        };
        let result = server().preview_edit(Parameters(req)).unwrap();
        assert_eq!(result.is_error, Some(true));
        let body: Value = serde_json::from_str(&text(&result)).unwrap();
        assert!(body["message"].as_str().unwrap().starts_with("Unsupported edit_intent.action."));
        assert!(body.get("graphModel").is_none());
    }

    #[test]
    fn select_component_reports_not_found() {
        let req = SelectComponentRequest {
            graph_model: json!({"resources": [{"symbolicName": "a", "resourceType": "T"}]}),
            selection_intent: json!({"componentKind": "resource", "symbolicName": "b"}),
        };
        let body: Value = serde_json::from_str(&text(&server().select_component(Parameters(req)).unwrap())).unwrap();
        assert_eq!(body["found"], false);
        assert_eq!(body["message"], "Component not found.");
        assert_eq!(body["selectedComponent"]["componentKind"], "resource");
    }

    #[tokio::test]
    async fn bicep_parse_errors_carry_graph_model() {
        let req = BicepDiagramRequest {
            bicep_code: "   ".into(),
            options: RenderOptions::default(),
            previous_graph_model: Some(json!({"resources": []})),
        };
        let result = server().update_diagram_from_bicep(Parameters(req)).await.unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(text(&result), "Error: No Bicep code provided.");
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["graphModel"]["status"], "error");
        assert!(structured.get("graphDiff").is_none());
    }

    #[tokio::test]
    async fn render_payload_carries_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let svg = dir.path().join("d.svg");
        std::fs::write(&svg, "<svg/>").unwrap();
        let payload = RenderPayload::from_result(&ExecutionResult::success(svg.to_string_lossy(), "ok")).await;
        assert_eq!(payload.render_format, "svg");
        assert_eq!(payload.svg_data, "<svg/>");
        assert!(payload.image_data.is_empty());

        let png = dir.path().join("d.png");
        std::fs::write(&png, b"png-bytes").unwrap();
        let payload = RenderPayload::from_result(&ExecutionResult::success(png.to_string_lossy(), "ok")).await;
        assert_eq!(payload.render_format, "png");
        assert_eq!(payload.image_data, "cG5nLWJ5dGVz");

        let missing = RenderPayload::from_result(&ExecutionResult::error("boom")).await;
        assert_eq!(missing.status, "error");
        assert!(missing.image_data.is_empty() && missing.svg_data.is_empty());
    }

    #[tokio::test]
    async fn scan_code_includes_suggestions() {
        let req = ScanCodeRequest {
            code: "with Diagram(\"x\"):\n    eval(\"1\")\n".into(),
        };
        let body: Value = serde_json::from_str(&text(&server().scan_code(Parameters(req)).await.unwrap())).unwrap();
        assert_eq!(body["hasErrors"], true);
        assert_eq!(
            body["dangerousFunctions"][0]["suggestion"],
            "Remove eval() call. Use literal values or ast.literal_eval() instead."
        );
    }
}
