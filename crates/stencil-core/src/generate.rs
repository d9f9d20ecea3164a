//! The diagram generation pipeline: scan, evaluate under a deadline, render,
//! post-process.

use crate::catalog::PROVIDERS;
use crate::config::{timeout_in_range, Config, DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};
use crate::dsl::{self, Limits, Namespace};
use crate::linter::BanditLinter;
use crate::render::{to_dot, GraphvizRenderer, Renderer};
use crate::{svg, ExecutionResult, OutputFormat, Scanner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Directory created under the workspace for relative output names.
pub const OUTPUT_DIR_NAME: &str = "generated-diagrams";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub code: String,
    /// Output name without extension. Absolute paths pick the directory too.
    pub filename: Option<String>,
    pub timeout_secs: u64,
    pub workspace_dir: Option<PathBuf>,
    pub output_format: String,
}

impl GenerateRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            filename: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            workspace_dir: None,
            output_format: OutputFormat::Png.to_string(),
        }
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = Some(dir.into());
        self
    }

    pub fn output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }
}

/// Output location for one request: `<dir>/<stem>` plus the format extension.
fn resolve_output(filename: Option<&str>, workspace: Option<&Path>) -> std::io::Result<(PathBuf, PathBuf)> {
    let mut name = match filename.map(str::trim).filter(|f| !f.is_empty()) {
        Some(f) => f.to_string(),
        None => format!("diagram_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
    };
    for ext in [".png", ".svg"] {
        if let Some(stripped) = name.strip_suffix(ext) {
            name = stripped.to_string();
            break;
        }
    }
    let path = PathBuf::from(&name);
    if path.is_absolute() {
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/"));
        return Ok((dir, path));
    }
    let base = match workspace {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let dir = base.join(OUTPUT_DIR_NAME);
    let path = dir.join(&name);
    Ok((dir, path))
}

/// Runs diagram scripts end to end. Cheap to clone and safe to share
/// between concurrent requests; each call gets its own evaluator, token
/// and output path.
#[derive(Clone)]
pub struct DiagramGenerator {
    scanner: Scanner,
    renderer: Arc<dyn Renderer>,
    namespace: Arc<Namespace>,
    limits: Limits,
    default_workspace: Option<PathBuf>,
}

impl DiagramGenerator {
    pub fn new(scanner: Scanner, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            scanner,
            renderer,
            namespace: Arc::new(Namespace::from_catalog(PROVIDERS)),
            limits: Limits::default(),
            default_workspace: None,
        }
    }

    /// Build a generator from configuration. A linter or renderer that
    /// cannot be found is logged; generation then runs without the linter,
    /// and fails at render time with a descriptive message.
    pub fn from_config(config: &Config) -> Self {
        let renderer = match GraphvizRenderer::discover(&config.renderer.dot_executable) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "graphviz not available; diagram rendering will fail");
                GraphvizRenderer::new(&config.renderer.dot_executable)
            }
        };

        let scanner = if config.linter.enabled {
            let timeout = Duration::from_secs(config.linter.timeout_secs);
            match BanditLinter::discover(&config.linter.executable, timeout) {
                Ok(linter) => Scanner::with_linter(Arc::new(linter)),
                Err(e) => {
                    info!(error = %e, "security linter unavailable, using built-in checks only");
                    Scanner::new()
                }
            }
        } else {
            Scanner::new()
        };

        let namespace = Namespace::from_catalog(PROVIDERS).with_icon_dir(config.icon_dir.clone());
        Self {
            scanner,
            renderer: Arc::new(renderer),
            namespace: Arc::new(namespace),
            limits: config.limits,
            default_workspace: config.workspace_dir.clone(),
        }
    }

    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Arc::new(namespace);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_default_workspace(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_workspace = Some(dir.into());
        self
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    #[instrument(skip_all, fields(timeout = request.timeout_secs, format = %request.output_format))]
    pub async fn generate(&self, request: GenerateRequest) -> ExecutionResult {
        let timeout = request.timeout_secs;
        if !timeout_in_range(timeout) {
            return ExecutionResult::error(format!(
                "Timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds"
            ));
        }

        let scan = self.scanner.scan(&request.code).await;
        if scan.has_errors {
            return ExecutionResult::error(format!("Security scan failed: {}", scan.failure_summary()));
        }

        let Some(format) = OutputFormat::parse(&request.output_format) else {
            return ExecutionResult::error("Unsupported output format. Supported values are png and svg.");
        };

        let workspace = request.workspace_dir.as_deref().or(self.default_workspace.as_deref());
        let (output_dir, output_path) = match resolve_output(request.filename.as_deref(), workspace) {
            Ok(p) => p,
            Err(e) => return ExecutionResult::error(format!("Diagram generation failed: {e}")),
        };
        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            return ExecutionResult::error(format!("Diagram generation failed: {e}"));
        }

        let mut program = match dsl::parse(&request.code) {
            Ok(p) => p,
            Err(e) => return ExecutionResult::error(format!("Diagram generation failed: {e}")),
        };
        if !dsl::contains_diagram_call(&program) {
            return ExecutionResult::error(
                "Code must contain a Diagram() call. Example: with Diagram(\"My Diagram\"):",
            );
        }
        let output_stem = output_path.to_string_lossy().into_owned();
        dsl::normalize_diagram_calls(&mut program, &output_stem, format.extension());
        let generated = format!("{output_stem}.{format}");

        let deadline = Instant::now() + Duration::from_secs(timeout);
        let timed_out = || ExecutionResult::error(format!("Diagram generation timed out after {timeout} seconds"));

        let cancel = CancellationToken::new();
        let worker = {
            let cancel = cancel.clone();
            let namespace = Arc::clone(&self.namespace);
            let limits = self.limits;
            tokio::task::spawn_blocking(move || dsl::evaluate(&program, &namespace, limits, &cancel))
        };
        let spec = match tokio::time::timeout_at(deadline, worker).await {
            Err(_) => {
                // the worker sees the token at its next statement and unwinds
                cancel.cancel();
                warn!(timeout, "diagram evaluation timed out");
                return timed_out();
            }
            Ok(Err(join)) => return ExecutionResult::error(format!("Diagram generation failed: {join}")),
            Ok(Ok(Err(e))) => return ExecutionResult::error(format!("Diagram generation failed: {e}")),
            Ok(Ok(Ok(None))) => {
                return ExecutionResult::error(format!("Diagram file was not generated at {generated}"))
            }
            Ok(Ok(Ok(Some(spec)))) => spec,
        };
        debug!(nodes = spec.nodes.len(), edges = spec.edges.len(), "diagram evaluated");

        let dot = to_dot(&spec);
        let target = PathBuf::from(spec.output_file());
        match tokio::time::timeout_at(deadline, self.renderer.render(&dot, &target, spec.outformat)).await {
            Err(_) => return timed_out(),
            Ok(Err(e)) => return ExecutionResult::error(format!("Diagram generation failed: {e}")),
            Ok(Ok(())) => {}
        }

        if !tokio::fs::try_exists(&generated).await.unwrap_or(false) {
            return ExecutionResult::error(format!("Diagram file was not generated at {generated}"));
        }
        if format == OutputFormat::Svg {
            let svg_path = PathBuf::from(&generated);
            match tokio::task::spawn_blocking(move || svg::inline_images(&svg_path)).await {
                Ok(None) => {}
                Ok(Some(message)) => return ExecutionResult::error(message),
                Err(join) => return ExecutionResult::error(format!("Diagram generation failed: {join}")),
            }
        }
        info!(path = %generated, "diagram generated");
        ExecutionResult::success(generated.clone(), format!("Diagram generated successfully at {generated}"))
    }
}
