use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use stencil_core::catalog::PROVIDERS;
use stencil_core::dsl::{Limits, Namespace};
use stencil_core::render::{RenderError, Renderer};
use stencil_core::{DiagramGenerator, GenerateRequest, OutputFormat, Scanner, Status};

/// Writes the layout script to the output file instead of rendering it.
#[derive(Default)]
struct ScriptRenderer {
    calls: Mutex<Vec<(PathBuf, OutputFormat)>>,
    svg_body: Option<String>,
}

#[async_trait]
impl Renderer for ScriptRenderer {
    fn name(&self) -> &'static str {
        "script"
    }

    async fn render(&self, dot: &str, output: &Path, format: OutputFormat) -> Result<(), RenderError> {
        self.calls.lock().unwrap().push((output.to_path_buf(), format));
        let body = match (&self.svg_body, format) {
            (Some(svg), OutputFormat::Svg) => svg.clone(),
            _ => dot.to_string(),
        };
        tokio::fs::write(output, body).await?;
        Ok(())
    }
}

/// Never produces a file.
struct SilentRenderer;

#[async_trait]
impl Renderer for SilentRenderer {
    fn name(&self) -> &'static str {
        "silent"
    }

    async fn render(&self, _: &str, _: &Path, _: OutputFormat) -> Result<(), RenderError> {
        Ok(())
    }
}

const WEB: &str = "with Diagram(\"Web Service\", show=True, filename=\"elsewhere\"):\n    AppServices(\"web\") >> SQLDatabases(\"db\")\n";

fn generator(renderer: Arc<dyn Renderer>) -> DiagramGenerator {
    DiagramGenerator::new(Scanner::new(), renderer)
}

#[tokio::test]
async fn renders_into_workspace_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(ScriptRenderer::default());
    let result = generator(renderer.clone())
        .generate(GenerateRequest::new(WEB).filename("web").workspace_dir(dir.path()))
        .await;

    let expected = dir.path().join("generated-diagrams").join("web.png");
    assert_eq!(result.status, Status::Success, "{}", result.message);
    assert_eq!(result.path.as_deref(), Some(expected.to_str().unwrap()));
    assert_eq!(
        result.message,
        format!("Diagram generated successfully at {}", expected.display())
    );

    // the script's own filename was overridden
    let calls = renderer.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![(expected.clone(), OutputFormat::Png)]);
    let dot = std::fs::read_to_string(&expected).unwrap();
    assert!(dot.contains("label=\"web\""));
    assert!(dot.contains("node_0 -> node_1"));
}

#[tokio::test]
async fn scan_gate_blocks_before_anything_runs() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(ScriptRenderer::default());
    let gen = generator(renderer.clone());
    for (code, reason) in [
        ("with Diagram(\"x\"):\n    exec(\"1\")\n", "Dangerous function call: exec"),
        ("with Diagram(\"x\"):\n    eval(\"1\")\n", "Dangerous function call: eval"),
        ("os.system(\"ls\")\nwith Diagram(\"x\"):\n    pass\n", "Dangerous function call: os.system"),
        ("import os\nwith Diagram(\"x\"):\n    pass\n", "Import statements are not allowed: os"),
    ] {
        let result = gen
            .generate(GenerateRequest::new(code).workspace_dir(dir.path()))
            .await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.message, format!("Security scan failed: {reason}"));
        assert_eq!(result.path, None);
    }
    assert!(renderer.calls.lock().unwrap().is_empty());
    assert!(!dir.path().join("generated-diagrams").exists());
}

#[tokio::test]
async fn validation_errors() {
    let gen = generator(Arc::new(ScriptRenderer::default()));

    let result = gen.generate(GenerateRequest::new(WEB).timeout_secs(0)).await;
    assert_eq!(result.message, "Timeout must be between 1 and 300 seconds");
    let result = gen.generate(GenerateRequest::new(WEB).timeout_secs(301)).await;
    assert_eq!(result.status, Status::Error);

    let result = gen.generate(GenerateRequest::new(WEB).output_format("pdf")).await;
    assert_eq!(result.message, "Unsupported output format. Supported values are png and svg.");

    let dir = tempfile::tempdir().unwrap();
    let result = gen
        .generate(GenerateRequest::new("x = 1\n").workspace_dir(dir.path()))
        .await;
    assert_eq!(
        result.message,
        "Code must contain a Diagram() call. Example: with Diagram(\"My Diagram\"):"
    );
}

#[tokio::test]
async fn infinite_loop_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let code = "with Diagram(\"spin\"):\n    while True:\n        pass\n";
    let started = std::time::Instant::now();
    let result = generator(Arc::new(ScriptRenderer::default()))
        .generate(GenerateRequest::new(code).timeout_secs(1).workspace_dir(dir.path()))
        .await;
    assert_eq!(result.status, Status::Error);
    assert_eq!(result.message, "Diagram generation timed out after 1 seconds");
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn evaluation_errors_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let result = generator(Arc::new(ScriptRenderer::default()))
        .generate(GenerateRequest::new("with Diagram(\"x\"):\n    Nope(\"a\")\n").workspace_dir(dir.path()))
        .await;
    assert_eq!(
        result.message,
        "Diagram generation failed: name 'Nope' is not defined (line 2)"
    );
}

#[tokio::test]
async fn missing_output_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = generator(Arc::new(SilentRenderer))
        .generate(GenerateRequest::new(WEB).filename("ghost").workspace_dir(dir.path()))
        .await;
    let expected = dir.path().join("generated-diagrams").join("ghost.png");
    assert_eq!(
        result.message,
        format!("Diagram file was not generated at {}", expected.display())
    );
}

#[tokio::test]
async fn svg_output_gets_images_inlined() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("generated-diagrams");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("icon.png"), b"png-bytes").unwrap();

    let renderer = Arc::new(ScriptRenderer {
        svg_body: Some("<svg><image xlink:href=\"icon.png\"/></svg>".into()),
        ..Default::default()
    });
    let result = generator(renderer)
        .generate(
            GenerateRequest::new(WEB)
                .filename("web.svg")
                .output_format(" SVG ")
                .workspace_dir(dir.path()),
        )
        .await;
    assert_eq!(result.status, Status::Success, "{}", result.message);
    let svg = std::fs::read_to_string(out.join("web.svg")).unwrap();
    assert_eq!(svg, "<svg><image xlink:href=\"data:image/png;base64,cG5nLWJ5dGVz\"/></svg>");
}

#[tokio::test]
async fn examples_render() {
    let dir = tempfile::tempdir().unwrap();
    let gen = generator(Arc::new(ScriptRenderer::default()));
    for (name, code) in stencil_core::catalog::examples(stencil_core::catalog::DiagramType::All) {
        let result = gen
            .generate(GenerateRequest::new(code).filename(name.clone()).workspace_dir(dir.path()))
            .await;
        assert_eq!(result.status, Status::Success, "{name}: {}", result.message);
    }
}

#[tokio::test]
async fn default_workspace_applies_when_request_names_none() {
    let dir = tempfile::tempdir().unwrap();
    let result = generator(Arc::new(ScriptRenderer::default()))
        .with_default_workspace(dir.path())
        .generate(GenerateRequest::new(WEB).filename("web"))
        .await;
    let expected = dir.path().join("generated-diagrams").join("web.png");
    assert_eq!(result.path.as_deref(), Some(expected.to_str().unwrap()));

    // a per-request workspace wins
    let other = tempfile::tempdir().unwrap();
    let result = generator(Arc::new(ScriptRenderer::default()))
        .with_default_workspace(dir.path())
        .generate(GenerateRequest::new(WEB).filename("web").workspace_dir(other.path()))
        .await;
    assert!(result.path.unwrap().starts_with(other.path().to_str().unwrap()));
}

#[tokio::test]
async fn generator_limits_are_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let result = generator(Arc::new(ScriptRenderer::default()))
        .with_limits(Limits {
            max_nodes: 1,
            ..Limits::default()
        })
        .generate(GenerateRequest::new(WEB).workspace_dir(dir.path()))
        .await;
    assert_eq!(result.status, Status::Error);
    assert_eq!(result.message, "Diagram generation failed: node limit of 1 exceeded (line 2)");
}

#[tokio::test]
async fn runaway_string_growth_is_an_error_result() {
    let dir = tempfile::tempdir().unwrap();
    let code = "with Diagram(\"x\"):\n    s = \"a\"\n    while True:\n        s = s + s\n";
    let result = generator(Arc::new(ScriptRenderer::default()))
        .generate(GenerateRequest::new(code).workspace_dir(dir.path()))
        .await;
    assert_eq!(
        result.message,
        "Diagram generation failed: value size limit of 100000 exceeded (line 4)"
    );
}

#[tokio::test]
async fn deeply_nested_script_is_rejected_by_the_scan() {
    let dir = tempfile::tempdir().unwrap();
    let code = format!("with Diagram(\"x\"):\n    n = {}1{}\n", "[".repeat(5000), "]".repeat(5000));
    let result = generator(Arc::new(ScriptRenderer::default()))
        .generate(GenerateRequest::new(code).workspace_dir(dir.path()))
        .await;
    assert_eq!(result.status, Status::Error);
    assert!(result
        .message
        .starts_with("Security scan failed: Syntax error: too many nested expressions"));
}

#[tokio::test]
async fn namespace_icons_reach_the_layout_script() {
    let dir = tempfile::tempdir().unwrap();
    let icons = dir.path().join("icons");
    let namespace = Namespace::from_catalog(PROVIDERS).with_icon_dir(Some(icons.clone()));
    let class = namespace.lookup("AppServices").unwrap().clone();
    let icon = icons
        .join(class.provider)
        .join(class.service)
        .join("appservices.png");
    std::fs::create_dir_all(icon.parent().unwrap()).unwrap();
    std::fs::write(&icon, b"png").unwrap();

    let result = generator(Arc::new(ScriptRenderer::default()))
        .with_namespace(namespace)
        .generate(GenerateRequest::new(WEB).filename("icons").workspace_dir(dir.path()))
        .await;
    let dot = std::fs::read_to_string(result.path.unwrap()).unwrap();
    assert!(dot.contains(&format!("image=\"{}\"", icon.display())));
}
