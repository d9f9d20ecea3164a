//! Static analysis of diagram scripts and the scan gate that runs before any
//! script is evaluated.

use crate::dsl::ast::{ExprKind, StmtKind};
use crate::dsl::parse;
use crate::linter::SecurityLinter;
use crate::{CodeMetrics, DangerousUsage, Level, SecurityIssue, SourceScanResult};
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const DANGEROUS_BUILTINS: &[&str] = &[
    "exec",
    "eval",
    "compile",
    "getattr",
    "setattr",
    "delattr",
    "vars",
    "__import__",
    "breakpoint",
    "open",
    "globals",
    "locals",
    "spawn",
];

pub const DANGEROUS_ATTR_CALLS: &[&str] = &["os.system", "os.popen", "pickle.loads", "pickle.load"];

pub const DANGEROUS_DUNDERS: &[&str] = &[
    "__dict__",
    "__builtins__",
    "__class__",
    "__subclasses__",
    "__bases__",
    "__globals__",
    "__mro__",
];

const SUBPROCESS_PREFIX: &str = "subprocess.";

fn line_text(lines: &[&str], line: u32) -> String {
    line.checked_sub(1)
        .and_then(|i| lines.get(i as usize))
        .map(|l| l.trim().to_string())
        .unwrap_or_default()
}

/// Find dangerous calls and attribute accesses. Source that does not parse
/// is scanned line by line for any denylisted substring instead.
pub fn check_dangerous(source: &str) -> Vec<DangerousUsage> {
    let Ok(program) = parse(source) else {
        return check_dangerous_text(source);
    };
    let lines: Vec<&str> = source.lines().collect();
    let mut found = Vec::new();
    let mut push = |function: String, line: u32| {
        found.push(DangerousUsage {
            function,
            line,
            code: line_text(&lines, line),
        });
    };

    program.walk_exprs(&mut |e| match &e.kind {
        ExprKind::Call { func, .. } => {
            let Some(name) = func.dotted_name() else {
                return;
            };
            let base = name.rsplit('.').next().unwrap_or(&name);
            if DANGEROUS_BUILTINS.contains(&base) {
                push(name.clone(), e.line);
            }
            if DANGEROUS_ATTR_CALLS.contains(&name.as_str()) {
                push(name.clone(), e.line);
            }
            if name.starts_with(SUBPROCESS_PREFIX) {
                push(name, e.line);
            }
        }
        ExprKind::Attribute { attr, .. } if DANGEROUS_DUNDERS.contains(&attr.as_str()) => {
            push(attr.clone(), e.line);
        }
        _ => {}
    });
    found
}

fn check_dangerous_text(source: &str) -> Vec<DangerousUsage> {
    let patterns: BTreeSet<&str> = DANGEROUS_BUILTINS
        .iter()
        .chain(DANGEROUS_ATTR_CALLS)
        .chain(DANGEROUS_DUNDERS)
        .copied()
        .chain(std::iter::once(SUBPROCESS_PREFIX))
        .collect();
    let mut found = Vec::new();
    for (i, line) in source.lines().enumerate() {
        let stripped = line.trim();
        for pattern in &patterns {
            if stripped.contains(pattern) {
                found.push(DangerousUsage {
                    function: pattern.to_string(),
                    line: i as u32 + 1,
                    code: stripped.to_string(),
                });
            }
        }
    }
    found
}

/// Check that `source` parses and contains no import statements.
pub fn validate_syntax(source: &str) -> Result<(), String> {
    let program = parse(source).map_err(|e| format!("Syntax error: {e}"))?;
    let mut rejected = None;
    program.walk_stmts(&mut |s| {
        if rejected.is_some() {
            return;
        }
        match &s.kind {
            StmtKind::Import(names) => {
                let modules = names.iter().map(|n| n.name.as_str()).collect::<Vec<_>>().join(", ");
                rejected = Some(modules);
            }
            StmtKind::FromImport { module, .. } => rejected = Some(module.clone().unwrap_or_default()),
            _ => {}
        }
    });
    match rejected {
        Some(module) => Err(format!("Import statements are not allowed: {module}")),
        None => Ok(()),
    }
}

/// Human-readable remediation for a denylisted function or attribute.
pub fn fix_suggestion(function: &str) -> String {
    if function.starts_with(SUBPROCESS_PREFIX) {
        return "Remove subprocess usage. Running external processes is not allowed.".to_string();
    }
    let text = match function {
        "exec" => "Remove exec() call. Dynamic code execution is not allowed.",
        "eval" => "Remove eval() call. Use literal values or ast.literal_eval() instead.",
        "compile" => "Remove compile() call. Dynamic code compilation is not allowed.",
        "getattr" => "Remove getattr() call. Use direct attribute access instead.",
        "setattr" => "Remove setattr() call. Use direct attribute assignment instead.",
        "delattr" => "Remove delattr() call. Use del statement on known attributes instead.",
        "vars" => "Remove vars() call. Use explicit attribute access instead.",
        "__import__" => "Remove __import__() call. Import statements are not allowed.",
        "breakpoint" => "Remove breakpoint() call. Debugging is not allowed in diagram code.",
        "open" => "Remove open() call. File I/O is not allowed in diagram code.",
        "globals" => "Remove globals() call. Accessing global scope is not allowed.",
        "locals" => "Remove locals() call. Accessing local scope is not allowed.",
        "spawn" => "Remove spawn() call. Process spawning is not allowed.",
        "os.system" => "Remove os.system() call. Shell command execution is not allowed.",
        "os.popen" => "Remove os.popen() call. Shell command execution is not allowed.",
        "pickle.loads" => "Remove pickle.loads() call. Deserialization is not allowed.",
        "pickle.load" => "Remove pickle.load() call. Deserialization is not allowed.",
        "__dict__" => "Remove __dict__ access. Direct dictionary access on objects is not allowed.",
        "__builtins__" => "Remove __builtins__ access. Accessing built-in scope is not allowed.",
        "__class__" => "Remove __class__ access. Class introspection is not allowed.",
        "__subclasses__" => "Remove __subclasses__() access. Class hierarchy traversal is not allowed.",
        "__bases__" => "Remove __bases__ access. Class hierarchy inspection is not allowed.",
        "__globals__" => "Remove __globals__ access. Accessing global scope is not allowed.",
        "__mro__" => "Remove __mro__ access. Method resolution order inspection is not allowed.",
        other => return format!("Remove usage of {other}. This function is not allowed in diagram code."),
    };
    text.to_string()
}

pub fn count_metrics(source: &str) -> CodeMetrics {
    let mut total_lines = 0;
    let mut blank_lines = 0;
    let mut comment_lines = 0;
    for line in source.lines() {
        total_lines += 1;
        let stripped = line.trim();
        if stripped.is_empty() {
            blank_lines += 1;
        } else if stripped.starts_with('#') {
            comment_lines += 1;
        }
    }
    let comment_ratio = if total_lines > 0 {
        comment_lines as f64 / total_lines as f64 * 100.0
    } else {
        0.0
    };
    CodeMetrics {
        total_lines,
        code_lines: total_lines - blank_lines - comment_lines,
        comment_lines,
        blank_lines,
        comment_ratio,
    }
}

/// Runs syntax validation, the optional external linter and the denylist
/// check, in that order.
#[derive(Clone, Default)]
pub struct Scanner {
    linter: Option<Arc<dyn SecurityLinter>>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("linter", &self.linter_name())
            .finish()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_linter(linter: Arc<dyn SecurityLinter>) -> Self {
        Self { linter: Some(linter) }
    }

    pub fn linter_name(&self) -> Option<&'static str> {
        self.linter.as_ref().map(|l| l.name())
    }

    #[instrument(skip_all, fields(bytes = source.len()))]
    pub async fn scan(&self, source: &str) -> SourceScanResult {
        let metrics = count_metrics(source);

        if let Err(message) = validate_syntax(source) {
            debug!(%message, "scan rejected source");
            return SourceScanResult {
                syntax_valid: false,
                has_errors: true,
                issues: Vec::new(),
                error_message: Some(message),
                metrics: Some(metrics),
            };
        }

        let mut issues = Vec::new();
        if let Some(linter) = &self.linter {
            match self.run_linter(linter.as_ref(), source).await {
                Ok(found) => issues.extend(found),
                Err(e) => warn!(linter = linter.name(), error = %e, "linter failed, continuing without it"),
            }
        }

        issues.extend(check_dangerous(source).into_iter().map(|d| SecurityIssue {
            severity: Level::High,
            confidence: Level::High,
            line: d.line,
            text: format!("Dangerous function call: {}", d.function),
            kind: "dangerous_function".to_string(),
        }));

        SourceScanResult {
            syntax_valid: true,
            has_errors: !issues.is_empty(),
            issues,
            error_message: None,
            metrics: Some(metrics),
        }
    }

    async fn run_linter(
        &self,
        linter: &dyn SecurityLinter,
        source: &str,
    ) -> Result<Vec<SecurityIssue>, crate::linter::LinterError> {
        // removed when `file` drops, on every path out of this function
        let mut file = tempfile::Builder::new().prefix("stencil-scan-").suffix(".py").tempfile()?;
        file.write_all(source.as_bytes())?;
        file.flush()?;
        linter.lint(file.path()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linter::LinterError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::Mutex;

    #[test]
    fn exec_is_found_on_line_one() {
        let found = check_dangerous("exec(\"x\")");
        assert_eq!(
            found,
            vec![DangerousUsage {
                function: "exec".into(),
                line: 1,
                code: "exec(\"x\")".into(),
            }]
        );
    }

    #[test]
    fn strings_and_comments_are_not_findings() {
        let src = "# exec(\"x\") would be bad\nlabel = \"eval(danger) and os.system\"\n";
        assert!(check_dangerous(src).is_empty());
    }

    #[test]
    fn attribute_calls_subprocess_and_dunders() {
        let src = "os.system(\"ls\")\nsubprocess.run([\"ls\"])\nx = ().__class__.__bases__\n";
        let names: Vec<(String, u32)> = check_dangerous(src).into_iter().map(|d| (d.function, d.line)).collect();
        assert_eq!(
            names,
            vec![
                ("os.system".into(), 1),
                ("subprocess.run".into(), 2),
                ("__bases__".into(), 3),
                ("__class__".into(), 3),
            ]
        );
    }

    #[test]
    fn bypass_attempts_are_caught() {
        // name assembled at runtime still has to be called through a denylisted builtin
        assert!(!check_dangerous("f = getattr(x, \"ev\" + \"al\")").is_empty());
        // method form of a builtin name
        assert!(!check_dangerous("builtins.eval(\"1\")").is_empty());
        // class traversal chain
        assert!(!check_dangerous("x = \"\".__class__.__mro__[1].__subclasses__()").is_empty());
    }

    #[test]
    fn unparsable_source_falls_back_to_text_scan() {
        let found = check_dangerous("def f(:\n    eval(x)\n");
        assert!(found.iter().any(|d| d.function == "eval" && d.line == 2));
    }

    #[test]
    fn imports_are_rejected_anywhere() {
        assert_eq!(validate_syntax("import os"), Err("Import statements are not allowed: os".into()));
        assert_eq!(
            validate_syntax("if True:\n    from diagrams.aws import compute\n"),
            Err("Import statements are not allowed: diagrams.aws".into())
        );
        assert_eq!(
            validate_syntax("import os, sys"),
            Err("Import statements are not allowed: os, sys".into())
        );
    }

    #[test]
    fn syntax_errors_are_prefixed() {
        let err = validate_syntax("with Diagram(:\n").unwrap_err();
        assert!(err.starts_with("Syntax error: "), "{err}");
    }

    #[test]
    fn fix_suggestions() {
        assert_eq!(fix_suggestion("exec"), "Remove exec() call. Dynamic code execution is not allowed.");
        assert_eq!(
            fix_suggestion("subprocess.Popen"),
            "Remove subprocess usage. Running external processes is not allowed."
        );
        assert_eq!(
            fix_suggestion("mystery"),
            "Remove usage of mystery. This function is not allowed in diagram code."
        );
    }

    #[test]
    fn metrics_count_lines() {
        let m = count_metrics("# header\n\nx = 1\ny = 2\n");
        assert_eq!((m.total_lines, m.code_lines, m.comment_lines, m.blank_lines), (4, 2, 1, 1));
        assert!((m.comment_ratio - 25.0).abs() < f64::EPSILON);
        assert_eq!(count_metrics("").comment_ratio, 0.0);
    }

    #[tokio::test]
    async fn scan_gate_blocks_dangerous_calls() {
        let scanner = Scanner::new();
        for src in ["exec(\"x\")", "eval(\"1\")", "os.system(\"ls\")"] {
            let result = scanner.scan(src).await;
            assert!(result.has_errors, "{src}");
            assert!(result.syntax_valid);
            assert_eq!(result.issues[0].kind, "dangerous_function");
            assert_eq!(result.issues[0].severity, Level::High);
        }
        let result = scanner.scan("import os").await;
        assert!(result.has_errors);
        assert!(!result.syntax_valid);
        assert!(result.issues.is_empty());
        assert!(result.metrics.is_some());
    }

    #[tokio::test]
    async fn deeply_nested_source_is_a_syntax_error() {
        let src = format!("x = {}eval(1){}\n", "(".repeat(3000), ")".repeat(3000));
        let found = check_dangerous(&src);
        assert!(found.iter().any(|d| d.function == "eval"));

        let result = Scanner::new().scan(&src).await;
        assert!(result.has_errors);
        assert!(!result.syntax_valid);
        assert!(result
            .error_message
            .unwrap()
            .starts_with("Syntax error: too many nested expressions"));
    }

    #[tokio::test]
    async fn clean_script_passes() {
        let result = Scanner::new()
            .scan("with Diagram(\"x\", show=False):\n    Server(\"a\") >> Server(\"b\")\n")
            .await;
        assert!(!result.has_errors);
        assert!(result.issues.is_empty());
    }

    struct RecordingLinter {
        seen: Mutex<Option<(std::path::PathBuf, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl SecurityLinter for RecordingLinter {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn lint(&self, path: &Path) -> Result<Vec<SecurityIssue>, LinterError> {
            let body = std::fs::read_to_string(path)?;
            *self.seen.lock().unwrap() = Some((path.to_path_buf(), body));
            if self.fail {
                return Err(LinterError::Timeout(std::time::Duration::from_secs(1)));
            }
            Ok(vec![SecurityIssue {
                severity: Level::Medium,
                confidence: Level::Medium,
                line: 1,
                text: "flagged".into(),
                kind: "B000".into(),
            }])
        }
    }

    #[tokio::test]
    async fn linter_sees_temp_file_which_is_removed_afterwards() {
        let linter = Arc::new(RecordingLinter {
            seen: Mutex::new(None),
            fail: false,
        });
        let scanner = Scanner::with_linter(linter.clone());
        assert_eq!(scanner.linter_name(), Some("recording"));
        assert_eq!(Scanner::new().linter_name(), None);
        let result = scanner.scan("x = 1\n").await;
        assert!(result.has_errors);
        assert_eq!(result.issues[0].text, "flagged");

        let (path, body) = linter.seen.lock().unwrap().clone().unwrap();
        assert_eq!(body, "x = 1\n");
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("py"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn linter_failure_is_swallowed() {
        let linter = Arc::new(RecordingLinter {
            seen: Mutex::new(None),
            fail: true,
        });
        let result = Scanner::with_linter(linter).scan("exec(\"x\")").await;
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].text, "Dangerous function call: exec");
    }
}
