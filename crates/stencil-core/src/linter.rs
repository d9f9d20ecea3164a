//! External security linter seam. The default implementation shells out to
//! `bandit` and reads its JSON report.

use crate::{Level, SecurityIssue};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

pub const DEFAULT_LINTER_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum LinterError {
    #[error("{0} not found in PATH")]
    NotInstalled(String),

    #[error("failed to run linter: {0}")]
    Io(#[from] std::io::Error),

    #[error("linter timed out after {0:?}")]
    Timeout(Duration),

    #[error("linter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("failed to parse linter output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A tool that inspects a source file on disk and reports security issues.
#[async_trait]
pub trait SecurityLinter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn lint(&self, path: &Path) -> Result<Vec<SecurityIssue>, LinterError>;
}

#[derive(Debug, Clone)]
pub struct BanditLinter {
    executable: PathBuf,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct BanditReport {
    #[serde(default)]
    results: Vec<BanditResult>,
}

#[derive(Debug, Deserialize)]
struct BanditResult {
    issue_severity: String,
    issue_confidence: String,
    #[serde(default)]
    line_number: u32,
    issue_text: String,
    test_id: String,
}

impl BanditLinter {
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
        }
    }

    /// Locate `executable` (a bare name or a path) via `PATH`.
    pub fn discover(executable: &str, timeout: Duration) -> Result<Self, LinterError> {
        let path = which::which(executable).map_err(|_| LinterError::NotInstalled(executable.to_string()))?;
        debug!(path = %path.display(), "found bandit");
        Ok(Self::new(path, timeout))
    }
}

/// Convert a bandit JSON report into issues. Unknown levels map to LOW.
pub fn parse_bandit_report(stdout: &[u8]) -> Result<Vec<SecurityIssue>, LinterError> {
    let report: BanditReport = serde_json::from_slice(stdout)?;
    Ok(report
        .results
        .into_iter()
        .map(|r| SecurityIssue {
            severity: Level::parse(&r.issue_severity).unwrap_or(Level::Low),
            confidence: Level::parse(&r.issue_confidence).unwrap_or(Level::Low),
            line: r.line_number,
            text: r.issue_text,
            kind: r.test_id,
        })
        .collect())
}

#[async_trait]
impl SecurityLinter for BanditLinter {
    fn name(&self) -> &'static str {
        "bandit"
    }

    #[instrument(skip(self), fields(linter = "bandit"))]
    async fn lint(&self, path: &Path) -> Result<Vec<SecurityIssue>, LinterError> {
        let child = Command::new(&self.executable)
            .arg("-f")
            .arg("json")
            .arg("-q")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| LinterError::Timeout(self.timeout))??;

        // bandit exits 1 when it reports findings
        if output.stdout.is_empty() {
            return Err(LinterError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let issues = parse_bandit_report(&output.stdout)?;
        debug!(count = issues.len(), "bandit finished");
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_bandit_json() {
        let json = br#"{
            "errors": [],
            "results": [
                {"issue_severity": "MEDIUM", "issue_confidence": "HIGH", "line_number": 3,
                 "issue_text": "Use of insecure MD5 hash function.", "test_id": "B303"},
                {"issue_severity": "weird", "issue_confidence": "low", "line_number": 7,
                 "issue_text": "Something", "test_id": "B999"}
            ]
        }"#;
        let issues = parse_bandit_report(json).unwrap();
        assert_eq!(
            issues[0],
            SecurityIssue {
                severity: Level::Medium,
                confidence: Level::High,
                line: 3,
                text: "Use of insecure MD5 hash function.".into(),
                kind: "B303".into(),
            }
        );
        assert_eq!(issues[1].severity, Level::Low);
        assert_eq!(issues[1].confidence, Level::Low);
    }

    #[test]
    fn garbage_output_is_a_parse_error() {
        assert!(matches!(parse_bandit_report(b"not json"), Err(LinterError::Parse(_))));
    }

    #[test]
    fn discover_reports_missing_executable() {
        let err = BanditLinter::discover("definitely-not-a-real-linter-binary", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, LinterError::NotInstalled(_)));
    }
}
