use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Finding severity, ordered most to least serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Blocker,
    Major,
    Minor,
    Nit,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Blocker => write!(f, "blocker"),
            Severity::Major => write!(f, "major"),
            Severity::Minor => write!(f, "minor"),
            Severity::Nit => write!(f, "nit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// Overall review recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    RequestChanges,
    Comment,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Approve => write!(f, "approve"),
            Recommendation::RequestChanges => write!(f, "request_changes"),
            Recommendation::Comment => write!(f, "comment"),
        }
    }
}

/// One contiguous block of a unified diff, bounded by a `@@` range header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub content: String,
    pub header: String,
}

/// A file changed in the merge request, immutable once built from the
/// change list.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: String,
    pub old_path: String,
    pub new_file: bool,
    pub deleted_file: bool,
    pub renamed_file: bool,
    pub diff: String,
    pub hunks: Vec<Hunk>,
    pub is_binary: bool,
}

impl ChangedFile {
    pub fn new(
        path: String,
        old_path: String,
        new_file: bool,
        deleted_file: bool,
        renamed_file: bool,
        diff: String,
    ) -> Self {
        let hunks = parse_diff_hunks(&diff);
        let is_binary = diff.contains("Binary files");
        Self {
            path,
            old_path,
            new_file,
            deleted_file,
            renamed_file,
            diff,
            hunks,
            is_binary,
        }
    }

    pub fn change_type(&self) -> &'static str {
        if self.new_file {
            "added"
        } else if self.deleted_file {
            "deleted"
        } else if self.renamed_file {
            "renamed"
        } else {
            "modified"
        }
    }

    /// Approximate count of changed lines: +/- lines excluding file headers.
    pub fn total_changes(&self) -> usize {
        self.diff
            .lines()
            .filter(|line| {
                (line.starts_with('+') || line.starts_with('-'))
                    && !line.starts_with("+++")
                    && !line.starts_with("---")
            })
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct Commit {
    pub sha: String,
    pub short_sha: String,
    pub title: String,
    pub author_name: String,
    pub authored_date: String,
}

/// Merge request metadata from the data source.
#[derive(Debug, Clone)]
pub struct MergeRequestInfo {
    pub iid: u64,
    pub title: String,
    pub description: String,
    pub author: String,
    pub state: String,
    pub source_branch: String,
    pub target_branch: String,
    pub web_url: String,
    pub labels: Vec<String>,
    pub pipeline_status: Option<String>,
    pub has_conflicts: bool,
}

/// Captured output of one gated shell command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

/// A single structured review observation.
#[derive(Debug, Clone)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub file_path: Option<String>,
    pub line_start: Option<u32>,
    pub line_end: Option<u32>,
    pub confidence: Confidence,
    pub category: String,
}

/// Terminal artifact of a review run.
#[derive(Debug, Clone)]
pub struct ReviewResult {
    pub recommendation: Recommendation,
    pub summary: String,
    pub risks: Vec<String>,
    pub files_reviewed: Vec<String>,
    pub findings: Vec<Finding>,
    pub test_commands: Vec<String>,
    pub checklist: Vec<String>,
}

impl ReviewResult {
    pub fn findings_by_severity(&self, severity: Severity) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .collect()
    }
}

fn hunk_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@(.*)$").expect("valid hunk regex")
    })
}

/// Parse unified-diff text into hunks. Lines before the first `@@` header
/// are discarded; omitted line counts default to 1.
pub fn parse_diff_hunks(diff: &str) -> Vec<Hunk> {
    let re = hunk_header_regex();
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut current: Option<Hunk> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in diff.lines() {
        if let Some(caps) = re.captures(line) {
            if let Some(mut hunk) = current.take() {
                hunk.content = body.join("\n");
                hunks.push(hunk);
            }
            body.clear();

            let count = |idx: usize| {
                caps.get(idx)
                    .and_then(|m| m.as_str().parse::<u32>().ok())
                    .unwrap_or(1)
            };
            current = Some(Hunk {
                old_start: count(1),
                old_lines: count(2),
                new_start: count(3),
                new_lines: count(4),
                content: String::new(),
                header: caps
                    .get(5)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default(),
            });
        } else if current.is_some() {
            body.push(line);
        }
    }

    if let Some(mut hunk) = current.take() {
        hunk.content = body.join("\n");
        hunks.push(hunk);
    }

    hunks
}
