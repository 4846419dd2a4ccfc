use crate::models::{Confidence, Finding, Recommendation, ReviewResult, Severity};

const SUMMARY_CAP: usize = 500;
const TITLE_CAP: usize = 80;
const MAX_RISKS: usize = 5;

const TEST_COMMAND_MARKERS: &[&str] =
    &["pytest", "npm test", "make test", "go test", "cargo test"];

const DEFAULT_CHECKLIST: &[&str] = &[
    "All tests pass",
    "Code has been self-reviewed",
    "Changes have been tested locally",
    "Documentation updated if needed",
    "No secrets or sensitive data exposed",
];

/// A line opens a finding when it names a severity and reads like a
/// header (contains ':' or '#'). Checked in decreasing severity so
/// "major blocker" lands on blocker.
fn opener_severity(line: &str) -> Option<Severity> {
    if !line.contains(':') && !line.contains('#') {
        return None;
    }
    let lower = line.to_lowercase();
    if lower.contains("blocker") {
        Some(Severity::Blocker)
    } else if lower.contains("major") {
        Some(Severity::Major)
    } else if lower.contains("minor") {
        Some(Severity::Minor)
    } else if lower.contains("nit") {
        Some(Severity::Nit)
    } else {
        None
    }
}

fn build_finding(severity: Severity, lines: &[&str], default_file: &str) -> Finding {
    let description = lines.join("\n").trim().to_string();

    let mut title = "Issue found".to_string();
    for line in lines {
        let line = line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            let cleaned = line.trim_start_matches(['-', '*', ' ']);
            let head = cleaned.split(':').next().unwrap_or(cleaned).trim();
            title = head.chars().take(TITLE_CAP).collect();
            break;
        }
    }

    Finding {
        severity,
        title,
        description,
        file_path: Some(default_file.to_string()),
        line_start: None,
        line_end: None,
        confidence: Confidence::Medium,
        category: "general".to_string(),
    }
}

/// Heuristic scan for severity-tagged findings in free-form review text.
/// Lines before the first opener are discarded; each opener flushes the
/// finding in progress. Never errors: unparseable text yields no findings.
pub fn extract_findings(response: &str, default_file: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut current_severity: Option<Severity> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in response.lines() {
        if let Some(severity) = opener_severity(line) {
            if let Some(open) = current_severity {
                if !body.is_empty() {
                    findings.push(build_finding(open, &body, default_file));
                }
            }
            current_severity = Some(severity);
            body.clear();
        } else if current_severity.is_some() {
            body.push(line);
        }
    }

    if let Some(open) = current_severity {
        if !body.is_empty() {
            findings.push(build_finding(open, &body, default_file));
        }
    }

    findings
}

fn pick_recommendation(lower: &str) -> Recommendation {
    if lower.contains("request changes") || lower.contains("request_changes") {
        Recommendation::RequestChanges
    } else if lower.contains("approve") && !lower.contains("blocker") {
        Recommendation::Approve
    } else {
        Recommendation::Comment
    }
}

fn pick_summary(response: &str, lower: &str) -> String {
    let Some(idx) = lower.find("summary") else {
        return "Code review completed.".to_string();
    };
    let section: Vec<&str> = response[idx..].split("\n\n").take(2).collect();
    let joined = section.join(" ").trim().to_string();
    if joined.is_empty() {
        "Code review completed.".to_string()
    } else {
        joined.chars().take(SUMMARY_CAP).collect()
    }
}

fn pick_risks(response: &str, lower: &str) -> Vec<String> {
    if !lower.contains("risk") {
        return Vec::new();
    }
    response
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            trimmed.starts_with("- ") && trimmed.to_lowercase().contains("risk")
        })
        .map(|line| line.trim().trim_start_matches(['-', ' ']).to_string())
        .take(MAX_RISKS)
        .collect()
}

fn pick_test_commands(response: &str, lower: &str) -> Vec<String> {
    let mut commands = Vec::new();
    if lower.contains("test") || lower.contains("verify") {
        for line in response.lines() {
            let trimmed = line.trim();
            if (trimmed.starts_with("```") || trimmed.to_lowercase().contains("run"))
                && TEST_COMMAND_MARKERS.iter().any(|m| trimmed.contains(m))
            {
                commands.push(trimmed.trim_matches('`').to_string());
            }
        }
    }
    if commands.is_empty() {
        commands.push("# Run relevant tests for changed files".to_string());
    }
    commands
}

/// Assemble the final ReviewResult from the synthesis response plus the
/// findings accumulated across all passes.
pub fn synthesize_result(
    response: &str,
    findings: Vec<Finding>,
    files_reviewed: Vec<String>,
) -> ReviewResult {
    let lower = response.to_lowercase();

    ReviewResult {
        recommendation: pick_recommendation(&lower),
        summary: pick_summary(response, &lower),
        risks: pick_risks(response, &lower),
        files_reviewed,
        findings,
        test_commands: pick_test_commands(response, &lower),
        checklist: DEFAULT_CHECKLIST.iter().map(|s| s.to_string()).collect(),
    }
}
