use crate::models::{Finding, Recommendation, ReviewResult, Severity};

fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Blocker => "🔴",
        Severity::Major => "🟠",
        Severity::Minor => "🟡",
        Severity::Nit => "🔵",
    }
}

fn severity_heading(severity: Severity) -> &'static str {
    match severity {
        Severity::Blocker => "Blocker",
        Severity::Major => "Major",
        Severity::Minor => "Minor",
        Severity::Nit => "Nit",
    }
}

fn recommendation_text(recommendation: Recommendation) -> &'static str {
    match recommendation {
        Recommendation::Approve => "✅ **Approve**",
        Recommendation::RequestChanges => "⚠️ **Request Changes**",
        Recommendation::Comment => "💬 **Comment**",
    }
}

/// Render one finding as a markdown bullet with location and confidence.
pub fn finding_to_markdown(finding: &Finding) -> String {
    let mut parts = Vec::new();

    let mut location = String::new();
    if let Some(ref path) = finding.file_path {
        location = format!(" in `{path}`");
        if let Some(start) = finding.line_start {
            match finding.line_end {
                Some(end) if end != start => location.push_str(&format!(" (L{start}-{end})")),
                _ => location.push_str(&format!(" (L{start})")),
            }
        }
    }

    parts.push(format!(
        "- {} **{}**{location}",
        severity_emoji(finding.severity),
        finding.title
    ));

    if matches!(finding.severity, Severity::Blocker | Severity::Major) {
        parts.push(format!("  - *Confidence: {}*", finding.confidence));
    }

    for line in finding.description.trim().lines() {
        parts.push(format!("  {line}"));
    }

    parts.join("\n")
}

/// Render the full review as GitLab comment markdown.
pub fn to_gitlab_comment(result: &ReviewResult) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push("# 🔍 Code Review".to_string());
    parts.push(String::new());

    parts.push("## Summary".to_string());
    parts.push(String::new());
    parts.push(format!(
        "**Recommendation:** {}",
        recommendation_text(result.recommendation)
    ));
    parts.push(String::new());
    parts.push(result.summary.clone());
    parts.push(String::new());

    if !result.risks.is_empty() {
        parts.push("**High-level Risks:**".to_string());
        for risk in &result.risks {
            parts.push(format!("- {risk}"));
        }
        parts.push(String::new());
    }

    parts.push("**Files Reviewed:**".to_string());
    for file in result.files_reviewed.iter().take(20) {
        parts.push(format!("- `{file}`"));
    }
    if result.files_reviewed.len() > 20 {
        parts.push(format!(
            "- *...and {} more files*",
            result.files_reviewed.len() - 20
        ));
    }
    parts.push(String::new());

    parts.push("## Key Findings".to_string());
    parts.push(String::new());

    for severity in [
        Severity::Blocker,
        Severity::Major,
        Severity::Minor,
        Severity::Nit,
    ] {
        let findings = result.findings_by_severity(severity);
        if !findings.is_empty() {
            parts.push(format!("### {}", severity_heading(severity)));
            parts.push(String::new());
            for finding in findings {
                parts.push(finding_to_markdown(finding));
                parts.push(String::new());
            }
            parts.push(String::new());
        }
    }

    if result.findings.is_empty() {
        parts.push("*No significant issues found.*".to_string());
        parts.push(String::new());
    }

    parts.push("## Tests / Verification".to_string());
    parts.push(String::new());
    if result.test_commands.is_empty() {
        parts.push("*No specific test commands recommended.*".to_string());
    } else {
        for cmd in &result.test_commands {
            parts.push(format!("```bash\n{cmd}\n```"));
            parts.push(String::new());
        }
    }
    parts.push(String::new());

    parts.push("## Pre-Merge Checklist".to_string());
    parts.push(String::new());
    for item in &result.checklist {
        parts.push(format!("- [ ] {item}"));
    }
    parts.push(String::new());

    parts.push("---".to_string());
    parts.push("*Generated by crag*".to_string());

    parts.join("\n")
}
