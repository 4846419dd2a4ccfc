use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::Commit;

const DEFAULT_SYSTEM: &str = include_str!("prompt_templates/system.md");
const DEFAULT_INITIAL_ANALYSIS: &str = include_str!("prompt_templates/initial-analysis.md");
const DEFAULT_DETAILED_REVIEW: &str = include_str!("prompt_templates/detailed-review.md");
const DEFAULT_HOTSPOT: &str = include_str!("prompt_templates/hotspot.md");
const DEFAULT_SYNTHESIS: &str = include_str!("prompt_templates/synthesis.md");

/// Known template variable names for validation.
const KNOWN_VARIABLES: &[&str] = &[
    "mr_title",
    "mr_author",
    "source_branch",
    "target_branch",
    "mr_state",
    "pipeline_status",
    "mr_description",
    "commits_summary",
    "file_count",
    "files_summary",
    "file_path",
    "change_type",
    "line_count",
    "diff_content",
    "reason",
    "files_reviewed",
    "analysis_notes",
    "custom_instructions",
];

fn default_template(phase: &str) -> Option<&'static str> {
    match phase {
        "system" => Some(DEFAULT_SYSTEM),
        "initial-analysis" => Some(DEFAULT_INITIAL_ANALYSIS),
        "detailed-review" => Some(DEFAULT_DETAILED_REVIEW),
        "hotspot" => Some(DEFAULT_HOTSPOT),
        "synthesis" => Some(DEFAULT_SYNTHESIS),
        _ => None,
    }
}

fn template_filename(phase: &str) -> String {
    format!("{phase}.md")
}

/// Prompt template engine with default templates and user overrides.
pub struct PromptEngine {
    override_dir: Option<String>,
}

impl PromptEngine {
    pub fn new(override_dir: Option<String>) -> Self {
        Self { override_dir }
    }

    /// Load a prompt template for the given phase.
    /// User overrides in `override_dir` take precedence over defaults.
    pub fn load_template(&self, phase: &str) -> Result<String> {
        if let Some(ref dir) = self.override_dir {
            let path = Path::new(dir).join(template_filename(phase));
            if path.exists() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    Error::Prompt(format!(
                        "failed to read override template {}: {e}",
                        path.display()
                    ))
                });
            }
        }

        default_template(phase)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Prompt(format!("unknown prompt phase: {phase}")))
    }

    /// Load a template and render it with the given variables.
    pub fn render_phase(&self, phase: &str, vars: &HashMap<String, String>) -> Result<String> {
        let template = self.load_template(phase)?;
        render_template(&template, vars)
    }
}

/// Render a template string by substituting `{{variable}}` placeholders.
/// Errors on unknown variables (strict mode).
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '{' && chars.peek() == Some(&'{') {
            chars.next(); // consume second {
            let mut var_name = String::new();
            let mut found_close = false;

            while let Some(c2) = chars.next() {
                if c2 == '}' && chars.peek() == Some(&'}') {
                    chars.next(); // consume second }
                    found_close = true;
                    break;
                }
                var_name.push(c2);
            }

            if !found_close {
                return Err(Error::Prompt(format!(
                    "unclosed template variable: {{{{{var_name}"
                )));
            }

            let var_name = var_name.trim();
            if !KNOWN_VARIABLES.contains(&var_name) {
                return Err(Error::Prompt(format!(
                    "unknown template variable: {var_name}"
                )));
            }

            match vars.get(var_name) {
                Some(value) => result.push_str(value),
                None => {
                    return Err(Error::Prompt(format!(
                        "missing value for template variable: {var_name}"
                    )));
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}

/// One bullet per commit, truncated past ten.
pub fn format_commits_summary(commits: &[Commit]) -> String {
    if commits.is_empty() {
        return "*No commits found*".to_string();
    }

    let mut lines: Vec<String> = commits
        .iter()
        .take(10)
        .map(|c| format!("- `{}` {} ({})", c.short_sha, c.title, c.author_name))
        .collect();

    if commits.len() > 10 {
        lines.push(format!("- *...and {} more commits*", commits.len() - 10));
    }

    lines.join("\n")
}

pub fn format_pipeline_status(status: Option<&str>) -> String {
    let Some(status) = status else {
        return String::new();
    };
    if status.is_empty() {
        return String::new();
    }

    let emoji = match status.to_lowercase().as_str() {
        "success" => "✅",
        "failed" => "❌",
        "running" => "🔄",
        "pending" => "⏳",
        "canceled" => "⛔",
        _ => "❓",
    };

    format!("**Pipeline**: {emoji} {status}")
}
