use clap::Parser;

/// Automated GitLab merge request review
#[derive(Parser, Debug, Clone)]
#[command(name = "crag", version, about)]
pub struct Cli {
    /// Merge request IID to review
    pub mr_iid: u64,

    /// Path to the local git checkout of the project
    #[arg(long, default_value = ".")]
    pub repo: String,

    /// Path to config file (default: crag.toml if present)
    #[arg(long)]
    pub config: Option<String>,

    /// GitLab project ID (numeric) or path (namespace/project)
    #[arg(long)]
    pub project: Option<String>,

    /// GitLab instance base URL
    #[arg(long)]
    pub gitlab_url: Option<String>,

    /// Source branch override (defaults to the MR's source branch)
    #[arg(long)]
    pub source_branch: Option<String>,

    /// Target branch override (defaults to the MR's target branch)
    #[arg(long)]
    pub target_branch: Option<String>,

    /// Post the review as an MR note instead of printing to stdout
    #[arg(long)]
    pub post: bool,

    /// Maximum number of files to review
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Maximum characters of diff to process
    #[arg(long)]
    pub max_diff_chars: Option<usize>,

    /// Model to use for the review
    #[arg(long)]
    pub model: Option<String>,

    /// Directory with prompt template overrides
    #[arg(long)]
    pub prompt_dir: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let cli = Cli::parse_from(["crag", "42"]);
        assert_eq!(cli.mr_iid, 42);
        assert_eq!(cli.repo, ".");
        assert!(!cli.post);
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_all_overrides() {
        let cli = Cli::parse_from([
            "crag",
            "7",
            "--repo",
            "/src/project",
            "--project",
            "group/project",
            "--gitlab-url",
            "https://gitlab.example.com",
            "--source-branch",
            "feature",
            "--target-branch",
            "main",
            "--post",
            "--max-files",
            "20",
            "--max-diff-chars",
            "50000",
            "--model",
            "claude-sonnet-4-20250514",
            "--prompt-dir",
            "/etc/crag/prompts",
            "--verbose",
        ]);
        assert_eq!(cli.mr_iid, 7);
        assert_eq!(cli.repo, "/src/project");
        assert_eq!(cli.project.as_deref(), Some("group/project"));
        assert_eq!(cli.gitlab_url.as_deref(), Some("https://gitlab.example.com"));
        assert_eq!(cli.source_branch.as_deref(), Some("feature"));
        assert_eq!(cli.target_branch.as_deref(), Some("main"));
        assert!(cli.post);
        assert_eq!(cli.max_files, Some(20));
        assert_eq!(cli.max_diff_chars, Some(50000));
        assert_eq!(cli.model.as_deref(), Some("claude-sonnet-4-20250514"));
        assert_eq!(cli.prompt_dir.as_deref(), Some("/etc/crag/prompts"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_mr_iid_is_required() {
        assert!(Cli::try_parse_from(["crag"]).is_err());
    }

    #[test]
    fn test_mr_iid_must_be_numeric() {
        assert!(Cli::try_parse_from(["crag", "not-a-number"]).is_err());
    }
}
