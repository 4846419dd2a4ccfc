use std::path::Path;

use serde::Deserialize;

use crate::cli::Cli;
use crate::error::{Error, Result};

pub const GITLAB_TOKEN_VAR: &str = "CRAG_GITLAB_TOKEN";
pub const LLM_API_KEY_VAR: &str = "CRAG_LLM_API_KEY";

const DEFAULT_CONFIG_FILE: &str = "crag.toml";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub gitlab_base_url: Option<String>,
    pub project: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_max_tokens: Option<u32>,
    pub max_files: Option<usize>,
    pub max_diff_chars: Option<usize>,
    pub max_chunk_chars: Option<usize>,
    pub max_context_lines: Option<usize>,
    pub extra_instructions: Option<String>,
    pub post: Option<bool>,
}

/// Fully resolved settings for one review run. Secrets come from the
/// environment only, never from the config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub gitlab_base_url: String,
    pub gitlab_token: String,
    pub project: String,
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub max_files: usize,
    pub max_diff_chars: usize,
    pub max_chunk_chars: usize,
    pub max_context_lines: usize,
    pub extra_instructions: String,
    pub post: bool,
    pub mr_iid: u64,
    pub repo_path: String,
    pub source_branch: Option<String>,
    pub target_branch: Option<String>,
    pub prompt_dir: Option<String>,
}

impl Config {
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_config = match cli.config {
            Some(ref path) => {
                let config_path = Path::new(path);
                if !config_path.exists() {
                    return Err(Error::ConfigNotFound(config_path.to_path_buf()));
                }
                let content = std::fs::read_to_string(config_path)?;
                parse_config(&content)?
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    let content = std::fs::read_to_string(default_path)?;
                    parse_config(&content)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        let gitlab_token = std::env::var(GITLAB_TOKEN_VAR).map_err(|_| {
            Error::ConfigValidation(format!("{GITLAB_TOKEN_VAR} environment variable not set"))
        })?;
        let llm_api_key = std::env::var(LLM_API_KEY_VAR).map_err(|_| {
            Error::ConfigValidation(format!("{LLM_API_KEY_VAR} environment variable not set"))
        })?;

        merge(file_config, cli, gitlab_token, llm_api_key)
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConfigFile) -> Result<()> {
    if let Some(max_files) = config.max_files
        && !(1..=200).contains(&max_files)
    {
        return Err(Error::ConfigValidation(
            "max_files must be between 1 and 200".to_string(),
        ));
    }
    if let Some(max_diff_chars) = config.max_diff_chars
        && max_diff_chars < 1000
    {
        return Err(Error::ConfigValidation(
            "max_diff_chars must be >= 1000".to_string(),
        ));
    }
    if let Some(max_chunk_chars) = config.max_chunk_chars
        && max_chunk_chars == 0
    {
        return Err(Error::ConfigValidation(
            "max_chunk_chars must be > 0".to_string(),
        ));
    }
    if let Some(max_tokens) = config.llm_max_tokens
        && max_tokens == 0
    {
        return Err(Error::ConfigValidation(
            "llm_max_tokens must be > 0".to_string(),
        ));
    }
    Ok(())
}

pub fn merge(
    file: ConfigFile,
    cli: &Cli,
    gitlab_token: String,
    llm_api_key: String,
) -> Result<Config> {
    let project = cli.project.clone().or(file.project).ok_or_else(|| {
        Error::ConfigValidation(
            "project must be set via --project or the config file".to_string(),
        )
    })?;

    Ok(Config {
        gitlab_base_url: cli
            .gitlab_url
            .clone()
            .or(file.gitlab_base_url)
            .unwrap_or_else(|| "https://gitlab.com".to_string())
            .trim_end_matches('/')
            .to_string(),
        gitlab_token,
        project,
        llm_base_url: file
            .llm_base_url
            .unwrap_or_else(|| "https://api.anthropic.com".to_string())
            .trim_end_matches('/')
            .to_string(),
        llm_api_key,
        llm_model: cli
            .model
            .clone()
            .or(file.llm_model)
            .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string()),
        llm_max_tokens: file.llm_max_tokens.unwrap_or(8192),
        max_files: cli.max_files.or(file.max_files).unwrap_or(50),
        max_diff_chars: cli.max_diff_chars.or(file.max_diff_chars).unwrap_or(100_000),
        max_chunk_chars: file.max_chunk_chars.unwrap_or(10_000),
        max_context_lines: file.max_context_lines.unwrap_or(2000),
        extra_instructions: file
            .extra_instructions
            .unwrap_or_else(|| "CodeReviewInstructions.md".to_string()),
        post: cli.post || file.post.unwrap_or(false),
        mr_iid: cli.mr_iid,
        repo_path: cli.repo.clone(),
        source_branch: cli.source_branch.clone(),
        target_branch: cli.target_branch.clone(),
        prompt_dir: cli.prompt_dir.clone(),
    })
}
