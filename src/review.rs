use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::agent::{AgentLoop, DEFAULT_MAX_ITERATIONS};
use crate::chunk::chunk_diff;
use crate::config::Config;
use crate::engine::{AnthropicClient, EngineClient};
use crate::error::{Error, Result};
use crate::extract::{extract_findings, synthesize_result};
use crate::gitlab::GitLabClient;
use crate::models::{ChangedFile, Commit, Finding, MergeRequestInfo, ReviewResult};
use crate::plan::{ReviewPlan, create_review_plan, identify_hotspots, summarize_changes};
use crate::prompts::{PromptEngine, format_commits_summary, format_pipeline_status};
use crate::repo::LocalRepo;
use crate::tools::{ToolGateway, tool_definitions};

const DETAILED_REVIEW_ITERATIONS: u32 = 3;
const HOTSPOT_ITERATIONS: u32 = 5;
const MAX_HOTSPOTS: usize = 5;
const DETAILED_DIFF_CHARS: usize = 8000;
const HOTSPOT_DIFF_CHARS: usize = 5000;

/// Char-safe prefix, so multibyte diffs never split mid-character.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Drives a review through its phases: collect, plan, initial analysis,
/// detailed per-file review, hotspot investigation, synthesis.
pub struct ReviewDriver {
    config: Config,
    gitlab: GitLabClient,
    repo: LocalRepo,
    engine: Box<dyn EngineClient>,
    system_prompt: String,
    prompts: PromptEngine,

    mr_info: Option<MergeRequestInfo>,
    commits: Vec<Commit>,
    changes: Vec<ChangedFile>,
    plan: Option<ReviewPlan>,
    findings: Vec<Finding>,
    analysis_notes: Vec<String>,
}

impl ReviewDriver {
    pub fn new(config: Config) -> Result<Self> {
        let repo = LocalRepo::open(Path::new(&config.repo_path))?;
        let gitlab = GitLabClient::new(
            &config.gitlab_base_url,
            &config.gitlab_token,
            &config.project,
        );
        let engine = Box::new(AnthropicClient::new(
            &config.llm_base_url,
            &config.llm_api_key,
            &config.llm_model,
            config.llm_max_tokens,
        ));
        Self::with_clients(config, gitlab, repo, engine)
    }

    /// Construct with explicit collaborators. Used by tests to inject
    /// stub transports and a scripted engine.
    pub fn with_clients(
        config: Config,
        gitlab: GitLabClient,
        repo: LocalRepo,
        engine: Box<dyn EngineClient>,
    ) -> Result<Self> {
        let prompts = PromptEngine::new(config.prompt_dir.clone());
        let system_prompt = load_system_prompt(&prompts, &repo, &config.extra_instructions)?;
        Ok(Self {
            config,
            gitlab,
            repo,
            engine,
            system_prompt,
            prompts,
            mr_info: None,
            commits: Vec::new(),
            changes: Vec::new(),
            plan: None,
            findings: Vec::new(),
            analysis_notes: Vec::new(),
        })
    }

    pub async fn run(&mut self) -> Result<ReviewResult> {
        info!(mr_iid = self.config.mr_iid, "starting review");

        self.collect_data().await?;
        self.create_plan()?;
        self.initial_analysis().await?;
        self.detailed_review().await?;
        self.investigate_hotspots().await?;
        let result = self.synthesize().await?;

        info!(recommendation = %result.recommendation, "review complete");
        Ok(result)
    }

    async fn collect_data(&mut self) -> Result<()> {
        info!("collecting MR data");

        let mr_info = self.gitlab.merge_request(self.config.mr_iid)?;
        info!(title = %mr_info.title, "fetched merge request");

        let source_branch = self
            .config
            .source_branch
            .clone()
            .unwrap_or_else(|| mr_info.source_branch.clone());
        let target_branch = self
            .config
            .target_branch
            .clone()
            .unwrap_or_else(|| mr_info.target_branch.clone());

        self.commits = self.gitlab.merge_request_commits(self.config.mr_iid)?;
        info!(count = self.commits.len(), "fetched commits");

        // Freshen the local checkout so the agent's git commands see both
        // branches. The MR changes come from the API either way.
        match self.repo.git(&["fetch", "--all", "--quiet"]).await {
            Ok(_) => {
                for branch in [&source_branch, &target_branch] {
                    let exists = self
                        .repo
                        .git(&["rev-parse", "--verify", "--quiet", branch])
                        .await
                        .is_ok();
                    if !exists {
                        debug!(branch, "branch not found locally");
                    }
                }
            }
            Err(e) => warn!(error = %e, "local git fetch failed"),
        }

        self.changes = self
            .gitlab
            .merge_request_changes(self.config.mr_iid, self.config.max_files)?;
        info!(count = self.changes.len(), "fetched changed files");

        self.mr_info = Some(mr_info);
        Ok(())
    }

    fn create_plan(&mut self) -> Result<()> {
        info!("creating review plan");
        let plan = create_review_plan(
            self.changes.clone(),
            self.config.max_files,
            self.config.max_diff_chars,
        );
        debug!("{}", plan.summary());
        self.plan = Some(plan);
        Ok(())
    }

    async fn initial_analysis(&mut self) -> Result<()> {
        info!("performing initial analysis");

        let mr_info = self
            .mr_info
            .as_ref()
            .ok_or_else(|| Error::Validation("data collection incomplete".to_string()))?;
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| Error::Validation("review plan not created".to_string()))?;

        let description = if mr_info.description.is_empty() {
            "*No description provided*".to_string()
        } else {
            mr_info.description.clone()
        };

        let mut vars = HashMap::new();
        vars.insert("mr_title".to_string(), mr_info.title.clone());
        vars.insert("mr_author".to_string(), mr_info.author.clone());
        vars.insert("source_branch".to_string(), mr_info.source_branch.clone());
        vars.insert("target_branch".to_string(), mr_info.target_branch.clone());
        vars.insert("mr_state".to_string(), mr_info.state.clone());
        vars.insert(
            "pipeline_status".to_string(),
            format_pipeline_status(mr_info.pipeline_status.as_deref()),
        );
        vars.insert("mr_description".to_string(), description);
        vars.insert(
            "commits_summary".to_string(),
            format_commits_summary(&self.commits),
        );
        vars.insert(
            "file_count".to_string(),
            plan.files_to_review.len().to_string(),
        );
        vars.insert(
            "files_summary".to_string(),
            summarize_changes(&plan.files_to_review),
        );

        let prompt = self.prompts.render_phase("initial-analysis", &vars)?;
        let response = self.run_loop(&prompt, DEFAULT_MAX_ITERATIONS).await?;
        self.analysis_notes
            .push(format!("## Initial Analysis\n\n{response}"));
        Ok(())
    }

    async fn detailed_review(&mut self) -> Result<()> {
        info!("performing detailed file review");

        let Some(plan) = self.plan.as_ref() else {
            return Ok(());
        };
        let files = plan.files_to_review.clone();

        for file in &files {
            if file.diff.is_empty() {
                continue;
            }

            let chunks = chunk_diff(file, self.config.max_chunk_chars);
            for chunk in &chunks {
                if chunk.total_chunks > 1 {
                    info!(
                        path = %file.path,
                        chunk = chunk.chunk_index + 1,
                        of = chunk.total_chunks,
                        "reviewing chunk"
                    );
                } else {
                    info!(path = %file.path, "reviewing file");
                }

                let mut vars = HashMap::new();
                vars.insert("file_path".to_string(), file.path.clone());
                vars.insert("change_type".to_string(), file.change_type().to_string());
                vars.insert("line_count".to_string(), file.total_changes().to_string());
                vars.insert(
                    "diff_content".to_string(),
                    truncate_chars(&chunk.content, DETAILED_DIFF_CHARS).to_string(),
                );

                let prompt = self.prompts.render_phase("detailed-review", &vars)?;
                let response = self.run_loop(&prompt, DETAILED_REVIEW_ITERATIONS).await?;

                self.findings.extend(extract_findings(&response, &file.path));
                self.analysis_notes
                    .push(format!("### {}\n\n{response}", file.path));
            }
        }
        Ok(())
    }

    async fn investigate_hotspots(&mut self) -> Result<()> {
        info!("investigating hotspots");

        let Some(plan) = self.plan.as_ref() else {
            return Ok(());
        };
        let files = plan.files_to_review.clone();

        let mut hotspots = identify_hotspots(&files);
        hotspots.truncate(MAX_HOTSPOTS);

        for (file_path, reason) in hotspots {
            let Some(file) = files.iter().find(|f| f.path == file_path) else {
                continue;
            };

            info!(path = %file_path, %reason, "hotspot investigation");

            let diff_content = if file.diff.is_empty() {
                "*No diff*".to_string()
            } else {
                truncate_chars(&file.diff, HOTSPOT_DIFF_CHARS).to_string()
            };

            let mut vars = HashMap::new();
            vars.insert("file_path".to_string(), file_path.clone());
            vars.insert("reason".to_string(), reason);
            vars.insert("diff_content".to_string(), diff_content);

            let prompt = self.prompts.render_phase("hotspot", &vars)?;
            let response = self.run_loop(&prompt, HOTSPOT_ITERATIONS).await?;

            self.findings.extend(extract_findings(&response, &file_path));
            self.analysis_notes
                .push(format!("### Hotspot: {file_path}\n\n{response}"));
        }
        Ok(())
    }

    async fn synthesize(&mut self) -> Result<ReviewResult> {
        info!("synthesizing review");

        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| Error::Validation("review plan not created".to_string()))?;

        let mut files_reviewed: Vec<String> = plan
            .files_to_review
            .iter()
            .take(30)
            .map(|f| format!("- `{}`", f.path))
            .collect();
        if plan.files_to_review.len() > 30 {
            files_reviewed.push(format!(
                "- *...and {} more*",
                plan.files_to_review.len() - 30
            ));
        }

        // Feed the structured findings rather than every analysis note, so
        // the synthesis context stays small.
        let mut findings_summary = Vec::new();
        for (i, f) in self.findings.iter().enumerate() {
            let location = f.file_path.as_deref().unwrap_or("unknown");
            findings_summary.push(format!(
                "{}. [{}] {} ({location})",
                i + 1,
                f.severity.to_string().to_uppercase(),
                f.title
            ));
            let first_line = f.description.lines().next().unwrap_or("");
            findings_summary.push(format!("   {}...", truncate_chars(first_line, 100)));
        }

        let initial_context = self
            .analysis_notes
            .first()
            .cloned()
            .unwrap_or_default();

        let analysis_context = format!(
            "\nInitial Analysis:\n{initial_context}\n\nIdentified Findings ({}):\n{}\n",
            self.findings.len(),
            findings_summary.join("\n")
        );

        let mut vars = HashMap::new();
        vars.insert("files_reviewed".to_string(), files_reviewed.join("\n"));
        vars.insert("analysis_notes".to_string(), analysis_context);

        let prompt = self.prompts.render_phase("synthesis", &vars)?;
        let response = self.run_loop(&prompt, DEFAULT_MAX_ITERATIONS).await?;

        let file_paths = plan
            .files_to_review
            .iter()
            .map(|f| f.path.clone())
            .collect();
        Ok(synthesize_result(
            &response,
            std::mem::take(&mut self.findings),
            file_paths,
        ))
    }

    async fn run_loop(&self, prompt: &str, max_iterations: u32) -> Result<String> {
        let gateway = ToolGateway::new(&self.repo, &self.gitlab, self.config.max_context_lines);
        let agent = AgentLoop::new(
            self.engine.as_ref(),
            &gateway,
            &self.system_prompt,
            tool_definitions(),
        );
        let outcome = agent.run(prompt, max_iterations).await?;
        debug!(
            turns = outcome.turns,
            tools = outcome.tools_dispatched,
            state = ?outcome.state,
            "agent loop finished"
        );
        Ok(outcome.text)
    }
}

/// System prompt with project-specific guidelines spliced in. A missing
/// instructions file is not an error.
fn load_system_prompt(
    prompts: &PromptEngine,
    repo: &LocalRepo,
    extra_instructions: &str,
) -> Result<String> {
    let mut custom = String::new();
    if !extra_instructions.is_empty() {
        let path = repo.root().join(extra_instructions);
        if path.is_file() {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    info!(file = extra_instructions, "loaded custom instructions");
                    custom = content;
                }
                Err(e) => warn!(error = %e, "failed to load custom instructions"),
            }
        } else {
            debug!(file = extra_instructions, "custom instructions file not found");
        }
    }
    if custom.is_empty() {
        custom = "No specific custom guidelines provided.".to_string();
    }

    let mut vars = HashMap::new();
    vars.insert("custom_instructions".to_string(), custom);
    prompts.render_phase("system", &vars)
}
