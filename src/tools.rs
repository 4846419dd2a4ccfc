use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::engine::ToolDefinition;
use crate::gitlab::GitLabClient;
use crate::repo::LocalRepo;

const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
const MAX_COMMAND_TIMEOUT_SECS: u64 = 120;
const LOG_MAX_COUNT: usize = 5;

/// The fixed tool surface exposed to the reasoning engine.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "run_command".to_string(),
            description: "Run a safe shell command in the local repository.\n\n\
ALLOWED commands:\n\
- git (subcommands: diff, show, log, blame, ls-files, rev-parse, branch, status, fetch, remote, cat-file, rev-list, merge-base, name-rev, describe)\n\
- cat, head, tail (reading files)\n\
- grep, wc, find, ls, file (searching/inspecting)\n\n\
BLOCKED: rm, mv, cp, curl, wget, ssh, pip, npm, python, and any command with shell operators (|, ;, &, >, $, `).\n\n\
Use this tool to:\n\
- Get file contents at specific refs: git show <ref>:<path>\n\
- Get blame information: git blame <path>\n\
- Get recent commits: git log -n 10 <path>\n\
- Get diff between branches: git diff target...source\n\
- Search for patterns: grep -r \"pattern\" <path>\n\n\
Returns: JSON with stdout, stderr, exit_code, and success boolean."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute (must be in allowlist)"
                    },
                    "timeout": {
                        "type": "number",
                        "description": "Timeout in seconds (default: 30, max: 120)",
                        "default": 30
                    }
                },
                "required": ["command"]
            }),
        },
        ToolDefinition {
            name: "gitlab_api".to_string(),
            description: "Make a GET request to the GitLab API v4.\n\n\
The base URL and authentication are handled automatically.\n\
Provide the endpoint path starting with /.\n\n\
Examples:\n\
- Get project info: /projects/:id\n\
- Get MR info: /projects/:id/merge_requests/:iid\n\
- Get MR changes: /projects/:id/merge_requests/:iid/changes\n\n\
Returns: JSON response from the API or error details."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "endpoint": {
                        "type": "string",
                        "description": "API endpoint path (e.g., /projects/123/merge_requests/1)"
                    },
                    "params": {
                        "type": "object",
                        "description": "Optional query parameters",
                        "additionalProperties": true
                    }
                },
                "required": ["endpoint"]
            }),
        },
        ToolDefinition {
            name: "file_context".to_string(),
            description: "Get additional context for a specific file.\n\n\
Retrieves:\n\
- Full file content at a ref\n\
- Git blame for a line range (if provided)\n\
- Recent commit history for the file\n\n\
Use this for deeper analysis of specific files that need more context."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file relative to repository root"
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "Start line for blame (1-indexed, optional)"
                    },
                    "end_line": {
                        "type": "integer",
                        "description": "End line for blame (1-indexed, optional)"
                    },
                    "ref": {
                        "type": "string",
                        "description": "Git ref to get content from (default: HEAD)",
                        "default": "HEAD"
                    }
                },
                "required": ["file_path"]
            }),
        },
    ]
}

/// Dispatches tool calls from the engine. Every failure is reported as an
/// `error` field in the returned JSON; nothing propagates past this
/// boundary.
pub struct ToolGateway<'a> {
    repo: &'a LocalRepo,
    gitlab: &'a GitLabClient,
    max_context_lines: usize,
}

impl<'a> ToolGateway<'a> {
    pub fn new(repo: &'a LocalRepo, gitlab: &'a GitLabClient, max_context_lines: usize) -> Self {
        Self {
            repo,
            gitlab,
            max_context_lines,
        }
    }

    pub async fn execute(&self, tool_name: &str, input: &Value) -> Value {
        debug!(tool = tool_name, "dispatching tool call");
        match tool_name {
            "run_command" => self.run_command(input).await,
            "gitlab_api" => self.gitlab_api(input),
            "file_context" => self.file_context(input).await,
            other => {
                warn!(tool = other, "unknown tool requested");
                json!({ "error": format!("Unknown tool: {other}") })
            }
        }
    }

    async fn run_command(&self, input: &Value) -> Value {
        let command = input["command"].as_str().unwrap_or_default();
        if command.is_empty() {
            return json!({ "error": "No command provided", "success": false });
        }
        let timeout_secs = input["timeout"]
            .as_u64()
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS)
            .min(MAX_COMMAND_TIMEOUT_SECS);

        match self
            .repo
            .run(command, Duration::from_secs(timeout_secs))
            .await
        {
            Ok(result) => json!({
                "command": result.command,
                "stdout": result.stdout,
                "stderr": result.stderr,
                "exit_code": result.exit_code,
                "success": result.success,
            }),
            Err(e) => json!({
                "error": e.to_string(),
                "command": command,
                "success": false,
            }),
        }
    }

    fn gitlab_api(&self, input: &Value) -> Value {
        let endpoint = input["endpoint"].as_str().unwrap_or_default();
        if endpoint.is_empty() {
            return json!({ "error": "No endpoint provided" });
        }

        let params: Vec<(String, String)> = input["params"]
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| {
                        let value = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        match self.gitlab.api_get(endpoint, &params) {
            Ok(data) => json!({ "data": data, "success": true }),
            Err(e) => json!({ "error": e.to_string(), "success": false }),
        }
    }

    /// The three sub-fetches (content, blame, log) fail independently,
    /// each reporting inline so partial context is still useful.
    async fn file_context(&self, input: &Value) -> Value {
        let file_path = input["file_path"].as_str().unwrap_or_default();
        if file_path.is_empty() {
            return json!({ "error": "No file path provided" });
        }
        let git_ref = input["ref"].as_str().unwrap_or("HEAD");
        let start_line = input["start_line"].as_u64().map(|n| n as u32);
        let end_line = input["end_line"].as_u64().map(|n| n as u32);

        let mut context = serde_json::Map::new();
        context.insert("file_path".into(), json!(file_path));
        context.insert("ref".into(), json!(git_ref));

        match self.repo.file_at_ref(file_path, git_ref).await {
            Ok(Some(content)) => {
                let lines: Vec<&str> = content.split('\n').collect();
                let total_lines = lines.len();
                context.insert("line_count".into(), json!(total_lines));
                if total_lines > self.max_context_lines && start_line.is_none() {
                    context.insert(
                        "content".into(),
                        json!(lines[..self.max_context_lines].join("\n")),
                    );
                    context.insert("truncated".into(), json!(true));
                    context.insert(
                        "warning".into(),
                        json!(format!(
                            "File truncated. Showing first {} of {} lines. \
                             Use start_line/end_line to view specific sections.",
                            self.max_context_lines, total_lines
                        )),
                    );
                } else {
                    context.insert("content".into(), json!(content));
                }
            }
            Ok(None) => {
                context.insert("content_error".into(), json!("File not found at ref"));
            }
            Err(e) => {
                context.insert("content_error".into(), json!(e.to_string()));
            }
        }

        if let (Some(start), Some(end)) = (start_line, end_line) {
            let blame = self.repo.blame(file_path, start, end, git_ref).await;
            if blame.is_empty() {
                context.insert("blame_error".into(), json!("blame unavailable"));
            } else {
                context.insert("blame".into(), json!(blame));
            }
        }

        let log = self.repo.log(file_path, LOG_MAX_COUNT).await;
        if !log.is_empty() {
            context.insert("recent_commits".into(), json!(log));
        }

        Value::Object(context)
    }
}

/// Render a tool result for the engine's tool_result block.
pub fn format_tool_result(result: &Value) -> String {
    serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::gitlab::GitLabTransport;
    use std::fs;
    use tempfile::TempDir;

    struct FailingTransport;

    impl GitLabTransport for FailingTransport {
        fn get(&self, _endpoint: &str, _params: &[(String, String)]) -> Result<Value> {
            Err(crate::error::Error::Api("boom".to_string()))
        }

        fn get_text(
            &self,
            _endpoint: &str,
            _params: &[(String, String)],
        ) -> Result<Option<String>> {
            Ok(None)
        }

        fn post(&self, _endpoint: &str, _body: &Value) -> Result<Value> {
            Err(crate::error::Error::Api("boom".to_string()))
        }
    }

    fn fake_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("notes.txt"), "line one\nline two\n").unwrap();
        dir
    }

    fn gitlab() -> GitLabClient {
        GitLabClient::with_transport("1", Box::new(FailingTransport))
    }

    #[test]
    fn test_tool_definitions_shape() {
        let defs = tool_definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["run_command", "gitlab_api", "file_context"]);
        for def in &defs {
            assert_eq!(def.input_schema["type"], "object");
            assert!(def.input_schema["required"].is_array());
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_returns_error_value() {
        let dir = fake_repo();
        let repo = LocalRepo::open(dir.path()).unwrap();
        let gl = gitlab();
        let gateway = ToolGateway::new(&repo, &gl, 2000);
        let out = gateway.execute("launch_missiles", &json!({})).await;
        assert!(
            out["error"]
                .as_str()
                .unwrap()
                .contains("Unknown tool: launch_missiles")
        );
    }

    #[tokio::test]
    async fn test_run_command_success_shape() {
        let dir = fake_repo();
        let repo = LocalRepo::open(dir.path()).unwrap();
        let gl = gitlab();
        let gateway = ToolGateway::new(&repo, &gl, 2000);
        let out = gateway
            .execute("run_command", &json!({"command": "cat notes.txt"}))
            .await;
        assert_eq!(out["success"], true);
        assert_eq!(out["exit_code"], 0);
        assert_eq!(out["stdout"], "line one\nline two\n");
    }

    #[tokio::test]
    async fn test_run_command_rejection_is_structured() {
        let dir = fake_repo();
        let repo = LocalRepo::open(dir.path()).unwrap();
        let gl = gitlab();
        let gateway = ToolGateway::new(&repo, &gl, 2000);
        let out = gateway
            .execute("run_command", &json!({"command": "rm -rf /"}))
            .await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("unsafe command"));
        assert_eq!(out["command"], "rm -rf /");
    }

    #[tokio::test]
    async fn test_run_command_requires_command() {
        let dir = fake_repo();
        let repo = LocalRepo::open(dir.path()).unwrap();
        let gl = gitlab();
        let gateway = ToolGateway::new(&repo, &gl, 2000);
        let out = gateway.execute("run_command", &json!({})).await;
        assert_eq!(out["error"], "No command provided");
    }

    #[tokio::test]
    async fn test_gitlab_api_error_is_structured() {
        let dir = fake_repo();
        let repo = LocalRepo::open(dir.path()).unwrap();
        let gl = gitlab();
        let gateway = ToolGateway::new(&repo, &gl, 2000);
        let out = gateway
            .execute("gitlab_api", &json!({"endpoint": "/projects/1"}))
            .await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_gitlab_api_requires_endpoint() {
        let dir = fake_repo();
        let repo = LocalRepo::open(dir.path()).unwrap();
        let gl = gitlab();
        let gateway = ToolGateway::new(&repo, &gl, 2000);
        let out = gateway.execute("gitlab_api", &json!({})).await;
        assert_eq!(out["error"], "No endpoint provided");
    }

    #[tokio::test]
    async fn test_file_context_partial_failures_inline() {
        // No real git history, so content/blame/log all fail, but the
        // result still carries the path and inline error fields.
        let dir = fake_repo();
        let repo = LocalRepo::open(dir.path()).unwrap();
        let gl = gitlab();
        let gateway = ToolGateway::new(&repo, &gl, 2000);
        let out = gateway
            .execute(
                "file_context",
                &json!({"file_path": "notes.txt", "start_line": 1, "end_line": 2}),
            )
            .await;
        assert_eq!(out["file_path"], "notes.txt");
        assert_eq!(out["ref"], "HEAD");
        assert!(out.get("content_error").is_some());
        assert!(out.get("blame_error").is_some());
        assert!(out.get("error").is_none());
    }

    #[test]
    fn test_format_tool_result() {
        let rendered = format_tool_result(&json!({"success": true}));
        assert!(rendered.contains("\"success\": true"));
    }
}
