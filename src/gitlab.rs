use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{ChangedFile, Commit, MergeRequestInfo};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// Low-level GET/POST against the GitLab REST API, behind a trait so tests
/// can stub responses.
pub trait GitLabTransport {
    fn get(&self, endpoint: &str, params: &[(String, String)]) -> Result<serde_json::Value>;
    fn get_text(&self, endpoint: &str, params: &[(String, String)]) -> Result<Option<String>>;
    fn post(&self, endpoint: &str, body: &serde_json::Value) -> Result<serde_json::Value>;
}

/// Blocking transport with retry on rate limits, server errors, and
/// transport failures.
pub struct UreqTransport {
    base_url: String,
    token: String,
}

impl UreqTransport {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: format!("{}/api/v4", base_url.trim_end_matches('/')),
            token: token.to_string(),
        }
    }

    fn request(
        &self,
        endpoint: &str,
        params: &[(String, String)],
        as_text: bool,
        post_body: Option<&serde_json::Value>,
    ) -> Result<ureq::Response> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut backoff_ms = INITIAL_BACKOFF_MS;
        for attempt in 1..=MAX_RETRIES {
            let mut req = if post_body.is_some() {
                ureq::post(&url)
            } else {
                ureq::get(&url)
            }
            .set("PRIVATE-TOKEN", &self.token);
            if !as_text {
                req = req.set("Accept", "application/json");
            }
            for (key, value) in params {
                req = req.query(key, value);
            }

            let outcome = match post_body {
                Some(body) => req.send_json(body),
                None => req.call(),
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(ref e) if attempt < MAX_RETRIES && is_retryable(e) => {
                    warn!(
                        attempt,
                        error = %e,
                        backoff_ms,
                        "retrying GitLab API after transient error"
                    );
                    thread::sleep(Duration::from_millis(backoff_ms));
                    backoff_ms *= 2;
                }
                Err(e) => return Err(Error::Api(format!("GitLab request failed: {e}"))),
            }
        }
        unreachable!()
    }
}

fn is_retryable(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
        ureq::Error::Transport(_) => true,
    }
}

impl GitLabTransport for UreqTransport {
    fn get(&self, endpoint: &str, params: &[(String, String)]) -> Result<serde_json::Value> {
        self.request(endpoint, params, false, None)?
            .into_json()
            .map_err(|e| Error::Api(format!("failed to parse GitLab response: {e}")))
    }

    fn get_text(&self, endpoint: &str, params: &[(String, String)]) -> Result<Option<String>> {
        match self.request(endpoint, params, true, None) {
            Ok(response) => {
                let text = response
                    .into_string()
                    .map_err(|e| Error::Api(format!("failed to read GitLab response: {e}")))?;
                Ok(Some(text))
            }
            Err(Error::Api(msg)) if msg.contains("status code 404") => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn post(&self, endpoint: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        self.request(endpoint, &[], false, Some(body))?
            .into_json()
            .map_err(|e| Error::Api(format!("failed to parse GitLab response: {e}")))
    }
}

/// Percent-encode a project path for use inside a URL path segment.
fn encode_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

// API response shapes; only the fields we use.

#[derive(Debug, Deserialize)]
struct ApiAuthor {
    username: String,
}

#[derive(Debug, Deserialize)]
struct ApiPipeline {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ApiMergeRequest {
    iid: u64,
    title: String,
    description: Option<String>,
    author: Option<ApiAuthor>,
    state: String,
    source_branch: String,
    target_branch: String,
    web_url: String,
    #[serde(default)]
    labels: Vec<String>,
    head_pipeline: Option<ApiPipeline>,
    #[serde(default)]
    has_conflicts: bool,
}

#[derive(Debug, Deserialize)]
struct ApiChange {
    new_path: String,
    old_path: String,
    #[serde(default)]
    new_file: bool,
    #[serde(default)]
    deleted_file: bool,
    #[serde(default)]
    renamed_file: bool,
    #[serde(default)]
    diff: String,
}

#[derive(Debug, Deserialize)]
struct ApiChanges {
    #[serde(default)]
    changes: Vec<ApiChange>,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    id: String,
    short_id: String,
    title: String,
    author_name: String,
    authored_date: String,
}

/// GitLab REST v4 client for merge request data.
pub struct GitLabClient {
    project: String,
    transport: Box<dyn GitLabTransport>,
}

impl GitLabClient {
    pub fn new(base_url: &str, token: &str, project: &str) -> Self {
        Self {
            project: project.to_string(),
            transport: Box::new(UreqTransport::new(base_url, token)),
        }
    }

    pub fn with_transport(project: &str, transport: Box<dyn GitLabTransport>) -> Self {
        Self {
            project: project.to_string(),
            transport,
        }
    }

    fn project_path(&self) -> String {
        if self.project.bytes().all(|b| b.is_ascii_digit()) {
            self.project.clone()
        } else {
            encode_path_segment(&self.project)
        }
    }

    pub fn merge_request(&self, iid: u64) -> Result<MergeRequestInfo> {
        let endpoint = format!("/projects/{}/merge_requests/{iid}", self.project_path());
        let value = self.transport.get(&endpoint, &[])?;
        let mr: ApiMergeRequest = serde_json::from_value(value)
            .map_err(|e| Error::Api(format!("unexpected merge request payload: {e}")))?;
        Ok(MergeRequestInfo {
            iid: mr.iid,
            title: mr.title,
            description: mr.description.unwrap_or_default(),
            author: mr
                .author
                .map(|a| a.username)
                .unwrap_or_else(|| "unknown".to_string()),
            state: mr.state,
            source_branch: mr.source_branch,
            target_branch: mr.target_branch,
            web_url: mr.web_url,
            labels: mr.labels,
            pipeline_status: mr.head_pipeline.map(|p| p.status),
            has_conflicts: mr.has_conflicts,
        })
    }

    pub fn merge_request_changes(&self, iid: u64, max_files: usize) -> Result<Vec<ChangedFile>> {
        let endpoint = format!(
            "/projects/{}/merge_requests/{iid}/changes",
            self.project_path()
        );
        let params = [("access_raw_diffs".to_string(), "true".to_string())];
        let value = self.transport.get(&endpoint, &params)?;
        let payload: ApiChanges = serde_json::from_value(value)
            .map_err(|e| Error::Api(format!("unexpected changes payload: {e}")))?;

        debug!(count = payload.changes.len(), "fetched merge request changes");

        Ok(payload
            .changes
            .into_iter()
            .take(max_files)
            .map(|c| {
                ChangedFile::new(
                    c.new_path,
                    c.old_path,
                    c.new_file,
                    c.deleted_file,
                    c.renamed_file,
                    c.diff,
                )
            })
            .collect())
    }

    pub fn merge_request_commits(&self, iid: u64) -> Result<Vec<Commit>> {
        let endpoint = format!(
            "/projects/{}/merge_requests/{iid}/commits",
            self.project_path()
        );
        let value = self.transport.get(&endpoint, &[])?;
        let commits: Vec<ApiCommit> = serde_json::from_value(value)
            .map_err(|e| Error::Api(format!("unexpected commits payload: {e}")))?;
        Ok(commits
            .into_iter()
            .map(|c| Commit {
                sha: c.id,
                short_sha: c.short_id,
                title: c.title,
                author_name: c.author_name,
                authored_date: c.authored_date,
            })
            .collect())
    }

    pub fn post_mr_note(&self, iid: u64, body: &str) -> Result<()> {
        let endpoint = format!(
            "/projects/{}/merge_requests/{iid}/notes",
            self.project_path()
        );
        self.transport
            .post(&endpoint, &serde_json::json!({ "body": body }))?;
        Ok(())
    }

    /// Raw file content at a ref. A missing file is expected (404 → None).
    pub fn file_raw(&self, path: &str, git_ref: &str) -> Result<Option<String>> {
        let endpoint = format!(
            "/projects/{}/repository/files/{}/raw",
            self.project_path(),
            encode_path_segment(path)
        );
        let params = [("ref".to_string(), git_ref.to_string())];
        self.transport.get_text(&endpoint, &params)
    }

    /// Generic GET passthrough used by the scoped API-fetch tool.
    pub fn api_get(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<serde_json::Value> {
        self.transport.get(endpoint, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct StubTransport {
        responses: RefCell<Vec<serde_json::Value>>,
        requests: Rc<RefCell<Vec<String>>>,
    }

    impl StubTransport {
        fn new(responses: Vec<serde_json::Value>) -> Self {
            Self {
                responses: RefCell::new(responses),
                requests: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn request_log(&self) -> Rc<RefCell<Vec<String>>> {
            Rc::clone(&self.requests)
        }
    }

    impl GitLabTransport for StubTransport {
        fn get(&self, endpoint: &str, _params: &[(String, String)]) -> Result<serde_json::Value> {
            self.requests.borrow_mut().push(endpoint.to_string());
            Ok(self.responses.borrow_mut().remove(0))
        }

        fn get_text(
            &self,
            endpoint: &str,
            _params: &[(String, String)],
        ) -> Result<Option<String>> {
            self.requests.borrow_mut().push(endpoint.to_string());
            Ok(None)
        }

        fn post(&self, endpoint: &str, _body: &serde_json::Value) -> Result<serde_json::Value> {
            self.requests.borrow_mut().push(endpoint.to_string());
            Ok(json!({}))
        }
    }

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode_path_segment("group/project"), "group%2Fproject");
        assert_eq!(encode_path_segment("plain-name_1.0"), "plain-name_1.0");
    }

    #[test]
    fn test_merge_request_parsing() {
        let transport = StubTransport::new(vec![json!({
            "iid": 7,
            "title": "Add feature",
            "description": "desc",
            "author": {"username": "dev"},
            "state": "opened",
            "source_branch": "feature",
            "target_branch": "main",
            "web_url": "https://gitlab.example/mr/7",
            "labels": ["backend"],
            "head_pipeline": {"status": "success"},
            "has_conflicts": false
        })]);
        let client = GitLabClient::with_transport("group/project", Box::new(transport));
        let mr = client.merge_request(7).unwrap();
        assert_eq!(mr.iid, 7);
        assert_eq!(mr.author, "dev");
        assert_eq!(mr.pipeline_status.as_deref(), Some("success"));
    }

    #[test]
    fn test_merge_request_null_fields() {
        let transport = StubTransport::new(vec![json!({
            "iid": 1,
            "title": "t",
            "description": null,
            "author": null,
            "state": "opened",
            "source_branch": "s",
            "target_branch": "t",
            "web_url": "u",
            "head_pipeline": null
        })]);
        let client = GitLabClient::with_transport("1234", Box::new(transport));
        let mr = client.merge_request(1).unwrap();
        assert_eq!(mr.description, "");
        assert_eq!(mr.author, "unknown");
        assert!(mr.pipeline_status.is_none());
    }

    #[test]
    fn test_changes_parsing_respects_max_files() {
        let change = |path: &str| {
            json!({
                "new_path": path,
                "old_path": path,
                "new_file": false,
                "deleted_file": false,
                "renamed_file": false,
                "diff": "@@ -1,1 +1,1 @@\n-a\n+b"
            })
        };
        let transport = StubTransport::new(vec![json!({
            "changes": [change("a.rs"), change("b.rs"), change("c.rs")]
        })]);
        let client = GitLabClient::with_transport("1234", Box::new(transport));
        let changes = client.merge_request_changes(1, 2).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].path, "a.rs");
        assert_eq!(changes[0].hunks.len(), 1);
    }

    #[test]
    fn test_commits_parsing() {
        let transport = StubTransport::new(vec![json!([
            {
                "id": "abcdef1234",
                "short_id": "abcdef1",
                "title": "Fix bug",
                "author_name": "Dev",
                "authored_date": "2026-01-01T00:00:00Z"
            }
        ])]);
        let client = GitLabClient::with_transport("1234", Box::new(transport));
        let commits = client.merge_request_commits(1).unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].short_sha, "abcdef1");
    }

    #[test]
    fn test_numeric_project_not_encoded() {
        let transport = StubTransport::new(vec![json!([])]);
        let log = transport.request_log();
        let client = GitLabClient::with_transport("42", Box::new(transport));
        client.merge_request_commits(9).unwrap();
        assert_eq!(log.borrow()[0], "/projects/42/merge_requests/9/commits");
    }

    #[test]
    fn test_file_raw_missing_file_is_none() {
        let transport = StubTransport::new(vec![]);
        let log = transport.request_log();
        let client = GitLabClient::with_transport("group/project", Box::new(transport));
        let content = client.file_raw("src/main.py", "main").unwrap();
        assert!(content.is_none());
        assert_eq!(
            log.borrow()[0],
            "/projects/group%2Fproject/repository/files/src%2Fmain.py/raw"
        );
    }
}
