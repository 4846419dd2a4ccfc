use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::CommandResult;
use crate::process::{ExecConfig, run_captured};
use crate::safety::check_command;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_OUTPUT_BYTES: usize = 1_000_000;

/// Read-only interface to the local git checkout. Every command funnels
/// through the safety gate before it can execute.
#[derive(Debug)]
pub struct LocalRepo {
    root: PathBuf,
}

impl LocalRepo {
    pub fn open(path: &Path) -> Result<Self> {
        let root = path
            .canonicalize()
            .map_err(|_| Error::Validation(format!("repository path does not exist: {}", path.display())))?;
        if !root.is_dir() {
            return Err(Error::Validation(format!(
                "repository path is not a directory: {}",
                root.display()
            )));
        }
        if !root.join(".git").exists() {
            return Err(Error::Validation(format!(
                "not a git repository: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run one gated command string in the repository. The command is
    /// validated, tokenized, and executed directly, never through a shell.
    pub async fn run(&self, command: &str, timeout: Duration) -> Result<CommandResult> {
        check_command(command).map_err(|reason| {
            Error::Validation(format!("unsafe command rejected: {reason}"))
        })?;

        if !self.root.is_dir() {
            return Err(Error::Validation(format!(
                "working directory is not a directory: {}",
                self.root.display()
            )));
        }

        let parts = shell_words::split(command)
            .map_err(|e| Error::Validation(format!("could not parse command: {e}")))?;
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| Error::Validation("empty command".to_string()))?;

        debug!(command, "running gated command");

        let output = run_captured(ExecConfig {
            program: program.clone(),
            args: args.to_vec(),
            working_dir: self.root.clone(),
            timeout,
            max_output_bytes: MAX_OUTPUT_BYTES,
            env: vec![
                ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
                ("PAGER".to_string(), "cat".to_string()),
                ("GIT_PAGER".to_string(), "cat".to_string()),
            ],
        })
        .await?;

        Ok(CommandResult {
            command: command.to_string(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            success: output.exit_code == 0,
        })
    }

    /// Run a git command and return stdout, erroring on nonzero exit.
    pub async fn git(&self, args: &[&str]) -> Result<String> {
        let command = format!("git {}", shell_words::join(args));
        let result = self.run(&command, DEFAULT_COMMAND_TIMEOUT).await?;
        if !result.success {
            let detail = if result.stderr.is_empty() {
                result.stdout
            } else {
                result.stderr
            };
            return Err(Error::Process(format!("git command failed: {detail}")));
        }
        Ok(result.stdout)
    }

    /// File content at a ref. A missing file is an expected case, not an
    /// error.
    pub async fn file_at_ref(&self, path: &str, git_ref: &str) -> Result<Option<String>> {
        match self.git(&["show", &format!("{git_ref}:{path}")]).await {
            Ok(content) => Ok(Some(content)),
            Err(Error::Process(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Blame for a line range. Empty output when blame fails.
    pub async fn blame(
        &self,
        path: &str,
        start_line: u32,
        end_line: u32,
        git_ref: &str,
    ) -> String {
        let range = format!("{start_line},{end_line}");
        self.git(&["blame", "--date=short", "-L", &range, git_ref, "--", path])
            .await
            .unwrap_or_default()
    }

    /// Recent one-line commit history for a path. Empty output on failure.
    pub async fn log(&self, path: &str, max_count: usize) -> String {
        let count = format!("-n{max_count}");
        self.git(&["log", &count, "--format=%h %s", "--", path])
            .await
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fake_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("hello.txt"), "hello repo\n").unwrap();
        dir
    }

    #[test]
    fn test_open_requires_git_dir() {
        let dir = TempDir::new().unwrap();
        let err = LocalRepo::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a git repository"));
    }

    #[test]
    fn test_open_missing_path() {
        let err = LocalRepo::open(Path::new("/no/such/path/here")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_run_rejects_unsafe_command() {
        let dir = fake_repo();
        let repo = LocalRepo::open(dir.path()).unwrap();
        let err = repo
            .run("rm -rf /", DEFAULT_COMMAND_TIMEOUT)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsafe command rejected"));
    }

    #[tokio::test]
    async fn test_run_executes_allowed_command() {
        let dir = fake_repo();
        let repo = LocalRepo::open(dir.path()).unwrap();
        let result = repo
            .run("cat hello.txt", DEFAULT_COMMAND_TIMEOUT)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout, "hello repo\n");
        assert_eq!(result.command, "cat hello.txt");
    }

    #[tokio::test]
    async fn test_run_captures_failure_exit() {
        let dir = fake_repo();
        let repo = LocalRepo::open(dir.path()).unwrap();
        let result = repo
            .run("cat no-such-file.txt", DEFAULT_COMMAND_TIMEOUT)
            .await
            .unwrap();
        assert!(!result.success);
        assert_ne!(result.exit_code, 0);
        assert!(!result.stderr.is_empty());
    }
}
