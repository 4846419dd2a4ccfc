use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Configuration for one capped, timed child process.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub env: Vec<(String, String)>,
}

/// Output from a completed child process. stdout and stderr are
/// independently truncated to the configured byte cap.
#[derive(Debug)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a child process with an enforced wall-clock timeout and capped
/// capture. The child never sees a terminal, so interactive prompts and
/// pagers are disabled via the configured environment.
pub async fn run_captured(config: ExecConfig) -> Result<ExecOutput> {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args)
        .current_dir(&config.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &config.env {
        cmd.env(key, value);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Process(format!("failed to spawn '{}': {e}", config.program)))?;

    let pid = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Process("stdout not piped".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Process("stderr not piped".into()))?;

    let cap = config.max_output_bytes;
    let stdout_task = tokio::spawn(read_capped(stdout, cap));
    let stderr_task = tokio::spawn(read_capped(stderr, cap));

    let status = match tokio::time::timeout(config.timeout, child.wait()).await {
        Ok(r) => r.map_err(|e| Error::Process(format!("wait error: {e}")))?,
        Err(_) => {
            stdout_task.abort();
            stderr_task.abort();
            #[cfg(unix)]
            if let Some(pid) = pid {
                unsafe {
                    libc::killpg(pid as i32, libc::SIGKILL);
                }
            }
            let _ = child.kill().await;
            return Err(Error::Timeout(format!(
                "process timed out after {:?}: {}",
                config.timeout, config.program
            )));
        }
    };

    let stdout = stdout_task
        .await
        .map_err(|e| Error::Process(format!("stdout reader failed: {e}")))?;
    let stderr = stderr_task
        .await
        .map_err(|e| Error::Process(format!("stderr reader failed: {e}")))?;

    Ok(ExecOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

/// Read a stream to EOF, keeping at most `cap` bytes. The stream is always
/// drained so the child never blocks on a full pipe.
async fn read_capped<R: tokio::io::AsyncRead + Unpin>(mut reader: R, cap: usize) -> String {
    let mut kept: Vec<u8> = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if kept.len() < cap {
                    let take = n.min(cap - kept.len());
                    kept.extend_from_slice(&buf[..take]);
                }
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&kept).into_owned()
}
