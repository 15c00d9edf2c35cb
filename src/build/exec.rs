//! Captured-output subprocess helper for the build pipeline

use crate::error::{BaleError, BaleResult};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Outcome of a finished command
#[derive(Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Combined stdout and stderr lines, in that order
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .filter(|l| !l.trim().is_empty())
    }

    /// Last few stderr lines, for error messages
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        let start = lines.len().saturating_sub(5);
        lines[start..].join("\n")
    }
}

/// Run `argv` in `cwd` with `env` added, feeding `stdin_data` if given,
/// and capture both output streams.
pub async fn run_command(
    argv: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
    stdin_data: Option<&[u8]>,
) -> BaleResult<CommandOutput> {
    let display = argv.join(" ");
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| BaleError::Internal("empty command".to_string()))?;

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .envs(env)
        .stdin(if stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| BaleError::command_failed(&display, e))?;

    // A child may interleave reading stdin with writing output, so the
    // feed has to run concurrently with the output drain.
    let writer = match stdin_data {
        Some(data) => {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| BaleError::Internal(format!("no stdin pipe for {display}")))?;
            let data = data.to_vec();
            Some(tokio::spawn(async move {
                stdin.write_all(&data).await?;
                stdin.shutdown().await
            }))
        }
        None => None,
    };

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| BaleError::command_failed(&display, e))?;

    if let Some(writer) = writer {
        // a child is free to exit without draining its stdin
        let _ = writer.await;
    }

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
