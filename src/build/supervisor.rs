//! Build worker supervision
//!
//! Each build gets a fresh worker process; none are reused. The
//! supervisor drives the stdin/stdout protocol in strict order (wait for
//! `Ready`, send one `Start`, forward `Info` lines, accept one terminal
//! message), bounds the whole exchange with a timeout, and reaps the
//! process afterwards. Reaping runs detached so waiters get their
//! outcome as soon as the terminal message lands.

use crate::build::protocol::{BuildParams, WorkerMessage};
use crate::build::runner::{BuildRunner, BuildTask};
use crate::config::schema::BuildConfig;
use crate::error::{BaleError, BaleResult};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// How long a worker that ended its protocol cleanly gets to finish
/// scratch cleanup and exit on its own
const EXIT_GRACE: Duration = Duration::from_secs(10);

/// How long a killed worker gets to actually die
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

pub struct WorkerSupervisor {
    command: Vec<String>,
    timeout: Duration,
}

impl WorkerSupervisor {
    /// Worker argv from configuration, defaulting to this binary's
    /// hidden `worker` subcommand.
    pub fn from_config(config: &BuildConfig) -> BaleResult<Self> {
        let command = match &config.worker_command {
            Some(argv) if !argv.is_empty() => argv.clone(),
            Some(_) => {
                return Err(BaleError::Internal(
                    "build.worker_command must not be empty".to_string(),
                ))
            }
            None => {
                let exe = std::env::current_exe()
                    .map_err(|e| BaleError::io("locating the current executable", e))?;
                vec![exe.display().to_string(), "worker".to_string()]
            }
        };
        Ok(Self::new(command, Duration::from_secs(config.worker_timeout_secs)))
    }

    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    fn spawn(&self) -> BaleResult<Child> {
        let display = self.command.join(" ");
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| BaleError::Internal("empty worker command".to_string()))?;

        Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BaleError::command_failed(&display, e))
    }
}

#[async_trait]
impl BuildRunner for WorkerSupervisor {
    async fn run(&self, task: &BuildTask) -> BaleResult<String> {
        debug!("spawning worker for {}", task.key);
        let mut child = self.spawn()?;

        let outcome = match tokio::time::timeout(self.timeout, drive(&mut child, &task.params)).await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("worker for {} exceeded {}s", task.key, self.timeout.as_secs());
                Err(BaleError::WorkerTimeout {
                    secs: self.timeout.as_secs(),
                })
            }
        };

        // A clean protocol end earns a grace window for cleanup; a
        // timed-out or crashed worker dies now.
        let graceful = matches!(outcome, Ok(_) | Err(BaleError::BuildFailed { .. }));
        tokio::spawn(reap(child, graceful));
        outcome
    }
}

/// Run the protocol exchange to its terminal message.
async fn drive(child: &mut Child, params: &BuildParams) -> BaleResult<String> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| BaleError::Internal("worker stdin not piped".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BaleError::Internal("worker stdout not piped".to_string()))?;
    let mut lines = BufReader::new(stdout).lines();

    await_ready(&mut lines).await?;

    let start = serde_json::to_string(&WorkerMessage::Start {
        params: params.clone(),
    })?;
    stdin
        .write_all(format!("{start}\n").as_bytes())
        .await
        .map_err(|e| BaleError::io("writing worker start order", e))?;

    while let Some(line) = next_message_line(&mut lines).await? {
        match serde_json::from_str::<WorkerMessage>(&line) {
            Ok(WorkerMessage::Info { message }) => info!("{message}"),
            Ok(WorkerMessage::Result { code }) => return Ok(code),
            Ok(WorkerMessage::Error { message, trace }) => {
                warn!("worker reported failure: {trace}");
                return Err(BaleError::BuildFailed {
                    message,
                    detail: Some(trace),
                });
            }
            Ok(other) => debug!("ignoring out-of-order worker message: {other:?}"),
            Err(_) => debug!("ignoring non-protocol worker output: {line}"),
        }
    }

    Err(BaleError::WorkerCrashed {
        reason: "exited before reporting a result".to_string(),
    })
}

async fn await_ready(
    lines: &mut tokio::io::Lines<BufReader<ChildStdout>>,
) -> BaleResult<()> {
    while let Some(line) = next_message_line(lines).await? {
        match serde_json::from_str::<WorkerMessage>(&line) {
            Ok(WorkerMessage::Ready) => return Ok(()),
            _ => debug!("ignoring pre-ready worker output: {line}"),
        }
    }
    Err(BaleError::WorkerCrashed {
        reason: "exited before becoming ready".to_string(),
    })
}

async fn next_message_line(
    lines: &mut tokio::io::Lines<BufReader<ChildStdout>>,
) -> BaleResult<Option<String>> {
    loop {
        match lines
            .next_line()
            .await
            .map_err(|e| BaleError::io("reading worker output", e))?
        {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => return Ok(Some(line.trim().to_string())),
            None => return Ok(None),
        }
    }
}

/// Wait for the worker to go away, killing it if it overstays;
/// kill-on-drop covers the case where even that wait runs out.
async fn reap(mut child: Child, graceful: bool) {
    if graceful {
        if tokio::time::timeout(EXIT_GRACE, child.wait()).await.is_ok() {
            return;
        }
        debug!("worker still alive after its grace window");
    }
    let _ = child.start_kill();
    if tokio::time::timeout(REAP_TIMEOUT, child.wait()).await.is_err() {
        warn!("worker did not exit after kill");
    }
}
