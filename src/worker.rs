//! Runs the external summarizer as a child process.
//!
//! The worker exposes two subcommands:
//!
//! ```text
//! <program> <args...> search <query> -n <count> -o <dir> -p <provider> [-s] [-f] [-a <key>]
//! <program> <args...> analyze <dir>
//! ```
//!
//! Exit code 0 is success, anything else is failure regardless of what was
//! written to the output directory. Nothing in this module returns an error:
//! a missing program, a spawn error, a timeout or a shutdown all come back
//! as [`ExitOutcome::Failure`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::models::SearchParams;

/// How a worker invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Failure {
        /// `None` when the process never started, was killed, or timed out.
        exit_code: Option<i32>,
        /// Trailing window of stderr, or a description of why it never ran.
        stderr_snippet: String,
    },
}

impl ExitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    fn failure(exit_code: Option<i32>, stderr_snippet: impl Into<String>) -> Self {
        Self::Failure {
            exit_code,
            stderr_snippet: stderr_snippet.into(),
        }
    }
}

/// Launches worker processes according to a [`ServiceConfig`].
///
/// Every child is spawned with `kill_on_drop` and raced against the
/// invoker's cancellation token, so cancelling the token terminates all
/// running workers.
#[derive(Clone, Debug)]
pub struct Invoker {
    config: ServiceConfig,
    cancel: CancellationToken,
}

impl Invoker {
    pub fn new(config: ServiceConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run a search for `session_id`, writing into its output directory.
    ///
    /// The directory is created first; the returned path is where the
    /// worker was told to write, even if the run failed.
    pub async fn invoke_search(
        &self,
        session_id: &str,
        params: &SearchParams,
    ) -> (PathBuf, ExitOutcome) {
        let output_dir = self.config.session_dir(session_id);

        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            let outcome = ExitOutcome::failure(
                None,
                format!("cannot create output directory {}: {}", output_dir.display(), e),
            );
            return (output_dir, outcome);
        }

        if self.config.api_key.is_none() {
            tracing::debug!("No API key configured; search runs without -a");
        }

        let args = search_args(params, &output_dir, self.config.api_key.as_deref());
        let outcome = self.run("search", args).await;
        (output_dir, outcome)
    }

    /// Run the comparative analysis over a directory a search populated.
    pub async fn invoke_analyze(&self, output_dir: &Path) -> ExitOutcome {
        self.run("analyze", analyze_args(output_dir)).await
    }

    async fn run(&self, operation: &'static str, args: Vec<OsString>) -> ExitOutcome {
        let program = &self.config.worker_program;
        tracing::info!(
            "Running worker {}: {}",
            operation,
            display_command(program, &self.config.worker_args, &args)
        );

        let mut cmd = Command::new(program);
        cmd.args(&self.config.worker_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Failed to start worker {:?}: {}", program, e);
                return ExitOutcome::failure(None, format!("failed to start {program}: {e}"));
            }
        };

        let started = Instant::now();
        let job_timeout = self.config.job_timeout;
        let finished = async move {
            let wait = child.wait_with_output();
            match job_timeout {
                Some(limit) => tokio::time::timeout(limit, wait).await.ok(),
                None => Some(wait.await),
            }
        };

        // Dropping `finished` drops the child, which kills it.
        let output = tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::warn!("Worker {} cancelled by shutdown", operation);
                return ExitOutcome::failure(None, "worker cancelled by shutdown");
            }
            output = finished => output,
        };

        let output = match output {
            Some(Ok(output)) => output,
            Some(Err(e)) => {
                tracing::error!("Failed to collect worker output: {}", e);
                return ExitOutcome::failure(None, format!("failed to collect worker output: {e}"));
            }
            None => {
                let secs = job_timeout.map(|t| t.as_secs()).unwrap_or_default();
                tracing::error!("Worker {} timed out after {}s", operation, secs);
                return ExitOutcome::failure(None, format!("worker timed out after {secs}s"));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let elapsed_ms = started.elapsed().as_millis();

        if !stdout.is_empty() {
            tracing::debug!("Worker {} stdout:\n{}", operation, stdout);
        }

        if output.status.success() {
            if !stderr.is_empty() {
                tracing::debug!("Worker {} stderr:\n{}", operation, stderr);
            }
            tracing::info!("Worker {} succeeded in {}ms", operation, elapsed_ms);
            ExitOutcome::Success
        } else {
            let exit_code = output.status.code();
            tracing::warn!(
                "Worker {} failed with exit code {:?} after {}ms, stderr:\n{}",
                operation,
                exit_code,
                elapsed_ms,
                stderr
            );
            ExitOutcome::failure(
                exit_code,
                tail(&stderr, self.config.stderr_retention_bytes),
            )
        }
    }
}

/// Arguments after the configured program prefix for a search.
pub fn search_args(params: &SearchParams, output_dir: &Path, api_key: Option<&str>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "search".into(),
        params.query.clone().into(),
        "-n".into(),
        params.num_results.to_string().into(),
        "-o".into(),
        output_dir.into(),
        "-p".into(),
        params.provider.clone().into(),
    ];

    if params.sort_by_date {
        args.push("-s".into());
    }
    if params.full_text {
        args.push("-f".into());
    }
    if let Some(key) = api_key {
        args.push("-a".into());
        args.push(key.into());
    }

    args
}

/// Arguments after the configured program prefix for an analysis.
pub fn analyze_args(output_dir: &Path) -> Vec<OsString> {
    vec!["analyze".into(), output_dir.into()]
}

/// Command line for logs, with the credential masked.
fn display_command(program: &str, prefix: &[String], args: &[OsString]) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(prefix.iter().cloned());

    let mut mask_next = false;
    for arg in args {
        let arg = arg.to_string_lossy();
        if mask_next {
            parts.push("***".to_string());
            mask_next = false;
        } else {
            mask_next = arg == "-a";
            parts.push(arg.into_owned());
        }
    }

    parts.join(" ")
}

/// Last `max_bytes` of `s`, starting on a char boundary.
fn tail(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut start = s.len() - max_bytes;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}
