//! Service configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_OUTPUT_DIR: &str = "summaries";
const DEFAULT_WORKER_PROGRAM: &str = "python";
const DEFAULT_WORKER_ARGS: &str = "research_summarizer.py";
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;
const DEFAULT_STDERR_RETENTION_BYTES: usize = 4096;

/// Configuration for the session manager and the external worker.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Base directory; each session writes to `<output_root>/<session_id>`
    /// (from PAPERDESK_OUTPUT_DIR).
    pub output_root: PathBuf,
    /// Program that implements the search/analyze commands
    /// (from PAPERDESK_WORKER_PROGRAM).
    pub worker_program: String,
    /// Arguments placed before the subcommand, usually the script path
    /// (from PAPERDESK_WORKER_ARGS, whitespace-separated).
    pub worker_args: Vec<String>,
    /// Credential forwarded to the search command as `-a` (from API_KEY).
    /// Omitted from the command line when unset.
    pub api_key: Option<String>,
    /// Kill the worker after this long (from PAPERDESK_JOB_TIMEOUT_SECS).
    pub job_timeout: Option<Duration>,
    /// Maximum number of worker processes running at once
    /// (from PAPERDESK_MAX_CONCURRENT_JOBS).
    pub max_concurrent_jobs: usize,
    /// How long shutdown waits for running workflows before killing them
    /// (from PAPERDESK_SHUTDOWN_GRACE_SECS).
    pub shutdown_grace: Duration,
    /// Trailing bytes of worker stderr kept for diagnostics
    /// (from PAPERDESK_STDERR_RETENTION_BYTES).
    pub stderr_retention_bytes: usize,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::new(
            std::env::var("PAPERDESK_OUTPUT_DIR").unwrap_or_else(|_| DEFAULT_OUTPUT_DIR.into()),
        );

        if let Ok(program) = std::env::var("PAPERDESK_WORKER_PROGRAM") {
            config.worker_program = program;
        }
        if let Ok(args) = std::env::var("PAPERDESK_WORKER_ARGS") {
            config.worker_args = split_args(&args);
        }

        config.api_key = std::env::var("API_KEY").ok().filter(|k| !k.is_empty());

        config.job_timeout = env_parse::<u64>("PAPERDESK_JOB_TIMEOUT_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        if let Some(max) = env_parse::<usize>("PAPERDESK_MAX_CONCURRENT_JOBS") {
            config.max_concurrent_jobs = max.max(1);
        }
        if let Some(secs) = env_parse::<u64>("PAPERDESK_SHUTDOWN_GRACE_SECS") {
            config.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(bytes) = env_parse::<usize>("PAPERDESK_STDERR_RETENTION_BYTES") {
            config.stderr_retention_bytes = bytes;
        }

        config
    }

    /// Defaults with an explicit output root.
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            worker_program: DEFAULT_WORKER_PROGRAM.to_string(),
            worker_args: split_args(DEFAULT_WORKER_ARGS),
            api_key: None,
            job_timeout: None,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            stderr_retention_bytes: DEFAULT_STDERR_RETENTION_BYTES,
        }
    }

    /// Use a different worker command.
    pub fn with_worker<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.worker_program = program.into();
        self.worker_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Output directory of one session.
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.output_root.join(session_id)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn split_args(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!("Ignoring invalid value for {}: {:?}", key, value);
                None
            }
        },
        Err(_) => None,
    }
}
