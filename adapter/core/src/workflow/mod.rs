//! Workflow Orchestration
//!
//! A profile either makes one synchronous call, or drives a long-running
//! provider job through a small state machine:
//!
//! ```text
//!  SUBMITTED ──> POLLING ──┬──> COMPLETED                (no download step)
//!                 │   ^    └──> DOWNLOADING ──> COMPLETED
//!                 │   │
//!                 └───┘ sleep(interval_ms), up to max_attempts
//!                 │
//!                 ├──> FAILED     (terminal state in failure_states)
//!                 └──> TIMED_OUT  (max_attempts exhausted)
//! ```
//!
//! Workflow specs are validated when they are loaded: an `async_job` without
//! a poll step, a poll step without `status_path`, or an unknown step name
//! never reaches the orchestrator.

mod orchestrator;

use serde::{Deserialize, Serialize};

use crate::transport::{HttpMethod, TransportSpec};

pub use orchestrator::{JobState, Orchestrator};

/// Poll interval bounds in milliseconds
pub const POLL_INTERVAL_RANGE_MS: (u64, u64) = (200, 10_000);
/// Poll attempt bounds
pub const POLL_ATTEMPTS_RANGE: (u32, u32) = (1, 120);

const DEFAULT_INTERVAL_MS: u64 = 2_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 60;
const DEFAULT_TERMINAL_STATES: [&str; 5] = ["completed", "failed", "canceled", "cancelled", "error"];
const DEFAULT_FAILURE_STATES: [&str; 4] = ["failed", "canceled", "cancelled", "error"];

// ============================================================================
// Public Model
// ============================================================================

/// Workflow attached to a profile
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWorkflow", into = "RawWorkflow")]
pub enum WorkflowSpec {
    /// One call, mapped directly
    #[default]
    Sync,
    /// Submit, poll, optionally download
    AsyncJob(AsyncJobSpec),
}

/// Settings for an asynchronous job
#[derive(Clone, Debug, PartialEq)]
pub struct AsyncJobSpec {
    /// Where the job id sits in the submit response
    pub job_id_path: String,
    /// Status polling
    pub poll: PollStep,
    /// Result download, if the provider needs one
    pub download: Option<DownloadStep>,
}

/// Status polling step
#[derive(Clone, Debug, PartialEq)]
pub struct PollStep {
    /// Request issued on every attempt (`{{job_id}}` available)
    pub transport: TransportSpec,
    /// Delay between attempts, clamped
    pub interval_ms: u64,
    /// Attempt budget, clamped
    pub max_attempts: u32,
    /// Where the status sits in the poll response
    pub status_path: String,
    /// Lower-cased states that end polling
    pub terminal_states: Vec<String>,
    /// Lower-cased terminal states that mean the job failed; every other
    /// terminal state is a success
    pub failure_states: Vec<String>,
    /// Result URL reported when there is no download step
    pub result_url_path: Option<String>,
}

impl PollStep {
    /// Whether a (lower-cased) status ends polling
    #[must_use]
    pub fn is_terminal(&self, status: &str) -> bool {
        self.terminal_states.iter().any(|s| s == status)
    }

    /// Whether a terminal status means the job succeeded
    #[must_use]
    pub fn is_success(&self, status: &str) -> bool {
        !self.failure_states.iter().any(|s| s == status)
    }
}

/// How the download step treats its response
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// Raw bytes become a data URI
    #[default]
    Binary,
    /// JSON searched for a result URL
    Json,
}

/// Result download step
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadStep {
    /// Request issued once the job completed (`{{job_id}}` available)
    pub transport: TransportSpec,
    /// Response handling
    pub mode: DownloadMode,
    /// Result URL location (json mode)
    pub url_path: Option<String>,
    /// Fallback MIME type
    pub content_type: Option<String>,
}

// ============================================================================
// Stored Shape
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WorkflowType {
    #[default]
    Sync,
    AsyncJob,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawWorkflow {
    #[serde(rename = "type")]
    kind: WorkflowType,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    steps: Vec<RawStep>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawStep {
    name: String,
    #[serde(skip_serializing)]
    method: Option<HttpMethod>,
    #[serde(flatten)]
    transport: TransportSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    terminal_states: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_states: Option<Vec<String>>,
    #[serde(skip_serializing)]
    success_states: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_url_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<DownloadMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn lowered(states: Option<Vec<String>>, defaults: &[&str]) -> Vec<String> {
    let states: Vec<String> = states
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if states.is_empty() {
        defaults.iter().map(|s| (*s).to_string()).collect()
    } else {
        states
    }
}

/// Explicit failure states win; a success list marks the remaining terminal
/// states as failures; otherwise the default failure words apply
fn failure_states(
    failure: Option<Vec<String>>,
    success: Option<Vec<String>>,
    terminal: &[String],
) -> Vec<String> {
    if failure.as_ref().is_some_and(|f| !f.is_empty()) {
        return lowered(failure, &DEFAULT_FAILURE_STATES);
    }
    if success.as_ref().is_some_and(|s| !s.is_empty()) {
        let success = lowered(success, &[]);
        return terminal
            .iter()
            .filter(|state| !success.contains(state))
            .cloned()
            .collect();
    }
    lowered(None, &DEFAULT_FAILURE_STATES)
}

impl TryFrom<RawWorkflow> for WorkflowSpec {
    type Error = String;

    fn try_from(raw: RawWorkflow) -> Result<Self, Self::Error> {
        if raw.kind == WorkflowType::Sync {
            return Ok(Self::Sync);
        }

        let job_id_path = non_empty(raw.job_id_path)
            .ok_or_else(|| "async_job workflow requires job_id_path".to_string())?;

        let mut poll = None;
        let mut download = None;
        for mut step in raw.steps {
            step.transport.method = step.method.unwrap_or(HttpMethod::Get);
            match step.name.trim().to_lowercase().as_str() {
                "poll" => {
                    let status_path = non_empty(step.status_path)
                        .ok_or_else(|| "poll step requires status_path".to_string())?;
                    let (min_interval, max_interval) = POLL_INTERVAL_RANGE_MS;
                    let (min_attempts, max_attempts) = POLL_ATTEMPTS_RANGE;
                    let terminal_states = lowered(step.terminal_states, &DEFAULT_TERMINAL_STATES);
                    let failure_states = failure_states(
                        step.failure_states,
                        step.success_states,
                        &terminal_states,
                    );
                    poll = Some(PollStep {
                        transport: step.transport,
                        interval_ms: step
                            .interval_ms
                            .unwrap_or(DEFAULT_INTERVAL_MS)
                            .clamp(min_interval, max_interval),
                        max_attempts: step
                            .max_attempts
                            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
                            .clamp(min_attempts, max_attempts),
                        status_path,
                        terminal_states,
                        failure_states,
                        result_url_path: non_empty(step.result_url_path),
                    });
                }
                "download" => {
                    let mode = step.mode.unwrap_or_default();
                    let url_path = non_empty(step.url_path);
                    if mode == DownloadMode::Json && url_path.is_none() {
                        return Err("json download step requires url_path".to_string());
                    }
                    download = Some(DownloadStep {
                        transport: step.transport,
                        mode,
                        url_path,
                        content_type: non_empty(step.content_type),
                    });
                }
                other => return Err(format!("unknown workflow step '{other}'")),
            }
        }

        let poll = poll.ok_or_else(|| "async_job workflow requires a poll step".to_string())?;
        Ok(Self::AsyncJob(AsyncJobSpec {
            job_id_path,
            poll,
            download,
        }))
    }
}

impl From<WorkflowSpec> for RawWorkflow {
    fn from(spec: WorkflowSpec) -> Self {
        match spec {
            WorkflowSpec::Sync => Self::default(),
            WorkflowSpec::AsyncJob(job) => {
                let mut steps = vec![RawStep {
                    name: "poll".to_string(),
                    transport: job.poll.transport,
                    interval_ms: Some(job.poll.interval_ms),
                    max_attempts: Some(job.poll.max_attempts),
                    status_path: Some(job.poll.status_path),
                    terminal_states: Some(job.poll.terminal_states),
                    failure_states: Some(job.poll.failure_states),
                    result_url_path: job.poll.result_url_path,
                    ..Default::default()
                }];
                if let Some(download) = job.download {
                    steps.push(RawStep {
                        name: "download".to_string(),
                        transport: download.transport,
                        mode: Some(download.mode),
                        url_path: download.url_path,
                        content_type: download.content_type,
                        ..Default::default()
                    });
                }
                Self {
                    kind: WorkflowType::AsyncJob,
                    job_id_path: Some(job.job_id_path),
                    steps,
                }
            }
        }
    }
}
