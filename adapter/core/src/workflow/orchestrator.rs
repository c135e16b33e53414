//! Job state machine driving sync and async workflows

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AsyncJobSpec, DownloadMode, DownloadStep, PollStep, WorkflowSpec};
use crate::error::{EngineError, EngineResult};
use crate::profile::Profile;
use crate::response::{
    map_response, media_from_bytes, media_from_urls, pick_mime, MediaKind, NormalizedContent,
};
use crate::template::{get_str, get_string_list, Vars};
use crate::transport::{CallOverrides, OutcomeMode, TransportExecutor, TransportOutcome, TransportSpec};

/// Variable holding the provider job id during poll and download
pub const JOB_ID_VAR: &str = "job_id";

/// Async job lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Submit call accepted, job id known
    Submitted,
    /// Waiting for a terminal status
    Polling {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Fetching the result
    Downloading,
    /// Content produced
    Completed,
    /// Provider reported a failure state
    Failed,
    /// Attempt budget exhausted
    TimedOut,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => f.write_str("submitted"),
            Self::Polling { attempt } => write!(f, "polling#{attempt}"),
            Self::Downloading => f.write_str("downloading"),
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
            Self::TimedOut => f.write_str("timed_out"),
        }
    }
}

/// Runs a profile's workflow over a [`TransportExecutor`]
#[derive(Clone)]
pub struct Orchestrator {
    executor: TransportExecutor,
}

impl Orchestrator {
    /// Wrap an executor
    pub fn new(executor: TransportExecutor) -> Self {
        Self { executor }
    }

    /// Underlying executor
    pub fn executor(&self) -> &TransportExecutor {
        &self.executor
    }

    /// Execute `profile` to completion
    ///
    /// # Errors
    ///
    /// Any [`EngineError`]: the failing step is named in the error.
    pub async fn run(
        &self,
        profile: &Profile,
        vars: &Vars,
        overrides: &CallOverrides,
        cancel: &CancellationToken,
    ) -> EngineResult<NormalizedContent> {
        match &profile.workflow {
            WorkflowSpec::Sync => self.run_sync(profile, vars, overrides, cancel).await,
            WorkflowSpec::AsyncJob(job) => self.run_async(profile, job, vars, overrides, cancel).await,
        }
    }

    async fn run_sync(
        &self,
        profile: &Profile,
        vars: &Vars,
        overrides: &CallOverrides,
        cancel: &CancellationToken,
    ) -> EngineResult<NormalizedContent> {
        let mode = if profile.response.mode.wants_binary() {
            OutcomeMode::Binary
        } else {
            OutcomeMode::Json
        };
        let outcome = self
            .executor
            .call("request", &profile.transport, vars, overrides, mode, cancel)
            .await?
            .require_ok("request")?;
        map_response(&outcome, &profile.response)
    }

    async fn run_async(
        &self,
        profile: &Profile,
        job: &AsyncJobSpec,
        vars: &Vars,
        overrides: &CallOverrides,
        cancel: &CancellationToken,
    ) -> EngineResult<NormalizedContent> {
        let submitted = self
            .executor
            .call("submit", &profile.transport, vars, overrides, OutcomeMode::Json, cancel)
            .await?
            .require_ok("submit")?;

        let job_id = submitted
            .json()
            .and_then(|json| get_str(json, &job.job_id_path))
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                EngineError::extraction("submit", &job.job_id_path, submitted.body_text())
            })?;
        info!(profile = %profile.id, job_id = %job_id, state = %JobState::Submitted, "Async job submitted");

        let mut step_vars = vars.clone();
        step_vars.insert(JOB_ID_VAR, job_id.as_str());
        let step_overrides = CallOverrides {
            base_url: overrides.base_url.clone(),
            headers: overrides.headers.clone(),
            timeout_ms: overrides.timeout_ms,
            ..Default::default()
        };

        let (status, last_poll) = self
            .poll(profile, &job.poll, &job_id, &step_vars, &step_overrides, cancel)
            .await?;

        if !job.poll.is_success(&status) {
            warn!(profile = %profile.id, job_id = %job_id, status = %status, state = %JobState::Failed, "Async job failed");
            return Err(EngineError::JobFailed {
                job_id,
                status,
                body: crate::error::truncate_body(&last_poll.body_text()),
            });
        }

        let content = match &job.download {
            None => job_status(profile, &job.poll, &job_id, &status, &last_poll),
            Some(download) => {
                info!(profile = %profile.id, job_id = %job_id, state = %JobState::Downloading, "Fetching job result");
                if let Some(url) = result_url(&job.poll, &last_poll) {
                    step_vars.insert("result_url", url);
                }
                self.download(profile, download, &step_vars, &step_overrides, cancel)
                    .await?
            }
        };
        info!(profile = %profile.id, job_id = %job_id, state = %JobState::Completed, "Async job completed");
        Ok(content)
    }

    /// Poll until a terminal state, returning it (lower-cased) with the last response
    async fn poll(
        &self,
        profile: &Profile,
        poll: &PollStep,
        job_id: &str,
        vars: &Vars,
        overrides: &CallOverrides,
        cancel: &CancellationToken,
    ) -> EngineResult<(String, TransportOutcome)> {
        let transport = inherit(&profile.transport, &poll.transport);
        let interval = Duration::from_millis(poll.interval_ms);
        let mut last_status = String::new();

        for attempt in 1..=poll.max_attempts {
            if attempt > 1 {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(EngineError::Cancelled),
                    () = tokio::time::sleep(interval) => {}
                }
            }

            let outcome = self
                .executor
                .call("poll", &transport, vars, overrides, OutcomeMode::Json, cancel)
                .await?
                .require_ok("poll")?;

            last_status = outcome
                .json()
                .and_then(|json| get_str(json, &poll.status_path))
                .map(|s| s.trim().to_lowercase())
                .unwrap_or_default();
            debug!(job_id, state = %JobState::Polling { attempt }, status = %last_status, "Polled job");

            if poll.is_terminal(&last_status) {
                return Ok((last_status, outcome));
            }
        }

        warn!(job_id, state = %JobState::TimedOut, attempts = poll.max_attempts, "Async job did not finish");
        Err(EngineError::UpstreamTimeout {
            step: "poll".to_string(),
            detail: format!(
                "job {job_id} not finished after {} attempts (last status '{last_status}')",
                poll.max_attempts
            ),
        })
    }

    async fn download(
        &self,
        profile: &Profile,
        download: &DownloadStep,
        vars: &Vars,
        overrides: &CallOverrides,
        cancel: &CancellationToken,
    ) -> EngineResult<NormalizedContent> {
        let transport = inherit(&profile.transport, &download.transport);
        let declared_mime = download
            .content_type
            .as_deref()
            .or(profile.response.content_type.as_deref());
        let result_type = profile.response.result_type.as_deref();

        match download.mode {
            DownloadMode::Binary => {
                let outcome = self
                    .executor
                    .call("download", &transport, vars, overrides, OutcomeMode::Binary, cancel)
                    .await?
                    .require_ok("download")?;
                let bytes = outcome.bytes().unwrap_or_default();
                if bytes.is_empty() {
                    return Err(EngineError::extraction("download", &outcome.url, "empty body"));
                }
                let mime = pick_mime(outcome.content_type.as_deref(), declared_mime);
                Ok(media_from_bytes(bytes, &mime, result_type, None))
            }
            DownloadMode::Json => {
                let outcome = self
                    .executor
                    .call("download", &transport, vars, overrides, OutcomeMode::Json, cancel)
                    .await?
                    .require_ok("download")?;
                let path = download.url_path.as_deref().unwrap_or_default();
                let urls = outcome
                    .json()
                    .map(|json| get_string_list(json, path))
                    .unwrap_or_default();
                if urls.is_empty() {
                    return Err(EngineError::extraction("download", path, outcome.body_text()));
                }
                let kind = MediaKind::classify(result_type, declared_mime);
                Ok(media_from_urls(urls, kind, declared_mime, None))
            }
        }
    }
}

/// Step transport with the submit call's headers, base URL and timeout as fallbacks
fn inherit(submit: &TransportSpec, step: &TransportSpec) -> TransportSpec {
    let mut merged = step.clone();
    for (name, value) in &submit.headers {
        if !merged.headers.keys().any(|k| k.eq_ignore_ascii_case(name)) {
            merged.headers.insert(name.clone(), value.clone());
        }
    }
    if merged.base_url.is_none() {
        merged.base_url = submit.base_url.clone();
    }
    if merged.timeout_ms.is_none() {
        merged.timeout_ms = submit.timeout_ms;
    }
    merged
}

fn result_url(poll: &PollStep, outcome: &TransportOutcome) -> Option<String> {
    let path = poll.result_url_path.as_deref()?;
    get_str(outcome.json()?, path).filter(|u| !u.trim().is_empty())
}

fn job_status(
    profile: &Profile,
    poll: &PollStep,
    job_id: &str,
    status: &str,
    outcome: &TransportOutcome,
) -> NormalizedContent {
    let result_url = result_url(poll, outcome);
    let summary = match &result_url {
        Some(url) => format!("Job {job_id} {status}: {url}"),
        None => format!("Job {job_id} {status}"),
    };
    NormalizedContent::JobStatus {
        title: format!("{} job", profile.provider),
        summary,
        job_id: job_id.to_string(),
        status: status.to_string(),
        result_url,
    }
}
