//! Job record and the value types that flow through its transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open key-value bag for executor-specific metadata.
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// Label written to `current_step_label` on completion.
pub const COMPLETED_STEP_LABEL: &str = "Completed";

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states are absorbing.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a completed conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// Where the converted file was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Size of the output in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,
    /// Page count derived from the output, when meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    /// Wall time between creation and completion. Set by the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    /// Anything else the executor wants to attach.
    #[serde(flatten)]
    pub details: Extra,
}

impl JobResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_output_size(mut self, bytes: u64) -> Self {
        self.output_size = Some(bytes);
        self
    }

    pub fn with_page_count(mut self, pages: u32) -> Self {
        self.page_count = Some(pages);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// A progress report from an executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Raw percentage; clamped into `0..=100` when applied.
    pub progress_percent: i64,
    pub step_label: String,
    /// Explicit step position. Derived from `step_label` when absent.
    pub step_index: Option<usize>,
    /// Shallow-merged into the job's `extra`.
    pub extra: Option<Extra>,
}

impl ProgressUpdate {
    pub fn new(progress_percent: i64, step_label: impl Into<String>) -> Self {
        Self {
            progress_percent,
            step_label: step_label.into(),
            step_index: None,
            extra: None,
        }
    }

    pub fn with_step_index(mut self, index: usize) -> Self {
        self.step_index = Some(index);
        self
    }

    pub fn with_extra(mut self, extra: Extra) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Clamps an arbitrary percentage into `0..=100`.
pub fn clamp_percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

/// One tracked conversion.
///
/// Values handed out by the engine are snapshots; changing one has no effect
/// on the stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub owner_id: String,
    /// Source file name.
    pub label: String,
    /// Conversion kind used to look up the step catalog.
    pub kind: String,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub current_step_label: String,
    pub current_step_index: usize,
    pub total_steps: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub extra: Extra,
}

impl Job {
    /// Builds a queued job positioned on the first step of `steps`.
    pub(crate) fn new(
        id: String,
        owner_id: &str,
        label: &str,
        kind: &str,
        steps: &[String],
        extra: Extra,
        now: DateTime<Utc>,
    ) -> Self {
        let first = steps
            .first()
            .cloned()
            .unwrap_or_else(|| crate::catalog::DEFAULT_STEPS[0].to_string());

        Self {
            id,
            owner_id: owner_id.to_string(),
            label: label.to_string(),
            kind: kind.to_string(),
            status: JobStatus::Queued,
            progress_percent: 0,
            current_step_label: first,
            current_step_index: 0,
            total_steps: steps.len().max(1),
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
            result: None,
            extra,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Milliseconds since creation, or until completion for terminal jobs.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        let end = self.completed_at.unwrap_or(now);
        (end - self.created_at).num_milliseconds().max(0) as u64
    }

    /// Applies a progress report. `resolved_index` is the catalog position of
    /// the reported label, if any.
    pub(crate) fn apply_progress(
        &mut self,
        update: ProgressUpdate,
        resolved_index: Option<usize>,
        now: DateTime<Utc>,
    ) {
        let requested = clamp_percent(update.progress_percent);
        if requested < self.progress_percent {
            log::debug!(
                "Job {} reported {}% below stored {}%, keeping stored value",
                self.id,
                requested,
                self.progress_percent
            );
        }
        self.progress_percent = self.progress_percent.max(requested);
        self.status = JobStatus::Processing;

        let last = self.total_steps.saturating_sub(1);
        if let Some(index) = update.step_index.or(resolved_index) {
            self.current_step_index = index.min(last);
        }
        self.current_step_label = update.step_label;

        if let Some(extra) = update.extra {
            for (key, value) in extra {
                self.extra.insert(key, value);
            }
        }
        self.updated_at = now;
    }

    pub(crate) fn mark_completed(&mut self, result: Option<JobResult>, now: DateTime<Utc>) {
        let mut result = result.unwrap_or_default();
        result.processing_time_ms =
            Some((now - self.created_at).num_milliseconds().max(0) as u64);

        self.status = JobStatus::Completed;
        self.progress_percent = 100;
        self.current_step_label = COMPLETED_STEP_LABEL.to_string();
        self.current_step_index = self.total_steps.saturating_sub(1);
        self.completed_at = Some(now);
        self.updated_at = now;
        self.result = Some(result);
    }

    pub(crate) fn mark_failed(&mut self, error_message: &str, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error_message.to_string());
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub(crate) fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}
