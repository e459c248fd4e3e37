use super::schema::{IdempotencyTag, JobStage, JobStatus, UnlockResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub job_token: String,
    pub status: JobStatus,
    pub stage: JobStage,
    pub progress: u8,
    pub r2_prefix: Option<String>,
    pub nosana_run_id: Option<String>,
    pub start_error: Option<String>,
    pub error: Option<String>,
    pub market_cache: Option<Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Partial merge applied to a JobRecord; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub stage: Option<JobStage>,
    pub progress: Option<u8>,
    pub r2_prefix: Option<String>,
    pub nosana_run_id: Option<String>,
    pub start_error: Option<String>,
    pub error: Option<String>,
    pub market_cache: Option<Value>,
}

impl JobUpdate {
    pub fn apply(self, record: &mut JobRecord, now: i64) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(stage) = self.stage {
            record.stage = stage;
        }
        if let Some(progress) = self.progress {
            record.progress = progress;
        }
        if let Some(r2_prefix) = self.r2_prefix {
            record.r2_prefix = Some(r2_prefix);
        }
        if let Some(run_id) = self.nosana_run_id {
            record.nosana_run_id = Some(run_id);
        }
        if let Some(start_error) = self.start_error {
            record.start_error = Some(start_error);
        }
        if let Some(error) = self.error {
            record.error = Some(error);
        }
        if let Some(cache) = self.market_cache {
            record.market_cache = Some(cache);
        }
        record.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Pending,
    Final,
}

/// Why a burned request id failed; replays repeat the original refusal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnlockFailure {
    InsufficientCredits,
    ChainSubmitFailed,
    ChainConfirmTimeout,
}

/// Authoritative outcome of an unlock attempt, keyed by unlock request id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnlockOutcomeRecord {
    pub job_id: String,
    pub clip_file: String,
    pub unlocked: bool,
    pub charged_credits: u8,
    pub idempotency: IdempotencyTag,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<UnlockFailure>,
}

impl UnlockOutcomeRecord {
    pub fn pending(job_id: &str, clip_file: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            clip_file: clip_file.to_string(),
            unlocked: false,
            charged_credits: 0,
            idempotency: IdempotencyTag::New,
            status: OutcomeStatus::Pending,
            failure: None,
        }
    }

    pub fn replay_unlocked(job_id: &str, clip_file: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            clip_file: clip_file.to_string(),
            unlocked: true,
            charged_credits: 0,
            idempotency: IdempotencyTag::Replay,
            status: OutcomeStatus::Final,
            failure: None,
        }
    }

    pub fn charged(job_id: &str, clip_file: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            clip_file: clip_file.to_string(),
            unlocked: true,
            charged_credits: 1,
            idempotency: IdempotencyTag::New,
            status: OutcomeStatus::Final,
            failure: None,
        }
    }

    /// Terminal failure record: the request id can never charge again, and
    /// replays repeat the recorded refusal.
    pub fn burned(job_id: &str, clip_file: &str, failure: UnlockFailure) -> Self {
        Self {
            job_id: job_id.to_string(),
            clip_file: clip_file.to_string(),
            unlocked: false,
            charged_credits: 0,
            idempotency: IdempotencyTag::New,
            status: OutcomeStatus::Final,
            failure: Some(failure),
        }
    }

    pub fn is_final(&self) -> bool {
        self.status == OutcomeStatus::Final
    }

    pub fn to_response(&self) -> UnlockResponse {
        UnlockResponse {
            job_id: self.job_id.clone(),
            clip_file: self.clip_file.clone(),
            unlocked: self.unlocked,
            charged_credits: self.charged_credits,
            idempotency: self.idempotency,
        }
    }
}

/// Crash-recovery marker written between chain submit and local commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockPendingRecord {
    pub job_id: String,
    pub clip_file: String,
    pub wallet: String,
    pub tx_sig: String,
}
