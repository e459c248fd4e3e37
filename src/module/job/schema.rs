use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Position in the Queued < Running < terminal partial order.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStage {
    Download,
    Transcript,
    Chunk,
    Select,
    Render,
    Upload,
    Done,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "DOWNLOAD",
            Self::Transcript => "TRANSCRIPT",
            Self::Chunk => "CHUNK",
            Self::Select => "SELECT",
            Self::Render => "RENDER",
            Self::Upload => "UPLOAD",
            Self::Done => "DONE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DOWNLOAD" => Some(Self::Download),
            "TRANSCRIPT" => Some(Self::Transcript),
            "CHUNK" => Some(Self::Chunk),
            "SELECT" => Some(Self::Select),
            "RENDER" => Some(Self::Render),
            "UPLOAD" => Some(Self::Upload),
            "DONE" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Download => 0,
            Self::Transcript => 1,
            Self::Chunk => 2,
            Self::Select => 3,
            Self::Render => 4,
            Self::Upload => 5,
            Self::Done => 6,
        }
    }
}

fn default_language() -> String {
    "auto".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub video_url: String,
    pub clip_duration_seconds: u32,
    pub clip_count: u32,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub job_token: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub stage: JobStage,
    pub progress: u8,
    pub start_error: Option<String>,
    pub error: Option<String>,
    pub nosana_run_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipView {
    pub clip_file: String,
    pub title: String,
    pub duration: u64,
    pub locked: bool,
    pub unlock_endpoint: String,
    pub download_endpoint: String,
    pub preview_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultsResponse {
    pub clips: Vec<ClipView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedUrlResponse {
    pub url: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub unlock_request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnlockResponse {
    pub job_id: String,
    pub clip_file: String,
    pub unlocked: bool,
    pub charged_credits: u8,
    pub idempotency: IdempotencyTag,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyTag {
    New,
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackRequest {
    pub job_id: String,
    pub status: String,
    pub stage: Option<String>,
    pub progress: Option<i64>,
    pub r2_prefix: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
}
