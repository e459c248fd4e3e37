use super::crud;
use super::model::{JobRecord, JobUpdate};
use super::schema::{
    CallbackRequest, CallbackResponse, ClipView, CreateJobRequest, CreateJobResponse,
    HealthResponse, JobResultsResponse, JobStage, JobStatus, JobStatusResponse, SignedUrlResponse,
    UnlockRequest, UnlockResponse,
};
use crate::app::AppState;
use crate::module::auth::crud as auth_crud;
use crate::module::error::AppError;
use crate::service::r2_service::{self, RangeSlice, PREVIEW_URL_TTL_SECONDS};
use crate::service::{artifact_service, nosana_service, unlock_service, validation_service};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use tracing::{info, warn};

pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<Json<CreateJobResponse>, AppError> {
    validation_service::validate_create_job(&req)?;

    let now = Utc::now().timestamp();
    let job_id = crate::service::job_id_service::generate_job_id();
    let job_token = crate::service::token_service::generate_secret_hex();
    let record = JobRecord {
        job_id: job_id.clone(),
        job_token: job_token.clone(),
        status: JobStatus::Queued,
        stage: JobStage::Download,
        progress: 0,
        r2_prefix: None,
        nosana_run_id: None,
        start_error: None,
        error: None,
        market_cache: None,
        created_at: now,
        updated_at: now,
    };
    crud::put_job(&state, &record).await?;

    // Advisory only; a failed probe never gates submission.
    if let Ok(cache) = nosana_service::check_market_cache(&state.infra.http, &state.config).await {
        let _ = crud::update_job(
            &state,
            &job_id,
            JobUpdate {
                market_cache: Some(cache),
                ..Default::default()
            },
        )
        .await;
    }

    let worker_env = nosana_service::build_worker_env(
        &state.config,
        &job_id,
        &req.video_url,
        req.clip_count,
        req.clip_duration_seconds,
        &req.language,
    );
    let run_id =
        match nosana_service::submit_deployment(&state.infra.http, &state.config, &job_id, &worker_env)
            .await
        {
            Ok(run_id) => run_id,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "job dispatch failed");
                let _ = crud::update_job(
                    &state,
                    &job_id,
                    JobUpdate {
                        status: Some(JobStatus::Failed),
                        error: Some(e.clone()),
                        ..Default::default()
                    },
                )
                .await;
                return Err(AppError::bad_gateway("DISPATCH_FAILED", e));
            }
        };
    crud::update_job(
        &state,
        &job_id,
        JobUpdate {
            nosana_run_id: Some(run_id.clone()),
            ..Default::default()
        },
    )
    .await?;

    // Start is fire-and-forget; failures surface on the job, not here.
    let start_state = state.clone();
    let start_job_id = job_id.clone();
    tokio::spawn(async move {
        if let Err(e) = nosana_service::start_deployment_when_ready(
            &start_state.infra.http,
            &start_state.config,
            &run_id,
        )
        .await
        {
            warn!(job_id = %start_job_id, error = %e, "deployment start failed");
            let _ = crud::update_job(
                &start_state,
                &start_job_id,
                JobUpdate {
                    start_error: Some(e),
                    ..Default::default()
                },
            )
            .await;
        }
    });

    info!(job_id = %job_id, "job accepted and dispatched");
    Ok(Json(CreateJobResponse {
        job_id,
        job_token,
        status: JobStatus::Queued,
    }))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let record = artifact_service::resolve_job(&state, &job_id).await?;
    Ok(Json(JobStatusResponse {
        job_id: record.job_id,
        status: record.status,
        stage: record.stage,
        progress: record.progress,
        start_error: record.start_error,
        error: record.error,
        nosana_run_id: record.nosana_run_id,
    }))
}

pub async fn get_results(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<Json<JobResultsResponse>, AppError> {
    let record = artifact_service::resolve_job(&state, &job_id).await?;
    artifact_service::require_job_token(&record, &headers)?;
    let (_, manifest) = artifact_service::load_job_manifest(&state, &record).await?;

    let mut clips = Vec::with_capacity(manifest.clips.len());
    for clip in &manifest.clips {
        let locked = !crud::is_clip_unlocked(&state, &record.job_id, &clip.file).await?;
        let base = format!("/api/jobs/{}/clips/{}", record.job_id, clip.file);
        clips.push(ClipView {
            clip_file: clip.file.clone(),
            title: clip.title.clone(),
            duration: clip.duration,
            locked,
            unlock_endpoint: format!("{base}/unlock"),
            download_endpoint: format!("{base}/download"),
            preview_endpoint: format!("{base}/preview"),
        });
    }
    Ok(Json(JobResultsResponse { clips }))
}

pub async fn preview_clip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((job_id, clip_file)): Path<(String, String)>,
) -> Result<Json<SignedUrlResponse>, AppError> {
    let record = artifact_service::resolve_job(&state, &job_id).await?;
    artifact_service::require_job_token(&record, &headers)?;
    let (prefix, manifest) = artifact_service::load_job_manifest(&state, &record).await?;
    artifact_service::require_manifest_clip(&manifest, &clip_file)?;
    let url =
        artifact_service::sign_clip_url(&state, &prefix, &clip_file, PREVIEW_URL_TTL_SECONDS)
            .await?;
    Ok(Json(SignedUrlResponse {
        url,
        expires_in: PREVIEW_URL_TTL_SECONDS,
    }))
}

pub async fn download_clip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((job_id, clip_file)): Path<(String, String)>,
) -> Result<Json<SignedUrlResponse>, AppError> {
    let record = artifact_service::resolve_job(&state, &job_id).await?;
    artifact_service::require_job_token(&record, &headers)?;
    // A clip can only ever be unlocked through the manifest-gated unlock
    // path, so the lock check may run before the manifest round trip.
    if !crud::is_clip_unlocked(&state, &record.job_id, &clip_file).await? {
        return Err(AppError::forbidden("CLIP_LOCKED", "locked"));
    }
    let (prefix, manifest) = artifact_service::load_job_manifest(&state, &record).await?;
    artifact_service::require_manifest_clip(&manifest, &clip_file)?;
    let url = artifact_service::sign_clip_url(
        &state,
        &prefix,
        &clip_file,
        r2_service::DOWNLOAD_URL_TTL_SECONDS,
    )
    .await?;
    Ok(Json(SignedUrlResponse {
        url,
        expires_in: r2_service::DOWNLOAD_URL_TTL_SECONDS,
    }))
}

pub async fn stream_clip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((job_id, clip_file)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let record = artifact_service::resolve_job(&state, &job_id).await?;
    artifact_service::require_job_token(&record, &headers)?;
    let (prefix, manifest) = artifact_service::load_job_manifest(&state, &record).await?;
    artifact_service::require_manifest_clip(&manifest, &clip_file)?;

    let store = artifact_service::object_store(&state)?;
    let key = r2_service::clip_key(&prefix, &clip_file);
    let range_header = headers.get("range").and_then(|v| v.to_str().ok());
    let slice = r2_service::fetch_range(&store, &key, range_header)
        .await
        .map_err(|e| match e {
            r2_service::R2Error::NotFound(key) => {
                AppError::not_found("CLIP_NOT_FOUND", format!("clip not found: {key}"))
            }
            r2_service::R2Error::Decode(msg) => AppError::bad_request("INVALID_RANGE", msg),
            r2_service::R2Error::Upstream(msg) => {
                AppError::bad_gateway("OBJECT_STORE_FAILED", msg)
            }
        })?;
    build_stream_response(slice)
}

fn build_stream_response(slice: RangeSlice) -> Result<Response, AppError> {
    let status = if slice.partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let content_type = slice
        .content_type
        .as_deref()
        .unwrap_or("video/mp4")
        .to_string();
    let mut builder = Response::builder()
        .status(status)
        .header("content-type", content_type)
        .header("accept-ranges", "bytes")
        .header("cache-control", "private, max-age=3600")
        .header("content-length", slice.body.len());
    if slice.partial {
        builder = builder.header(
            "content-range",
            format!(
                "bytes {}-{}/{}",
                slice.start, slice.end_inclusive, slice.total_size
            ),
        );
    }
    builder
        .body(Body::from(slice.body))
        .map_err(|e| AppError::internal("RESPONSE_BUILD_FAILED", e.to_string()))
}

pub async fn unlock_clip(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((job_id, clip_file)): Path<(String, String)>,
    Json(req): Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, AppError> {
    let record = artifact_service::resolve_job(&state, &job_id).await?;
    artifact_service::require_job_token(&record, &headers)?;
    let wallet = auth_crud::resolve_wallet(&state, &headers).await?;
    validation_service::validate_unlock_request_id(&req.unlock_request_id)?;
    let (_, manifest) = artifact_service::load_job_manifest(&state, &record).await?;
    artifact_service::require_manifest_clip(&manifest, &clip_file)?;

    let response =
        unlock_service::execute(&state, &record, &wallet, &clip_file, &req.unlock_request_id)
            .await?;
    Ok(Json(response))
}

pub async fn nosana_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<CallbackResponse>, AppError> {
    let presented = headers
        .get("x-callback-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented.is_empty() || presented != state.config.callback_token {
        return Err(AppError::unauthorized(
            "INVALID_CALLBACK_TOKEN",
            "missing or invalid callback token",
        ));
    }
    validation_service::validate_job_id(&req.job_id)?;
    let record = crud::get_job(&state, &req.job_id)
        .await?
        .ok_or_else(|| AppError::not_found("JOB_NOT_FOUND", "job not found"))?;

    let status = JobStatus::parse(&req.status)
        .ok_or_else(|| AppError::bad_request("INVALID_STATUS", "unknown job status"))?;
    if status.rank() < record.status.rank()
        || (record.status.is_terminal() && status != record.status)
    {
        return Err(AppError::bad_request(
            "INVALID_STATE_TRANSITION",
            format!(
                "cannot transition from {} to {}",
                record.status.as_str(),
                status.as_str()
            ),
        ));
    }

    let stage = match &req.stage {
        Some(raw) => Some(
            JobStage::parse(raw)
                .ok_or_else(|| AppError::bad_request("INVALID_STAGE", "unknown job stage"))?,
        ),
        None if status.is_terminal() => Some(JobStage::Done),
        None => None,
    };
    // Stage reports are monotonic; a stale stage is dropped, not an error.
    let stage = stage.filter(|s| s.rank() >= record.stage.rank());

    let progress = match req.progress {
        Some(p) => Some(p.clamp(0, 100) as u8),
        None if status.is_terminal() => Some(100),
        None => None,
    };

    let updated = crud::update_job(
        &state,
        &req.job_id,
        JobUpdate {
            status: Some(status),
            stage,
            progress,
            r2_prefix: req.r2_prefix.clone(),
            error: req.error.clone(),
            ..Default::default()
        },
    )
    .await?;
    info!(
        job_id = %updated.job_id,
        status = updated.status.as_str(),
        stage = updated.stage.as_str(),
        progress = updated.progress,
        "worker callback applied"
    );
    Ok(Json(CallbackResponse { ok: true }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        store: crud::store_mode(&state).to_string(),
    })
}
