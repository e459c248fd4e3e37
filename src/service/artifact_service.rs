use crate::app::AppState;
use crate::module::error::AppError;
use crate::module::job::crud;
use crate::module::job::model::JobRecord;
use crate::module::job::schema::JobStatus;
use crate::service::r2_service::{self, Manifest, ManifestClip, R2Error};
use crate::service::validation_service;
use axum::http::HeaderMap;
use object_store::aws::AmazonS3;
use std::sync::Arc;

pub async fn resolve_job(state: &AppState, job_id: &str) -> Result<JobRecord, AppError> {
    validation_service::validate_job_id(job_id)?;
    crud::get_job(state, job_id)
        .await?
        .ok_or_else(|| AppError::not_found("JOB_NOT_FOUND", "job not found"))
}

pub fn require_job_token(record: &JobRecord, headers: &HeaderMap) -> Result<(), AppError> {
    let presented = headers
        .get("x-job-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented.is_empty() || presented != record.job_token {
        return Err(AppError::unauthorized(
            "INVALID_JOB_TOKEN",
            "missing or invalid job token",
        ));
    }
    Ok(())
}

pub fn object_store(state: &AppState) -> Result<Arc<AmazonS3>, AppError> {
    state.infra.r2.clone().ok_or_else(|| {
        AppError::bad_gateway("OBJECT_STORE_UNAVAILABLE", "object store is not configured")
    })
}

/// Succeeded + r2 prefix + manifest, the precondition of every per-clip read.
pub async fn load_job_manifest(
    state: &AppState,
    record: &JobRecord,
) -> Result<(String, Manifest), AppError> {
    if record.status != JobStatus::Succeeded {
        return Err(AppError::conflict("JOB_NOT_COMPLETED", "job not completed"));
    }
    let prefix = record
        .r2_prefix
        .clone()
        .ok_or_else(|| AppError::internal("MISSING_R2_PREFIX", "missing r2 prefix"))?;
    let store = object_store(state)?;
    let manifest = r2_service::load_manifest(&store, &prefix)
        .await
        .map_err(|e| match e {
            R2Error::NotFound(key) => {
                AppError::internal("MANIFEST_MISSING", format!("manifest not found: {key}"))
            }
            R2Error::Decode(msg) => AppError::internal("MANIFEST_DECODE_FAILED", msg),
            R2Error::Upstream(msg) => AppError::bad_gateway("OBJECT_STORE_FAILED", msg),
        })?;
    Ok((prefix, manifest))
}

pub fn require_manifest_clip<'a>(
    manifest: &'a Manifest,
    clip_file: &str,
) -> Result<&'a ManifestClip, AppError> {
    validation_service::validate_clip_file(clip_file)?;
    manifest
        .clip(clip_file)
        .ok_or_else(|| AppError::not_found("CLIP_NOT_FOUND", "clip not found in manifest"))
}

pub async fn sign_clip_url(
    state: &AppState,
    prefix: &str,
    clip_file: &str,
    ttl_seconds: u64,
) -> Result<String, AppError> {
    let store = object_store(state)?;
    let key = r2_service::clip_key(prefix, clip_file);
    r2_service::presign_get_url(&store, &key, ttl_seconds)
        .await
        .map_err(|e| match e {
            R2Error::NotFound(key) => {
                AppError::not_found("CLIP_NOT_FOUND", format!("clip not found: {key}"))
            }
            R2Error::Decode(msg) => AppError::internal("SIGNING_FAILED", msg),
            R2Error::Upstream(msg) => AppError::bad_gateway("OBJECT_STORE_FAILED", msg),
        })
}
