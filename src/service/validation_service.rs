use crate::module::error::AppError;
use crate::module::job::schema::CreateJobRequest;
use crate::service::job_id_service;

const MIN_CLIP_SECONDS: u32 = 30;
const MAX_CLIP_SECONDS: u32 = 60;
const MIN_CLIP_COUNT: u32 = 1;
const MAX_CLIP_COUNT: u32 = 5;
const MAX_UNLOCK_REQUEST_ID_LEN: usize = 128;

const LANGUAGES: [&str; 3] = ["en", "id", "auto"];

pub fn validate_create_job(req: &CreateJobRequest) -> Result<(), AppError> {
    let url = url::Url::parse(req.video_url.trim())
        .map_err(|_| AppError::bad_request("INVALID_VIDEO_URL", "video_url must be a valid URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::bad_request(
            "INVALID_VIDEO_URL",
            "video_url must use http or https",
        ));
    }
    if !(MIN_CLIP_SECONDS..=MAX_CLIP_SECONDS).contains(&req.clip_duration_seconds) {
        return Err(AppError::bad_request(
            "INVALID_CLIP_DURATION",
            format!("clip_duration_seconds must be {MIN_CLIP_SECONDS}..{MAX_CLIP_SECONDS}"),
        ));
    }
    if !(MIN_CLIP_COUNT..=MAX_CLIP_COUNT).contains(&req.clip_count) {
        return Err(AppError::bad_request(
            "INVALID_CLIP_COUNT",
            format!("clip_count must be {MIN_CLIP_COUNT}..{MAX_CLIP_COUNT}"),
        ));
    }
    if !LANGUAGES.contains(&req.language.as_str()) {
        return Err(AppError::bad_request(
            "INVALID_LANGUAGE",
            "language must be one of en, id, auto",
        ));
    }
    Ok(())
}

pub fn validate_job_id(job_id: &str) -> Result<(), AppError> {
    if job_id_service::is_valid_job_id(job_id) {
        Ok(())
    } else {
        Err(AppError::bad_request("INVALID_JOB_ID", "invalid job id"))
    }
}

pub fn validate_unlock_request_id(unlock_request_id: &str) -> Result<(), AppError> {
    if unlock_request_id.is_empty() {
        return Err(AppError::bad_request(
            "INVALID_UNLOCK_REQUEST_ID",
            "unlock_request_id is required",
        ));
    }
    if unlock_request_id.len() > MAX_UNLOCK_REQUEST_ID_LEN {
        return Err(AppError::bad_request(
            "INVALID_UNLOCK_REQUEST_ID",
            format!("unlock_request_id must be at most {MAX_UNLOCK_REQUEST_ID_LEN} chars"),
        ));
    }
    Ok(())
}

/// Clip filenames come from client paths; anything that could traverse the
/// prefix is rejected before the manifest is even consulted.
pub fn validate_clip_file(clip_file: &str) -> Result<(), AppError> {
    if clip_file.is_empty()
        || clip_file.contains('/')
        || clip_file.contains('\\')
        || clip_file.contains("..")
    {
        return Err(AppError::bad_request(
            "INVALID_CLIP_FILE",
            "invalid clip file name",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CreateJobRequest {
        CreateJobRequest {
            video_url: "https://example.test/v".to_string(),
            clip_duration_seconds: 45,
            clip_count: 2,
            language: "auto".to_string(),
        }
    }

    #[test]
    fn accepts_a_valid_request() {
        assert!(validate_create_job(&valid_request()).is_ok());
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let mut req = valid_request();
        req.clip_duration_seconds = 29;
        assert!(validate_create_job(&req).is_err());

        let mut req = valid_request();
        req.clip_count = 6;
        assert!(validate_create_job(&req).is_err());

        let mut req = valid_request();
        req.language = "fr".to_string();
        assert!(validate_create_job(&req).is_err());

        let mut req = valid_request();
        req.video_url = "ftp://example.test/v".to_string();
        assert!(validate_create_job(&req).is_err());

        let mut req = valid_request();
        req.video_url = "not a url".to_string();
        assert!(validate_create_job(&req).is_err());
    }

    #[test]
    fn unlock_request_id_bounds() {
        assert!(validate_unlock_request_id("r1").is_ok());
        assert!(validate_unlock_request_id("").is_err());
        assert!(validate_unlock_request_id(&"x".repeat(129)).is_err());
        assert!(validate_unlock_request_id(&"x".repeat(128)).is_ok());
    }

    #[test]
    fn clip_file_traversal_is_rejected() {
        assert!(validate_clip_file("clip_01.mp4").is_ok());
        assert!(validate_clip_file("../manifest.json").is_err());
        assert!(validate_clip_file("a/b.mp4").is_err());
        assert!(validate_clip_file("").is_err());
    }
}
