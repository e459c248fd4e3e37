use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{Attribute, GetOptions, GetRange, ObjectStore};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const PREVIEW_URL_TTL_SECONDS: u64 = 600;
pub const DOWNLOAD_URL_TTL_SECONDS: u64 = 86_400;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub clips: Vec<ManifestClip>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestClip {
    pub file: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub duration: u64,
}

impl Manifest {
    pub fn contains(&self, clip_file: &str) -> bool {
        self.clips.iter().any(|c| c.file == clip_file)
    }

    pub fn clip(&self, clip_file: &str) -> Option<&ManifestClip> {
        self.clips.iter().find(|c| c.file == clip_file)
    }
}

#[derive(Debug)]
pub enum R2Error {
    NotFound(String),
    Upstream(String),
    Decode(String),
}

pub struct RangeSlice {
    pub body: Vec<u8>,
    pub start: u64,
    pub end_inclusive: u64,
    pub total_size: u64,
    pub partial: bool,
    pub content_type: Option<String>,
}

pub fn build_store(
    endpoint: &str,
    bucket: &str,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<AmazonS3, String> {
    AmazonS3Builder::new()
        .with_endpoint(endpoint)
        .with_bucket_name(bucket)
        .with_access_key_id(access_key_id)
        .with_secret_access_key(secret_access_key)
        .with_region("auto")
        .with_allow_http(true)
        .build()
        .map_err(|e| format!("r2 client init failed: {e}"))
}

pub fn manifest_key(prefix: &str) -> ObjectPath {
    ObjectPath::from(format!("{}/manifest.json", prefix.trim_end_matches('/')))
}

pub fn clip_key(prefix: &str, clip_file: &str) -> ObjectPath {
    ObjectPath::from(format!(
        "{}/clips/{clip_file}",
        prefix.trim_end_matches('/')
    ))
}

pub async fn load_manifest(store: &AmazonS3, prefix: &str) -> Result<Manifest, R2Error> {
    let key = manifest_key(prefix);
    let result = store.get(&key).await.map_err(|e| match e {
        object_store::Error::NotFound { .. } => R2Error::NotFound(key.to_string()),
        other => R2Error::Upstream(other.to_string()),
    })?;
    let bytes = result
        .bytes()
        .await
        .map_err(|e| R2Error::Upstream(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| R2Error::Decode(format!("manifest {key}: {e}")))
}

pub async fn presign_get_url(
    store: &AmazonS3,
    key: &ObjectPath,
    ttl_seconds: u64,
) -> Result<String, R2Error> {
    store
        .signed_url(Method::GET, key, Duration::from_secs(ttl_seconds))
        .await
        .map(|url| url.to_string())
        .map_err(|e| R2Error::Upstream(e.to_string()))
}

/// Fetches the object (or the requested slice of it) for the range
/// passthrough endpoint.
pub async fn fetch_range(
    store: &AmazonS3,
    key: &ObjectPath,
    range_header: Option<&str>,
) -> Result<RangeSlice, R2Error> {
    let range = match range_header {
        Some(raw) => Some(parse_range_header(raw).ok_or_else(|| {
            R2Error::Decode(format!("unsupported range header: {raw}"))
        })?),
        None => None,
    };
    let partial = range.is_some();
    let options = GetOptions {
        range,
        ..Default::default()
    };
    let result = store.get_opts(key, options).await.map_err(|e| match e {
        object_store::Error::NotFound { .. } => R2Error::NotFound(key.to_string()),
        other => R2Error::Upstream(other.to_string()),
    })?;
    let total_size = result.meta.size as u64;
    let start = result.range.start as u64;
    let end_inclusive = (result.range.end as u64).saturating_sub(1);
    let content_type = result
        .attributes
        .get(&Attribute::ContentType)
        .map(|value| value.to_string());
    let bytes = result
        .bytes()
        .await
        .map_err(|e| R2Error::Upstream(e.to_string()))?;
    Ok(RangeSlice {
        body: bytes.to_vec(),
        start,
        end_inclusive,
        total_size,
        partial,
        content_type,
    })
}

/// Parses `bytes=a-b`, `bytes=a-` and `bytes=-n`. Multi-range requests are
/// not supported.
pub fn parse_range_header(raw: &str) -> Option<GetRange> {
    let spec = raw.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    match (start.trim(), end.trim()) {
        ("", suffix) => suffix.parse::<usize>().ok().map(GetRange::Suffix),
        (offset, "") => offset.parse::<usize>().ok().map(GetRange::Offset),
        (a, b) => {
            let a = a.parse::<usize>().ok()?;
            let b = b.parse::<usize>().ok()?;
            if b < a {
                return None;
            }
            Some(GetRange::Bounded(a..b + 1))
        }
    }
}
