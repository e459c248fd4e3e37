use super::model::{JobRecord, JobUpdate, UnlockOutcomeRecord, UnlockPendingRecord};
use crate::app::AppState;
use crate::module::auth::model::AuthNonceRecord;
use crate::module::error::AppError;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

const JOB_KEY: &str = "kangklip:job:";
const UNLOCK_KEY: &str = "kangklip:unlock:";
const SPEND_KEY: &str = "kangklip:spend:";
const IDEM_KEY: &str = "kangklip:idem:";
const PENDING_KEY: &str = "kangklip:pending:";
const NONCE_KEY: &str = "kangklip:nonce:";
const TOKEN_KEY: &str = "kangklip:token:";
const TOPUP_KEY: &str = "kangklip:topup:";

pub const IDEMPOTENCY_TTL_SECONDS: u64 = 300;
pub const PENDING_TTL_SECONDS: u64 = 86_400;
pub const NONCE_TTL_SECONDS: u64 = 300;
pub const TOKEN_TTL_SECONDS: u64 = 86_400;
pub const SPEND_TTL_SECONDS: u64 = 300;

/// Atomic unlock bookkeeping. One round trip decides replay vs charge and
/// serializes per-wallet spend against per-clip delivery.
const TRY_CONSUME_SCRIPT: &str = r#"
local existing = redis.call('GET', KEYS[1])
if existing then
  local decoded = cjson.decode(existing)
  if decoded.status == 'final' then
    return {'replay', existing}
  end
end
if redis.call('GET', KEYS[2]) then
  redis.call('SET', KEYS[1], ARGV[3], 'EX', tonumber(ARGV[2]))
  return {'replay', ARGV[3]}
end
local spend = tonumber(redis.call('GET', KEYS[3]) or '0')
if spend + 1 > tonumber(ARGV[1]) then
  return {'insufficient', ''}
end
redis.call('INCR', KEYS[3])
redis.call('EXPIRE', KEYS[3], tonumber(ARGV[5]))
redis.call('SET', KEYS[2], '1')
redis.call('SET', KEYS[1], ARGV[4], 'EX', tonumber(ARGV[2]))
return {'new', ARGV[4]}
"#;

#[derive(Debug)]
pub enum CreditConsume {
    Outcome(UnlockOutcomeRecord),
    Insufficient,
}

/// In-process fallback store. When redis is configured it is authoritative
/// and this struct goes unused; without it the same semantics hold under one
/// mutex, which is enough for a single-node dev or test run.
#[derive(Debug, Default)]
pub struct JobStore {
    inner: Mutex<JobStoreInner>,
}

#[derive(Debug, Default)]
struct JobStoreInner {
    jobs: HashMap<String, JobRecord>,
    clip_unlocks: HashMap<String, bool>,
    wallet_spend: HashMap<String, (u64, i64)>,
    unlock_outcomes: HashMap<String, (UnlockOutcomeRecord, i64)>,
    unlock_pending: HashMap<String, (UnlockPendingRecord, i64)>,
    auth_nonces: HashMap<String, (AuthNonceRecord, i64)>,
    auth_tokens: HashMap<String, (String, i64)>,
    topup_signatures: HashMap<String, i64>,
}

pub fn store_mode(state: &AppState) -> &'static str {
    if state.infra.redis.is_some() {
        "redis"
    } else {
        "memory"
    }
}

pub async fn get_job(state: &AppState, job_id: &str) -> Result<Option<JobRecord>, AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let raw: Option<String> = conn
            .get(format!("{JOB_KEY}{job_id}"))
            .await
            .map_err(store_err)?;
        return raw
            .map(|s| serde_json::from_str::<JobRecord>(&s))
            .transpose()
            .map_err(decode_err);
    }
    let inner = lock_store(state)?;
    Ok(inner.jobs.get(job_id).cloned())
}

pub async fn put_job(state: &AppState, job: &JobRecord) -> Result<(), AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let payload = serde_json::to_string(job).map_err(encode_err)?;
        let _: () = conn
            .set(format!("{JOB_KEY}{}", job.job_id), payload)
            .await
            .map_err(store_err)?;
        return Ok(());
    }
    let mut inner = lock_store(state)?;
    inner.jobs.insert(job.job_id.clone(), job.clone());
    Ok(())
}

/// Read-modify-write merge; last writer wins, per the callback contract.
pub async fn update_job(
    state: &AppState,
    job_id: &str,
    update: JobUpdate,
) -> Result<JobRecord, AppError> {
    let now = Utc::now().timestamp();
    if let Some(mut conn) = redis_conn(state).await? {
        let key = format!("{JOB_KEY}{job_id}");
        let raw: Option<String> = conn.get(&key).await.map_err(store_err)?;
        let mut record: JobRecord = raw
            .ok_or_else(|| AppError::not_found("JOB_NOT_FOUND", "job not found"))
            .and_then(|s| serde_json::from_str(&s).map_err(decode_err))?;
        update.apply(&mut record, now);
        let payload = serde_json::to_string(&record).map_err(encode_err)?;
        let _: () = conn.set(&key, payload).await.map_err(store_err)?;
        return Ok(record);
    }
    let mut inner = lock_store(state)?;
    let record = inner
        .jobs
        .get_mut(job_id)
        .ok_or_else(|| AppError::not_found("JOB_NOT_FOUND", "job not found"))?;
    update.apply(record, now);
    Ok(record.clone())
}

pub async fn is_clip_unlocked(
    state: &AppState,
    job_id: &str,
    clip_file: &str,
) -> Result<bool, AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let raw: Option<String> = conn
            .get(unlock_key(job_id, clip_file))
            .await
            .map_err(store_err)?;
        return Ok(raw.is_some());
    }
    let inner = lock_store(state)?;
    Ok(inner
        .clip_unlocks
        .contains_key(&unlock_key(job_id, clip_file)))
}

/// Set-once; unlock flags are monotonic and never cleared.
pub async fn set_clip_unlocked(
    state: &AppState,
    job_id: &str,
    clip_file: &str,
) -> Result<(), AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let _: () = conn
            .set(unlock_key(job_id, clip_file), "1")
            .await
            .map_err(store_err)?;
        return Ok(());
    }
    let mut inner = lock_store(state)?;
    inner.clip_unlocks.insert(unlock_key(job_id, clip_file), true);
    Ok(())
}

pub async fn wallet_spend(state: &AppState, wallet: &str) -> Result<u64, AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let raw: Option<u64> = conn
            .get(format!("{SPEND_KEY}{wallet}"))
            .await
            .map_err(store_err)?;
        return Ok(raw.unwrap_or(0));
    }
    let now = Utc::now().timestamp();
    let inner = lock_store(state)?;
    Ok(match inner.wallet_spend.get(wallet) {
        Some((count, expires_at)) if *expires_at > now => *count,
        _ => 0,
    })
}

pub async fn incr_wallet_spend(state: &AppState, wallet: &str) -> Result<u64, AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let key = format!("{SPEND_KEY}{wallet}");
        let count: u64 = conn.incr(&key, 1u64).await.map_err(store_err)?;
        let _: () = conn
            .expire(&key, SPEND_TTL_SECONDS as i64)
            .await
            .map_err(store_err)?;
        return Ok(count);
    }
    let now = Utc::now().timestamp();
    let mut inner = lock_store(state)?;
    let entry = inner
        .wallet_spend
        .entry(wallet.to_string())
        .or_insert((0, 0));
    if entry.1 <= now {
        entry.0 = 0;
    }
    entry.0 += 1;
    entry.1 = now + SPEND_TTL_SECONDS as i64;
    Ok(entry.0)
}

pub async fn get_unlock_outcome(
    state: &AppState,
    request_id: &str,
) -> Result<Option<UnlockOutcomeRecord>, AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let raw: Option<String> = conn
            .get(format!("{IDEM_KEY}{request_id}"))
            .await
            .map_err(store_err)?;
        return raw
            .map(|s| serde_json::from_str::<UnlockOutcomeRecord>(&s))
            .transpose()
            .map_err(decode_err);
    }
    let now = Utc::now().timestamp();
    let inner = lock_store(state)?;
    Ok(match inner.unlock_outcomes.get(request_id) {
        Some((record, expires_at)) if *expires_at > now => Some(record.clone()),
        _ => None,
    })
}

/// Set-if-absent of the pending marker; false means another attempt with the
/// same id got there first.
pub async fn begin_unlock(
    state: &AppState,
    request_id: &str,
    job_id: &str,
    clip_file: &str,
) -> Result<bool, AppError> {
    let pending = UnlockOutcomeRecord::pending(job_id, clip_file);
    if let Some(mut conn) = redis_conn(state).await? {
        let payload = serde_json::to_string(&pending).map_err(encode_err)?;
        let set: Option<String> = redis::cmd("SET")
            .arg(format!("{IDEM_KEY}{request_id}"))
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(IDEMPOTENCY_TTL_SECONDS)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        return Ok(set.is_some());
    }
    let now = Utc::now().timestamp();
    let mut inner = lock_store(state)?;
    match inner.unlock_outcomes.get(request_id) {
        Some((_, expires_at)) if *expires_at > now => Ok(false),
        _ => {
            inner.unlock_outcomes.insert(
                request_id.to_string(),
                (pending, now + IDEMPOTENCY_TTL_SECONDS as i64),
            );
            Ok(true)
        }
    }
}

pub async fn put_unlock_outcome(
    state: &AppState,
    request_id: &str,
    outcome: &UnlockOutcomeRecord,
) -> Result<(), AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let payload = serde_json::to_string(outcome).map_err(encode_err)?;
        let _: () = conn
            .set_ex(
                format!("{IDEM_KEY}{request_id}"),
                payload,
                IDEMPOTENCY_TTL_SECONDS,
            )
            .await
            .map_err(store_err)?;
        return Ok(());
    }
    let now = Utc::now().timestamp();
    let mut inner = lock_store(state)?;
    inner.unlock_outcomes.insert(
        request_id.to_string(),
        (outcome.clone(), now + IDEMPOTENCY_TTL_SECONDS as i64),
    );
    Ok(())
}

pub async fn delete_unlock_outcome(state: &AppState, request_id: &str) -> Result<(), AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let _: () = conn
            .del(format!("{IDEM_KEY}{request_id}"))
            .await
            .map_err(store_err)?;
        return Ok(());
    }
    let mut inner = lock_store(state)?;
    inner.unlock_outcomes.remove(request_id);
    Ok(())
}

pub async fn get_unlock_pending(
    state: &AppState,
    request_id: &str,
) -> Result<Option<UnlockPendingRecord>, AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let raw: Option<String> = conn
            .get(format!("{PENDING_KEY}{request_id}"))
            .await
            .map_err(store_err)?;
        return raw
            .map(|s| serde_json::from_str::<UnlockPendingRecord>(&s))
            .transpose()
            .map_err(decode_err);
    }
    let now = Utc::now().timestamp();
    let inner = lock_store(state)?;
    Ok(match inner.unlock_pending.get(request_id) {
        Some((record, expires_at)) if *expires_at > now => Some(record.clone()),
        _ => None,
    })
}

pub async fn put_unlock_pending(
    state: &AppState,
    request_id: &str,
    record: &UnlockPendingRecord,
) -> Result<(), AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let payload = serde_json::to_string(record).map_err(encode_err)?;
        let _: () = conn
            .set_ex(
                format!("{PENDING_KEY}{request_id}"),
                payload,
                PENDING_TTL_SECONDS,
            )
            .await
            .map_err(store_err)?;
        return Ok(());
    }
    let now = Utc::now().timestamp();
    let mut inner = lock_store(state)?;
    inner.unlock_pending.insert(
        request_id.to_string(),
        (record.clone(), now + PENDING_TTL_SECONDS as i64),
    );
    Ok(())
}

pub async fn delete_unlock_pending(state: &AppState, request_id: &str) -> Result<(), AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let _: () = conn
            .del(format!("{PENDING_KEY}{request_id}"))
            .await
            .map_err(store_err)?;
        return Ok(());
    }
    let mut inner = lock_store(state)?;
    inner.unlock_pending.remove(request_id);
    Ok(())
}

pub async fn put_auth_nonce(
    state: &AppState,
    nonce: &str,
    record: &AuthNonceRecord,
) -> Result<(), AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let payload = serde_json::to_string(record).map_err(encode_err)?;
        let _: () = conn
            .set_ex(format!("{NONCE_KEY}{nonce}"), payload, NONCE_TTL_SECONDS)
            .await
            .map_err(store_err)?;
        return Ok(());
    }
    let now = Utc::now().timestamp();
    let mut inner = lock_store(state)?;
    inner.auth_nonces.insert(
        nonce.to_string(),
        (record.clone(), now + NONCE_TTL_SECONDS as i64),
    );
    Ok(())
}

pub async fn get_auth_nonce(
    state: &AppState,
    nonce: &str,
) -> Result<Option<AuthNonceRecord>, AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let raw: Option<String> = conn
            .get(format!("{NONCE_KEY}{nonce}"))
            .await
            .map_err(store_err)?;
        return raw
            .map(|s| serde_json::from_str::<AuthNonceRecord>(&s))
            .transpose()
            .map_err(decode_err);
    }
    let now = Utc::now().timestamp();
    let inner = lock_store(state)?;
    Ok(match inner.auth_nonces.get(nonce) {
        Some((record, expires_at)) if *expires_at > now => Some(record.clone()),
        _ => None,
    })
}

/// Atomic fetch-and-delete; only one concurrent verify can win the nonce.
pub async fn consume_auth_nonce(
    state: &AppState,
    nonce: &str,
) -> Result<Option<AuthNonceRecord>, AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let raw: Option<String> = conn
            .get_del(format!("{NONCE_KEY}{nonce}"))
            .await
            .map_err(store_err)?;
        return raw
            .map(|s| serde_json::from_str::<AuthNonceRecord>(&s))
            .transpose()
            .map_err(decode_err);
    }
    let now = Utc::now().timestamp();
    let mut inner = lock_store(state)?;
    Ok(match inner.auth_nonces.remove(nonce) {
        Some((record, expires_at)) if expires_at > now => Some(record),
        _ => None,
    })
}

pub async fn delete_auth_nonce(state: &AppState, nonce: &str) -> Result<(), AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let _: () = conn
            .del(format!("{NONCE_KEY}{nonce}"))
            .await
            .map_err(store_err)?;
        return Ok(());
    }
    let mut inner = lock_store(state)?;
    inner.auth_nonces.remove(nonce);
    Ok(())
}

pub async fn put_auth_token(state: &AppState, token: &str, wallet: &str) -> Result<(), AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let _: () = conn
            .set_ex(format!("{TOKEN_KEY}{token}"), wallet, TOKEN_TTL_SECONDS)
            .await
            .map_err(store_err)?;
        return Ok(());
    }
    let now = Utc::now().timestamp();
    let mut inner = lock_store(state)?;
    inner.auth_tokens.insert(
        token.to_string(),
        (wallet.to_string(), now + TOKEN_TTL_SECONDS as i64),
    );
    Ok(())
}

pub async fn get_auth_token_wallet(
    state: &AppState,
    token: &str,
) -> Result<Option<String>, AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let raw: Option<String> = conn
            .get(format!("{TOKEN_KEY}{token}"))
            .await
            .map_err(store_err)?;
        return Ok(raw);
    }
    let now = Utc::now().timestamp();
    let inner = lock_store(state)?;
    Ok(match inner.auth_tokens.get(token) {
        Some((wallet, expires_at)) if *expires_at > now => Some(wallet.clone()),
        _ => None,
    })
}

/// Set-once marker; false means the signature was already credited.
pub async fn try_mark_topup_signature(state: &AppState, signature: &str) -> Result<bool, AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let set: Option<String> = redis::cmd("SET")
            .arg(format!("{TOPUP_KEY}{signature}"))
            .arg("1")
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        return Ok(set.is_some());
    }
    let now = Utc::now().timestamp();
    let mut inner = lock_store(state)?;
    Ok(inner
        .topup_signatures
        .insert(signature.to_string(), now)
        .is_none())
}

pub async fn is_topup_signature_marked(
    state: &AppState,
    signature: &str,
) -> Result<bool, AppError> {
    if let Some(mut conn) = redis_conn(state).await? {
        let raw: Option<String> = conn
            .get(format!("{TOPUP_KEY}{signature}"))
            .await
            .map_err(store_err)?;
        return Ok(raw.is_some());
    }
    let inner = lock_store(state)?;
    Ok(inner.topup_signatures.contains_key(signature))
}

/// Scripted unlock primitive: replay detection, set-once clip unlock and
/// the per-wallet spend check in one atomic step. Whatever it returns is
/// authoritative.
pub async fn try_consume_credit(
    state: &AppState,
    job_id: &str,
    clip_file: &str,
    wallet: &str,
    request_id: &str,
    available_credits: u64,
) -> Result<CreditConsume, AppError> {
    let replay = UnlockOutcomeRecord::replay_unlocked(job_id, clip_file);
    let charged = UnlockOutcomeRecord::charged(job_id, clip_file);
    if let Some(mut conn) = redis_conn(state).await? {
        let replay_payload = serde_json::to_string(&replay).map_err(encode_err)?;
        let charged_payload = serde_json::to_string(&charged).map_err(encode_err)?;
        let result: Vec<String> = redis::Script::new(TRY_CONSUME_SCRIPT)
            .key(format!("{IDEM_KEY}{request_id}"))
            .key(unlock_key(job_id, clip_file))
            .key(format!("{SPEND_KEY}{wallet}"))
            .arg(available_credits)
            .arg(IDEMPOTENCY_TTL_SECONDS)
            .arg(replay_payload)
            .arg(charged_payload)
            .arg(SPEND_TTL_SECONDS)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        let kind = result.first().map(String::as_str).unwrap_or_default();
        return match kind {
            "insufficient" => Ok(CreditConsume::Insufficient),
            "replay" | "new" => {
                let payload = result
                    .get(1)
                    .ok_or_else(|| AppError::internal("STORE_DECODE_FAILED", "script payload"))?;
                let outcome: UnlockOutcomeRecord =
                    serde_json::from_str(payload).map_err(decode_err)?;
                Ok(CreditConsume::Outcome(outcome))
            }
            other => Err(AppError::internal(
                "STORE_DECODE_FAILED",
                format!("unexpected script result: {other}"),
            )),
        };
    }

    let now = Utc::now().timestamp();
    let mut inner = lock_store(state)?;
    if let Some((existing, expires_at)) = inner.unlock_outcomes.get(request_id) {
        if *expires_at > now && existing.is_final() {
            return Ok(CreditConsume::Outcome(existing.clone()));
        }
    }
    if inner
        .clip_unlocks
        .contains_key(&unlock_key(job_id, clip_file))
    {
        inner.unlock_outcomes.insert(
            request_id.to_string(),
            (replay.clone(), now + IDEMPOTENCY_TTL_SECONDS as i64),
        );
        return Ok(CreditConsume::Outcome(replay));
    }
    let spend = match inner.wallet_spend.get(wallet) {
        Some((count, expires_at)) if *expires_at > now => *count,
        _ => 0,
    };
    if spend + 1 > available_credits {
        return Ok(CreditConsume::Insufficient);
    }
    inner
        .wallet_spend
        .insert(wallet.to_string(), (spend + 1, now + SPEND_TTL_SECONDS as i64));
    inner.clip_unlocks.insert(unlock_key(job_id, clip_file), true);
    inner.unlock_outcomes.insert(
        request_id.to_string(),
        (charged.clone(), now + IDEMPOTENCY_TTL_SECONDS as i64),
    );
    Ok(CreditConsume::Outcome(charged))
}

fn unlock_key(job_id: &str, clip_file: &str) -> String {
    format!("{UNLOCK_KEY}{job_id}:{clip_file}")
}

async fn redis_conn(state: &AppState) -> Result<Option<MultiplexedConnection>, AppError> {
    let Some(client) = &state.infra.redis else {
        return Ok(None);
    };
    client
        .get_multiplexed_async_connection()
        .await
        .map(Some)
        .map_err(|e| AppError::bad_gateway("STORE_UNAVAILABLE", e.to_string()))
}

fn lock_store(state: &AppState) -> Result<MutexGuard<'_, JobStoreInner>, AppError> {
    state
        .store
        .inner
        .lock()
        .map_err(|_| AppError::internal("STORE_LOCK_ERROR", "job store lock poisoned"))
}

fn store_err(e: redis::RedisError) -> AppError {
    AppError::bad_gateway("STORE_UNAVAILABLE", e.to_string())
}

fn decode_err(e: serde_json::Error) -> AppError {
    AppError::internal("STORE_DECODE_FAILED", e.to_string())
}

fn encode_err(e: serde_json::Error) -> AppError {
    AppError::internal("STORE_ENCODE_FAILED", e.to_string())
}
