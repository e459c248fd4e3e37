use crate::app::AppState;
use crate::module::error::AppError;
use crate::module::job::crud::{self, CreditConsume};
use crate::module::job::model::{
    JobRecord, UnlockFailure, UnlockOutcomeRecord, UnlockPendingRecord,
};
use crate::module::job::schema::UnlockResponse;
use crate::service::chain_service::{self, ChainError};
use crate::service::wallet_auth_service;
use tracing::{info, warn};

/// Runs the unlock state machine for one `(job, clip, wallet, request id)`
/// after all gates (tokens, manifest containment) have passed.
///
/// The request id is the unit of idempotency: at most one final `NEW`
/// outcome is ever produced for it, and replays return the recorded outcome
/// verbatim.
pub async fn execute(
    state: &AppState,
    job: &JobRecord,
    wallet: &str,
    clip_file: &str,
    request_id: &str,
) -> Result<UnlockResponse, AppError> {
    let job_id = job.job_id.as_str();

    // Crash recovery: a pending marker means a chain consume was submitted
    // for this id but the local commit never landed.
    if let Some(pending) = crud::get_unlock_pending(state, request_id).await? {
        if pending.job_id != job_id || pending.clip_file != clip_file {
            return Err(AppError::conflict(
                "UNLOCK_REQUEST_MISMATCH",
                "unlock_request_id is bound to another clip",
            ));
        }
        crud::set_clip_unlocked(state, job_id, clip_file).await?;
        crud::delete_unlock_pending(state, request_id).await?;
        let outcome = UnlockOutcomeRecord::replay_unlocked(job_id, clip_file);
        crud::put_unlock_outcome(state, request_id, &outcome).await?;
        info!(job_id, clip_file, request_id, tx_sig = %pending.tx_sig, "unlock recovered from pending marker");
        return Ok(outcome.to_response());
    }

    // This id already reached a decision: repeat it verbatim. Checked ahead
    // of the clip-unlocked path so the id that performed the charge keeps
    // replaying its original charged body.
    if let Some(outcome) = crud::get_unlock_outcome(state, request_id).await? {
        if outcome.is_final() {
            return final_reply(outcome);
        }
        return Err(in_progress());
    }

    // Delivery eligibility is monotonic; a fresh id on an unlocked clip
    // replays for free.
    if crud::is_clip_unlocked(state, job_id, clip_file).await? {
        let outcome = UnlockOutcomeRecord::replay_unlocked(job_id, clip_file);
        crud::put_unlock_outcome(state, request_id, &outcome).await?;
        return Ok(outcome.to_response());
    }

    if !crud::begin_unlock(state, request_id, job_id, clip_file).await? {
        // Lost the set-if-absent; another arrival with this id owns it.
        return match crud::get_unlock_outcome(state, request_id).await? {
            Some(outcome) if outcome.is_final() => final_reply(outcome),
            _ => Err(in_progress()),
        };
    }

    let Some(chain) = state.infra.chain.clone() else {
        // Infrastructure gap, not a decision: release the id so a retry can
        // succeed once the chain client is back.
        crud::delete_unlock_outcome(state, request_id).await?;
        return Err(AppError::bad_gateway(
            "CHAIN_UNAVAILABLE",
            "chain client is not configured",
        ));
    };
    let wallet_key = wallet_auth_service::parse_wallet_address(wallet)
        .map_err(|e| AppError::internal("WALLET_DECODE_FAILED", e))?;

    let balance = match chain_service::read_credit_balance(&chain, &wallet_key).await {
        Ok(balance) => balance,
        Err(e) => {
            crud::delete_unlock_outcome(state, request_id).await?;
            return Err(AppError::bad_gateway("CHAIN_READ_FAILED", e.to_string()));
        }
    };
    let spend = crud::wallet_spend(state, wallet).await?;
    if balance == 0 || spend + 1 > balance {
        let burned =
            UnlockOutcomeRecord::burned(job_id, clip_file, UnlockFailure::InsufficientCredits);
        crud::put_unlock_outcome(state, request_id, &burned).await?;
        return Err(insufficient());
    }

    let tx_sig = match chain_service::send_consume_credit(&chain, &wallet_key, 1, request_id).await
    {
        Ok(sig) => sig,
        Err(e) => {
            // The cluster never accepted the transaction; burn the id so a
            // retry with it cannot double-charge, and report why.
            warn!(job_id, clip_file, request_id, error = %e, "consume_credit submit failed");
            let (failure, err) =
                match chain_service::read_credit_balance(&chain, &wallet_key).await {
                    Ok(balance) if balance < 1 => {
                        (UnlockFailure::InsufficientCredits, insufficient())
                    }
                    _ => (
                        UnlockFailure::ChainSubmitFailed,
                        AppError::bad_gateway("CHAIN_SUBMIT_FAILED", e.to_string()),
                    ),
                };
            let burned = UnlockOutcomeRecord::burned(job_id, clip_file, failure);
            crud::put_unlock_outcome(state, request_id, &burned).await?;
            return Err(err);
        }
    };

    let pending = UnlockPendingRecord {
        job_id: job_id.to_string(),
        clip_file: clip_file.to_string(),
        wallet: wallet.to_string(),
        tx_sig: tx_sig.to_string(),
    };
    crud::put_unlock_pending(state, request_id, &pending).await?;

    match chain_service::await_confirmation(&chain, &tx_sig).await {
        Ok(()) => {}
        Err(ChainError::TransactionFailed(reason)) => {
            warn!(job_id, clip_file, request_id, tx_sig = %tx_sig, reason, "consume_credit rejected on chain");
            crud::delete_unlock_pending(state, request_id).await?;
            let (failure, err) =
                match chain_service::read_credit_balance(&chain, &wallet_key).await {
                    Ok(balance) if balance < 1 => {
                        (UnlockFailure::InsufficientCredits, insufficient())
                    }
                    _ => (
                        UnlockFailure::ChainSubmitFailed,
                        AppError::bad_gateway("CHAIN_SUBMIT_FAILED", reason),
                    ),
                };
            let burned = UnlockOutcomeRecord::burned(job_id, clip_file, failure);
            crud::put_unlock_outcome(state, request_id, &burned).await?;
            return Err(err);
        }
        Err(e) => {
            // Outcome on chain unknown. Reserve the spend conservatively,
            // burn the id, and keep the pending marker so a retry with the
            // same id recovers the unlock without another charge.
            warn!(job_id, clip_file, request_id, tx_sig = %tx_sig, error = %e, "consume_credit confirmation uncertain");
            crud::incr_wallet_spend(state, wallet).await?;
            let burned =
                UnlockOutcomeRecord::burned(job_id, clip_file, UnlockFailure::ChainConfirmTimeout);
            crud::put_unlock_outcome(state, request_id, &burned).await?;
            return Err(AppError::bad_gateway(
                "CHAIN_CONFIRM_TIMEOUT",
                e.to_string(),
            ));
        }
    }

    let outcome = match crud::try_consume_credit(
        state, job_id, clip_file, wallet, request_id, balance,
    )
    .await?
    {
        CreditConsume::Outcome(outcome) => outcome,
        CreditConsume::Insufficient => {
            // The spend window moved past the balance read while our debit
            // was confirming. The chain charge is real; record it directly.
            warn!(job_id, clip_file, request_id, "spend window raced a confirmed debit");
            let charged = UnlockOutcomeRecord::charged(job_id, clip_file);
            crud::set_clip_unlocked(state, job_id, clip_file).await?;
            crud::put_unlock_outcome(state, request_id, &charged).await?;
            charged
        }
    };
    crud::delete_unlock_pending(state, request_id).await?;
    info!(
        job_id,
        clip_file,
        request_id,
        tx_sig = %tx_sig,
        charged_credits = outcome.charged_credits,
        "clip unlocked"
    );
    Ok(outcome.to_response())
}

/// A recorded final outcome replays as the response it originally produced:
/// successes as 200 bodies, burned ids as their original refusal.
fn final_reply(outcome: UnlockOutcomeRecord) -> Result<UnlockResponse, AppError> {
    match outcome.failure {
        None => Ok(outcome.to_response()),
        Some(UnlockFailure::InsufficientCredits) => Err(insufficient()),
        Some(UnlockFailure::ChainSubmitFailed) => Err(AppError::bad_gateway(
            "CHAIN_SUBMIT_FAILED",
            "consume_credit failed on a prior attempt with this request id",
        )),
        Some(UnlockFailure::ChainConfirmTimeout) => Err(AppError::bad_gateway(
            "CHAIN_CONFIRM_TIMEOUT",
            "consume_credit confirmation timed out on a prior attempt with this request id",
        )),
    }
}

fn in_progress() -> AppError {
    AppError::conflict("UNLOCK_IN_PROGRESS", "unlock already in progress for this request id")
}

fn insufficient() -> AppError {
    AppError::payment_required("INSUFFICIENT_CREDITS", "insufficient on-chain credits")
}
