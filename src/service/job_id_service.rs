use ulid::Ulid;

const JOB_ID_PREFIX: &str = "kk_";
const ULID_LEN: usize = 26;

pub fn generate_job_id() -> String {
    format!("{JOB_ID_PREFIX}{}", Ulid::new())
}

/// Accepts `kk_` followed by 26 Crockford base32 characters (no I, L, O, U).
pub fn is_valid_job_id(job_id: &str) -> bool {
    let Some(body) = job_id.strip_prefix(JOB_ID_PREFIX) else {
        return false;
    };
    body.len() == ULID_LEN && body.chars().all(is_crockford_char)
}

fn is_crockford_char(c: char) -> bool {
    matches!(c, '0'..='9' | 'A'..='H' | 'J' | 'K' | 'M' | 'N' | 'P'..='T' | 'V'..='Z')
}
