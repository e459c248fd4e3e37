pub mod artifact_service;
pub mod chain_service;
pub mod credit_program_service;
pub mod hash_service;
pub mod job_id_service;
pub mod nosana_service;
pub mod r2_service;
pub mod token_service;
pub mod unlock_service;
pub mod validation_service;
pub mod wallet_auth_service;
