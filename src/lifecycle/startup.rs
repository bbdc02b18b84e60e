//! Startup helpers.

use std::path::Path;
use std::time::Duration;

use rand::RngCore;

use crate::config::loader::{load_secret, ConfigError};
use crate::config::UploadConfig;
use crate::upload::ClaimsSigner;

/// Signer for upload claims. Without a configured secret a random one is
/// used, which upstream cannot verify; validation only allows that when no
/// upload route exists.
pub fn claims_signer(config: &UploadConfig) -> Result<ClaimsSigner, ConfigError> {
    let secret = match &config.secret_path {
        Some(path) => load_secret(Path::new(path))?,
        None => {
            tracing::warn!("No upload secret configured, signing with an ephemeral key");
            let mut secret = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut secret);
            secret
        }
    };
    Ok(ClaimsSigner::new(
        &secret,
        Duration::from_secs(config.claims_ttl_secs),
    ))
}
