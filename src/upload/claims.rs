//! Signed, time-bounded claims handed to upstream.
//!
//! Tokens are HS256 JWTs signed with the secret shared with upstream. The
//! payload is untrusted data until [`ClaimsSigner::verify`] has checked the
//! signature, issuer and expiry, and even then upstream must check that the
//! declared fields are really present in the request it received.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value of the `iss` claim on every token this proxy signs.
pub const ISSUER: &str = "accel-proxy";

/// Clock skew tolerated when checking expiry, in seconds.
const LEEWAY_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ClaimsError {
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("claimed field {0:?} is not present in the request")]
    UnknownField(String),
}

/// Claims carried in the rewritten-fields request header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartClaims {
    /// Original field name → storage location of its content.
    pub rewritten_fields: BTreeMap<String, String>,
}

impl MultipartClaims {
    /// Every claimed field must be one of `present`.
    pub fn check_fields<'a, I>(&self, present: I) -> Result<(), ClaimsError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: Vec<&str> = present.into_iter().collect();
        match self
            .rewritten_fields
            .keys()
            .find(|field| !present.contains(&field.as_str()))
        {
            Some(field) => Err(ClaimsError::UnknownField(field.clone())),
            None => Ok(()),
        }
    }
}

/// Claims embedded in a rewritten file part: the reference fields
/// describing one stored file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadClaims {
    pub upload: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    iss: String,
    exp: u64,
    #[serde(flatten)]
    payload: T,
}

/// Signs and verifies claims with one shared secret.
#[derive(Clone)]
pub struct ClaimsSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for ClaimsSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimsSigner").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl ClaimsSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Sign `payload`, valid for this signer's TTL from now.
    pub fn sign<T: Serialize>(&self, payload: &T) -> Result<String, ClaimsError> {
        self.sign_until(payload, unix_now() + self.ttl.as_secs())
    }

    fn sign_until<T: Serialize>(&self, payload: &T, exp: u64) -> Result<String, ClaimsError> {
        let envelope = Envelope {
            iss: ISSUER.to_string(),
            exp,
            payload,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &envelope, &self.encoding)?)
    }

    /// Check signature, issuer and expiry, then return the payload.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, ClaimsError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.leeway = LEEWAY_SECS;

        let data = decode::<Envelope<T>>(token, &self.decoding, &validation)?;
        Ok(data.claims.payload)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
