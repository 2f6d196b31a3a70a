//! Payload decoding without signature checks
//!
//! Only for bookkeeping on tokens the caller already holds (revocation needs
//! the expiry). Never use the result to authorize anything.

use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::errors::TokenError;

/// Fields every token carries, read without verification
#[derive(Debug, Clone, Deserialize)]
pub struct UnverifiedClaims {
    pub jti: String,
    pub exp: i64,
}

/// Decode the payload of `token` without checking its signature or expiry
pub fn decode_unverified<T: DeserializeOwned>(token: &str) -> Result<T, TokenError> {
    let header = decode_header(token)?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<T>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}
