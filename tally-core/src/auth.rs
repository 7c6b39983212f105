use http::HeaderMap;
use http::header::AUTHORIZATION;
use sha2::{Digest, Sha256};

use crate::error::CollectError;

const BEARER_PREFIX: &str = "Bearer ";

/// Check the `Authorization` header against the configured secret.
///
/// * secret unset or empty             → `Configuration`
/// * header absent, non-UTF-8, or not `Bearer <token>` → `Authentication`
/// * token differs from the secret     → `Authorization`
pub fn authorize(headers: &HeaderMap, expected: Option<&str>) -> Result<(), CollectError> {
    let expected = expected
        .filter(|t| !t.is_empty())
        .ok_or(CollectError::Configuration)?;

    let header = headers
        .get(AUTHORIZATION)
        .ok_or(CollectError::Authentication("missing authorization header"))?
        .to_str()
        .map_err(|_| CollectError::Authentication("authorization header is not valid UTF-8"))?;

    let token = header
        .strip_prefix(BEARER_PREFIX)
        .ok_or(CollectError::Authentication("authorization header is not a bearer token"))?;

    if tokens_match(token, expected) {
        Ok(())
    } else {
        Err(CollectError::Authorization)
    }
}

/// Compare fixed-length digests so timing does not depend on where the
/// inputs first differ, or on their lengths.
pub fn tokens_match(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
