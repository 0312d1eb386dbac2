//! Plan digest, HMAC signing, verification, and attestation (spec §4.5, C8).

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::core::error::UnityToolError;
use crate::core::time::now_epoch_z;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_SIGNING_KEY_ENV: &str = "UNITYTOOL_PLAN_SIGNING_KEY";

/// Byte-exact SHA-256 over the plan file's UTF-8 bytes, hex-encoded.
/// Never re-serializes the plan — the digest is a function of exactly
/// what's on disk, so it is stable under round-tripping (spec §3, §8).
pub fn plan_digest(plan_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plan_bytes);
    hex::encode(hasher.finalize())
}

/// Where the signing key comes from, in the order spec §4.5 allows it to
/// be sourced: an explicit file, a named env variable, or the default env
/// variable (`UNITYTOOL_PLAN_SIGNING_KEY`).
pub enum KeySource<'a> {
    File(&'a Path),
    EnvVar(&'a str),
    Default,
}

pub fn resolve_signing_key(source: KeySource<'_>) -> Result<Vec<u8>, UnityToolError> {
    match source {
        KeySource::File(path) => Ok(std::fs::read(path)?),
        KeySource::EnvVar(name) => std::env::var(name)
            .map(|s| s.into_bytes())
            .map_err(|_| UnityToolError::Policy {
                code: "SER002",
                message: format!("environment variable '{name}' is not set"),
            }),
        KeySource::Default => std::env::var(DEFAULT_SIGNING_KEY_ENV)
            .map(|s| s.into_bytes())
            .map_err(|_| UnityToolError::Policy {
                code: "SER002",
                message: format!("environment variable '{DEFAULT_SIGNING_KEY_ENV}' is not set"),
            }),
    }
}

/// HMAC-SHA256 over the plan bytes, hex-encoded.
pub fn sign_plan(plan_bytes: &[u8], key: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts a key of any size");
    mac.update(plan_bytes);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time-ish comparison via the `hmac` crate's own verification
/// path, so mismatched signatures never short-circuit on the first
/// differing byte.
pub fn verify_signature(plan_bytes: &[u8], key: &[u8], expected_signature_hex: &str) -> bool {
    let Ok(expected_bytes) = hex::decode(expected_signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(plan_bytes);
    mac.verify_slice(&expected_bytes).is_ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attestation {
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub generated_at_utc: String,
    pub plan_path: String,
}

pub fn build_attestation(
    plan_bytes: &[u8],
    plan_path: &str,
    signature: Option<String>,
) -> Attestation {
    Attestation {
        sha256: plan_digest(plan_bytes),
        signature,
        generated_at_utc: now_epoch_z(),
        plan_path: plan_path.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifyExpectations {
    pub expected_sha256: Option<String>,
    pub expected_signature: Option<String>,
    pub attestation: Option<Attestation>,
    pub signing_key: Option<Vec<u8>>,
}

/// Confirm every supplied expectation against `plan_bytes`. CLI-supplied
/// expectations (`expected_sha256`/`expected_signature`) override whatever
/// an attestation file says, per spec §4.5 step 2.
pub fn verify_plan(
    plan_bytes: &[u8],
    expectations: &VerifyExpectations,
) -> Result<(), UnityToolError> {
    let digest = plan_digest(plan_bytes);

    let expected_sha256 = expectations
        .expected_sha256
        .clone()
        .or_else(|| expectations.attestation.as_ref().map(|a| a.sha256.clone()));
    if let Some(expected) = expected_sha256 {
        if expected != digest {
            return Err(UnityToolError::CryptoMismatch {
                code: "PLAN_DIGEST_MISMATCH",
                message: format!("expected sha256 {expected}, computed {digest}"),
            });
        }
    }

    let expected_signature = expectations.expected_signature.clone().or_else(|| {
        expectations
            .attestation
            .as_ref()
            .and_then(|a| a.signature.clone())
    });
    if let Some(expected) = expected_signature {
        let key = expectations.signing_key.as_deref().ok_or_else(|| UnityToolError::Policy {
            code: "SER002",
            message: "signature expectation supplied but no signing key available".to_string(),
        })?;
        if !verify_signature(plan_bytes, key, &expected) {
            return Err(UnityToolError::CryptoMismatch {
                code: "PLAN_SIGNATURE_MISMATCH",
                message: "HMAC signature does not match".to_string(),
            });
        }
    }

    if let (Some(attestation_expected), Some(attestation)) =
        (expectations.expected_sha256.is_some(), expectations.attestation.as_ref())
    {
        if attestation_expected && attestation.sha256 != digest {
            return Err(UnityToolError::CryptoMismatch {
                code: "PLAN_ATTESTATION_MISMATCH",
                message: "attestation sha256 disagrees with the supplied expectation".to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_under_reread() {
        let bytes = br#"{"target":"a","ops":[]}"#;
        assert_eq!(plan_digest(bytes), plan_digest(bytes));
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let bytes = b"plan-bytes";
        let key = b"secret-key";
        let sig = sign_plan(bytes, key);
        assert!(verify_signature(bytes, key, &sig));
    }

    #[test]
    fn verify_fails_with_wrong_key() {
        let bytes = b"plan-bytes";
        let sig = sign_plan(bytes, b"key-a");
        assert!(!verify_signature(bytes, b"key-b", &sig));
    }

    #[test]
    fn verify_plan_digest_mismatch_is_coded() {
        let expectations = VerifyExpectations {
            expected_sha256: Some("deadbeef".to_string()),
            ..Default::default()
        };
        let err = verify_plan(b"plan-bytes", &expectations).unwrap_err();
        assert_eq!(err.code(), Some("PLAN_DIGEST_MISMATCH"));
    }

    #[test]
    fn verify_plan_ok_when_digest_matches() {
        let bytes = b"plan-bytes";
        let expectations = VerifyExpectations {
            expected_sha256: Some(plan_digest(bytes)),
            ..Default::default()
        };
        assert!(verify_plan(bytes, &expectations).is_ok());
    }
}
