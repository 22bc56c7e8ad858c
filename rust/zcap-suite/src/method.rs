//! Verification method (key) documents.

use base58::{FromBase58, ToBase58};
use serde::{Deserialize, Serialize};

use crate::suite::SuiteError;

/// Method type for Ed25519 public keys encoded as multibase.
pub const ED25519_VERIFICATION_KEY_2020: &str = "Ed25519VerificationKey2020";

/// Multicodec prefix for an Ed25519 public key.
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// A dereferenced verification method: the public key material a proof's
/// `verificationMethod` URI resolves to, along with the entity that
/// controls the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// Key identifier (the URI named by `verificationMethod`).
    pub id: String,

    /// Method type, e.g. [`ED25519_VERIFICATION_KEY_2020`].
    #[serde(rename = "type")]
    pub method_type: String,

    /// The entity that controls this key. Proofs made with the key count
    /// as acts of this controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    /// Multibase-encoded public key bytes (multicodec-prefixed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<String>,
}

impl VerificationMethod {
    /// The identity a proof made with this key speaks for: the key's
    /// controller when one is named, otherwise the key itself.
    #[must_use]
    pub fn acting_party(&self) -> &str {
        self.controller.as_deref().unwrap_or(&self.id)
    }

    /// Returns `true` if `identity` is this key or this key's controller.
    #[must_use]
    pub fn speaks_for(&self, identity: &str) -> bool {
        self.id == identity || self.controller.as_deref() == Some(identity)
    }

    /// Decode the Ed25519 public key carried by this method.
    ///
    /// # Errors
    ///
    /// Fails when the method carries no key material, the multibase or
    /// multicodec framing is wrong, or the bytes are not a valid point.
    pub fn ed25519_public_key(&self) -> Result<ed25519_dalek::VerifyingKey, SuiteError> {
        let encoded = self
            .public_key_multibase
            .as_deref()
            .ok_or_else(|| SuiteError::InvalidKey("method carries no publicKeyMultibase".into()))?;
        let bytes = multibase_decode(encoded)?;
        let Some(raw) = bytes.strip_prefix(&ED25519_MULTICODEC) else {
            return Err(SuiteError::InvalidKey(
                "public key is not multicodec-tagged as Ed25519".into(),
            ));
        };
        let raw: [u8; 32] = raw
            .try_into()
            .map_err(|_| SuiteError::InvalidKey("Ed25519 public key must be 32 bytes".into()))?;
        ed25519_dalek::VerifyingKey::from_bytes(&raw)
            .map_err(|e| SuiteError::InvalidKey(e.to_string()))
    }
}

/// Encode bytes as multibase base58btc (`z` prefix).
#[must_use]
pub fn multibase_encode(bytes: &[u8]) -> String {
    format!("z{}", bytes.to_base58())
}

/// Encode an Ed25519 public key as `publicKeyMultibase` (multicodec-tagged).
#[must_use]
pub fn encode_ed25519_public_key(key: &ed25519_dalek::VerifyingKey) -> String {
    let mut bytes = ED25519_MULTICODEC.to_vec();
    bytes.extend_from_slice(key.as_bytes());
    multibase_encode(&bytes)
}

/// Decode a multibase base58btc string.
///
/// # Errors
///
/// Fails when the `z` prefix is missing or the remainder is not base58btc.
pub fn multibase_decode(encoded: &str) -> Result<Vec<u8>, SuiteError> {
    let Some(body) = encoded.strip_prefix('z') else {
        return Err(SuiteError::Multibase(format!(
            "expected base58btc (`z`) multibase, got `{encoded}`"
        )));
    };
    body.from_base58()
        .map_err(|e| SuiteError::Multibase(format!("{e:?}")))
}
