//! Ed25519 proof suite.

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};

use crate::{
    method::{
        ED25519_VERIFICATION_KEY_2020, VerificationMethod, encode_ed25519_public_key,
        multibase_decode, multibase_encode,
    },
    suite::{ProofSuite, Signer, SuiteError},
};

/// Proof `type` produced by [`Ed25519Suite`].
pub const ED25519_SIGNATURE_2020: &str = "Ed25519Signature2020";

/// Suite for `Ed25519Signature2020` proofs over
/// `Ed25519VerificationKey2020` methods.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Suite;

#[async_trait]
impl ProofSuite for Ed25519Suite {
    fn proof_type(&self) -> &'static str {
        ED25519_SIGNATURE_2020
    }

    fn supports_method(&self, method: &VerificationMethod) -> bool {
        method.method_type == ED25519_VERIFICATION_KEY_2020
            && method.public_key_multibase.is_some()
    }

    async fn verify(
        &self,
        payload: &[u8],
        method: &VerificationMethod,
        proof_value: &str,
    ) -> Result<(), SuiteError> {
        if method.method_type != ED25519_VERIFICATION_KEY_2020 {
            return Err(SuiteError::UnsupportedMethod {
                suite: ED25519_SIGNATURE_2020,
                found: method.method_type.clone(),
            });
        }

        let key = method.ed25519_public_key()?;
        let bytes = multibase_decode(proof_value)?;
        let bytes: [u8; 64] = bytes.as_slice().try_into().map_err(|_| {
            SuiteError::Multibase("Ed25519 proof value must decode to 64 bytes".into())
        })?;
        let signature = ed25519_dalek::Signature::from_bytes(&bytes);

        key.verify_strict(payload, &signature)
            .map_err(SuiteError::Verification)
    }
}

/// An Ed25519 signing key bound to the verification method URI that
/// validates its proofs.
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    signing_key: SigningKey,
    verification_method: String,
}

impl Ed25519Signer {
    /// Create a signer from an existing key and its method URI.
    #[must_use]
    pub fn new(signing_key: SigningKey, verification_method: impl Into<String>) -> Self {
        Self {
            signing_key,
            verification_method: verification_method.into(),
        }
    }

    /// Derive a signer deterministically from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32], verification_method: impl Into<String>) -> Self {
        Self::new(SigningKey::from_bytes(seed), verification_method)
    }

    /// The public half of this signer's key.
    #[must_use]
    pub fn verifying_key(&self) -> ed25519_dalek::VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Build the verification method document for this key.
    #[must_use]
    pub fn method_document(&self, controller: impl Into<String>) -> VerificationMethod {
        VerificationMethod {
            id: self.verification_method.clone(),
            method_type: ED25519_VERIFICATION_KEY_2020.into(),
            controller: Some(controller.into()),
            public_key_multibase: Some(encode_ed25519_public_key(&self.verifying_key())),
        }
    }
}

#[async_trait]
impl Signer for Ed25519Signer {
    fn proof_type(&self) -> &'static str {
        ED25519_SIGNATURE_2020
    }

    fn verification_method(&self) -> &str {
        &self.verification_method
    }

    async fn sign(&self, payload: &[u8]) -> Result<String, SuiteError> {
        let signature = self.signing_key.sign(payload);
        Ok(multibase_encode(&signature.to_bytes()))
    }
}
