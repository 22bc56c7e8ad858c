//! Proof suite and signer seams.

use async_trait::async_trait;

use crate::method::VerificationMethod;

/// A linked data proof suite: verifies one detached signature over one
/// canonical payload.
///
/// The verification engine holds one or more suites and dispatches on the
/// proof's `type`. Suites own the cryptography; the engine owns the chain
/// semantics.
#[async_trait]
pub trait ProofSuite: Send + Sync {
    /// The JSON-LD proof `type` this suite produces and verifies.
    fn proof_type(&self) -> &'static str;

    /// Whether this suite can verify proofs made with the given method.
    fn supports_method(&self, method: &VerificationMethod) -> bool;

    /// Verify `proof_value` over `payload` with the given method's key.
    ///
    /// # Errors
    ///
    /// Returns a [`SuiteError`] when the method's key type is unsupported,
    /// the key or signature encoding is malformed, or the signature does
    /// not verify.
    async fn verify(
        &self,
        payload: &[u8],
        method: &VerificationMethod,
        proof_value: &str,
    ) -> Result<(), SuiteError>;
}

/// Produces proof values. Held by proof builders, never by verifiers.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The proof `type` signatures from this signer verify under.
    fn proof_type(&self) -> &'static str;

    /// URI of the verification method that validates this signer's proofs.
    fn verification_method(&self) -> &str;

    /// Sign `payload`, returning the multibase `proofValue`.
    ///
    /// # Errors
    ///
    /// Returns a [`SuiteError`] if the underlying key refuses to sign.
    async fn sign(&self, payload: &[u8]) -> Result<String, SuiteError>;
}

/// Errors raised by proof suites and signers.
#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    /// No held suite matches the proof's `type`.
    #[error("proof type `{0}` is not supported")]
    UnsupportedProofType(String),

    /// The suite cannot use the resolved verification method.
    #[error("verification method type `{found}` is not supported by the `{suite}` suite")]
    UnsupportedMethod {
        /// Suite that rejected the method.
        suite: &'static str,
        /// The method's declared type.
        found: String,
    },

    /// Multibase decoding failed.
    #[error("invalid multibase encoding: {0}")]
    Multibase(String),

    /// Key bytes were missing or malformed.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// The signature did not verify.
    #[error("signature verification failed: {0}")]
    Verification(#[from] signature::Error),

    /// The signer failed to produce a signature.
    #[error("signing failed: {0}")]
    Signing(String),
}
