//! Error types for capability verification.
//!
//! Every failure surfaces as a [`VerificationError`]; [`ErrorKind`] gives
//! the coarse classification (structural, chain structure, cryptographic,
//! identity, semantic, hook-driven, cancelled). The engine returns these —
//! it never panics across the API boundary.

use zcap_suite::SuiteError;

use crate::loader::LoaderError;

/// Errors that can occur while verifying a capability invocation or
/// delegation.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    // -- structural ----------------------------------------------------

    /// A capability is missing a required field.
    #[error("capability `{id}` is missing required field `{field}`")]
    MissingField {
        /// The capability's `id`.
        id: String,
        /// The missing field name.
        field: &'static str,
    },

    /// The proof under inspection is missing a required field.
    #[error("the proof is missing required field `{field}`")]
    MissingProofField {
        /// The missing field name.
        field: &'static str,
    },

    /// A root capability carried a `parentCapability`.
    #[error("root capability `{id}` must not have a `parentCapability`")]
    RootWithParent {
        /// The offending capability's `id`.
        id: String,
    },

    /// A root capability carried an `expires` field.
    #[error("root capability `{id}` must not have an `expires` field")]
    RootWithExpires {
        /// The offending capability's `id`.
        id: String,
    },

    /// A delegated capability did not carry exactly one delegation proof.
    #[error("capability `{id}` must have exactly one delegation proof, found {found}")]
    DelegationProofCount {
        /// The offending capability's `id`.
        id: String,
        /// How many delegation proofs were present.
        found: usize,
    },

    /// `allowedAction` was present but empty or malformed.
    #[error("capability `{id}` has an invalid `allowedAction`: {reason}")]
    InvalidAllowedAction {
        /// The offending capability's `id`.
        id: String,
        /// What was wrong with the value.
        reason: &'static str,
    },

    /// A URI field did not hold an absolute URI.
    #[error("`{uri}` is not an absolute URI")]
    InvalidUri {
        /// The rejected value.
        uri: String,
    },

    /// No proof on the document matched the expected purpose, context,
    /// and held suites.
    #[error("no proof matched the expected purpose and context")]
    NoMatchingProof,

    /// The invocation proof's `capabilityAction` was missing or empty.
    #[error("the invocation proof must carry a non-empty `capabilityAction`")]
    MissingCapabilityAction,

    /// A document could not be interpreted as the expected shape.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// The verifier was not configured with a required expectation.
    #[error("verifier configuration is missing {0}")]
    MissingExpectation(&'static str),

    // -- chain structure -----------------------------------------------

    /// A delegation proof carried an empty `capabilityChain`.
    #[error("the capability chain is empty")]
    EmptyChain,

    /// The dereferenced chain would exceed the configured bound.
    #[error("the capability chain is too long: {length} exceeds the maximum of {max}")]
    ChainTooLong {
        /// Dereferenced length, root included.
        length: usize,
        /// The configured maximum.
        max: usize,
    },

    /// The same capability appeared twice in one chain.
    #[error("the capability chain contains `{id}` more than once")]
    CircularChain {
        /// The repeated capability `id`.
        id: String,
    },

    /// The chain's claimed root is not in the expected-root set.
    #[error("`{id}` is not an expected root capability")]
    UnexpectedRootCapability {
        /// The claimed root `id`.
        id: String,
    },

    /// A capability's `parentCapability` does not name its chain
    /// predecessor.
    #[error(
        "capability `{id}` names `{found}` as its parent, but the chain provides `{expected}`"
    )]
    ParentMismatch {
        /// The child capability's `id`.
        id: String,
        /// The predecessor provided by the chain.
        expected: String,
        /// The `parentCapability` value found.
        found: String,
    },

    /// A `capabilityChain` entry had the wrong shape for its position.
    #[error("capability chain entry {index} must be {expected}")]
    InvalidChainEntry {
        /// Zero-based entry position.
        index: usize,
        /// What the position requires.
        expected: &'static str,
    },

    /// A capability's declared chain disagrees with its dereferenced
    /// ancestry.
    #[error("the capability chain declared by `{id}` does not match its dereferenced ancestry")]
    DeclaredChainMismatch {
        /// The declaring capability's `id`.
        id: String,
    },

    // -- cryptographic -------------------------------------------------

    /// A document or verification method could not be dereferenced.
    #[error("failed to load `{url}`: {source}")]
    DocumentLoader {
        /// The URL that failed to load.
        url: String,
        /// The loader's error.
        #[source]
        source: LoaderError,
    },

    /// A proof failed cryptographic verification.
    #[error("the proof on `{id}` failed cryptographic verification: {source}")]
    SignatureVerification {
        /// Identifier of the signed document.
        id: String,
        /// The suite's error.
        #[source]
        source: SuiteError,
    },

    /// A suite-level dispatch failure (unsupported proof type or method).
    #[error(transparent)]
    Suite(#[from] SuiteError),

    // -- identity ------------------------------------------------------

    /// A delegation proof's key does not speak for the parent
    /// capability's controller.
    ///
    /// `capability` and `verification_method` are attached as details;
    /// callers may strip them to avoid correlation leakage.
    #[error("the delegator of capability `{capability}` is not the parent capability's controller")]
    DelegatorNotController {
        /// The delegated capability's `id`.
        capability: String,
        /// The key that made the proof.
        verification_method: String,
    },

    /// The invocation proof's key does not speak for the invoked
    /// capability's controller.
    #[error("the invoker is not the controller of capability `{capability}`")]
    InvokerNotController {
        /// The invoked capability's `id`.
        capability: String,
        /// The key that made the proof.
        verification_method: String,
    },

    // -- semantic ------------------------------------------------------

    /// A capability in the chain is past its `expires` time.
    #[error("a capability in the delegation chain has expired")]
    Expired,

    /// A delegated capability expires after its parent.
    #[error("a delegated capability must not expire after its parent")]
    ExpiresAfterParent,

    /// A delegated capability widens its parent's allowed actions.
    #[error(
        "the `allowedAction` in a delegated capability must be equivalent to or more \
         restrictive than its parent capability's"
    )]
    ActionNotAttenuated,

    /// Child target differs from the parent target.
    #[error(
        "the `invocationTarget` in a delegated capability must be equivalent to its \
         parent capability's"
    )]
    TargetNotEquivalent {
        /// The parent's target.
        parent: String,
        /// The child's target.
        child: String,
    },

    /// Child target is neither the parent target nor a path under it.
    #[error(
        "the `invocationTarget` in a delegated capability must be equivalent to its \
         parent capability's, or a path under it"
    )]
    TargetNotAttenuated {
        /// The parent's target.
        parent: String,
        /// The child's target.
        child: String,
    },

    /// A delegation proof was created before its parent's.
    #[error("a capability in the delegation chain was delegated before its parent")]
    DelegatedBeforeParent,

    /// A delegation proof's `created` lies in the future.
    #[error("a capability in the delegation chain was delegated in the future")]
    DelegatedInFuture,

    /// A capability's validity window exceeds the delegation TTL bound.
    #[error("a capability in the delegation chain has a time to live that is too long")]
    DelegationTtlExceeded,

    /// The invocation proof's `created` is outside the allowed window.
    #[error("the invocation proof's `created` timestamp is outside the allowed window")]
    TimestampOutOfRange,

    /// The invoked action is not the one the verifier expects.
    #[error("the action `{action}` does not match the expected action `{expected}`")]
    UnexpectedAction {
        /// The verifier's expected action.
        expected: String,
        /// The action found on the proof.
        action: String,
    },

    /// The invoked action is not allowed by the capability.
    #[error("the capability does not allow the action `{action}`")]
    ProhibitedAction {
        /// The rejected action.
        action: String,
    },

    /// The invoked target is not in the verifier's expected set.
    #[error("`{target}` is not an expected invocation target")]
    UnexpectedTarget {
        /// The rejected target.
        target: String,
    },

    /// The invoked target is not covered by the capability's target.
    #[error("the invoked target `{invoked}` is not covered by the capability's target `{capability}`")]
    TargetNotCovered {
        /// The capability's target.
        capability: String,
        /// The target named by the invocation proof.
        invoked: String,
    },

    // -- hook-driven ---------------------------------------------------

    /// The chain inspection hook (e.g. a revocation check) rejected the
    /// chain.
    #[error("the capability chain was rejected: {0}")]
    Inspection(String),

    // -- cancellation --------------------------------------------------

    /// Verification was cancelled by the caller's signal.
    #[error("verification was cancelled")]
    Cancelled,
}

/// Coarse classification of a [`VerificationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing fields, wrong shapes, wrong purposes, wrong contexts.
    Structural,
    /// Chain too long, cyclic, unexpected root, linkage mismatches.
    ChainStructure,
    /// Signature or key resolution failures.
    Cryptographic,
    /// Controller identity mismatches.
    Identity,
    /// Attenuation, expiration, ordering, and TTL violations.
    Semantic,
    /// The inspection hook reported the chain invalid.
    Hook,
    /// The caller's cancellation signal fired.
    Cancelled,
}

impl VerificationError {
    /// The taxonomy this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        use VerificationError::*;
        match self {
            MissingField { .. }
            | MissingProofField { .. }
            | RootWithParent { .. }
            | RootWithExpires { .. }
            | DelegationProofCount { .. }
            | InvalidAllowedAction { .. }
            | InvalidUri { .. }
            | NoMatchingProof
            | MissingCapabilityAction
            | MalformedDocument(_)
            | MissingExpectation(_) => ErrorKind::Structural,

            EmptyChain
            | ChainTooLong { .. }
            | CircularChain { .. }
            | UnexpectedRootCapability { .. }
            | ParentMismatch { .. }
            | InvalidChainEntry { .. }
            | DeclaredChainMismatch { .. } => ErrorKind::ChainStructure,

            DocumentLoader { .. } | SignatureVerification { .. } | Suite(_) => {
                ErrorKind::Cryptographic
            }

            DelegatorNotController { .. } | InvokerNotController { .. } => ErrorKind::Identity,

            Expired
            | ExpiresAfterParent
            | ActionNotAttenuated
            | TargetNotEquivalent { .. }
            | TargetNotAttenuated { .. }
            | DelegatedBeforeParent
            | DelegatedInFuture
            | DelegationTtlExceeded
            | TimestampOutOfRange
            | UnexpectedAction { .. }
            | ProhibitedAction { .. }
            | UnexpectedTarget { .. }
            | TargetNotCovered { .. } => ErrorKind::Semantic,

            Inspection(_) => ErrorKind::Hook,

            Cancelled => ErrorKind::Cancelled,
        }
    }
}
