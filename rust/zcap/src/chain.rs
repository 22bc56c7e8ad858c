//! Delegation chain verification.
//!
//! The walk runs root→tail and carries four parent-derived values: the
//! parent's allowed actions, expiration, delegation time, and invocation
//! target. Each delegated capability is checked against them — signature
//! first, then attenuation, then the temporal invariants — before the
//! values advance. The walk is never reordered; each capability's checks
//! depend on everything accumulated before it.

use std::{cmp::Ordering, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use zcap_suite::{ProofSuite, SuiteError, VerificationMethod, canonical::signing_payload};

use crate::{
    capability::{AllowedAction, Capability},
    delegation::DelegationPurpose,
    error::VerificationError,
    loader::DocumentLoader,
    time::{compare_millis, compare_time},
};

/// The verification record for one delegated capability in a chain.
#[derive(Debug, Clone)]
pub struct ChainMeta {
    /// The delegated capability's `id`.
    pub capability: String,
    /// The key that made its delegation proof.
    pub verification_method: String,
    /// Whether the proof verified cryptographically.
    pub verified: bool,
}

/// Outcome of a [`ChainInspector`] run.
#[derive(Debug, Clone, Default)]
pub struct ChainInspection {
    /// Whether the chain may be used.
    pub valid: bool,
    /// Why not, when it may not.
    pub error: Option<String>,
}

impl ChainInspection {
    /// A passing inspection.
    #[must_use]
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    /// A failing inspection with a reason.
    #[must_use]
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

/// A hook run over the dereferenced chain after it verifies, typically
/// backed by a revocation store. An invalid result is fatal to the
/// verification.
#[async_trait]
pub trait ChainInspector: Send + Sync {
    /// Inspect a verified chain.
    async fn inspect(&self, chain: &[Capability], meta: &[ChainMeta]) -> ChainInspection;
}

/// Everything the chain walk needs from its caller: the injected
/// collaborators and the configured bounds.
pub(crate) struct ChainContext<'a> {
    pub suites: &'a [Arc<dyn ProofSuite>],
    pub loader: &'a dyn DocumentLoader,
    pub date: DateTime<Utc>,
    pub max_clock_skew: u64,
    /// Milliseconds; `None` means unbounded.
    pub max_delegation_ttl: Option<i64>,
    pub allow_target_attenuation: bool,
    pub cancel: &'a CancellationToken,
}

impl ChainContext<'_> {
    /// Fail fast once the caller's cancellation signal fires; called
    /// before every suspension point so no further I/O happens after
    /// cancellation.
    pub(crate) fn ensure_live(&self) -> Result<(), VerificationError> {
        if self.cancel.is_cancelled() {
            return Err(VerificationError::Cancelled);
        }
        Ok(())
    }

    /// The held suite matching a proof `type`.
    pub(crate) fn suite_for(&self, proof_type: &str) -> Result<&dyn ProofSuite, VerificationError> {
        self.suites
            .iter()
            .find(|suite| suite.proof_type() == proof_type)
            .map(|suite| suite.as_ref())
            .ok_or_else(|| {
                VerificationError::Suite(SuiteError::UnsupportedProofType(proof_type.to_string()))
            })
    }

    /// Dereference a proof's `verificationMethod` into key material.
    pub(crate) async fn resolve_method(
        &self,
        url: &str,
    ) -> Result<VerificationMethod, VerificationError> {
        self.ensure_live()?;
        let loaded = self.loader.load(url).await.map_err(|source| {
            VerificationError::DocumentLoader {
                url: url.to_string(),
                source,
            }
        })?;
        serde_json::from_value(loaded.document).map_err(|e| {
            VerificationError::MalformedDocument(format!("verification method `{url}`: {e}"))
        })
    }

    /// Verify the delegation proof on `capability` under a purpose whose
    /// parent is already verified: cryptographic verification plus the
    /// controller-equals-delegator identity check, nothing more. The full
    /// chain semantics live in [`verify_chain`]; this is the short
    /// circuit that keeps the two proof purposes from recursing.
    pub(crate) async fn verify_delegation_proof(
        &self,
        capability: &Capability,
        purpose: &DelegationPurpose<'_>,
    ) -> Result<ChainMeta, VerificationError> {
        let parent = purpose.verified_parent_capability;
        let proof = capability.delegation_proof()?;

        let suite = self.suite_for(&proof.proof_type)?;
        let method = self.resolve_method(&proof.verification_method).await?;
        if !suite.supports_method(&method) {
            return Err(VerificationError::SignatureVerification {
                id: capability.id.clone(),
                source: SuiteError::UnsupportedMethod {
                    suite: suite.proof_type(),
                    found: method.method_type.clone(),
                },
            });
        }

        let proof_value = proof
            .proof_value
            .as_deref()
            .ok_or(VerificationError::MissingProofField {
                field: "proofValue",
            })?;
        let payload = signing_payload(&capability.to_value()?, &proof.to_value()?);

        self.ensure_live()?;
        suite
            .verify(&payload, &method, proof_value)
            .await
            .map_err(|source| VerificationError::SignatureVerification {
                id: capability.id.clone(),
                source,
            })?;

        // The key must speak for the parent's controller: it is the
        // controller itself, or the controller controls it.
        let parent_controller =
            parent
                .controller
                .as_deref()
                .ok_or_else(|| VerificationError::MissingField {
                    id: parent.id.clone(),
                    field: "controller",
                })?;
        if !method.speaks_for(parent_controller) {
            return Err(VerificationError::DelegatorNotController {
                capability: capability.id.clone(),
                verification_method: method.id,
            });
        }

        trace!(capability = %capability.id, method = %method.id, "delegation proof verified");
        Ok(ChainMeta {
            capability: capability.id.clone(),
            verification_method: method.id,
            verified: true,
        })
    }

    /// Verify a dereferenced chain root→tail, appending one [`ChainMeta`]
    /// entry per delegated capability whose proof was not already
    /// verified into `meta`.
    pub(crate) async fn verify_chain(
        &self,
        chain: &[Capability],
        meta: &mut Vec<ChainMeta>,
    ) -> Result<(), VerificationError> {
        // A chain of one is the root alone; the caller anchored it.
        if chain.len() <= 1 {
            return Ok(());
        }

        let root = &chain[0];
        debug!(root = %root.id, length = chain.len(), "verifying capability chain");

        let mut parent = root;
        let mut parent_allowed_action = root.allowed_action.as_ref();
        let mut parent_expires: Option<DateTime<Utc>> = None;
        let mut parent_delegated_at: Option<DateTime<Utc>> = None;
        let mut parent_target =
            root.invocation_target
                .as_deref()
                .ok_or_else(|| VerificationError::MissingField {
                    id: root.id.clone(),
                    field: "invocationTarget",
                })?;

        for capability in &chain[1..] {
            let proof = capability.delegation_proof()?;

            // Every capability and proof in the chain must admit ZCAP
            // terms for its proof to match.
            if !capability.has_zcap_context() || !proof.matches_context() {
                return Err(VerificationError::NoMatchingProof);
            }

            // Cryptographic verification, unless this slot already holds
            // a verify result (the tail's proof when the delegation
            // adapter verified it at base level).
            let already_verified = meta
                .iter()
                .any(|entry| entry.capability == capability.id && entry.verified);
            if !already_verified {
                let purpose = DelegationPurpose {
                    verified_parent_capability: parent,
                };
                let entry = self.verify_delegation_proof(capability, &purpose).await?;
                meta.push(entry);
            }

            // Action attenuation.
            if !AllowedAction::attenuates(capability.allowed_action.as_ref(), parent_allowed_action)
            {
                return Err(VerificationError::ActionNotAttenuated);
            }

            // Target attenuation.
            let target = capability.invocation_target.as_deref().ok_or_else(|| {
                VerificationError::MissingField {
                    id: capability.id.clone(),
                    field: "invocationTarget",
                }
            })?;
            if target != parent_target {
                if !self.allow_target_attenuation {
                    return Err(VerificationError::TargetNotEquivalent {
                        parent: parent_target.to_string(),
                        child: target.to_string(),
                    });
                }
                if !target.starts_with(&format!("{parent_target}/")) {
                    return Err(VerificationError::TargetNotAttenuated {
                        parent: parent_target.to_string(),
                        child: target.to_string(),
                    });
                }
            }

            // Expiration. Both instants are embedded in the chain, so the
            // parent-child ordering is strict; only the live-clock check
            // tolerates skew.
            let expires =
                capability
                    .expires
                    .ok_or_else(|| VerificationError::MissingField {
                        id: capability.id.clone(),
                        field: "expires",
                    })?;
            if let Some(parent_expires) = parent_expires {
                if expires > parent_expires {
                    return Err(VerificationError::ExpiresAfterParent);
                }
            }
            if compare_time(self.date, expires, self.max_clock_skew) == Ordering::Greater {
                return Err(VerificationError::Expired);
            }

            // Delegation-time monotonicity, again embedded-vs-embedded.
            let delegated_at = proof.created;
            if let Some(parent_delegated_at) = parent_delegated_at {
                if parent_delegated_at > delegated_at {
                    return Err(VerificationError::DelegatedBeforeParent);
                }
            }

            // Time-to-live bound.
            if let Some(max_ttl) = self.max_delegation_ttl {
                if compare_time(delegated_at, self.date, self.max_clock_skew) == Ordering::Greater {
                    return Err(VerificationError::DelegatedInFuture);
                }
                let current_ttl = expires.timestamp_millis() - self.date.timestamp_millis();
                let widest_ttl = expires.timestamp_millis() - delegated_at.timestamp_millis();
                if compare_millis(current_ttl, max_ttl, self.max_clock_skew) == Ordering::Greater
                    || widest_ttl > max_ttl
                {
                    return Err(VerificationError::DelegationTtlExceeded);
                }
            }

            parent = capability;
            parent_allowed_action = capability.allowed_action.as_ref();
            parent_expires = Some(expires);
            parent_delegated_at = Some(delegated_at);
            parent_target = target;
        }

        Ok(())
    }
}
