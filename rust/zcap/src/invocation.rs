//! The capability invocation proof purpose.
//!
//! The top-level entry point for verifying that a document's invocation
//! proof is backed by a valid capability chain and that the invocation
//! stays inside what the verifier expects: the action, the target, and the
//! set of trusted roots.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zcap_suite::{ProofSuite, SuiteError, canonical::signing_payload};

use crate::{
    DEFAULT_MAX_CLOCK_SKEW, MAX_CHAIN_LENGTH, ZCAP_CONTEXT_URL,
    capability::{Capability, Context},
    chain::{ChainContext, ChainInspector, ChainMeta},
    dereference::{RootResolver, dereference_capability_chain},
    error::VerificationError,
    loader::DocumentLoader,
    proof::{ChainEntry, extract_invocation_proofs},
};

/// The outcome of verifying an invocation.
#[derive(Debug, Clone)]
pub struct VerifiedInvocation {
    /// The identity that invoked: the controller of the verifying key.
    pub invoker: String,

    /// The invoked capability's `id` (the chain's tail).
    pub capability: String,

    /// The action that was invoked.
    pub capability_action: String,

    /// The target that was acted on.
    pub invocation_target: String,

    /// The key that made the invocation proof.
    pub verification_method: String,

    /// The full chain, root first, tail last.
    pub dereferenced_chain: Vec<Capability>,

    /// One verification record per delegated capability.
    pub chain_meta: Vec<ChainMeta>,
}

/// Verifies capability invocations embedded in arbitrary JSON documents.
pub struct InvocationVerifier {
    loader: Arc<dyn DocumentLoader>,
    suites: Vec<Arc<dyn ProofSuite>>,
    expected_action: Option<String>,
    expected_target: Vec<String>,
    expected_root_capability: Vec<String>,
    date: Option<DateTime<Utc>>,
    max_clock_skew: u64,
    max_chain_length: usize,
    max_delegation_ttl: Option<i64>,
    allow_target_attenuation: bool,
    max_timestamp_delta: Option<i64>,
    inspector: Option<Arc<dyn ChainInspector>>,
    cancel: CancellationToken,
}

impl InvocationVerifier {
    /// Create a verifier with one suite and the default bounds.
    #[must_use]
    pub fn new(loader: Arc<dyn DocumentLoader>, suite: Arc<dyn ProofSuite>) -> Self {
        Self {
            loader,
            suites: vec![suite],
            expected_action: None,
            expected_target: Vec::new(),
            expected_root_capability: Vec::new(),
            date: None,
            max_clock_skew: DEFAULT_MAX_CLOCK_SKEW,
            max_chain_length: MAX_CHAIN_LENGTH,
            max_delegation_ttl: None,
            allow_target_attenuation: false,
            max_timestamp_delta: None,
            inspector: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Add another proof suite.
    #[must_use]
    pub fn suite(mut self, suite: Arc<dyn ProofSuite>) -> Self {
        self.suites.push(suite);
        self
    }

    /// The single action name the invocation must carry. Required.
    #[must_use]
    pub fn expect_action(mut self, action: impl Into<String>) -> Self {
        self.expected_action = Some(action.into());
        self
    }

    /// Add an acceptable invocation target. At least one is required.
    #[must_use]
    pub fn expect_target(mut self, target: impl Into<String>) -> Self {
        self.expected_target.push(target.into());
        self
    }

    /// Add an expected root capability ID. At least one is required.
    #[must_use]
    pub fn expect_root(mut self, id: impl Into<String>) -> Self {
        self.expected_root_capability.push(id.into());
        self
    }

    /// Fix the verification date (for deterministic verification); the
    /// system clock is used otherwise.
    #[must_use]
    pub fn at_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Clock-skew tolerance in seconds for live-clock comparisons.
    #[must_use]
    pub fn max_clock_skew(mut self, seconds: u64) -> Self {
        self.max_clock_skew = seconds;
        self
    }

    /// Maximum dereferenced chain length, root included.
    #[must_use]
    pub fn max_chain_length(mut self, length: usize) -> Self {
        self.max_chain_length = length;
        self
    }

    /// Bound every delegation's time to live, in milliseconds.
    #[must_use]
    pub fn max_delegation_ttl(mut self, millis: i64) -> Self {
        self.max_delegation_ttl = Some(millis);
        self
    }

    /// Permit targets to narrow to paths under the parent's along the
    /// chain and at invocation.
    #[must_use]
    pub fn allow_target_attenuation(mut self, allow: bool) -> Self {
        self.allow_target_attenuation = allow;
        self
    }

    /// Bound how far the invocation proof's `created` may drift from the
    /// verification date, in seconds.
    #[must_use]
    pub fn max_timestamp_delta(mut self, seconds: i64) -> Self {
        self.max_timestamp_delta = Some(seconds);
        self
    }

    /// Run a hook over the verified chain (e.g. a revocation check). An
    /// invalid result is fatal.
    #[must_use]
    pub fn inspect_capability_chain(mut self, inspector: Arc<dyn ChainInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    /// Attach a cancellation signal; verification stops at the next
    /// suspension point once it fires.
    #[must_use]
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Verify the invocation proof on `document`.
    ///
    /// # Errors
    ///
    /// Returns the [`VerificationError`] for the first violated rule; see
    /// [`crate::ErrorKind`] for the taxonomy.
    pub async fn verify(
        &self,
        document: &serde_json::Value,
    ) -> Result<VerifiedInvocation, VerificationError> {
        let expected_action = self
            .expected_action
            .as_deref()
            .ok_or(VerificationError::MissingExpectation("an expected action"))?;
        if self.expected_target.is_empty() {
            return Err(VerificationError::MissingExpectation(
                "an expected invocation target",
            ));
        }
        if self.expected_root_capability.is_empty() {
            return Err(VerificationError::MissingExpectation(
                "an expected root capability",
            ));
        }

        let ctx = ChainContext {
            suites: &self.suites,
            loader: self.loader.as_ref(),
            date: self.date.unwrap_or_else(Utc::now),
            max_clock_skew: self.max_clock_skew,
            max_delegation_ttl: self.max_delegation_ttl,
            allow_target_attenuation: self.allow_target_attenuation,
            cancel: &self.cancel,
        };
        ctx.ensure_live()?;

        // A proof only matches when the document and the proof both admit
        // ZCAP terms and the proof carries the invocation purpose.
        let document_matches = document
            .get("@context")
            .and_then(|value| serde_json::from_value::<Context>(value.clone()).ok())
            .is_some_and(|context| context.includes(ZCAP_CONTEXT_URL));
        let proof = extract_invocation_proofs(document)
            .into_iter()
            .find(|proof| proof.matches_context());
        let Some(proof) = proof.filter(|_| document_matches) else {
            return Err(VerificationError::NoMatchingProof);
        };

        // Base-level cryptographic verification of the invocation proof.
        let document_id = document
            .get("id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&proof.verification_method)
            .to_string();
        let suite = ctx.suite_for(&proof.proof_type)?;
        let method = ctx.resolve_method(&proof.verification_method).await?;
        if !suite.supports_method(&method) {
            return Err(VerificationError::SignatureVerification {
                id: document_id,
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
        let payload = signing_payload(document, &proof.to_value()?);
        ctx.ensure_live()?;
        suite
            .verify(&payload, &method, proof_value)
            .await
            .map_err(|source| VerificationError::SignatureVerification {
                id: document_id,
                source,
            })?;

        // Bound the proof's age when the caller asked for it.
        if let Some(delta) = self.max_timestamp_delta {
            let drift = proof
                .created
                .timestamp_millis()
                .saturating_sub(ctx.date.timestamp_millis())
                .abs();
            let allowance = delta
                .saturating_mul(1000)
                .saturating_add(i64::try_from(self.max_clock_skew).unwrap_or(0) * 1000);
            if drift > allowance {
                return Err(VerificationError::TimestampOutOfRange);
            }
        }

        // The invoked action and target must be the expected ones.
        let action = proof
            .capability_action
            .as_deref()
            .filter(|action| !action.is_empty())
            .ok_or(VerificationError::MissingCapabilityAction)?;
        if action != expected_action {
            return Err(VerificationError::UnexpectedAction {
                expected: expected_action.to_string(),
                action: action.to_string(),
            });
        }
        let invoked_target =
            proof
                .invocation_target
                .as_deref()
                .ok_or(VerificationError::MissingProofField {
                    field: "invocationTarget",
                })?;
        if !self.expected_target.iter().any(|t| t == invoked_target) {
            return Err(VerificationError::UnexpectedTarget {
                target: invoked_target.to_string(),
            });
        }

        // Resolve the tail: a root invoked by ID, or the embedded
        // delegated capability.
        let roots = RootResolver::new(&self.expected_root_capability, self.loader.as_ref());
        let tail: Capability = match &proof.capability {
            ChainEntry::Id(id) => roots.resolve(id).await?,
            ChainEntry::Capability(capability) => (**capability).clone(),
        };
        if !tail.has_zcap_context() {
            return Err(VerificationError::NoMatchingProof);
        }

        // The invoked target must be the tail's, or a path under it when
        // attenuation is allowed.
        let tail_target =
            tail.invocation_target
                .as_deref()
                .ok_or_else(|| VerificationError::MissingField {
                    id: tail.id.clone(),
                    field: "invocationTarget",
                })?;
        if invoked_target != tail_target {
            let attenuated = self.allow_target_attenuation
                && invoked_target.starts_with(&format!("{tail_target}/"));
            if !attenuated {
                return Err(VerificationError::TargetNotCovered {
                    capability: tail_target.to_string(),
                    invoked: invoked_target.to_string(),
                });
            }
        }

        // And the action must be one the tail allows.
        if let Some(allowed) = &tail.allowed_action {
            if !allowed.allows(action) {
                return Err(VerificationError::ProhibitedAction {
                    action: action.to_string(),
                });
            }
        }

        ctx.ensure_live()?;
        let chain = dereference_capability_chain(&tail, &roots, self.max_chain_length).await?;
        let mut meta = Vec::new();
        ctx.verify_chain(&chain, &mut meta).await?;

        // The invoker must be the tail's controller: the verifying key is
        // that controller, or is controlled by it.
        let controller =
            tail.controller
                .as_deref()
                .ok_or_else(|| VerificationError::MissingField {
                    id: tail.id.clone(),
                    field: "controller",
                })?;
        if !method.speaks_for(controller) {
            return Err(VerificationError::InvokerNotController {
                capability: tail.id.clone(),
                verification_method: method.id.clone(),
            });
        }

        if let Some(inspector) = &self.inspector {
            ctx.ensure_live()?;
            let outcome = inspector.inspect(&chain, &meta).await;
            if !outcome.valid {
                return Err(VerificationError::Inspection(
                    outcome
                        .error
                        .unwrap_or_else(|| "capability chain rejected".to_string()),
                ));
            }
        }

        debug!(
            capability = %tail.id,
            invoker = %method.acting_party(),
            action,
            "invocation verified"
        );
        Ok(VerifiedInvocation {
            invoker: method.acting_party().to_string(),
            capability: tail.id.clone(),
            capability_action: action.to_string(),
            invocation_target: invoked_target.to_string(),
            verification_method: method.id.clone(),
            dereferenced_chain: chain,
            chain_meta: meta,
        })
    }
}
