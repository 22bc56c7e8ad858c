//! The capability delegation proof purpose.
//!
//! Verifies a chain terminating at a freshly delegated, not yet invoked
//! capability: the document bearing the proof is the tail, its own
//! delegation proof is the chain's last proof.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use zcap_suite::ProofSuite;

use crate::{
    DEFAULT_MAX_CLOCK_SKEW, MAX_CHAIN_LENGTH,
    capability::{Capability, check_capability},
    chain::{ChainContext, ChainMeta},
    dereference::{RootResolver, dereference_capability_chain},
    error::VerificationError,
    loader::DocumentLoader,
};

/// Purpose state for validating one delegation proof from inside a chain
/// walk.
///
/// The two proof purposes are mutually recursive by nature: invocation
/// verification validates every delegation proof in the chain, and a
/// delegation proof's full validation would re-verify the chain segment it
/// belongs to. Carrying the already-verified parent here breaks that
/// recursion — validation against this state stops after the signature and
/// the controller-equals-delegator identity check.
pub(crate) struct DelegationPurpose<'a> {
    /// The chain predecessor, verified by the walk that got here.
    pub verified_parent_capability: &'a Capability,
}

/// The outcome of verifying a delegation.
#[derive(Debug, Clone)]
pub struct VerifiedDelegation {
    /// The delegated capability's `id`.
    pub capability: String,

    /// The identity that made the delegation (the parent's controller).
    pub delegator: String,

    /// The full chain, root first, tail last.
    pub dereferenced_chain: Vec<Capability>,

    /// One verification record per delegated capability.
    pub chain_meta: Vec<ChainMeta>,
}

/// Verifies capability delegations: a signed capability whose chain must
/// hold root-to-tail.
pub struct DelegationVerifier {
    loader: Arc<dyn DocumentLoader>,
    suites: Vec<Arc<dyn ProofSuite>>,
    expected_root_capability: Vec<String>,
    date: Option<DateTime<Utc>>,
    max_clock_skew: u64,
    max_chain_length: usize,
    max_delegation_ttl: Option<i64>,
    allow_target_attenuation: bool,
    cancel: CancellationToken,
}

impl DelegationVerifier {
    /// Create a verifier with one suite and the default bounds.
    #[must_use]
    pub fn new(loader: Arc<dyn DocumentLoader>, suite: Arc<dyn ProofSuite>) -> Self {
        Self {
            loader,
            suites: vec![suite],
            expected_root_capability: Vec::new(),
            date: None,
            max_clock_skew: DEFAULT_MAX_CLOCK_SKEW,
            max_chain_length: MAX_CHAIN_LENGTH,
            max_delegation_ttl: None,
            allow_target_attenuation: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Add another proof suite.
    #[must_use]
    pub fn suite(mut self, suite: Arc<dyn ProofSuite>) -> Self {
        self.suites.push(suite);
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

    /// Permit delegations to narrow the invocation target to paths under
    /// the parent's.
    #[must_use]
    pub fn allow_target_attenuation(mut self, allow: bool) -> Self {
        self.allow_target_attenuation = allow;
        self
    }

    /// Attach a cancellation signal; verification stops at the next
    /// suspension point once it fires.
    #[must_use]
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Verify `capability` and the chain behind it.
    ///
    /// # Errors
    ///
    /// Returns the [`VerificationError`] for the first violated rule; see
    /// [`crate::ErrorKind`] for the taxonomy.
    pub async fn verify(
        &self,
        capability: &Capability,
    ) -> Result<VerifiedDelegation, VerificationError> {
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

        if !capability.has_zcap_context() {
            return Err(VerificationError::NoMatchingProof);
        }
        check_capability(capability, false)?;
        if !capability.delegation_proof()?.matches_context() {
            return Err(VerificationError::NoMatchingProof);
        }

        let roots = RootResolver::new(&self.expected_root_capability, self.loader.as_ref());
        ctx.ensure_live()?;
        let chain =
            dereference_capability_chain(capability, &roots, self.max_chain_length).await?;

        // The tail is delegated, so its parent is in the chain.
        let parent = &chain[chain.len() - 2];
        let delegator = parent
            .controller
            .clone()
            .ok_or_else(|| VerificationError::MissingField {
                id: parent.id.clone(),
                field: "controller",
            })?;

        // Base-level verification of the tail's own proof, seeded into the
        // chain meta so the walk below does not verify it twice.
        let purpose = DelegationPurpose {
            verified_parent_capability: parent,
        };
        let tail_meta = ctx.verify_delegation_proof(capability, &purpose).await?;
        let mut meta = vec![tail_meta];

        ctx.verify_chain(&chain, &mut meta).await?;

        debug!(capability = %capability.id, delegator = %delegator, "delegation verified");
        Ok(VerifiedDelegation {
            capability: capability.id.clone(),
            delegator,
            dereferenced_chain: chain,
            chain_meta: meta,
        })
    }
}
