//! Proof creation.
//!
//! [`DelegationBuilder`] signs a new delegated capability, computing its
//! `capabilityChain` from the parent's and refusing to sign anything the
//! chain verifier would later reject. [`InvocationBuilder`] attaches a
//! signed invocation proof to an arbitrary JSON document.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use zcap_suite::{Signer, SuiteError, canonical::signing_payload};

use crate::{
    PROOF_PURPOSE_DELEGATION, PROOF_PURPOSE_INVOCATION,
    capability::{AllowedAction, Capability, Context, check_capability},
    error::VerificationError,
    proof::{ChainEntry, DelegationProof, InvocationProof, Proofs},
};

/// Errors raised while building and signing proofs.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A delegated capability needs a parent.
    #[error("a delegated capability requires a parent capability")]
    MissingParent,

    /// Nothing to sign with.
    #[error("a signer is required")]
    MissingSigner,

    /// A required builder field was not set.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// Every delegated capability must expire.
    #[error("a delegated capability requires an `expires` time")]
    MissingExpires,

    /// The proof would postdate the capability's expiration.
    #[error("the delegation proof cannot be created after the capability expires")]
    CreatedAfterExpires,

    /// The new capability would widen the parent's allowed actions.
    #[error("`allowedAction` must be equivalent to or more restrictive than the parent's")]
    ActionNotAttenuated,

    /// The new capability would outlive its parent.
    #[error("a delegated capability must not expire after its parent")]
    ExpiresAfterParent,

    /// The proof would predate the parent's delegation.
    #[error("a capability cannot be delegated before its parent")]
    DelegatedBeforeParent,

    /// The assembled capability failed its model check.
    #[error(transparent)]
    Model(#[from] VerificationError),

    /// The signer refused.
    #[error(transparent)]
    Signing(#[from] SuiteError),
}

/// Builds and signs a delegated capability.
#[derive(Default)]
pub struct DelegationBuilder {
    id: Option<String>,
    controller: Option<String>,
    invocation_target: Option<String>,
    allowed_action: Option<AllowedAction>,
    expires: Option<DateTime<Utc>>,
    created: Option<DateTime<Utc>>,
    parent: Option<Capability>,
    signer: Option<Arc<dyn Signer>>,
}

impl DelegationBuilder {
    /// A blank builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The new capability's `id` (an absolute URI). Required.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Who may invoke or further delegate the new capability. Required.
    #[must_use]
    pub fn controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = Some(controller.into());
        self
    }

    /// The capability being delegated from. Required.
    #[must_use]
    pub fn parent(mut self, parent: &Capability) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// The new capability's target; defaults to the parent's.
    #[must_use]
    pub fn invocation_target(mut self, target: impl Into<String>) -> Self {
        self.invocation_target = Some(target.into());
        self
    }

    /// Restrict the actions the new capability permits; defaults to the
    /// parent's restriction.
    #[must_use]
    pub fn allowed_action(mut self, allowed: AllowedAction) -> Self {
        self.allowed_action = Some(allowed);
        self
    }

    /// When the new capability expires. Required.
    #[must_use]
    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// When the delegation is made; defaults to now.
    #[must_use]
    pub fn created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    /// The key that signs the delegation. Must belong to the parent's
    /// controller for the result to verify. Required.
    #[must_use]
    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Run the pre-sign checks, sign, and return the delegated capability
    /// with its proof embedded.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when a required field is missing, a
    /// pre-sign check fails, or signing fails.
    pub async fn try_sign(self) -> Result<Capability, BuildError> {
        let parent = self.parent.ok_or(BuildError::MissingParent)?;
        let signer = self.signer.ok_or(BuildError::MissingSigner)?;
        let id = self.id.ok_or(BuildError::MissingField("id"))?;
        let controller = self.controller.ok_or(BuildError::MissingField("controller"))?;
        let expires = self.expires.ok_or(BuildError::MissingExpires)?;
        let created = self.created.unwrap_or_else(Utc::now);
        let invocation_target = self
            .invocation_target
            .or_else(|| parent.invocation_target.clone())
            .ok_or(BuildError::MissingField("invocationTarget"))?;
        let allowed_action = self
            .allowed_action
            .or_else(|| parent.allowed_action.clone());

        if created > expires {
            return Err(BuildError::CreatedAfterExpires);
        }
        if !AllowedAction::attenuates(allowed_action.as_ref(), parent.allowed_action.as_ref()) {
            return Err(BuildError::ActionNotAttenuated);
        }
        if let Some(parent_expires) = parent.expires {
            if expires > parent_expires {
                return Err(BuildError::ExpiresAfterParent);
            }
        }
        if !parent.is_root() && parent.delegation_proof()?.created > created {
            return Err(BuildError::DelegatedBeforeParent);
        }

        // The new chain: the parent's chain with every entry by ID, then
        // the parent itself — embedded when delegated, by ID when root.
        let capability_chain = if parent.is_root() {
            vec![ChainEntry::Id(parent.id.clone())]
        } else {
            let mut entries: Vec<ChainEntry> = parent
                .delegation_proof()?
                .capability_chain
                .iter()
                .flatten()
                .map(|entry| ChainEntry::Id(entry.id().to_string()))
                .collect();
            entries.push(ChainEntry::Capability(Box::new(parent.clone())));
            entries
        };

        let mut capability = Capability {
            context: Context::zcap(),
            id,
            controller: Some(controller),
            invocation_target: Some(invocation_target),
            parent_capability: Some(parent.id.clone()),
            allowed_action,
            expires: Some(expires),
            proof: None,
        };

        let mut proof = DelegationProof {
            context: None,
            proof_type: signer.proof_type().to_string(),
            created,
            verification_method: signer.verification_method().to_string(),
            proof_purpose: PROOF_PURPOSE_DELEGATION.to_string(),
            capability_chain: Some(capability_chain),
            proof_value: None,
        };

        let payload = signing_payload(
            &capability.to_value().map_err(BuildError::Model)?,
            &proof.to_value().map_err(BuildError::Model)?,
        );
        proof.proof_value = Some(signer.sign(&payload).await?);
        capability.proof = Some(Proofs::One(Box::new(proof)));

        check_capability(&capability, false)?;
        Ok(capability)
    }
}

/// Builds and signs an invocation proof on a document.
#[derive(Default)]
pub struct InvocationBuilder {
    capability: Option<ChainEntry>,
    capability_action: Option<String>,
    invocation_target: Option<String>,
    created: Option<DateTime<Utc>>,
    signer: Option<Arc<dyn Signer>>,
}

impl InvocationBuilder {
    /// A blank builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The capability being invoked: referenced by ID when it is a root,
    /// embedded in full otherwise. Required.
    #[must_use]
    pub fn capability(mut self, capability: &Capability) -> Self {
        self.capability = Some(if capability.is_root() {
            ChainEntry::Id(capability.id.clone())
        } else {
            ChainEntry::Capability(Box::new(capability.clone()))
        });
        self
    }

    /// The action to invoke. Required, non-empty.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.capability_action = Some(action.into());
        self
    }

    /// The target being acted on. Required.
    #[must_use]
    pub fn invocation_target(mut self, target: impl Into<String>) -> Self {
        self.invocation_target = Some(target.into());
        self
    }

    /// When the invocation is signed; defaults to now.
    #[must_use]
    pub fn created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    /// The invoker's key. Required.
    #[must_use]
    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Sign the invocation over `document` and return the document with
    /// the proof attached (appended, when proofs already exist).
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when a required field is missing, the
    /// document is not a JSON object, or signing fails.
    pub async fn try_sign(
        self,
        document: &serde_json::Value,
    ) -> Result<serde_json::Value, BuildError> {
        let capability = self.capability.ok_or(BuildError::MissingField("capability"))?;
        let action = self
            .capability_action
            .filter(|action| !action.is_empty())
            .ok_or(BuildError::MissingField("capabilityAction"))?;
        let target = self
            .invocation_target
            .ok_or(BuildError::MissingField("invocationTarget"))?;
        let signer = self.signer.ok_or(BuildError::MissingSigner)?;

        if !document.is_object() {
            return Err(BuildError::Model(VerificationError::MalformedDocument(
                "the invoked document must be a JSON object".to_string(),
            )));
        }

        let mut proof = InvocationProof {
            context: None,
            proof_type: signer.proof_type().to_string(),
            created: self.created.unwrap_or_else(Utc::now),
            verification_method: signer.verification_method().to_string(),
            proof_purpose: PROOF_PURPOSE_INVOCATION.to_string(),
            capability,
            capability_action: Some(action),
            invocation_target: Some(target),
            proof_value: None,
        };

        let payload = signing_payload(document, &proof.to_value().map_err(BuildError::Model)?);
        proof.proof_value = Some(signer.sign(&payload).await?);
        let proof_value = proof.to_value().map_err(BuildError::Model)?;

        let mut signed = document.clone();
        let Some(object) = signed.as_object_mut() else {
            return Err(BuildError::Model(VerificationError::MalformedDocument(
                "the invoked document must be a JSON object".to_string(),
            )));
        };
        match object.get_mut("proof") {
            None => {
                object.insert("proof".to_string(), proof_value);
            }
            Some(serde_json::Value::Array(proofs)) => proofs.push(proof_value),
            Some(existing) => {
                let previous = existing.take();
                *existing = serde_json::Value::Array(vec![previous, proof_value]);
            }
        }
        Ok(signed)
    }
}
