//! The capability document model and its structural checker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ZCAP_CONTEXT_URL,
    error::VerificationError,
    proof::{DelegationProof, Proofs},
};

/// A JSON-LD `@context`: a single URL, or an array of URLs and inline
/// context objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Context {
    /// A single context URL.
    One(String),
    /// An ordered list of context URLs and inline contexts.
    Many(Vec<serde_json::Value>),
}

impl Context {
    /// The context every ZCAP document carries.
    #[must_use]
    pub fn zcap() -> Self {
        Context::One(ZCAP_CONTEXT_URL.to_string())
    }

    /// Whether `url` appears anywhere in this context. The canonical
    /// context may sit at any position and coexist with other protected
    /// contexts.
    #[must_use]
    pub fn includes(&self, url: &str) -> bool {
        match self {
            Context::One(value) => value == url,
            Context::Many(entries) => entries.iter().any(|entry| entry.as_str() == Some(url)),
        }
    }
}

/// The `allowedAction` attribute: a single action name or an ordered list
/// of them. Interpreted as a set; an absent `allowedAction` is the
/// universal set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowedAction {
    /// A single permitted action.
    One(String),
    /// Several permitted actions.
    Many(Vec<String>),
}

impl AllowedAction {
    /// The permitted action names.
    #[must_use]
    pub fn actions(&self) -> &[String] {
        match self {
            AllowedAction::One(action) => std::slice::from_ref(action),
            AllowedAction::Many(actions) => actions,
        }
    }

    /// Whether `action` is in this set.
    #[must_use]
    pub fn allows(&self, action: &str) -> bool {
        self.actions().iter().any(|allowed| allowed == action)
    }

    /// Set containment with absent-as-universal semantics: an absent
    /// parent admits any child, while an absent child requires an absent
    /// parent.
    #[must_use]
    pub fn attenuates(child: Option<&AllowedAction>, parent: Option<&AllowedAction>) -> bool {
        match (child, parent) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(child), Some(parent)) => {
                child.actions().iter().all(|action| parent.allows(action))
            }
        }
    }
}

/// An Authorization Capability document, root or delegated.
///
/// Which fields must be present depends on which of the two it is; that is
/// the business of [`check_capability`], not the deserializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    /// JSON-LD context.
    #[serde(rename = "@context")]
    pub context: Context,

    /// Unique capability identifier (absolute URI).
    pub id: String,

    /// The entity authorized to invoke or further delegate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    /// The resource this capability grants authority over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation_target: Option<String>,

    /// The immediate parent in the delegation chain. Roots have none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_capability: Option<String>,

    /// Actions permitted at invocation time. Absent means unrestricted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_action: Option<AllowedAction>,

    /// Hard expiration. Required on delegated capabilities, forbidden on
    /// roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,

    /// Embedded proofs. A delegated capability carries exactly one
    /// delegation proof.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proofs>,
}

impl Capability {
    /// Whether this capability is a root (has no parent).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_capability.is_none()
    }

    /// Whether the ZCAP context is present on this document.
    #[must_use]
    pub fn has_zcap_context(&self) -> bool {
        self.context.includes(ZCAP_CONTEXT_URL)
    }

    /// The sole delegation proof on this capability.
    ///
    /// # Errors
    ///
    /// Fails unless exactly one proof with the `capabilityDelegation`
    /// purpose is embedded.
    pub fn delegation_proof(&self) -> Result<&DelegationProof, VerificationError> {
        let mut delegations = self
            .proof
            .iter()
            .flat_map(Proofs::iter)
            .filter(|proof| proof.is_delegation());

        match (delegations.next(), delegations.next()) {
            (Some(proof), None) => Ok(proof),
            (first, _) => Err(VerificationError::DelegationProofCount {
                id: self.id.clone(),
                found: first.map_or(0, |_| 2 + delegations.count()),
            }),
        }
    }

    /// This capability as a JSON value, for canonical signing payloads.
    ///
    /// # Errors
    ///
    /// Fails if the document cannot be represented as JSON.
    pub fn to_value(&self) -> Result<serde_json::Value, VerificationError> {
        serde_json::to_value(self).map_err(|e| VerificationError::MalformedDocument(e.to_string()))
    }
}

/// Derive the conventional root capability ID for an invocation target.
#[must_use]
pub fn root_capability_id(invocation_target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(invocation_target.as_bytes())
        .collect();
    format!("urn:zcap:root:{encoded}")
}

/// Create a root capability anchoring authority over `invocation_target`
/// in `controller`.
#[must_use]
pub fn create_root_capability(controller: &str, invocation_target: &str) -> Capability {
    Capability {
        context: Context::zcap(),
        id: root_capability_id(invocation_target),
        controller: Some(controller.to_string()),
        invocation_target: Some(invocation_target.to_string()),
        parent_capability: None,
        allowed_action: None,
        expires: None,
        proof: None,
    }
}

fn require_absolute(uri: &str) -> Result<(), VerificationError> {
    url::Url::parse(uri).map(|_| ()).map_err(|_| {
        VerificationError::InvalidUri {
            uri: uri.to_string(),
        }
    })
}

/// Validate the shape of a capability before any semantic reasoning.
///
/// `expect_root` selects which of the two field regimes applies. Context
/// presence is not checked here — a missing ZCAP context makes a proof
/// "not match" (a soft outcome for the adapters), not a structural fault.
///
/// # Errors
///
/// Returns the structural [`VerificationError`] describing the first rule
/// the capability breaks.
pub fn check_capability(
    capability: &Capability,
    expect_root: bool,
) -> Result<(), VerificationError> {
    require_absolute(&capability.id)?;

    let controller = capability.controller.as_deref().ok_or_else(|| {
        VerificationError::MissingField {
            id: capability.id.clone(),
            field: "controller",
        }
    })?;
    require_absolute(controller)?;

    let target = capability.invocation_target.as_deref().ok_or_else(|| {
        VerificationError::MissingField {
            id: capability.id.clone(),
            field: "invocationTarget",
        }
    })?;
    require_absolute(target)?;

    if let Some(allowed) = &capability.allowed_action {
        let reason = match allowed {
            AllowedAction::One(action) if action.is_empty() => {
                Some("the action name must be non-empty")
            }
            AllowedAction::Many(actions) if actions.is_empty() => {
                Some("the action list must be non-empty")
            }
            AllowedAction::Many(actions) if actions.iter().any(String::is_empty) => {
                Some("action names must be non-empty")
            }
            _ => None,
        };
        if let Some(reason) = reason {
            return Err(VerificationError::InvalidAllowedAction {
                id: capability.id.clone(),
                reason,
            });
        }
    }

    if expect_root {
        if capability.parent_capability.is_some() {
            return Err(VerificationError::RootWithParent {
                id: capability.id.clone(),
            });
        }
        if capability.expires.is_some() {
            return Err(VerificationError::RootWithExpires {
                id: capability.id.clone(),
            });
        }
        return Ok(());
    }

    let parent = capability.parent_capability.as_deref().ok_or_else(|| {
        VerificationError::MissingField {
            id: capability.id.clone(),
            field: "parentCapability",
        }
    })?;
    require_absolute(parent)?;

    if capability.expires.is_none() {
        return Err(VerificationError::MissingField {
            id: capability.id.clone(),
            field: "expires",
        });
    }

    // Exactly one delegation proof.
    capability.delegation_proof()?;

    Ok(())
}
