//! Delegation and invocation proofs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    PROOF_PURPOSE_DELEGATION, PROOF_PURPOSE_INVOCATION, ZCAP_CONTEXT_URL,
    capability::{Capability, Context},
    error::VerificationError,
};

/// One entry of a `capabilityChain`: a capability ID, or (only in the last
/// position of a chain of length ≥ 2) the fully embedded parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainEntry {
    /// A capability referenced by ID.
    Id(String),
    /// A fully embedded capability.
    Capability(Box<Capability>),
}

impl ChainEntry {
    /// The ID of the capability this entry names.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            ChainEntry::Id(id) => id,
            ChainEntry::Capability(capability) => &capability.id,
        }
    }

    /// The embedded capability, if this entry is one.
    #[must_use]
    pub fn as_capability(&self) -> Option<&Capability> {
        match self {
            ChainEntry::Id(_) => None,
            ChainEntry::Capability(capability) => Some(capability),
        }
    }
}

/// One or many embedded proofs, as JSON-LD serializes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Proofs {
    /// A single proof object.
    One(Box<DelegationProof>),
    /// An array of proofs.
    Many(Vec<DelegationProof>),
}

impl Proofs {
    /// Iterate the embedded proofs.
    pub fn iter(&self) -> impl Iterator<Item = &DelegationProof> {
        match self {
            Proofs::One(proof) => std::slice::from_ref(proof.as_ref()).iter(),
            Proofs::Many(proofs) => proofs.iter(),
        }
    }
}

/// The proof embedded in a delegated capability, binding it to its parent
/// chain under the `capabilityDelegation` purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationProof {
    /// Optional proof-local context. When absent, the document's context
    /// governs.
    #[serde(rename = "@context", skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,

    /// The proof suite type.
    #[serde(rename = "type")]
    pub proof_type: String,

    /// When the delegation was made.
    pub created: DateTime<Utc>,

    /// URI of the key that made this proof.
    pub verification_method: String,

    /// Must equal `capabilityDelegation`.
    pub proof_purpose: String,

    /// The root capability ID followed by every non-root ancestor; the
    /// last entry is the embedded parent when the chain is longer than
    /// the root alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_chain: Option<Vec<ChainEntry>>,

    /// The multibase signature value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_value: Option<String>,
}

impl DelegationProof {
    /// Whether this proof carries the delegation purpose.
    #[must_use]
    pub fn is_delegation(&self) -> bool {
        self.proof_purpose == PROOF_PURPOSE_DELEGATION
    }

    /// Whether this proof's context (if it carries one) admits ZCAP terms.
    #[must_use]
    pub fn matches_context(&self) -> bool {
        self.context
            .as_ref()
            .is_none_or(|context| context.includes(ZCAP_CONTEXT_URL))
    }

    /// This proof as a JSON value, for canonical signing payloads.
    ///
    /// # Errors
    ///
    /// Fails if the proof cannot be represented as JSON.
    pub fn to_value(&self) -> Result<serde_json::Value, VerificationError> {
        serde_json::to_value(self).map_err(|e| VerificationError::MalformedDocument(e.to_string()))
    }
}

/// The proof embedded in an invoked document under the
/// `capabilityInvocation` purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationProof {
    /// Optional proof-local context.
    #[serde(rename = "@context", skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,

    /// The proof suite type.
    #[serde(rename = "type")]
    pub proof_type: String,

    /// When the invocation was signed.
    pub created: DateTime<Utc>,

    /// URI of the key that made this proof.
    pub verification_method: String,

    /// Must equal `capabilityInvocation`.
    pub proof_purpose: String,

    /// The invoked capability: the root's ID when the root itself is
    /// invoked, otherwise the fully embedded delegated tail.
    pub capability: ChainEntry,

    /// The action being invoked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_action: Option<String>,

    /// The target the invoker claims to act on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation_target: Option<String>,

    /// The multibase signature value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_value: Option<String>,
}

impl InvocationProof {
    /// Whether this proof carries the invocation purpose.
    #[must_use]
    pub fn is_invocation(&self) -> bool {
        self.proof_purpose == PROOF_PURPOSE_INVOCATION
    }

    /// Whether this proof's context (if it carries one) admits ZCAP terms.
    #[must_use]
    pub fn matches_context(&self) -> bool {
        self.context
            .as_ref()
            .is_none_or(|context| context.includes(ZCAP_CONTEXT_URL))
    }

    /// This proof as a JSON value, for canonical signing payloads.
    ///
    /// # Errors
    ///
    /// Fails if the proof cannot be represented as JSON.
    pub fn to_value(&self) -> Result<serde_json::Value, VerificationError> {
        serde_json::to_value(self).map_err(|e| VerificationError::MalformedDocument(e.to_string()))
    }
}

/// Pull every parseable invocation proof off a document's `proof` field.
/// Proofs of other purposes or shapes are skipped, not errors — the caller
/// decides what "no matching proof" means.
#[must_use]
pub fn extract_invocation_proofs(document: &serde_json::Value) -> Vec<InvocationProof> {
    let Some(proof) = document.get("proof") else {
        return Vec::new();
    };

    let candidates: Vec<&serde_json::Value> = match proof {
        serde_json::Value::Array(proofs) => proofs.iter().collect(),
        other => vec![other],
    };

    candidates
        .into_iter()
        .filter_map(|value| serde_json::from_value::<InvocationProof>(value.clone()).ok())
        .filter(InvocationProof::is_invocation)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chain_entries_deserialize_by_shape() {
        let entries: Vec<ChainEntry> = serde_json::from_value(json!([
            "urn:zcap:root:x",
            {
                "@context": crate::ZCAP_CONTEXT_URL,
                "id": "urn:uuid:parent",
                "controller": "urn:key:bob",
                "invocationTarget": "https://api.example.com/items",
                "parentCapability": "urn:zcap:root:x"
            }
        ]))
        .unwrap();

        assert_eq!(entries[0], ChainEntry::Id("urn:zcap:root:x".into()));
        assert_eq!(entries[1].id(), "urn:uuid:parent");
        assert!(entries[1].as_capability().is_some());
    }

    #[test]
    fn extracts_only_invocation_proofs() {
        let document = json!({
            "@context": crate::ZCAP_CONTEXT_URL,
            "id": "urn:uuid:op",
            "proof": [
                {
                    "type": "Ed25519Signature2020",
                    "created": "2024-06-01T00:00:00Z",
                    "verificationMethod": "urn:key:bob",
                    "proofPurpose": "capabilityInvocation",
                    "capability": "urn:zcap:root:x",
                    "capabilityAction": "read",
                    "invocationTarget": "https://api.example.com/items",
                    "proofValue": "zsig"
                },
                {
                    "type": "Ed25519Signature2020",
                    "created": "2024-06-01T00:00:00Z",
                    "verificationMethod": "urn:key:bob",
                    "proofPurpose": "assertionMethod",
                    "capability": "urn:zcap:root:x",
                    "proofValue": "zsig"
                }
            ]
        });

        let proofs = extract_invocation_proofs(&document);
        assert_eq!(proofs.len(), 1);
        assert_eq!(proofs[0].capability_action.as_deref(), Some("read"));
    }

    #[test]
    fn a_single_proof_object_is_accepted() {
        let document = json!({
            "proof": {
                "type": "Ed25519Signature2020",
                "created": "2024-06-01T00:00:00Z",
                "verificationMethod": "urn:key:bob",
                "proofPurpose": "capabilityInvocation",
                "capability": "urn:zcap:root:x",
                "capabilityAction": "read",
                "invocationTarget": "https://api.example.com/items",
                "proofValue": "zsig"
            }
        });
        assert_eq!(extract_invocation_proofs(&document).len(), 1);
    }

    #[test]
    fn proof_context_matching() {
        let mut proof: InvocationProof = serde_json::from_value(json!({
            "type": "Ed25519Signature2020",
            "created": "2024-06-01T00:00:00Z",
            "verificationMethod": "urn:key:bob",
            "proofPurpose": "capabilityInvocation",
            "capability": "urn:zcap:root:x"
        }))
        .unwrap();

        // Absent context inherits the document's.
        assert!(proof.matches_context());

        proof.context = Some(Context::One("https://w3id.org/security/v2".into()));
        assert!(!proof.matches_context());

        proof.context = Some(Context::Many(vec![
            json!("https://w3id.org/security/v2"),
            json!(crate::ZCAP_CONTEXT_URL),
        ]));
        assert!(proof.matches_context());
    }
}
