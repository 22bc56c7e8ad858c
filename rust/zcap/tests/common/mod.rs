//! Shared fixtures: deterministic seeded keys, an in-memory loader, and
//! helpers for building delegation chains and invocations.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use zcap::{
    Capability, DelegationBuilder, InvocationBuilder, InvocationVerifier, StaticLoader,
    ZCAP_CONTEXT_URL, create_root_capability,
    proof::{ChainEntry, DelegationProof, Proofs},
};
use zcap_suite::{Ed25519Signer, Ed25519Suite, Signer as _, canonical::signing_payload};

/// The resource all fixture capabilities grant authority over.
pub const TARGET: &str = "https://api.example.com/documents";

/// A participant: a deterministic Ed25519 key registered with the loader.
pub struct Actor {
    pub signer: Arc<Ed25519Signer>,
    pub key: String,
}

pub struct Fixture {
    pub loader: StaticLoader,
    pub root: Capability,
    pub alice: Actor,
    pub bob: Actor,
    pub carol: Actor,
}

/// Create an actor whose verification method document names the key as
/// its own controller.
pub fn actor(loader: &StaticLoader, seed: u8, name: &str) -> Actor {
    let key = format!("urn:key:{name}");
    let signer = Ed25519Signer::from_seed(&[seed; 32], key.clone());
    loader.insert_serialized(key.clone(), &signer.method_document(key.clone()));
    Actor {
        signer: Arc::new(signer),
        key,
    }
}

/// Alice controls the root over [`TARGET`]; Bob and Carol are delegates.
pub fn fixture() -> Fixture {
    let loader = StaticLoader::new();
    let alice = actor(&loader, 1, "alice");
    let bob = actor(&loader, 2, "bob");
    let carol = actor(&loader, 3, "carol");

    let root = create_root_capability(&alice.key, TARGET);
    loader.insert_capability(&root);

    Fixture {
        loader,
        root,
        alice,
        bob,
        carol,
    }
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn far_future() -> DateTime<Utc> {
    at(3000, 1, 1)
}

/// A verifier expecting `read` on [`TARGET`] under the fixture root, with
/// the clock pinned for determinism.
pub fn verifier(fixture: &Fixture) -> InvocationVerifier {
    InvocationVerifier::new(Arc::new(fixture.loader.clone()), Arc::new(Ed25519Suite))
        .expect_action("read")
        .expect_target(TARGET)
        .expect_root(fixture.root.id.clone())
        .at_date(at(2024, 6, 1))
}

/// Delegate `parent` to `to`, signed by `by`, expiring far in the future.
pub async fn delegate(parent: &Capability, to: &Actor, by: &Actor, n: u32) -> Capability {
    DelegationBuilder::new()
        .id(format!("urn:uuid:delegation-{n}"))
        .controller(to.key.clone())
        .parent(parent)
        .expires(far_future())
        .created(at(2024, 1, 1))
        .signer(by.signer.clone())
        .try_sign()
        .await
        .expect("delegation should sign")
}

/// Sign an invocation of `capability` over a small operation document.
pub async fn invoke(capability: &Capability, by: &Actor, action: &str, target: &str) -> Value {
    let document = json!({
        "@context": ZCAP_CONTEXT_URL,
        "id": "urn:uuid:operation-1",
        "payload": {"count": 3}
    });

    InvocationBuilder::new()
        .capability(capability)
        .action(action)
        .invocation_target(target)
        .created(at(2024, 6, 1))
        .signer(by.signer.clone())
        .try_sign(&document)
        .await
        .expect("invocation should sign")
}

/// An unsigned delegated capability, for tests that need to sign chains
/// the [`DelegationBuilder`] would refuse.
pub fn bare_delegated(
    id: &str,
    controller: &str,
    parent_id: &str,
    expires: DateTime<Utc>,
) -> Capability {
    Capability {
        context: zcap::Context::zcap(),
        id: id.to_string(),
        controller: Some(controller.to_string()),
        invocation_target: Some(TARGET.to_string()),
        parent_capability: Some(parent_id.to_string()),
        allowed_action: None,
        expires: Some(expires),
        proof: None,
    }
}

/// Attach a delegation proof over an explicit `capabilityChain`, with no
/// pre-sign checks. Invalid-chain tests are built with this.
pub async fn sign_delegation(
    mut capability: Capability,
    chain: Vec<ChainEntry>,
    by: &Actor,
    created: DateTime<Utc>,
) -> Capability {
    capability.proof = None;

    let mut proof = DelegationProof {
        context: None,
        proof_type: by.signer.proof_type().to_string(),
        created,
        verification_method: by.signer.verification_method().to_string(),
        proof_purpose: zcap::PROOF_PURPOSE_DELEGATION.to_string(),
        capability_chain: Some(chain),
        proof_value: None,
    };

    let payload = signing_payload(
        &serde_json::to_value(&capability).unwrap(),
        &serde_json::to_value(&proof).unwrap(),
    );
    proof.proof_value = Some(by.signer.sign(&payload).await.unwrap());
    capability.proof = Some(Proofs::One(Box::new(proof)));
    capability
}
