//! Delegation verification and proof creation.

mod common;

use std::sync::Arc;

use common::{TARGET, at, bare_delegated, delegate, far_future, fixture, sign_delegation};
use pretty_assertions::assert_eq;
use testresult::TestResult;
use zcap::{
    AllowedAction, BuildError, DelegationBuilder, DelegationVerifier, VerificationError,
    proof::ChainEntry,
};
use zcap_suite::Ed25519Suite;

fn delegation_verifier(fx: &common::Fixture) -> DelegationVerifier {
    DelegationVerifier::new(Arc::new(fx.loader.clone()), Arc::new(Ed25519Suite))
        .expect_root(fx.root.id.clone())
        .at_date(at(2024, 6, 1))
}

// =============================================================================
// Verifying delegations
// =============================================================================

#[tokio::test]
async fn a_fresh_delegation_verifies() -> TestResult {
    let fx = fixture();
    let to_bob = delegate(&fx.root, &fx.bob, &fx.alice, 1).await;

    let verified = delegation_verifier(&fx).verify(&to_bob).await?;
    assert_eq!(verified.capability, to_bob.id);
    assert_eq!(verified.delegator, fx.alice.key);
    assert_eq!(verified.dereferenced_chain.len(), 2);
    assert_eq!(verified.chain_meta.len(), 1);
    Ok(())
}

#[tokio::test]
async fn a_depth_3_delegation_verifies() -> TestResult {
    let fx = fixture();
    let to_bob = delegate(&fx.root, &fx.bob, &fx.alice, 1).await;
    let to_carol = delegate(&to_bob, &fx.carol, &fx.bob, 2).await;

    let verified = delegation_verifier(&fx).verify(&to_carol).await?;
    assert_eq!(verified.delegator, fx.bob.key);
    assert_eq!(verified.dereferenced_chain.len(), 3);
    // One record per delegated capability, the tail's first.
    assert_eq!(verified.chain_meta.len(), 2);
    assert_eq!(verified.chain_meta[0].capability, to_carol.id);
    Ok(())
}

#[tokio::test]
async fn a_delegation_signed_by_a_stranger_is_rejected() {
    let fx = fixture();
    let forged = DelegationBuilder::new()
        .id("urn:uuid:forged")
        .controller(fx.bob.key.clone())
        .parent(&fx.root)
        .created(at(2024, 1, 1))
        .expires(far_future())
        .signer(fx.carol.signer.clone())
        .try_sign()
        .await
        .unwrap();

    let result = delegation_verifier(&fx).verify(&forged).await;
    assert!(
        matches!(result, Err(VerificationError::DelegatorNotController { .. })),
        "expected DelegatorNotController, got {result:?}"
    );
}

#[tokio::test]
async fn an_expired_delegation_is_rejected() {
    let fx = fixture();
    let to_bob = DelegationBuilder::new()
        .id("urn:uuid:expired")
        .controller(fx.bob.key.clone())
        .parent(&fx.root)
        .created(at(1999, 1, 1))
        .expires(at(2000, 1, 1))
        .signer(fx.alice.signer.clone())
        .try_sign()
        .await
        .unwrap();

    let result = delegation_verifier(&fx).verify(&to_bob).await;
    assert!(
        matches!(result, Err(VerificationError::Expired)),
        "expected Expired, got {result:?}"
    );
}

#[tokio::test]
async fn a_delegation_without_the_zcap_context_does_not_match() {
    let fx = fixture();
    let mut to_bob = delegate(&fx.root, &fx.bob, &fx.alice, 1).await;
    to_bob.context = zcap::Context::One("https://w3id.org/security/v2".into());

    let result = delegation_verifier(&fx).verify(&to_bob).await;
    assert!(
        matches!(result, Err(VerificationError::NoMatchingProof)),
        "expected NoMatchingProof, got {result:?}"
    );
}

#[tokio::test]
async fn a_tampered_delegation_is_rejected() {
    let fx = fixture();
    let mut to_bob = delegate(&fx.root, &fx.bob, &fx.alice, 1).await;
    // Widen the controller after signing.
    to_bob.controller = Some(fx.carol.key.clone());

    let result = delegation_verifier(&fx).verify(&to_bob).await;
    assert!(
        matches!(result, Err(VerificationError::SignatureVerification { .. })),
        "expected SignatureVerification, got {result:?}"
    );
}

#[tokio::test]
async fn a_duplicated_delegation_proof_is_rejected() {
    let fx = fixture();
    let to_bob = delegate(&fx.root, &fx.bob, &fx.alice, 1).await;
    let proof = to_bob.delegation_proof().unwrap().clone();

    let mut doubled = to_bob;
    doubled.proof = Some(zcap::proof::Proofs::Many(vec![proof.clone(), proof]));
    let result = delegation_verifier(&fx).verify(&doubled).await;
    assert!(
        matches!(
            result,
            Err(VerificationError::DelegationProofCount { found: 2, .. })
        ),
        "expected DelegationProofCount, got {result:?}"
    );
}

// =============================================================================
// Pre-sign checks
// =============================================================================

#[tokio::test]
async fn signing_requires_a_parent() {
    let fx = fixture();
    let result = DelegationBuilder::new()
        .id("urn:uuid:orphan")
        .controller(fx.bob.key.clone())
        .expires(far_future())
        .signer(fx.alice.signer.clone())
        .try_sign()
        .await;
    assert!(matches!(result, Err(BuildError::MissingParent)));
}

#[tokio::test]
async fn signing_requires_expires() {
    let fx = fixture();
    let result = DelegationBuilder::new()
        .id("urn:uuid:immortal")
        .controller(fx.bob.key.clone())
        .parent(&fx.root)
        .signer(fx.alice.signer.clone())
        .try_sign()
        .await;
    assert!(matches!(result, Err(BuildError::MissingExpires)));
}

#[tokio::test]
async fn signing_refuses_a_proof_created_after_expiry() {
    let fx = fixture();
    let result = DelegationBuilder::new()
        .id("urn:uuid:backdated")
        .controller(fx.bob.key.clone())
        .parent(&fx.root)
        .created(at(2024, 6, 2))
        .expires(at(2024, 6, 1))
        .signer(fx.alice.signer.clone())
        .try_sign()
        .await;
    assert!(matches!(result, Err(BuildError::CreatedAfterExpires)));
}

#[tokio::test]
async fn signing_refuses_to_widen_allowed_actions() {
    let fx = fixture();
    let mut root = fx.root.clone();
    root.allowed_action = Some(AllowedAction::One("read".into()));

    let result = DelegationBuilder::new()
        .id("urn:uuid:widened")
        .controller(fx.bob.key.clone())
        .parent(&root)
        .allowed_action(AllowedAction::Many(vec!["read".into(), "write".into()]))
        .created(at(2024, 1, 1))
        .expires(far_future())
        .signer(fx.alice.signer.clone())
        .try_sign()
        .await;
    assert!(matches!(result, Err(BuildError::ActionNotAttenuated)));
}

#[tokio::test]
async fn signing_refuses_to_outlive_the_parent() {
    let fx = fixture();
    let to_bob = DelegationBuilder::new()
        .id("urn:uuid:delegation-1")
        .controller(fx.bob.key.clone())
        .parent(&fx.root)
        .created(at(2024, 1, 1))
        .expires(at(2024, 12, 31))
        .signer(fx.alice.signer.clone())
        .try_sign()
        .await
        .unwrap();

    let result = DelegationBuilder::new()
        .id("urn:uuid:delegation-2")
        .controller(fx.carol.key.clone())
        .parent(&to_bob)
        .created(at(2024, 2, 1))
        .expires(at(2025, 1, 1))
        .signer(fx.bob.signer.clone())
        .try_sign()
        .await;
    assert!(matches!(result, Err(BuildError::ExpiresAfterParent)));
}

#[tokio::test]
async fn signing_refuses_to_predate_the_parent() {
    let fx = fixture();
    let to_bob = delegate(&fx.root, &fx.bob, &fx.alice, 1).await;

    let result = DelegationBuilder::new()
        .id("urn:uuid:premature")
        .controller(fx.carol.key.clone())
        .parent(&to_bob)
        .created(at(2023, 12, 31))
        .expires(far_future())
        .signer(fx.bob.signer.clone())
        .try_sign()
        .await;
    assert!(matches!(result, Err(BuildError::DelegatedBeforeParent)));
}

// =============================================================================
// Chain computation
// =============================================================================

#[tokio::test]
async fn the_chain_grows_by_id_with_the_parent_embedded_last() -> TestResult {
    let fx = fixture();
    let to_bob = delegate(&fx.root, &fx.bob, &fx.alice, 1).await;
    let to_carol = delegate(&to_bob, &fx.carol, &fx.bob, 2).await;

    let bob_chain = to_bob.delegation_proof()?.capability_chain.clone().unwrap();
    assert_eq!(bob_chain, vec![ChainEntry::Id(fx.root.id.clone())]);

    let carol_chain = to_carol
        .delegation_proof()?
        .capability_chain
        .clone()
        .unwrap();
    assert_eq!(carol_chain.len(), 2);
    assert_eq!(carol_chain[0], ChainEntry::Id(fx.root.id.clone()));
    let embedded = carol_chain[1]
        .as_capability()
        .expect("the last entry embeds the parent");
    assert_eq!(embedded.id, to_bob.id);
    Ok(())
}

#[tokio::test]
async fn manual_and_builder_chains_agree() -> TestResult {
    let fx = fixture();
    let built = delegate(&fx.root, &fx.bob, &fx.alice, 1).await;

    let manual = sign_delegation(
        bare_delegated("urn:uuid:delegation-1", &fx.bob.key, &fx.root.id, far_future()),
        vec![ChainEntry::Id(fx.root.id.clone())],
        &fx.alice,
        at(2024, 1, 1),
    )
    .await;

    assert_eq!(built.to_value()?, manual.to_value()?);
    delegation_verifier(&fx).verify(&manual).await?;
    Ok(())
}

#[tokio::test]
async fn builder_defaults_inherit_the_parents_restrictions() -> TestResult {
    let fx = fixture();
    let mut root = fx.root.clone();
    root.allowed_action = Some(AllowedAction::One("read".into()));
    fx.loader.insert_capability(&root);

    let to_bob = DelegationBuilder::new()
        .id("urn:uuid:inherited")
        .controller(fx.bob.key.clone())
        .parent(&root)
        .created(at(2024, 1, 1))
        .expires(far_future())
        .signer(fx.alice.signer.clone())
        .try_sign()
        .await?;

    assert_eq!(to_bob.invocation_target.as_deref(), Some(TARGET));
    assert_eq!(
        to_bob.allowed_action,
        Some(AllowedAction::One("read".into()))
    );
    delegation_verifier(&fx).verify(&to_bob).await?;
    Ok(())
}
