//! Authorization Capability (ZCAP-LD) delegation chain verification.
//!
//! A ZCAP is a signed JSON-LD document granting authority over an
//! invocation target. Authority flows from a root capability (the
//! verifier's trust anchor) through a chain of delegations, each narrowing
//! what the next holder may do. This crate dereferences such chains and
//! validates them root-to-tail: signatures, controller identity, action and
//! target attenuation, expiration ordering, delegation-time monotonicity,
//! and time-to-live bounds.
//!
//! Cryptography and document retrieval are injected: signature suites come
//! from [`zcap_suite`], documents from a [`DocumentLoader`].

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod builder;
pub mod capability;
pub mod chain;
pub mod delegation;
pub mod dereference;
pub mod error;
pub mod invocation;
pub mod loader;
pub mod proof;
pub mod time;

pub use builder::{BuildError, DelegationBuilder, InvocationBuilder};
pub use capability::{
    AllowedAction, Capability, Context, check_capability, create_root_capability,
    root_capability_id,
};
pub use chain::{ChainInspection, ChainInspector, ChainMeta};
pub use delegation::{DelegationVerifier, VerifiedDelegation};
pub use dereference::{RootResolver, dereference_capability_chain};
pub use error::{ErrorKind, VerificationError};
pub use invocation::{InvocationVerifier, VerifiedInvocation};
pub use loader::{DocumentLoader, LoadedDocument, LoaderError, StaticLoader};

/// The canonical ZCAP JSON-LD context URL. Capabilities and proofs must
/// carry it for their proofs to match.
pub const ZCAP_CONTEXT_URL: &str = "https://w3id.org/zcap/v1";

/// Maximum number of capabilities in a dereferenced chain, root included.
pub const MAX_CHAIN_LENGTH: usize = 10;

/// Default clock-skew tolerance, in seconds, applied wherever a live clock
/// is compared against an instant embedded in a chain.
pub const DEFAULT_MAX_CLOCK_SKEW: u64 = 300;

/// Proof purpose borne by every delegation proof.
pub const PROOF_PURPOSE_DELEGATION: &str = "capabilityDelegation";

/// Proof purpose borne by every invocation proof.
pub const PROOF_PURPOSE_INVOCATION: &str = "capabilityInvocation";
