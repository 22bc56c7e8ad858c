//! Linked data proof suites for ZCAP documents.
//!
//! This crate provides the cryptographic seam the ZCAP verification engine
//! is parameterized over: the [`ProofSuite`] and [`Signer`] traits, the
//! [`VerificationMethod`] key model, canonical payload encoding, and an
//! Ed25519 suite.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod canonical;
pub mod ed25519;
pub mod method;
pub mod suite;

pub use ed25519::{Ed25519Signer, Ed25519Suite};
pub use method::{ED25519_VERIFICATION_KEY_2020, VerificationMethod};
pub use suite::{ProofSuite, Signer, SuiteError};
