//! Canonical signing payloads.
//!
//! A linked data proof signs two things together: the document with its
//! `proof` removed, and the proof's own attributes with the signature value
//! removed. Both halves are serialized as compact JSON with
//! lexicographically ordered keys, which `serde_json` guarantees for its
//! default map representation.
//!
//! Full RDF dataset canonicalization belongs to a suite implementation that
//! carries a JSON-LD processor; this module is the JSON-level encoding the
//! suites in this crate share.

use serde_json::Value;

/// Serialize a JSON value in canonical (sorted-key, compact) form.
pub fn canonicalize(value: &Value) -> Vec<u8> {
    // Maps are BTreeMap-backed, so `to_vec` emits sorted keys.
    serde_json::to_vec(value).unwrap_or_default()
}

/// Build the byte payload a proof signs: the proof-less document paired
/// with the signature-less proof options.
pub fn signing_payload(document: &Value, proof_options: &Value) -> Vec<u8> {
    let mut document = document.clone();
    if let Some(map) = document.as_object_mut() {
        map.remove("proof");
    }

    let mut options = proof_options.clone();
    if let Some(map) = options.as_object_mut() {
        map.remove("proofValue");
    }

    canonicalize(&Value::Array(vec![document, options]))
}
