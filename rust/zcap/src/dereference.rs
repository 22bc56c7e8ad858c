//! Chain dereferencing.
//!
//! A delegated capability names its ancestry in the `capabilityChain` of
//! its delegation proof: the root capability's ID first, every non-root
//! ancestor after it, and — when the chain is longer than the root alone —
//! the direct parent fully embedded in the last position. Dereferencing
//! turns a tail capability into the ordered sequence `[root, …, tail]` by
//! consuming that array, descending through each embedded parent for the
//! remainder of the chain.

use std::collections::HashSet;

use crate::{
    capability::{Capability, check_capability},
    error::VerificationError,
    loader::DocumentLoader,
    proof::ChainEntry,
};

/// Resolves claimed root capability IDs against the caller's expected-root
/// set. Resolution fails for any ID outside the set — the root is the
/// verifier's trust anchor, never the chain's claim.
pub struct RootResolver<'a> {
    expected: &'a [String],
    loader: &'a dyn DocumentLoader,
}

impl<'a> RootResolver<'a> {
    /// Create a resolver over the expected roots, loading root documents
    /// through `loader`.
    #[must_use]
    pub fn new(expected: &'a [String], loader: &'a dyn DocumentLoader) -> Self {
        Self { expected, loader }
    }

    /// Whether `id` is one of the expected roots.
    #[must_use]
    pub fn is_expected(&self, id: &str) -> bool {
        self.expected.iter().any(|root| root == id)
    }

    /// Resolve `id` to its root capability document.
    ///
    /// # Errors
    ///
    /// Fails when `id` is not an expected root, cannot be loaded, or does
    /// not hold a well-formed root capability.
    pub async fn resolve(&self, id: &str) -> Result<Capability, VerificationError> {
        if !self.is_expected(id) {
            return Err(VerificationError::UnexpectedRootCapability { id: id.to_string() });
        }

        let loaded = self.loader.load(id).await.map_err(|source| {
            VerificationError::DocumentLoader {
                url: id.to_string(),
                source,
            }
        })?;

        let root: Capability = serde_json::from_value(loaded.document)
            .map_err(|e| VerificationError::MalformedDocument(format!("root `{id}`: {e}")))?;
        check_capability(&root, true)?;
        Ok(root)
    }
}

/// Dereference the full delegation chain of `capability`, returning
/// `[root, …, capability]`.
///
/// The walk is iterative: each delegated capability's declared chain is
/// shape-checked (all entries but the last are IDs; the last is the root's
/// ID for a chain of one ancestor, the embedded parent otherwise), then
/// the walk descends into the embedded parent, which authoritatively bears
/// the remainder of the chain. Dereferencing is pure given the loader:
/// running it twice over the same tail yields the same sequence.
///
/// # Errors
///
/// Fails on length-bound violations, malformed chain entries, cycles,
/// unexpected roots, model-check failures of any element, and
/// parent-linkage mismatches.
pub async fn dereference_capability_chain(
    capability: &Capability,
    roots: &RootResolver<'_>,
    max_chain_length: usize,
) -> Result<Vec<Capability>, VerificationError> {
    if capability.is_root() {
        check_capability(capability, true)?;
        return Ok(vec![capability.clone()]);
    }

    // Descend tail -> root through the embedded parents, collecting the
    // delegated capabilities tail-first.
    let mut descending: Vec<Capability> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut current = capability.clone();

    let root_id = loop {
        check_capability(&current, false)?;
        if !seen.insert(current.id.clone()) {
            return Err(VerificationError::CircularChain { id: current.id });
        }

        let proof = current.delegation_proof()?;
        let chain = proof
            .capability_chain
            .clone()
            .ok_or(VerificationError::EmptyChain)?;
        let entries = chain.len();
        if entries == 0 {
            return Err(VerificationError::EmptyChain);
        }
        if entries + 1 > max_chain_length {
            return Err(VerificationError::ChainTooLong {
                length: entries + 1,
                max: max_chain_length,
            });
        }

        // Every entry before the last must be an ID.
        for (index, entry) in chain[..entries - 1].iter().enumerate() {
            if entry.as_capability().is_some() {
                return Err(VerificationError::InvalidChainEntry {
                    index,
                    expected: "a capability ID",
                });
            }
        }

        match chain.into_iter().next_back() {
            // A single entry: the root's ID, and the parent is the root.
            Some(ChainEntry::Id(id)) if entries == 1 => {
                descending.push(current);
                break id;
            }
            Some(ChainEntry::Id(_)) => {
                return Err(VerificationError::InvalidChainEntry {
                    index: entries - 1,
                    expected: "the fully embedded parent capability",
                });
            }
            Some(ChainEntry::Capability(parent)) => {
                if entries == 1 {
                    return Err(VerificationError::InvalidChainEntry {
                        index: 0,
                        expected: "the root capability ID",
                    });
                }
                descending.push(current);
                current = *parent;
            }
            None => return Err(VerificationError::EmptyChain),
        }
    };

    let root = roots.resolve(&root_id).await?;
    if seen.contains(&root.id) {
        return Err(VerificationError::CircularChain { id: root.id });
    }

    let mut dereferenced = Vec::with_capacity(descending.len() + 1);
    dereferenced.push(root);
    dereferenced.extend(descending.into_iter().rev());

    if dereferenced.len() > max_chain_length {
        return Err(VerificationError::ChainTooLong {
            length: dereferenced.len(),
            max: max_chain_length,
        });
    }

    // Enforce parent linkage and agreement between each capability's
    // declared chain and the ancestry actually dereferenced.
    for index in 1..dereferenced.len() {
        let parent_id = dereferenced[index - 1].id.clone();
        let capability = &dereferenced[index];

        match capability.parent_capability.as_deref() {
            Some(found) if found == parent_id => {}
            Some(found) => {
                return Err(VerificationError::ParentMismatch {
                    id: capability.id.clone(),
                    expected: parent_id,
                    found: found.to_string(),
                });
            }
            None => {
                return Err(VerificationError::MissingField {
                    id: capability.id.clone(),
                    field: "parentCapability",
                });
            }
        }

        let declared = capability
            .delegation_proof()?
            .capability_chain
            .as_deref()
            .unwrap_or(&[]);
        let matches = declared.len() == index
            && declared
                .iter()
                .zip(&dereferenced[..index])
                .all(|(entry, ancestor)| entry.id() == ancestor.id);
        if !matches {
            return Err(VerificationError::DeclaredChainMismatch {
                id: capability.id.clone(),
            });
        }
    }

    Ok(dereferenced)
}
