//! Document loading.
//!
//! The engine never fetches anything itself; every dereference of a URI —
//! root capabilities, verification methods — goes through a
//! [`DocumentLoader`]. Loaders must be safe for concurrent reads.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde::Serialize;

use crate::capability::Capability;

/// A document dereferenced by a [`DocumentLoader`].
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// The dereferenced JSON document.
    pub document: serde_json::Value,
    /// The URL the document was actually retrieved from.
    pub document_url: String,
    /// A context URL advertised alongside the document, if any.
    pub context_url: Option<String>,
}

/// Errors raised by document loaders.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// No document exists at the URL.
    #[error("document `{0}` was not found")]
    NotFound(String),

    /// The loader's shared state is unusable.
    #[error("document store poisoned")]
    Poisoned,

    /// Any other loader-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Dereferences URIs into JSON documents.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load the document at `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`LoaderError`] when the URL cannot be dereferenced.
    async fn load(&self, url: &str) -> Result<LoadedDocument, LoaderError>;
}

/// An in-memory loader over a fixed set of documents. Used by tests and by
/// embedders that resolve everything up front.
#[derive(Debug, Default, Clone)]
pub struct StaticLoader {
    documents: Arc<Mutex<HashMap<String, serde_json::Value>>>,
}

impl StaticLoader {
    /// Create an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `document` under `url`, replacing any previous entry.
    pub fn insert(&self, url: impl Into<String>, document: serde_json::Value) {
        if let Ok(mut documents) = self.documents.lock() {
            documents.insert(url.into(), document);
        }
    }

    /// Register a capability under its own `id`.
    pub fn insert_capability(&self, capability: &Capability) {
        if let Ok(document) = serde_json::to_value(capability) {
            self.insert(capability.id.clone(), document);
        }
    }

    /// Register any serializable document under `url`.
    pub fn insert_serialized<T: Serialize>(&self, url: impl Into<String>, value: &T) {
        if let Ok(document) = serde_json::to_value(value) {
            self.insert(url, document);
        }
    }
}

#[async_trait]
impl DocumentLoader for StaticLoader {
    async fn load(&self, url: &str) -> Result<LoadedDocument, LoaderError> {
        let documents = self.documents.lock().map_err(|_| LoaderError::Poisoned)?;
        let document = documents
            .get(url)
            .cloned()
            .ok_or_else(|| LoaderError::NotFound(url.to_string()))?;
        Ok(LoadedDocument {
            document,
            document_url: url.to_string(),
            context_url: None,
        })
    }
}
