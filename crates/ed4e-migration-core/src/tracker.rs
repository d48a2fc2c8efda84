//! Record of documents whose primary type was rewritten by a complex rule.
//!
//! Filled during the transform phase of a batch and consumed exactly once by
//! the finalize fix-up pass.

use crate::document::Bucket;
use serde::Serialize;
use std::collections::BTreeMap;

/// Bucket → ids, in insertion order without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformedDocuments {
    buckets: BTreeMap<Bucket, Vec<String>>,
}

impl TransformedDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an id. Returns `false` if it was already recorded in that bucket.
    pub fn add(&mut self, bucket: Bucket, id: impl Into<String>) -> bool {
        let id = id.into();
        let ids = self.buckets.entry(bucket).or_default();
        if ids.contains(&id) {
            return false;
        }
        ids.push(id);
        true
    }

    pub fn all(&self) -> &BTreeMap<Bucket, Vec<String>> {
        &self.buckets
    }

    pub fn ids(&self, bucket: Bucket) -> &[String] {
        self.buckets.get(&bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.buckets.values().any(|ids| ids.iter().any(|i| i == id))
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand the contents to the caller and leave the tracker empty.
    pub fn take(&mut self) -> TransformedDocuments {
        std::mem::take(self)
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
