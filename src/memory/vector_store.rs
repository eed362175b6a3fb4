use serde_json::{Map, Value};
use std::collections::HashMap;

use super::embedding::cosine_similarity;

/// A stored vector with the metadata it was indexed under
#[derive(Debug, Clone)]
pub struct StoredVector {
    pub vector: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// One hit from a similarity query
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub similarity: f32,
    pub metadata: Map<String, Value>,
}

/// Linear-scan vector store kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    vectors: HashMap<String, StoredVector>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, id: impl Into<String>, vector: Vec<f32>, metadata: Map<String, Value>) {
        self.vectors
            .insert(id.into(), StoredVector { vector, metadata });
    }

    /// Top `top_k` vectors by cosine similarity among those whose metadata
    /// equals every entry of `filter`
    pub fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &Map<String, Value>,
    ) -> Vec<VectorMatch> {
        let mut matches: Vec<VectorMatch> = self
            .vectors
            .iter()
            .filter(|(_, stored)| {
                filter
                    .iter()
                    .all(|(key, expected)| stored.metadata.get(key) == Some(expected))
            })
            .map(|(id, stored)| VectorMatch {
                id: id.clone(),
                similarity: cosine_similarity(vector, &stored.vector),
                metadata: stored.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        matches
    }

    /// Removes the given ids and returns how many existed
    pub fn delete<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> usize {
        ids.into_iter()
            .filter(|id| self.vectors.remove(*id).is_some())
            .count()
    }

    pub fn get(&self, id: &str) -> Option<&StoredVector> {
        self.vectors.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StoredVector)> {
        self.vectors.iter()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}
