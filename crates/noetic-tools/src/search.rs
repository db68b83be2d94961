//! ABOUTME: Semantic tool discovery over registered tool descriptions

use std::sync::Arc;

use noetic_core::collaborators::Embedder;
use noetic_core::Result;

use crate::types::ToolRegistration;

/// A registration paired with the embedding of `description`, computed once
/// at registration time so search is a pure vector comparison.
#[derive(Clone)]
pub struct IndexedTool {
    pub registration: ToolRegistration,
    pub embedding: Vec<f32>,
}

pub struct ToolSearchIndex {
    embedder: Arc<dyn Embedder>,
}

impl ToolSearchIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub async fn index(&self, registration: ToolRegistration) -> Result<IndexedTool> {
        let embedding = self.embedder.embed(&registration.description).await?;
        Ok(IndexedTool { registration, embedding })
    }

    /// Rank `pool` by cosine similarity of their description embedding to
    /// the query embedding, exact name matches first.
    pub async fn search(&self, query: &str, pool: &[IndexedTool], k: usize) -> Result<Vec<String>> {
        if let Some(exact) = pool.iter().find(|t| t.registration.name == query) {
            let mut names = vec![exact.registration.name.clone()];
            names.extend(ranked_by_similarity(&self.embedder.embed(query).await?, pool, k).into_iter().filter(|n| n != query));
            names.truncate(k.max(1));
            return Ok(names);
        }

        let query_vec = self.embedder.embed(query).await?;
        Ok(ranked_by_similarity(&query_vec, pool, k))
    }
}

fn ranked_by_similarity(query_vec: &[f32], pool: &[IndexedTool], k: usize) -> Vec<String> {
    let mut scored: Vec<(f32, &str)> = pool
        .iter()
        .map(|t| (cosine_similarity(query_vec, &t.embedding), t.registration.name.as_str()))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(k).map(|(_, name)| name.to_string()).collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
