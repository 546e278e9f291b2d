//! Ephemeral per-request vector index.
//!
//! Brute-force cosine scan over the conversation's chunks. The index lives
//! for a single answer request and is never shared between conversations or
//! concurrent requests.

use thiserror::Error;

use super::types::{RetrievableChunk, ScoredChunk};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("cannot build an index over an empty chunk set")]
    EmptyChunkSet,
}

pub struct EphemeralIndex {
    chunks: Vec<RetrievableChunk>,
}

impl EphemeralIndex {
    /// Builds the index. Callers must check for an empty chunk set first;
    /// passing one is a precondition failure.
    pub fn build(chunks: Vec<RetrievableChunk>) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyChunkSet);
        }
        Ok(Self { chunks })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top-k chunks by cosine similarity, descending. Ties are broken by
    /// ascending chunk id so the ranking is reproducible.
    pub fn query(&self, query_vector: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                score: cosine_similarity(query_vector, &chunk.vector),
                chunk: chunk.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(k.max(1));

        scored
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn make_chunk(id: Uuid, vector: Vec<f32>, text: &str) -> RetrievableChunk {
        RetrievableChunk {
            id,
            vector,
            text: text.to_string(),
            conversation_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            item_uri: "file://doc".to_string(),
            item_display_name: "doc".to_string(),
            page: None,
        }
    }

    #[test]
    fn build_rejects_empty_chunk_set() {
        assert!(matches!(
            EphemeralIndex::build(Vec::new()),
            Err(IndexError::EmptyChunkSet)
        ));
    }

    #[test]
    fn query_ranks_by_descending_similarity() {
        let chunks = vec![
            make_chunk(Uuid::new_v4(), vec![0.1, 0.9], "far"),
            make_chunk(Uuid::new_v4(), vec![0.9, 0.1], "near"),
            make_chunk(Uuid::new_v4(), vec![0.5, 0.5], "middle"),
        ];
        let index = EphemeralIndex::build(chunks).unwrap();

        let hits = index.query(&[1.0, 0.0], 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk.text, "near");
        assert_eq!(hits[1].chunk.text, "middle");
        assert_eq!(hits[2].chunk.text, "far");
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[1].score >= hits[2].score);
    }

    #[test]
    fn ties_break_by_ascending_chunk_id() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        // Same direction, same cosine score.
        let chunks = vec![
            make_chunk(high, vec![2.0, 0.0], "high id"),
            make_chunk(low, vec![1.0, 0.0], "low id"),
        ];
        let index = EphemeralIndex::build(chunks).unwrap();

        let hits = index.query(&[1.0, 0.0], 2);
        assert_eq!(hits[0].chunk.id, low);
        assert_eq!(hits[1].chunk.id, high);
    }

    #[test]
    fn ranking_is_deterministic_for_fixed_inputs() {
        let chunks: Vec<RetrievableChunk> = (0..8)
            .map(|i| {
                make_chunk(
                    Uuid::from_u128(i),
                    vec![i as f32 * 0.1, 1.0 - i as f32 * 0.1],
                    "chunk",
                )
            })
            .collect();
        let query = vec![0.3, 0.7];

        let first = EphemeralIndex::build(chunks.clone())
            .unwrap()
            .query(&query, 5);
        let second = EphemeralIndex::build(chunks).unwrap().query(&query, 5);

        let first_ids: Vec<Uuid> = first.iter().map(|s| s.chunk.id).collect();
        let second_ids: Vec<Uuid> = second.iter().map(|s| s.chunk.id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn query_truncates_to_k() {
        let chunks: Vec<RetrievableChunk> = (0..10)
            .map(|i| make_chunk(Uuid::from_u128(i), vec![1.0, i as f32], "chunk"))
            .collect();
        let index = EphemeralIndex::build(chunks).unwrap();

        assert_eq!(index.query(&[1.0, 0.0], 3).len(), 3);
        assert_eq!(index.len(), 10);
    }

    #[test]
    fn zero_norm_vectors_score_zero() {
        let chunks = vec![make_chunk(Uuid::new_v4(), vec![0.0, 0.0], "null")];
        let index = EphemeralIndex::build(chunks).unwrap();

        let hits = index.query(&[1.0, 0.0], 1);
        assert_eq!(hits[0].score, 0.0);
    }
}
