//! Semantic nearest-neighbor matcher over previously stored prompts.
//!
//! A courtesy layer ahead of the teaching path, never a replacement for
//! exact memory lookup: the arg-max cosine hit is accepted only at or
//! above the similarity floor, and any embedding failure is treated as
//! "no match".

/// External embedding function. Implementations typically call out to a
/// model service; a failed embedding is reported as `None`.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchHit {
    pub prompt: String,
    pub score: f32,
}

pub struct SemanticMatcher {
    embedder: Box<dyn Embedder>,
    threshold: f32,
}

impl SemanticMatcher {
    pub const DEFAULT_THRESHOLD: f32 = 0.4;

    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self::with_threshold(embedder, Self::DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(embedder: Box<dyn Embedder>, threshold: f32) -> Self {
        Self {
            embedder,
            threshold,
        }
    }

    /// Arg-max cosine similarity between the query and the working set.
    /// Returns the winning stored prompt only if it clears the threshold.
    pub fn best_match(&self, query: &str, prompts: &[String]) -> Option<MatchHit> {
        if prompts.is_empty() {
            return None;
        }
        let query_vec = self.embedder.embed(query)?;

        let mut best: Option<MatchHit> = None;
        for prompt in prompts {
            let vec = self.embedder.embed(prompt)?;
            let score = cosine_similarity(&query_vec, &vec);
            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(MatchHit {
                    prompt: prompt.clone(),
                    score,
                });
            }
        }
        best.filter(|hit| hit.score >= self.threshold)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
