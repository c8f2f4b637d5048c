//! Hand-rolled hybrid scorer: BM25 over entry/context text combined with
//! cosine similarity over embedding vectors. No full-text or vector
//! search crate appears anywhere in the corpus this workspace was grown
//! from, so both halves are implemented directly rather than reached for
//! as a dependency.

use std::collections::HashMap;

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

/// Lowercase, split on anything that isn't alphanumeric. Good enough for
/// matching free-text entry/context bodies; no stemming or stop-word
/// removal.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn term_counts(tokens: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for t in tokens {
        *counts.entry(t.as_str()).or_insert(0) += 1;
    }
    counts
}

/// BM25 score of `query` against every document in `corpus`, returned in
/// the same order as `corpus`. `corpus` supplies the pre-tokenized text
/// of every candidate document in the current scope (a single memory),
/// since BM25's idf term needs the full candidate set to be meaningful.
pub fn bm25_scores(query: &str, corpus: &[Vec<String>]) -> Vec<f32> {
    let query_terms = tokenize(query);
    if query_terms.is_empty() || corpus.is_empty() {
        return vec![0.0; corpus.len()];
    }

    let n = corpus.len() as f32;
    let avg_len = corpus.iter().map(|d| d.len() as f32).sum::<f32>() / n;

    let mut df: HashMap<&str, usize> = HashMap::new();
    let doc_term_counts: Vec<HashMap<&str, usize>> = corpus.iter().map(|d| term_counts(d)).collect();
    for counts in &doc_term_counts {
        for term in counts.keys() {
            *df.entry(term).or_insert(0) += 1;
        }
    }

    corpus
        .iter()
        .zip(doc_term_counts.iter())
        .map(|(doc, counts)| {
            let doc_len = doc.len() as f32;
            query_terms
                .iter()
                .map(|term| {
                    let tf = *counts.get(term.as_str()).unwrap_or(&0) as f32;
                    if tf == 0.0 {
                        return 0.0;
                    }
                    let df_t = *df.get(term.as_str()).unwrap_or(&0) as f32;
                    let idf = ((n - df_t + 0.5) / (df_t + 0.5) + 1.0).ln();
                    let numerator = tf * (BM25_K1 + 1.0);
                    let denominator = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_len);
                    idf * numerator / denominator
                })
                .sum()
        })
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
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

/// Min-max normalize scores into `0.0..=1.0`. A constant vector (all
/// scores equal) normalizes to all zeros rather than dividing by zero.
pub fn normalize(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().cloned().fold(f32::MIN, f32::max);
    let min = scores.iter().cloned().fold(f32::MAX, f32::min);
    let range = max - min;
    if range <= f32::EPSILON {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// Combine a keyword score and a vector score into one ranking score:
/// `alpha * vector + (1 - alpha) * keyword`, with both halves min-max
/// normalized across the candidate set first so neither metric's scale
/// dominates.
pub fn hybrid_scores(keyword_scores: &[f32], vector_scores: &[f32], alpha: f32) -> Vec<f32> {
    let kw = normalize(keyword_scores);
    let vec_scores = normalize(vector_scores);
    kw.iter()
        .zip(vec_scores.iter())
        .map(|(k, v)| alpha * v + (1.0 - alpha) * k)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_splits_on_punctuation() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
    }

    #[test]
    fn bm25_prefers_document_with_more_query_term_matches() {
        let corpus = vec![
            tokenize("the quick brown fox jumps over the lazy dog"),
            tokenize("a completely unrelated sentence about weather"),
        ];
        let scores = bm25_scores("quick fox", &corpus);
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_handles_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn hybrid_scores_alpha_zero_is_pure_keyword() {
        let kw = vec![1.0, 0.0];
        let vec_scores = vec![0.0, 1.0];
        let combined = hybrid_scores(&kw, &vec_scores, 0.0);
        assert!(combined[0] > combined[1]);
    }

    #[test]
    fn hybrid_scores_alpha_one_is_pure_vector() {
        let kw = vec![1.0, 0.0];
        let vec_scores = vec![0.0, 1.0];
        let combined = hybrid_scores(&kw, &vec_scores, 1.0);
        assert!(combined[1] > combined[0]);
    }
}
