//! Similarity measures used to rank chunks against a free-text query.
//!
//! [`cosine`] compares embedding vectors; [`score`] is the lexical fallback,
//! the cosine of lowercase alphanumeric term-frequency vectors. Both fall in
//! `[0, 1]`.

use std::collections::HashMap;

/// Split `text` into lowercase alphanumeric terms with their frequencies.
pub fn term_frequencies(text: &str) -> HashMap<String, u32> {
    let mut terms = HashMap::new();
    for term in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *terms.entry(term.to_lowercase()).or_insert(0) += 1;
    }
    terms
}

/// Similarity of `text` to `query`. An empty query (or text) scores 0.
pub fn score(query: &str, text: &str) -> f64 {
    let q = term_frequencies(query);
    let t = term_frequencies(text);
    if q.is_empty() || t.is_empty() {
        return 0.0;
    }

    let dot: f64 = q
        .iter()
        .filter_map(|(term, qf)| t.get(term).map(|tf| f64::from(*qf) * f64::from(*tf)))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }

    let norm = |v: &HashMap<String, u32>| {
        v.values()
            .map(|f| f64::from(*f) * f64::from(*f))
            .sum::<f64>()
            .sqrt()
    };
    (dot / (norm(&q) * norm(&t))).clamp(0.0, 1.0)
}

/// Cosine similarity of two embedding vectors, clamped to `[0, 1]`.
/// Vectors of different length or with zero norm score 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}
