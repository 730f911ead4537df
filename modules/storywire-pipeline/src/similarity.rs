use std::collections::{HashMap, HashSet};

use storywire_common::text::tokenize;

/// Term-frequency vector for one document: term count divided by the
/// document's max term count, giving a 0..1 range.
pub fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let tokens = tokenize(text);
    let mut counts: HashMap<String, u32> = HashMap::new();
    for token in &tokens {
        *counts.entry(token.clone()).or_insert(0) += 1;
    }
    let max = counts.values().copied().max().unwrap_or(1) as f64;
    counts
        .into_iter()
        .map(|(term, count)| (term, count as f64 / max))
        .collect()
}

/// Inverse document frequency over the candidate set plus the query,
/// computed fresh for each call rather than maintained as global state.
pub fn inverse_document_frequencies(documents: &[&str]) -> HashMap<String, f64> {
    let n = documents.len() as f64;
    let mut doc_freq: HashMap<String, u32> = HashMap::new();
    for doc in documents {
        let unique_terms: HashSet<String> = tokenize(doc).into_iter().collect();
        for term in unique_terms {
            *doc_freq.entry(term).or_insert(0) += 1;
        }
    }
    doc_freq
        .into_iter()
        .map(|(term, df)| (term, (n / df as f64).ln() + 1.0))
        .collect()
}

const UNKNOWN_TERM_IDF_FALLBACK: f64 = std::f64::consts::LN_10;

/// Per-term TF×IDF vector for one document against a precomputed IDF table.
/// Terms absent from the table use a fixed `ln(10)` fallback.
pub fn tfidf_vector(text: &str, idf: &HashMap<String, f64>) -> HashMap<String, f64> {
    term_frequencies(text)
        .into_iter()
        .map(|(term, tf)| {
            let term_idf = idf.get(&term).copied().unwrap_or(UNKNOWN_TERM_IDF_FALLBACK);
            (term, tf * term_idf)
        })
        .collect()
}

/// Standard cosine similarity; zero when either vector has zero norm.
pub fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a.iter().map(|(term, weight)| weight * b.get(term).copied().unwrap_or(0.0)).sum();
    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Additional similarity credit for shared platform entities, capped so it
/// cannot dominate the cosine term on its own.
pub fn platform_overlap_bonus(a: &[String], b: &[String]) -> f64 {
    let set_b: HashSet<&String> = b.iter().collect();
    let shared = a.iter().filter(|p| set_b.contains(p)).count();
    (0.2 * shared as f64).min(0.4)
}

/// Headline plus up to the top-10 TF tokens of the summary, joined by
/// spaces. Indexed via trigram and used as the Phase-2 cosine basis.
pub fn build_search_text(headline: &str, summary: &str) -> String {
    let mut tf: Vec<(String, f64)> = term_frequencies(summary).into_iter().collect();
    tf.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let top_terms: Vec<&str> = tf.iter().take(10).map(|(t, _)| t.as_str()).collect();
    let mut parts = vec![headline];
    parts.extend(top_terms);
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_frequencies_normalizes_by_max_count() {
        let tf = term_frequencies("apple apple banana");
        assert_eq!(tf.get("apple"), Some(&1.0));
        assert_eq!(tf.get("banana"), Some(&0.5));
    }

    #[test]
    fn cosine_similarity_zero_for_disjoint_vectors() {
        let a = HashMap::from([("apple".to_string(), 1.0)]);
        let b = HashMap::from([("banana".to_string(), 1.0)]);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_similarity_one_for_identical_vectors() {
        let a = HashMap::from([("apple".to_string(), 1.0), ("banana".to_string(), 2.0)]);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_zero_norm_returns_zero() {
        let a: HashMap<String, f64> = HashMap::new();
        let b = HashMap::from([("apple".to_string(), 1.0)]);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn platform_overlap_bonus_caps_at_0_4() {
        let a = vec!["replika".to_string(), "character-ai".to_string(), "x".to_string()];
        let b = a.clone();
        assert_eq!(platform_overlap_bonus(&a, &b), 0.4);
    }

    #[test]
    fn platform_overlap_bonus_zero_when_no_shared() {
        let a = vec!["replika".to_string()];
        let b = vec!["character-ai".to_string()];
        assert_eq!(platform_overlap_bonus(&a, &b), 0.0);
    }

    #[test]
    fn build_search_text_includes_headline_and_top_terms() {
        let text = build_search_text("Big Story", "apple apple apple banana banana cherry");
        assert!(text.starts_with("Big Story"));
        assert!(text.contains("apple"));
    }
}
