//! String similarity measures reported alongside each consolidated row.

use std::collections::HashMap;

fn char_counts(s: &str) -> HashMap<char, usize> {
    let mut counts = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }
    counts
}

/// Jaccard similarity over character multisets. Two empty strings are identical.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let left = char_counts(a);
    let right = char_counts(b);

    let intersection: usize = left
        .iter()
        .map(|(c, n)| (*n).min(right.get(c).copied().unwrap_or(0)))
        .sum();
    let union: usize = left.values().sum::<usize>() + right.values().sum::<usize>() - intersection;

    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

pub fn jaccard_distance(a: &str, b: &str) -> f64 {
    1.0 - jaccard_similarity(a, b)
}

/// Monge-Elkan distance over whitespace tokens: each token of `a` is scored
/// against its best match in `b` with normalized Damerau-Levenshtein.
pub fn monge_elkan_distance(a: &str, b: &str) -> f64 {
    let left: Vec<&str> = a.split_whitespace().collect();
    let right: Vec<&str> = b.split_whitespace().collect();

    match (left.is_empty(), right.is_empty()) {
        (true, true) => return 0.0,
        (true, false) | (false, true) => return 1.0,
        _ => {}
    }

    let total: f64 = left
        .iter()
        .map(|token| {
            right
                .iter()
                .map(|other| strsim::normalized_damerau_levenshtein(token, other))
                .fold(0.0, f64::max)
        })
        .sum();

    1.0 - total / left.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jaccard_counts_repeated_characters() {
        assert_eq!(jaccard_similarity("cancer", "cancer"), 1.0);
        assert!((jaccard_similarity("cancer", "cancers") - 6.0 / 7.0).abs() < 1e-9);
        assert!((jaccard_distance("cancer", "cancers") - 1.0 / 7.0).abs() < 1e-9);
        assert_eq!(jaccard_similarity("abc", "xyz"), 0.0);
        assert_eq!(jaccard_similarity("", ""), 1.0);
    }

    #[test]
    fn test_monge_elkan_scores_best_token_match() {
        assert_eq!(monge_elkan_distance("diabetes", "diabetes"), 0.0);
        assert_eq!(monge_elkan_distance("abc", "xyz"), 1.0);
        assert_eq!(monge_elkan_distance("", "diabetes"), 1.0);

        let partial = monge_elkan_distance("diabetes mellitus", "diabetes");
        assert!(partial > 0.0 && partial <= 0.5);
    }
}
