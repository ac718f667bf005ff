//! Trigram string similarity, pg_trgm style.
//!
//! Each word is lowercased and padded with two leading and one trailing
//! space; similarity is the number of shared distinct trigrams over the
//! size of their union. Values lie in [0, 1] with 1.0 for equal strings.

use std::collections::HashSet;

fn trigrams(text: &str) -> HashSet<(char, char, char)> {
    let mut set = HashSet::new();
    for word in text.to_lowercase().split_whitespace() {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars())
            .chain(" ".chars())
            .collect();
        for window in padded.windows(3) {
            set.insert((window[0], window[1], window[2]));
        }
    }
    set
}

/// Similarity of two strings by shared distinct trigrams.
#[must_use]
pub fn trigram_similarity(a: &str, b: &str) -> f32 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    shared as f32 / union as f32
}
