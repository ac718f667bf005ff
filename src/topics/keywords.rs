//! Predictive keyword extraction for topic labeling.
//!
//! A multinomial naive Bayes model is fit over token counts of the
//! member titles, with the topic as the class. Tokens that are far more
//! probable under one class than under the rest make good topic labels.

use std::collections::{BTreeSet, HashMap};

use crate::search::is_stop_word;

/// Lowercase alphabetic tokens of length three or more, stopwords
/// removed.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|token| token.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|token| !is_stop_word(token))
        .collect()
}

/// Ranks, per class of titles, the tokens that best predict that class.
///
/// Every vocabulary token is owned by the class under which it is most
/// probable; its score is the summed log-probability margin between the
/// owning class and every class. Each class receives its owned tokens,
/// best first, capped at `top`. The result is aligned with
/// `class_titles`; classes that own nothing get an empty list. `alpha`
/// is the Laplace smoothing applied to the token counts.
#[must_use]
pub fn predictive_keywords(
    class_titles: &[Vec<String>],
    top: usize,
    alpha: f64,
) -> Vec<Vec<String>> {
    let class_count = class_titles.len();
    if class_count == 0 || top == 0 {
        return vec![Vec::new(); class_count];
    }

    // Token counts per class over a shared vocabulary.
    let mut vocabulary: BTreeSet<String> = BTreeSet::new();
    let mut class_counts: Vec<HashMap<String, u64>> = vec![HashMap::new(); class_count];
    let mut class_totals: Vec<u64> = vec![0; class_count];

    for (class, titles) in class_titles.iter().enumerate() {
        for title in titles {
            for token in tokenize(title) {
                *class_counts[class].entry(token.clone()).or_insert(0) += 1;
                class_totals[class] += 1;
                vocabulary.insert(token);
            }
        }
    }

    if vocabulary.is_empty() {
        return vec![Vec::new(); class_count];
    }

    let vocab_size = vocabulary.len() as f64;
    let mut owned: Vec<Vec<(String, f64)>> = vec![Vec::new(); class_count];

    for token in &vocabulary {
        let log_probs: Vec<f64> = (0..class_count)
            .map(|class| {
                let count = class_counts[class].get(token).copied().unwrap_or(0) as f64;
                let total = class_totals[class] as f64;
                ((count + alpha) / (total + alpha * vocab_size)).ln()
            })
            .collect();

        // First class wins ties, matching argmax over the class axis.
        let mut owner = 0;
        for (class, &log_prob) in log_probs.iter().enumerate() {
            if log_prob > log_probs[owner] {
                owner = class;
            }
        }

        let margin: f64 = log_probs
            .iter()
            .map(|&log_prob| log_probs[owner] - log_prob)
            .sum();
        owned[owner].push((token.clone(), margin));
    }

    owned
        .into_iter()
        .map(|mut tokens| {
            tokens.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            tokens.truncate(top);
            tokens.into_iter().map(|(token, _)| token).collect()
        })
        .collect()
}
