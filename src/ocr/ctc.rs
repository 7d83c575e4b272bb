//! Greedy CTC decoding for CRNN-style recognizers.
//!
//! The model emits, per time step, one score per class. Class 0 is the CTC
//! blank; class `i > 0` is `alphabet[i - 1]`. Decoding takes the best class per
//! step, collapses repeats and drops blanks.

use super::Recognition;

/// Decode a `[steps, classes]` score matrix laid out row-major.
///
/// Scores may be logits or probabilities. Rows that are not already a
/// probability distribution are passed through a softmax. Confidence is the mean
/// probability of the emitted characters. Returns `None` if nothing but blanks
/// was emitted or the matrix does not fit `alphabet`.
pub fn greedy_decode(scores: &[f32], classes: usize, alphabet: &[char]) -> Option<Recognition> {
    if classes != alphabet.len() + 1 || scores.is_empty() || scores.len() % classes != 0 {
        return None;
    }

    let mut text = String::new();
    let mut probability_sum = 0.0f32;
    let mut previous = 0usize;
    for row in scores.chunks_exact(classes) {
        let probs = to_distribution(row);
        let (best, p) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |acc, (i, p)| {
                if p > acc.1 {
                    (i, p)
                } else {
                    acc
                }
            });
        if best != 0 && best != previous {
            text.push(alphabet[best - 1]);
            probability_sum += p;
        }
        previous = best;
    }

    if text.is_empty() {
        return None;
    }
    let confidence = probability_sum / text.chars().count() as f32;
    Some(Recognition::new(text, confidence.clamp(0.0, 1.0)))
}

fn to_distribution(row: &[f32]) -> Vec<f32> {
    let sum: f32 = row.iter().sum();
    if row.iter().all(|p| (0.0..=1.0).contains(p)) && (sum - 1.0).abs() < 1e-3 {
        return row.to_vec();
    }
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = row.iter().map(|v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
