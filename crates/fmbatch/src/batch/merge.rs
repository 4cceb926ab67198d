use std::collections::BTreeMap;
use crate::inference::ScoreRecord;
use crate::response::RankedResponse;

/// Numerically stable softmax: the maximum logit is subtracted before exponentiation.
///
/// When the maximum is not finite the mass is split evenly: across the `+inf` logits
/// if there are any, otherwise across every logit. The result always sums to one.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        let winners: Vec<bool> = logits.iter().map(|&logit| max == f64::INFINITY && logit == max).collect();
        let any_winner = winners.contains(&true);
        let count = if any_winner { winners.iter().filter(|&&w| w).count() } else { logits.len() };
        return winners
            .into_iter()
            .map(|winner| if winner || !any_winner { 1.0 / count as f64 } else { 0.0 })
            .collect();
    }
    let exps: Vec<f64> = logits.iter().map(|logit| (logit - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Index of the largest value, the first one winning ties.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (index, value) in values.iter().enumerate().skip(1) {
        if *value > values[best] {
            best = index;
        }
    }
    best
}

/// Combine the per-candidate records of one ranked query.
///
/// `candidates` and `records` are parallel and non-empty. The embedding is taken from
/// the first candidate that reports one.
pub(crate) fn merge_ranked(candidates: &[String], records: Vec<ScoreRecord>) -> RankedResponse {
    let logits: Vec<f64> = records.iter().map(|record| record.logit).collect();
    let probabilities = softmax(&logits);
    let prediction = candidates[argmax(&logits)].clone();

    let scores: BTreeMap<String, f64> = candidates.iter().cloned().zip(probabilities).collect();
    let logit_map: BTreeMap<String, f64> = candidates.iter().cloned().zip(logits).collect();
    let embeddings = records.into_iter().find_map(|record| record.hidden_state);

    RankedResponse::new(prediction, scores, logit_map, embeddings)
}
