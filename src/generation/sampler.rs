//! Next-token sampling: temperature scaling, top-k truncation, nucleus
//! filtering, then a weighted random draw. Stochastic decoding, never argmax.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

/// Bound applied to logits when the forward pass produces non-finite values.
const LOGIT_CLAMP: f32 = 100.0;

/// Per-request sampling knobs.
///
/// `top_p` and `top_k` are pinned by the thinking flag: p = 0.95 / k = 20
/// with thinking enabled, p = 0.8 / k = 20 without. Only the temperature
/// comes from the caller. A temperature <= 0 disables scaling instead of
/// erroring.
#[derive(Debug, Clone, Copy)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_k: usize,
    pub top_p: f32,
}

impl SamplingParams {
    pub fn for_request(enable_thinking: bool, temperature: f32) -> Self {
        Self {
            temperature,
            top_k: 20,
            top_p: if enable_thinking { 0.95 } else { 0.8 },
        }
    }
}

/// Draw one token id from `logits`.
///
/// Never fails and never returns an out-of-vocabulary index: non-finite
/// logits are clamped into a bounded range first, and if filtering leaves an
/// empty candidate set the draw falls back to the unfiltered scaled
/// distribution.
pub fn sample<R: Rng>(logits: &[f32], params: &SamplingParams, rng: &mut R) -> usize {
    debug_assert!(!logits.is_empty());

    let scaled = scale_logits(logits, params.temperature);

    let mut filtered = scaled.clone();
    apply_top_k(&mut filtered, params.top_k);
    apply_top_p(&mut filtered, params.top_p);

    if filtered.iter().all(|&v| v == f32::NEG_INFINITY) {
        filtered = scaled;
    }

    draw(&filtered, rng)
}

/// Clamp non-finite logits and apply temperature.
fn scale_logits(logits: &[f32], temperature: f32) -> Vec<f32> {
    let mut scaled: Vec<f32> = if logits.iter().any(|v| !v.is_finite()) {
        logits
            .iter()
            .map(|&v| {
                if v.is_nan() {
                    0.0
                } else {
                    v.clamp(-LOGIT_CLAMP, LOGIT_CLAMP)
                }
            })
            .collect()
    } else {
        logits.to_vec()
    };

    if temperature > 0.0 && temperature != 1.0 {
        for v in &mut scaled {
            *v /= temperature;
        }
    }

    scaled
}

/// Keep the k highest logits, mask the rest. Ties at the cutoff survive.
fn apply_top_k(logits: &mut [f32], top_k: usize) {
    if top_k == 0 || top_k >= logits.len() {
        return;
    }
    let mut sorted = logits.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let threshold = sorted[top_k - 1];
    for v in logits.iter_mut() {
        if *v < threshold {
            *v = f32::NEG_INFINITY;
        }
    }
}

/// Keep the minimal descending-probability prefix whose cumulative softmax
/// mass reaches `top_p`, never fewer than one entry.
fn apply_top_p(logits: &mut [f32], top_p: f32) {
    if top_p >= 1.0 {
        return;
    }
    let mut order: Vec<usize> = (0..logits.len()).collect();
    order.sort_by(|&a, &b| {
        logits[b]
            .partial_cmp(&logits[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let ordered: Vec<f32> = order.iter().map(|&i| logits[i]).collect();
    let probs = softmax(&ordered);

    let mut cumulative = 0.0f32;
    let mut cut = order.len();
    for (rank, &p) in probs.iter().enumerate() {
        cumulative += p;
        if cumulative >= top_p {
            cut = rank + 1;
            break;
        }
    }

    for &i in &order[cut..] {
        logits[i] = f32::NEG_INFINITY;
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        // Everything masked; a uniform distribution keeps the draw total.
        return vec![1.0 / logits.len() as f32; logits.len()];
    }
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|&e| e / sum).collect()
}

fn draw<R: Rng>(logits: &[f32], rng: &mut R) -> usize {
    let probs = softmax(logits);
    match WeightedIndex::new(&probs) {
        Ok(dist) => dist.sample(rng),
        Err(_) => probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0),
    }
}
