//! Retry backoff for failed stages.

use rand::Rng;

use crate::config::PipelineConfig;

/// Exponential delay before jitter: `min(base * 2^(attempt - 1), max)`.
///
/// A provider `Retry-After` hint raises the delay but never past `max`.
pub fn compute_backoff(config: &PipelineConfig, attempt: i32, retry_after: Option<u64>) -> u64 {
    let exponent = attempt.saturating_sub(1).clamp(0, 32) as u32;
    let delay = config
        .backoff_base_seconds
        .saturating_mul(2u64.saturating_pow(exponent))
        .min(config.backoff_max_seconds);

    match retry_after {
        Some(hint) => delay.max(hint.min(config.backoff_max_seconds)),
        None => delay,
    }
}

pub fn sample_jitter_seconds(config: &PipelineConfig, delay_seconds: u64) -> u64 {
    let mut rng = rand::thread_rng();
    compute_jitter_seconds(config, delay_seconds, &mut rng)
}

/// Uniform jitter in `[0, jitter_factor * delay]`.
pub fn compute_jitter_seconds<R: Rng + ?Sized>(
    config: &PipelineConfig,
    delay_seconds: u64,
    rng: &mut R,
) -> u64 {
    let factor = config.backoff_jitter_factor.clamp(0.0, 1.0);
    let upper = delay_seconds as f64 * factor;
    if upper < f64::EPSILON {
        return 0;
    }
    rng.gen_range(0.0..=upper).round() as u64
}
