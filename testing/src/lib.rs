//! Statistical helpers shared by the tests of the line simulator.

#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::default_trait_access,
    clippy::cast_precision_loss
)]

use rand::distributions::Distribution;
use rand::Rng;

/// Summary of a batch of samples drawn from a distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    /// Sample mean.
    pub mean: f64,
    /// Unbiased sample variance.
    pub variance: f64,
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
}

impl Moments {
    /// Sample standard deviation.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Draws `n` samples from `dist` and summarizes them.
///
/// # Panics
///
/// Panics if `n < 2`, since the variance is undefined.
pub fn sample_moments<D, R>(dist: &D, rng: &mut R, n: usize) -> Moments
where
    D: Distribution<f64>,
    R: Rng,
{
    assert!(n >= 2, "need at least two samples");
    let samples: Vec<f64> = dist.sample_iter(rng).take(n).collect();
    let mean = samples.iter().sum::<f64>() / n as f64;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Moments {
        mean,
        variance,
        min,
        max,
    }
}

/// Asserts that `actual` is within `tolerance` of `expected`, relative to `expected` when it is
/// larger than one and absolute otherwise.
///
/// # Panics
///
/// Panics when the values are too far apart.
#[track_caller]
pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    let scale = expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tolerance * scale,
        "{} is not within {} of {}",
        actual,
        tolerance * scale,
        expected
    );
}
