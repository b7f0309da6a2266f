//! Random variates for processing and inter-arrival times.

use std::convert::TryFrom;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, LogNormal, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::DistributionError;

/// Number of attempts at drawing a non-negative value from a normal distribution
/// before giving up and returning zero.
const MAX_RESAMPLES: usize = 64;

/// Description of a duration distribution, as found in a line configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionSpec {
    /// Always the same value.
    Constant {
        /// The value.
        value: f64,
    },
    /// Exponential distribution with the given mean.
    Exponential {
        /// Mean value, the inverse of the rate.
        mean: f64,
    },
    /// Normal distribution truncated at zero.
    Normal {
        /// Mean of the underlying normal distribution.
        mean: f64,
        /// Standard deviation of the underlying normal distribution.
        std_dev: f64,
    },
    /// Uniform distribution on `[low, high]`.
    Uniform {
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
    },
    /// Log-normal distribution parametrized by its mean and coefficient of variation.
    LogNormal {
        /// Mean value.
        mean: f64,
        /// Coefficient of variation, i.e., standard deviation divided by mean.
        cv: f64,
    },
}

impl DistributionSpec {
    /// Expected value of the distribution. For the truncated normal, this is the mean of the
    /// underlying normal distribution.
    #[must_use]
    pub fn mean(&self) -> f64 {
        match *self {
            Self::Constant { value } => value,
            Self::Exponential { mean }
            | Self::Normal { mean, .. }
            | Self::LogNormal { mean, .. } => mean,
            Self::Uniform { low, high } => (low + high) / 2.0,
        }
    }

    /// Whether every sample is zero, so that arrivals drawn from it never advance the clock.
    ///
    /// A truncated normal with zero mean but positive deviation is not degenerate.
    #[must_use]
    pub fn is_degenerate_at_zero(&self) -> bool {
        match *self {
            Self::Constant { value } => value <= 0.0,
            Self::Uniform { high, .. } => high <= 0.0,
            Self::Normal { mean, std_dev } => mean <= 0.0 && std_dev == 0.0,
            Self::Exponential { .. } | Self::LogNormal { .. } => false,
        }
    }
}

fn finite(name: &'static str, value: f64) -> Result<f64, DistributionError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DistributionError::NotFinite(name))
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<f64, DistributionError> {
    let value = finite(name, value)?;
    if value < 0.0 {
        Err(DistributionError::Negative { name, value })
    } else {
        Ok(value)
    }
}

fn positive_mean(value: f64) -> Result<f64, DistributionError> {
    let value = finite("mean", value)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(DistributionError::NonPositiveMean(value))
    }
}

/// A validated distribution that produces non-negative durations.
#[derive(Debug, Clone, Copy)]
pub enum Variate {
    /// See [`DistributionSpec::Constant`].
    Constant(f64),
    /// See [`DistributionSpec::Exponential`].
    Exponential(Exp<f64>),
    /// See [`DistributionSpec::Normal`].
    Normal(Normal<f64>),
    /// See [`DistributionSpec::Uniform`].
    Uniform(Uniform<f64>),
    /// See [`DistributionSpec::LogNormal`].
    LogNormal(LogNormal<f64>),
}

impl TryFrom<DistributionSpec> for Variate {
    type Error = DistributionError;

    fn try_from(spec: DistributionSpec) -> Result<Self, Self::Error> {
        match spec {
            DistributionSpec::Constant { value } => {
                Ok(Self::Constant(non_negative("value", value)?))
            }
            DistributionSpec::Exponential { mean } => {
                let mean = positive_mean(mean)?;
                Exp::new(1.0 / mean)
                    .map(Self::Exponential)
                    .map_err(|_| DistributionError::NonPositiveMean(mean))
            }
            DistributionSpec::Normal { mean, std_dev } => {
                let mean = non_negative("mean", mean)?;
                let std_dev = non_negative("std_dev", std_dev)?;
                Normal::new(mean, std_dev)
                    .map(Self::Normal)
                    .map_err(|_| DistributionError::NotFinite("std_dev"))
            }
            DistributionSpec::Uniform { low, high } => {
                let low = non_negative("low", low)?;
                let high = finite("high", high)?;
                if low > high {
                    Err(DistributionError::InvalidRange { low, high })
                } else {
                    Ok(Self::Uniform(Uniform::new_inclusive(low, high)))
                }
            }
            DistributionSpec::LogNormal { mean, cv } => {
                let mean = positive_mean(mean)?;
                let cv = non_negative("cv", cv)?;
                let sigma = (1.0 + cv * cv).ln().sqrt();
                let mu = mean.ln() - 0.5 * sigma * sigma;
                LogNormal::new(mu, sigma)
                    .map(Self::LogNormal)
                    .map_err(|_| DistributionError::NotFinite("cv"))
            }
        }
    }
}

impl Distribution<f64> for Variate {
    /// Samples a duration. The result is never negative: normal samples below zero are drawn
    /// again, and after too many failed attempts the sample is truncated to zero.
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Constant(value) => *value,
            Self::Exponential(dist) => dist.sample(rng),
            Self::Uniform(dist) => dist.sample(rng),
            Self::LogNormal(dist) => dist.sample(rng),
            Self::Normal(dist) => (0..MAX_RESAMPLES)
                .map(|_| dist.sample(rng))
                .find(|value| *value >= 0.0)
                .unwrap_or(0.0),
        }
    }
}

/// FNV-1a hash of the entity name, used as the stream number of its generator.
fn stream_id(name: &str) -> u64 {
    name.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Returns the random number generator of the named entity for the given global seed.
///
/// Each entity draws from its own stream, determined by its name rather than its position,
/// so adding or removing other entities leaves its samples unchanged.
#[must_use]
pub fn stream_rng(seed: u64, entity: &str) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream_id(entity));
    rng
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use testing::{assert_close, sample_moments};

    fn variate(spec: DistributionSpec) -> Variate {
        Variate::try_from(spec).unwrap()
    }

    #[rstest]
    #[case(DistributionSpec::Constant { value: 5.0 }, 5.0, 0.0)]
    #[case(DistributionSpec::Exponential { mean: 4.0 }, 4.0, 16.0)]
    #[case(DistributionSpec::Uniform { low: 2.0, high: 6.0 }, 4.0, 16.0 / 12.0)]
    #[case(DistributionSpec::Normal { mean: 10.0, std_dev: 1.0 }, 10.0, 1.0)]
    #[case(DistributionSpec::LogNormal { mean: 10.0, cv: 0.1 }, 10.0, 1.0)]
    fn test_moments(#[case] spec: DistributionSpec, #[case] mean: f64, #[case] variance: f64) {
        let mut rng = stream_rng(17, "machine");
        let moments = sample_moments(&variate(spec), &mut rng, 50_000);
        assert_close(moments.mean, mean, 0.03);
        assert_close(moments.variance, variance, 0.08);
        assert!(moments.min >= 0.0);
        assert_close(spec.mean(), mean, 1e-12);
    }

    #[test]
    fn test_normal_is_truncated_at_zero() {
        let dist = variate(DistributionSpec::Normal {
            mean: 0.5,
            std_dev: 3.0,
        });
        let mut rng = stream_rng(3, "normal");
        assert!(dist.sample_iter(&mut rng).take(10_000).all(|x| x >= 0.0));
    }

    #[test]
    fn test_degenerate_uniform() {
        let dist = variate(DistributionSpec::Uniform {
            low: 2.0,
            high: 2.0,
        });
        let mut rng = stream_rng(0, "u");
        assert_eq!(dist.sample(&mut rng), 2.0);
    }

    #[rstest]
    #[case(
        DistributionSpec::Constant { value: -1.0 },
        DistributionError::Negative { name: "value", value: -1.0 }
    )]
    #[case(DistributionSpec::Exponential { mean: 0.0 }, DistributionError::NonPositiveMean(0.0))]
    #[case(
        DistributionSpec::Normal { mean: 1.0, std_dev: -2.0 },
        DistributionError::Negative { name: "std_dev", value: -2.0 }
    )]
    #[case(
        DistributionSpec::Uniform { low: 3.0, high: 1.0 },
        DistributionError::InvalidRange { low: 3.0, high: 1.0 }
    )]
    #[case(
        DistributionSpec::LogNormal { mean: f64::NAN, cv: 0.1 },
        DistributionError::NotFinite("mean")
    )]
    fn test_invalid(#[case] spec: DistributionSpec, #[case] expected: DistributionError) {
        assert_eq!(Variate::try_from(spec).unwrap_err(), expected);
    }

    #[test]
    fn test_streams_are_reproducible_and_independent() {
        let dist = variate(DistributionSpec::Exponential { mean: 1.0 });
        let draw = |seed: u64, name: &str| -> Vec<f64> {
            dist.sample_iter(stream_rng(seed, name)).take(5).collect()
        };
        assert_eq!(draw(1, "press"), draw(1, "press"));
        assert_ne!(draw(1, "press"), draw(1, "drill"));
        assert_ne!(draw(1, "press"), draw(2, "press"));
    }

    #[test]
    fn test_parse_spec() {
        let spec: DistributionSpec =
            serde_json::from_str(r#"{"kind": "normal", "mean": 3.0, "std_dev": 0.5}"#).unwrap();
        assert_eq!(
            spec,
            DistributionSpec::Normal {
                mean: 3.0,
                std_dev: 0.5
            }
        );
        let unknown = serde_json::from_str::<DistributionSpec>(r#"{"kind": "weibull"}"#);
        assert!(unknown.is_err());
    }
}
