//! Independent replications of a line and their aggregated estimates.

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::statistics::Statistics;

use crate::{
    EntityId, LineBalance, LineConfig, LineTopology, RunResult, Simulation, SimulationError,
};

/// Confidence level of the reported intervals.
const CONFIDENCE: f64 = 0.95;

/// Returns the seed of the `replication`-th replication of a run seeded with `seed`.
#[must_use]
pub fn replication_seed(seed: u64, replication: usize) -> u64 {
    seed.wrapping_add(replication as u64)
}

/// Point estimate of a quantity measured once per replication.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Number of replications.
    pub samples: usize,
    /// Sample mean.
    pub mean: f64,
    /// Sample standard deviation; `None` for fewer than two replications.
    pub std_dev: Option<f64>,
    /// Half width of the 95% confidence interval based on Student's t-distribution;
    /// `None` for fewer than two replications.
    pub half_width: Option<f64>,
}

impl Estimate {
    /// Estimates the mean of `samples`.
    #[must_use]
    pub fn new(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self {
                samples: 0,
                mean: 0.0,
                std_dev: None,
                half_width: None,
            };
        }
        let mean = samples.iter().mean();
        if n < 2 {
            return Self {
                samples: n,
                mean,
                std_dev: None,
                half_width: None,
            };
        }
        let std_dev = samples.iter().std_dev();
        let quantile = StudentsT::new(0.0, 1.0, (n - 1) as f64)
            .ok()
            .map(|t| t.inverse_cdf(1.0 - (1.0 - CONFIDENCE) / 2.0));
        Self {
            samples: n,
            mean,
            std_dev: Some(std_dev),
            half_width: quantile.map(|q| q * std_dev / (n as f64).sqrt()),
        }
    }

    /// Bounds of the confidence interval, if available.
    #[must_use]
    pub fn interval(&self) -> Option<(f64, f64)> {
        self.half_width.map(|h| (self.mean - h, self.mean + h))
    }
}

/// Per-machine results aggregated over replications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineEstimate {
    /// Machine ID.
    pub id: EntityId,
    /// Machine name.
    pub name: String,
    /// Utilization estimate.
    pub utilization: Estimate,
    /// In how many replications the machine was the bottleneck.
    pub bottleneck_count: usize,
}

/// Results of all replications of a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationReport {
    /// Global seed.
    pub seed: u64,
    /// Throughput estimate.
    pub throughput: Estimate,
    /// Estimate of the mean cycle time.
    pub cycle_time: Estimate,
    /// Per-machine estimates in declaration order.
    pub machines: Vec<MachineEstimate>,
    /// Static balance analysis of the line.
    pub balance: LineBalance,
    /// Results of individual replications, ordered by replication index.
    pub replications: Vec<RunResult>,
}

impl ReplicationReport {
    /// Aggregates results of replications of `topology`.
    #[must_use]
    pub fn new(seed: u64, topology: &LineTopology, replications: Vec<RunResult>) -> Self {
        let estimate = |f: &dyn Fn(&RunResult) -> f64| {
            Estimate::new(&replications.iter().map(f).collect::<Vec<_>>())
        };
        let machines = topology
            .machines()
            .enumerate()
            .map(|(idx, node)| MachineEstimate {
                id: node.id,
                name: node.name.clone(),
                utilization: estimate(&|r| {
                    r.machines.get(idx).map_or(0.0, |m| m.utilization)
                }),
                bottleneck_count: replications
                    .iter()
                    .filter(|r| r.bottleneck_id == Some(node.id))
                    .count(),
            })
            .collect();
        Self {
            seed,
            throughput: estimate(&|r| r.throughput),
            cycle_time: estimate(&|r| r.cycle_time.mean),
            machines,
            balance: LineBalance::new(topology),
            replications,
        }
    }
}

/// Runs all replications of `config` in parallel, each with its own seed, and aggregates them.
/// The progress bar, if given, is incremented after each finished replication.
///
/// # Errors
///
/// Returns [`SimulationError::Config`] if the configuration is invalid, or the error of the
/// first failed replication.
pub fn run_replications(
    config: &LineConfig,
    progress: Option<&ProgressBar>,
) -> Result<ReplicationReport, SimulationError> {
    config.validate()?;
    let topology = config.topology()?;
    log::info!(
        "Running {} replications of a line with {} entities",
        config.replications,
        topology.nodes().len()
    );
    let results = (0..config.replications)
        .into_par_iter()
        .map(|replication| {
            let seed = replication_seed(config.seed, replication);
            let result =
                Simulation::new(topology.clone(), config.horizon, seed, replication)?.run();
            if let Some(pb) = progress {
                pb.inc(1);
            }
            result
        })
        .collect::<Result<Vec<_>, _>>()?;
    let report = ReplicationReport::new(config.seed, &topology, results);
    log::info!(
        "Throughput {:.4} (+/- {:.4}), mean cycle time {:.3}",
        report.throughput.mean,
        report.throughput.half_width.unwrap_or(0.0),
        report.cycle_time.mean
    );
    Ok(report)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{DistributionSpec, Horizon, StationConfig};
    use float_cmp::approx_eq;

    #[test]
    fn test_estimate() {
        let estimate = Estimate::new(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(estimate.samples, 5);
        assert!(approx_eq!(f64, estimate.mean, 3.0, epsilon = 1e-12));
        assert!(approx_eq!(
            f64,
            estimate.std_dev.unwrap(),
            2.5_f64.sqrt(),
            epsilon = 1e-12
        ));
        // t(0.975, 4) = 2.7764
        assert!((estimate.half_width.unwrap() - 1.9632).abs() < 1e-3);
        let (low, high) = estimate.interval().unwrap();
        assert!(low < 3.0 && 3.0 < high);
    }

    #[test]
    fn test_estimate_of_single_sample() {
        let estimate = Estimate::new(&[4.0]);
        assert_eq!(estimate.mean, 4.0);
        assert_eq!(estimate.std_dev, None);
        assert_eq!(estimate.interval(), None);
    }

    #[test]
    fn test_replication_seed() {
        assert_eq!(replication_seed(10, 0), 10);
        assert_eq!(replication_seed(10, 3), 13);
        assert_eq!(replication_seed(u64::MAX, 1), 0);
    }

    #[test]
    fn test_run_replications() {
        let config = LineConfig {
            seed: 5,
            arrival: DistributionSpec::Exponential { mean: 2.0 },
            horizon: Horizon::Time(200.0),
            replications: 4,
            stations: vec![
                StationConfig::Machine {
                    name: String::from("cut"),
                    cycle_time: DistributionSpec::Exponential { mean: 1.0 },
                    capacity: 1,
                },
                StationConfig::Buffer {
                    name: String::from("queue"),
                    capacity: Some(3),
                },
                StationConfig::Machine {
                    name: String::from("weld"),
                    cycle_time: DistributionSpec::Exponential { mean: 1.5 },
                    capacity: 1,
                },
            ],
        };
        let report = run_replications(&config, None).unwrap();
        assert_eq!(report.replications.len(), 4);
        let seeds: Vec<_> = report.replications.iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![5, 6, 7, 8]);
        assert!(report.throughput.half_width.is_some());
        assert_eq!(
            report
                .machines
                .iter()
                .map(|m| m.bottleneck_count)
                .sum::<usize>(),
            4
        );
        assert_eq!(report.balance.bottleneck.as_deref(), Some("weld"));
        let sequential = Simulation::from_config(&config, 2).unwrap().run().unwrap();
        assert_eq!(report.replications[2], sequential);
    }
}
