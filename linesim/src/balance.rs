//! Static line-balance analysis computed from the configuration alone, and the design of
//! station cycle times from their feasible ranges.

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::{
    ConfigError, DistributionSpec, EntityId, EntitySpec, LineTopology, LoadBand, StationConfig,
    Variate,
};

/// Expected load of a single machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationLoad {
    /// Machine ID.
    pub id: EntityId,
    /// Machine name.
    pub name: String,
    /// Number of parallel servers.
    pub capacity: usize,
    /// Mean processing time of a single job.
    pub mean_cycle_time: f64,
    /// Mean cycle time divided by capacity: the average time between departures when the
    /// machine is never starved or blocked.
    pub effective_cycle_time: f64,
    /// Effective cycle time divided by the mean inter-arrival time. `None` if jobs arrive
    /// with zero mean interval.
    pub offered_load: Option<f64>,
    /// Classification of the offered load.
    pub load_band: Option<LoadBand>,
}

/// Expected balance of a line, ignoring variability and blocking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineBalance {
    /// Mean time between arrivals at the source.
    pub arrival_interval: f64,
    /// Loads of machines in declaration order.
    pub stations: Vec<StationLoad>,
    /// Machine with the largest effective cycle time; the first declared wins ties.
    pub bottleneck_id: Option<EntityId>,
    /// Name of the bottleneck machine.
    pub bottleneck: Option<String>,
    /// Upper bound on throughput: the smaller of the arrival rate and the bottleneck rate.
    /// `None` if neither is finite.
    pub throughput: Option<f64>,
    /// Total effective cycle time over the number of machines times the bottleneck's
    /// effective cycle time. Equals 1 for a perfectly balanced line.
    pub efficiency: f64,
}

/// Feasible processing times of a station, the input of [`LineBalance::design`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRange {
    /// Station name.
    pub name: String,
    /// Shortest processing time the station can be set to.
    pub min: f64,
    /// Longest processing time the station can be set to.
    pub max: f64,
    /// Coefficient of variation of the designed processing time; deterministic if zero.
    #[serde(default)]
    pub cv: f64,
}

/// How [`LineBalance::design`] picks the common cycle time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BalanceMode {
    /// The shortest cycle every station can reach: the largest station minimum.
    Fastest,
    /// The cycle at which the line reaches the target balance efficiency, in `(0, 1]`,
    /// limited to the feasible cycles.
    Efficiency {
        /// Target efficiency.
        target: f64,
    },
}

/// Processing time chosen for a single station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationDesign {
    /// Station name.
    pub name: String,
    /// Mean processing time.
    pub processing_time: f64,
    /// Processing time distribution: constant, or log-normal if the range has variability.
    pub cycle_time: DistributionSpec,
}

/// Station processing times designed around a common cycle time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDesign {
    /// The common cycle time, before slack and imbalance.
    pub cycle_time: f64,
    /// Jobs per time unit at the cycle time. `None` for a zero cycle.
    pub throughput: Option<f64>,
    /// Total minimal work content over the number of stations times the cycle time.
    pub efficiency: f64,
    /// Designed stations in the given order.
    pub stations: Vec<StationDesign>,
    /// Stations whose minimum processing time binds the cycle.
    pub bottlenecks: Vec<String>,
}

impl LineDesign {
    /// Single-server machine stations with the designed cycle times, in line order.
    #[must_use]
    pub fn station_configs(&self) -> Vec<StationConfig> {
        self.stations
            .iter()
            .map(|station| StationConfig::Machine {
                name: station.name.clone(),
                cycle_time: station.cycle_time,
                capacity: 1,
            })
            .collect()
    }
}

fn design_parameter(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidDesignParameter { name, value })
    }
}

fn rate(interval: f64) -> f64 {
    if interval > 0.0 {
        1.0 / interval
    } else {
        f64::INFINITY
    }
}

impl LineBalance {
    /// Analyzes the machines of `topology`.
    #[must_use]
    pub fn new(topology: &LineTopology) -> Self {
        let arrival_interval = topology.arrival().mean();
        let stations: Vec<_> = topology
            .machines()
            .filter_map(|node| match node.spec {
                EntitySpec::Machine {
                    cycle_time,
                    capacity,
                } => {
                    let mean_cycle_time = cycle_time.mean();
                    let effective_cycle_time = mean_cycle_time / capacity as f64;
                    let offered_load = if arrival_interval > 0.0 {
                        Some(effective_cycle_time / arrival_interval)
                    } else {
                        None
                    };
                    Some(StationLoad {
                        id: node.id,
                        name: node.name.clone(),
                        capacity,
                        mean_cycle_time,
                        effective_cycle_time,
                        offered_load,
                        load_band: offered_load.map(LoadBand::of),
                    })
                }
                _ => None,
            })
            .collect();
        let bottleneck = stations.iter().fold(None, |best: Option<&StationLoad>, s| {
            match best {
                Some(b) if b.effective_cycle_time >= s.effective_cycle_time => Some(b),
                _ => Some(s),
            }
        });
        let max_effective = bottleneck.map_or(0.0, |b| b.effective_cycle_time);
        let throughput = rate(arrival_interval).min(rate(max_effective));
        let efficiency = if max_effective > 0.0 {
            stations.iter().map(|s| s.effective_cycle_time).sum::<f64>()
                / (stations.len() as f64 * max_effective)
        } else {
            1.0
        };
        Self {
            arrival_interval,
            bottleneck_id: bottleneck.map(|b| b.id),
            bottleneck: bottleneck.map(|b| b.name.clone()),
            throughput: Some(throughput).filter(|t| t.is_finite()),
            efficiency,
            stations,
        }
    }

    /// Chooses a processing time for each station from its feasible range.
    ///
    /// The cycle time is the largest station minimum in [`BalanceMode::Fastest`], and
    /// `total work / (stations * target)` limited to the feasible cycles in
    /// [`BalanceMode::Efficiency`]. Each station then gets the cycle plus `slack`, scaled
    /// linearly by its position: with `imbalance` of `f`, station `i` of `n` is scaled by
    /// `1 + f * (i - n / 2) / n`. The result is clamped to the station's range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InfeasibleRanges`] if the largest minimum exceeds the smallest
    /// maximum, and other [`ConfigError`] variants for empty or malformed input.
    ///
    /// # Examples
    ///
    /// ```
    /// # use linesim::{BalanceMode, LineBalance, StationRange};
    /// let range = |name: &str, min: f64, max: f64| StationRange {
    ///     name: name.to_string(),
    ///     min,
    ///     max,
    ///     cv: 0.0,
    /// };
    /// let ranges = [range("cut", 2.0, 6.0), range("weld", 4.0, 8.0)];
    /// let design = LineBalance::design(&ranges, BalanceMode::Fastest, 0.0, 0.0).unwrap();
    /// assert_eq!(design.cycle_time, 4.0);
    /// assert_eq!(design.bottlenecks, vec!["weld"]);
    /// ```
    pub fn design(
        ranges: &[StationRange],
        mode: BalanceMode,
        slack: f64,
        imbalance: f64,
    ) -> Result<LineDesign, ConfigError> {
        let slack = design_parameter("slack", slack)?;
        let imbalance = design_parameter("imbalance", imbalance)?;
        if ranges.is_empty() {
            return Err(ConfigError::NoStations);
        }
        for range in ranges {
            if !(range.min.is_finite() && range.max.is_finite())
                || range.min < 0.0
                || range.min > range.max
            {
                return Err(ConfigError::InvalidStationRange {
                    station: range.name.clone(),
                    min: range.min,
                    max: range.max,
                });
            }
        }
        let count = ranges.len() as f64;
        let total_work: f64 = ranges.iter().map(|range| range.min).sum();
        let fastest = ranges.iter().map(|range| range.min).fold(0.0, f64::max);
        let slowest = ranges
            .iter()
            .map(|range| range.max)
            .fold(f64::INFINITY, f64::min);
        if fastest > slowest {
            return Err(ConfigError::InfeasibleRanges { fastest, slowest });
        }
        let cycle_time = match mode {
            BalanceMode::Fastest => fastest,
            BalanceMode::Efficiency { target } => {
                if !(target > 0.0 && target <= 1.0) {
                    return Err(ConfigError::InvalidDesignParameter {
                        name: "target",
                        value: target,
                    });
                }
                (total_work / (count * target)).clamp(fastest, slowest)
            }
        };
        let stations = ranges
            .iter()
            .enumerate()
            .map(|(idx, range)| {
                let scale = 1.0 + imbalance * (idx as f64 - count / 2.0) / count;
                let processing_time = ((cycle_time + slack) * scale).clamp(range.min, range.max);
                let cycle_time = if range.cv != 0.0 && processing_time > 0.0 {
                    DistributionSpec::LogNormal {
                        mean: processing_time,
                        cv: range.cv,
                    }
                } else {
                    DistributionSpec::Constant {
                        value: processing_time,
                    }
                };
                match Variate::try_from(cycle_time) {
                    Ok(_) => Ok(StationDesign {
                        name: range.name.clone(),
                        processing_time,
                        cycle_time,
                    }),
                    Err(source) => Err(ConfigError::Distribution {
                        entity: range.name.clone(),
                        source,
                    }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!(
            "designed cycle time {} for {} stations (slack {}, imbalance {})",
            cycle_time,
            stations.len(),
            slack,
            imbalance
        );
        Ok(LineDesign {
            cycle_time,
            throughput: Some(rate(cycle_time)).filter(|t| t.is_finite()),
            efficiency: if cycle_time > 0.0 {
                total_work / (count * cycle_time)
            } else {
                1.0
            },
            stations,
            bottlenecks: ranges
                .iter()
                .filter(|range| range.min >= fastest)
                .map(|range| range.name.clone())
                .collect(),
        })
    }
}
