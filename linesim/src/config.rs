use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, DistributionSpec, LineTopology, TopologyBuilder};

/// Name of the implicit source at the start of a configured line.
pub const SOURCE_NAME: &str = "source";

/// Name of the implicit sink at the end of a configured line.
pub const SINK_NAME: &str = "sink";

/// When a replication stops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    /// Run until the simulated time reaches this value. Events scheduled at exactly this time
    /// are still processed.
    Time(f64),
    /// Create this many jobs and run until all of them have completed.
    Jobs(u64),
}

/// A station of a linear line, in the order jobs visit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StationConfig {
    /// A processing stage.
    Machine {
        /// Unique name.
        name: String,
        /// Processing time distribution.
        cycle_time: DistributionSpec,
        /// Number of parallel servers.
        #[serde(default = "default_capacity")]
        capacity: usize,
    },
    /// A FIFO buffer.
    Buffer {
        /// Unique name.
        name: String,
        /// Maximum number of jobs; unbounded if missing.
        #[serde(default)]
        capacity: Option<usize>,
    },
}

fn default_capacity() -> usize {
    1
}

fn default_replications() -> usize {
    1
}

/// Configuration of a simulation, as provided by the parameter-adjustment layer.
///
/// The line always starts with a source named [`SOURCE_NAME`] and ends with a sink named
/// [`SINK_NAME`]; stations are wired in between in the listed order.
///
/// # Examples
///
/// ```
/// # use linesim::{Horizon, LineConfig};
/// let config = LineConfig::from_reader(r#"{
///     "seed": 42,
///     "arrival": {"kind": "exponential", "mean": 4.0},
///     "horizon": {"time": 1000.0},
///     "stations": [
///         {"kind": "machine", "name": "cut", "cycle_time": {"kind": "constant", "value": 3.0}},
///         {"kind": "buffer", "name": "wip", "capacity": 5},
///         {"kind": "machine", "name": "weld", "capacity": 2,
///          "cycle_time": {"kind": "uniform", "low": 4.0, "high": 8.0}}
///     ]
/// }"#.as_bytes()).unwrap();
/// assert_eq!(config.horizon, Horizon::Time(1000.0));
/// assert_eq!(config.replications, 1);
/// assert_eq!(config.topology().unwrap().nodes().len(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineConfig {
    /// Global random seed; each replication and entity derives its own stream from it.
    #[serde(default)]
    pub seed: u64,
    /// Distribution of time between consecutive arrivals at the source.
    pub arrival: DistributionSpec,
    /// When each replication stops.
    pub horizon: Horizon,
    /// Number of independent replications.
    #[serde(default = "default_replications")]
    pub replications: usize,
    /// Machines and buffers in line order.
    pub stations: Vec<StationConfig>,
}

impl Horizon {
    /// Checks that a run with arrivals drawn from `arrival` can reach this horizon.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHorizon`] for a non-positive or infinite time and for zero
    /// jobs, and [`ConfigError::ZeroArrivalInterval`] if a time horizon is combined with
    /// arrivals that are always zero and never advance the clock.
    pub fn validate(&self, arrival: &DistributionSpec) -> Result<(), ConfigError> {
        match *self {
            Self::Time(time) if !(time.is_finite() && time > 0.0) => {
                Err(ConfigError::InvalidHorizon(format!(
                    "time must be positive and finite, but is {}",
                    time
                )))
            }
            Self::Jobs(0) => Err(ConfigError::InvalidHorizon(String::from(
                "number of jobs must be positive",
            ))),
            Self::Time(_) if arrival.is_degenerate_at_zero() => {
                Err(ConfigError::ZeroArrivalInterval)
            }
            _ => Ok(()),
        }
    }
}

impl StationConfig {
    /// The name of the station.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Machine { name, .. } | Self::Buffer { name, .. } => name,
        }
    }
}

impl LineConfig {
    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the input is not a valid configuration, including
    /// unknown distribution or station kinds, and negative capacities.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Checks the run parameters and the line itself.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.horizon.validate(&self.arrival)?;
        if self.replications == 0 {
            return Err(ConfigError::NoReplications);
        }
        self.topology().map(|_| ())
    }

    /// Builds the linear topology `source -> stations... -> sink`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any entity is invalid, e.g., has zero capacity or an invalid
    /// distribution, or if names are not unique.
    pub fn topology(&self) -> Result<LineTopology, ConfigError> {
        let mut builder = TopologyBuilder::default();
        let mut previous = builder.source(SOURCE_NAME, self.arrival);
        for station in &self.stations {
            let id = match station {
                StationConfig::Machine {
                    name,
                    cycle_time,
                    capacity,
                } => builder.machine(name.as_str(), *cycle_time, *capacity),
                StationConfig::Buffer { name, capacity } => {
                    builder.buffer(name.as_str(), *capacity)
                }
            };
            builder.connect(previous, id);
            previous = id;
        }
        let sink = builder.sink(SINK_NAME);
        builder.connect(previous, sink);
        builder.build()
    }
}
