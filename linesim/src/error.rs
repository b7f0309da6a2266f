use crate::{EntityId, JobId};

/// Invalid parameters of a duration distribution.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DistributionError {
    /// A parameter is NaN or infinite.
    #[error("parameter `{0}` must be finite")]
    NotFinite(&'static str),
    /// A duration that can never be negative was given a negative value.
    #[error("parameter `{name}` must be non-negative, but is {value}")]
    Negative {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    /// A mean that must be strictly positive is zero or negative.
    #[error("mean must be positive, but is {0}")]
    NonPositiveMean(f64),
    /// Lower bound of a uniform distribution exceeds the upper bound.
    #[error("invalid range: low ({low}) is greater than high ({high})")]
    InvalidRange {
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
    },
}

/// Errors found while validating a line configuration, before any run starts.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A distribution of the named entity is invalid.
    #[error("invalid distribution for `{entity}`: {source}")]
    Distribution {
        /// Entity name.
        entity: String,
        /// What is wrong with the distribution.
        source: DistributionError,
    },
    /// A machine or buffer was configured with zero capacity.
    #[error("capacity of `{0}` must be at least 1")]
    ZeroCapacity(String),
    /// Two entities share a name.
    #[error("duplicate entity name: `{0}`")]
    DuplicateName(String),
    /// A connection references an entity that was never added.
    #[error("unknown entity ID: {0}")]
    UnknownEntity(EntityId),
    /// The line must have exactly one source.
    #[error("expected exactly one source, found {0}")]
    SourceCount(usize),
    /// The line must have at least one sink.
    #[error("line has no sink")]
    NoSink,
    /// Connections form a cycle going through the named entity.
    #[error("cyclic topology through `{0}`")]
    Cycle(String),
    /// An entity has the wrong number of upstream or downstream neighbors.
    #[error(
        "`{entity}` has {upstream} upstream and {downstream} downstream neighbors, \
         expected {expected_upstream} and {expected_downstream}"
    )]
    Degree {
        /// Entity name.
        entity: String,
        /// Actual number of upstream neighbors.
        upstream: usize,
        /// Actual number of downstream neighbors.
        downstream: usize,
        /// Required number of upstream neighbors.
        expected_upstream: usize,
        /// Required number of downstream neighbors.
        expected_downstream: usize,
    },
    /// Run horizon is empty or not finite.
    #[error("invalid horizon: {0}")]
    InvalidHorizon(String),
    /// At least one replication must be requested.
    #[error("number of replications must be at least 1")]
    NoReplications,
    /// Arrivals with zero mean interval never let the clock advance in a time-bounded run.
    #[error("mean inter-arrival time must be positive for a time horizon")]
    ZeroArrivalInterval,
    /// The configuration could not be parsed.
    #[error("unable to parse line configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// A line design needs at least one station.
    #[error("line design has no stations")]
    NoStations,
    /// A station's processing time range is negative, inverted, or not finite.
    #[error("invalid processing time range of `{station}`: [{min}, {max}]")]
    InvalidStationRange {
        /// Station name.
        station: String,
        /// Shortest processing time.
        min: f64,
        /// Longest processing time.
        max: f64,
    },
    /// No cycle time fits within the ranges of all stations.
    #[error(
        "infeasible ranges: fastest feasible cycle ({fastest}) exceeds \
         slowest feasible cycle ({slowest})"
    )]
    InfeasibleRanges {
        /// Largest station minimum.
        fastest: f64,
        /// Smallest station maximum.
        slowest: f64,
    },
    /// A line design parameter is out of its range.
    #[error("invalid design parameter `{name}`: {value}")]
    InvalidDesignParameter {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
}

/// Unrecoverable failures of a running simulation.
///
/// Apart from [`SimulationError::Config`], these indicate a logic defect rather than a runtime
/// condition, and carry the entity and the simulated time at which the defect was detected.
#[derive(thiserror::Error, Debug)]
pub enum SimulationError {
    /// The configuration was rejected before the run started.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No events are left although the termination condition has not been reached.
    #[error(
        "[{time}] event queue exhausted before the horizon: {completed} of {created} jobs completed"
    )]
    QueueExhausted {
        /// Simulated time.
        time: f64,
        /// Jobs completed so far.
        completed: u64,
        /// Jobs created so far.
        created: u64,
    },
    /// A job was handed over by an entity that does not hold it.
    #[error("[{time}] job {job} claimed by `{entity}` is in custody of {holder}")]
    Custody {
        /// Job ID.
        job: JobId,
        /// Entity that claimed the job.
        entity: String,
        /// Actual holder, if any.
        holder: String,
        /// Simulated time.
        time: f64,
    },
    /// An event referenced a job that the target entity does not hold.
    #[error("[{time}] `{entity}` does not hold job {job}")]
    MissingJob {
        /// Entity name.
        entity: String,
        /// Job ID.
        job: JobId,
        /// Simulated time.
        time: f64,
    },
    /// An event or a job was routed to an entity that cannot handle it.
    #[error("[{time}] `{entity}` cannot handle {what}")]
    Misrouted {
        /// Entity name.
        entity: String,
        /// Description of the misrouted item.
        what: String,
        /// Simulated time.
        time: f64,
    },
    /// A job was pushed to a full buffer after it reported free capacity.
    #[error("[{time}] buffer `{entity}` overflowed")]
    BufferOverflow {
        /// Buffer name.
        entity: String,
        /// Simulated time.
        time: f64,
    },
}
