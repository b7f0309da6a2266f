//! Discrete-event simulation of a factory production line.
//!
//! Jobs are generated by a single [`Source`], flow through a sequence of [`Machine`]s and
//! [`Buffer`]s, and finish in a [`Sink`]. Machines have stochastic cycle times, buffers are
//! bounded FIFO queues, and a full buffer blocks the machine upstream of it. A run produces a
//! [`RunResult`] with throughput, utilization, blocking, and bottleneck metrics meant to guide
//! line-balancing decisions.
//!
//! # Examples
//!
//! ```
//! # use linesim::{DistributionSpec, Horizon, LineConfig, StationConfig, Simulation};
//! let config = LineConfig {
//!     seed: 7,
//!     arrival: DistributionSpec::Constant { value: 5.0 },
//!     horizon: Horizon::Jobs(10),
//!     replications: 1,
//!     stations: vec![
//!         StationConfig::Buffer { name: "queue".into(), capacity: None },
//!         StationConfig::Machine {
//!             name: "press".into(),
//!             cycle_time: DistributionSpec::Constant { value: 5.0 },
//!             capacity: 1,
//!         },
//!     ],
//! };
//! let mut simulation = Simulation::from_config(&config, 0).unwrap();
//! let result = simulation.run().unwrap();
//! assert_eq!(result.completed, 10);
//! assert_eq!(result.bottleneck.as_deref(), Some("press"));
//! ```

#![warn(
    missing_docs,
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

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

mod balance;
pub use balance::{BalanceMode, LineBalance, LineDesign, StationDesign, StationLoad, StationRange};

mod buffer;
pub use buffer::{Buffer, BufferState};

mod config;
pub use config::{Horizon, LineConfig, StationConfig};

mod error;
pub use error::{ConfigError, DistributionError, SimulationError};

mod machine;
pub use machine::{Machine, MachineState};

mod replication;
pub use replication::{
    replication_seed, run_replications, Estimate, MachineEstimate, ReplicationReport,
};

mod scheduler;
pub use scheduler::{EmptyQueue, Event, EventHandle, EventKind, Scheduler};

mod simulation;
pub use simulation::Simulation;

mod sink;
pub use sink::Sink;

mod source;
pub use source::Source;

mod stats;
pub use stats::{
    BufferReport, Collector, CycleTimeSummary, LoadBand, MachineReport, RunResult, SourceReport,
    Transition, WipSample,
};

mod topology;
pub use topology::{EntitySpec, LineTopology, Node, TopologyBuilder};

mod variate;
pub use variate::{stream_rng, DistributionSpec, Variate};

/// Identifies an entity (source, machine, buffer, or sink) within a line topology.
///
/// IDs are assigned in declaration order, which is also the order used to break ties when
/// comparing entities, e.g., when selecting a bottleneck.
#[derive(
    From,
    Into,
    Debug,
    PartialEq,
    PartialOrd,
    Eq,
    Ord,
    Serialize,
    Deserialize,
    Copy,
    Clone,
    Hash,
    Display,
)]
pub struct EntityId(usize);

/// Job ID, unique within a single replication.
#[derive(
    From,
    Into,
    Debug,
    PartialEq,
    PartialOrd,
    Eq,
    Ord,
    Serialize,
    Deserialize,
    Copy,
    Clone,
    Hash,
    Display,
)]
pub struct JobId(u64);

/// The kind of an entity. The set is closed: every entity in a line is one of these.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Hash,
    strum::Display,
    strum::EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Generates jobs.
    Source,
    /// Processes jobs on one or more parallel servers.
    Machine,
    /// Holds work-in-progress between stages.
    Buffer,
    /// Records completed jobs.
    Sink,
}

/// A single stay of a job in an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageVisit {
    /// The entity the job visited.
    pub entity: EntityId,
    /// When the job entered the entity.
    pub enter_time: f64,
    /// When the job left the entity; `None` while the job is still there.
    pub exit_time: Option<f64>,
}

/// A unit of work flowing through the line.
///
/// A job is never cloned by the simulation: it is moved between entities, so it is always in
/// the custody of exactly one of them.
#[derive(Debug, PartialEq, Serialize)]
pub struct Job {
    id: JobId,
    created_at: f64,
    stage_history: Vec<StageVisit>,
}

impl Job {
    /// Creates a job that is entering `entity` at `time`.
    #[must_use]
    pub fn new(id: JobId, entity: EntityId, time: f64) -> Self {
        Self {
            id,
            created_at: time,
            stage_history: vec![StageVisit {
                entity,
                enter_time: time,
                exit_time: None,
            }],
        }
    }

    /// The ID of this job.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The time of the simulation when the job was created by the source.
    #[must_use]
    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    /// All visits of the job, in the order they happened.
    #[must_use]
    pub fn stage_history(&self) -> &[StageVisit] {
        &self.stage_history
    }

    /// The entity currently holding the job, according to its history.
    #[must_use]
    pub fn current_entity(&self) -> Option<EntityId> {
        self.stage_history
            .last()
            .filter(|visit| visit.exit_time.is_none())
            .map(|visit| visit.entity)
    }

    /// Closes the current visit and opens a new one at `entity`.
    pub(crate) fn move_to(&mut self, entity: EntityId, time: f64) {
        self.leave(time);
        self.stage_history.push(StageVisit {
            entity,
            enter_time: time,
            exit_time: None,
        });
    }

    /// Closes the current visit.
    pub(crate) fn leave(&mut self, time: f64) {
        if let Some(visit) = self.stage_history.last_mut() {
            if visit.exit_time.is_none() {
                visit.exit_time = Some(time);
            }
        }
    }
}
