use std::collections::{BTreeMap, VecDeque};

use rand_chacha::ChaCha8Rng;
use rand_distr::Distribution;
use serde::Serialize;

use crate::{EntityId, Job, JobId, Variate};

/// State of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MachineState {
    /// No jobs on any server.
    Idle,
    /// At least one server is processing a job.
    Busy,
    /// No server is processing, but at least one holds a finished job that the downstream
    /// neighbor cannot accept yet.
    Blocked,
}

/// A processing stage with one or more identical parallel servers.
///
/// Every job entering the machine occupies one server for a cycle time drawn independently
/// from the machine's distribution. A job whose service is finished but cannot be released
/// downstream keeps occupying its server: the machine does not admit a new job to that server
/// until the blocked job leaves.
#[derive(Debug)]
pub struct Machine {
    id: EntityId,
    capacity: usize,
    cycle_time: Variate,
    rng: ChaCha8Rng,
    in_service: BTreeMap<JobId, Job>,
    blocked: VecDeque<Job>,
}

impl Machine {
    /// Constructs a machine with `capacity` servers, drawing cycle times from `cycle_time`
    /// using its own random stream `rng`.
    #[must_use]
    pub fn new(id: EntityId, capacity: usize, cycle_time: Variate, rng: ChaCha8Rng) -> Self {
        Self {
            id,
            capacity,
            cycle_time,
            rng,
            in_service: BTreeMap::new(),
            blocked: VecDeque::new(),
        }
    }

    /// The ID of this machine.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Number of parallel servers.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of servers occupied, either processing or blocked.
    #[must_use]
    pub fn occupants(&self) -> usize {
        self.in_service.len() + self.blocked.len()
    }

    /// Number of servers holding a finished job that cannot move on.
    #[must_use]
    pub fn blocked_servers(&self) -> usize {
        self.blocked.len()
    }

    /// Checks whether there is a free server.
    #[must_use]
    pub fn has_room(&self) -> bool {
        self.occupants() < self.capacity
    }

    /// Returns the current state of the machine.
    #[must_use]
    pub fn state(&self) -> MachineState {
        if !self.in_service.is_empty() {
            MachineState::Busy
        } else if !self.blocked.is_empty() {
            MachineState::Blocked
        } else {
            MachineState::Idle
        }
    }

    /// Puts the job on a free server and returns its sampled cycle time.
    ///
    /// # Errors
    ///
    /// Returns the job back if all servers are occupied.
    pub fn start(&mut self, job: Job) -> Result<f64, Job> {
        if !self.has_room() {
            return Err(job);
        }
        let duration = self.cycle_time.sample(&mut self.rng);
        log::debug!(
            "Machine {} started job {} for {:.3}",
            self.id,
            job.id(),
            duration
        );
        self.in_service.insert(job.id(), job);
        Ok(duration)
    }

    /// Takes the job whose service has just finished off its server.
    /// Returns `None` if the job is not being processed by this machine.
    pub fn finish(&mut self, job: JobId) -> Option<Job> {
        self.in_service.remove(&job)
    }

    /// Parks a finished job on its server until the downstream neighbor has room.
    pub(crate) fn block(&mut self, job: Job) {
        log::debug!("Machine {} blocked by job {}", self.id, job.id());
        self.blocked.push_back(job);
    }

    /// Takes the job that has been blocked the longest, if any.
    pub(crate) fn unblock(&mut self) -> Option<Job> {
        self.blocked.pop_front()
    }

    /// Puts a job taken by [`Machine::unblock`] back in front of the blocked ones.
    pub(crate) fn reblock(&mut self, job: Job) {
        self.blocked.push_front(job);
    }
}
