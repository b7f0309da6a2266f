use std::collections::HashMap;
use std::convert::TryFrom;

use crate::{
    replication_seed, stream_rng, Buffer, Collector, ConfigError, DistributionSpec, EntityId,
    EntityKind, EntitySpec, EventKind, Horizon, Job, JobId, LineConfig, LineTopology, Machine,
    RunResult, Scheduler, SimulationError, Sink, Source, Transition, Variate,
};

/// The closed set of entities a line consists of.
#[derive(Debug)]
enum Entity {
    Source(Source),
    Machine(Machine),
    Buffer(Buffer),
    Sink(Sink),
}

impl Entity {
    /// Checks whether the entity would accept a job right now.
    fn has_room(&self) -> bool {
        match self {
            Self::Source(_) => false,
            Self::Machine(machine) => machine.has_room(),
            Self::Buffer(buffer) => buffer.has_room(),
            Self::Sink(_) => true,
        }
    }
}

/// Outcome of handing a job to the downstream neighbor.
enum Handoff {
    Accepted,
    Refused(Job),
}

fn misrouted(
    topology: &LineTopology,
    entity: EntityId,
    what: impl Into<String>,
    time: f64,
) -> SimulationError {
    SimulationError::Misrouted {
        entity: topology.name(entity).to_string(),
        what: what.into(),
        time,
    }
}

/// A single replication of a production line.
///
/// Owns every entity, the scheduler, and the statistics collector. Entities never call each
/// other: the simulation dispatches each event to its target and performs hand-offs between
/// neighbors, so that a job is moved from one owner to the next.
#[derive(Debug)]
pub struct Simulation {
    topology: LineTopology,
    entities: Vec<Entity>,
    scheduler: Scheduler,
    collector: Collector,
    custody: HashMap<JobId, EntityId>,
    horizon: Horizon,
    stopped: bool,
}

impl Simulation {
    /// Creates a replication of `topology` with entity streams derived from `seed`, and
    /// schedules the first arrival at time zero.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Config`] if the horizon cannot be reached with the topology's
    /// arrival distribution.
    pub fn new(
        topology: LineTopology,
        horizon: Horizon,
        seed: u64,
        replication: usize,
    ) -> Result<Self, SimulationError> {
        horizon.validate(&topology.arrival())?;
        let limit = match horizon {
            Horizon::Jobs(jobs) => Some(jobs),
            Horizon::Time(_) => None,
        };
        let entities = topology
            .nodes()
            .iter()
            .map(|node| {
                let variate = |spec: DistributionSpec| {
                    Variate::try_from(spec).map_err(|source| ConfigError::Distribution {
                        entity: node.name.clone(),
                        source,
                    })
                };
                let rng = stream_rng(seed, &node.name);
                Ok(match node.spec {
                    EntitySpec::Source { arrival } => {
                        Entity::Source(Source::new(node.id, variate(arrival)?, rng, limit))
                    }
                    EntitySpec::Machine {
                        cycle_time,
                        capacity,
                    } => Entity::Machine(Machine::new(
                        node.id,
                        capacity,
                        variate(cycle_time)?,
                        rng,
                    )),
                    EntitySpec::Buffer { capacity } => {
                        Entity::Buffer(Buffer::new(node.id, capacity))
                    }
                    EntitySpec::Sink => Entity::Sink(Sink::new(node.id)),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let mut scheduler = Scheduler::default();
        let first_arrival = scheduler.schedule_immediately(topology.source(), EventKind::Arrive);
        let collector = Collector::new(&topology, replication, seed);
        let mut simulation = Self {
            topology,
            entities,
            scheduler,
            collector,
            custody: HashMap::new(),
            horizon,
            stopped: false,
        };
        let source = simulation.topology.source();
        simulation.source_mut(source)?.set_next_arrival(Some(first_arrival));
        Ok(simulation)
    }

    /// Validates the configuration and creates its `replication`-th replication.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Config`] if the configuration is invalid.
    pub fn from_config(config: &LineConfig, replication: usize) -> Result<Self, SimulationError> {
        config.validate()?;
        Self::new(
            config.topology()?,
            config.horizon,
            replication_seed(config.seed, replication),
            replication,
        )
    }

    /// The validated topology of the simulated line.
    #[must_use]
    pub fn topology(&self) -> &LineTopology {
        &self.topology
    }

    /// The scheduler holding the clock and pending events.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Current simulation time.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.scheduler.time()
    }

    /// Statistics collected so far.
    #[must_use]
    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Number of jobs currently in the system.
    #[must_use]
    pub fn in_system(&self) -> usize {
        self.custody.len()
    }

    /// The entity holding the job, if the job is in the system.
    #[must_use]
    pub fn holder(&self, job: JobId) -> Option<EntityId> {
        self.custody.get(&job).copied()
    }

    /// Returns the machine with the given ID, or `None` if the entity is not a machine.
    #[must_use]
    pub fn machine(&self, id: EntityId) -> Option<&Machine> {
        match self.entities.get(usize::from(id)) {
            Some(Entity::Machine(machine)) => Some(machine),
            _ => None,
        }
    }

    /// Returns the buffer with the given ID, or `None` if the entity is not a buffer.
    #[must_use]
    pub fn buffer(&self, id: EntityId) -> Option<&Buffer> {
        match self.entities.get(usize::from(id)) {
            Some(Entity::Buffer(buffer)) => Some(buffer),
            _ => None,
        }
    }

    /// Returns the source of the line.
    #[must_use]
    pub fn source(&self) -> Option<&Source> {
        match self.entities.get(usize::from(self.topology.source())) {
            Some(Entity::Source(source)) => Some(source),
            _ => None,
        }
    }

    /// Checks if the termination condition has been reached.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match self.horizon {
            Horizon::Jobs(jobs) => self.collector.completed() >= jobs,
            Horizon::Time(end) => self.stopped || self.scheduler.time() > end,
        }
    }

    /// Runs until the horizon is reached, stops, and returns the results.
    ///
    /// Calling it again after the run has stopped returns the same results.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::QueueExhausted`] if no events are left before the horizon,
    /// and other [`SimulationError`]s if an entity detects an inconsistent state.
    pub fn run(&mut self) -> Result<RunResult, SimulationError> {
        if self.stopped {
            return Ok(self.finalize());
        }
        log::info!(
            "Starting replication with {} entities until {:?}",
            self.entities.len(),
            self.horizon
        );
        while !self.is_finished() {
            let next = match self.scheduler.peek_time() {
                Some(time) => time,
                None => {
                    return Err(SimulationError::QueueExhausted {
                        time: self.scheduler.time(),
                        completed: self.collector.completed(),
                        created: self.collector.created(),
                    })
                }
            };
            if let Horizon::Time(end) = self.horizon {
                if next > end {
                    self.scheduler.fast_forward(end);
                    break;
                }
            }
            self.step()?;
        }
        self.stop();
        let result = self.finalize();
        log::info!(
            "Replication finished at {:.3}: {} jobs completed, throughput {:.4}",
            result.elapsed,
            result.completed,
            result.throughput
        );
        Ok(result)
    }

    /// Cancels all pending events. No further events are dispatched by [`Simulation::run`].
    pub fn stop(&mut self) {
        let source = self.topology.source();
        let next_arrival = self
            .source_mut(source)
            .ok()
            .and_then(Source::take_next_arrival);
        if let Some(handle) = next_arrival {
            self.scheduler.cancel(handle);
        }
        let cancelled = self.scheduler.cancel_all();
        if cancelled > 0 {
            log::debug!("Cancelled {} pending events", cancelled);
        }
        self.stopped = true;
    }

    /// Computes the results from the statistics collected so far, without modifying anything.
    #[must_use]
    pub fn finalize(&self) -> RunResult {
        self.collector.finalize(self.scheduler.time())
    }

    /// Dispatches the next event. Returns `false` if there are no events left.
    ///
    /// # Errors
    ///
    /// Returns a [`SimulationError`] if handling the event reveals an inconsistent state.
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        let event = match self.scheduler.pop() {
            Some(event) => event,
            None => return Ok(false),
        };
        let now = event.time;
        let target = event.target;
        log::trace!(
            "[{:.3}] {:?} at {}",
            now,
            event.kind,
            self.topology.name(target)
        );
        let kind = self.topology.node(target).spec.kind();
        match (event.kind, kind) {
            (EventKind::Arrive, EntityKind::Source) => self.arrive_at_source(now)?,
            (EventKind::Arrive, EntityKind::Buffer)
            | (EventKind::Unblocked, EntityKind::Buffer) => self.drain(target, now)?,
            (EventKind::FinishService { job }, EntityKind::Machine) => {
                self.finish_service(target, job, now)?;
            }
            (EventKind::Unblocked, EntityKind::Source) => self.retry_source(now)?,
            (EventKind::Unblocked, EntityKind::Machine) => self.release_blocked(target, now)?,
            (EventKind::Unblocked, EntityKind::Sink) => {}
            (other, _) => {
                return Err(misrouted(
                    &self.topology,
                    target,
                    format!("event {:?}", other),
                    now,
                ))
            }
        }
        self.collector.sample(now);
        Ok(true)
    }

    fn source_mut(&mut self, id: EntityId) -> Result<&mut Source, SimulationError> {
        match &mut self.entities[usize::from(id)] {
            Entity::Source(source) => Ok(source),
            _ => Err(misrouted(
                &self.topology,
                id,
                "source operations",
                self.scheduler.time(),
            )),
        }
    }

    fn machine_mut(&mut self, id: EntityId) -> Result<&mut Machine, SimulationError> {
        match &mut self.entities[usize::from(id)] {
            Entity::Machine(machine) => Ok(machine),
            _ => Err(misrouted(
                &self.topology,
                id,
                "machine operations",
                self.scheduler.time(),
            )),
        }
    }

    fn buffer_mut(&mut self, id: EntityId) -> Result<&mut Buffer, SimulationError> {
        match &mut self.entities[usize::from(id)] {
            Entity::Buffer(buffer) => Ok(buffer),
            _ => Err(misrouted(
                &self.topology,
                id,
                "buffer operations",
                self.scheduler.time(),
            )),
        }
    }

    /// Tells the upstream neighbor of `id` that `id` has freed capacity.
    fn notify_upstream(&mut self, id: EntityId) {
        if let Some(upstream) = self.topology.upstream(id) {
            self.scheduler
                .schedule_immediately(upstream, EventKind::Unblocked);
        }
    }

    fn arrive_at_source(&mut self, now: f64) -> Result<(), SimulationError> {
        let id = self.topology.source();
        let source = self.source_mut(id)?;
        source.set_next_arrival(None);
        let job = match source.generate(now) {
            Some(job) => job,
            None => return Ok(()),
        };
        let job_id = job.id();
        if let Some(holder) = self.custody.insert(job_id, id) {
            return Err(SimulationError::Custody {
                job: job_id,
                entity: self.topology.name(id).to_string(),
                holder: self.topology.name(holder).to_string(),
                time: now,
            });
        }
        self.collector
            .record(now, Transition::JobCreated { job: job_id });
        match self.transfer(id, job, now)? {
            Handoff::Accepted => self.schedule_arrival(),
            Handoff::Refused(job) => {
                self.source_mut(id)?.hold(job);
                self.collector.record(
                    now,
                    Transition::Blocked {
                        entity: id,
                        job: job_id,
                    },
                );
                Ok(())
            }
        }
    }

    fn schedule_arrival(&mut self) -> Result<(), SimulationError> {
        let id = self.topology.source();
        let source = self.source_mut(id)?;
        if source.is_exhausted() {
            log::debug!("Source created all {} jobs", source.created());
            return Ok(());
        }
        let delay = source.next_interval();
        let handle = self.scheduler.schedule(delay, id, EventKind::Arrive);
        self.source_mut(id)?.set_next_arrival(Some(handle));
        Ok(())
    }

    fn retry_source(&mut self, now: f64) -> Result<(), SimulationError> {
        let id = self.topology.source();
        let job = match self.source_mut(id)?.release() {
            Some(job) => job,
            None => return Ok(()),
        };
        let job_id = job.id();
        match self.transfer(id, job, now)? {
            Handoff::Accepted => {
                self.collector.record(
                    now,
                    Transition::Unblocked {
                        entity: id,
                        job: job_id,
                    },
                );
                self.schedule_arrival()
            }
            Handoff::Refused(job) => {
                self.source_mut(id)?.hold(job);
                Ok(())
            }
        }
    }

    fn drain(&mut self, id: EntityId, now: f64) -> Result<(), SimulationError> {
        let mut moved = false;
        while let Some(job) = self.buffer_mut(id)?.pop() {
            match self.transfer(id, job, now)? {
                Handoff::Accepted => moved = true,
                Handoff::Refused(job) => {
                    self.buffer_mut(id)?.restore(job);
                    break;
                }
            }
        }
        if moved {
            let len = self.buffer_mut(id)?.len();
            self.collector
                .record(now, Transition::BufferLevel { buffer: id, len });
            self.notify_upstream(id);
        }
        Ok(())
    }

    fn finish_service(
        &mut self,
        id: EntityId,
        job_id: JobId,
        now: f64,
    ) -> Result<(), SimulationError> {
        let machine = self.machine_mut(id)?;
        let earlier_blocked = machine.blocked_servers() > 0;
        let job = machine
            .finish(job_id)
            .ok_or_else(|| SimulationError::MissingJob {
                entity: self.topology.name(id).to_string(),
                job: job_id,
                time: now,
            })?;
        self.collector.record(
            now,
            Transition::ServiceFinished {
                machine: id,
                job: job_id,
            },
        );
        let handoff = if earlier_blocked {
            // Blocked jobs leave in the order they finished.
            Handoff::Refused(job)
        } else {
            self.transfer(id, job, now)?
        };
        match handoff {
            Handoff::Accepted => self.notify_upstream(id),
            Handoff::Refused(job) => {
                self.machine_mut(id)?.block(job);
                self.collector.record(
                    now,
                    Transition::Blocked {
                        entity: id,
                        job: job_id,
                    },
                );
            }
        }
        Ok(())
    }

    fn release_blocked(&mut self, id: EntityId, now: f64) -> Result<(), SimulationError> {
        let mut freed = false;
        while let Some(job) = self.machine_mut(id)?.unblock() {
            let job_id = job.id();
            match self.transfer(id, job, now)? {
                Handoff::Accepted => {
                    freed = true;
                    self.collector.record(
                        now,
                        Transition::Unblocked {
                            entity: id,
                            job: job_id,
                        },
                    );
                }
                Handoff::Refused(job) => {
                    self.machine_mut(id)?.reblock(job);
                    break;
                }
            }
        }
        if freed {
            self.notify_upstream(id);
        }
        Ok(())
    }

    /// Hands `job` from `from` to its downstream neighbor, or returns it if there is no room.
    fn transfer(
        &mut self,
        from: EntityId,
        mut job: Job,
        now: f64,
    ) -> Result<Handoff, SimulationError> {
        let job_id = job.id();
        let to = self.topology.downstream(from).ok_or_else(|| {
            misrouted(
                &self.topology,
                from,
                format!("departure of job {}", job_id),
                now,
            )
        })?;
        let holder = self.custody.get(&job_id).copied();
        if holder != Some(from) {
            return Err(SimulationError::Custody {
                job: job_id,
                entity: self.topology.name(from).to_string(),
                holder: holder.map_or_else(
                    || String::from("nobody"),
                    |holder| self.topology.name(holder).to_string(),
                ),
                time: now,
            });
        }
        if !self.entities[usize::from(to)].has_room() {
            return Ok(Handoff::Refused(job));
        }
        job.move_to(to, now);
        self.custody.insert(job_id, to);
        match &mut self.entities[usize::from(to)] {
            Entity::Machine(machine) => {
                let duration = match machine.start(job) {
                    Ok(duration) => duration,
                    Err(_) => {
                        return Err(misrouted(
                            &self.topology,
                            to,
                            format!("job {} with all servers occupied", job_id),
                            now,
                        ))
                    }
                };
                self.scheduler
                    .schedule(duration, to, EventKind::FinishService { job: job_id });
                self.collector.record(
                    now,
                    Transition::ServiceStarted {
                        machine: to,
                        job: job_id,
                    },
                );
            }
            Entity::Buffer(buffer) => {
                if buffer.push(job).is_err() {
                    return Err(SimulationError::BufferOverflow {
                        entity: self.topology.name(to).to_string(),
                        time: now,
                    });
                }
                let len = buffer.len();
                self.collector
                    .record(now, Transition::BufferLevel { buffer: to, len });
                self.scheduler.schedule_immediately(to, EventKind::Arrive);
            }
            Entity::Sink(sink) => {
                let cycle_time = sink.complete(job, now);
                self.custody.remove(&job_id);
                self.collector.record(
                    now,
                    Transition::Completed {
                        job: job_id,
                        cycle_time,
                    },
                );
            }
            Entity::Source(_) => {
                return Err(misrouted(
                    &self.topology,
                    to,
                    format!("job {}", job_id),
                    now,
                ));
            }
        }
        Ok(Handoff::Accepted)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{DistributionSpec, MachineState, TopologyBuilder};
    use float_cmp::approx_eq;

    fn constant(value: f64) -> DistributionSpec {
        DistributionSpec::Constant { value }
    }

    /// `source -> press -> sink`
    fn single_machine(arrival: f64, cycle: f64) -> (LineTopology, EntityId) {
        let mut builder = TopologyBuilder::default();
        let source = builder.source("source", constant(arrival));
        let press = builder.machine("press", constant(cycle), 1);
        let sink = builder.sink("sink");
        builder.connect(source, press).connect(press, sink);
        (builder.build().unwrap(), press)
    }

    #[test]
    fn test_first_arrival_at_zero() {
        let (topology, press) = single_machine(2.0, 1.0);
        let mut simulation = Simulation::new(topology, Horizon::Jobs(3), 0, 0).unwrap();
        assert_eq!(simulation.scheduler().len(), 1);
        assert!(simulation.step().unwrap());
        assert_eq!(simulation.time(), 0.0);
        assert_eq!(simulation.in_system(), 1);
        assert_eq!(simulation.holder(JobId::from(0)), Some(press));
        assert_eq!(
            simulation.machine(press).map(Machine::state),
            Some(MachineState::Busy)
        );
    }

    #[test]
    fn test_jobs_horizon() {
        let (topology, _) = single_machine(2.0, 1.0);
        let mut simulation = Simulation::new(topology, Horizon::Jobs(3), 0, 0).unwrap();
        let result = simulation.run().unwrap();
        assert_eq!(result.created, 3);
        assert_eq!(result.completed, 3);
        assert_eq!(result.in_system, 0);
        // Arrivals at 0, 2, 4; the last job completes at 5.
        assert_eq!(result.elapsed, 5.0);
        assert_eq!(result.makespan, 5.0);
        assert!(approx_eq!(f64, result.cycle_time.mean, 1.0));
        assert!(approx_eq!(f64, result.machines[0].utilization, 3.0 / 5.0));
    }

    #[test]
    fn test_time_horizon_processes_events_at_the_end() {
        let (topology, _) = single_machine(2.0, 1.0);
        let mut simulation = Simulation::new(topology, Horizon::Time(4.0), 0, 0).unwrap();
        let result = simulation.run().unwrap();
        assert_eq!(result.elapsed, 4.0);
        assert_eq!(result.created, 3, "arrival at exactly 4.0 is processed");
        assert_eq!(result.completed, 2);
        assert_eq!(result.in_system, 1);
        assert!(simulation.scheduler().is_empty());
    }

    #[test]
    fn test_time_horizon_fast_forwards_idle_tail() {
        let (topology, _) = single_machine(10.0, 1.0);
        let mut simulation = Simulation::new(topology, Horizon::Time(15.0), 0, 0).unwrap();
        let result = simulation.run().unwrap();
        assert_eq!(result.elapsed, 15.0);
        assert_eq!(result.completed, 2);
        assert!(approx_eq!(f64, result.machines[0].utilization, 2.0 / 15.0));
    }

    #[test]
    fn test_run_after_stop_returns_same_result() {
        let (topology, _) = single_machine(1.0, 1.5);
        let mut simulation = Simulation::new(topology, Horizon::Time(20.0), 3, 0).unwrap();
        let first = simulation.run().unwrap();
        let second = simulation.run().unwrap();
        assert_eq!(first, second);
        assert_eq!(first, simulation.finalize());
    }

    #[test]
    fn test_blocked_source_waits_for_machine() {
        // Arrivals every time unit, processing takes 3: the source is blocked most of the time.
        let (topology, _) = single_machine(1.0, 3.0);
        let mut simulation = Simulation::new(topology, Horizon::Jobs(4), 0, 0).unwrap();
        let result = simulation.run().unwrap();
        assert_eq!(result.completed, 4);
        assert_eq!(result.elapsed, 12.0);
        assert!(result.source.blocked_episodes > 0);
        assert!(approx_eq!(f64, result.machines[0].utilization, 1.0));
    }

    #[test]
    fn test_blocked_machine_keeps_fifo_order() {
        let mut builder = TopologyBuilder::default();
        let source = builder.source("source", constant(0.5));
        let first = builder.machine("first", constant(1.0), 2);
        let buffer = builder.buffer("buffer", Some(1));
        let second = builder.machine("second", constant(4.0), 1);
        let sink = builder.sink("sink");
        builder
            .connect(source, first)
            .connect(first, buffer)
            .connect(buffer, second)
            .connect(second, sink);
        let mut simulation =
            Simulation::new(builder.build().unwrap(), Horizon::Jobs(6), 0, 0).unwrap();
        while !simulation.is_finished() {
            assert!(simulation.step().unwrap());
            let queue = simulation.buffer(buffer).unwrap();
            assert!(queue.len() <= 1);
            if let Some(job) = queue.front() {
                assert_eq!(job.current_entity(), Some(buffer));
            }
        }
        let result = simulation.finalize();
        assert_eq!(result.completed, 6);
        assert!(result.machines[0].blocked_episodes > 0);
        assert_eq!(result.bottleneck.as_deref(), Some("second"));
    }

    #[test]
    fn test_queue_exhausted_reports_progress() {
        let (topology, _) = single_machine(1.0, 1.0);
        let mut simulation = Simulation::new(topology, Horizon::Jobs(2), 0, 0).unwrap();
        simulation.stop();
        simulation.stopped = false;
        assert!(matches!(
            simulation.run(),
            Err(SimulationError::QueueExhausted {
                completed: 0,
                created: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_horizon() {
        let (topology, _) = single_machine(1.0, 1.0);
        assert!(matches!(
            Simulation::new(topology, Horizon::Jobs(0), 0, 0),
            Err(SimulationError::Config(ConfigError::InvalidHorizon(_)))
        ));
    }

    #[test]
    fn test_job_claimed_by_wrong_holder() {
        let (topology, press) = single_machine(2.0, 1.0);
        let source = topology.source();
        let mut simulation = Simulation::new(topology, Horizon::Jobs(3), 0, 0).unwrap();
        let job = JobId::from(7);
        simulation.custody.insert(job, press);
        match simulation.transfer(source, Job::new(job, source, 1.5), 1.5) {
            Err(SimulationError::Custody {
                job: claimed,
                entity,
                holder,
                time,
            }) => {
                assert_eq!(claimed, job);
                assert_eq!(entity, "source");
                assert_eq!(holder, "press");
                assert!(approx_eq!(f64, time, 1.5));
            }
            _ => panic!("expected a custody error"),
        }
    }

    #[test]
    fn test_finish_service_of_unknown_job() {
        let (topology, press) = single_machine(2.0, 1.0);
        let mut simulation = Simulation::new(topology, Horizon::Jobs(3), 0, 0).unwrap();
        let unknown = JobId::from(9);
        let event = EventKind::FinishService { job: unknown };
        simulation.scheduler.schedule(0.5, press, event);
        assert!(simulation.step().unwrap());
        match simulation.step() {
            Err(SimulationError::MissingJob { entity, job, time }) => {
                assert_eq!(entity, "press");
                assert_eq!(job, unknown);
                assert!(approx_eq!(f64, time, 0.5));
            }
            _ => panic!("expected a missing job error"),
        }
    }

    #[test]
    fn test_arrival_sent_to_machine() {
        let (topology, press) = single_machine(2.0, 1.0);
        let mut simulation = Simulation::new(topology, Horizon::Jobs(3), 0, 0).unwrap();
        let event = EventKind::Arrive;
        simulation.scheduler.schedule(0.25, press, event);
        assert!(simulation.step().unwrap());
        match simulation.step() {
            Err(SimulationError::Misrouted { entity, what, time }) => {
                assert_eq!(entity, "press");
                assert!(what.contains("Arrive"), "{}", what);
                assert!(approx_eq!(f64, time, 0.25));
            }
            _ => panic!("expected a misrouted event error"),
        }
    }
}
