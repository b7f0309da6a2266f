//! Statistics collected from entity state transitions.

use serde::{Deserialize, Serialize};

use crate::{EntityId, EntitySpec, JobId, LineTopology};

/// A state transition emitted by an entity, consumed by the [`Collector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// The source created a job.
    JobCreated {
        /// New job.
        job: JobId,
    },
    /// A machine server started processing a job.
    ServiceStarted {
        /// The machine.
        machine: EntityId,
        /// The job.
        job: JobId,
    },
    /// A machine server finished processing a job.
    ServiceFinished {
        /// The machine.
        machine: EntityId,
        /// The job.
        job: JobId,
    },
    /// The downstream neighbor refused a job, so the entity holds on to it.
    Blocked {
        /// Source or machine.
        entity: EntityId,
        /// The held job.
        job: JobId,
    },
    /// A previously refused job has been released downstream.
    Unblocked {
        /// Source or machine.
        entity: EntityId,
        /// The released job.
        job: JobId,
    },
    /// The number of jobs in a buffer has changed.
    BufferLevel {
        /// The buffer.
        buffer: EntityId,
        /// New number of jobs.
        len: usize,
    },
    /// A job reached a sink.
    Completed {
        /// The job.
        job: JobId,
        /// Time from creation to completion.
        cycle_time: f64,
    },
}

/// Integral of a piecewise-constant level over time.
#[derive(Debug, Clone, Default)]
struct StepIntegral {
    level: usize,
    since: f64,
    area: f64,
}

impl StepIntegral {
    fn set(&mut self, time: f64, level: usize) {
        self.area = self.area_until(time);
        self.level = level;
        self.since = time;
    }

    fn increment(&mut self, time: f64) {
        self.set(time, self.level + 1);
    }

    fn decrement(&mut self, time: f64) {
        debug_assert!(self.level > 0, "level cannot drop below zero");
        self.set(time, self.level.saturating_sub(1));
    }

    fn area_until(&self, time: f64) -> f64 {
        self.area + self.level as f64 * (time - self.since)
    }
}

/// Time spent at each occupancy level of a buffer.
#[derive(Debug, Clone, Default)]
struct Occupancy {
    level: usize,
    since: f64,
    time_at: Vec<f64>,
    max: usize,
}

impl Occupancy {
    fn set(&mut self, time: f64, level: usize) {
        if self.time_at.len() <= self.level {
            self.time_at.resize(self.level + 1, 0.0);
        }
        self.time_at[self.level] += time - self.since;
        self.level = level;
        self.since = time;
        self.max = self.max.max(level);
    }

    fn time_at_until(&self, time: f64) -> Vec<f64> {
        let mut time_at = self.time_at.clone();
        if time_at.len() <= self.max {
            time_at.resize(self.max + 1, 0.0);
        }
        time_at[self.level] += time - self.since;
        time_at
    }
}

#[derive(Debug, Clone)]
enum Tally {
    Source {
        blocked: StepIntegral,
        episodes: u64,
    },
    Machine {
        capacity: usize,
        busy: StepIntegral,
        blocked: StepIntegral,
        episodes: u64,
        processed: u64,
    },
    Buffer {
        capacity: Option<usize>,
        occupancy: Occupancy,
    },
    Sink,
}

impl Tally {
    /// Blocked time and the number of blocking episodes of an entity that can block.
    fn blocking(&mut self) -> Option<(&mut StepIntegral, &mut u64)> {
        match self {
            Self::Source { blocked, episodes } => Some((blocked, episodes)),
            Self::Machine {
                blocked,
                episodes,
                ..
            } => Some((blocked, episodes)),
            Self::Buffer { .. } | Self::Sink => None,
        }
    }
}

/// Utilization band of a machine, used to flag under- and over-loaded stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoadBand {
    /// Below 70% utilization.
    UnderLoaded,
    /// At least 70% and below 90% utilization.
    Healthy,
    /// At least 90% utilization.
    OverLoaded,
}

impl LoadBand {
    /// Classifies a utilization ratio.
    #[must_use]
    pub fn of(utilization: f64) -> Self {
        if utilization < 0.7 {
            Self::UnderLoaded
        } else if utilization < 0.9 {
            Self::Healthy
        } else {
            Self::OverLoaded
        }
    }
}

/// One point of the work-in-progress step function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WipSample {
    /// From this time on...
    pub time: f64,
    /// ...this many jobs are in the system, until the next sample.
    pub wip: u64,
}

/// Cycle time statistics of completed jobs. All values are zero if no job completed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CycleTimeSummary {
    /// Number of completed jobs.
    pub count: u64,
    /// Mean cycle time.
    pub mean: f64,
    /// Shortest cycle time.
    pub min: f64,
    /// Longest cycle time.
    pub max: f64,
    /// Median (nearest rank).
    pub p50: f64,
    /// 90th percentile (nearest rank).
    pub p90: f64,
    /// 95th percentile (nearest rank).
    pub p95: f64,
    /// 99th percentile (nearest rank).
    pub p99: f64,
}

impl CycleTimeSummary {
    fn new(cycle_times: &[f64]) -> Self {
        if cycle_times.is_empty() {
            return Self::default();
        }
        let mut sorted = cycle_times.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let percentile = |p: f64| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let rank = (p / 100.0 * n as f64).ceil() as usize;
            sorted[rank.clamp(1, n) - 1]
        };
        Self {
            count: n as u64,
            mean: sorted.iter().sum::<f64>() / n as f64,
            min: sorted[0],
            max: sorted[n - 1],
            p50: percentile(50.0),
            p90: percentile(90.0),
            p95: percentile(95.0),
            p99: percentile(99.0),
        }
    }
}

/// Per-machine results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineReport {
    /// Machine ID.
    pub id: EntityId,
    /// Machine name.
    pub name: String,
    /// Number of parallel servers.
    pub capacity: usize,
    /// Fraction of server time spent processing, in `[0, 1]`.
    pub utilization: f64,
    /// Fraction of server time spent holding finished jobs that could not move on.
    pub blocked_fraction: f64,
    /// How many times a finished job could not be released downstream.
    pub blocked_episodes: u64,
    /// Number of jobs whose service has finished.
    pub processed: u64,
    /// Classification of the utilization.
    pub load_band: LoadBand,
}

/// Per-buffer results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferReport {
    /// Buffer ID.
    pub id: EntityId,
    /// Buffer name.
    pub name: String,
    /// Capacity, or `None` if unbounded.
    pub capacity: Option<usize>,
    /// Time-averaged number of jobs.
    pub mean_occupancy: f64,
    /// Largest number of jobs observed.
    pub max_occupancy: usize,
    /// Fraction of time the buffer was full; always zero when unbounded.
    pub full_fraction: f64,
    /// Element `i` is the fraction of time the buffer held exactly `i` jobs.
    pub occupancy_distribution: Vec<f64>,
}

/// Source results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    /// Source ID.
    pub id: EntityId,
    /// Source name.
    pub name: String,
    /// Number of jobs created.
    pub created: u64,
    /// Fraction of time a new job was waiting for room downstream.
    pub blocked_fraction: f64,
    /// How many times a new job could not be handed downstream right away.
    pub blocked_episodes: u64,
}

/// Results of a single replication, read-only once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Replication index.
    pub replication: usize,
    /// Seed used by this replication.
    pub seed: u64,
    /// Simulated time from start to stop.
    pub elapsed: f64,
    /// Time of the last completion.
    pub makespan: f64,
    /// Jobs created by the source.
    pub created: u64,
    /// Jobs that reached a sink.
    pub completed: u64,
    /// Jobs still in the system at the end.
    pub in_system: u64,
    /// Completed jobs per unit of time.
    pub throughput: f64,
    /// Cycle time statistics.
    pub cycle_time: CycleTimeSummary,
    /// Time-averaged number of jobs in the system.
    pub mean_wip: f64,
    /// Source metrics.
    pub source: SourceReport,
    /// Machine metrics in declaration order.
    pub machines: Vec<MachineReport>,
    /// Buffer metrics in declaration order.
    pub buffers: Vec<BufferReport>,
    /// Machine with the highest utilization; the first one declared wins ties.
    pub bottleneck_id: Option<EntityId>,
    /// Name of the bottleneck machine.
    pub bottleneck: Option<String>,
    /// Mean utilization over all machines.
    pub runtime_efficiency: f64,
    /// Number of dispatched events.
    pub events: u64,
    /// Work-in-progress step function: a sample is recorded whenever the value changes.
    pub wip_series: Vec<WipSample>,
}

/// Aggregates state transitions of all entities of a replication.
#[derive(Debug, Clone)]
pub struct Collector {
    replication: usize,
    seed: u64,
    names: Vec<String>,
    tallies: Vec<Tally>,
    source: EntityId,
    created: u64,
    completed: u64,
    wip: StepIntegral,
    wip_series: Vec<WipSample>,
    cycle_times: Vec<f64>,
    last_completion: f64,
    events: u64,
}

impl Collector {
    /// Creates a collector for every entity of `topology`.
    #[must_use]
    pub fn new(topology: &LineTopology, replication: usize, seed: u64) -> Self {
        let tallies = topology
            .nodes()
            .iter()
            .map(|node| match node.spec {
                EntitySpec::Source { .. } => Tally::Source {
                    blocked: StepIntegral::default(),
                    episodes: 0,
                },
                EntitySpec::Machine { capacity, .. } => Tally::Machine {
                    capacity,
                    busy: StepIntegral::default(),
                    blocked: StepIntegral::default(),
                    episodes: 0,
                    processed: 0,
                },
                EntitySpec::Buffer { capacity } => Tally::Buffer {
                    capacity,
                    occupancy: Occupancy::default(),
                },
                EntitySpec::Sink => Tally::Sink,
            })
            .collect();
        Self {
            replication,
            seed,
            names: topology.nodes().iter().map(|n| n.name.clone()).collect(),
            tallies,
            source: topology.source(),
            created: 0,
            completed: 0,
            wip: StepIntegral::default(),
            wip_series: vec![WipSample { time: 0.0, wip: 0 }],
            cycle_times: Vec::new(),
            last_completion: 0.0,
            events: 0,
        }
    }

    /// Number of jobs created so far.
    #[must_use]
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Number of jobs completed so far.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Number of jobs in the system.
    #[must_use]
    pub fn wip(&self) -> u64 {
        self.created - self.completed
    }

    fn tally(&mut self, id: EntityId) -> &mut Tally {
        &mut self.tallies[usize::from(id)]
    }

    /// Records a transition that happened at `time`.
    pub fn record(&mut self, time: f64, transition: Transition) {
        match transition {
            Transition::JobCreated { .. } => {
                self.created += 1;
                self.wip.increment(time);
            }
            Transition::Completed { cycle_time, .. } => {
                self.completed += 1;
                self.wip.decrement(time);
                self.cycle_times.push(cycle_time);
                self.last_completion = time;
            }
            Transition::ServiceStarted { machine, .. } => {
                if let Tally::Machine { busy, .. } = self.tally(machine) {
                    busy.increment(time);
                }
            }
            Transition::ServiceFinished { machine, .. } => match self.tally(machine) {
                Tally::Machine {
                    busy,
                    processed,
                    ..
                } => {
                    busy.decrement(time);
                    *processed += 1;
                }
                _ => log::warn!("Ignoring service of {}", machine),
            },
            Transition::Blocked { entity, .. } => match self.tally(entity).blocking() {
                Some((blocked, episodes)) => {
                    blocked.increment(time);
                    *episodes += 1;
                }
                None => log::warn!("Ignoring blocking of {}", entity),
            },
            Transition::Unblocked { entity, .. } => match self.tally(entity).blocking() {
                Some((blocked, _)) => blocked.decrement(time),
                None => log::warn!("Ignoring unblocking of {}", entity),
            },
            Transition::BufferLevel { buffer, len } => {
                if let Tally::Buffer { occupancy, .. } = self.tally(buffer) {
                    occupancy.set(time, len);
                }
            }
        }
    }

    /// Called after each dispatched event; extends the WIP series if the value changed.
    pub fn sample(&mut self, time: f64) {
        self.events += 1;
        let wip = self.wip();
        match self.wip_series.last_mut() {
            Some(last) if last.wip == wip => {}
            Some(last) if last.time >= time => {
                last.wip = wip;
                let len = self.wip_series.len();
                if len > 1 && self.wip_series[len - 2].wip == wip {
                    self.wip_series.pop();
                }
            }
            _ => self.wip_series.push(WipSample { time, wip }),
        }
    }

    /// Computes the results as of `time`, the end of the run. Does not modify the collector,
    /// so finalizing again yields the same result.
    #[must_use]
    pub fn finalize(&self, time: f64) -> RunResult {
        let ratio = |value: f64, total: f64| if total > 0.0 { value / total } else { 0.0 };
        let mut source = None;
        let mut machines = Vec::new();
        let mut buffers = Vec::new();
        for (idx, tally) in self.tallies.iter().enumerate() {
            let id = EntityId::from(idx);
            let name = self.names[idx].clone();
            match tally {
                Tally::Source { blocked, episodes } => {
                    source = Some(SourceReport {
                        id,
                        name,
                        created: self.created,
                        blocked_fraction: ratio(blocked.area_until(time), time),
                        blocked_episodes: *episodes,
                    });
                }
                Tally::Machine {
                    capacity,
                    busy,
                    blocked,
                    episodes,
                    processed,
                } => {
                    let server_time = time * *capacity as f64;
                    let utilization = ratio(busy.area_until(time), server_time);
                    machines.push(MachineReport {
                        id,
                        name,
                        capacity: *capacity,
                        utilization,
                        blocked_fraction: ratio(blocked.area_until(time), server_time),
                        blocked_episodes: *episodes,
                        processed: *processed,
                        load_band: LoadBand::of(utilization),
                    });
                }
                Tally::Buffer {
                    capacity,
                    occupancy,
                } => {
                    let time_at = occupancy.time_at_until(time);
                    let distribution: Vec<f64> = time_at.iter().map(|t| ratio(*t, time)).collect();
                    let mean_occupancy = distribution
                        .iter()
                        .enumerate()
                        .map(|(level, fraction)| level as f64 * fraction)
                        .sum();
                    let full_fraction = capacity
                        .and_then(|capacity| distribution.get(capacity).copied())
                        .unwrap_or(0.0);
                    buffers.push(BufferReport {
                        id,
                        name,
                        capacity: *capacity,
                        mean_occupancy,
                        max_occupancy: occupancy.max,
                        full_fraction,
                        occupancy_distribution: distribution,
                    });
                }
                Tally::Sink => {}
            }
        }
        let bottleneck = machines.iter().fold(None, |best: Option<&MachineReport>, m| {
            match best {
                Some(b) if b.utilization >= m.utilization => Some(b),
                _ => Some(m),
            }
        });
        let runtime_efficiency = if machines.is_empty() {
            0.0
        } else {
            machines.iter().map(|m| m.utilization).sum::<f64>() / machines.len() as f64
        };
        RunResult {
            replication: self.replication,
            seed: self.seed,
            elapsed: time,
            makespan: self.last_completion,
            created: self.created,
            completed: self.completed,
            in_system: self.wip(),
            throughput: ratio(self.completed as f64, time),
            cycle_time: CycleTimeSummary::new(&self.cycle_times),
            mean_wip: ratio(self.wip.area_until(time), time),
            source: source.unwrap_or_else(|| SourceReport {
                id: self.source,
                name: self.names[usize::from(self.source)].clone(),
                created: self.created,
                blocked_fraction: 0.0,
                blocked_episodes: 0,
            }),
            bottleneck_id: bottleneck.map(|m| m.id),
            bottleneck: bottleneck.map(|m| m.name.clone()),
            runtime_efficiency,
            events: self.events,
            wip_series: self.wip_series.clone(),
            machines,
            buffers,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{DistributionSpec, TopologyBuilder};
    use float_cmp::approx_eq;
    use rstest::{fixture, rstest};

    struct Line {
        topology: LineTopology,
        source: EntityId,
        buffer: EntityId,
        first: EntityId,
        second: EntityId,
    }

    #[fixture]
    fn line() -> Line {
        let one = DistributionSpec::Constant { value: 1.0 };
        let mut builder = TopologyBuilder::default();
        let source = builder.source("source", one);
        let first = builder.machine("first", one, 2);
        let buffer = builder.buffer("buffer", Some(2));
        let second = builder.machine("second", one, 1);
        let sink = builder.sink("sink");
        builder
            .connect(source, first)
            .connect(first, buffer)
            .connect(buffer, second)
            .connect(second, sink);
        Line {
            topology: builder.build().unwrap(),
            source,
            buffer,
            first,
            second,
        }
    }

    fn job(id: u64) -> JobId {
        JobId::from(id)
    }

    #[rstest]
    fn test_utilization_and_blocking(line: Line) {
        let mut collector = Collector::new(&line.topology, 0, 0);
        let (first, second) = (line.first, line.second);
        collector.record(
            0.0,
            Transition::ServiceStarted {
                machine: first,
                job: job(0),
            },
        );
        collector.record(
            0.0,
            Transition::ServiceStarted {
                machine: second,
                job: job(1),
            },
        );
        collector.record(
            2.0,
            Transition::ServiceFinished {
                machine: first,
                job: job(0),
            },
        );
        collector.record(
            2.0,
            Transition::Blocked {
                entity: first,
                job: job(0),
            },
        );
        collector.record(
            3.0,
            Transition::Unblocked {
                entity: first,
                job: job(0),
            },
        );
        collector.record(
            4.0,
            Transition::ServiceFinished {
                machine: second,
                job: job(1),
            },
        );
        let result = collector.finalize(4.0);
        let first = &result.machines[0];
        assert!(approx_eq!(f64, first.utilization, 2.0 / 8.0));
        assert!(approx_eq!(f64, first.blocked_fraction, 1.0 / 8.0));
        assert_eq!(first.blocked_episodes, 1);
        assert_eq!(first.processed, 1);
        assert_eq!(first.load_band, LoadBand::UnderLoaded);
        let second = &result.machines[1];
        assert!(approx_eq!(f64, second.utilization, 1.0));
        assert_eq!(second.load_band, LoadBand::OverLoaded);
        assert_eq!(result.bottleneck_id, Some(line.second));
        assert_eq!(result.bottleneck.as_deref(), Some("second"));
        assert!(approx_eq!(
            f64,
            result.runtime_efficiency,
            (0.25 + 1.0) / 2.0
        ));
    }

    #[rstest]
    fn test_bottleneck_ties_go_to_first_declared(line: Line) {
        let collector = Collector::new(&line.topology, 0, 0);
        let result = collector.finalize(10.0);
        assert_eq!(result.bottleneck_id, Some(line.first));
    }

    #[rstest]
    fn test_buffer_occupancy(line: Line) {
        let mut collector = Collector::new(&line.topology, 0, 0);
        let buffer = line.buffer;
        collector.record(1.0, Transition::BufferLevel { buffer, len: 1 });
        collector.record(2.0, Transition::BufferLevel { buffer, len: 2 });
        collector.record(4.0, Transition::BufferLevel { buffer, len: 0 });
        let result = collector.finalize(5.0);
        let report = &result.buffers[0];
        assert_eq!(report.max_occupancy, 2);
        assert_eq!(report.occupancy_distribution, vec![0.4, 0.2, 0.4]);
        assert!(approx_eq!(f64, report.mean_occupancy, 1.0));
        assert!(approx_eq!(f64, report.full_fraction, 0.4));
    }

    #[rstest]
    fn test_wip_and_cycle_times(line: Line) {
        let mut collector = Collector::new(&line.topology, 3, 11);
        for id in 0..4 {
            collector.record(id as f64, Transition::JobCreated { job: job(id) });
            collector.sample(id as f64);
        }
        for (id, time) in [(0, 5.0), (1, 5.0), (2, 7.0), (3, 8.0)].iter() {
            collector.record(
                *time,
                Transition::Completed {
                    job: job(*id),
                    cycle_time: *time - *id as f64,
                },
            );
            collector.sample(*time);
        }
        let result = collector.finalize(8.0);
        assert_eq!(result.replication, 3);
        assert_eq!(result.seed, 11);
        assert_eq!(
            (result.created, result.completed, result.in_system),
            (4, 4, 0)
        );
        assert!(approx_eq!(f64, result.throughput, 0.5));
        assert_eq!(result.makespan, 8.0);
        assert_eq!(result.events, 8);
        let wip: Vec<_> = result.wip_series.iter().map(|s| (s.time, s.wip)).collect();
        assert_eq!(
            wip,
            vec![(0.0, 1), (1.0, 2), (2.0, 3), (3.0, 4), (5.0, 2), (7.0, 1), (8.0, 0)]
        );
        // 1 + 2 + 3 + 4 * 2 + 2 * 2 + 1 = 19 job-units over 8 time units.
        assert!(approx_eq!(f64, result.mean_wip, 19.0 / 8.0));
        let cycle = result.cycle_time;
        assert_eq!(cycle.count, 4);
        assert_eq!((cycle.min, cycle.max), (4.0, 5.0));
        assert!(approx_eq!(f64, cycle.mean, (5.0 + 4.0 + 5.0 + 5.0) / 4.0));
        assert_eq!(cycle.p50, 5.0);
        assert_eq!(cycle.p99, 5.0);
    }

    #[rstest]
    fn test_finalize_is_idempotent(line: Line) {
        let mut collector = Collector::new(&line.topology, 0, 0);
        collector.record(0.0, Transition::JobCreated { job: job(0) });
        collector.record(
            0.0,
            Transition::Blocked {
                entity: line.source,
                job: job(0),
            },
        );
        collector.sample(0.0);
        assert_eq!(collector.finalize(3.0), collector.finalize(3.0));
        let source = collector.finalize(3.0).source;
        assert!(approx_eq!(f64, source.blocked_fraction, 1.0));
    }

    #[test]
    fn test_percentiles() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let summary = CycleTimeSummary::new(&values);
        assert_eq!(summary.p50, 50.0);
        assert_eq!(summary.p90, 90.0);
        assert_eq!(summary.p95, 95.0);
        assert_eq!(summary.p99, 99.0);
        assert_eq!(CycleTimeSummary::new(&[]), CycleTimeSummary::default());
        assert_eq!(CycleTimeSummary::new(&[2.0]).p99, 2.0);
    }

    #[test]
    fn test_load_band() {
        assert_eq!(LoadBand::of(0.5), LoadBand::UnderLoaded);
        assert_eq!(LoadBand::of(0.7), LoadBand::Healthy);
        assert_eq!(LoadBand::of(0.89), LoadBand::Healthy);
        assert_eq!(LoadBand::of(0.9), LoadBand::OverLoaded);
        assert_eq!(LoadBand::of(0.95), LoadBand::OverLoaded);
    }
}
