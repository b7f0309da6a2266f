//! Wiring of entities into a production line.

use std::collections::{HashSet, VecDeque};
use std::convert::TryFrom;

use serde::Serialize;

use crate::{ConfigError, DistributionSpec, EntityId, EntityKind, Variate};

/// Parameters of an entity, by kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntitySpec {
    /// Job generator.
    Source {
        /// Distribution of time between consecutive arrivals.
        arrival: DistributionSpec,
    },
    /// Processing stage.
    Machine {
        /// Distribution of processing time of a single job.
        cycle_time: DistributionSpec,
        /// Number of parallel servers.
        capacity: usize,
    },
    /// FIFO queue between stages.
    Buffer {
        /// Maximum number of jobs, or `None` if unbounded.
        capacity: Option<usize>,
    },
    /// Completion recorder.
    Sink,
}

impl EntitySpec {
    /// The kind of the entity.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Source { .. } => EntityKind::Source,
            Self::Machine { .. } => EntityKind::Machine,
            Self::Buffer { .. } => EntityKind::Buffer,
            Self::Sink => EntityKind::Sink,
        }
    }

    /// Required numbers of upstream and downstream neighbors.
    fn degree(&self) -> (usize, usize) {
        match self {
            Self::Source { .. } => (0, 1),
            Self::Machine { .. } | Self::Buffer { .. } => (1, 1),
            Self::Sink => (1, 0),
        }
    }
}

/// An entity in a validated topology together with its neighbors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// Entity ID, equal to its position in the topology.
    pub id: EntityId,
    /// Unique name; also determines the entity's random stream.
    pub name: String,
    /// Entity parameters.
    pub spec: EntitySpec,
    /// The neighbor jobs come from; `None` only for the source.
    pub upstream: Option<EntityId>,
    /// The neighbor jobs go to; `None` only for sinks.
    pub downstream: Option<EntityId>,
}

/// Immutable, validated graph of entities.
///
/// Guarantees exactly one source, at least one sink, no cycles, and exactly one upstream and
/// one downstream neighbor of every machine and buffer. Together these make every entity
/// reachable from the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineTopology {
    nodes: Vec<Node>,
    source: EntityId,
}

impl LineTopology {
    /// All entities in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the entity with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID was not issued for this topology.
    #[must_use]
    pub fn node(&self, id: EntityId) -> &Node {
        &self.nodes[usize::from(id)]
    }

    /// The name of the entity with the given ID.
    #[must_use]
    pub fn name(&self, id: EntityId) -> &str {
        &self.node(id).name
    }

    /// The ID of the source.
    #[must_use]
    pub fn source(&self) -> EntityId {
        self.source
    }

    /// The neighbor receiving jobs from `id`, or `None` for a sink.
    #[must_use]
    pub fn downstream(&self, id: EntityId) -> Option<EntityId> {
        self.node(id).downstream
    }

    /// The neighbor sending jobs to `id`, or `None` for the source.
    #[must_use]
    pub fn upstream(&self, id: EntityId) -> Option<EntityId> {
        self.node(id).upstream
    }

    /// Iterates over machines in declaration order.
    pub fn machines(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|node| node.spec.kind() == EntityKind::Machine)
    }

    /// The distribution of inter-arrival times of the source.
    #[must_use]
    pub fn arrival(&self) -> DistributionSpec {
        match self.node(self.source).spec {
            EntitySpec::Source { arrival } => arrival,
            _ => unreachable!("validated topology has a source"),
        }
    }
}

/// Builds a [`LineTopology`], validating it at the end.
///
/// # Examples
///
/// ```
/// # use linesim::{DistributionSpec, TopologyBuilder};
/// let mut builder = TopologyBuilder::default();
/// let source = builder.source("source", DistributionSpec::Exponential { mean: 2.0 });
/// let machine = builder.machine("lathe", DistributionSpec::Constant { value: 1.5 }, 1);
/// let sink = builder.sink("sink");
/// builder.connect(source, machine).connect(machine, sink);
/// let topology = builder.build().unwrap();
/// assert_eq!(topology.downstream(machine), Some(sink));
///
/// let mut builder = TopologyBuilder::default();
/// let source = builder.source("source", DistributionSpec::Constant { value: 1.0 });
/// let a = builder.buffer("a", Some(1));
/// let b = builder.buffer("b", Some(1));
/// builder.sink("sink");
/// builder.connect(source, a).connect(a, b).connect(b, a);
/// assert!(builder.build().is_err());
/// ```
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    entities: Vec<(String, EntitySpec)>,
    links: Vec<(EntityId, EntityId)>,
}

impl TopologyBuilder {
    /// Adds an entity and returns its ID.
    pub fn add(&mut self, name: impl Into<String>, spec: EntitySpec) -> EntityId {
        let id = EntityId::from(self.entities.len());
        self.entities.push((name.into(), spec));
        id
    }

    /// Adds a source.
    pub fn source(&mut self, name: impl Into<String>, arrival: DistributionSpec) -> EntityId {
        self.add(name, EntitySpec::Source { arrival })
    }

    /// Adds a machine.
    pub fn machine(
        &mut self,
        name: impl Into<String>,
        cycle_time: DistributionSpec,
        capacity: usize,
    ) -> EntityId {
        self.add(
            name,
            EntitySpec::Machine {
                cycle_time,
                capacity,
            },
        )
    }

    /// Adds a buffer; `None` capacity means unbounded.
    pub fn buffer(&mut self, name: impl Into<String>, capacity: Option<usize>) -> EntityId {
        self.add(name, EntitySpec::Buffer { capacity })
    }

    /// Adds a sink.
    pub fn sink(&mut self, name: impl Into<String>) -> EntityId {
        self.add(name, EntitySpec::Sink)
    }

    /// Routes jobs leaving `from` to `to`.
    pub fn connect(&mut self, from: EntityId, to: EntityId) -> &mut Self {
        self.links.push((from, to));
        self
    }

    /// Validates the graph and builds the topology.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first problem found.
    pub fn build(&self) -> Result<LineTopology, ConfigError> {
        self.check_entities()?;
        let source = self.check_counts()?;
        let n = self.entities.len();
        let mut upstream = vec![Vec::new(); n];
        let mut downstream = vec![Vec::new(); n];
        for &(from, to) in &self.links {
            for id in [from, to].iter() {
                if usize::from(*id) >= n {
                    return Err(ConfigError::UnknownEntity(*id));
                }
            }
            downstream[usize::from(from)].push(to);
            upstream[usize::from(to)].push(from);
        }
        self.check_acyclic(&downstream, &upstream)?;
        for (idx, (name, spec)) in self.entities.iter().enumerate() {
            let (expected_upstream, expected_downstream) = spec.degree();
            if upstream[idx].len() != expected_upstream
                || downstream[idx].len() != expected_downstream
            {
                return Err(ConfigError::Degree {
                    entity: name.clone(),
                    upstream: upstream[idx].len(),
                    downstream: downstream[idx].len(),
                    expected_upstream,
                    expected_downstream,
                });
            }
        }
        let nodes = self
            .entities
            .iter()
            .enumerate()
            .map(|(idx, (name, spec))| Node {
                id: EntityId::from(idx),
                name: name.clone(),
                spec: *spec,
                upstream: upstream[idx].first().copied(),
                downstream: downstream[idx].first().copied(),
            })
            .collect();
        Ok(LineTopology { nodes, source })
    }

    fn check_entities(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for (name, spec) in &self.entities {
            if !names.insert(name.as_str()) {
                return Err(ConfigError::DuplicateName(name.clone()));
            }
            let distribution = match *spec {
                EntitySpec::Source { arrival } => Some(arrival),
                EntitySpec::Machine {
                    cycle_time,
                    capacity,
                } => {
                    if capacity == 0 {
                        return Err(ConfigError::ZeroCapacity(name.clone()));
                    }
                    Some(cycle_time)
                }
                EntitySpec::Buffer { capacity: Some(0) } => {
                    return Err(ConfigError::ZeroCapacity(name.clone()));
                }
                EntitySpec::Buffer { .. } | EntitySpec::Sink => None,
            };
            if let Some(distribution) = distribution {
                Variate::try_from(distribution).map_err(|source| ConfigError::Distribution {
                    entity: name.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn check_counts(&self) -> Result<EntityId, ConfigError> {
        let of_kind = |kind: EntityKind| {
            self.entities
                .iter()
                .enumerate()
                .filter(move |(_, (_, spec))| spec.kind() == kind)
                .map(|(idx, _)| EntityId::from(idx))
        };
        let sources: Vec<_> = of_kind(EntityKind::Source).collect();
        if sources.len() != 1 {
            return Err(ConfigError::SourceCount(sources.len()));
        }
        if of_kind(EntityKind::Sink).next().is_none() {
            return Err(ConfigError::NoSink);
        }
        Ok(sources[0])
    }

    /// Kahn's algorithm: whatever cannot be ordered lies on a cycle or downstream of one.
    fn check_acyclic(
        &self,
        downstream: &[Vec<EntityId>],
        upstream: &[Vec<EntityId>],
    ) -> Result<(), ConfigError> {
        let mut in_degree: Vec<usize> = upstream.iter().map(Vec::len).collect();
        let mut ready: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| idx)
            .collect();
        let mut ordered = vec![false; in_degree.len()];
        while let Some(idx) = ready.pop_front() {
            ordered[idx] = true;
            for next in &downstream[idx] {
                let next = usize::from(*next);
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push_back(next);
                }
            }
        }
        match ordered.iter().position(|done| !done) {
            Some(idx) => Err(ConfigError::Cycle(self.entities[idx].0.clone())),
            None => Ok(()),
        }
    }
}
