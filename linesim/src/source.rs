use rand_chacha::ChaCha8Rng;
use rand_distr::Distribution;

use crate::{EntityId, EventHandle, Job, JobId, Variate};

/// Generates jobs at intervals drawn from an inter-arrival distribution.
///
/// When the downstream neighbor cannot accept a new job, the source keeps it in a pending slot
/// and stops generating until the job is released; the next inter-arrival interval starts once
/// the pending job has left.
#[derive(Debug)]
pub struct Source {
    id: EntityId,
    interarrival: Variate,
    rng: ChaCha8Rng,
    limit: Option<u64>,
    created: u64,
    pending: Option<Job>,
    next_arrival: Option<EventHandle>,
}

impl Source {
    /// Constructs a source. If `limit` is given, no more than `limit` jobs are created.
    #[must_use]
    pub fn new(id: EntityId, interarrival: Variate, rng: ChaCha8Rng, limit: Option<u64>) -> Self {
        Self {
            id,
            interarrival,
            rng,
            limit,
            created: 0,
            pending: None,
            next_arrival: None,
        }
    }

    /// The ID of this source.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Number of jobs created so far.
    #[must_use]
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Checks if the job limit has been reached.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.limit.map_or(false, |limit| self.created >= limit)
    }

    /// Checks if a job is waiting for the downstream neighbor.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.pending.is_some()
    }

    /// Creates a new job at `time`, unless the job limit has been reached.
    pub fn generate(&mut self, time: f64) -> Option<Job> {
        if self.is_exhausted() {
            return None;
        }
        let job = Job::new(JobId::from(self.created), self.id, time);
        self.created += 1;
        log::trace!("[{:.3}] Source {} created job {}", time, self.id, job.id());
        Some(job)
    }

    /// Samples the time until the next arrival.
    pub fn next_interval(&mut self) -> f64 {
        self.interarrival.sample(&mut self.rng)
    }

    /// Keeps a job that the downstream neighbor refused.
    pub(crate) fn hold(&mut self, job: Job) {
        debug_assert!(self.pending.is_none(), "source can hold a single job");
        self.pending = Some(job);
    }

    /// Takes the pending job, if any.
    pub(crate) fn release(&mut self) -> Option<Job> {
        self.pending.take()
    }

    /// Remembers the handle of the scheduled arrival so that it can be cancelled.
    pub(crate) fn set_next_arrival(&mut self, handle: Option<EventHandle>) {
        self.next_arrival = handle;
    }

    /// Forgets and returns the handle of the scheduled arrival.
    pub(crate) fn take_next_arrival(&mut self) -> Option<EventHandle> {
        self.next_arrival.take()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{stream_rng, DistributionSpec};
    use std::convert::TryFrom;

    fn source(limit: Option<u64>) -> Source {
        Source::new(
            EntityId::from(0),
            Variate::try_from(DistributionSpec::Constant { value: 3.0 }).unwrap(),
            stream_rng(0, "source"),
            limit,
        )
    }

    #[test]
    fn test_limit() {
        let mut source = source(Some(2));
        assert_eq!(source.generate(0.0).map(|j| j.id()), Some(JobId::from(0)));
        assert!(!source.is_exhausted());
        assert_eq!(source.generate(3.0).map(|j| j.id()), Some(JobId::from(1)));
        assert!(source.is_exhausted());
        assert!(source.generate(6.0).is_none());
        assert_eq!(source.created(), 2);
    }

    #[test]
    fn test_unlimited() {
        let mut source = source(None);
        for _ in 0..100 {
            assert!(source.generate(0.0).is_some());
        }
        assert_eq!(source.next_interval(), 3.0);
    }

    #[test]
    fn test_pending_slot() {
        let mut source = source(None);
        let job = source.generate(0.0).unwrap();
        assert!(!source.is_blocked());
        source.hold(job);
        assert!(source.is_blocked());
        let job = source.release().unwrap();
        assert_eq!(job.created_at(), 0.0);
        assert!(source.release().is_none());
    }
}
