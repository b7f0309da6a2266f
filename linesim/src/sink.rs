use crate::{EntityId, Job};

/// Records completed jobs. A sink never refuses a job.
#[derive(Debug)]
pub struct Sink {
    id: EntityId,
    completed: u64,
}

impl Sink {
    /// Constructs a sink with no completed jobs.
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self { id, completed: 0 }
    }

    /// The ID of this sink.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Number of jobs completed in this sink.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Finalizes the job's history and returns its cycle time. The job is consumed.
    pub fn complete(&mut self, mut job: Job, time: f64) -> f64 {
        job.leave(time);
        self.completed += 1;
        let cycle_time = time - job.created_at();
        log::debug!(
            "[{:.3}] Job {} completed after {} stages in {:.3}",
            time,
            job.id(),
            job.stage_history().len(),
            cycle_time
        );
        cycle_time
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::JobId;

    #[test]
    fn test_complete() {
        let mut sink = Sink::new(EntityId::from(3));
        let mut job = Job::new(JobId::from(0), EntityId::from(0), 1.0);
        job.move_to(EntityId::from(3), 4.5);
        assert_eq!(sink.complete(job, 4.5), 3.5);
        assert_eq!(sink.completed(), 1);
    }
}
