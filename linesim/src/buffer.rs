use std::collections::VecDeque;

use serde::Serialize;

use crate::{EntityId, Job};

/// State derived from the number of jobs held in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BufferState {
    /// No jobs.
    Empty,
    /// Some jobs, but room for more.
    Partial,
    /// No room left.
    Full,
}

/// Bounded FIFO queue of work-in-progress between two stages.
///
/// Push operations can fail: a full buffer hands the job back to the caller, which must treat
/// it as a blocking signal. `None` capacity makes the buffer unbounded.
///
/// # Examples
///
/// ```
/// # use linesim::{Buffer, BufferState, EntityId, Job, JobId};
/// let id = EntityId::from(1);
/// let mut buffer = Buffer::new(id, Some(1));
/// assert!(buffer.push(Job::new(JobId::from(0), id, 0.0)).is_ok());
/// assert_eq!(buffer.state(), BufferState::Full);
/// let rejected = buffer.push(Job::new(JobId::from(1), id, 0.0)).unwrap_err();
/// assert_eq!(rejected.id(), JobId::from(1));
/// ```
#[derive(Debug)]
pub struct Buffer {
    id: EntityId,
    queue: VecDeque<Job>,
    capacity: Option<usize>,
}

impl Buffer {
    /// Creates an empty buffer with the given capacity.
    #[must_use]
    pub fn new(id: EntityId, capacity: Option<usize>) -> Self {
        Self {
            id,
            queue: VecDeque::new(),
            capacity,
        }
    }

    /// The ID of this buffer.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Maximum number of jobs, or `None` if unbounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Checks whether another job can be pushed.
    #[must_use]
    pub fn has_room(&self) -> bool {
        self.capacity.map_or(true, |capacity| self.queue.len() < capacity)
    }

    /// Appends a job at the tail.
    ///
    /// # Errors
    ///
    /// Returns the job back if the buffer is full.
    pub fn push(&mut self, job: Job) -> Result<(), Job> {
        if self.has_room() {
            self.queue.push_back(job);
            Ok(())
        } else {
            Err(job)
        }
    }

    /// Removes the job at the head, or returns `None` if the buffer is empty.
    pub fn pop(&mut self) -> Option<Job> {
        self.queue.pop_front()
    }

    /// Puts a job back at the head after a failed hand-off of a popped job.
    pub(crate) fn restore(&mut self, job: Job) {
        self.queue.push_front(job);
    }

    /// The job at the head, if any.
    #[must_use]
    pub fn front(&self) -> Option<&Job> {
        self.queue.front()
    }

    /// Number of jobs in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Checks if the buffer holds no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the current state of the buffer.
    #[must_use]
    pub fn state(&self) -> BufferState {
        if self.queue.is_empty() {
            BufferState::Empty
        } else if self.has_room() {
            BufferState::Partial
        } else {
            BufferState::Full
        }
    }
}
