use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use ordered_float::OrderedFloat;

use crate::{EntityId, JobId};

/// What should happen when an event is dispatched to its target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// At a source: generate the next job.
    /// At a buffer: a job has landed and should be forwarded if possible.
    Arrive,
    /// A machine has finished processing the job.
    FinishService {
        /// The job whose service has finished. The job itself stays in the machine.
        job: JobId,
    },
    /// The downstream neighbor of the target has freed capacity.
    Unblocked,
}

/// Handle of a scheduled event, used to cancel it before it is dispatched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle(u64);

/// A scheduled event. Immutable once created.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Event {
    /// Simulation time at which the event occurs.
    pub time: f64,
    /// Creation sequence number; breaks ties between events occurring at the same time.
    pub sequence: u64,
    /// The entity that handles the event.
    pub target: EntityId,
    /// What happens.
    pub kind: EventKind,
}

impl Event {
    /// The handle that was returned when scheduling this event.
    #[must_use]
    pub fn handle(&self) -> EventHandle {
        EventHandle(self.sequence)
    }
}

/// Entry type stored in the scheduler's heap.
///
/// Entries are ordered by time and then by sequence number, both reversed, so that the
/// earliest event created first sits on top of the max-heap.
#[derive(Debug)]
struct EventEntry {
    key: Reverse<(OrderedFloat<f64>, u64)>,
    event: Event,
}

impl PartialEq for EventEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for EventEntry {}

impl PartialOrd for EventEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Returned by [`Scheduler::advance`] when no events are left.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
#[error("[{time}] no events left to advance to")]
pub struct EmptyQueue {
    /// Simulation time when the queue ran out.
    pub time: f64,
}

/// Scheduler is used to keep the current time and information about the upcoming events.
///
/// Cancellation is lazy: a cancelled event stays in the heap, but it is skipped when popped.
#[derive(Debug, Default)]
pub struct Scheduler {
    events: BinaryHeap<EventEntry>,
    live: HashSet<u64>,
    next_sequence: u64,
    time: f64,
}

impl Scheduler {
    /// Schedules an event of `kind` for `target` at `self.time() + delay`.
    ///
    /// # Panics
    ///
    /// Panics if `delay` is negative or NaN: time never goes backwards.
    pub fn schedule(&mut self, delay: f64, target: EntityId, kind: EventKind) -> EventHandle {
        assert!(
            delay >= 0.0,
            "cannot schedule {:?} for {} with delay {}",
            kind,
            target,
            delay
        );
        let time = self.time + delay;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.live.insert(sequence);
        self.events.push(EventEntry {
            key: Reverse((OrderedFloat(time), sequence)),
            event: Event {
                time,
                sequence,
                target,
                kind,
            },
        });
        EventHandle(sequence)
    }

    /// Schedules an event of `kind` for `target` at `self.time()`.
    pub fn schedule_immediately(&mut self, target: EntityId, kind: EventKind) -> EventHandle {
        self.schedule(0.0, target, kind)
    }

    /// Cancels a pending event. Returns `false` if it has already been dispatched or cancelled.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.live.remove(&handle.0)
    }

    /// Cancels all pending events, returning how many there were.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.live.len();
        self.live.clear();
        self.events.clear();
        cancelled
    }

    /// Returns the current simulation time.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Moves the clock forward to `time` without dispatching anything.
    ///
    /// # Panics
    ///
    /// Panics if a pending event would be skipped or if `time` is in the past.
    pub fn fast_forward(&mut self, time: f64) {
        assert!(time >= self.time, "cannot move the clock backwards");
        assert!(
            self.peek_time().map_or(true, |next| next >= time),
            "fast forward would skip pending events"
        );
        self.time = time;
    }

    /// Number of pending (not cancelled) events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Checks if there are no pending events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Returns the time of the next pending event without dispatching it.
    pub fn peek_time(&mut self) -> Option<f64> {
        self.discard_cancelled();
        self.events.peek().map(|entry| entry.event.time)
    }

    /// Removes and returns the next scheduled event or `None` if none are left.
    /// The clock is moved to the time of the returned event.
    pub fn pop(&mut self) -> Option<Event> {
        self.discard_cancelled();
        let entry = self.events.pop()?;
        self.live.remove(&entry.event.sequence);
        self.time = entry.event.time;
        Some(entry.event)
    }

    /// Like [`Scheduler::pop`] but fails if the queue is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyQueue`] if there are no pending events.
    pub fn advance(&mut self) -> Result<Event, EmptyQueue> {
        let time = self.time;
        self.pop().ok_or(EmptyQueue { time })
    }

    fn discard_cancelled(&mut self) {
        while let Some(entry) = self.events.peek() {
            if self.live.contains(&entry.event.sequence) {
                break;
            }
            self.events.pop();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entity(id: usize) -> EntityId {
        EntityId::from(id)
    }

    #[test]
    fn test_event_entry_cmp() {
        let make_entry = |time: f64, sequence: u64| EventEntry {
            key: Reverse((OrderedFloat(time), sequence)),
            event: Event {
                time,
                sequence,
                target: entity(0),
                kind: EventKind::Arrive,
            },
        };
        let (early, late) = (make_entry(1.0, 0), make_entry(2.0, 0));
        assert_eq!(early.cmp(&late), Ordering::Greater);
        assert_eq!(make_entry(2.0, 0).cmp(&make_entry(1.0, 5)), Ordering::Less);
        let (first, second) = (make_entry(1.0, 0), make_entry(1.0, 1));
        assert_eq!(first.cmp(&second), Ordering::Greater);
        assert_eq!(make_entry(1.0, 3), make_entry(1.0, 3));
    }

    #[test]
    fn test_scheduler() {
        let mut scheduler = Scheduler::default();
        assert_eq!(scheduler.time(), 0.0);
        assert!(scheduler.is_empty());

        scheduler.schedule(1.0, entity(0), EventKind::Arrive);
        scheduler.schedule(0.0, entity(1), EventKind::Unblocked);
        scheduler.schedule(2.0, entity(1), EventKind::Arrive);
        assert_eq!(scheduler.len(), 3);
        assert_eq!(scheduler.time(), 0.0);

        let event = scheduler.pop().unwrap();
        assert_eq!(event.target, entity(1));
        assert_eq!(event.kind, EventKind::Unblocked);
        assert_eq!(scheduler.time(), 0.0);

        let event = scheduler.pop().unwrap();
        assert_eq!(event.target, entity(0));
        assert_eq!(event.time, 1.0);
        assert_eq!(scheduler.time(), 1.0);

        // Relative to the new clock.
        scheduler.schedule(0.5, entity(2), EventKind::Arrive);

        let event = scheduler.pop().unwrap();
        assert_eq!(event.target, entity(2));
        assert_eq!(event.time, 1.5);

        let event = scheduler.pop().unwrap();
        assert_eq!(event.target, entity(1));
        assert_eq!(event.time, 2.0);
        assert_eq!(scheduler.time(), 2.0);

        assert!(scheduler.pop().is_none());
        assert_eq!(scheduler.advance(), Err(EmptyQueue { time: 2.0 }));
    }

    #[test]
    fn test_simultaneous_events_are_fifo() {
        let mut scheduler = Scheduler::default();
        for id in 0..10 {
            scheduler.schedule(3.0, entity(id), EventKind::Arrive);
        }
        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop())
            .map(|event| usize::from(event.target))
            .collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancel() {
        let mut scheduler = Scheduler::default();
        let first = scheduler.schedule(1.0, entity(0), EventKind::Arrive);
        let second = scheduler.schedule(2.0, entity(1), EventKind::Arrive);
        assert!(scheduler.cancel(first));
        assert!(!scheduler.cancel(first));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.peek_time(), Some(2.0));
        let event = scheduler.advance().unwrap();
        assert_eq!(event.handle(), second);
        assert!(!scheduler.cancel(second));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_cancel_all() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(1.0, entity(0), EventKind::Arrive);
        scheduler.schedule(2.0, entity(1), EventKind::Unblocked);
        assert_eq!(scheduler.cancel_all(), 2);
        assert!(scheduler.pop().is_none());
        assert_eq!(scheduler.time(), 0.0);
    }

    #[test]
    fn test_fast_forward() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(5.0, entity(0), EventKind::Arrive);
        scheduler.fast_forward(4.0);
        assert_eq!(scheduler.time(), 4.0);
    }

    #[test]
    #[should_panic]
    fn test_negative_delay() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(-1.0, entity(0), EventKind::Arrive);
    }
}
