//! Bounded FIFO queue plus job-slot accounting.
//!
//! Pure bookkeeping with no I/O, shared by the pipeline under its lock.

use std::collections::VecDeque;

use super::intent::IntentId;

#[derive(Debug)]
pub struct SlotQueue<T> {
    queue: VecDeque<(IntentId, T)>,
    capacity: usize,
    max_active: usize,
    active: usize,
}

impl<T> SlotQueue<T> {
    /// `capacity` pending items and `max_active` slots; both at least 1.
    pub fn new(capacity: usize, max_active: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            max_active: max_active.max(1),
            active: 0,
        }
    }

    /// Appends `item`, or hands it back when the queue is full.
    pub fn try_enqueue(&mut self, id: IntentId, item: T) -> Result<(), T> {
        if self.queue.len() >= self.capacity {
            return Err(item);
        }
        self.queue.push_back((id, item));
        Ok(())
    }

    /// Pops the oldest item into a free slot, if both exist.
    pub fn try_dispatch(&mut self) -> Option<(IntentId, T)> {
        if self.active >= self.max_active {
            return None;
        }
        let next = self.queue.pop_front()?;
        self.active += 1;
        Some(next)
    }

    /// Frees one slot.
    pub fn release(&mut self) {
        self.active = self.active.saturating_sub(1);
    }

    /// Room for another item and a free slot to run it.
    pub fn has_capacity(&self) -> bool {
        self.queue.len() < self.capacity && self.active < self.max_active
    }

    /// Nothing queued and nothing running.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.active == 0
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fifo_dispatch_and_slot_limit() {
        let mut q = SlotQueue::new(3, 2);
        for n in 1..=3 {
            q.try_enqueue(IntentId(n), n).unwrap();
        }
        assert_eq!(q.try_enqueue(IntentId(4), 4), Err(4));
        assert!(!q.has_capacity());

        assert_eq!(q.try_dispatch(), Some((IntentId(1), 1)));
        assert_eq!(q.try_dispatch(), Some((IntentId(2), 2)));
        assert_eq!(q.try_dispatch(), None);
        assert_eq!(q.active(), 2);

        q.release();
        assert_eq!(q.try_dispatch(), Some((IntentId(3), 3)));
        q.release();
        q.release();
        assert!(q.is_idle());
    }

    #[derive(Debug, Clone)]
    enum Action {
        /// Traversal enqueues only when it has been granted capacity.
        Produce,
        /// Enqueue regardless (must be rejected when full).
        ForceEnqueue,
        Dispatch,
        Complete,
    }

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::Produce),
            Just(Action::ForceEnqueue),
            Just(Action::Dispatch),
            Just(Action::Complete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Under any interleaving of enqueue/dispatch/complete events, the
        /// queue never holds more than `capacity` items, no more than
        /// `max_active` slots are busy, and items leave in FIFO order.
        #[test]
        fn bounds_hold_under_any_interleaving(
            capacity in 1usize..20,
            max_active in 1usize..12,
            actions in proptest::collection::vec(action(), 0..400),
        ) {
            let mut q = SlotQueue::new(capacity, max_active);
            let mut next = 0u64;
            let mut last_dispatched: Option<u64> = None;

            for a in actions {
                match a {
                    Action::Produce => {
                        if q.has_capacity() {
                            prop_assert!(q.try_enqueue(IntentId(next), next).is_ok());
                            next += 1;
                        }
                    }
                    Action::ForceEnqueue => {
                        let full = q.queued() >= capacity;
                        let res = q.try_enqueue(IntentId(next), next);
                        prop_assert_eq!(res.is_err(), full);
                        if res.is_ok() {
                            next += 1;
                        }
                    }
                    Action::Dispatch => {
                        if let Some((id, item)) = q.try_dispatch() {
                            prop_assert_eq!(id.0, item);
                            if let Some(prev) = last_dispatched {
                                prop_assert!(item > prev);
                            }
                            last_dispatched = Some(item);
                        }
                    }
                    Action::Complete => {
                        if q.active() > 0 {
                            q.release();
                        }
                    }
                }
                prop_assert!(q.queued() <= capacity);
                prop_assert!(q.active() <= max_active);
            }
        }
    }
}
