//! Fixed-capacity FIFO for raw ADC codes.
//!
//! Storage is reserved up front through the `N` const parameter; the run's
//! capacity (`frequency × collection_time`) is fixed at construction and may
//! be smaller than `N`. Pushing never allocates, so the queue can be filled
//! from interrupt context.

use core::fmt;

use heapless::Deque;

/// Errors surfaced by [`SampleQueue`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum QueueError {
    /// `put` was called while the queue already held `capacity` samples.
    Overflow,
    /// `get` was called on an empty queue.
    Underflow,
    /// Requested capacity exceeds the reserved storage.
    CapacityExceeded { requested: usize, storage: usize },
    /// A zero-capacity queue can never report full.
    ZeroCapacity,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Overflow => f.write_str("sample queue overflow"),
            QueueError::Underflow => f.write_str("sample queue underflow"),
            QueueError::CapacityExceeded { requested, storage } => {
                write!(f, "capacity {requested} exceeds storage {storage}")
            }
            QueueError::ZeroCapacity => f.write_str("sample queue capacity is zero"),
        }
    }
}

/// Bounded FIFO of raw ADC codes.
#[derive(Clone, Debug)]
pub struct SampleQueue<const N: usize> {
    samples: Deque<u16, N>,
    capacity: usize,
}

impl<const N: usize> SampleQueue<N> {
    /// Creates an empty queue that accepts at most `capacity` samples.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        if capacity > N {
            return Err(QueueError::CapacityExceeded {
                requested: capacity,
                storage: N,
            });
        }
        Ok(Self {
            samples: Deque::new(),
            capacity,
        })
    }

    /// Appends a sample, failing without side effects when the queue is full.
    pub fn put(&mut self, sample: u16) -> Result<(), QueueError> {
        if self.full() {
            return Err(QueueError::Overflow);
        }
        self.samples
            .push_back(sample)
            .map_err(|_| QueueError::Overflow)
    }

    /// Removes the oldest sample.
    pub fn get(&mut self) -> Result<u16, QueueError> {
        self.samples.pop_front().ok_or(QueueError::Underflow)
    }

    /// Returns `true` once `capacity` samples are queued.
    pub fn full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Returns `true` while at least one sample is queued.
    pub fn any(&self) -> bool {
        !self.samples.is_empty()
    }

    /// Number of queued samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` when no samples are queued.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Capacity fixed at construction.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discards every queued sample, keeping the capacity.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_exactly_at_capacity() {
        let mut queue = SampleQueue::<8>::new(3).expect("queue");
        assert!(!queue.full());
        assert!(!queue.any());

        queue.put(10).expect("first put");
        queue.put(20).expect("second put");
        assert!(!queue.full());
        queue.put(30).expect("third put");
        assert!(queue.full());

        assert_eq!(queue.put(40), Err(QueueError::Overflow));
        assert_eq!(queue.len(), 3);
        assert!(queue.full());

        assert_eq!(queue.get(), Ok(10));
        assert!(!queue.full());
        assert!(queue.any());
    }

    #[test]
    fn drains_in_fifo_order_then_underflows() {
        let mut queue = SampleQueue::<4>::new(4).expect("queue");
        for code in [4095, 0, 17, 2048] {
            queue.put(code).expect("put");
        }

        assert_eq!(queue.get(), Ok(4095));
        assert_eq!(queue.get(), Ok(0));
        assert_eq!(queue.get(), Ok(17));
        assert_eq!(queue.get(), Ok(2048));
        assert_eq!(queue.get(), Err(QueueError::Underflow));
        assert!(!queue.any());
    }

    #[test]
    fn capacity_is_bounded_by_storage() {
        assert_eq!(
            SampleQueue::<4>::new(5).err(),
            Some(QueueError::CapacityExceeded {
                requested: 5,
                storage: 4
            })
        );
        assert_eq!(
            SampleQueue::<4>::new(0).err(),
            Some(QueueError::ZeroCapacity)
        );
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut queue = SampleQueue::<4>::new(2).expect("queue");
        queue.put(1).expect("put");
        queue.put(2).expect("put");
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 2);
        queue.put(3).expect("put after clear");
    }
}
