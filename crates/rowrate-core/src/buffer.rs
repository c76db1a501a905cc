//! Fixed-capacity circular buffer
//!
//! Backs the sample and timestamp windows of the estimator as well as the
//! short stroke rate history. Appends are O(1) and overwrite the oldest
//! value once the buffer is full; indexing is relative to logical age.

extern crate alloc;
use alloc::vec::Vec;

/// Ring buffer holding at most `capacity` values, oldest first.
///
/// ```rust,ignore
/// let mut buf = RingBuffer::with_capacity(3);
/// for v in 1..=5 {
///     buf.push(v);
/// }
/// assert_eq!(buf.oldest(), Some(&3));
/// assert_eq!(buf.newest(), Some(&5));
/// ```
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: usize,
    /// Physical index of the logically oldest value once full
    head: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer that fills up to `capacity` values.
    ///
    /// A zero capacity is bumped to one so `push` can never fail.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    /// Create a full buffer, seeding slot `i` (0 = oldest) with `f(i)`.
    pub fn from_fn(capacity: usize, f: impl FnMut(usize) -> T) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(f).collect(),
            capacity,
            head: 0,
        }
    }

    /// Append a value, displacing the oldest one when full.
    pub fn push(&mut self, value: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
        } else {
            self.slots[self.head] = value;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// The `index`-th oldest value (0 = oldest, `len() - 1` = newest).
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.slots.len() {
            return None;
        }
        self.slots.get((self.head + index) % self.slots.len())
    }

    pub fn oldest(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn newest(&self) -> Option<&T> {
        self.len().checked_sub(1).and_then(|last| self.get(last))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.slots.len()).filter_map(move |i| self.get(i))
    }
}

impl<T: Copy> RingBuffer<T> {
    /// Copy the held values out in logical order (oldest first).
    pub fn to_vec(&self) -> Vec<T> {
        let (newer, older) = self.slots.split_at(self.head);
        let mut out = Vec::with_capacity(self.slots.len());
        out.extend_from_slice(older);
        out.extend_from_slice(newer);
        out
    }
}

impl RingBuffer<f64> {
    /// Arithmetic mean of the held values, 0.0 when empty.
    pub fn average(&self) -> f64 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.slots.iter().sum::<f64>() / self.slots.len() as f64
    }
}
