//! Fixed-capacity FIFO buffer
//!
//! Appends at the back, evicts from the front once capacity is reached.
//! Iteration is always oldest → newest; `to_vec` follows the display order
//! chosen at construction.

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Order in which `to_vec` presents the buffer contents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    order: DisplayOrder,
    total_pushed: u64,
}

impl<T> RingBuffer<T> {
    /// Oldest-first buffer. Fails on zero capacity.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_order(capacity, DisplayOrder::OldestFirst)
    }

    pub fn with_order(capacity: usize, order: DisplayOrder) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config("capacity", "must be a positive integer"));
        }
        Ok(Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            order,
            total_pushed: 0,
        })
    }

    /// Append an item, returning the evicted oldest item if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        self.total_pushed += 1;
        evicted
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn order(&self) -> DisplayOrder {
        self.order
    }

    /// Number of pushes over the buffer's lifetime (not reset by `clear`).
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest → newest, regardless of display order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Contents in the configured display order.
    pub fn to_vec(&self) -> Vec<T> {
        match self.order {
            DisplayOrder::OldestFirst => self.items.iter().cloned().collect(),
            DisplayOrder::NewestFirst => self.items.iter().rev().cloned().collect(),
        }
    }
}

/// A ring buffer behind a mutex, for hosts that read from another thread.
#[derive(Debug)]
pub struct SharedRing<T> {
    inner: Arc<Mutex<RingBuffer<T>>>,
}

impl<T> Clone for SharedRing<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedRing<T> {
    pub fn new(buffer: RingBuffer<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }

    pub fn push(&self, item: T) -> Option<T> {
        self.lock().push(item)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Lock the buffer. A poisoned lock is recovered: every mutation leaves
    /// the buffer consistent, so the data is still valid.
    pub fn lock(&self) -> MutexGuard<'_, RingBuffer<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone> SharedRing<T> {
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().to_vec()
    }
}
