//! Bounded FIFO for stream events that arrived in the same frame.

use std::collections::VecDeque;
use tokio::sync::Mutex;

use crate::error::Error;

/// A thread-safe bounded queue.
///
/// Appending never drops elements: a batch that does not fit is rejected
/// as a whole with [`Error::QueueFull`].
#[derive(Debug)]
pub struct BoundedQueue<T> {
    buffer: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Creates a new bounded queue with the specified capacity.
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Appends elements to the end of the queue.
    pub async fn append(&self, elements: Vec<T>) -> Result<(), Error> {
        if elements.is_empty() {
            return Ok(());
        }

        let mut buffer = self.buffer.lock().await;
        if buffer.len() + elements.len() > self.capacity {
            return Err(Error::QueueFull);
        }

        buffer.extend(elements);
        Ok(())
    }

    /// Removes and returns the oldest element.
    pub async fn pop(&self) -> Option<T> {
        self.buffer.lock().await.pop_front()
    }

    /// Returns the current number of elements in the queue.
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Returns true if the queue is empty.
    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.buffer.lock().await.is_empty()
    }

    /// Clears all elements from the queue.
    pub async fn clear(&self) {
        self.buffer.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = BoundedQueue::<i32>::new(10);
        assert!(queue.is_empty().await);

        queue.append(vec![1, 2, 3]).await.unwrap();
        assert_eq!(queue.len().await, 3);

        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.pop().await, Some(3));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_capacity_rejects_whole_batch() {
        let queue = BoundedQueue::<i32>::new(5);

        queue.append(vec![1, 2, 3]).await.unwrap();
        assert!(matches!(
            queue.append(vec![4, 5, 6]).await,
            Err(Error::QueueFull)
        ));
        assert_eq!(queue.len().await, 3);

        queue.append(vec![4, 5]).await.unwrap();
        assert_eq!(queue.len().await, 5);
    }

    #[tokio::test]
    async fn test_clear() {
        let queue = BoundedQueue::<i32>::new(3);
        queue.append(vec![1, 2]).await.unwrap();
        queue.clear().await;
        assert!(queue.is_empty().await);
    }
}
