//! FIFO of logged-in clients waiting for an opponent.

use crate::client_manager::SlotId;
use log::debug;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct MatchQueue {
    waiting: VecDeque<SlotId>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `client` unless it is already waiting.
    pub fn enqueue(&mut self, client: SlotId) -> bool {
        if self.waiting.contains(&client) {
            return false;
        }
        self.waiting.push_back(client);
        debug!("Pushing {} to queue", client);
        true
    }

    /// Pops the two oldest entries, in the order they were queued.
    pub fn dequeue_pair(&mut self) -> Option<(SlotId, SlotId)> {
        if self.waiting.len() < 2 {
            return None;
        }
        let first = self.waiting.pop_front()?;
        let second = self.waiting.pop_front()?;
        debug!("Pop {} and {} from queue", first, second);
        Some((first, second))
    }

    /// Drops `client` from the queue. No-op if it isn't there.
    pub fn remove(&mut self, client: SlotId) -> bool {
        match self.waiting.iter().position(|&id| id == client) {
            Some(index) => {
                self.waiting.remove(index);
                debug!("Pop {} from queue", client);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.waiting.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_pairs() {
        let mut queue = MatchQueue::new();
        for id in [3, 1, 2] {
            assert!(queue.enqueue(id));
        }
        assert_eq!(queue.dequeue_pair(), Some((3, 1)));
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![2]);
        assert_eq!(queue.dequeue_pair(), None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_no_duplicates() {
        let mut queue = MatchQueue::new();
        assert!(queue.enqueue(5));
        assert!(!queue.enqueue(5));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut queue = MatchQueue::new();
        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(3);
        assert!(queue.remove(2));
        assert!(!queue.remove(2));
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(queue.dequeue_pair(), Some((1, 3)));
        assert!(queue.is_empty());
    }
}
