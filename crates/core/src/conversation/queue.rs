use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Unbounded FIFO shared by one producer and one consumer on different
/// scheduling contexts.
///
/// `push`, `try_pop` and `clear` never wait beyond a short critical section.
/// A consumer that wants to suspend until data arrives uses [`Self::recv`],
/// which is woken by `push` instead of re-checking on a timer.
#[derive(Debug)]
pub struct DeliveryQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> Default for DeliveryQueue<T> {
    fn default() -> Self {
        Self { items: Mutex::new(VecDeque::new()), notify: Notify::new() }
    }
}

impl<T> DeliveryQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Swaps the backing buffer for an empty one and returns how many entries
    /// were discarded.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Waits until an entry is available and pops it.
    pub async fn recv(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between the pop above and this await is not lost.
            self.notify.notified().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
