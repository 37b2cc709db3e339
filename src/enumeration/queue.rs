//! FIFO with an async readiness signal.
//!
//! Appenders are synchronous (callable from any task); a single consumer
//! awaits `signal` and then drains with `next`. The notify permit can
//! coalesce under bursts, so consumers re-check emptiness rather than
//! trusting one wakeup per item.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

pub(crate) struct SignalQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> SignalQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub(crate) fn append(&self, item: T) {
        self.items.lock().expect("queue lock").push_back(item);
        self.notify.notify_one();
    }

    pub(crate) fn next(&self) -> Option<T> {
        self.items.lock().expect("queue lock").pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().expect("queue lock").len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until an append has happened since the last wakeup.
    pub(crate) async fn signal(&self) {
        self.notify.notified().await;
    }

    /// Drop everything queued.
    pub(crate) fn drain(&self) {
        self.items.lock().expect("queue lock").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fifo_order() {
        let q = SignalQueue::new();
        q.append(1);
        q.append(2);
        q.append(3);
        assert_eq!(q.len(), 3);
        assert_eq!(q.next(), Some(1));
        assert_eq!(q.next(), Some(2));
        assert_eq!(q.next(), Some(3));
        assert_eq!(q.next(), None);
    }

    #[tokio::test]
    async fn signal_wakes_consumer() {
        let q = Arc::new(SignalQueue::new());
        let q2 = q.clone();
        let waiter = tokio::spawn(async move {
            q2.signal().await;
            q2.next()
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.append(42);
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some(42));
    }

    #[test]
    fn drain_empties() {
        let q = SignalQueue::new();
        q.append("a");
        q.append("b");
        q.drain();
        assert!(q.is_empty());
    }
}
