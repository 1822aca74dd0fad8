//! Admission control for heavy audit work.
//!
//! A fixed pool of slots shared by every audit. Waiters are served in
//! arrival order (tokio's semaphore is fair), and a slot is returned when the
//! [`AdmissionPermit`] is dropped, including on error, panic or cancellation.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Admission controller is closed")]
    Closed,
}

/// A held admission slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    ticket: u64,
}

impl AdmissionPermit {
    /// Monotonic sequence number assigned when the slot was granted.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

/// Bounded, FIFO admission pool.
pub struct AdmissionController {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    next_ticket: AtomicU64,
    queued: AtomicUsize,
}

impl AdmissionController {
    /// Create a pool with `max_concurrent` slots, at least one.
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            next_ticket: AtomicU64::new(0),
            queued: AtomicUsize::new(0),
        }
    }

    /// Wait for a slot.
    ///
    /// Cancelling the returned future removes the caller from the queue
    /// without consuming a slot.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AdmissionError> {
        let waiting = QueuedGuard::enter(&self.queued);
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AdmissionError::Closed)?;
        drop(waiting);
        Ok(self.grant(permit))
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| self.grant(permit))
    }

    /// Return a slot. Equivalent to dropping the permit.
    pub fn release(&self, permit: AdmissionPermit) {
        drop(permit);
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Callers waiting for a slot.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Refuse further acquisitions. Waiters receive [`AdmissionError::Closed`].
    pub fn close(&self) {
        self.semaphore.close();
    }

    fn grant(&self, permit: OwnedSemaphorePermit) -> AdmissionPermit {
        AdmissionPermit {
            _permit: permit,
            ticket: self.next_ticket.fetch_add(1, Ordering::SeqCst),
        }
    }
}

struct QueuedGuard<'a>(&'a AtomicUsize);

impl<'a> QueuedGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Mutex;

    async fn wait_for_queued(controller: &AdmissionController, n: usize) {
        while controller.queued() < n {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_capacity_clamped_to_one() {
        assert_eq!(AdmissionController::new(0).capacity(), 1);
        assert_eq!(AdmissionController::new(4).capacity(), 4);
    }

    #[tokio::test]
    async fn test_in_flight_accounting() {
        let controller = AdmissionController::new(2);
        let a = controller.acquire().await.expect("slot");
        let b = controller.acquire().await.expect("slot");
        assert_eq!(controller.in_flight(), 2);
        assert!(controller.try_acquire().is_none());

        controller.release(a);
        assert_eq!(controller.in_flight(), 1);
        drop(b);
        assert_eq!(controller.in_flight(), 0);
        assert_eq!(controller.queued(), 0);
    }

    #[tokio::test]
    async fn test_tickets_increase() {
        let controller = AdmissionController::new(2);
        let first = controller.acquire().await.expect("slot");
        let second = controller.acquire().await.expect("slot");
        assert!(second.ticket() > first.ticket());
    }

    #[tokio::test]
    async fn test_waiters_admitted_in_arrival_order() {
        let controller = Arc::new(AdmissionController::new(1));
        let order = Arc::new(Mutex::new(Vec::new()));
        let held = controller.acquire().await.expect("slot");

        let mut handles = Vec::new();
        for i in 0..5 {
            let waiter = controller.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let permit = waiter.acquire().await.expect("slot");
                order.lock().await.push(i);
                tokio::task::yield_now().await;
                drop(permit);
            }));
            wait_for_queued(&controller, i + 1).await;
        }

        assert_eq!(controller.queued(), 5);
        drop(held);
        for handle in handles {
            handle.await.expect("task");
        }

        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_never_exceeds_capacity() {
        let controller = Arc::new(AdmissionController::new(2));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let controller = controller.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let _permit = controller.acquire().await.expect("slot");
                    peak.fetch_max(controller.in_flight(), Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.expect("task");
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_queue() {
        let controller = AdmissionController::new(1);
        let held = controller.acquire().await.expect("slot");

        let attempt = tokio::time::timeout(Duration::from_millis(20), controller.acquire()).await;
        assert!(attempt.is_err());
        assert_eq!(controller.queued(), 0);

        drop(held);
        assert!(controller.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_slot_released_when_holder_panics() {
        let controller = Arc::new(AdmissionController::new(1));
        let task = {
            let controller = controller.clone();
            tokio::spawn(async move {
                let _permit = controller.acquire().await.expect("slot");
                panic!("audit blew up");
            })
        };
        assert!(task.await.is_err());
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_close_rejects_waiters() {
        let controller = AdmissionController::new(1);
        controller.close();
        assert!(matches!(
            controller.acquire().await,
            Err(AdmissionError::Closed)
        ));
    }
}
