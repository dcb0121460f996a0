// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A fixed-capacity, multi-producer multi-consumer FIFO with drop-on-full
//! admission.
//!
//! Producers never block: a full queue rejects the item and hands it to the
//! drop handler registered at construction. Consumers are tokio tasks that
//! block on dequeue; on [`BoundedQueue::stop`] they drain whatever is left
//! and exit.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use collector_common::MutexExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

type DropHandler<T> = Box<dyn Fn(T) + Send + Sync>;

enum Step<T> {
    Run(T),
    Wait,
    Done,
}

struct QueueInner<T> {
    items: Mutex<VecDeque<T>>,
    capacity: AtomicUsize,
    closed: AtomicBool,
    notify: Notify,
    on_drop: Option<DropHandler<T>>,
    // Serializes resize against other resizes; producers and consumers only
    // observe the atomic capacity.
    resize_lock: Mutex<()>,
}

pub struct BoundedQueue<T> {
    inner: Arc<QueueInner<T>>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> BoundedQueue<T> {
    /// A queue holding at most `capacity` items. `on_drop` sees every item
    /// rejected by a full or closed queue.
    pub fn new(capacity: usize, on_drop: Option<DropHandler<T>>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                items: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity: AtomicUsize::new(capacity),
                closed: AtomicBool::new(false),
                notify: Notify::new(),
                on_drop,
                resize_lock: Mutex::new(()),
            }),
            consumers: Mutex::new(Vec::new()),
        }
    }

    /// Non-blocking enqueue. Returns false and invokes the drop handler if
    /// the queue is full or stopped.
    ///
    /// The closed check happens under the items lock, so once a consumer has
    /// observed the queue closed and empty, no later produce can sneak an
    /// item past the drain.
    pub fn produce(&self, item: T) -> bool {
        {
            let mut items = self.inner.items.lock_or_panic();
            if self.inner.closed.load(Ordering::Acquire)
                || items.len() >= self.inner.capacity.load(Ordering::Relaxed)
            {
                drop(items);
                self.reject(item);
                return false;
            }
            items.push_back(item);
        }
        self.inner.notify.notify_one();
        true
    }

    fn reject(&self, item: T) {
        if let Some(on_drop) = &self.inner.on_drop {
            on_drop(item);
        }
    }

    /// One scheduling decision for a consumer, taken under the items lock:
    /// run the next item, wait for more, or exit because the queue is both
    /// closed and drained.
    fn next_step(inner: &QueueInner<T>) -> Step<T> {
        let mut items = inner.items.lock_or_panic();
        match items.pop_front() {
            Some(item) => Step::Run(item),
            None if inner.closed.load(Ordering::Acquire) => Step::Done,
            None => Step::Wait,
        }
    }

    /// Spawn `n` consumer tasks on the current tokio runtime. Each blocks on
    /// dequeue and runs `f` per item until the queue stops and drains.
    pub fn start_consumers<F, Fut>(&self, n: usize, f: F)
    where
        F: Fn(T) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut consumers = self.consumers.lock_or_panic();
        for _ in 0..n {
            let inner = Arc::clone(&self.inner);
            let f = f.clone();
            consumers.push(tokio::spawn(async move {
                loop {
                    match Self::next_step(&inner) {
                        Step::Run(item) => f(item).await,
                        Step::Done => break,
                        Step::Wait => {
                            // Register for a wakeup before re-checking, so a
                            // notify racing with the empty check is not lost.
                            let notified = inner.notify.notified();
                            tokio::pin!(notified);
                            notified.as_mut().enable();
                            match Self::next_step(&inner) {
                                Step::Run(item) => f(item).await,
                                Step::Done => break,
                                Step::Wait => notified.await,
                            }
                        }
                    }
                }
            }));
        }
    }

    /// Close the queue and wait for consumers to drain residual items and
    /// exit. Idempotent.
    pub async fn stop(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
        let handles = std::mem::take(&mut *self.consumers.lock_or_panic());
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn size(&self) -> usize {
        self.inner.items.lock_or_panic().len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Change the capacity. In-flight items are preserved; when shrinking
    /// below the current size, the backlog drains before new items are
    /// admitted.
    pub fn resize(&self, capacity: usize) {
        let _guard = self.inner.resize_lock.lock_or_panic();
        let previous = self.inner.capacity.swap(capacity, Ordering::Relaxed);
        if previous != capacity {
            info!(previous, capacity, "resized span queue");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    #[tokio::test]
    async fn test_produce_and_consume() {
        let queue: BoundedQueue<u64> = BoundedQueue::new(10, None);
        let sum = Arc::new(AtomicU64::new(0));
        let seen = Arc::new(Semaphore::new(0));

        let (sum2, seen2) = (sum.clone(), seen.clone());
        queue.start_consumers(3, move |item| {
            let sum = sum2.clone();
            let seen = seen2.clone();
            async move {
                sum.fetch_add(item, Ordering::Relaxed);
                seen.add_permits(1);
            }
        });

        for i in 1..=5 {
            assert!(queue.produce(i));
        }
        let _ = seen.acquire_many(5).await.unwrap();
        assert_eq!(15, sum.load(Ordering::Relaxed));
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_drop_on_full_counts_rejects() {
        let dropped = Arc::new(AtomicU64::new(0));
        let dropped2 = dropped.clone();
        // No consumers: the queue fills up and stays full.
        let queue: BoundedQueue<u64> = BoundedQueue::new(3, Some(Box::new(move |_| {
            dropped2.fetch_add(1, Ordering::Relaxed);
        })));

        let accepted = (0..10).filter(|i| queue.produce(*i)).count();
        assert_eq!(3, accepted);
        assert_eq!(7, dropped.load(Ordering::Relaxed));
        assert_eq!(3, queue.size());
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_stop_drains_residual_items() {
        let queue: BoundedQueue<u64> = BoundedQueue::new(100, None);
        for i in 0..50 {
            assert!(queue.produce(i));
        }
        let processed = Arc::new(AtomicU64::new(0));
        let processed2 = processed.clone();
        queue.start_consumers(2, move |_| {
            let processed = processed2.clone();
            async move {
                processed.fetch_add(1, Ordering::Relaxed);
            }
        });
        queue.stop().await;
        assert_eq!(50, processed.load(Ordering::Relaxed));
        assert_eq!(0, queue.size());
    }

    #[tokio::test]
    async fn test_produce_after_stop_is_rejected() {
        let dropped = Arc::new(AtomicU64::new(0));
        let dropped2 = dropped.clone();
        let queue: BoundedQueue<u64> = BoundedQueue::new(10, Some(Box::new(move |_| {
            dropped2.fetch_add(1, Ordering::Relaxed);
        })));
        queue.stop().await;
        assert!(!queue.produce(1));
        assert_eq!(1, dropped.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_resize_preserves_items() {
        let queue: BoundedQueue<u64> = BoundedQueue::new(2, None);
        assert!(queue.produce(1));
        assert!(queue.produce(2));
        assert!(!queue.produce(3));

        queue.resize(4);
        assert_eq!(4, queue.capacity());
        assert_eq!(2, queue.size());
        assert!(queue.produce(3));

        queue.resize(1);
        // Shrinking below the backlog keeps in-flight items
        assert_eq!(3, queue.size());
        assert!(!queue.produce(4));
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_slow_consumer_backpressure() {
        let gate = Arc::new(Semaphore::new(0));
        let gate2 = gate.clone();
        let queue: BoundedQueue<u64> = BoundedQueue::new(1, None);
        queue.start_consumers(1, move |_| {
            let gate = gate2.clone();
            async move {
                let _ = gate.acquire().await.unwrap();
            }
        });

        assert!(queue.produce(1));
        // Give the consumer a moment to pick up the first item
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(queue.produce(2));
        // Queue is at capacity while the consumer is blocked
        assert!(!queue.produce(3));

        gate.add_permits(10);
        queue.stop().await;
    }
}
