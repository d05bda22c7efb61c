use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Bounded pool for refresh work. Leaf tasks wait for one of `size` permits;
/// coordinators (tasks that only fan out and join) run without one so nested
/// join groups cannot starve the pool.
///
/// Tasks go to the runtime captured at construction, so submitting work is
/// fine from threads that are not part of it.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    runtime: Handle,
    permits: Semaphore,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

struct InFlight(Arc<PoolInner>);

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl WorkerPool {
    pub fn new(size: usize, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                runtime,
                permits: Semaphore::new(size.max(1)),
                closed: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    fn track(&self) -> InFlight {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlight(self.inner.clone())
    }

    /// Submits leaf work. Resolves to `None` when the pool was closed before
    /// the task got a permit.
    pub fn spawn<F, T>(&self, name: &'static str, fut: F) -> JoinHandle<Option<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            tracing::debug!(task = name, "pool closed, dropping task");
            return self.inner.runtime.spawn(async { None });
        }

        let guard = self.track();
        self.inner.runtime.spawn(async move {
            let Ok(_permit) = guard.0.permits.acquire().await else {
                tracing::debug!(task = name, "pool closed before task started");
                return None;
            };
            let start = Instant::now();
            let out = fut.await;
            tracing::trace!(
                task = name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "task finished"
            );
            Some(out)
        })
    }

    pub fn spawn_coordinator<F, T>(&self, name: &'static str, fut: F) -> JoinHandle<Option<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            tracing::debug!(task = name, "pool closed, dropping coordinator");
            return self.inner.runtime.spawn(async { None });
        }

        let guard = self.track();
        self.inner.runtime.spawn(async move {
            let _guard = guard;
            Some(fut.await)
        })
    }

    pub fn group<T: Send + 'static>(&self) -> JoinGroup<T> {
        JoinGroup {
            pool: self.clone(),
            handles: Vec::new(),
        }
    }

    /// Waits until no task is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stops accepting work, drops queued tasks and waits up to `timeout`
    /// for running ones. Returns false on timeout.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.permits.close();
        let drained = tokio::time::timeout(timeout, self.wait_idle()).await.is_ok();
        if !drained {
            tracing::warn!(
                in_flight = self.in_flight(),
                "worker pool shutdown timed out"
            );
        }
        drained
    }
}

/// Related tasks awaited together at one join point.
pub struct JoinGroup<T> {
    pool: WorkerPool,
    handles: Vec<(&'static str, JoinHandle<Option<T>>)>,
}

impl<T: Send + 'static> JoinGroup<T> {
    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.handles.push((name, self.pool.spawn(name, fut)));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Outputs of the tasks that ran, in submission order.
    pub async fn join(self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.handles.len());
        for (name, handle) in self.handles {
            match handle.await {
                Ok(Some(value)) => out.push(value),
                Ok(None) => {}
                Err(err) => tracing::warn!(task = name, error = %err, "task join error"),
            }
        }
        out
    }
}
