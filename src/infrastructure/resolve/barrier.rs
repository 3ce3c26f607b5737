// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Run-wide join point for attribute resolutions.
//!
//! Builders register every resolution the inventory depends on while they
//! declare resources. Each builder holds a [`ProducerGuard`] for as long as it
//! may still register. [`Barrier::wait`] first waits for every guard to drop,
//! then drains the registered set batch by batch until no new entries show up,
//! so resolutions registered after waiting began are still covered.

use super::output::{Attribute, Output};
use crate::shared::{FleetError, Result};
use futures::future;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Clone)]
pub struct Barrier {
    inner: Arc<BarrierInner>,
}

struct BarrierInner {
    pending: Mutex<Vec<Output<()>>>,
    producers: watch::Sender<usize>,
    gated: AtomicBool,
}

/// Proof that the barrier released. Only the barrier can mint one, so code
/// that takes a `&Released` cannot run on a partial snapshot.
#[derive(Debug)]
pub struct Released {
    resolved: usize,
}

impl Released {
    pub fn resolved(&self) -> usize {
        self.resolved
    }
}

/// Keeps the barrier closed while a builder may still register.
pub struct ProducerGuard {
    inner: Arc<BarrierInner>,
    name: String,
}

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        self.inner
            .producers
            .send_modify(|active| *active = active.saturating_sub(1));
        debug!(producer = %self.name, "barrier producer finished");
    }
}

impl Default for Barrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Barrier {
    pub fn new() -> Self {
        let (producers, _) = watch::channel(0usize);
        Self {
            inner: Arc::new(BarrierInner {
                pending: Mutex::new(Vec::new()),
                producers,
                gated: AtomicBool::new(false),
            }),
        }
    }

    pub fn producer(&self, name: impl Into<String>) -> ProducerGuard {
        let name = name.into();
        self.inner.producers.send_modify(|active| *active += 1);
        debug!(producer = %name, "barrier producer started");
        ProducerGuard {
            inner: Arc::clone(&self.inner),
            name,
        }
    }

    /// Append a resolution to the tracked set. Never removes anything.
    pub fn register<T: Attribute>(&self, output: &Output<T>) {
        let done = output.map(|_| ());
        let mut pending = self.inner.pending.lock();
        pending.push(done);
        debug!(registered = pending.len(), "barrier registration");
    }

    pub fn registered(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Resolves once every producer finished and every registered resolution
    /// succeeded. Fails fast on the first provider failure.
    pub async fn wait(&self) -> Result<Released> {
        let mut producers = self.inner.producers.subscribe();
        producers
            .wait_for(|active| *active == 0)
            .await
            .map_err(|_| FleetError::barrier("producer channel closed"))?;

        let mut cursor = 0;
        loop {
            let batch: Vec<Output<()>> = {
                let pending = self.inner.pending.lock();
                pending[cursor..].to_vec()
            };
            if batch.is_empty() {
                break;
            }
            cursor += batch.len();
            debug!(batch = batch.len(), total = cursor, "awaiting barrier batch");
            future::try_join_all(batch).await?;
        }

        Ok(Released { resolved: cursor })
    }

    /// Wait, then run `action` exactly once for the lifetime of this barrier.
    pub async fn gate<T, F, Fut>(&self, action: F) -> Result<T>
    where
        F: FnOnce(Released) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.inner.gated.swap(true, Ordering::SeqCst) {
            return Err(FleetError::barrier("gated action already ran"));
        }
        let released = self.wait().await?;
        info!(resolved = released.resolved(), "barrier released");
        action(released).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::ProviderFailure;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn delayed(ms: u64, counter: Arc<AtomicUsize>) -> Output<()> {
        Output::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_wait_covers_every_registration() {
        let barrier = Barrier::new();
        let resolved = Arc::new(AtomicUsize::new(0));
        {
            let _guard = barrier.producer("cluster-a");
            for ms in [30, 5, 15] {
                barrier.register(&delayed(ms, resolved.clone()));
            }
        }
        let released = barrier.wait().await.unwrap();
        assert_eq!(released.resolved(), 3);
        assert_eq!(resolved.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_includes_late_registrations() {
        let barrier = Barrier::new();
        let resolved = Arc::new(AtomicUsize::new(0));
        let guard = barrier.producer("late-builder");

        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        barrier.register(&delayed(20, resolved.clone()));
        barrier.register(&delayed(1, resolved.clone()));
        drop(guard);

        let released = waiter.await.unwrap().unwrap();
        assert_eq!(released.resolved(), 2);
        assert_eq!(resolved.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_registration_drops_nothing() {
        let barrier = Barrier::new();
        let resolved = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for i in 0..8 {
            let barrier = barrier.clone();
            let resolved = resolved.clone();
            let guard = barrier.producer(format!("builder-{}", i));
            tasks.push(tokio::spawn(async move {
                let _guard = guard;
                for j in 0..25u64 {
                    barrier.register(&delayed(j % 3, resolved.clone()));
                    tokio::task::yield_now().await;
                }
            }));
        }
        let released = barrier.wait().await.unwrap();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(released.resolved(), 200);
        assert_eq!(resolved.load(Ordering::SeqCst), 200);
    }

    #[tokio::test]
    async fn test_wait_fails_fast_on_provider_failure() {
        let barrier = Barrier::new();
        barrier.register(&Output::<()>::failed(ProviderFailure::new(
            "server/control-plane-prod-0",
            "server type unavailable",
        )));
        let err = barrier.wait().await.unwrap_err();
        assert!(matches!(err, FleetError::Provider { .. }));
    }

    #[tokio::test]
    async fn test_gate_runs_once() {
        let barrier = Barrier::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let first = {
            let runs = runs.clone();
            barrier
                .gate(|_| async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
        };
        let second = barrier.gate(|_| async { Ok(()) }).await;

        assert!(first.is_ok());
        assert!(matches!(second, Err(FleetError::Barrier(_))));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
