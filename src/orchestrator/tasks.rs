//! # Background Tasks
//!
//! Bounded pool for fire-and-forget provisioning work. Each unit of work is
//! spawned immediately and waits for a semaphore permit before running;
//! results are written back through the repositories, not returned here.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

#[derive(Debug)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl TaskPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Spawn `work`; it starts once a permit is free
    pub fn spawn<F>(&self, label: String, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let mut tasks = self.tasks();
        reap_finished(&mut tasks);
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                error!("Task pool closed, dropping {}", label);
                return;
            };
            debug!("Starting background task {}", label);
            work.await;
        });
    }

    /// Number of tasks not yet reaped
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks();
        reap_finished(&mut tasks);
        tasks.len()
    }

    /// Wait for every spawned task, including ones spawned while draining
    pub async fn drain(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.tasks());
            if batch.is_empty() {
                return;
            }
            while let Some(result) = batch.join_next().await {
                if let Err(e) = result {
                    error!("Background task failed to complete: {}", e);
                }
            }
        }
    }
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            error!("Background task failed to complete: {}", e);
        }
    }
}
