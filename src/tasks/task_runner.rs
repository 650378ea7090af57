use std::future::Future;
use std::pin::Pin;

use tokio::task::JoinHandle;
use tracing::{error, info};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Collects the bot's long-running tasks so they can be started together
/// and awaited on shutdown.
pub struct TaskRunner {
    tasks: Vec<(&'static str, BoxedTask)>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn add_task<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push((name, Box::pin(task)));
    }

    pub fn start_all(self) -> RunningTasks {
        let handles = self
            .tasks
            .into_iter()
            .map(|(name, task)| {
                info!(task = name, "starting task");
                (name, tokio::spawn(task))
            })
            .collect();
        RunningTasks { handles }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RunningTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl RunningTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every task, logging the ones that panicked.
    pub async fn wait_all(self) {
        for (name, handle) in self.handles {
            match handle.await {
                Ok(()) => info!(task = name, "task finished"),
                Err(err) => error!(task = name, error = %err, "task failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_every_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut runner = TaskRunner::new();
        for name in ["first", "second"] {
            let counter = counter.clone();
            runner.add_task(name, async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        let running = runner.start_all();
        assert_eq!(running.len(), 2);
        running.wait_all().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
