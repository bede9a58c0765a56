//! Handles for the long-running loops.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

/// Owner of a spawned loop.
///
/// [`TaskHandle::stop`] signals the loop and waits for it to finish. Dropping
/// the handle also ends the loop at its next suspension point.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TaskHandle {
    pub(crate) fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(body(shutdown_rx));
        Self {
            name,
            shutdown: Some(shutdown),
            task,
        }
    }

    /// Name of the loop, for logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop to stop and wait until it has.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // Loop may already have exited on its own.
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(task = self.name, "Task ended abnormally: {}", e);
        }
    }
}
