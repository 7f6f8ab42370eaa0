use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc::UnboundedSender;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

enum Job<M> {
    Perform(BoxFuture<M>),
    Channel(Box<dyn FnOnce(UnboundedSender<M>) -> BoxFuture<()> + Send>),
}

/// Background work requested by an update. Nothing runs until the runtime
/// spawns it; every job ends by sending messages back to the update loop.
#[must_use = "a task does nothing unless it is handed to the runtime"]
pub struct Task<M> {
    jobs: Vec<Job<M>>,
}

impl<M: Send + 'static> Task<M> {
    pub fn none() -> Self {
        Self { jobs: Vec::new() }
    }

    /// Run `future` and deliver its output through `map`.
    pub fn perform<T, F, Map>(future: F, map: Map) -> Self
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
        Map: FnOnce(T) -> M + Send + 'static,
    {
        Self {
            jobs: vec![Job::Perform(Box::pin(async move { map(future.await) }))],
        }
    }

    /// Run a job that may report any number of messages while it works.
    pub fn channel<F, Fut>(job: F) -> Self
    where
        F: FnOnce(UnboundedSender<M>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            jobs: vec![Job::Channel(Box::new(move |sender| Box::pin(job(sender))))],
        }
    }

    pub fn is_none(&self) -> bool {
        self.jobs.is_empty()
    }

    pub(super) fn into_futures(self, sender: &UnboundedSender<M>) -> Vec<BoxFuture<()>> {
        self.jobs
            .into_iter()
            .map(|job| match job {
                Job::Perform(future) => {
                    let sender = sender.clone();
                    Box::pin(async move {
                        let _ = sender.send(future.await);
                    }) as BoxFuture<()>
                }
                Job::Channel(start) => start(sender.clone()),
            })
            .collect()
    }
}

impl<M> std::fmt::Debug for Task<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("jobs", &self.jobs.len()).finish()
    }
}
