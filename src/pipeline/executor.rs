//! The build worker thread.

use crate::core::{DeskshipError, Result};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Single dedicated worker thread for build work.
///
/// The external compiler is not safe to call from arbitrary threads, so every
/// platform build is submitted here and awaited before the next one starts.
/// Jobs run one at a time, in submission order, always on the same thread.
/// Everything else in the pipeline runs as ordinary async tasks.
pub struct BuildExecutor {
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl BuildExecutor {
    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`DeskshipError::Io`] if the thread cannot be spawned.
    pub fn start() -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name("deskship-build".to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
                tracing::debug!("Build executor stopped");
            })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    /// Run `job` on the worker thread and await its result.
    ///
    /// A panicking job is reported as an error and does not take the worker down.
    pub async fn submit<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let job: Job = Box::new(move || {
            let result = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
                Err(DeskshipError::Io(std::io::Error::other("build job panicked")))
            });
            let _ = reply.send(result);
        });

        self.sender
            .as_ref()
            .ok_or_else(stopped)?
            .send(job)
            .map_err(|_| stopped())?;

        response.await.map_err(|_| stopped())?
    }
}

fn stopped() -> DeskshipError {
    DeskshipError::Io(std::io::Error::other("build executor is not running"))
}

impl Drop for BuildExecutor {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once queued jobs finish.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
