//! Dispatch worker: runs blocking round trips off the controller thread.
//!
//! One worker thread, one job at a time. The controller never submits a new
//! job while one is outstanding, so the queue never holds more than one entry.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{anyhow, Result};

use crate::inference::{Dispatcher, InferenceResult};

use super::controller::{DispatchCompletion, DispatchJob, DispatchPort};

pub struct DispatchWorker {
    jobs: Option<Sender<DispatchJob>>,
    join: Option<JoinHandle<()>>,
}

impl DispatchWorker {
    /// Spawn the worker. `on_complete` runs on the worker thread for every job.
    pub fn spawn<F>(mut dispatcher: Box<dyn Dispatcher>, mut on_complete: F) -> Result<Self>
    where
        F: FnMut(DispatchCompletion) -> bool + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<DispatchJob>();
        let join = std::thread::Builder::new()
            .name("dispatch-worker".to_string())
            .spawn(move || {
                log::debug!("dispatch worker started ({})", dispatcher.name());
                while let Ok(job) = rx.recv() {
                    let started = Instant::now();
                    let result =
                        catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(&job.request)))
                            .unwrap_or_else(|_| InferenceResult::failure("dispatcher panicked"));
                    let completion = DispatchCompletion {
                        token: job.token,
                        started,
                        finished: Instant::now(),
                        result,
                    };
                    if !on_complete(completion) {
                        break;
                    }
                }
                log::debug!("dispatch worker stopped");
            })
            .map_err(|e| anyhow!("spawn dispatch worker: {}", e))?;
        Ok(Self {
            jobs: Some(tx),
            join: Some(join),
        })
    }
}

impl DispatchPort for DispatchWorker {
    fn submit(&mut self, job: DispatchJob) -> Result<()> {
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("dispatch worker closed"))?;
        jobs.send(job)
            .map_err(|_| anyhow!("dispatch worker stopped"))
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        // Closing the queue ends the worker after its current round trip. It is
        // not joined: that round trip may still be waiting on the network.
        self.jobs.take();
        self.join.take();
    }
}
