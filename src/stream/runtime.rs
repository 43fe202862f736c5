//! Event-loop thread that owns a `StreamController`.
//!
//! Commands from `StreamHandle` and completions from the dispatch worker
//! arrive on one channel and are handled in order on one thread. Between
//! events the loop sleeps until the controller's next capture deadline.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::inference::Dispatcher;
use crate::overlay::OverlayRenderer;
use crate::source::FrameSource;

use super::controller::{
    ControllerConfig, DispatchCompletion, StreamController, StreamState, StreamStatus,
};
use super::sink::OverlaySink;
use super::worker::DispatchWorker;

const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

enum StreamCommand {
    SelectSource(Box<dyn FrameSource>),
    ChangeSource(Box<dyn FrameSource>, Sender<bool>),
    Start(Sender<bool>),
    Stop,
    Status(Sender<StreamStatus>),
    Shutdown,
}

enum RuntimeEvent {
    Command(StreamCommand),
    Completed(DispatchCompletion),
}

pub struct StreamRuntime {
    config: ControllerConfig,
    renderer: OverlayRenderer,
    sink: Option<Box<dyn OverlaySink>>,
}

impl StreamRuntime {
    pub fn new(config: ControllerConfig, renderer: OverlayRenderer) -> Self {
        Self {
            config,
            renderer,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn OverlaySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn spawn(self, dispatcher: Box<dyn Dispatcher>) -> Result<StreamHandle> {
        let (tx, rx) = mpsc::channel::<RuntimeEvent>();

        let completions = tx.clone();
        let worker = DispatchWorker::spawn(dispatcher, move |completion| {
            completions.send(RuntimeEvent::Completed(completion)).is_ok()
        })?;

        let mut controller = StreamController::new(self.config, self.renderer, Box::new(worker));
        if let Some(sink) = self.sink {
            controller = controller.with_sink(sink);
        }

        let join = std::thread::Builder::new()
            .name("stream-controller".to_string())
            .spawn(move || run_loop(controller, rx))
            .map_err(|e| anyhow!("spawn stream controller: {}", e))?;

        Ok(StreamHandle {
            tx,
            join: Some(join),
        })
    }
}

fn run_loop(mut controller: StreamController, rx: Receiver<RuntimeEvent>) {
    log::debug!("stream controller loop started");
    loop {
        controller.poll(Instant::now());

        let event = match controller.next_deadline() {
            Some(deadline) => {
                match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(event) => event,
                Err(_) => break,
            },
        };

        match event {
            RuntimeEvent::Completed(completion) => {
                controller.on_completion(completion, Instant::now());
            }
            RuntimeEvent::Command(StreamCommand::SelectSource(source)) => {
                controller.select_source(source);
            }
            RuntimeEvent::Command(StreamCommand::ChangeSource(source, reply)) => {
                let was_running = controller.state() == StreamState::Running;
                controller.select_source(source);
                let running = was_running && controller.start(Instant::now());
                let _ = reply.send(running);
            }
            RuntimeEvent::Command(StreamCommand::Start(reply)) => {
                let started = controller.start(Instant::now());
                let _ = reply.send(started);
            }
            RuntimeEvent::Command(StreamCommand::Stop) => controller.stop(),
            RuntimeEvent::Command(StreamCommand::Status(reply)) => {
                let _ = reply.send(controller.status());
            }
            RuntimeEvent::Command(StreamCommand::Shutdown) => {
                controller.stop();
                break;
            }
        }
    }
    log::debug!("stream controller loop stopped");
}

/// Control surface for a running `StreamRuntime`.
pub struct StreamHandle {
    tx: Sender<RuntimeEvent>,
    join: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Select the live source. Ends any active session without restarting.
    pub fn select_source(&self, source: Box<dyn FrameSource>) -> Result<()> {
        self.send(StreamCommand::SelectSource(source))
    }

    /// Swap the live source. A running stream restarts on the new source with
    /// a new generation; returns whether it is running afterwards.
    pub fn change_source(&self, source: Box<dyn FrameSource>) -> Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(StreamCommand::ChangeSource(source, reply_tx))?;
        reply_rx
            .recv_timeout(STATUS_TIMEOUT)
            .map_err(|_| anyhow!("stream controller did not answer change_source"))
    }

    /// Start streaming. Returns false if the source could not be acquired.
    pub fn start(&self) -> Result<bool> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(StreamCommand::Start(reply_tx))?;
        reply_rx
            .recv_timeout(STATUS_TIMEOUT)
            .map_err(|_| anyhow!("stream controller did not answer start"))
    }

    pub fn stop(&self) -> Result<()> {
        self.send(StreamCommand::Stop)
    }

    pub fn status(&self) -> Result<StreamStatus> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(StreamCommand::Status(reply_tx))?;
        reply_rx
            .recv_timeout(STATUS_TIMEOUT)
            .map_err(|_| anyhow!("stream controller did not answer status"))
    }

    /// Stop streaming and wait for the controller thread to exit.
    pub fn shutdown(mut self) -> Result<()> {
        self.send(StreamCommand::Shutdown)?;
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stream controller thread panicked"))?;
        }
        Ok(())
    }

    fn send(&self, command: StreamCommand) -> Result<()> {
        self.tx
            .send(RuntimeEvent::Command(command))
            .map_err(|_| anyhow!("stream controller stopped"))
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            let _ = self.tx.send(RuntimeEvent::Command(StreamCommand::Shutdown));
        }
    }
}
