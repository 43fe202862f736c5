//! Streaming loop controller.
//!
//! A single-writer state machine. Every mutation of the session, the visible
//! surface, the metrics snapshot, and the session log happens inside one of
//! the transition functions below, called from one thread.
//!
//! ```text
//!   Idle --start--> Running --stop / select_source--> Stopping --stale result--> Idle
//!                      ^  |                               (straight to Idle when
//!                      +--+ iteration                      nothing is in flight)
//! ```
//!
//! Time is passed in explicitly (`now`) so the machine can be driven by a real
//! event loop or stepped deterministically.

use std::time::{Duration, Instant};

use anyhow::Result;
use image::RgbaImage;

use crate::inference::{DispatchRequest, InferenceResult};
use crate::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::overlay::{OverlayPlan, OverlayRenderer};
use crate::sampler::{FrameSampler, SampleError, DEFAULT_JPEG_QUALITY};
use crate::session_log::{SessionLog, DEFAULT_LOG_CAPACITY};
use crate::source::FrameSource;

use super::session::{Generation, GenerationCounter, SessionToken, StreamSession};
use super::sink::OverlaySink;

pub const DEFAULT_PACING: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Running,
    /// Session ended while a request was still in flight.
    Stopping,
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Minimum delay between the end of one iteration and the next capture.
    pub pacing: Duration,
    /// Rendered surface (width, height); frames are resized to it.
    pub surface_size: (u32, u32),
    pub jpeg_quality: u8,
    pub log_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pacing: DEFAULT_PACING,
            surface_size: (640, 480),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// One frame handed to the dispatcher.
#[derive(Debug)]
pub struct DispatchJob {
    pub token: SessionToken,
    pub request: DispatchRequest,
}

/// A resolved dispatch, tagged with the token of the session that issued it.
#[derive(Debug)]
pub struct DispatchCompletion {
    pub token: SessionToken,
    /// When the request was handed to the dispatcher. Sampling and encoding
    /// happen before this and are not part of the round trip.
    pub started: Instant,
    pub finished: Instant,
    pub result: InferenceResult,
}

/// Where the controller sends sampled frames. Submission must not block on
/// the network; the completion comes back through `on_completion`.
pub trait DispatchPort: Send {
    fn submit(&mut self, job: DispatchJob) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CompletionOutcome {
    Rendered(MetricsSnapshot),
    Failed,
    /// Result of a superseded or stopped session; dropped without side effects.
    Stale,
    /// Nothing was outstanding for this token.
    Unexpected,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub dispatched: u64,
    pub rendered: u64,
    pub failures: u64,
    pub stale_discarded: u64,
    pub not_ready: u64,
}

/// Read-only view of the controller for status queries.
#[derive(Clone, Debug)]
pub struct StreamStatus {
    pub state: StreamState,
    pub generation: Generation,
    pub source: Option<String>,
    pub in_flight: bool,
    pub metrics: Option<MetricsSnapshot>,
    pub stats: StreamStats,
    pub log: Vec<String>,
    pub last_plan: Option<OverlayPlan>,
}

struct Outstanding {
    token: SessionToken,
    staging: RgbaImage,
}

pub struct StreamController {
    config: ControllerConfig,
    state: StreamState,
    generations: GenerationCounter,
    session: Option<StreamSession>,
    selected: Option<Box<dyn FrameSource>>,
    next_capture_at: Option<Instant>,
    outstanding: Option<Outstanding>,
    sampler: FrameSampler,
    renderer: OverlayRenderer,
    metrics: MetricsRecorder,
    surface: RgbaImage,
    last_plan: Option<OverlayPlan>,
    log: SessionLog,
    stats: StreamStats,
    port: Box<dyn DispatchPort>,
    sink: Option<Box<dyn OverlaySink>>,
}

impl StreamController {
    pub fn new(
        config: ControllerConfig,
        renderer: OverlayRenderer,
        port: Box<dyn DispatchPort>,
    ) -> Self {
        let (w, h) = config.surface_size;
        Self {
            sampler: FrameSampler::new(config.jpeg_quality),
            log: SessionLog::new(config.log_capacity),
            surface: RgbaImage::new(w.max(1), h.max(1)),
            config,
            state: StreamState::Idle,
            generations: GenerationCounter::new(),
            session: None,
            selected: None,
            next_capture_at: None,
            outstanding: None,
            renderer,
            metrics: MetricsRecorder::new(),
            last_plan: None,
            stats: StreamStats::default(),
            port,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn OverlaySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Choose the live source. An active session is ended first: its
    /// generation is retired and any result it still has in flight will be
    /// discarded. The controller does not restart on its own.
    pub fn select_source(&mut self, source: Box<dyn FrameSource>) {
        let description = source.describe();
        if let Some(session) = self.session.take() {
            drop(self.end_session(session, "source changed"));
        }
        self.selected = Some(source);
        self.log.system(format!("Source selected: {}", description));
    }

    /// Start streaming from the selected source. Returns false when there is
    /// nothing to start (no source, or the source could not be acquired).
    pub fn start(&mut self, now: Instant) -> bool {
        if self.state == StreamState::Running {
            log::debug!("stream: start ignored, already running");
            return true;
        }
        let Some(mut source) = self.selected.take() else {
            self.log.error("No live source selected.");
            log::error!("stream: start requested without a source");
            return false;
        };
        if let Err(err) = source.open() {
            self.log
                .error(format!("Camera unavailable ({}): {:#}", source.describe(), err));
            log::error!("stream: failed to acquire {}: {:#}", source.describe(), err);
            self.selected = Some(source);
            return false;
        }

        let generation = self.generations.bump();
        self.log
            .system(format!("Streaming from {} started.", source.describe()));
        log::info!("stream: {} started on {}", generation, source.describe());
        self.session = Some(StreamSession::new(source, generation));
        self.state = StreamState::Running;
        self.next_capture_at = Some(now);
        true
    }

    /// Stop streaming. Takes effect immediately for visible side effects; a
    /// request already on the wire is left to finish and then discarded.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            let source = self.end_session(session, "stopped");
            self.selected = Some(source);
        }
    }

    fn end_session(&mut self, session: StreamSession, reason: &str) -> Box<dyn FrameSource> {
        // Retire the generation before anything else so no later completion
        // can match it.
        self.generations.bump();
        self.next_capture_at = None;
        self.state = if self.outstanding.is_some() {
            StreamState::Stopping
        } else {
            StreamState::Idle
        };
        log::info!("stream: {} {}", session.generation(), reason);
        self.log.system(format!("Streaming {}.", reason));
        let mut source = session.end();
        source.close();
        source
    }

    /// Run the scheduled iteration if it is due.
    pub fn poll(&mut self, now: Instant) {
        if self.state != StreamState::Running || self.outstanding.is_some() {
            return;
        }
        match self.next_capture_at {
            Some(due) if due <= now => {}
            _ => return,
        }
        self.next_capture_at = None;
        self.run_iteration(now);
    }

    fn run_iteration(&mut self, now: Instant) {
        let pacing = self.config.pacing;
        let target = self.config.surface_size;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let token = session.token();

        match self.sampler.sample(session.source_mut(), target) {
            Ok(sampled) => {
                let job = DispatchJob {
                    token,
                    request: DispatchRequest::frame(sampled.payload),
                };
                match self.port.submit(job) {
                    Ok(()) => {
                        self.stats.dispatched += 1;
                        self.outstanding = Some(Outstanding {
                            token,
                            staging: sampled.staging,
                        });
                    }
                    Err(err) => {
                        self.log.error(format!("Dispatch unavailable: {:#}", err));
                        log::warn!("stream: submit failed: {:#}", err);
                        self.next_capture_at = Some(now + pacing);
                    }
                }
            }
            Err(SampleError::NotReady) => {
                self.stats.not_ready += 1;
                log::debug!("stream: frame not ready, retrying");
                self.next_capture_at = Some(now + pacing);
            }
            Err(err) => {
                self.log.error(format!("Frame capture failed: {}", err));
                log::warn!("stream: {}", err);
                self.next_capture_at = Some(now + pacing);
            }
        }
    }

    /// Consume a resolved dispatch.
    pub fn on_completion(
        &mut self,
        completion: DispatchCompletion,
        now: Instant,
    ) -> CompletionOutcome {
        let outstanding = match self.outstanding.take() {
            Some(outstanding) if outstanding.token == completion.token => outstanding,
            other => {
                self.outstanding = other;
                log::warn!(
                    "stream: ignoring completion for {} with nothing outstanding",
                    completion.token.generation()
                );
                return CompletionOutcome::Unexpected;
            }
        };

        if self.state == StreamState::Stopping {
            self.state = StreamState::Idle;
        }

        let current = self
            .session
            .as_ref()
            .is_some_and(|session| session.is_current(completion.token));
        if !current {
            self.stats.stale_discarded += 1;
            log::debug!(
                "stream: discarded stale result from {}",
                completion.token.generation()
            );
            return CompletionOutcome::Stale;
        }

        let result = completion.result;
        let outcome = if result.is_success() {
            let snapshot = self.metrics.record(
                completion.started,
                completion.finished,
                result.reported_latency_ms,
            );
            let plan = self
                .renderer
                .render(&mut self.surface, &outstanding.staging, &result.detections);
            if !result.logs.is_empty() {
                self.log.extend_backend(result.logs);
            }
            if let Some(sink) = self.sink.as_mut() {
                if let Err(err) = sink.present(&self.surface, &plan, &snapshot) {
                    log::warn!("stream: overlay sink failed: {:#}", err);
                }
            }
            self.last_plan = Some(plan);
            self.stats.rendered += 1;
            CompletionOutcome::Rendered(snapshot)
        } else {
            let reason = result.failure_reason().unwrap_or("unknown error");
            self.log.error(format!("Frame dispatch failed: {}", reason));
            log::warn!("stream: frame dispatch failed: {}", reason);
            self.stats.failures += 1;
            CompletionOutcome::Failed
        };

        self.next_capture_at = Some(now + self.config.pacing);
        outcome
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generations.current()
    }

    pub fn in_flight(&self) -> bool {
        self.outstanding.is_some()
    }

    /// When the event loop must next call `poll`, if a capture is scheduled.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.state == StreamState::Running && self.outstanding.is_none() {
            self.next_capture_at
        } else {
            None
        }
    }

    pub fn metrics(&self) -> Option<MetricsSnapshot> {
        self.metrics.current()
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn last_plan(&self) -> Option<&OverlayPlan> {
        self.last_plan.as_ref()
    }

    pub fn session_log(&self) -> &SessionLog {
        &self.log
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            state: self.state,
            generation: self.generation(),
            source: self
                .session
                .as_ref()
                .map(|session| session.describe_source())
                .or_else(|| self.selected.as_ref().map(|source| source.describe())),
            in_flight: self.in_flight(),
            metrics: self.metrics(),
            stats: self.stats,
            log: self.log.lines().map(|line| line.to_string()).collect(),
            last_plan: self.last_plan.clone(),
        }
    }
}
