//! Hang detection by periodic stack sampling.
//!
//! The detector launches a fresh target, lets it run, and every sample
//! interval forces a pause, records the top of the stack and resumes. A target
//! whose location stops moving for a run of consecutive samples when the
//! timeout elapses is hung; one that exits first completed; anything else is
//! reported as timed out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use inspect_debug_core::{
    millis, DebugConfig, HangDetectionResult, HangDetectionSettings, HangVerdict, Result,
};
use inspect_debug_protocol::{
    InspectorClient, InspectorEvent, LaunchSpec, Launcher, PausedEvent, TransportConfig,
};

use crate::sampler::{StabilityTracker, StackSample};

/// Configuration for a [`HangDetector`].
#[derive(Debug, Clone)]
pub struct HangDetectorConfig {
    /// Overall time budget
    pub timeout: Duration,
    /// Interval between samples
    pub sample_interval: Duration,
    /// Identical consecutive samples required for a hung verdict
    pub min_consecutive_samples: usize,
    /// How long a forced pause may take to land
    pub pause_timeout: Duration,
    /// Transport timeouts
    pub transport: TransportConfig,
}

impl Default for HangDetectorConfig {
    fn default() -> Self {
        Self::from(&DebugConfig::default())
    }
}

impl From<&DebugConfig> for HangDetectorConfig {
    fn from(config: &DebugConfig) -> Self {
        Self::from_settings(
            &config.hang_detection,
            TransportConfig::from(&config.transport),
        )
    }
}

impl HangDetectorConfig {
    fn from_settings(settings: &HangDetectionSettings, transport: TransportConfig) -> Self {
        Self {
            timeout: Duration::from_millis(settings.timeout_ms),
            sample_interval: Duration::from_millis(settings.sample_interval_ms),
            min_consecutive_samples: settings.min_consecutive_samples,
            pause_timeout: Duration::from_millis(settings.pause_timeout_ms),
            transport,
        }
    }

    /// Set the number of identical samples required for a hung verdict.
    pub fn with_min_consecutive_samples(mut self, samples: usize) -> Self {
        self.min_consecutive_samples = samples;
        self
    }

    /// Set the forced-pause timeout.
    pub fn with_pause_timeout(mut self, timeout: Duration) -> Self {
        self.pause_timeout = timeout;
        self
    }
}

/// Launches targets and classifies them as hung, completed or timed out.
pub struct HangDetector {
    launcher: Arc<dyn Launcher>,
    config: HangDetectorConfig,
}

impl HangDetector {
    /// Create a detector with default configuration.
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self::with_config(launcher, HangDetectorConfig::default())
    }

    /// Create a detector with custom configuration.
    pub fn with_config(launcher: Arc<dyn Launcher>, config: HangDetectorConfig) -> Self {
        Self { launcher, config }
    }

    /// Current configuration.
    pub fn config(&self) -> &HangDetectorConfig {
        &self.config
    }

    /// Run detection with the configured timeout and sample interval.
    pub async fn detect_default(&self, spec: &LaunchSpec) -> Result<HangDetectionResult> {
        self.detect(spec, self.config.timeout, self.config.sample_interval)
            .await
    }

    /// Launch `spec` and sample it until it exits or `timeout` elapses.
    ///
    /// Slow and non-terminating targets are reported through the verdict;
    /// only launch and connection failures return an error. The launched
    /// process is killed before this returns.
    pub async fn detect(
        &self,
        spec: &LaunchSpec,
        timeout: Duration,
        sample_interval: Duration,
    ) -> Result<HangDetectionResult> {
        let started = Instant::now();
        info!(
            "Hang detection for {} (timeout {:?}, interval {:?})",
            spec.program, timeout, sample_interval
        );

        let launched = self.launcher.launch(spec).await?;
        let mut process = launched.process;

        let outcome = self
            .observe(&launched.endpoint, started, timeout, sample_interval)
            .await;

        if let Some(process) = process.as_mut() {
            if let Err(e) = process.kill().await {
                warn!("Failed to kill hang detection target: {}", e);
            }
        }

        let result = outcome?;
        info!(
            "Hang detection for {} finished: {:?} after {} samples in {}ms",
            spec.program, result.verdict, result.sample_count, result.elapsed_ms
        );
        Ok(result)
    }

    async fn observe(
        &self,
        endpoint: &str,
        started: Instant,
        timeout: Duration,
        sample_interval: Duration,
    ) -> Result<HangDetectionResult> {
        let client = InspectorClient::connect(endpoint, self.config.transport.clone()).await?;
        let mut sampler = Sampler {
            events: client.subscribe(),
            client: &client,
            pause_timeout: self.config.pause_timeout,
            tracker: StabilityTracker::new(),
            last: None,
            started,
        };

        let result = sampler
            .run(
                timeout,
                sample_interval.max(Duration::from_millis(1)),
                self.config.min_consecutive_samples.max(1),
            )
            .await;
        client.close().await;
        result
    }
}

enum Observation {
    Sample(PausedEvent),
    Finished,
    Missed,
}

struct Sampler<'a> {
    client: &'a InspectorClient,
    events: mpsc::UnboundedReceiver<InspectorEvent>,
    pause_timeout: Duration,
    tracker: StabilityTracker,
    last: Option<StackSample>,
    started: Instant,
}

impl Sampler<'_> {
    async fn run(
        &mut self,
        timeout: Duration,
        sample_interval: Duration,
        min_run: usize,
    ) -> Result<HangDetectionResult> {
        self.client.enable().await?;
        self.client.run_if_waiting_for_debugger().await?;

        let deadline = self.started + timeout;
        loop {
            let next = (Instant::now() + sample_interval).min(deadline);
            if self.idle_until(next).await {
                return Ok(self.finish(HangVerdict::Completed));
            }
            if Instant::now() >= deadline {
                break;
            }

            match self.sample().await {
                Observation::Finished => return Ok(self.finish(HangVerdict::Completed)),
                Observation::Missed => debug!("Forced pause did not land; skipping sample"),
                Observation::Sample(paused) => {
                    self.record(paused);
                    if let Err(e) = self.client.resume().await {
                        if e.is_connection_loss() {
                            return Ok(self.finish(HangVerdict::Completed));
                        }
                        warn!("Failed to resume after sample: {}", e);
                    }
                }
            }
        }

        let verdict = if self.tracker.is_stable(min_run) {
            HangVerdict::Hung
        } else {
            HangVerdict::TimedOut
        };
        Ok(self.finish(verdict))
    }

    /// Let the target run until `when`; returns true if it finished meanwhile.
    async fn idle_until(&mut self, when: Instant) -> bool {
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(when) => return false,
                event = self.events.recv() => match event {
                    None
                    | Some(InspectorEvent::Disconnected)
                    | Some(InspectorEvent::ExecutionFinished) => return true,
                    Some(InspectorEvent::Paused(paused)) => {
                        debug!("Resuming unsolicited pause ({})", paused.reason);
                        if let Err(e) = self.client.resume().await {
                            if e.is_connection_loss() {
                                return true;
                            }
                            warn!("Failed to resume target: {}", e);
                        }
                    }
                    Some(_) => {}
                },
            }
        }
    }

    async fn sample(&mut self) -> Observation {
        if let Err(e) = self.client.pause().await {
            if e.is_connection_loss() {
                return Observation::Finished;
            }
            warn!("Forced pause failed: {}", e);
            return Observation::Missed;
        }

        let deadline = Instant::now() + self.pause_timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Err(_) => return Observation::Missed,
                Ok(None)
                | Ok(Some(InspectorEvent::Disconnected))
                | Ok(Some(InspectorEvent::ExecutionFinished)) => return Observation::Finished,
                Ok(Some(InspectorEvent::Paused(paused))) => return Observation::Sample(paused),
                Ok(Some(_)) => {}
            }
        }
    }

    fn record(&mut self, paused: PausedEvent) {
        let location = paused.top_location().cloned();
        let run = self.tracker.record(location.as_ref());
        let sample = StackSample {
            location,
            call_stack: paused.call_frames,
            elapsed: self.started.elapsed(),
        };
        debug!(
            "Sample {} at {:?} after {:?} (run {})",
            self.tracker.sample_count(),
            sample.location,
            sample.elapsed,
            run
        );
        self.last = Some(sample);
    }

    fn finish(&mut self, verdict: HangVerdict) -> HangDetectionResult {
        let (location, call_stack) = self
            .last
            .take()
            .map(|sample| (sample.location, sample.call_stack))
            .unwrap_or_default();

        HangDetectionResult {
            verdict,
            location,
            call_stack,
            sample_count: self.tracker.sample_count(),
            longest_stable_run: self.tracker.longest_run(),
            elapsed_ms: millis(self.started.elapsed()),
        }
    }
}
