use crate::classifier::Classifier;
use crate::frame::{FrameSampler, FrameSource};
use crate::gesture::{HandPosition, InteractionState, SceneHandle};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Delay tiers for rescheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// After a usable classification.
    pub success: Duration,
    /// After the classifier failed or asked us to back off.
    pub backoff: Duration,
    /// After a cycle without a camera frame.
    pub idle: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            success: Duration::from_millis(1500),
            backoff: Duration::from_millis(5000),
            idle: Duration::from_millis(2000),
        }
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Applied,
    Backoff,
    NoFrame,
}

impl CycleOutcome {
    pub fn delay(self, policy: &PollPolicy) -> Duration {
        match self {
            CycleOutcome::Applied => policy.success,
            CycleOutcome::Backoff => policy.backoff,
            CycleOutcome::NoFrame => policy.idle,
        }
    }
}

/// Shared run/stop flag. `stop` also wakes a loop that is waiting out its
/// delay.
#[derive(Default)]
pub struct Liveness {
    live: Mutex<bool>,
    wake: Condvar,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.live.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn start(&self) {
        *self.lock() = true;
    }

    pub fn stop(&self) {
        *self.lock() = false;
        self.wake.notify_all();
    }

    pub fn is_live(&self) -> bool {
        *self.lock()
    }

    /// Runs `f` only if live, holding the flag for the duration so a
    /// concurrent `stop` returns only after `f` has finished.
    pub fn if_live<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let live = self.lock();
        (*live).then(f)
    }

    /// Sleeps for `delay` unless stopped first. Returns whether still live.
    pub fn wait(&self, delay: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, delay, |live| *live)
            .unwrap_or_else(|p| p.into_inner());
        *guard
    }
}

pub struct PollController<S, C> {
    sampler: FrameSampler<S>,
    classifier: C,
    scene: SceneHandle,
    liveness: Arc<Liveness>,
    policy: PollPolicy,
    hand: HandPosition,
    next_delay: Option<Duration>,
}

impl<S: FrameSource, C: Classifier> PollController<S, C> {
    pub fn new(
        sampler: FrameSampler<S>,
        classifier: C,
        scene: SceneHandle,
        liveness: Arc<Liveness>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            sampler,
            classifier,
            hand: scene.hand(),
            scene,
            liveness,
            policy,
            next_delay: None,
        }
    }

    /// Delay chosen by the last completed cycle.
    pub fn next_delay(&self) -> Option<Duration> {
        self.next_delay
    }

    pub fn hand(&self) -> HandPosition {
        self.hand
    }

    /// Runs one cycle. `None` means the controller is stopped and nothing
    /// more may be scheduled.
    pub fn run_cycle(&mut self) -> Option<Duration> {
        if !self.liveness.is_live() {
            return None;
        }
        let liveness = self.liveness.clone();

        let outcome = match self.sampler.capture() {
            None => {
                debug!("no frame available");
                liveness.if_live(|| CycleOutcome::NoFrame)
            }
            Some(frame) => {
                liveness.if_live(|| self.scene.set_status("Analyzing gesture..."))?;
                let result = self.classifier.classify(&frame);
                liveness.if_live(|| match result {
                    Ok(res) if !res.error => {
                        self.apply(res.state, res.hand_position, res.confidence);
                        CycleOutcome::Applied
                    }
                    Ok(_) => {
                        warn!("classifier signalled an error, backing off");
                        self.report_backoff();
                        CycleOutcome::Backoff
                    }
                    Err(e) => {
                        warn!("classification failed, backing off: {e}");
                        self.report_backoff();
                        CycleOutcome::Backoff
                    }
                })
            }
        };
        let Some(outcome) = outcome else {
            debug!("stopped during cycle, dropping result");
            return None;
        };

        let delay = outcome.delay(&self.policy);
        debug!(?outcome, delay_ms = delay.as_millis() as u64, "cycle finished");
        self.next_delay = Some(delay);
        Some(delay)
    }

    fn apply(&mut self, state: InteractionState, raw: HandPosition, confidence: f32) {
        self.hand = raw.mirrored();
        let hand = self.hand;
        debug!(?state, x = hand.x, y = hand.y, confidence, "gesture applied");
        self.scene.update(|s| {
            s.state = state;
            s.hand = hand;
            s.status = match state {
                InteractionState::Chaos => "UNLEASHED!".to_string(),
                InteractionState::Formed => "FORMED".to_string(),
            };
            s.debug = format!("Pos: {:.2}, {:.2}", raw.x, raw.y);
        });
    }

    fn report_backoff(&self) {
        let secs = self.policy.backoff.as_secs_f32();
        self.scene.update(|s| {
            s.status = format!("API limit/error. Retrying in {secs:.0}s...");
            s.debug = "Backing off (rate limit)".to_string();
        });
    }

    /// Drives cycles until stopped.
    pub fn run(mut self) {
        info!("poll loop started");
        while let Some(delay) = self.run_cycle() {
            trace!(delay_ms = delay.as_millis() as u64, "waiting for next cycle");
            if !self.liveness.wait(delay) {
                break;
            }
        }
        info!("poll loop stopped");
    }
}

/// Handle to a running poll loop.
pub struct PollHandle {
    liveness: Arc<Liveness>,
    thread: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Idempotent. A classification already in flight finishes but its
    /// result is discarded.
    pub fn stop(&self) {
        if self.liveness.is_live() {
            info!("stopping poll loop");
        }
        self.liveness.stop();
    }

    pub fn is_live(&self) -> bool {
        self.liveness.is_live()
    }

    pub fn join(mut self) {
        if let Some(t) = self.thread.take() {
            if t.join().is_err() {
                warn!("poll thread panicked");
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.liveness.stop();
    }
}

/// Marks the loop live and starts it on its own thread. The frame source is
/// built on that thread since camera handles may not be `Send`.
pub fn start<F, S, C>(
    make_source: F,
    sample_size: (u32, u32),
    jpeg_quality: u8,
    classifier: C,
    scene: SceneHandle,
    policy: PollPolicy,
) -> PollHandle
where
    F: FnOnce() -> S + Send + 'static,
    S: FrameSource,
    C: Classifier + Send + 'static,
{
    let liveness = Arc::new(Liveness::new());
    liveness.start();
    let loop_liveness = liveness.clone();
    let thread = thread::Builder::new()
        .name("gesture-poll".into())
        .spawn(move || {
            let sampler = FrameSampler::new(make_source(), sample_size.0, sample_size.1, jpeg_quality);
            PollController::new(sampler, classifier, scene, loop_liveness, policy).run();
        });
    let thread = match thread {
        Ok(t) => Some(t),
        Err(e) => {
            warn!("failed to spawn poll thread: {e}");
            liveness.stop();
            None
        }
    };
    PollHandle { liveness, thread }
}
