use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Which of the two scene configurations the hand currently asks for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum InteractionState {
    #[default]
    Formed,
    Chaos,
}

/// Normalized hand offset, both axes in `[-1, 1]`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct HandPosition {
    #[serde(deserialize_with = "unit_coord")]
    pub x: f32,
    #[serde(deserialize_with = "unit_coord")]
    pub y: f32,
}

impl HandPosition {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    /// The camera image is mirrored, so the horizontal axis flips.
    pub fn mirrored(self) -> Self {
        Self::new(-self.x, self.y)
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-1.0, 1.0)
    }
}

fn unit_coord<'de, D: serde::Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
    f32::deserialize(d).map(clamp_unit)
}

fn unit_confidence<'de, D: serde::Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
    f32::deserialize(d).map(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) })
}

/// Response of the remote gesture classifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", try_from = "WireResult")]
pub struct ClassificationResult {
    pub state: InteractionState,
    pub hand_position: HandPosition,
    pub confidence: f32,
    pub error: bool,
}

/// Body as sent by the service. Only an `error` body may leave out the
/// gesture fields.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    state: Option<InteractionState>,
    hand_position: Option<HandPosition>,
    #[serde(default, deserialize_with = "unit_confidence")]
    confidence: f32,
    #[serde(default)]
    error: bool,
}

impl TryFrom<WireResult> for ClassificationResult {
    type Error = String;

    fn try_from(wire: WireResult) -> Result<Self, Self::Error> {
        if wire.error {
            return Ok(Self {
                error: true,
                confidence: wire.confidence,
                ..Self::failed()
            });
        }
        let state = wire.state.ok_or("missing field `state`")?;
        let hand_position = wire
            .hand_position
            .ok_or("missing field `handPosition`")?;
        Ok(Self {
            state,
            hand_position,
            confidence: wire.confidence,
            error: false,
        })
    }
}

impl ClassificationResult {
    /// A result that only carries the back-off signal.
    pub fn failed() -> Self {
        Self {
            state: InteractionState::Formed,
            hand_position: HandPosition::default(),
            confidence: 0.0,
            error: true,
        }
    }
}

/// Everything a renderer needs to draw one update.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SceneSnapshot {
    pub state: InteractionState,
    pub hand: HandPosition,
    pub status: String,
    pub debug: String,
    pub version: u64,
}

impl Default for SceneSnapshot {
    fn default() -> Self {
        Self {
            state: InteractionState::Formed,
            hand: HandPosition::default(),
            status: "Initializing camera...".to_string(),
            debug: String::new(),
            version: 0,
        }
    }
}

struct SceneInner {
    snapshot: Mutex<SceneSnapshot>,
    changed: Condvar,
}

/// Shared render-facing state. The poll controller writes, any number of
/// clones read.
#[derive(Clone)]
pub struct SceneHandle {
    inner: Arc<SceneInner>,
}

impl Default for SceneHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SceneInner {
                snapshot: Mutex::new(SceneSnapshot::default()),
                changed: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SceneSnapshot> {
        self.inner
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        self.lock().clone()
    }

    pub fn state(&self) -> InteractionState {
        self.lock().state
    }

    pub fn hand(&self) -> HandPosition {
        self.lock().hand
    }

    /// Applies `f` and publishes the result as a new version.
    pub(crate) fn update(&self, f: impl FnOnce(&mut SceneSnapshot)) {
        let mut snap = self.lock();
        f(&mut snap);
        snap.version += 1;
        drop(snap);
        self.inner.changed.notify_all();
    }

    pub(crate) fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.update(|s| s.status = status);
    }

    /// Blocks until a version newer than `seen` is published or `timeout`
    /// passes.
    pub fn wait_for_update(&self, seen: u64, timeout: Duration) -> Option<SceneSnapshot> {
        let guard = self.lock();
        let (guard, _) = self
            .inner
            .changed
            .wait_timeout_while(guard, timeout, |s| s.version <= seen)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (guard.version > seen).then(|| guard.clone())
    }
}
