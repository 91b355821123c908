use crate::gesture::InteractionState;
use serde::Serialize;

const GOLDEN_ANGLE: f32 = 2.399_963_2;
const TREE_HEIGHT: f32 = 8.0;
const TREE_BASE_RADIUS: f32 = 3.0;
const CHAOS_RADIUS: f32 = 12.0;

/// Resting spot on the formed tree and scattered spot for chaos. Renderers
/// blend between the two; the poll controller never reads this table.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PositionData {
    pub chaos: [f32; 3],
    pub target: [f32; 3],
}

impl PositionData {
    /// `t = 0` is the target position, `t = 1` the chaos position.
    pub fn blend(&self, t: f32) -> [f32; 3] {
        let t = t.clamp(0.0, 1.0);
        let mut out = [0.0; 3];
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.target[i] * (1.0 - t) + self.chaos[i] * t;
        }
        out
    }
}

/// Blend weight a renderer should ease towards for `state`.
pub fn chaos_weight(state: InteractionState) -> f32 {
    match state {
        InteractionState::Formed => 0.0,
        InteractionState::Chaos => 1.0,
    }
}

/// Deterministic layout for `count` objects: a cone spiral for the formed
/// tree and a sphere shell for chaos.
pub fn layout(count: usize) -> Vec<PositionData> {
    (0..count)
        .map(|i| {
            let frac = if count > 1 {
                i as f32 / (count - 1) as f32
            } else {
                0.0
            };
            let angle = i as f32 * GOLDEN_ANGLE;

            let radius = TREE_BASE_RADIUS * (1.0 - frac);
            let target = [
                radius * angle.cos(),
                frac * TREE_HEIGHT - TREE_HEIGHT / 2.0,
                radius * angle.sin(),
            ];

            // Fibonacci sphere
            let z = 1.0 - 2.0 * (i as f32 + 0.5) / count as f32;
            let ring = (1.0 - z * z).max(0.0).sqrt();
            let chaos = [
                CHAOS_RADIUS * ring * angle.cos(),
                CHAOS_RADIUS * z,
                CHAOS_RADIUS * ring * angle.sin(),
            ];

            PositionData { chaos, target }
        })
        .collect()
}
