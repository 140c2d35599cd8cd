use std::collections::HashMap;
use std::time::Duration;

use eframe::egui::Vec2;

use crate::physics::geometry::{is_finite, lerp};

pub fn ease_in_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) * 0.5
    }
}

/// Eased interpolation between two position sets over a fixed duration.
#[derive(Clone, Debug)]
pub struct Tween {
    start: HashMap<String, Vec2>,
    target: HashMap<String, Vec2>,
    duration: Duration,
}

impl Tween {
    /// Ids missing from `start` (or starting at a non-finite point) begin at their target.
    pub fn new(
        start: &HashMap<String, Vec2>,
        target: HashMap<String, Vec2>,
        duration: Duration,
    ) -> Self {
        let start = target
            .iter()
            .map(|(id, goal)| {
                let from = start
                    .get(id)
                    .copied()
                    .filter(|from| is_finite(*from))
                    .unwrap_or(*goal);
                (id.clone(), from)
            })
            .collect();
        Self {
            start,
            target,
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn target(&self) -> &HashMap<String, Vec2> {
        &self.target
    }

    /// Linear progress in `0..=1` after `elapsed`.
    pub fn progress(&self, elapsed: Duration) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn sample(&self, elapsed: Duration) -> HashMap<String, Vec2> {
        let progress = self.progress(elapsed);
        if progress >= 1.0 {
            return self.target.clone();
        }
        let eased = ease_in_out_cubic(progress);
        self.target
            .iter()
            .map(|(id, goal)| {
                let from = self.start.get(id).copied().unwrap_or(*goal);
                (id.clone(), lerp(from, *goal, eased))
            })
            .collect()
    }

    /// Frames at a fixed interval. Each call starts over from the beginning.
    pub fn frames(&self, interval: Duration) -> TweenFrames<'_> {
        TweenFrames {
            tween: self,
            interval: interval.max(Duration::from_millis(1)),
            elapsed: Duration::ZERO,
            done: false,
        }
    }
}

/// Lazy, finite sequence of tween frames. The last one is exactly the target.
pub struct TweenFrames<'a> {
    tween: &'a Tween,
    interval: Duration,
    elapsed: Duration,
    done: bool,
}

impl Iterator for TweenFrames<'_> {
    type Item = AnimationFrame;

    fn next(&mut self) -> Option<AnimationFrame> {
        if self.done {
            return None;
        }
        self.elapsed = (self.elapsed + self.interval).min(self.tween.duration);
        let progress = self.tween.progress(self.elapsed);
        self.done = progress >= 1.0;
        Some(AnimationFrame {
            positions: self.tween.sample(self.elapsed),
            progress,
            finished: self.done,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationFrame {
    pub positions: HashMap<String, Vec2>,
    pub progress: f32,
    pub finished: bool,
}

struct Running {
    tween: Tween,
    elapsed: Duration,
}

/// Drives one tween at a time from an external clock and remembers what was
/// last rendered, so a new request always starts from the visible state.
pub struct LayoutAnimator {
    duration: Duration,
    rendered: HashMap<String, Vec2>,
    running: Option<Running>,
}

impl LayoutAnimator {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            rendered: HashMap::new(),
            running: None,
        }
    }

    pub fn is_animating(&self) -> bool {
        self.running.is_some()
    }

    pub fn rendered(&self) -> &HashMap<String, Vec2> {
        &self.rendered
    }

    /// Records positions drawn by someone else, e.g. the force simulation.
    pub fn set_rendered(&mut self, positions: impl IntoIterator<Item = (String, Vec2)>) {
        for (id, position) in positions {
            if is_finite(position) {
                self.rendered.insert(id, position);
            }
        }
    }

    pub fn forget(&mut self, id: &str) {
        self.rendered.remove(id);
    }

    /// Replaces any in-flight animation with one heading to `target`.
    pub fn animate_to(&mut self, target: HashMap<String, Vec2>) {
        let tween = Tween::new(&self.rendered, target, self.duration);
        self.running = Some(Running {
            tween,
            elapsed: Duration::ZERO,
        });
    }

    /// Drops the in-flight animation; no further frames are produced for it.
    pub fn cancel(&mut self) {
        self.running = None;
    }

    /// Advances the animation by `dt`. Returns `None` when idle.
    pub fn advance(&mut self, dt: Duration) -> Option<AnimationFrame> {
        let running = self.running.as_mut()?;
        running.elapsed = (running.elapsed + dt).min(running.tween.duration());
        let progress = running.tween.progress(running.elapsed);
        let positions = running.tween.sample(running.elapsed);
        let finished = progress >= 1.0;

        self.rendered
            .extend(positions.iter().map(|(id, position)| (id.clone(), *position)));
        if finished {
            self.running = None;
        }
        Some(AnimationFrame {
            positions,
            progress,
            finished,
        })
    }
}
