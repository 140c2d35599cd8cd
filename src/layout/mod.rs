mod animator;
mod tree;

use serde::{Deserialize, Serialize};

pub use animator::{AnimationFrame, LayoutAnimator, Tween, TweenFrames, ease_in_out_cubic};
pub use tree::layered_layout;

/// Direction in which tree levels grow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Root on top, levels grow downwards.
    #[default]
    Vertical,
    /// Root on the left, levels grow to the right.
    Horizontal,
}

impl Orientation {
    pub fn label(self) -> &'static str {
        match self {
            Self::Vertical => "Vertical",
            Self::Horizontal => "Horizontal",
        }
    }
}
