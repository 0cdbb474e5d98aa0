//! Notifications emitted by an animator.
//!
//! The UI layer (image display, navigator strip, play button, loop toggle,
//! status line) subscribes to these on the [`EventBus`](super::event_bus::EventBus).
//! Every event carries the id of the animator that sent it.

use uuid::Uuid;

use crate::entities::{LoopMode, PlayMode};
use super::loader::LoadMode;

/// Identifies one animator instance
pub type AnimatorId = Uuid;

/// Current frame moved: draw `url` and highlight `frame` in the navigator.
#[derive(Clone, Debug)]
pub struct FrameChangedEvent {
    pub animator: AnimatorId,
    pub frame: usize,
    pub url: String,
}

/// Play/stop state changed.
#[derive(Clone, Debug)]
pub struct PlayStateChangedEvent {
    pub animator: AnimatorId,
    pub mode: PlayMode,
}

#[derive(Clone, Debug)]
pub struct LoopModeChangedEvent {
    pub animator: AnimatorId,
    pub mode: LoopMode,
}

/// A frame was enabled or disabled (manually or by a load failure).
#[derive(Clone, Debug)]
pub struct FrameEnabledChangedEvent {
    pub animator: AnimatorId,
    pub frame: usize,
    pub enabled: bool,
}

/// Frame delay changed by speed up/down.
#[derive(Clone, Debug)]
pub struct DelayChangedEvent {
    pub animator: AnimatorId,
    pub delay_ms: u64,
    pub dwell_ms: u64,
}

/// Every frame of a load cycle resolved.
#[derive(Clone, Debug)]
pub struct LoadCompleteEvent {
    pub animator: AnimatorId,
    pub mode: LoadMode,
    pub loaded: usize,
    pub failed: usize,
}

#[derive(Clone, Debug)]
pub struct LoadFailedEvent {
    pub animator: AnimatorId,
    pub frame: usize,
    pub url: String,
    pub error: String,
}

/// Status line text; `None` hides it.
#[derive(Clone, Debug)]
pub struct StatusChangedEvent {
    pub animator: AnimatorId,
    pub message: Option<String>,
}
