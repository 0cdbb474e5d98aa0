//! Shared animator state: frames, playhead, modes and timing.
//!
//! **Architecture**: the state is plain data. The playback engine
//! ([`Player`](crate::core::player::Player)) and the image loader
//! ([`ImageLoader`](crate::core::loader::ImageLoader)) both receive
//! `&mut AnimatorState` when they act; neither owns it.
//!
//! Disabled-frame lookups are bounded scans over the frame range, so they
//! terminate even when every frame is disabled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::frame::Frame;

/// Boundary policy while playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Stop at the boundary
    None,
    /// Wrap to the opposite end
    #[default]
    Loop,
    /// Reverse direction (back-and-forth)
    Sweep,
}

impl LoopMode {
    /// Next mode of the UI toggle: None -> Loop -> Sweep -> None
    pub fn cycled(self) -> Self {
        match self {
            LoopMode::None => LoopMode::Loop,
            LoopMode::Loop => LoopMode::Sweep,
            LoopMode::Sweep => LoopMode::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::None => "none",
            LoopMode::Loop => "loop",
            LoopMode::Sweep => "sweep",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(LoopMode::None),
            "loop" => Ok(LoopMode::Loop),
            "sweep" => Ok(LoopMode::Sweep),
            other => Err(format!("unknown loop mode '{}' (expected none, loop or sweep)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayMode {
    #[default]
    Stopped,
    Playing,
}

/// How `set_frame_enabled` changes a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameToggle {
    Enable,
    Disable,
    #[default]
    Toggle,
}

/// Delay limits, all in milliseconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub delay_step: u64,
    pub delay_min: u64,
    pub delay_max: u64,
    pub dwell_multiplier: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            delay_step: 50,
            delay_min: 25,
            delay_max: 5000,
            dwell_multiplier: 2.0,
        }
    }
}

/// Navigation that could not move anywhere
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackError {
    NoFrames,
    NoEnabledFrames,
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackError::NoFrames => write!(f, "animator has no frames"),
            PlaybackError::NoEnabledFrames => write!(f, "every frame is disabled"),
        }
    }
}

impl std::error::Error for PlaybackError {}

/// Per-animator playback state
#[derive(Debug, Clone)]
pub struct AnimatorState {
    pub frames: Vec<Frame>,
    pub current_frame: usize,
    pub disabled_frames: BTreeSet<usize>,
    pub direction: Direction,
    pub play_mode: PlayMode,
    pub loop_mode: LoopMode,
    pub timing: Timing,
    delay: u64,
    dwell: u64,
}

impl AnimatorState {
    /// Empty state; `delay` is clamped into the timing limits.
    pub fn new(timing: Timing, delay: u64, loop_mode: LoopMode) -> Self {
        let mut state = Self {
            frames: Vec::new(),
            current_frame: 0,
            disabled_frames: BTreeSet::new(),
            direction: Direction::Forward,
            play_mode: PlayMode::Stopped,
            loop_mode,
            timing,
            delay: 0,
            dwell: 0,
        };
        state.set_delay(delay);
        state
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn first_frame(&self) -> usize {
        0
    }

    pub fn last_frame(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    pub fn is_playing(&self) -> bool {
        self.play_mode == PlayMode::Playing
    }

    pub fn current(&self) -> Option<&Frame> {
        self.frames.get(self.current_frame)
    }

    pub fn url(&self, frame: usize) -> Option<&str> {
        self.frames.get(frame).map(|f| f.source_url.as_str())
    }

    /// Replace frames; playhead and disabled set are clipped to the new range.
    pub fn set_frames(&mut self, frames: Vec<Frame>) {
        self.frames = frames;
        let len = self.frames.len();
        self.disabled_frames.retain(|&f| f < len);
        self.current_frame = self.current_frame.min(self.last_frame());
    }

    // === Disabled frames ===

    pub fn is_disabled(&self, frame: usize) -> bool {
        self.disabled_frames.contains(&frame)
    }

    pub fn has_enabled_frames(&self) -> bool {
        self.disabled_frames.len() < self.frames.len()
    }

    /// First enabled frame strictly after `frame`
    pub fn enabled_after(&self, frame: usize) -> Option<usize> {
        (frame.saturating_add(1)..self.frames.len()).find(|f| !self.is_disabled(*f))
    }

    /// Last enabled frame strictly before `frame`
    pub fn enabled_before(&self, frame: usize) -> Option<usize> {
        (0..frame.min(self.frames.len())).rev().find(|f| !self.is_disabled(*f))
    }

    pub fn first_enabled(&self) -> Option<usize> {
        (0..self.frames.len()).find(|f| !self.is_disabled(*f))
    }

    pub fn last_enabled(&self) -> Option<usize> {
        (0..self.frames.len()).rev().find(|f| !self.is_disabled(*f))
    }

    // === Timing ===

    pub fn delay(&self) -> u64 {
        self.delay
    }

    pub fn dwell(&self) -> u64 {
        self.dwell
    }

    /// Set delay (clamped to limits) and recompute dwell. Returns the applied delay.
    pub fn set_delay(&mut self, delay: u64) -> u64 {
        self.delay = delay.clamp(self.timing.delay_min, self.timing.delay_max);
        self.recalculate_dwell();
        self.delay
    }

    /// dwell = clamp(delay * dwell_multiplier, delay_min, delay_max)
    pub fn recalculate_dwell(&mut self) {
        let raw = (self.delay as f64 * self.timing.dwell_multiplier).round();
        let raw = if raw.is_finite() && raw > 0.0 { raw as u64 } else { 0 };
        self.dwell = raw.clamp(self.timing.delay_min, self.timing.delay_max);
    }

    /// Wait before the next animation step: dwell on the boundary frames
    /// during forward playback, delay otherwise.
    pub fn step_delay(&self) -> u64 {
        let at_boundary =
            self.current_frame == self.first_frame() || self.current_frame == self.last_frame();
        if self.direction == Direction::Forward && at_boundary {
            self.dwell
        } else {
            self.delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(n: usize) -> AnimatorState {
        let mut state = AnimatorState::new(Timing::default(), 250, LoopMode::Loop);
        state.set_frames((0..n).map(|i| Frame::placeholder(i, format!("{i}.png"))).collect());
        state
    }

    #[test]
    fn test_loop_mode_cycle_and_parse() {
        assert_eq!(LoopMode::None.cycled(), LoopMode::Loop);
        assert_eq!(LoopMode::Loop.cycled(), LoopMode::Sweep);
        assert_eq!(LoopMode::Sweep.cycled(), LoopMode::None);
        assert_eq!("Sweep".parse::<LoopMode>(), Ok(LoopMode::Sweep));
        assert!("bounce".parse::<LoopMode>().is_err());
    }

    #[test]
    fn test_enabled_scans() {
        let mut state = state_with(5);
        state.disabled_frames.extend([0, 2, 4]);

        assert_eq!(state.enabled_after(1), Some(3));
        assert_eq!(state.enabled_after(3), None);
        assert_eq!(state.enabled_before(3), Some(1));
        assert_eq!(state.enabled_before(1), None);
        assert_eq!(state.first_enabled(), Some(1));
        assert_eq!(state.last_enabled(), Some(3));
    }

    #[test]
    fn test_scans_terminate_when_all_disabled() {
        let mut state = state_with(3);
        state.disabled_frames.extend([0, 1, 2]);

        assert!(!state.has_enabled_frames());
        assert_eq!(state.enabled_after(0), None);
        assert_eq!(state.enabled_before(2), None);
        assert_eq!(state.first_enabled(), None);
    }

    #[test]
    fn test_delay_clamp_and_dwell() {
        let mut state = state_with(3);
        assert_eq!(state.delay(), 250);
        assert_eq!(state.dwell(), 500);

        assert_eq!(state.set_delay(1), 25);
        assert_eq!(state.dwell(), 50);

        assert_eq!(state.set_delay(9000), 5000);
        // 5000 * 2 clamped to delay_max
        assert_eq!(state.dwell(), 5000);
    }

    #[test]
    fn test_dwell_clamped_to_min() {
        let timing = Timing { dwell_multiplier: 0.5, ..Timing::default() };
        let state = AnimatorState::new(timing, 30, LoopMode::Loop);
        assert_eq!(state.dwell(), 25);
    }

    #[test]
    fn test_step_delay_uses_dwell_on_boundaries() {
        let mut state = state_with(4);
        assert_eq!(state.step_delay(), 500);

        state.current_frame = 2;
        assert_eq!(state.step_delay(), 250);

        state.current_frame = 3;
        assert_eq!(state.step_delay(), 500);

        state.direction = Direction::Reverse;
        assert_eq!(state.step_delay(), 250);
    }

    #[test]
    fn test_set_frames_clips_playhead_and_disabled() {
        let mut state = state_with(6);
        state.current_frame = 5;
        state.disabled_frames.extend([1, 4, 5]);

        state.set_frames((0..3).map(|i| Frame::placeholder(i, "x")).collect());
        assert_eq!(state.current_frame, 2);
        assert_eq!(state.disabled_frames.iter().copied().collect::<Vec<_>>(), vec![1]);
    }
}
