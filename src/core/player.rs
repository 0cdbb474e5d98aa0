//! Playback engine: navigation, play/stop and the timer-driven animation loop.
//!
//! **Architecture**: Player does NOT own [`AnimatorState`]. It receives
//! `&mut AnimatorState` when an operation needs it, the same way the image
//! loader does, so both act on one state object without sharing ownership.
//!
//! # Boundary policy
//!
//! Stepping past the last (or before the first) enabled frame:
//!
//! | play mode | loop mode | result                                     |
//! |-----------|-----------|--------------------------------------------|
//! | Playing   | Loop      | wrap to the opposite end                   |
//! | Playing   | Sweep     | flip direction, step back the other way    |
//! | Playing   | None      | stop                                       |
//! | Stopped   | any       | wrap (manual stepping always wraps)        |
//!
//! # Animation loop
//!
//! `play()` arms a one-shot [`Timer`]. When the owner's update loop sees it
//! fire, `animate()` takes one step and re-arms it while still playing.
//! `stop()` cancels it. Forward playback dwells longer on the first and last
//! frames.
//!
//! All disabled-frame skipping is a bounded scan; with no enabled frame every
//! step returns [`PlaybackError::NoEnabledFrames`] and playback stops.

use log::{debug, trace, warn};
use std::time::{Duration, Instant};

use crate::core::event_bus::AnimatorEmitter;
use crate::core::events::{
    DelayChangedEvent, FrameChangedEvent, FrameEnabledChangedEvent, LoopModeChangedEvent,
    PlayStateChangedEvent,
};
use crate::core::timer::Timer;
use crate::entities::{AnimatorState, Direction, FrameToggle, LoopMode, PlayMode, PlaybackError};

/// Playback state manager (does NOT own the state)
#[derive(Debug)]
pub struct Player {
    emitter: AnimatorEmitter,
    animation: Timer,
}

impl Player {
    pub fn new(emitter: AnimatorEmitter) -> Self {
        Self {
            emitter,
            animation: Timer::new(),
        }
    }

    /// Pending animation step, if playing
    pub fn next_deadline(&self) -> Option<Instant> {
        self.animation.deadline()
    }

    // === Navigation ===

    /// Jump to `frame`, clamped to the frame range.
    ///
    /// Returns the frame landed on, or None when there are no frames.
    pub fn goto(&self, state: &mut AnimatorState, frame: i64) -> Option<usize> {
        if state.is_empty() {
            return None;
        }
        let last = state.last_frame() as i64;
        let clamped = frame.clamp(state.first_frame() as i64, last) as usize;
        if clamped as i64 != frame {
            trace!("goto {} clamped to {}", frame, clamped);
        }

        state.current_frame = clamped;
        let url = state.url(clamped).unwrap_or_default().to_string();
        trace!("Frame -> {} ({})", clamped, url);
        self.emitter.emit(FrameChangedEvent {
            animator: self.emitter.animator(),
            frame: clamped,
            url,
        });
        Some(clamped)
    }

    /// Go to the first enabled frame (the first frame if none is enabled)
    pub fn first(&self, state: &mut AnimatorState) -> Option<usize> {
        let target = state.first_enabled().unwrap_or(state.first_frame());
        self.goto(state, target as i64)
    }

    /// Go to the last enabled frame (the last frame if none is enabled)
    pub fn last(&self, state: &mut AnimatorState) -> Option<usize> {
        let target = state.last_enabled().unwrap_or(state.last_frame());
        self.goto(state, target as i64)
    }

    /// Step to the next enabled frame, applying the boundary policy.
    pub fn next(&mut self, state: &mut AnimatorState) -> Result<usize, PlaybackError> {
        self.ensure_navigable(state)?;

        if let Some(frame) = state.enabled_after(state.current_frame) {
            return Ok(self.goto_index(state, frame));
        }

        if !state.is_playing() {
            // Always wrap when stepping manually
            return Ok(self.first(state).unwrap_or(state.current_frame));
        }

        match state.loop_mode {
            LoopMode::Loop => Ok(self.first(state).unwrap_or(state.current_frame)),
            LoopMode::Sweep => {
                state.direction = Direction::Reverse;
                trace!("Sweep: reversing at frame {}", state.current_frame);
                match state.enabled_before(state.current_frame) {
                    Some(frame) => Ok(self.goto_index(state, frame)),
                    // Only enabled frame is the current one
                    None => Ok(state.current_frame),
                }
            }
            LoopMode::None => {
                self.stop(state);
                Ok(state.current_frame)
            }
        }
    }

    /// Step to the previous enabled frame, applying the boundary policy.
    pub fn previous(&mut self, state: &mut AnimatorState) -> Result<usize, PlaybackError> {
        self.ensure_navigable(state)?;

        if let Some(frame) = state.enabled_before(state.current_frame) {
            return Ok(self.goto_index(state, frame));
        }

        if !state.is_playing() {
            return Ok(self.last(state).unwrap_or(state.current_frame));
        }

        match state.loop_mode {
            LoopMode::Loop => Ok(self.last(state).unwrap_or(state.current_frame)),
            LoopMode::Sweep => {
                state.direction = Direction::Forward;
                trace!("Sweep: forward again at frame {}", state.current_frame);
                match state.enabled_after(state.current_frame) {
                    Some(frame) => Ok(self.goto_index(state, frame)),
                    None => Ok(state.current_frame),
                }
            }
            LoopMode::None => {
                self.stop(state);
                Ok(state.current_frame)
            }
        }
    }

    fn goto_index(&self, state: &mut AnimatorState, frame: usize) -> usize {
        self.goto(state, frame as i64).unwrap_or(frame)
    }

    /// Refuse to move when nothing is navigable; an empty or fully disabled
    /// sequence stops playback instead of spinning.
    fn ensure_navigable(&mut self, state: &mut AnimatorState) -> Result<(), PlaybackError> {
        let err = if state.is_empty() {
            PlaybackError::NoFrames
        } else if !state.has_enabled_frames() {
            PlaybackError::NoEnabledFrames
        } else {
            return Ok(());
        };

        if state.is_playing() {
            warn!("Stopping playback: {}", err);
            self.stop(state);
        } else {
            debug!("Navigation ignored: {}", err);
        }
        Err(err)
    }

    // === Play / stop ===

    /// Start (or keep) playing and arm the next animation step.
    pub fn play(&mut self, state: &mut AnimatorState, now: Instant) {
        let was = state.play_mode;
        state.play_mode = PlayMode::Playing;

        let delay = state.step_delay();
        self.animation.schedule(now, Duration::from_millis(delay));
        trace!("Next step in {}ms", delay);

        if was != PlayMode::Playing {
            debug!("Playback started (delay {}ms, dwell {}ms)", state.delay(), state.dwell());
            self.emit_play_state(state);
        }
    }

    /// Stop playback and cancel the pending step.
    pub fn stop(&mut self, state: &mut AnimatorState) {
        self.animation.cancel();
        if state.play_mode != PlayMode::Stopped {
            state.play_mode = PlayMode::Stopped;
            debug!("Playback stopped at frame {}", state.current_frame);
            self.emit_play_state(state);
        }
    }

    pub fn play_or_stop(&mut self, state: &mut AnimatorState, now: Instant) {
        match state.play_mode {
            PlayMode::Playing => self.stop(state),
            PlayMode::Stopped => self.play(state, now),
        }
    }

    /// One animation step in the current direction, re-armed while playing.
    pub fn animate(&mut self, state: &mut AnimatorState, now: Instant) {
        let step = match state.direction {
            Direction::Forward => self.next(state),
            Direction::Reverse => self.previous(state),
        };
        if let Err(e) = step {
            trace!("Animation step skipped: {}", e);
        }

        if state.is_playing() {
            self.play(state, now);
        }
    }

    /// Fire the animation step if its timer is due.
    /// Returns true if a step ran.
    pub fn tick(&mut self, state: &mut AnimatorState, now: Instant) -> bool {
        if !self.animation.fire(now) {
            return false;
        }
        if !state.is_playing() {
            return false;
        }
        self.animate(state, now);
        true
    }

    // === Modes ===

    /// Set loop mode, or cycle None -> Loop -> Sweep -> None when `mode` is None.
    ///
    /// Entering `LoopMode::None` resets direction to forward so a sweep
    /// cannot leave playback stuck in reverse.
    pub fn set_loop_mode(&self, state: &mut AnimatorState, mode: Option<LoopMode>) -> LoopMode {
        let new_mode = mode.unwrap_or_else(|| state.loop_mode.cycled());
        if new_mode == LoopMode::None {
            state.direction = Direction::Forward;
        }

        if new_mode != state.loop_mode {
            debug!("Loop mode: {} -> {}", state.loop_mode, new_mode);
            state.loop_mode = new_mode;
            self.emitter.emit(LoopModeChangedEvent {
                animator: self.emitter.animator(),
                mode: new_mode,
            });
        }
        new_mode
    }

    /// Shorten the delay by one step (clamped to delay_min).
    pub fn speed_up(&mut self, state: &mut AnimatorState, now: Instant) -> u64 {
        let target = state.delay().saturating_sub(state.timing.delay_step);
        self.apply_delay(state, target, now)
    }

    /// Lengthen the delay by one step (clamped to delay_max).
    pub fn speed_down(&mut self, state: &mut AnimatorState, now: Instant) -> u64 {
        let target = state.delay().saturating_add(state.timing.delay_step);
        self.apply_delay(state, target, now)
    }

    fn apply_delay(&mut self, state: &mut AnimatorState, target: u64, now: Instant) -> u64 {
        let before = state.delay();
        let delay = state.set_delay(target);
        debug!("Delay {}ms -> {}ms (dwell {}ms)", before, delay, state.dwell());

        self.emitter.emit(DelayChangedEvent {
            animator: self.emitter.animator(),
            delay_ms: delay,
            dwell_ms: state.dwell(),
        });

        if state.is_playing() {
            // Restart so the new delay applies to the pending step
            self.stop(state);
            self.play(state, now);
        }
        delay
    }

    /// Enable, disable or toggle one frame.
    /// Returns true if the disabled set changed.
    pub fn set_frame_enabled(&self, state: &mut AnimatorState, frame: usize, toggle: FrameToggle) -> bool {
        if frame >= state.len() {
            warn!("set_frame_enabled: frame {} out of range (0..{})", frame, state.len());
            return false;
        }

        let disable = match toggle {
            FrameToggle::Enable => false,
            FrameToggle::Disable => true,
            FrameToggle::Toggle => !state.is_disabled(frame),
        };

        let changed = if disable {
            state.disabled_frames.insert(frame)
        } else {
            state.disabled_frames.remove(&frame)
        };

        if changed {
            debug!(
                "{} frame {} (disabled: {:?})",
                if disable { "Disabled" } else { "Enabled" },
                frame,
                state.disabled_frames
            );
            self.emitter.emit(FrameEnabledChangedEvent {
                animator: self.emitter.animator(),
                frame,
                enabled: !disable,
            });
        }
        changed
    }

    fn emit_play_state(&self, state: &AnimatorState) {
        self.emitter.emit(PlayStateChangedEvent {
            animator: self.emitter.animator(),
            mode: state.play_mode,
        });
    }
}
