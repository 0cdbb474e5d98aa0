//! FLIPBOOK - image sequence animator library
//!
//! Plays an ordered list of images as an animation: navigation, loop modes,
//! speed control, per-frame enable/disable, asynchronous loading with
//! failure handling and auto-refresh.

// Core engine (events, timers, player, loader, workers)
pub mod core;

// Data types
pub mod entities;

// Animator facade and its inputs
pub mod animator;
pub mod cli;
pub mod config;
pub mod keyboard;

// Re-export commonly used types
pub use animator::{Animator, Command};
pub use config::{AnimatorConfig, DefaultFrame, FrameAnchor};
pub use core::event_bus::{BoxedEvent, EventBus, downcast_event};
pub use core::player::Player;
pub use entities::{AnimatorState, Frame, LoopMode, PlayMode, PlaybackError};
pub use keyboard::{KeyEvent, KeyboardRouter};
