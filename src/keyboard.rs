//! Keyboard shortcuts and routing of key presses to animators.
//!
//! Bindings:
//! - Enter / Space: play or stop
//! - Left: previous frame (Shift: first frame)
//! - Right: next frame (Shift: last frame)
//!
//! Keys typed into a text input never reach an animator.

use log::trace;
use std::collections::HashMap;

use crate::animator::{Animator, Command};
use crate::core::events::AnimatorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Enter,
    Space,
    ArrowLeft,
    ArrowRight,
    Other,
}

/// Where keyboard focus was when the key was pressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FocusTarget {
    #[default]
    Document,
    TextInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub shift: bool,
    pub target: FocusTarget,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            shift: false,
            target: FocusTarget::Document,
        }
    }

    pub fn with_shift(key: Key) -> Self {
        Self {
            shift: true,
            ..Self::new(key)
        }
    }
}

/// Command bound to a key press, None for unbound keys and text input focus.
pub fn command_for(event: &KeyEvent) -> Option<Command> {
    if event.target == FocusTarget::TextInput {
        return None;
    }
    match (event.key, event.shift) {
        (Key::Enter | Key::Space, _) => Some(Command::PlayOrStop),
        (Key::ArrowLeft, false) => Some(Command::Previous),
        (Key::ArrowLeft, true) => Some(Command::First),
        (Key::ArrowRight, false) => Some(Command::Next),
        (Key::ArrowRight, true) => Some(Command::Last),
        (Key::Other, _) => None,
    }
}

/// Delivers key presses to every animator that listens for them.
///
/// Owned by the host; one listener per bound animator, served in
/// registration order.
#[derive(Debug, Default)]
pub struct KeyboardRouter {
    listeners: Vec<AnimatorId>,
}

impl KeyboardRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `animator` if its keyboard option is on.
    /// Returns true if a listener was added.
    pub fn bind(&mut self, animator: &Animator) -> bool {
        if !animator.keyboard_enabled() || self.listeners.contains(&animator.id()) {
            return false;
        }
        trace!("Keyboard listener bound: {}", animator.id());
        self.listeners.push(animator.id());
        true
    }

    pub fn unbind(&mut self, id: AnimatorId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| *l != id);
        let removed = self.listeners.len() != before;
        if removed {
            trace!("Keyboard listener removed: {}", id);
        }
        removed
    }

    pub fn listeners(&self) -> &[AnimatorId] {
        &self.listeners
    }

    /// Commands a key press triggers, per listener in registration order.
    pub fn route(&self, event: &KeyEvent) -> Vec<(AnimatorId, Command)> {
        match command_for(event) {
            Some(command) => self.listeners.iter().map(|id| (*id, command)).collect(),
            None => Vec::new(),
        }
    }

    /// Route a key press into `animators`. Returns how many handled it.
    pub fn dispatch(&self, event: &KeyEvent, animators: &mut [Animator]) -> usize {
        let mut handled = 0;
        for id in &self.listeners {
            let Some(animator) = animators.iter_mut().find(|a| a.id() == *id) else {
                continue;
            };
            if animator.handle_key(event).is_some() {
                handled += 1;
            }
        }
        handled
    }
}
