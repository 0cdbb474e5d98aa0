//! Animator - one flipbook instance.
//!
//! Ties together the per-instance [`AnimatorState`], the [`Player`] and the
//! [`ImageLoader`], and drives their timers from a [`Clock`].
//!
//! ```ignore
//! let bus = EventBus::new();
//! let mut animator = Animator::new(config, &bus);
//! animator.play();
//! loop {
//!     animator.wait(Duration::from_millis(100));
//!     for event in bus.poll() { /* redraw */ }
//! }
//! ```
//!
//! Everything runs on the thread owning the animator. Only image fetches run on
//! worker threads; their results are applied by [`Animator::tick`].

use log::{debug, info, trace};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::{AnimatorConfig, DefaultFrame, FrameAnchor};
use crate::core::event_bus::{AnimatorEmitter, EventBus};
use crate::core::events::{AnimatorId, StatusChangedEvent};
use crate::core::loader::{ImageLoader, LoadMode};
use crate::core::player::Player;
use crate::core::timer::{Clock, SystemClock, Timer};
use crate::core::workers::Workers;
use crate::entities::{AnimatorState, FrameToggle, ImageSource, LoopMode, PlaybackError, UrlSource};
use crate::keyboard::{self, KeyEvent};

pub const STATUS_PRELOADING: &str = "Preloading images...";
pub const STATUS_REFRESHING: &str = "Refreshing images from source...";

/// Upper bound for one blocking wait inside `wait_for_load()`
const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// User-level operation (buttons, navigator strip, keyboard)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    First,
    Previous,
    Next,
    Last,
    Goto(i64),
    Play,
    Stop,
    PlayOrStop,
    /// Set the loop mode, or cycle it when None
    SetLoopMode(Option<LoopMode>),
    SpeedUp,
    SpeedDown,
    SetFrameEnabled { frame: usize, toggle: FrameToggle },
    Refresh,
}

impl Command {
    /// Navigator strip click: plain click jumps, ctrl-click toggles the frame.
    pub fn navigator_click(frame: usize, ctrl: bool) -> Self {
        if ctrl {
            Command::SetFrameEnabled {
                frame,
                toggle: FrameToggle::Toggle,
            }
        } else {
            Command::Goto(frame as i64)
        }
    }
}

pub struct Animator {
    id: AnimatorId,
    config: AnimatorConfig,
    state: AnimatorState,
    player: Player,
    loader: ImageLoader,
    emitter: AnimatorEmitter,
    clock: Arc<dyn Clock>,
    status: Option<String>,
    status_timer: Timer,
    destroyed: bool,
}

impl Animator {
    /// Animator loading from files/HTTP on its own worker pool.
    pub fn new(config: AnimatorConfig, bus: &EventBus) -> Self {
        Self::with_backend(
            config,
            bus,
            Arc::new(UrlSource),
            Arc::new(Workers::with_default_threads()),
            Arc::new(SystemClock),
        )
    }

    /// Animator with explicit image source, worker pool and clock.
    ///
    /// Starts loading `config.images` immediately and shows the default frame.
    pub fn with_backend(
        config: AnimatorConfig,
        bus: &EventBus,
        source: Arc<dyn ImageSource>,
        workers: Arc<Workers>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config.normalized();
        let id = Uuid::new_v4();
        let state = AnimatorState::new(config.timing(), config.delay, config.loop_mode);
        let loader = ImageLoader::new(source, workers, bus.emitter(id), config.auto_refresh_interval());

        let mut animator = Self {
            id,
            player: Player::new(bus.emitter(id)),
            loader,
            emitter: bus.emitter(id),
            clock,
            state,
            status: None,
            status_timer: Timer::new(),
            destroyed: false,
            config,
        };

        info!(
            "Animator {} created: {} images, delay {}ms, dwell {}ms, loop {}",
            id,
            animator.config.images.len(),
            animator.state.delay(),
            animator.state.dwell(),
            animator.state.loop_mode
        );

        animator.show_status(STATUS_PRELOADING, None);
        let now = animator.clock.now();
        let urls = animator.config.images.clone();
        animator.loader.load(&mut animator.state, urls, LoadMode::Initial, now);
        animator.show_default_frame();
        animator
    }

    fn show_default_frame(&mut self) {
        match self.config.default_frame {
            DefaultFrame::Index(frame) => self.player.goto(&mut self.state, frame),
            DefaultFrame::Anchor(FrameAnchor::First) => self.player.first(&mut self.state),
            DefaultFrame::Anchor(FrameAnchor::Last) => self.player.last(&mut self.state),
        };
    }

    // === Queries ===

    pub fn id(&self) -> AnimatorId {
        self.id
    }

    pub fn config(&self) -> &AnimatorConfig {
        &self.config
    }

    pub fn state(&self) -> &AnimatorState {
        &self.state
    }

    /// Source URLs in frame order
    pub fn list_images(&self) -> &[String] {
        self.loader.urls()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// True if this animator reacts to keyboard events
    pub fn keyboard_enabled(&self) -> bool {
        self.config.keyboard && !self.destroyed
    }

    // === Navigation ===

    pub fn first(&mut self) -> Option<usize> {
        if self.destroyed {
            return None;
        }
        self.player.first(&mut self.state)
    }

    pub fn last(&mut self) -> Option<usize> {
        if self.destroyed {
            return None;
        }
        self.player.last(&mut self.state)
    }

    pub fn goto(&mut self, frame: i64) -> Option<usize> {
        if self.destroyed {
            return None;
        }
        self.player.goto(&mut self.state, frame)
    }

    pub fn next(&mut self) -> Result<usize, PlaybackError> {
        if self.destroyed {
            return Ok(self.state.current_frame);
        }
        self.player.next(&mut self.state)
    }

    pub fn previous(&mut self) -> Result<usize, PlaybackError> {
        if self.destroyed {
            return Ok(self.state.current_frame);
        }
        self.player.previous(&mut self.state)
    }

    // === Playback ===

    pub fn play(&mut self) {
        if self.destroyed {
            return;
        }
        let now = self.clock.now();
        self.player.play(&mut self.state, now);
    }

    pub fn stop(&mut self) {
        if self.destroyed {
            return;
        }
        self.player.stop(&mut self.state);
    }

    pub fn play_or_stop(&mut self) {
        if self.destroyed {
            return;
        }
        let now = self.clock.now();
        self.player.play_or_stop(&mut self.state, now);
    }

    pub fn set_loop_mode(&mut self, mode: Option<LoopMode>) -> LoopMode {
        if self.destroyed {
            return self.state.loop_mode;
        }
        self.player.set_loop_mode(&mut self.state, mode)
    }

    pub fn speed_up(&mut self) -> u64 {
        if self.destroyed {
            return self.state.delay();
        }
        let now = self.clock.now();
        self.player.speed_up(&mut self.state, now)
    }

    pub fn speed_down(&mut self) -> u64 {
        if self.destroyed {
            return self.state.delay();
        }
        let now = self.clock.now();
        self.player.speed_down(&mut self.state, now)
    }

    pub fn set_frame_enabled(&mut self, frame: usize, toggle: FrameToggle) -> bool {
        if self.destroyed {
            return false;
        }
        self.loader.forget_auto_disabled(frame);
        self.player.set_frame_enabled(&mut self.state, frame, toggle)
    }

    /// Reload every image bypassing caches
    pub fn refresh(&mut self) {
        if self.destroyed {
            return;
        }
        self.show_status(STATUS_REFRESHING, None);
        let now = self.clock.now();
        self.loader.refresh(&mut self.state, now);
    }

    // === Commands ===

    pub fn dispatch(&mut self, command: Command) {
        if self.destroyed {
            trace!("Animator {} destroyed, ignoring {:?}", self.id, command);
            return;
        }
        trace!("Animator {}: {:?}", self.id, command);
        match command {
            Command::First => {
                self.first();
            }
            Command::Previous => {
                if let Err(e) = self.previous() {
                    debug!("Previous: {}", e);
                }
            }
            Command::Next => {
                if let Err(e) = self.next() {
                    debug!("Next: {}", e);
                }
            }
            Command::Last => {
                self.last();
            }
            Command::Goto(frame) => {
                self.goto(frame);
            }
            Command::Play => self.play(),
            Command::Stop => self.stop(),
            Command::PlayOrStop => self.play_or_stop(),
            Command::SetLoopMode(mode) => {
                self.set_loop_mode(mode);
            }
            Command::SpeedUp => {
                self.speed_up();
            }
            Command::SpeedDown => {
                self.speed_down();
            }
            Command::SetFrameEnabled { frame, toggle } => {
                self.set_frame_enabled(frame, toggle);
            }
            Command::Refresh => self.refresh(),
        }
    }

    /// Apply a key press if keyboard control is enabled.
    /// Returns the command that ran.
    pub fn handle_key(&mut self, event: &KeyEvent) -> Option<Command> {
        if !self.keyboard_enabled() {
            return None;
        }
        let command = keyboard::command_for(event)?;
        self.dispatch(command);
        Some(command)
    }

    // === Status line ===

    /// Show a status message, hidden again after `timeout` if given.
    pub fn show_status(&mut self, message: &str, timeout: Option<Duration>) {
        if self.destroyed {
            return;
        }
        match timeout {
            Some(timeout) => self.status_timer.schedule(self.clock.now(), timeout),
            None => {
                self.status_timer.cancel();
            }
        }
        debug!("Status: {}", message);
        self.status = Some(message.to_string());
        self.emitter.emit(StatusChangedEvent {
            animator: self.id,
            message: self.status.clone(),
        });
    }

    pub fn hide_status(&mut self) {
        self.status_timer.cancel();
        if self.status.take().is_some() {
            self.emitter.emit(StatusChangedEvent {
                animator: self.id,
                message: None,
            });
        }
    }

    // === Update loop ===

    /// Apply finished loads and fire due timers.
    /// Returns true if anything happened.
    pub fn tick(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        let now = self.clock.now();
        let mut active = false;

        if let Some(summary) = self.loader.poll(&mut self.state, &self.player, now) {
            debug!("Animator {}: {:?} load done", self.id, summary.mode);
            self.hide_status();
            active = true;
        }

        active |= self.player.tick(&mut self.state, now);

        if self.loader.tick(&mut self.state, now) {
            self.show_status(STATUS_REFRESHING, None);
            active = true;
        }

        if self.status_timer.fire(now) {
            self.hide_status();
            active = true;
        }
        active
    }

    /// Earliest pending timer (animation step, auto-refresh, status timeout)
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.player.next_deadline(),
            self.loader.next_deadline(),
            self.status_timer.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Block until a load result arrives or the next timer is due (at most
    /// `max`), then tick.
    pub fn wait(&mut self, max: Duration) -> bool {
        if self.destroyed {
            return false;
        }
        let now = self.clock.now();
        let timeout = self
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now).min(max))
            .unwrap_or(max);

        if self.loader.is_loading() {
            self.loader.wait(timeout);
        } else if !timeout.is_zero() {
            std::thread::sleep(timeout);
        }
        self.tick()
    }

    /// Block until the running load cycle completed (wall-clock `timeout`).
    /// Returns false on timeout or if the animator was destroyed.
    pub fn wait_for_load(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.tick();
            if self.destroyed {
                return false;
            }
            if !self.loader.is_loading() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.loader.wait((deadline - now).min(LOAD_POLL_INTERVAL));
        }
    }

    // === Lifecycle ===

    /// Stop everything; later calls are no-ops and late load results are dropped.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.player.stop(&mut self.state);
        self.loader.cancel();
        self.hide_status();
        self.destroyed = true;
        info!("Animator {} destroyed", self.id);
    }
}

impl std::fmt::Debug for Animator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Animator")
            .field("id", &self.id)
            .field("frames", &self.state.len())
            .field("current_frame", &self.state.current_frame)
            .field("play_mode", &self.state.play_mode)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
