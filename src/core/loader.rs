//! Image loader: asynchronous per-frame loads, failure handling, auto-refresh.
//!
//! **Used by**: [`Animator`](crate::animator::Animator), which calls `poll()`
//! from its update loop.
//!
//! # Load cycle
//!
//! 1. `load()` replaces the frames with placeholders right away (the navigator
//!    can render immediately) and submits one job per URL to [`Workers`].
//! 2. Jobs call the [`ImageSource`] and send the outcome over a channel.
//! 3. `poll()` applies outcomes on the owner thread, in whatever order they
//!    arrive. A failed frame is disabled through the [`Player`].
//! 4. When every frame resolved: [`LoadCompleteEvent`], and the auto-refresh
//!    timer is armed if configured.
//!
//! Each cycle gets a new epoch. Outcomes from older cycles (or after
//! `cancel()`) are dropped, and queued jobs of older cycles never run.
//!
//! # Refresh
//!
//! `refresh()` reloads the same URLs with a random `rand=` query parameter so
//! caches along the way are bypassed. A frame the loader disabled because it
//! failed is enabled again once it loads; frames disabled by the user stay
//! disabled.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info, trace, warn};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::core::event_bus::AnimatorEmitter;
use crate::core::events::{LoadCompleteEvent, LoadFailedEvent};
use crate::core::player::Player;
use crate::core::timer::Timer;
use crate::core::workers::Workers;
use crate::entities::{
    AnimatorState, Frame, FrameToggle, ImageInfo, ImageSource, LoadError, randomize_url,
};

/// Why a load cycle runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// First load, URLs used as given
    Initial,
    /// Reload bypassing caches
    Refresh,
}

/// Result of a finished load cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub mode: LoadMode,
    pub loaded: usize,
    pub failed: usize,
}

/// Message from a worker
#[derive(Debug)]
struct LoadOutcome {
    epoch: u64,
    frame: usize,
    url: String,
    result: Result<ImageInfo, LoadError>,
}

pub struct ImageLoader {
    source: Arc<dyn ImageSource>,
    workers: Arc<Workers>,
    emitter: AnimatorEmitter,
    epoch: Arc<AtomicU64>,
    tx: Sender<LoadOutcome>,
    rx: Receiver<LoadOutcome>,
    /// Outcomes received by `wait()`, applied on next `poll()`
    buffered: VecDeque<LoadOutcome>,
    urls: Vec<String>,
    mode: LoadMode,
    pending: usize,
    loaded: usize,
    failed: usize,
    /// Cycle that completed inside `load()` (nothing to fetch), reported by `poll()`
    finished: Option<LoadSummary>,
    /// Frames disabled because their load failed
    auto_disabled: BTreeSet<usize>,
    auto_refresh: Option<Duration>,
    refresh_timer: Timer,
}

impl ImageLoader {
    pub fn new(
        source: Arc<dyn ImageSource>,
        workers: Arc<Workers>,
        emitter: AnimatorEmitter,
        auto_refresh: Option<Duration>,
    ) -> Self {
        let (tx, rx) = unbounded();
        Self {
            source,
            workers,
            emitter,
            epoch: Arc::new(AtomicU64::new(0)),
            tx,
            rx,
            buffered: VecDeque::new(),
            urls: Vec::new(),
            mode: LoadMode::Initial,
            pending: 0,
            loaded: 0,
            failed: 0,
            finished: None,
            auto_disabled: BTreeSet::new(),
            auto_refresh,
            refresh_timer: Timer::new(),
        }
    }

    /// Source URLs of the current cycle (as given, without cache busting)
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn is_loading(&self) -> bool {
        self.pending > 0
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.refresh_timer.deadline()
    }

    /// Start a load cycle, replacing any running one.
    pub fn load(&mut self, state: &mut AnimatorState, urls: Vec<String>, mode: LoadMode, now: Instant) {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.refresh_timer.cancel();
        self.buffered.clear();
        self.finished = None;

        let len = urls.len();
        self.urls = urls;
        self.mode = mode;
        self.pending = len;
        self.loaded = 0;
        self.failed = 0;
        self.auto_disabled.retain(|&f| f < len);

        state.set_frames(
            self.urls
                .iter()
                .enumerate()
                .map(|(i, url)| Frame::placeholder(i, url.clone()))
                .collect(),
        );

        info!("Loading {} images ({:?}, epoch {})", len, mode, epoch);

        for (frame, url) in self.urls.iter().enumerate() {
            let request = match mode {
                LoadMode::Initial => url.clone(),
                LoadMode::Refresh => randomize_url(url, fastrand::f64()),
            };
            let source = Arc::clone(&self.source);
            let tx = self.tx.clone();
            self.workers.execute_with_epoch(&self.epoch, epoch, move || {
                let result = source.load(&request);
                let _ = tx.send(LoadOutcome {
                    epoch,
                    frame,
                    url: request,
                    result,
                });
            });
        }

        if len == 0 {
            self.finished = Some(self.complete(now));
        }
    }

    /// Reload the current URLs, bypassing caches
    pub fn refresh(&mut self, state: &mut AnimatorState, now: Instant) {
        debug!("Refreshing {} images from source", self.urls.len());
        let urls = self.urls.clone();
        self.load(state, urls, LoadMode::Refresh, now)
    }

    /// Apply all outcomes received so far.
    /// Returns the summary if this completed the cycle.
    pub fn poll(&mut self, state: &mut AnimatorState, player: &Player, now: Instant) -> Option<LoadSummary> {
        let mut outcomes: Vec<LoadOutcome> = self.buffered.drain(..).collect();
        outcomes.extend(self.rx.try_iter());

        let mut summary = self.finished.take();
        for outcome in outcomes {
            if let Some(done) = self.apply(state, player, outcome, now) {
                summary = Some(done);
            }
        }
        summary
    }

    /// Block up to `timeout` for the next outcome (it is applied by `poll()`).
    /// Returns false on timeout or when nothing is loading.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        if !self.is_loading() || !self.buffered.is_empty() {
            return !self.buffered.is_empty();
        }
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => {
                self.buffered.push_back(outcome);
                true
            }
            Err(_) => false,
        }
    }

    /// Fire the auto-refresh timer if due. Returns true if a refresh started.
    pub fn tick(&mut self, state: &mut AnimatorState, now: Instant) -> bool {
        if !self.refresh_timer.fire(now) {
            return false;
        }
        self.refresh(state, now);
        true
    }

    /// The user took control of `frame`: a later successful load must not
    /// re-enable it.
    pub fn forget_auto_disabled(&mut self, frame: usize) {
        if self.auto_disabled.remove(&frame) {
            trace!("Frame #{} no longer managed by the loader", frame);
        }
    }

    /// Drop the running cycle and the auto-refresh timer.
    pub fn cancel(&mut self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.refresh_timer.cancel();
        self.buffered.clear();
        self.finished = None;
        self.pending = 0;
        debug!("Image loader cancelled");
    }

    fn apply(
        &mut self,
        state: &mut AnimatorState,
        player: &Player,
        outcome: LoadOutcome,
        now: Instant,
    ) -> Option<LoadSummary> {
        let current = self.epoch.load(Ordering::Acquire);
        if outcome.epoch != current || self.pending == 0 {
            trace!("Dropping stale load result for frame {} (epoch {} != {})", outcome.frame, outcome.epoch, current);
            return None;
        }
        let Some(frame) = state.frames.get_mut(outcome.frame) else {
            return None;
        };

        match outcome.result {
            Ok(info) => {
                trace!("Loaded frame #{} ({}x{}): {}", outcome.frame, info.width, info.height, outcome.url);
                frame.set_loaded(info);
                self.loaded += 1;
                if self.auto_disabled.remove(&outcome.frame) {
                    player.set_frame_enabled(state, outcome.frame, FrameToggle::Enable);
                }
            }
            Err(err) => {
                frame.set_failed();
                self.failed += 1;
                warn!("Image failed to load for frame #{}: {} ({})", outcome.frame, outcome.url, err);
                if player.set_frame_enabled(state, outcome.frame, FrameToggle::Disable) {
                    self.auto_disabled.insert(outcome.frame);
                }
                self.emitter.emit(LoadFailedEvent {
                    animator: self.emitter.animator(),
                    frame: outcome.frame,
                    url: outcome.url,
                    error: err.to_string(),
                });
            }
        }

        self.pending -= 1;
        if self.pending == 0 {
            return Some(self.complete(now));
        }
        None
    }

    fn complete(&mut self, now: Instant) -> LoadSummary {
        let summary = LoadSummary {
            mode: self.mode,
            loaded: self.loaded,
            failed: self.failed,
        };
        info!(
            "Load complete ({:?}): {} loaded, {} failed",
            summary.mode, summary.loaded, summary.failed
        );
        self.emitter.emit(LoadCompleteEvent {
            animator: self.emitter.animator(),
            mode: summary.mode,
            loaded: summary.loaded,
            failed: summary.failed,
        });

        if let Some(interval) = self.auto_refresh {
            debug!("Auto-refresh in {}ms", interval.as_millis());
            self.refresh_timer.schedule(now, interval);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::{EventBus, downcast_event};
    use crate::core::timer::{Clock, ManualClock};
    use crate::entities::{FrameStatus, LoopMode, Timing};
    use std::collections::HashSet;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Fails every URL whose path (query ignored) is in `failing`; records requests.
    #[derive(Default)]
    struct ScriptedSource {
        failing: Mutex<HashSet<String>>,
        requests: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl ScriptedSource {
        fn failing(urls: &[&str]) -> Self {
            Self {
                failing: Mutex::new(urls.iter().map(|u| u.to_string()).collect()),
                ..Self::default()
            }
        }
    }

    impl ImageSource for ScriptedSource {
        fn load(&self, url: &str) -> Result<ImageInfo, LoadError> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.requests.lock().unwrap().push(url.to_string());
            let path = url.split('?').next().unwrap_or(url);
            if self.failing.lock().unwrap().contains(path) {
                Err(LoadError::Io(format!("{path}: not found")))
            } else {
                Ok(ImageInfo { width: 4, height: 3 })
            }
        }
    }

    struct Fixture {
        loader: ImageLoader,
        player: Player,
        state: AnimatorState,
        clock: ManualClock,
        bus: EventBus,
        source: Arc<ScriptedSource>,
    }

    fn fixture(source: ScriptedSource, auto_refresh: Option<Duration>) -> Fixture {
        let bus = EventBus::new();
        let id = Uuid::new_v4();
        let source = Arc::new(source);
        let loader = ImageLoader::new(
            Arc::clone(&source) as Arc<dyn ImageSource>,
            Arc::new(Workers::new(2)),
            bus.emitter(id),
            auto_refresh,
        );
        Fixture {
            loader,
            player: Player::new(bus.emitter(id)),
            state: AnimatorState::new(Timing::default(), 250, LoopMode::Loop),
            clock: ManualClock::new(),
            bus,
            source,
        }
    }

    impl Fixture {
        fn load(&mut self, urls: &[&str]) {
            let urls = urls.iter().map(|u| u.to_string()).collect();
            self.loader.load(&mut self.state, urls, LoadMode::Initial, self.clock.now());
        }

        fn finish(&mut self) -> LoadSummary {
            for _ in 0..500 {
                self.loader.wait(Duration::from_millis(20));
                if let Some(summary) = self.loader.poll(&mut self.state, &self.player, self.clock.now()) {
                    return summary;
                }
            }
            panic!("load did not complete");
        }
    }

    #[test]
    fn test_failed_frame_is_disabled() {
        let mut fx = fixture(ScriptedSource::failing(&["b.png"]), None);
        fx.load(&["a.png", "b.png", "c.png"]);

        // Placeholders exist before anything resolved
        assert_eq!(fx.state.len(), 3);
        assert!(fx.loader.is_loading());

        let summary = fx.finish();
        assert_eq!(summary, LoadSummary { mode: LoadMode::Initial, loaded: 2, failed: 1 });
        assert_eq!(fx.state.disabled_frames.iter().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(fx.state.frames[1].status, FrameStatus::Failed);
        assert_eq!(fx.state.frames[2].size, Some((4, 3)));

        fx.player.goto(&mut fx.state, 0);
        assert_eq!(fx.player.next(&mut fx.state), Ok(2));

        let events = fx.bus.poll();
        let failed: Vec<usize> = events
            .iter()
            .filter_map(downcast_event::<LoadFailedEvent>)
            .map(|e| e.frame)
            .collect();
        assert_eq!(failed, vec![1]);
        assert_eq!(events.iter().filter_map(downcast_event::<LoadCompleteEvent>).count(), 1);
    }

    #[test]
    fn test_empty_list_completes_immediately() {
        let mut fx = fixture(ScriptedSource::default(), None);
        fx.load(&[]);
        assert!(!fx.loader.is_loading());
        let summary = fx.loader.poll(&mut fx.state, &fx.player, fx.clock.now());
        assert_eq!(summary, Some(LoadSummary { mode: LoadMode::Initial, loaded: 0, failed: 0 }));
        assert!(fx.loader.poll(&mut fx.state, &fx.player, fx.clock.now()).is_none());
    }

    #[test]
    fn test_refresh_busts_cache_and_keeps_urls() {
        let mut fx = fixture(ScriptedSource::default(), None);
        fx.load(&["a.png?v=1", "b.png"]);
        fx.finish();

        fx.loader.refresh(&mut fx.state, fx.clock.now());
        assert_eq!(fx.loader.mode(), LoadMode::Refresh);
        let summary = fx.finish();
        assert_eq!(summary.mode, LoadMode::Refresh);

        let requests = fx.source.requests.lock().unwrap().clone();
        let refreshed: Vec<&String> = requests.iter().filter(|u| u.contains("rand=")).collect();
        assert_eq!(refreshed.len(), 2);
        assert!(refreshed.iter().any(|u| u.starts_with("a.png?v=1&rand=")));
        assert_eq!(fx.loader.urls(), ["a.png?v=1".to_string(), "b.png".to_string()]);
        assert_eq!(fx.state.frames[0].source_url, "a.png?v=1");
    }

    #[test]
    fn test_refresh_reenables_recovered_frames_only() {
        let mut fx = fixture(ScriptedSource::failing(&["b.png"]), None);
        fx.load(&["a.png", "b.png", "c.png"]);
        fx.finish();
        fx.player.set_frame_enabled(&mut fx.state, 2, FrameToggle::Disable);
        assert_eq!(fx.state.disabled_frames.len(), 2);

        fx.source.failing.lock().unwrap().clear();
        fx.loader.refresh(&mut fx.state, fx.clock.now());
        let summary = fx.finish();

        assert_eq!(summary.failed, 0);
        // b.png recovered; c.png was disabled by hand
        assert_eq!(fx.state.disabled_frames.iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_user_disable_survives_refresh() {
        let mut fx = fixture(ScriptedSource::failing(&["b.png"]), None);
        fx.load(&["a.png", "b.png", "c.png"]);
        fx.finish();
        assert!(fx.state.is_disabled(1));

        // User re-enables the failed frame, then disables it again
        fx.player.set_frame_enabled(&mut fx.state, 1, FrameToggle::Enable);
        fx.loader.forget_auto_disabled(1);
        fx.player.set_frame_enabled(&mut fx.state, 1, FrameToggle::Disable);
        fx.loader.forget_auto_disabled(1);

        fx.source.failing.lock().unwrap().clear();
        fx.loader.refresh(&mut fx.state, fx.clock.now());
        let summary = fx.finish();

        assert_eq!(summary.failed, 0);
        assert_eq!(fx.state.frames[1].status, FrameStatus::Loaded);
        assert_eq!(fx.state.disabled_frames.iter().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_cancelled_results_are_ignored() {
        let source = ScriptedSource {
            delay: Some(Duration::from_millis(20)),
            ..ScriptedSource::default()
        };
        let mut fx = fixture(source, None);
        fx.load(&["a.png", "b.png"]);
        fx.loader.cancel();
        assert!(!fx.loader.is_loading());

        std::thread::sleep(Duration::from_millis(100));
        assert!(fx.loader.poll(&mut fx.state, &fx.player, fx.clock.now()).is_none());
        assert!(fx.state.frames.iter().all(|f| f.status == FrameStatus::Pending));
    }

    #[test]
    fn test_new_cycle_drops_old_results() {
        let mut fx = fixture(ScriptedSource::failing(&["old.png"]), None);
        fx.load(&["old.png"]);
        fx.load(&["new.png"]);

        let summary = fx.finish();
        assert_eq!(summary.failed, 0);
        assert!(fx.state.disabled_frames.is_empty());
        assert_eq!(fx.state.frames[0].source_url, "new.png");
    }

    #[test]
    fn test_auto_refresh_after_complete() {
        let mut fx = fixture(ScriptedSource::default(), Some(Duration::from_millis(1000)));
        fx.load(&["a.png"]);
        assert!(fx.loader.next_deadline().is_none());
        fx.finish();
        assert!(fx.loader.next_deadline().is_some());

        fx.clock.advance_ms(999);
        assert!(!fx.loader.tick(&mut fx.state, fx.clock.now()));

        fx.clock.advance_ms(1);
        assert!(fx.loader.tick(&mut fx.state, fx.clock.now()));
        assert!(fx.loader.is_loading());
        assert_eq!(fx.loader.mode(), LoadMode::Refresh);
        // Replaced, not duplicated, until this cycle completes
        assert!(fx.loader.next_deadline().is_none());
    }
}
