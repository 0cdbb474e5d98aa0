//! Core engine modules - events, timers, player, loader, workers
//!
//! These modules form the animation engine, independent of any UI.

pub mod event_bus;
pub mod events;
pub mod loader;
pub mod player;
pub mod timer;
pub mod workers;

// Re-exports for convenience
pub use event_bus::{AnimatorEmitter, BoxedEvent, EventBus, downcast_event};
pub use events::AnimatorId;
pub use loader::{ImageLoader, LoadMode, LoadSummary};
pub use player::Player;
pub use timer::{Clock, ManualClock, SystemClock, Timer};
pub use workers::Workers;
