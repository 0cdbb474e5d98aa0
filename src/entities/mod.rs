//! Data types shared by the playback engine and the image loader.

pub mod frame;
pub mod source;
pub mod state;

pub use frame::{Frame, FrameStatus, ImageInfo, LoadError};
pub use source::{ImageSource, UrlSource, randomize_url};
pub use state::{
    AnimatorState, Direction, FrameToggle, LoopMode, PlayMode, PlaybackError, Timing,
};
