//! One image of the sequence and its load status.

use std::fmt;

/// Frame loading status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameStatus {
    #[default]
    Pending, // Placeholder, load in flight
    Loaded,
    Failed,
}

/// Single frame: index into the sequence plus the URL it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub index: usize,
    pub source_url: String,
    pub status: FrameStatus,
    /// Image dimensions reported by the source once loaded
    pub size: Option<(u32, u32)>,
}

impl Frame {
    /// Placeholder entry, so the navigator can render before loads resolve
    pub fn placeholder(index: usize, source_url: impl Into<String>) -> Self {
        Self {
            index,
            source_url: source_url.into(),
            status: FrameStatus::Pending,
            size: None,
        }
    }

    pub fn loaded(&self) -> bool {
        self.status == FrameStatus::Loaded
    }

    pub fn failed(&self) -> bool {
        self.status == FrameStatus::Failed
    }

    pub fn set_loaded(&mut self, info: ImageInfo) {
        self.status = FrameStatus::Loaded;
        self.size = Some((info.width, info.height));
    }

    pub fn set_failed(&mut self) {
        self.status = FrameStatus::Failed;
        self.size = None;
    }
}

/// What a successful load reports back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

/// Image loading errors
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    Io(String),
    Http { status: u16, reason: String },
    Network(String),
    Decode(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "I/O error: {}", e),
            LoadError::Http { status, reason } => write!(f, "HTTP {} {}", status, reason),
            LoadError::Network(e) => write!(f, "Network error: {}", e),
            LoadError::Decode(e) => write!(f, "Not a readable image: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_then_resolve() {
        let mut frame = Frame::placeholder(3, "a/3.png");
        assert_eq!(frame.status, FrameStatus::Pending);
        assert!(!frame.loaded() && !frame.failed());

        frame.set_loaded(ImageInfo { width: 640, height: 480 });
        assert!(frame.loaded());
        assert_eq!(frame.size, Some((640, 480)));

        frame.set_failed();
        assert!(frame.failed());
        assert_eq!(frame.size, None);
    }

    #[test]
    fn test_error_display() {
        let err = LoadError::Http { status: 404, reason: "Not Found".into() };
        assert_eq!(err.to_string(), "HTTP 404 Not Found");
    }
}
