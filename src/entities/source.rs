//! Image sources - where frame URLs are fetched from.
//!
//! The loader only depends on the [`ImageSource`] trait. [`UrlSource`] is the
//! default backend:
//! - `http://` / `https://`: blocking fetch via `ehttp` (runs on a worker thread)
//! - anything else: local file path, optional `file://` prefix, query string ignored
//!
//! Fetched bytes are checked to be an image by reading the header with the
//! `image` crate; pixels are not decoded.

use log::debug;
use std::io::Cursor;
use std::path::PathBuf;

use super::frame::{ImageInfo, LoadError};

/// Asynchronous-capable image load capability (called from worker threads)
pub trait ImageSource: Send + Sync {
    fn load(&self, url: &str) -> Result<ImageInfo, LoadError>;
}

/// Default source: local files and HTTP(S)
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlSource;

impl UrlSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        if is_remote(url) {
            debug!("Fetching {}", url);
            let response = ehttp::fetch_blocking(&ehttp::Request::get(url))
                .map_err(LoadError::Network)?;
            if !response.ok {
                return Err(LoadError::Http {
                    status: response.status,
                    reason: response.status_text,
                });
            }
            Ok(response.bytes)
        } else {
            let path = local_path(url);
            debug!("Reading {}", path.display());
            std::fs::read(&path).map_err(|e| LoadError::Io(format!("{}: {}", path.display(), e)))
        }
    }
}

impl ImageSource for UrlSource {
    fn load(&self, url: &str) -> Result<ImageInfo, LoadError> {
        let bytes = self.fetch(url)?;
        probe_image(&bytes)
    }
}

/// Read dimensions from image header bytes
pub fn probe_image(bytes: &[u8]) -> Result<ImageInfo, LoadError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LoadError::Decode(e.to_string()))?;
    if reader.format().is_none() {
        return Err(LoadError::Decode("unrecognized image format".to_string()));
    }
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| LoadError::Decode(e.to_string()))?;
    Ok(ImageInfo { width, height })
}

fn is_remote(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// File path for a non-remote URL (`file://` prefix and `?query#fragment` dropped)
fn local_path(url: &str) -> PathBuf {
    let path = url.strip_prefix("file://").unwrap_or(url);
    let end = path.find(['?', '#']).unwrap_or(path.len());
    PathBuf::from(&path[..end])
}

/// Add or replace the cache-busting `rand` query parameter.
///
/// Other query parameters and any `#fragment` are preserved:
/// `a.png?x=1&rand=0.5#top` -> `a.png?x=1&rand=<value>#top`
pub fn randomize_url(url: &str, value: f64) -> String {
    let (rest, fragment) = match url.find('#') {
        Some(pos) => (&url[..pos], &url[pos..]),
        None => (url, ""),
    };
    let (root, query) = match rest.find('?') {
        Some(pos) => (&rest[..pos], &rest[pos + 1..]),
        None => (rest, ""),
    };

    let mut params: Vec<&str> = query
        .split('&')
        .filter(|p| !p.is_empty() && *p != "rand" && !p.starts_with("rand="))
        .collect();
    let rand_param = format!("rand={}", value);
    params.push(&rand_param);

    format!("{}?{}{}", root, params.join("&"), fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Smallest valid GIF (1x1)
    const GIF_1X1: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff, 0xff,
        0xff, 0x00, 0x00, 0x00, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
        0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
    ];

    #[test]
    fn test_randomize_plain_url() {
        assert_eq!(randomize_url("img/a.jpg", 0.25), "img/a.jpg?rand=0.25");
    }

    #[test]
    fn test_randomize_preserves_query() {
        assert_eq!(
            randomize_url("http://host/a.jpg?x=1&y=2", 0.5),
            "http://host/a.jpg?x=1&y=2&rand=0.5"
        );
    }

    #[test]
    fn test_randomize_replaces_existing_rand() {
        assert_eq!(randomize_url("a.jpg?rand=0.1&x=1", 0.75), "a.jpg?x=1&rand=0.75");
        assert_eq!(randomize_url("a.jpg?x=1&rand=0.1", 0.75), "a.jpg?x=1&rand=0.75");
        // Only the exact parameter is replaced
        assert_eq!(randomize_url("a.jpg?random=3", 0.5), "a.jpg?random=3&rand=0.5");
    }

    #[test]
    fn test_randomize_keeps_fragment() {
        assert_eq!(randomize_url("a.jpg?x=1#top", 0.5), "a.jpg?x=1&rand=0.5#top");
    }

    #[test]
    fn test_local_path_strips_query_and_scheme() {
        assert_eq!(local_path("file:///tmp/a.png?rand=0.3"), PathBuf::from("/tmp/a.png"));
        assert_eq!(local_path("frames/b.gif"), PathBuf::from("frames/b.gif"));
        assert!(is_remote("HTTPS://example.com/x.png"));
        assert!(!is_remote("frames/b.gif"));
    }

    #[test]
    fn test_probe_image() {
        assert_eq!(probe_image(GIF_1X1), Ok(ImageInfo { width: 1, height: 1 }));
        assert!(matches!(probe_image(b"not an image"), Err(LoadError::Decode(_))));
    }

    #[test]
    fn test_url_source_reads_files() {
        let path = std::env::temp_dir().join(format!("flipbook-{}.gif", uuid::Uuid::new_v4()));
        std::fs::write(&path, GIF_1X1).unwrap();

        let url = randomize_url(&path.to_string_lossy(), 0.5);
        assert_eq!(UrlSource.load(&url), Ok(ImageInfo { width: 1, height: 1 }));

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(UrlSource.load(&url), Err(LoadError::Io(_))));
    }
}
