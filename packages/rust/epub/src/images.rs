//! Per-run image compression cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, warn};

use ranopress_shared::{RanopressError, Result};

/// Compresses source images to JPEG at a fixed quality, caching by source
/// path so a file referenced from several chapters is processed exactly once.
pub struct ImageStore {
    quality: u8,
    cache: HashMap<PathBuf, Vec<u8>>,
    hits: u64,
    misses: u64,
}

impl ImageStore {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            cache: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Compress the image at `path` to JPEG bytes.
    ///
    /// An unreadable file is an error; a file that reads but does not decode
    /// as an image passes through as raw bytes with a warning.
    pub fn compress(&mut self, path: &Path) -> Result<Vec<u8>> {
        if let Some(data) = self.cache.get(path) {
            self.hits += 1;
            return Ok(data.clone());
        }
        self.misses += 1;

        let data = match image::open(path) {
            Ok(decoded) => {
                let rgb = decoded.to_rgb8();
                let mut buf = Vec::new();
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, self.quality))
                    .map_err(|e| {
                        RanopressError::Epub(format!(
                            "jpeg encoding of {} failed: {e}",
                            path.display()
                        ))
                    })?;
                buf
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "image decode failed, embedding raw bytes");
                std::fs::read(path).map_err(|e| RanopressError::io(path, e))?
            }
        };

        debug!(path = %path.display(), bytes = data.len(), "image compressed");
        self.cache.insert(path.to_path_buf(), data.clone());
        Ok(data)
    }

    /// Cache hit and miss counters, in that order.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn repeated_compression_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        RgbImage::from_pixel(2, 2, image::Rgb([200, 10, 10]))
            .save(&path)
            .unwrap();

        let mut store = ImageStore::new(85);
        let first = store.compress(&path).unwrap();
        let second = store.compress(&path).unwrap();

        assert_eq!(first, second);
        // JPEG SOI marker proves re-encoding happened.
        assert_eq!(&first[..2], &[0xFF, 0xD8]);
        assert_eq!(store.stats(), (1, 1));
    }

    #[test]
    fn undecodable_file_falls_back_to_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-an-image.jpg");
        std::fs::write(&path, b"plainly not jpeg").unwrap();

        let mut store = ImageStore::new(85);
        assert_eq!(store.compress(&path).unwrap(), b"plainly not jpeg");
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut store = ImageStore::new(85);
        assert!(store.compress(Path::new("/nonexistent/x.jpg")).is_err());
    }
}
