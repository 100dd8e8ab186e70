//! Overlay image preloading.
//!
//! A resource reference is validated before anything is fetched: an empty
//! reference fails immediately with `InvalidResourceUrl`. Decoded images are
//! cached per reference, and concurrent preloads of the same reference share
//! a single fetch.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Context};
use image::RgbaImage;
use url::{ParseError, Url};

use crate::error::{chain_message, OverlayError, Result};

/// Largest image accepted from any source.
const MAX_IMAGE_BYTES: u64 = 16 * 1024 * 1024;

/// A validated image reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceUrl {
    /// Local file, given as a plain path or a `file://` URL.
    File(PathBuf),
    /// `http://` or `https://` URL.
    Http(String),
}

impl ResourceUrl {
    /// Anything without a scheme is a local path. `file:` URLs are decoded
    /// to a path; `http:` and `https:` URLs need a host.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(OverlayError::InvalidResourceUrl(
                "image reference is empty".to_string(),
            ));
        }
        let url = match Url::parse(trimmed) {
            Ok(url) => url,
            Err(ParseError::RelativeUrlWithoutBase) => {
                return Ok(ResourceUrl::File(PathBuf::from(trimmed)));
            }
            Err(err) => {
                return Err(OverlayError::InvalidResourceUrl(format!(
                    "{}: {}",
                    trimmed, err
                )));
            }
        };
        match url.scheme() {
            "file" => url.to_file_path().map(ResourceUrl::File).map_err(|()| {
                OverlayError::InvalidResourceUrl(format!("{}: not a local path", trimmed))
            }),
            "http" | "https" => {
                if url.host_str().map_or(true, str::is_empty) {
                    return Err(OverlayError::InvalidResourceUrl(format!(
                        "{}: missing host",
                        trimmed
                    )));
                }
                Ok(ResourceUrl::Http(url.into()))
            }
            // `C:\sprites\wand.png` parses with a one-letter scheme.
            scheme if scheme.len() == 1 && cfg!(windows) => {
                Ok(ResourceUrl::File(PathBuf::from(trimmed)))
            }
            scheme => Err(OverlayError::InvalidResourceUrl(format!(
                "unsupported scheme {:?} in {:?}",
                scheme, trimmed
            ))),
        }
    }
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceUrl::File(path) => write!(f, "{}", path.display()),
            ResourceUrl::Http(url) => f.write_str(url),
        }
    }
}

/// Retrieves the raw bytes behind a reference.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, url: &ResourceUrl) -> anyhow::Result<Vec<u8>>;
}

/// Reads local files, and HTTP(S) URLs when built with `fetch-http`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFetcher;

impl ResourceFetcher for DefaultFetcher {
    fn fetch(&self, url: &ResourceUrl) -> anyhow::Result<Vec<u8>> {
        match url {
            ResourceUrl::File(path) => {
                let meta = std::fs::metadata(path)
                    .with_context(|| format!("stat {}", path.display()))?;
                if meta.len() > MAX_IMAGE_BYTES {
                    return Err(anyhow!(
                        "{} is {} bytes, limit is {}",
                        path.display(),
                        meta.len(),
                        MAX_IMAGE_BYTES
                    ));
                }
                std::fs::read(path).with_context(|| format!("read {}", path.display()))
            }
            ResourceUrl::Http(raw) => fetch_http(raw),
        }
    }
}

#[cfg(feature = "fetch-http")]
fn fetch_http(raw: &str) -> anyhow::Result<Vec<u8>> {
    use std::io::Read;

    let response = ureq::get(raw)
        .call()
        .with_context(|| format!("fetch image from {}", raw))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_IMAGE_BYTES + 1)
        .read_to_end(&mut bytes)
        .context("read image body")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty response from {}", raw));
    }
    if bytes.len() as u64 > MAX_IMAGE_BYTES {
        return Err(anyhow!("image at {} exceeds {} bytes", raw, MAX_IMAGE_BYTES));
    }
    Ok(bytes)
}

#[cfg(not(feature = "fetch-http"))]
fn fetch_http(raw: &str) -> anyhow::Result<Vec<u8>> {
    Err(anyhow!("{} needs the fetch-http feature", raw))
}

type Slot = Arc<Mutex<Option<Arc<RgbaImage>>>>;

/// Caching image preloader.
pub struct ImagePreloader<F: ResourceFetcher = DefaultFetcher> {
    fetcher: F,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ImagePreloader<DefaultFetcher> {
    pub fn new() -> Self {
        Self::with_fetcher(DefaultFetcher)
    }
}

impl Default for ImagePreloader<DefaultFetcher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ResourceFetcher> ImagePreloader<F> {
    pub fn with_fetcher(fetcher: F) -> Self {
        Self {
            fetcher,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `raw` to a decoded RGBA image.
    ///
    /// Failures are not cached; a later call retries the fetch.
    pub fn preload(&self, raw: &str) -> Result<Arc<RgbaImage>> {
        let url = ResourceUrl::parse(raw)?;
        let key = url.to_string();

        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key).or_default().clone()
        };
        let mut cached = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(image) = cached.as_ref() {
            return Ok(Arc::clone(image));
        }

        let image = self.load(&url).map_err(|err| OverlayError::ImageLoad {
            url: url.to_string(),
            reason: chain_message(&err),
        })?;
        log::info!(
            "ImagePreloader: loaded {} ({}x{})",
            url,
            image.width(),
            image.height()
        );
        let image = Arc::new(image);
        *cached = Some(Arc::clone(&image));
        Ok(image)
    }

    /// Number of references with a decoded image.
    pub fn cached(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .values()
            .filter(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some()
            })
            .count()
    }

    fn load(&self, url: &ResourceUrl) -> anyhow::Result<RgbaImage> {
        let bytes = self.fetcher.fetch(url)?;
        let decoded = image::load_from_memory(&bytes).context("decode image")?;
        Ok(decoded.into_rgba8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    struct CountingFetcher {
        calls: AtomicUsize,
        bytes: Vec<u8>,
    }

    impl CountingFetcher {
        fn png() -> Self {
            let image = RgbaImage::from_pixel(3, 2, image::Rgba([9, 8, 7, 255]));
            let mut bytes = Vec::new();
            image
                .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
                .unwrap();
            Self {
                calls: AtomicUsize::new(0),
                bytes,
            }
        }
    }

    impl ResourceFetcher for CountingFetcher {
        fn fetch(&self, _url: &ResourceUrl) -> anyhow::Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(self.bytes.clone())
        }
    }

    #[test]
    fn empty_reference_fails_without_fetching() {
        let preloader = ImagePreloader::with_fetcher(CountingFetcher::png());
        let err = preloader.preload("   ").unwrap_err();
        assert!(matches!(err, OverlayError::InvalidResourceUrl(_)));
        assert_eq!(preloader.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concurrent_preloads_fetch_once() {
        let preloader = ImagePreloader::with_fetcher(CountingFetcher::png());
        let images: Vec<Arc<RgbaImage>> = thread::scope(|scope| {
            let a = scope.spawn(|| preloader.preload("http://example.test/wand.png"));
            let b = scope.spawn(|| preloader.preload("http://example.test/wand.png"));
            vec![a.join().unwrap().unwrap(), b.join().unwrap().unwrap()]
        });
        assert_eq!(preloader.fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&images[0], &images[1]));
        assert_eq!(images[0].dimensions(), (3, 2));
        assert_eq!(preloader.cached(), 1);
    }

    #[test]
    fn parses_references() {
        assert_eq!(
            ResourceUrl::parse("file:///tmp/a.png").unwrap(),
            ResourceUrl::File(PathBuf::from("/tmp/a.png"))
        );
        assert_eq!(
            ResourceUrl::parse("assets/wand.png").unwrap(),
            ResourceUrl::File(PathBuf::from("assets/wand.png"))
        );
        assert!(matches!(
            ResourceUrl::parse("https://cdn.example.test/x.png").unwrap(),
            ResourceUrl::Http(_)
        ));
        assert!(ResourceUrl::parse("ftp://host/x.png").is_err());
        assert!(ResourceUrl::parse("http://").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn file_urls_decode_host_and_escapes() {
        assert_eq!(
            ResourceUrl::parse("file://localhost/x.png").unwrap(),
            ResourceUrl::File(PathBuf::from("/x.png"))
        );
        assert_eq!(
            ResourceUrl::parse("file:///tmp/a%20b.png").unwrap(),
            ResourceUrl::File(PathBuf::from("/tmp/a b.png"))
        );
        assert!(matches!(
            ResourceUrl::parse("file://otherhost/x.png"),
            Err(OverlayError::InvalidResourceUrl(_))
        ));
    }

    #[test]
    fn missing_file_is_image_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.png");
        let err = ImagePreloader::new()
            .preload(path.to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, OverlayError::ImageLoad { .. }));
        assert!(err.is_setup_error());
    }

    #[test]
    fn decodes_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprite.png");
        RgbaImage::from_pixel(5, 4, image::Rgba([1, 2, 3, 128]))
            .save(&path)
            .unwrap();
        let image = ImagePreloader::new().preload(path.to_str().unwrap()).unwrap();
        assert_eq!(image.dimensions(), (5, 4));
        assert_eq!(image.get_pixel(0, 0)[3], 128);
    }
}
