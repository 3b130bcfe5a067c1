//! Shared texture cache with deferred loading.
//!
//! Renders never block on I/O: [`TextureCache::get`] returns what is ready,
//! [`TextureCache::request`] schedules a decode on the rayon pool, and the
//! owner calls [`TextureCache::poll`] to collect finished loads and learn
//! that a redraw is due.  Operations that must fail fast (applying a
//! material to the whole scene, starting a comparison) use
//! [`TextureCache::load_blocking`].

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use image::RgbaImage;

use crate::io::{self, LoadError};

/// Resolves an image source string to decoded pixels.
pub trait TextureLoader: Send + Sync {
    fn load(&self, source: &str) -> Result<RgbaImage, LoadError>;
}

/// Loads `data:` URLs and filesystem paths relative to a base directory.
#[derive(Clone, Debug, Default)]
pub struct FileLoader {
    pub base_dir: PathBuf,
}

impl FileLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl TextureLoader for FileLoader {
    fn load(&self, source: &str) -> Result<RgbaImage, LoadError> {
        io::load_image_source(source, &self.base_dir)
    }
}

enum Entry {
    Ready(Arc<RgbaImage>),
    Pending,
    Failed(String),
}

type Completion = (String, Result<RgbaImage, LoadError>);

/// Run the loader, turning a panic into a load error so every request
/// still completes.
fn guarded_load(loader: &dyn TextureLoader, source: &str) -> Result<RgbaImage, LoadError> {
    panic::catch_unwind(AssertUnwindSafe(|| loader.load(source))).unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(LoadError::LoaderPanicked(msg))
    })
}

/// Record a finished load.  A failure never replaces a ready image (a
/// blocking load may have won the race).  Returns `true` when `key`
/// became ready.
fn settle(entries: &mut HashMap<String, Entry>, key: String, result: Result<RgbaImage, LoadError>) -> bool {
    match result {
        Ok(img) => {
            entries.insert(key, Entry::Ready(Arc::new(img)));
            true
        }
        Err(e) => {
            log_warn!("Texture load failed for '{}': {}", key, e);
            if !matches!(entries.get(&key), Some(Entry::Ready(_))) {
                entries.insert(key, Entry::Failed(e.to_string()));
            }
            false
        }
    }
}

pub struct TextureCache {
    loader: Arc<dyn TextureLoader>,
    entries: Mutex<HashMap<String, Entry>>,
    tx: Sender<Completion>,
    rx: Mutex<Receiver<Completion>>,
}

impl TextureCache {
    pub fn new(loader: Arc<dyn TextureLoader>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            loader,
            entries: Mutex::new(HashMap::new()),
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn with_file_loader(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileLoader::new(base_dir)))
    }

    pub fn loader(&self) -> &Arc<dyn TextureLoader> {
        &self.loader
    }

    /// Ready image for `key`, if loaded.
    pub fn get(&self, key: &str) -> Option<Arc<RgbaImage>> {
        let entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(Entry::Ready(img)) => Some(Arc::clone(img)),
            _ => None,
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|e| matches!(e.get(key), Some(Entry::Pending)))
            .unwrap_or(false)
    }

    /// The failure message recorded for `key`, if its load failed.
    pub fn failure(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(Entry::Failed(msg)) => Some(msg.clone()),
            _ => None,
        }
    }

    /// Store an already-decoded image.
    pub fn insert(&self, key: impl Into<String>, image: RgbaImage) -> Arc<RgbaImage> {
        let img = Arc::new(image);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.into(), Entry::Ready(Arc::clone(&img)));
        }
        img
    }

    /// Schedule a background load of `source` under `key`.  Returns `true`
    /// when a new load was started; keys that are ready, in flight or
    /// previously failed are left alone.
    pub fn request(&self, key: &str, source: &str) -> bool {
        {
            let Ok(mut entries) = self.entries.lock() else {
                return false;
            };
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(key.to_string(), Entry::Pending);
        }

        let loader = Arc::clone(&self.loader);
        let tx = self.tx.clone();
        let key = key.to_string();
        let source = source.to_string();
        rayon::spawn(move || {
            let result = guarded_load(loader.as_ref(), &source);
            // Receiver gone means the cache was dropped; nothing to report to
            let _ = tx.send((key, result));
        });
        true
    }

    /// Collect finished background loads.  Returns the keys that became
    /// ready since the last poll.
    pub fn poll(&self) -> Vec<String> {
        let completed: Vec<Completion> = match self.rx.lock() {
            Ok(rx) => rx.try_iter().collect(),
            Err(_) => return Vec::new(),
        };
        let Ok(mut entries) = self.entries.lock() else {
            return Vec::new();
        };
        let mut ready = Vec::new();
        for (key, result) in completed {
            if settle(&mut entries, key.clone(), result) {
                ready.push(key);
            }
        }
        ready
    }

    /// Block until every pending load has completed (or failed).
    pub fn wait_idle(&self) -> Vec<String> {
        let mut ready = Vec::new();
        loop {
            let pending = self
                .entries
                .lock()
                .map(|e| e.values().filter(|v| matches!(v, Entry::Pending)).count())
                .unwrap_or(0);
            if pending == 0 {
                return ready;
            }
            let next = match self.rx.lock() {
                Ok(rx) => rx.recv().ok(),
                Err(_) => None,
            };
            let Some((key, result)) = next else {
                return ready;
            };
            if let Ok(mut entries) = self.entries.lock()
                && settle(&mut entries, key.clone(), result)
            {
                ready.push(key);
            }
        }
    }

    /// Load synchronously, returning the cached image when present.
    /// Unlike background loads, a failure here is returned and not
    /// remembered, so the caller may retry.
    pub fn load_blocking(&self, key: &str, source: &str) -> Result<Arc<RgbaImage>, LoadError> {
        if let Some(img) = self.get(key) {
            return Ok(img);
        }
        match guarded_load(self.loader.as_ref(), source) {
            Ok(img) => Ok(self.insert(key, img)),
            Err(e) => {
                log_err!("Texture load failed for '{}': {}", key, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: AtomicUsize,
    }

    impl TextureLoader for CountingLoader {
        fn load(&self, source: &str) -> Result<RgbaImage, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if source == "broken" {
                return Err(LoadError::Unsupported(source.to_string()));
            }
            Ok(RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255])))
        }
    }

    #[test]
    fn request_then_poll_delivers_once() {
        let loader = Arc::new(CountingLoader { calls: AtomicUsize::new(0) });
        let cache = TextureCache::new(loader.clone());
        assert!(cache.get("a").is_none());
        assert!(cache.request("a", "a.png"));
        assert!(!cache.request("a", "a.png"));
        let ready = cache.wait_idle();
        assert_eq!(ready, vec!["a".to_string()]);
        assert!(cache.get("a").is_some());
        assert!(!cache.request("a", "a.png"));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_loads_are_remembered() {
        let loader = Arc::new(CountingLoader { calls: AtomicUsize::new(0) });
        let cache = TextureCache::new(loader.clone());
        cache.request("x", "broken");
        assert!(cache.wait_idle().is_empty());
        assert!(cache.failure("x").is_some());
        assert!(!cache.request("x", "broken"));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    struct PanickingLoader;

    impl TextureLoader for PanickingLoader {
        fn load(&self, source: &str) -> Result<RgbaImage, LoadError> {
            panic!("cannot decode {}", source);
        }
    }

    #[test]
    fn panicking_loader_still_completes() {
        let cache = TextureCache::new(Arc::new(PanickingLoader));
        assert!(cache.request("p", "p.png"));
        assert!(cache.wait_idle().is_empty());
        assert!(!cache.is_pending("p"));
        assert!(cache.failure("p").is_some_and(|m| m.contains("cannot decode p.png")));
        assert!(matches!(cache.load_blocking("q", "q.png"), Err(LoadError::LoaderPanicked(_))));
    }

    #[test]
    fn late_failure_keeps_ready_image() {
        let cache = TextureCache::new(Arc::new(CountingLoader { calls: AtomicUsize::new(0) }));
        cache.insert("k", RgbaImage::new(1, 1));
        cache.tx.send(("k".to_string(), Err(LoadError::Unsupported("k".into())))).unwrap();
        assert!(cache.poll().is_empty());
        assert!(cache.get("k").is_some());
        assert!(cache.failure("k").is_none());
    }

    #[test]
    fn load_blocking_reports_errors() {
        let cache = TextureCache::new(Arc::new(CountingLoader { calls: AtomicUsize::new(0) }));
        assert!(cache.load_blocking("b", "broken").is_err());
        let img = cache.load_blocking("ok", "ok.png").unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        assert!(cache.get("ok").is_some());
    }
}
