// src/core/cache.rs
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;
use tracing::{debug, warn};

/// Attempts per picture before the download is abandoned.
pub const PICTURE_MAX_RETRIES: u32 = 5;

const HTTP_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Another requester ran the download for this picture and left no file.
    #[error("no picture downloaded")]
    NoPicture,
    #[error("picture download failed: {0}")]
    Download(String),
}

// Per-path gate: present in the table while a download is in flight.
struct Download {
    done: Mutex<bool>,
    cond: Condvar,
}

enum Claim {
    Owner(Arc<Download>),
    Waiter(Arc<Download>),
}

/// On-disk picture cache. A URL maps to one file in `dir`; concurrent
/// requests for the same URL share a single download, everyone else just
/// waits for it. Owned by whoever builds it, typically the core façade.
pub struct PictureCache {
    dir: PathBuf,
    client: Client,
    downloads: Mutex<HashMap<PathBuf, Arc<Download>>>,
}

impl PictureCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, FetchError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| FetchError::Download(format!("create cache dir {}: {e}", dir.display())))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetchError::Download(format!("http client: {e}")))?;
        Ok(Self {
            dir,
            client,
            downloads: Mutex::new(HashMap::new()),
        })
    }

    /// Where `url` lands on disk. The file keeps whatever name the URL ends
    /// with, so two URLs sharing a trailing segment share one cache entry;
    /// the server names pictures uniquely, which keeps that harmless.
    pub fn local_path(&self, url: &str) -> PathBuf {
        let name = url.rsplit('/').next().unwrap_or(url);
        self.dir.join(name)
    }

    /// Fetch `url` into the cache and return the local path. Blocks until the
    /// picture is available or the download has given up, so callers run it
    /// on a worker thread.
    pub fn fetch(&self, url: &str) -> Result<PathBuf, FetchError> {
        let path = self.local_path(url);
        match self.claim(&path) {
            Claim::Waiter(gate) => {
                debug!("waiting for in-flight download of {url}");
                wait_done(&gate);
                if path.exists() {
                    Ok(path)
                } else {
                    Err(FetchError::NoPicture)
                }
            }
            Claim::Owner(gate) => {
                let result = self.download(url, &path);
                self.release(&path, &gate);
                result.map(|_| path)
            }
        }
    }

    // Look up the gate for `path`, inserting one if this caller gets to own
    // the download. The table lock covers lookup and insert only.
    fn claim(&self, path: &Path) -> Claim {
        let mut downloads = self.downloads.lock().unwrap();
        if let Some(gate) = downloads.get(path) {
            Claim::Waiter(Arc::clone(gate))
        } else {
            let gate = Arc::new(Download {
                done: Mutex::new(false),
                cond: Condvar::new(),
            });
            downloads.insert(path.to_path_buf(), Arc::clone(&gate));
            Claim::Owner(gate)
        }
    }

    // Drop the table entry, then wake everyone parked on the gate. Runs only
    // after the file is in its final state: fully written or removed.
    fn release(&self, path: &Path, gate: &Download) {
        self.downloads.lock().unwrap().remove(path);
        let mut done = gate.done.lock().unwrap();
        *done = true;
        gate.cond.notify_all();
    }

    fn download(&self, url: &str, path: &Path) -> Result<(), FetchError> {
        if path.exists() {
            return Ok(());
        }
        let mut last_err = String::new();
        for attempt in 1..=PICTURE_MAX_RETRIES {
            match self.try_download(url, path) {
                Ok(()) => {
                    debug!("downloaded {url} to {}", path.display());
                    return Ok(());
                }
                Err(e) => {
                    warn!("download attempt {attempt}/{PICTURE_MAX_RETRIES} failed: {e}");
                    last_err = e;
                }
            }
        }
        // Never leave a truncated file behind for a later run to mistake for
        // a cache hit.
        let _ = fs::remove_file(path);
        Err(FetchError::Download(last_err))
    }

    fn try_download(&self, url: &str, path: &Path) -> Result<(), String> {
        let mut file =
            fs::File::create(path).map_err(|e| format!("create {}: {e}", path.display()))?;
        let mut resp = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("GET {url}: {e}"))?;
        resp.copy_to(&mut file)
            .map_err(|e| format!("write {}: {e}", path.display()))?;
        Ok(())
    }
}

fn wait_done(gate: &Download) {
    let mut done = gate.done.lock().unwrap();
    while !*done {
        done = gate.cond.wait(done).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchError, PictureCache, PICTURE_MAX_RETRIES};
    use httpmock::prelude::*;
    use std::fs;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn local_path_takes_the_trailing_url_segment() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PictureCache::new(dir.path()).unwrap();
        let path = cache.local_path("http://host:8888/api/pictures/One%20Show.png");
        assert_eq!(path, dir.path().join("One%20Show.png"));
        // Different hosts, same file name: same entry, by design.
        let a = cache.local_path("http://a/x/poster.png");
        let b = cache.local_path("http://b/y/poster.png");
        assert_eq!(a, b);
    }

    #[test]
    fn concurrent_fetches_download_once() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/pictures/poster.png");
            then.status(200).body("poster-bytes");
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(PictureCache::new(dir.path()).unwrap());
        let url = server.url("/pictures/poster.png");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let url = url.clone();
            handles.push(thread::spawn(move || cache.fetch(&url)));
        }
        let expected = cache.local_path(&url);
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), expected);
        }
        assert_eq!(fs::read(&expected).unwrap(), b"poster-bytes");
        mock.assert();
    }

    #[test]
    fn gives_up_after_the_retry_ceiling() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/pictures/broken.png");
            then.status(500);
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = PictureCache::new(dir.path()).unwrap();
        let url = server.url("/pictures/broken.png");

        let err = cache.fetch(&url).unwrap_err();
        assert!(matches!(err, FetchError::Download(_)));
        assert_eq!(mock.hits(), PICTURE_MAX_RETRIES as usize);
        assert!(!cache.local_path(&url).exists());
    }

    #[test]
    fn existing_file_skips_the_network() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/pictures/cached.png");
            then.status(200).body("fresh");
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = PictureCache::new(dir.path()).unwrap();
        let url = server.url("/pictures/cached.png");
        fs::write(cache.local_path(&url), b"stale").unwrap();

        let path = cache.fetch(&url).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"stale");
        assert_eq!(mock.hits(), 0);
    }

    #[test]
    fn waiters_share_the_owners_failure() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/pictures/gone.png");
            then.status(404).delay(Duration::from_millis(100));
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(PictureCache::new(dir.path()).unwrap());
        let url = server.url("/pictures/gone.png");
        let barrier = Arc::new(Barrier::new(3));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let cache = Arc::clone(&cache);
            let url = url.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                cache.fetch(&url)
            }));
        }
        let mut downloads = 0;
        let mut no_picture = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Err(FetchError::Download(_)) => downloads += 1,
                Err(FetchError::NoPicture) => no_picture += 1,
                Ok(path) => panic!("unexpected success: {}", path.display()),
            }
        }
        // One owner burned through its attempts, the other two just waited.
        assert_eq!(downloads, 1);
        assert_eq!(no_picture, 2);
        assert_eq!(mock.hits(), PICTURE_MAX_RETRIES as usize);
        assert!(!cache.local_path(&url).exists());
    }
}
