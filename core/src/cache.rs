use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, info};

use crate::error::DatasetError;

/// Source of remote dataset bytes.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, DatasetError>;
}

/// Blocking HTTP fetcher with a hard timeout on every request.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, DatasetError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DatasetError::ResourceUnavailable {
                url: String::from("<client>"),
                source: Box::new(err),
            })?;

        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, DatasetError> {
        let unavailable = |err: reqwest::Error| DatasetError::ResourceUnavailable {
            url: url.to_string(),
            source: Box::new(err),
        };

        let response = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(unavailable)?;

        let bytes = response.bytes().map_err(unavailable)?;
        Ok(bytes.to_vec())
    }
}

/// A remote resource mirrored by a local file.
#[derive(Clone, Debug)]
pub struct Resource {
    pub url: String,
    pub path: PathBuf,
}

impl Resource {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
        }
    }

    pub fn load(&self, fetcher: &dyn Fetcher) -> Result<Vec<u8>, DatasetError> {
        load_or_fetch(&self.path, &self.url, fetcher)
    }
}

/// Return the bytes at `path`, downloading them from `url` first if the file is missing.
///
/// Presence of the file is the only cache signal: its content is never
/// checked. A fresh download is fully written to disk before this returns.
pub fn load_or_fetch(path: &Path, url: &str, fetcher: &dyn Fetcher) -> Result<Vec<u8>, DatasetError> {
    if path.exists() {
        let bytes = fs::read(path).map_err(|err| DatasetError::io(path, err))?;
        debug!("cache hit for {} ({} bytes)", path.display(), bytes.len());
        return Ok(bytes);
    }

    info!("{} not cached, fetching {}", path.display(), url);
    let bytes = fetcher.fetch(url)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| DatasetError::io(parent, err))?;
    }
    fs::write(path, &bytes).map_err(|err| DatasetError::io(path, err))?;
    info!("cached {} bytes at {}", bytes.len(), path.display());

    Ok(bytes)
}

/// The sprite sheet and label blob, each cached on disk.
#[derive(Clone, Debug)]
pub struct DatasetCache {
    pub images: Resource,
    pub labels: Resource,
}

impl DatasetCache {
    pub fn new(images: Resource, labels: Resource) -> Self {
        Self { images, labels }
    }

    pub fn load_images(&self, fetcher: &dyn Fetcher) -> Result<Vec<u8>, DatasetError> {
        self.images.load(fetcher)
    }

    pub fn load_labels(&self, fetcher: &dyn Fetcher) -> Result<Vec<u8>, DatasetError> {
        self.labels.load(fetcher)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        cell::RefCell,
        collections::HashMap,
        io::{self, Read, Write},
        net::TcpListener,
        thread,
    };

    use super::*;

    /// Serves canned bodies and records every URL requested.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub bodies: HashMap<String, Vec<u8>>,
        pub calls: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn with(url: &str, body: Vec<u8>) -> Self {
            let mut fetcher = Self::default();
            fetcher.bodies.insert(url.to_string(), body);
            fetcher
        }

        pub fn serve(mut self, url: &str, body: Vec<u8>) -> Self {
            self.bodies.insert(url.to_string(), body);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, DatasetError> {
            self.calls.borrow_mut().push(url.to_string());
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| DatasetError::ResourceUnavailable {
                    url: url.to_string(),
                    source: Box::new(io::Error::new(io::ErrorKind::NotFound, "no such body")),
                })
        }
    }

    #[test]
    fn cache_hit_never_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.bin");
        fs::write(&path, [1u8, 0, 0, 1]).unwrap();

        let fetcher = FakeFetcher::with("http://labels", vec![9, 9, 9, 9]);
        let bytes = load_or_fetch(&path, "http://labels", &fetcher).unwrap();

        assert_eq!(bytes, vec![1, 0, 0, 1]);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[test]
    fn cache_miss_fetches_and_persists_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("images.png");
        let body = vec![0x89, b'P', b'N', b'G', 0, 255];

        let fetcher = FakeFetcher::with("http://images", body.clone());
        let bytes = load_or_fetch(&path, "http://images", &fetcher).unwrap();

        assert_eq!(bytes, body);
        assert_eq!(fs::read(&path).unwrap(), body);
        assert_eq!(fetcher.call_count(), 1);

        // the second load is served from disk
        let again = load_or_fetch(&path, "http://images", &fetcher).unwrap();
        assert_eq!(again, body);
        assert_eq!(fetcher.call_count(), 1);
    }

    #[test]
    fn fetch_failure_leaves_no_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.bin");

        let fetcher = FakeFetcher::default();
        let err = load_or_fetch(&path, "http://missing", &fetcher).unwrap_err();

        assert!(err.is_unavailable());
        assert!(!path.exists());
    }

    #[test]
    fn dataset_cache_loads_both_resources() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DatasetCache::new(
            Resource::new("http://images", dir.path().join("images.png")),
            Resource::new("http://labels", dir.path().join("labels.bin")),
        );
        let fetcher = FakeFetcher::with("http://images", vec![1, 2, 3]).serve("http://labels", vec![4]);

        assert_eq!(cache.load_images(&fetcher).unwrap(), vec![1, 2, 3]);
        assert_eq!(cache.load_labels(&fetcher).unwrap(), vec![4]);
        assert_eq!(
            *fetcher.calls.borrow(),
            vec!["http://images".to_string(), "http://labels".to_string()]
        );
    }

    /// Accept one connection on a local port, read the request head and answer with `response`.
    fn serve_once(response: &'static [u8], stall: Option<Duration>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 512];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => return,
                    Ok(n) => head.extend_from_slice(&buf[..n]),
                }
            }
            if let Some(stall) = stall {
                thread::sleep(stall);
            }
            let _ = stream.write_all(response);
        });

        format!("http://{addr}/mnist_labels_uint8")
    }

    #[test]
    fn http_fetcher_returns_body() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\n\x01\x00\x00\x01",
            None,
        );
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

        assert_eq!(fetcher.fetch(&url).unwrap(), vec![1, 0, 0, 1]);
    }

    #[test]
    fn http_error_status_is_unavailable_and_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.bin");
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            None,
        );
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();

        let err = load_or_fetch(&path, &url, &fetcher).unwrap_err();

        match &err {
            DatasetError::ResourceUnavailable { url: failed, source } => {
                assert_eq!(failed, &url);
                let status = source
                    .downcast_ref::<reqwest::Error>()
                    .and_then(reqwest::Error::status)
                    .map(|status| status.as_u16());
                assert_eq!(status, Some(404));
            }
            other => panic!("expected ResourceUnavailable, got {other:?}"),
        }
        assert!(!path.exists());
    }

    #[test]
    fn http_fetch_times_out() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            Some(Duration::from_secs(3)),
        );
        let fetcher = HttpFetcher::new(Duration::from_millis(200)).unwrap();

        let err = fetcher.fetch(&url).unwrap_err();
        assert!(err.is_unavailable());
    }
}
