//! Resolving resource references into readable streams

use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// How an audio file is read from storage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoStrategy {
    /// Whatever the loader is configured to use
    #[default]
    Default,
    /// Read incrementally through a buffered file handle
    Stream,
    /// Read the whole file into memory up front
    Buffer,
}

/// Opens the streams that elements refer to by URI
pub trait Loader {
    fn open_stream(&self, uri: &str) -> io::Result<Box<dyn ReadSeek>>;

    /// Open an audio file with a read strategy. With `enable_file_caching`
    /// the file contents may be kept and shared between later opens.
    fn open_audio_stream(
        &self,
        uri: &str,
        _strategy: IoStrategy,
        _enable_file_caching: bool,
    ) -> io::Result<Box<dyn ReadSeek>> {
        self.open_stream(uri)
    }
}

/// Loads from the file system, relative to an optional root
///
/// Files opened with file caching are read into memory once and every later
/// cached open of the same path shares those bytes.
#[derive(Clone, Debug, Default)]
pub struct FileLoader {
    root: Option<PathBuf>,
    default_io: IoStrategy,
    files: Arc<Mutex<HashMap<PathBuf, Arc<[u8]>>>>,
}

impl FileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Strategy used for [`IoStrategy::Default`]. Stream unless set.
    pub fn with_default_io(mut self, strategy: IoStrategy) -> Self {
        self.default_io = strategy;
        self
    }

    /// Number of files held in the file cache
    pub fn cached_files(&self) -> usize {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear_file_cache(&self) {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn resolve(&self, uri: &str) -> PathBuf {
        let path = uri.strip_prefix("fs://").unwrap_or(uri);
        match &self.root {
            Some(root) => root.join(path),
            None => PathBuf::from(path),
        }
    }
}

impl Loader for FileLoader {
    fn open_stream(&self, uri: &str) -> io::Result<Box<dyn ReadSeek>> {
        let path = self.resolve(uri);
        debug!(path = %path.display(), "opening audio stream");
        let file = File::open(path)?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn open_audio_stream(
        &self,
        uri: &str,
        strategy: IoStrategy,
        enable_file_caching: bool,
    ) -> io::Result<Box<dyn ReadSeek>> {
        let path = self.resolve(uri);
        if enable_file_caching {
            let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(bytes) = files.get(&path) {
                debug!(path = %path.display(), "using cached audio file");
                return Ok(Box::new(Cursor::new(bytes.clone())));
            }
        }

        let strategy = match strategy {
            IoStrategy::Default => self.default_io,
            other => other,
        };
        // a stream has a read position and cannot be shared
        if strategy == IoStrategy::Buffer || enable_file_caching {
            debug!(path = %path.display(), "reading audio file into memory");
            let bytes: Arc<[u8]> = fs::read(&path)?.into();
            if enable_file_caching {
                self.files
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(path, bytes.clone());
            }
            return Ok(Box::new(Cursor::new(bytes)));
        }
        self.open_stream(uri)
    }
}

/// Serves named in-memory blobs
#[derive(Clone, Debug, Default)]
pub struct MemoryLoader {
    blobs: HashMap<String, Arc<[u8]>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.blobs.insert(uri.into(), bytes.into());
    }

    pub fn with_blob(mut self, uri: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.insert(uri, bytes);
        self
    }
}

impl Loader for MemoryLoader {
    fn open_stream(&self, uri: &str) -> io::Result<Box<dyn ReadSeek>> {
        match self.blobs.get(uri) {
            Some(blob) => Ok(Box::new(Cursor::new(blob.clone()))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no blob named '{}'", uri),
            )),
        }
    }
}
