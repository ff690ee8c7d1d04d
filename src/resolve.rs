use std::{
    io::{Error as IoError, ErrorKind as IoErrorKind},
    path::{Path, PathBuf},
    time::SystemTime,
};

use mime_guess::MimeGuess;
use tokio::{
    fs::{self, File},
    task::spawn_blocking,
};

use crate::util::RequestedPath;

/// A request path mapped onto the serving root.
///
/// The mapping is purely lexical: `.` and empty segments are dropped, `..` pops the previous
/// segment but never climbs above the root. Constructing a `ResolvedPath` never touches the
/// filesystem and never fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Filesystem path, always located inside the serving root.
    pub full_path: PathBuf,
    /// The cleaned path, relative to the serving root.
    pub sanitized: PathBuf,
}

impl ResolvedPath {
    /// Resolve a raw (percent-encoded) URL path against `root`.
    pub fn new(root: impl AsRef<Path>, request_path: &str) -> Self {
        Self::from_requested(root, RequestedPath::resolve(request_path))
    }

    /// Resolve an already decoded path, such as a query parameter value, against `root`.
    pub fn from_decoded(root: impl AsRef<Path>, path: &str) -> Self {
        Self::from_requested(root, RequestedPath::resolve_decoded(path))
    }

    fn from_requested(root: impl AsRef<Path>, requested: RequestedPath) -> Self {
        let mut full_path = root.as_ref().to_path_buf();
        full_path.extend(&requested.sanitized);
        ResolvedPath {
            full_path,
            sanitized: requested.sanitized,
        }
    }

    /// The cleaned path as clients see it: `/`-separated, with a leading slash.
    ///
    /// The serving root itself is `/`.
    pub fn request_path(&self) -> String {
        let mut out = String::new();
        for component in self.sanitized.components() {
            out.push('/');
            out.push_str(&component.as_os_str().to_string_lossy());
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }
}

/// The result of `resolve`.
#[derive(Debug)]
pub enum ResolveResult {
    /// Nothing exists at the resolved path.
    NotFound,
    /// The resolved path is a directory.
    Directory(ResolvedPath),
    /// The resolved path is something other than a directory.
    File(ResolvedPath),
}

/// Resolve the request path against the root and look at what's there.
///
/// Any failure to stat the resolved path is reported as `NotFound`.
pub async fn resolve(root: impl AsRef<Path>, request_path: &str) -> ResolveResult {
    let resolved = ResolvedPath::new(root, request_path);
    match fs::metadata(&resolved.full_path).await {
        Ok(metadata) if metadata.is_dir() => ResolveResult::Directory(resolved),
        Ok(_) => ResolveResult::File(resolved),
        Err(_) => ResolveResult::NotFound,
    }
}

/// Open file handle with the metadata needed to serve it.
#[derive(Debug)]
pub struct ResolvedFile<F = File> {
    /// Open file handle.
    pub handle: F,
    /// Path the handle was opened from.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: Option<SystemTime>,
    /// Content type guessed from the file extension.
    pub content_type: String,
}

impl<F> ResolvedFile<F> {
    /// The final component of the path, for operator-facing output.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl ResolvedFile<File> {
    /// Open the file at `path` and collect its metadata.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, IoError> {
        let path = path.into();

        // Open + metadata in a single blocking task, rather than two through `tokio::fs`.
        let task = spawn_blocking(move || -> Result<Self, IoError> {
            let handle = std::fs::File::open(&path)?;
            let metadata = handle.metadata()?;
            let content_type = MimeGuess::from_path(&path)
                .first_or_octet_stream()
                .to_string();
            Ok(ResolvedFile {
                handle: File::from_std(handle),
                size: metadata.len(),
                modified: metadata.modified().ok(),
                content_type,
                path,
            })
        });

        match task.await {
            Ok(res) => res,
            Err(_) => Err(IoError::new(IoErrorKind::Other, "background task failed")),
        }
    }
}
