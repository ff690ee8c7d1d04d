//! The `/speedtest` endpoint.
//!
//! A run streams at most `ServerConfig::speed_test_bytes` bytes of a media file. The declared
//! `Content-Length` is the number of bytes that will actually be sent, i.e. the budget or the
//! file size, whichever is smaller. Throughput is reported to the operator as a JSON line once
//! the stream ends, including runs cut short by the client.

use std::{
    cmp::min,
    collections::HashSet,
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::Arc,
};

use http::{header, Response};
use tokio::{
    fs::{self, File},
    task::spawn_blocking,
};
use tracing::{debug, warn};

use crate::{
    config::ServerConfig,
    error::ServeError,
    resolve::ResolvedPath,
    util::{Body, FileBytesStream, ReportSink, TransferKind, TransferMeter},
};

/// Extensions picked up by the default source scan, compared case-insensitively.
pub const MEDIA_EXTENSIONS: [&str; 5] = ["mkv", "mp4", "ts", "m2ts", "iso"];

/// Upper bound on directories visited while scanning for a default source.
pub const MAX_SCANNED_DIRS: usize = 65_536;

/// Whether `path` has one of the `MEDIA_EXTENSIONS`.
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| MEDIA_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)))
        .unwrap_or(false)
}

/// Find the first media file under `root` in depth-first, name-sorted order.
///
/// Symlinks are followed. Each directory is entered at most once, keyed by its canonical path,
/// and the scan gives up after `MAX_SCANNED_DIRS` directories.
pub fn find_media_file(root: &Path) -> Option<PathBuf> {
    let mut pending = vec![root.to_path_buf()];
    let mut visited = HashSet::new();

    while let Some(path) = pending.pop() {
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };

        if !metadata.is_dir() {
            if metadata.is_file() && is_media_file(&path) {
                return Some(path);
            }
            continue;
        }

        let real = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if !visited.insert(real) {
            continue;
        }
        if visited.len() > MAX_SCANNED_DIRS {
            warn!(
                "media scan of {} stopped after {} directories",
                root.display(),
                MAX_SCANNED_DIRS
            );
            return None;
        }

        let mut children: Vec<PathBuf> = match std::fs::read_dir(&path) {
            Ok(iter) => iter.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(_) => continue,
        };
        children.sort();

        // Reversed so the smallest name is popped first.
        pending.extend(children.into_iter().rev());
    }
    None
}

/// Extract the `file` parameter from a query string. Empty values count as absent.
pub fn file_param(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "file")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Pick the source file for a run.
///
/// A requested path is used when it exists inside `root` and is not a directory. Otherwise the
/// root is scanned for a media file.
pub async fn select_source(root: &Path, requested: Option<&str>) -> Option<PathBuf> {
    if let Some(requested) = requested {
        let candidate = ResolvedPath::from_decoded(root, requested).full_path;
        match fs::metadata(&candidate).await {
            Ok(metadata) if !metadata.is_dir() => return Some(candidate),
            _ => debug!("speed test source {} unusable, scanning", candidate.display()),
        }
    }

    let root = root.to_path_buf();
    spawn_blocking(move || find_media_file(&root))
        .await
        .ok()
        .flatten()
}

/// Serve one speed test run.
pub async fn serve_speed_test(
    config: &ServerConfig,
    query: Option<&str>,
    is_head: bool,
    sink: &Arc<dyn ReportSink>,
) -> Result<Response<Body>, ServeError> {
    let requested = query.and_then(file_param);
    let source = select_source(&config.root, requested.as_deref())
        .await
        .ok_or_else(|| ServeError::NotFound("no media file found for speedtest".into()))?;

    let file = File::open(&source)
        .await
        .map_err(|_| ServeError::Internal("cannot open file".into()))?;
    let size = file
        .metadata()
        .await
        .map_err(|_| ServeError::Internal("cannot open file".into()))?
        .len();
    let length = min(config.speed_test_bytes, size);

    let res = Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, length);
    if is_head {
        return Ok(res.body(Body::Empty)?);
    }

    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let meter = TransferMeter::new(TransferKind::SpeedTest, name, sink.clone());
    let stream = FileBytesStream::new_with_limit(file, length).with_meter(meter);
    Ok(res.body(Body::File(stream))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn touch(dir: &Path, subpath: &str) {
        let path = dir.join(subpath);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"media").unwrap();
    }

    #[test]
    fn matches_media_extensions_case_insensitively() {
        assert!(is_media_file(Path::new("a/b.mkv")));
        assert!(is_media_file(Path::new("a/b.M2TS")));
        assert!(is_media_file(Path::new("disc.Iso")));
        assert!(!is_media_file(Path::new("a/b.txt")));
        assert!(!is_media_file(Path::new("mkv")));
    }

    #[test]
    fn reads_file_param() {
        assert_eq!(file_param("file=a%20b.mkv"), Some("a b.mkv".into()));
        assert_eq!(file_param("x=1&file=c.ts&file=d.ts"), Some("c.ts".into()));
        assert_eq!(file_param("file="), None);
        assert_eq!(file_param("other=1"), None);
    }

    #[test]
    fn scans_depth_first_in_name_order() {
        let dir = TempDir::new("dirserve-scan").unwrap();
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "b/movie.mp4");
        touch(dir.path(), "a/deeper/clip.ts");
        touch(dir.path(), "c.mkv");

        let found = find_media_file(dir.path()).unwrap();
        assert_eq!(found, dir.path().join("a/deeper/clip.ts"));
    }

    #[test]
    fn scan_finds_nothing_without_media() {
        let dir = TempDir::new("dirserve-scan").unwrap();
        touch(dir.path(), "a/readme.md");
        assert_eq!(find_media_file(dir.path()), None);
    }

    #[cfg(unix)]
    #[test]
    fn scan_survives_symlink_cycles() {
        let dir = TempDir::new("dirserve-scan").unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("a/loop")).unwrap();
        assert_eq!(find_media_file(dir.path()), None);

        touch(dir.path(), "z/found.iso");
        assert_eq!(
            find_media_file(dir.path()),
            Some(dir.path().join("z/found.iso"))
        );
    }
}
