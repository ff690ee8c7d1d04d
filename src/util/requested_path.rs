use std::path::{Component, Path, PathBuf};

#[inline]
fn decode_percents(string: &str) -> String {
    percent_encoding::percent_decode_str(string)
        .decode_utf8_lossy()
        .into_owned()
}

fn normalize_path(path: &Path) -> PathBuf {
    path.components()
        .fold(PathBuf::new(), |mut result, p| match p {
            Component::Normal(x) => {
                // Parse again to prevent a malicious component containing
                // a Windows drive letter, e.g.: `/anypath/c:/windows/win.ini`
                if Path::new(&x)
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)))
                {
                    result.push(x);
                }
                result
            }
            Component::ParentDir => {
                result.pop();
                result
            }
            _ => result,
        })
}

/// Lexically cleaned request path.
pub struct RequestedPath {
    /// Sanitized path of the request, relative to the root.
    pub sanitized: PathBuf,
}

impl RequestedPath {
    /// Decode and clean a raw URL path.
    pub fn resolve(request_path: &str) -> Self {
        Self::resolve_decoded(&decode_percents(request_path))
    }

    /// Clean a path that is already decoded.
    pub fn resolve_decoded(path: &str) -> Self {
        RequestedPath {
            sanitized: normalize_path(Path::new(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_segments_never_climb_above_root() {
        assert_eq!(
            RequestedPath::resolve("/../../x").sanitized,
            PathBuf::from("x")
        );
        assert_eq!(
            RequestedPath::resolve("/a/..%2f..%2fb").sanitized,
            PathBuf::from("b")
        );
    }

    #[test]
    fn keeps_plain_segments() {
        assert_eq!(
            RequestedPath::resolve("/has%20space/file.txt").sanitized,
            PathBuf::from("has space/file.txt")
        );
    }
}
