use std::{io::Error as IoError, path::PathBuf};

use http::{header, HeaderValue, Response, StatusCode};
use thiserror::Error;

use crate::util::Body;

/// Errors that end a request with an error status instead of content.
///
/// Every variant is answered with a short plaintext body. None of them are fatal to the server.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The path, directory entry or media file does not exist.
    #[error("{0}")]
    NotFound(String),
    /// A filesystem object exists but could not be opened or enumerated.
    #[error("{0}")]
    Internal(String),
    /// The requested byte range lies outside a file of the given size.
    #[error("requested range not satisfiable")]
    RangeNotSatisfiable {
        /// Size of the file, sent back in `Content-Range`.
        size: u64,
    },
    /// Only `GET` and `HEAD` are served.
    #[error("method not allowed")]
    MethodNotAllowed,
    /// A response could not be assembled.
    #[error("failed to build response: {0}")]
    Http(#[from] http::Error),
}

impl ServeError {
    /// The status code this error is answered with.
    pub fn status(&self) -> StatusCode {
        match *self {
            ServeError::NotFound(_) => StatusCode::NOT_FOUND,
            ServeError::Internal(_) | ServeError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServeError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ServeError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Build the plaintext error response.
    pub fn into_response<F>(self) -> Response<Body<F>> {
        let status = self.status();
        let mut res = Response::new(Body::from_bytes(format!("{}\n", self)));
        *res.status_mut() = status;

        let headers = res.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        match self {
            ServeError::RangeNotSatisfiable { size } => {
                if let Ok(value) = HeaderValue::try_from(format!("bytes */{}", size)) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
            }
            ServeError::MethodNotAllowed => {
                headers.insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            }
            _ => {}
        }
        res
    }
}

/// Errors in the startup configuration. These terminate the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The serving root could not be inspected.
    #[error("invalid dir {}: {source}", path.display())]
    InvalidRoot {
        /// The configured root.
        path: PathBuf,
        /// Why it could not be inspected.
        #[source]
        source: IoError,
    },
    /// The serving root exists but is not a directory.
    #[error("invalid dir {}: not a directory", .0.display())]
    NotADirectory(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tokio::fs::File;

    async fn text(res: Response<Body<File>>) -> String {
        let body = res.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn internal_error_is_plaintext_500() {
        let res = ServeError::Internal("cannot open file".into()).into_response::<File>();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            res.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );
        assert_eq!(text(res).await, "cannot open file\n");
    }

    #[tokio::test]
    async fn range_and_method_errors_carry_their_headers() {
        let res = ServeError::RangeNotSatisfiable { size: 500 }.into_response::<File>();
        assert_eq!(res.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(res.headers().get(header::CONTENT_RANGE).unwrap(), "bytes */500");

        let res = ServeError::MethodNotAllowed.into_response::<File>();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers().get(header::ALLOW).unwrap(), "GET, HEAD");
        assert_eq!(text(res).await, "method not allowed\n");
    }
}
