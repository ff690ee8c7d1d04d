use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use http::{
    header, response::Builder as ResponseBuilder, HeaderMap, Method, Request, Response,
    StatusCode,
};
use http_range::HttpRange;

use crate::{
    error::ServeError,
    resolve::ResolvedFile,
    util::{
        Body, FileBytesStream, FileBytesStreamRange, ReportSink, TransferKind, TransferMeter,
    },
};

/// Utility to build responses for serving a `ResolvedFile`.
///
/// Without a `Range` request header the whole file is streamed and, when a report sink is set,
/// the transfer is reported once the body completes. With a `Range` header a single byte range
/// is served, subject to `If-Range` and `If-Modified-Since`. Ranged responses are never
/// reported.
///
/// This struct allows direct access to its fields, but these fields are typically initialized by
/// the accessors, using the builder pattern.
#[derive(Clone, Default)]
pub struct FileResponseBuilder {
    /// Whether this is a `HEAD` request, with no response body.
    pub is_head: bool,
    /// The raw value of the `Range` request header.
    pub range: Option<String>,
    /// The raw value of the `If-Range` request header.
    pub if_range: Option<String>,
    /// The parsed value of the `If-Modified-Since` request header.
    pub if_modified_since: Option<SystemTime>,
    /// Where completed full-file transfers are reported.
    pub report_sink: Option<Arc<dyn ReportSink>>,
}

impl FileResponseBuilder {
    /// Create a new builder with a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder for the given request.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let mut builder = Self::new();
        builder.method(req.method()).request_headers(req.headers());
        builder
    }

    /// Build responses for the given request method.
    pub fn method(&mut self, value: &Method) -> &mut Self {
        self.is_head = *value == Method::HEAD;
        self
    }

    /// Build responses for the given request headers.
    pub fn request_headers(&mut self, headers: &HeaderMap) -> &mut Self {
        let text = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        self.range = text(header::RANGE);
        self.if_range = text(header::IF_RANGE);
        self.if_modified_since = text(header::IF_MODIFIED_SINCE)
            .and_then(|v| httpdate::parse_http_date(&v).ok());
        self
    }

    /// Report completed full-file transfers to the given sink.
    pub fn report_sink(&mut self, value: Option<Arc<dyn ReportSink>>) -> &mut Self {
        self.report_sink = value;
        self
    }

    /// Build a response for the given file.
    pub fn build<F>(&self, file: ResolvedFile<F>) -> Result<Response<Body<F>>, ServeError> {
        match self.range {
            Some(ref range) => self.build_ranged(file, range),
            None => self.build_full(file),
        }
    }

    fn build_full<F>(&self, file: ResolvedFile<F>) -> Result<Response<Body<F>>, ServeError> {
        let res = ResponseBuilder::new()
            .header(header::CONTENT_TYPE, file.content_type.as_str())
            .header(header::CONTENT_LENGTH, file.size)
            .header(header::ACCEPT_RANGES, "bytes");
        if self.is_head {
            return Ok(res.body(Body::Empty)?);
        }

        let name = file.name();
        let mut stream = FileBytesStream::new_with_limit(file.handle, file.size);
        if let Some(ref sink) = self.report_sink {
            stream = stream.with_meter(TransferMeter::new(
                TransferKind::Download,
                name,
                sink.clone(),
            ));
        }
        Ok(res.body(Body::File(stream))?)
    }

    fn build_ranged<F>(
        &self,
        file: ResolvedFile<F>,
        range: &str,
    ) -> Result<Response<Body<F>>, ServeError> {
        let mut res = ResponseBuilder::new()
            .header(header::CONTENT_TYPE, file.content_type.as_str())
            .header(header::ACCEPT_RANGES, "bytes");

        // Set `Last-Modified` and `ETag`, and check `If-Modified-Since`.
        let mut etag = None;
        let modified = file.modified.and_then(truncate_to_secs);
        if let (Some(exact), Some(modified)) = (file.modified, modified) {
            let tag = weak_etag(file.size, exact);
            res = res
                .header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified))
                .header(header::ETAG, tag.as_str());
            etag = Some(tag);

            // The `Last-Modified` we serve is truncated to seconds, so compare that.
            match self.if_modified_since {
                Some(since) if modified <= since => {
                    return Ok(res.status(StatusCode::NOT_MODIFIED).body(Body::Empty)?);
                }
                _ => {}
            }
        }

        // A stale `If-Range` means the client gets the whole current file.
        if !self.if_range_matches(modified, etag.as_deref()) {
            return self.full_body(res, file);
        }

        let ranges = match HttpRange::parse(range, file.size) {
            Ok(ranges) => ranges,
            Err(_) => return Err(ServeError::RangeNotSatisfiable { size: file.size }),
        };
        if ranges.len() != 1 {
            // Only single ranges are served. Anything else gets the full content.
            return self.full_body(res, file);
        }

        let range = ranges[0];
        let res = res
            .status(StatusCode::PARTIAL_CONTENT)
            .header(
                header::CONTENT_RANGE,
                format!(
                    "bytes {}-{}/{}",
                    range.start,
                    range.start + range.length - 1,
                    file.size
                ),
            )
            .header(header::CONTENT_LENGTH, range.length);
        Ok(res.body(if self.is_head {
            Body::Empty
        } else {
            Body::Range(FileBytesStreamRange::new(file.handle, range))
        })?)
    }

    fn full_body<F>(
        &self,
        res: ResponseBuilder,
        file: ResolvedFile<F>,
    ) -> Result<Response<Body<F>>, ServeError> {
        let res = res.header(header::CONTENT_LENGTH, file.size);
        Ok(res.body(if self.is_head {
            Body::Empty
        } else {
            Body::File(FileBytesStream::new_with_limit(file.handle, file.size))
        })?)
    }

    fn if_range_matches(&self, modified: Option<SystemTime>, etag: Option<&str>) -> bool {
        let value = match self.if_range {
            Some(ref value) => value.trim(),
            None => return true,
        };
        if value.starts_with('"') || value.starts_with("W/") {
            return etag == Some(value);
        }
        match (modified, httpdate::parse_http_date(value)) {
            (Some(modified), Ok(date)) => modified == date,
            _ => false,
        }
    }
}

fn truncate_to_secs(time: SystemTime) -> Option<SystemTime> {
    let since_epoch = time.duration_since(UNIX_EPOCH).ok()?;
    Some(UNIX_EPOCH + Duration::from_secs(since_epoch.as_secs()))
}

fn weak_etag(size: u64, modified: SystemTime) -> String {
    let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!(
        "W/\"{0:x}-{1:x}.{2:x}\"",
        size,
        since_epoch.as_secs(),
        since_epoch.subsec_nanos()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_encodes_size_and_mtime() {
        let modified = UNIX_EPOCH + Duration::new(0x1234, 0x10);
        assert_eq!(weak_etag(500, modified), "W/\"1f4-1234.10\"");
    }

    #[test]
    fn if_range_accepts_matching_validators() {
        let modified = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut builder = FileResponseBuilder::new();

        assert!(builder.if_range_matches(Some(modified), Some("W/\"1\"")));

        builder.if_range = Some("W/\"1\"".into());
        assert!(builder.if_range_matches(Some(modified), Some("W/\"1\"")));
        assert!(!builder.if_range_matches(Some(modified), Some("W/\"2\"")));

        builder.if_range = Some(httpdate::fmt_http_date(modified));
        assert!(builder.if_range_matches(Some(modified), None));
        assert!(!builder.if_range_matches(Some(modified + Duration::from_secs(1)), None));

        builder.if_range = Some("garbage".into());
        assert!(!builder.if_range_matches(Some(modified), None));
    }
}
