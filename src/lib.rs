#![crate_name = "hyper_dirserve"]
#![deny(missing_docs)]

//! Directory browsing, file streaming and link speed tests over
//! [Hyper 1.0](https://github.com/hyperium/hyper).
//!
//! This library exports a high-level service, `DirServe`, which shares one directory tree over
//! HTTP, and the lower-level pieces it is built from.
//!
//! ## Basic usage
//!
//! `DirServe` holds an immutable `ServerConfig`, and a `serve` method to handle a request. It
//! also implements the `hyper::service::Service` trait, so it can be handed to a hyper
//! connection directly:
//!
//! ```rust
//! // Settings, built once at startup.
//! let config = hyper_dirserve::ServerConfig::new("my/share/").speed_test_bytes(10 << 20);
//! let service = hyper_dirserve::DirServe::new(config);
//!
//! // A dummy request, but normally obtained from Hyper.
//! let request = http::Request::get("/videos/").body(()).unwrap();
//!
//! // Serve the request. Returns a future for a `http::Response`.
//! let response_future = service.serve(request);
//! ```
//!
//! ## What gets served
//!
//! Request paths are percent-decoded, cleaned lexically and joined onto the serving root, so
//! no request can name anything outside of it. A directory answers with an HTML listing of
//! its immediate children. A file is streamed whole, or as a single byte range when the
//! request carries a `Range` header. Completed whole-file downloads are reported with their
//! throughput.
//!
//! `GET /speedtest` streams a bounded number of bytes from a media file, either the one named by
//! the `file` query parameter or the first one found under the root, and reports the measured
//! throughput as JSON.
//!
//! Reports go to a `ReportSink`. The default, `LogSink`, writes them through `tracing`.
//!
//! ## Advanced usage
//!
//! The pieces used by `DirServe` are public. `resolve` maps a request path onto the root,
//! `read_entries` and `render_listing` produce listings, and `FileResponseBuilder` builds the
//! response for an already opened `ResolvedFile`. Bodies are streamed through
//! `FileBytesStream`, which reads with a fixed 1 MiB buffer regardless of file size.

mod config;
mod error;
mod listing;
mod resolve;
mod service;
mod speedtest;
mod util;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::listing::{
    entry_href, human_size, read_entries, render_listing, serve_directory, DirectoryEntry,
};
pub use crate::resolve::*;
pub use crate::service::*;
pub use crate::speedtest::{
    file_param, find_media_file, is_media_file, select_source, serve_speed_test,
    MAX_SCANNED_DIRS, MEDIA_EXTENSIONS,
};
pub use crate::util::{
    Body, FileBytesStream, FileBytesStreamRange, FileResponseBuilder, LogSink, ReportSink,
    TransferKind, TransferMeter, TransferReport, BUF_SIZE,
};
