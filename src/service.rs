use std::{convert::Infallible, future::Future, pin::Pin, sync::Arc};

use http::{Method, Request, Response};
use hyper::service::Service;
use tracing::debug;

use crate::{
    config::ServerConfig,
    error::ServeError,
    listing::serve_directory,
    resolve::{resolve, ResolveResult, ResolvedFile},
    speedtest::serve_speed_test,
    util::{Body, FileResponseBuilder, LogSink, ReportSink},
};

/// Path of the throughput test endpoint.
pub const SPEED_TEST_PATH: &str = "/speedtest";

/// Future returned by `DirServe::serve`.
pub type ServeFuture = Pin<Box<dyn Future<Output = Response<Body>> + Send>>;

/// High-level interface for serving a directory tree.
///
/// Requests for `/speedtest` run a speed test. Every other path is mapped onto the serving
/// root: directories get a listing, files are streamed. Only `GET` and `HEAD` are handled.
///
/// Cloning is cheap; all clones share the same configuration and report sink. This struct also
/// implements the `hyper::service::Service` trait, which simply wraps `DirServe::serve`.
#[derive(Clone)]
pub struct DirServe {
    /// Settings shared by every request.
    pub config: Arc<ServerConfig>,
    /// Where completed transfers are reported.
    pub report_sink: Arc<dyn ReportSink>,
}

impl DirServe {
    /// Create a new instance serving according to `config`, reporting to the log.
    pub fn new(config: ServerConfig) -> Self {
        DirServe {
            config: Arc::new(config),
            report_sink: Arc::new(LogSink),
        }
    }

    /// Report completed transfers to the given sink instead of the log.
    pub fn report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.report_sink = sink;
        self
    }

    /// Serve a request.
    ///
    /// The request body is dropped right away; nothing served here reads it.
    pub fn serve<B>(&self, request: Request<B>) -> ServeFuture {
        let (parts, _) = request.into_parts();
        let request = Request::from_parts(parts, ());
        let this = self.clone();
        Box::pin(async move {
            let response = match this.route(&request).await {
                Ok(response) => response,
                Err(err) => err.into_response(),
            };
            debug!(
                method = %request.method(),
                path = request.uri().path(),
                status = response.status().as_u16(),
                "served request"
            );
            response
        })
    }

    async fn route(&self, request: &Request<()>) -> Result<Response<Body>, ServeError> {
        let is_head = match *request.method() {
            Method::GET => false,
            Method::HEAD => true,
            _ => return Err(ServeError::MethodNotAllowed),
        };

        let path = request.uri().path();
        if path == SPEED_TEST_PATH {
            return serve_speed_test(
                &self.config,
                request.uri().query(),
                is_head,
                &self.report_sink,
            )
            .await;
        }

        match resolve(&self.config.root, path).await {
            ResolveResult::NotFound => Err(ServeError::NotFound("404 page not found".into())),
            ResolveResult::Directory(resolved) => serve_directory(&resolved, is_head).await,
            ResolveResult::File(resolved) => {
                let file = ResolvedFile::open(resolved.full_path)
                    .await
                    .map_err(|_| ServeError::Internal("cannot open file".into()))?;
                FileResponseBuilder::from_request(request)
                    .report_sink(Some(self.report_sink.clone()))
                    .build(file)
            }
        }
    }
}

impl<B> Service<Request<B>> for DirServe {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Infallible>> + Send>>;

    fn call(&self, request: Request<B>) -> Self::Future {
        let response = self.serve(request);
        Box::pin(async move { Ok(response.await) })
    }
}
