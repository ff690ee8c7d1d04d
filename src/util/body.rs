use std::{
    io::Error as IoError,
    pin::Pin,
    task::{ready, Context, Poll},
};

use futures_util::stream::Stream;
use hyper::body::{Bytes, Frame, SizeHint};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncSeek},
};

use crate::util::{FileBytesStream, FileBytesStreamRange};

/// Hyper Body implementation for every response this crate produces.
pub enum Body<F = File> {
    /// No response body.
    Empty,
    /// A small in-memory body, such as a directory listing or an error message.
    Bytes(Option<Bytes>),
    /// Stream a file from its current position, up to a limit.
    File(FileBytesStream<F>),
    /// Serve a range from a file.
    Range(FileBytesStreamRange<F>),
}

impl<F> Body<F> {
    /// Create an in-memory body.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Body::Bytes(Some(data.into()))
    }
}

impl<F> hyper::body::Body for Body<F>
where
    F: AsyncRead + AsyncSeek + Unpin,
{
    type Data = Bytes;
    type Error = IoError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, IoError>>> {
        let opt = ready!(match *self {
            Body::Empty => return Poll::Ready(None),
            Body::Bytes(ref mut data) => {
                return Poll::Ready(data.take().map(|d| Ok(Frame::data(d))));
            }
            Body::File(ref mut stream) => Pin::new(stream).poll_next(cx),
            Body::Range(ref mut stream) => Pin::new(stream).poll_next(cx),
        });
        Poll::Ready(opt.map(|res| res.map(Frame::data)))
    }

    fn is_end_stream(&self) -> bool {
        matches!(*self, Body::Empty | Body::Bytes(None))
    }

    fn size_hint(&self) -> SizeHint {
        match *self {
            Body::Empty | Body::Bytes(None) => SizeHint::with_exact(0),
            Body::Bytes(Some(ref data)) => SizeHint::with_exact(data.len() as u64),
            _ => SizeHint::default(),
        }
    }
}
