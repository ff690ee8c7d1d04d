use std::{
    cmp::min,
    io::{Error as IoError, SeekFrom},
    pin::Pin,
    task::{Context, Poll},
};

use futures_util::stream::Stream;
use http_range::HttpRange;
use hyper::body::Bytes;
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncSeek, ReadBuf},
};

use crate::util::TransferMeter;

/// Read size for file streams. Bounds memory per stream regardless of file size.
pub const BUF_SIZE: usize = 1024 * 1024;

/// Wraps an `AsyncRead`, like a tokio `File`, and implements a stream of `Bytes`s.
///
/// An attached `TransferMeter` is finished once the stream ends, either at EOF or as soon as the
/// limit is reached. Hyper stops polling once `Content-Length` bytes are written, so the limit
/// must not wait for another poll. A stream dropped before that point only reports if the meter
/// asks for it.
pub struct FileBytesStream<F = File> {
    file: F,
    buf: Box<[u8]>,
    remaining: u64,
    sent: u64,
    meter: Option<TransferMeter>,
}

impl<F> FileBytesStream<F> {
    /// Create a new stream from the given file, reading up to `limit` bytes.
    pub fn new_with_limit(file: F, limit: u64) -> Self {
        Self {
            file,
            buf: vec![0; BUF_SIZE].into_boxed_slice(),
            remaining: limit,
            sent: 0,
            meter: None,
        }
    }

    /// Report the transfer through `meter` when the stream ends.
    pub fn with_meter(mut self, meter: TransferMeter) -> Self {
        self.meter = Some(meter);
        self
    }

    fn complete(&mut self) {
        if let Some(meter) = self.meter.take() {
            meter.finish(self.sent);
        }
    }
}

impl<F> Stream for FileBytesStream<F>
where
    F: AsyncRead + Unpin,
{
    type Item = Result<Bytes, IoError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.remaining == 0 {
            this.complete();
            return Poll::Ready(None);
        }

        let max_read_length = min(this.remaining, this.buf.len() as u64) as usize;
        let mut read_buf = ReadBuf::new(&mut this.buf[..max_read_length]);
        match Pin::new(&mut this.file).poll_read(cx, &mut read_buf) {
            Poll::Ready(Ok(())) => {
                let filled = read_buf.filled();
                if filled.is_empty() {
                    this.complete();
                    return Poll::Ready(None);
                }
                let chunk = Bytes::copy_from_slice(filled);
                this.remaining -= chunk.len() as u64;
                this.sent += chunk.len() as u64;
                if this.remaining == 0 {
                    this.complete();
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F> Drop for FileBytesStream<F> {
    fn drop(&mut self) {
        if let Some(meter) = self.meter.take() {
            // An empty limit is complete without ever being polled.
            if self.remaining == 0 || meter.reports_on_abort() {
                meter.finish(self.sent);
            }
        }
    }
}

#[derive(PartialEq, Eq)]
enum FileSeekState {
    NeedSeek,
    Seeking,
    Reading,
}

/// Wraps an `AsyncRead + AsyncSeek`, like a tokio `File`, and implements a stream of `Bytes`s
/// reading a portion of the file given by `range`.
pub struct FileBytesStreamRange<F = File> {
    file_stream: FileBytesStream<F>,
    seek_state: FileSeekState,
    start_offset: u64,
}

impl<F> FileBytesStreamRange<F> {
    /// Create a new stream from the given file and range
    pub fn new(file: F, range: HttpRange) -> Self {
        Self {
            file_stream: FileBytesStream::new_with_limit(file, range.length),
            seek_state: FileSeekState::NeedSeek,
            start_offset: range.start,
        }
    }
}

impl<F> Stream for FileBytesStreamRange<F>
where
    F: AsyncRead + AsyncSeek + Unpin,
{
    type Item = Result<Bytes, IoError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        let Self {
            ref mut file_stream,
            ref mut seek_state,
            start_offset,
        } = *self;
        if *seek_state == FileSeekState::NeedSeek {
            *seek_state = FileSeekState::Seeking;
            if let Err(e) =
                Pin::new(&mut file_stream.file).start_seek(SeekFrom::Start(start_offset))
            {
                return Poll::Ready(Some(Err(e)));
            }
        }
        if *seek_state == FileSeekState::Seeking {
            match Pin::new(&mut file_stream.file).poll_complete(cx) {
                Poll::Ready(Ok(..)) => *seek_state = FileSeekState::Reading,
                Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
                Poll::Pending => return Poll::Pending,
            }
        }
        Pin::new(file_stream).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{ReportSink, TransferKind, TransferReport};
    use futures_util::StreamExt;
    use std::{
        io::Cursor,
        sync::{Arc, Mutex},
    };

    async fn drain<S>(mut stream: S) -> Vec<u8>
    where
        S: Stream<Item = Result<Bytes, IoError>> + Unpin,
    {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn stops_at_limit() {
        let data = vec![7u8; 3 * BUF_SIZE];
        let stream = FileBytesStream::new_with_limit(Cursor::new(data), BUF_SIZE as u64 + 10);
        assert_eq!(drain(stream).await.len(), BUF_SIZE + 10);
    }

    #[tokio::test]
    async fn stops_at_eof_before_limit() {
        let stream = FileBytesStream::new_with_limit(Cursor::new(vec![1u8; 100]), 1000);
        assert_eq!(drain(stream).await.len(), 100);
    }

    #[tokio::test]
    async fn chunks_never_exceed_buffer() {
        let data = vec![0u8; 2 * BUF_SIZE + 1];
        let mut stream = FileBytesStream::new_with_limit(Cursor::new(data), u64::MAX);
        let (mut chunks, mut total) = (0, 0);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= BUF_SIZE);
            total += chunk.len();
            chunks += 1;
        }
        assert!(chunks >= 3);
        assert_eq!(total, 2 * BUF_SIZE + 1);
    }

    #[derive(Default)]
    struct CountingSink {
        reports: Mutex<Vec<u64>>,
    }

    impl ReportSink for CountingSink {
        fn report(&self, _kind: TransferKind, report: &TransferReport) {
            self.reports.lock().unwrap().push(report.bytes_sent);
        }
    }

    fn metered(
        data: Vec<u8>,
        limit: u64,
        sink: &Arc<CountingSink>,
    ) -> FileBytesStream<Cursor<Vec<u8>>> {
        let meter = TransferMeter::new(TransferKind::Download, "data.bin", sink.clone());
        FileBytesStream::new_with_limit(Cursor::new(data), limit).with_meter(meter)
    }

    #[tokio::test]
    async fn reports_with_the_last_chunk() {
        let sink = Arc::new(CountingSink::default());
        let mut stream = metered(vec![3u8; 40], 40, &sink);
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 40);
        assert_eq!(*sink.reports.lock().unwrap(), vec![40]);

        // Neither the trailing poll nor the drop reports again.
        assert!(stream.next().await.is_none());
        drop(stream);
        assert_eq!(*sink.reports.lock().unwrap(), vec![40]);
    }

    #[test]
    fn empty_limit_reports_without_polling() {
        let sink = Arc::new(CountingSink::default());
        drop(metered(Vec::new(), 0, &sink));
        assert_eq!(*sink.reports.lock().unwrap(), vec![0]);
    }

    #[test]
    fn unfinished_download_is_not_reported() {
        let sink = Arc::new(CountingSink::default());
        drop(metered(vec![3u8; 40], 40, &sink));
        assert!(sink.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn range_seeks_before_reading() {
        let data: Vec<u8> = (0..=255).collect();
        let range = HttpRange {
            start: 10,
            length: 5,
        };
        let stream = FileBytesStreamRange::new(Cursor::new(data), range);
        assert_eq!(drain(stream).await, vec![10, 11, 12, 13, 14]);
    }
}
