use std::{fmt, io, mem};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{Response, IntoResponse};
use bytes::{Bytes, BytesMut};
use http_body::{Body, SizeHint, Frame};
use futures::Stream;
use pin_project::pin_project;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::{ReaderStream, StreamReader};

use crate::{AsyncSeekStart, ByteSource};
use crate::encoding::{Compression, Encoder};

const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Raw response body over `length` bytes starting at `start`.
/// Implements [`Stream`], [`Body`], and [`IntoResponse`].
#[pin_project]
pub struct RangedStream<R> {
    state: StreamState,
    length: u64,
    #[pin]
    reader: R,
}

impl<R: AsyncRead + AsyncSeekStart> RangedStream<R> {
    pub fn new(reader: R, start: u64, length: u64) -> Self {
        RangedStream {
            state: StreamState::Seek { start },
            length,
            reader,
        }
    }
}

impl<R> fmt::Debug for RangedStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangedStream")
            .field("state", &self.state)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum StreamState {
    Seek { start: u64 },
    Seeking { remaining: u64 },
    Reading { buffer: BytesMut, remaining: u64 },
}

impl<R: AsyncRead + AsyncSeekStart + Send + 'static> IntoResponse for RangedStream<R> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<R: AsyncRead + AsyncSeekStart> Body for RangedStream<R> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| {
            result
                .inspect_err(|e| tracing::error!("transfer aborted after headers: {e}"))
                .map(Frame::data)
        }))
    }
}

impl<R: AsyncRead + AsyncSeekStart> Stream for RangedStream<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        if let StreamState::Seek { start } = *this.state {
            match this.reader.as_mut().start_seek(start) {
                Err(e) => { return Poll::Ready(Some(Err(e))); }
                Ok(()) => {
                    let remaining = *this.length;
                    *this.state = StreamState::Seeking { remaining };
                }
            }
        }

        if let StreamState::Seeking { remaining } = *this.state {
            match this.reader.as_mut().poll_complete(cx) {
                Poll::Pending => { return Poll::Pending; }
                Poll::Ready(Err(e)) => { return Poll::Ready(Some(Err(e))); }
                Poll::Ready(Ok(())) => {
                    let buffer = allocate_buffer();
                    *this.state = StreamState::Reading { buffer, remaining };
                }
            }
        }

        if let StreamState::Reading { buffer, remaining } = this.state {
            if *remaining == 0 {
                return Poll::Ready(None);
            }

            let uninit = buffer.spare_capacity_mut();

            // read at most the smaller of the buffer size and the bytes left
            let nbytes = std::cmp::min(
                uninit.len(),
                usize::try_from(*remaining).unwrap_or(usize::MAX),
            );

            let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

            match this.reader.as_mut().poll_read(cx, &mut read_buf) {
                Poll::Pending => { return Poll::Pending; }
                Poll::Ready(Err(e)) => { return Poll::Ready(Some(Err(e))); }
                Poll::Ready(Ok(())) => {
                    match read_buf.filled().len() {
                        // source is shorter than it was when resolved
                        0 => { return Poll::Ready(None); }
                        n => {
                            // SAFETY: poll_read has filled the buffer with `n`
                            // additional bytes. `buffer.len` should always be
                            // 0 here, but include it for rigorous correctness
                            unsafe { buffer.set_len(buffer.len() + n); }

                            let chunk = mem::replace(buffer, allocate_buffer());

                            // n <= remaining because of the cmp::min above
                            *remaining -= n as u64;

                            return Poll::Ready(Some(Ok(chunk.freeze())));
                        }
                    }
                }
            }
        }

        unreachable!();
    }
}

type EncodedReader<R> = Encoder<StreamReader<RangedStream<R>, Bytes>>;

/// Compresses `length` bytes of `reader` starting at `start`.
fn encoded_reader<R>(reader: R, start: u64, length: u64, compression: Compression) -> EncodedReader<R>
where
    R: AsyncRead + AsyncSeekStart,
{
    compression.encoder(StreamReader::new(RangedStream::new(reader, start, length)))
}

/// Compressed response body. The compressed size is not knowable from the
/// stream itself, so the length measured by [`count_compressed_size`] is
/// supplied by the caller and reported as the exact size hint.
/// Implements [`Stream`], [`Body`], and [`IntoResponse`].
#[pin_project]
pub struct EncodedStream<R> {
    length: u64,
    #[pin]
    inner: ReaderStream<EncodedReader<R>>,
}

impl<R: AsyncRead + AsyncSeekStart> EncodedStream<R> {
    pub fn new(reader: R, start: u64, length: u64, compression: Compression, encoded_length: u64) -> Self {
        let encoder = encoded_reader(reader, start, length, compression);
        EncodedStream {
            length: encoded_length,
            inner: ReaderStream::with_capacity(encoder, IO_BUFFER_SIZE),
        }
    }
}

impl<R> fmt::Debug for EncodedStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedStream")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

impl<R: AsyncRead + AsyncSeekStart + Send + 'static> IntoResponse for EncodedStream<R> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<R: AsyncRead + AsyncSeekStart> Body for EncodedStream<R> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| {
            result
                .inspect_err(|e| tracing::error!("compressed transfer aborted after headers: {e}"))
                .map(Frame::data)
        }))
    }
}

impl<R: AsyncRead + AsyncSeekStart> Stream for EncodedStream<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        self.project().inner.poll_next(cx)
    }
}

/// Runs `length` bytes of `source` starting at `start` through a fresh
/// compressor and returns how many compressed bytes came out.
///
/// The compressed bytes are discarded as they are produced, only the count is
/// kept. The reader opened for this pass is dropped before returning, on
/// success and on error.
pub async fn count_compressed_size<S: ByteSource>(
    source: &S,
    start: u64,
    length: u64,
    compression: Compression,
) -> io::Result<u64> {
    let reader = source.open().await?;
    let encoder = encoded_reader(reader, start, length, compression);
    tokio::pin!(encoder);
    tokio::io::copy(&mut encoder, &mut tokio::io::sink()).await
}

fn allocate_buffer() -> BytesMut {
    BytesMut::with_capacity(IO_BUFFER_SIZE)
}
