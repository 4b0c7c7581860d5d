//! # filedrop
//!
//! A minimal file drop for [`axum`][1]: files are uploaded as
//! `multipart/form-data` and downloaded again by name.
//!
//! The interesting part is the download path. A download honours a single
//! `Range: bytes=<start>-<end>` interval and may be compressed on the fly
//! with gzip, deflate or brotli. Range offsets always refer to the
//! *uncompressed* file, while `Content-Length` announces the *compressed*
//! size. That size is unknowable without compressing, so a compressed
//! download reads the range twice: once through a throwaway compressor that
//! only counts bytes ([`count_compressed_size`]), and once more through a
//! fresh compressor whose output is the response body.
//!
//! Any type implementing [`ByteSource`] can be served, [`StoredFile`] being
//! the one used by the server.
//!
//! ```no_run
//! use axum::http::HeaderMap;
//! use axum::response::{IntoResponse, Response};
//! use filedrop::{StoredFile, Transfer};
//!
//! async fn download(headers: HeaderMap) -> Response {
//!     let file = match StoredFile::resolve("uploads".as_ref(), "report.pdf").await {
//!         Ok(file) => file,
//!         Err(e) => return e.into_response(),
//!     };
//!     Transfer::for_file(file)
//!         .headers(&headers)
//!         .brotli(true)
//!         .try_respond()
//!         .await
//!         .into_response()
//! }
//! ```
//!
//! [1]: https://docs.rs/axum

mod encoding;
mod error;
mod file;
mod range;
mod stream;

pub mod config;
pub mod pages;
pub mod server;
pub mod upload;

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use axum_extra::headers::{AcceptRanges, ContentLength};
use tokio::io::{AsyncRead, AsyncSeek};

pub use encoding::{Compression, Encoder};
pub use error::{TransferError, UploadError};
pub use file::{content_type, InMemory, StoredFile, DEFAULT_CONTENT_TYPE};
pub use range::{ByteRange, RangeRequest, UnsatisfiableRange};
pub use stream::{count_compressed_size, EncodedStream, RangedStream};

/// [`AsyncSeek`] narrowed to only allow seeking from start.
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`], always passing position as the `SeekFrom::Start` variant.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], returning `()` instead of the new stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// Something with a fixed byte size that can be read any number of times.
pub trait ByteSource {
    /// A single, independent reading instance.
    type Reader: AsyncRead + AsyncSeekStart + Send + Unpin + 'static;

    /// The total size of the underlying data.
    ///
    /// Queried once per request and trusted from then on. Behaviour is not
    /// guaranteed if the data changes while it is being read.
    fn byte_size(&self) -> u64;

    /// Opens a new reader positioned at the start. Readers returned by
    /// separate calls never share state.
    fn open(&self) -> impl Future<Output = io::Result<Self::Reader>> + Send;
}

/// Download of one [`ByteSource`]. [`Transfer::try_respond`] walks the
/// request through range check, encoding negotiation and, for compressed
/// bodies, the size counting pass.
#[derive(Debug, Clone)]
pub struct Transfer<S> {
    source: S,
    range: Option<String>,
    accept_encoding: Option<String>,
    supports_brotli: bool,
    content_type: Option<String>,
    file_name: Option<String>,
}

impl<S: ByteSource + Send + Sync> Transfer<S> {
    pub fn new(source: S) -> Self {
        Transfer {
            source,
            range: None,
            accept_encoding: None,
            supports_brotli: false,
            content_type: None,
            file_name: None,
        }
    }

    /// Raw `Range` header value, if the request had one.
    pub fn range(mut self, range: Option<&str>) -> Self {
        self.range = range.map(str::to_owned);
        self
    }

    /// Raw `Accept-Encoding` header value, if the request had one.
    pub fn accept_encoding(mut self, accept_encoding: Option<&str>) -> Self {
        self.accept_encoding = accept_encoding.map(str::to_owned);
        self
    }

    /// Takes `Range` and `Accept-Encoding` from request headers. Values that
    /// are not valid strings are treated as absent.
    pub fn headers(self, headers: &HeaderMap) -> Self {
        let value = |name: header::HeaderName| headers.get(name).and_then(|v: &HeaderValue| v.to_str().ok());
        self.range(value(header::RANGE))
            .accept_encoding(value(header::ACCEPT_ENCODING))
    }

    /// Whether brotli may be negotiated at all.
    pub fn brotli(mut self, supported: bool) -> Self {
        self.supports_brotli = supported;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Name announced in `Content-Disposition`.
    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Computes headers and opens the body.
    ///
    /// Every reader opened here is owned by the returned body or dropped
    /// before returning, so an error or a dropped response never leaks a
    /// file handle.
    pub async fn try_respond(self) -> Result<TransferResponse<S::Reader>, TransferError> {
        let complete_length = self.source.byte_size();
        let headers = self.response_headers();

        let (content_range, start, length) = match RangeRequest::parse(self.range.as_deref(), complete_length) {
            RangeRequest::Full => (None, 0, complete_length),
            RangeRequest::Partial(range) => (Some(range), range.start, range.len()),
            RangeRequest::Unsatisfiable(range) => {
                tracing::debug!(?range, "range not satisfiable");
                return Ok(TransferResponse::Unsatisfiable { headers, range });
            }
        };

        let accept_encoding = self.accept_encoding.as_deref().unwrap_or("");
        let compression = Compression::negotiate(accept_encoding, self.supports_brotli);

        let Some(compression) = compression else {
            let reader = self.source.open().await?;
            return Ok(TransferResponse::Raw {
                headers,
                content_range,
                complete_length,
                content_length: ContentLength(length),
                stream: RangedStream::new(reader, start, length),
            });
        };

        let encoded_length = count_compressed_size(&self.source, start, length, compression).await?;
        tracing::debug!(
            encoding = compression.as_str(),
            length,
            encoded_length,
            "measured compressed length"
        );

        let reader = self.source.open().await?;
        Ok(TransferResponse::Encoded {
            headers,
            content_range,
            complete_length,
            compression,
            content_length: ContentLength(encoded_length),
            stream: EncodedStream::new(reader, start, length, compression, encoded_length),
        })
    }

    /// Headers shared by every response for this source.
    fn response_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        headers.insert(pages::X_ROBOTS_TAG, HeaderValue::from_static(pages::NO_INDEX));

        let content_type = self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }

        if let Some(value) = self.file_name.as_deref().and_then(content_disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }

        headers
    }
}

impl Transfer<StoredFile> {
    /// Transfer of a stored file, with its content type and name filled in.
    pub fn for_file(file: StoredFile) -> Self {
        let content_type = file.content_type();
        let file_name = file.name().to_owned();
        Transfer::new(file)
            .content_type(content_type)
            .file_name(file_name)
    }
}

/// `filename="<name>"`, dropping characters a header cannot carry and
/// escaping quotes.
fn content_disposition(name: &str) -> Option<HeaderValue> {
    let name: String = name
        .chars()
        .filter(|&c| c == '\t' || (' '..='~').contains(&c) || ('\u{80}'..='\u{ff}').contains(&c))
        .collect();
    let name = name.replace('"', "\\\"");
    HeaderValue::from_str(&format!("filename=\"{name}\"")).ok()
}

fn content_range(start: u64, end: u64, complete_length: u64) -> HeaderValue {
    HeaderValue::from_str(&format!("bytes {start}-{end}/{complete_length}"))
        .expect("formatted integers are a valid header value")
}

#[derive(Debug)]
/// Computed headers and body for a download. Implements [`IntoResponse`].
pub enum TransferResponse<R> {
    /// The range could not be served. Answered with 206, an empty body and a
    /// `Content-Range` echoing the requested offsets rather than with 416.
    Unsatisfiable {
        headers: HeaderMap,
        range: UnsatisfiableRange,
    },
    /// Bytes sent as stored.
    Raw {
        headers: HeaderMap,
        content_range: Option<ByteRange>,
        complete_length: u64,
        content_length: ContentLength,
        stream: RangedStream<R>,
    },
    /// Bytes sent through a compressor, `content_length` is the measured
    /// compressed size.
    Encoded {
        headers: HeaderMap,
        content_range: Option<ByteRange>,
        complete_length: u64,
        compression: Compression,
        content_length: ContentLength,
        stream: EncodedStream<R>,
    },
}

impl<R: AsyncRead + AsyncSeekStart + Send + 'static> IntoResponse for TransferResponse<R> {
    fn into_response(self) -> Response {
        use TransferResponse::*;

        let accept_ranges = TypedHeader(AcceptRanges::bytes());

        match self {
            Unsatisfiable { headers, range } => {
                let content_range = [(header::CONTENT_RANGE, content_range(range.start, range.end, range.size))];
                let content_length = TypedHeader(ContentLength(0));
                (StatusCode::PARTIAL_CONTENT, headers, accept_ranges, content_range, content_length, ())
                    .into_response()
            }
            Raw { mut headers, content_range: range, complete_length, content_length, stream } => {
                let status = partial(&mut headers, range, complete_length);
                (status, headers, accept_ranges, TypedHeader(content_length), stream).into_response()
            }
            Encoded { mut headers, content_range: range, complete_length, compression, content_length, stream } => {
                let status = partial(&mut headers, range, complete_length);
                headers.insert(header::CONTENT_ENCODING, compression.header_value());
                (status, headers, accept_ranges, TypedHeader(content_length), stream).into_response()
            }
        }
    }
}

/// Adds `Content-Range` for partial responses and picks the status code.
fn partial(headers: &mut HeaderMap, range: Option<ByteRange>, complete_length: u64) -> StatusCode {
    match range {
        Some(range) => {
            headers.insert(header::CONTENT_RANGE, content_range(range.start, range.end, complete_length));
            StatusCode::PARTIAL_CONTENT
        }
        None => StatusCode::OK,
    }
}
