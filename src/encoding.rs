//! `Accept-Encoding` negotiation and the compressors behind each scheme.

use std::io;
use std::pin::Pin;
use std::sync::LazyLock;
use std::task::{Context, Poll};

use async_compression::tokio::bufread::{BrotliEncoder, GzipEncoder, ZlibEncoder};
use axum::http::HeaderValue;
use pin_project::pin_project;
use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

static GZIP: LazyLock<Regex> = LazyLock::new(|| word("gzip"));
static DEFLATE: LazyLock<Regex> = LazyLock::new(|| word("deflate"));
static BROTLI: LazyLock<Regex> = LazyLock::new(|| word("br"));

fn word(token: &str) -> Regex {
    Regex::new(&format!(r"\b{token}\b")).expect("encoding token is a valid pattern")
}

/// A compression scheme applied to a download body. "No compression" is
/// represented as `None` wherever a scheme is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    /// zlib-wrapped deflate stream, which is what HTTP calls `deflate`.
    Deflate,
    Brotli,
}

impl Compression {
    /// Picks a scheme from an `Accept-Encoding` value.
    ///
    /// Tokens are matched as whole words in the fixed order gzip, deflate, br,
    /// first match wins. Quality values are not looked at, so `gzip;q=0` still
    /// selects gzip. `br` is only considered when `supports_brotli` is set.
    pub fn negotiate(accept_encoding: &str, supports_brotli: bool) -> Option<Compression> {
        if GZIP.is_match(accept_encoding) {
            Some(Compression::Gzip)
        } else if DEFLATE.is_match(accept_encoding) {
            Some(Compression::Deflate)
        } else if supports_brotli && BROTLI.is_match(accept_encoding) {
            Some(Compression::Brotli)
        } else {
            None
        }
    }

    /// Token used in the `Content-Encoding` header.
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::Deflate => "deflate",
            Compression::Brotli => "br",
        }
    }

    pub fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }

    /// Wraps `reader` in a fresh compressor of this scheme. Compressors are
    /// stateful, every pass over the data needs its own.
    pub fn encoder<R: AsyncBufRead>(self, reader: R) -> Encoder<R> {
        match self {
            Compression::Gzip => Encoder::Gzip(GzipEncoder::new(reader)),
            Compression::Deflate => Encoder::Deflate(ZlibEncoder::new(reader)),
            Compression::Brotli => Encoder::Brotli(BrotliEncoder::new(reader)),
        }
    }
}

/// Compressed view over an [`AsyncBufRead`]. Implements [`AsyncRead`].
#[pin_project(project = EncoderProj)]
pub enum Encoder<R> {
    Gzip(#[pin] GzipEncoder<R>),
    Deflate(#[pin] ZlibEncoder<R>),
    Brotli(#[pin] BrotliEncoder<R>),
}

impl<R: AsyncBufRead> AsyncRead for Encoder<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            EncoderProj::Gzip(inner) => inner.poll_read(cx, buf),
            EncoderProj::Deflate(inner) => inner.poll_read(cx, buf),
            EncoderProj::Brotli(inner) => inner.poll_read(cx, buf),
        }
    }
}
