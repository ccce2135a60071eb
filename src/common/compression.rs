//! Compression utilities for HTTP content encoding.
//!
//! Response bodies may carry a `Content-Encoding` header listing more than one
//! coding (e.g. `gzip, br`), applied in the order the server encoded them and
//! meant to be unwrapped in reverse. [`detect_encodings`] parses the full
//! comma-separated chain and [`decompress_body`] layers a decoder per entry.

use anyhow::Result;
use async_compression::tokio::bufread::{BrotliDecoder, GzipDecoder, ZstdDecoder};
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::BodyStream;
use hyper::body::Incoming;
use hyper::{HeaderMap, header, http};
use std::io::Cursor;
use tokio::io::{AsyncBufRead, AsyncReadExt, BufReader};
use tokio_util::io::StreamReader;

/// Supported content encodings for streaming decompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Br,
    Gzip,
    Zstd,
}

impl ContentEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Identity => "identity",
            ContentEncoding::Br => "br",
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Zstd => "zstd",
        }
    }

    fn from_token(token: &str) -> ContentEncoding {
        match token.trim().to_ascii_lowercase().as_str() {
            "br" => ContentEncoding::Br,
            "gzip" => ContentEncoding::Gzip,
            "zstd" | "zst" => ContentEncoding::Zstd,
            _ => ContentEncoding::Identity,
        }
    }
}

/// Parse the full `Content-Encoding` header into the ordered chain of codings
/// applied to the body, outermost last (the order the header lists them).
///
/// Returns an empty vec if the header is missing; callers should treat that
/// the same as `[Identity]`.
///
/// # Example
/// ```
/// use dav_rs::compression::{detect_encodings, ContentEncoding};
/// use hyper::{header, HeaderMap};
///
/// let mut headers = HeaderMap::new();
/// headers.insert(header::CONTENT_ENCODING, "gzip".parse().unwrap());
/// assert_eq!(detect_encodings(&headers), vec![ContentEncoding::Gzip]);
/// ```
pub fn detect_encodings(headers: &HeaderMap) -> Vec<ContentEncoding> {
    let Some(val) = headers.get(header::CONTENT_ENCODING) else {
        return Vec::new();
    };
    let Ok(s) = val.to_str() else {
        return Vec::new();
    };
    s.split(',')
        .map(ContentEncoding::from_token)
        .filter(|e| *e != ContentEncoding::Identity)
        .collect()
}

/// Detect a single `Content-Encoding` token (first one only). Kept for callers
/// that know the server never stacks codings.
pub fn detect_encoding(headers: &HeaderMap) -> ContentEncoding {
    detect_encodings(headers)
        .into_iter()
        .next()
        .unwrap_or(ContentEncoding::Identity)
}

/// Insert an `Accept-Encoding` header (`br, zstd, gzip`) if not already present.
pub fn add_accept_encoding(h: &mut HeaderMap) {
    if !h.contains_key(http::header::ACCEPT_ENCODING) {
        h.insert(
            http::header::ACCEPT_ENCODING,
            http::HeaderValue::from_static("br, zstd, gzip"),
        );
    }
}

async fn decode_one(
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    encoding: ContentEncoding,
) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    Ok(match encoding {
        ContentEncoding::Identity => reader,
        ContentEncoding::Br => Box::new(BufReader::new(BrotliDecoder::new(reader))),
        ContentEncoding::Gzip => Box::new(BufReader::new(GzipDecoder::new(reader))),
        ContentEncoding::Zstd => Box::new(BufReader::new(ZstdDecoder::new(reader))),
    })
}

/// Decompress an aggregated response body, unwrapping each coding in
/// `encodings` in reverse (last-applied-first) order.
pub async fn decompress_body(body: Incoming, encodings: &[ContentEncoding]) -> Result<Bytes> {
    let stream = BodyStream::new(body)
        .map_ok(|frame| frame.into_data().unwrap_or_default())
        .map_err(std::io::Error::other);
    let mut reader: Box<dyn AsyncBufRead + Unpin + Send> =
        Box::new(BufReader::new(StreamReader::new(stream)));

    for encoding in encodings.iter().rev() {
        reader = decode_one(reader, *encoding).await?;
    }

    let mut out = Vec::with_capacity(32 * 1024);
    reader.read_to_end(&mut out).await?;
    Ok(Bytes::from(out))
}

/// Wrap a streaming body with decompression, for callers parsing on the fly
/// instead of aggregating the whole response first.
pub fn decompress_stream(
    body: Incoming,
    encodings: &[ContentEncoding],
) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    let stream = BodyStream::new(body)
        .map_ok(|frame| frame.into_data().unwrap_or_default())
        .map_err(std::io::Error::other);
    let mut reader: Box<dyn AsyncBufRead + Unpin + Send> =
        Box::new(BufReader::new(StreamReader::new(stream)));

    for encoding in encodings.iter().rev() {
        reader = match encoding {
            ContentEncoding::Identity => reader,
            ContentEncoding::Br => Box::new(BufReader::new(BrotliDecoder::new(reader))),
            ContentEncoding::Gzip => Box::new(BufReader::new(GzipDecoder::new(reader))),
            ContentEncoding::Zstd => Box::new(BufReader::new(ZstdDecoder::new(reader))),
        };
    }

    Ok(reader)
}

/// Compress a byte payload using the specified encoding, for request bodies.
pub async fn compress_payload(data: Bytes, encoding: ContentEncoding) -> Result<Bytes> {
    match encoding {
        ContentEncoding::Identity => Ok(data),
        ContentEncoding::Br => {
            use async_compression::tokio::bufread::BrotliEncoder;
            let mut encoder = BrotliEncoder::new(BufReader::new(Cursor::new(data)));
            let mut compressed = Vec::new();
            encoder.read_to_end(&mut compressed).await?;
            Ok(Bytes::from(compressed))
        }
        ContentEncoding::Gzip => {
            use async_compression::tokio::bufread::GzipEncoder;
            let mut encoder = GzipEncoder::new(BufReader::new(Cursor::new(data)));
            let mut compressed = Vec::new();
            encoder.read_to_end(&mut compressed).await?;
            Ok(Bytes::from(compressed))
        }
        ContentEncoding::Zstd => {
            use async_compression::tokio::bufread::ZstdEncoder;
            let mut encoder = ZstdEncoder::new(BufReader::new(Cursor::new(data)));
            let mut compressed = Vec::new();
            encoder.read_to_end(&mut compressed).await?;
            Ok(Bytes::from(compressed))
        }
    }
}

/// Add a `Content-Encoding` header for an outgoing request whose body has
/// already been compressed with `encoding`.
pub fn add_content_encoding(headers: &mut HeaderMap, encoding: ContentEncoding) {
    if encoding != ContentEncoding::Identity
        && let Ok(value) = http::HeaderValue::from_str(encoding.as_str())
    {
        headers.insert("Content-Encoding", value);
    }
}
