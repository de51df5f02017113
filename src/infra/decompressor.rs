//! Content-Encoding decoding for upstream response bodies.
//!
//! The relay never asks for compression, but upstreams may compress anyway
//! (or the caller may send its own `Accept-Encoding`).

use std::io::{self, Read};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{coding} decoding failed: {source}")]
pub struct DecodeError {
    pub coding: &'static str,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Gzip,
    Deflate,
    Brotli,
    Identity,
}

impl ContentCoding {
    /// Maps a single coding token; unknown tokens are treated as identity.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => ContentCoding::Gzip,
            "deflate" => ContentCoding::Deflate,
            "br" => ContentCoding::Brotli,
            _ => ContentCoding::Identity,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ContentCoding::Gzip => "gzip",
            ContentCoding::Deflate => "deflate",
            ContentCoding::Brotli => "br",
            ContentCoding::Identity => "identity",
        }
    }

    /// Decodes `data`, failing once the output would exceed `limit` bytes.
    pub fn decode(&self, data: &[u8], limit: usize) -> Result<Vec<u8>, DecodeError> {
        let result = match self {
            ContentCoding::Gzip => read_capped(flate2::read::GzDecoder::new(data), limit),
            ContentCoding::Deflate => {
                // Servers disagree on whether "deflate" carries the zlib wrapper.
                read_capped(flate2::read::ZlibDecoder::new(data), limit)
                    .or_else(|_| read_capped(flate2::read::DeflateDecoder::new(data), limit))
            }
            ContentCoding::Brotli => read_capped(brotli::Decompressor::new(data, 4096), limit),
            ContentCoding::Identity => read_capped(data, limit),
        };
        result.map_err(|source| DecodeError {
            coding: self.name(),
            source,
        })
    }
}

fn read_capped<R: Read>(reader: R, limit: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut out)?;
    if out.len() > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("decoded body exceeds {} bytes", limit),
        ));
    }
    Ok(out)
}

/// Undoes every coding listed in a `Content-Encoding` value, last applied
/// first. Each stage's output is bounded by `limit`.
pub fn decode_body(
    body: &[u8],
    encoding: Option<&str>,
    limit: usize,
) -> Result<Vec<u8>, DecodeError> {
    let Some(encoding) = encoding else {
        return Ok(body.to_vec());
    };

    let mut data = body.to_vec();
    for coding in encoding.split(',').rev().map(ContentCoding::from_token) {
        if coding != ContentCoding::Identity {
            data = coding.decode(&data, limit)?;
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LIMIT: usize = 1024 * 1024;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_gzip_decoding() {
        let decoded = decode_body(&gzip(b"Hello, World!"), Some("gzip"), LIMIT).unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_raw_and_zlib_deflate() {
        let original = b"deflated payload";

        let mut raw = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        raw.write_all(original).unwrap();
        assert_eq!(decode_body(&raw.finish().unwrap(), Some("deflate"), LIMIT).unwrap(), original);

        let mut zlib = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        zlib.write_all(original).unwrap();
        assert_eq!(decode_body(&zlib.finish().unwrap(), Some("Deflate"), LIMIT).unwrap(), original);
    }

    #[test]
    fn test_brotli_decoding() {
        let original = b"brotli body";
        let mut compressed = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut compressed, 4096, 5, 22);
            writer.write_all(original).unwrap();
        }
        assert_eq!(decode_body(&compressed, Some("br"), LIMIT).unwrap(), original);
    }

    #[test]
    fn test_stacked_codings_unwound_in_reverse() {
        let twice = gzip(&gzip(b"twice"));
        assert_eq!(decode_body(&twice, Some("gzip, x-gzip"), LIMIT).unwrap(), b"twice");
    }

    #[test]
    fn test_passthrough() {
        assert_eq!(decode_body(b"plain", None, LIMIT).unwrap(), b"plain");
        assert_eq!(decode_body(b"plain", Some("identity"), LIMIT).unwrap(), b"plain");
        assert_eq!(decode_body(b"plain", Some("unknown"), LIMIT).unwrap(), b"plain");
    }

    #[test]
    fn test_corrupt_gzip_reports_coding() {
        let err = decode_body(b"definitely not gzip", Some("gzip"), LIMIT).unwrap_err();
        assert_eq!(err.coding, "gzip");
    }

    #[test]
    fn test_decoded_output_is_capped() {
        let bomb = gzip(&vec![0u8; 64 * 1024]);
        let err = decode_body(&bomb, Some("gzip"), 1024).unwrap_err();
        assert_eq!(err.coding, "gzip");
        assert_eq!(err.source.kind(), io::ErrorKind::InvalidData);

        assert_eq!(decode_body(&gzip(&[7u8; 1024]), Some("gzip"), 1024).unwrap().len(), 1024);
    }
}
