// src/compression/mod.rs

//! Compressed metadata decoding
//!
//! Repository metadata payloads (`*-primary.xml.*`, `*-filelists.xml.*`)
//! arrive gzip-, xz-, or zstd-compressed. The format is detected from the
//! file's magic bytes, never from its name, and decoding is streaming.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Failed to create {format} decoder: {source}")]
    DecoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("Failed to open {path}: {source}")]
    Open { path: String, source: io::Error },

    #[error("Failed to read magic bytes: {0}")]
    MagicRead(#[source] io::Error),

    #[error("Unrecognized compression magic in metadata payload")]
    UnknownFormat,
}

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// Gzip compression (.gz)
    Gzip,
    /// XZ/LZMA compression (.xz)
    Xz,
    /// Zstandard compression (.zst)
    Zstd,
}

impl CompressionFormat {
    /// Detect compression format from magic bytes
    ///
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00` (FD + "7zXZ" + NUL)
    /// - Zstd: `28 b5 2f fd`
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            Some(Self::Gzip)
        } else if data.len() >= 6 && data[..6] == [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00] {
            Some(Self::Xz)
        } else if data.len() >= 4 && data[..4] == [0x28, 0xb5, 0x2f, 0xfd] {
            Some(Self::Zstd)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Wrap a reader in a decompressor for the given format
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    match format {
        CompressionFormat::Gzip => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        CompressionFormat::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionFormat::Zstd => {
            let decoder =
                zstd::Decoder::new(reader).map_err(|e| CompressionError::DecoderCreation {
                    format: "zstd",
                    source: e,
                })?;
            Ok(Box::new(decoder))
        }
    }
}

/// Open a file and return a streaming decoder, auto-detecting the format
/// from the first bytes
pub fn open_decoded(path: &Path) -> Result<Box<dyn Read>, CompressionError> {
    let mut file = File::open(path).map_err(|e| CompressionError::Open {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut magic = [0u8; 6];
    let n = read_up_to(&mut file, &mut magic).map_err(CompressionError::MagicRead)?;
    file.seek(SeekFrom::Start(0))
        .map_err(CompressionError::MagicRead)?;

    let format =
        CompressionFormat::from_magic_bytes(&magic[..n]).ok_or(CompressionError::UnknownFormat)?;
    create_decoder(BufReader::new(file), format)
}

/// Decompress a byte slice, auto-detecting the format
pub fn decompress_auto(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let format =
        CompressionFormat::from_magic_bytes(data).ok_or(CompressionError::UnknownFormat)?;
    let mut decoder = create_decoder(data, format)?;
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| CompressionError::DecoderCreation {
            format: format.name(),
            source: e,
        })?;
    Ok(output)
}

// Read::read may return short counts; loop until the buffer is full or EOF
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
