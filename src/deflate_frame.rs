//! Single entry PKZIP frames holding raw deflate data
//!
//! The local file header is little-endian, unlike the big-endian IFF
//! containers. Its fields are decoded with `pk_short`/`pk_long` only.

use std::io::{self, Read, Seek, SeekFrom, Take};

use flate2::read::DeflateDecoder;
use flate2::{Decompress, FlushDecompress, Status};
use log::debug;

use crate::error::BlorbError;

pub const LOCAL_HEADER_LEN: usize = 30;
pub const LOCAL_HEADER_SIGNATURE: [u8; 4] = *b"PK\x03\x04";
pub const METHOD_DEFLATE: u16 = 8;

/// Little-endian 16 bit PKZIP field
fn pk_short(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Little-endian 32 bit PKZIP field
fn pk_long(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// The fields of a local file header this decoder uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub compression_method: u16,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_length: u16,
    pub extra_length: u16,
}

impl FrameHeader {
    /// Parse and validate a 30 byte local header. The first 8 bytes
    /// (signature, version, flags) are not checked.
    pub fn parse(header: &[u8; LOCAL_HEADER_LEN]) -> Result<Self, BlorbError> {
        let compression_method = pk_short(&header[8..10]);
        if compression_method != METHOD_DEFLATE {
            return Err(BlorbError::UnsupportedCompression(compression_method));
        }

        let compressed_size = pk_long(&header[18..22]);
        let uncompressed_size = pk_long(&header[22..26]);
        if compressed_size == 0 || uncompressed_size == 0 {
            return Err(BlorbError::Size {
                compressed: compressed_size,
                uncompressed: uncompressed_size,
            });
        }

        Ok(FrameHeader {
            compression_method,
            compressed_size,
            uncompressed_size,
            name_length: pk_short(&header[26..28]),
            extra_length: pk_short(&header[28..30]),
        })
    }

    /// Offset of the compressed data from the start of the header
    pub fn payload_offset(&self) -> u64 {
        LOCAL_HEADER_LEN as u64 + self.name_length as u64 + self.extra_length as u64
    }
}

/// Read the local header at `offset` and check the payload fits the stream.
/// Leaves the stream at the start of the compressed data.
pub fn read_frame_header<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
) -> Result<FrameHeader, BlorbError> {
    let stream_len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(offset))?;

    let mut raw = [0u8; LOCAL_HEADER_LEN];
    reader.read_exact(&mut raw).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => BlorbError::Format("truncated frame header".to_string()),
        _ => BlorbError::Io(e),
    })?;
    let header = FrameHeader::parse(&raw)?;

    let payload_start = offset + header.payload_offset();
    if payload_start + header.compressed_size as u64 > stream_len {
        return Err(BlorbError::Format(format!(
            "frame declares {} compressed bytes at {:#x} but the stream ends at {:#x}",
            header.compressed_size, payload_start, stream_len
        )));
    }
    reader.seek(SeekFrom::Start(payload_start))?;
    debug!(
        "frame at {:#x}: {} -> {} bytes",
        offset, header.compressed_size, header.uncompressed_size
    );
    Ok(header)
}

/// Decompress the frame whose local header starts at `offset`
pub fn decode_frame<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<Vec<u8>, BlorbError> {
    let header = read_frame_header(reader, offset)?;
    let mut compressed = vec![0u8; header.compressed_size as usize];
    reader.read_exact(&mut compressed)?;
    inflate_raw(&compressed, header.uncompressed_size)
}

/// Inflate a raw deflate stream (no zlib or gzip wrapper) that must produce
/// exactly `uncompressed_size` bytes
pub fn inflate_raw(compressed: &[u8], uncompressed_size: u32) -> Result<Vec<u8>, BlorbError> {
    let expected = uncompressed_size as usize;
    let mut inflater = Decompress::new(false);
    // One spare byte so an oversized stream shows up as a full buffer
    let mut out = Vec::with_capacity(expected + 1);

    loop {
        let before = (inflater.total_in(), inflater.total_out());
        let input = &compressed[inflater.total_in() as usize..];
        let status = inflater
            .decompress_vec(input, &mut out, FlushDecompress::Finish)
            .map_err(|e| BlorbError::Decompress(e.to_string()))?;

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if out.len() > expected {
                    return Err(BlorbError::Decompress(format!(
                        "stream inflates past the declared {} bytes",
                        expected
                    )));
                }
                if (inflater.total_in(), inflater.total_out()) == before {
                    return Err(BlorbError::Decompress(format!(
                        "stream ended early after {} bytes",
                        out.len()
                    )));
                }
            }
        }
    }

    if out.len() != expected {
        return Err(BlorbError::Decompress(format!(
            "inflated {} bytes, header declares {}",
            out.len(),
            expected
        )));
    }
    Ok(out)
}

/// Streaming view of a frame's decompressed contents
pub struct FrameReader<R: Read> {
    header: FrameHeader,
    decoder: DeflateDecoder<Take<R>>,
}

impl<R: Read> FrameReader<R> {
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }
}

impl<R: Read> Read for FrameReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(buf)
    }
}

/// Open a frame for streaming instead of decoding it into one buffer
pub fn open_frame<R: Read + Seek>(
    mut reader: R,
    offset: u64,
) -> Result<FrameReader<R>, BlorbError> {
    let header = read_frame_header(&mut reader, offset)?;
    let limited = reader.take(header.compressed_size as u64);
    Ok(FrameReader {
        header,
        decoder: DeflateDecoder::new(limited),
    })
}
