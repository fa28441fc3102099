//! Random access reader for IFF style chunked containers
//!
//! Only the chunk table is read; payloads stay on disk until a caller asks
//! for them.

use std::io::{self, Read, Seek, SeekFrom};

use log::debug;

use crate::error::BlorbError;
use crate::util::{id_str, padded_len, read_be_u32, ChunkId};

/// Form type of a Blorb resource file
pub const BLORB_FORM_TYPE: ChunkId = *b"IFRS";

/// One chunk of a container. `offset` is where the payload starts, so the
/// 8 byte header sits at `offset - 8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub id: ChunkId,
    pub offset: u32,
    pub length: u32,
}

impl Chunk {
    /// Absolute offset of the chunk header
    pub fn header_offset(&self) -> u32 {
        self.offset - 8
    }

    /// Offset just past the payload and its pad byte
    pub fn end_offset(&self) -> u64 {
        self.offset as u64 + padded_len(self.length)
    }
}

/// Chunk table of a `FORM` container
#[derive(Debug, Clone)]
pub struct Container {
    pub form_type: ChunkId,
    pub total_length: u32,
    pub chunks: Vec<Chunk>,
}

impl Container {
    /// Size of the whole container including the 8 byte `FORM` header
    pub fn size(&self) -> u64 {
        self.total_length as u64 + 8
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    /// Index of the first chunk with the given id
    pub fn find_chunk(&self, id: &ChunkId) -> Option<usize> {
        self.chunks.iter().position(|c| &c.id == id)
    }

    /// Reads the payload of one chunk
    pub fn chunk_payload<R: Read + Seek>(
        &self,
        reader: &mut R,
        index: usize,
    ) -> Result<Vec<u8>, BlorbError> {
        let chunk = self
            .chunk(index)
            .ok_or_else(|| BlorbError::NotFound(format!("chunk {}", index)))?;
        read_payload(reader, chunk)
    }
}

pub(crate) fn read_payload<R: Read + Seek>(
    reader: &mut R,
    chunk: &Chunk,
) -> Result<Vec<u8>, BlorbError> {
    reader.seek(SeekFrom::Start(chunk.offset as u64))?;
    let mut data = vec![0u8; chunk.length as usize];
    reader.read_exact(&mut data)?;
    Ok(data)
}

fn read_or_truncated<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &str,
) -> Result<(), BlorbError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => BlorbError::Format(format!("truncated {}", what)),
        _ => BlorbError::Io(e),
    })
}

/// Checks for a `FORM`/`IFRS` leader without scanning the chunk table.
/// The stream is left positioned just after the leader.
pub fn is_blorb<R: Read + Seek>(reader: &mut R) -> bool {
    let mut leader = [0u8; 12];
    if reader.seek(SeekFrom::Start(0)).is_err() || reader.read_exact(&mut leader).is_err() {
        return false;
    }
    &leader[0..4] == b"FORM" && leader[8..12] == BLORB_FORM_TYPE
}

/// Opens a Blorb container (`FORM` ... `IFRS`)
pub fn open_container<R: Read + Seek>(reader: &mut R) -> Result<Container, BlorbError> {
    open_form(reader, &BLORB_FORM_TYPE)
}

/// Opens any `FORM` container of the expected form type and indexes its
/// chunks in one bounded pass.
pub fn open_form<R: Read + Seek>(
    reader: &mut R,
    form_type: &ChunkId,
) -> Result<Container, BlorbError> {
    let stream_len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let mut leader = [0u8; 12];
    read_or_truncated(reader, &mut leader, "container leader")?;
    if &leader[0..4] != b"FORM" {
        return Err(BlorbError::Format("missing FORM signature".to_string()));
    }
    let total_length = read_be_u32(&leader[4..8]);
    let mut found_type = [0u8; 4];
    found_type.copy_from_slice(&leader[8..12]);
    if &found_type != form_type {
        return Err(BlorbError::Format(format!(
            "form type is {}, expected {}",
            id_str(&found_type),
            id_str(form_type)
        )));
    }

    let container_size = total_length as u64 + 8;
    if total_length < 4 {
        return Err(BlorbError::Format(format!(
            "declared length {} is too small",
            total_length
        )));
    }
    if container_size > stream_len {
        return Err(BlorbError::Format(format!(
            "container declares {} bytes but only {} are present",
            container_size, stream_len
        )));
    }

    let mut chunks = Vec::new();
    let mut pos = 12u64;
    while pos < container_size {
        if pos + 8 > container_size {
            return Err(BlorbError::Format(format!(
                "chunk header at {:#x} runs past end of container",
                pos
            )));
        }
        reader.seek(SeekFrom::Start(pos))?;
        let mut header = [0u8; 8];
        read_or_truncated(reader, &mut header, "chunk header")?;

        let mut id = [0u8; 4];
        id.copy_from_slice(&header[0..4]);
        let length = read_be_u32(&header[4..8]);
        let offset = pos + 8;
        // The pad byte after an odd payload is part of the container
        if offset + padded_len(length) > container_size {
            return Err(BlorbError::Format(format!(
                "chunk '{}' at {:#x} ({} bytes) runs past end of container",
                id_str(&id),
                pos,
                length
            )));
        }

        let chunk = Chunk {
            id,
            offset: offset as u32,
            length,
        };
        debug!(
            "chunk {}: '{}' at {:#x}, {} bytes",
            chunks.len(),
            id_str(&id),
            offset,
            length
        );
        pos = chunk.end_offset();
        chunks.push(chunk);
    }

    Ok(Container {
        form_type: found_type,
        total_length,
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iff::IffFile;
    use std::io::Cursor;
    use test_log::test;

    fn sample_container() -> Vec<u8> {
        let mut iff = IffFile::new(BLORB_FORM_TYPE);
        iff.add_chunk(*b"ABCD", vec![1, 2, 3]);
        iff.add_chunk(*b"EFGH", vec![4, 5, 6, 7]);
        iff.add_chunk(*b"IJKL", vec![8]);
        iff.add_chunk(*b"MNOP", Vec::new());
        iff.to_bytes()
    }

    #[test]
    fn chunk_offsets_are_contiguous() {
        let bytes = sample_container();
        let container = open_container(&mut Cursor::new(&bytes)).unwrap();

        assert_eq!(container.chunks.len(), 4);
        assert_eq!(container.chunks[0].offset, 20);
        for pair in container.chunks.windows(2) {
            assert_eq!(pair[0].end_offset() + 8, pair[1].offset as u64);
        }
        assert_eq!(container.size(), bytes.len() as u64);
    }

    #[test]
    fn odd_lengths_skip_padding() {
        let bytes = sample_container();
        let mut cursor = Cursor::new(&bytes);
        let container = open_container(&mut cursor).unwrap();

        let ids: Vec<&ChunkId> = container.chunks.iter().map(|c| &c.id).collect();
        assert_eq!(ids, vec![b"ABCD", b"EFGH", b"IJKL", b"MNOP"]);
        let lengths: Vec<u32> = container.chunks.iter().map(|c| c.length).collect();
        assert_eq!(lengths, vec![3, 4, 1, 0]);

        assert_eq!(container.chunk_payload(&mut cursor, 1).unwrap(), vec![4, 5, 6, 7]);
        assert_eq!(container.chunk_payload(&mut cursor, 2).unwrap(), vec![8]);
    }

    #[test]
    fn rejects_wrong_signatures() {
        let mut bytes = sample_container();
        bytes[8..12].copy_from_slice(b"IFZS");
        assert!(matches!(
            open_container(&mut Cursor::new(&bytes)),
            Err(BlorbError::Format(_))
        ));

        let mut bytes = sample_container();
        bytes[0..4].copy_from_slice(b"LIST");
        assert!(matches!(
            open_container(&mut Cursor::new(&bytes)),
            Err(BlorbError::Format(_))
        ));
    }

    #[test]
    fn rejects_truncated_container() {
        let mut bytes = sample_container();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            open_container(&mut Cursor::new(&bytes)),
            Err(BlorbError::Format(_))
        ));

        // Too short to even hold the leader
        assert!(matches!(
            open_container(&mut Cursor::new(b"FORM\0\0".to_vec())),
            Err(BlorbError::Format(_))
        ));
    }

    #[test]
    fn rejects_chunk_overrunning_container() {
        let mut bytes = sample_container();
        // First chunk claims far more than the container holds
        bytes[16..20].copy_from_slice(&1000u32.to_be_bytes());
        assert!(matches!(
            open_container(&mut Cursor::new(&bytes)),
            Err(BlorbError::Format(_))
        ));
    }

    #[test]
    fn rejects_missing_pad_byte() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"FORM");
        bytes.extend_from_slice(&15u32.to_be_bytes());
        bytes.extend_from_slice(b"IFRSABCD");
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(
            open_container(&mut Cursor::new(&bytes)),
            Err(BlorbError::Format(_))
        ));

        // The same chunk with its pad byte counted
        bytes[4..8].copy_from_slice(&16u32.to_be_bytes());
        bytes.push(0);
        let container = open_container(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(container.chunks.len(), 1);
        assert_eq!(container.chunks[0].length, 3);
    }

    #[test]
    fn detects_blorb_leader() {
        let bytes = sample_container();
        assert!(is_blorb(&mut Cursor::new(&bytes)));
        assert!(!is_blorb(&mut Cursor::new(vec![3u8; 64])));
        assert!(!is_blorb(&mut Cursor::new(b"FORM".to_vec())));
    }
}
