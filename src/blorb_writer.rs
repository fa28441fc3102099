//! Blorb file writer

use std::path::Path;

use log::debug;

use crate::blorb_map::Usage;
use crate::chunk_reader::BLORB_FORM_TYPE;
use crate::error::BlorbError;
use crate::iff::{IffChunk, IffFile};
use crate::util::ChunkId;

struct PendingResource {
    usage: Usage,
    number: u32,
    chunk: IffChunk,
}

/// Collects resources and auxiliary chunks and lays them out as a Blorb
/// file with the resource index first.
#[derive(Default)]
pub struct BlorbBuilder {
    resources: Vec<PendingResource>,
    extra: Vec<IffChunk>,
}

impl BlorbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an indexed resource stored in a chunk of the given type
    pub fn add_resource(
        &mut self,
        usage: Usage,
        number: u32,
        chunk_type: ChunkId,
        data: Vec<u8>,
    ) -> &mut Self {
        self.resources.push(PendingResource {
            usage,
            number,
            chunk: IffChunk { chunk_type, data },
        });
        self
    }

    /// Add a chunk that the index does not refer to (Fspc, IFmd, RelN, ...)
    pub fn add_chunk(&mut self, chunk_type: ChunkId, data: Vec<u8>) -> &mut Self {
        self.extra.push(IffChunk { chunk_type, data });
        self
    }

    fn layout(&self) -> IffFile {
        let ridx_len = 4 + 12 * self.resources.len();
        let mut pos = 12 + 8 + ridx_len;

        let mut ridx = Vec::with_capacity(ridx_len);
        ridx.extend_from_slice(&(self.resources.len() as u32).to_be_bytes());
        for res in &self.resources {
            ridx.extend_from_slice(&res.usage.tag());
            ridx.extend_from_slice(&res.number.to_be_bytes());
            ridx.extend_from_slice(&(pos as u32).to_be_bytes());
            pos += res.chunk.stored_len();
        }

        let mut iff = IffFile::new(BLORB_FORM_TYPE);
        iff.add_chunk(*b"RIdx", ridx);
        for res in &self.resources {
            iff.add_chunk(res.chunk.chunk_type, res.chunk.data.clone());
        }
        for chunk in &self.extra {
            iff.add_chunk(chunk.chunk_type, chunk.data.clone());
        }
        iff
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let bytes = self.layout().to_bytes();
        debug!(
            "Built Blorb with {} resources, {} bytes",
            self.resources.len(),
            bytes.len()
        );
        bytes
    }

    pub fn write_to_file(&self, path: &Path) -> Result<(), BlorbError> {
        self.layout().write_to_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::read_be_u32;
    use test_log::test;

    #[test]
    fn index_points_at_chunk_headers() {
        let mut builder = BlorbBuilder::new();
        builder
            .add_resource(Usage::Pict, 2, *b"PNG ", vec![1; 5])
            .add_resource(Usage::Snd, 7, *b"OGGV", vec![2; 4]);
        let bytes = builder.to_bytes();

        // RIdx with two entries: 8 + 4 + 24 bytes starting at 12
        assert_eq!(&bytes[12..16], b"RIdx");
        assert_eq!(read_be_u32(&bytes[20..24]), 2);
        assert_eq!(&bytes[24..28], b"Pict");
        assert_eq!(read_be_u32(&bytes[28..32]), 2);
        assert_eq!(read_be_u32(&bytes[32..36]), 48);
        assert_eq!(&bytes[48..52], b"PNG ");
        // 5 byte payload padded to 6
        assert_eq!(read_be_u32(&bytes[44..48]), 62);
        assert_eq!(&bytes[62..66], b"OGGV");
        assert_eq!(bytes.len(), 62 + 8 + 4);
        assert_eq!(read_be_u32(&bytes[4..8]) as usize, bytes.len() - 8);
    }
}
