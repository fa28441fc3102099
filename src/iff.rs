//! IFF (Interchange File Format) writing, shared by Blorb and Quetzal files

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use crate::chunk_reader::{open_form, read_payload};
use crate::error::BlorbError;
use crate::util::ChunkId;

/// IFF file held in memory
pub struct IffFile {
    /// Form type, e.g. "IFRS" for Blorb or "IFZS" for Quetzal
    pub form_type: ChunkId,
    /// List of chunks in the file
    pub chunks: Vec<IffChunk>,
}

/// Individual chunk in an IFF file
pub struct IffChunk {
    /// 4-character chunk type identifier
    pub chunk_type: ChunkId,
    /// Chunk data
    pub data: Vec<u8>,
}

impl IffChunk {
    /// Bytes taken by the chunk in the file, header and padding included
    pub fn stored_len(&self) -> usize {
        8 + self.data.len() + (self.data.len() & 1)
    }
}

impl IffFile {
    pub fn new(form_type: ChunkId) -> Self {
        IffFile {
            form_type,
            chunks: Vec::new(),
        }
    }

    /// Add a chunk to the file
    pub fn add_chunk(&mut self, chunk_type: ChunkId, data: Vec<u8>) {
        self.chunks.push(IffChunk { chunk_type, data });
    }

    /// Value of the FORM length field: form type plus every stored chunk
    pub fn form_length(&self) -> usize {
        4 + self.chunks.iter().map(IffChunk::stored_len).sum::<usize>()
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), BlorbError> {
        out.write_all(b"FORM")?;
        out.write_all(&(self.form_length() as u32).to_be_bytes())?;
        out.write_all(&self.form_type)?;

        for chunk in &self.chunks {
            out.write_all(&chunk.chunk_type)?;
            out.write_all(&(chunk.data.len() as u32).to_be_bytes())?;
            out.write_all(&chunk.data)?;

            // Pad to even length if necessary
            if chunk.data.len() % 2 == 1 {
                out.write_all(&[0])?;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.form_length() + 8);
        // Writing into a Vec cannot fail
        let _ = self.write_to(&mut bytes);
        bytes
    }

    /// Write the IFF file to disk
    pub fn write_to_file(&self, path: &Path) -> Result<(), BlorbError> {
        let mut file = File::create(path)?;
        self.write_to(&mut file)?;
        file.flush()?;
        Ok(())
    }

    /// Read a whole IFF file of the expected form type into memory
    pub fn read_from<R: Read + Seek>(
        reader: &mut R,
        form_type: &ChunkId,
    ) -> Result<Self, BlorbError> {
        let container = open_form(reader, form_type)?;
        let mut iff = IffFile::new(container.form_type);
        for chunk in &container.chunks {
            iff.add_chunk(chunk.id, read_payload(reader, chunk)?);
        }
        Ok(iff)
    }

    /// Find a chunk by type
    pub fn find_chunk(&self, chunk_type: &ChunkId) -> Option<&IffChunk> {
        self.chunks.iter().find(|c| &c.chunk_type == chunk_type)
    }
}
