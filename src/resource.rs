//! Resource loading from a Blorb container
//!
//! A resource either points into the container file (`FilePos`) or carries
//! its own copy of the payload (`Memory`). File handles are shared through a
//! mutex: every read seeks and reads while holding the lock, so no view ever
//! depends on where another one left the file position.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, info};
use serde::Deserialize;

use crate::blorb_map::{BlorbMap, Usage};
use crate::chunk_reader::{open_container, Chunk};
use crate::deflate_frame::inflate_raw;
use crate::error::BlorbError;
use crate::util::{id_str, ChunkId};

/// Anything a container or story can be read from
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Container handle shared between the loader and the views it hands out
pub type SharedHandle = Arc<Mutex<Box<dyn ReadSeek>>>;

/// How a resource is materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMethod {
    /// Position and length only, payload stays in the file
    FilePos,
    /// Payload copied into memory
    Memory,
}

/// A file handle a view reads through: the container's shared one, or one
/// opened for this view alone
pub enum Handle {
    Shared(SharedHandle),
    Owned(Box<dyn ReadSeek>),
}

impl Handle {
    /// Seek to `pos` and read into `buf` as one step
    pub fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Handle::Shared(shared) => {
                let mut file = shared
                    .lock()
                    .map_err(|_| io::Error::other("file handle lock poisoned"))?;
                file.seek(SeekFrom::Start(pos))?;
                file.read(buf)
            }
            Handle::Owned(file) => {
                file.seek(SeekFrom::Start(pos))?;
                file.read(buf)
            }
        }
    }

    /// Like `read_at`, but fills the whole buffer
    pub fn read_exact_at(&mut self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        match self {
            Handle::Shared(shared) => {
                let mut file = shared
                    .lock()
                    .map_err(|_| io::Error::other("file handle lock poisoned"))?;
                file.seek(SeekFrom::Start(pos))?;
                file.read_exact(buf)
            }
            Handle::Owned(file) => {
                file.seek(SeekFrom::Start(pos))?;
                file.read_exact(buf)
            }
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Handle::Owned(_))
    }
}

pub enum ResourceData {
    FilePos { handle: Handle, start: u64, length: u64 },
    Memory(Vec<u8>),
}

/// A loaded chunk
pub struct Resource {
    pub chunk_index: usize,
    pub chunk_type: ChunkId,
    data: ResourceData,
}

impl Resource {
    pub fn len(&self) -> u64 {
        match &self.data {
            ResourceData::FilePos { length, .. } => *length,
            ResourceData::Memory(buf) => buf.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// File offset of the payload for `FilePos` resources
    pub fn start(&self) -> Option<u64> {
        match &self.data {
            ResourceData::FilePos { start, .. } => Some(*start),
            ResourceData::Memory(_) => None,
        }
    }

    /// The payload of a `Memory` resource
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.data {
            ResourceData::Memory(buf) => Some(buf),
            ResourceData::FilePos { .. } => None,
        }
    }

    pub fn data(&self) -> &ResourceData {
        &self.data
    }

    /// Read payload bytes starting at `offset` within the chunk. Never reads
    /// outside the chunk; returns 0 at or past its end.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, BlorbError> {
        let len = self.len();
        if offset >= len {
            return Ok(0);
        }
        let n = (len - offset).min(buf.len() as u64) as usize;

        match &mut self.data {
            ResourceData::Memory(data) => {
                let at = offset as usize;
                buf[..n].copy_from_slice(&data[at..at + n]);
                Ok(n)
            }
            ResourceData::FilePos { handle, start, .. } => {
                handle.read_exact_at(*start + offset, &mut buf[..n])?;
                Ok(n)
            }
        }
    }

    /// The whole payload, copied for `FilePos` resources
    pub fn read_to_vec(&mut self) -> Result<Vec<u8>, BlorbError> {
        if let ResourceData::Memory(data) = &self.data {
            return Ok(data.clone());
        }
        let mut data = vec![0u8; self.len() as usize];
        let n = self.read_at(0, &mut data)?;
        data.truncate(n);
        Ok(data)
    }

    /// Raw-inflate the payload of a chunk stored deflated
    pub fn inflate(&mut self, uncompressed_size: u32) -> Result<Vec<u8>, BlorbError> {
        let compressed = self.read_to_vec()?;
        inflate_raw(&compressed, uncompressed_size)
    }

    /// Give the resource back: frees a memory copy, closes an owned handle,
    /// and leaves the container's shared handle open
    pub fn release(self) {
        match &self.data {
            ResourceData::Memory(buf) => {
                debug!("Releasing chunk {} ({} bytes in memory)", self.chunk_index, buf.len())
            }
            ResourceData::FilePos { handle, .. } if handle.is_owned() => {
                debug!("Releasing chunk {} and closing its file", self.chunk_index)
            }
            ResourceData::FilePos { .. } => debug!("Releasing chunk {}", self.chunk_index),
        }
    }
}

/// A Blorb map together with the file it was built from
pub struct ResourceLoader {
    map: BlorbMap,
    handle: SharedHandle,
    path: Option<PathBuf>,
}

impl ResourceLoader {
    /// Open a Blorb file from disk
    pub fn open(path: &Path) -> Result<Self, BlorbError> {
        let file = File::open(path)?;
        let mut loader = Self::from_reader(file)?;
        loader.path = Some(path.to_path_buf());
        info!("Loaded resources from {:?}", path);
        Ok(loader)
    }

    /// Build the map from any seekable source. The loader keeps the source
    /// for its whole lifetime.
    pub fn from_reader<R: ReadSeek + 'static>(mut reader: R) -> Result<Self, BlorbError> {
        let container = open_container(&mut reader)?;
        let map = BlorbMap::build(container, &mut reader)?;
        let source: Box<dyn ReadSeek> = Box::new(reader);
        Ok(ResourceLoader {
            map,
            handle: Arc::new(Mutex::new(source)),
            path: None,
        })
    }

    pub fn map(&self) -> &BlorbMap {
        &self.map
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// A share of the container handle
    pub fn handle(&self) -> SharedHandle {
        Arc::clone(&self.handle)
    }

    fn chunk(&self, chunk_index: usize) -> Result<Chunk, BlorbError> {
        self.map
            .chunk(chunk_index)
            .copied()
            .ok_or_else(|| BlorbError::NotFound(format!("chunk {}", chunk_index)))
    }

    pub fn load_chunk(
        &self,
        chunk_index: usize,
        method: LoadMethod,
    ) -> Result<Resource, BlorbError> {
        let chunk = self.chunk(chunk_index)?;
        let data = match method {
            LoadMethod::FilePos => ResourceData::FilePos {
                handle: Handle::Shared(self.handle()),
                start: chunk.offset as u64,
                length: chunk.length as u64,
            },
            LoadMethod::Memory => {
                let mut buf = vec![0u8; chunk.length as usize];
                Handle::Shared(self.handle()).read_exact_at(chunk.offset as u64, &mut buf)?;
                ResourceData::Memory(buf)
            }
        };
        debug!(
            "Loaded chunk {} ('{}', {} bytes) as {:?}",
            chunk_index,
            id_str(&chunk.id),
            chunk.length,
            method
        );
        Ok(Resource {
            chunk_index,
            chunk_type: chunk.id,
            data,
        })
    }

    pub fn load_resource(
        &self,
        usage: Usage,
        number: u32,
        method: LoadMethod,
    ) -> Result<Resource, BlorbError> {
        let chunk_index = self.map.find_resource_chunk(usage, number)?;
        self.load_chunk(chunk_index, method)
    }

    /// Load the `nth` chunk of a type, e.g. the first `ZCOD`
    pub fn load_chunk_by_type(
        &self,
        chunk_type: &ChunkId,
        nth: usize,
        method: LoadMethod,
    ) -> Result<Resource, BlorbError> {
        let chunk_index = self.map.find_chunk_by_type(chunk_type, nth)?;
        self.load_chunk(chunk_index, method)
    }

    /// Load a `FilePos` resource with a file handle of its own, for readers
    /// that run alongside other users of the container
    pub fn load_resource_exclusive(
        &self,
        usage: Usage,
        number: u32,
    ) -> Result<Resource, BlorbError> {
        let path = self.path.as_ref().ok_or_else(|| {
            BlorbError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "container was not opened from a file",
            ))
        })?;
        let chunk_index = self.map.find_resource_chunk(usage, number)?;
        let chunk = self.chunk(chunk_index)?;
        let file = File::open(path)?;
        Ok(Resource {
            chunk_index,
            chunk_type: chunk.id,
            data: ResourceData::FilePos {
                handle: Handle::Owned(Box::new(file)),
                start: chunk.offset as u64,
                length: chunk.length as u64,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blorb_writer::BlorbBuilder;
    use crate::deflate_frame::tests::deflate;
    use std::io::Cursor;
    use test_log::test;

    fn loader() -> ResourceLoader {
        let mut builder = BlorbBuilder::new();
        builder.add_resource(Usage::Exec, 0, *b"ZCOD", (0..64).collect());
        builder.add_resource(Usage::Snd, 2, *b"OGGV", b"OggS and then some".to_vec());
        builder.add_resource(Usage::Pict, 1, *b"PNG ", vec![0x89, b'P', b'N']);
        ResourceLoader::from_reader(Cursor::new(builder.to_bytes())).unwrap()
    }

    #[test]
    fn file_pos_and_memory_agree() {
        let loader = loader();
        let mut by_pos = loader.load_resource(Usage::Snd, 2, LoadMethod::FilePos).unwrap();
        let by_mem = loader.load_resource(Usage::Snd, 2, LoadMethod::Memory).unwrap();

        assert_eq!(&by_pos.chunk_type, b"OGGV");
        assert!(by_pos.start().is_some());
        assert!(by_pos.bytes().is_none());
        assert_eq!(by_pos.len(), 18);
        assert_eq!(by_pos.read_to_vec().unwrap(), by_mem.bytes().unwrap());
        assert_eq!(by_mem.bytes().unwrap(), b"OggS and then some");

        by_pos.release();
        by_mem.release();
    }

    #[test]
    fn interleaved_reads_on_shared_handle() {
        let loader = loader();
        let mut exec = loader.load_resource(Usage::Exec, 0, LoadMethod::FilePos).unwrap();
        let mut pict = loader.load_resource(Usage::Pict, 1, LoadMethod::FilePos).unwrap();

        let mut a = [0u8; 4];
        let mut b = [0u8; 2];
        assert_eq!(exec.read_at(10, &mut a).unwrap(), 4);
        assert_eq!(pict.read_at(1, &mut b).unwrap(), 2);
        assert_eq!(exec.read_at(14, &mut b).unwrap(), 2);
        assert_eq!(a, [10, 11, 12, 13]);
        assert_eq!(b, [14, 15]);
    }

    #[test]
    fn reads_stay_inside_chunk() {
        let loader = loader();
        let mut pict = loader.load_resource(Usage::Pict, 1, LoadMethod::FilePos).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(pict.read_at(0, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[0x89, b'P', b'N']);
        assert_eq!(pict.read_at(3, &mut buf).unwrap(), 0);
        assert_eq!(pict.read_at(100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn missing_resource() {
        let loader = loader();
        assert!(matches!(
            loader.load_resource(Usage::Snd, 9, LoadMethod::Memory),
            Err(BlorbError::NotFound(_))
        ));
        assert!(loader.load_chunk(99, LoadMethod::FilePos).is_err());
    }

    #[test]
    fn exclusive_handle_needs_a_path() {
        let loader = loader();
        assert!(loader.load_resource_exclusive(Usage::Snd, 2).is_err());
    }

    #[test]
    fn exclusive_handle_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.blb");
        let mut builder = BlorbBuilder::new();
        builder.add_resource(Usage::Snd, 1, *b"MOD ", vec![5; 9]);
        builder.write_to_file(&path).unwrap();

        let loader = ResourceLoader::open(&path).unwrap();
        assert_eq!(loader.path(), Some(path.as_path()));
        let mut res = loader.load_resource_exclusive(Usage::Snd, 1).unwrap();
        assert!(matches!(res.data(), ResourceData::FilePos { handle, .. } if handle.is_owned()));
        assert_eq!(res.read_to_vec().unwrap(), vec![5; 9]);
        res.release();
    }

    fn deflated_loader(plain: &[u8]) -> ResourceLoader {
        let mut builder = BlorbBuilder::new();
        builder.add_resource(Usage::Data, 1, *b"BINA", deflate(plain));
        ResourceLoader::from_reader(Cursor::new(builder.to_bytes())).unwrap()
    }

    #[test]
    fn inflate_deflated_chunk() {
        let plain: Vec<u8> = (0..500u32).map(|i| (i * 13 % 97) as u8).collect();
        let loader = deflated_loader(&plain);

        let mut by_pos = loader.load_resource(Usage::Data, 1, LoadMethod::FilePos).unwrap();
        assert_eq!(by_pos.inflate(500).unwrap(), plain);

        let mut by_mem = loader.load_resource(Usage::Data, 1, LoadMethod::Memory).unwrap();
        assert_eq!(by_mem.inflate(500).unwrap(), plain);
    }

    #[test]
    fn inflate_with_wrong_size() {
        let plain = vec![b'z'; 500];
        let loader = deflated_loader(&plain);
        let mut res = loader.load_resource(Usage::Data, 1, LoadMethod::FilePos).unwrap();

        assert!(matches!(res.inflate(499), Err(BlorbError::Decompress(_))));
        assert!(matches!(res.inflate(501), Err(BlorbError::Decompress(_))));
        // A failed attempt leaves the resource usable
        assert_eq!(res.inflate(500).unwrap(), plain);
    }

    #[test]
    fn first_chunk_of_type() {
        let loader = loader();
        let mut zcode = loader.load_chunk_by_type(b"ZCOD", 0, LoadMethod::FilePos).unwrap();
        assert_eq!(zcode.read_to_vec().unwrap().len(), 64);
    }
}
