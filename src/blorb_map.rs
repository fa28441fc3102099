//! Blorb resource map
//!
//! Resolves (usage, number) pairs to chunks through the `RIdx` index chunk,
//! and picks up the optional auxiliary chunks a Blorb file may carry.

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Seek};

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::chunk_reader::{read_payload, Chunk, Container};
use crate::error::BlorbError;
use crate::quetzal::chunks::IFhdChunk;
use crate::util::{id_str, read_be_u16, read_be_u32, ChunkId};

/// What a resource is used for, from the usage field of an index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Usage {
    Pict,
    Snd,
    Exec,
    Data,
}

lazy_static! {
    static ref USAGE_CHUNK_TYPES: HashMap<Usage, Vec<ChunkId>> = {
        let mut m = HashMap::new();
        m.insert(Usage::Pict, vec![*b"PNG ", *b"JPEG", *b"Rect"]);
        m.insert(Usage::Snd, vec![*b"FORM", *b"OGGV", *b"MOD ", *b"AIFF"]);
        m.insert(
            Usage::Exec,
            vec![
                *b"ZCOD", *b"GLUL", *b"TAD2", *b"TAD3", *b"HUGO", *b"ALAN", *b"ADRI", *b"LEVE",
                *b"AGT ", *b"MAGS", *b"ADVS", *b"EXEC",
            ],
        );
        m.insert(Usage::Data, vec![*b"TEXT", *b"BINA", *b"FORM"]);
        m
    };
}

impl Usage {
    pub fn from_tag(tag: &ChunkId) -> Option<Usage> {
        match tag {
            b"Pict" => Some(Usage::Pict),
            b"Snd " => Some(Usage::Snd),
            b"Exec" => Some(Usage::Exec),
            b"Data" => Some(Usage::Data),
            _ => None,
        }
    }

    pub fn tag(&self) -> ChunkId {
        match self {
            Usage::Pict => *b"Pict",
            Usage::Snd => *b"Snd ",
            Usage::Exec => *b"Exec",
            Usage::Data => *b"Data",
        }
    }

    /// Whether a chunk of this type may be indexed under this usage
    pub fn allows(&self, chunk_type: &ChunkId) -> bool {
        USAGE_CHUNK_TYPES
            .get(self)
            .map_or(false, |types| types.contains(chunk_type))
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(id_str(&self.tag()).trim_end())
    }
}

/// One resolved index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceEntry {
    pub usage: Usage,
    pub number: u32,
    pub chunk_index: usize,
}

/// Index of a Blorb container
#[derive(Debug, Clone)]
pub struct BlorbMap {
    container: Container,
    index: IndexMap<(Usage, u32), usize>,
    frontispiece: Option<u32>,
    release_number: Option<u16>,
    game_identifier: Option<IFhdChunk>,
    metadata: Option<String>,
}

impl BlorbMap {
    /// Builds the usage index from the container's `RIdx` chunk.
    ///
    /// A container without an index is reported as `MissingIndex`, apart
    /// from the `Format` errors of a broken index.
    pub fn build<R: Read + Seek>(container: Container, reader: &mut R) -> Result<Self, BlorbError> {
        let ridx = container.find_chunk(b"RIdx").ok_or(BlorbError::MissingIndex)?;
        let data = read_payload(reader, &container.chunks[ridx])?;
        if data.len() < 4 {
            return Err(BlorbError::Format("resource index too small".to_string()));
        }

        let count = read_be_u32(&data[0..4]) as u64;
        if 4 + count * 12 > data.len() as u64 {
            return Err(BlorbError::Format(format!(
                "resource index declares {} entries but holds only {} bytes",
                count,
                data.len()
            )));
        }

        let by_header: HashMap<u32, usize> = container
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.header_offset(), i))
            .collect();

        let mut index = IndexMap::with_capacity(count as usize);
        for entry in data[4..4 + count as usize * 12].chunks_exact(12) {
            let mut tag = [0u8; 4];
            tag.copy_from_slice(&entry[0..4]);
            let number = read_be_u32(&entry[4..8]);
            let start = read_be_u32(&entry[8..12]);

            let usage = match Usage::from_tag(&tag) {
                Some(usage) => usage,
                None => {
                    warn!("Skipping index entry with unknown usage '{}'", id_str(&tag));
                    continue;
                }
            };

            let chunk_index = *by_header.get(&start).ok_or_else(|| {
                BlorbError::Format(format!(
                    "{} resource {} points at {:#x}, which is not a chunk",
                    usage, number, start
                ))
            })?;

            let chunk_type = container.chunks[chunk_index].id;
            if !usage.allows(&chunk_type) {
                return Err(BlorbError::Format(format!(
                    "{} resource {} is a '{}' chunk",
                    usage,
                    number,
                    id_str(&chunk_type)
                )));
            }

            if index.contains_key(&(usage, number)) {
                warn!("Duplicate index entry for {} resource {}, keeping the first", usage, number);
                continue;
            }
            debug!("{} {} -> chunk {}", usage, number, chunk_index);
            index.insert((usage, number), chunk_index);
        }

        let mut map = BlorbMap {
            container,
            index,
            frontispiece: None,
            release_number: None,
            game_identifier: None,
            metadata: None,
        };
        map.read_auxiliary_chunks(reader)?;

        info!(
            "Blorb map built: {} chunks, {} indexed resources",
            map.container.chunks.len(),
            map.index.len()
        );
        Ok(map)
    }

    fn read_auxiliary_chunks<R: Read + Seek>(&mut self, reader: &mut R) -> Result<(), BlorbError> {
        if let Some(i) = self.container.find_chunk(b"Fspc") {
            let data = read_payload(reader, &self.container.chunks[i])?;
            if data.len() >= 4 {
                self.frontispiece = Some(read_be_u32(&data));
            } else {
                warn!("Ignoring short Fspc chunk");
            }
        }

        if let Some(i) = self.container.find_chunk(b"RelN") {
            let data = read_payload(reader, &self.container.chunks[i])?;
            if data.len() >= 2 {
                self.release_number = Some(read_be_u16(&data));
            } else {
                warn!("Ignoring short RelN chunk");
            }
        }

        if let Some(i) = self.container.find_chunk(b"IFhd") {
            let data = read_payload(reader, &self.container.chunks[i])?;
            match IFhdChunk::from_bytes(&data) {
                Ok(ident) => self.game_identifier = Some(ident),
                Err(e) => warn!("Ignoring game identifier chunk: {}", e),
            }
        }

        if let Some(i) = self.container.find_chunk(b"IFmd") {
            let data = read_payload(reader, &self.container.chunks[i])?;
            self.metadata = Some(String::from_utf8_lossy(&data).into_owned());
        }

        Ok(())
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.container.chunks
    }

    pub fn chunk(&self, chunk_index: usize) -> Option<&Chunk> {
        self.container.chunk(chunk_index)
    }

    pub fn find_resource_chunk(&self, usage: Usage, number: u32) -> Result<usize, BlorbError> {
        self.index
            .get(&(usage, number))
            .copied()
            .ok_or_else(|| BlorbError::NotFound(format!("{} resource {}", usage, number)))
    }

    /// The executable chunk (`Exec` resource 0)
    pub fn exec_chunk(&self) -> Result<usize, BlorbError> {
        self.find_resource_chunk(Usage::Exec, 0)
    }

    /// Index of the `nth` chunk (counting from zero) with the given type,
    /// whether or not the resource index mentions it
    pub fn find_chunk_by_type(
        &self,
        chunk_type: &ChunkId,
        nth: usize,
    ) -> Result<usize, BlorbError> {
        self.container
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| &c.id == chunk_type)
            .map(|(i, _)| i)
            .nth(nth)
            .ok_or_else(|| BlorbError::NotFound(format!("'{}' chunk {}", id_str(chunk_type), nth)))
    }

    /// Number of resources with this usage and their lowest and highest
    /// numbers, or None when there are none
    pub fn count_resources(&self, usage: Usage) -> Option<(usize, u32, u32)> {
        let numbers = self.index.keys().filter(|(u, _)| *u == usage).map(|(_, n)| *n);
        numbers.fold(None, |acc, n| match acc {
            None => Some((1, n, n)),
            Some((count, min, max)) => Some((count + 1, min.min(n), max.max(n))),
        })
    }

    /// Index entries in file order
    pub fn resources(&self) -> impl Iterator<Item = ResourceEntry> + '_ {
        self.index.iter().map(|(&(usage, number), &chunk_index)| ResourceEntry {
            usage,
            number,
            chunk_index,
        })
    }

    /// Picture number of the cover art (`Fspc`)
    pub fn frontispiece(&self) -> Option<u32> {
        self.frontispiece
    }

    /// Release number (`RelN`)
    pub fn release_number(&self) -> Option<u16> {
        self.release_number
    }

    /// Story identification (`IFhd`)
    pub fn game_identifier(&self) -> Option<&IFhdChunk> {
        self.game_identifier.as_ref()
    }

    /// iFiction metadata text (`IFmd`)
    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blorb_writer::BlorbBuilder;
    use crate::chunk_reader::open_container;
    use crate::iff::IffFile;
    use std::io::Cursor;
    use test_log::test;

    fn build(bytes: Vec<u8>) -> Result<BlorbMap, BlorbError> {
        let mut cursor = Cursor::new(bytes);
        let container = open_container(&mut cursor)?;
        BlorbMap::build(container, &mut cursor)
    }

    fn sample() -> Vec<u8> {
        let mut builder = BlorbBuilder::new();
        builder.add_resource(Usage::Exec, 0, *b"ZCOD", vec![3; 64]);
        builder.add_resource(Usage::Pict, 1, *b"PNG ", vec![0x89; 33]);
        builder.add_resource(Usage::Snd, 3, *b"OGGV", vec![7; 10]);
        builder.add_resource(Usage::Snd, 5, *b"MOD ", vec![8; 11]);
        builder.add_chunk(*b"Fspc", 1u32.to_be_bytes().to_vec());
        builder.add_chunk(*b"RelN", 42u16.to_be_bytes().to_vec());
        builder.add_chunk(*b"IFmd", b"<ifindex/>".to_vec());
        builder.to_bytes()
    }

    #[test]
    fn resolves_index_entries() {
        let map = build(sample()).unwrap();

        let exec = map.exec_chunk().unwrap();
        assert_eq!(&map.chunk(exec).unwrap().id, b"ZCOD");
        let pict = map.find_resource_chunk(Usage::Pict, 1).unwrap();
        assert_eq!(&map.chunk(pict).unwrap().id, b"PNG ");
        assert_eq!(map.count_resources(Usage::Snd), Some((2, 3, 5)));
        assert_eq!(map.count_resources(Usage::Data), None);

        let usages: Vec<Usage> = map.resources().map(|r| r.usage).collect();
        assert_eq!(usages, vec![Usage::Exec, Usage::Pict, Usage::Snd, Usage::Snd]);
    }

    #[test]
    fn missing_resource_is_not_found() {
        let map = build(sample()).unwrap();

        assert!(matches!(
            map.find_resource_chunk(Usage::Snd, 4),
            Err(BlorbError::NotFound(_))
        ));
        assert!(matches!(
            map.find_resource_chunk(Usage::Pict, 0),
            Err(BlorbError::NotFound(_))
        ));
        // Lookups afterwards still work
        assert!(map.find_resource_chunk(Usage::Snd, 5).is_ok());
        assert_eq!(map.resources().count(), 4);
    }

    #[test]
    fn auxiliary_chunks() {
        let map = build(sample()).unwrap();
        assert_eq!(map.frontispiece(), Some(1));
        assert_eq!(map.release_number(), Some(42));
        assert_eq!(map.metadata(), Some("<ifindex/>"));
        assert!(map.game_identifier().is_none());
    }

    #[test]
    fn game_identifier_chunk() {
        let ident = IFhdChunk {
            release: 88,
            serial: *b"840726",
            checksum: 0xA129,
            initial_pc: 0x4F05,
        };
        let mut builder = BlorbBuilder::new();
        builder.add_resource(Usage::Exec, 0, *b"ZCOD", vec![3; 64]);
        builder.add_chunk(*b"IFhd", ident.to_bytes());
        builder.add_chunk(*b"RelN", 88u16.to_be_bytes().to_vec());

        let map = build(builder.to_bytes()).unwrap();
        let found = map.game_identifier().unwrap();
        assert_eq!(found.release, 88);
        assert_eq!(&found.serial, b"840726");
        assert_eq!(found.checksum, 0xA129);
        assert_eq!(found, &ident);
        // The odd-length IFhd chunk is padded, so RelN still lines up
        assert_eq!(map.release_number(), Some(88));
    }

    #[test]
    fn chunk_by_type() {
        let map = build(sample()).unwrap();
        let first = map.find_chunk_by_type(b"ZCOD", 0).unwrap();
        assert_eq!(first, map.exec_chunk().unwrap());
        assert!(map.find_chunk_by_type(b"ZCOD", 1).is_err());
    }

    #[test]
    fn container_without_index() {
        let mut iff = IffFile::new(*b"IFRS");
        iff.add_chunk(*b"ZCOD", vec![3; 64]);
        assert!(matches!(build(iff.to_bytes()), Err(BlorbError::MissingIndex)));
    }

    #[test]
    fn index_pointing_nowhere() {
        let mut iff = IffFile::new(*b"IFRS");
        let mut ridx = 1u32.to_be_bytes().to_vec();
        ridx.extend_from_slice(b"Pict");
        ridx.extend_from_slice(&0u32.to_be_bytes());
        ridx.extend_from_slice(&0x1234u32.to_be_bytes());
        iff.add_chunk(*b"RIdx", ridx);
        assert!(matches!(build(iff.to_bytes()), Err(BlorbError::Format(_))));
    }

    #[test]
    fn index_with_wrong_chunk_type() {
        let mut builder = BlorbBuilder::new();
        builder.add_resource(Usage::Pict, 0, *b"OGGV", vec![1, 2]);
        assert!(matches!(build(builder.to_bytes()), Err(BlorbError::Format(_))));
    }

    #[test]
    fn usage_tags() {
        assert_eq!(Usage::from_tag(b"Snd "), Some(Usage::Snd));
        assert_eq!(Usage::from_tag(b"Snd!"), None);
        assert_eq!(Usage::Snd.to_string(), "Snd");
        assert!(Usage::Snd.allows(b"FORM"));
        assert!(!Usage::Pict.allows(b"FORM"));
    }
}
