//! Quetzal save states: writing and restoring `IFZS` forms

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use log::{debug, info, warn};

use crate::error::BlorbError;
use crate::iff::IffFile;
use crate::quetzal::chunks::{IFhdChunk, IntDChunk};
use crate::quetzal::compressed_memory::{compress_memory, decompress_memory};
use crate::util::ChunkId;

/// Form type of a Quetzal save file
pub const QUETZAL_FORM_TYPE: ChunkId = *b"IFZS";

/// Interpreter state as far as the save format is concerned. The stack
/// payload is opaque here; the VM owns its layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveState {
    pub ident: IFhdChunk,
    /// Dynamic memory at the time of the save
    pub memory: Vec<u8>,
    /// `Stks` chunk payload
    pub stacks: Vec<u8>,
}

impl SaveState {
    /// Build the IFF form, compressing memory against the original story's
    /// dynamic memory
    pub fn to_iff(&self, original: &[u8]) -> Result<IffFile, BlorbError> {
        let mut iff = IffFile::new(QUETZAL_FORM_TYPE);

        iff.add_chunk(*b"IFhd", self.ident.to_bytes());

        let cmem = compress_memory(&self.memory, original)?;
        debug!("Added CMem chunk ({} bytes compressed)", cmem.len());
        iff.add_chunk(*b"CMem", cmem);

        iff.add_chunk(*b"Stks", self.stacks.clone());
        debug!("Added Stks chunk ({} bytes)", self.stacks.len());

        iff.add_chunk(*b"IntD", IntDChunk::new().to_bytes());
        Ok(iff)
    }

    pub fn to_bytes(&self, original: &[u8]) -> Result<Vec<u8>, BlorbError> {
        Ok(self.to_iff(original)?.to_bytes())
    }

    /// Parse a save, accepting compressed or uncompressed memory
    pub fn from_iff(iff: &IffFile, original: &[u8]) -> Result<Self, BlorbError> {
        let ifhd = iff
            .find_chunk(b"IFhd")
            .ok_or_else(|| BlorbError::Save("missing required IFhd chunk".to_string()))?;
        let ident = IFhdChunk::from_bytes(&ifhd.data)?;

        let memory = if let Some(cmem) = iff.find_chunk(b"CMem") {
            debug!("Restoring from CMem chunk");
            decompress_memory(&cmem.data, original)?
        } else if let Some(umem) = iff.find_chunk(b"UMem") {
            debug!("Restoring from UMem chunk");
            if umem.data.len() != original.len() {
                return Err(BlorbError::Save(format!(
                    "UMem size {} doesn't match dynamic memory size {}",
                    umem.data.len(),
                    original.len()
                )));
            }
            umem.data.clone()
        } else {
            return Err(BlorbError::Save("missing memory chunk (CMem or UMem)".to_string()));
        };

        let stacks = iff
            .find_chunk(b"Stks")
            .ok_or_else(|| BlorbError::Save("missing required Stks chunk".to_string()))?
            .data
            .clone();

        Ok(SaveState {
            ident,
            memory,
            stacks,
        })
    }

    pub fn from_bytes(bytes: &[u8], original: &[u8]) -> Result<Self, BlorbError> {
        let iff = read_quetzal(&mut Cursor::new(bytes))?;
        Self::from_iff(&iff, original)
    }

    /// Whether this save belongs to the given story file
    pub fn matches_story(&self, story: &[u8]) -> bool {
        match IFhdChunk::from_story(story) {
            Ok(ident) => {
                if !self.ident.same_story(&ident) {
                    warn!(
                        "Save file is for release {}, but game is release {}",
                        self.ident.release, ident.release
                    );
                    return false;
                }
                true
            }
            Err(_) => false,
        }
    }

    pub fn write_to_file(&self, path: &Path, original: &[u8]) -> Result<(), BlorbError> {
        info!("Saving game to {:?}", path);
        self.to_iff(original)?.write_to_file(path)
    }

    pub fn read_from_file(path: &Path, original: &[u8]) -> Result<Self, BlorbError> {
        info!("Loading save game from {:?}", path);
        let mut file = File::open(path)?;
        let iff = read_quetzal(&mut file)?;
        Self::from_iff(&iff, original)
    }
}

fn read_quetzal<R: Read + Seek>(reader: &mut R) -> Result<IffFile, BlorbError> {
    IffFile::read_from(reader, &QUETZAL_FORM_TYPE).map_err(|e| match e {
        BlorbError::Format(msg) => BlorbError::Save(format!("not a Quetzal save file: {}", msg)),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn story() -> Vec<u8> {
        let mut story = vec![0u8; 0x100];
        story[0] = 3;
        story[2..4].copy_from_slice(&59u16.to_be_bytes());
        story[0x12..0x18].copy_from_slice(b"870917");
        story[0x1C..0x1E].copy_from_slice(&0x1234u16.to_be_bytes());
        story
    }

    fn state(original: &[u8]) -> SaveState {
        let mut memory = original.to_vec();
        memory[0x50] = 0xAA;
        memory[0xF0] = 0x55;
        SaveState {
            ident: IFhdChunk {
                initial_pc: 0x4F05,
                ..IFhdChunk::from_story(original).unwrap()
            },
            memory,
            stacks: vec![0, 0, 0, 0, 0, 2, 0x12, 0x34, 0xAB, 0xCD],
        }
    }

    #[test]
    fn save_and_restore() {
        let original = story();
        let saved = state(&original);

        let bytes = saved.to_bytes(&original).unwrap();
        assert_eq!(&bytes[8..12], b"IFZS");

        let restored = SaveState::from_bytes(&bytes, &original).unwrap();
        assert_eq!(restored, saved);
        assert!(restored.matches_story(&original));
    }

    #[test]
    fn restore_from_uncompressed_memory() {
        let original = story();
        let saved = state(&original);

        let mut iff = IffFile::new(QUETZAL_FORM_TYPE);
        iff.add_chunk(*b"IFhd", saved.ident.to_bytes());
        iff.add_chunk(*b"UMem", saved.memory.clone());
        iff.add_chunk(*b"Stks", saved.stacks.clone());

        let restored = SaveState::from_bytes(&iff.to_bytes(), &original).unwrap();
        assert_eq!(restored.memory, saved.memory);
    }

    #[test]
    fn other_story_does_not_match() {
        let original = story();
        let saved = state(&original);
        let mut other = original.clone();
        other[3] = 60;
        assert!(!saved.matches_story(&other));
    }

    #[test]
    fn rejects_incomplete_saves() {
        let original = story();
        let mut iff = IffFile::new(QUETZAL_FORM_TYPE);
        iff.add_chunk(*b"IFhd", state(&original).ident.to_bytes());
        iff.add_chunk(*b"Stks", Vec::new());
        assert!(matches!(
            SaveState::from_bytes(&iff.to_bytes(), &original),
            Err(BlorbError::Save(_))
        ));

        let mut blorb = IffFile::new(*b"IFRS");
        blorb.add_chunk(*b"IFhd", vec![0; 13]);
        assert!(matches!(
            SaveState::from_bytes(&blorb.to_bytes(), &original),
            Err(BlorbError::Save(_))
        ));
    }

    #[test]
    fn save_file_on_disk() {
        let original = story();
        let saved = state(&original);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.qzl");

        saved.write_to_file(&path, &original).unwrap();
        let restored = SaveState::read_from_file(&path, &original).unwrap();
        assert_eq!(restored, saved);
    }
}
