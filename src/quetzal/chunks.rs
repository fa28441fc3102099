//! Fixed-layout Quetzal chunks

use crate::error::BlorbError;
use crate::util::read_be_u16;

/// Story identity (`IFhd`), 13 bytes. Blorb game identifier chunks share
/// the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IFhdChunk {
    /// Release number (from 0x02 in header)
    pub release: u16,
    /// Serial number (6 bytes from 0x12 in header)
    pub serial: [u8; 6],
    /// Checksum (from 0x1C in header)
    pub checksum: u16,
    /// Program counter, 24 bits
    pub initial_pc: u32,
}

impl IFhdChunk {
    pub const LEN: usize = 13;

    /// Identify a story from its header bytes
    pub fn from_story(story: &[u8]) -> Result<Self, BlorbError> {
        if story.len() < 0x40 {
            return Err(BlorbError::Save("story too small for header".to_string()));
        }
        let mut serial = [0u8; 6];
        serial.copy_from_slice(&story[0x12..0x18]);

        Ok(IFhdChunk {
            release: read_be_u16(&story[0x02..]),
            serial,
            checksum: read_be_u16(&story[0x1C..]),
            initial_pc: 0,
        })
    }

    /// Same story, ignoring the saved program counter
    pub fn same_story(&self, other: &IFhdChunk) -> bool {
        self.release == other.release
            && self.serial == other.serial
            && self.checksum == other.checksum
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::LEN);

        bytes.extend_from_slice(&self.release.to_be_bytes());
        bytes.extend_from_slice(&self.serial);
        bytes.extend_from_slice(&self.checksum.to_be_bytes());

        let pc_bytes = self.initial_pc.to_be_bytes();
        bytes.extend_from_slice(&pc_bytes[1..4]);

        bytes
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, BlorbError> {
        if data.len() < Self::LEN {
            return Err(BlorbError::Save("IFhd chunk too small".to_string()));
        }

        let mut serial = [0u8; 6];
        serial.copy_from_slice(&data[2..8]);

        Ok(IFhdChunk {
            release: read_be_u16(data),
            serial,
            checksum: read_be_u16(&data[8..]),
            initial_pc: ((data[10] as u32) << 16) | ((data[11] as u32) << 8) | (data[12] as u32),
        })
    }
}

/// Interpreter-specific data (`IntD`)
pub struct IntDChunk {
    /// Operating system identifier
    pub os_id: [u8; 4],
    /// Interpreter identifier
    pub interpreter_id: [u8; 4],
    pub data: Vec<u8>,
}

impl Default for IntDChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl IntDChunk {
    pub fn new() -> Self {
        IntDChunk {
            os_id: *b"UNIX",
            interpreter_id: *b"ZBLB",
            data: Vec::new(),
        }
    }

    /// Serialize to bytes: os id, flags, contents id, reserved, interpreter id, data
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(12 + self.data.len());
        bytes.extend_from_slice(&self.os_id);
        bytes.push(0); // flags
        bytes.push(0); // contents id
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(&self.interpreter_id);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}
