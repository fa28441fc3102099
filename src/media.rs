//! Sound and picture resources as the media ports consume them

use log::{debug, warn};

use crate::blorb_map::Usage;
use crate::error::BlorbError;
use crate::resource::{LoadMethod, Resource, ResourceLoader};
use crate::util::{padded_len, read_be_u16, read_be_u32, read_extended, ChunkId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundKind {
    Aiff,
    Ogg,
    Mod,
}

impl SoundKind {
    pub fn from_chunk_type(chunk_type: &ChunkId) -> Option<SoundKind> {
        match chunk_type {
            b"FORM" | b"AIFF" => Some(SoundKind::Aiff),
            b"OGGV" => Some(SoundKind::Ogg),
            b"MOD " => Some(SoundKind::Mod),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureKind {
    Png,
    Jpeg,
    Rect,
}

impl PictureKind {
    pub fn from_chunk_type(chunk_type: &ChunkId) -> Option<PictureKind> {
        match chunk_type {
            b"PNG " => Some(PictureKind::Png),
            b"JPEG" => Some(PictureKind::Jpeg),
            b"Rect" => Some(PictureKind::Rect),
            _ => None,
        }
    }
}

/// Format of an AIFF sample, from its COMM chunk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleData {
    pub channels: u16,
    pub frames: u32,
    pub bits: u16,
    pub rate: f64,
}

/// Reads the COMM chunk of an AIFF sound resource
pub fn sample_info(resource: &mut Resource) -> Result<SampleData, BlorbError> {
    let mut form_type = [0u8; 4];
    let got = resource.read_at(0, &mut form_type)?;
    if got < 4 || !(&form_type == b"AIFF" || &form_type == b"AIFC") {
        return Err(BlorbError::Format("sound resource is not an AIFF form".to_string()));
    }

    let len = resource.len();
    let mut pos = 4u64;
    while pos + 8 <= len {
        let mut header = [0u8; 8];
        resource.read_at(pos, &mut header)?;
        let length = read_be_u32(&header[4..8]);

        if &header[0..4] == b"COMM" {
            let mut comm = [0u8; 18];
            if length < 18 || resource.read_at(pos + 8, &mut comm)? < 18 {
                return Err(BlorbError::Format("AIFF COMM chunk too small".to_string()));
            }
            let mut rate = [0u8; 10];
            rate.copy_from_slice(&comm[8..18]);
            return Ok(SampleData {
                channels: read_be_u16(&comm[0..2]),
                frames: read_be_u32(&comm[2..6]),
                bits: read_be_u16(&comm[6..8]),
                rate: read_extended(&rate),
            });
        }
        pos += 8 + padded_len(length);
    }

    Err(BlorbError::Format("AIFF sound has no COMM chunk".to_string()))
}

/// Width and height of a picture resource, where the format makes them
/// cheap to find
pub fn picture_size(resource: &mut Resource) -> Result<Option<(u32, u32)>, BlorbError> {
    match PictureKind::from_chunk_type(&resource.chunk_type) {
        Some(PictureKind::Png) => {
            let mut head = [0u8; 24];
            if resource.read_at(0, &mut head)? < 24
                || &head[1..4] != b"PNG"
                || &head[12..16] != b"IHDR"
            {
                warn!("Picture chunk {} is not a readable PNG", resource.chunk_index);
                return Ok(None);
            }
            Ok(Some((read_be_u32(&head[16..20]), read_be_u32(&head[20..24]))))
        }
        Some(PictureKind::Rect) => {
            let mut rect = [0u8; 8];
            if resource.read_at(0, &mut rect)? < 8 {
                return Ok(None);
            }
            Ok(Some((read_be_u32(&rect[0..4]), read_be_u32(&rect[4..8]))))
        }
        Some(PictureKind::Jpeg) => jpeg_size(resource),
        None => Ok(None),
    }
}

// Walks JPEG segments up to the first start-of-frame marker
fn jpeg_size(resource: &mut Resource) -> Result<Option<(u32, u32)>, BlorbError> {
    let len = resource.len();
    let mut marker = [0u8; 2];
    if resource.read_at(0, &mut marker)? < 2 || marker != [0xFF, 0xD8] {
        return Ok(None);
    }

    let mut pos = 2u64;
    while pos + 4 <= len {
        let mut segment = [0u8; 4];
        resource.read_at(pos, &mut segment)?;
        if segment[0] != 0xFF {
            return Ok(None);
        }
        let kind = segment[1];
        let length = read_be_u16(&segment[2..4]) as u64;

        let is_frame = (0xC0..=0xCF).contains(&kind) && !matches!(kind, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            let mut frame = [0u8; 5];
            if resource.read_at(pos + 4, &mut frame)? < 5 {
                return Ok(None);
            }
            let height = read_be_u16(&frame[1..3]) as u32;
            let width = read_be_u16(&frame[3..5]) as u32;
            return Ok(Some((width, height)));
        }
        if length < 2 {
            return Ok(None);
        }
        pos += 2 + length;
    }
    Ok(None)
}

/// Volume on the 1..=8 scale, 255 meaning the default (loudest)
pub fn normalize_volume(volume: u8) -> u8 {
    match volume {
        255 => 8,
        v => v.clamp(1, 8),
    }
}

/// The audio side of a port
pub trait SamplePlayer {
    /// Play a sound `repeats` times (255 forever) at a volume of 1..=8
    fn start_sample(
        &mut self,
        number: u32,
        kind: SoundKind,
        resource: Resource,
        volume: u8,
        repeats: u8,
    ) -> Result<(), BlorbError>;

    fn stop_sample(&mut self, number: u32, kind: SoundKind);
}

fn sound_resource(loader: &ResourceLoader, number: u32) -> Option<(SoundKind, Resource)> {
    let resource = match loader.load_resource(Usage::Snd, number, LoadMethod::FilePos) {
        Ok(resource) => resource,
        Err(e) => {
            debug!("No sound {}: {}", number, e);
            return None;
        }
    };
    match SoundKind::from_chunk_type(&resource.chunk_type) {
        Some(kind) => Some((kind, resource)),
        None => {
            debug!("Sound {} has an unplayable chunk type", number);
            resource.release();
            None
        }
    }
}

/// Hand a sound to the player. Missing resources and unknown formats are
/// ignored and reported as `false`.
pub fn start_sample(
    loader: Option<&ResourceLoader>,
    player: &mut dyn SamplePlayer,
    number: u32,
    volume: u8,
    repeats: u8,
) -> Result<bool, BlorbError> {
    let Some(loader) = loader else {
        return Ok(false);
    };
    let Some((kind, resource)) = sound_resource(loader, number) else {
        return Ok(false);
    };
    player.start_sample(number, kind, resource, normalize_volume(volume), repeats)?;
    Ok(true)
}

pub fn stop_sample(
    loader: Option<&ResourceLoader>,
    player: &mut dyn SamplePlayer,
    number: u32,
) -> bool {
    let Some(loader) = loader else {
        return false;
    };
    match sound_resource(loader, number) {
        Some((kind, resource)) => {
            resource.release();
            player.stop_sample(number, kind);
            true
        }
        None => false,
    }
}
