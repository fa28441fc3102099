//! Finding the Z-code for a story path
//!
//! The story may be a naked Z-code file, the executable chunk of a Blorb
//! file, or a single deflated PKZIP entry. Pictures and sounds come from the
//! Blorb itself or from a companion Blorb next to a naked story.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::chunk_reader::{is_blorb, open_container};
use crate::config::LocatorConfig;
use crate::deflate_frame::{decode_frame, LOCAL_HEADER_SIGNATURE};
use crate::error::BlorbError;
use crate::resource::{Handle, ReadSeek, ResourceLoader, SharedHandle};
use crate::util::id_str;

/// Size of the Z-machine header
pub const ZCODE_HEADER_LEN: usize = 64;

/// Read and seek access to the story bytes. Positions are relative to the
/// start of the story, whether it is a whole file or a chunk of a Blorb.
pub struct StoryStream {
    handle: Handle,
    start: u64,
    length: u64,
    pos: u64,
    windowed: bool,
}

impl StoryStream {
    /// The story occupies `length` bytes at `start` in a shared container file
    pub fn in_container(handle: SharedHandle, start: u64, length: u64) -> Self {
        StoryStream {
            handle: Handle::Shared(handle),
            start,
            length,
            pos: 0,
            windowed: true,
        }
    }

    /// The story is the whole of `source`
    pub fn standalone(source: Box<dyn ReadSeek>, length: u64) -> Self {
        StoryStream {
            handle: Handle::Owned(source),
            start: 0,
            length,
            pos: 0,
            windowed: false,
        }
    }

    /// Current position from the start of the story
    pub fn tell(&self) -> u64 {
        self.pos
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether the story is a window into a larger file
    pub fn is_windowed(&self) -> bool {
        self.windowed
    }

    /// Absolute file offset where the story starts
    pub fn start_offset(&self) -> u64 {
        self.start
    }

    /// All story bytes, leaving the position at the end
    pub fn read_story(&mut self) -> io::Result<Vec<u8>> {
        self.seek(SeekFrom::Start(0))?;
        let mut data = Vec::with_capacity(self.length as usize);
        self.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl Read for StoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.length || buf.is_empty() {
            return Ok(0);
        }
        let n = (self.length - self.pos).min(buf.len() as u64) as usize;
        let got = self.handle.read_at(self.start + self.pos, &mut buf[..n])?;
        self.pos += got as u64;
        Ok(got)
    }
}

impl Seek for StoryStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => self.length.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of story",
            )),
        }
    }
}

/// Result of locating a story
pub struct LocatedStory {
    pub stream: StoryStream,
    /// Resource map for pictures and sounds, if any Blorb was found
    pub resources: Option<ResourceLoader>,
    /// The story was read from the executable chunk of a Blorb file
    pub exec_in_blorb: bool,
    /// File the resources come from
    pub resource_path: Option<PathBuf>,
}

fn check_zcode(header: &[u8], length: u64) -> Result<u8, BlorbError> {
    if length < ZCODE_HEADER_LEN as u64 || header.len() < ZCODE_HEADER_LEN {
        return Err(BlorbError::InvalidStory(format!(
            "{} bytes is too small for a Z-code header",
            length
        )));
    }
    match header[0] {
        version @ 1..=8 => Ok(version),
        other => Err(BlorbError::InvalidStory(format!(
            "unknown Z-machine version {}",
            other
        ))),
    }
}

fn read_header(stream: &mut StoryStream) -> Result<u8, BlorbError> {
    let mut header = [0u8; ZCODE_HEADER_LEN];
    stream.seek(SeekFrom::Start(0))?;
    let mut filled = 0;
    while filled < header.len() {
        let n = stream.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    stream.seek(SeekFrom::Start(0))?;
    check_zcode(&header[..filled], stream.len())
}

/// Path of a companion Blorb: the story path with its extension replaced
pub fn companion_path(story: &Path, extension: &str) -> PathBuf {
    story.with_extension(extension.trim_start_matches('.'))
}

#[derive(Default)]
pub struct StoryLocator {
    config: LocatorConfig,
}

impl StoryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LocatorConfig) -> Self {
        StoryLocator { config }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Work out where the story at `path` keeps its Z-code and its media
    pub fn locate(&self, path: &Path) -> Result<LocatedStory, BlorbError> {
        debug!("Locating story {:?}", path);
        let mut file = File::open(path)?;

        if is_blorb(&mut file) {
            drop(file);
            return self.locate_in_blorb(path).map_err(|e| match e {
                BlorbError::Io(e) => BlorbError::Io(e),
                BlorbError::InvalidStory(msg) => BlorbError::InvalidStory(msg),
                BlorbError::NotFound(_) => BlorbError::InvalidStory(format!(
                    "{} is a Blorb file without an executable chunk",
                    path.display()
                )),
                other => BlorbError::InvalidStory(format!(
                    "{} is a Blorb file but cannot be read: {}",
                    path.display(),
                    other
                )),
            });
        }

        let mut stream = self.naked_story(file)?;
        let version = read_header(&mut stream)?;
        info!("Naked story file {:?}, Z-machine version {}", path, version);

        let (resources, resource_path) = match self.find_companion(path) {
            Some((loader, found)) => (Some(loader), Some(found)),
            None => {
                debug!("No companion Blorb for {:?}, media disabled", path);
                (None, None)
            }
        };

        Ok(LocatedStory {
            stream,
            resources,
            exec_in_blorb: false,
            resource_path,
        })
    }

    fn locate_in_blorb(&self, path: &Path) -> Result<LocatedStory, BlorbError> {
        let loader = match ResourceLoader::open(path) {
            Ok(loader) => loader,
            Err(e) if e.is_recoverable() => {
                debug!("{:?}: {}, looking for a ZCOD chunk", path, e);
                return self.locate_unindexed(path);
            }
            Err(e) => return Err(e),
        };
        let map = loader.map();

        let exec = match map.exec_chunk() {
            Ok(index) => index,
            Err(_) => {
                debug!("No Exec entry in the index, looking for a ZCOD chunk");
                map.find_chunk_by_type(b"ZCOD", 0)?
            }
        };
        let chunk = *map
            .chunk(exec)
            .ok_or_else(|| BlorbError::NotFound(format!("chunk {}", exec)))?;
        if &chunk.id != b"ZCOD" {
            return Err(BlorbError::InvalidStory(format!(
                "executable chunk is '{}', not Z-code",
                id_str(&chunk.id)
            )));
        }

        let mut stream =
            StoryStream::in_container(loader.handle(), chunk.offset as u64, chunk.length as u64);
        let version = read_header(&mut stream)?;
        info!(
            "Story is chunk {} of {:?} ({} bytes at {:#x}), Z-machine version {}",
            exec, path, chunk.length, chunk.offset, version
        );

        Ok(LocatedStory {
            stream,
            resources: Some(loader),
            exec_in_blorb: true,
            resource_path: Some(path.to_path_buf()),
        })
    }

    /// A container without a resource index can still carry Z-code. The
    /// story is its first `ZCOD` chunk and there are no media.
    fn locate_unindexed(&self, path: &Path) -> Result<LocatedStory, BlorbError> {
        let mut file = File::open(path)?;
        let container = open_container(&mut file)?;
        let exec = container
            .find_chunk(b"ZCOD")
            .ok_or_else(|| BlorbError::NotFound("'ZCOD' chunk".to_string()))?;
        let chunk = container.chunks[exec];

        let source: Box<dyn ReadSeek> = Box::new(file);
        let handle: SharedHandle = Arc::new(Mutex::new(source));
        let mut stream =
            StoryStream::in_container(handle, chunk.offset as u64, chunk.length as u64);
        let version = read_header(&mut stream)?;
        info!(
            "Story is chunk {} of unindexed {:?} ({} bytes at {:#x}), Z-machine version {}",
            exec, path, chunk.length, chunk.offset, version
        );
        debug!("No resource index, media disabled");

        Ok(LocatedStory {
            stream,
            resources: None,
            exec_in_blorb: true,
            resource_path: None,
        })
    }

    fn naked_story(&self, mut file: File) -> Result<StoryStream, BlorbError> {
        let length = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        let zipped = self.config.inflate_zipped_stories
            && length >= 4
            && file.read_exact(&mut magic).is_ok()
            && magic == LOCAL_HEADER_SIGNATURE;

        if zipped {
            let data = decode_frame(&mut file, 0)?;
            info!("Inflated zipped story: {} -> {} bytes", length, data.len());
            let length = data.len() as u64;
            return Ok(StoryStream::standalone(Box::new(Cursor::new(data)), length));
        }
        Ok(StoryStream::standalone(Box::new(file), length))
    }

    fn find_companion(&self, story: &Path) -> Option<(ResourceLoader, PathBuf)> {
        for extension in &self.config.companion_extensions {
            let candidate = companion_path(story, extension);
            if candidate == story || !candidate.is_file() {
                continue;
            }
            match ResourceLoader::open(&candidate) {
                Ok(loader) => {
                    info!("Using companion Blorb {:?}", candidate);
                    return Some((loader, candidate));
                }
                Err(e) if e.is_recoverable() => {
                    debug!("Ignoring companion {:?}: {}", candidate, e)
                }
                Err(e) => warn!("Ignoring companion {:?}: {}", candidate, e),
            }
        }
        None
    }
}
