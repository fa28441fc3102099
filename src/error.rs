// Blorb, frame and story location errors

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum BlorbError {
    // Container errors
    Format(String),
    MissingIndex,
    NotFound(String),

    // Compressed frame errors
    UnsupportedCompression(u16),
    Size { compressed: u32, uncompressed: u32 },
    Decompress(String), // library message, diagnostic only

    // Startup errors
    InvalidStory(String),
    Config(String),

    // Save file errors
    Save(String),

    // IO errors
    Io(io::Error),
}

impl BlorbError {
    /// True for errors that only mean "this feature is unavailable"
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BlorbError::NotFound(_) | BlorbError::MissingIndex)
    }
}

impl fmt::Display for BlorbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BlorbError::Format(msg) => write!(f, "Format error: {}", msg),
            BlorbError::MissingIndex => {
                write!(f, "Container has no resource index (RIdx) chunk")
            }
            BlorbError::NotFound(what) => write!(f, "Not found: {}", what),
            BlorbError::UnsupportedCompression(method) => {
                write!(f, "Unsupported compression method {} (only deflate is supported)", method)
            }
            BlorbError::Size {
                compressed,
                uncompressed,
            } => write!(
                f,
                "Invalid frame sizes: compressed {}, uncompressed {}",
                compressed, uncompressed
            ),
            BlorbError::Decompress(msg) => write!(f, "Decompression failed: {}", msg),
            BlorbError::InvalidStory(msg) => write!(f, "Invalid story file: {}", msg),
            BlorbError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BlorbError::Save(msg) => write!(f, "Save file error: {}", msg),
            BlorbError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for BlorbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlorbError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BlorbError {
    fn from(error: io::Error) -> Self {
        BlorbError::Io(error)
    }
}
