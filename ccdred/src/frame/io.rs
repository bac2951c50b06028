//! Frame reader/writer seam.

use std::path::Path;

use super::Frame;
use super::error::FrameIoError;
use super::header::FrameHeader;

/// Reads and writes frames on some storage.
///
/// The core never parses an on-disk format itself; everything goes through this trait.
pub trait FrameIo: Send + Sync {
    fn read(&self, path: &Path) -> Result<Frame, FrameIoError>;

    /// Reads only the header. The default loads the whole frame.
    fn read_header(&self, path: &Path) -> Result<FrameHeader, FrameIoError> {
        Ok(self.read(path)?.header)
    }

    /// Writes `frame` to `path`, replacing any existing file.
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), FrameIoError>;
}
