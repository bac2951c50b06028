use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::Frame;
use super::error::FrameIoError;
use super::io::FrameIo;

/// In-memory frame store keyed by path.
#[derive(Debug, Default)]
pub struct MemoryFrameIo {
    frames: Mutex<HashMap<PathBuf, Frame>>,
}

impl MemoryFrameIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, frame: Frame) {
        self.frames.lock().insert(path.into(), frame);
    }

    pub fn get(&self, path: &Path) -> Option<Frame> {
        self.frames.lock().get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.frames.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Sorted list of stored paths.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.frames.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl FrameIo for MemoryFrameIo {
    fn read(&self, path: &Path) -> Result<Frame, FrameIoError> {
        self.get(path).ok_or_else(|| FrameIoError::NotFound {
            path: path.to_path_buf(),
        })
    }

    fn write(&self, path: &Path, frame: &Frame) -> Result<(), FrameIoError> {
        self.insert(path, frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ImageDimensions;
    use crate::frame::header::FrameHeader;

    #[test]
    fn test_write_then_read() {
        let io = MemoryFrameIo::new();
        let frame = Frame::filled(ImageDimensions::new(2, 2), 5.0)
            .with_header(FrameHeader::new().with("IMAGETYP", "Bias Frame"));

        io.write(Path::new("bias_1.fits"), &frame).unwrap();

        assert_eq!(io.read(Path::new("bias_1.fits")).unwrap(), frame);
        assert_eq!(
            io.read_header(Path::new("bias_1.fits")).unwrap().image_type(),
            Some("Bias Frame")
        );
        assert_eq!(io.len(), 1);
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let io = MemoryFrameIo::new();
        let err = io.read(Path::new("nope.fits")).unwrap_err();
        assert!(matches!(err, FrameIoError::NotFound { .. }));
    }
}
