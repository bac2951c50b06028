//! Synthetic frame fixtures shared by unit tests.

use std::path::PathBuf;

use crate::frame::header::FrameHeader;
use crate::frame::{Frame, ImageDimensions, MemoryFrameIo, RawFrame};

pub(crate) fn test_dims() -> ImageDimensions {
    ImageDimensions::new(8, 6)
}

pub(crate) fn header(image_type: &str, exposure: f64) -> FrameHeader {
    FrameHeader::new()
        .with("IMAGETYP", image_type)
        .with("EXPTIME", exposure)
        .with("DATE-OBS", "2015-10-27T03:12:45")
}

/// Frame where pixel (x, y) = `base + step * (x + y)`.
pub(crate) fn gradient_frame(dims: ImageDimensions, base: f32, step: f32) -> Frame {
    let pixels = (0..dims.height)
        .flat_map(|y| (0..dims.width).map(move |x| base + step * (x + y) as f32))
        .collect();
    Frame::from_pixels(dims, pixels)
}

/// Stores `frame` with the given header under `path` and returns its raw record.
pub(crate) fn add_frame(
    io: &MemoryFrameIo,
    path: impl Into<PathBuf>,
    header: FrameHeader,
    frame: Frame,
) -> RawFrame {
    let path = path.into();
    let raw = RawFrame::from_header(path.clone(), &header);
    io.insert(path, frame.with_header(header));
    raw
}

/// One uniform frame per value, named `/raw/<prefix>_NNN.fits`.
pub(crate) fn add_uniform_frames(
    io: &MemoryFrameIo,
    prefix: &str,
    image_type: &str,
    exposure: f64,
    values: &[f32],
) -> Vec<RawFrame> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            add_frame(
                io,
                format!("/raw/{prefix}_{i:03}.fits"),
                header(image_type, exposure),
                Frame::filled(test_dims(), value),
            )
        })
        .collect()
}

pub(crate) fn assert_all_close(frame: &Frame, expected: f32, tolerance: f32) {
    for (i, &v) in frame.pixels.iter().enumerate() {
        assert!(
            (v - expected).abs() <= tolerance,
            "pixel {i} = {v}, expected {expected} ± {tolerance}"
        );
    }
}
