use std::path::Path;

use fitsio::FitsFile;
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};

use super::error::FrameIoError;
use super::header::{FrameHeader, HeaderValue, keys};
use super::io::FrameIo;
use super::{Frame, ImageDimensions};

/// How a header keyword is read from the FITS card.
#[derive(Debug, Clone, Copy)]
enum KeyKind {
    Text,
    Float,
    Int,
}

/// Keywords copied into [`FrameHeader`], with fallbacks tried in order.
const HEADER_KEYS: &[(&str, &[&str], KeyKind)] = &[
    (keys::IMAGETYP, &["IMAGETYP", "FRAME"], KeyKind::Text),
    (keys::EXPTIME, &["EXPTIME", "EXPOSURE"], KeyKind::Float),
    (keys::OBJECT, &["OBJECT"], KeyKind::Text),
    (keys::FILTER, &["FILTER"], KeyKind::Text),
    (keys::DATE_OBS, &["DATE-OBS"], KeyKind::Text),
    (keys::CCD_TEMP, &["CCD-TEMP", "CCDTEMP"], KeyKind::Float),
    (keys::XBINNING, &["XBINNING"], KeyKind::Int),
    (keys::YBINNING, &["YBINNING"], KeyKind::Int),
    (keys::JD, &["JD"], KeyKind::Float),
    (keys::NCOMBINE, &["NCOMBINE"], KeyKind::Int),
];

/// Structural keywords owned by cfitsio; never copied from a header on write.
const RESERVED_KEYS: &[&str] = &["simple", "bitpix", "naxis", "naxis1", "naxis2", "extend", "bzero", "bscale"];

/// Reads and writes single-HDU FITS images through cfitsio.
///
/// Pixels are read as f32 in physical units (cfitsio applies BZERO/BSCALE);
/// nothing is normalized. Frames are written as 32-bit float images.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitsFrameIo;

impl FitsFrameIo {
    pub fn new() -> Self {
        Self
    }
}

fn fits_error(path: &Path) -> impl Fn(fitsio::errors::Error) -> FrameIoError + '_ {
    move |source| FrameIoError::Fits {
        path: path.to_path_buf(),
        source,
    }
}

fn read_header_keys(hdu: &FitsHdu, fptr: &mut FitsFile) -> FrameHeader {
    let mut header = FrameHeader::new();

    for (key, candidates, kind) in HEADER_KEYS {
        let value = candidates.iter().find_map(|card| match kind {
            KeyKind::Text => hdu
                .read_key::<String>(fptr, card)
                .ok()
                .map(|s| HeaderValue::Text(s.trim().to_string())),
            KeyKind::Float => hdu.read_key::<f64>(fptr, card).ok().map(HeaderValue::Float),
            KeyKind::Int => hdu.read_key::<i64>(fptr, card).ok().map(HeaderValue::Int),
        });
        if let Some(value) = value {
            header.set(key, value);
        }
    }

    header
}

fn image_shape(hdu: &FitsHdu, path: &Path) -> Result<ImageDimensions, FrameIoError> {
    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => shape,
        _ => {
            return Err(FrameIoError::Malformed {
                path: path.to_path_buf(),
                reason: "primary HDU is not an image".to_string(),
            });
        }
    };

    // cfitsio reports the shape as [NAXIS2, NAXIS1] = [height, width]
    match shape.as_slice() {
        [height, width] if *height > 0 && *width > 0 => Ok(ImageDimensions::new(*width, *height)),
        other => Err(FrameIoError::Malformed {
            path: path.to_path_buf(),
            reason: format!("expected a non-empty 2-D image, found shape {other:?}"),
        }),
    }
}

impl FrameIo for FitsFrameIo {
    fn read(&self, path: &Path) -> Result<Frame, FrameIoError> {
        let mut fptr = FitsFile::open(path).map_err(fits_error(path))?;
        let hdu = fptr.primary_hdu().map_err(fits_error(path))?;

        let dimensions = image_shape(&hdu, path)?;
        let pixels: Vec<f32> = hdu.read_image(&mut fptr).map_err(fits_error(path))?;
        if pixels.len() != dimensions.pixel_count() {
            return Err(FrameIoError::Malformed {
                path: path.to_path_buf(),
                reason: format!(
                    "pixel count {} does not match {}x{}",
                    pixels.len(),
                    dimensions.width,
                    dimensions.height
                ),
            });
        }

        let header = read_header_keys(&hdu, &mut fptr);
        Ok(Frame::from_pixels(dimensions, pixels).with_header(header))
    }

    fn read_header(&self, path: &Path) -> Result<FrameHeader, FrameIoError> {
        let mut fptr = FitsFile::open(path).map_err(fits_error(path))?;
        let hdu = fptr.primary_hdu().map_err(fits_error(path))?;
        Ok(read_header_keys(&hdu, &mut fptr))
    }

    fn write(&self, path: &Path, frame: &Frame) -> Result<(), FrameIoError> {
        // cfitsio refuses to overwrite
        if path.exists() {
            std::fs::remove_file(path).map_err(|source| FrameIoError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let description = ImageDescription {
            data_type: ImageType::Float,
            dimensions: &[frame.height(), frame.width()],
        };

        let mut fptr = FitsFile::create(path)
            .with_custom_primary(&description)
            .open()
            .map_err(fits_error(path))?;
        let hdu = fptr.primary_hdu().map_err(fits_error(path))?;

        hdu.write_image(&mut fptr, frame.pixels.as_slice())
            .map_err(fits_error(path))?;

        for (key, value) in frame.header.iter() {
            if RESERVED_KEYS.contains(&key) || key.len() > 8 {
                tracing::debug!(key, "Skipping header keyword on FITS write");
                continue;
            }
            let card = key.to_ascii_uppercase();
            let written = match value {
                HeaderValue::Text(s) => hdu.write_key(&mut fptr, &card, s.clone()),
                HeaderValue::Float(v) => hdu.write_key(&mut fptr, &card, *v),
                HeaderValue::Int(v) => hdu.write_key(&mut fptr, &card, *v),
                HeaderValue::Bool(b) => hdu.write_key(&mut fptr, &card, i64::from(*b)),
            };
            written.map_err(fits_error(path))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_keeps_pixels_and_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dark_001.fits");

        let header = FrameHeader::new()
            .with("IMAGETYP", "Dark Frame")
            .with("EXPTIME", 30.0)
            .with("OBJECT", "dark")
            .with("XBINNING", 2_i64);
        let pixels: Vec<f32> = (0..12).map(|i| 1000.0 + i as f32).collect();
        let frame = Frame::from_pixels(ImageDimensions::new(4, 3), pixels.clone()).with_header(header);

        let io = FitsFrameIo::new();
        io.write(&path, &frame).unwrap();
        let back = io.read(&path).unwrap();

        assert_eq!(back.dimensions, ImageDimensions::new(4, 3));
        assert_eq!(back.pixels, pixels);
        assert_eq!(back.header.image_type(), Some("Dark Frame"));
        assert_eq!(back.header.exposure_time(), Some(30.0));
        assert_eq!(back.header.binning(), (2, 1));

        let header_only = io.read_header(&path).unwrap();
        assert_eq!(header_only.object(), Some("dark"));
    }

    #[test]
    fn test_write_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bias_master.fits");
        let io = FitsFrameIo::new();

        io.write(&path, &Frame::filled(ImageDimensions::new(2, 2), 1.0)).unwrap();
        io.write(&path, &Frame::filled(ImageDimensions::new(2, 2), 7.0)).unwrap();

        assert!(io.read(&path).unwrap().pixels.iter().all(|&v| v == 7.0));
    }

    #[test]
    fn test_missing_file_is_fits_error() {
        let err = FitsFrameIo::new()
            .read(Path::new("/nonexistent/light_001.fits"))
            .unwrap_err();
        assert!(matches!(err, FrameIoError::Fits { .. }));
    }
}
