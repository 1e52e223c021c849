use crate::error::{Error, Result};
use image::{ImageReader, RgbImage, codecs::jpeg::JpegEncoder};
use std::{io::Cursor, path::Path};

/// A decoded fisheye camera frame.
///
/// The image circle is assumed to be centered in the frame with a radius of
/// half the shorter side.
#[derive(Clone, Debug)]
pub struct FisheyeFrame {
    pixels: RgbImage,
}

impl FisheyeFrame {
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// Decode the image at `path` into an RGB frame.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();
        let decoded = ImageReader::open(path)
            .map_err(|source| Error::io(path, source))?
            .with_guessed_format()
            .map_err(|source| Error::io(path, source))?
            .decode()
            .map_err(|source| Error::FrameDecode { origin, source })?;

        Ok(Self::new(decoded.into_rgb8()))
    }

    /// Decode an in-memory encoded image.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let to_error = |source| Error::FrameDecode {
            origin: "<memory>".into(),
            source,
        };
        let decoded = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|err| to_error(image::ImageError::IoError(err)))?
            .decode()
            .map_err(to_error)?;

        Ok(Self::new(decoded.into_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Returns `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Optical center in pixel coordinates.
    pub fn center(&self) -> (f64, f64) {
        (self.width() as f64 / 2., self.height() as f64 / 2.)
    }

    /// Radius of the image circle in pixels.
    pub fn radius(&self) -> f64 {
        let (cx, cy) = self.center();
        cx.min(cy)
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

impl From<RgbImage> for FisheyeFrame {
    fn from(pixels: RgbImage) -> Self {
        Self::new(pixels)
    }
}

/// Encode `image` as a baseline JPEG with the given `quality` (1 to 100).
pub fn encode_jpeg(
    image: &RgbImage,
    quality: u8,
) -> std::result::Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(image)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgb;
    use rstest::rstest;

    #[rstest]
    #[case(800, 600, 300.0)]
    #[case(600, 800, 300.0)]
    #[case(1224, 1224, 612.0)]
    #[case(3, 5, 1.5)]
    fn radius_from_dimensions(#[case] width: u32, #[case] height: u32, #[case] radius: f64) {
        let frame = FisheyeFrame::new(RgbImage::new(width, height));
        assert_relative_eq!(frame.radius(), radius);
    }

    #[test]
    fn center_is_half_dimensions() {
        let frame = FisheyeFrame::new(RgbImage::new(801, 600));
        assert_eq!(frame.center(), (400.5, 300.0));
    }

    #[test]
    fn decode_encoded_jpeg() {
        let image = RgbImage::from_pixel(64, 48, Rgb([128, 128, 128]));
        let bytes = encode_jpeg(&image, 95).unwrap();
        let frame = FisheyeFrame::decode(&bytes).unwrap();

        assert_eq!(frame.dimensions(), (64, 48));
        let px = frame.pixels().get_pixel(32, 24);
        assert!(px.0.iter().all(|c| c.abs_diff(128) <= 2));
    }

    #[test]
    fn decode_garbage_fails() {
        let err = FisheyeFrame::decode(b"definitely not a jpeg").unwrap_err();
        assert!(matches!(err, Error::FrameDecode { .. }));
    }

    #[test]
    fn open_missing_file_fails() {
        let err = FisheyeFrame::open("/nonexistent/frame.jpg").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
