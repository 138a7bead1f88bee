//! Conversions between frames and the `image` crate, and the JPEG leg of
//! the `image-codec` wire mode.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, GrayImage, ImageError, ImageReader, Limits, RgbImage};

use crate::error::{FrameError, Result};
use crate::frame::{Frame, PixelType};

/// JPEG-encode a `uint8` frame with 1 or 3 channels.
///
/// Channel bytes are written in frame order; a BGR frame decodes back as
/// BGR on the other side.
pub(crate) fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Bytes> {
    let color = jpeg_color(frame)?;
    let mut out = Vec::with_capacity(frame.byte_len() / 8 + 1024);
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder.encode(frame.as_bytes(), frame.width(), frame.height(), color)?;
    }
    Ok(Bytes::from(out))
}

/// Decode any image the codec understands into a frame.
///
/// The decoder refuses to allocate more than `max_bytes` for pixels, so an
/// image whose header claims huge dimensions fails before decoding starts.
pub(crate) fn decode_image(bytes: &[u8], max_bytes: usize) -> Result<Frame> {
    let mut limits = Limits::default();
    limits.max_alloc = Some(u64::try_from(max_bytes).unwrap_or(u64::MAX));

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(ImageError::IoError)?;
    reader.limits(limits);
    Frame::from_dynamic(reader.decode()?)
}

fn jpeg_color(frame: &Frame) -> Result<ExtendedColorType> {
    if frame.pixel_type() != PixelType::U8 {
        return Err(FrameError::UnsupportedImage(format!(
            "{} pixels",
            frame.pixel_type()
        )));
    }
    match frame.channels() {
        1 => Ok(ExtendedColorType::L8),
        3 => Ok(ExtendedColorType::Rgb8),
        n => Err(FrameError::UnsupportedImage(format!("{n}-channel frames"))),
    }
}

impl Frame {
    /// Convert a decoded image into a frame without reordering channels.
    ///
    /// Grayscale images keep one channel; everything else becomes three
    /// `uint8` channels (alpha is dropped).
    pub fn from_dynamic(image: DynamicImage) -> Result<Frame> {
        if image.color().channel_count() == 1 {
            let gray = image.into_luma8();
            let (width, height) = gray.dimensions();
            Frame::new(width, height, 1, PixelType::U8, gray.into_raw())
        } else {
            let rgb = image.into_rgb8();
            let (width, height) = rgb.dimensions();
            Frame::new(width, height, 3, PixelType::U8, rgb.into_raw())
        }
    }

    /// Convert an RGB image into a BGR frame, the order capture sources use.
    pub fn from_rgb_as_bgr(image: RgbImage) -> Result<Frame> {
        let (width, height) = image.dimensions();
        let mut raw = image.into_raw();
        for pixel in raw.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
        Frame::new(width, height, 3, PixelType::U8, raw)
    }

    /// View a `uint8` frame with 1 or 3 channels as an image, channel order
    /// unchanged.
    pub fn to_dynamic(&self) -> Result<DynamicImage> {
        jpeg_color(self)?;
        let raw = self.as_bytes().to_vec();
        let image = if self.channels() == 1 {
            GrayImage::from_raw(self.width(), self.height(), raw).map(DynamicImage::ImageLuma8)
        } else {
            RgbImage::from_raw(self.width(), self.height(), raw).map(DynamicImage::ImageRgb8)
        };
        image.ok_or(FrameError::LengthMismatch {
            expected: self.byte_len(),
            actual: self.byte_len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_to_bgr_swaps_outer_channels() {
        let image = RgbImage::from_raw(1, 1, vec![1, 2, 3]).unwrap();
        let frame = Frame::from_rgb_as_bgr(image).unwrap();
        assert_eq!(frame.as_bytes(), &[3, 2, 1]);
    }

    #[test]
    fn jpeg_rejects_four_channels() {
        let frame = Frame::zeros(4, 4, 4).unwrap();
        assert!(matches!(
            encode_jpeg(&frame, 75),
            Err(FrameError::UnsupportedImage(_))
        ));
    }

    #[test]
    fn jpeg_rejects_wide_pixels() {
        let frame = Frame::new(2, 2, 1, PixelType::U16, vec![0u8; 8]).unwrap();
        assert!(matches!(
            encode_jpeg(&frame, 75),
            Err(FrameError::UnsupportedImage(_))
        ));
    }

    #[test]
    fn dynamic_roundtrip_keeps_bytes() {
        let frame = Frame::new(2, 1, 3, PixelType::U8, vec![1u8, 2, 3, 4, 5, 6]).unwrap();
        let image = frame.to_dynamic().unwrap();
        assert_eq!(Frame::from_dynamic(image).unwrap(), frame);
    }

    #[test]
    fn garbage_is_not_an_image() {
        assert!(matches!(
            decode_image(b"definitely not a jpeg", 1024),
            Err(FrameError::Image(_))
        ));
    }
}
