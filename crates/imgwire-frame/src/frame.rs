use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::{FrameError, Result};

/// Shape `[height, width, channels]` of the reserved liveness frame.
pub const SENTINEL_SHAPE: [u64; 3] = [1, 1, 3];

/// Element type of a frame's pixels. Elements are little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelType {
    #[default]
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl PixelType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            PixelType::U8 | PixelType::I8 => 1,
            PixelType::U16 | PixelType::I16 => 2,
            PixelType::U32 | PixelType::I32 | PixelType::F32 => 4,
            PixelType::F64 => 8,
        }
    }

    /// NumPy dtype name carried on the wire.
    pub fn dtype(self) -> &'static str {
        match self {
            PixelType::U8 => "uint8",
            PixelType::I8 => "int8",
            PixelType::U16 => "uint16",
            PixelType::I16 => "int16",
            PixelType::U32 => "uint32",
            PixelType::I32 => "int32",
            PixelType::F32 => "float32",
            PixelType::F64 => "float64",
        }
    }

    /// Read one element from the start of `bytes` as `f64`.
    fn read_f64(self, bytes: &[u8]) -> f64 {
        match self {
            PixelType::U8 => f64::from(bytes[0]),
            PixelType::I8 => f64::from(bytes[0] as i8),
            PixelType::U16 => f64::from(u16::from_le_bytes(le(bytes))),
            PixelType::I16 => f64::from(i16::from_le_bytes(le(bytes))),
            PixelType::U32 => f64::from(u32::from_le_bytes(le(bytes))),
            PixelType::I32 => f64::from(i32::from_le_bytes(le(bytes))),
            PixelType::F32 => f64::from(f32::from_le_bytes(le(bytes))),
            PixelType::F64 => f64::from_le_bytes(le(bytes)),
        }
    }
}

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dtype())
    }
}

impl FromStr for PixelType {
    type Err = FrameError;

    /// Accepts dtype names (`uint8`) and short codes with an optional
    /// byte-order marker (`u1`, `|u1`, `<f4`, `=i2`).
    fn from_str(input: &str) -> Result<Self> {
        let code = input.trim();
        let code = code
            .strip_prefix(['<', '|', '='])
            .unwrap_or(code);
        let pixel = match code {
            "uint8" | "u1" => PixelType::U8,
            "int8" | "i1" => PixelType::I8,
            "uint16" | "u2" => PixelType::U16,
            "int16" | "i2" => PixelType::I16,
            "uint32" | "u4" => PixelType::U32,
            "int32" | "i4" => PixelType::I32,
            "float32" | "f4" => PixelType::F32,
            "float64" | "f8" => PixelType::F64,
            _ => return Err(FrameError::UnsupportedPixelType(input.to_string())),
        };
        Ok(pixel)
    }
}

/// One captured image as raw, row-major pixels.
///
/// Three-channel frames are BGR ordered by convention. The buffer always
/// holds exactly `width * height * channels * pixel_type.size()` bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u32,
    pixel_type: PixelType,
    data: Bytes,
}

impl Frame {
    /// Build a frame, validating the buffer against the shape.
    pub fn new(
        width: u32,
        height: u32,
        channels: u32,
        pixel_type: PixelType,
        data: impl Into<Bytes>,
    ) -> Result<Self> {
        let data = data.into();
        let shape = [u64::from(height), u64::from(width), u64::from(channels)];
        let expected = expected_len(&shape, pixel_type)?;
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            pixel_type,
            data,
        })
    }

    /// Build a frame from an array shape: `[height, width]` or
    /// `[height, width, channels]`.
    pub fn from_shape(shape: &[u64], pixel_type: PixelType, data: impl Into<Bytes>) -> Result<Self> {
        let (height, width, channels) = match *shape {
            [h, w] => (h, w, 1),
            [h, w, c] => (h, w, c),
            _ => {
                return Err(FrameError::InvalidShape {
                    shape: shape.to_vec(),
                    reason: "expected 2 or 3 dimensions",
                })
            }
        };
        let dim = |value: u64| {
            u32::try_from(value).map_err(|_| FrameError::InvalidShape {
                shape: shape.to_vec(),
                reason: "dimension exceeds u32",
            })
        };
        Self::new(dim(width)?, dim(height)?, dim(channels)?, pixel_type, data)
    }

    /// A `uint8` frame with every element set to `value`.
    pub fn filled(width: u32, height: u32, channels: u32, value: u8) -> Result<Self> {
        let shape = [u64::from(height), u64::from(width), u64::from(channels)];
        let len = expected_len(&shape, PixelType::U8)?;
        Self::new(width, height, channels, PixelType::U8, vec![value; len])
    }

    /// An all-zero `uint8` frame.
    pub fn zeros(width: u32, height: u32, channels: u32) -> Result<Self> {
        Self::filled(width, height, channels, 0)
    }

    /// The reserved 1×1×3 all-zero liveness frame.
    pub fn sentinel() -> Self {
        Self {
            width: 1,
            height: 1,
            channels: 3,
            pixel_type: PixelType::U8,
            data: Bytes::from_static(&[0, 0, 0]),
        }
    }

    /// True for the reserved liveness frame, whatever its pixel type.
    pub fn is_sentinel(&self) -> bool {
        self.shape() == SENTINEL_SHAPE && self.is_all_zero()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    /// Array shape `[height, width, channels]`.
    pub fn shape(&self) -> [u64; 3] {
        [
            u64::from(self.height),
            u64::from(self.width),
            u64::from(self.channels),
        ]
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn is_all_zero(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    /// Mean of each channel, in channel order.
    pub fn channel_means(&self) -> Vec<f64> {
        let channels = self.channels as usize;
        let mut sums = vec![0.0f64; channels];
        for (index, element) in self.data.chunks_exact(self.pixel_type.size()).enumerate() {
            sums[index % channels] += self.pixel_type.read_f64(element);
        }
        let pixels = f64::from(self.width) * f64::from(self.height);
        sums.into_iter().map(|sum| sum / pixels).collect()
    }

    /// Mean over every element.
    pub fn mean(&self) -> f64 {
        let means = self.channel_means();
        means.iter().sum::<f64>() / means.len() as f64
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("shape", &self.shape())
            .field("pixel_type", &self.pixel_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn expected_len(shape: &[u64; 3], pixel_type: PixelType) -> Result<usize> {
    if shape.contains(&0) {
        return Err(FrameError::InvalidShape {
            shape: shape.to_vec(),
            reason: "every dimension must be at least 1",
        });
    }
    shape
        .iter()
        .try_fold(pixel_type.size(), |acc, &dim| {
            usize::try_from(dim).ok().and_then(|dim| acc.checked_mul(dim))
        })
        .ok_or_else(|| FrameError::InvalidShape {
            shape: shape.to_vec(),
            reason: "byte length overflows",
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_validates_length() {
        let err = Frame::new(2, 2, 3, PixelType::U8, vec![0u8; 11]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::LengthMismatch {
                expected: 12,
                actual: 11
            }
        ));

        let frame = Frame::new(2, 2, 3, PixelType::U16, vec![0u8; 24]).unwrap();
        assert_eq!(frame.shape(), [2, 2, 3]);
        assert_eq!(frame.byte_len(), 24);
    }

    #[test]
    fn zero_dimension_rejected() {
        assert!(matches!(
            Frame::zeros(0, 4, 3),
            Err(FrameError::InvalidShape { .. })
        ));
    }

    #[test]
    fn from_shape_accepts_grayscale() {
        let frame = Frame::from_shape(&[3, 4], PixelType::U8, vec![1u8; 12]).unwrap();
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.channels(), 1);
    }

    #[test]
    fn from_shape_rejects_other_ranks() {
        assert!(Frame::from_shape(&[4], PixelType::U8, vec![0u8; 4]).is_err());
        assert!(Frame::from_shape(&[1, 1, 1, 1], PixelType::U8, vec![0u8; 1]).is_err());
    }

    #[test]
    fn pixel_type_parses_names_and_codes() {
        assert_eq!("uint8".parse::<PixelType>().unwrap(), PixelType::U8);
        assert_eq!("|u1".parse::<PixelType>().unwrap(), PixelType::U8);
        assert_eq!("<f4".parse::<PixelType>().unwrap(), PixelType::F32);
        assert_eq!("float64".parse::<PixelType>().unwrap(), PixelType::F64);
        assert!(matches!(
            "complex128".parse::<PixelType>(),
            Err(FrameError::UnsupportedPixelType(_))
        ));
    }

    #[test]
    fn sentinel_detection() {
        assert!(Frame::sentinel().is_sentinel());
        assert!(Frame::zeros(1, 1, 3).unwrap().is_sentinel());
        assert!(!Frame::filled(1, 1, 3, 1).unwrap().is_sentinel());
        assert!(!Frame::zeros(2, 1, 3).unwrap().is_sentinel());
    }

    #[test]
    fn channel_means_per_type() {
        let frame = Frame::new(2, 1, 2, PixelType::U8, vec![10u8, 20, 30, 40]).unwrap();
        assert_eq!(frame.channel_means(), vec![20.0, 30.0]);
        assert_eq!(frame.mean(), 25.0);

        let data: Vec<u8> = [1.5f32, -0.5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let frame = Frame::new(2, 1, 1, PixelType::F32, data).unwrap();
        assert_eq!(frame.channel_means(), vec![0.5]);
    }
}
