use std::io::{Read, Write};

use bincode::Options;
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::frame::{Frame, PixelType};
use crate::imaging;
use crate::mode::WireMode;

/// Default JPEG quality for `image-codec`.
pub const DEFAULT_QUALITY: u8 = 75;

/// Default maximum decoded pixel payload: 256 MiB.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Room on top of the pixel limit for one message part: headers and
/// compressed encodings that come out larger than the raw pixels.
const PART_SLACK: usize = 64 * 1024;

/// JSON header of `header-raw`.
#[derive(Debug, Serialize, Deserialize)]
struct Header {
    dtype: String,
    shape: Vec<u64>,
}

/// Record serialized inside a `compressed-blob` message.
#[derive(Serialize)]
struct BlobRecordRef<'a> {
    dtype: &'a str,
    shape: &'a [u64],
    data: &'a [u8],
}

#[derive(Deserialize)]
struct BlobRecord {
    dtype: String,
    shape: Vec<u64>,
    data: Vec<u8>,
}

/// JSON with `", "` and `": "` separators, the form Python peers emit.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> std::io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> std::io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: ?Sized + Write,
    {
        writer.write_all(b": ")
    }
}

/// Serialize `value` as wire JSON: `{"dtype": "uint8", "shape": [2, 4, 3]}`.
pub fn to_wire_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(64);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

/// Clamp a requested JPEG quality into the codec's `1..=100` range.
pub fn clamp_quality(quality: i32) -> u8 {
    quality.clamp(1, 100) as u8
}

/// Encode a frame into the message parts of `mode`.
///
/// Wire format per mode:
/// ```text
/// header-raw       ┌─────────────────────────────────┬──────────────┐
///                  │ {"dtype": "uint8", "shape": [h, w, c]}│ raw pixels   │
///                  └───────────────────────────────────────┴──────────────┘
/// compressed-blob  ┌────────────────────────────────────────────────┐
///                  │ zlib(bincode{dtype, shape, data})              │
///                  └────────────────────────────────────────────────┘
/// multipart-raw    ┌─────────┬────────────┬──────────────┐
///                  │ "uint8" │ [h, w, c]  │ raw pixels   │
///                  └─────────┴────────────┴──────────────┘
/// image-codec      ┌────────────────────────────────────────────────┐
///                  │ JPEG bytes                                     │
///                  └────────────────────────────────────────────────┘
/// ```
///
/// `quality` only matters for `image-codec` and is clamped, never rejected.
pub fn encode(frame: &Frame, mode: WireMode, quality: i32) -> Result<Vec<Bytes>> {
    let shape = frame.shape();
    let parts = match mode {
        WireMode::HeaderRaw => {
            let header = to_wire_json(&Header {
                dtype: frame.pixel_type().dtype().to_string(),
                shape: shape.to_vec(),
            })?;
            vec![Bytes::from(header), frame.data().clone()]
        }
        WireMode::CompressedBlob => {
            let record = BlobRecordRef {
                dtype: frame.pixel_type().dtype(),
                shape: &shape,
                data: frame.as_bytes(),
            };
            let serialized = blob_options(usize::MAX)
                .serialize(&record)
                .map_err(|err| FrameError::Blob(err.to_string()))?;
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&serialized)?;
            vec![Bytes::from(encoder.finish()?)]
        }
        WireMode::MultipartRaw => {
            let shape_json = to_wire_json(&shape)?;
            vec![
                Bytes::from_static(frame.pixel_type().dtype().as_bytes()),
                Bytes::from(shape_json),
                frame.data().clone(),
            ]
        }
        WireMode::ImageCodec => vec![imaging::encode_jpeg(frame, clamp_quality(quality))?],
    };

    trace!(
        %mode,
        parts = parts.len(),
        size = parts.iter().map(Bytes::len).sum::<usize>(),
        "encoded frame"
    );
    Ok(parts)
}

/// Decode the message parts of `mode` into a frame.
pub fn decode(parts: &[Bytes], mode: WireMode) -> Result<Frame> {
    decode_with_limit(parts, mode, DEFAULT_MAX_FRAME_BYTES)
}

/// Decode with an explicit cap on the decoded pixel payload.
pub fn decode_with_limit(parts: &[Bytes], mode: WireMode, max_bytes: usize) -> Result<Frame> {
    if parts.len() != mode.part_count() {
        return Err(FrameError::PartCount {
            mode,
            expected: mode.part_count(),
            actual: parts.len(),
        });
    }

    match mode {
        WireMode::HeaderRaw => {
            let header: Header = serde_json::from_slice(&parts[0])?;
            let pixel_type: PixelType = header.dtype.parse()?;
            check_size(parts[1].len(), max_bytes)?;
            Frame::from_shape(&header.shape, pixel_type, parts[1].clone())
        }
        WireMode::CompressedBlob => {
            let mut inflated = Vec::new();
            ZlibDecoder::new(parts[0].as_ref())
                .take(max_bytes as u64 + 1)
                .read_to_end(&mut inflated)?;
            check_size(inflated.len(), max_bytes)?;

            let record: BlobRecord = blob_options(max_bytes)
                .deserialize(&inflated)
                .map_err(|err| FrameError::Blob(err.to_string()))?;
            let pixel_type: PixelType = record.dtype.parse()?;
            Frame::from_shape(&record.shape, pixel_type, record.data)
        }
        WireMode::MultipartRaw => {
            let dtype = std::str::from_utf8(&parts[0]).map_err(|_| {
                FrameError::UnsupportedPixelType(String::from_utf8_lossy(&parts[0]).into_owned())
            })?;
            let pixel_type: PixelType = dtype.parse()?;
            let shape: Vec<u64> = serde_json::from_slice(&parts[1])?;
            check_size(parts[2].len(), max_bytes)?;
            Frame::from_shape(&shape, pixel_type, parts[2].clone())
        }
        WireMode::ImageCodec => {
            let frame = imaging::decode_image(&parts[0], max_bytes)?;
            check_size(frame.byte_len(), max_bytes)?;
            Ok(frame)
        }
    }
}

fn check_size(size: usize, max: usize) -> Result<()> {
    if size > max {
        return Err(FrameError::TooLarge { size, max });
    }
    Ok(())
}

fn blob_options(limit: usize) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(limit as u64)
}

/// Encoding settings shared by one client or server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCodec {
    mode: WireMode,
    quality: u8,
    max_frame_bytes: usize,
}

impl WireCodec {
    pub fn new(mode: WireMode) -> Self {
        Self {
            mode,
            quality: DEFAULT_QUALITY,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Set the `image-codec` quality; out-of-range values are clamped.
    pub fn with_quality(mut self, quality: i32) -> Self {
        self.quality = clamp_quality(quality);
        self
    }

    /// Cap the decoded pixel payload.
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub fn mode(&self) -> WireMode {
        self.mode
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Largest single message part a receiver should accept for this codec.
    pub fn max_part_bytes(&self) -> usize {
        self.max_frame_bytes
            .saturating_add(self.max_frame_bytes / 2)
            .saturating_add(PART_SLACK)
    }

    pub fn encode(&self, frame: &Frame) -> Result<Vec<Bytes>> {
        encode(frame, self.mode, i32::from(self.quality))
    }

    pub fn decode(&self, parts: &[Bytes]) -> Result<Frame> {
        decode_with_limit(parts, self.mode, self.max_frame_bytes)
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(WireMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOSSLESS: [WireMode; 3] = [
        WireMode::HeaderRaw,
        WireMode::CompressedBlob,
        WireMode::MultipartRaw,
    ];

    fn patterned(width: u32, height: u32, channels: u32, pixel_type: PixelType) -> Frame {
        let len = (width * height * channels) as usize * pixel_type.size();
        let data: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
        Frame::new(width, height, channels, pixel_type, data).unwrap()
    }

    fn gradient(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                for c in 0..3 {
                    data.push((x * 5 + y * 4 + c * 10) as u8);
                }
            }
        }
        Frame::new(width, height, 3, PixelType::U8, data).unwrap()
    }

    fn mean_abs_diff(a: &Frame, b: &Frame) -> f64 {
        let total: u64 = a
            .as_bytes()
            .iter()
            .zip(b.as_bytes())
            .map(|(x, y)| u64::from(x.abs_diff(*y)))
            .sum();
        total as f64 / a.byte_len() as f64
    }

    #[test]
    fn test_lossless_modes_are_bit_exact() {
        let frames = [
            Frame::sentinel(),
            patterned(4, 4, 3, PixelType::U8),
            patterned(7, 3, 1, PixelType::U16),
            patterned(5, 2, 3, PixelType::F32),
            patterned(2, 2, 4, PixelType::F64),
            patterned(3, 1, 2, PixelType::I8),
        ];
        for mode in LOSSLESS {
            for frame in &frames {
                let parts = encode(frame, mode, 75).unwrap();
                assert_eq!(parts.len(), mode.part_count());
                let decoded = decode(&parts, mode).unwrap();
                assert_eq!(&decoded, frame, "{mode} changed {frame:?}");
            }
        }
    }

    #[test]
    fn test_header_raw_wire_layout() {
        let frame = Frame::filled(4, 2, 3, 10).unwrap();
        let parts = encode(&frame, WireMode::HeaderRaw, 75).unwrap();

        assert_eq!(
            parts[0].as_ref(),
            br#"{"dtype": "uint8", "shape": [2, 4, 3]}"#
        );
        let header: serde_json::Value = serde_json::from_slice(&parts[0]).unwrap();
        assert_eq!(header["dtype"], "uint8");
        assert_eq!(header["shape"], serde_json::json!([2, 4, 3]));
        assert_eq!(parts[1].as_ref(), frame.as_bytes());
    }

    #[test]
    fn test_multipart_raw_wire_layout() {
        let frame = patterned(3, 2, 1, PixelType::I16);
        let parts = encode(&frame, WireMode::MultipartRaw, 75).unwrap();
        assert_eq!(parts[0].as_ref(), b"int16");
        assert_eq!(parts[1].as_ref(), b"[2, 3, 1]");
        assert_eq!(parts[2].as_ref(), frame.as_bytes());
    }

    #[test]
    fn test_header_raw_accepts_two_dimensional_shape() {
        let parts = vec![
            Bytes::from_static(br#"{"dtype": "uint8", "shape": [2, 2]}"#),
            Bytes::from_static(&[1, 2, 3, 4]),
        ];
        let frame = decode(&parts, WireMode::HeaderRaw).unwrap();
        assert_eq!(frame.shape(), [2, 2, 1]);
    }

    #[test]
    fn test_image_codec_is_close() {
        let frame = gradient(32, 16);
        let parts = encode(&frame, WireMode::ImageCodec, 90).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(&parts[0][..2], &[0xFF, 0xD8], "JPEG SOI marker");

        let decoded = decode(&parts, WireMode::ImageCodec).unwrap();
        assert_eq!(decoded.shape(), frame.shape());
        let drift = mean_abs_diff(&frame, &decoded);
        assert!(drift < 5.0, "mean absolute drift {drift}");
    }

    #[test]
    fn test_image_codec_grayscale() {
        let frame = Frame::filled(16, 8, 1, 128).unwrap();
        let decoded = decode(
            &encode(&frame, WireMode::ImageCodec, 75).unwrap(),
            WireMode::ImageCodec,
        )
        .unwrap();
        assert_eq!(decoded.shape(), [8, 16, 1]);
        assert!(mean_abs_diff(&frame, &decoded) < 2.0);
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(clamp_quality(-20), 1);
        assert_eq!(clamp_quality(0), 1);
        assert_eq!(clamp_quality(75), 75);
        assert_eq!(clamp_quality(400), 100);

        let frame = gradient(8, 8);
        assert!(encode(&frame, WireMode::ImageCodec, -20).is_ok());
        assert!(encode(&frame, WireMode::ImageCodec, 400).is_ok());
        assert_eq!(WireCodec::new(WireMode::ImageCodec).with_quality(101).quality(), 100);
    }

    #[test]
    fn test_mode_mismatch_always_fails() {
        let frame = patterned(4, 4, 3, PixelType::U8);
        for sent in WireMode::ALL {
            let parts = encode(&frame, sent, 75).unwrap();
            for expected in WireMode::ALL.into_iter().filter(|m| *m != sent) {
                assert!(
                    decode(&parts, expected).is_err(),
                    "{sent} data decoded as {expected}"
                );
            }
        }
    }

    #[test]
    fn test_part_count_error() {
        let err = decode(&[Bytes::from_static(b"x")], WireMode::HeaderRaw).unwrap_err();
        assert!(matches!(
            err,
            FrameError::PartCount {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_header() {
        let parts = vec![Bytes::from_static(b"not json"), Bytes::from_static(b"\0\0\0")];
        assert!(matches!(
            decode(&parts, WireMode::HeaderRaw),
            Err(FrameError::Header(_))
        ));
    }

    #[test]
    fn test_shape_length_mismatch() {
        let parts = vec![
            Bytes::from_static(b"uint8"),
            Bytes::from_static(b"[4,4,3]"),
            Bytes::from_static(&[0u8; 10]),
        ];
        assert!(matches!(
            decode(&parts, WireMode::MultipartRaw),
            Err(FrameError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_blob_garbage_rejected() {
        let parts = vec![Bytes::from_static(b"\x78\x9cnot really zlib")];
        assert!(decode(&parts, WireMode::CompressedBlob).is_err());
    }

    #[test]
    fn test_blob_respects_limit() {
        let frame = Frame::zeros(64, 64, 3).unwrap();
        let parts = encode(&frame, WireMode::CompressedBlob, 75).unwrap();
        // Highly compressible, so the compressed part is tiny.
        assert!(parts[0].len() < 1024);

        let err = decode_with_limit(&parts, WireMode::CompressedBlob, 1024).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { max: 1024, .. }));
    }

    #[test]
    fn test_compact_json_still_decodes() {
        let parts = vec![
            Bytes::from_static(br#"{"dtype":"uint8","shape":[1,2,1]}"#),
            Bytes::from_static(&[7, 8]),
        ];
        let frame = decode(&parts, WireMode::HeaderRaw).unwrap();
        assert_eq!(frame.as_bytes(), &[7, 8]);
    }

    #[test]
    fn test_wire_json_nested_separators() {
        let value = serde_json::json!({"a": [1, {"b": 2}], "c": []});
        assert_eq!(
            to_wire_json(&value).unwrap(),
            br#"{"a": [1, {"b": 2}], "c": []}"#.to_vec()
        );
    }

    #[test]
    fn test_image_codec_limit_applies_before_decoding() {
        let parts = encode(&gradient(64, 64), WireMode::ImageCodec, 75).unwrap();
        let err = decode_with_limit(&parts, WireMode::ImageCodec, 1024).unwrap_err();
        assert!(
            matches!(err, FrameError::Image(image::ImageError::Limits(_))),
            "unexpected error: {err}"
        );
        assert!(decode_with_limit(&parts, WireMode::ImageCodec, 64 * 64 * 3).is_ok());
    }

    #[test]
    fn test_part_limit_covers_every_mode() {
        let codec = WireCodec::new(WireMode::CompressedBlob).with_max_frame_bytes(1024);
        assert!(codec.max_part_bytes() > 1024);
        assert!(codec.max_part_bytes() < 1024 * 1024);
        let unbounded = WireCodec::new(WireMode::HeaderRaw).with_max_frame_bytes(usize::MAX);
        assert_eq!(unbounded.max_part_bytes(), usize::MAX);
    }

    #[test]
    fn test_codec_struct_uses_its_settings() {
        let codec = WireCodec::new(WireMode::MultipartRaw).with_max_frame_bytes(8);
        let frame = Frame::zeros(2, 2, 3).unwrap();
        let parts = codec.encode(&frame).unwrap();
        assert!(matches!(
            codec.decode(&parts),
            Err(FrameError::TooLarge { size: 12, max: 8 })
        ));
    }
}
