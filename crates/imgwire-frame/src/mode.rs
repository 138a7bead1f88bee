use std::fmt;
use std::str::FromStr;

use crate::error::FrameError;

/// The wire encoding used for every request between one client and server.
///
/// Fixed by configuration on both ends, never negotiated per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WireMode {
    /// JSON `{dtype, shape}` part, then the raw pixel part.
    HeaderRaw,
    /// One zlib-compressed serialized `{dtype, shape, data}` record.
    CompressedBlob,
    /// Three parts: dtype string, JSON shape, raw pixels.
    MultipartRaw,
    /// One lossy JPEG part.
    #[default]
    ImageCodec,
}

impl WireMode {
    pub const ALL: [WireMode; 4] = [
        WireMode::HeaderRaw,
        WireMode::CompressedBlob,
        WireMode::MultipartRaw,
        WireMode::ImageCodec,
    ];

    /// Legacy integer index used by older deployments' configuration.
    pub fn index(self) -> u8 {
        match self {
            WireMode::HeaderRaw => 0,
            WireMode::CompressedBlob => 1,
            WireMode::MultipartRaw => 2,
            WireMode::ImageCodec => 3,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            WireMode::HeaderRaw => "header-raw",
            WireMode::CompressedBlob => "compressed-blob",
            WireMode::MultipartRaw => "multipart-raw",
            WireMode::ImageCodec => "image-codec",
        }
    }

    /// Number of message parts one encoded frame occupies.
    pub fn part_count(self) -> usize {
        match self {
            WireMode::HeaderRaw => 2,
            WireMode::CompressedBlob => 1,
            WireMode::MultipartRaw => 3,
            WireMode::ImageCodec => 1,
        }
    }

    /// True when a decode reproduces the encoded frame exactly.
    pub fn is_lossless(self) -> bool {
        !matches!(self, WireMode::ImageCodec)
    }
}

impl fmt::Display for WireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WireMode {
    type Err = FrameError;

    /// Accepts names (`header-raw`, `HEADER_RAW`, ...) or the legacy index.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_ascii_lowercase().replace('_', "-");
        if let Ok(index) = normalized.parse::<u8>() {
            return Self::from_index(index).ok_or_else(|| FrameError::UnknownMode(input.into()));
        }
        Self::ALL
            .into_iter()
            .find(|mode| mode.name() == normalized)
            .ok_or_else(|| FrameError::UnknownMode(input.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_indices() {
        assert_eq!("header-raw".parse::<WireMode>().unwrap(), WireMode::HeaderRaw);
        assert_eq!("COMPRESSED_BLOB".parse::<WireMode>().unwrap(), WireMode::CompressedBlob);
        assert_eq!("2".parse::<WireMode>().unwrap(), WireMode::MultipartRaw);
        assert_eq!("3".parse::<WireMode>().unwrap(), WireMode::ImageCodec);
    }

    #[test]
    fn rejects_unknown_modes() {
        assert!(matches!(
            "4".parse::<WireMode>(),
            Err(FrameError::UnknownMode(_))
        ));
        assert!("pickle".parse::<WireMode>().is_err());
    }

    #[test]
    fn index_roundtrips() {
        for mode in WireMode::ALL {
            assert_eq!(WireMode::from_index(mode.index()), Some(mode));
            assert_eq!(mode.to_string().parse::<WireMode>().unwrap(), mode);
        }
    }

    #[test]
    fn default_is_image_codec() {
        assert_eq!(WireMode::default(), WireMode::ImageCodec);
        assert!(!WireMode::ImageCodec.is_lossless());
    }
}
