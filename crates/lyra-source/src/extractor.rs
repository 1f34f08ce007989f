use std::{fmt, sync::Arc};

use lyra_core::{BufferFlags, DataSpec, Format, TrackType};
use lyra_net::LoadResult;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::SeekMap;

/// Container formats an extractor can handle, with the restart behavior each
/// one supports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Mp4,
    FragmentedMp4,
    Ts,
    Adts,
    Ac3,
    Ac4,
    Mp3,
    Matroska,
    Ogg,
    Flac,
    Wav,
    #[default]
    Unknown,
}

impl ContainerKind {
    /// Guess from a container MIME type.
    pub fn from_mime_type(mime: &str) -> Self {
        match mime {
            "video/mp4" | "audio/mp4" => Self::Mp4,
            "video/iso.segment" | "audio/iso.segment" => Self::FragmentedMp4,
            "video/mp2t" => Self::Ts,
            "audio/aac" | "audio/mp4a-latm" => Self::Adts,
            "audio/ac3" | "audio/eac3" => Self::Ac3,
            "audio/ac4" => Self::Ac4,
            "audio/mpeg" => Self::Mp3,
            "video/x-matroska" | "audio/x-matroska" | "video/webm" | "audio/webm" => {
                Self::Matroska
            }
            "audio/ogg" | "audio/opus" => Self::Ogg,
            "audio/flac" => Self::Flac,
            "audio/wav" | "audio/x-wav" => Self::Wav,
            _ => Self::Unknown,
        }
    }

    /// Can continue with new input after a seek to the start, keeping its
    /// parsed state.
    pub fn is_reusable(self) -> bool {
        matches!(self, Self::Ts | Self::FragmentedMp4)
    }

    /// Restarting from the beginning needs a fresh extractor.
    pub fn needs_recreation(self) -> bool {
        !self.is_reusable()
    }
}

/// What the extractor did in one `read` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Continue,
    /// Reopen the input at this byte position and keep reading.
    Seek(u64),
    EndOfInput,
}

/// Receives samples for one track.
pub trait TrackOutput: Send + Sync {
    fn format(&self, format: Format);

    fn sample(&self, time_us: i64, flags: BufferFlags, data: &[u8]);
}

/// Receives the structure an extractor discovers.
pub trait ExtractorOutput {
    /// Output for track `id`, created on first use.
    fn track(&mut self, id: u32, track_type: TrackType) -> Arc<dyn TrackOutput>;

    /// No further tracks will be declared.
    fn end_tracks(&mut self);

    fn seek_map(&mut self, seek_map: SeekMap);
}

/// Opens a resource and demuxes it into tracks.
pub trait MediaExtractor: Send {
    fn kind(&self) -> ContainerKind;

    /// Open the input for `spec`. Returns the resource length if known.
    ///
    /// # Errors
    ///
    /// Returns the load error of the underlying data source.
    fn open(&mut self, spec: &DataSpec) -> LoadResult<Option<u64>>;

    /// Read the next piece of input.
    ///
    /// # Errors
    ///
    /// Returns I/O or parse errors; the input position stays valid for a retry.
    fn read(&mut self, output: &mut dyn ExtractorOutput) -> LoadResult<ReadOutcome>;

    /// Prepare to continue from `position`, which holds media from `time_us`.
    fn seek(&mut self, position: u64, time_us: i64);

    /// Byte position of the next read.
    fn input_position(&self) -> u64;

    fn close(&mut self);
}

/// Creates extractors for a location.
pub trait ExtractorFactory: Send + Sync {
    /// # Errors
    ///
    /// Fails when no extractor handles the resource.
    fn create(&self, uri: &Url) -> LoadResult<Box<dyn MediaExtractor>>;
}

impl<F> ExtractorFactory for F
where
    F: Fn(&Url) -> LoadResult<Box<dyn MediaExtractor>> + Send + Sync,
{
    fn create(&self, uri: &Url) -> LoadResult<Box<dyn MediaExtractor>> {
        self(uri)
    }
}

impl fmt::Debug for dyn MediaExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaExtractor")
            .field("kind", &self.kind())
            .field("input_position", &self.input_position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::ts(ContainerKind::Ts, true)]
    #[case::fmp4(ContainerKind::FragmentedMp4, true)]
    #[case::adts(ContainerKind::Adts, false)]
    #[case::mp3(ContainerKind::Mp3, false)]
    #[case::mp4(ContainerKind::Mp4, false)]
    fn test_container_kind_reuse(#[case] kind: ContainerKind, #[case] reusable: bool) {
        assert_eq!(kind.is_reusable(), reusable);
        assert_eq!(kind.needs_recreation(), !reusable);
    }

    #[rstest]
    #[case("video/mp2t", ContainerKind::Ts)]
    #[case("audio/mpeg", ContainerKind::Mp3)]
    #[case("video/webm", ContainerKind::Matroska)]
    #[case("application/octet-stream", ContainerKind::Unknown)]
    fn test_from_mime_type(#[case] mime: &str, #[case] expected: ContainerKind) {
        assert_eq!(ContainerKind::from_mime_type(mime), expected);
    }
}
