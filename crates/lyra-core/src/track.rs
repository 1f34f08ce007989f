use std::{ops::Index, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::Format;

/// Kind of media carried by a track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    #[default]
    Unknown,
    /// Muxed content that does not map to a single elementary type.
    Default,
    Audio,
    Video,
    Text,
    Image,
    Metadata,
    CameraMotion,
    None,
}

impl TrackType {
    pub fn from_mime_type(mime: &str) -> Self {
        let (top, sub) = mime.split_once('/').unwrap_or((mime, ""));
        match top {
            "video" => Self::Video,
            "audio" => Self::Audio,
            "text" => Self::Text,
            "image" => Self::Image,
            "application" => match sub {
                "x-subrip" | "ttml+xml" | "x-quicktime-tx3g" | "x-mp4-vtt" | "x-rawcc"
                | "vobsub" | "pgs" | "dvbsubs" | "cea-608" | "cea-708" | "x-media3-cues" => {
                    Self::Text
                }
                "id3" | "x-emsg" | "x-scte35" | "x-icy" => Self::Metadata,
                "x-camera-motion" => Self::CameraMotion,
                _ => Self::Unknown,
            },
            _ => Self::Unknown,
        }
    }

    /// Audio and video tracks gate the buffered position of a period.
    pub fn is_audio_or_video(self) -> bool {
        matches!(self, Self::Audio | Self::Video)
    }
}

/// A set of alternative tracks exposed together by a period.
///
/// Two groups are equal when id, type and formats are equal. Merged periods
/// prefix child ids so that groups with identical formats stay distinct.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TrackGroup {
    pub id: String,
    pub track_type: TrackType,
    formats: Vec<Format>,
}

impl TrackGroup {
    pub fn new(formats: Vec<Format>) -> Self {
        Self::with_id("", formats)
    }

    pub fn with_id(id: impl Into<String>, formats: Vec<Format>) -> Self {
        let track_type = formats
            .first()
            .map_or(TrackType::Unknown, Format::track_type);
        Self {
            id: id.into(),
            track_type,
            formats,
        }
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn format(&self, index: usize) -> Option<&Format> {
        self.formats.get(index)
    }

    pub fn formats(&self) -> &[Format] {
        &self.formats
    }

    pub fn index_of(&self, format: &Format) -> Option<usize> {
        self.formats.iter().position(|f| f == format)
    }

    /// Same formats under a new id.
    #[must_use]
    pub fn copy_with_id(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            track_type: self.track_type,
            formats: self.formats.clone(),
        }
    }
}

/// Ordered, immutable list of track groups exposed by a prepared period.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackGroupArray {
    groups: Vec<Arc<TrackGroup>>,
}

impl TrackGroupArray {
    pub fn new(groups: Vec<TrackGroup>) -> Self {
        Self {
            groups: groups.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_shared(groups: Vec<Arc<TrackGroup>>) -> Self {
        Self { groups }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<TrackGroup>> {
        self.groups.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TrackGroup>> {
        self.groups.iter()
    }

    /// Index of the first group equal in value to `group`.
    pub fn index_of(&self, group: &TrackGroup) -> Option<usize> {
        self.groups.iter().position(|g| **g == *group)
    }

    /// Index of this exact group instance.
    pub fn index_of_instance(&self, group: &Arc<TrackGroup>) -> Option<usize> {
        self.groups.iter().position(|g| Arc::ptr_eq(g, group))
    }

    pub fn track_types(&self) -> Vec<TrackType> {
        self.groups.iter().map(|g| g.track_type).collect()
    }
}

impl Index<usize> for TrackGroupArray {
    type Output = Arc<TrackGroup>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.groups[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(id: &str, mime: &str) -> Format {
        Format::builder().id(id).sample_mime_type(mime).build()
    }

    #[test]
    fn group_type_follows_first_format() {
        let group = TrackGroup::new(vec![format("a", "audio/opus"), format("b", "audio/aac")]);
        assert_eq!(group.track_type, TrackType::Audio);
        assert_eq!(group.len(), 2);
        assert_eq!(group.index_of(&format("b", "audio/aac")), Some(1));
    }

    #[test]
    fn copy_with_id_keeps_formats_but_breaks_equality() {
        let group = TrackGroup::new(vec![format("a", "video/avc")]);
        let renamed = group.copy_with_id("1:");
        assert_eq!(renamed.formats(), group.formats());
        assert_ne!(renamed, group);
    }

    #[test]
    fn index_of_instance_tells_equal_groups_apart() {
        let array = TrackGroupArray::new(vec![
            TrackGroup::new(vec![format("x", "video/avc")]),
            TrackGroup::new(vec![format("x", "video/avc")]),
        ]);
        let second = Arc::clone(&array[1]);
        assert_eq!(array.index_of(&second), Some(0));
        assert_eq!(array.index_of_instance(&second), Some(1));
    }
}
